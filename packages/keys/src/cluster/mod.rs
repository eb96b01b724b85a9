//! Kubernetes access consumed by the key stores and the CLI
//!
//! The core never talks to the API server directly; it goes through
//! [`ClusterClient`], which has a live implementation ([`KubeCluster`]) and
//! an in-memory one ([`MemoryCluster`]) for tests and local work.

use crate::error::VaultResult;
use crate::secret::SecretValue;
use std::collections::BTreeMap;

pub mod kubernetes;
pub mod memory;

pub use kubernetes::KubeCluster;
pub use memory::MemoryCluster;

/// Decoded `data` of a Kubernetes secret
pub type SecretData = BTreeMap<String, SecretValue>;

pub trait ClusterClient: Send + Sync {
    /// Fetch a secret's data, `None` if the secret does not exist
    async fn get_secret(&self, namespace: &str, name: &str) -> VaultResult<Option<SecretData>>;

    /// Merge a single key into a secret, creating the secret when missing
    async fn set_secret_key(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: &SecretValue,
    ) -> VaultResult<()>;

    /// Remove a single key; no-op when the secret or the key is absent
    async fn remove_secret_key(&self, namespace: &str, name: &str, key: &str) -> VaultResult<()>;

    /// Arguments of the unsealer container, `None` if the StatefulSet does not exist
    async fn unsealer_args(&self, namespace: &str, statefulset: &str) -> VaultResult<Option<Vec<String>>>;

    /// Raw `VaultServer` resource
    async fn vault_server(&self, namespace: &str, name: &str) -> VaultResult<serde_json::Value>;

    /// Cluster identity: UID of the `kube-system` namespace
    async fn cluster_uid(&self) -> VaultResult<String>;
}
