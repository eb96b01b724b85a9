//! In-memory cluster for tests and local development
//!
//! Clones share state, so a test can hand one clone to a key store and keep
//! another to inspect what was written.

use super::{ClusterClient, SecretData};
use crate::error::{VaultError, VaultResult};
use crate::secret::SecretValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct State {
    secrets: HashMap<(String, String), SecretData>,
    statefulsets: HashMap<(String, String), Vec<String>>,
    vault_servers: HashMap<(String, String), serde_json::Value>,
    cluster_uid: Option<String>,
    secret_writes: usize,
}

#[derive(Clone, Default)]
pub struct MemoryCluster {
    state: Arc<Mutex<State>>,
}

fn key(namespace: &str, name: &str) -> (String, String) {
    (namespace.to_string(), name.to_string())
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_cluster_uid(self, uid: impl Into<String>) -> Self {
        self.state().cluster_uid = Some(uid.into());
        self
    }

    /// Register a StatefulSet whose unsealer container runs with `args`
    pub fn with_statefulset<S: Into<String>>(
        self,
        namespace: &str,
        name: &str,
        args: impl IntoIterator<Item = S>,
    ) -> Self {
        let args = args.into_iter().map(Into::into).collect();
        self.state().statefulsets.insert(key(namespace, name), args);
        self
    }

    /// Register a VaultServer resource under its `metadata.namespace/name`
    pub fn with_vault_server(self, resource: serde_json::Value) -> Self {
        let namespace = resource["metadata"]["namespace"].as_str().unwrap_or("default").to_string();
        let name = resource["metadata"]["name"].as_str().unwrap_or_default().to_string();
        self.state().vault_servers.insert((namespace, name), resource);
        self
    }

    pub fn with_secret<K, V>(self, namespace: &str, name: &str, data: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<SecretValue>,
    {
        let data = data.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.state().secrets.insert(key(namespace, name), data);
        self
    }

    /// Value of one key, for assertions
    pub fn secret_key(&self, namespace: &str, name: &str, data_key: &str) -> Option<SecretValue> {
        self.state()
            .secrets
            .get(&key(namespace, name))
            .and_then(|data| data.get(data_key).cloned())
    }

    /// Number of `set_secret_key` calls served so far
    pub fn secret_writes(&self) -> usize {
        self.state().secret_writes
    }
}

impl ClusterClient for MemoryCluster {
    async fn get_secret(&self, namespace: &str, name: &str) -> VaultResult<Option<SecretData>> {
        Ok(self.state().secrets.get(&key(namespace, name)).cloned())
    }

    async fn set_secret_key(
        &self,
        namespace: &str,
        name: &str,
        data_key: &str,
        value: &SecretValue,
    ) -> VaultResult<()> {
        let mut state = self.state();
        state.secret_writes += 1;
        state
            .secrets
            .entry(key(namespace, name))
            .or_default()
            .insert(data_key.to_string(), value.clone());
        Ok(())
    }

    async fn remove_secret_key(&self, namespace: &str, name: &str, data_key: &str) -> VaultResult<()> {
        if let Some(data) = self.state().secrets.get_mut(&key(namespace, name)) {
            data.remove(data_key);
        }
        Ok(())
    }

    async fn unsealer_args(&self, namespace: &str, statefulset: &str) -> VaultResult<Option<Vec<String>>> {
        Ok(self.state().statefulsets.get(&key(namespace, statefulset)).cloned())
    }

    async fn vault_server(&self, namespace: &str, name: &str) -> VaultResult<serde_json::Value> {
        self.state()
            .vault_servers
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| VaultError::NotFound(format!("vaultserver {namespace}/{name}")))
    }

    async fn cluster_uid(&self) -> VaultResult<String> {
        self.state()
            .cluster_uid
            .clone()
            .ok_or_else(|| VaultError::NotFound("namespace kube-system".to_string()))
    }
}
