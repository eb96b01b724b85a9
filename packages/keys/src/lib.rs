//! Root-token and unseal-key management for KubeVault managed Vault servers
//!
//! Keys live in whatever store the VaultServer's unsealer is configured with
//! (Kubernetes secret, AWS KMS + SSM, Azure Key Vault, Google KMS + GCS).
//! [`services::create_key_store`] picks the store for a server;
//! [`services::sync_all`] migrates legacy names and
//! [`services::rotate_root_token`] replaces the root token.

pub mod cli;
pub mod cluster;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod logging;
pub mod naming;
pub mod secret;
pub mod services;
pub mod vault_client;

// Re-export the public API
pub use cluster::{ClusterClient, KubeCluster, MemoryCluster};
pub use config::ToolConfig;
pub use descriptor::{UnsealingMode, VaultServerDescriptor};
pub use error::{VaultError, VaultResult};
pub use naming::{KeyNaming, KeyPrefix};
pub use secret::SecretValue;
pub use services::{create_key_store, KeyStoreBackend, KeyStoreGuard, TokenKeyStore};
pub use vault_client::{HttpVaultClient, RootTokenApi};
