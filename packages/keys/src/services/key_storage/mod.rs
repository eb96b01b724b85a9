//! Key storage abstraction for root tokens and unseal keys
//!
//! Provides a trait-based abstraction over the stores a VaultServer can be
//! configured with, allowing the CLI, the naming migrator and the rotation
//! engine to work against any of them:
//! - Kubernetes secret (plaintext keys inside one Secret)
//! - AWS KMS + SSM Parameter Store
//! - Azure Key Vault secrets
//! - Google Cloud KMS + Cloud Storage

use crate::error::VaultResult;
use crate::naming::KeyNaming;
use crate::secret::SecretValue;
use std::ops::{Deref, DerefMut};

pub mod aws_kms_ssm;
pub mod azure_key_vault;
pub mod factory;
pub mod google_kms_gcs;
pub mod kubernetes_secret;

pub use aws_kms_ssm::AwsKmsSsmStore;
pub use azure_key_vault::AzureKeyVaultStore;
pub use factory::{create_key_store, KeyStoreBackend};
pub use google_kms_gcs::{GoogleAuth, GoogleKmsGcsStore};
pub use kubernetes_secret::KubernetesSecretStore;

/// Encrypted get/set/delete of named secrets plus current/legacy name derivation
///
/// Values are opaque bytes: `set(name, v)` followed by `get(name)` returns
/// `v` unchanged, including the empty value.
pub trait TokenKeyStore: Send + Sync {
    /// Fetch and decrypt the value stored under `name`
    ///
    /// # Errors
    /// `NotFound` when absent, `Decryption` when the ciphertext cannot be
    /// decrypted, `BackendUnavailable` on transport or auth failure
    async fn get(&self, name: &str) -> VaultResult<SecretValue>;

    /// Encrypt and write `value`, creating or overwriting the entry
    async fn set(&self, name: &str, value: &SecretValue) -> VaultResult<()>;

    /// Remove the entry; succeeds when it is already absent
    async fn delete(&self, name: &str) -> VaultResult<()>;

    /// Release credentials and cached tokens held by this store
    fn clean(&mut self);

    /// Provider name, for logs
    fn provider(&self) -> &'static str;

    fn naming(&self) -> &KeyNaming;

    fn new_token_name(&self) -> VaultResult<String> {
        self.naming().new_token_name()
    }

    fn old_token_name(&self) -> VaultResult<String> {
        Ok(self.naming().old_token_name())
    }

    fn new_unseal_key_name(&self, id: i64) -> VaultResult<String> {
        self.naming().new_unseal_key_name(id)
    }

    fn old_unseal_key_name(&self, id: i64) -> VaultResult<String> {
        self.naming().old_unseal_key_name(id)
    }

    /// Number of unseal-key shares the server was initialised with
    fn secret_shares(&self) -> i64 {
        self.naming().secret_shares()
    }
}

/// Owns a store and calls [`TokenKeyStore::clean`] when dropped, so
/// credentials are released on every exit path.
pub struct KeyStoreGuard<S: TokenKeyStore> {
    store: S,
}

impl<S: TokenKeyStore> KeyStoreGuard<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: TokenKeyStore> Deref for KeyStoreGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.store
    }
}

impl<S: TokenKeyStore> DerefMut for KeyStoreGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.store
    }
}

impl<S: TokenKeyStore> Drop for KeyStoreGuard<S> {
    fn drop(&mut self) {
        self.store.clean();
    }
}
