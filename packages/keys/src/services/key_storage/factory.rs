//! Factory for creating the key store matching a server's unsealing mode

use super::{
    AwsKmsSsmStore, AzureKeyVaultStore, GoogleAuth, GoogleKmsGcsStore, KubernetesSecretStore,
    TokenKeyStore,
};
use crate::cluster::{ClusterClient, SecretData};
use crate::config::{AwsCredentials, AzureCredentials, GoogleCredentials, ToolConfig};
use crate::descriptor::{SecretReference, UnsealingMode, VaultServerDescriptor};
use crate::error::{VaultError, VaultResult};
use crate::naming::KeyNaming;
use crate::secret::SecretValue;
use kvault_common::LoggingTransformer;
use log::warn;
use zeroize::Zeroize;

/// Enum to hold the different key store backends
///
/// This enum allows us to abstract over the providers while avoiding
/// trait object limitations with async traits. The variant is selected once,
/// at construction.
pub enum KeyStoreBackend<C: ClusterClient> {
    KubernetesSecret(KubernetesSecretStore<C>),
    AwsKmsSsm(AwsKmsSsmStore),
    AzureKeyVault(AzureKeyVaultStore),
    GoogleKmsGcs(GoogleKmsGcsStore),
}

impl<C: ClusterClient> TokenKeyStore for KeyStoreBackend<C> {
    async fn get(&self, name: &str) -> VaultResult<SecretValue> {
        match self {
            KeyStoreBackend::KubernetesSecret(store) => store.get(name).await,
            KeyStoreBackend::AwsKmsSsm(store) => store.get(name).await,
            KeyStoreBackend::AzureKeyVault(store) => store.get(name).await,
            KeyStoreBackend::GoogleKmsGcs(store) => store.get(name).await,
        }
    }

    async fn set(&self, name: &str, value: &SecretValue) -> VaultResult<()> {
        match self {
            KeyStoreBackend::KubernetesSecret(store) => store.set(name, value).await,
            KeyStoreBackend::AwsKmsSsm(store) => store.set(name, value).await,
            KeyStoreBackend::AzureKeyVault(store) => store.set(name, value).await,
            KeyStoreBackend::GoogleKmsGcs(store) => store.set(name, value).await,
        }
    }

    async fn delete(&self, name: &str) -> VaultResult<()> {
        match self {
            KeyStoreBackend::KubernetesSecret(store) => store.delete(name).await,
            KeyStoreBackend::AwsKmsSsm(store) => store.delete(name).await,
            KeyStoreBackend::AzureKeyVault(store) => store.delete(name).await,
            KeyStoreBackend::GoogleKmsGcs(store) => store.delete(name).await,
        }
    }

    fn clean(&mut self) {
        match self {
            KeyStoreBackend::KubernetesSecret(store) => store.clean(),
            KeyStoreBackend::AwsKmsSsm(store) => store.clean(),
            KeyStoreBackend::AzureKeyVault(store) => store.clean(),
            KeyStoreBackend::GoogleKmsGcs(store) => store.clean(),
        }
    }

    fn provider(&self) -> &'static str {
        match self {
            KeyStoreBackend::KubernetesSecret(store) => store.provider(),
            KeyStoreBackend::AwsKmsSsm(store) => store.provider(),
            KeyStoreBackend::AzureKeyVault(store) => store.provider(),
            KeyStoreBackend::GoogleKmsGcs(store) => store.provider(),
        }
    }

    fn naming(&self) -> &KeyNaming {
        match self {
            KeyStoreBackend::KubernetesSecret(store) => store.naming(),
            KeyStoreBackend::AwsKmsSsm(store) => store.naming(),
            KeyStoreBackend::AzureKeyVault(store) => store.naming(),
            KeyStoreBackend::GoogleKmsGcs(store) => store.naming(),
        }
    }
}

async fn credential_secret<C: ClusterClient>(
    cluster: &C,
    namespace: &str,
    reference: &SecretReference,
) -> VaultResult<SecretData> {
    cluster
        .get_secret(namespace, &reference.name)
        .await?
        .ok_or_else(|| VaultError::NotFound(format!("secret {namespace}/{}", reference.name)))
}

/// HTTP client for the REST-based providers
pub fn http_client(config: &ToolConfig) -> VaultResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()?)
}

/// Build the key store for `descriptor`'s unsealing mode.
///
/// The key prefix is looked up from the server's StatefulSet once here; when
/// the lookup fails the store is still returned and current-name derivation
/// reports `NameUndeterminable`.
pub async fn create_key_store<C: ClusterClient + Clone>(
    descriptor: &VaultServerDescriptor,
    cluster: &C,
    config: &ToolConfig,
) -> VaultResult<KeyStoreBackend<C>> {
    let namespace = descriptor.namespace();

    let unsealer_args = match cluster.unsealer_args(namespace, descriptor.name()).await {
        Ok(args) => args,
        Err(err) => {
            warn!("Could not read statefulset {namespace}/{}: {err}", descriptor.name());
            None
        }
    };
    let naming = KeyNaming::for_descriptor(descriptor, unsealer_args.as_deref());

    let mode = descriptor.mode();
    LoggingTransformer::log_backend_selected(mode.name(), namespace, descriptor.name());

    let backend = match mode {
        UnsealingMode::KubernetesSecret(spec) => KeyStoreBackend::KubernetesSecret(
            KubernetesSecretStore::new(cluster.clone(), namespace, &spec.secret_name, naming),
        ),
        UnsealingMode::AwsKmsSsm(spec) => {
            let credentials = match &spec.credential_secret_ref {
                Some(reference) => {
                    let data = credential_secret(cluster, namespace, reference).await?;
                    Some(AwsCredentials::from_secret(&data, &reference.name)?)
                }
                None => None,
            };
            KeyStoreBackend::AwsKmsSsm(AwsKmsSsmStore::connect(spec, credentials, naming).await?)
        }
        UnsealingMode::AzureKeyVault(spec) => {
            let reference = spec.credential_secret_ref.as_ref().ok_or_else(|| {
                VaultError::Configuration("azureKeyVault credentialSecretRef is not set".to_string())
            })?;
            let data = credential_secret(cluster, namespace, reference).await?;
            let credentials = AzureCredentials::from_secret(&spec.tenant_id, &data, &reference.name)?;
            KeyStoreBackend::AzureKeyVault(AzureKeyVaultStore::new(
                http_client(config)?,
                &spec.vault_base_url,
                credentials,
                config.azure_purge,
                naming,
            ))
        }
        UnsealingMode::GoogleKmsGcs(spec) => {
            let mut credentials = match &spec.credential_secret_ref {
                Some(reference) => {
                    let data = credential_secret(cluster, namespace, reference).await?;
                    GoogleCredentials::from_secret(&data, &reference.name)?
                }
                None => GoogleCredentials::default(),
            };
            let auth = GoogleAuth::from_credentials(&credentials).await;
            credentials.zeroize();
            KeyStoreBackend::GoogleKmsGcs(GoogleKmsGcsStore::new(http_client(config)?, spec, auth?, naming))
        }
    };

    Ok(backend)
}
