//! Keys stored as entries of a single Kubernetes Secret

use super::TokenKeyStore;
use crate::cluster::ClusterClient;
use crate::error::{VaultError, VaultResult};
use crate::naming::KeyNaming;
use crate::secret::SecretValue;
use kvault_common::LoggingTransformer;

pub struct KubernetesSecretStore<C: ClusterClient> {
    cluster: C,
    namespace: String,
    secret_name: String,
    naming: KeyNaming,
}

impl<C: ClusterClient> KubernetesSecretStore<C> {
    pub fn new(cluster: C, namespace: &str, secret_name: &str, naming: KeyNaming) -> Self {
        Self {
            cluster,
            namespace: namespace.to_string(),
            secret_name: secret_name.to_string(),
            naming,
        }
    }

    fn location(&self) -> String {
        format!("secret {}/{}", self.namespace, self.secret_name)
    }
}

impl<C: ClusterClient> TokenKeyStore for KubernetesSecretStore<C> {
    async fn get(&self, name: &str) -> VaultResult<SecretValue> {
        let data = self
            .cluster
            .get_secret(&self.namespace, &self.secret_name)
            .await?
            .ok_or_else(|| VaultError::NotFound(self.location()))?;

        data.get(name)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(format!("{name} in {}", self.location())))
    }

    async fn set(&self, name: &str, value: &SecretValue) -> VaultResult<()> {
        let result = self
            .cluster
            .set_secret_key(&self.namespace, &self.secret_name, name, value)
            .await;
        LoggingTransformer::log_key_operation("set", name, result.is_ok());
        result
    }

    async fn delete(&self, name: &str) -> VaultResult<()> {
        let result = self
            .cluster
            .remove_secret_key(&self.namespace, &self.secret_name, name)
            .await;
        LoggingTransformer::log_key_operation("delete", name, result.is_ok());
        result
    }

    fn clean(&mut self) {}

    fn provider(&self) -> &'static str {
        "kubernetes-secret"
    }

    fn naming(&self) -> &KeyNaming {
        &self.naming
    }
}
