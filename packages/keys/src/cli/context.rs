//! Resolves config, cluster access and the VaultServer for one invocation

use super::commands::{GlobalArgs, ServerArgs};
use crate::cluster::{ClusterClient, KubeCluster};
use crate::config::ToolConfig;
use crate::descriptor::VaultServerDescriptor;
use crate::error::{VaultError, VaultResult};
use crate::services::{create_key_store, KeyStoreBackend, KeyStoreGuard};
use crate::vault_client::{HttpVaultClient, VaultClientOptions};
use log::{debug, warn};

const DEFAULT_NAMESPACE: &str = "default";
const SUPPORTED_RESOURCES: [&str; 3] = ["vaultserver", "vaultservers", "vs"];

pub struct CommandContext<C: ClusterClient> {
    pub config: ToolConfig,
    pub cluster: C,
    pub descriptor: VaultServerDescriptor,
}

/// Reject anything but a VaultServer resource type
pub fn check_resource(resource: &str) -> VaultResult<()> {
    if SUPPORTED_RESOURCES.contains(&resource.to_lowercase().as_str()) {
        Ok(())
    } else {
        Err(VaultError::InvalidInput(format!("unknown/unsupported resource {resource}")))
    }
}

/// Merge CLI flags and environment over the config file
pub fn apply_overrides(config: &mut ToolConfig, global: &GlobalArgs) {
    if let Some(addr) = &global.vault_addr {
        config.vault_addr = Some(addr.clone());
    }
    if global.tls_skip_verify {
        config.tls_skip_verify = true;
    }
    if let Some(ca_cert) = &global.ca_cert {
        config.ca_cert = Some(ca_cert.clone());
    }
    if let Some(namespace) = &global.namespace {
        config.namespace = Some(namespace.clone());
    }
}

impl CommandContext<KubeCluster> {
    pub async fn build(global: &GlobalArgs, server: &ServerArgs) -> VaultResult<Self> {
        check_resource(&server.resource)?;

        let mut config = ToolConfig::load(global.config.as_deref())?;
        apply_overrides(&mut config, global);

        let cluster = KubeCluster::try_default().await?;
        let context = Self::resolve(config, cluster, global, server).await?;
        Ok(context)
    }
}

impl<C: ClusterClient + Clone> CommandContext<C> {
    /// Look up the VaultServer, from `--server-file` or from the cluster.
    pub async fn resolve(config: ToolConfig, cluster: C, global: &GlobalArgs, server: &ServerArgs) -> VaultResult<Self> {
        let cluster_uid = match cluster.cluster_uid().await {
            Ok(uid) => Some(uid),
            Err(err) => {
                warn!("Could not determine cluster uid: {err}");
                None
            }
        };

        let descriptor = match &global.server_file {
            Some(path) => {
                debug!("Reading VaultServer from {}", path.display());
                let descriptor = VaultServerDescriptor::from_file(path, cluster_uid)?;
                if descriptor.name() != server.name {
                    warn!(
                        "{} describes VaultServer {}, not {}",
                        path.display(),
                        descriptor.name(),
                        server.name
                    );
                }
                descriptor
            }
            None => {
                let namespace = config.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE);
                let resource = cluster.vault_server(namespace, &server.name).await?;
                VaultServerDescriptor::from_resource(resource, cluster_uid)?
            }
        };

        Ok(Self {
            config,
            cluster,
            descriptor,
        })
    }

    pub async fn key_store(&self) -> VaultResult<KeyStoreGuard<KeyStoreBackend<C>>> {
        let store = create_key_store(&self.descriptor, &self.cluster, &self.config).await?;
        Ok(KeyStoreGuard::new(store))
    }

    /// Vault address: flag or env, then config file, then the in-cluster service
    pub fn vault_addr(&self) -> String {
        self.config
            .vault_addr
            .clone()
            .unwrap_or_else(|| self.descriptor.default_vault_addr())
    }

    pub fn vault_client(&self) -> VaultResult<HttpVaultClient> {
        let options = VaultClientOptions {
            tls_skip_verify: self.config.tls_skip_verify,
            ca_cert: self.config.ca_cert.clone(),
            timeout: Some(self.config.request_timeout()),
        };
        HttpVaultClient::new(&self.vault_addr(), &options)
    }
}
