//! Tool configuration and backend credentials
//!
//! `ToolConfig` is read from `$XDG_CONFIG_HOME/kubevault/config.json` when
//! present; CLI flags and `VAULT_*` environment variables override it.
//! Credentials are always built explicitly from the Kubernetes secret
//! referenced by the VaultServer and handed to the backend constructor.

use crate::cluster::SecretData;
use crate::error::{VaultError, VaultResult};
use crate::secret::SecretValue;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use zeroize::Zeroize;

const CONFIG_DIR: &str = "kubevault";
const CONFIG_FILE: &str = "config.json";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Vault address; derived from the VaultServer when unset
    #[serde(default)]
    pub vault_addr: Option<String>,
    #[serde(default)]
    pub tls_skip_verify: bool,
    /// PEM bundle used to verify the Vault server certificate
    #[serde(default)]
    pub ca_cert: Option<PathBuf>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub azure_purge: PurgePolicy,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Bounded polling for soft-delete-then-purge providers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgePolicy {
    pub attempts: u32,
    pub interval_secs: u64,
}

impl Default for PurgePolicy {
    fn default() -> Self {
        Self {
            attempts: 15,
            interval_secs: 2,
        }
    }
}

impl PurgePolicy {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_request_timeout() -> u64 {
    30
}

impl ToolConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load the config file; a missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> VaultResult<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) => path,
                None => return Ok(Self::with_defaults()),
            },
        };

        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::with_defaults());
        }

        let contents = std::fs::read_to_string(&path)?;
        serde_json::from_str(&contents).map_err(|e| {
            VaultError::Configuration(format!("invalid config file {}: {e}", path.display()))
        })
    }

    /// Defaults identical to an empty config file
    pub fn with_defaults() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            ..Self::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn required(data: &SecretData, secret: &str, key: &str) -> VaultResult<SecretValue> {
    data.get(key).cloned().ok_or_else(|| {
        VaultError::Configuration(format!("{key} not found in secret {secret}"))
    })
}

fn required_str(data: &SecretData, secret: &str, key: &str) -> VaultResult<String> {
    Ok(required(data, secret, key)?.expose_as_str()?.to_string())
}

#[derive(Clone, Debug, Zeroize)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: SecretValue,
}

impl AwsCredentials {
    pub const ACCESS_KEY: &'static str = "access_key";
    pub const SECRET_KEY: &'static str = "secret_key";

    pub fn from_secret(data: &SecretData, secret: &str) -> VaultResult<Self> {
        Ok(Self {
            access_key_id: required_str(data, secret, Self::ACCESS_KEY)?,
            secret_access_key: required(data, secret, Self::SECRET_KEY)?,
        })
    }
}

#[derive(Clone, Debug, Zeroize)]
pub struct AzureCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: SecretValue,
}

impl AzureCredentials {
    pub const CLIENT_ID: &'static str = "client-id";
    pub const CLIENT_SECRET: &'static str = "client-secret";

    pub fn from_secret(tenant_id: &str, data: &SecretData, secret: &str) -> VaultResult<Self> {
        Ok(Self {
            tenant_id: tenant_id.to_string(),
            client_id: required_str(data, secret, Self::CLIENT_ID)?,
            client_secret: required(data, secret, Self::CLIENT_SECRET)?,
        })
    }
}

/// Service-account key JSON; ambient credentials are used when absent
#[derive(Clone, Debug, Default, Zeroize)]
pub struct GoogleCredentials {
    pub service_account_json: Option<SecretValue>,
}

impl GoogleCredentials {
    pub const SERVICE_ACCOUNT_KEY: &'static str = "sa.json";

    pub fn from_secret(data: &SecretData, secret: &str) -> VaultResult<Self> {
        Ok(Self {
            service_account_json: Some(required(data, secret, Self::SERVICE_ACCOUNT_KEY)?),
        })
    }
}
