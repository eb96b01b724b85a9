//! Key naming
//!
//! Two naming epochs address the same logical secret:
//! - current: `{provider-prefix}{key-prefix}-root-token` / `...-unseal-key-{id}`
//! - legacy:  `vault-root-token` / `vault-unseal-key-{id}` (or `{ssm-prefix}-vault-...`)
//!
//! The key prefix is live data: it is read from the `--key-prefix=` argument
//! of the unsealer container in the server's StatefulSet.

use crate::descriptor::{UnsealingMode, VaultServerDescriptor};
use crate::error::{VaultError, VaultResult};

/// Container in the Vault StatefulSet that runs the unsealer
pub const UNSEALER_CONTAINER: &str = "vault-unsealer";

const KEY_PREFIX_FLAG: &str = "--key-prefix=";
const LEGACY_ROOT_TOKEN: &str = "vault-root-token";
const LEGACY_UNSEAL_KEY: &str = "vault-unseal-key";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPrefix(String);

impl KeyPrefix {
    pub fn new(prefix: impl Into<String>) -> VaultResult<Self> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(VaultError::NameUndeterminable("key prefix is empty".to_string()));
        }
        Ok(Self(prefix))
    }

    /// Last non-empty `--key-prefix=` wins, as with repeated flags on the unsealer
    pub fn from_unsealer_args<S: AsRef<str>>(args: &[S]) -> Option<Self> {
        args.iter()
            .filter_map(|arg| arg.as_ref().strip_prefix(KEY_PREFIX_FLAG))
            .next_back()
            .filter(|prefix| !prefix.is_empty())
            .map(|prefix| Self(prefix.to_string()))
    }

    /// `k8s.{cluster-uid}.{namespace}.{name}`, the operator's default prefix
    pub fn cluster_default(cluster_uid: &str, namespace: &str, name: &str) -> Self {
        Self(format!("k8s.{cluster_uid}.{namespace}.{name}"))
    }

    /// Resolve the prefix for a server from its unsealer arguments.
    ///
    /// `unsealer_args` is `None` when the StatefulSet could not be found.
    pub fn resolve(
        descriptor: &VaultServerDescriptor,
        unsealer_args: Option<&[String]>,
    ) -> VaultResult<Self> {
        let server = format!("{}/{}", descriptor.namespace(), descriptor.name());
        let args = unsealer_args.ok_or_else(|| {
            VaultError::NameUndeterminable(format!("statefulset for vaultserver {server} not found"))
        })?;

        if let Some(prefix) = Self::from_unsealer_args(args) {
            return Ok(prefix);
        }

        match descriptor.cluster_id() {
            Some(uid) => Ok(Self::cluster_default(uid, descriptor.namespace(), descriptor.name())),
            None => Err(VaultError::NameUndeterminable(format!(
                "no {KEY_PREFIX_FLAG} argument on {UNSEALER_CONTAINER} of {server} and cluster UID unknown"
            ))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Name derivation for one server's keys, shared by every backend.
#[derive(Debug, Clone)]
pub struct KeyNaming {
    key_prefix: Result<KeyPrefix, String>,
    provider_prefix: String,
    secret_shares: i64,
}

impl KeyNaming {
    pub fn new(
        key_prefix: VaultResult<KeyPrefix>,
        provider_prefix: impl Into<String>,
        secret_shares: i64,
    ) -> Self {
        Self {
            key_prefix: key_prefix.map_err(|e| e.to_string()),
            provider_prefix: provider_prefix.into(),
            secret_shares,
        }
    }

    /// Naming for a descriptor; the SSM key prefix applies to aws-kms-ssm only.
    pub fn for_descriptor(
        descriptor: &VaultServerDescriptor,
        unsealer_args: Option<&[String]>,
    ) -> Self {
        let provider_prefix = match descriptor.mode() {
            UnsealingMode::AwsKmsSsm(spec) => spec.ssm_key_prefix.clone(),
            _ => String::new(),
        };
        Self::new(
            KeyPrefix::resolve(descriptor, unsealer_args),
            provider_prefix,
            descriptor.secret_shares(),
        )
    }

    pub fn new_token_name(&self) -> VaultResult<String> {
        let name = format!("{}{}-root-token", self.provider_prefix, self.key_prefix()?.as_str());
        self.guard_collision(name, self.old_token_name())
    }

    pub fn old_token_name(&self) -> String {
        self.legacy(LEGACY_ROOT_TOKEN)
    }

    pub fn new_unseal_key_name(&self, id: i64) -> VaultResult<String> {
        self.check_index(id)?;
        let name = format!(
            "{}{}-unseal-key-{id}",
            self.provider_prefix,
            self.key_prefix()?.as_str()
        );
        self.guard_collision(name, self.legacy(&format!("{LEGACY_UNSEAL_KEY}-{id}")))
    }

    pub fn old_unseal_key_name(&self, id: i64) -> VaultResult<String> {
        self.check_index(id)?;
        Ok(self.legacy(&format!("{LEGACY_UNSEAL_KEY}-{id}")))
    }

    pub fn check_index(&self, id: i64) -> VaultResult<()> {
        if id < 0 || id >= self.secret_shares {
            return Err(VaultError::IndexOutOfRange {
                id,
                shares: self.secret_shares,
            });
        }
        Ok(())
    }

    pub fn secret_shares(&self) -> i64 {
        self.secret_shares
    }

    fn key_prefix(&self) -> VaultResult<&KeyPrefix> {
        self.key_prefix
            .as_ref()
            .map_err(|reason| VaultError::NameUndeterminable(reason.clone()))
    }

    fn legacy(&self, base: &str) -> String {
        if self.provider_prefix.is_empty() {
            base.to_string()
        } else {
            format!("{}-{base}", self.provider_prefix)
        }
    }

    fn guard_collision(&self, current: String, legacy: String) -> VaultResult<String> {
        if current == legacy {
            return Err(VaultError::NameUndeterminable(format!(
                "current name {current} collides with the legacy name"
            )));
        }
        Ok(current)
    }
}
