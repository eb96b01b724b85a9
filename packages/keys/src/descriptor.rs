//! Vault server descriptor
//!
//! An immutable view of a `VaultServer` custom resource: identity, Shamir
//! parameters and the one configured unsealing mode. Parsed from the raw
//! resource JSON as returned by the Kubernetes API (`kubevault.com/v1alpha1`
//! and `v1alpha2` credential references are both accepted).

use crate::error::{VaultError, VaultResult};
use serde::Deserialize;
use std::path::Path;

const DEFAULT_SECRET_SHARES: i64 = 5;
const DEFAULT_SECRET_THRESHOLD: i64 = 3;
const VAULT_PORT: u16 = 8200;

/// Reference to a Kubernetes secret in the server's namespace.
///
/// v1alpha1 resources carry a bare secret name, v1alpha2 resources a
/// `{ "name": ... }` object; both deserialize into this type.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawSecretReference")]
pub struct SecretReference {
    pub name: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSecretReference {
    Name(String),
    Object { name: String },
}

impl From<RawSecretReference> for SecretReference {
    fn from(raw: RawSecretReference) -> Self {
        match raw {
            RawSecretReference::Name(name) | RawSecretReference::Object { name } => {
                SecretReference { name }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesSecretSpec {
    pub secret_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsKmsSsmSpec {
    #[serde(rename = "kmsKeyID")]
    pub kms_key_id: String,
    #[serde(default)]
    pub ssm_key_prefix: String,
    pub region: String,
    #[serde(default, alias = "credentialSecret")]
    pub credential_secret_ref: Option<SecretReference>,
    /// Custom SSM/KMS endpoint (VPC endpoints, local testing)
    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureKeyVaultSpec {
    #[serde(rename = "vaultBaseURL")]
    pub vault_base_url: String,
    #[serde(rename = "tenantID")]
    pub tenant_id: String,
    #[serde(default, alias = "aadClientSecret")]
    pub credential_secret_ref: Option<SecretReference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleKmsGcsSpec {
    pub bucket: String,
    pub kms_project: String,
    pub kms_location: String,
    pub kms_key_ring: String,
    pub kms_crypto_key: String,
    #[serde(default, alias = "credentialSecret")]
    pub credential_secret_ref: Option<SecretReference>,
}

impl GoogleKmsGcsSpec {
    /// Fully qualified crypto key resource name
    pub fn crypto_key_name(&self) -> String {
        format!(
            "projects/{}/locations/{}/keyRings/{}/cryptoKeys/{}",
            self.kms_project, self.kms_location, self.kms_key_ring, self.kms_crypto_key
        )
    }
}

/// The single unsealing mode configured on a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsealingMode {
    KubernetesSecret(KubernetesSecretSpec),
    AwsKmsSsm(AwsKmsSsmSpec),
    AzureKeyVault(AzureKeyVaultSpec),
    GoogleKmsGcs(GoogleKmsGcsSpec),
}

impl UnsealingMode {
    pub fn name(&self) -> &'static str {
        match self {
            UnsealingMode::KubernetesSecret(_) => "kubernetes-secret",
            UnsealingMode::AwsKmsSsm(_) => "aws-kms-ssm",
            UnsealingMode::AzureKeyVault(_) => "azure-key-vault",
            UnsealingMode::GoogleKmsGcs(_) => "google-kms-gcs",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultServerDescriptor {
    namespace: String,
    name: String,
    cluster_id: Option<String>,
    mode: UnsealingMode,
    secret_shares: i64,
    secret_threshold: i64,
    tls: bool,
}

impl VaultServerDescriptor {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        mode: UnsealingMode,
        secret_shares: i64,
        secret_threshold: i64,
    ) -> VaultResult<Self> {
        let descriptor = Self {
            namespace: namespace.into(),
            name: name.into(),
            cluster_id: None,
            mode,
            secret_shares,
            secret_threshold,
            tls: false,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn with_cluster_id(mut self, cluster_id: impl Into<String>) -> Self {
        let id = cluster_id.into();
        self.cluster_id = (!id.is_empty()).then_some(id);
        self
    }

    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Parse a `VaultServer` resource as returned by the API server.
    pub fn from_resource(resource: serde_json::Value, cluster_id: Option<String>) -> VaultResult<Self> {
        let raw: RawVaultServer = serde_json::from_value(resource)?;
        let unsealer = raw.spec.unsealer.ok_or_else(|| {
            VaultError::UnsupportedMode("vaultServer unsealer spec is empty".to_string())
        })?;

        let mode = unsealer.mode.into_mode()?;
        let descriptor = Self {
            namespace: raw.metadata.namespace.unwrap_or_else(|| "default".to_string()),
            name: raw.metadata.name,
            cluster_id: cluster_id.filter(|id| !id.is_empty()),
            mode,
            secret_shares: unsealer.secret_shares,
            secret_threshold: unsealer.secret_threshold,
            tls: raw.spec.tls.is_some_and(|tls| !tls.is_null()),
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Load a descriptor from `kubectl get vaultserver <name> -o json` output.
    pub fn from_file(path: &Path, cluster_id: Option<String>) -> VaultResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let resource: serde_json::Value = serde_json::from_str(&contents)?;
        Self::from_resource(resource, cluster_id)
    }

    fn validate(&self) -> VaultResult<()> {
        if self.name.is_empty() {
            return Err(VaultError::Configuration("vaultserver name is empty".to_string()));
        }
        if self.secret_shares < 1 {
            return Err(VaultError::Configuration(format!(
                "secretShares must be at least 1, got {}",
                self.secret_shares
            )));
        }
        if self.secret_threshold < 1 || self.secret_threshold > self.secret_shares {
            return Err(VaultError::Configuration(format!(
                "secretThreshold must be between 1 and secretShares ({}), got {}",
                self.secret_shares, self.secret_threshold
            )));
        }
        Ok(())
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cluster_id(&self) -> Option<&str> {
        self.cluster_id.as_deref()
    }

    pub fn mode(&self) -> &UnsealingMode {
        &self.mode
    }

    /// Total number of unseal-key shares (N)
    pub fn secret_shares(&self) -> i64 {
        self.secret_shares
    }

    /// Shares required to unseal or generate a root token (K)
    pub fn secret_threshold(&self) -> i64 {
        self.secret_threshold
    }

    /// In-cluster service address of the server
    pub fn default_vault_addr(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{scheme}://{}.{}.svc:{VAULT_PORT}", self.name, self.namespace)
    }
}

#[derive(Deserialize)]
struct RawVaultServer {
    metadata: RawMetadata,
    spec: RawSpec,
}

#[derive(Deserialize)]
struct RawMetadata {
    name: String,
    #[serde(default)]
    namespace: Option<String>,
}

#[derive(Deserialize)]
struct RawSpec {
    #[serde(default)]
    unsealer: Option<RawUnsealer>,
    #[serde(default)]
    tls: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUnsealer {
    #[serde(default = "default_secret_shares")]
    secret_shares: i64,
    #[serde(default = "default_secret_threshold")]
    secret_threshold: i64,
    #[serde(default)]
    mode: RawMode,
}

fn default_secret_shares() -> i64 {
    DEFAULT_SECRET_SHARES
}

fn default_secret_threshold() -> i64 {
    DEFAULT_SECRET_THRESHOLD
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMode {
    kubernetes_secret: Option<KubernetesSecretSpec>,
    aws_kms_ssm: Option<AwsKmsSsmSpec>,
    azure_key_vault: Option<AzureKeyVaultSpec>,
    google_kms_gcs: Option<GoogleKmsGcsSpec>,
}

impl RawMode {
    fn into_mode(self) -> VaultResult<UnsealingMode> {
        let mut modes = Vec::with_capacity(1);
        if let Some(spec) = self.kubernetes_secret {
            modes.push(UnsealingMode::KubernetesSecret(spec));
        }
        if let Some(spec) = self.aws_kms_ssm {
            modes.push(UnsealingMode::AwsKmsSsm(spec));
        }
        if let Some(spec) = self.azure_key_vault {
            modes.push(UnsealingMode::AzureKeyVault(spec));
        }
        if let Some(spec) = self.google_kms_gcs {
            modes.push(UnsealingMode::GoogleKmsGcs(spec));
        }

        match modes.len() {
            1 => Ok(modes.remove(0)),
            0 => Err(VaultError::UnsupportedMode(
                "unknown/unsupported unsealing mode".to_string(),
            )),
            _ => Err(VaultError::UnsupportedMode(format!(
                "exactly one unsealing mode must be set, found {}: {}",
                modes.len(),
                modes.iter().map(UnsealingMode::name).collect::<Vec<_>>().join(", ")
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resource(mode: serde_json::Value) -> serde_json::Value {
        json!({
            "apiVersion": "kubevault.com/v1alpha2",
            "kind": "VaultServer",
            "metadata": { "name": "vault", "namespace": "demo" },
            "spec": {
                "unsealer": { "secretShares": 5, "secretThreshold": 3, "mode": mode }
            }
        })
    }

    #[test]
    fn parses_kubernetes_secret_mode() {
        let vs = VaultServerDescriptor::from_resource(
            resource(json!({ "kubernetesSecret": { "secretName": "vault-keys" } })),
            Some("c0ffee".to_string()),
        )
        .unwrap();

        assert_eq!(vs.namespace(), "demo");
        assert_eq!(vs.name(), "vault");
        assert_eq!(vs.cluster_id(), Some("c0ffee"));
        assert_eq!(vs.secret_shares(), 5);
        assert_eq!(vs.secret_threshold(), 3);
        assert_eq!(
            vs.mode(),
            &UnsealingMode::KubernetesSecret(KubernetesSecretSpec {
                secret_name: "vault-keys".to_string()
            })
        );
        assert_eq!(vs.default_vault_addr(), "http://vault.demo.svc:8200");
    }

    #[test]
    fn accepts_both_credential_reference_shapes() {
        let v1 = VaultServerDescriptor::from_resource(
            resource(json!({ "awsKmsSsm": {
                "kmsKeyID": "key", "region": "us-east-1", "credentialSecret": "aws-cred"
            }})),
            None,
        )
        .unwrap();
        let v2 = VaultServerDescriptor::from_resource(
            resource(json!({ "awsKmsSsm": {
                "kmsKeyID": "key", "region": "us-east-1", "credentialSecretRef": { "name": "aws-cred" }
            }})),
            None,
        )
        .unwrap();

        assert_eq!(v1.mode(), v2.mode());
        match v1.mode() {
            UnsealingMode::AwsKmsSsm(spec) => {
                assert_eq!(spec.credential_secret_ref.as_ref().unwrap().name, "aws-cred");
                assert_eq!(spec.ssm_key_prefix, "");
            }
            other => panic!("unexpected mode {other:?}"),
        }
    }

    #[test]
    fn missing_mode_is_unsupported() {
        let err = VaultServerDescriptor::from_resource(resource(json!({})), None).unwrap_err();
        assert!(matches!(err, VaultError::UnsupportedMode(_)));
    }

    #[test]
    fn two_modes_are_unsupported() {
        let err = VaultServerDescriptor::from_resource(
            resource(json!({
                "kubernetesSecret": { "secretName": "keys" },
                "googleKmsGcs": {
                    "bucket": "b", "kmsProject": "p", "kmsLocation": "global",
                    "kmsKeyRing": "r", "kmsCryptoKey": "k"
                }
            })),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, VaultError::UnsupportedMode(msg) if msg.contains("google-kms-gcs")));
    }

    #[test]
    fn missing_unsealer_is_unsupported() {
        let err = VaultServerDescriptor::from_resource(
            json!({ "metadata": { "name": "vault", "namespace": "demo" }, "spec": {} }),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, VaultError::UnsupportedMode(_)));
    }

    #[test]
    fn threshold_above_shares_is_rejected() {
        let mode = UnsealingMode::KubernetesSecret(KubernetesSecretSpec {
            secret_name: "keys".to_string(),
        });
        let err = VaultServerDescriptor::new("demo", "vault", mode, 3, 4).unwrap_err();
        assert!(matches!(err, VaultError::Configuration(_)));
    }

    #[test]
    fn tls_switches_scheme() {
        let mut res = resource(json!({ "kubernetesSecret": { "secretName": "keys" } }));
        res["spec"]["tls"] = json!({ "issuerRef": { "name": "ca" } });
        let vs = VaultServerDescriptor::from_resource(res, None).unwrap();
        assert_eq!(vs.default_vault_addr(), "https://vault.demo.svc:8200");
    }

    #[test]
    fn google_crypto_key_name() {
        let spec = GoogleKmsGcsSpec {
            bucket: "b".into(),
            kms_project: "proj".into(),
            kms_location: "global".into(),
            kms_key_ring: "ring".into(),
            kms_crypto_key: "key".into(),
            credential_secret_ref: None,
        };
        assert_eq!(
            spec.crypto_key_name(),
            "projects/proj/locations/global/keyRings/ring/cryptoKeys/key"
        );
    }
}
