//! AWS KMS + SSM Parameter Store
//!
//! Each key is an SSM `String` parameter holding the base64 of its KMS
//! ciphertext. Encryption context `Tool=vault-unsealer` is bound into every
//! ciphertext, matching what the unsealer writes.
//!
//! KMS refuses empty plaintext and SSM refuses empty values, so an empty key
//! is stored as [`EMPTY_PARAMETER_VALUE`] without a KMS round trip.

use super::TokenKeyStore;
use crate::config::AwsCredentials;
use crate::descriptor::AwsKmsSsmSpec;
use crate::error::{VaultError, VaultResult};
use crate::logging::{log_security_event, SecurityEvent};
use crate::naming::KeyNaming;
use crate::secret::SecretValue;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_kms::primitives::Blob;
use aws_sdk_ssm::config::Credentials;
use aws_sdk_ssm::error::DisplayErrorContext;
use aws_sdk_ssm::types::ParameterType;
use base64::{engine::general_purpose, Engine as _};
use kvault_common::LoggingTransformer;
use log::debug;
use zeroize::Zeroize;

const ENCRYPTION_CONTEXT_KEY: &str = "Tool";
const ENCRYPTION_CONTEXT_VALUE: &str = "vault-unsealer";
const PARAMETER_DESCRIPTION: &str = "vault-unsealer";
const CREDENTIALS_SOURCE: &str = "kubevault-credential-secret";

/// Parameter value standing for an empty key; `-` is outside the base64 alphabet
pub const EMPTY_PARAMETER_VALUE: &str = "-";

pub struct AwsKmsSsmStore {
    kms: aws_sdk_kms::Client,
    ssm: aws_sdk_ssm::Client,
    kms_key_id: String,
    credentials: Option<AwsCredentials>,
    naming: KeyNaming,
}

impl AwsKmsSsmStore {
    /// Build SDK clients for the spec's region.
    ///
    /// Static credentials from the referenced secret are passed to the SDK
    /// directly; without them the default provider chain applies.
    pub async fn connect(
        spec: &AwsKmsSsmSpec,
        credentials: Option<AwsCredentials>,
        naming: KeyNaming,
    ) -> VaultResult<Self> {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(spec.region.clone()));

        if let Some(creds) = &credentials {
            loader = loader.credentials_provider(Credentials::new(
                creds.access_key_id.clone(),
                creds.secret_access_key.expose_as_str()?.to_string(),
                None,
                None,
                CREDENTIALS_SOURCE,
            ));
        }
        if let Some(endpoint) = &spec.endpoint {
            debug!("Using custom AWS endpoint {endpoint}");
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;
        Ok(Self {
            kms: aws_sdk_kms::Client::new(&sdk_config),
            ssm: aws_sdk_ssm::Client::new(&sdk_config),
            kms_key_id: spec.kms_key_id.clone(),
            credentials,
            naming,
        })
    }

    async fn decrypt(&self, name: &str, ciphertext: Vec<u8>) -> VaultResult<SecretValue> {
        let output = self
            .kms
            .decrypt()
            .key_id(&self.kms_key_id)
            .ciphertext_blob(Blob::new(ciphertext))
            .encryption_context(ENCRYPTION_CONTEXT_KEY, ENCRYPTION_CONTEXT_VALUE)
            .send()
            .await
            .map_err(|err| {
                LoggingTransformer::log_crypto_error("kms decrypt", &err);
                match err.as_service_error() {
                    Some(e) if e.is_invalid_ciphertext_exception() || e.is_incorrect_key_exception() => {
                        VaultError::Decryption(format!("kms decrypt of {name}: {e}"))
                    }
                    _ => VaultError::backend("aws-kms", DisplayErrorContext(&err)),
                }
            })?;

        let plaintext = output.plaintext.map(Blob::into_inner).unwrap_or_default();
        Ok(SecretValue::from_bytes(plaintext))
    }

    async fn encrypt(&self, value: &SecretValue) -> VaultResult<Vec<u8>> {
        let output = self
            .kms
            .encrypt()
            .key_id(&self.kms_key_id)
            .plaintext(Blob::new(value.expose_secret().to_vec()))
            .encryption_context(ENCRYPTION_CONTEXT_KEY, ENCRYPTION_CONTEXT_VALUE)
            .send()
            .await
            .map_err(|err| {
                LoggingTransformer::log_crypto_error("kms encrypt", &err);
                match err.as_service_error() {
                    Some(e) => VaultError::Encryption(format!("kms encrypt: {e}")),
                    None => VaultError::backend("aws-kms", DisplayErrorContext(&err)),
                }
            })?;

        output
            .ciphertext_blob
            .map(Blob::into_inner)
            .ok_or_else(|| VaultError::Encryption("kms returned no ciphertext".to_string()))
    }
}

impl TokenKeyStore for AwsKmsSsmStore {
    async fn get(&self, name: &str) -> VaultResult<SecretValue> {
        let output = self
            .ssm
            .get_parameters()
            .names(name)
            .with_decryption(false)
            .send()
            .await
            .map_err(|err| VaultError::backend("aws-ssm", DisplayErrorContext(&err)))?;

        let value = output
            .parameters()
            .first()
            .and_then(|param| param.value())
            .ok_or_else(|| VaultError::NotFound(format!("ssm parameter {name}")))?;
        if value == EMPTY_PARAMETER_VALUE {
            return Ok(SecretValue::from_bytes(Vec::new()));
        }

        let ciphertext = general_purpose::STANDARD
            .decode(value)
            .map_err(|e| VaultError::Decryption(format!("ssm parameter {name} is not base64: {e}")))?;

        self.decrypt(name, ciphertext).await
    }

    async fn set(&self, name: &str, value: &SecretValue) -> VaultResult<()> {
        let parameter = if value.is_empty() {
            EMPTY_PARAMETER_VALUE.to_string()
        } else {
            general_purpose::STANDARD.encode(self.encrypt(value).await?)
        };

        let result = self
            .ssm
            .put_parameter()
            .name(name)
            .description(PARAMETER_DESCRIPTION)
            .r#type(ParameterType::String)
            .overwrite(true)
            .value(parameter)
            .send()
            .await;

        LoggingTransformer::log_key_operation("set", name, result.is_ok());
        result
            .map(|_| ())
            .map_err(|err| VaultError::backend("aws-ssm", DisplayErrorContext(&err)))
    }

    async fn delete(&self, name: &str) -> VaultResult<()> {
        match self.ssm.delete_parameter().name(name).send().await {
            Ok(_) => {
                LoggingTransformer::log_key_operation("delete", name, true);
                Ok(())
            }
            Err(err) if err.as_service_error().is_some_and(|e| e.is_parameter_not_found()) => {
                debug!("ssm parameter already absent");
                Ok(())
            }
            Err(err) => {
                LoggingTransformer::log_key_operation("delete", name, false);
                Err(VaultError::backend("aws-ssm", DisplayErrorContext(&err)))
            }
        }
    }

    fn clean(&mut self) {
        if let Some(mut creds) = self.credentials.take() {
            creds.zeroize();
            log_security_event(SecurityEvent::CredentialsReleased, "aws-kms-ssm", true);
        }
    }

    fn provider(&self) -> &'static str {
        "aws-kms-ssm"
    }

    fn naming(&self) -> &KeyNaming {
        &self.naming
    }
}
