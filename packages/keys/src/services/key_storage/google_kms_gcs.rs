//! Google Cloud KMS + Cloud Storage
//!
//! Each key is a GCS object holding the raw KMS ciphertext. Decryption
//! responses are checked against their CRC32C so corruption in transit
//! surfaces as a decryption failure instead of a wrong value.
//!
//! KMS refuses empty plaintext, so an empty key is a zero-length object that
//! bypasses KMS in both directions.

use super::TokenKeyStore;
use crate::config::GoogleCredentials;
use crate::descriptor::GoogleKmsGcsSpec;
use crate::error::{VaultError, VaultResult};
use crate::logging::{log_security_event, SecurityEvent};
use crate::naming::KeyNaming;
use crate::secret::SecretValue;
use base64::{engine::general_purpose, Engine as _};
use gcp_auth::{CustomServiceAccount, TokenProvider};
use kvault_common::LoggingTransformer;
use log::{debug, warn};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use zeroize::Zeroize;

pub const DEFAULT_STORAGE_ENDPOINT: &str = "https://storage.googleapis.com";
pub const DEFAULT_KMS_ENDPOINT: &str = "https://cloudkms.googleapis.com";
const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const APPLICATION_CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Where bearer tokens come from
#[derive(Clone)]
pub enum GoogleAuth {
    Provider(Arc<dyn TokenProvider>),
    /// Pre-issued access token (emulators, tests)
    Bearer(SecretValue),
}

impl GoogleAuth {
    /// Service-account JSON from the referenced secret, else ambient credentials
    pub async fn from_credentials(credentials: &GoogleCredentials) -> VaultResult<Self> {
        match &credentials.service_account_json {
            Some(json) => {
                let account = CustomServiceAccount::from_json(json.expose_as_str()?).map_err(|e| {
                    VaultError::Configuration(format!("invalid service account key: {e}"))
                })?;
                Ok(GoogleAuth::Provider(Arc::new(account)))
            }
            None => {
                if std::env::var_os(APPLICATION_CREDENTIALS_ENV).is_none() {
                    warn!("WARNING!!! missing env variable {APPLICATION_CREDENTIALS_ENV}");
                }
                let provider = gcp_auth::provider()
                    .await
                    .map_err(|e| VaultError::backend("google-auth", e))?;
                Ok(GoogleAuth::Provider(provider))
            }
        }
    }

    async fn token(&self) -> VaultResult<SecretValue> {
        match self {
            GoogleAuth::Provider(provider) => {
                let token = provider
                    .token(&[CLOUD_PLATFORM_SCOPE])
                    .await
                    .map_err(|e| VaultError::backend("google-auth", e))?;
                Ok(SecretValue::from(token.as_str()))
            }
            GoogleAuth::Bearer(token) => Ok(token.clone()),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncryptResponse {
    ciphertext: String,
    #[serde(default)]
    verified_plaintext_crc32c: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecryptResponse {
    #[serde(default)]
    plaintext: String,
    /// int64 encoded as a JSON string
    plaintext_crc32c: Option<String>,
}

pub struct GoogleKmsGcsStore {
    http: Client,
    auth: Option<GoogleAuth>,
    bucket: String,
    crypto_key: String,
    storage_endpoint: String,
    kms_endpoint: String,
    naming: KeyNaming,
}

impl GoogleKmsGcsStore {
    pub fn new(http: Client, spec: &GoogleKmsGcsSpec, auth: GoogleAuth, naming: KeyNaming) -> Self {
        Self {
            http,
            auth: Some(auth),
            bucket: spec.bucket.clone(),
            crypto_key: spec.crypto_key_name(),
            storage_endpoint: DEFAULT_STORAGE_ENDPOINT.to_string(),
            kms_endpoint: DEFAULT_KMS_ENDPOINT.to_string(),
            naming,
        }
    }

    pub fn with_endpoints(mut self, storage: &str, kms: &str) -> Self {
        self.storage_endpoint = storage.trim_end_matches('/').to_string();
        self.kms_endpoint = kms.trim_end_matches('/').to_string();
        self
    }

    async fn token(&self) -> VaultResult<SecretValue> {
        match &self.auth {
            Some(auth) => auth.token().await,
            None => Err(VaultError::backend("google-auth", "credentials already released")),
        }
    }

    fn object_url(&self, name: &str) -> VaultResult<Url> {
        let mut url = Url::parse(&self.storage_endpoint)
            .map_err(|e| VaultError::Configuration(format!("invalid storage endpoint: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| VaultError::Configuration("storage endpoint cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["storage", "v1", "b", self.bucket.as_str(), "o", name]);
        Ok(url)
    }

    fn upload_url(&self) -> VaultResult<Url> {
        let mut url = Url::parse(&self.storage_endpoint)
            .map_err(|e| VaultError::Configuration(format!("invalid storage endpoint: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| VaultError::Configuration("storage endpoint cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["upload", "storage", "v1", "b", self.bucket.as_str(), "o"]);
        Ok(url)
    }

    fn kms_url(&self, method: &str) -> String {
        format!("{}/v1/{}:{method}", self.kms_endpoint, self.crypto_key)
    }

    async fn send(&self, request: reqwest::RequestBuilder, provider: &str) -> VaultResult<reqwest::Response> {
        let token = self.token().await?;
        request
            .bearer_auth(token.expose_as_str()?)
            .send()
            .await
            .map_err(|e| VaultError::backend(provider, e))
    }

    async fn decrypt(&self, ciphertext: &[u8]) -> VaultResult<SecretValue> {
        let body = json!({
            "ciphertext": general_purpose::STANDARD.encode(ciphertext),
            "ciphertextCrc32c": crc32c::crc32c(ciphertext).to_string(),
        });
        let response = self.send(self.http.post(self.kms_url("decrypt")).json(&body), "google-kms").await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::BAD_REQUEST => {
                    VaultError::Decryption(format!("failed to decrypt ciphertext: {body}"))
                }
                _ => VaultError::from_status("google-kms", &self.crypto_key, status.as_u16(), &body),
            });
        }

        let mut decrypted: DecryptResponse = response.json().await?;
        let plaintext = general_purpose::STANDARD.decode(decrypted.plaintext.as_bytes());
        decrypted.plaintext.zeroize();
        let plaintext = SecretValue::from_bytes(
            plaintext.map_err(|e| VaultError::Decryption(format!("kms plaintext is not base64: {e}")))?,
        );

        let expected = decrypted
            .plaintext_crc32c
            .as_deref()
            .and_then(|crc| crc.parse::<u32>().ok());
        if expected != Some(crc32c::crc32c(plaintext.expose_secret())) {
            return Err(VaultError::Decryption(
                "decrypt response corrupted in-transit".to_string(),
            ));
        }
        Ok(plaintext)
    }

    async fn encrypt(&self, value: &SecretValue) -> VaultResult<Vec<u8>> {
        let body = json!({
            "plaintext": general_purpose::STANDARD.encode(value.expose_secret()),
            "plaintextCrc32c": crc32c::crc32c(value.expose_secret()).to_string(),
        });
        let response = self.send(self.http.post(self.kms_url("encrypt")).json(&body), "google-kms").await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VaultError::Encryption(format!(
                "error encrypting data, status {status}: {body}"
            )));
        }

        let encrypted: EncryptResponse = response.json().await?;
        if !encrypted.verified_plaintext_crc32c {
            return Err(VaultError::Encryption(
                "encrypt request corrupted in-transit".to_string(),
            ));
        }
        general_purpose::STANDARD
            .decode(encrypted.ciphertext.as_bytes())
            .map_err(|e| VaultError::Encryption(format!("kms ciphertext is not base64: {e}")))
    }
}

impl TokenKeyStore for GoogleKmsGcsStore {
    async fn get(&self, name: &str) -> VaultResult<SecretValue> {
        let request = self.http.get(self.object_url(name)?).query(&[("alt", "media")]);
        let response = self.send(request, "gcs").await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VaultError::from_status(
                "gcs",
                &format!("object {name} in bucket {}", self.bucket),
                status.as_u16(),
                &body,
            ));
        }

        let ciphertext = response.bytes().await?;
        if ciphertext.is_empty() {
            return Ok(SecretValue::from_bytes(Vec::new()));
        }
        self.decrypt(&ciphertext).await
    }

    async fn set(&self, name: &str, value: &SecretValue) -> VaultResult<()> {
        let ciphertext = if value.is_empty() {
            Vec::new()
        } else {
            self.encrypt(value).await?
        };

        let request = self
            .http
            .post(self.upload_url()?)
            .query(&[("uploadType", "media"), ("name", name)])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(ciphertext);
        let response = self.send(request, "gcs").await?;

        let status = response.status();
        LoggingTransformer::log_key_operation("set", name, status.is_success());
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VaultError::backend(
                "gcs",
                format!("error writing key to gcs bucket {}, status {status}: {body}", self.bucket),
            ));
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> VaultResult<()> {
        let response = self.send(self.http.delete(self.object_url(name)?), "gcs").await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            debug!("gcs object already absent");
            return Ok(());
        }
        LoggingTransformer::log_key_operation("delete", name, status.is_success());
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VaultError::backend(
                "gcs",
                format!("failed to delete key, status {status}: {body}"),
            ));
        }
        Ok(())
    }

    fn clean(&mut self) {
        if let Some(GoogleAuth::Bearer(mut token)) = self.auth.take() {
            token.zeroize();
        }
        log_security_event(SecurityEvent::CredentialsReleased, "google-kms-gcs", true);
    }

    fn provider(&self) -> &'static str {
        "google-kms-gcs"
    }

    fn naming(&self) -> &KeyNaming {
        &self.naming
    }
}
