//! Azure Key Vault secrets over the REST API
//!
//! Secret names may not contain `.`, so every name is stored with dots
//! replaced by dashes. Values are base64 with content type `password`.
//! Key Vault soft-deletes, so `delete` purges afterwards with bounded polling.

use super::TokenKeyStore;
use crate::config::{AzureCredentials, PurgePolicy};
use crate::error::{VaultError, VaultResult};
use crate::logging::{log_security_event, SecurityEvent};
use crate::naming::KeyNaming;
use crate::secret::SecretValue;
use base64::{engine::general_purpose, Engine as _};
use kvault_common::LoggingTransformer;
use log::debug;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use zeroize::Zeroize;

pub const DEFAULT_LOGIN_ENDPOINT: &str = "https://login.microsoftonline.com";
const API_VERSION: &str = "7.4";
const VAULT_SCOPE: &str = "https://vault.azure.net/.default";
const CONTENT_TYPE_PASSWORD: &str = "password";

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecretBundle {
    value: String,
    #[serde(default)]
    content_type: Option<String>,
}

pub struct AzureKeyVaultStore {
    http: Client,
    vault_base_url: String,
    login_endpoint: String,
    credentials: AzureCredentials,
    purge: PurgePolicy,
    access_token: Mutex<Option<SecretValue>>,
    naming: KeyNaming,
}

/// Key Vault secret names allow only alphanumerics and dashes
pub fn secret_name(name: &str) -> String {
    name.replace('.', "-")
}

impl AzureKeyVaultStore {
    pub fn new(
        http: Client,
        vault_base_url: &str,
        credentials: AzureCredentials,
        purge: PurgePolicy,
        naming: KeyNaming,
    ) -> Self {
        Self {
            http,
            vault_base_url: vault_base_url.trim_end_matches('/').to_string(),
            login_endpoint: DEFAULT_LOGIN_ENDPOINT.to_string(),
            credentials,
            purge,
            access_token: Mutex::new(None),
            naming,
        }
    }

    /// Override the Azure AD authority (sovereign clouds, tests)
    pub fn with_login_endpoint(mut self, endpoint: &str) -> Self {
        self.login_endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    fn secret_url(&self, collection: &str, name: &str) -> String {
        format!("{}/{collection}/{}", self.vault_base_url, secret_name(name))
    }

    /// Client-credentials token for Key Vault, cached for the store's lifetime
    async fn token(&self) -> VaultResult<SecretValue> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }

        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.login_endpoint, self.credentials.tenant_id
        );
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.expose_as_str()?),
            ("scope", VAULT_SCOPE),
        ];

        let response = self
            .http
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| VaultError::backend("azure-ad", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VaultError::backend(
                "azure-ad",
                format!("token request failed with status {status}: {body}"),
            ));
        }

        let token: TokenResponse = response.json().await?;
        let token = SecretValue::from_string(token.access_token);
        *self.access_token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        Ok(token)
    }

    fn cached_token(&self) -> Option<SecretValue> {
        self.access_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> VaultResult<reqwest::Response> {
        let token = self.token().await?;
        request
            .query(&[("api-version", API_VERSION)])
            .bearer_auth(token.expose_as_str()?)
            .send()
            .await
            .map_err(|e| VaultError::backend("azure-key-vault", e))
    }

    async fn purge(&self, name: &str) -> VaultResult<()> {
        let url = self.secret_url("deletedsecrets", name);
        let mut last_error = None;

        for attempt in 1..=self.purge.attempts.max(1) {
            let response = self.send(self.http.delete(&url)).await?;
            let status = response.status();
            if status.is_success() {
                return Ok(());
            }

            // 409 while the delete is still in progress, 404 until it lands
            let body = response.text().await.unwrap_or_default();
            last_error = Some(VaultError::backend(
                "azure-key-vault",
                format!("purge of {} failed with status {status}: {body}", secret_name(name)),
            ));

            if attempt < self.purge.attempts {
                LoggingTransformer::log_retry("purge", attempt, self.purge.attempts, self.purge.interval());
                tokio::time::sleep(self.purge.interval()).await;
            }
        }

        Err(last_error.unwrap_or_else(|| VaultError::backend("azure-key-vault", "purge not attempted")))
    }
}

impl TokenKeyStore for AzureKeyVaultStore {
    async fn get(&self, name: &str) -> VaultResult<SecretValue> {
        let response = self.send(self.http.get(self.secret_url("secrets", name))).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VaultError::from_status(
                "azure-key-vault",
                &format!("secret {}", secret_name(name)),
                status.as_u16(),
                &body,
            ));
        }

        let mut bundle: SecretBundle = response.json().await?;
        if bundle.content_type.as_deref() != Some(CONTENT_TYPE_PASSWORD) {
            bundle.value.zeroize();
            return Err(VaultError::Decryption(format!(
                "content type not matched with {}",
                bundle.content_type.unwrap_or_default()
            )));
        }

        let decoded = general_purpose::STANDARD.decode(bundle.value.as_bytes());
        bundle.value.zeroize();
        decoded
            .map(SecretValue::from_bytes)
            .map_err(|e| VaultError::Decryption(format!("secret value is not base64: {e}")))
    }

    async fn set(&self, name: &str, value: &SecretValue) -> VaultResult<()> {
        let mut bundle = SecretBundle {
            value: general_purpose::STANDARD.encode(value.expose_secret()),
            content_type: Some(CONTENT_TYPE_PASSWORD.to_string()),
        };
        let result = self
            .send(self.http.put(self.secret_url("secrets", name)).json(&bundle))
            .await;
        bundle.value.zeroize();

        let response = result?;
        let status = response.status();
        LoggingTransformer::log_key_operation("set", name, status.is_success());
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VaultError::backend(
                "azure-key-vault",
                format!("unable to set secret in key vault, status {status}: {body}"),
            ));
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> VaultResult<()> {
        let response = self.send(self.http.delete(self.secret_url("secrets", name))).await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            debug!("azure secret already absent");
            return Ok(());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            LoggingTransformer::log_key_operation("delete", name, false);
            return Err(VaultError::backend(
                "azure-key-vault",
                format!("delete failed with status {status}: {body}"),
            ));
        }

        let result = self.purge(name).await;
        LoggingTransformer::log_key_operation("delete", name, result.is_ok());
        result
    }

    fn clean(&mut self) {
        self.credentials.zeroize();
        if let Some(mut token) = self
            .access_token
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            token.zeroize();
        }
        log_security_event(SecurityEvent::CredentialsReleased, "azure-key-vault", true);
    }

    fn provider(&self) -> &'static str {
        "azure-key-vault"
    }

    fn naming(&self) -> &KeyNaming {
        &self.naming
    }
}
