//! Minimal Vault HTTP client for root-token generation and revocation
//!
//! ```text
//! PUT    /v1/sys/generate-root/attempt   start, returns nonce + OTP
//! PUT    /v1/sys/generate-root/update    submit one unseal key
//! DELETE /v1/sys/generate-root/attempt   cancel
//! POST   /v1/auth/token/revoke           revoke a token (authenticated as itself)
//! ```

use crate::error::{VaultError, VaultResult};
use crate::secret::SecretValue;
use base64::{engine::general_purpose, Engine as _};
use kvault_common::LoggingTransformer;
use reqwest::{Certificate, Client, Method};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use zeroize::Zeroize;

const GENERATE_ROOT_ATTEMPT: &str = "sys/generate-root/attempt";
const GENERATE_ROOT_UPDATE: &str = "sys/generate-root/update";
const TOKEN_REVOKE: &str = "auth/token/revoke";
const TOKEN_HEADER: &str = "X-Vault-Token";

/// A started root-generation attempt
#[derive(Debug)]
pub struct RootGenerationAttempt {
    pub nonce: String,
    pub otp: SecretValue,
    pub required: u32,
}

/// Status after submitting one unseal key
#[derive(Debug, Clone)]
pub struct RootGenerationProgress {
    pub progress: u32,
    pub required: u32,
    pub complete: bool,
    /// base64 of the root token XORed with the OTP, set once complete
    pub encoded_token: String,
}

/// The part of Vault's API the rotation engine needs
pub trait RootTokenApi {
    async fn generate_root_init(&self) -> VaultResult<RootGenerationAttempt>;

    async fn generate_root_update(&self, key: &SecretValue, nonce: &str) -> VaultResult<RootGenerationProgress>;

    async fn generate_root_cancel(&self) -> VaultResult<()>;

    /// Revoke `token`, authenticating with that same token
    async fn revoke_token(&self, token: &SecretValue) -> VaultResult<()>;
}

#[derive(Deserialize)]
struct GenerateRootResponse {
    #[serde(default)]
    nonce: String,
    #[serde(default)]
    progress: u32,
    #[serde(default)]
    required: u32,
    #[serde(default)]
    complete: bool,
    #[serde(default)]
    encoded_token: String,
    #[serde(default)]
    encoded_root_token: String,
    #[serde(default)]
    otp: String,
}

/// TLS and timeout options for [`HttpVaultClient`]
#[derive(Debug, Clone, Default)]
pub struct VaultClientOptions {
    pub tls_skip_verify: bool,
    pub ca_cert: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

pub struct HttpVaultClient {
    client: Client,
    vault_addr: String,
}

impl HttpVaultClient {
    pub fn new(vault_addr: &str, options: &VaultClientOptions) -> VaultResult<Self> {
        let mut builder = Client::builder();
        if options.tls_skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(path) = &options.ca_cert {
            let pem = std::fs::read(path)?;
            let cert = Certificate::from_pem(&pem)
                .map_err(|e| VaultError::Configuration(format!("invalid CA bundle {}: {e}", path.display())))?;
            builder = builder.add_root_certificate(cert);
        }
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            vault_addr: vault_addr.trim_end_matches('/').to_string(),
        })
    }

    pub fn vault_addr(&self) -> &str {
        &self.vault_addr
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.vault_addr)
    }

    async fn call(&self, method: Method, path: &str, body: Option<Value>, token: Option<&SecretValue>) -> VaultResult<reqwest::Response> {
        let mut request = self.client.request(method.clone(), self.url(path));
        if let Some(token) = token {
            request = request.header(TOKEN_HEADER, token.expose_as_str()?);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        LoggingTransformer::log_vault_api_call(method.as_str(), path, Some(status.as_u16()));

        if status.is_success() {
            return Ok(response);
        }
        let errors = parse_vault_errors(response).await;
        Err(VaultError::VaultApi {
            status: status.as_u16(),
            errors,
        })
    }
}

async fn parse_vault_errors(response: reqwest::Response) -> Vec<String> {
    response
        .json::<Value>()
        .await
        .ok()
        .and_then(|v| {
            v.get("errors")?.as_array().map(|arr| {
                arr.iter()
                    .filter_map(|e| e.as_str().map(String::from))
                    .collect()
            })
        })
        .unwrap_or_default()
}

impl RootTokenApi for HttpVaultClient {
    async fn generate_root_init(&self) -> VaultResult<RootGenerationAttempt> {
        let response = self
            .call(Method::PUT, GENERATE_ROOT_ATTEMPT, Some(json!({})), None)
            .await?;
        let mut status: GenerateRootResponse = response.json().await?;

        if status.otp.is_empty() {
            return Err(VaultError::VaultApi {
                status: 200,
                errors: vec!["generate-root attempt returned no OTP".to_string()],
            });
        }
        let otp = SecretValue::from(status.otp.as_str());
        status.otp.zeroize();

        Ok(RootGenerationAttempt {
            nonce: status.nonce,
            otp,
            required: status.required,
        })
    }

    async fn generate_root_update(&self, key: &SecretValue, nonce: &str) -> VaultResult<RootGenerationProgress> {
        let body = json!({ "key": key.expose_as_str()?, "nonce": nonce });
        let response = self.call(Method::PUT, GENERATE_ROOT_UPDATE, Some(body), None).await?;
        let status: GenerateRootResponse = response.json().await?;

        let encoded_token = if status.encoded_token.is_empty() {
            status.encoded_root_token
        } else {
            status.encoded_token
        };
        Ok(RootGenerationProgress {
            progress: status.progress,
            required: status.required,
            complete: status.complete,
            encoded_token,
        })
    }

    async fn generate_root_cancel(&self) -> VaultResult<()> {
        self.call(Method::DELETE, GENERATE_ROOT_ATTEMPT, None, None).await?;
        Ok(())
    }

    async fn revoke_token(&self, token: &SecretValue) -> VaultResult<()> {
        let body = json!({ "token": token.expose_as_str()? });
        self.call(Method::POST, TOKEN_REVOKE, Some(body), Some(token)).await?;
        Ok(())
    }
}

/// Recover the root token from Vault's encoded token and the attempt's OTP.
///
/// The encoded token is base64 (padded or not) of `token XOR otp`.
pub fn decode_root_token(encoded: &str, otp: &SecretValue) -> VaultResult<SecretValue> {
    let mut decoded = general_purpose::STANDARD_NO_PAD
        .decode(encoded.trim().trim_end_matches('='))
        .map_err(|e| VaultError::Decryption(format!("encoded root token is not base64: {e}")))?;

    let otp = otp.expose_secret();
    if decoded.len() != otp.len() {
        let lengths = (decoded.len(), otp.len());
        decoded.zeroize();
        return Err(VaultError::Decryption(format!(
            "length of encoded root token ({}) and OTP ({}) differ",
            lengths.0, lengths.1
        )));
    }

    for (byte, pad) in decoded.iter_mut().zip(otp) {
        *byte ^= pad;
    }
    Ok(SecretValue::from_bytes(decoded))
}
