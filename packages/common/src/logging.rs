//! Structured logging infrastructure
//!
//! Provides env_logger-based logging with secure handling of sensitive data
//! and proper integration with the standard log crate.

use log::{debug, error, info, warn};
use sha2::{Digest, Sha256};
use std::sync::Once;
use std::time::Duration;

static INIT_LOGGER: Once = Once::new();

/// Logging infrastructure using `env_logger`
pub struct LoggingTransformer;

impl LoggingTransformer {
    /// Initialize logging system (should be called once at application startup)
    ///
    /// Configure logging levels via `RUST_LOG` environment variable:
    /// - `RUST_LOG=debug` - Enable all debug logs
    /// - `RUST_LOG=info` - Enable info and above
    /// - `RUST_LOG=kvault_keys=debug` - Module-specific levels
    ///
    /// Defaults to `warn` so that command output on stdout stays clean.
    pub fn init() {
        INIT_LOGGER.call_once(|| {
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
                .format_timestamp_micros()
                .init();

            debug!("Structured logging initialized");
        });
    }

    /// Initialize logging for test environments
    ///
    /// Use this in test modules to avoid initialization conflicts
    pub fn init_test() {
        let _ = env_logger::Builder::from_default_env()
            .is_test(true)
            .try_init();
    }

    /// Log key store operations with secure key handling
    ///
    /// Key names are hashed using SHA-256; values are never passed here.
    pub fn log_key_operation(operation: &str, key_name: &str, success: bool) {
        let key_hash = Self::secure_hash_key(key_name);
        if success {
            info!("Key operation succeeded: {operation} (key_hash: {key_hash})");
        } else {
            warn!("Key operation failed: {operation} (key_hash: {key_hash})");
        }
    }

    /// Log a backend construction event (which unsealing mode was selected)
    pub fn log_backend_selected(mode: &str, namespace: &str, server: &str) {
        info!("Using {mode} key store for vaultserver {namespace}/{server}");
    }

    /// Log remote calls against the Vault API
    pub fn log_vault_api_call(method: &str, path: &str, status: Option<u16>) {
        match status {
            Some(status) => debug!("Vault API: {method} {path} -> {status}"),
            None => debug!("Vault API: {method} {path}"),
        }
    }

    /// Secure logging of cryptographic errors
    ///
    /// Logs error types without exposing sensitive data
    pub fn log_crypto_error(operation: &str, error: &dyn std::error::Error) {
        error!(
            "Cryptographic operation failed: {} (error_type: {})",
            operation,
            std::any::type_name_of_val(error)
        );
    }

    /// Log cleanup events with error context
    pub fn log_cleanup_warning(component: &str, error: &dyn std::error::Error) {
        warn!("Component cleanup failed: {component} ({error})");
    }

    /// Log a bounded retry step (e.g. purge polling)
    pub fn log_retry(operation: &str, attempt: u32, max_attempts: u32, backoff: Duration) {
        debug!("Retry {attempt}/{max_attempts} for {operation}, next attempt in {backoff:?}");
    }

    /// Cryptographically secure key hashing for logging
    ///
    /// Returns first 12 characters of hex-encoded hash for readability.
    pub fn secure_hash_key(key: &str) -> String {
        let hash = Sha256::digest(key.as_bytes());
        let hex_hash = format!("{hash:x}");
        format!("#{}", &hex_hash[..12])
    }
}
