use kvault_common::LoggingTransformer;
use log::{info, warn};
use std::time::{SystemTime, UNIX_EPOCH};

/// Security-relevant events emitted by the key stores and the rotation engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityEvent {
    KeyWritten,
    KeyDeleted,
    KeyMigrated,
    RootTokenGenerated,
    RootTokenRevoked,
    RootTokenRotated,
    CredentialsReleased,
}

impl SecurityEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEvent::KeyWritten => "KEY_WRITTEN",
            SecurityEvent::KeyDeleted => "KEY_DELETED",
            SecurityEvent::KeyMigrated => "KEY_MIGRATED",
            SecurityEvent::RootTokenGenerated => "ROOT_TOKEN_GENERATED",
            SecurityEvent::RootTokenRevoked => "ROOT_TOKEN_REVOKED",
            SecurityEvent::RootTokenRotated => "ROOT_TOKEN_ROTATED",
            SecurityEvent::CredentialsReleased => "CREDENTIALS_RELEASED",
        }
    }
}

/// Event details naming a stored key by its hash
pub fn key_details(kind: &str, key_name: &str) -> String {
    format!("{kind} (key_hash: {})", LoggingTransformer::secure_hash_key(key_name))
}

/// Logs a security-relevant event with standardized formatting
///
/// `details` must never carry a secret value. Key names go through
/// [`key_details`].
pub fn log_security_event(event: SecurityEvent, details: &str, success: bool) {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    if success {
        info!("[{timestamp}] SUCCESS - {}: {details}", event.as_str());
    } else {
        warn!("[{timestamp}] FAILURE - {}: {details}", event.as_str());
    }
}
