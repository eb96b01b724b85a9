//! Plaintext secret values held in memory
//!
//! A [`SecretValue`] is the decrypted form of a stored root token or unseal
//! key. The buffer is zeroized on drop and never shows up in `Debug` output.

use crate::error::{VaultError, VaultResult};
use std::fmt;
use zeroize::{Zeroize, Zeroizing};

#[derive(Clone, PartialEq, Eq, Default)]
pub struct SecretValue {
    inner: Zeroizing<Vec<u8>>,
}

impl SecretValue {
    /// Creates a SecretValue from raw bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            inner: Zeroizing::new(bytes),
        }
    }

    /// Creates a SecretValue from a String (converts to UTF-8 bytes).
    pub fn from_string(s: String) -> Self {
        Self::from_bytes(s.into_bytes())
    }

    /// Exposes the underlying bytes temporarily. Use with caution.
    pub fn expose_secret(&self) -> &[u8] {
        &self.inner
    }

    /// Interprets the bytes as UTF-8; tokens and unseal keys are always text.
    pub fn expose_as_str(&self) -> VaultResult<&str> {
        std::str::from_utf8(&self.inner)
            .map_err(|e| VaultError::Decryption(format!("stored value is not valid UTF-8: {e}")))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl From<&str> for SecretValue {
    fn from(s: &str) -> Self {
        Self::from_bytes(s.as_bytes().to_vec())
    }
}

impl From<String> for SecretValue {
    fn from(s: String) -> Self {
        Self::from_string(s)
    }
}

impl From<Vec<u8>> for SecretValue {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}

impl Zeroize for SecretValue {
    fn zeroize(&mut self) {
        self.inner.zeroize();
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretValue([REDACTED; {} bytes])", self.inner.len())
    }
}
