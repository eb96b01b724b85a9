//! Test doubles shared by the integration tests

#![allow(dead_code)]

use base64::{engine::general_purpose, Engine as _};
use kvault_keys::error::{VaultError, VaultResult};
use kvault_keys::naming::{KeyNaming, KeyPrefix};
use kvault_keys::secret::SecretValue;
use kvault_keys::services::TokenKeyStore;
use kvault_keys::vault_client::{RootGenerationAttempt, RootGenerationProgress, RootTokenApi};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Ordered record of store and Vault calls, shared between the doubles
#[derive(Clone, Default)]
pub struct OpLog(Arc<Mutex<Vec<String>>>);

impl OpLog {
    pub fn push(&self, op: impl Into<String>) {
        self.0.lock().unwrap().push(op.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn contains(&self, op: &str) -> bool {
        self.0.lock().unwrap().iter().any(|entry| entry == op)
    }
}

/// In-memory key store recording every call
pub struct RecordingStore {
    naming: KeyNaming,
    entries: Mutex<HashMap<String, SecretValue>>,
    unavailable: HashSet<String>,
    log: OpLog,
}

impl RecordingStore {
    /// Store with key prefix `p` and `shares` unseal-key shares
    pub fn new(shares: i64, log: OpLog) -> Self {
        Self {
            naming: KeyNaming::new(KeyPrefix::new("p"), "", shares),
            entries: Mutex::new(HashMap::new()),
            unavailable: HashSet::new(),
            log,
        }
    }

    pub fn with_entry(self, name: &str, value: &str) -> Self {
        self.entries
            .lock()
            .unwrap()
            .insert(name.to_string(), SecretValue::from(value));
        self
    }

    /// Make `get(name)` fail with a backend error
    pub fn with_unavailable(mut self, name: &str) -> Self {
        self.unavailable.insert(name.to_string());
        self
    }

    pub fn value(&self, name: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap()
            .get(name)
            .map(|v| v.expose_as_str().unwrap().to_string())
    }
}

impl TokenKeyStore for RecordingStore {
    async fn get(&self, name: &str) -> VaultResult<SecretValue> {
        self.log.push(format!("get:{name}"));
        if self.unavailable.contains(name) {
            return Err(VaultError::BackendUnavailable(format!("{name} unreachable")));
        }
        self.entries
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(name.to_string()))
    }

    async fn set(&self, name: &str, value: &SecretValue) -> VaultResult<()> {
        self.log.push(format!("set:{name}"));
        self.entries.lock().unwrap().insert(name.to_string(), value.clone());
        Ok(())
    }

    async fn delete(&self, name: &str) -> VaultResult<()> {
        self.log.push(format!("delete:{name}"));
        self.entries.lock().unwrap().remove(name);
        Ok(())
    }

    fn clean(&mut self) {
        self.log.push("clean");
    }

    fn provider(&self) -> &'static str {
        "recording"
    }

    fn naming(&self) -> &KeyNaming {
        &self.naming
    }
}

/// Vault double running the generate-root exchange in memory
pub struct FakeVault {
    log: OpLog,
    required: u32,
    new_token: String,
    otp: String,
    submitted: Mutex<Vec<String>>,
    revoke_fails: bool,
}

impl FakeVault {
    pub fn new(required: u32, new_token: &str, log: OpLog) -> Self {
        let otp = (0..new_token.len()).map(|i| char::from(b'A' + (i % 26) as u8)).collect();
        Self {
            log,
            required,
            new_token: new_token.to_string(),
            otp,
            submitted: Mutex::new(Vec::new()),
            revoke_fails: false,
        }
    }

    pub fn failing_revoke(mut self) -> Self {
        self.revoke_fails = true;
        self
    }

    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }

    fn encoded_token(&self) -> String {
        let xored: Vec<u8> = self
            .new_token
            .bytes()
            .zip(self.otp.bytes())
            .map(|(t, o)| t ^ o)
            .collect();
        general_purpose::STANDARD.encode(xored)
    }
}

impl RootTokenApi for FakeVault {
    async fn generate_root_init(&self) -> VaultResult<RootGenerationAttempt> {
        self.log.push("init");
        Ok(RootGenerationAttempt {
            nonce: "nonce-1".to_string(),
            otp: SecretValue::from(self.otp.as_str()),
            required: self.required,
        })
    }

    async fn generate_root_update(&self, key: &SecretValue, nonce: &str) -> VaultResult<RootGenerationProgress> {
        assert_eq!(nonce, "nonce-1");
        self.log.push("update");
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(key.expose_as_str()?.to_string());

        let progress = submitted.len() as u32;
        let complete = progress >= self.required;
        Ok(RootGenerationProgress {
            progress,
            required: self.required,
            complete,
            encoded_token: if complete { self.encoded_token() } else { String::new() },
        })
    }

    async fn generate_root_cancel(&self) -> VaultResult<()> {
        self.log.push("cancel");
        Ok(())
    }

    async fn revoke_token(&self, token: &SecretValue) -> VaultResult<()> {
        self.log.push(format!("revoke:{}", token.expose_as_str()?));
        if self.revoke_fails {
            return Err(VaultError::VaultApi {
                status: 403,
                errors: vec!["permission denied".to_string()],
            });
        }
        Ok(())
    }
}

/// Store holding a root token and shares `0..shares` under current names
pub fn seeded_store(shares: i64, log: OpLog) -> RecordingStore {
    let mut store = RecordingStore::new(shares, log).with_entry("p-root-token", "s.old-token");
    for id in 0..shares {
        store = store.with_entry(&format!("p-unseal-key-{id}"), &format!("share-{id}"));
    }
    store
}
