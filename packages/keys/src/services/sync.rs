//! Naming migrator
//!
//! Copies keys that only exist under their legacy name to their current
//! name. The current copy is always written before the legacy copy is
//! (optionally) deleted, so a failure leaves at least one copy in place.
//! With `delete_legacy`, an already-synced key still has its legacy copy
//! removed, so a re-run finishes a migration whose delete failed.

use super::key_storage::TokenKeyStore;
use crate::error::VaultResult;
use crate::logging::{log_security_event, SecurityEvent};
use log::{debug, warn};
use std::fmt;

/// A logical secret, independent of naming epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalKey {
    RootToken,
    UnsealKey(i64),
}

impl LogicalKey {
    pub fn current_name<S: TokenKeyStore>(&self, store: &S) -> VaultResult<String> {
        match self {
            LogicalKey::RootToken => store.new_token_name(),
            LogicalKey::UnsealKey(id) => store.new_unseal_key_name(*id),
        }
    }

    pub fn legacy_name<S: TokenKeyStore>(&self, store: &S) -> VaultResult<String> {
        match self {
            LogicalKey::RootToken => store.old_token_name(),
            LogicalKey::UnsealKey(id) => store.old_unseal_key_name(*id),
        }
    }
}

impl fmt::Display for LogicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalKey::RootToken => write!(f, "root-token"),
            LogicalKey::UnsealKey(id) => write!(f, "unseal-key-{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Remove the legacy entry once the current one is written
    pub delete_legacy: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    AlreadySynced { name: String, legacy_deleted: bool },
    Synced { from: String, to: String, legacy_deleted: bool },
}

/// Migrate one logical key.
///
/// A current entry short-circuits the migration. Absence of the legacy entry
/// is reported as the legacy lookup's error. Errors other than `NotFound` on
/// the current lookup are propagated rather than treated as absence.
pub async fn sync_key<S: TokenKeyStore>(
    store: &S,
    key: LogicalKey,
    options: SyncOptions,
) -> VaultResult<SyncOutcome> {
    let current = key.current_name(store)?;
    match store.get(&current).await {
        Ok(_) => {
            debug!("{key} already stored under its current name");
            let legacy_deleted = options.delete_legacy && delete_legacy(store, key).await;
            return Ok(SyncOutcome::AlreadySynced {
                name: current,
                legacy_deleted,
            });
        }
        Err(err) if err.is_not_found() => {}
        Err(err) => return Err(err),
    }

    let legacy = key.legacy_name(store)?;
    let value = store.get(&legacy).await?;
    store.set(&current, &value).await?;
    log_security_event(SecurityEvent::KeyMigrated, &format!("{key} copied to its current name"), true);

    let legacy_deleted = options.delete_legacy && delete_legacy(store, key).await;

    Ok(SyncOutcome::Synced {
        from: legacy,
        to: current,
        legacy_deleted,
    })
}

/// Remove the legacy copy once a current copy exists.
///
/// Failure is logged and reported as `false`; the key itself is synced.
async fn delete_legacy<S: TokenKeyStore>(store: &S, key: LogicalKey) -> bool {
    let result = match key.legacy_name(store) {
        Ok(legacy) => store.delete(&legacy).await,
        Err(err) => Err(err),
    };
    match result {
        Ok(()) => true,
        Err(err) => {
            warn!("{key} synced but its legacy copy was not deleted: {err}");
            false
        }
    }
}

/// Per-key results of a full migration run
#[derive(Debug, Default)]
pub struct SyncReport {
    pub results: Vec<(LogicalKey, VaultResult<SyncOutcome>)>,
}

impl SyncReport {
    pub fn has_failures(&self) -> bool {
        self.results.iter().any(|(_, result)| result.is_err())
    }
}

/// Migrate the root token and every unseal-key share.
///
/// One key failing does not stop the others; the report carries each result.
pub async fn sync_all<S: TokenKeyStore>(store: &S, options: SyncOptions) -> SyncReport {
    let keys = std::iter::once(LogicalKey::RootToken)
        .chain((0..store.secret_shares()).map(LogicalKey::UnsealKey));

    let mut report = SyncReport::default();
    for key in keys {
        let result = sync_key(store, key, options).await;
        if let Err(err) = &result {
            warn!("sync of {key} failed: {err}");
        }
        report.results.push((key, result));
    }
    report
}
