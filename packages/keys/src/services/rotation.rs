//! Root-token generation and rotation
//!
//! Generation runs Vault's threshold root-generation exchange with shares
//! read from the key store. Rotation then replaces the stored root token:
//!
//! 1. read the stored token (must succeed)
//! 2. delete the stored entry
//! 3. revoke the old token, authenticated as itself
//! 4. write the new token under the current name
//!
//! A failure after step 2 is not compensated: the old entry stays deleted and
//! the new token is reported but not written, leaving the operator to store
//! it by hand. Nothing here locks across processes, so callers must serialize
//! rotation per Vault server.

use super::key_storage::TokenKeyStore;
use crate::error::{VaultError, VaultResult};
use crate::logging::{log_security_event, SecurityEvent};
use crate::secret::SecretValue;
use crate::vault_client::{decode_root_token, RootGenerationAttempt, RootTokenApi};
use kvault_common::LoggingTransformer;
use log::{debug, warn};

/// Progress of one rotation, kept to report what happened on failure
#[derive(Debug, Default)]
pub struct RotationState {
    pub old_token: Option<SecretValue>,
    pub new_token: Option<SecretValue>,
    pub old_entry_deleted: bool,
    pub old_token_revoked: bool,
    pub new_token_written: bool,
}

impl RotationState {
    /// One-line summary without secret values
    pub fn summary(&self) -> String {
        format!(
            "new token generated: {}, old entry deleted: {}, old token revoked: {}, new token written: {}",
            self.new_token.is_some(),
            self.old_entry_deleted,
            self.old_token_revoked,
            self.new_token_written
        )
    }
}

/// Generate a new root token from the stored unseal keys.
///
/// Shares are read in index order and submitted until `threshold` of them
/// were accepted or Vault reports completion. Missing shares are skipped;
/// any other read failure aborts. Once an attempt was started, failures
/// cancel it so that a later run can start afresh.
pub async fn generate_root_token<S, V>(store: &S, vault: &V, threshold: i64) -> VaultResult<SecretValue>
where
    S: TokenKeyStore,
    V: RootTokenApi,
{
    let required = usize::try_from(threshold)
        .ok()
        .filter(|k| *k > 0)
        .ok_or_else(|| VaultError::InvalidInput(format!("invalid secret threshold {threshold}")))?;

    let attempt = vault.generate_root_init().await?;
    if attempt.required != 0 && attempt.required as usize != required {
        warn!(
            "Vault requires {} shares, VaultServer secretThreshold is {required}",
            attempt.required
        );
    }

    match submit_shares(store, vault, &attempt, required).await {
        Ok(token) => {
            log_security_event(SecurityEvent::RootTokenGenerated, "root generation complete", true);
            Ok(token)
        }
        Err(err) => {
            if let Err(cancel_err) = vault.generate_root_cancel().await {
                LoggingTransformer::log_cleanup_warning("generate-root attempt", &cancel_err);
            }
            log_security_event(SecurityEvent::RootTokenGenerated, &err.to_string(), false);
            Err(err)
        }
    }
}

async fn submit_shares<S, V>(
    store: &S,
    vault: &V,
    attempt: &RootGenerationAttempt,
    required: usize,
) -> VaultResult<SecretValue>
where
    S: TokenKeyStore,
    V: RootTokenApi,
{
    let mut submitted = 0;

    for id in 0..store.secret_shares() {
        if submitted >= required {
            break;
        }

        let name = store.new_unseal_key_name(id)?;
        let share = match store.get(&name).await {
            Ok(share) => share,
            Err(err) if err.is_not_found() => {
                warn!("unseal-key-{id} not found, trying the next share");
                continue;
            }
            Err(err) => return Err(err),
        };

        let progress = vault.generate_root_update(&share, &attempt.nonce).await?;
        submitted += 1;
        debug!("root generation progress {}/{}", progress.progress, progress.required);

        if progress.complete {
            return decode_root_token(&progress.encoded_token, &attempt.otp);
        }
    }

    Err(VaultError::GenerationIncomplete { submitted, required })
}

/// Generate a new root token and replace the stored one.
///
/// The stored token is read before a new one is generated, so a missing
/// token fails the rotation without minting anything. `state` is filled in
/// as steps complete and stays with the caller when a step fails.
pub async fn rotate_root_token<S, V>(
    store: &S,
    vault: &V,
    threshold: i64,
    state: &mut RotationState,
) -> VaultResult<()>
where
    S: TokenKeyStore,
    V: RootTokenApi,
{
    let result = rotate(store, vault, threshold, state).await;
    log_security_event(SecurityEvent::RootTokenRotated, &state.summary(), result.is_ok());
    result
}

async fn rotate<S, V>(store: &S, vault: &V, threshold: i64, state: &mut RotationState) -> VaultResult<()>
where
    S: TokenKeyStore,
    V: RootTokenApi,
{
    let name = store.new_token_name()?;
    let old_token = store.get(&name).await?;
    state.old_token = Some(old_token.clone());

    let new_token = generate_root_token(store, vault, threshold).await?;
    state.new_token = Some(new_token.clone());

    store.delete(&name).await?;
    state.old_entry_deleted = true;

    vault.revoke_token(&old_token).await?;
    state.old_token_revoked = true;
    log_security_event(SecurityEvent::RootTokenRevoked, "previous root token revoked", true);

    store.set(&name, &new_token).await?;
    state.new_token_written = true;
    Ok(())
}
