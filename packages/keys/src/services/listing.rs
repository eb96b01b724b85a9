//! Unseal-key enumeration

use super::key_storage::TokenKeyStore;
use crate::error::VaultResult;
use crate::secret::SecretValue;
use log::debug;

#[derive(Debug)]
pub struct ListedKey {
    pub name: String,
    pub value: SecretValue,
    /// Found only under the legacy name
    pub legacy: bool,
}

#[derive(Debug)]
pub struct KeyListing {
    pub id: i64,
    pub result: VaultResult<ListedKey>,
}

/// Fetch every share `0..N-1`, current name first, legacy name as fallback.
///
/// Each index is reported independently. When both lookups fail the legacy
/// lookup's error is kept, unless it is `NotFound` and the current lookup
/// failed for another reason.
pub async fn list_unseal_keys<S: TokenKeyStore>(store: &S) -> Vec<KeyListing> {
    let mut listing = Vec::new();
    for id in 0..store.secret_shares() {
        let result = fetch_share(store, id).await;
        listing.push(KeyListing { id, result });
    }
    listing
}

async fn fetch_share<S: TokenKeyStore>(store: &S, id: i64) -> VaultResult<ListedKey> {
    let current = match store.new_unseal_key_name(id) {
        Ok(name) => store.get(&name).await.map(|value| (name, value)),
        Err(err) => Err(err),
    };

    match current {
        Ok((name, value)) => Ok(ListedKey {
            name,
            value,
            legacy: false,
        }),
        Err(current_err) => {
            debug!("unseal-key-{id} not available under current name: {current_err}");
            let legacy = match store.old_unseal_key_name(id) {
                Ok(name) => store.get(&name).await.map(|value| (name, value)),
                Err(err) => Err(err),
            };
            match legacy {
                Ok((name, value)) => Ok(ListedKey {
                    name,
                    value,
                    legacy: true,
                }),
                Err(err) if err.is_not_found() && !current_err.is_not_found() => Err(current_err),
                Err(err) => Err(err),
            }
        }
    }
}
