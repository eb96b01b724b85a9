//! `unseal-key` subcommands

use super::output::format_entry;
use crate::error::VaultError;
use crate::logging::{key_details, log_security_event, SecurityEvent};
use crate::secret::SecretValue;
use crate::services::{list_unseal_keys, TokenKeyStore};

fn key_name<S: TokenKeyStore>(store: &S, id: i64, key_name: Option<&str>) -> Result<String, VaultError> {
    match key_name {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => store.new_unseal_key_name(id),
    }
}

pub async fn handle_get<S: TokenKeyStore>(
    store: &S,
    id: i64,
    name: Option<&str>,
    value_only: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let name = key_name(store, id, name)?;
    let key = store.get(&name).await?;
    println!("{}", format_entry(&name, &key, value_only));
    Ok(())
}

pub async fn handle_set<S: TokenKeyStore>(
    store: &S,
    id: i64,
    name: Option<&str>,
    value: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if value.is_empty() {
        return Err(VaultError::InvalidInput("key value is empty".to_string()).into());
    }

    let name = key_name(store, id, name)?;
    let key = SecretValue::from(value);
    store.set(&name, &key).await?;
    log_security_event(SecurityEvent::KeyWritten, &key_details("unseal-key", &name), true);
    println!("unseal-key with name {name} successfully set");
    Ok(())
}

pub async fn handle_delete<S: TokenKeyStore>(
    store: &S,
    id: i64,
    name: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let name = key_name(store, id, name)?;
    store.delete(&name).await?;
    log_security_event(SecurityEvent::KeyDeleted, &key_details("unseal-key", &name), true);
    println!("unseal-key with name {name} successfully deleted");
    Ok(())
}

/// Print every share; missing shares are reported and skipped.
///
/// Shares that could not be read for any other reason fail the command once
/// every share has been printed.
pub async fn handle_list<S: TokenKeyStore>(store: &S, value_only: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut unreadable = 0;
    for listing in list_unseal_keys(store).await {
        match listing.result {
            Ok(key) => println!("{}", format_entry(&key.name, &key.value, value_only)),
            Err(err) if err.is_not_found() => println!("vault-unseal-key-{} not found", listing.id),
            Err(err) => {
                unreadable += 1;
                eprintln!("vault-unseal-key-{}: {err}", listing.id);
            }
        }
    }

    if unreadable > 0 {
        return Err(format!("{unreadable} unseal keys could not be read").into());
    }
    Ok(())
}
