//! `root-token` subcommands

use super::output::format_entry;
use crate::error::VaultError;
use crate::logging::{key_details, log_security_event, SecurityEvent};
use crate::secret::SecretValue;
use crate::services::{generate_root_token, rotate_root_token, RotationState, TokenKeyStore};
use crate::vault_client::RootTokenApi;

fn token_name<S: TokenKeyStore>(store: &S, token_name: Option<&str>) -> Result<String, VaultError> {
    match token_name {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => store.new_token_name(),
    }
}

pub async fn handle_get<S: TokenKeyStore>(
    store: &S,
    name: Option<&str>,
    value_only: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let name = token_name(store, name)?;
    let token = store.get(&name).await?;
    println!("{}", format_entry(&name, &token, value_only));
    Ok(())
}

pub async fn handle_set<S: TokenKeyStore>(
    store: &S,
    name: Option<&str>,
    value: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if value.is_empty() {
        return Err(VaultError::InvalidInput("token value is empty".to_string()).into());
    }

    let name = token_name(store, name)?;
    let token = SecretValue::from(value);
    store.set(&name, &token).await?;
    log_security_event(SecurityEvent::KeyWritten, &key_details("root-token", &name), true);
    println!("root-token with name {name} successfully set");
    Ok(())
}

pub async fn handle_delete<S: TokenKeyStore>(
    store: &S,
    name: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let name = token_name(store, name)?;
    store.delete(&name).await?;
    log_security_event(SecurityEvent::KeyDeleted, &key_details("root-token", &name), true);
    println!("root-token with name {name} successfully deleted");
    Ok(())
}

pub async fn handle_generate<S, V>(
    store: &S,
    vault: &V,
    threshold: i64,
) -> Result<(), Box<dyn std::error::Error>>
where
    S: TokenKeyStore,
    V: RootTokenApi,
{
    let token = generate_root_token(store, vault, threshold).await?;
    println!("generated root-token: {}", String::from_utf8_lossy(token.expose_secret()));
    Ok(())
}

pub async fn handle_rotate<S, V>(
    store: &S,
    vault: &V,
    threshold: i64,
) -> Result<(), Box<dyn std::error::Error>>
where
    S: TokenKeyStore,
    V: RootTokenApi,
{
    let mut state = RotationState::default();
    match rotate_root_token(store, vault, threshold, &mut state).await {
        Ok(()) => {
            println!("root-token rotation successful");
            Ok(())
        }
        Err(err) => {
            eprintln!("root-token rotation failed: {}", state.summary());
            if let (Some(token), false) = (&state.new_token, state.new_token_written) {
                eprintln!(
                    "new root-token was not stored, keep it safe: {}",
                    String::from_utf8_lossy(token.expose_secret())
                );
            }
            Err(err.into())
        }
    }
}
