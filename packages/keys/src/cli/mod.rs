//! CLI module for command-line interface functionality

pub mod commands;
pub mod context;
pub mod output;
pub mod root_token;
pub mod sync;
pub mod unseal_key;

pub use commands::{Cli, Commands, GlobalArgs, RootTokenCommand, ServerArgs, UnsealKeyCommand};
use context::CommandContext;
use crate::services::SyncOptions;

/// Parse the command line and run the selected command
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    use clap::Parser;

    let cli = Cli::parse();
    process_command(cli.command, &cli.global).await
}

/// Process the CLI command
pub async fn process_command(command: Commands, global: &GlobalArgs) -> Result<(), Box<dyn std::error::Error>> {
    let context = CommandContext::build(global, command.server()).await?;
    let store = context.key_store().await?;
    let threshold = context.descriptor.secret_threshold();

    match command {
        Commands::RootToken { command } => match command {
            RootTokenCommand::Get {
                token_name,
                value_only,
                ..
            } => root_token::handle_get(&*store, token_name.as_deref(), value_only).await,

            RootTokenCommand::Set {
                token_name,
                token_value,
                ..
            } => root_token::handle_set(&*store, token_name.as_deref(), &token_value).await,

            RootTokenCommand::Delete { token_name, .. } => {
                root_token::handle_delete(&*store, token_name.as_deref()).await
            }

            RootTokenCommand::Sync { delete_legacy, .. } => {
                sync::handle_sync_root_token(&*store, SyncOptions { delete_legacy }).await
            }

            RootTokenCommand::Generate { .. } => {
                let vault = context.vault_client()?;
                root_token::handle_generate(&*store, &vault, threshold).await
            }

            RootTokenCommand::Rotate { .. } => {
                let vault = context.vault_client()?;
                root_token::handle_rotate(&*store, &vault, threshold).await
            }
        },

        Commands::UnsealKey { command } => match command {
            UnsealKeyCommand::Get {
                key_id,
                key_name,
                value_only,
                ..
            } => unseal_key::handle_get(&*store, key_id, key_name.as_deref(), value_only).await,

            UnsealKeyCommand::Set {
                key_id,
                key_name,
                key_value,
                ..
            } => unseal_key::handle_set(&*store, key_id, key_name.as_deref(), &key_value).await,

            UnsealKeyCommand::Delete { key_id, key_name, .. } => {
                unseal_key::handle_delete(&*store, key_id, key_name.as_deref()).await
            }

            UnsealKeyCommand::List { value_only, .. } => unseal_key::handle_list(&*store, value_only).await,

            UnsealKeyCommand::Sync { delete_legacy, .. } => {
                sync::handle_sync_unseal_keys(&*store, SyncOptions { delete_legacy }).await
            }
        },

        Commands::Sync { delete_legacy, .. } => sync::handle_sync_all(&*store, SyncOptions { delete_legacy }).await,
    }
}
