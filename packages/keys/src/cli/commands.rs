//! CLI command definitions

use clap::builder::FalseyValueParser;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kubectl-vault")]
#[command(about = "Manage root tokens and unseal keys of KubeVault managed Vault servers")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command
#[derive(Clone, Debug, Default, Args)]
pub struct GlobalArgs {
    /// Namespace of the VaultServer (default: config file, then `default`)
    #[arg(short = 'n', long, global = true)]
    pub namespace: Option<String>,

    /// Vault address for root-token generation (default: in-cluster service address)
    #[arg(long, env = "VAULT_ADDR", global = true)]
    pub vault_addr: Option<String>,

    /// Skip verification of the Vault server certificate
    #[arg(
        long,
        env = "VAULT_SKIP_VERIFY",
        global = true,
        action = ArgAction::SetTrue,
        value_parser = FalseyValueParser::new()
    )]
    pub tls_skip_verify: bool,

    /// PEM bundle used to verify the Vault server certificate
    #[arg(long, env = "VAULT_CACERT", global = true)]
    pub ca_cert: Option<PathBuf>,

    /// Path to the tool config (default: $XDG_CONFIG_HOME/kubevault/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Read the VaultServer from `kubectl get vaultserver -o json` output instead of the cluster
    #[arg(long, global = true)]
    pub server_file: Option<PathBuf>,
}

/// `<resource> <name>` positional pair, e.g. `vaultserver vault`
#[derive(Clone, Debug, Args)]
pub struct ServerArgs {
    /// Resource type: vaultserver
    pub resource: String,

    /// Name of the VaultServer
    pub name: String,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Get, set, delete, sync, generate or rotate the root token
    ///
    /// Example usage:
    ///   kubectl vault root-token get vaultserver vault -n demo
    ///   kubectl vault root-token set vaultserver vault -n demo --token-value <value>
    ///   kubectl vault root-token rotate vaultserver vault -n demo
    RootToken {
        #[command(subcommand)]
        command: RootTokenCommand,
    },

    /// Get, set, delete, list or sync unseal keys
    ///
    /// Example usage:
    ///   kubectl vault unseal-key get vaultserver vault -n demo --key-id 2
    ///   kubectl vault unseal-key list vaultserver vault -n demo
    UnsealKey {
        #[command(subcommand)]
        command: UnsealKeyCommand,
    },

    /// Copy the root token and every unseal key from legacy to current names
    Sync {
        #[command(flatten)]
        server: ServerArgs,

        /// Delete the legacy copy once the current copy is written
        #[arg(long)]
        delete_legacy: bool,
    },
}

#[derive(Clone, Debug, Subcommand)]
pub enum RootTokenCommand {
    /// Print the stored root token
    Get {
        #[command(flatten)]
        server: ServerArgs,

        /// Read this name instead of the current root-token name
        #[arg(long)]
        token_name: Option<String>,

        /// Print only the value
        #[arg(long)]
        value_only: bool,
    },

    /// Store a root token
    Set {
        #[command(flatten)]
        server: ServerArgs,

        #[arg(long)]
        token_name: Option<String>,

        #[arg(long)]
        token_value: String,
    },

    /// Delete the stored root token
    Delete {
        #[command(flatten)]
        server: ServerArgs,

        #[arg(long)]
        token_name: Option<String>,
    },

    /// Copy the root token from its legacy name to its current name
    Sync {
        #[command(flatten)]
        server: ServerArgs,

        #[arg(long)]
        delete_legacy: bool,
    },

    /// Generate a new root token from the stored unseal keys and print it
    Generate {
        #[command(flatten)]
        server: ServerArgs,
    },

    /// Generate a new root token, revoke the old one and store the new one
    Rotate {
        #[command(flatten)]
        server: ServerArgs,
    },
}

#[derive(Clone, Debug, Subcommand)]
pub enum UnsealKeyCommand {
    /// Print one unseal key
    Get {
        #[command(flatten)]
        server: ServerArgs,

        #[arg(long, default_value_t = 0)]
        key_id: i64,

        /// Read this name instead of the current name for `--key-id`
        #[arg(long)]
        key_name: Option<String>,

        #[arg(long)]
        value_only: bool,
    },

    /// Store one unseal key
    Set {
        #[command(flatten)]
        server: ServerArgs,

        #[arg(long, default_value_t = 0)]
        key_id: i64,

        #[arg(long)]
        key_name: Option<String>,

        #[arg(long)]
        key_value: String,
    },

    /// Delete one unseal key
    Delete {
        #[command(flatten)]
        server: ServerArgs,

        #[arg(long, default_value_t = 0)]
        key_id: i64,

        #[arg(long)]
        key_name: Option<String>,
    },

    /// Print every unseal key, falling back to legacy names
    List {
        #[command(flatten)]
        server: ServerArgs,

        #[arg(long)]
        value_only: bool,
    },

    /// Copy unseal keys from their legacy names to their current names
    Sync {
        #[command(flatten)]
        server: ServerArgs,

        #[arg(long)]
        delete_legacy: bool,
    },
}

impl Commands {
    pub fn server(&self) -> &ServerArgs {
        match self {
            Commands::RootToken { command } => match command {
                RootTokenCommand::Get { server, .. }
                | RootTokenCommand::Set { server, .. }
                | RootTokenCommand::Delete { server, .. }
                | RootTokenCommand::Sync { server, .. }
                | RootTokenCommand::Generate { server }
                | RootTokenCommand::Rotate { server } => server,
            },
            Commands::UnsealKey { command } => match command {
                UnsealKeyCommand::Get { server, .. }
                | UnsealKeyCommand::Set { server, .. }
                | UnsealKeyCommand::Delete { server, .. }
                | UnsealKeyCommand::List { server, .. }
                | UnsealKeyCommand::Sync { server, .. } => server,
            },
            Commands::Sync { server, .. } => server,
        }
    }
}
