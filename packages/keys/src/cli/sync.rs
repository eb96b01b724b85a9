//! `sync`, `root-token sync` and `unseal-key sync`

use crate::services::{sync_all, sync_key, LogicalKey, SyncOptions, SyncOutcome, SyncReport, TokenKeyStore};

fn print_outcome(key: LogicalKey, outcome: &SyncOutcome) {
    match outcome {
        SyncOutcome::AlreadySynced { name, legacy_deleted } => {
            println!("{key} already stored as {name}");
            if *legacy_deleted {
                println!("legacy copy of {key} successfully deleted");
            }
        }
        SyncOutcome::Synced {
            from,
            to,
            legacy_deleted,
        } => {
            println!("successfully synced {key} from {from} to {to}");
            if *legacy_deleted {
                println!("{key} with name {from} successfully deleted");
            }
        }
    }
}

fn finish(report: SyncReport) -> Result<(), Box<dyn std::error::Error>> {
    let total = report.results.len();
    let mut failed = 0;
    for (key, result) in &report.results {
        match result {
            Ok(outcome) => print_outcome(*key, outcome),
            Err(err) => {
                failed += 1;
                eprintln!("failed to sync {key}: {err}");
            }
        }
    }

    if failed > 0 {
        return Err(format!("{failed} of {total} keys failed to sync").into());
    }
    Ok(())
}

/// Root token and every unseal key
pub async fn handle_sync_all<S: TokenKeyStore>(store: &S, options: SyncOptions) -> Result<(), Box<dyn std::error::Error>> {
    finish(sync_all(store, options).await)?;
    println!("vault root-token & unseal-keys successfully synced");
    Ok(())
}

pub async fn handle_sync_root_token<S: TokenKeyStore>(
    store: &S,
    options: SyncOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = sync_key(store, LogicalKey::RootToken, options).await?;
    print_outcome(LogicalKey::RootToken, &outcome);
    Ok(())
}

/// Unseal keys only; each share is attempted even when an earlier one fails
pub async fn handle_sync_unseal_keys<S: TokenKeyStore>(
    store: &S,
    options: SyncOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut report = SyncReport::default();
    for id in 0..store.secret_shares() {
        let key = LogicalKey::UnsealKey(id);
        report.results.push((key, sync_key(store, key, options).await));
    }
    finish(report)
}
