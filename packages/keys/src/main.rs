//! Main entry point for the kubectl-vault plugin

use kvault_common::LoggingTransformer;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Initialize structured logging
    LoggingTransformer::init();

    if let Err(err) = kvault_keys::cli::run().await {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
