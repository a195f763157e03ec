//! `osk init` command implementation.
//!
//! Creates the data directory and the master key.

use anyhow::{Context, Result};
use osk_core::OskConfig;
use osk_token::SecureKeyStore;

/// Run the `osk init` command.
pub async fn run(config: &OskConfig, force: bool) -> Result<()> {
    let store = super::key_store(config);

    if store.exists().await {
        if !force {
            anyhow::bail!(
                "A master key already exists at {} (or in the configured environment variable). Use --force to replace it.",
                store.path().display()
            );
        }
        println!("⚠️  Replacing the existing master key. Tokens it issued will no longer validate.");
    }

    std::fs::create_dir_all(&config.data_dir).with_context(|| {
        format!("Failed to create data directory {}", config.data_dir.display())
    })?;

    let address = store
        .generate()
        .await
        .context("Failed to generate the master key")?;

    println!("✔ Generated master key");
    println!("  Address:  {}", address);
    println!("  Key file: {}", store.path().display());
    println!();
    println!("⚠️  Keep the key file secret. Never commit it to version control.");

    Ok(())
}
