//! Token management commands.
//!
//! `osk token generate` - Issue a new token.
//! `osk token list` - List issued tokens.
//! `osk token revoke` - Revoke one token.
//! `osk token revoke-all` - Revoke everything an address issued so far.
//! `osk token delete-all` - Forget all token metadata.
//! `osk token validate` - Validate a token against local trust and revocations.
//! `osk token inspect` - Decode a token without verifying it.

use anyhow::Context;
use chrono::{DateTime, Utc};
use osk_core::OskConfig;
use osk_credentials::{ExpirationPolicy, RevocationStore};
use osk_token::{Address, TrustConfig, ValidationOutcome, inspect_token_unverified, validate_at};
use std::sync::Arc;

/// Issue a new token and print it.
pub async fn generate(
    config: &OskConfig,
    label: &str,
    expires: ExpirationPolicy,
    agent: Option<u32>,
) -> anyhow::Result<()> {
    let generated = super::manager(config)
        .await?
        .generate(label, expires, agent)
        .await
        .context("Failed to generate token")?;
    let metadata = &generated.metadata;

    println!("✔ Generated token");
    println!("  Id:      {}", metadata.id);
    println!("  Label:   {}", metadata.label);
    println!("  Issuer:  {}", metadata.issuer);
    if let Some(index) = metadata.agent_index {
        println!("  Agent:   {}", index);
    }
    println!("  Expires: {}", format_expiry(metadata.expires_at));
    println!();
    println!("{}", generated.token);
    println!();
    println!("⚠️  This token is shown once. Store it now; it cannot be recovered.");

    Ok(())
}

/// List issued tokens.
pub async fn list(config: &OskConfig, json: bool) -> anyhow::Result<()> {
    let keys = super::manager(config).await?.list_keys().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&keys)?);
        return Ok(());
    }
    if keys.is_empty() {
        println!("No tokens issued yet.");
        return Ok(());
    }

    let now = Utc::now();
    println!(
        "{:<36}  {:<20}  {:<18}  {:<8}  {:>5}  EXPIRES",
        "ID", "LABEL", "PREFIX", "STATUS", "CNT"
    );
    for key in keys {
        println!(
            "{:<36}  {:<20}  {:<18}  {:<8}  {:>5}  {}",
            key.id,
            key.label,
            key.prefix,
            key.status(now).to_string(),
            key.counter,
            format_expiry(key.expires_at)
        );
    }
    Ok(())
}

/// Revoke one token by id.
pub async fn revoke(config: &OskConfig, id: &str) -> anyhow::Result<()> {
    let revoked = super::manager(config)
        .await?
        .revoke(id)
        .await
        .with_context(|| format!("Failed to revoke token {id}"))?;
    println!("✔ Revoked token {} ({})", revoked.id, revoked.label);
    Ok(())
}

/// Revoke everything `address` issued so far.
pub async fn revoke_all(config: &OskConfig, address: &str) -> anyhow::Result<()> {
    let address = Address::parse(address).context("Invalid address")?;
    let flagged = super::manager(config)
        .await?
        .revoke_all(address.as_str())
        .await
        .with_context(|| format!("Failed to revoke tokens issued by {address}"))?;
    println!("✔ Revoked all tokens issued by {} so far", address);
    println!("  Local entries updated: {}", flagged);
    Ok(())
}

/// Forget all token metadata.
pub async fn delete_all(config: &OskConfig, yes: bool) -> anyhow::Result<()> {
    if !yes {
        anyhow::bail!("Refusing to delete all token metadata without --yes");
    }
    let removed = super::manager(config).await?.delete_all().await?;
    println!("✔ Deleted metadata of {} token(s)", removed);
    println!("  Revocations are kept; tokens that were not revoked still validate.");
    Ok(())
}

/// Build the trust configuration for validation.
async fn trust_config(
    config: &OskConfig,
    agent: Option<u32>,
    extra: &[String],
) -> anyhow::Result<TrustConfig> {
    let keys = super::key_derivation(config);
    let master = keys
        .master_address()
        .await
        .context("Failed to read the master key. Run `osk init` first")?;
    let agent = match agent {
        Some(index) => Some(
            keys.agent_info(index, config.agent_label(index).unwrap_or_default())
                .await
                .with_context(|| format!("Failed to derive agent {index}"))?
                .address,
        ),
        None => None,
    };

    let mut trust = TrustConfig::new(master, agent);
    for issuer in config.trust.whitelist.iter().chain(extra) {
        let issuer = Address::parse(issuer)
            .with_context(|| format!("Invalid trusted issuer address: {issuer}"))?;
        trust = trust.trust_issuer(issuer);
    }

    let snapshot = super::revocation_store(config)
        .snapshot()
        .await
        .context("Failed to read revocations")?;
    tracing::debug!(
        revoked = snapshot.revoked_count(),
        thresholds = snapshot.threshold_count(),
        "Loaded revocation snapshot"
    );
    Ok(trust.with_revocations(Arc::new(snapshot)))
}

/// Validate a token as of `now`.
pub async fn check(
    config: &OskConfig,
    token: &str,
    agent: Option<u32>,
    extra_trust: &[String],
    now: i64,
) -> anyhow::Result<ValidationOutcome> {
    let trust = trust_config(config, agent, extra_trust).await?;
    Ok(validate_at(token, &trust, now))
}

/// Validate a token and exit with status 1 unless it is valid.
pub async fn validate(
    config: &OskConfig,
    token: String,
    agent: Option<u32>,
    extra_trust: Vec<String>,
) -> anyhow::Result<()> {
    let token = super::read_token(token)?;
    let outcome = check(config, &token, agent, &extra_trust, Utc::now().timestamp()).await?;

    match outcome {
        ValidationOutcome::Valid { issuer } => {
            println!("✔ Token is valid");
            println!("  Issuer: {}", issuer);
        }
        rejected => {
            let reason = rejected.reason().unwrap_or_default();
            tracing::warn!(reason = %reason, "Token rejected");
            println!("✖ Token rejected: {}", reason);
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Decode a token without verifying it.
pub fn inspect(token: String) -> anyhow::Result<()> {
    let token = super::read_token(token)?;
    let info = inspect_token_unverified(&token)?;
    let payload = &info.payload;

    println!("Token Information (signature NOT verified):");
    println!("  Format:    {}", info.format);
    println!("  Issuer:    {}", payload.iss);
    println!("  Audience:  {}", payload.aud);
    println!("  Counter:   {}", payload.cnt);
    println!("  Nonce:     {}", payload.nonce);
    println!("  Issued at: {}", format_timestamp(payload.iat));
    println!(
        "  Expires:   {}",
        payload.exp.map(format_timestamp).unwrap_or_else(|| "never".to_string())
    );
    if let Some(label) = &payload.lbl {
        println!("  Label:     {}", label);
    }
    match info.signature_len {
        Some(len) => println!("  Signature: {} bytes", len),
        None => println!("  Signature: not valid hex"),
    }

    Ok(())
}

fn format_expiry(expires_at: Option<DateTime<Utc>>) -> String {
    expires_at
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "never".to_string())
}

fn format_timestamp(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}
