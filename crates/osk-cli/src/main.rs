use anyhow::Context;
use clap::{Parser, Subcommand};
use osk_core::OskConfig;
use osk_credentials::ExpirationPolicy;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "osk", version, about = "Master keys, agent identities and signed API tokens")]
struct Cli {
    /// Configuration file. Defaults apply when it does not exist.
    #[arg(long, short, global = true, env = "OSK_CONFIG", default_value = "osk.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the master key.
    Init {
        /// Replace an existing master key. Every issued token stops validating.
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Master and agent identities.
    Keys {
        #[command(subcommand)]
        cmd: KeysCommand,
    },

    /// API token management.
    Token {
        #[command(subcommand)]
        cmd: TokenCommand,
    },
}

#[derive(Subcommand, Debug)]
enum KeysCommand {
    /// Print the master address.
    Address,

    /// Print the address of the agent at INDEX.
    Agent { index: u32 },

    /// List the configured agents.
    Agents,
}

#[derive(Subcommand, Debug)]
enum TokenCommand {
    /// Issue a new token. It is printed once and never stored.
    Generate {
        #[arg(long)]
        label: String,

        /// 30d, 90d, 1y or never.
        #[arg(long, default_value = "90d")]
        expires: ExpirationPolicy,

        /// Sign with the agent at this index instead of the master key.
        #[arg(long)]
        agent: Option<u32>,
    },

    /// List issued tokens.
    List {
        /// Print metadata as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Revoke one token by id.
    Revoke { id: String },

    /// Revoke every token ADDRESS has issued so far.
    RevokeAll { address: String },

    /// Forget all token metadata. Revocations are kept.
    DeleteAll {
        #[arg(long, default_value_t = false)]
        yes: bool,
    },

    /// Validate a token (or a file containing one). Exits with status 1 unless valid.
    Validate {
        token: String,

        /// Also accept tokens scoped to the agent at this index.
        #[arg(long)]
        agent: Option<u32>,

        /// Additional trusted issuer address. Repeatable.
        #[arg(long = "trust")]
        trust: Vec<String>,
    },

    /// Decode a token (or a file containing one) without verifying it.
    Inspect { token: String },
}

/// Load the configuration file, or defaults if it does not exist.
fn load_config(path: &Path) -> anyhow::Result<OskConfig> {
    if path.exists() {
        OskConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))
    } else {
        Ok(OskConfig::default())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.cmd {
        Command::Init { force } => commands::init::run(&config, force).await?,

        Command::Keys { cmd } => match cmd {
            KeysCommand::Address => commands::keys::address(&config).await?,
            KeysCommand::Agent { index } => commands::keys::agent(&config, index).await?,
            KeysCommand::Agents => commands::keys::agents(&config).await?,
        },

        Command::Token { cmd } => match cmd {
            TokenCommand::Generate {
                label,
                expires,
                agent,
            } => commands::token::generate(&config, &label, expires, agent).await?,
            TokenCommand::List { json } => commands::token::list(&config, json).await?,
            TokenCommand::Revoke { id } => commands::token::revoke(&config, &id).await?,
            TokenCommand::RevokeAll { address } => {
                commands::token::revoke_all(&config, &address).await?
            }
            TokenCommand::DeleteAll { yes } => commands::token::delete_all(&config, yes).await?,
            TokenCommand::Validate {
                token,
                agent,
                trust,
            } => commands::token::validate(&config, token, agent, trust).await?,
            TokenCommand::Inspect { token } => commands::token::inspect(token)?,
        },
    }

    Ok(())
}
