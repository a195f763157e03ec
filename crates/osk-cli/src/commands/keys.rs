//! Identity commands.
//!
//! `osk keys address` - Print the master address.
//! `osk keys agent <INDEX>` - Print a derived agent address.
//! `osk keys agents` - List the configured agents.

use anyhow::Context;
use osk_core::OskConfig;

/// Print the master address.
pub async fn address(config: &OskConfig) -> anyhow::Result<()> {
    let address = super::key_derivation(config)
        .master_address()
        .await
        .context("Failed to read the master key. Run `osk init` first")?;
    println!("{}", address);
    Ok(())
}

/// Print the address of the agent at `index`.
pub async fn agent(config: &OskConfig, index: u32) -> anyhow::Result<()> {
    let label = config.agent_label(index).unwrap_or_default();
    let info = super::key_derivation(config)
        .agent_info(index, label)
        .await
        .with_context(|| format!("Failed to derive agent {index}"))?;

    println!("{}", info.address);
    if !info.label.is_empty() {
        println!("  Label: {}", info.label);
    }
    Ok(())
}

/// List the agents from the configuration.
pub async fn agents(config: &OskConfig) -> anyhow::Result<()> {
    let agents = super::manager(config).await?.list_agents().await?;
    if agents.is_empty() {
        println!("No agents configured. Add entries under `agents:` in the configuration file.");
        return Ok(());
    }

    println!("{:<6} {:<44} LABEL", "INDEX", "ADDRESS");
    for agent in agents {
        println!("{:<6} {:<44} {}", agent.index, agent.address.as_str(), agent.label);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::config_in;
    use osk_core::AgentConfig;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_commands_fail_without_master_key() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());

        let err = address(&config).await.unwrap_err();
        assert!(format!("{err:#}").contains("osk init"));
        assert!(agent(&config, 0).await.is_err());
    }

    #[tokio::test]
    async fn test_commands_succeed_after_init() {
        let dir = tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.agents = vec![AgentConfig {
            index: 1,
            label: "scheduler".to_string(),
        }];
        crate::commands::init::run(&config, false).await.unwrap();

        address(&config).await.unwrap();
        agent(&config, 1).await.unwrap();
        agents(&config).await.unwrap();
    }
}
