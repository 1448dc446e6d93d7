//! Tool configuration.
//!
//! Sources, later ones winning:
//! 1. `.env`, then `.env.local` (loaded into the process environment)
//! 2. `eerc.{toml,json,yaml}` in the working directory, or `--config <file>`
//! 3. environment variables named after the fields (`RPC_URL`,
//!    `EERC_CONTRACT`, `TOKEN`, `OWNER_PRIVATE_KEY`, `CHAIN_ID`,
//!    `CONNECTOR_STORE`, `CIRCUITS_ORIGIN`)

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File};
use eerc_common::{ChainProfile, OrchestratorConfig, SettlePolicy};
use ethers_core::types::Address;
use serde::Deserialize;

const DEFAULT_CONNECTOR_STORE: &str = ".eerc/connector.json";

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ToolsConfig {
    pub rpc_url: Option<String>,
    /// eERC converter contract.
    pub eerc_contract: Option<String>,
    /// Public ERC-20 token.
    pub token: Option<String>,
    pub owner_private_key: Option<String>,
    pub chain_id: Option<u64>,
    pub chain_name: Option<String>,
    pub explorer_tx_url: Option<String>,
    pub connector_store: Option<PathBuf>,
    pub circuits_origin: Option<String>,
    #[serde(default)]
    pub settle: SettlePolicy,
}

impl ToolsConfig {
    pub fn load(file: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();
        dotenvy::from_filename_override(".env.local").ok();

        let builder = match file {
            Some(path) => Config::builder().add_source(File::from(path).required(true)),
            None => Config::builder().add_source(File::with_name("eerc").required(false)),
        };
        Self::from_builder(builder.add_source(Environment::default().try_parsing(true)))
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        builder
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid eERC tool configuration")
    }

    /// Orchestrator settings: Avalanche defaults with any overrides applied.
    pub fn orchestrator(&self) -> Result<OrchestratorConfig> {
        let mut config = OrchestratorConfig::default();
        let mut chain = ChainProfile::avalanche();
        if let Some(chain_id) = self.chain_id {
            chain.chain_id = chain_id;
        }
        if let Some(name) = &self.chain_name {
            chain.name = name.clone();
        }
        if let Some(rpc_url) = &self.rpc_url {
            chain.rpc_url = rpc_url.clone();
        }
        if let Some(explorer) = &self.explorer_tx_url {
            chain.explorer_tx_url = explorer.clone();
        }
        config.chain = chain;
        if let Some(converter) = &self.eerc_contract {
            config.converter = parse_address(converter).context("EERC_CONTRACT not an address")?;
        }
        if let Some(token) = &self.token {
            config.token = parse_address(token).context("TOKEN not an address")?;
        }
        config.settle = self.settle.clone();
        Ok(config)
    }

    pub fn private_key(&self) -> Result<&str> {
        self.owner_private_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .context("OWNER_PRIVATE_KEY must be set")
    }

    pub fn connector_store(&self) -> PathBuf {
        self.connector_store
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONNECTOR_STORE))
    }
}

/// Accepts addresses with or without the `0x` prefix.
pub fn parse_address(raw: &str) -> Result<Address> {
    let raw = raw.trim();
    let prefixed = if raw.starts_with("0x") || raw.starts_with("0X") {
        raw.to_string()
    } else {
        format!("0x{raw}")
    };
    Address::from_str(&prefixed).with_context(|| format!("invalid address: {raw}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(toml: &str) -> ToolsConfig {
        ToolsConfig::from_builder(
            Config::builder().add_source(File::from_str(toml, FileFormat::Toml)),
        )
        .unwrap()
    }

    #[test]
    fn empty_config_keeps_avalanche_defaults() {
        let tools = from_toml("");
        let config = tools.orchestrator().unwrap();
        assert_eq!(config, OrchestratorConfig::default());
        assert_eq!(
            tools.connector_store(),
            PathBuf::from(".eerc/connector.json")
        );
        assert!(tools.private_key().is_err());
    }

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let tools = from_toml(
            r#"
            rpc_url = "http://127.0.0.1:9650/ext/bc/C/rpc"
            chain_id = 43113
            eerc_contract = "2f1836b1a43B49CeF81B52a0C5b850d67030c020"

            [settle]
            max_polls = 5
            "#,
        );
        let config = tools.orchestrator().unwrap();
        assert_eq!(config.chain.chain_id, 43113);
        assert_eq!(config.chain.rpc_url, "http://127.0.0.1:9650/ext/bc/C/rpc");
        assert_eq!(config.converter, OrchestratorConfig::default().converter);
        assert_eq!(config.settle.max_polls, 5);
        assert_eq!(config.settle.post_operation_ms, 300);
    }

    #[test]
    fn bad_address_is_reported() {
        let tools = from_toml(r#"token = "0x1234""#);
        let err = tools.orchestrator().unwrap_err();
        assert!(err.to_string().contains("TOKEN"));
    }
}
