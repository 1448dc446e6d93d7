//! eerc-tools
//!
//! Operator commands for an eERC converter deployment: network checks,
//! ERC-20 allowance probing and negotiation, registrar lookups and auditor
//! administration. Every command prints one JSON document on stdout;
//! logs go to stderr.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use eerc_common::{
    contracts::{self, converter},
    format_atomic, resolve_erc20_decimals, to_atomic, ChainClient, CircuitConfig,
    OrchestratorConfig, WalletConnector,
};
use eerc_rails_evm::{EvmChainClient, FilePreferenceStore, LocalWalletConnector, LOCAL_CONNECTOR_ID};
use eerc_wallet_state::{AllowanceNegotiator, ConnectionSession, NetworkGuard};
use ethers_core::types::{Address, U256};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{parse_address, ToolsConfig};

#[derive(Parser)]
#[command(
    name = "eerc-tools",
    about = "Operator commands for the eERC converter"
)]
struct Cli {
    /// Configuration file; defaults to ./eerc.{toml,json,yaml} when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json_logs: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect the local key and make sure it is on the configured chain.
    Network,
    /// Read the token's decimals (18 when the read fails).
    Decimals,
    /// Read the current allowance of `owner` towards the converter.
    Allowance(AllowanceArgs),
    /// Approve the converter for `amount` tokens, with the reset-to-zero fallback.
    Approve(ApproveArgs),
    /// Registrar membership and public key of an address.
    Registered(AddressArgs),
    /// Registrar, auditor address, auditor public key and readiness.
    Auditor,
    /// Set the converter's auditor (owner only).
    SetAuditor(AddressArgs),
    /// Print the circuit asset URLs.
    Circuits(CircuitsArgs),
}

#[derive(Args)]
struct AllowanceArgs {
    owner: String,
    /// Spender; defaults to the converter.
    #[arg(long)]
    spender: Option<String>,
}

#[derive(Args)]
struct ApproveArgs {
    /// Human amount, e.g. `12.5`.
    amount: String,
}

#[derive(Args)]
struct AddressArgs {
    address: String,
}

#[derive(Args)]
struct CircuitsArgs {
    /// Origin serving `/eerc/*`; overrides CIRCUITS_ORIGIN.
    #[arg(long)]
    origin: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let tools = ToolsConfig::load(cli.config.as_deref())?;
    let config = tools.orchestrator()?;

    match cli.command {
        Commands::Network => network(&tools, &config).await,
        Commands::Decimals => decimals(&config).await,
        Commands::Allowance(args) => allowance(&config, args).await,
        Commands::Approve(args) => approve(&tools, &config, args).await,
        Commands::Registered(args) => registered(&config, args).await,
        Commands::Auditor => auditor(&config).await,
        Commands::SetAuditor(args) => set_auditor(&tools, &config, args).await,
        Commands::Circuits(args) => circuits(&tools, args),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "eerc_tools=info,eerc_wallet_state=info".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn chain_client(config: &OrchestratorConfig) -> Result<Arc<EvmChainClient>> {
    Ok(Arc::new(EvmChainClient::new(&config.chain.rpc_url)?))
}

/// Session connected through the local key.
async fn local_session(
    tools: &ToolsConfig,
    config: &OrchestratorConfig,
) -> Result<Arc<ConnectionSession>> {
    let wallet = LocalWalletConnector::new(
        &config.chain.rpc_url,
        tools.private_key()?,
        config.chain.chain_id,
    )?;
    let session = Arc::new(ConnectionSession::new(
        vec![Arc::new(wallet) as Arc<dyn WalletConnector>],
        Arc::new(FilePreferenceStore::new(tools.connector_store())),
        config.chain.chain_id,
    ));
    if let Err(e) = session.reconnect_last().await {
        warn!(error = %e, "could not restore the remembered connector");
    }
    if !session.snapshot().is_connected() {
        session.connect(LOCAL_CONNECTOR_ID).await?;
    }
    Ok(session)
}

async fn token_decimals(chain: &dyn ChainClient, token: Address) -> u32 {
    let read = contracts::read_decimals(chain, token).await;
    if let Err(e) = &read {
        warn!(error = %e, "decimals() read failed; assuming 18");
    }
    resolve_erc20_decimals(read)
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMMANDS
// ═══════════════════════════════════════════════════════════════════════════════

async fn network(tools: &ToolsConfig, config: &OrchestratorConfig) -> Result<()> {
    let session = local_session(tools, config).await?;
    let guard = NetworkGuard::new(Arc::clone(&session), config.chain.clone());
    let ready = guard.ensure_network().await;
    let snapshot = session.snapshot();
    print_json(&json!({
        "account": snapshot.account,
        "chain_id": snapshot.chain_id,
        "required_chain_id": config.chain.chain_id,
        "required_chain": config.chain.name,
        "on_required_chain": ready,
        "connector": snapshot.connector_id,
    }))
}

async fn decimals(config: &OrchestratorConfig) -> Result<()> {
    let chain = chain_client(config)?;
    let decimals = token_decimals(chain.as_ref(), config.token).await;
    print_json(&json!({ "token": config.token, "decimals": decimals }))
}

async fn allowance(config: &OrchestratorConfig, args: AllowanceArgs) -> Result<()> {
    let owner = parse_address(&args.owner)?;
    let spender = match &args.spender {
        Some(raw) => parse_address(raw)?,
        None => config.converter,
    };
    let chain = chain_client(config)?;
    let negotiator = AllowanceNegotiator::new(chain.clone(), config.token);
    let current = negotiator
        .current_allowance(owner, spender)
        .await
        .context("allowance() read failed")?;
    let decimals = token_decimals(chain.as_ref(), config.token).await;
    print_json(&json!({
        "owner": owner,
        "spender": spender,
        "allowance": current.to_string(),
        "formatted": display_amount(current, decimals),
    }))
}

async fn approve(tools: &ToolsConfig, config: &OrchestratorConfig, args: ApproveArgs) -> Result<()> {
    let chain = chain_client(config)?;
    let session = local_session(tools, config).await?;
    let guard = NetworkGuard::new(Arc::clone(&session), config.chain.clone());
    if !guard.ensure_network().await {
        bail!("Please switch to {}", config.chain.name);
    }
    let (owner, wallet) = session.signer().context("Connect your wallet first")?;

    let decimals = token_decimals(chain.as_ref(), config.token).await;
    let atomic = to_atomic(&args.amount, decimals).context("Enter a valid amount")?;
    let negotiator = AllowanceNegotiator::new(chain.clone(), config.token);
    let outcome = negotiator
        .ensure_allowance(wallet.as_ref(), owner, config.converter, atomic)
        .await
        .context("Approve failed")?;

    print_json(&json!({
        "owner": owner,
        "spender": config.converter,
        "amount": atomic.to_string(),
        "approved": outcome.approved,
        "tx_hash": outcome.tx_hash,
        "explorer": outcome.tx_hash.map(|h| config.chain.tx_url(&h)),
    }))
}

async fn registered(config: &OrchestratorConfig, args: AddressArgs) -> Result<()> {
    let user = parse_address(&args.address)?;
    let chain = chain_client(config)?;
    let registrar = contracts::read_registrar(chain.as_ref(), config.converter).await?;
    let is_registered = contracts::read_is_user_registered(chain.as_ref(), registrar, user).await?;
    let (x, y) = contracts::read_user_public_key(chain.as_ref(), registrar, user).await?;
    print_json(&json!({
        "registrar": registrar,
        "address": user,
        "registered": is_registered,
        "public_key": [x.to_string(), y.to_string()],
    }))
}

#[derive(Serialize)]
struct AuditorState {
    registrar: Address,
    auditor: Address,
    public_key: [String; 2],
    key_set: bool,
}

async fn read_auditor_state(
    chain: &dyn ChainClient,
    config: &OrchestratorConfig,
) -> Result<AuditorState> {
    let registrar = contracts::read_registrar(chain, config.converter).await?;
    let auditor = contracts::read_auditor(chain, config.converter).await?;
    let key = contracts::read_auditor_public_key(chain, config.converter).await?;
    let key_set = contracts::read_is_auditor_key_set(chain, config.converter).await?;
    Ok(AuditorState {
        registrar,
        auditor,
        public_key: [key.x.to_string(), key.y.to_string()],
        key_set,
    })
}

async fn auditor(config: &OrchestratorConfig) -> Result<()> {
    let chain = chain_client(config)?;
    let state = read_auditor_state(chain.as_ref(), config).await?;
    print_json(&state)
}

async fn set_auditor(
    tools: &ToolsConfig,
    config: &OrchestratorConfig,
    args: AddressArgs,
) -> Result<()> {
    let auditor = parse_address(&args.address).context("AUDITOR_ADDRESS not an address")?;
    let chain = chain_client(config)?;
    let session = local_session(tools, config).await?;
    let (owner, wallet) = session.signer().context("Connect your wallet first")?;
    info!(owner = ?owner, converter = ?config.converter, auditor = ?auditor, "setting eERC auditor");

    match contracts::read_owner(chain.as_ref(), config.converter).await {
        Ok(on_chain) if on_chain != owner => warn!(
            on_chain = ?on_chain,
            "signer is not the converter owner; the transaction will likely revert"
        ),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "owner() not readable; skipping owner check"),
    }

    let registrar = contracts::read_registrar(chain.as_ref(), config.converter).await?;
    if !contracts::read_is_user_registered(chain.as_ref(), registrar, auditor).await? {
        bail!("Auditor address is not registered in the registrar; generate a key and register it first");
    }

    let before = read_auditor_state(chain.as_ref(), config).await?;
    info!(key_set = before.key_set, auditor = ?before.auditor, "auditor before");

    let call = converter::set_auditor_public_key(config.converter, auditor);
    let tx_hash = wallet
        .send_transaction(owner, &call)
        .await
        .context("setAuditorPublicKey submission failed")?;
    let receipt = chain
        .wait_for_receipt(tx_hash)
        .await
        .context("waiting for setAuditorPublicKey receipt")?;
    if !receipt.success {
        bail!("setAuditorPublicKey reverted: {}", config.chain.tx_url(&tx_hash));
    }

    let after = read_auditor_state(chain.as_ref(), config).await?;
    if !after.key_set {
        bail!("isAuditorKeySet is still false; check the owner key and that the auditor is registered");
    }
    info!("auditor configured; deposits are ready");
    print_json(&json!({
        "tx_hash": tx_hash,
        "explorer": config.chain.tx_url(&tx_hash),
        "before": before,
        "after": after,
    }))
}

fn circuits(tools: &ToolsConfig, args: CircuitsArgs) -> Result<()> {
    let origin = args
        .origin
        .or_else(|| tools.circuits_origin.clone())
        .unwrap_or_default();
    print_json(&CircuitConfig::for_origin(&origin))
}

fn display_amount(value: U256, decimals: u32) -> String {
    format_atomic(value, decimals).unwrap_or_else(|_| value.to_string())
}
