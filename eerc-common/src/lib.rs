//! eerc-common
//!
//! Shared data model, capability traits and ABI helpers for the eERC
//! converter orchestrator.
//!
//! The orchestrator moves value between a public ERC-20 balance and an
//! encrypted ("private") eERC balance. Everything it talks to lives behind
//! the traits in [`capabilities`]:
//!
//! ```text
//! ┌───────────────────┐   ┌───────────────────┐   ┌───────────────────┐
//! │   ChainClient     │   │  WalletConnector  │   │     EercSdk       │
//! │ • eth_call reads  │   │ • connect / chain │   │ • key generation  │
//! │ • receipt waits   │   │ • sign-and-send   │   │ • proof-backed tx │
//! └─────────┬─────────┘   └─────────┬─────────┘   └─────────┬─────────┘
//!           └───────────────┬───────┴───────────────────────┘
//!                           ▼
//!                 eerc-wallet-state (orchestration core)
//! ```

pub mod capabilities;
pub mod config;
pub mod contracts;
pub mod error;
pub mod types;
pub mod units;

pub use capabilities::{
    ChainClient, ConnectorPreferenceStore, EercSdk, MemoryPreferenceStore, WalletConnector,
};
pub use config::{ChainProfile, CircuitAsset, CircuitConfig, OrchestratorConfig, SettlePolicy};
pub use contracts::ContractCall;
pub use error::{normalize_message, AmountError, ExternalError, PreconditionError};
pub use types::*;
pub use units::{
    format_atomic, resolve_erc20_decimals, resolve_private_decimals, to_atomic, validate_amount,
};

/// Avalanche C-Chain id.
pub const AVALANCHE_CHAIN_ID: u64 = 43114;

/// Burrito ERC-20 token (the public side of the converter).
pub const BURRITO_TOKEN: &str = "0xf65645a42609f6b44E2EC158A3Dc2b6CfC97093f";

/// eERC converter contract (spender for deposits).
pub const EERC_CONTRACT: &str = "0x2f1836b1a43B49CeF81B52a0C5b850d67030c020";

/// Fallback ERC-20 decimals when `decimals()` cannot be read.
pub const DEFAULT_ERC20_DECIMALS: u32 = 18;

/// Fallback eERC private decimals when the reported value is absent or invalid.
pub const DEFAULT_PRIVATE_DECIMALS: u32 = 2;

/// Upper bound (inclusive) for any decimal count the orchestrator accepts.
pub const MAX_DECIMALS: u32 = 36;
