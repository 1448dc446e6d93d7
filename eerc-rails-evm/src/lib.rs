//! eERC EVM rail
//!
//! `ethers` implementations of the orchestrator's chain-facing
//! capabilities:
//!
//! - [`EvmChainClient`]: `eth_call` reads and receipt waiting over HTTP.
//! - [`LocalWalletConnector`]: a private-key signer for operator tooling
//!   and headless runs.
//! - [`FilePreferenceStore`]: remembers the last connector in a JSON file.

mod chain;
mod error;
mod store;
mod wallet;

pub use chain::EvmChainClient;
pub use error::external_error;
pub use store::FilePreferenceStore;
pub use wallet::LocalWalletConnector;

/// Connector id of the key-backed wallet.
pub const LOCAL_CONNECTOR_ID: &str = "local";
