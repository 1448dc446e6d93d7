//! eERC Wallet State
//!
//! Orchestration core for moving value between a public ERC-20 balance and
//! an encrypted eERC balance.
//!
//! # Components
//!
//! Leaves first:
//!
//! ```text
//! ConnectionSession   Session snapshot, connect / disconnect / switch-chain,
//!                     remembered connector, latest-only subscription
//! NetworkGuard        ensure_network() -> bool, never errors
//! AllowanceNegotiator read allowance, approve, reset-to-zero fallback
//! BalanceSynchronizer refresh + settle delay, bounded poll-until-changed
//! Executor            register, generate_key, deposit, private_transfer,
//!                     withdraw, approve, refresh
//! ```
//!
//! # Single-flight
//!
//! Each operation kind owns one slot in a [`FlightTable`]. A second trigger
//! of a kind that is still in flight is rejected with
//! [`OrchestratorError::Busy`]; nothing is queued. Status only moves
//! forward: `Validating → AwaitingSignature → AwaitingConfirmation →
//! Succeeded | Failed`.

pub mod allowance;
pub mod balance;
pub mod error;
pub mod executor;
pub mod flight;
pub mod network;
pub mod session;

pub use allowance::{AllowanceNegotiator, AllowanceOutcome};
pub use balance::BalanceSynchronizer;
pub use error::OrchestratorError;
pub use executor::{Executor, OperationReceipt, WalletView};
pub use flight::{FlightGuard, FlightTable};
pub use network::NetworkGuard;
pub use session::{ConnectionSession, ConnectorCatalogue};
