//! External collaborators of the orchestration core.
//!
//! Each trait is an async capability; nothing here knows about ethers
//! providers, browser wallets or proof circuits. Implementations live in
//! `eerc-rails-evm` (chain + key-backed wallet) and in the host that embeds
//! the eERC SDK.

use std::sync::Mutex;

use async_trait::async_trait;
use ethers_core::types::{Address, Bytes, TxHash, U256};

use crate::contracts::ContractCall;
use crate::error::ExternalError;
use crate::types::{AuditorKey, Connection, ConnectorInfo, IdentityState, RawBalance, TxReceipt};

/// Read-only chain access plus receipt waiting.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// `eth_call` of `call` against the latest block; returns the raw output.
    async fn call(&self, call: &ContractCall) -> Result<Bytes, ExternalError>;

    /// Block until `tx_hash` is mined.
    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TxReceipt, ExternalError>;
}

/// A wallet connector: connection lifecycle, chain control and signing.
#[async_trait]
pub trait WalletConnector: Send + Sync {
    fn info(&self) -> ConnectorInfo;

    async fn connect(&self) -> Result<Connection, ExternalError>;

    async fn disconnect(&self) -> Result<(), ExternalError>;

    async fn chain_id(&self) -> Result<u64, ExternalError>;

    /// Ask the wallet to move to `chain_id`. Users may reject.
    async fn switch_chain(&self, chain_id: u64) -> Result<(), ExternalError>;

    /// Sign and broadcast `call` from `from`; returns once broadcast.
    async fn send_transaction(
        &self,
        from: Address,
        call: &ContractCall,
    ) -> Result<TxHash, ExternalError>;
}

/// The encrypted-balance SDK, consumed as an opaque capability.
///
/// Proof generation happens inside the SDK; state-changing calls return
/// the hash of the broadcast transaction.
#[async_trait]
pub trait EercSdk: Send + Sync {
    /// Current key / registration presence for the connected account.
    async fn identity(&self) -> Result<IdentityState, ExternalError>;

    /// Derive the local decryption key (wallet signature, no transaction).
    async fn generate_decryption_key(&self) -> Result<(), ExternalError>;

    async fn register(&self) -> Result<TxHash, ExternalError>;

    async fn is_address_registered(&self, address: Address) -> Result<bool, ExternalError>;

    async fn auditor_public_key(&self) -> Result<AuditorKey, ExternalError>;

    async fn deposit(&self, atomic_amount: U256) -> Result<TxHash, ExternalError>;

    async fn withdraw(&self, atomic_amount: U256) -> Result<TxHash, ExternalError>;

    async fn private_transfer(
        &self,
        to: Address,
        atomic_amount: U256,
    ) -> Result<TxHash, ExternalError>;

    /// Ask the SDK to re-read and re-decrypt the on-chain balance.
    async fn refetch_balance(&self) -> Result<(), ExternalError>;

    /// The SDK's latest decrypted snapshot.
    async fn balance(&self) -> Result<RawBalance, ExternalError>;
}

/// Best-effort memory of the last connector used.
pub trait ConnectorPreferenceStore: Send + Sync {
    fn load(&self) -> Option<String>;
    fn save(&self, connector_id: &str);
    fn clear(&self);
}

/// Preference store that forgets on restart.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    last: Mutex<Option<String>>,
}

impl ConnectorPreferenceStore for MemoryPreferenceStore {
    fn load(&self) -> Option<String> {
        self.last.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn save(&self, connector_id: &str) {
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = Some(connector_id.to_string());
    }

    fn clear(&self) {
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}
