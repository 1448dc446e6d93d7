//! Core data model of the orchestrator.

use std::fmt;

use ethers_core::{
    types::{Address, TxHash, U256},
    utils::to_checksum,
};
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// SESSION
// ═══════════════════════════════════════════════════════════════════════════════

/// Wallet connection snapshot.
///
/// Owned by the connection session and replaced wholesale on every
/// connect / disconnect / switch-chain result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub connected: bool,
    pub account: Option<Address>,
    pub chain_id: u64,
    /// Connector the session was established through.
    pub connector_id: Option<String>,
}

impl Session {
    /// A connected session must also carry an account.
    pub fn is_connected(&self) -> bool {
        self.connected && self.account.is_some()
    }

    pub fn is_wrong_network(&self, required_chain_id: u64) -> bool {
        self.is_connected() && self.chain_id != required_chain_id
    }
}

/// Result of a successful connector handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub accounts: Vec<Address>,
    pub chain_id: u64,
}

/// Wallet notifications folded into the session snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    AccountsChanged(Vec<Address>),
    ChainChanged(u64),
    Disconnected,
}

/// Family a connector belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorKind {
    /// Browser-injected provider (Core, Rabby, Brave, ...).
    Injected,
    MetaMask,
    CoinbaseWallet,
    /// QR / deep-link pairing; the only option inside iframes and on mobile.
    WalletConnect,
    /// Key held by this process.
    Local,
}

impl ConnectorKind {
    pub fn is_installed(&self) -> bool {
        matches!(self, Self::Injected | Self::MetaMask | Self::Local)
    }

    pub fn hint(&self) -> &'static str {
        match self {
            Self::Injected | Self::MetaMask => "Injected (browser)",
            Self::CoinbaseWallet => "Coinbase Wallet",
            Self::WalletConnect => "Mobile & Desktop (QR)",
            Self::Local => "Local key",
        }
    }
}

/// Catalogue entry describing a connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorInfo {
    pub id: String,
    pub name: String,
    pub kind: ConnectorKind,
}

// ═══════════════════════════════════════════════════════════════════════════════
// IDENTITY & BALANCE
// ═══════════════════════════════════════════════════════════════════════════════

/// Presence of the local decryption key and the on-chain registration.
///
/// The key material itself never enters this model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityState {
    pub has_decryption_key: bool,
    pub is_registered: bool,
}

impl IdentityState {
    pub fn is_ready(&self) -> bool {
        self.has_decryption_key && self.is_registered
    }
}

/// Balance snapshot as reported by the SDK, before normalisation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawBalance {
    /// Decrypted atomic value, if the SDK could decrypt it.
    pub decrypted: Option<U256>,
    /// Private decimal count as reported on-chain; may be absent or nonsense.
    pub decimals: Option<i64>,
}

/// Normalised private balance owned by the balance synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBalance {
    pub atomic_value: U256,
    /// Always within `1..=36`.
    pub decimals: u32,
}

/// Auditor public key configured on the converter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditorKey {
    pub x: U256,
    pub y: U256,
}

impl AuditorKey {
    /// `(0, 0)` is the unset marker.
    pub fn is_set(&self) -> bool {
        !self.x.is_zero() || !self.y.is_zero()
    }
}

/// Mined transaction as seen by the chain client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub success: bool,
    pub block_number: Option<u64>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// User-triggered operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Register,
    GenerateKey,
    Deposit,
    PrivateTransfer,
    Withdraw,
    Approve,
}

impl OperationKind {
    pub const ALL: [OperationKind; 6] = [
        Self::Register,
        Self::GenerateKey,
        Self::Deposit,
        Self::PrivateTransfer,
        Self::Withdraw,
        Self::Approve,
    ];

    /// Message shown when a failure carries no text of its own.
    pub fn fallback_message(&self) -> &'static str {
        match self {
            Self::Register => "Registration failed",
            Self::GenerateKey => "Failed to generate key",
            Self::Deposit => "Deposit failed",
            Self::PrivateTransfer => "Private transfer failed",
            Self::Withdraw => "Withdraw failed",
            Self::Approve => "Approve failed",
        }
    }

    /// Whether a successful run is expected to move the private balance.
    pub fn moves_value(&self) -> bool {
        matches!(self, Self::Deposit | Self::PrivateTransfer | Self::Withdraw)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Register => "register",
            Self::GenerateKey => "generate_key",
            Self::Deposit => "deposit",
            Self::PrivateTransfer => "private_transfer",
            Self::Withdraw => "withdraw",
            Self::Approve => "approve",
        };
        f.write_str(label)
    }
}

/// Lifecycle of a pending operation. Transitions only move forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    #[default]
    Idle,
    Validating,
    AwaitingSignature,
    AwaitingConfirmation,
    Succeeded,
    Failed,
}

impl OperationStatus {
    fn rank(&self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Validating => 1,
            Self::AwaitingSignature => 2,
            Self::AwaitingConfirmation => 3,
            Self::Succeeded | Self::Failed => 4,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// In flight: neither idle nor terminal.
    pub fn is_busy(&self) -> bool {
        !self.is_terminal() && *self != Self::Idle
    }

    /// Steps may be skipped but never revisited; terminal states are final.
    pub fn can_advance_to(&self, next: OperationStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

/// In-flight record of one user-triggered operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub kind: OperationKind,
    pub required_amount: Option<U256>,
    pub status: OperationStatus,
    pub result_tx_hash: Option<TxHash>,
    pub last_error: Option<String>,
}

impl PendingOperation {
    pub fn idle(kind: OperationKind) -> Self {
        Self {
            kind,
            required_amount: None,
            status: OperationStatus::Idle,
            result_tx_hash: None,
            last_error: None,
        }
    }

    /// Move to `next`; returns `false` (and leaves the record untouched) on
    /// a backward or post-terminal transition.
    pub fn advance(&mut self, next: OperationStatus) -> bool {
        if !self.status.can_advance_to(next) {
            return false;
        }
        self.status = next;
        true
    }

    pub fn view(&self) -> OperationView {
        OperationView {
            is_busy: self.status.is_busy(),
            last_error: self.last_error.clone(),
            last_tx_hash: self.result_tx_hash,
        }
    }
}

/// What the presentation layer sees of a trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationView {
    pub is_busy: bool,
    pub last_error: Option<String>,
    pub last_tx_hash: Option<TxHash>,
}

/// `0xAbCd…1234` rendering of an address (checksummed).
pub fn short_address(address: &Address) -> String {
    let full = to_checksum(address, None);
    format!("{}…{}", &full[..6], &full[full.len() - 4..])
}
