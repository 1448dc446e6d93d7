//! Errors surfaced by the orchestration core.

use eerc_common::{normalize_message, ExternalError, OperationKind, PreconditionError};
use ethers_core::types::TxHash;
use thiserror::Error;

/// Failure of a user-triggered operation.
///
/// The `Display` text of every variant is already user-legible; it is what
/// lands in the operation's `last_error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorError {
    // ═══════════════════════════════════════════════════════════════════════════
    // Detected before any external call
    // ═══════════════════════════════════════════════════════════════════════════
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    /// Another run of the same kind is still in flight.
    #[error("Another {0} is already in progress")]
    Busy(OperationKind),

    // ═══════════════════════════════════════════════════════════════════════════
    // External failures
    // ═══════════════════════════════════════════════════════════════════════════
    /// Both the direct approve and the reset-and-retry fallback failed.
    #[error("{0}")]
    Approval(String),

    /// Wallet rejection, RPC failure or SDK failure while submitting.
    #[error("{message}")]
    Transaction { kind: OperationKind, message: String },

    /// Mined with a failed status.
    #[error("{} (transaction {tx_hash:?} reverted)", .kind.fallback_message())]
    Reverted { kind: OperationKind, tx_hash: TxHash },

    // ═══════════════════════════════════════════════════════════════════════════
    // Session
    // ═══════════════════════════════════════════════════════════════════════════
    #[error("Connector not available: {0}")]
    ConnectorUnavailable(String),

    #[error("{0}")]
    Session(String),
}

impl OrchestratorError {
    /// Normalised transaction failure for `kind`.
    pub fn transaction(kind: OperationKind, err: &ExternalError) -> Self {
        OrchestratorError::Transaction {
            kind,
            message: normalize_message(err, kind.fallback_message()),
        }
    }

    pub fn approval(err: &ExternalError) -> Self {
        OrchestratorError::Approval(normalize_message(
            err,
            OperationKind::Approve.fallback_message(),
        ))
    }

    pub fn is_precondition(&self) -> bool {
        matches!(self, OrchestratorError::Precondition(_))
    }
}
