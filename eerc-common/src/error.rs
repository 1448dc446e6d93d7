//! Error taxonomy shared by every orchestrator crate.

use std::fmt;

use thiserror::Error;

/// Uniform error shape returned by every external capability.
///
/// Adapters fill `short_message` with the most legible reason they have
/// (a revert string, a JSON-RPC error message, a wallet rejection) and keep
/// the full low-level rendering in `message`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalError {
    pub short_message: Option<String>,
    pub message: String,
}

impl ExternalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            short_message: None,
            message: message.into(),
        }
    }

    pub fn with_short(short_message: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            short_message: Some(short_message.into()),
            message: message.into(),
        }
    }

    /// The user-facing text, or `None` when the error carries no text at all.
    pub fn user_message(&self) -> Option<&str> {
        self.short_message
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or_else(|| Some(self.message.trim()).filter(|s| !s.is_empty()))
    }
}

impl std::error::Error for ExternalError {}

impl fmt::Display for ExternalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.user_message().unwrap_or("unknown error"))
    }
}

/// Prefer the short message, then the generic message, then `fallback`.
pub fn normalize_message(err: &ExternalError, fallback: &str) -> String {
    err.user_message().unwrap_or(fallback).to_string()
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRECONDITIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Failed pre-condition of a user-triggered operation.
///
/// Detected before any external call; the `Display` text is the
/// user-legible reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("Connect your wallet first")]
    NotConnected,

    #[error("Enter a valid amount")]
    InvalidAmount,

    #[error("Generate your decryption key first")]
    MissingDecryptionKey,

    #[error("Register first")]
    NotRegistered,

    #[error("Enter a recipient address")]
    MissingRecipient,

    #[error("Invalid recipient address: {0}")]
    InvalidRecipient(String),

    #[error("Recipient is not registered in eERC")]
    RecipientNotRegistered,

    #[error("Please switch to {0}")]
    WrongNetwork(String),
}

/// Unit conversion failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,

    #[error("amount is not a decimal number: {0}")]
    Malformed(String),

    #[error("amount must be greater than zero")]
    NotPositive,

    #[error("unsupported decimal count: {0}")]
    Decimals(u32),

    #[error("conversion failed: {0}")]
    Conversion(String),
}

impl From<AmountError> for PreconditionError {
    fn from(_: AmountError) -> Self {
        PreconditionError::InvalidAmount
    }
}
