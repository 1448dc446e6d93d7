//! Orchestrator configuration.

use std::str::FromStr;
use std::time::Duration;

use ethers_core::types::{Address, TxHash};
use serde::{Deserialize, Serialize};

use crate::types::OperationKind;
use crate::{AVALANCHE_CHAIN_ID, BURRITO_TOKEN, EERC_CONTRACT};

/// Chain the orchestrator is pinned to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainProfile {
    pub chain_id: u64,
    pub name: String,
    pub rpc_url: String,
    /// Explorer prefix for transactions; the hash is appended.
    pub explorer_tx_url: String,
}

impl ChainProfile {
    pub fn avalanche() -> Self {
        Self {
            chain_id: AVALANCHE_CHAIN_ID,
            name: "Avalanche C-Chain".to_string(),
            rpc_url: "https://api.avax.network/ext/bc/C/rpc".to_string(),
            explorer_tx_url: "https://snowtrace.io/tx/".to_string(),
        }
    }

    pub fn tx_url(&self, tx_hash: &TxHash) -> String {
        format!("{}{:?}", self.explorer_tx_url, tx_hash)
    }
}

impl Default for ChainProfile {
    fn default() -> Self {
        Self::avalanche()
    }
}

/// Waits inserted around balance refreshes.
///
/// Confirmation and balance decryption are not atomic, so a refresh right
/// after a receipt may still show the old value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlePolicy {
    /// Before a value-moving call, when capturing the baseline.
    pub pre_operation_ms: u64,
    /// After a state-changing call.
    pub post_operation_ms: u64,
    /// After an explicit user refresh.
    pub refresh_ms: u64,
    /// Upper bound of refresh rounds while waiting for a value-moving
    /// operation to show up in the balance. At least one round always runs.
    pub max_polls: u32,
}

impl SettlePolicy {
    pub fn pre_operation(&self) -> Duration {
        Duration::from_millis(self.pre_operation_ms)
    }

    pub fn post_operation(&self) -> Duration {
        Duration::from_millis(self.post_operation_ms)
    }

    pub fn refresh(&self) -> Duration {
        Duration::from_millis(self.refresh_ms)
    }
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            pre_operation_ms: 200,
            post_operation_ms: 300,
            refresh_ms: 250,
            max_polls: 3,
        }
    }
}

/// Everything the orchestration core needs to know about its deployment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub chain: ChainProfile,
    /// Public ERC-20 token.
    pub token: Address,
    /// eERC converter contract; spender of the token.
    pub converter: Address,
    pub settle: SettlePolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            chain: ChainProfile::avalanche(),
            token: Address::from_str(BURRITO_TOKEN).unwrap_or(Address::zero()),
            converter: Address::from_str(EERC_CONTRACT).unwrap_or(Address::zero()),
            settle: SettlePolicy::default(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CIRCUIT ASSETS
// ═══════════════════════════════════════════════════════════════════════════════

/// Location of one proof circuit: witness generator + proving key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitAsset {
    pub wasm: String,
    pub zkey: String,
}

impl CircuitAsset {
    fn under(base: &str, name: &str) -> Self {
        Self {
            wasm: format!("{base}/{name}.wasm"),
            zkey: format!("{base}/{name}.zkey"),
        }
    }
}

/// Circuit bundle handed to the SDK at construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitConfig {
    pub registration: CircuitAsset,
    pub transfer: CircuitAsset,
    pub withdraw: CircuitAsset,
    pub mint: CircuitAsset,
    pub burn: CircuitAsset,
}

impl CircuitConfig {
    /// Assets served from `<origin>/eerc`; relative `/eerc` when `origin` is
    /// empty. Provers resolve absolute URLs more reliably, so pass an origin
    /// whenever one is known.
    pub fn for_origin(origin: &str) -> Self {
        let origin = origin.trim().trim_end_matches('/');
        let base = if origin.is_empty() {
            "/eerc".to_string()
        } else {
            format!("{origin}/eerc")
        };
        Self {
            registration: CircuitAsset::under(&base, "registration"),
            transfer: CircuitAsset::under(&base, "transfer"),
            withdraw: CircuitAsset::under(&base, "withdraw"),
            mint: CircuitAsset::under(&base, "mint"),
            burn: CircuitAsset::under(&base, "burn"),
        }
    }

    /// Circuit backing an operation, if it needs a proof in converter mode.
    pub fn for_operation(&self, kind: OperationKind) -> Option<&CircuitAsset> {
        match kind {
            OperationKind::Register => Some(&self.registration),
            OperationKind::PrivateTransfer => Some(&self.transfer),
            OperationKind::Withdraw => Some(&self.withdraw),
            OperationKind::GenerateKey | OperationKind::Deposit | OperationKind::Approve => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_addresses_parse() {
        let config = OrchestratorConfig::default();
        assert!(!config.token.is_zero());
        assert!(!config.converter.is_zero());
        assert_eq!(config.chain.chain_id, 43114);
    }

    #[test]
    fn circuits_are_absolute_under_origin() {
        let circuits = CircuitConfig::for_origin("https://app.example.org/");
        assert_eq!(
            circuits.registration.wasm,
            "https://app.example.org/eerc/registration.wasm"
        );
        assert_eq!(circuits.burn.zkey, "https://app.example.org/eerc/burn.zkey");
    }

    #[test]
    fn circuits_fall_back_to_relative_path() {
        let circuits = CircuitConfig::for_origin("");
        assert_eq!(circuits.transfer.zkey, "/eerc/transfer.zkey");
        assert_eq!(
            circuits.for_operation(OperationKind::Withdraw),
            Some(&circuits.withdraw)
        );
        assert_eq!(circuits.for_operation(OperationKind::Deposit), None);
    }

    #[test]
    fn explorer_link_embeds_full_hash() {
        let hash = TxHash::repeat_byte(0xab);
        let url = ChainProfile::avalanche().tx_url(&hash);
        assert!(url.starts_with("https://snowtrace.io/tx/0xabab"));
        assert_eq!(url.len(), "https://snowtrace.io/tx/".len() + 66);
    }

    #[test]
    fn settle_policy_partial_override() {
        let policy: SettlePolicy = serde_json::from_str(r#"{"max_polls": 1}"#).unwrap();
        assert_eq!(policy.max_polls, 1);
        assert_eq!(policy.post_operation(), Duration::from_millis(300));
    }
}
