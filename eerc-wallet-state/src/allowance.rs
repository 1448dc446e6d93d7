//! ERC-20 allowance negotiation.
//!
//! Allowances are read from chain on every negotiation and never cached.
//! When a direct `approve(spender, amount)` fails, the negotiator resets the
//! allowance to zero and retries once: some tokens revert on a non-zero to
//! non-zero change.

use std::sync::Arc;

use eerc_common::{
    contracts::{self, erc20},
    ChainClient, ExternalError, WalletConnector,
};
use ethers_core::types::{Address, TxHash, U256};
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AllowanceOutcome {
    pub approved: bool,
    /// Hash of the approve that settled it; `None` on the fast path.
    pub tx_hash: Option<TxHash>,
}

pub struct AllowanceNegotiator {
    chain: Arc<dyn ChainClient>,
    token: Address,
}

impl AllowanceNegotiator {
    pub fn new(chain: Arc<dyn ChainClient>, token: Address) -> Self {
        Self { chain, token }
    }

    pub fn token(&self) -> Address {
        self.token
    }

    /// Read-only allowance lookup.
    pub async fn current_allowance(
        &self,
        owner: Address,
        spender: Address,
    ) -> Result<U256, ExternalError> {
        contracts::read_allowance(self.chain.as_ref(), self.token, owner, spender).await
    }

    /// Make sure `spender` may move at least `required` of `owner`'s tokens.
    ///
    /// If the direct approve fails and so does the zero reset, the error of
    /// the direct approve is returned.
    pub async fn ensure_allowance(
        &self,
        wallet: &dyn WalletConnector,
        owner: Address,
        spender: Address,
        required: U256,
    ) -> Result<AllowanceOutcome, ExternalError> {
        let current = self.current_allowance(owner, spender).await?;
        if current >= required {
            debug!(%current, %required, "allowance sufficient");
            return Ok(AllowanceOutcome {
                approved: true,
                tx_hash: None,
            });
        }

        let original = match self.approve(wallet, owner, spender, required).await {
            Ok(tx_hash) => {
                info!(%required, tx_hash = ?tx_hash, "allowance approved");
                return Ok(AllowanceOutcome {
                    approved: true,
                    tx_hash: Some(tx_hash),
                });
            }
            Err(e) => e,
        };

        warn!(error = %original, "direct approve failed; resetting allowance to zero");
        if let Err(reset) = self.approve(wallet, owner, spender, U256::zero()).await {
            warn!(error = %reset, "allowance reset failed");
            return Err(original);
        }

        let tx_hash = self.approve(wallet, owner, spender, required).await?;
        info!(%required, tx_hash = ?tx_hash, "allowance approved after reset");
        Ok(AllowanceOutcome {
            approved: true,
            tx_hash: Some(tx_hash),
        })
    }

    /// Send one approve and wait for it to be mined successfully.
    async fn approve(
        &self,
        wallet: &dyn WalletConnector,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> Result<TxHash, ExternalError> {
        let call = erc20::approve(self.token, spender, amount);
        let tx_hash = wallet.send_transaction(owner, &call).await?;
        let receipt = self.chain.wait_for_receipt(tx_hash).await?;
        if !receipt.success {
            return Err(ExternalError::with_short(
                "Approve transaction reverted",
                format!("approve({spender:?}, {amount}) reverted in {tx_hash:?}"),
            ));
        }
        Ok(tx_hash)
    }
}
