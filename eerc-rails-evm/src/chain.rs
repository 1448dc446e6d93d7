//! HTTP chain client.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use eerc_common::{ChainClient, ContractCall, ExternalError, TxReceipt};
use ethers::{
    prelude::*,
    types::{transaction::eip2718::TypedTransaction, Bytes, TxHash},
};
use tracing::debug;

use crate::error::external_error;

/// Read-only `ChainClient` over an HTTP provider.
#[derive(Clone)]
pub struct EvmChainClient {
    provider: Arc<Provider<Http>>,
    confirmations: usize,
    receipt_timeout: Duration,
}

impl EvmChainClient {
    pub fn new(rpc_url: &str) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .with_context(|| format!("Failed to create HTTP provider for {rpc_url}"))?
            .interval(Duration::from_millis(500));
        Ok(Self {
            provider: Arc::new(provider),
            confirmations: 1,
            receipt_timeout: Duration::from_secs(120),
        })
    }

    pub fn with_confirmations(mut self, confirmations: usize) -> Self {
        self.confirmations = confirmations.max(1);
        self
    }

    pub fn with_receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }

    pub fn provider(&self) -> Arc<Provider<Http>> {
        Arc::clone(&self.provider)
    }

    pub async fn chain_id(&self) -> Result<u64, ExternalError> {
        let id = self.provider.get_chainid().await.map_err(external_error)?;
        Ok(id.as_u64())
    }
}

#[async_trait]
impl ChainClient for EvmChainClient {
    async fn call(&self, call: &ContractCall) -> Result<Bytes, ExternalError> {
        debug!(%call, "eth_call");
        let tx: TypedTransaction = TransactionRequest::new()
            .to(call.to)
            .data(call.calldata())
            .into();
        self.provider
            .call(&tx, None)
            .await
            .map_err(external_error)
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TxReceipt, ExternalError> {
        let pending = PendingTransaction::new(tx_hash, self.provider.as_ref())
            .confirmations(self.confirmations);
        let receipt = tokio::time::timeout(self.receipt_timeout, pending)
            .await
            .map_err(|_| {
                ExternalError::with_short(
                    "Timed out waiting for confirmation",
                    format!("no receipt for {tx_hash:?} after {:?}", self.receipt_timeout),
                )
            })?
            .map_err(external_error)?
            .ok_or_else(|| {
                ExternalError::with_short(
                    "Transaction dropped",
                    format!("{tx_hash:?} left the mempool without a receipt"),
                )
            })?;

        Ok(TxReceipt {
            tx_hash,
            success: receipt.status == Some(U64::one()),
            block_number: receipt.block_number.map(|n| n.as_u64()),
        })
    }
}
