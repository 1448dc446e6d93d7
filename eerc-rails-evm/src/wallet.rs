//! Key-backed wallet connector.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use eerc_common::{
    Connection, ConnectorInfo, ConnectorKind, ContractCall, ExternalError, WalletConnector,
};
use ethers::{
    prelude::*,
    types::{Address, TxHash},
};
use tracing::{debug, info};

use crate::error::external_error;
use crate::LOCAL_CONNECTOR_ID;

/// Signs with a private key held by this process.
///
/// The connector is bound to the chain of its RPC endpoint, so
/// `switch_chain` only succeeds for that chain.
pub struct LocalWalletConnector {
    client: Arc<SignerMiddleware<Provider<Http>, LocalWallet>>,
    chain_id: u64,
}

impl LocalWalletConnector {
    pub fn new(rpc_url: &str, private_key: &str, chain_id: u64) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .with_context(|| format!("Failed to create HTTP provider for {rpc_url}"))?;
        let wallet = private_key
            .trim()
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .context("Invalid private key")?
            .with_chain_id(chain_id);
        let client = SignerMiddleware::new(provider, wallet);
        Ok(Self {
            client: Arc::new(client),
            chain_id,
        })
    }

    pub fn address(&self) -> Address {
        self.client.address()
    }
}

#[async_trait]
impl WalletConnector for LocalWalletConnector {
    fn info(&self) -> ConnectorInfo {
        ConnectorInfo {
            id: LOCAL_CONNECTOR_ID.to_string(),
            name: "Local key".to_string(),
            kind: ConnectorKind::Local,
        }
    }

    async fn connect(&self) -> Result<Connection, ExternalError> {
        let chain_id = self.chain_id().await?;
        info!(address = ?self.address(), chain_id, "local signer ready");
        Ok(Connection {
            accounts: vec![self.address()],
            chain_id,
        })
    }

    async fn disconnect(&self) -> Result<(), ExternalError> {
        Ok(())
    }

    async fn chain_id(&self) -> Result<u64, ExternalError> {
        let id = self
            .client
            .provider()
            .get_chainid()
            .await
            .map_err(external_error)?;
        Ok(id.as_u64())
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), ExternalError> {
        let current = self.chain_id().await?;
        if current == chain_id && chain_id == self.chain_id {
            return Ok(());
        }
        Err(ExternalError::with_short(
            "Unsupported chain",
            format!(
                "local signer is bound to chain {} (rpc reports {current}); cannot switch to {chain_id}",
                self.chain_id
            ),
        ))
    }

    async fn send_transaction(
        &self,
        from: Address,
        call: &ContractCall,
    ) -> Result<TxHash, ExternalError> {
        if from != self.address() {
            return Err(ExternalError::with_short(
                "Account mismatch",
                format!("asked to sign for {from:?}, key controls {:?}", self.address()),
            ));
        }
        let tx = TransactionRequest::new()
            .from(from)
            .to(call.to)
            .data(call.calldata());
        debug!(%call, "sending transaction");
        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(external_error)?;
        let tx_hash = pending.tx_hash();
        info!(%call, tx_hash = ?tx_hash, "transaction sent");
        Ok(tx_hash)
    }
}
