use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use eerc_common::{ChainClient, ContractCall, ExternalError, TxReceipt};
use ethers_core::{
    abi::{self, Token},
    types::{Bytes, TxHash, U256},
};
use tokio::sync::Notify;

use crate::{Call, CallLog};

#[derive(Default)]
struct ChainState {
    allowance: U256,
    allowance_error: Option<ExternalError>,
    decimals: Option<Result<u32, ExternalError>>,
    responses: HashMap<&'static str, Result<Vec<Token>, ExternalError>>,
    reverted: HashSet<TxHash>,
    receipt_error: Option<ExternalError>,
}

/// Chain client answering from scripted state.
pub struct ScriptedChain {
    log: CallLog,
    state: Mutex<ChainState>,
    receipt_gate: Mutex<Option<Arc<Notify>>>,
}

impl ScriptedChain {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            state: Mutex::new(ChainState::default()),
            receipt_gate: Mutex::new(None),
        }
    }

    pub fn set_allowance(&self, allowance: U256) {
        self.state().allowance = allowance;
    }

    pub fn fail_allowance_read(&self, err: ExternalError) {
        self.state().allowance_error = Some(err);
    }

    pub fn set_decimals(&self, decimals: Result<u32, ExternalError>) {
        self.state().decimals = Some(decimals);
    }

    /// Answer any other read of `function` with the ABI encoding of `tokens`.
    pub fn respond(&self, function: &'static str, tokens: Vec<Token>) {
        self.state().responses.insert(function, Ok(tokens));
    }

    pub fn fail_read(&self, function: &'static str, err: ExternalError) {
        self.state().responses.insert(function, Err(err));
    }

    /// Mine `tx_hash` with a failed status.
    pub fn revert(&self, tx_hash: TxHash) {
        self.state().reverted.insert(tx_hash);
    }

    pub fn fail_receipts(&self, err: ExternalError) {
        self.state().receipt_error = Some(err);
    }

    /// Park every receipt wait until the returned gate is notified.
    pub fn hold_receipts(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.receipt_gate.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&gate));
        gate
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ChainClient for ScriptedChain {
    async fn call(&self, call: &ContractCall) -> Result<Bytes, ExternalError> {
        let tokens = match call.function() {
            "allowance" => {
                let owner = call.args.first().cloned().and_then(Token::into_address);
                let spender = call.args.get(1).cloned().and_then(Token::into_address);
                self.log.record(Call::ReadAllowance {
                    owner: owner.unwrap_or_default(),
                    spender: spender.unwrap_or_default(),
                });
                let state = self.state();
                if let Some(err) = &state.allowance_error {
                    return Err(err.clone());
                }
                vec![Token::Uint(state.allowance)]
            }
            "decimals" => {
                self.log.record(Call::ReadDecimals);
                match self.state().decimals.clone() {
                    Some(Ok(d)) => vec![Token::Uint(U256::from(d))],
                    Some(Err(err)) => return Err(err),
                    None => vec![Token::Uint(U256::from(18u64))],
                }
            }
            function => {
                self.log.record(Call::Read(function));
                match self.state().responses.get(function).cloned() {
                    Some(Ok(tokens)) => tokens,
                    Some(Err(err)) => return Err(err),
                    None => {
                        return Err(ExternalError::with_short(
                            "execution reverted",
                            format!("no scripted response for {call}"),
                        ))
                    }
                }
            }
        };
        Ok(Bytes::from(abi::encode(&tokens)))
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TxReceipt, ExternalError> {
        self.log.record(Call::WaitReceipt(tx_hash));
        let gate = self
            .receipt_gate
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let state = self.state();
        if let Some(err) = &state.receipt_error {
            return Err(err.clone());
        }
        Ok(TxReceipt {
            tx_hash,
            success: !state.reverted.contains(&tx_hash),
            block_number: Some(1),
        })
    }
}
