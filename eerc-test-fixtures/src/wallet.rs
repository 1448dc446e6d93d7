use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use eerc_common::{
    Connection, ConnectorInfo, ConnectorKind, ContractCall, ExternalError, WalletConnector,
};
use ethers_core::{
    abi::Token,
    types::{Address, TxHash},
};

use crate::{tx_hash, Call, CallLog};

struct WalletState {
    chain_id: u64,
    connect_error: Option<ExternalError>,
    switch_error: Option<ExternalError>,
    send_outcomes: VecDeque<Result<(), ExternalError>>,
    sent: u64,
}

/// Wallet connector that signs everything it is asked to, unless scripted
/// otherwise.
pub struct ScriptedWallet {
    log: CallLog,
    id: String,
    kind: ConnectorKind,
    account: Address,
    state: Mutex<WalletState>,
}

impl ScriptedWallet {
    pub fn new(log: CallLog, id: &str, kind: ConnectorKind, account: Address, chain_id: u64) -> Self {
        Self {
            log,
            id: id.to_string(),
            kind,
            account,
            state: Mutex::new(WalletState {
                chain_id,
                connect_error: None,
                switch_error: None,
                send_outcomes: VecDeque::new(),
                sent: 0,
            }),
        }
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub fn set_chain_id(&self, chain_id: u64) {
        self.state().chain_id = chain_id;
    }

    pub fn fail_connect(&self, err: ExternalError) {
        self.state().connect_error = Some(err);
    }

    /// Make `switch_chain` fail (user rejection, unsupported chain, ...).
    pub fn reject_switch(&self, err: ExternalError) {
        self.state().switch_error = Some(err);
    }

    /// Queue the outcome of the next broadcast; unqueued sends succeed.
    pub fn script_send(&self, outcome: Result<(), ExternalError>) {
        self.state().send_outcomes.push_back(outcome);
    }

    /// Hash the next successful broadcast will return.
    pub fn next_tx_hash(&self) -> TxHash {
        tx_hash(self.state().sent + 1)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, WalletState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl WalletConnector for ScriptedWallet {
    fn info(&self) -> ConnectorInfo {
        ConnectorInfo {
            id: self.id.clone(),
            name: format!("Scripted {}", self.id),
            kind: self.kind,
        }
    }

    async fn connect(&self) -> Result<Connection, ExternalError> {
        self.log.record(Call::Connect(self.id.clone()));
        let state = self.state();
        if let Some(err) = &state.connect_error {
            return Err(err.clone());
        }
        Ok(Connection {
            accounts: vec![self.account],
            chain_id: state.chain_id,
        })
    }

    async fn disconnect(&self) -> Result<(), ExternalError> {
        self.log.record(Call::Disconnect(self.id.clone()));
        Ok(())
    }

    async fn chain_id(&self) -> Result<u64, ExternalError> {
        self.log.record(Call::ChainId);
        Ok(self.state().chain_id)
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), ExternalError> {
        self.log.record(Call::SwitchChain(chain_id));
        let mut state = self.state();
        if let Some(err) = &state.switch_error {
            return Err(err.clone());
        }
        state.chain_id = chain_id;
        Ok(())
    }

    async fn send_transaction(
        &self,
        _from: Address,
        call: &ContractCall,
    ) -> Result<TxHash, ExternalError> {
        if call.function() == "approve" {
            let spender = call.args.first().cloned().and_then(Token::into_address);
            let amount = call.args.get(1).cloned().and_then(Token::into_uint);
            self.log.record(Call::Approve {
                spender: spender.unwrap_or_default(),
                amount: amount.unwrap_or_default(),
            });
        } else {
            self.log.record(Call::Send(call.function()));
        }

        let mut state = self.state();
        if let Some(Err(err)) = state.send_outcomes.pop_front() {
            return Err(err);
        }
        state.sent += 1;
        Ok(tx_hash(state.sent))
    }
}
