use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use eerc_common::{
    AuditorKey, EercSdk, ExternalError, IdentityState, OperationKind, RawBalance,
};
use ethers_core::types::{Address, TxHash, U256};

use crate::{tx_hash, Call, CallLog};

/// SDK hashes live above the wallet's so the two never collide in a log.
const SDK_TX_BASE: u64 = 1_000;

struct SdkState {
    identity: IdentityState,
    registered: HashSet<Address>,
    auditor: AuditorKey,
    /// Head is the current snapshot; `refetch_balance` advances while more
    /// than one is queued.
    balances: VecDeque<RawBalance>,
    failures: HashMap<OperationKind, ExternalError>,
    identity_error: Option<ExternalError>,
    lookup_error: Option<ExternalError>,
    auditor_error: Option<ExternalError>,
    refetch_error: Option<ExternalError>,
    sent: u64,
}

/// eERC SDK stand-in. Starts with a key, a registration, a set auditor and
/// an empty balance at 2 decimals.
pub struct ScriptedSdk {
    log: CallLog,
    state: Mutex<SdkState>,
}

impl ScriptedSdk {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            state: Mutex::new(SdkState {
                identity: IdentityState {
                    has_decryption_key: true,
                    is_registered: true,
                },
                registered: HashSet::new(),
                auditor: AuditorKey {
                    x: U256::from(1u64),
                    y: U256::from(2u64),
                },
                balances: VecDeque::from([RawBalance {
                    decrypted: Some(U256::zero()),
                    decimals: Some(2),
                }]),
                failures: HashMap::new(),
                identity_error: None,
                lookup_error: None,
                auditor_error: None,
                refetch_error: None,
                sent: 0,
            }),
        }
    }

    pub fn set_identity(&self, identity: IdentityState) {
        self.state().identity = identity;
    }

    /// Mark `address` as registered for recipient lookups.
    pub fn set_registered(&self, address: Address) {
        self.state().registered.insert(address);
    }

    pub fn set_auditor(&self, key: AuditorKey) {
        self.state().auditor = key;
    }

    /// Replace the current snapshot.
    pub fn set_balance(&self, balance: RawBalance) {
        let mut state = self.state();
        state.balances.clear();
        state.balances.push_back(balance);
    }

    /// Queue a snapshot that becomes visible after the next refetch.
    pub fn push_balance(&self, balance: RawBalance) {
        self.state().balances.push_back(balance);
    }

    /// Make the SDK call behind `kind` fail with `err`.
    pub fn fail(&self, kind: OperationKind, err: ExternalError) {
        self.state().failures.insert(kind, err);
    }

    pub fn fail_identity(&self, err: ExternalError) {
        self.state().identity_error = Some(err);
    }

    pub fn fail_registration_lookup(&self, err: ExternalError) {
        self.state().lookup_error = Some(err);
    }

    pub fn fail_auditor(&self, err: ExternalError) {
        self.state().auditor_error = Some(err);
    }

    pub fn fail_refetch(&self, err: ExternalError) {
        self.state().refetch_error = Some(err);
    }

    /// Hash the next successful state-changing call will return.
    pub fn next_tx_hash(&self) -> TxHash {
        tx_hash(SDK_TX_BASE + self.state().sent + 1)
    }

    fn broadcast(&self, kind: OperationKind) -> Result<TxHash, ExternalError> {
        let mut state = self.state();
        if let Some(err) = state.failures.get(&kind) {
            return Err(err.clone());
        }
        state.sent += 1;
        Ok(tx_hash(SDK_TX_BASE + state.sent))
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SdkState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl EercSdk for ScriptedSdk {
    async fn identity(&self) -> Result<IdentityState, ExternalError> {
        self.log.record(Call::Identity);
        let state = self.state();
        match &state.identity_error {
            Some(err) => Err(err.clone()),
            None => Ok(state.identity),
        }
    }

    async fn generate_decryption_key(&self) -> Result<(), ExternalError> {
        self.log.record(Call::GenerateKey);
        let mut state = self.state();
        if let Some(err) = state.failures.get(&OperationKind::GenerateKey) {
            return Err(err.clone());
        }
        state.identity.has_decryption_key = true;
        Ok(())
    }

    async fn register(&self) -> Result<TxHash, ExternalError> {
        self.log.record(Call::Register);
        let hash = self.broadcast(OperationKind::Register)?;
        self.state().identity.is_registered = true;
        Ok(hash)
    }

    async fn is_address_registered(&self, address: Address) -> Result<bool, ExternalError> {
        self.log.record(Call::IsRegistered(address));
        let state = self.state();
        match &state.lookup_error {
            Some(err) => Err(err.clone()),
            None => Ok(state.registered.contains(&address)),
        }
    }

    async fn auditor_public_key(&self) -> Result<AuditorKey, ExternalError> {
        self.log.record(Call::AuditorKey);
        let state = self.state();
        match &state.auditor_error {
            Some(err) => Err(err.clone()),
            None => Ok(state.auditor),
        }
    }

    async fn deposit(&self, atomic_amount: U256) -> Result<TxHash, ExternalError> {
        self.log.record(Call::Deposit(atomic_amount));
        self.broadcast(OperationKind::Deposit)
    }

    async fn withdraw(&self, atomic_amount: U256) -> Result<TxHash, ExternalError> {
        self.log.record(Call::Withdraw(atomic_amount));
        self.broadcast(OperationKind::Withdraw)
    }

    async fn private_transfer(
        &self,
        to: Address,
        atomic_amount: U256,
    ) -> Result<TxHash, ExternalError> {
        self.log.record(Call::PrivateTransfer(to, atomic_amount));
        self.broadcast(OperationKind::PrivateTransfer)
    }

    async fn refetch_balance(&self) -> Result<(), ExternalError> {
        self.log.record(Call::RefetchBalance);
        let mut state = self.state();
        if let Some(err) = &state.refetch_error {
            return Err(err.clone());
        }
        if state.balances.len() > 1 {
            state.balances.pop_front();
        }
        Ok(())
    }

    async fn balance(&self) -> Result<RawBalance, ExternalError> {
        self.log.record(Call::ReadBalance);
        Ok(self.state().balances.front().copied().unwrap_or_default())
    }
}
