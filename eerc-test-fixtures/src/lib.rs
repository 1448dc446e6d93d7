//! Scripted capabilities for orchestrator tests.
//!
//! Every fake shares one [`CallLog`], so a test can assert the exact order
//! of external calls across the chain client, the wallet and the SDK.
//! Timestamps come from `tokio::time::Instant` and are therefore virtual
//! under `start_paused = true`.

mod chain;
mod sdk;
mod wallet;

use std::sync::{Arc, Mutex};

use eerc_common::{ConnectorKind, OrchestratorConfig};
use ethers_core::types::{Address, TxHash, U256};
use once_cell::sync::Lazy;
use tokio::time::Instant;

pub use chain::ScriptedChain;
pub use sdk::ScriptedSdk;
pub use wallet::ScriptedWallet;

/// Account the scripted wallet connects as.
pub static ALICE: Lazy<Address> = Lazy::new(|| Address::repeat_byte(0xa1));

/// A second registered counterparty.
pub static BOB: Lazy<Address> = Lazy::new(|| Address::repeat_byte(0xb0));

/// An address nobody registered.
pub static MALLORY: Lazy<Address> = Lazy::new(|| Address::repeat_byte(0x66));

/// One external call, as observed by a fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    // chain client
    ReadAllowance { owner: Address, spender: Address },
    ReadDecimals,
    Read(&'static str),
    WaitReceipt(TxHash),
    // wallet
    Connect(String),
    Disconnect(String),
    ChainId,
    SwitchChain(u64),
    Approve { spender: Address, amount: U256 },
    Send(&'static str),
    // sdk
    Identity,
    GenerateKey,
    Register,
    IsRegistered(Address),
    AuditorKey,
    Deposit(U256),
    Withdraw(U256),
    PrivateTransfer(Address, U256),
    RefetchBalance,
    ReadBalance,
}

impl Call {
    /// Calls that reach the chain or move funds (everything but local SDK
    /// bookkeeping and wallet handshakes).
    pub fn touches_chain(&self) -> bool {
        !matches!(
            self,
            Call::Connect(_) | Call::Disconnect(_) | Call::ChainId | Call::Identity
        )
    }
}

/// Ordered, timestamped record of calls shared between fakes.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<(Instant, Call)>>>,
}

impl CallLog {
    pub fn record(&self, call: Call) {
        self.lock().push((Instant::now(), call));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn entries(&self) -> Vec<(Instant, Call)> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.lock().iter().filter(|(_, c)| pred(c)).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(Instant, Call)>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Deterministic transaction hash for the `n`-th broadcast of a fake.
pub fn tx_hash(n: u64) -> TxHash {
    TxHash::from_low_u64_be(n)
}

/// `amount` whole tokens at `decimals` places.
pub fn tokens(amount: u64, decimals: u32) -> U256 {
    U256::from(amount) * U256::exp10(decimals as usize)
}

/// Fakes wired to one log. The wallet answers as Alice on the configured
/// chain; Alice holds a key and is registered, and so is Bob.
pub struct Harness {
    pub config: OrchestratorConfig,
    pub log: CallLog,
    pub chain: Arc<ScriptedChain>,
    pub wallet: Arc<ScriptedWallet>,
    pub sdk: Arc<ScriptedSdk>,
}

impl Harness {
    pub fn new() -> Self {
        let config = OrchestratorConfig::default();
        let log = CallLog::default();
        let chain = Arc::new(ScriptedChain::new(log.clone()));
        let wallet = Arc::new(ScriptedWallet::new(
            log.clone(),
            "injected",
            ConnectorKind::Injected,
            *ALICE,
            config.chain.chain_id,
        ));
        let sdk = Arc::new(ScriptedSdk::new(log.clone()));
        sdk.set_registered(*BOB);
        Self {
            config,
            log,
            chain,
            wallet,
            sdk,
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
