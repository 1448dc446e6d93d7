//! Asset operation executor.
//!
//! Every trigger follows the same shape:
//!
//! ```text
//! claim single-flight slot ──► Validating
//!     pre-conditions, in order, short-circuit on the first failure
//!     network guard
//! AwaitingSignature
//!     (deposit / approve) allowance negotiation
//!     SDK call ──► tx hash
//! AwaitingConfirmation ── handed off to a confirmation task
//!     receipt
//!     balance resync (errors logged, never surfaced)
//! Succeeded
//! ```
//!
//! Failures at any step end in `Failed` with a normalised message; nothing
//! is retried automatically. Dropping a trigger's future before broadcast
//! releases its slot. After broadcast the confirmation task owns the slot
//! and finishes it even if nobody awaits the trigger any more.

use std::sync::{Arc, Mutex, MutexGuard};

use eerc_common::{
    contracts, resolve_erc20_decimals, to_atomic, validate_amount, AuditorKey, ChainClient,
    ChainProfile, EercSdk, EncryptedBalance, IdentityState, OperationKind, OperationStatus,
    OperationView, OrchestratorConfig, PreconditionError, WalletConnector,
};
use ethers_core::types::{Address, TxHash, U256};
use serde::Serialize;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::allowance::{AllowanceNegotiator, AllowanceOutcome};
use crate::balance::BalanceSynchronizer;
use crate::error::OrchestratorError;
use crate::flight::{FlightGuard, FlightTable};
use crate::network::NetworkGuard;
use crate::session::ConnectionSession;

/// Successful completion of a trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationReceipt {
    pub kind: OperationKind,
    pub tx_hash: Option<TxHash>,
    pub explorer_url: Option<String>,
    pub atomic_amount: Option<U256>,
    /// Balance after the resync, when it could be read.
    pub balance: Option<EncryptedBalance>,
}

/// Read-only observables for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletView {
    pub is_registered: bool,
    pub has_decryption_key: bool,
    pub display_balance: Option<String>,
    pub erc20_decimals: Option<u32>,
    pub private_decimals: u32,
    pub is_wrong_network: bool,
}

/// Identity as last loaded, tagged with the account it belongs to.
#[derive(Debug, Default)]
struct Identity {
    account: Option<Address>,
    state: IdentityState,
    auditor: Option<AuditorKey>,
}

pub struct Executor {
    config: OrchestratorConfig,
    session: Arc<ConnectionSession>,
    chain: Arc<dyn ChainClient>,
    sdk: Arc<dyn EercSdk>,
    network: NetworkGuard,
    allowance: AllowanceNegotiator,
    balance: Arc<BalanceSynchronizer>,
    flights: Arc<FlightTable>,
    identity: Arc<Mutex<Identity>>,
    erc20_decimals: OnceCell<u32>,
}

impl Executor {
    pub fn new(
        config: OrchestratorConfig,
        session: Arc<ConnectionSession>,
        chain: Arc<dyn ChainClient>,
        sdk: Arc<dyn EercSdk>,
    ) -> Self {
        let network = NetworkGuard::new(Arc::clone(&session), config.chain.clone());
        let allowance = AllowanceNegotiator::new(Arc::clone(&chain), config.token);
        let balance = Arc::new(BalanceSynchronizer::new(Arc::clone(&sdk), config.settle.clone()));
        Self {
            config,
            session,
            chain,
            sdk,
            network,
            allowance,
            balance,
            flights: Arc::new(FlightTable::new()),
            identity: Arc::new(Mutex::new(Identity::default())),
            erc20_decimals: OnceCell::new(),
        }
    }

    pub fn session(&self) -> &ConnectionSession {
        &self.session
    }

    pub fn network(&self) -> &NetworkGuard {
        &self.network
    }

    pub fn allowance(&self) -> &AllowanceNegotiator {
        &self.allowance
    }

    pub fn balance(&self) -> &BalanceSynchronizer {
        &self.balance
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // OBSERVABLES
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn operation(&self, kind: OperationKind) -> OperationView {
        self.flights.view(kind)
    }

    pub fn status(&self, kind: OperationKind) -> OperationStatus {
        self.flights.get(kind).status
    }

    pub fn refresh_view(&self) -> OperationView {
        self.balance.refresh_view()
    }

    /// Identity of the connected account; all-false when it was loaded for
    /// another account or not at all.
    pub fn identity_state(&self) -> IdentityState {
        let current = self.session.snapshot().account;
        let identity = self.identity();
        if current.is_some() && identity.account == current {
            identity.state
        } else {
            IdentityState::default()
        }
    }

    pub fn view(&self) -> WalletView {
        let identity = self.identity_state();
        WalletView {
            is_registered: identity.is_registered,
            has_decryption_key: identity.has_decryption_key,
            display_balance: self.balance.display_balance(),
            erc20_decimals: self.erc20_decimals.get().copied(),
            private_decimals: self.balance.private_decimals(),
            is_wrong_network: self.network.is_wrong_network(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SYNC & REFRESH
    // ═══════════════════════════════════════════════════════════════════════════

    /// Load identity, auditor key and ERC-20 decimals for the connected
    /// account, then refresh the balance when the account is ready.
    ///
    /// Call after connecting and after every account change.
    pub async fn sync(&self) -> Result<IdentityState, OrchestratorError> {
        let Some(account) = self.session.snapshot().account else {
            *self.identity() = Identity::default();
            return Ok(IdentityState::default());
        };

        let state = self.sdk.identity().await.map_err(|e| {
            OrchestratorError::Session(eerc_common::normalize_message(
                &e,
                "Failed to load eERC identity",
            ))
        })?;
        let auditor = match self.sdk.auditor_public_key().await {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(error = %e, "could not read auditor public key");
                None
            }
        };
        *self.identity() = Identity {
            account: Some(account),
            state,
            auditor,
        };
        let decimals = self.erc20_decimals().await;
        debug!(account = ?account, ?state, erc20_decimals = decimals, "identity synced");

        if state.is_ready() {
            if let Err(e) = self.balance.refetch_balance().await {
                warn!(error = %e, "initial balance refresh failed");
            }
        }
        Ok(state)
    }

    /// Refresh trigger.
    pub async fn refresh(&self) -> Result<Option<EncryptedBalance>, OrchestratorError> {
        self.require_connected()?;
        self.balance.refetch_balance().await.map_err(|e| {
            OrchestratorError::Session(eerc_common::normalize_message(
                &e,
                "Failed to refresh balance",
            ))
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TRIGGERS
    // ═══════════════════════════════════════════════════════════════════════════

    pub async fn register(&self) -> Result<OperationReceipt, OrchestratorError> {
        let flight = self.flights.begin(OperationKind::Register)?;
        let result = self.run_register(&flight).await;
        finish(flight, result)
    }

    pub async fn generate_key(&self) -> Result<OperationReceipt, OrchestratorError> {
        let flight = self.flights.begin(OperationKind::GenerateKey)?;
        let result = self.run_generate_key(&flight).await;
        finish(flight, result)
    }

    pub async fn deposit(&self, amount: &str) -> Result<OperationReceipt, OrchestratorError> {
        let flight = self.flights.begin(OperationKind::Deposit)?;
        let result = self.run_deposit(&flight, amount).await;
        finish(flight, result)
    }

    pub async fn private_transfer(
        &self,
        to: &str,
        amount: &str,
    ) -> Result<OperationReceipt, OrchestratorError> {
        let flight = self.flights.begin(OperationKind::PrivateTransfer)?;
        let result = self.run_private_transfer(&flight, to, amount).await;
        finish(flight, result)
    }

    pub async fn withdraw(&self, amount: &str) -> Result<OperationReceipt, OrchestratorError> {
        let flight = self.flights.begin(OperationKind::Withdraw)?;
        let result = self.run_withdraw(&flight, amount).await;
        finish(flight, result)
    }

    /// Standalone approve of the converter for `amount` public tokens.
    pub async fn approve(&self, amount: &str) -> Result<OperationReceipt, OrchestratorError> {
        let flight = self.flights.begin(OperationKind::Approve)?;
        let result = self.run_approve(&flight, amount).await;
        finish(flight, result)
    }

    async fn run_register(
        &self,
        flight: &FlightGuard<'_>,
    ) -> Result<OperationReceipt, OrchestratorError> {
        let kind = flight.kind();
        self.require_connected()?;
        self.require_network().await?;

        flight.advance(OperationStatus::AwaitingSignature);
        let tx_hash = self
            .sdk
            .register()
            .await
            .map_err(|e| OrchestratorError::transaction(kind, &e))?;
        let balance = self.confirm(flight, tx_hash, None).await?;
        Ok(self.receipt(kind, Some(tx_hash), None, balance))
    }

    async fn run_generate_key(
        &self,
        flight: &FlightGuard<'_>,
    ) -> Result<OperationReceipt, OrchestratorError> {
        let kind = flight.kind();
        self.require_connected()?;
        self.require_network().await?;

        flight.advance(OperationStatus::AwaitingSignature);
        self.sdk
            .generate_decryption_key()
            .await
            .map_err(|e| OrchestratorError::transaction(kind, &e))?;
        self.identity().state.has_decryption_key = true;
        info!("decryption key generated");

        let balance = self.balance.settle_after(kind, None).await;
        Ok(self.receipt(kind, None, None, balance))
    }

    async fn run_deposit(
        &self,
        flight: &FlightGuard<'_>,
        amount: &str,
    ) -> Result<OperationReceipt, OrchestratorError> {
        let kind = flight.kind();
        let account = self.require_connected()?;
        validate_amount(amount).map_err(PreconditionError::from)?;
        let identity = self.identity_state();
        if !identity.has_decryption_key {
            return Err(PreconditionError::MissingDecryptionKey.into());
        }
        if !identity.is_registered {
            return Err(PreconditionError::NotRegistered.into());
        }
        self.warn_if_auditor_missing().await;
        self.require_network().await?;

        let decimals = self.erc20_decimals().await;
        let atomic = to_atomic(amount, decimals).map_err(PreconditionError::from)?;
        flight.set_required_amount(atomic);

        flight.advance(OperationStatus::AwaitingSignature);
        let wallet = self.require_wallet()?;
        self.negotiate(wallet.as_ref(), account, atomic).await?;

        let baseline = self.balance.cached_atomic_value();
        let tx_hash = self
            .submit(kind, atomic, || self.sdk.deposit(atomic))
            .await?;
        let balance = self.confirm(flight, tx_hash, Some(baseline)).await?;
        Ok(self.receipt(kind, Some(tx_hash), Some(atomic), balance))
    }

    async fn run_private_transfer(
        &self,
        flight: &FlightGuard<'_>,
        to: &str,
        amount: &str,
    ) -> Result<OperationReceipt, OrchestratorError> {
        let kind = flight.kind();
        self.require_connected()?;
        if !self.identity_state().has_decryption_key {
            return Err(PreconditionError::MissingDecryptionKey.into());
        }
        let to = to.trim();
        if to.is_empty() {
            return Err(PreconditionError::MissingRecipient.into());
        }
        let recipient: Address = to
            .parse()
            .map_err(|_| PreconditionError::InvalidRecipient(to.to_string()))?;
        validate_amount(amount).map_err(PreconditionError::from)?;
        self.require_network().await?;

        let registered = self
            .sdk
            .is_address_registered(recipient)
            .await
            .map_err(|e| OrchestratorError::transaction(kind, &e))?;
        if !registered {
            return Err(PreconditionError::RecipientNotRegistered.into());
        }

        let baseline = self.balance.capture_baseline().await;
        let atomic = to_atomic(amount, self.balance.private_decimals())
            .map_err(PreconditionError::from)?;
        flight.set_required_amount(atomic);

        flight.advance(OperationStatus::AwaitingSignature);
        let tx_hash = self
            .submit(kind, atomic, || self.sdk.private_transfer(recipient, atomic))
            .await?;
        let balance = self
            .confirm(flight, tx_hash, baseline.map(|b| b.atomic_value))
            .await?;
        Ok(self.receipt(kind, Some(tx_hash), Some(atomic), balance))
    }

    async fn run_withdraw(
        &self,
        flight: &FlightGuard<'_>,
        amount: &str,
    ) -> Result<OperationReceipt, OrchestratorError> {
        let kind = flight.kind();
        self.require_connected()?;
        if !self.identity_state().has_decryption_key {
            return Err(PreconditionError::MissingDecryptionKey.into());
        }
        validate_amount(amount).map_err(PreconditionError::from)?;
        self.require_network().await?;

        let baseline = self.balance.capture_baseline().await;
        let atomic = to_atomic(amount, self.balance.private_decimals())
            .map_err(PreconditionError::from)?;
        flight.set_required_amount(atomic);

        flight.advance(OperationStatus::AwaitingSignature);
        let tx_hash = self
            .submit(kind, atomic, || self.sdk.withdraw(atomic))
            .await?;
        let balance = self
            .confirm(flight, tx_hash, baseline.map(|b| b.atomic_value))
            .await?;
        Ok(self.receipt(kind, Some(tx_hash), Some(atomic), balance))
    }

    async fn run_approve(
        &self,
        flight: &FlightGuard<'_>,
        amount: &str,
    ) -> Result<OperationReceipt, OrchestratorError> {
        let kind = flight.kind();
        let account = self.require_connected()?;
        validate_amount(amount).map_err(PreconditionError::from)?;
        self.require_network().await?;

        let decimals = self.erc20_decimals().await;
        let atomic = to_atomic(amount, decimals).map_err(PreconditionError::from)?;
        flight.set_required_amount(atomic);

        flight.advance(OperationStatus::AwaitingSignature);
        let wallet = self.require_wallet()?;
        let outcome = self
            .allowance
            .ensure_allowance(wallet.as_ref(), account, self.config.converter, atomic)
            .await
            .map_err(|e| OrchestratorError::approval(&e))?;
        if let Some(tx_hash) = outcome.tx_hash {
            flight.set_tx_hash(tx_hash);
        }
        Ok(self.receipt(kind, outcome.tx_hash, Some(atomic), None))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STEPS
    // ═══════════════════════════════════════════════════════════════════════════

    fn require_connected(&self) -> Result<Address, OrchestratorError> {
        let session = self.session.snapshot();
        match session.account {
            Some(account) if session.is_connected() => Ok(account),
            _ => Err(PreconditionError::NotConnected.into()),
        }
    }

    fn require_wallet(&self) -> Result<Arc<dyn WalletConnector>, OrchestratorError> {
        self.session
            .signer()
            .map(|(_, wallet)| wallet)
            .ok_or_else(|| PreconditionError::NotConnected.into())
    }

    async fn require_network(&self) -> Result<(), OrchestratorError> {
        if self.network.ensure_network().await {
            Ok(())
        } else {
            Err(PreconditionError::WrongNetwork(self.config.chain.name.clone()).into())
        }
    }

    /// Deposits need the auditor only later, for transfers and withdrawals.
    async fn warn_if_auditor_missing(&self) {
        let cached = self.identity().auditor;
        let key = match cached {
            Some(key) => Some(key),
            None => self.sdk.auditor_public_key().await.ok(),
        };
        if let Some(key) = key {
            self.identity().auditor = Some(key);
            if !key.is_set() {
                warn!(
                    "auditor public key is not set; private transfers and withdrawals may be blocked"
                );
            }
        }
    }

    /// ERC-20 decimals, read once; 18 when the read fails.
    async fn erc20_decimals(&self) -> u32 {
        *self
            .erc20_decimals
            .get_or_init(|| async {
                let read = contracts::read_decimals(self.chain.as_ref(), self.config.token).await;
                if let Err(e) = &read {
                    warn!(error = %e, "decimals() read failed; assuming 18");
                }
                resolve_erc20_decimals(read)
            })
            .await
    }

    /// Allowance negotiation for a deposit, holding the approve slot.
    async fn negotiate(
        &self,
        wallet: &dyn WalletConnector,
        owner: Address,
        atomic: U256,
    ) -> Result<AllowanceOutcome, OrchestratorError> {
        let approve = self.flights.begin(OperationKind::Approve)?;
        approve.set_required_amount(atomic);
        approve.advance(OperationStatus::AwaitingSignature);
        let result = self
            .allowance
            .ensure_allowance(wallet, owner, self.config.converter, atomic)
            .await
            .map_err(|e| OrchestratorError::approval(&e));
        match &result {
            Ok(outcome) => {
                if let Some(tx_hash) = outcome.tx_hash {
                    approve.set_tx_hash(tx_hash);
                }
                approve.succeed();
            }
            Err(e) => approve.fail(e.to_string()),
        }
        result
    }

    /// Run the SDK call (proof generation + broadcast) and log its latency.
    async fn submit<F, Fut>(
        &self,
        kind: OperationKind,
        atomic: U256,
        call: F,
    ) -> Result<TxHash, OrchestratorError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<TxHash, eerc_common::ExternalError>>,
    {
        let started = Instant::now();
        let tx_hash = call()
            .await
            .map_err(|e| OrchestratorError::transaction(kind, &e))?;
        info!(
            kind = %kind,
            amount = %atomic,
            tx_hash = ?tx_hash,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "proof generated and transaction sent"
        );
        Ok(tx_hash)
    }

    /// Hand the slot to a confirmation task and await it. The task waits
    /// for the receipt, resyncs the balance and finishes the slot.
    async fn confirm(
        &self,
        flight: &FlightGuard<'_>,
        tx_hash: TxHash,
        baseline: Option<U256>,
    ) -> Result<Option<EncryptedBalance>, OrchestratorError> {
        let kind = flight.kind();
        flight.set_tx_hash(tx_hash);
        flight.advance(OperationStatus::AwaitingConfirmation);
        let confirmation = Confirmation {
            kind,
            tx_hash,
            baseline,
            chain: Arc::clone(&self.chain),
            balance: Arc::clone(&self.balance),
            identity: Arc::clone(&self.identity),
            profile: self.config.chain.clone(),
        };
        let flights = Arc::clone(&self.flights);
        flight.hand_off();
        let task = tokio::spawn(async move {
            let result = confirmation.run().await;
            flights.complete(kind, result.as_ref().map(|_| ()).map_err(|e| e.to_string()));
            result
        });
        match task.await {
            Ok(result) => result,
            Err(e) => {
                let err = OrchestratorError::Session(format!("Confirmation task failed: {e}"));
                self.flights.complete(kind, Err(err.to_string()));
                Err(err)
            }
        }
    }

    fn receipt(
        &self,
        kind: OperationKind,
        tx_hash: Option<TxHash>,
        atomic_amount: Option<U256>,
        balance: Option<EncryptedBalance>,
    ) -> OperationReceipt {
        OperationReceipt {
            kind,
            tx_hash,
            explorer_url: tx_hash.map(|h| self.config.chain.tx_url(&h)),
            atomic_amount,
            balance,
        }
    }

    fn identity(&self) -> MutexGuard<'_, Identity> {
        lock_identity(&self.identity)
    }
}

fn lock_identity(identity: &Mutex<Identity>) -> MutexGuard<'_, Identity> {
    identity.lock().unwrap_or_else(|e| e.into_inner())
}

/// Post-broadcast half of an operation.
struct Confirmation {
    kind: OperationKind,
    tx_hash: TxHash,
    baseline: Option<U256>,
    chain: Arc<dyn ChainClient>,
    balance: Arc<BalanceSynchronizer>,
    identity: Arc<Mutex<Identity>>,
    profile: ChainProfile,
}

impl Confirmation {
    async fn run(self) -> Result<Option<EncryptedBalance>, OrchestratorError> {
        let (kind, tx_hash) = (self.kind, self.tx_hash);
        let receipt = self
            .chain
            .wait_for_receipt(tx_hash)
            .await
            .map_err(|e| OrchestratorError::transaction(kind, &e))?;
        if !receipt.success {
            return Err(OrchestratorError::Reverted { kind, tx_hash });
        }
        info!(
            kind = %kind,
            tx_hash = ?tx_hash,
            block = ?receipt.block_number,
            url = %self.profile.tx_url(&tx_hash),
            "transaction confirmed"
        );
        if kind == OperationKind::Register {
            lock_identity(&self.identity).state.is_registered = true;
        }
        Ok(self.balance.settle_after(kind, self.baseline).await)
    }
}

fn finish(
    flight: FlightGuard<'_>,
    result: Result<OperationReceipt, OrchestratorError>,
) -> Result<OperationReceipt, OrchestratorError> {
    let kind = flight.kind();
    match &result {
        Ok(receipt) => {
            info!(kind = %kind, tx_hash = ?receipt.tx_hash, "operation succeeded");
            flight.succeed();
        }
        Err(e) if e.is_precondition() => {
            debug!(kind = %kind, reason = %e, "operation rejected");
            flight.fail(e.to_string());
        }
        Err(e) => {
            warn!(kind = %kind, error = %e, "operation failed");
            flight.fail(e.to_string());
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use eerc_common::{ExternalError, RawBalance};
    use eerc_test_fixtures::{tokens, Call, Harness, BOB};

    async fn ready(h: &Harness) -> Executor {
        let session = Arc::new(ConnectionSession::new(
            vec![h.wallet.clone() as Arc<dyn WalletConnector>],
            Arc::new(eerc_common::MemoryPreferenceStore::default()),
            h.config.chain.chain_id,
        ));
        session.connect("injected").await.unwrap();
        let executor = Executor::new(h.config.clone(), session, h.chain.clone(), h.sdk.clone());
        executor.sync().await.unwrap();
        h.log.clear();
        executor
    }

    #[tokio::test(start_paused = true)]
    async fn sync_loads_identity_and_decimals_once() {
        let h = Harness::new();
        h.chain.set_decimals(Ok(6));
        let executor = ready(&h).await;
        assert_eq!(executor.view().erc20_decimals, Some(6));
        assert!(executor.view().is_registered);

        executor.sync().await.unwrap();
        assert_eq!(h.log.count(|c| *c == Call::ReadDecimals), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn deposit_records_amount_and_hash() {
        let h = Harness::new();
        h.chain.set_allowance(tokens(100, 18));
        let executor = ready(&h).await;
        let expected = h.sdk.next_tx_hash();

        let receipt = executor.deposit("2.5").await.unwrap();
        assert_eq!(receipt.tx_hash, Some(expected));
        assert_eq!(
            receipt.atomic_amount,
            Some(U256::from(25u64) * U256::exp10(17))
        );
        assert!(receipt
            .explorer_url
            .unwrap()
            .starts_with("https://snowtrace.io/tx/0x"));

        let view = executor.operation(OperationKind::Deposit);
        assert!(!view.is_busy);
        assert_eq!(view.last_tx_hash, Some(expected));
        assert_eq!(executor.status(OperationKind::Deposit), OperationStatus::Succeeded);
        // fast path: no approve broadcast
        assert_eq!(h.log.count(|c| matches!(c, Call::Approve { .. })), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn deposit_checks_key_before_registration() {
        let h = Harness::new();
        h.sdk.set_identity(IdentityState {
            has_decryption_key: false,
            is_registered: false,
        });
        let executor = ready(&h).await;

        let err = executor.deposit("1").await.unwrap_err();
        assert_eq!(
            err,
            OrchestratorError::Precondition(PreconditionError::MissingDecryptionKey)
        );
        assert_eq!(
            executor.operation(OperationKind::Deposit).last_error.as_deref(),
            Some("Generate your decryption key first")
        );
        assert!(h.log.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unregistered_sender_cannot_deposit() {
        let h = Harness::new();
        h.sdk.set_identity(IdentityState {
            has_decryption_key: true,
            is_registered: false,
        });
        let executor = ready(&h).await;

        let err = executor.deposit("1").await.unwrap_err();
        assert_eq!(
            err,
            OrchestratorError::Precondition(PreconditionError::NotRegistered)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn deposit_proceeds_without_auditor() {
        let h = Harness::new();
        h.sdk.set_auditor(AuditorKey::default());
        h.chain.set_allowance(tokens(1, 18));
        let executor = ready(&h).await;

        assert!(executor.deposit("1").await.is_ok());
        assert_eq!(h.log.count(|c| matches!(c, Call::Deposit(_))), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn register_marks_identity_and_resyncs_once() {
        let h = Harness::new();
        h.sdk.set_identity(IdentityState {
            has_decryption_key: true,
            is_registered: false,
        });
        let executor = ready(&h).await;
        assert!(!executor.view().is_registered);

        let receipt = executor.register().await.unwrap();
        assert!(receipt.tx_hash.is_some());
        assert!(executor.view().is_registered);
        assert_eq!(h.log.count(|c| *c == Call::RefetchBalance), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reverted_register_does_not_mark_identity() {
        let h = Harness::new();
        h.sdk.set_identity(IdentityState::default());
        let executor = ready(&h).await;
        h.chain.revert(h.sdk.next_tx_hash());

        let err = executor.register().await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Reverted { .. }));
        assert!(!executor.view().is_registered);
        assert_eq!(h.log.count(|c| *c == Call::RefetchBalance), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn generate_key_needs_no_transaction() {
        let h = Harness::new();
        h.sdk.set_identity(IdentityState::default());
        let executor = ready(&h).await;

        let receipt = executor.generate_key().await.unwrap();
        assert_eq!(receipt.tx_hash, None);
        assert!(executor.view().has_decryption_key);
        assert_eq!(h.log.count(|c| matches!(c, Call::WaitReceipt(_))), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn generate_key_failure_uses_fallback_message() {
        let h = Harness::new();
        h.sdk.set_identity(IdentityState::default());
        h.sdk
            .fail(OperationKind::GenerateKey, ExternalError::default());
        let executor = ready(&h).await;

        let err = executor.generate_key().await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to generate key");
        assert_eq!(
            executor.operation(OperationKind::GenerateKey).last_error.as_deref(),
            Some("Failed to generate key")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn generate_key_requires_network() {
        let h = Harness::new();
        h.sdk.set_identity(IdentityState::default());
        h.wallet.set_chain_id(1);
        h.wallet
            .reject_switch(ExternalError::with_short("User rejected the request.", "4001"));
        let executor = ready(&h).await;

        let err = executor.generate_key().await.unwrap_err();
        assert_eq!(
            err,
            OrchestratorError::Precondition(PreconditionError::WrongNetwork(
                "Avalanche C-Chain".to_string()
            ))
        );
        assert_eq!(h.log.count(|c| *c == Call::GenerateKey), 0);
        assert!(!executor.view().has_decryption_key);
    }

    #[tokio::test(start_paused = true)]
    async fn sync_failure_is_reported() {
        let h = Harness::new();
        let executor = ready(&h).await;
        h.sdk
            .fail_identity(ExternalError::with_short("Network error", "fetch failed"));

        let err = executor.sync().await.unwrap_err();
        assert_eq!(err, OrchestratorError::Session("Network error".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_auditor_does_not_block_sync_or_deposit() {
        let h = Harness::new();
        h.sdk.fail_auditor(ExternalError::new("execution reverted"));
        h.chain.set_allowance(U256::MAX);
        let executor = ready(&h).await;

        assert!(executor.view().is_registered);
        assert!(executor.deposit("1").await.is_ok());
        assert!(h.log.calls().contains(&Call::AuditorKey));
    }

    #[tokio::test(start_paused = true)]
    async fn receipt_failure_fails_the_deposit() {
        let h = Harness::new();
        h.chain.set_allowance(U256::MAX);
        let executor = ready(&h).await;
        h.chain.fail_receipts(ExternalError::with_short(
            "Timed out waiting for confirmation",
            "no receipt after 120s",
        ));

        let err = executor.deposit("1").await.unwrap_err();
        assert_eq!(
            err,
            OrchestratorError::Transaction {
                kind: OperationKind::Deposit,
                message: "Timed out waiting for confirmation".to_string(),
            }
        );
        let view = executor.operation(OperationKind::Deposit);
        assert!(!view.is_busy);
        assert_eq!(view.last_error.as_deref(), Some("Timed out waiting for confirmation"));
        assert!(view.last_tx_hash.is_some());
        assert_eq!(h.log.count(|c| *c == Call::RefetchBalance), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn recipient_lookup_failure_stops_transfer() {
        let h = Harness::new();
        let executor = ready(&h).await;
        h.sdk
            .fail_registration_lookup(ExternalError::with_short("Network error", "rpc down"));

        let err = executor
            .private_transfer(&format!("{:?}", *BOB), "1")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            OrchestratorError::Transaction {
                kind: OperationKind::PrivateTransfer,
                message: "Network error".to_string(),
            }
        );
        assert_eq!(h.log.count(|c| matches!(c, Call::PrivateTransfer(..))), 0);
        assert_eq!(
            executor.status(OperationKind::PrivateTransfer),
            OperationStatus::Failed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn withdraw_uses_private_decimals() {
        let h = Harness::new();
        h.sdk.set_balance(RawBalance {
            decrypted: Some(U256::from(10_000u64)),
            decimals: Some(2),
        });
        let executor = ready(&h).await;
        h.sdk.push_balance(RawBalance {
            decrypted: Some(U256::from(10_000u64)),
            decimals: Some(2),
        });
        h.sdk.push_balance(RawBalance {
            decrypted: Some(U256::from(8_750u64)),
            decimals: Some(2),
        });

        let receipt = executor.withdraw("12.5").await.unwrap();
        assert_eq!(receipt.atomic_amount, Some(U256::from(1_250u64)));
        assert_eq!(
            receipt.balance.map(|b| b.atomic_value),
            Some(U256::from(8_750u64))
        );
        assert_eq!(executor.view().display_balance.as_deref(), Some("87.50"));
    }

    #[tokio::test(start_paused = true)]
    async fn withdraw_without_key_is_rejected() {
        let h = Harness::new();
        h.sdk.set_identity(IdentityState {
            has_decryption_key: false,
            is_registered: true,
        });
        let executor = ready(&h).await;

        let err = executor.withdraw("1").await.unwrap_err();
        assert_eq!(
            err,
            OrchestratorError::Precondition(PreconditionError::MissingDecryptionKey)
        );
        assert!(h.log.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn transfer_validates_recipient_shape() {
        let h = Harness::new();
        let executor = ready(&h).await;

        let err = executor.private_transfer("  ", "1").await.unwrap_err();
        assert_eq!(
            err,
            OrchestratorError::Precondition(PreconditionError::MissingRecipient)
        );
        let err = executor.private_transfer("0x1234", "1").await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Precondition(PreconditionError::InvalidRecipient(_))
        ));
        assert!(h.log.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn transfer_to_registered_recipient() {
        let h = Harness::new();
        let executor = ready(&h).await;

        let to = format!("{:?}", *BOB);
        let receipt = executor.private_transfer(&to, "3").await.unwrap();
        assert_eq!(receipt.atomic_amount, Some(U256::from(300u64)));
        assert!(h
            .log
            .calls()
            .contains(&Call::PrivateTransfer(*BOB, U256::from(300u64))));
    }

    #[tokio::test(start_paused = true)]
    async fn submission_rejection_is_normalised_and_not_retried() {
        let h = Harness::new();
        h.sdk.fail(
            OperationKind::Withdraw,
            ExternalError::with_short("User rejected the request.", "ethers: code 4001"),
        );
        let executor = ready(&h).await;

        let err = executor.withdraw("1").await.unwrap_err();
        assert_eq!(err.to_string(), "User rejected the request.");
        assert_eq!(h.log.count(|c| matches!(c, Call::Withdraw(_))), 1);
        assert_eq!(executor.status(OperationKind::Withdraw), OperationStatus::Failed);

        // a new invocation is a new operation
        assert!(executor.withdraw("1").await.is_err());
        assert_eq!(h.log.count(|c| matches!(c, Call::Withdraw(_))), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn standalone_approve_uses_erc20_decimals() {
        let h = Harness::new();
        h.chain.set_decimals(Ok(6));
        let executor = ready(&h).await;

        let receipt = executor.approve("10").await.unwrap();
        assert!(receipt.tx_hash.is_some());
        assert!(h.log.calls().contains(&Call::Approve {
            spender: h.config.converter,
            amount: U256::from(10_000_000u64),
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_requires_connection() {
        let h = Harness::new();
        let session = Arc::new(ConnectionSession::new(
            vec![],
            Arc::new(eerc_common::MemoryPreferenceStore::default()),
            h.config.chain.chain_id,
        ));
        let executor = Executor::new(h.config.clone(), session, h.chain.clone(), h.sdk.clone());
        let err = executor.refresh().await.unwrap_err();
        assert_eq!(
            err,
            OrchestratorError::Precondition(PreconditionError::NotConnected)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn view_serializes_for_presentation() {
        let h = Harness::new();
        let executor = ready(&h).await;
        let json = serde_json::to_value(executor.view()).unwrap();
        assert_eq!(json["is_registered"], true);
        assert_eq!(json["has_decryption_key"], true);
        assert_eq!(json["display_balance"], "0.00");
        assert_eq!(json["private_decimals"], 2);
        assert_eq!(json["is_wrong_network"], false);
    }
}
