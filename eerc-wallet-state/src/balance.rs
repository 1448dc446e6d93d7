//! Balance synchronizer.
//!
//! Confirmation of a transaction and the SDK's decrypted view of the
//! balance are not atomic: right after a receipt the balance may still
//! show the pre-transaction value. Every refresh therefore asks the SDK to
//! refetch, waits a settle delay, and only then reads the snapshot.
//!
//! After a value-moving operation the refresh is repeated while the value
//! still equals the pre-operation baseline, up to `SettlePolicy::max_polls`
//! rounds. This narrows the window but guarantees nothing.
//!
//! The cache is always replaced wholesale, never patched.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use eerc_common::{
    format_atomic, normalize_message, resolve_private_decimals, EercSdk, EncryptedBalance,
    ExternalError, OperationKind, OperationView, RawBalance, SettlePolicy,
    DEFAULT_PRIVATE_DECIMALS,
};
use ethers_core::types::U256;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct Cache {
    balance: Option<EncryptedBalance>,
    last_error: Option<String>,
}

pub struct BalanceSynchronizer {
    sdk: Arc<dyn EercSdk>,
    settle: SettlePolicy,
    cache: Mutex<Cache>,
    /// Explicit refreshes only; resync rounds inside operations are not counted.
    refreshing: AtomicUsize,
}

/// Counts an explicit refresh as in flight for as long as it lives.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl BalanceSynchronizer {
    pub fn new(sdk: Arc<dyn EercSdk>, settle: SettlePolicy) -> Self {
        Self {
            sdk,
            settle,
            cache: Mutex::new(Cache::default()),
            refreshing: AtomicUsize::new(0),
        }
    }

    /// Explicit refresh: refetch, wait `refresh_ms`, read.
    ///
    /// `Ok(None)` means the SDK could not decrypt the balance.
    pub async fn refetch_balance(&self) -> Result<Option<EncryptedBalance>, ExternalError> {
        let _refreshing = InFlight::enter(&self.refreshing);
        let result = self.round(self.settle.refresh()).await;
        self.cache().last_error = result
            .as_ref()
            .err()
            .map(|e| normalize_message(e, "Failed to refresh balance"));
        result
    }

    /// Cached atomic value; zero before the first successful read.
    pub fn cached_atomic_value(&self) -> U256 {
        self.cached()
            .map(|balance| balance.atomic_value)
            .unwrap_or_default()
    }

    pub fn cached(&self) -> Option<EncryptedBalance> {
        self.cache().balance
    }

    /// Private decimals of the cached snapshot, or the default of 2.
    pub fn private_decimals(&self) -> u32 {
        self.cached()
            .map(|balance| balance.decimals)
            .unwrap_or(DEFAULT_PRIVATE_DECIMALS)
    }

    /// Cached balance rendered with its private decimals.
    pub fn display_balance(&self) -> Option<String> {
        let balance = self.cached()?;
        format_atomic(balance.atomic_value, balance.decimals).ok()
    }

    /// State of the refresh trigger. Resyncs run by other operations do not
    /// make it busy.
    pub fn refresh_view(&self) -> OperationView {
        OperationView {
            is_busy: self.refreshing.load(Ordering::SeqCst) > 0,
            last_error: self.cache().last_error.clone(),
            last_tx_hash: None,
        }
    }

    /// Baseline before a value-moving call. Failures are logged and yield
    /// `None`.
    pub async fn capture_baseline(&self) -> Option<EncryptedBalance> {
        match self.round(self.settle.pre_operation()).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(error = %e, "baseline refresh failed");
                None
            }
        }
    }

    /// Resync after `kind` succeeded on chain.
    ///
    /// Never fails: a resync error is logged, the operation itself already
    /// succeeded. Value-moving kinds poll until the value leaves `baseline`.
    pub async fn settle_after(
        &self,
        kind: OperationKind,
        baseline: Option<U256>,
    ) -> Option<EncryptedBalance> {
        let rounds = if kind.moves_value() {
            self.settle.max_polls.max(1)
        } else {
            1
        };

        let mut latest = None;
        for round in 1..=rounds {
            match self.round(self.settle.post_operation()).await {
                Ok(balance) => latest = balance,
                Err(e) => {
                    warn!(kind = %kind, round, error = %e, "balance resync failed");
                    return self.cached();
                }
            }
            let current = latest.map(|b| b.atomic_value);
            match (baseline, current) {
                (Some(before), Some(after)) if before == after && round < rounds => {
                    debug!(kind = %kind, round, "balance unchanged; polling again");
                }
                _ => break,
            }
        }

        if let (Some(before), Some(after)) = (baseline, latest) {
            log_delta(kind, before, after);
        }
        latest
    }

    async fn round(&self, delay: Duration) -> Result<Option<EncryptedBalance>, ExternalError> {
        self.sdk.refetch_balance().await?;
        tokio::time::sleep(delay).await;
        let raw = self.sdk.balance().await?;
        let balance = normalize(raw);
        self.cache().balance = balance;
        Ok(balance)
    }

    fn cache(&self) -> MutexGuard<'_, Cache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn normalize(raw: RawBalance) -> Option<EncryptedBalance> {
    let atomic_value = raw.decrypted?;
    Some(EncryptedBalance {
        atomic_value,
        decimals: resolve_private_decimals(raw.decimals),
    })
}

fn log_delta(kind: OperationKind, before: U256, after: EncryptedBalance) {
    let render = |v: U256| format_atomic(v, after.decimals).unwrap_or_else(|_| v.to_string());
    let delta = if after.atomic_value >= before {
        format!("+{}", render(after.atomic_value - before))
    } else {
        format!("-{}", render(before - after.atomic_value))
    };
    info!(
        kind = %kind,
        before = %render(before),
        after = %render(after.atomic_value),
        delta = %delta,
        "private balance changed"
    );
}
