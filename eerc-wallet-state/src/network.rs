//! Network guard.

use std::sync::Arc;

use eerc_common::ChainProfile;
use tracing::{debug, warn};

use crate::session::ConnectionSession;

/// Keeps the connected wallet on the required chain.
pub struct NetworkGuard {
    session: Arc<ConnectionSession>,
    required: ChainProfile,
}

impl NetworkGuard {
    pub fn new(session: Arc<ConnectionSession>, required: ChainProfile) -> Self {
        Self { session, required }
    }

    pub fn required(&self) -> &ChainProfile {
        &self.required
    }

    pub fn is_wrong_network(&self) -> bool {
        self.session
            .snapshot()
            .is_wrong_network(self.required.chain_id)
    }

    /// `true` when the wallet is (now) on the required chain.
    ///
    /// Requests a switch when it is not. Never errors: a rejected or failed
    /// switch returns `false`, and the caller must abort without touching
    /// chain state.
    pub async fn ensure_network(&self) -> bool {
        let current = self.session.snapshot().chain_id;
        if current == self.required.chain_id {
            return true;
        }
        debug!(current, required = self.required.chain_id, "requesting chain switch");
        match self.session.switch_chain(self.required.chain_id).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    current,
                    required = self.required.chain_id,
                    error = %e,
                    "please switch to {}",
                    self.required.name
                );
                false
            }
        }
    }
}
