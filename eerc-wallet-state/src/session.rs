//! Connection session: the single owner of the [`Session`] snapshot.
//!
//! The snapshot is published through a `tokio::sync::watch` channel, so
//! observers only ever see the latest value. It changes on connect,
//! disconnect, switch-chain results and folded wallet notifications,
//! nothing else.

use std::sync::{Arc, Mutex, MutexGuard};

use eerc_common::{
    normalize_message, ConnectorInfo, ConnectorPreferenceStore, ExternalError, Session,
    SessionEvent, WalletConnector,
};
use ethers_core::types::Address;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::OrchestratorError;

/// Connectors split the way a wallet picker shows them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectorCatalogue {
    /// Installed / injected wallets, offered first.
    pub installed: Vec<ConnectorInfo>,
    pub others: Vec<ConnectorInfo>,
}

pub struct ConnectionSession {
    connectors: Vec<Arc<dyn WalletConnector>>,
    preferences: Arc<dyn ConnectorPreferenceStore>,
    required_chain_id: u64,
    active: Mutex<Option<Arc<dyn WalletConnector>>>,
    snapshot: watch::Sender<Session>,
}

impl ConnectionSession {
    pub fn new(
        connectors: Vec<Arc<dyn WalletConnector>>,
        preferences: Arc<dyn ConnectorPreferenceStore>,
        required_chain_id: u64,
    ) -> Self {
        let (snapshot, _) = watch::channel(Session::default());
        Self {
            connectors,
            preferences,
            required_chain_id,
            active: Mutex::new(None),
            snapshot,
        }
    }

    pub fn required_chain_id(&self) -> u64 {
        self.required_chain_id
    }

    pub fn snapshot(&self) -> Session {
        self.snapshot.borrow().clone()
    }

    /// Latest-only stream of session snapshots.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.snapshot.subscribe()
    }

    pub fn connectors(&self) -> Vec<ConnectorInfo> {
        self.connectors.iter().map(|c| c.info()).collect()
    }

    pub fn catalogue(&self) -> ConnectorCatalogue {
        let (installed, others) = self
            .connectors()
            .into_iter()
            .partition(|info| info.kind.is_installed());
        ConnectorCatalogue { installed, others }
    }

    /// Connected account and the connector it came through.
    pub fn signer(&self) -> Option<(Address, Arc<dyn WalletConnector>)> {
        let session = self.snapshot();
        if !session.is_connected() {
            return None;
        }
        let account = session.account?;
        let connector = self.active().clone()?;
        Some((account, connector))
    }

    pub fn remembered_connector(&self) -> Option<String> {
        self.preferences.load()
    }

    /// Connect through `connector_id`.
    ///
    /// On success the connector is remembered. If the wallet sits on another
    /// chain a single switch is attempted; a rejection is logged and the
    /// session stays connected on the wrong chain.
    pub async fn connect(&self, connector_id: &str) -> Result<Session, OrchestratorError> {
        let connector = self
            .connectors
            .iter()
            .find(|c| c.info().id == connector_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::ConnectorUnavailable(connector_id.to_string()))?;

        let connection = connector
            .connect()
            .await
            .map_err(|e| OrchestratorError::Session(normalize_message(&e, "Failed to connect")))?;
        let account = connection
            .accounts
            .first()
            .copied()
            .ok_or_else(|| OrchestratorError::Session("Wallet returned no accounts".to_string()))?;

        *self.active() = Some(Arc::clone(&connector));
        self.publish(Session {
            connected: true,
            account: Some(account),
            chain_id: connection.chain_id,
            connector_id: Some(connector_id.to_string()),
        });
        self.preferences.save(connector_id);
        info!(
            connector = connector_id,
            account = ?account,
            chain_id = connection.chain_id,
            "wallet connected"
        );

        if connection.chain_id != self.required_chain_id {
            if let Err(e) = self.switch_chain(self.required_chain_id).await {
                warn!(
                    chain_id = connection.chain_id,
                    required = self.required_chain_id,
                    error = %e,
                    "switch after connect rejected"
                );
            }
        }
        Ok(self.snapshot())
    }

    /// Reconnect through the remembered connector. Without a remembered
    /// preference nothing happens and `Ok(None)` is returned.
    pub async fn reconnect_last(&self) -> Result<Option<Session>, OrchestratorError> {
        let Some(connector_id) = self.preferences.load() else {
            debug!("no remembered connector; staying disconnected");
            return Ok(None);
        };
        match self.connect(&connector_id).await {
            Ok(session) => Ok(Some(session)),
            Err(OrchestratorError::ConnectorUnavailable(id)) => {
                warn!(connector = %id, "remembered connector is gone; forgetting it");
                self.preferences.clear();
                Err(OrchestratorError::ConnectorUnavailable(id))
            }
            Err(e) => Err(e),
        }
    }

    /// Disconnect and reset the snapshot. An explicit disconnect also drops
    /// the remembered connector so the next start does not reconnect.
    pub async fn disconnect(&self) {
        let connector = self.active().take();
        if let Some(connector) = connector {
            if let Err(e) = connector.disconnect().await {
                warn!(connector = %connector.info().id, error = %e, "connector disconnect failed");
            }
        }
        self.preferences.clear();
        self.publish(Session::default());
        info!("wallet disconnected");
    }

    /// Ask the active connector to move to `chain_id`; the snapshot follows
    /// on success.
    pub async fn switch_chain(&self, chain_id: u64) -> Result<(), ExternalError> {
        let connector = self
            .active()
            .clone()
            .ok_or_else(|| ExternalError::new("No wallet connected"))?;
        connector.switch_chain(chain_id).await?;
        self.snapshot.send_modify(|session| {
            if session.connected {
                session.chain_id = chain_id;
            }
        });
        info!(chain_id, "switched chain");
        Ok(())
    }

    /// Fold a wallet notification into the snapshot.
    pub fn apply_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::AccountsChanged(accounts) => match accounts.first().copied() {
                Some(account) => self.snapshot.send_modify(|session| {
                    if session.connected {
                        session.account = Some(account);
                    }
                }),
                None => {
                    *self.active() = None;
                    self.publish(Session::default());
                }
            },
            SessionEvent::ChainChanged(chain_id) => self.snapshot.send_modify(|session| {
                if session.connected {
                    session.chain_id = chain_id;
                }
            }),
            SessionEvent::Disconnected => {
                *self.active() = None;
                self.publish(Session::default());
            }
        }
        debug!(session = ?self.snapshot(), "session event applied");
    }

    fn publish(&self, session: Session) {
        self.snapshot.send_replace(session);
    }

    fn active(&self) -> MutexGuard<'_, Option<Arc<dyn WalletConnector>>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}
