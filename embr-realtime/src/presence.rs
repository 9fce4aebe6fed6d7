use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;

use crate::events;
use crate::registry::{ConnectionRegistry, PresenceTransition};
use crate::store::Store;

/// Derives online/offline state from the registry's transition stream,
/// persists it, and tells each matched peer's live connections.
pub struct PresenceTracker {
    store: Arc<dyn Store>,
    registry: Arc<ConnectionRegistry>,
}

impl PresenceTracker {
    pub fn new(store: Arc<dyn Store>, registry: Arc<ConnectionRegistry>) -> Self {
        Self { store, registry }
    }

    /// Consume transitions until the registry is dropped. Spawned once at
    /// startup.
    pub async fn run(self: Arc<Self>, mut rx: broadcast::Receiver<PresenceTransition>) {
        loop {
            match rx.recv().await {
                Ok(transition) => self.handle_transition(transition),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped = skipped, "presence transition stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    pub fn handle_transition(&self, transition: PresenceTransition) {
        let PresenceTransition { user_id, online } = transition;
        let last_seen = if online { None } else { Some(Utc::now()) };

        // last-seen persistence is best effort; a failed write must not
        // block the broadcast
        if let Err(e) = self.store.set_presence(user_id, online, last_seen) {
            tracing::warn!(user_id = %user_id, error = %e, "failed to persist presence change");
        }

        let peers = match self.store.matched_peer_ids(user_id) {
            Ok(peers) => peers,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "failed to load matched peers for presence broadcast");
                return;
            }
        };

        let payload = serde_json::json!({
            "user_id": user_id,
            "is_online": online,
            "last_seen": last_seen,
        });

        let mut delivered = 0;
        for peer in &peers {
            delivered += self
                .registry
                .push_to_user(*peer, events::USER_STATUS_CHANGED, &payload);
        }

        tracing::debug!(
            user_id = %user_id,
            online = online,
            peers = peers.len(),
            delivered = delivered,
            "presence change broadcast"
        );
    }
}
