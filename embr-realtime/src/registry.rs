use std::collections::HashMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Opaque handle naming one live transport connection (one device session).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnId(String);

impl ConnId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ConnId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("connection closed")]
pub struct PushError;

/// One live, push-capable connection. `send` must fail fast instead of
/// blocking; a returned error means the connection is dead and will be
/// reaped by the registry.
pub trait LiveConnection: Send + Sync {
    fn id(&self) -> &ConnId;
    fn send(&self, event: &str, payload: &serde_json::Value) -> Result<(), PushError>;
}

/// Emitted on every crossing of the 0-connection boundary, in either
/// direction. 1→2 and 2→1 changes emit nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceTransition {
    pub user_id: Uuid,
    pub online: bool,
}

/// In-memory map from user id to that user's live connections. Multi-device
/// aware; mutated concurrently from every request context. Per-user state is
/// only touched under the owning shard's entry lock, so unrelated users never
/// contend.
pub struct ConnectionRegistry {
    users: DashMap<Uuid, HashMap<ConnId, Arc<dyn LiveConnection>>>,
    transitions: broadcast::Sender<PresenceTransition>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        let (transitions, _) = broadcast::channel(256);
        Self {
            users: DashMap::new(),
            transitions,
        }
    }

    /// Each subscriber sees every transition emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<PresenceTransition> {
        self.transitions.subscribe()
    }

    /// Track a new connection. Returns true when this was the user's first
    /// live connection (the online transition).
    pub fn register(&self, user_id: Uuid, conn: Arc<dyn LiveConnection>) -> bool {
        let was_first = match self.users.entry(user_id) {
            Entry::Occupied(mut e) => {
                e.get_mut().insert(conn.id().clone(), conn);
                false
            }
            Entry::Vacant(e) => {
                let mut conns = HashMap::new();
                conns.insert(conn.id().clone(), conn);
                e.insert(conns);
                true
            }
        };
        if was_first {
            self.emit(PresenceTransition { user_id, online: true });
        }
        was_first
    }

    /// Drop a connection. Returns true when this was the user's last live
    /// connection (the offline transition). An emptied per-user entry is
    /// removed immediately, never left dangling.
    pub fn unregister(&self, user_id: Uuid, conn_id: &ConnId) -> bool {
        let went_offline = match self.users.entry(user_id) {
            Entry::Occupied(mut e) => {
                e.get_mut().remove(conn_id);
                if e.get().is_empty() {
                    e.remove();
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(_) => false,
        };
        if went_offline {
            self.emit(PresenceTransition { user_id, online: false });
        }
        went_offline
    }

    /// Snapshot of the user's current connections. Always a copy, so callers
    /// can iterate and push while registrations churn underneath.
    pub fn connections_for(&self, user_id: Uuid) -> Vec<Arc<dyn LiveConnection>> {
        self.users
            .get(&user_id)
            .map(|conns| conns.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.users.contains_key(&user_id)
    }

    /// Best-effort push to every live connection of the user. Returns the
    /// number of connections the payload was handed to. Connections whose
    /// send fails are reaped on the spot.
    pub fn push_to_user(&self, user_id: Uuid, event: &str, payload: &serde_json::Value) -> usize {
        self.push_filtered(user_id, None, event, payload)
    }

    /// Same as `push_to_user`, but skips one connection — the multi-device
    /// echo path, where the originating device already has the data.
    pub fn push_to_user_except(
        &self,
        user_id: Uuid,
        except: &ConnId,
        event: &str,
        payload: &serde_json::Value,
    ) -> usize {
        self.push_filtered(user_id, Some(except), event, payload)
    }

    fn push_filtered(
        &self,
        user_id: Uuid,
        except: Option<&ConnId>,
        event: &str,
        payload: &serde_json::Value,
    ) -> usize {
        let mut delivered = 0;
        let mut dead: Vec<ConnId> = Vec::new();

        for conn in self.connections_for(user_id) {
            if except.map_or(false, |e| e == conn.id()) {
                continue;
            }
            match conn.send(event, payload) {
                Ok(()) => delivered += 1,
                Err(_) => dead.push(conn.id().clone()),
            }
        }

        for conn_id in dead {
            tracing::warn!(
                user_id = %user_id,
                conn_id = %conn_id,
                event = event,
                "push failed, reaping connection"
            );
            self.unregister(user_id, &conn_id);
        }

        delivered
    }

    fn emit(&self, transition: PresenceTransition) {
        tracing::debug!(
            user_id = %transition.user_id,
            online = transition.online,
            "presence transition"
        );
        // send fails only with zero receivers, which is normal before the
        // presence tracker task starts.
        let _ = self.transitions.send(transition);
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
