use socketioxide::extract::SocketRef;

use crate::registry::{ConnId, LiveConnection, PushError};

/// Socket.IO-backed connection as the registry sees it. One per socket; the
/// conn id is the socket sid, so a user's devices stay distinguishable.
pub struct SocketConnection {
    id: ConnId,
    socket: SocketRef,
}

impl SocketConnection {
    pub fn new(socket: SocketRef) -> Self {
        Self {
            id: ConnId::from(socket.id.to_string()),
            socket,
        }
    }
}

impl LiveConnection for SocketConnection {
    fn id(&self) -> &ConnId {
        &self.id
    }

    fn send(&self, event: &str, payload: &serde_json::Value) -> Result<(), PushError> {
        self.socket.emit(event.to_owned(), payload).map_err(|_| PushError)
    }
}
