use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use embr_shared::errors::AppResult;

use crate::events;
use crate::models::{NewNotification, Notification, NotificationType};
use crate::registry::ConnectionRegistry;
use crate::store::Store;

/// Durable-write-then-best-effort-push notification fanout. The row is the
/// source of truth; the push is a latency optimization the client can always
/// recover from by pulling its notification list.
pub struct NotificationService {
    store: Arc<dyn Store>,
    registry: Arc<ConnectionRegistry>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn Store>, registry: Arc<ConnectionRegistry>) -> Self {
        Self { store, registry }
    }

    pub fn create_and_deliver(
        &self,
        recipient: Uuid,
        kind: NotificationType,
        body: &str,
        sender: Option<Uuid>,
        reference_id: Option<Uuid>,
    ) -> AppResult<Notification> {
        // durable first; nothing is pushed for data that was never recorded
        let notification = self.store.insert_notification(NewNotification {
            id: Uuid::new_v4(),
            user_id: recipient,
            notification_type: kind.as_str().to_string(),
            body: body.to_string(),
            sender_id: sender,
            reference_id,
            is_read: false,
            created_at: Utc::now(),
        })?;

        let sender_snapshot = match sender {
            Some(sender_id) => match self.store.profile_snapshot(sender_id) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::warn!(sender_id = %sender_id, error = %e, "failed to enrich notification sender");
                    None
                }
            },
            None => None,
        };

        let payload = serde_json::json!({
            "id": notification.id,
            "type": kind,
            "body": notification.body,
            "sender": sender_snapshot.map(|s| serde_json::json!({
                "user_id": s.user_id,
                "display_name": s.display_name,
                "avatar_url": s.avatar_url,
            })),
            "reference_id": notification.reference_id,
            "is_read": notification.is_read,
            "created_at": notification.created_at,
        });

        let delivered = self
            .registry
            .push_to_user(recipient, events::RECEIVE_NOTIFICATION, &payload);

        tracing::debug!(
            notification_id = %notification.id,
            recipient = %recipient,
            notification_type = %kind,
            delivered = delivered,
            "notification created"
        );

        Ok(notification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConnectionRegistry;
    use crate::testutil::{FakeConnection, MemoryStore};

    fn setup() -> (Arc<MemoryStore>, Arc<ConnectionRegistry>, NotificationService) {
        let store = MemoryStore::new();
        let registry = Arc::new(ConnectionRegistry::new());
        let service = NotificationService::new(store.clone(), registry.clone());
        (store, registry, service)
    }

    #[test]
    fn persists_then_pushes_to_live_connections() {
        let (store, registry, service) = setup();
        let recipient = Uuid::new_v4();
        let sender = Uuid::new_v4();
        store.add_profile(sender, "Alice", 27);

        let conn = FakeConnection::new("c1");
        registry.register(recipient, conn.clone());

        let n = service
            .create_and_deliver(
                recipient,
                NotificationType::NewMessage,
                "Alice sent you a message",
                Some(sender),
                None,
            )
            .unwrap();
        assert_eq!(n.notification_type, "new_message");
        assert!(!n.is_read);

        let pushes = conn.payloads_for(events::RECEIVE_NOTIFICATION);
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0]["type"], serde_json::json!("new_message"));
        assert_eq!(pushes[0]["sender"]["display_name"], serde_json::json!("Alice"));
    }

    #[test]
    fn offline_recipient_still_gets_a_durable_row() {
        let (store, _registry, service) = setup();
        let recipient = Uuid::new_v4();

        service
            .create_and_deliver(recipient, NotificationType::NewMatch, "It's a match!", None, None)
            .unwrap();

        let (items, total) = store.notifications_for(recipient, 20, 0).unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].body, "It's a match!");
    }

    #[test]
    fn persistence_failure_aborts_and_pushes_nothing() {
        let (store, registry, service) = setup();
        let recipient = Uuid::new_v4();
        let conn = FakeConnection::new("c1");
        registry.register(recipient, conn.clone());

        store.fail_notification_inserts(true);
        let result = service.create_and_deliver(
            recipient,
            NotificationType::NewMatch,
            "It's a match!",
            None,
            None,
        );
        assert!(result.is_err());
        assert!(conn.sent().is_empty());
        assert_eq!(store.all_notifications().len(), 0);
    }

    #[test]
    fn dead_connection_does_not_fail_the_operation() {
        let (_store, registry, service) = setup();
        let recipient = Uuid::new_v4();
        let dead = FakeConnection::new("dead");
        dead.fail_sends(true);
        registry.register(recipient, dead.clone());

        let result = service.create_and_deliver(
            recipient,
            NotificationType::NewMatch,
            "It's a match!",
            None,
            None,
        );
        assert!(result.is_ok());
        // the reaper removed the dead connection
        assert!(registry.connections_for(recipient).is_empty());
    }
}
