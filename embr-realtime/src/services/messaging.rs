use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use embr_shared::errors::{AppError, AppResult, ErrorCode};

use crate::events;
use crate::models::{Match, Message, MessageKind, NewMessage, NotificationType};
use crate::registry::{ConnId, ConnectionRegistry};
use crate::services::notifications::NotificationService;
use crate::store::Store;

/// Chat delivery scoped to a match: durable writes, then best-effort pushes
/// to whichever of the two participants' devices are live.
pub struct MessagingService {
    store: Arc<dyn Store>,
    registry: Arc<ConnectionRegistry>,
    notifications: Arc<NotificationService>,
}

impl MessagingService {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<ConnectionRegistry>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            store,
            registry,
            notifications,
        }
    }

    fn participant_match(&self, match_id: Uuid, user_id: Uuid) -> AppResult<Match> {
        let m = self
            .store
            .match_by_id(match_id)?
            .ok_or_else(|| AppError::new(ErrorCode::MatchNotFound, "match not found"))?;
        if !m.contains(user_id) {
            return Err(AppError::new(
                ErrorCode::NotMatchParticipant,
                "you are not a participant of this match",
            ));
        }
        Ok(m)
    }

    /// Persist a message and push it out: a receiver-shaped copy to every
    /// live connection of the receiver, a sender-shaped copy to the sender's
    /// other devices. `origin` is the connection the send came in on, when
    /// the transport knows it.
    pub fn send_message(
        &self,
        sender: Uuid,
        match_id: Uuid,
        content: Option<String>,
        media_url: Option<String>,
        kind: Option<MessageKind>,
        origin: Option<&ConnId>,
    ) -> AppResult<Message> {
        if content.as_ref().map_or(true, |c| c.trim().is_empty())
            && media_url.as_ref().map_or(true, |u| u.trim().is_empty())
        {
            return Err(AppError::new(
                ErrorCode::EmptyMessage,
                "message must have content or media",
            ));
        }

        let kind = kind.unwrap_or(MessageKind::Text);
        if kind != MessageKind::Text && media_url.as_ref().map_or(true, |u| u.trim().is_empty()) {
            return Err(AppError::new(
                ErrorCode::ValidationError,
                "image and video messages require a media url",
            ));
        }

        let m = self.participant_match(match_id, sender)?;
        let receiver = m.other(sender);

        // v7 ids are time-ordered, fixing per-match order at persistence time
        let message = self.store.insert_message(NewMessage {
            id: Uuid::now_v7(),
            match_id,
            sender_id: sender,
            receiver_id: receiver,
            content: content.clone(),
            media_url,
            kind: kind.as_str().to_string(),
            is_read: false,
            created_at: Utc::now(),
        })?;

        let delivered = self.registry.push_to_user(
            receiver,
            events::RECEIVE_MESSAGE,
            &message_payload(&message, false),
        );

        // multi-device echo to the sender's other connections
        let sender_payload = message_payload(&message, true);
        let echoed = match origin {
            Some(origin) => {
                self.registry
                    .push_to_user_except(sender, origin, events::RECEIVE_MESSAGE, &sender_payload)
            }
            None => self
                .registry
                .push_to_user(sender, events::RECEIVE_MESSAGE, &sender_payload),
        };

        // durable notification so the receiver can recover a missed push
        let preview = content
            .as_deref()
            .unwrap_or("[media]")
            .chars()
            .take(100)
            .collect::<String>();
        if let Err(e) = self.notifications.create_and_deliver(
            receiver,
            NotificationType::NewMessage,
            &preview,
            Some(sender),
            Some(match_id),
        ) {
            tracing::warn!(message_id = %message.id, error = %e, "failed to record message notification");
        }

        tracing::debug!(
            message_id = %message.id,
            match_id = %match_id,
            sender = %sender,
            delivered = delivered,
            echoed = echoed,
            "message sent"
        );

        Ok(message)
    }

    /// Flip every unread message addressed to `reader` in the match, then
    /// push exactly one read receipt per distinct author.
    pub fn mark_read(&self, reader: Uuid, match_id: Uuid) -> AppResult<Vec<Uuid>> {
        self.participant_match(match_id, reader)?;

        let updated = self.store.mark_messages_read(match_id, reader)?;

        let mut by_author: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for message in &updated {
            by_author
                .entry(message.sender_id)
                .or_default()
                .push(message.id);
        }

        for (author, message_ids) in &by_author {
            let payload = serde_json::json!({
                "match_id": match_id,
                "reader_id": reader,
                "message_ids": message_ids,
            });
            self.registry
                .push_to_user(*author, events::MESSAGES_READ, &payload);
        }

        Ok(updated.into_iter().map(|m| m.id).collect())
    }

    /// Ephemeral typing relay. Nothing is persisted; timeout logic belongs
    /// to the caller.
    pub fn set_typing(&self, user_id: Uuid, match_id: Uuid, typing: bool) -> AppResult<()> {
        let m = self.participant_match(match_id, user_id)?;
        let peer = m.other(user_id);

        if typing {
            let display_name = self
                .store
                .profile_snapshot(user_id)?
                .map(|p| p.display_name)
                .unwrap_or_default();
            let payload = serde_json::json!({
                "match_id": match_id,
                "typing_user_id": user_id,
                "display_name": display_name,
            });
            self.registry
                .push_to_user(peer, events::NOTIFY_TYPING, &payload);
        } else {
            let payload = serde_json::json!({
                "match_id": match_id,
                "typing_user_id": user_id,
            });
            self.registry
                .push_to_user(peer, events::NOTIFY_STOPPED_TYPING, &payload);
        }
        Ok(())
    }

    /// Paginated history, newest first. Participant-gated.
    pub fn list_messages(
        &self,
        reader: Uuid,
        match_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<Message>, i64)> {
        self.participant_match(match_id, reader)?;
        self.store.messages_for_match(match_id, limit, offset)
    }
}

fn message_payload(message: &Message, is_me: bool) -> serde_json::Value {
    serde_json::json!({
        "id": message.id,
        "match_id": message.match_id,
        "sender_id": message.sender_id,
        "receiver_id": message.receiver_id,
        "content": message.content,
        "media_url": message.media_url,
        "kind": message.kind,
        "is_me": is_me,
        "is_read": message.is_read,
        "sent_at": message.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::LiveConnection;
    use crate::testutil::{FakeConnection, MemoryStore};

    struct Fixture {
        store: Arc<MemoryStore>,
        registry: Arc<ConnectionRegistry>,
        service: MessagingService,
        alice: Uuid,
        bob: Uuid,
        match_id: Uuid,
    }

    fn setup() -> Fixture {
        let store = MemoryStore::new();
        let registry = Arc::new(ConnectionRegistry::new());
        let notifications = Arc::new(NotificationService::new(store.clone(), registry.clone()));
        let service = MessagingService::new(store.clone(), registry.clone(), notifications);

        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        store.add_profile(alice, "Alice", 27);
        store.add_profile(bob, "Bob", 29);
        let match_id = store.create_match(alice, bob).unwrap().unwrap().id;

        Fixture { store, registry, service, alice, bob, match_id }
    }

    #[test]
    fn message_reaches_receiver_and_other_sender_devices() {
        let f = setup();
        let bob_conn = FakeConnection::new("bob-1");
        let alice_phone = FakeConnection::new("alice-phone");
        let alice_laptop = FakeConnection::new("alice-laptop");
        f.registry.register(f.bob, bob_conn.clone());
        f.registry.register(f.alice, alice_phone.clone());
        f.registry.register(f.alice, alice_laptop.clone());

        f.service
            .send_message(
                f.alice,
                f.match_id,
                Some("hey".into()),
                None,
                None,
                Some(alice_phone.id()),
            )
            .unwrap();

        let to_bob = bob_conn.payloads_for(events::RECEIVE_MESSAGE);
        assert_eq!(to_bob.len(), 1);
        assert_eq!(to_bob[0]["is_me"], serde_json::json!(false));
        assert_eq!(to_bob[0]["content"], serde_json::json!("hey"));

        // the originating device gets no echo, the other one does
        assert!(alice_phone.payloads_for(events::RECEIVE_MESSAGE).is_empty());
        let echo = alice_laptop.payloads_for(events::RECEIVE_MESSAGE);
        assert_eq!(echo.len(), 1);
        assert_eq!(echo[0]["is_me"], serde_json::json!(true));
    }

    #[test]
    fn send_records_a_new_message_notification() {
        let f = setup();
        f.service
            .send_message(f.alice, f.match_id, Some("hey".into()), None, None, None)
            .unwrap();

        let (rows, _) = f.store.notifications_for(f.bob, 20, 0).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].notification_type, "new_message");
        assert_eq!(rows[0].body, "hey");
    }

    #[test]
    fn empty_message_is_rejected() {
        let f = setup();
        assert!(f
            .service
            .send_message(f.alice, f.match_id, Some("   ".into()), None, None, None)
            .is_err());
        assert!(f
            .service
            .send_message(f.alice, f.match_id, None, None, None, None)
            .is_err());
        assert!(f.store.all_messages().is_empty());
    }

    #[test]
    fn media_kind_requires_media_url() {
        let f = setup();
        assert!(f
            .service
            .send_message(
                f.alice,
                f.match_id,
                Some("look".into()),
                None,
                Some(MessageKind::Image),
                None,
            )
            .is_err());
    }

    #[test]
    fn outsiders_cannot_message_a_match() {
        let f = setup();
        let mallory = Uuid::new_v4();
        f.store.add_profile(mallory, "Mallory", 33);
        let err = f
            .service
            .send_message(mallory, f.match_id, Some("hi".into()), None, None, None)
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Known { code: ErrorCode::NotMatchParticipant, .. }
        ));
    }

    #[test]
    fn unknown_match_is_not_found() {
        let f = setup();
        assert!(f
            .service
            .send_message(f.alice, Uuid::new_v4(), Some("hi".into()), None, None, None)
            .is_err());
    }

    #[test]
    fn mark_read_sends_one_receipt_per_author() {
        let f = setup();
        let m1 = f
            .service
            .send_message(f.alice, f.match_id, Some("one".into()), None, None, None)
            .unwrap();
        let m2 = f
            .service
            .send_message(f.alice, f.match_id, Some("two".into()), None, None, None)
            .unwrap();

        let alice_conn = FakeConnection::new("alice-1");
        f.registry.register(f.alice, alice_conn.clone());

        let read_ids = f.service.mark_read(f.bob, f.match_id).unwrap();
        assert_eq!(read_ids.len(), 2);

        let receipts = alice_conn.payloads_for(events::MESSAGES_READ);
        assert_eq!(receipts.len(), 1, "one receipt per author");
        assert_eq!(receipts[0]["reader_id"], serde_json::json!(f.bob));
        let ids: Vec<Uuid> =
            serde_json::from_value(receipts[0]["message_ids"].clone()).unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&m1.id) && ids.contains(&m2.id));

        // everything addressed to bob is now read
        assert!(f.store.all_messages().iter().all(|m| m.is_read));
    }

    #[test]
    fn mark_read_skips_messages_authored_by_the_reader() {
        let f = setup();
        f.service
            .send_message(f.bob, f.match_id, Some("from bob".into()), None, None, None)
            .unwrap();

        let read_ids = f.service.mark_read(f.bob, f.match_id).unwrap();
        assert!(read_ids.is_empty());

        // repeated mark_read with nothing unread pushes no receipts
        let bob_conn = FakeConnection::new("bob-1");
        f.registry.register(f.bob, bob_conn.clone());
        f.service.mark_read(f.alice, f.match_id).unwrap();
        let again = f.service.mark_read(f.alice, f.match_id).unwrap();
        assert!(again.is_empty());
        assert_eq!(bob_conn.payloads_for(events::MESSAGES_READ).len(), 1);
    }

    #[test]
    fn typing_is_relayed_to_the_peer_only() {
        let f = setup();
        let bob_conn = FakeConnection::new("bob-1");
        let alice_conn = FakeConnection::new("alice-1");
        f.registry.register(f.bob, bob_conn.clone());
        f.registry.register(f.alice, alice_conn.clone());

        f.service.set_typing(f.alice, f.match_id, true).unwrap();
        f.service.set_typing(f.alice, f.match_id, false).unwrap();

        let typing = bob_conn.payloads_for(events::NOTIFY_TYPING);
        assert_eq!(typing.len(), 1);
        assert_eq!(typing[0]["display_name"], serde_json::json!("Alice"));
        assert_eq!(bob_conn.payloads_for(events::NOTIFY_STOPPED_TYPING).len(), 1);
        assert!(alice_conn.sent().is_empty());

        // nothing was persisted for typing
        assert!(f.store.all_messages().is_empty());
    }

    #[test]
    fn list_messages_is_participant_gated() {
        let f = setup();
        f.service
            .send_message(f.alice, f.match_id, Some("hey".into()), None, None, None)
            .unwrap();

        let (items, total) = f.service.list_messages(f.bob, f.match_id, 20, 0).unwrap();
        assert_eq!(total, 1);
        assert_eq!(items.len(), 1);

        let mallory = Uuid::new_v4();
        f.store.add_profile(mallory, "Mallory", 33);
        assert!(f.service.list_messages(mallory, f.match_id, 20, 0).is_err());
    }
}
