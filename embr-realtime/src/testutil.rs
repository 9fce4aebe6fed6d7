//! In-memory fakes for the store and transport seams, so registry, resolver
//! and fanout logic can be exercised without postgres or live sockets.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use embr_shared::errors::{AppError, AppResult};

use crate::models::{
    canonical_pair, Match, Message, NewMessage, NewNotification, Notification, ProfileSnapshot,
    Swipe,
};
use crate::registry::{ConnId, LiveConnection, PushError};
use crate::store::Store;

#[derive(Default)]
struct Inner {
    profiles: HashMap<Uuid, ProfileSnapshot>,
    swipes: HashMap<(Uuid, Uuid), Swipe>,
    matches: Vec<Match>,
    messages: Vec<Message>,
    notifications: Vec<Notification>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_notification_insert: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_profile(&self, user_id: Uuid, display_name: &str, age: i32) {
        let mut inner = self.inner.lock().unwrap();
        inner.profiles.insert(
            user_id,
            ProfileSnapshot {
                user_id,
                display_name: display_name.to_string(),
                avatar_url: None,
                age,
                is_online: false,
                last_seen_at: None,
            },
        );
    }

    pub fn fail_notification_inserts(&self, fail: bool) {
        self.fail_notification_insert.store(fail, Ordering::SeqCst);
    }

    pub fn match_count(&self) -> usize {
        self.inner.lock().unwrap().matches.len()
    }

    pub fn all_notifications(&self) -> Vec<Notification> {
        self.inner.lock().unwrap().notifications.clone()
    }

    pub fn all_messages(&self) -> Vec<Message> {
        self.inner.lock().unwrap().messages.clone()
    }
}

impl Store for MemoryStore {
    fn profile_snapshot(&self, user_id: Uuid) -> AppResult<Option<ProfileSnapshot>> {
        Ok(self.inner.lock().unwrap().profiles.get(&user_id).cloned())
    }

    fn set_presence(
        &self,
        user_id: Uuid,
        is_online: bool,
        last_seen: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(profile) = inner.profiles.get_mut(&user_id) {
            profile.is_online = is_online;
            profile.last_seen_at = last_seen;
        }
        Ok(())
    }

    fn get_swipe(&self, swiper_id: Uuid, target_id: Uuid) -> AppResult<Option<Swipe>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .swipes
            .get(&(swiper_id, target_id))
            .cloned())
    }

    fn upsert_swipe(&self, swiper_id: Uuid, target_id: Uuid, is_like: bool) -> AppResult<Swipe> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let swipe = inner
            .swipes
            .entry((swiper_id, target_id))
            .and_modify(|s| {
                s.is_like = is_like;
                s.updated_at = now;
            })
            .or_insert_with(|| Swipe {
                id: Uuid::new_v4(),
                swiper_id,
                target_id,
                is_like,
                created_at: now,
                updated_at: now,
            });
        Ok(swipe.clone())
    }

    fn find_match(&self, a: Uuid, b: Uuid) -> AppResult<Option<Match>> {
        let (lo, hi) = canonical_pair(a, b);
        Ok(self
            .inner
            .lock()
            .unwrap()
            .matches
            .iter()
            .find(|m| m.user_a == lo && m.user_b == hi)
            .cloned())
    }

    fn match_by_id(&self, match_id: Uuid) -> AppResult<Option<Match>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .matches
            .iter()
            .find(|m| m.id == match_id)
            .cloned())
    }

    fn create_match(&self, a: Uuid, b: Uuid) -> AppResult<Option<Match>> {
        let (lo, hi) = canonical_pair(a, b);
        let mut inner = self.inner.lock().unwrap();
        // same unique constraint the canonical pair carries in postgres
        if inner.matches.iter().any(|m| m.user_a == lo && m.user_b == hi) {
            return Ok(None);
        }
        let m = Match {
            id: Uuid::new_v4(),
            user_a: lo,
            user_b: hi,
            created_at: Utc::now(),
        };
        inner.matches.push(m.clone());
        Ok(Some(m))
    }

    fn delete_match(&self, match_id: Uuid) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.matches.retain(|m| m.id != match_id);
        Ok(())
    }

    fn matches_for(&self, user_id: Uuid) -> AppResult<Vec<Match>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .matches
            .iter()
            .filter(|m| m.contains(user_id))
            .cloned()
            .collect())
    }

    fn matched_peer_ids(&self, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        Ok(self
            .matches_for(user_id)?
            .iter()
            .map(|m| m.other(user_id))
            .collect())
    }

    fn insert_message(&self, new: NewMessage) -> AppResult<Message> {
        let message = Message {
            id: new.id,
            match_id: new.match_id,
            sender_id: new.sender_id,
            receiver_id: new.receiver_id,
            content: new.content,
            media_url: new.media_url,
            kind: new.kind,
            is_read: new.is_read,
            created_at: new.created_at,
        };
        self.inner.lock().unwrap().messages.push(message.clone());
        Ok(message)
    }

    fn messages_for_match(
        &self,
        match_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<Message>, i64)> {
        let inner = self.inner.lock().unwrap();
        let mut items: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| m.match_id == match_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = items.len() as i64;
        let items = items
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((items, total))
    }

    fn mark_messages_read(&self, match_id: Uuid, reader: Uuid) -> AppResult<Vec<Message>> {
        let mut inner = self.inner.lock().unwrap();
        let mut updated = Vec::new();
        for m in inner.messages.iter_mut() {
            if m.match_id == match_id && m.receiver_id == reader && !m.is_read {
                m.is_read = true;
                updated.push(m.clone());
            }
        }
        Ok(updated)
    }

    fn insert_notification(&self, new: NewNotification) -> AppResult<Notification> {
        if self.fail_notification_insert.load(Ordering::SeqCst) {
            return Err(AppError::internal("injected notification insert failure"));
        }
        let notification = Notification {
            id: new.id,
            user_id: new.user_id,
            notification_type: new.notification_type,
            body: new.body,
            sender_id: new.sender_id,
            reference_id: new.reference_id,
            is_read: new.is_read,
            created_at: new.created_at,
        };
        self.inner
            .lock()
            .unwrap()
            .notifications
            .push(notification.clone());
        Ok(notification)
    }

    fn notifications_for(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<Notification>, i64)> {
        let inner = self.inner.lock().unwrap();
        let mut items: Vec<Notification> = inner
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = items.len() as i64;
        let items = items
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((items, total))
    }

    fn count_unread_notifications(&self, user_id: Uuid) -> AppResult<i64> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .count() as i64)
    }

    fn mark_notification_read(&self, id: Uuid, user_id: Uuid) -> AppResult<Option<Notification>> {
        let mut inner = self.inner.lock().unwrap();
        for n in inner.notifications.iter_mut() {
            if n.id == id && n.user_id == user_id {
                n.is_read = true;
                return Ok(Some(n.clone()));
            }
        }
        Ok(None)
    }

    fn mark_all_notifications_read(&self, user_id: Uuid) -> AppResult<usize> {
        let mut inner = self.inner.lock().unwrap();
        let mut updated = 0;
        for n in inner.notifications.iter_mut() {
            if n.user_id == user_id && !n.is_read {
                n.is_read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }
}

/// Transport fake: records everything sent to it and can be told to fail,
/// which exercises the registry's reaper path.
pub struct FakeConnection {
    id: ConnId,
    sent: Mutex<Vec<(String, serde_json::Value)>>,
    fail: AtomicBool,
}

impl FakeConnection {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: ConnId::from(id),
            sent: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        })
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, serde_json::Value)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_events(&self) -> Vec<String> {
        self.sent().into_iter().map(|(event, _)| event).collect()
    }

    pub fn payloads_for(&self, event: &str) -> Vec<serde_json::Value> {
        self.sent()
            .into_iter()
            .filter(|(e, _)| e == event)
            .map(|(_, payload)| payload)
            .collect()
    }
}

impl LiveConnection for FakeConnection {
    fn id(&self) -> &ConnId {
        &self.id
    }

    fn send(&self, event: &str, payload: &serde_json::Value) -> Result<(), PushError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PushError);
        }
        self.sent
            .lock()
            .unwrap()
            .push((event.to_string(), payload.clone()));
        Ok(())
    }
}
