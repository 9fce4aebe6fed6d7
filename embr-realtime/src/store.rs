use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use embr_shared::clients::db::DbPool;
use embr_shared::errors::{AppError, AppResult};

use crate::models::{
    canonical_pair, Match, Message, NewMatch, NewMessage, NewNotification, NewSwipe,
    Notification, Profile, ProfileSnapshot, Swipe,
};
use crate::schema::{matches, messages, notifications, profiles, swipes};

/// Persistence seam for the realtime core. Every method is an explicit,
/// flattened query scoped to one operation; callers never receive live
/// object graphs.
pub trait Store: Send + Sync {
    // Profile collaborator
    fn profile_snapshot(&self, user_id: Uuid) -> AppResult<Option<ProfileSnapshot>>;
    fn set_presence(
        &self,
        user_id: Uuid,
        is_online: bool,
        last_seen: Option<DateTime<Utc>>,
    ) -> AppResult<()>;

    // Swipe ledger
    fn get_swipe(&self, swiper_id: Uuid, target_id: Uuid) -> AppResult<Option<Swipe>>;
    fn upsert_swipe(&self, swiper_id: Uuid, target_id: Uuid, is_like: bool) -> AppResult<Swipe>;

    // Match ledger
    fn find_match(&self, a: Uuid, b: Uuid) -> AppResult<Option<Match>>;
    fn match_by_id(&self, match_id: Uuid) -> AppResult<Option<Match>>;
    /// Insert the canonical pair. Returns `None` when the pair is already
    /// matched (unique-constraint conflict treated as success).
    fn create_match(&self, a: Uuid, b: Uuid) -> AppResult<Option<Match>>;
    fn delete_match(&self, match_id: Uuid) -> AppResult<()>;
    fn matches_for(&self, user_id: Uuid) -> AppResult<Vec<Match>>;
    fn matched_peer_ids(&self, user_id: Uuid) -> AppResult<Vec<Uuid>>;

    // Messages
    fn insert_message(&self, new: NewMessage) -> AppResult<Message>;
    fn messages_for_match(
        &self,
        match_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<Message>, i64)>;
    /// Flip `is_read` on every unread message in the match addressed to
    /// `reader`, returning the affected rows.
    fn mark_messages_read(&self, match_id: Uuid, reader: Uuid) -> AppResult<Vec<Message>>;

    // Notifications
    fn insert_notification(&self, new: NewNotification) -> AppResult<Notification>;
    fn notifications_for(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<Notification>, i64)>;
    fn count_unread_notifications(&self, user_id: Uuid) -> AppResult<i64>;
    fn mark_notification_read(&self, id: Uuid, user_id: Uuid) -> AppResult<Option<Notification>>;
    fn mark_all_notifications_read(&self, user_id: Uuid) -> AppResult<usize>;
}

pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> AppResult<diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<PgConnection>>> {
        self.pool.get().map_err(|e| {
            tracing::error!(error = %e, "failed to get db connection");
            AppError::internal("database connection error")
        })
    }
}

impl Store for PgStore {
    fn profile_snapshot(&self, user_id: Uuid) -> AppResult<Option<ProfileSnapshot>> {
        let mut conn = self.conn()?;
        let profile = profiles::table
            .find(user_id)
            .first::<Profile>(&mut conn)
            .optional()?;
        Ok(profile.map(ProfileSnapshot::from))
    }

    fn set_presence(
        &self,
        user_id: Uuid,
        is_online: bool,
        last_seen: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        let mut conn = self.conn()?;
        diesel::update(profiles::table.find(user_id))
            .set((
                profiles::is_online.eq(is_online),
                profiles::last_seen_at.eq(last_seen),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    fn get_swipe(&self, swiper_id: Uuid, target_id: Uuid) -> AppResult<Option<Swipe>> {
        let mut conn = self.conn()?;
        let swipe = swipes::table
            .filter(swipes::swiper_id.eq(swiper_id))
            .filter(swipes::target_id.eq(target_id))
            .first::<Swipe>(&mut conn)
            .optional()?;
        Ok(swipe)
    }

    fn upsert_swipe(&self, swiper_id: Uuid, target_id: Uuid, is_like: bool) -> AppResult<Swipe> {
        let mut conn = self.conn()?;
        let now = Utc::now();
        let new = NewSwipe {
            id: Uuid::new_v4(),
            swiper_id,
            target_id,
            is_like,
            created_at: now,
            updated_at: now,
        };
        let swipe = diesel::insert_into(swipes::table)
            .values(&new)
            .on_conflict((swipes::swiper_id, swipes::target_id))
            .do_update()
            .set((swipes::is_like.eq(is_like), swipes::updated_at.eq(now)))
            .get_result::<Swipe>(&mut conn)?;
        Ok(swipe)
    }

    fn find_match(&self, a: Uuid, b: Uuid) -> AppResult<Option<Match>> {
        let (lo, hi) = canonical_pair(a, b);
        let mut conn = self.conn()?;
        let m = matches::table
            .filter(matches::user_a.eq(lo))
            .filter(matches::user_b.eq(hi))
            .first::<Match>(&mut conn)
            .optional()?;
        Ok(m)
    }

    fn match_by_id(&self, match_id: Uuid) -> AppResult<Option<Match>> {
        let mut conn = self.conn()?;
        let m = matches::table
            .find(match_id)
            .first::<Match>(&mut conn)
            .optional()?;
        Ok(m)
    }

    fn create_match(&self, a: Uuid, b: Uuid) -> AppResult<Option<Match>> {
        let (lo, hi) = canonical_pair(a, b);
        let mut conn = self.conn()?;
        let new = NewMatch {
            id: Uuid::new_v4(),
            user_a: lo,
            user_b: hi,
            created_at: Utc::now(),
        };
        // ON CONFLICT DO NOTHING returns zero rows when another writer got
        // there first; that surfaces as None, not an error.
        let inserted = diesel::insert_into(matches::table)
            .values(&new)
            .on_conflict((matches::user_a, matches::user_b))
            .do_nothing()
            .get_result::<Match>(&mut conn)
            .optional()?;
        Ok(inserted)
    }

    fn delete_match(&self, match_id: Uuid) -> AppResult<()> {
        let mut conn = self.conn()?;
        diesel::delete(matches::table.find(match_id)).execute(&mut conn)?;
        Ok(())
    }

    fn matches_for(&self, user_id: Uuid) -> AppResult<Vec<Match>> {
        let mut conn = self.conn()?;
        let items = matches::table
            .filter(matches::user_a.eq(user_id).or(matches::user_b.eq(user_id)))
            .order(matches::created_at.desc())
            .load::<Match>(&mut conn)?;
        Ok(items)
    }

    fn matched_peer_ids(&self, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        Ok(self
            .matches_for(user_id)?
            .iter()
            .map(|m| m.other(user_id))
            .collect())
    }

    fn insert_message(&self, new: NewMessage) -> AppResult<Message> {
        let mut conn = self.conn()?;
        let message = diesel::insert_into(messages::table)
            .values(&new)
            .get_result::<Message>(&mut conn)?;
        Ok(message)
    }

    fn messages_for_match(
        &self,
        match_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<Message>, i64)> {
        let mut conn = self.conn()?;
        let total: i64 = messages::table
            .filter(messages::match_id.eq(match_id))
            .count()
            .get_result(&mut conn)?;
        let items = messages::table
            .filter(messages::match_id.eq(match_id))
            .order(messages::created_at.desc())
            .limit(limit)
            .offset(offset)
            .load::<Message>(&mut conn)?;
        Ok((items, total))
    }

    fn mark_messages_read(&self, match_id: Uuid, reader: Uuid) -> AppResult<Vec<Message>> {
        let mut conn = self.conn()?;
        let updated = diesel::update(
            messages::table
                .filter(messages::match_id.eq(match_id))
                .filter(messages::receiver_id.eq(reader))
                .filter(messages::is_read.eq(false)),
        )
        .set(messages::is_read.eq(true))
        .get_results::<Message>(&mut conn)?;
        Ok(updated)
    }

    fn insert_notification(&self, new: NewNotification) -> AppResult<Notification> {
        let mut conn = self.conn()?;
        let notification = diesel::insert_into(notifications::table)
            .values(&new)
            .get_result::<Notification>(&mut conn)?;
        Ok(notification)
    }

    fn notifications_for(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<Notification>, i64)> {
        let mut conn = self.conn()?;
        let total: i64 = notifications::table
            .filter(notifications::user_id.eq(user_id))
            .count()
            .get_result(&mut conn)?;
        let items = notifications::table
            .filter(notifications::user_id.eq(user_id))
            .order(notifications::created_at.desc())
            .limit(limit)
            .offset(offset)
            .load::<Notification>(&mut conn)?;
        Ok((items, total))
    }

    fn count_unread_notifications(&self, user_id: Uuid) -> AppResult<i64> {
        let mut conn = self.conn()?;
        let count: i64 = notifications::table
            .filter(notifications::user_id.eq(user_id))
            .filter(notifications::is_read.eq(false))
            .count()
            .get_result(&mut conn)?;
        Ok(count)
    }

    fn mark_notification_read(&self, id: Uuid, user_id: Uuid) -> AppResult<Option<Notification>> {
        let mut conn = self.conn()?;
        let notification = diesel::update(
            notifications::table
                .filter(notifications::id.eq(id))
                .filter(notifications::user_id.eq(user_id)),
        )
        .set(notifications::is_read.eq(true))
        .get_result::<Notification>(&mut conn)
        .optional()?;
        Ok(notification)
    }

    fn mark_all_notifications_read(&self, user_id: Uuid) -> AppResult<usize> {
        let mut conn = self.conn()?;
        let updated = diesel::update(
            notifications::table
                .filter(notifications::user_id.eq(user_id))
                .filter(notifications::is_read.eq(false)),
        )
        .set(notifications::is_read.eq(true))
        .execute(&mut conn)?;
        Ok(updated)
    }
}
