use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use uuid::Uuid;

use embr_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{canonical_pair, Match, NotificationType, ProfileSnapshot};
use crate::services::notifications::NotificationService;
use crate::store::Store;

#[derive(Debug)]
pub enum SwipeOutcome {
    /// Mutual like: the match was created by this call.
    Created { match_id: Uuid, peer: ProfileSnapshot },
    /// A dislike dissolved an existing match.
    Retracted,
    Unchanged,
}

/// Records directional swipes and keeps the match ledger consistent with
/// them: a match exists iff both directional swipes are likes.
///
/// The check-then-create step runs inside a per-pair critical section, with
/// the canonical-pair unique constraint as the cross-process backstop, so two
/// opposite-direction swipes racing each other always produce exactly one
/// match row.
pub struct SwipeResolver {
    store: Arc<dyn Store>,
    notifications: Arc<NotificationService>,
    pair_locks: DashMap<(Uuid, Uuid), Arc<Mutex<()>>>,
}

impl SwipeResolver {
    pub fn new(store: Arc<dyn Store>, notifications: Arc<NotificationService>) -> Self {
        Self {
            store,
            notifications,
            pair_locks: DashMap::new(),
        }
    }

    pub fn record_swipe(&self, from: Uuid, to: Uuid, is_like: bool) -> AppResult<SwipeOutcome> {
        if from == to {
            return Err(AppError::new(
                ErrorCode::CannotSwipeSelf,
                "cannot swipe on yourself",
            ));
        }

        let swiper = self
            .store
            .profile_snapshot(from)?
            .ok_or_else(|| AppError::new(ErrorCode::ProfileNotFound, "profile not found"))?;
        let target = self
            .store
            .profile_snapshot(to)?
            .ok_or_else(|| AppError::new(ErrorCode::ProfileNotFound, "swiped profile not found"))?;

        let key = canonical_pair(from, to);
        let lock = self
            .pair_locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let outcome = {
            let _guard = lock
                .lock()
                .map_err(|_| AppError::internal("pair lock poisoned"))?;
            self.resolve_locked(from, to, is_like, &swiper, &target)?
        };

        // drop the pair entry once nobody else holds it; the predicate runs
        // under the shard lock, so a concurrent fetch cannot slip in between
        drop(lock);
        self.pair_locks
            .remove_if(&key, |_, l| Arc::strong_count(l) == 1);

        Ok(outcome)
    }

    fn resolve_locked(
        &self,
        from: Uuid,
        to: Uuid,
        is_like: bool,
        swiper: &ProfileSnapshot,
        target: &ProfileSnapshot,
    ) -> AppResult<SwipeOutcome> {
        let existing = self.store.get_swipe(from, to)?;
        let same_value = existing.map_or(false, |s| s.is_like == is_like);

        // the upsert refreshes the timestamp even when the value is unchanged
        self.store.upsert_swipe(from, to, is_like)?;
        if same_value {
            return Ok(SwipeOutcome::Unchanged);
        }

        if is_like {
            let reverse = self.store.get_swipe(to, from)?;
            if reverse.map_or(false, |s| s.is_like) && self.store.find_match(from, to)?.is_none() {
                if let Some(created) = self.store.create_match(from, to)? {
                    self.notify_matched(&created, swiper, target);
                    return Ok(SwipeOutcome::Created {
                        match_id: created.id,
                        peer: target.clone(),
                    });
                }
                // conflict: another process created the pair first; the
                // match exists, which is all this swipe needed
                tracing::debug!(from = %from, to = %to, "match already created by concurrent writer");
            }
            Ok(SwipeOutcome::Unchanged)
        } else if let Some(m) = self.store.find_match(from, to)? {
            self.store.delete_match(m.id)?;
            tracing::info!(match_id = %m.id, retracted_by = %from, "match retracted");
            Ok(SwipeOutcome::Retracted)
        } else {
            Ok(SwipeOutcome::Unchanged)
        }
    }

    /// One notification per participant, each naming the other. Fanout
    /// failures are logged and never unwind the already-created match.
    fn notify_matched(&self, m: &Match, swiper: &ProfileSnapshot, target: &ProfileSnapshot) {
        for (recipient, other) in [(swiper, target), (target, swiper)] {
            let body = format!("You matched with {}", other.display_name);
            if let Err(e) = self.notifications.create_and_deliver(
                recipient.user_id,
                NotificationType::NewMatch,
                &body,
                Some(other.user_id),
                Some(m.id),
            ) {
                tracing::warn!(
                    match_id = %m.id,
                    recipient = %recipient.user_id,
                    error = %e,
                    "failed to record match notification"
                );
            }
        }
        tracing::info!(match_id = %m.id, user_a = %m.user_a, user_b = %m.user_b, "match created");
    }
}
