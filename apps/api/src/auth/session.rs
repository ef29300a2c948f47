//! Per-user cache of the last profile read.
//!
//! Writers that know which users they touched (the webhook, the auth callback
//! and the reward task) invalidate those entries. Every entry also expires
//! after `ttl`, so a write made elsewhere (a referral credit landing on the
//! inviter, an operator reset) is visible within that window. The map never
//! holds more than `max_entries` users; the oldest entry is evicted first.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::models::profile::ProfileRow;

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

pub struct SessionCache {
    entries: RwLock<HashMap<Uuid, (ProfileRow, Instant)>>,
    ttl: Duration,
    max_entries: usize,
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::with_limits(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
    }
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn get(&self, user_id: Uuid) -> Option<ProfileRow> {
        let (profile, stored_at) = self
            .entries
            .read()
            .ok()
            .and_then(|entries| entries.get(&user_id).cloned())?;
        if stored_at.elapsed() < self.ttl {
            return Some(profile);
        }
        self.invalidate(user_id);
        None
    }

    pub fn put(&self, profile: ProfileRow) {
        let Ok(mut entries) = self.entries.write() else {
            return;
        };
        let now = Instant::now();
        entries.retain(|_, (_, stored_at)| now.duration_since(*stored_at) < self.ttl);
        if entries.len() >= self.max_entries && !entries.contains_key(&profile.id) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, (_, stored_at))| *stored_at)
                .map(|(id, _)| *id);
            if let Some(id) = oldest {
                entries.remove(&id);
            }
        }
        entries.insert(profile.id, (profile, now));
    }

    /// Returns true if an entry was dropped.
    pub fn invalidate(&self, user_id: Uuid) -> bool {
        self.entries
            .write()
            .map(|mut entries| entries.remove(&user_id).is_some())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
