use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use tutor_core::analysis::AnalyzeResponse;
use tutor_core::ids::SessionId;
use tutor_core::messages::{ChatMessage, Role};

const MAX_TTL_HOURS: u64 = 24 * 365 * 100;

/// One tutoring conversation.
///
/// `expires_at` is fixed at creation (`created_at + ttl`) and is not extended by activity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_analysis: Option<AnalyzeResponse>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// In-memory, TTL-expiring session store shared by all requests.
///
/// Expiry is lazy: an expired session is removed the first time it is read
/// or written after its deadline. [`SessionStore::purge_expired`] sweeps the rest.
pub struct SessionStore {
    sessions: DashMap<SessionId, Session>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    /// Capped at a century so deadline arithmetic cannot overflow.
    pub fn with_ttl_hours(hours: u64) -> Self {
        Self::new(Duration::hours(hours.min(MAX_TTL_HOURS) as i64))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[instrument(skip(self))]
    pub fn create(&self) -> SessionId {
        self.create_at(Utc::now())
    }

    pub fn create_at(&self, now: DateTime<Utc>) -> SessionId {
        let id = SessionId::new();
        let session = Session {
            id: id.clone(),
            messages: Vec::new(),
            created_at: now,
            expires_at: now + self.ttl,
            last_analysis: None,
        };
        let _ = self.sessions.insert(id.clone(), session);
        debug!(session_id = %id, "session created");
        id
    }

    /// Snapshot of a live session. `None` if unknown or expired.
    pub fn get(&self, id: &SessionId) -> Option<Session> {
        self.get_at(id, Utc::now())
    }

    pub fn get_at(&self, id: &SessionId, now: DateTime<Utc>) -> Option<Session> {
        let session = self.sessions.get(id).map(|entry| entry.value().clone())?;
        if session.is_expired_at(now) {
            self.evict(id, now);
            return None;
        }
        Some(session)
    }

    /// Return `id` if it names a live session, otherwise start a new one.
    pub fn get_or_create(&self, id: Option<&SessionId>) -> SessionId {
        match id {
            Some(id) if self.get(id).is_some() => id.clone(),
            _ => self.create(),
        }
    }

    /// Append a turn. `false` if the session is unknown or expired.
    pub fn add_message(&self, id: &SessionId, role: Role, content: impl Into<String>) -> bool {
        self.update_at(id, Utc::now(), |session| {
            session.messages.push(ChatMessage {
                role,
                content: content.into(),
            });
        })
    }

    /// Store the final aggregated response of an analyze request.
    pub fn record_analysis(&self, id: &SessionId, response: AnalyzeResponse) -> bool {
        self.update_at(id, Utc::now(), |session| session.last_analysis = Some(response))
    }

    pub fn delete(&self, id: &SessionId) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            debug!(session_id = %id, "session deleted");
        }
        removed
    }

    /// Drop every session whose deadline has passed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired_at(now));
        let purged = before.saturating_sub(self.sessions.len());
        if purged > 0 {
            debug!(purged, "expired sessions purged");
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn update_at(&self, id: &SessionId, now: DateTime<Utc>, f: impl FnOnce(&mut Session)) -> bool {
        let expired = match self.sessions.get_mut(id) {
            None => return false,
            Some(mut entry) if !entry.is_expired_at(now) => {
                f(entry.value_mut());
                return true;
            }
            Some(_) => true,
        };
        if expired {
            self.evict(id, now);
        }
        false
    }

    fn evict(&self, id: &SessionId, now: DateTime<Utc>) {
        if self.sessions.remove_if(id, |_, s| s.is_expired_at(now)).is_some() {
            debug!(session_id = %id, "session expired");
        }
    }
}
