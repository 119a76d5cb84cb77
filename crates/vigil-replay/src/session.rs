//! Session lifecycle
//!
//! Exactly one session is active per recording context. A session rotates
//! once it has been idle for at least the configured timeout; rotation issues
//! a fresh id and restarts segment numbering at 0.

use chrono::Duration;
use tracing::{debug, info};
use vigil_core::{generate_id, UtcDateTime};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: String,
    started_at: UtcDateTime,
    last_activity_at: UtcDateTime,
    segment_id: u32,
    live: bool,
}

impl Session {
    fn new(now: UtcDateTime, live: bool) -> Self {
        Self {
            id: generate_id(),
            started_at: now,
            last_activity_at: now,
            segment_id: 0,
            live,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn started_at(&self) -> UtcDateTime {
        self.started_at
    }

    pub fn last_activity_at(&self) -> UtcDateTime {
        self.last_activity_at
    }

    /// Index the next flushed segment will carry
    pub fn segment_id(&self) -> u32 {
        self.segment_id
    }

    /// A session created by rotation stays pristine (nothing is sent for it)
    /// until the first user activity arrives.
    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Called after a segment was handed to the transport
    pub(crate) fn advance_segment(&mut self) {
        self.segment_id += 1;
    }
}

pub struct SessionManager {
    session: Session,
    idle_timeout: Duration,
    rotations: u64,
}

impl SessionManager {
    /// Start the first session; it is live from the outset
    pub fn new(idle_timeout: std::time::Duration, now: UtcDateTime) -> Self {
        let idle_timeout = Duration::from_std(idle_timeout).unwrap_or(Duration::MAX);
        let session = Session::new(now, true);
        info!("Started replay session {}", session.id);

        Self {
            session,
            idle_timeout,
            rotations: 0,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub(crate) fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn rotations(&self) -> u64 {
        self.rotations
    }

    /// Record user activity. Returns `true` when this activity turned a
    /// pristine session live.
    pub fn record_activity(&mut self, now: UtcDateTime) -> bool {
        if now > self.session.last_activity_at {
            self.session.last_activity_at = now;
        }
        if self.session.live {
            return false;
        }
        self.session.live = true;
        debug!("Replay session {} is now live", self.session.id);
        true
    }

    pub fn idle_for(&self, now: UtcDateTime) -> Duration {
        now - self.session.last_activity_at
    }

    pub fn is_expired(&self, now: UtcDateTime) -> bool {
        self.idle_for(now) >= self.idle_timeout
    }

    /// Rotate the session when it has been idle for at least the timeout.
    /// Returns whether a rotation happened.
    pub fn check_expiry(&mut self, now: UtcDateTime) -> bool {
        if !self.is_expired(now) {
            return false;
        }

        let previous = std::mem::replace(&mut self.session, Session::new(now, false));
        self.rotations += 1;
        info!(
            "Replay session {} expired after {}ms idle, rotated to {}",
            previous.id,
            (now - previous.last_activity_at).num_milliseconds(),
            self.session.id
        );
        true
    }
}
