//! Bounded trail of session lifecycle events.
//!
//! The session manager records one event per login attempt, logout, forced
//! logout and restore. Events hold only the username and a timestamp; tokens and
//! passwords never enter the trail.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// What happened to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEventKind {
    /// A login succeeded and replaced any previous session
    LoggedIn,
    /// A login attempt was rejected or could not reach the server
    LoginFailed,
    /// The caller logged out
    LoggedOut,
    /// The server rejected the token and the session was cleared
    Expired,
    /// A session was reconstructed from durable storage at start-up
    Restored,
    /// A new account was registered
    Registered,
}

impl fmt::Display for SessionEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionEventKind::LoggedIn => "logged_in",
            SessionEventKind::LoginFailed => "login_failed",
            SessionEventKind::LoggedOut => "logged_out",
            SessionEventKind::Expired => "expired",
            SessionEventKind::Restored => "restored",
            SessionEventKind::Registered => "registered",
        };
        f.write_str(name)
    }
}

/// One entry of the trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    /// Event category
    pub kind: SessionEventKind,
    /// Username involved, when known
    pub username: Option<String>,
    /// When it was recorded
    pub at: DateTime<Utc>,
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} user={}",
            self.at.to_rfc3339(),
            self.kind,
            self.username.as_deref().unwrap_or("-")
        )
    }
}

/// Keeps the most recent `capacity` events, oldest first.
#[derive(Debug)]
pub struct SessionEvents {
    events: Mutex<VecDeque<SessionEvent>>,
    capacity: usize,
}

impl SessionEvents {
    /// A trail that keeps at most `capacity` events (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub(crate) fn record(&self, kind: SessionEventKind, username: Option<&str>) {
        let mut events = self.events.lock();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(SessionEvent {
            kind,
            username: username.map(str::to_string),
            at: Utc::now(),
        });
    }

    /// Copy of the trail, oldest first.
    pub fn snapshot(&self) -> Vec<SessionEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Most recent event.
    pub fn last(&self) -> Option<SessionEvent> {
        self.events.lock().back().cloned()
    }

    /// Number of events held.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// True when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::with_capacity(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_order() {
        let trail = SessionEvents::default();
        trail.record(SessionEventKind::LoggedIn, Some("admin"));
        trail.record(SessionEventKind::LoggedOut, Some("admin"));

        let kinds: Vec<_> = trail.snapshot().into_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![SessionEventKind::LoggedIn, SessionEventKind::LoggedOut]
        );
    }

    #[test]
    fn drops_oldest_beyond_capacity() {
        let trail = SessionEvents::with_capacity(2);
        trail.record(SessionEventKind::LoginFailed, Some("a"));
        trail.record(SessionEventKind::LoginFailed, Some("b"));
        trail.record(SessionEventKind::LoginFailed, Some("c"));

        let names: Vec<_> = trail
            .snapshot()
            .into_iter()
            .filter_map(|e| e.username)
            .collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn display_shows_kind_and_user() {
        let trail = SessionEvents::default();
        assert!(trail.is_empty());
        trail.record(SessionEventKind::Expired, None);

        let line = trail.last().unwrap().to_string();
        assert!(line.contains("expired"));
        assert!(line.contains("user=-"));
    }
}
