//! Grace Scheduler
//!
//! Holds a disconnected player's seat for a fixed window. All methods take
//! the current instant explicitly so the timing can be driven by tests.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::game::Username;

/// A seat release waiting for its deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRelease {
    /// Session the player would be removed from.
    pub session: String,
    /// When the release fires.
    pub deadline: Instant,
}

/// At most one pending release per identity.
#[derive(Debug)]
pub struct GraceScheduler {
    period: Duration,
    pending: BTreeMap<Username, PendingRelease>,
}

impl GraceScheduler {
    /// Scheduler whose windows last `period`.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            pending: BTreeMap::new(),
        }
    }

    /// Window length.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Start (or restart) the window for `identity`.
    pub fn begin(&mut self, identity: &Username, session: &str, now: Instant) -> Instant {
        let deadline = now + self.period;
        self.pending.insert(
            identity.clone(),
            PendingRelease {
                session: session.to_string(),
                deadline,
            },
        );
        deadline
    }

    /// Cancel the pending release, returning it if there was one.
    pub fn cancel(&mut self, identity: &Username) -> Option<PendingRelease> {
        self.pending.remove(identity)
    }

    /// Whether `identity` has a release pending.
    pub fn is_pending(&self, identity: &Username) -> bool {
        self.pending.contains_key(identity)
    }

    /// Earliest deadline among pending releases.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    /// Number of pending releases.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Remove and return every release whose deadline is at or before `now`.
    pub fn take_expired(&mut self, now: Instant) -> Vec<(Username, PendingRelease)> {
        let due: Vec<Username> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(name, _)| name.clone())
            .collect();

        due.into_iter()
            .filter_map(|name| self.pending.remove(&name).map(|p| (name, p)))
            .collect()
    }
}
