use payroll_protocol::EventKind;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Per-type burst suppression: at most one accepted event per type per
/// `interval`. Suppressed events are dropped, not queued.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    /// Time of the last *accepted* event of each type.
    last_sent: HashMap<EventKind, Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: HashMap::new(),
        }
    }

    /// Returns true and records `now` if an event of `kind` may go out.
    pub fn allow(&mut self, kind: &EventKind, now: Instant) -> bool {
        if let Some(last) = self.last_sent.get(kind) {
            if now.saturating_duration_since(*last) < self.interval {
                return false;
            }
        }
        self.last_sent.insert(kind.clone(), now);
        true
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}
