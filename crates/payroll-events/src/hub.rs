use std::collections::BTreeMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard, PoisonError, Weak,
};
use std::time::Duration;

use chrono::{DateTime, Utc};
use payroll_core::config::EventsConfig;
use payroll_protocol::{DomainEvent, Event, EventDraft, EventKind, HubStats};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    error::{HubError, Result},
    history::HistoryRing,
    maintenance::{self, Maintenance},
    throttle::Throttle,
};

/// Frames queued for a subscriber before the connection is considered dead.
/// Two is the floor: the connection and history frames go out before any
/// reader runs.
const MIN_CHANNEL_CAPACITY: usize = 2;

/// Fan-out hub for the admin dashboard feed.
///
/// Construct once at startup with [`EventHub::start`] and share it as
/// `Arc<EventHub>`. All three mutable structures (connection registry,
/// history ring, throttle table) sit behind one lock so every operation
/// observes them in a consistent state; the lock is never held across an
/// `.await`.
pub struct EventHub {
    config: EventsConfig,
    state: Mutex<HubState>,
    next_conn_id: AtomicU64,
    maintenance: Mutex<Option<Maintenance>>,
}

struct HubState {
    /// Registry of open streams keyed by hub-assigned connection id.
    connections: BTreeMap<u64, Connection>,
    history: HistoryRing,
    throttle: Throttle,
    last_event_id: u64,
}

/// Hub-side half of one open stream. The transport owns the receiving end.
struct Connection {
    subscriber_id: String,
    tx: mpsc::Sender<Event>,
    connected_at: DateTime<Utc>,
}

impl EventHub {
    /// Create a hub without its background loop. Tests and embedders that
    /// drive heartbeats themselves use this; servers use [`EventHub::start`].
    pub fn new(config: EventsConfig) -> Self {
        let state = HubState {
            connections: BTreeMap::new(),
            history: HistoryRing::new(config.max_history_size),
            throttle: Throttle::new(Duration::from_millis(config.throttle_interval_ms)),
            last_event_id: 0,
        };
        Self {
            config,
            state: Mutex::new(state),
            next_conn_id: AtomicU64::new(1),
            maintenance: Mutex::new(None),
        }
    }

    /// Create the hub and spawn its heartbeat / liveness loop.
    ///
    /// Must be called inside a Tokio runtime. Pair with [`EventHub::shutdown`].
    pub fn start(config: EventsConfig) -> Arc<Self> {
        let hub = Arc::new(Self::new(config));
        let period = Duration::from_millis(hub.config.heartbeat_interval_ms);
        let handle = maintenance::spawn(Arc::downgrade(&hub), period);
        *hub.maintenance_slot() = Some(handle);
        info!(
            max_connections = hub.config.max_connections,
            heartbeat_ms = hub.config.heartbeat_interval_ms,
            "event hub started"
        );
        hub
    }

    /// Stop the background loop and close every open stream.
    ///
    /// Idempotent. Streams end because their senders are dropped; the hub
    /// never closes a transport directly.
    pub async fn shutdown(&self) {
        let handle = self.maintenance_slot().take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
        let closed = {
            let mut state = self.lock();
            let n = state.connections.len();
            state.connections.clear();
            n
        };
        info!(closed, "event hub shut down");
    }

    // -----------------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------------

    /// Register a new stream for `subscriber_id`.
    ///
    /// On success the subscriber has already been sent one `connection`
    /// event followed by one `history` event; both are queued while the
    /// registry lock is held, so no concurrent broadcast can overtake them.
    pub fn add_connection(self: &Arc<Self>, subscriber_id: impl Into<String>) -> Result<Subscription> {
        let subscriber_id = subscriber_id.into();
        let capacity = self.config.channel_capacity.max(MIN_CHANNEL_CAPACITY);
        let (tx, rx) = mpsc::channel(capacity);

        let conn_id = {
            let mut state = self.lock();
            let max = self.config.max_connections;
            if state.connections.len() >= max {
                warn!(%subscriber_id, max, "connection limit reached");
                return Err(HubError::TooManyConnections { max });
            }

            let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
            let snapshot = state.history.tail(self.config.history_snapshot_size);
            let replayed = snapshot.len();

            // fresh channel with capacity >= 2: neither send can fail
            let _ = tx.try_send(Event::connection("SSE connection established"));
            let _ = tx.try_send(Event::history(snapshot));

            state.connections.insert(
                conn_id,
                Connection {
                    subscriber_id: subscriber_id.clone(),
                    tx,
                    connected_at: Utc::now(),
                },
            );
            info!(
                conn_id,
                %subscriber_id,
                active = state.connections.len(),
                max,
                replayed,
                "subscriber connected"
            );
            conn_id
        };

        Ok(Subscription {
            conn_id,
            subscriber_id,
            rx,
            hub: Arc::downgrade(self),
        })
    }

    /// Deregister a connection. Returns false if it was already gone.
    pub fn remove_connection(&self, conn_id: u64) -> bool {
        let removed = self.lock().connections.remove(&conn_id);
        match removed {
            Some(conn) => {
                let open_for = Utc::now() - conn.connected_at;
                info!(
                    conn_id,
                    subscriber_id = %conn.subscriber_id,
                    open_secs = open_for.num_seconds(),
                    "subscriber disconnected"
                );
                true
            }
            None => false,
        }
    }

    pub fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }

    // -----------------------------------------------------------------------
    // Publishing
    // -----------------------------------------------------------------------

    /// Publish an event to every open stream. Fire-and-forget.
    ///
    /// Returns the assigned event id, or `None` when an event of the same
    /// type went out less than `throttle_interval_ms` ago (the draft is
    /// dropped, not delayed). Connections that cannot accept the event are
    /// deregistered; that never affects delivery to the others.
    pub fn broadcast(&self, draft: EventDraft) -> Option<u64> {
        let mut state = self.lock();
        if !state.throttle.allow(&draft.kind, Instant::now()) {
            debug!(event_type = %draft.kind, "event throttled");
            return None;
        }

        state.last_event_id += 1;
        let id = state.last_event_id;
        let event = draft.into_event(id);
        state.history.push(event.clone());

        let delivered = state.fan_out(&event);
        info!(id, event_type = %event.kind, delivered, "event broadcast");
        Some(id)
    }

    /// Broadcast a `test` event carrying `message`.
    pub fn send_test_event(&self, message: impl Into<String>) -> Option<u64> {
        let message = message.into();
        self.broadcast(
            EventDraft::new(EventKind::Test)
                .with_data(serde_json::json!({ "message": message }))
                .with_message(message),
        )
    }

    /// Broadcast a typed domain event with its human-readable summary.
    pub fn broadcast_domain_event(&self, event: DomainEvent) -> Option<u64> {
        self.broadcast(event.into_draft())
    }

    // -----------------------------------------------------------------------
    // Background work (driven by the maintenance loop)
    // -----------------------------------------------------------------------

    /// Push a heartbeat to every connection. Bypasses the throttle and is
    /// not recorded in history. Returns the number of streams reached.
    pub fn send_heartbeat(&self) -> usize {
        let mut state = self.lock();
        if state.connections.is_empty() {
            return 0;
        }
        let delivered = state.fan_out(&Event::heartbeat());
        debug!(delivered, "heartbeat sent");
        delivered
    }

    /// Drop connections whose receiving end has been closed without the
    /// transport reporting it. Returns how many were reclaimed.
    pub fn sweep_dead_connections(&self) -> usize {
        let mut state = self.lock();
        let before = state.connections.len();
        state.connections.retain(|conn_id, conn| {
            let alive = !conn.tx.is_closed();
            if !alive {
                info!(conn_id, subscriber_id = %conn.subscriber_id, "reclaimed dead connection");
            }
            alive
        });
        before - state.connections.len()
    }

    // -----------------------------------------------------------------------
    // Read-only queries
    // -----------------------------------------------------------------------

    pub fn stats(&self) -> HubStats {
        let state = self.lock();
        HubStats {
            active_connections: state.connections.len(),
            max_connections: self.config.max_connections,
            subscriber_ids: state
                .connections
                .values()
                .map(|c| c.subscriber_id.clone())
                .collect(),
            history_size: state.history.len(),
            max_history_size: state.history.capacity(),
            throttle_interval_ms: state.throttle.interval().as_millis() as u64,
            heartbeat_interval_ms: self.config.heartbeat_interval_ms,
        }
    }

    /// Up to `limit` most recent events, newest first.
    pub fn history(&self, limit: usize) -> Vec<Event> {
        self.lock().history.newest(limit)
    }

    pub fn config(&self) -> &EventsConfig {
        &self.config
    }

    // --- private helpers ---------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, HubState> {
        // state stays consistent even if a holder panicked mid-fan-out
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn maintenance_slot(&self) -> MutexGuard<'_, Option<Maintenance>> {
        self.maintenance.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HubState {
    /// Offer `event` to every connection; deregister the ones that refuse it.
    fn fan_out(&mut self, event: &Event) -> usize {
        let mut dead = Vec::new();
        for (conn_id, conn) in &self.connections {
            match conn.tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(conn_id, subscriber_id = %conn.subscriber_id, "slow consumer, dropping connection");
                    dead.push(*conn_id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(conn_id, subscriber_id = %conn.subscriber_id, "stream closed during send");
                    dead.push(*conn_id);
                }
            }
        }
        for conn_id in &dead {
            self.connections.remove(conn_id);
        }
        self.connections.len()
    }
}

/// Caller-held handle to one open stream.
///
/// Dropping it (the HTTP response body going away) deregisters the
/// connection, which is how an ordinary client disconnect is observed.
pub struct Subscription {
    conn_id: u64,
    subscriber_id: String,
    rx: mpsc::Receiver<Event>,
    hub: Weak<EventHub>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.conn_id
    }

    pub fn subscriber_id(&self) -> &str {
        &self.subscriber_id
    }

    /// Next event for this subscriber; `None` once the hub has dropped the
    /// connection (dead, swept, or hub shut down).
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

#[cfg(test)]
impl Subscription {
    /// Simulate a transport that vanished without the handle being dropped.
    pub(crate) fn close_receiver(&mut self) {
        self.rx.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.remove_connection(self.conn_id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("conn_id", &self.conn_id)
            .field("subscriber_id", &self.subscriber_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use payroll_protocol::PayrollSigned;

    fn config() -> EventsConfig {
        EventsConfig::default()
    }

    fn unthrottled() -> EventsConfig {
        EventsConfig {
            throttle_interval_ms: 0,
            ..EventsConfig::default()
        }
    }

    /// Consume the connection + history preamble, returning the history event.
    async fn skip_preamble(sub: &mut Subscription) -> Event {
        let first = sub.recv().await.expect("connection event");
        assert_eq!(first.kind, EventKind::Connection);
        let second = sub.recv().await.expect("history event");
        assert_eq!(second.kind, EventKind::History);
        second
    }

    fn drain(sub: &mut Subscription) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(ev) = sub.rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_and_throttle_scenario() {
        let hub = Arc::new(EventHub::new(config()));
        let mut subs: Vec<_> = (0..5)
            .map(|i| hub.add_connection(format!("admin{i}")).expect("within capacity"))
            .collect();

        assert_eq!(
            hub.add_connection("admin5").unwrap_err(),
            HubError::TooManyConnections { max: 5 }
        );
        assert_eq!(hub.stats().active_connections, 5);

        for sub in &mut subs {
            skip_preamble(sub).await;
        }

        hub.broadcast_domain_event(DomainEvent::PayrollSigned(PayrollSigned {
            subject_id: Some("NV001".into()),
            subject_name: Some("Alice".into()),
            signed_at: Some("2026-01-31T08:00:00Z".into()),
            signer_name: Some("Alice".into()),
        }))
        .expect("not throttled");

        for sub in &mut subs {
            let got = drain(sub);
            assert_eq!(got.len(), 1);
            assert_eq!(got[0].kind, EventKind::PayrollSigned);
            let msg = got[0].message.as_deref().unwrap();
            assert!(msg.contains("Alice") && msg.contains("NV001"));
        }
        let latest = hub.history(1);
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].kind, EventKind::PayrollSigned);

        assert!(hub.send_test_event("x").is_some());
        for sub in &mut subs {
            assert_eq!(drain(sub).len(), 1);
        }

        assert!(hub.send_test_event("y").is_none());
        for sub in &mut subs {
            assert!(drain(sub).is_empty());
        }

        let recent = hub.history(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].kind, EventKind::Test);
        assert_eq!(recent[0].message.as_deref(), Some("x"));
        assert_eq!(recent[1].kind, EventKind::PayrollSigned);
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_window_reopens() {
        let hub = Arc::new(EventHub::new(config()));
        assert!(hub.send_test_event("a").is_some());
        assert!(hub.send_test_event("b").is_none());

        tokio::time::advance(Duration::from_millis(1000)).await;
        assert!(hub.send_test_event("c").is_some());
        assert_eq!(hub.stats().history_size, 2);
    }

    #[tokio::test]
    async fn new_joiner_gets_preamble_with_bounded_snapshot() {
        let hub = Arc::new(EventHub::new(unthrottled()));
        for i in 0..15 {
            hub.send_test_event(format!("m{i}"));
        }

        let mut sub = hub.add_connection("admin").unwrap();
        let history = skip_preamble(&mut sub).await;
        let snapshot = history.events.expect("snapshot");
        assert_eq!(snapshot.len(), 10);
        // replayed oldest first, ending at the latest event
        assert_eq!(snapshot.first().unwrap().message.as_deref(), Some("m5"));
        assert_eq!(snapshot.last().unwrap().message.as_deref(), Some("m14"));
    }

    #[tokio::test]
    async fn empty_hub_still_sends_history_event() {
        let hub = Arc::new(EventHub::new(config()));
        let mut sub = hub.add_connection("admin").unwrap();
        let history = skip_preamble(&mut sub).await;
        assert_eq!(history.events.map(|e| e.len()), Some(0));
    }

    #[tokio::test]
    async fn history_never_exceeds_bound() {
        let hub = Arc::new(EventHub::new(unthrottled()));
        for i in 0..60 {
            hub.send_test_event(format!("m{i}"));
        }
        let stats = hub.stats();
        assert_eq!(stats.history_size, 50);
        assert_eq!(stats.max_history_size, 50);

        let all = hub.history(500);
        assert_eq!(all.len(), 50);
        assert_eq!(all[0].message.as_deref(), Some("m59"));
        assert_eq!(all[49].message.as_deref(), Some("m10"));
    }

    #[tokio::test]
    async fn event_ids_strictly_increase() {
        let hub = Arc::new(EventHub::new(unthrottled()));
        let ids: Vec<u64> = (0..5).filter_map(|_| hub.send_test_event("x")).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn dropped_subscription_deregisters_without_affecting_others() {
        let hub = Arc::new(EventHub::new(unthrottled()));
        let mut keep = hub.add_connection("keep").unwrap();
        let gone = hub.add_connection("gone").unwrap();
        skip_preamble(&mut keep).await;

        drop(gone);
        assert_eq!(hub.connection_count(), 1);
        assert_eq!(hub.stats().subscriber_ids, vec!["keep".to_string()]);

        hub.send_test_event("still here");
        let got = drain(&mut keep);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].message.as_deref(), Some("still here"));
    }

    #[tokio::test]
    async fn closed_receiver_is_dropped_mid_broadcast() {
        let hub = Arc::new(EventHub::new(unthrottled()));
        let mut a = hub.add_connection("a").unwrap();
        let mut b = hub.add_connection("b").unwrap();
        skip_preamble(&mut b).await;

        a.rx.close();
        hub.send_test_event("after close");

        assert_eq!(hub.connection_count(), 1);
        assert_eq!(drain(&mut b).len(), 1);
    }

    #[tokio::test]
    async fn slow_consumer_is_dropped() {
        let cfg = EventsConfig {
            throttle_interval_ms: 0,
            channel_capacity: 2,
            ..EventsConfig::default()
        };
        let hub = Arc::new(EventHub::new(cfg));
        let mut sub = hub.add_connection("slow").unwrap();

        // preamble fills the channel; the next event cannot be queued
        hub.send_test_event("overflow");
        assert_eq!(hub.connection_count(), 0);

        skip_preamble(&mut sub).await;
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn sweep_reclaims_closed_streams() {
        let hub = Arc::new(EventHub::new(config()));
        let mut a = hub.add_connection("a").unwrap();
        let _b = hub.add_connection("b").unwrap();

        a.rx.close();
        assert_eq!(hub.sweep_dead_connections(), 1);
        assert_eq!(hub.sweep_dead_connections(), 0);
        assert_eq!(hub.stats().subscriber_ids, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn heartbeat_skips_throttle_and_history() {
        let hub = Arc::new(EventHub::new(config()));
        let mut sub = hub.add_connection("admin").unwrap();
        skip_preamble(&mut sub).await;

        assert_eq!(hub.send_heartbeat(), 1);
        assert_eq!(hub.send_heartbeat(), 1);
        let got = drain(&mut sub);
        assert_eq!(got.len(), 2);
        assert!(got.iter().all(|e| e.kind == EventKind::Heartbeat && e.id.is_none()));
        assert!(hub.history(50).is_empty());
    }

    #[tokio::test]
    async fn remove_connection_is_idempotent() {
        let hub = Arc::new(EventHub::new(config()));
        let sub = hub.add_connection("admin").unwrap();
        let id = sub.id();
        assert!(hub.remove_connection(id));
        assert!(!hub.remove_connection(id));
        // dropping the handle afterwards is harmless
        drop(sub);
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn same_subscriber_may_hold_several_streams() {
        let hub = Arc::new(EventHub::new(config()));
        let first = hub.add_connection("admin").unwrap();
        let _second = hub.add_connection("admin").unwrap();
        assert_eq!(hub.connection_count(), 2);

        // closing the older tab must not evict the newer one
        drop(first);
        assert_eq!(hub.stats().subscriber_ids, vec!["admin".to_string()]);
    }

    #[tokio::test]
    async fn queries_are_idempotent() {
        let hub = Arc::new(EventHub::new(unthrottled()));
        let _sub = hub.add_connection("admin").unwrap();
        hub.send_test_event("one");
        hub.send_test_event("two");

        assert_eq!(hub.stats(), hub.stats());
        assert_eq!(hub.history(10), hub.history(10));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn preamble_precedes_concurrent_broadcasts() {
        let hub = Arc::new(EventHub::new(unthrottled()));
        let publisher = {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move {
                for i in 0..200 {
                    hub.send_test_event(format!("m{i}"));
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut subs = Vec::new();
        for i in 0..5 {
            subs.push(hub.add_connection(format!("admin{i}")).unwrap());
            tokio::task::yield_now().await;
        }
        for sub in &mut subs {
            skip_preamble(sub).await;
        }
        drop(subs);
        publisher.await.unwrap();
    }
}
