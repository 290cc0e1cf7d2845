//! `payroll-events`: in-process publish/subscribe hub for the admin
//! dashboard feed.
//!
//! # Overview
//!
//! Publishers call [`EventHub::broadcast`] (or one of its typed wrappers);
//! the hub throttles bursts per event type, records the event in a bounded
//! history ring, and pushes it to every open [`Subscription`]. A background
//! maintenance task sends heartbeats and reclaims connections whose
//! transport has gone away.
//!
//! | Knob                    | Default | Effect                                   |
//! |-------------------------|---------|------------------------------------------|
//! | `max_connections`       | 5       | further `add_connection` calls rejected  |
//! | `max_history_size`      | 50      | oldest events evicted first              |
//! | `history_snapshot_size` | 10      | backlog replayed to each new joiner      |
//! | `throttle_interval_ms`  | 1000    | same-type events inside window dropped   |
//! | `heartbeat_interval_ms` | 30000   | heartbeat + liveness sweep cadence       |
//!
//! Nothing is persisted: a restart loses all history and connections.

pub mod error;
pub mod history;
pub mod hub;
mod maintenance;
pub mod throttle;

pub use error::{HubError, Result};
pub use hub::{EventHub, Subscription};
