//! Wire types shared by the event hub and the HTTP gateway.
//!
//! Every event pushed to a dashboard is one JSON object framed as a single
//! SSE `data:` line. The shapes here are what the admin dashboard parses.

pub mod event;
pub mod payroll;
pub mod stats;

pub use event::{Event, EventDraft, EventKind};
pub use payroll::{DomainEvent, PayrollSigned};
pub use stats::HubStats;
