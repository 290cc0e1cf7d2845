pub mod error;
pub mod health;
pub mod sse;
pub mod webhooks;
