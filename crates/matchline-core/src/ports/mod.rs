//! Ports (interfaces to the outside world)
//!
//! Driven ports implemented by adapters:
//! - [`local_store`] - Durable typed table set (SQLite adapter in `matchline-store`)
//! - [`backend`] - The server's pull/push HTTP contract (adapter in `matchline-api`)
//! - [`notifier`] - Background-to-foreground completion signal

pub mod backend;
pub mod local_store;
pub mod notifier;

pub use backend::{BackendGateway, PullResponse, PushAck, TokenProvider};
pub use local_store::{LocalStore, QueueCounts};
pub use notifier::ForegroundNotifier;
