//! # Hookfold
//!
//! A webhook intake and event-aggregation engine: it receives signed
//! GitHub-style deliveries, decodes them into typed events, coalesces
//! bursts of related events per subscription, and hands merged notices
//! to a delivery backend.
//!
//! ## Architecture
//!
//! ```text
//! GitHub -> HTTP intake -> signature check -> decode -> Dispatcher
//!                                                          |
//!                                        AggregationEngine (quiet window)
//!                                                          |
//!                                                      Notifier
//! ```
//!
//! ## Modules
//!
//! - [`event`]: Typed webhook payloads and the closed [`Event`] sum type
//! - [`signature`]: HMAC-SHA1 delivery signing and verification
//! - [`subscription`]: Per-channel subscriptions and derived secrets
//! - [`storage`]: Durable subscription persistence
//! - [`aggregation`]: Burst coalescing with rolling quiet windows
//! - [`dispatch`]: Lifecycle handling and routing into the engine
//! - [`notify`]: Notice delivery backends
//! - [`server`]: HTTP intake routes and request classification

pub mod aggregation;
pub mod config;
pub mod dispatch;
pub mod event;
pub mod notify;
pub mod server;
pub mod shutdown;
pub mod signature;
pub mod storage;
pub mod subscription;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export commonly used types at crate root
pub use aggregation::AggregationEngine;
pub use dispatch::Dispatcher;
pub use event::{Event, EventKind};
pub use notify::{Notice, Notifier, NotifyError};
pub use subscription::{Subscription, SubscriptionStore};
