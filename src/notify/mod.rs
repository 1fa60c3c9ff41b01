//! Delivery boundary for flushed notices.
//!
//! Rendering and chat delivery live outside this service. The [`Notifier`]
//! trait is the seam: the engine hands over a [`Notice`] and never hears
//! about it again. Two implementations ship in-tree: [`LogNotifier`] for
//! development and [`HttpNotifier`] to POST notices at a rendering
//! service.
//!
//! # Example
//!
//! ```rust,ignore
//! let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier::new());
//! notifier.notify(&notice).await?;
//! ```

pub mod http;
pub mod log;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use http::HttpNotifier;
pub use log::LogNotifier;

use crate::event::{Event, EventKind, Label, Milestone, PushEvent};

/// Merge state accumulated while an aggregation was pending.
///
/// Which fields are populated depends on how the aggregation started:
/// the label lists for label bursts, the milestone pair for a set/unset
/// pair, the flags for close/reopen coupled with a comment. A solo flush
/// carries the empty default.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Aggregation {
    /// Labels added across the burst, in arrival order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub added_labels: Vec<Label>,

    /// Labels removed across the burst, in arrival order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub removed_labels: Vec<Label>,

    /// Milestone the subject moved away from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone_from: Option<Milestone>,

    /// Milestone the subject moved to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone_to: Option<Milestone>,

    /// The subject was closed by the same actor during the burst.
    pub closed: bool,

    /// The subject was reopened by the same actor during the burst.
    pub reopened: bool,
}

/// Commit counts for a push, derived once at intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PushMetrics {
    /// Commits carried by the push.
    pub total: usize,

    /// Commits new to the repository, as opposed to already reachable
    /// from another branch.
    pub distinct: usize,
}

impl PushMetrics {
    pub fn for_push(push: &PushEvent) -> Self {
        Self {
            total: push.commits.len(),
            distinct: push.commits.iter().filter(|commit| commit.distinct).count(),
        }
    }
}

/// Everything a rendering collaborator needs for one outgoing message.
///
/// A collaborator with no rendering for `kind` should skip the notice
/// quietly rather than error; the set of kinds it renders is its own
/// business.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    /// Kind of the representative event.
    pub kind: EventKind,

    /// Representative event. Coupling merges can replace it, so its kind
    /// always matches `kind` but may differ from the event that opened
    /// the aggregation.
    pub event: Event,

    /// Merge state accumulated while pending.
    pub aggregation: Aggregation,

    /// Commit counts, for push notices only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_metrics: Option<PushMetrics>,

    /// Destination channel.
    pub channel_id: String,

    /// Upstream delivery ids coalesced into this notice, oldest first.
    pub delivery_ids: Vec<String>,
}

/// Errors surfaced by notifier implementations.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// HTTP transport failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The notice could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The collaborator refused the notice.
    #[error("delivery failed: {0}")]
    Failed(String),
}

/// Boundary to the rendering and delivery system.
///
/// Implementations are shared across tasks; flushes call `notify` from
/// spawned timers, so they must be cheap to call concurrently.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Deliver one flushed notice.
    async fn notify(&self, notice: &Notice) -> Result<(), NotifyError>;
}
