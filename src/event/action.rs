//! Action enums for the event kinds that carry one.
//!
//! Variants mirror the upstream wire strings via snake_case renames. The
//! two `x-` prefixed variants are synthesized by the coalescing engine and
//! never arrive from the upstream; the prefix keeps them out of the
//! upstream's namespace.

use serde::{Deserialize, Serialize};

/// Actions on the `issues` event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueAction {
    Opened,
    Edited,
    Deleted,
    Pinned,
    Unpinned,
    Closed,
    Reopened,
    Assigned,
    Unassigned,
    Labeled,
    Unlabeled,
    Locked,
    Unlocked,
    Transferred,
    Milestoned,
    Demilestoned,
    /// Synthesized when a burst of label events collapses into one notice.
    #[serde(rename = "x-labels-changed")]
    LabelsChanged,
    /// Synthesized when a milestone set/unset pair collapses into one notice.
    #[serde(rename = "x-milestone-changed")]
    MilestoneChanged,
}

/// Actions on the `pull_request` event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullRequestAction {
    Opened,
    Edited,
    Closed,
    Reopened,
    Assigned,
    Unassigned,
    ReviewRequested,
    ReviewRequestRemoved,
    ReadyForReview,
    ConvertedToDraft,
    Labeled,
    Unlabeled,
    Locked,
    Unlocked,
    Milestoned,
    Demilestoned,
    Synchronize,
    /// Synthesized when a burst of label events collapses into one notice.
    #[serde(rename = "x-labels-changed")]
    LabelsChanged,
    /// Synthesized when a milestone set/unset pair collapses into one notice.
    #[serde(rename = "x-milestone-changed")]
    MilestoneChanged,
}

/// Actions on the `issue_comment` event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentAction {
    Created,
    Edited,
    Deleted,
}

/// Actions on the `release` event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseAction {
    Published,
    Unpublished,
    Created,
    Edited,
    Deleted,
    Prereleased,
    Released,
}

/// Actions on the `star` event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StarAction {
    Created,
    Deleted,
}

/// Actions on the `milestone` event kind (the standalone milestone
/// lifecycle, not milestone assignment to an issue).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneAction {
    Created,
    Closed,
    Opened,
    Edited,
    Deleted,
}

/// Actions on the `label` event kind (the label definition lifecycle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelAction {
    Created,
    Edited,
    Deleted,
}

/// Per-page actions inside a `gollum` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WikiPageAction {
    Created,
    Edited,
}

/// Actions on the `meta` event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaAction {
    Deleted,
}

/// Actions on the `repository` event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryAction {
    Created,
    Deleted,
    Archived,
    Unarchived,
    Edited,
    Renamed,
    Transferred,
    Publicized,
    Privatized,
}
