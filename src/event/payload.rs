//! Wire-format types for upstream webhook bodies.
//!
//! Models only the fields the merge rules inspect or a renderer would
//! show; serde ignores the rest of the upstream JSON. Optional fields
//! default so older or trimmed payloads still decode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::action::{
    CommentAction, IssueAction, LabelAction, MetaAction, MilestoneAction, PullRequestAction,
    ReleaseAction, RepositoryAction, StarAction, WikiPageAction,
};

/// A user account on the hosting service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    pub login: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,
}

/// Commit author identity as it appears in push payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitUser {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// The repository a delivery concerns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: i64,

    pub name: String,

    /// Canonical "owner/name" form; this is what subscriptions track.
    pub full_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,

    #[serde(default)]
    pub private: bool,
}

/// A label attached to (or removed from) an issue or pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub id: i64,

    pub name: String,

    pub color: String,
}

/// A milestone an issue or pull request can be assigned to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: i64,

    pub number: i64,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_on: Option<DateTime<Utc>>,
}

/// Open/closed state shared by issues and pull requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueState {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: i64,

    pub number: i64,

    pub title: String,

    pub state: IssueState,

    pub user: User,

    #[serde(default)]
    pub labels: Vec<Label>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone: Option<Milestone>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    pub id: i64,

    pub number: i64,

    pub title: String,

    pub state: IssueState,

    pub user: User,

    #[serde(default)]
    pub draft: bool,

    #[serde(default)]
    pub merged: bool,

    #[serde(default)]
    pub labels: Vec<Label>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone: Option<Milestone>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,
}

/// A comment on an issue or pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,

    pub body: String,

    pub user: User,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// One commit inside a push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,

    pub message: String,

    /// Whether this commit was new to the repository, as opposed to already
    /// reachable from another branch.
    #[serde(default)]
    pub distinct: bool,

    pub author: GitUser,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub id: i64,

    pub tag_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub draft: bool,

    #[serde(default)]
    pub prerelease: bool,

    pub author: User,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,
}

/// One wiki page touched by a `gollum` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WikiPage {
    pub page_name: String,

    pub title: String,

    pub action: WikiPageAction,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuesEvent {
    pub action: IssueAction,

    pub issue: Issue,

    /// The label a labeled/unlabeled action concerns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<Label>,

    /// The milestone a milestoned/demilestoned action concerns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone: Option<Milestone>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<User>,

    pub repository: Repository,

    pub sender: User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequestEvent {
    pub action: PullRequestAction,

    pub number: i64,

    pub pull_request: PullRequest,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<Label>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone: Option<Milestone>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<User>,

    pub repository: Repository,

    pub sender: User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueCommentEvent {
    pub action: CommentAction,

    /// The issue (or pull request) the comment is on.
    pub issue: Issue,

    pub comment: Comment,

    pub repository: Repository,

    pub sender: User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEvent {
    /// Full git ref that was pushed, e.g. "refs/heads/main".
    #[serde(rename = "ref")]
    pub ref_name: String,

    pub before: String,

    pub after: String,

    #[serde(default)]
    pub created: bool,

    #[serde(default)]
    pub deleted: bool,

    #[serde(default)]
    pub forced: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compare: Option<String>,

    #[serde(default)]
    pub commits: Vec<Commit>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_commit: Option<Commit>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pusher: Option<GitUser>,

    pub repository: Repository,

    pub sender: User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseEvent {
    pub action: ReleaseAction,

    pub release: Release,

    pub repository: Repository,

    pub sender: User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StarEvent {
    pub action: StarAction,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starred_at: Option<DateTime<Utc>>,

    pub repository: Repository,

    pub sender: User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForkEvent {
    /// The newly created fork.
    pub forkee: Repository,

    pub repository: Repository,

    pub sender: User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneEvent {
    pub action: MilestoneAction,

    pub milestone: Milestone,

    pub repository: Repository,

    pub sender: User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelEvent {
    pub action: LabelAction,

    pub label: Label,

    pub repository: Repository,

    pub sender: User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WikiEvent {
    pub pages: Vec<WikiPage>,

    pub repository: Repository,

    pub sender: User,
}

/// Sent by the upstream right after a hook is registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingEvent {
    pub zen: String,

    /// The upstream's id for the hook itself.
    pub hook_id: i64,
}

/// Lifecycle of the hook itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaEvent {
    pub action: MetaAction,

    pub hook_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryEvent {
    pub action: RepositoryAction,

    pub repository: Repository,

    pub sender: User,
}
