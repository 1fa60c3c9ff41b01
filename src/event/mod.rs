//! Closed model of upstream webhook events.
//!
//! [`EventKind`] mirrors the values of the event-kind header; [`Event`]
//! pairs each kind with its typed payload. Decoding is header-first: the
//! kind selects the payload schema, so unknown kinds are turned away
//! before serde ever runs, and a known kind with a non-conforming body is
//! a schema mismatch rather than a silent partial decode.
//!
//! # Example
//!
//! ```rust,ignore
//! let kind = EventKind::from_header("issues").unwrap();
//! let event = Event::decode(kind, body_json)?;
//! assert_eq!(event.kind(), EventKind::Issues);
//! ```

pub mod action;
pub mod payload;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use action::{
    CommentAction, IssueAction, LabelAction, MetaAction, MilestoneAction, PullRequestAction,
    ReleaseAction, RepositoryAction, StarAction, WikiPageAction,
};
pub use payload::{
    Comment, Commit, ForkEvent, GitUser, Issue, IssueCommentEvent, IssueState, IssuesEvent, Label,
    LabelEvent, MetaEvent, Milestone, MilestoneEvent, PingEvent, PullRequest, PullRequestEvent,
    PushEvent, Release, ReleaseEvent, Repository, RepositoryEvent, StarEvent, User, WikiEvent,
    WikiPage,
};

/// The set of event kinds this service understands.
///
/// Anything else in the event-kind header is acknowledged but never
/// processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Issues,
    IssueComment,
    PullRequest,
    Push,
    Release,
    Star,
    Fork,
    Milestone,
    Label,
    /// Wiki page changes arrive under the upstream's historical name.
    #[serde(rename = "gollum")]
    Wiki,
    Ping,
    Meta,
    Repository,
}

impl EventKind {
    /// Parse an event-kind header value.
    pub fn from_header(value: &str) -> Option<Self> {
        match value {
            "issues" => Some(Self::Issues),
            "issue_comment" => Some(Self::IssueComment),
            "pull_request" => Some(Self::PullRequest),
            "push" => Some(Self::Push),
            "release" => Some(Self::Release),
            "star" => Some(Self::Star),
            "fork" => Some(Self::Fork),
            "milestone" => Some(Self::Milestone),
            "label" => Some(Self::Label),
            "gollum" => Some(Self::Wiki),
            "ping" => Some(Self::Ping),
            "meta" => Some(Self::Meta),
            "repository" => Some(Self::Repository),
            _ => None,
        }
    }

    /// Wire name, as it appears in the event-kind header.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Issues => "issues",
            Self::IssueComment => "issue_comment",
            Self::PullRequest => "pull_request",
            Self::Push => "push",
            Self::Release => "release",
            Self::Star => "star",
            Self::Fork => "fork",
            Self::Milestone => "milestone",
            Self::Label => "label",
            Self::Wiki => "gollum",
            Self::Ping => "ping",
            Self::Meta => "meta",
            Self::Repository => "repository",
        }
    }

    /// All kinds, in header-name order.
    pub fn all() -> &'static [EventKind] {
        &[
            Self::Issues,
            Self::IssueComment,
            Self::PullRequest,
            Self::Push,
            Self::Release,
            Self::Star,
            Self::Fork,
            Self::Milestone,
            Self::Label,
            Self::Wiki,
            Self::Ping,
            Self::Meta,
            Self::Repository,
        ]
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded webhook event, one variant per kind.
///
/// Serializes untagged; the kind travels alongside in the notice.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Event {
    Issues(IssuesEvent),
    IssueComment(IssueCommentEvent),
    PullRequest(PullRequestEvent),
    Push(PushEvent),
    Release(ReleaseEvent),
    Star(StarEvent),
    Fork(ForkEvent),
    Milestone(MilestoneEvent),
    Label(LabelEvent),
    Wiki(WikiEvent),
    Ping(PingEvent),
    Meta(MetaEvent),
    Repository(RepositoryEvent),
}

impl Event {
    /// Decode a payload of the given kind from already-parsed JSON.
    pub fn decode(kind: EventKind, value: serde_json::Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            EventKind::Issues => Event::Issues(serde_json::from_value(value)?),
            EventKind::IssueComment => Event::IssueComment(serde_json::from_value(value)?),
            EventKind::PullRequest => Event::PullRequest(serde_json::from_value(value)?),
            EventKind::Push => Event::Push(serde_json::from_value(value)?),
            EventKind::Release => Event::Release(serde_json::from_value(value)?),
            EventKind::Star => Event::Star(serde_json::from_value(value)?),
            EventKind::Fork => Event::Fork(serde_json::from_value(value)?),
            EventKind::Milestone => Event::Milestone(serde_json::from_value(value)?),
            EventKind::Label => Event::Label(serde_json::from_value(value)?),
            EventKind::Wiki => Event::Wiki(serde_json::from_value(value)?),
            EventKind::Ping => Event::Ping(serde_json::from_value(value)?),
            EventKind::Meta => Event::Meta(serde_json::from_value(value)?),
            EventKind::Repository => Event::Repository(serde_json::from_value(value)?),
        })
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Event::Issues(_) => EventKind::Issues,
            Event::IssueComment(_) => EventKind::IssueComment,
            Event::PullRequest(_) => EventKind::PullRequest,
            Event::Push(_) => EventKind::Push,
            Event::Release(_) => EventKind::Release,
            Event::Star(_) => EventKind::Star,
            Event::Fork(_) => EventKind::Fork,
            Event::Milestone(_) => EventKind::Milestone,
            Event::Label(_) => EventKind::Label,
            Event::Wiki(_) => EventKind::Wiki,
            Event::Ping(_) => EventKind::Ping,
            Event::Meta(_) => EventKind::Meta,
            Event::Repository(_) => EventKind::Repository,
        }
    }

    /// Id of the issue or pull request this event is about, when it has
    /// one. This is what the merge rules use as the subject marker.
    pub fn subject_id(&self) -> Option<i64> {
        match self {
            Event::Issues(e) => Some(e.issue.id),
            Event::IssueComment(e) => Some(e.issue.id),
            Event::PullRequest(e) => Some(e.pull_request.id),
            _ => None,
        }
    }

    /// Account id of the actor that triggered the event.
    pub fn sender_id(&self) -> Option<i64> {
        match self {
            Event::Issues(e) => Some(e.sender.id),
            Event::IssueComment(e) => Some(e.sender.id),
            Event::PullRequest(e) => Some(e.sender.id),
            Event::Push(e) => Some(e.sender.id),
            Event::Release(e) => Some(e.sender.id),
            Event::Star(e) => Some(e.sender.id),
            Event::Fork(e) => Some(e.sender.id),
            Event::Milestone(e) => Some(e.sender.id),
            Event::Label(e) => Some(e.sender.id),
            Event::Wiki(e) => Some(e.sender.id),
            Event::Repository(e) => Some(e.sender.id),
            Event::Ping(_) | Event::Meta(_) => None,
        }
    }

    /// The label a labeled/unlabeled event concerns.
    pub fn label(&self) -> Option<&Label> {
        match self {
            Event::Issues(e) => e.label.as_ref(),
            Event::PullRequest(e) => e.label.as_ref(),
            _ => None,
        }
    }

    /// The milestone a milestoned/demilestoned event concerns.
    pub fn milestone(&self) -> Option<&Milestone> {
        match self {
            Event::Issues(e) => e.milestone.as_ref(),
            Event::PullRequest(e) => e.milestone.as_ref(),
            Event::Milestone(e) => Some(&e.milestone),
            _ => None,
        }
    }
}
