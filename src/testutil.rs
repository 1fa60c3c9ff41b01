//! Shared fixtures for the test suites.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::event::{Event, EventKind};
use crate::notify::{Notice, Notifier, NotifyError};
use crate::subscription::Subscription;

/// Notifier that records every notice along with the (test clock) instant
/// it arrived at.
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Notice, Instant)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub async fn sent(&self) -> Vec<(Notice, Instant)> {
        self.sent.lock().await.clone()
    }

    pub async fn notices(&self) -> Vec<Notice> {
        self.sent
            .lock()
            .await
            .iter()
            .map(|(notice, _)| notice.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn notify(&self, notice: &Notice) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .await
            .push((notice.clone(), Instant::now()));
        Ok(())
    }
}

pub fn subscription() -> Subscription {
    Subscription {
        id: Uuid::new_v4(),
        repo: "octo/widgets".to_string(),
        user_id: "@dev:example.org".to_string(),
        channel_id: "!room:example.org".to_string(),
        remote_id: None,
    }
}

pub fn decode(kind: EventKind, value: Value) -> Event {
    Event::decode(kind, value).unwrap()
}

pub fn user_json(id: i64) -> Value {
    json!({"id": id, "login": format!("user{id}")})
}

pub fn repo_json() -> Value {
    json!({"id": 99, "name": "widgets", "full_name": "octo/widgets"})
}

pub fn label_json(id: i64, name: &str) -> Value {
    json!({"id": id, "name": name, "color": "d73a4a"})
}

pub fn milestone_json(id: i64, title: &str) -> Value {
    json!({"id": id, "number": id, "title": title})
}

pub fn issue_json(id: i64, labels: &[Value]) -> Value {
    json!({
        "id": id,
        "number": id,
        "title": "Widget jams",
        "state": "open",
        "user": user_json(7),
        "labels": labels
    })
}

/// An `issues` event with no label or milestone attachment.
pub fn issue_event(action: &str, issue_id: i64, sender: i64) -> Event {
    decode(
        EventKind::Issues,
        json!({
            "action": action,
            "issue": issue_json(issue_id, &[]),
            "repository": repo_json(),
            "sender": user_json(sender)
        }),
    )
}

/// An `issues` labeled/unlabeled event carrying the label concerned.
pub fn label_change_event(
    action: &str,
    issue_id: i64,
    sender: i64,
    label_id: i64,
    label_name: &str,
) -> Event {
    decode(
        EventKind::Issues,
        json!({
            "action": action,
            "issue": issue_json(issue_id, &[]),
            "label": label_json(label_id, label_name),
            "repository": repo_json(),
            "sender": user_json(sender)
        }),
    )
}

/// An `issues` opened event with the given initial labels.
pub fn opened_event(issue_id: i64, sender: i64, labels: &[(i64, &str)]) -> Event {
    let labels: Vec<Value> = labels
        .iter()
        .map(|(id, name)| label_json(*id, name))
        .collect();
    decode(
        EventKind::Issues,
        json!({
            "action": "opened",
            "issue": issue_json(issue_id, &labels),
            "repository": repo_json(),
            "sender": user_json(sender)
        }),
    )
}

/// An `issues` milestoned/demilestoned event carrying the milestone.
pub fn milestone_change_event(
    action: &str,
    issue_id: i64,
    sender: i64,
    milestone_id: i64,
    title: &str,
) -> Event {
    decode(
        EventKind::Issues,
        json!({
            "action": action,
            "issue": issue_json(issue_id, &[]),
            "milestone": milestone_json(milestone_id, title),
            "repository": repo_json(),
            "sender": user_json(sender)
        }),
    )
}

/// An `issue_comment` created event.
pub fn comment_event(issue_id: i64, sender: i64) -> Event {
    decode(
        EventKind::IssueComment,
        json!({
            "action": "created",
            "issue": issue_json(issue_id, &[]),
            "comment": {
                "id": issue_id * 1000,
                "body": "Looks good to me",
                "user": user_json(sender)
            },
            "repository": repo_json(),
            "sender": user_json(sender)
        }),
    )
}

/// A `star` created event; no coalescing policy applies to it.
pub fn star_event(sender: i64) -> Event {
    decode(
        EventKind::Star,
        json!({
            "action": "created",
            "repository": repo_json(),
            "sender": user_json(sender)
        }),
    )
}

/// A `push` event with one commit per `(id, distinct)` entry.
pub fn push_event(commits: &[(&str, bool)]) -> Event {
    let commits: Vec<Value> = commits
        .iter()
        .map(|(id, distinct)| {
            json!({
                "id": id,
                "message": format!("commit {id}"),
                "distinct": distinct,
                "author": {"name": "Octo Cat", "email": "octo@example.org"}
            })
        })
        .collect();
    decode(
        EventKind::Push,
        json!({
            "ref": "refs/heads/main",
            "before": "aaa",
            "after": "bbb",
            "commits": commits,
            "repository": repo_json(),
            "sender": user_json(7)
        }),
    )
}

pub fn ping_event(hook_id: i64) -> Event {
    decode(
        EventKind::Ping,
        json!({"zen": "Keep it logically awesome.", "hook_id": hook_id}),
    )
}

pub fn meta_deleted_event(hook_id: i64) -> Event {
    decode(
        EventKind::Meta,
        json!({"action": "deleted", "hook_id": hook_id}),
    )
}

pub fn repository_event(action: &str, full_name: &str) -> Event {
    decode(
        EventKind::Repository,
        json!({
            "action": action,
            "repository": {"id": 99, "name": "widgets", "full_name": full_name},
            "sender": user_json(7)
        }),
    )
}
