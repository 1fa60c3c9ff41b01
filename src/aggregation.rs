//! Burst coalescing for webhook events.
//!
//! The upstream reports fine-grained changes as separate deliveries, so a
//! routine triage pass (relabel, set a milestone, close with a comment)
//! becomes a burst of events within a second or two. This module folds
//! such bursts into a single notice per logical change instead of one
//! message per delivery.
//!
//! Each subscription owns a FIFO queue of [`PendingAggregation`] windows.
//! An incoming event is offered to them oldest first; the first one whose
//! merge rules accept it wins and (usually) pushes its deadline out.
//! Otherwise the event either opens a new window, when its kind/action is
//! a recognized starting point, or flushes solo right away.
//!
//! ```text
//! event --> offer to pending, oldest first --> merged: deadline resets
//!    |
//!    +-- none accepted --> starting point? --> open window, arm deadline
//!                |
//!                +-- no --> flush solo immediately
//! ```
//!
//! A window flushes exactly once, when its deadline expires with no merge
//! having moved it. After the flush nothing can merge into it; a late
//! event opens a fresh window.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::event::{CommentAction, Event, IssueAction, Label, Milestone, PullRequestAction};
use crate::notify::{Aggregation, Notice, Notifier, PushMetrics};
use crate::subscription::Subscription;

/// Default coalescing window.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(1000);

/// How a window initializes its accumulator when it opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartPolicy {
    /// Label add/remove churn collapses into one labels-changed notice.
    LabelAggregation,
    /// A fresh open records its initial labels so the labeled echoes that
    /// immediately follow are swallowed.
    OpenLabelDropping,
    /// A milestone set/unset pair collapses into one milestone-changed
    /// notice.
    MilestoneAggregation,
    /// Recognized starting point with no accumulation of its own; it waits
    /// for a coupling merge.
    Tracked,
}

/// Starting-point table: which events open a window, and how.
///
/// Everything absent here flushes solo; in particular a lone comment
/// never delays other comments, and pushes are always immediate.
fn starter_policy(event: &Event) -> Option<StartPolicy> {
    match event {
        Event::Issues(e) => match e.action {
            IssueAction::Opened => Some(StartPolicy::OpenLabelDropping),
            IssueAction::Labeled | IssueAction::Unlabeled => Some(StartPolicy::LabelAggregation),
            IssueAction::Milestoned | IssueAction::Demilestoned => {
                Some(StartPolicy::MilestoneAggregation)
            }
            IssueAction::Closed | IssueAction::Reopened => Some(StartPolicy::Tracked),
            _ => None,
        },
        // Milestone pairs coalesce for issues only.
        Event::PullRequest(e) => match e.action {
            PullRequestAction::Opened => Some(StartPolicy::OpenLabelDropping),
            PullRequestAction::Labeled | PullRequestAction::Unlabeled => {
                Some(StartPolicy::LabelAggregation)
            }
            _ => None,
        },
        Event::IssueComment(e) => match e.action {
            CommentAction::Created => Some(StartPolicy::Tracked),
            _ => None,
        },
        _ => None,
    }
}

/// The label/milestone shapes issue and pull request actions share, as the
/// merge rules see them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubjectAction {
    Opened,
    Labeled,
    Unlabeled,
    LabelsChanged,
    Milestoned,
    Demilestoned,
    Other,
}

fn subject_action(event: &Event) -> Option<SubjectAction> {
    match event {
        Event::Issues(e) => Some(match e.action {
            IssueAction::Opened => SubjectAction::Opened,
            IssueAction::Labeled => SubjectAction::Labeled,
            IssueAction::Unlabeled => SubjectAction::Unlabeled,
            IssueAction::LabelsChanged => SubjectAction::LabelsChanged,
            IssueAction::Milestoned => SubjectAction::Milestoned,
            IssueAction::Demilestoned => SubjectAction::Demilestoned,
            _ => SubjectAction::Other,
        }),
        Event::PullRequest(e) => Some(match e.action {
            PullRequestAction::Opened => SubjectAction::Opened,
            PullRequestAction::Labeled => SubjectAction::Labeled,
            PullRequestAction::Unlabeled => SubjectAction::Unlabeled,
            PullRequestAction::LabelsChanged => SubjectAction::LabelsChanged,
            PullRequestAction::Milestoned => SubjectAction::Milestoned,
            PullRequestAction::Demilestoned => SubjectAction::Demilestoned,
            _ => SubjectAction::Other,
        }),
        _ => None,
    }
}

/// What to do with an offered event, decided before any state changes.
#[derive(Debug)]
enum MergeDecision {
    Reject,
    /// Fold a same-actor close/reopen into a pending comment as a flag.
    SetFlag { closed: bool },
    /// A comment takes over as representative of a pending close/reopen;
    /// the flag comes from the action it replaces.
    ReplaceWithComment { closed: bool },
    /// A labeled/unlabeled append to the running lists.
    AppendLabel { label: Label, removed: bool },
    /// A labeled echo of a label the open already showed.
    SwallowLabel,
    /// The complementary milestone event completes the from/to pair.
    FillMilestone {
        milestone: Option<Milestone>,
        from: bool,
    },
}

/// One open coalescing window for a subscription.
#[derive(Debug)]
struct PendingAggregation {
    /// Engine-unique id; the flusher task finds its window by it.
    instance: u64,

    subscription: Subscription,

    /// Representative event the notice will carry.
    event: Event,

    aggregation: Aggregation,

    /// Label ids present when an open started this window.
    initial_label_ids: Option<HashSet<i64>>,

    delivery_ids: Vec<String>,

    /// When this window flushes, unless a merge moves it first.
    deadline: Instant,
}

impl PendingAggregation {
    fn new(
        instance: u64,
        subscription: Subscription,
        event: Event,
        delivery_id: &str,
        deadline: Instant,
    ) -> Self {
        Self {
            instance,
            subscription,
            event,
            aggregation: Aggregation::default(),
            initial_label_ids: None,
            delivery_ids: vec![delivery_id.to_string()],
            deadline,
        }
    }

    /// Initialize the accumulator for the policy that opened this window.
    fn start(&mut self, policy: StartPolicy) {
        match policy {
            StartPolicy::LabelAggregation => {
                let removed = subject_action(&self.event) == Some(SubjectAction::Unlabeled);
                if let Some(label) = self.event.label().cloned() {
                    if removed {
                        self.aggregation.removed_labels.push(label);
                    } else {
                        self.aggregation.added_labels.push(label);
                    }
                }
                self.set_labels_changed();
            }
            StartPolicy::OpenLabelDropping => {
                let ids = match &self.event {
                    Event::Issues(e) => e.issue.labels.iter().map(|label| label.id).collect(),
                    Event::PullRequest(e) => {
                        e.pull_request.labels.iter().map(|label| label.id).collect()
                    }
                    _ => HashSet::new(),
                };
                self.initial_label_ids = Some(ids);
            }
            StartPolicy::MilestoneAggregation => {
                let milestone = self.event.milestone().cloned();
                if subject_action(&self.event) == Some(SubjectAction::Milestoned) {
                    self.aggregation.milestone_to = milestone;
                } else {
                    self.aggregation.milestone_from = milestone;
                }
            }
            StartPolicy::Tracked => {}
        }
    }

    /// Offer an event to this window. `Ok` folds it in and may push the
    /// deadline out; `Err` hands the event back untouched.
    fn try_merge(&mut self, event: Event, delivery_id: &str, window: Duration) -> Result<(), Event> {
        let mut resets_deadline = true;

        match self.decide(&event) {
            MergeDecision::Reject => return Err(event),
            MergeDecision::SetFlag { closed } => {
                if closed {
                    self.aggregation.closed = true;
                } else {
                    self.aggregation.reopened = true;
                }
            }
            MergeDecision::ReplaceWithComment { closed } => {
                if closed {
                    self.aggregation.closed = true;
                } else {
                    self.aggregation.reopened = true;
                }
                self.event = event;
            }
            MergeDecision::AppendLabel { label, removed } => {
                if removed {
                    self.aggregation.removed_labels.push(label);
                } else {
                    self.aggregation.added_labels.push(label);
                }
            }
            MergeDecision::SwallowLabel => {}
            MergeDecision::FillMilestone { milestone, from } => {
                if from {
                    self.aggregation.milestone_from = milestone;
                } else {
                    self.aggregation.milestone_to = milestone;
                }
                self.set_milestone_changed();
                // The pair is complete; holding the notice longer would
                // only delay it.
                resets_deadline = false;
            }
        }

        if !self.delivery_ids.iter().any(|known| known == delivery_id) {
            self.delivery_ids.push(delivery_id.to_string());
        }
        if resets_deadline {
            self.deadline = Instant::now() + window;
        }
        Ok(())
    }

    fn decide(&self, incoming: &Event) -> MergeDecision {
        // Cross-kind coupling: a close/reopen and a comment by the same
        // actor on the same issue collapse into one notice.
        if let (Event::IssueComment(pending), Event::Issues(evt)) = (&self.event, incoming) {
            if matches!(evt.action, IssueAction::Closed | IssueAction::Reopened)
                && pending.action == CommentAction::Created
                && evt.issue.id == pending.issue.id
                && evt.sender.id == pending.sender.id
            {
                return MergeDecision::SetFlag {
                    closed: evt.action == IssueAction::Closed,
                };
            }
            return MergeDecision::Reject;
        }
        if let (Event::Issues(pending), Event::IssueComment(evt)) = (&self.event, incoming) {
            if matches!(pending.action, IssueAction::Closed | IssueAction::Reopened)
                && evt.action == CommentAction::Created
                && evt.issue.id == pending.issue.id
                && evt.sender.id == pending.sender.id
            {
                return MergeDecision::ReplaceWithComment {
                    closed: pending.action == IssueAction::Closed,
                };
            }
            return MergeDecision::Reject;
        }

        // Everything else merges only within one kind and one subject.
        if self.event.kind() != incoming.kind() {
            return MergeDecision::Reject;
        }
        if self.event.subject_id() != incoming.subject_id() {
            return MergeDecision::Reject;
        }
        let (pending_action, incoming_action) =
            match (subject_action(&self.event), subject_action(incoming)) {
                (Some(pending), Some(incoming)) => (pending, incoming),
                _ => return MergeDecision::Reject,
            };

        match pending_action {
            // The open already showed its labels; the labeled echoes the
            // upstream sends right after are noise.
            SubjectAction::Opened => {
                if incoming_action == SubjectAction::Labeled {
                    if let (Some(initial), Some(label)) = (&self.initial_label_ids, incoming.label())
                    {
                        if initial.contains(&label.id) {
                            return MergeDecision::SwallowLabel;
                        }
                    }
                }
                MergeDecision::Reject
            }
            SubjectAction::LabelsChanged => match (incoming_action, incoming.label()) {
                (SubjectAction::Labeled, Some(label)) => MergeDecision::AppendLabel {
                    label: label.clone(),
                    removed: false,
                },
                (SubjectAction::Unlabeled, Some(label)) => MergeDecision::AppendLabel {
                    label: label.clone(),
                    removed: true,
                },
                _ => MergeDecision::Reject,
            },
            // Only the complementary action completes a milestone pair;
            // a repeat of the same action is a distinct change.
            SubjectAction::Milestoned => {
                if incoming_action == SubjectAction::Demilestoned {
                    MergeDecision::FillMilestone {
                        milestone: incoming.milestone().cloned(),
                        from: true,
                    }
                } else {
                    MergeDecision::Reject
                }
            }
            SubjectAction::Demilestoned => {
                if incoming_action == SubjectAction::Milestoned {
                    MergeDecision::FillMilestone {
                        milestone: incoming.milestone().cloned(),
                        from: false,
                    }
                } else {
                    MergeDecision::Reject
                }
            }
            _ => MergeDecision::Reject,
        }
    }

    fn set_labels_changed(&mut self) {
        match &mut self.event {
            Event::Issues(e) => e.action = IssueAction::LabelsChanged,
            Event::PullRequest(e) => e.action = PullRequestAction::LabelsChanged,
            _ => {}
        }
    }

    fn set_milestone_changed(&mut self) {
        match &mut self.event {
            Event::Issues(e) => e.action = IssueAction::MilestoneChanged,
            Event::PullRequest(e) => e.action = PullRequestAction::MilestoneChanged,
            _ => {}
        }
    }

    fn into_notice(self) -> Notice {
        Notice {
            kind: self.event.kind(),
            event: self.event,
            aggregation: self.aggregation,
            push_metrics: None,
            channel_id: self.subscription.channel_id,
            delivery_ids: self.delivery_ids,
        }
    }
}

/// Coalesces bursts of related webhook events per subscription.
///
/// Cheap to clone; clones share the pending state.
#[derive(Clone)]
pub struct AggregationEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    window: Duration,

    notifier: Arc<dyn Notifier>,

    /// Per-subscription open windows. Offering and opening both happen
    /// under the per-subscription lock, so deliveries for one
    /// subscription serialize while subscriptions stay independent.
    /// Entries are created on first use and retained; the queues are tiny.
    pending: RwLock<HashMap<Uuid, Arc<Mutex<VecDeque<PendingAggregation>>>>>,

    next_instance: AtomicU64,
}

impl AggregationEngine {
    pub fn new(window: Duration, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                window,
                notifier,
                pending: RwLock::new(HashMap::new()),
                next_instance: AtomicU64::new(1),
            }),
        }
    }

    pub fn window(&self) -> Duration {
        self.inner.window
    }

    /// Number of windows currently waiting on their deadline.
    pub async fn pending_count(&self) -> usize {
        let pending = self.inner.pending.read().await;
        let mut count = 0;
        for queue in pending.values() {
            count += queue.lock().await.len();
        }
        count
    }

    /// Feed one decoded event through the coalescing pipeline.
    pub async fn submit(
        &self,
        subscription: &Subscription,
        event: Event,
        push_metrics: Option<PushMetrics>,
        delivery_id: &str,
    ) {
        let queue = self.queue_for(subscription.id).await;
        let mut entries = queue.lock().await;

        let mut event = event;
        for entry in entries.iter_mut() {
            match entry.try_merge(event, delivery_id, self.inner.window) {
                Ok(()) => {
                    debug!(
                        subscription = %subscription.id,
                        instance = entry.instance,
                        delivery_id = %delivery_id,
                        "Merged delivery into pending aggregation"
                    );
                    return;
                }
                Err(rejected) => event = rejected,
            }
        }

        match starter_policy(&event) {
            None => {
                drop(entries);
                debug!(
                    subscription = %subscription.id,
                    kind = %event.kind(),
                    delivery_id = %delivery_id,
                    "No coalescing policy; flushing solo"
                );
                let notice = Notice {
                    kind: event.kind(),
                    event,
                    aggregation: Aggregation::default(),
                    push_metrics,
                    channel_id: subscription.channel_id.clone(),
                    delivery_ids: vec![delivery_id.to_string()],
                };
                let notifier = self.inner.notifier.clone();
                tokio::spawn(async move {
                    deliver(notifier.as_ref(), &notice).await;
                });
            }
            Some(policy) => {
                let instance = self.inner.next_instance.fetch_add(1, Ordering::Relaxed);
                let deadline = Instant::now() + self.inner.window;
                let mut entry = PendingAggregation::new(
                    instance,
                    subscription.clone(),
                    event,
                    delivery_id,
                    deadline,
                );
                entry.start(policy);
                debug!(
                    subscription = %subscription.id,
                    instance,
                    policy = ?policy,
                    delivery_id = %delivery_id,
                    "Opened aggregation window"
                );
                entries.push_back(entry);
                drop(entries);
                self.spawn_flusher(subscription.id, instance, deadline);
            }
        }
    }

    async fn queue_for(&self, id: Uuid) -> Arc<Mutex<VecDeque<PendingAggregation>>> {
        if let Some(queue) = self.inner.pending.read().await.get(&id) {
            return queue.clone();
        }
        let mut pending = self.inner.pending.write().await;
        pending.entry(id).or_default().clone()
    }

    /// Waits out the window's deadline, re-arming whenever a merge has
    /// moved it, and flushes once the deadline truly passes. Removal
    /// happens under the queue lock, so a window flushes at most once and
    /// nothing merges into it afterwards.
    fn spawn_flusher(&self, subscription_id: Uuid, instance: u64, deadline: Instant) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let mut wake_at = deadline;
            loop {
                tokio::time::sleep_until(wake_at).await;

                let queue = {
                    let pending = inner.pending.read().await;
                    match pending.get(&subscription_id) {
                        Some(queue) => queue.clone(),
                        None => return,
                    }
                };
                let mut entries = queue.lock().await;
                let position = match entries.iter().position(|entry| entry.instance == instance) {
                    Some(position) => position,
                    None => return,
                };

                let current_deadline = entries[position].deadline;
                if current_deadline > Instant::now() {
                    wake_at = current_deadline;
                    continue;
                }

                let flushed = match entries.remove(position) {
                    Some(entry) => entry,
                    None => return,
                };
                drop(entries);

                info!(
                    subscription = %flushed.subscription.id,
                    repo = %flushed.subscription.repo,
                    kind = %flushed.event.kind(),
                    deliveries = flushed.delivery_ids.len(),
                    "Flushing aggregation"
                );
                deliver(inner.notifier.as_ref(), &flushed.into_notice()).await;
                return;
            }
        });
    }
}

/// Hand a notice to the delivery collaborator. Failures end here: the
/// notice is already out of the pipeline, and the HTTP notifier has its
/// own retries.
pub(crate) async fn deliver(notifier: &dyn Notifier, notice: &Notice) {
    if let Err(err) = notifier.notify(notice).await {
        warn!(
            notifier = notifier.name(),
            kind = %notice.kind,
            channel = %notice.channel_id,
            error = %err,
            "Notice delivery failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::testutil::{
        comment_event, decode, issue_event, label_change_event, milestone_change_event,
        opened_event, push_event, star_event, subscription, RecordingNotifier,
    };
    use serde_json::json;
    use tokio::time::sleep;

    const WINDOW: Duration = Duration::from_millis(1000);

    fn engine(notifier: Arc<RecordingNotifier>) -> AggregationEngine {
        AggregationEngine::new(WINDOW, notifier)
    }

    fn issues_action(notice: &Notice) -> IssueAction {
        match &notice.event {
            Event::Issues(e) => e.action,
            other => panic!("expected issues event, got {other:?}"),
        }
    }

    #[test]
    fn test_starter_policy_matrix() {
        assert_eq!(
            starter_policy(&opened_event(1, 7, &[])),
            Some(StartPolicy::OpenLabelDropping)
        );
        assert_eq!(
            starter_policy(&label_change_event("labeled", 1, 7, 31, "bug")),
            Some(StartPolicy::LabelAggregation)
        );
        assert_eq!(
            starter_policy(&label_change_event("unlabeled", 1, 7, 31, "bug")),
            Some(StartPolicy::LabelAggregation)
        );
        assert_eq!(
            starter_policy(&milestone_change_event("milestoned", 1, 7, 5, "v1")),
            Some(StartPolicy::MilestoneAggregation)
        );
        assert_eq!(
            starter_policy(&issue_event("closed", 1, 7)),
            Some(StartPolicy::Tracked)
        );
        assert_eq!(
            starter_policy(&issue_event("reopened", 1, 7)),
            Some(StartPolicy::Tracked)
        );
        assert_eq!(
            starter_policy(&comment_event(1, 7)),
            Some(StartPolicy::Tracked)
        );

        assert_eq!(starter_policy(&issue_event("assigned", 1, 7)), None);
        assert_eq!(starter_policy(&star_event(7)), None);
        assert_eq!(starter_policy(&push_event(&[("a", true)])), None);

        // Unlike labels, milestone changes on pull requests flush solo.
        let pr_milestoned = decode(
            EventKind::PullRequest,
            json!({
                "action": "milestoned",
                "number": 4,
                "pull_request": {
                    "id": 21,
                    "number": 4,
                    "title": "Add widget",
                    "state": "open",
                    "user": {"id": 7, "login": "octocat"}
                },
                "milestone": {"id": 5, "number": 2, "title": "v1.0"},
                "repository": {"id": 99, "name": "widgets", "full_name": "octo/widgets"},
                "sender": {"id": 7, "login": "octocat"}
            }),
        );
        assert_eq!(starter_policy(&pr_milestoned), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlisted_action_flushes_immediately() {
        let notifier = RecordingNotifier::shared();
        let engine = engine(notifier.clone());
        let sub = subscription();

        engine.submit(&sub, star_event(7), None, "d-1").await;
        sleep(Duration::from_millis(1)).await;

        let sent = notifier.notices().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, EventKind::Star);
        assert_eq!(sent[0].delivery_ids, vec!["d-1"]);
        assert_eq!(sent[0].aggregation, Aggregation::default());
        assert_eq!(engine.pending_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_flush_after_quiet_window() {
        let notifier = RecordingNotifier::shared();
        let engine = engine(notifier.clone());
        let sub = subscription();
        let opened_at = Instant::now();

        engine
            .submit(&sub, label_change_event("labeled", 5, 7, 31, "bug"), None, "d-1")
            .await;
        assert_eq!(engine.pending_count().await, 1);

        sleep(Duration::from_millis(900)).await;
        assert!(notifier.notices().await.is_empty());

        sleep(Duration::from_millis(200)).await;
        let sent = notifier.sent().await;
        assert_eq!(sent.len(), 1);

        let (notice, flushed_at) = &sent[0];
        assert!(flushed_at.duration_since(opened_at) >= WINDOW);
        assert!(flushed_at.duration_since(opened_at) < WINDOW + Duration::from_millis(150));
        assert_eq!(issues_action(notice), IssueAction::LabelsChanged);
        assert_eq!(notice.aggregation.added_labels[0].name, "bug");
        assert!(notice.aggregation.removed_labels.is_empty());
        assert_eq!(engine.pending_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_merge_resets_deadline_and_tracks_both_lists() {
        let notifier = RecordingNotifier::shared();
        let engine = engine(notifier.clone());
        let sub = subscription();
        let opened_at = Instant::now();

        engine
            .submit(&sub, label_change_event("labeled", 5, 7, 31, "bug"), None, "d-1")
            .await;
        sleep(Duration::from_millis(300)).await;
        engine
            .submit(&sub, label_change_event("unlabeled", 5, 7, 31, "bug"), None, "d-2")
            .await;
        sleep(Duration::from_millis(300)).await;
        engine
            .submit(&sub, label_change_event("labeled", 5, 7, 32, "feature"), None, "d-3")
            .await;

        // The original deadline has passed, but every merge moved it.
        sleep(Duration::from_millis(600)).await;
        assert!(notifier.notices().await.is_empty());

        sleep(Duration::from_millis(500)).await;
        let sent = notifier.sent().await;
        assert_eq!(sent.len(), 1);

        let (notice, flushed_at) = &sent[0];
        // Last merge landed at 600ms, so the flush lands at 1600ms.
        assert!(flushed_at.duration_since(opened_at) >= Duration::from_millis(1600));
        assert_eq!(notice.delivery_ids, vec!["d-1", "d-2", "d-3"]);

        let added: Vec<&str> = notice
            .aggregation
            .added_labels
            .iter()
            .map(|label| label.name.as_str())
            .collect();
        let removed: Vec<&str> = notice
            .aggregation
            .removed_labels
            .iter()
            .map(|label| label.name.as_str())
            .collect();
        assert_eq!(added, vec!["bug", "feature"]);
        // The removal stays visible even though the same label was added
        // earlier in the burst.
        assert_eq!(removed, vec!["bug"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_label_bursts_stay_per_subject() {
        let notifier = RecordingNotifier::shared();
        let engine = engine(notifier.clone());
        let sub = subscription();

        engine
            .submit(&sub, label_change_event("labeled", 5, 7, 31, "bug"), None, "d-1")
            .await;
        engine
            .submit(&sub, label_change_event("labeled", 6, 7, 32, "feature"), None, "d-2")
            .await;
        assert_eq!(engine.pending_count().await, 2);

        sleep(Duration::from_millis(1100)).await;
        let sent = notifier.notices().await;
        assert_eq!(sent.len(), 2);
        for notice in &sent {
            assert_eq!(notice.delivery_ids.len(), 1);
            assert_eq!(notice.aggregation.added_labels.len(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_oldest_pending_window_wins() {
        let notifier = RecordingNotifier::shared();
        let engine = engine(notifier.clone());
        let sub = subscription();

        // Two comment windows on the same issue by the same actor, then a
        // close that either could absorb.
        engine.submit(&sub, comment_event(9, 42), None, "d-1").await;
        sleep(Duration::from_millis(100)).await;
        engine.submit(&sub, comment_event(9, 42), None, "d-2").await;
        sleep(Duration::from_millis(100)).await;
        engine.submit(&sub, issue_event("closed", 9, 42), None, "d-3").await;

        sleep(Duration::from_secs(2)).await;
        let sent = notifier.notices().await;
        assert_eq!(sent.len(), 2);

        let first = sent
            .iter()
            .find(|notice| notice.delivery_ids.contains(&"d-1".to_string()))
            .unwrap();
        let second = sent
            .iter()
            .find(|notice| notice.delivery_ids.contains(&"d-2".to_string()))
            .unwrap();
        assert_eq!(first.delivery_ids, vec!["d-1", "d-3"]);
        assert!(first.aggregation.closed);
        assert_eq!(second.delivery_ids, vec!["d-2"]);
        assert!(!second.aggregation.closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscriptions_are_isolated() {
        let notifier = RecordingNotifier::shared();
        let engine = engine(notifier.clone());
        let first = subscription();
        let mut second = subscription();
        second.channel_id = "!other:example.org".to_string();

        let opened_at = Instant::now();
        engine
            .submit(&first, label_change_event("labeled", 5, 7, 31, "bug"), None, "d-1")
            .await;
        sleep(Duration::from_millis(500)).await;
        // Same shape on another subscription: lands in its own queue and
        // must not touch the first window's deadline.
        engine
            .submit(&second, label_change_event("labeled", 5, 7, 31, "bug"), None, "d-2")
            .await;

        sleep(Duration::from_millis(600)).await;
        let sent = notifier.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.channel_id, first.channel_id);
        assert!(sent[0].1.duration_since(opened_at) >= WINDOW);

        sleep(Duration::from_millis(500)).await;
        let sent = notifier.sent().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].0.channel_id, second.channel_id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_swallows_initial_label_echo() {
        let notifier = RecordingNotifier::shared();
        let engine = engine(notifier.clone());
        let sub = subscription();

        engine
            .submit(&sub, opened_event(7, 7, &[(31, "bug")]), None, "d-1")
            .await;
        sleep(Duration::from_millis(100)).await;
        engine
            .submit(&sub, label_change_event("labeled", 7, 7, 31, "bug"), None, "d-2")
            .await;
        assert_eq!(engine.pending_count().await, 1);

        sleep(Duration::from_secs(2)).await;
        let sent = notifier.notices().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(issues_action(&sent[0]), IssueAction::Opened);
        assert_eq!(sent[0].aggregation, Aggregation::default());
        assert_eq!(sent[0].delivery_ids, vec!["d-1", "d-2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_rejects_label_it_never_showed() {
        let notifier = RecordingNotifier::shared();
        let engine = engine(notifier.clone());
        let sub = subscription();

        engine
            .submit(&sub, opened_event(7, 7, &[(31, "bug")]), None, "d-1")
            .await;
        engine
            .submit(&sub, label_change_event("labeled", 7, 7, 32, "feature"), None, "d-2")
            .await;
        assert_eq!(engine.pending_count().await, 2);

        sleep(Duration::from_secs(2)).await;
        let sent = notifier.notices().await;
        assert_eq!(sent.len(), 2);

        let opened = sent
            .iter()
            .find(|notice| notice.delivery_ids == vec!["d-1".to_string()])
            .unwrap();
        assert_eq!(issues_action(opened), IssueAction::Opened);

        let labels = sent
            .iter()
            .find(|notice| notice.delivery_ids == vec!["d-2".to_string()])
            .unwrap();
        assert_eq!(issues_action(labels), IssueAction::LabelsChanged);
        assert_eq!(labels.aggregation.added_labels[0].name, "feature");
    }

    #[tokio::test(start_paused = true)]
    async fn test_milestone_pair_collapses_without_deadline_reset() {
        let notifier = RecordingNotifier::shared();
        let engine = engine(notifier.clone());
        let sub = subscription();
        let opened_at = Instant::now();

        engine
            .submit(&sub, milestone_change_event("milestoned", 4, 7, 2, "v2"), None, "d-1")
            .await;
        sleep(Duration::from_millis(500)).await;
        engine
            .submit(&sub, milestone_change_event("demilestoned", 4, 7, 1, "v1"), None, "d-2")
            .await;

        // Completing the pair does not move the deadline, so the flush
        // still lands one window after the first event.
        sleep(Duration::from_millis(600)).await;
        let sent = notifier.sent().await;
        assert_eq!(sent.len(), 1);

        let (notice, flushed_at) = &sent[0];
        assert!(flushed_at.duration_since(opened_at) >= WINDOW);
        assert!(flushed_at.duration_since(opened_at) < Duration::from_millis(1400));
        assert_eq!(issues_action(notice), IssueAction::MilestoneChanged);
        assert_eq!(notice.aggregation.milestone_from.as_ref().unwrap().title, "v1");
        assert_eq!(notice.aggregation.milestone_to.as_ref().unwrap().title, "v2");
        assert_eq!(notice.delivery_ids, vec!["d-1", "d-2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_milestone_same_action_does_not_merge() {
        let notifier = RecordingNotifier::shared();
        let engine = engine(notifier.clone());
        let sub = subscription();

        engine
            .submit(&sub, milestone_change_event("milestoned", 4, 7, 1, "v1"), None, "d-1")
            .await;
        engine
            .submit(&sub, milestone_change_event("milestoned", 4, 7, 2, "v2"), None, "d-2")
            .await;
        assert_eq!(engine.pending_count().await, 2);

        sleep(Duration::from_secs(2)).await;
        assert_eq!(notifier.notices().await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_comment_then_close_folds_flag() {
        let notifier = RecordingNotifier::shared();
        let engine = engine(notifier.clone());
        let sub = subscription();

        engine.submit(&sub, comment_event(9, 42), None, "d-1").await;
        sleep(Duration::from_millis(300)).await;
        engine.submit(&sub, issue_event("closed", 9, 42), None, "d-2").await;

        sleep(Duration::from_secs(2)).await;
        let sent = notifier.notices().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, EventKind::IssueComment);
        assert!(sent[0].aggregation.closed);
        assert!(!sent[0].aggregation.reopened);
        assert_eq!(sent[0].delivery_ids, vec!["d-1", "d-2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_then_comment_replaces_representative() {
        let notifier = RecordingNotifier::shared();
        let engine = engine(notifier.clone());
        let sub = subscription();
        let opened_at = Instant::now();

        engine.submit(&sub, issue_event("closed", 9, 42), None, "d-1").await;
        sleep(Duration::from_millis(500)).await;
        engine.submit(&sub, comment_event(9, 42), None, "d-2").await;

        // The merge resets the deadline, so nothing flushes at the
        // original one-second mark.
        sleep(Duration::from_millis(600)).await;
        assert!(notifier.notices().await.is_empty());

        sleep(Duration::from_millis(500)).await;
        let sent = notifier.sent().await;
        assert_eq!(sent.len(), 1);

        let (notice, flushed_at) = &sent[0];
        assert!(flushed_at.duration_since(opened_at) >= Duration::from_millis(1500));
        assert_eq!(notice.kind, EventKind::IssueComment);
        assert!(notice.aggregation.closed);
        assert_eq!(notice.delivery_ids, vec!["d-1", "d-2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reopen_then_comment_sets_reopened_flag() {
        let notifier = RecordingNotifier::shared();
        let engine = engine(notifier.clone());
        let sub = subscription();

        engine.submit(&sub, issue_event("reopened", 9, 42), None, "d-1").await;
        engine.submit(&sub, comment_event(9, 42), None, "d-2").await;

        sleep(Duration::from_secs(2)).await;
        let sent = notifier.notices().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].aggregation.reopened);
        assert!(!sent[0].aggregation.closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_coupling_requires_same_actor() {
        let notifier = RecordingNotifier::shared();
        let engine = engine(notifier.clone());
        let sub = subscription();

        engine.submit(&sub, comment_event(9, 42), None, "d-1").await;
        engine.submit(&sub, issue_event("closed", 9, 43), None, "d-2").await;
        assert_eq!(engine.pending_count().await, 2);

        sleep(Duration::from_secs(2)).await;
        let sent = notifier.notices().await;
        assert_eq!(sent.len(), 2);
        for notice in &sent {
            assert!(!notice.aggregation.closed);
            assert_eq!(notice.delivery_ids.len(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_coupling_requires_same_subject() {
        let notifier = RecordingNotifier::shared();
        let engine = engine(notifier.clone());
        let sub = subscription();

        engine.submit(&sub, comment_event(9, 42), None, "d-1").await;
        engine.submit(&sub, issue_event("closed", 10, 42), None, "d-2").await;
        assert_eq!(engine.pending_count().await, 2);

        sleep(Duration::from_secs(2)).await;
        assert_eq!(notifier.notices().await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flushed_window_never_merges_again() {
        let notifier = RecordingNotifier::shared();
        let engine = engine(notifier.clone());
        let sub = subscription();

        engine
            .submit(&sub, label_change_event("labeled", 5, 7, 31, "bug"), None, "d-1")
            .await;
        sleep(Duration::from_millis(1100)).await;
        assert_eq!(notifier.notices().await.len(), 1);

        // Same subject again after the flush: a fresh window, never a
        // second flush of the first one.
        engine
            .submit(&sub, label_change_event("labeled", 5, 7, 32, "feature"), None, "d-2")
            .await;
        sleep(Duration::from_millis(1100)).await;

        let sent = notifier.notices().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].delivery_ids, vec!["d-1"]);
        assert_eq!(sent[1].delivery_ids, vec!["d-2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_delivery_id_recorded_once() {
        let notifier = RecordingNotifier::shared();
        let engine = engine(notifier.clone());
        let sub = subscription();

        engine
            .submit(&sub, label_change_event("labeled", 5, 7, 31, "bug"), None, "d-1")
            .await;
        engine
            .submit(&sub, label_change_event("unlabeled", 5, 7, 31, "bug"), None, "d-1")
            .await;

        sleep(Duration::from_secs(2)).await;
        let sent = notifier.notices().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].delivery_ids, vec!["d-1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_comments_never_merge() {
        let notifier = RecordingNotifier::shared();
        let engine = engine(notifier.clone());
        let sub = subscription();

        engine.submit(&sub, comment_event(9, 42), None, "d-1").await;
        engine.submit(&sub, comment_event(9, 42), None, "d-2").await;
        assert_eq!(engine.pending_count().await, 2);

        sleep(Duration::from_secs(2)).await;
        assert_eq!(notifier.notices().await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_metrics_ride_along_on_solo_flush() {
        let notifier = RecordingNotifier::shared();
        let engine = engine(notifier.clone());
        let sub = subscription();

        let metrics = PushMetrics {
            total: 3,
            distinct: 2,
        };
        engine
            .submit(&sub, push_event(&[("a", true), ("b", false), ("c", true)]), Some(metrics), "d-1")
            .await;
        sleep(Duration::from_millis(1)).await;

        let sent = notifier.notices().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].push_metrics, Some(metrics));
    }
}
