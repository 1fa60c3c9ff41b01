//! Event dispatch: subscription housekeeping, then the coalescing handoff.
//!
//! Some event kinds carry side effects on the subscription itself (a ping
//! reports the upstream's hook id, a repository rename changes the name a
//! subscription is found under, a hook deletion retires it). The
//! [`Dispatcher`] applies those first, derives push commit counts, and
//! then hands the event to the [`AggregationEngine`]. With coalescing
//! disabled there is no engine; every event becomes a solo notice and the
//! delivery call is awaited inline.

use std::sync::Arc;

use tracing::{info, warn};

use crate::aggregation::{deliver, AggregationEngine};
use crate::event::{Event, MetaAction, RepositoryAction};
use crate::notify::{Aggregation, Notice, Notifier, PushMetrics};
use crate::subscription::{Subscription, SubscriptionStore};

pub struct Dispatcher {
    store: Arc<SubscriptionStore>,
    engine: Option<AggregationEngine>,
    notifier: Arc<dyn Notifier>,
}

impl Dispatcher {
    /// `engine: None` disables coalescing altogether.
    pub fn new(
        store: Arc<SubscriptionStore>,
        engine: Option<AggregationEngine>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            engine,
            notifier,
        }
    }

    /// Number of aggregation windows currently open.
    pub async fn pending_count(&self) -> usize {
        match &self.engine {
            Some(engine) => engine.pending_count().await,
            None => 0,
        }
    }

    /// Route one verified, decoded event for a subscription.
    pub async fn handle(&self, event: Event, delivery_id: &str, subscription: &Subscription) {
        let push_metrics = match &event {
            Event::Push(push) => Some(PushMetrics::for_push(push)),
            _ => None,
        };

        match &event {
            Event::Ping(ping) => {
                info!(
                    subscription = %subscription.id,
                    hook_id = ping.hook_id,
                    zen = %ping.zen,
                    "Upstream confirmed hook"
                );
                if subscription.remote_id != Some(ping.hook_id) {
                    self.store.set_remote_id(subscription.id, ping.hook_id).await;
                }
            }
            Event::Meta(meta) if meta.action == MetaAction::Deleted => {
                info!(
                    subscription = %subscription.id,
                    repo = %subscription.repo,
                    "Upstream hook deleted; retiring subscription"
                );
                if let Err(err) = self.store.remove(subscription.id).await {
                    warn!(
                        subscription = %subscription.id,
                        error = %err,
                        "Failed to retire subscription"
                    );
                }
                // The hook is gone; there is nothing to tell the channel.
                return;
            }
            Event::Repository(repo_event) => match repo_event.action {
                RepositoryAction::Renamed | RepositoryAction::Transferred => {
                    self.store
                        .rename_repo(subscription.id, &repo_event.repository.full_name)
                        .await;
                }
                RepositoryAction::Deleted => {
                    if let Err(err) = self.store.remove(subscription.id).await {
                        warn!(
                            subscription = %subscription.id,
                            error = %err,
                            "Failed to retire subscription"
                        );
                    }
                }
                _ => {}
            },
            _ => {}
        }

        match &self.engine {
            Some(engine) => {
                engine
                    .submit(subscription, event, push_metrics, delivery_id)
                    .await;
            }
            None => {
                let notice = Notice {
                    kind: event.kind(),
                    event,
                    aggregation: Aggregation::default(),
                    push_metrics,
                    channel_id: subscription.channel_id.clone(),
                    delivery_ids: vec![delivery_id.to_string()],
                };
                deliver(self.notifier.as_ref(), &notice).await;
            }
        }
    }
}
