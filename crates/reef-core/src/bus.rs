//! In-process publish/subscribe event bus.
//!
//! The bus decouples plugins from each other's concrete types: a publisher
//! only knows a topic string and a JSON payload. Delivery within one
//! `publish` call is synchronous and in subscription order; a subscriber's
//! failure is caught and logged without interrupting the publisher or the
//! remaining subscribers, and a handler exceeding the per-handler timeout is
//! skipped for that delivery and flagged.
//!
//! Subscriptions carry an optional owner (a plugin id); the lifecycle
//! manager revokes an owner's subscriptions when that plugin unloads, so no
//! dangling handler can fire after its owner is gone.
//!
//! # Example
//!
//! ```rust,ignore
//! let bus = EventBus::new(Duration::from_secs(5));
//! bus.subscribe("member.joined", Some("core:greeter"), Arc::new(|payload| {
//!     Box::pin(async move {
//!         info!(?payload, "welcome!");
//!         Ok(())
//!     })
//! }));
//! bus.publish("member.joined", serde_json::json!({ "user": 42 })).await;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use tracing::{debug, error, warn};

use crate::error::BoxError;

/// Reserved framework topics.
pub mod topics {
    /// Published once startup completes with every requested plugin running.
    pub const STARTED: &str = "framework.started";
    /// Published when the startup report contains failed or skipped plugins;
    /// the webhook reporter collaborator subscribes here.
    pub const STARTUP_FAILED: &str = "framework.startup_failed";
    /// Published after `unload_all` completes at shutdown.
    pub const STOPPED: &str = "framework.stopped";
}

/// Async event handler. Receives the shared payload for one delivery.
pub type EventHandler =
    Arc<dyn Fn(Arc<serde_json::Value>) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// Opaque handle identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    owner: Option<String>,
    handler: EventHandler,
}

/// Outcome of a single `publish` call.
///
/// The publisher itself never fails; this summary records what happened to
/// each subscriber so callers (and tests) can observe isolation behavior.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishReport {
    /// Handlers that completed successfully.
    pub delivered: usize,
    /// Handlers that returned an error, with the rendered message.
    pub failed: Vec<(SubscriptionId, String)>,
    /// Handlers skipped because they exceeded the per-handler timeout.
    pub timed_out: Vec<SubscriptionId>,
}

/// Process-wide publish/subscribe dispatcher.
pub struct EventBus {
    next_id: AtomicU64,
    subscriptions: RwLock<HashMap<String, Vec<Subscription>>>,
    handler_timeout: Duration,
}

impl EventBus {
    /// Creates a bus with the given per-handler delivery timeout.
    pub fn new(handler_timeout: Duration) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscriptions: RwLock::new(HashMap::new()),
            handler_timeout,
        }
    }

    /// Subscribes `handler` to `topic`.
    ///
    /// `owner` ties the subscription to a plugin id so it can be revoked in
    /// bulk when that plugin unloads; framework-internal subscribers pass
    /// `None`.
    pub fn subscribe(
        &self,
        topic: &str,
        owner: Option<&str>,
        handler: EventHandler,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions
            .write()
            .entry(topic.to_string())
            .or_default()
            .push(Subscription {
                id,
                owner: owner.map(str::to_string),
                handler,
            });
        debug!(topic, owner = owner.unwrap_or("<framework>"), "Subscribed");
        id
    }

    /// Removes one subscription. Returns `false` when the handle is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscriptions.write();
        for list in subs.values_mut() {
            if let Some(pos) = list.iter().position(|s| s.id == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Revokes every subscription held by `owner`. Returns the count removed.
    pub fn revoke_owner(&self, owner: &str) -> usize {
        let mut removed = 0;
        let mut subs = self.subscriptions.write();
        for list in subs.values_mut() {
            let before = list.len();
            list.retain(|s| s.owner.as_deref() != Some(owner));
            removed += before - list.len();
        }
        if removed > 0 {
            debug!(owner, removed, "Revoked subscriptions");
        }
        removed
    }

    /// Number of current subscriptions for `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscriptions
            .read()
            .get(topic)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Delivers `payload` to every current subscriber of `topic`, in
    /// subscription order.
    ///
    /// A handler error or timeout is logged and recorded in the report; it
    /// never prevents delivery to the remaining subscribers.
    pub async fn publish(&self, topic: &str, payload: serde_json::Value) -> PublishReport {
        // Snapshot under a short read lock; handlers run without holding it
        // so they may themselves subscribe or publish.
        let handlers: Vec<(SubscriptionId, EventHandler)> = {
            let subs = self.subscriptions.read();
            subs.get(topic)
                .map(|list| {
                    list.iter()
                        .map(|s| (s.id, Arc::clone(&s.handler)))
                        .collect()
                })
                .unwrap_or_default()
        };

        let payload = Arc::new(payload);
        let mut report = PublishReport::default();

        for (id, handler) in handlers {
            match tokio::time::timeout(self.handler_timeout, handler(Arc::clone(&payload))).await
            {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    error!(topic, subscription = id.0, error = %e, "Event handler failed");
                    report.failed.push((id, e.to_string()));
                }
                Err(_) => {
                    warn!(
                        topic,
                        subscription = id.0,
                        timeout = ?self.handler_timeout,
                        "Event handler timed out — skipped for this delivery"
                    );
                    report.timed_out.push(id);
                }
            }
        }

        report
    }
}
