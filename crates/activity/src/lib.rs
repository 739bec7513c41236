//! Activity log sink.
//!
//! Request handlers record audit entries through an [`ActivitySink`]; a
//! single background writer drains them into the store. The queue is
//! bounded and drops on full. Nothing here ever fails the caller: a full
//! queue or a failed write is logged and counted, then forgotten.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use common::{ActivityId, Clock, UserId};
use store::{ActivityLog, Store};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One action to record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    pub user_id: UserId,
    pub action: String,
    pub resource: String,
    pub details: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl Activity {
    pub fn new(user_id: UserId, action: &str, resource: &str, details: impl Into<String>) -> Self {
        Self {
            user_id,
            action: action.to_string(),
            resource: resource.to_string(),
            details: details.into(),
            ip_address: None,
            user_agent: None,
        }
    }

    /// Attaches the client address and user agent of the request.
    pub fn from_client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }
}

/// Producer side of the activity queue. Cheap to clone.
#[derive(Clone)]
pub struct ActivitySink {
    tx: mpsc::Sender<ActivityLog>,
    clock: Arc<dyn Clock>,
    dropped: Arc<AtomicU64>,
}

/// Consumer side of the activity queue.
pub struct ActivityQueue {
    rx: mpsc::Receiver<ActivityLog>,
}

/// Creates a sink and its queue holding at most `capacity` pending entries.
pub fn channel(capacity: usize, clock: Arc<dyn Clock>) -> (ActivitySink, ActivityQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ActivitySink {
            tx,
            clock,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        ActivityQueue { rx },
    )
}

impl ActivitySink {
    /// Enqueues an entry without waiting. Drops it if the queue is full or
    /// the writer has stopped.
    pub fn record(&self, activity: Activity) {
        let entry = ActivityLog {
            id: ActivityId::new(),
            user_id: activity.user_id,
            action: activity.action,
            resource: activity.resource,
            details: activity.details,
            ip_address: activity.ip_address,
            user_agent: activity.user_agent,
            timestamp: self.clock.now(),
        };

        if let Err(err) = self.tx.try_send(entry) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("activity_log_dropped_total").increment(1);
            let reason = match err {
                mpsc::error::TrySendError::Full(_) => "queue full",
                mpsc::error::TrySendError::Closed(_) => "writer stopped",
            };
            tracing::debug!(reason, "activity entry dropped");
        }
    }

    /// Number of entries this sink and its clones have dropped.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl ActivityQueue {
    /// Writes entries to the store until every sink is dropped.
    pub async fn run(mut self, store: Arc<dyn Store>) {
        let mut written: u64 = 0;
        while let Some(entry) = self.rx.recv().await {
            let action = entry.action.clone();
            match store.append_activity(entry).await {
                Ok(()) => written += 1,
                Err(e) => {
                    metrics::counter!("activity_log_write_failures_total").increment(1);
                    tracing::warn!(error = %e, %action, "failed to write activity entry");
                }
            }
        }
        tracing::info!(written, "activity writer stopped");
    }

    /// Runs the writer on the current runtime.
    pub fn spawn_writer(self, store: Arc<dyn Store>) -> JoinHandle<()> {
        tokio::spawn(self.run(store))
    }
}
