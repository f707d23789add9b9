//! Background delivery of lead notifications.
//!
//! The intake path hands each [`ContactNotice`] to a bounded queue and returns at once.
//! A single worker drains the queue in FIFO order, so notices go out in the order leads
//! were captured and a slow provider never delays a response.
use crate::telegram::{ContactNotice, Notifier};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Queued,
    /// Queue full or worker gone; the notice was dropped.
    Dropped,
}

#[derive(Clone)]
pub struct NotificationQueue {
    tx: mpsc::Sender<ContactNotice>,
}

impl NotificationQueue {
    /// Spawns the worker. It exits once every queue handle is dropped and the backlog is drained.
    pub fn spawn(notifier: Arc<dyn Notifier>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_worker(notifier, rx));
        (Self { tx }, handle)
    }

    pub fn enqueue(&self, notice: ContactNotice) -> Enqueued {
        match self.tx.try_send(notice) {
            Ok(()) => Enqueued::Queued,
            Err(TrySendError::Full(notice)) => {
                warn!(
                    request_id = %notice.request_id,
                    "Notification queue full; dropping notice"
                );
                Enqueued::Dropped
            }
            Err(TrySendError::Closed(notice)) => {
                warn!(
                    request_id = %notice.request_id,
                    "Notification worker stopped; dropping notice"
                );
                Enqueued::Dropped
            }
        }
    }
}

async fn run_worker(notifier: Arc<dyn Notifier>, mut rx: mpsc::Receiver<ContactNotice>) {
    while let Some(notice) = rx.recv().await {
        if notifier.notify(&notice).await {
            debug!(request_id = %notice.request_id, "Lead notification sent");
        } else {
            warn!(
                request_id = %notice.request_id,
                "Lead notification not delivered; the request is stored and unaffected"
            );
        }
    }
    info!("Notification queue closed; worker exiting");
}
