//! Loyalty coupon issuance
//!
//! After every committed order the engine drops a job on a bounded queue.
//! One worker drains it: a user whose completed-order count reaches a
//! positive multiple of [`ORDERS_PER_REWARD`] and who holds no unused
//! coupon gets a new [`LOYALTY_DISCOUNT_PERCENT`] coupon.
//!
//! Enqueueing never waits. A full or closed queue drops the job, and job
//! failures are logged only; neither ever reaches the order that
//! triggered them.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use shared::models::{Coupon, LOYALTY_DISCOUNT_PERCENT};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::store::{Store, StoreResult};
use crate::util::generate_coupon_code;

/// Completed orders per loyalty coupon
pub const ORDERS_PER_REWARD: i64 = 5;

const CODE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy)]
struct LoyaltyJob {
    user_id: i64,
}

pub struct LoyaltyDispatcher {
    sender: Mutex<Option<mpsc::Sender<LoyaltyJob>>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    dropped: AtomicU64,
}

impl LoyaltyDispatcher {
    /// Start the worker. Must be called inside a tokio runtime.
    pub fn spawn(store: Arc<dyn Store>, capacity: usize, job_timeout: Duration) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(store, receiver, job_timeout));
        Self {
            sender: Mutex::new(Some(sender)),
            worker: tokio::sync::Mutex::new(Some(worker)),
            dropped: AtomicU64::new(0),
        }
    }

    /// Queue a check for `user_id`. Never blocks.
    pub fn notify(&self, user_id: i64) {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(user_id, "Loyalty queue closed, job dropped");
            return;
        };
        match sender.try_send(LoyaltyJob { user_id }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(user_id, "Loyalty queue full, job dropped");
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(user_id, "Loyalty worker gone, job dropped");
            }
        }
    }

    /// Jobs discarded because the queue was full or closed
    pub fn dropped_jobs(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Close the queue and wait for queued jobs to finish.
    pub async fn shutdown(&self) {
        self.sender.lock().take();
        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker
            && let Err(e) = worker.await
        {
            tracing::error!(error = %e, "Loyalty worker panicked");
        }
    }
}

async fn run_worker(
    store: Arc<dyn Store>,
    mut receiver: mpsc::Receiver<LoyaltyJob>,
    job_timeout: Duration,
) {
    while let Some(job) = receiver.recv().await {
        let user_id = job.user_id;
        match tokio::time::timeout(job_timeout, issue_if_due(store.as_ref(), user_id)).await {
            Ok(Ok(Some(coupon))) => {
                tracing::info!(user_id, coupon_id = coupon.id, "Loyalty coupon issued");
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => {
                tracing::error!(user_id, error = %e, "Loyalty coupon job failed");
            }
            Err(_) => {
                tracing::error!(user_id, timeout = ?job_timeout, "Loyalty coupon job timed out");
            }
        }
    }
    tracing::debug!("Loyalty worker stopped");
}

/// Issue a loyalty coupon when `user_id` has earned one.
pub async fn issue_if_due(store: &dyn Store, user_id: i64) -> StoreResult<Option<Coupon>> {
    if store.count_unused_coupons(user_id).await? > 0 {
        return Ok(None);
    }

    let completed = store.count_completed_orders(user_id).await?;
    if completed == 0 || completed % ORDERS_PER_REWARD != 0 {
        return Ok(None);
    }

    let mut attempt = 1;
    loop {
        match store
            .create_coupon(user_id, &generate_coupon_code(), LOYALTY_DISCOUNT_PERCENT)
            .await
        {
            Ok(coupon) => return Ok(Some(coupon)),
            Err(e) if e.is_unique_violation() && attempt < CODE_ATTEMPTS => attempt += 1,
            Err(e) => return Err(e),
        }
    }
}
