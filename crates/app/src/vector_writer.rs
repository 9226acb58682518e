//! Vector store writes with retries, and the pending-batch tracker that
//! bounds how many batches are in flight.

use code_index_domain::constants::{INITIAL_RETRY_DELAY_MS, MAX_BATCH_RETRIES, MAX_PENDING_BATCHES};
use code_index_domain::{BlockIdentity, CollectionName, IndexedVector, RelativePath};
use code_index_ports::{LoggerPort, VectorStorePort, log_fields};
use code_index_shared::{
    ErrorEnvelope, RequestContext, Result, RetryPolicy, retry_async, retry_async_with_observer,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Counts batches between dispatch and acknowledgement.
///
/// Slots are taken with a compare-and-swap on the in-flight counter and
/// released when the [`PendingSlot`] is dropped.
#[derive(Debug)]
pub struct PendingBatchTracker {
    capacity: usize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    released: Notify,
}

impl Default for PendingBatchTracker {
    fn default() -> Self {
        Self::new(MAX_PENDING_BATCHES)
    }
}

impl PendingBatchTracker {
    /// Tracker allowing `capacity` batches in flight (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            released: Notify::new(),
        }
    }

    /// Maximum batches in flight.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Batches currently in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Highest in-flight count observed.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }

    /// Take a slot if one is free.
    pub fn try_acquire(self: &Arc<Self>) -> Option<PendingSlot> {
        let mut current = self.in_flight.load(Ordering::Acquire);
        loop {
            if current >= self.capacity {
                return None;
            }
            match self.in_flight.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.peak.fetch_max(current + 1, Ordering::AcqRel);
                    return Some(PendingSlot {
                        tracker: Arc::clone(self),
                    });
                },
                Err(actual) => current = actual,
            }
        }
    }

    /// Wait for a slot; fails with `core:cancelled` when `ctx` is cancelled.
    pub async fn acquire_slot(self: &Arc<Self>, ctx: &RequestContext) -> Result<PendingSlot> {
        loop {
            ctx.ensure_not_cancelled("pending_batches.acquire_slot")?;
            if let Some(slot) = self.try_acquire() {
                return Ok(slot);
            }
            tokio::select! {
                () = ctx.cancelled() => {
                    return Err(ErrorEnvelope::cancelled("operation cancelled")
                        .with_metadata("operation", "pending_batches.acquire_slot"));
                },
                () = self.released.notified() => {},
            }
        }
    }
}

/// One in-flight batch; dropping it frees the slot.
#[derive(Debug)]
#[must_use = "the slot is released as soon as it is dropped"]
pub struct PendingSlot {
    tracker: Arc<PendingBatchTracker>,
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.tracker.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.tracker.released.notify_one();
    }
}

/// Identities that could not be written or deleted.
#[derive(Debug, Clone)]
pub struct WriteFailure {
    /// Last error after retries.
    pub error: ErrorEnvelope,
    /// Identities missing from (or left in) the index.
    pub missing: Vec<BlockIdentity>,
}

/// Idempotent writes to one collection.
#[derive(Clone)]
pub struct VectorWriter {
    store: Arc<dyn VectorStorePort>,
    collection: CollectionName,
    retry: RetryPolicy,
    logger: Option<Arc<dyn LoggerPort>>,
}

impl VectorWriter {
    /// Writer with the default batch retry policy.
    pub fn new(
        store: Arc<dyn VectorStorePort>,
        collection: CollectionName,
        logger: Option<Arc<dyn LoggerPort>>,
    ) -> Self {
        Self {
            store,
            collection,
            retry: RetryPolicy::exponential(MAX_BATCH_RETRIES, INITIAL_RETRY_DELAY_MS),
            logger,
        }
    }

    /// Override the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Target collection.
    pub const fn collection(&self) -> &CollectionName {
        &self.collection
    }

    /// Insert or overwrite `vectors` by identity.
    pub async fn upsert(
        &self,
        ctx: &RequestContext,
        vectors: Vec<IndexedVector>,
    ) -> std::result::Result<(), WriteFailure> {
        if vectors.is_empty() {
            return Ok(());
        }
        let mut call = || {
            self.store
                .upsert(ctx, self.collection.clone(), vectors.clone())
        };
        let result = retry_async_with_observer(
            ctx,
            self.retry,
            "vector_writer.upsert",
            &mut call,
            |attempt, error, delay| self.warn_retry("upsert", attempt, error, delay),
        )
        .await;
        result.map_err(|error| WriteFailure {
            error,
            missing: vectors.iter().map(|vector| vector.identity).collect(),
        })
    }

    /// Delete `identities`; missing identities are ignored by the store.
    pub async fn delete(
        &self,
        ctx: &RequestContext,
        identities: Vec<BlockIdentity>,
    ) -> std::result::Result<(), WriteFailure> {
        if identities.is_empty() {
            return Ok(());
        }
        let mut call = || {
            self.store
                .delete(ctx, self.collection.clone(), identities.clone())
        };
        let result = retry_async_with_observer(
            ctx,
            self.retry,
            "vector_writer.delete",
            &mut call,
            |attempt, error, delay| self.warn_retry("delete", attempt, error, delay),
        )
        .await;
        result.map_err(|error| WriteFailure {
            error,
            missing: identities,
        })
    }

    /// Delete every point whose payload `filePath` equals `file`.
    pub async fn delete_by_file(&self, ctx: &RequestContext, file: &RelativePath) -> Result<()> {
        retry_async(ctx, self.retry, "vector_writer.delete_by_file", || {
            self.store
                .delete_by_file(ctx, self.collection.clone(), file.clone())
        })
        .await
    }

    fn warn_retry(
        &self,
        operation: &str,
        attempt: u32,
        error: &ErrorEnvelope,
        delay: std::time::Duration,
    ) {
        if let Some(logger) = self.logger.as_ref() {
            logger.warn(
                "vector.write.retry",
                "vector store write failed; retrying",
                Some(log_fields! {
                    "operation" => operation,
                    "attempt" => attempt,
                    "code" => error.code.to_string(),
                    "delayMs" => u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                }),
            );
        }
    }
}
