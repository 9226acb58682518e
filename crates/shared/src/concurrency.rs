//! Request context, cancellation and bounded executors.
//!
//! - [`RequestContext`] carries a correlation id and a shared cancellation token.
//! - [`BoundedQueue`] is an async FIFO whose producers wait while it is full.
//! - [`WorkerPool`] runs boxed tasks on a fixed number of tokio workers fed by a
//!   `BoundedQueue`, so submitting work applies backpressure to the caller.
//!
//! Cancellation drops queued work; tasks already running finish unless they
//! observe the context themselves.

use crate::{ErrorClass, ErrorCode, ErrorEnvelope, Result};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll};
use tokio::sync::{Mutex, Notify, oneshot};

/// A correlation identifier used for logging.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(Arc<str>);

static RUN_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

impl CorrelationId {
    /// Parse a correlation identifier; the value is trimmed and must be non-empty.
    pub fn parse(value: impl AsRef<str>) -> Result<Self> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "correlationId must be non-empty",
            ));
        }
        Ok(Self(Arc::from(trimmed)))
    }

    /// Create a new `run_*` id, unique within this process.
    #[must_use]
    pub fn new_run_id() -> Self {
        let n = RUN_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(Arc::from(format!("run_{n}")))
    }

    /// Borrow the identifier as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// A clonable cancellation token that can be awaited.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<CancellationState>,
}

#[derive(Debug, Default)]
struct CancellationState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    /// Create a new token in the non-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the token and wake all waiters.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    /// Returns true if the token has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until the token is cancelled.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Request-scoped context passed across boundaries.
#[derive(Debug, Clone)]
pub struct RequestContext {
    correlation_id: CorrelationId,
    cancellation: CancellationToken,
}

impl RequestContext {
    /// Create a context with a fresh cancellation token.
    #[must_use]
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self::with_cancellation(correlation_id, CancellationToken::new())
    }

    /// Create a context with an auto-generated `run_*` id.
    #[must_use]
    pub fn new_request() -> Self {
        Self::new(CorrelationId::new_run_id())
    }

    /// Create a context sharing an existing cancellation token.
    #[must_use]
    pub const fn with_cancellation(
        correlation_id: CorrelationId,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            correlation_id,
            cancellation,
        }
    }

    /// Return the correlation id.
    #[must_use]
    pub const fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Return a clone of the cancellation token.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Returns true if the request was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Cancel this request.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Await cancellation.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await;
    }

    /// Return a cancellation error tagged with `operation` when cancelled.
    pub fn ensure_not_cancelled(&self, operation: &'static str) -> Result<()> {
        if self.is_cancelled() {
            return Err(cancelled(operation));
        }
        Ok(())
    }
}

fn cancelled(operation: &'static str) -> ErrorEnvelope {
    ErrorEnvelope::cancelled("operation cancelled").with_metadata("operation", operation)
}

fn queue_closed() -> ErrorEnvelope {
    ErrorEnvelope::expected(
        ErrorCode::new("core", "bounded_queue_closed"),
        "BoundedQueue is closed",
    )
}

/// A bounded async FIFO with explicit backpressure.
///
/// `enqueue` waits while the queue is full and `dequeue` waits while it is
/// empty; both give up when the request is cancelled.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    capacity: usize,
    state: Arc<Mutex<QueueState<T>>>,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            capacity: self.capacity,
            state: Arc::clone(&self.state),
        }
    }
}

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    waiting_consumers: VecDeque<oneshot::Sender<T>>,
    waiting_producers: VecDeque<oneshot::Sender<()>>,
    closed: bool,
}

impl<T> QueueState<T> {
    fn wake_one_producer(&mut self) {
        while let Some(producer) = self.waiting_producers.pop_front() {
            if producer.send(()).is_ok() {
                return;
            }
        }
    }
}

impl<T> BoundedQueue<T> {
    /// Create a new bounded queue; `capacity` must be positive.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "capacity must be a positive number",
            ));
        }

        Ok(Self {
            capacity,
            state: Arc::new(Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                waiting_consumers: VecDeque::new(),
                waiting_producers: VecDeque::new(),
                closed: false,
            })),
        })
    }

    /// Return the configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Return the number of queued items.
    pub async fn len(&self) -> usize {
        self.state.lock().await.items.len()
    }

    /// Return true when nothing is queued.
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.items.is_empty()
    }

    /// Close the queue and drop queued items; waiters are released with an error.
    pub async fn close_and_clear(&self) {
        let mut state = self.state.lock().await;
        state.closed = true;
        state.items.clear();
        state.waiting_consumers.clear();
        state.waiting_producers.clear();
    }

    /// Enqueue an item, waiting for capacity when the queue is full.
    pub async fn enqueue(&self, ctx: &RequestContext, mut item: T) -> Result<()> {
        ctx.ensure_not_cancelled("queue.enqueue")?;

        loop {
            let gate = {
                let mut state = self.state.lock().await;
                if state.closed {
                    return Err(queue_closed());
                }

                // Hand the item straight to a parked consumer when there is one.
                while let Some(consumer) = state.waiting_consumers.pop_front() {
                    match consumer.send(item) {
                        Ok(()) => return Ok(()),
                        Err(returned) => item = returned,
                    }
                }

                if state.items.len() < self.capacity {
                    state.items.push_back(item);
                    return Ok(());
                }

                let (tx, rx) = oneshot::channel::<()>();
                state.waiting_producers.push_back(tx);
                rx
            };

            tokio::select! {
                () = ctx.cancelled() => return Err(cancelled("queue.enqueue")),
                res = gate => {
                    if res.is_err() {
                        return Err(queue_closed());
                    }
                }
            }
        }
    }

    /// Dequeue an item, waiting while the queue is empty.
    pub async fn dequeue(&self, ctx: &RequestContext) -> Result<T> {
        ctx.ensure_not_cancelled("queue.dequeue")?;

        let wait = {
            let mut state = self.state.lock().await;
            if let Some(item) = state.items.pop_front() {
                state.wake_one_producer();
                return Ok(item);
            }
            if state.closed {
                return Err(queue_closed());
            }

            let (tx, rx) = oneshot::channel::<T>();
            state.waiting_consumers.push_back(tx);
            rx
        };

        tokio::select! {
            () = ctx.cancelled() => Err(cancelled("queue.dequeue")),
            res = wait => res.map_err(|_| queue_closed()),
        }
    }
}

type BoxTask = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// Options for the worker pool.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPoolOptions {
    /// Number of worker tasks (bounded concurrency).
    pub concurrency: usize,
    /// Maximum queued tasks waiting for a worker.
    ///
    /// Default: `concurrency * 2` (minimum 1).
    pub queue_capacity: Option<usize>,
}

impl WorkerPoolOptions {
    /// Options with the given concurrency and the default queue capacity.
    #[must_use]
    pub const fn with_concurrency(concurrency: usize) -> Self {
        Self {
            concurrency,
            queue_capacity: None,
        }
    }
}

/// Handle to the result of a task dispatched to a [`WorkerPool`].
///
/// Resolves to `core:cancelled` when the task was dropped before running.
#[must_use = "a ticket does nothing unless awaited"]
#[derive(Debug)]
pub struct TaskTicket<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Future for TaskTicket<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or_else(|_| Err(cancelled("worker_pool.ticket"))))
    }
}

/// A bounded worker pool executor.
pub struct WorkerPool {
    ctx: RequestContext,
    queue: BoundedQueue<BoxTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
    cancel_watcher: tokio::task::JoinHandle<()>,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("WorkerPool")
            .field("workers", &self.workers.len())
            .field("queue_capacity", &self.queue.capacity())
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Spawn the workers of a pool bound to `ctx`.
    pub fn new(ctx: RequestContext, options: WorkerPoolOptions) -> Result<Self> {
        if options.concurrency == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "concurrency must be a positive number",
            ));
        }

        let capacity = options
            .queue_capacity
            .unwrap_or_else(|| options.concurrency.saturating_mul(2))
            .max(1);
        let queue = BoundedQueue::new(capacity)?;

        let token = ctx.cancellation_token();
        let queue_for_cancel = queue.clone();
        let cancel_watcher = tokio::spawn(async move {
            token.cancelled().await;
            queue_for_cancel.close_and_clear().await;
        });

        let workers = (0..options.concurrency)
            .map(|_| {
                let queue = queue.clone();
                let ctx = ctx.clone();
                tokio::spawn(worker_loop(queue, ctx))
            })
            .collect();

        Ok(Self {
            ctx,
            queue,
            workers,
            cancel_watcher,
        })
    }

    /// Number of worker tasks.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.workers.len()
    }

    /// Queue a task and return a ticket for its result.
    ///
    /// Waits while the pool queue is full. The task is skipped (and the
    /// ticket resolves cancelled) when the context is cancelled before a
    /// worker picks it up.
    pub async fn dispatch<T, Fut, F>(&self, task: F) -> Result<TaskTicket<T>>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
    {
        self.ctx.ensure_not_cancelled("worker_pool.dispatch")?;

        let (tx, rx) = oneshot::channel::<Result<T>>();
        let ctx = self.ctx.clone();
        let boxed: BoxTask = Box::new(move || {
            Box::pin(async move {
                let result = if ctx.is_cancelled() {
                    Err(cancelled("worker_pool.task"))
                } else {
                    task().await
                };
                // The ticket may already be gone; the result is then unobserved.
                let _ = tx.send(result);
            })
        });

        match self.queue.enqueue(&self.ctx, boxed).await {
            Ok(()) => Ok(TaskTicket { rx }),
            Err(_) if self.ctx.is_cancelled() => Err(cancelled("worker_pool.dispatch")),
            Err(error) => Err(error),
        }
    }

    /// Submit a task and await its result.
    pub async fn submit<T, Fut, F>(&self, task: F) -> Result<T>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
    {
        self.dispatch(task).await?.await
    }

    /// Stop the pool: drop queued work and await worker termination.
    pub async fn shutdown(mut self) -> Result<()> {
        self.queue.close_and_clear().await;
        self.cancel_watcher.abort();
        if let Err(join_error) = (&mut self.cancel_watcher).await
            && !join_error.is_cancelled()
        {
            return Err(join_failed("cancel watcher", &join_error));
        }

        for handle in self.workers.drain(..) {
            if let Err(join_error) = handle.await {
                return Err(join_failed("worker", &join_error));
            }
        }
        Ok(())
    }
}

fn join_failed(what: &str, error: &tokio::task::JoinError) -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::internal(),
        format!("worker_pool {what} failed: {error}"),
        ErrorClass::NonRetriable,
    )
}

async fn worker_loop(queue: BoundedQueue<BoxTask>, ctx: RequestContext) {
    // A closed queue or a cancelled context ends the worker.
    while let Ok(task) = queue.dequeue(&ctx).await {
        task().await;
    }
}
