//! Oracle request queue — prioritised pending jobs.
//!
//! Every oracle call in Vivarium is a queued job drained by the worker
//! pool in [`crate::service`]. Priorities keep dialogue (someone is
//! waiting on the line) ahead of analysis, plans, and background
//! summarisation; within a priority the queue is FIFO. Jobs that sit past
//! their deadline are answered with [`OracleError::Expired`] instead of
//! ever reaching the backend.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::OracleError;
use crate::types::{OracleRequest, OracleResponse};
use vivarium_core::oracle::OracleRole;

/// Priority levels for oracle jobs (higher = dequeued first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobPriority {
    /// Background memory summarisation.
    Summary = 0,
    /// Plan generation.
    Plan = 1,
    /// Mood / sympathy analysis.
    Analysis = 2,
    /// Dialogue line someone is waiting on.
    Dialogue = 3,
}

impl From<OracleRole> for JobPriority {
    fn from(role: OracleRole) -> Self {
        match role {
            OracleRole::Summary => Self::Summary,
            OracleRole::Plan => Self::Plan,
            OracleRole::Analysis => Self::Analysis,
            OracleRole::Dialogue => Self::Dialogue,
        }
    }
}

/// One pending oracle job.
pub struct QueuedJob {
    /// Unique job id.
    pub id: u64,
    /// Scheduling priority.
    pub priority: JobPriority,
    /// The request to execute.
    pub request: OracleRequest,
    /// When the job was enqueued.
    pub enqueued_at: Instant,
    /// Maximum time the job may wait before being answered as expired.
    pub deadline: Duration,
    /// Channel the result is delivered on. A dropped receiver simply
    /// discards the result.
    pub reply: oneshot::Sender<Result<OracleResponse, OracleError>>,
}

impl QueuedJob {
    /// Whether this job has waited past its deadline.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.enqueued_at.elapsed() > self.deadline
    }
}

impl std::fmt::Debug for QueuedJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedJob")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for QueuedJob {}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// BinaryHeap is a max-heap: higher priority first, then FIFO.
impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.enqueued_at.cmp(&self.enqueued_at))
    }
}

/// Statistics about the job queue.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStats {
    /// Current queue depth.
    pub depth: usize,
    /// Total jobs enqueued.
    pub total_enqueued: u64,
    /// Total jobs dropped because the queue was full.
    pub total_dropped: u64,
    /// Total jobs that expired in the queue.
    pub total_expired: u64,
}

struct JobQueueInner {
    heap: BinaryHeap<QueuedJob>,
    next_id: u64,
    max_size: usize,
    total_enqueued: u64,
    total_dropped: u64,
    total_expired: u64,
}

/// Thread-safe oracle job queue.
pub struct JobQueue {
    inner: Mutex<JobQueueInner>,
}

impl JobQueue {
    /// Create a queue with the given maximum depth.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(JobQueueInner {
                heap: BinaryHeap::new(),
                next_id: 0,
                max_size,
                total_enqueued: 0,
                total_dropped: 0,
                total_expired: 0,
            }),
        }
    }

    /// Enqueue a job. Returns its id, or `None` when the queue is full
    /// (the reply channel is dropped, which the caller observes as a
    /// cancelled request).
    pub fn enqueue(
        &self,
        priority: JobPriority,
        request: OracleRequest,
        deadline: Duration,
        reply: oneshot::Sender<Result<OracleResponse, OracleError>>,
    ) -> Option<u64> {
        let mut inner = self.inner.lock();
        if inner.heap.len() >= inner.max_size {
            inner.total_dropped += 1;
            return None;
        }

        let id = inner.next_id;
        inner.next_id += 1;
        inner.total_enqueued += 1;
        inner.heap.push(QueuedJob {
            id,
            priority,
            request,
            enqueued_at: Instant::now(),
            deadline,
            reply,
        });
        Some(id)
    }

    /// Pop the highest-priority live job. Expired jobs are answered with
    /// [`OracleError::Expired`] and skipped.
    pub fn dequeue(&self) -> Option<QueuedJob> {
        let mut inner = self.inner.lock();
        loop {
            let job = inner.heap.pop()?;
            if job.is_expired() {
                inner.total_expired += 1;
                let _ = job.reply.send(Err(OracleError::Expired));
                continue;
            }
            return Some(job);
        }
    }

    /// Current queue depth.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().heap.is_empty()
    }

    /// Queue statistics.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock();
        QueueStats {
            depth: inner.heap.len(),
            total_enqueued: inner.total_enqueued,
            total_dropped: inner.total_dropped,
            total_expired: inner.total_expired,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn enqueue(queue: &JobQueue, priority: JobPriority, deadline: Duration) -> Option<u64> {
        let (tx, _rx) = oneshot::channel();
        queue.enqueue(priority, OracleRequest::new("system", "user"), deadline, tx)
    }

    #[test]
    fn priority_ordering() {
        let queue = JobQueue::new(100);
        enqueue(&queue, JobPriority::Plan, Duration::from_secs(30));
        enqueue(&queue, JobPriority::Dialogue, Duration::from_secs(30));
        enqueue(&queue, JobPriority::Summary, Duration::from_secs(30));

        assert_eq!(queue.dequeue().expect("job").priority, JobPriority::Dialogue);
        assert_eq!(queue.dequeue().expect("job").priority, JobPriority::Plan);
        assert_eq!(queue.dequeue().expect("job").priority, JobPriority::Summary);
    }

    #[test]
    fn fifo_within_same_priority() {
        let queue = JobQueue::new(100);
        let first = enqueue(&queue, JobPriority::Analysis, Duration::from_secs(30)).expect("id");
        let second = enqueue(&queue, JobPriority::Analysis, Duration::from_secs(30)).expect("id");

        assert_eq!(queue.dequeue().expect("job").id, first);
        assert_eq!(queue.dequeue().expect("job").id, second);
    }

    #[test]
    fn full_queue_drops_jobs() {
        let queue = JobQueue::new(1);
        assert!(enqueue(&queue, JobPriority::Plan, Duration::from_secs(30)).is_some());
        assert!(enqueue(&queue, JobPriority::Dialogue, Duration::from_secs(30)).is_none());
        assert_eq!(queue.stats().total_dropped, 1);
    }

    #[tokio::test]
    async fn expired_jobs_are_answered_and_skipped() {
        let queue = JobQueue::new(100);
        let (tx, rx) = oneshot::channel();
        queue.enqueue(
            JobPriority::Dialogue,
            OracleRequest::new("system", "user"),
            Duration::from_millis(0),
            tx,
        );

        std::thread::sleep(Duration::from_millis(2));
        assert!(queue.dequeue().is_none());
        assert_eq!(queue.stats().total_expired, 1);
        assert!(matches!(rx.await, Ok(Err(OracleError::Expired))));
    }

    #[test]
    fn role_maps_to_priority() {
        assert_eq!(JobPriority::from(OracleRole::Dialogue), JobPriority::Dialogue);
        assert_eq!(JobPriority::from(OracleRole::Summary), JobPriority::Summary);
        assert!(JobPriority::from(OracleRole::Dialogue) > JobPriority::from(OracleRole::Plan));
    }
}
