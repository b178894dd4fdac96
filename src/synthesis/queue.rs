// src/synthesis/queue.rs
//! Per-process priority FIFO of synthesis jobs (spec §4.7). Three bands
//! (high/normal/low) rather than a generic heap, since priority only ever
//! takes one of three values and within-band order is FIFO — matching the
//! enqueue rule's explicit wording rather than a max-heap's incidental
//! ordering.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::{broadcast, Mutex};

use super::types::{JobPriority, JobStatus, SynthesisJob};

#[derive(Debug, Clone)]
pub enum QueueEvent {
    Enqueued(String),
    Processing(String),
    Completed(String),
    Failed(String),
    Requeued(String),
}

pub struct SynthesisQueue {
    high: Mutex<VecDeque<SynthesisJob>>,
    normal: Mutex<VecDeque<SynthesisJob>>,
    low: Mutex<VecDeque<SynthesisJob>>,
    seq: AtomicU64,
    events: broadcast::Sender<QueueEvent>,
}

impl SynthesisQueue {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(1024);
        Self {
            high: Mutex::new(VecDeque::new()),
            normal: Mutex::new(VecDeque::new()),
            low: Mutex::new(VecDeque::new()),
            seq: AtomicU64::new(0),
            events: tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    /// `high` -> front; `low` -> back; `normal` -> before the first `low`
    /// (spec §4.7).
    pub async fn enqueue(
        &self,
        conversation_id: String,
        user_id: String,
        priority: JobPriority,
    ) -> String {
        let job = SynthesisJob::new(conversation_id, user_id, priority, self.next_seq());
        let id = job.id.clone();
        match priority {
            JobPriority::High => self.high.lock().await.push_back(job),
            JobPriority::Normal => self.normal.lock().await.push_back(job),
            JobPriority::Low => self.low.lock().await.push_back(job),
        }
        let _ = self.events.send(QueueEvent::Enqueued(id.clone()));
        id
    }

    /// Pops the next job in priority order (high, then normal, then low);
    /// flips status to `processing` and stamps `last_attempt_at`.
    pub async fn dequeue(&self) -> Option<SynthesisJob> {
        let mut job = {
            let mut high = self.high.lock().await;
            if let Some(j) = high.pop_front() {
                Some(j)
            } else {
                drop(high);
                let mut normal = self.normal.lock().await;
                if let Some(j) = normal.pop_front() {
                    Some(j)
                } else {
                    drop(normal);
                    self.low.lock().await.pop_front()
                }
            }
        }?;
        job.status = JobStatus::Processing;
        job.last_attempt_at = Some(Utc::now());
        job.attempts += 1;
        let _ = self.events.send(QueueEvent::Processing(job.id.clone()));
        Some(job)
    }

    /// Re-queue rule on failure: `attempts < max_attempts` -> back to
    /// `pending` and re-queued (after the caller's backoff delay); else
    /// `failed` (spec §4.7).
    pub async fn requeue_or_fail(&self, mut job: SynthesisJob, error: String) {
        job.error = Some(error);
        if job.attempts < job.max_attempts {
            job.status = JobStatus::Pending;
            let _ = self.events.send(QueueEvent::Requeued(job.id.clone()));
            match job.priority {
                JobPriority::High => self.high.lock().await.push_front(job),
                JobPriority::Normal => self.normal.lock().await.push_front(job),
                JobPriority::Low => self.low.lock().await.push_front(job),
            }
        } else {
            job.status = JobStatus::Failed;
            let _ = self.events.send(QueueEvent::Failed(job.id.clone()));
        }
    }

    pub fn mark_completed(&self, job_id: &str) {
        let _ = self.events.send(QueueEvent::Completed(job_id.to_string()));
    }

    pub async fn len(&self) -> usize {
        self.high.lock().await.len() + self.normal.lock().await.len() + self.low.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for SynthesisQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn priority_ordering_high_then_normal_then_low() {
        let queue = SynthesisQueue::new();
        queue.enqueue("c1".into(), "u1".into(), JobPriority::Low).await;
        queue.enqueue("c2".into(), "u1".into(), JobPriority::Normal).await;
        queue.enqueue("c3".into(), "u1".into(), JobPriority::High).await;

        let first = queue.dequeue().await.unwrap();
        let second = queue.dequeue().await.unwrap();
        let third = queue.dequeue().await.unwrap();

        assert_eq!(first.conversation_id, "c3");
        assert_eq!(second.conversation_id, "c2");
        assert_eq!(third.conversation_id, "c1");
    }

    #[tokio::test]
    async fn fifo_within_same_priority() {
        let queue = SynthesisQueue::new();
        queue.enqueue("a".into(), "u1".into(), JobPriority::Normal).await;
        queue.enqueue("b".into(), "u1".into(), JobPriority::Normal).await;

        assert_eq!(queue.dequeue().await.unwrap().conversation_id, "a");
        assert_eq!(queue.dequeue().await.unwrap().conversation_id, "b");
    }

    #[tokio::test]
    async fn requeue_respects_max_attempts() {
        let queue = SynthesisQueue::new();
        queue.enqueue("a".into(), "u1".into(), JobPriority::Normal).await;
        let mut job = queue.dequeue().await.unwrap();
        job.attempts = job.max_attempts; // simulate exhausted retries
        queue.requeue_or_fail(job, "boom".into()).await;
        assert!(queue.is_empty().await);
    }
}
