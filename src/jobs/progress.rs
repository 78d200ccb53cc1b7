//! In-memory job progress and its fan-out to observers.
//!
//! Each job owns one [`Progress`] object. Mutators update the snapshot
//! under a mutex and wake subscribers through single-slot signal
//! channels, so bursts of updates coalesce and consumers always re-read
//! the latest snapshot. Update jobs additionally keep an append-only
//! event log so late subscribers can replay the state transitions.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::{mpsc, watch};

use crate::domain::sync_job::JobStatus;
use crate::jobs::JobId;

/// How many failures the ring keeps.
const FAILURE_RING: usize = 5;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub name: String,
    pub error: String,
}

/// A named server-sent event captured for streaming.
#[derive(Serialize, Debug, Clone)]
pub struct StreamEvent {
    pub name: String,
    pub data: serde_json::Value,
}

/// Point-in-time view of a job, as served by the polling endpoint.
#[derive(Serialize, Debug, Clone)]
pub struct ProgressSnapshot {
    pub id: JobId,
    pub status: String,
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub in_queue: usize,
    pub failures: Vec<Failure>,
}

struct ProgressState {
    status: String,
    done: bool,
    total: usize,
    processed: usize,
    succeeded: usize,
    failed: usize,
    failures: VecDeque<Failure>,
    subscribers: Vec<mpsc::Sender<()>>,
    events: Vec<StreamEvent>,
}

pub struct Progress {
    job_id: JobId,
    state: Mutex<ProgressState>,
    done_tx: watch::Sender<bool>,
}

impl Progress {
    pub fn new(job_id: JobId) -> Arc<Self> {
        Self::with_status(job_id, JobStatus::Queued)
    }

    /// Restores a progress object for a job whose row already has a
    /// status, e.g. when polling a job from a previous process.
    pub fn with_status(job_id: JobId, status: JobStatus) -> Arc<Self> {
        let (done_tx, _) = watch::channel(status.is_terminal());
        Arc::new(Self {
            job_id,
            state: Mutex::new(ProgressState {
                status: status.as_str().to_string(),
                done: status.is_terminal(),
                total: 0,
                processed: 0,
                succeeded: 0,
                failed: 0,
                failures: VecDeque::new(),
                subscribers: Vec::new(),
                events: Vec::new(),
            }),
            done_tx,
        })
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn set_total(&self, total: usize) {
        {
            let mut state = self.state.lock().unwrap();
            state.total = total;
        }
        self.notify();
    }

    /// Records one successfully processed item.
    pub fn success(&self) {
        {
            let mut state = self.state.lock().unwrap();
            state.processed += 1;
            state.succeeded += 1;
        }
        self.notify();
    }

    /// Records one failed item in the bounded failure ring.
    pub fn fail(&self, name: &str, error: &str) {
        {
            let mut state = self.state.lock().unwrap();
            state.processed += 1;
            state.failed += 1;
            state.failures.push_back(Failure {
                name: name.to_string(),
                error: error.to_string(),
            });
            while state.failures.len() > FAILURE_RING {
                state.failures.pop_front();
            }
        }
        self.notify();
    }

    /// Moves the job to a new status. Terminal statuses close the
    /// completion handle and unblock waiters.
    pub fn set_status(&self, status: JobStatus) {
        self.set_status_str(status.as_str(), status.is_terminal());
    }

    /// Status transition with a free-form tag, used by update jobs whose
    /// state set is wider than the coarse job statuses.
    pub fn set_status_str(&self, status: &str, terminal: bool) {
        {
            let mut state = self.state.lock().unwrap();
            state.status = status.to_string();
            state.done = state.done || terminal;
        }
        if terminal {
            let _ = self.done_tx.send(true);
        }
        self.notify();
    }

    /// Appends a named event to the log and wakes subscribers.
    pub fn push_event(&self, name: &str, data: serde_json::Value) {
        {
            let mut state = self.state.lock().unwrap();
            state.events.push(StreamEvent {
                name: name.to_string(),
                data,
            });
        }
        self.notify();
    }

    pub fn is_done(&self) -> bool {
        self.state.lock().unwrap().done
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let state = self.state.lock().unwrap();
        ProgressSnapshot {
            id: self.job_id,
            status: state.status.clone(),
            total: state.total,
            processed: state.processed,
            succeeded: state.succeeded,
            failed: state.failed,
            in_queue: state.total.saturating_sub(state.processed),
            failures: state.failures.iter().cloned().collect(),
        }
    }

    pub fn failures(&self) -> Vec<Failure> {
        let state = self.state.lock().unwrap();
        state.failures.iter().cloned().collect()
    }

    /// Events at or after `from`, plus the next replay cursor.
    pub fn events_since(&self, from: usize) -> (Vec<StreamEvent>, usize) {
        let state = self.state.lock().unwrap();
        let events: Vec<StreamEvent> = state.events.iter().skip(from).cloned().collect();
        (events, state.events.len())
    }

    /// Registers a coalescing wake channel. A full slot means a signal
    /// is already pending, which is all a subscriber needs to know.
    pub fn subscribe(&self) -> mpsc::Receiver<()> {
        let (tx, rx) = mpsc::channel(1);
        let mut state = self.state.lock().unwrap();
        state.subscribers.push(tx);
        rx
    }

    /// Completion handle: resolves to `true` once the job is terminal.
    pub fn completion(&self) -> watch::Receiver<bool> {
        self.done_tx.subscribe()
    }

    /// Blocks until the job reaches a terminal status.
    pub async fn wait_terminal(&self) {
        let mut rx = self.completion();
        let _ = rx.wait_for(|done| *done).await;
    }

    fn notify(&self) {
        let mut state = self.state.lock().unwrap();
        state.subscribers.retain(|tx| !tx.is_closed());
        for tx in &state.subscribers {
            // A full slot already wakes the subscriber; drop the signal.
            let _ = tx.try_send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_ring_is_bounded() {
        let progress = Progress::new(JobId::Sync(1));
        for i in 0..8 {
            progress.fail(&format!("mod-{i}.jar"), "boom");
        }
        let snapshot = progress.snapshot();
        assert_eq!(snapshot.failed, 8);
        assert_eq!(snapshot.failures.len(), FAILURE_RING);
        assert_eq!(snapshot.failures[0].name, "mod-3.jar");
        assert_eq!(snapshot.failures[4].name, "mod-7.jar");
    }

    #[test]
    fn in_queue_is_total_minus_processed() {
        let progress = Progress::new(JobId::Sync(1));
        progress.set_total(10);
        progress.success();
        progress.success();
        progress.fail("x.jar", "err");
        let snapshot = progress.snapshot();
        assert_eq!(snapshot.in_queue, 7);
        assert_eq!(snapshot.succeeded, 2);
        assert_eq!(snapshot.failed, 1);
    }

    #[tokio::test]
    async fn signals_coalesce_instead_of_queueing() {
        let progress = Progress::new(JobId::Sync(1));
        let mut rx = progress.subscribe();
        for _ in 0..20 {
            progress.success();
        }
        // One pending signal at most; the snapshot carries the state.
        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
        assert_eq!(progress.snapshot().processed, 20);
    }

    #[tokio::test]
    async fn completion_unblocks_on_terminal_status() {
        let progress = Progress::new(JobId::Sync(9));
        let waiter = {
            let progress = Arc::clone(&progress);
            tokio::spawn(async move { progress.wait_terminal().await })
        };
        progress.set_status(JobStatus::Running);
        assert!(!progress.is_done());
        progress.set_status(JobStatus::Canceled);
        waiter.await.unwrap();
        assert!(progress.is_done());
    }

    #[test]
    fn event_log_replays_for_late_subscribers() {
        let progress = Progress::new(JobId::Update(3));
        progress.push_event("state", serde_json::json!({"state": "running"}));
        progress.push_event("state", serde_json::json!({"state": "uploading_new"}));
        let (events, cursor) = progress.events_since(0);
        assert_eq!(events.len(), 2);
        let (rest, _) = progress.events_since(cursor);
        assert!(rest.is_empty());
    }
}
