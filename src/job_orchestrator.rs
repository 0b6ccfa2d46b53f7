//! # Job Orchestrator Module
//!
//! Tracks generation jobs per fingerprint and enforces single-flight: while
//! a job for a fingerprint is `Pending` or `Processing`, further requests
//! attach to it instead of starting another one.
//!
//! # State Machine
//!
//! `Pending -> Processing -> {Completed, Failed}`
//!
//! - Every started job draws a fresh generation token. A forced start
//!   supersedes the live job; when the superseded job finishes its token
//!   no longer matches and its result is discarded.
//! - A terminal job stays queryable for `history_retention`, then its slot
//!   is reclaimed. Reclamation runs lazily on every table access and from
//!   an optional background reaper.
//! - Each fingerprint has a `watch` channel carrying the latest job
//!   snapshot, so callers can await completion with a deadline.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::generation_config::JobConfig;
use crate::shopping_list::ShoppingList;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_live(&self) -> bool {
        matches!(self, JobState::Pending | JobState::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_live()
    }
}

/// Snapshot of one generation job
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub fingerprint: String,
    pub state: JobState,
    pub generation_token: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Arc<ShoppingList>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    fn new(fingerprint: &str, generation_token: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            fingerprint: fingerprint.to_string(),
            state: JobState::Pending,
            generation_token,
            result: None,
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// Handle on a job a caller started or attached to
#[derive(Debug, Clone)]
pub struct JobTicket {
    pub job_id: Uuid,
    pub fingerprint: String,
    pub generation_token: u64,
    receiver: watch::Receiver<Job>,
}

impl JobTicket {
    /// Wait until the fingerprint's latest job is terminal, or `deadline` passes.
    ///
    /// A superseding job replaces the snapshot on the same channel, so a
    /// caller attached to a superseded job ends up with the newer result.
    /// Returns `None` on deadline or when the job slot was dropped.
    pub async fn wait(&mut self, deadline: Duration) -> Option<Job> {
        let waited = tokio::time::timeout(
            deadline,
            self.receiver.wait_for(|job| job.state.is_terminal()),
        )
        .await;
        match waited {
            Ok(Ok(job)) => Some(job.clone()),
            _ => None,
        }
    }

    /// Latest snapshot without waiting
    pub fn current(&self) -> Job {
        self.receiver.borrow().clone()
    }
}

/// Outcome of asking to run a job for a fingerprint
#[derive(Debug)]
pub enum Admission {
    /// A new job was created; the caller must drive it to a terminal state
    Started(JobTicket),
    /// A live job already existed; the caller only observes it
    Attached(JobTicket),
}

impl Admission {
    pub fn ticket(&self) -> &JobTicket {
        match self {
            Admission::Started(ticket) | Admission::Attached(ticket) => ticket,
        }
    }

    pub fn into_ticket(self) -> JobTicket {
        match self {
            Admission::Started(ticket) | Admission::Attached(ticket) => ticket,
        }
    }
}

struct Slot {
    job: Job,
    finished: Option<Instant>,
    sender: watch::Sender<Job>,
}

impl Slot {
    fn publish(&mut self) {
        self.sender.send_replace(self.job.clone());
    }
}

/// Counters exposed by [`JobOrchestrator::stats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobStats {
    pub live: usize,
    pub history: usize,
    pub started: u64,
    pub attached: u64,
    pub discarded: u64,
}

pub struct JobOrchestrator {
    slots: Mutex<HashMap<String, Slot>>,
    next_token: AtomicU64,
    started: AtomicU64,
    attached: AtomicU64,
    discarded: AtomicU64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    reaper: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
    config: JobConfig,
}

impl JobOrchestrator {
    pub fn new(config: JobConfig) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
            started: AtomicU64::new(0),
            attached: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
            tasks: Mutex::new(Vec::new()),
            reaper: Mutex::new(None),
            shut_down: AtomicBool::new(false),
            config,
        }
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Lock the table, reclaiming expired history on the way in
    fn table(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        reclaim_expired(&mut slots, self.config.history_retention());
        slots
    }

    /// Start a job for `fingerprint`, or attach to the live one.
    ///
    /// With `force`, a new job is started even when one is live; the live
    /// job is superseded.
    pub fn admit(&self, fingerprint: &str, force: bool) -> Admission {
        let mut slots = self.table();

        if let Some(slot) = slots.get(fingerprint) {
            if slot.job.state.is_live() && !force {
                self.attached.fetch_add(1, Ordering::Relaxed);
                debug!(fingerprint, token = slot.job.generation_token, "Attached to in-flight job");
                return Admission::Attached(JobTicket {
                    job_id: slot.job.id,
                    fingerprint: fingerprint.to_string(),
                    generation_token: slot.job.generation_token,
                    receiver: slot.sender.subscribe(),
                });
            }
        }

        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        let job = Job::new(fingerprint, token);
        let ticket_id = job.id;

        let receiver = match slots.get_mut(fingerprint) {
            Some(slot) => {
                if slot.job.state.is_live() {
                    info!(
                        fingerprint,
                        superseded = slot.job.generation_token,
                        token,
                        "Superseding in-flight job"
                    );
                }
                slot.job = job;
                slot.finished = None;
                slot.publish();
                slot.sender.subscribe()
            }
            None => {
                let (sender, receiver) = watch::channel(job.clone());
                slots.insert(
                    fingerprint.to_string(),
                    Slot {
                        job,
                        finished: None,
                        sender,
                    },
                );
                receiver
            }
        };

        self.started.fetch_add(1, Ordering::Relaxed);
        info!(fingerprint, token, job_id = %ticket_id, "Started generation job");
        Admission::Started(JobTicket {
            job_id: ticket_id,
            fingerprint: fingerprint.to_string(),
            generation_token: token,
            receiver,
        })
    }

    /// Whether `token` is still the current token for `fingerprint`
    pub fn is_current(&self, fingerprint: &str, token: u64) -> bool {
        self.table()
            .get(fingerprint)
            .is_some_and(|slot| slot.job.generation_token == token)
    }

    /// `Pending -> Processing`. Returns false for a stale token.
    pub fn mark_processing(&self, fingerprint: &str, token: u64) -> bool {
        self.transition(fingerprint, token, |job| {
            if job.state == JobState::Pending {
                job.state = JobState::Processing;
            }
        })
    }

    /// `-> Completed` with `result`. Returns false when the job was
    /// superseded or cancelled, in which case the result must be discarded.
    pub fn complete(&self, fingerprint: &str, token: u64, result: Arc<ShoppingList>) -> bool {
        self.transition(fingerprint, token, |job| {
            job.state = JobState::Completed;
            job.result = Some(result);
            job.finished_at = Some(Utc::now());
        })
    }

    /// `-> Failed` with an error and the fallback list pollers still receive
    pub fn fail(
        &self,
        fingerprint: &str,
        token: u64,
        error: String,
        fallback: Option<Arc<ShoppingList>>,
    ) -> bool {
        self.transition(fingerprint, token, |job| {
            job.state = JobState::Failed;
            job.error = Some(error);
            job.result = fallback;
            job.finished_at = Some(Utc::now());
        })
    }

    fn transition(&self, fingerprint: &str, token: u64, apply: impl FnOnce(&mut Job)) -> bool {
        let mut slots = self.table();
        let Some(slot) = slots
            .get_mut(fingerprint)
            .filter(|slot| slot.job.generation_token == token && slot.job.state.is_live())
        else {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            debug!(fingerprint, token, "Discarding transition for stale job");
            return false;
        };

        apply(&mut slot.job);
        if slot.job.state.is_terminal() {
            slot.finished = Some(Instant::now());
            info!(fingerprint, token, state = ?slot.job.state, "Job finished");
        }
        slot.publish();
        true
    }

    /// Latest job for a fingerprint, live or in history
    pub fn status(&self, fingerprint: &str) -> Option<Job> {
        self.table().get(fingerprint).map(|slot| slot.job.clone())
    }

    /// Subscribe to the fingerprint's job, if any
    pub fn watch(&self, fingerprint: &str) -> Option<JobTicket> {
        self.table().get(fingerprint).map(|slot| JobTicket {
            job_id: slot.job.id,
            fingerprint: fingerprint.to_string(),
            generation_token: slot.job.generation_token,
            receiver: slot.sender.subscribe(),
        })
    }

    /// Drop the job for a fingerprint. An in-flight job keeps running but
    /// its result will be discarded. Idempotent.
    pub fn cancel(&self, fingerprint: &str) -> bool {
        match self.table().remove(fingerprint) {
            Some(slot) => {
                info!(
                    fingerprint,
                    token = slot.job.generation_token,
                    live = slot.job.state.is_live(),
                    "Cancelled job"
                );
                true
            }
            None => false,
        }
    }

    /// Reclaim expired history now. Returns how many slots went.
    pub fn reclaim(&self) -> usize {
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        reclaim_expired(&mut slots, self.config.history_retention())
    }

    /// Keep a job task so shutdown can abort it
    pub fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    /// Start a background task reclaiming history every `interval`
    pub fn spawn_reaper(self: &Arc<Self>, interval: Duration) {
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let Some(orchestrator) = weak.upgrade() else {
                    break;
                };
                let reclaimed = orchestrator.reclaim();
                if reclaimed > 0 {
                    debug!(reclaimed, "Reaper reclaimed job history");
                }
            }
        });

        let mut reaper = self.reaper.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = reaper.replace(handle) {
            previous.abort();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Abort job tasks and the reaper, fail every live job and clear the table
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(reaper) = self
            .reaper
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            reaper.abort();
        }

        let tasks: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .collect();
        for task in &tasks {
            task.abort();
        }

        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        for slot in slots.values_mut().filter(|slot| slot.job.state.is_live()) {
            slot.job.state = JobState::Failed;
            slot.job.error = Some("service shutting down".to_string());
            slot.job.finished_at = Some(Utc::now());
            slot.publish();
        }
        let cleared = slots.len();
        slots.clear();
        warn!(cleared, aborted = tasks.len(), "Job orchestrator shut down");
    }

    /// Snapshot of the table as it is; expired history is counted until
    /// something reclaims it
    pub fn stats(&self) -> JobStats {
        let slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let live = slots.values().filter(|slot| slot.job.state.is_live()).count();
        JobStats {
            live,
            history: slots.len() - live,
            started: self.started.load(Ordering::Relaxed),
            attached: self.attached.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

fn reclaim_expired(slots: &mut HashMap<String, Slot>, retention: Duration) -> usize {
    let before = slots.len();
    slots.retain(|_, slot| match slot.finished {
        Some(finished) => finished.elapsed() <= retention,
        None => true,
    });
    before - slots.len()
}

impl std::fmt::Debug for JobOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobOrchestrator")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Drop for JobOrchestrator {
    fn drop(&mut self) {
        if let Some(reaper) = self
            .reaper
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            reaper.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shopping_list::ListAdvice;

    fn orchestrator() -> JobOrchestrator {
        JobOrchestrator::new(JobConfig::default())
    }

    fn list(fp: &str) -> Arc<ShoppingList> {
        Arc::new(ShoppingList::assemble(Vec::new(), ListAdvice::default(), fp))
    }

    #[test]
    fn test_single_flight_attach() {
        let jobs = orchestrator();

        let first = jobs.admit("fp", false);
        let second = jobs.admit("fp", false);

        assert!(matches!(first, Admission::Started(_)));
        assert!(matches!(second, Admission::Attached(_)));
        assert_eq!(first.ticket().job_id, second.ticket().job_id);
        assert_eq!(jobs.stats().live, 1);
    }

    #[test]
    fn test_state_transitions() {
        let jobs = orchestrator();
        let token = jobs.admit("fp", false).ticket().generation_token;

        assert_eq!(jobs.status("fp").unwrap().state, JobState::Pending);
        assert!(jobs.mark_processing("fp", token));
        assert_eq!(jobs.status("fp").unwrap().state, JobState::Processing);
        assert!(jobs.complete("fp", token, list("fp")));

        let job = jobs.status("fp").unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert!(job.result.is_some());
        assert!(job.finished_at.is_some());

        // Terminal jobs do not transition again
        assert!(!jobs.fail("fp", token, "late".to_string(), None));
    }

    #[test]
    fn test_forced_start_supersedes() {
        let jobs = orchestrator();
        let old = jobs.admit("fp", false).ticket().generation_token;
        let new = jobs.admit("fp", true).ticket().generation_token;

        assert!(new > old);
        assert!(!jobs.is_current("fp", old));
        assert!(!jobs.complete("fp", old, list("fp")));
        assert_eq!(jobs.status("fp").unwrap().state, JobState::Pending);
        assert!(jobs.complete("fp", new, list("fp")));
        assert_eq!(jobs.stats().discarded, 1);
    }

    #[test]
    fn test_terminal_job_allows_new_start() {
        let jobs = orchestrator();
        let token = jobs.admit("fp", false).ticket().generation_token;
        jobs.complete("fp", token, list("fp"));

        assert!(matches!(jobs.admit("fp", false), Admission::Started(_)));
    }

    #[test]
    fn test_cancel_discards_in_flight_result() {
        let jobs = orchestrator();
        let token = jobs.admit("fp", false).ticket().generation_token;

        assert!(jobs.cancel("fp"));
        assert!(!jobs.cancel("fp"));
        assert!(!jobs.complete("fp", token, list("fp")));
        assert!(jobs.status("fp").is_none());
    }

    #[test]
    fn test_history_is_reclaimed_after_retention() {
        let jobs = JobOrchestrator::new(JobConfig {
            history_retention_secs: 0,
            ..Default::default()
        });
        let token = jobs.admit("fp", false).ticket().generation_token;
        jobs.complete("fp", token, list("fp"));

        std::thread::sleep(Duration::from_millis(5));
        assert!(jobs.status("fp").is_none());
    }

    #[tokio::test]
    async fn test_wait_sees_completion() {
        let jobs = Arc::new(orchestrator());
        let mut ticket = jobs.admit("fp", false).into_ticket();
        let token = ticket.generation_token;

        let worker = Arc::clone(&jobs);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            worker.complete("fp", token, list("fp"));
        });

        let job = ticket.wait(Duration::from_secs(2)).await.unwrap();
        assert_eq!(job.state, JobState::Completed);
    }

    #[tokio::test]
    async fn test_wait_deadline() {
        let jobs = orchestrator();
        let mut ticket = jobs.admit("fp", false).into_ticket();
        assert!(ticket.wait(Duration::from_millis(20)).await.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_fails_live_jobs() {
        let jobs = Arc::new(orchestrator());
        jobs.spawn_reaper(Duration::from_millis(10));
        let mut ticket = jobs.admit("fp", false).into_ticket();

        jobs.shutdown();

        assert!(jobs.is_shut_down());
        assert!(jobs.status("fp").is_none());
        let job = ticket.current();
        assert_eq!(job.state, JobState::Failed);
        assert!(ticket.wait(Duration::from_millis(10)).await.is_some());
    }
}
