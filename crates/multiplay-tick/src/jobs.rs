//! Cooperative job scheduler.
//!
//! Nothing here runs on its own. The owner calls [`JobScheduler::due`] once
//! per update with the current time and executes the returned job kinds
//! itself, so all session work stays on one thread in a predictable order.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::TickPolicy;

/// Handle for cancelling one scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct Job<K> {
    id: JobId,
    kind: K,
    next_at: Instant,
    /// `None` for one-shot jobs.
    period: Option<Duration>,
}

/// Periodic and one-shot jobs identified by a caller-defined kind.
#[derive(Debug, Clone)]
pub struct JobScheduler<K> {
    jobs: Vec<Job<K>>,
    next_id: u64,
    policy: TickPolicy,
}

impl<K> Default for JobScheduler<K> {
    fn default() -> Self {
        Self::new(TickPolicy::default())
    }
}

impl<K> JobScheduler<K> {
    pub fn new(policy: TickPolicy) -> Self {
        Self {
            jobs: Vec::new(),
            next_id: 0,
            policy,
        }
    }

    fn allocate_id(&mut self) -> JobId {
        self.next_id += 1;
        JobId(self.next_id)
    }

    pub fn cancel(&mut self, id: JobId) -> bool {
        let before = self.jobs.len();
        self.jobs.retain(|job| job.id != id);
        before != self.jobs.len()
    }

    pub fn cancel_all(&mut self) {
        self.jobs.clear();
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Earliest time any job is due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.jobs.iter().map(|job| job.next_at).min()
    }

    pub fn policy(&self) -> TickPolicy {
        self.policy
    }
}

impl<K: Copy + PartialEq + fmt::Debug> JobScheduler<K> {
    /// Runs `kind` every `period`, first at `start`.
    pub fn schedule_periodic(&mut self, kind: K, start: Instant, period: Duration) -> JobId {
        let id = self.allocate_id();
        let period = period.max(Duration::from_micros(1));
        debug!(%id, ?kind, ?period, "periodic job scheduled");
        self.jobs.push(Job {
            id,
            kind,
            next_at: start,
            period: Some(period),
        });
        id
    }

    /// Runs `kind` once at `at`.
    pub fn schedule_once(&mut self, kind: K, at: Instant) -> JobId {
        let id = self.allocate_id();
        debug!(%id, ?kind, "one-shot job scheduled");
        self.jobs.push(Job {
            id,
            kind,
            next_at: at,
            period: None,
        });
        id
    }

    /// Cancels every job of `kind`. Returns how many were removed.
    pub fn cancel_kind(&mut self, kind: K) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|job| job.kind != kind);
        before - self.jobs.len()
    }

    pub fn is_scheduled(&self, kind: K) -> bool {
        self.jobs.iter().any(|job| job.kind == kind)
    }

    /// Collects every run due at `now`, in deadline order.
    ///
    /// One-shot jobs run once and are removed. A periodic job that missed
    /// periods runs once under `Skip` and `Drop`, and once per missed
    /// period (capped) under `CatchUp`.
    pub fn due(&mut self, now: Instant) -> Vec<K> {
        let mut ready: Vec<(Instant, JobId, K, u32)> = Vec::new();
        let policy = self.policy;

        self.jobs.retain_mut(|job| {
            if job.next_at > now {
                return true;
            }
            let Some(period) = job.period else {
                ready.push((job.next_at, job.id, job.kind, 1));
                return false;
            };

            let late = now.saturating_duration_since(job.next_at);
            let missed = u32::try_from(late.as_nanos() / period.as_nanos()).unwrap_or(u32::MAX);
            let deadline = job.next_at;
            let runs = match policy {
                TickPolicy::Skip => {
                    job.next_at = now + period;
                    1
                }
                TickPolicy::Drop => {
                    job.next_at += period * missed.saturating_add(1);
                    1
                }
                TickPolicy::CatchUp { max_catchup } => {
                    job.next_at += period * missed.saturating_add(1);
                    1 + missed.min(max_catchup)
                }
            };
            if missed > 0 {
                warn!(id = %job.id, kind = ?job.kind, missed, runs, ?policy, "job fell behind");
            }
            ready.push((deadline, job.id, job.kind, runs));
            true
        });

        ready.sort_by_key(|(at, id, _, _)| (*at, *id));
        ready
            .into_iter()
            .flat_map(|(_, _, kind, runs)| std::iter::repeat_n(kind, runs as usize))
            .collect()
    }
}
