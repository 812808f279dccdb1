use crate::courier::{self, Courier};
use crate::mailer::{Letter, Mailer};
use crate::{JobRequest, Status, TransportMode};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

/// Longest transit accepted: one century of walking.
pub const MAX_DELIVERY: Duration = Duration::from_secs(100 * 365 * 86_400);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailJob {
    pub id: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub message: String,
    pub transport_mode: TransportMode,
    pub delivery_time_seconds: f64,
    pub start_time: DateTime<Utc>,
    pub status: Status,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// A job as seen by a poller, with timings computed at query time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub id: String,
    pub status: Status,
    pub progress: f64,
    pub transport_mode: TransportMode,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub elapsed_seconds: u64,
    pub remaining_seconds: u64,
    pub total_delivery_seconds: u64,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct Entry {
    job: EmailJob,
    started: Instant,
    finished: Option<Instant>,
    total: Duration,
    cancel: CancellationToken,
    courier: Option<JoinHandle<()>>,
}

impl Entry {
    fn snapshot(&self, now: Instant) -> JobSnapshot {
        let until = self.finished.unwrap_or(now);
        // Whole seconds, rounded up so a fractional last second still counts
        // as remaining.
        let total_secs = self.total.as_secs_f64().ceil() as u64;
        let elapsed_secs = until
            .saturating_duration_since(self.started)
            .min(self.total)
            .as_secs();
        let remaining_secs = if self.job.status.is_terminal() {
            0
        } else {
            total_secs - elapsed_secs
        };

        JobSnapshot {
            id: self.job.id.clone(),
            status: self.job.status,
            progress: self.job.progress,
            transport_mode: self.job.transport_mode,
            from: self.job.from.clone(),
            to: self.job.to.clone(),
            subject: self.job.subject.clone(),
            elapsed_seconds: elapsed_secs,
            remaining_seconds: remaining_secs,
            total_delivery_seconds: total_secs,
            start_time: self.job.start_time,
            completed_at: self.job.completed_at,
            error: self.job.error.clone(),
        }
    }

    /// Moves an in-transit job to a terminal status. Returns false if the job
    /// already finished.
    fn finish(&mut self, status: Status, error: Option<String>) -> bool {
        if self.job.status.is_terminal() {
            return false;
        }
        self.job.status = status;
        self.job.error = error;
        self.job.completed_at = Some(Utc::now());
        self.finished = Some(Instant::now());
        true
    }
}

struct Inner {
    jobs: Mutex<HashMap<String, Entry>>,
    mailer: Arc<dyn Mailer>,
    tick: Duration,
    shutdown: CancellationToken,
}

/// In-memory record of every letter sent during the life of the process.
#[derive(Clone)]
pub struct JobRegistry {
    inner: Arc<Inner>,
}

impl JobRegistry {
    pub fn new(mailer: Arc<dyn Mailer>, tick: Duration) -> Self {
        JobRegistry {
            inner: Arc::new(Inner {
                jobs: Mutex::new(HashMap::new()),
                mailer,
                tick: tick.max(Duration::from_millis(1)),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.inner
            .jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a new in-transit job and dispatches its courier.
    pub fn submit(&self, request: JobRequest) -> EmailJob {
        let id = Uuid::new_v4().to_string();
        let total = Duration::try_from_secs_f64(request.delivery_time_seconds)
            .unwrap_or(Duration::ZERO)
            .min(MAX_DELIVERY);

        let job = EmailJob {
            id: id.clone(),
            from: request.from,
            to: request.to,
            subject: request.subject,
            message: request.message,
            transport_mode: request.transport_mode,
            delivery_time_seconds: total.as_secs_f64(),
            start_time: Utc::now(),
            status: Status::InTransit,
            progress: 0.0,
            error: None,
            completed_at: None,
        };

        let started = Instant::now();
        let cancel = self.inner.shutdown.child_token();
        self.jobs().insert(
            id.clone(),
            Entry {
                job: job.clone(),
                started,
                finished: None,
                total,
                cancel: cancel.clone(),
                courier: None,
            },
        );

        let courier = Courier {
            registry: self.clone(),
            job_id: id.clone(),
            letter: Letter::for_job(&job),
            mailer: self.inner.mailer.clone(),
            started,
            total,
            tick: self.inner.tick,
        };
        let handle = tokio::spawn(
            courier
                .run(cancel)
                .instrument(info_span!("courier", job_id = %id)),
        );
        if let Some(entry) = self.jobs().get_mut(&id) {
            entry.courier = Some(handle);
        }

        info!(
            job_id = %id,
            mode = %job.transport_mode,
            seconds = job.delivery_time_seconds,
            "Letter in transit"
        );
        job
    }

    pub fn get(&self, id: &str) -> Option<JobSnapshot> {
        let now = Instant::now();
        self.jobs().get(id).map(|entry| entry.snapshot(now))
    }

    /// Every job held, oldest first.
    pub fn list(&self) -> Vec<JobSnapshot> {
        let now = Instant::now();
        let mut jobs: Vec<_> = self
            .jobs()
            .values()
            .map(|entry| entry.snapshot(now))
            .collect();
        jobs.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));
        jobs
    }

    /// Stops an in-transit job, recording it as failed. Returns false for
    /// unknown or already finished jobs.
    pub fn cancel(&self, id: &str) -> bool {
        let mut jobs = self.jobs();
        let Some(entry) = jobs.get_mut(id) else {
            return false;
        };
        if !entry.finish(Status::Failed, Some(courier::CANCELLED.to_string())) {
            return false;
        }
        entry.cancel.cancel();
        info!(job_id = %id, "Letter cancelled");
        true
    }

    pub(crate) fn record_progress(&self, id: &str, progress: f64) {
        if let Some(entry) = self.jobs().get_mut(id) {
            if !entry.job.status.is_terminal() {
                entry.job.progress = entry.job.progress.max(progress.min(100.0));
            }
        }
    }

    pub(crate) fn complete_job(&self, id: &str) {
        if let Some(entry) = self.jobs().get_mut(id) {
            if entry.job.status.is_terminal() {
                return;
            }
            entry.job.progress = 100.0;
            if entry.finish(Status::Delivered, None) {
                debug!(job_id = %id, "Job delivered");
            }
        }
    }

    pub(crate) fn fail_job(&self, id: &str, error: impl Into<String>) {
        if let Some(entry) = self.jobs().get_mut(id) {
            let error = error.into();
            if entry.finish(Status::Failed, Some(error.clone())) {
                debug!(job_id = %id, %error, "Job failed");
            }
        }
    }

    /// Cancels every courier still in flight and waits for all of them.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();

        let couriers: Vec<_> = self
            .jobs()
            .values_mut()
            .filter_map(|entry| entry.courier.take())
            .collect();
        let count = couriers.len();

        for result in futures::future::join_all(couriers).await {
            if let Err(err) = result {
                error!(message = "Courier task failed", error = ?err);
            }
        }

        info!(couriers = count, "Job registry drained");
    }
}
