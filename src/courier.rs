use crate::mailer::{Letter, Mailer};
use crate::registry::JobRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::*;

pub const CANCELLED: &str = "delivery cancelled";

/// Percentage of `total` covered after `elapsed`, capped at 100.
pub fn progress_at(elapsed: Duration, total: Duration) -> f64 {
    if total.is_zero() {
        return 100.0;
    }
    (elapsed.as_secs_f64() / total.as_secs_f64() * 100.0).min(100.0)
}

/// Carries one letter from submission to delivery.
pub(crate) struct Courier {
    pub registry: JobRegistry,
    pub job_id: String,
    pub letter: Letter,
    pub mailer: Arc<dyn Mailer>,
    pub started: Instant,
    pub total: Duration,
    pub tick: Duration,
}

impl Courier {
    // Progress ticks and arrival are driven from the same start instant.
    pub(crate) async fn run(self, cancel_token: CancellationToken) {
        let mut ticker = time::interval_at(self.started + self.tick, self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let arrival = time::sleep_until(self.started + self.total);
        tokio::pin!(arrival);

        loop {
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    debug!("Courier cancelled");
                    self.registry.fail_job(&self.job_id, CANCELLED);
                    return;
                },
                _ = &mut arrival => break,
                _ = ticker.tick() => {
                    let progress = progress_at(self.started.elapsed(), self.total);
                    trace!(progress, "Courier progress");
                    self.registry.record_progress(&self.job_id, progress);
                }
            }
        }

        self.registry.record_progress(&self.job_id, 100.0);

        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                debug!("Courier cancelled at the door");
                self.registry.fail_job(&self.job_id, CANCELLED);
            },
            result = self.mailer.send(&self.letter) => match result {
                Ok(()) => {
                    info!(mailer = self.mailer.name(), to = %self.letter.to, "Letter delivered");
                    self.registry.complete_job(&self.job_id);
                },
                Err(err) => {
                    error!(message = "Failed to deliver letter", error = %err);
                    self.registry.fail_job(&self.job_id, err.to_string());
                }
            }
        }
    }
}
