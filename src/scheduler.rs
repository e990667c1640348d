//! Fixed-time daily trigger for the reconciler.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Days, NaiveDateTime, NaiveTime};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::service::reconciler::{AbsenceReport, DailyReconciler, ReconcileReport};
use crate::utils::shutdown::Shutdown;

/// First instant strictly after `now` whose wall-clock time is `at`.
pub fn next_run_after(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(at);
    if today > now {
        return today;
    }
    now.date()
        .checked_add_days(Days::new(1))
        .map(|d| d.and_time(at))
        .unwrap_or(today)
}

#[derive(Debug)]
pub struct DailyPass {
    pub yesterday: Option<ReconcileReport>,
    pub today: AbsenceReport,
}

pub struct DailyScheduler {
    reconciler: Arc<DailyReconciler>,
    at: NaiveTime,
    holidays_file: PathBuf,
    vacations_file: PathBuf,
}

impl DailyScheduler {
    pub fn new(
        reconciler: Arc<DailyReconciler>,
        at: NaiveTime,
        holidays_file: PathBuf,
        vacations_file: PathBuf,
    ) -> Self {
        Self {
            reconciler,
            at,
            holidays_file,
            vacations_file,
        }
    }

    pub fn spawn(self, shutdown: Shutdown) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// Sleeps until the next trigger time, runs a pass, repeats until shutdown.
    pub async fn run(&self, shutdown: Shutdown) {
        info!(at = %self.at, "Daily reconciliation scheduled");
        loop {
            let now = self.reconciler.now();
            let next = next_run_after(now, self.at);
            let wait = (next - now).to_std().unwrap_or_default();

            tokio::select! {
                _ = shutdown.triggered() => {
                    info!("Daily scheduler stopping");
                    break;
                }
                _ = tokio::time::sleep(wait) => {
                    self.run_pass().await;
                }
            }
        }
    }

    /// Reloads the calendar, reconciles yesterday and back-fills today.
    pub async fn run_pass(&self) -> DailyPass {
        self.reconciler
            .calendar()
            .refresh(&self.holidays_file, &self.vacations_file)
            .await;

        let today = self.reconciler.now().date();
        let yesterday = match today.pred_opt() {
            Some(date) => Some(self.reconciler.run(date).await),
            None => None,
        };

        let generated = self.reconciler.generate_absences(today).await.unwrap_or_else(|e| {
            warn!(%today, error = %e, "Generating today's placeholders failed");
            AbsenceReport {
                failed: 1,
                ..Default::default()
            }
        });

        info!(%today, "Daily reconciliation pass finished");
        DailyPass {
            yesterday,
            today: generated,
        }
    }
}
