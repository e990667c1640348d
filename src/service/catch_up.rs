use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::service::reconciler::{AbsenceReport, CloseReport, DailyReconciler};

#[derive(Debug, Default, Serialize)]
pub struct CatchUpReport {
    pub generated: AbsenceReport,
    pub closed: CloseReport,
}

/// Boot-time repair, run once before the reader starts delivering scans.
///
/// Reloads the calendar, back-fills today's placeholders and closes every
/// open record whose cutoff passed while the process was down.
pub async fn run_startup_catch_up(
    reconciler: &DailyReconciler,
    holidays_file: &Path,
    vacations_file: &Path,
) -> CatchUpReport {
    reconciler.calendar().refresh(holidays_file, vacations_file).await;

    let today = reconciler.now().date();
    let generated = reconciler.generate_absences(today).await.unwrap_or_else(|e| {
        warn!(%today, error = %e, "Startup absence generation failed");
        AbsenceReport {
            failed: 1,
            ..Default::default()
        }
    });

    let closed = reconciler.close_overdue().await.unwrap_or_else(|e| {
        warn!(error = %e, "Startup close-out failed");
        CloseReport { closed: 0, failed: 1 }
    });

    info!(
        %today,
        absences = generated.absences,
        holidays = generated.holidays,
        closed = closed.closed,
        "Startup catch-up finished"
    );
    CatchUpReport { generated, closed }
}
