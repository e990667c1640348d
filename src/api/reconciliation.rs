use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use tracing::{info, instrument};

use crate::service::reconciler::{DailyReconciler, ReconcileReport};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/reconciliation/{date}").route(web::post().to(run_reconciliation)));
}

/// Run the reconciliation for a date by hand
///
/// Closes records still open past that date's cutoff and creates the missing
/// FALTA/FESTIVO placeholders. Safe to repeat.
#[utoipa::path(
    post,
    path = "/api/reconciliation/{date}",
    params(("date" = String, Path, description = "Date (YYYY-MM-DD)")),
    responses(
        (status = 200, description = "Reconciliation report", body = ReconcileReport)
    ),
    tag = "Reconciliation"
)]
#[instrument(skip(reconciler))]
pub async fn run_reconciliation(
    reconciler: web::Data<DailyReconciler>,
    path: web::Path<NaiveDate>,
) -> impl Responder {
    let report = reconciler.run(path.into_inner()).await;
    info!(
        date = %report.date,
        closed = report.closed.closed,
        absences = report.generated.absences,
        "Manual reconciliation finished"
    );
    HttpResponse::Ok().json(report)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::{App, test};

    use super::*;
    use crate::service::reconciler::tests::fixture;
    use crate::utils::clock::FixedClock;

    #[actix_web::test]
    async fn manual_run_is_idempotent() {
        let f = fixture(FixedClock::instant(2024, 10, 3, 9, 0));
        let reconciler = Arc::new(f.reconciler);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::from(reconciler))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post().uri("/reconciliation/2024-10-02").to_request();
        let first: ReconcileReport = test::call_and_read_body_json(&app, req).await;
        assert_eq!(first.generated.absences, 3);

        let req = test::TestRequest::post().uri("/reconciliation/2024-10-02").to_request();
        let second: ReconcileReport = test::call_and_read_body_json(&app, req).await;
        assert_eq!(second.generated.absences, 0);
        assert_eq!(f.records.all().len(), 3);
    }
}
