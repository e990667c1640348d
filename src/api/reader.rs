use actix_web::{HttpResponse, Responder, web};
use tracing::instrument;

use crate::api::error::ApiResult;
use crate::reader::ingest::LastUid;
use crate::service::attendance::AttendanceService;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/reader/last-uid").route(web::get().to(last_uid)));
}

/// Last card seen by the reader, with the enrollment it belongs to
#[utoipa::path(
    get,
    path = "/api/reader/last-uid",
    responses(
        (status = 200, description = "Last scanned card", body = Identification, example = json!({
            "has_uid": true,
            "registered": true,
            "uid": "04A1B2C3",
            "enrollment_id": 42,
            "student": "Lucia Martin",
            "course": "1 DAM",
            "group": "A"
        })),
        (status = 500, description = "Internal server error")
    ),
    tag = "Reader"
)]
#[instrument(skip_all)]
pub async fn last_uid(
    last: web::Data<LastUid>,
    service: web::Data<AttendanceService>,
) -> ApiResult<impl Responder> {
    let identification = last.identify(service.resolver(), service.today()).await?;
    Ok(HttpResponse::Ok().json(identification))
}
