use actix_web::{HttpResponse, Responder, web};
use tracing::instrument;

use crate::api::error::ApiResult;
use crate::model::holiday::Holiday;
use crate::store::HolidayStore;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/holidays").route(web::get().to(list_holidays)));
}

/// Stored holidays, oldest first
#[utoipa::path(
    get,
    path = "/api/holidays",
    responses(
        (status = 200, description = "Holiday list", body = [Holiday]),
        (status = 500, description = "Internal server error")
    ),
    tag = "Holidays"
)]
#[instrument(skip_all)]
pub async fn list_holidays(store: web::Data<dyn HolidayStore>) -> ApiResult<impl Responder> {
    let holidays = store.find_all().await?;
    Ok(HttpResponse::Ok().json(holidays))
}
