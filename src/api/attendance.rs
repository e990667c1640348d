use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::model::attendance::{AttendanceRecord, AttendanceStatus};
use crate::model::school_year::SchoolYear;
use crate::service::attendance::{AttendanceService, Correction};
use crate::service::reconciler::DailyReconciler;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RangeQuery {
    #[schema(example = "2024-09-01", format = "date", value_type = String)]
    pub from: NaiveDate,
    #[schema(example = "2024-10-31", format = "date", value_type = String)]
    pub to: NaiveDate,
}

impl RangeQuery {
    fn checked(&self) -> ApiResult<(NaiveDate, NaiveDate)> {
        if self.from > self.to {
            return Err(ApiError::BadRequest(format!(
                "'from' ({}) is after 'to' ({})",
                self.from, self.to
            )));
        }
        Ok((self.from, self.to))
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SchoolYearQuery {
    #[schema(example = "2024-2025")]
    pub school_year: String,
    #[schema(example = "FALTA")]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GroupQuery {
    #[schema(example = "1 DAM")]
    pub course: String,
    #[schema(example = "A")]
    pub group: String,
    /// Defaults to today
    #[schema(example = "2024-10-02", format = "date", value_type = Option<String>)]
    pub date: Option<NaiveDate>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/attendance")
            .service(web::resource("").route(web::get().to(all_records)))
            .service(web::resource("/group").route(web::get().to(records_for_group)))
            .service(web::resource("/entry/{enrollment_id}").route(web::post().to(register_entry)))
            .service(web::resource("/exit/{enrollment_id}").route(web::put().to(register_exit)))
            .service(web::resource("/record/{id}").route(web::put().to(correct_record)))
            .service(web::resource("/date/{date}").route(web::get().to(records_on_date)))
            .service(web::resource("/range/{enrollment_id}").route(web::get().to(records_in_range)))
            .service(web::resource("/counts/{enrollment_id}").route(web::get().to(status_counts)))
            .service(
                web::resource("/school-year/{enrollment_id}")
                    .route(web::get().to(records_for_school_year)),
            )
            // keep last: it would shadow the literal prefixes above
            .service(web::resource("/{enrollment_id}/{date}").route(web::get().to(get_record))),
    );
}

/// Register today's entry
#[utoipa::path(
    post,
    path = "/api/attendance/entry/{enrollment_id}",
    params(("enrollment_id" = u64, Path, description = "Enrollment id")),
    responses(
        (status = 200, description = "Entry registered", body = Object, example = json!({
            "message": "Entry registered",
            "data": {"id": 1, "enrollment_id": 42, "date": "2024-10-02", "entry_at": "2024-10-02T08:58:12", "exit_at": null, "status": "PRESENTE"}
        })),
        (status = 404, description = "No active enrollment"),
        (status = 409, description = "Entry already registered today", body = Object, example = json!({
            "message": "enrollment 42 already has an entry on 2024-10-02",
            "code": "ALREADY_REGISTERED_TODAY"
        })),
        (status = 500, description = "Internal server error")
    ),
    tag = "Attendance"
)]
#[instrument(skip(service))]
pub async fn register_entry(
    service: web::Data<AttendanceService>,
    path: web::Path<u64>,
) -> ApiResult<impl Responder> {
    let record = service.register_entry(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "message": "Entry registered",
        "data": record
    })))
}

/// Register today's exit
#[utoipa::path(
    put,
    path = "/api/attendance/exit/{enrollment_id}",
    params(("enrollment_id" = u64, Path, description = "Enrollment id")),
    responses(
        (status = 200, description = "Exit registered", body = Object, example = json!({
            "message": "Exit registered",
            "data": {"id": 1, "enrollment_id": 42, "date": "2024-10-02", "entry_at": "2024-10-02T08:58:12", "exit_at": "2024-10-02T14:31:00", "status": "COMPLETA"}
        })),
        (status = 400, description = "No entry registered today", body = Object, example = json!({
            "message": "enrollment 42 has no entry on 2024-10-02",
            "code": "NO_ENTRY_TODAY"
        })),
        (status = 404, description = "No active enrollment"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Attendance"
)]
#[instrument(skip(service))]
pub async fn register_exit(
    service: web::Data<AttendanceService>,
    path: web::Path<u64>,
) -> ApiResult<impl Responder> {
    let record = service.register_exit(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "message": "Exit registered",
        "data": record
    })))
}

/// Attendance record of an enrollment on a date
#[utoipa::path(
    get,
    path = "/api/attendance/{enrollment_id}/{date}",
    params(
        ("enrollment_id" = u64, Path, description = "Enrollment id"),
        ("date" = String, Path, description = "Date (YYYY-MM-DD)")
    ),
    responses(
        (status = 200, description = "Attendance record", body = AttendanceRecord),
        (status = 404, description = "No record for that day")
    ),
    tag = "Attendance"
)]
#[instrument(skip(service))]
pub async fn get_record(
    service: web::Data<AttendanceService>,
    path: web::Path<(u64, NaiveDate)>,
) -> ApiResult<impl Responder> {
    let (enrollment_id, date) = path.into_inner();
    match service.get_record(enrollment_id, date).await? {
        Some(record) => Ok(HttpResponse::Ok().json(record)),
        None => Ok(HttpResponse::NotFound().json(json!({
            "message": format!("no attendance for enrollment {enrollment_id} on {date}"),
            "code": "RECORD_NOT_FOUND"
        }))),
    }
}

/// Manually correct a record's times
///
/// The status is recomputed from the submitted times.
#[utoipa::path(
    put,
    path = "/api/attendance/record/{id}",
    params(("id" = u64, Path, description = "Attendance record id")),
    request_body = Correction,
    responses(
        (status = 200, description = "Record corrected", body = AttendanceRecord),
        (status = 400, description = "Exit before entry, or exit without entry"),
        (status = 404, description = "Record not found")
    ),
    tag = "Attendance"
)]
#[instrument(skip(service, payload))]
pub async fn correct_record(
    service: web::Data<AttendanceService>,
    path: web::Path<u64>,
    payload: web::Json<Correction>,
) -> ApiResult<impl Responder> {
    let record = service
        .correct_record(path.into_inner(), payload.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(record))
}

/// All records of a date
#[utoipa::path(
    get,
    path = "/api/attendance/date/{date}",
    params(("date" = String, Path, description = "Date (YYYY-MM-DD)")),
    responses((status = 200, description = "Records of the day", body = [AttendanceRecord])),
    tag = "Attendance"
)]
#[instrument(skip(service))]
pub async fn records_on_date(
    service: web::Data<AttendanceService>,
    path: web::Path<NaiveDate>,
) -> ApiResult<impl Responder> {
    let records = service.records_on_date(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(records))
}

/// Every attendance record
#[utoipa::path(
    get,
    path = "/api/attendance",
    responses((status = 200, description = "All records, by date", body = [AttendanceRecord])),
    tag = "Attendance"
)]
#[instrument(skip(service))]
pub async fn all_records(service: web::Data<AttendanceService>) -> ApiResult<impl Responder> {
    let records = service.all_records().await?;
    Ok(HttpResponse::Ok().json(records))
}

/// Attendance of a course and group on a date
///
/// Listing today also creates the missing FALTA (or FESTIVO) rows of the group.
#[utoipa::path(
    get,
    path = "/api/attendance/group",
    params(
        ("course" = String, Query, description = "Course name"),
        ("group" = String, Query, description = "Group name"),
        ("date" = Option<String>, Query, description = "Date (YYYY-MM-DD), today if omitted")
    ),
    responses(
        (status = 200, description = "Records of the group's active enrollments", body = [AttendanceRecord]),
        (status = 500, description = "Internal server error")
    ),
    tag = "Attendance"
)]
#[instrument(skip(reconciler))]
pub async fn records_for_group(
    reconciler: web::Data<DailyReconciler>,
    query: web::Query<GroupQuery>,
) -> ApiResult<impl Responder> {
    let GroupQuery {
        course,
        group,
        date,
    } = query.into_inner();
    let date = date.unwrap_or_else(|| reconciler.now().date());
    let records = reconciler.records_for_group(&course, &group, date).await?;
    Ok(HttpResponse::Ok().json(records))
}

/// Records of an enrollment between two dates (inclusive)
#[utoipa::path(
    get,
    path = "/api/attendance/range/{enrollment_id}",
    params(
        ("enrollment_id" = u64, Path, description = "Enrollment id"),
        ("from" = String, Query, description = "First day (YYYY-MM-DD)"),
        ("to" = String, Query, description = "Last day (YYYY-MM-DD)")
    ),
    responses(
        (status = 200, description = "Records in range", body = [AttendanceRecord]),
        (status = 400, description = "Invalid range")
    ),
    tag = "Attendance"
)]
#[instrument(skip(service))]
pub async fn records_in_range(
    service: web::Data<AttendanceService>,
    path: web::Path<u64>,
    query: web::Query<RangeQuery>,
) -> ApiResult<impl Responder> {
    let (from, to) = query.checked()?;
    let records = service.records_in_range(path.into_inner(), from, to).await?;
    Ok(HttpResponse::Ok().json(records))
}

/// Days per status for an enrollment between two dates
#[utoipa::path(
    get,
    path = "/api/attendance/counts/{enrollment_id}",
    params(
        ("enrollment_id" = u64, Path, description = "Enrollment id"),
        ("from" = String, Query, description = "First day (YYYY-MM-DD)"),
        ("to" = String, Query, description = "Last day (YYYY-MM-DD)")
    ),
    responses(
        (status = 200, description = "Count per status, zeros included", body = [StatusCount]),
        (status = 400, description = "Invalid range")
    ),
    tag = "Attendance"
)]
#[instrument(skip(service))]
pub async fn status_counts(
    service: web::Data<AttendanceService>,
    path: web::Path<u64>,
    query: web::Query<RangeQuery>,
) -> ApiResult<impl Responder> {
    let (from, to) = query.checked()?;
    let counts = service.status_counts(path.into_inner(), from, to).await?;
    Ok(HttpResponse::Ok().json(counts))
}

/// Records of an enrollment in a school year, optionally by status
#[utoipa::path(
    get,
    path = "/api/attendance/school-year/{enrollment_id}",
    params(
        ("enrollment_id" = u64, Path, description = "Enrollment id"),
        ("school_year" = String, Query, description = "School year, `2024-2025` or `2024/2025`"),
        ("status" = Option<String>, Query, description = "FALTA, PRESENTE, SIN SALIDA, COMPLETA or FESTIVO")
    ),
    responses(
        (status = 200, description = "Records of the school year", body = [AttendanceRecord]),
        (status = 400, description = "Invalid school year or status")
    ),
    tag = "Attendance"
)]
#[instrument(skip(service))]
pub async fn records_for_school_year(
    service: web::Data<AttendanceService>,
    path: web::Path<u64>,
    query: web::Query<SchoolYearQuery>,
) -> ApiResult<impl Responder> {
    let school_year: SchoolYear = query
        .school_year
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;
    let status = query
        .status
        .as_deref()
        .map(|s| {
            s.trim()
                .to_ascii_uppercase()
                .parse::<AttendanceStatus>()
                .map_err(|_| ApiError::BadRequest(format!("unknown status '{s}'")))
        })
        .transpose()?;

    let records = service
        .records_for_school_year(path.into_inner(), school_year, status)
        .await?;
    Ok(HttpResponse::Ok().json(records))
}
