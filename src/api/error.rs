use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;

use crate::error::AttendanceError;
use crate::store::StoreError;

/// Error type returned by every handler; renders `{"message", "code"}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Attendance(#[from] AttendanceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    BadRequest(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Attendance(e) => match e {
                AttendanceError::EnrollmentNotFound(_) => (StatusCode::NOT_FOUND, "ENROLLMENT_NOT_FOUND"),
                AttendanceError::RecordNotFound(_) => (StatusCode::NOT_FOUND, "RECORD_NOT_FOUND"),
                AttendanceError::AlreadyRegisteredToday { .. } => {
                    (StatusCode::CONFLICT, "ALREADY_REGISTERED_TODAY")
                }
                AttendanceError::NoEntryToday { .. } => (StatusCode::BAD_REQUEST, "NO_ENTRY_TODAY"),
                AttendanceError::InvalidCorrection(_) => (StatusCode::BAD_REQUEST, "INVALID_CORRECTION"),
                AttendanceError::Store(e) => store_parts(e),
            },
            ApiError::Store(e) => store_parts(e),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        }
    }
}

fn store_parts(err: &StoreError) -> (StatusCode, &'static str) {
    match err {
        StoreError::Duplicate { .. } => (StatusCode::CONFLICT, "ALREADY_REGISTERED_TODAY"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.parts().0
    }

    fn error_response(&self) -> HttpResponse {
        let (status, code) = self.parts();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
            "Internal Server Error".to_string()
        } else {
            self.to_string()
        };
        HttpResponse::build(status).json(json!({
            "message": message,
            "code": code,
        }))
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn domain_errors_map_to_client_statuses() {
        let date = NaiveDate::from_ymd_opt(2024, 10, 2).unwrap();
        let dup = ApiError::from(AttendanceError::AlreadyRegisteredToday {
            enrollment_id: 1,
            date,
        });
        assert_eq!(dup.status_code(), StatusCode::CONFLICT);

        let no_entry = ApiError::from(AttendanceError::NoEntryToday {
            enrollment_id: 1,
            date,
        });
        assert_eq!(no_entry.status_code(), StatusCode::BAD_REQUEST);

        let missing = ApiError::from(AttendanceError::EnrollmentNotFound("enrollment 9".into()));
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn store_failures_are_sanitized() {
        let err = ApiError::from(StoreError::Unavailable("connection refused".into()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let resp = err.error_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
