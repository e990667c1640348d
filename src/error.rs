use chrono::NaiveDate;

use crate::store::StoreError;

/// Failures of the attendance operations exposed to callers.
#[derive(Debug, thiserror::Error)]
pub enum AttendanceError {
    /// Card UID or enrollment id with no active enrollment.
    #[error("no active enrollment for {0}")]
    EnrollmentNotFound(String),

    #[error("enrollment {enrollment_id} already has an entry on {date}")]
    AlreadyRegisteredToday {
        enrollment_id: u64,
        date: NaiveDate,
    },

    #[error("enrollment {enrollment_id} has no entry on {date}")]
    NoEntryToday {
        enrollment_id: u64,
        date: NaiveDate,
    },

    #[error("attendance record {0} not found")]
    RecordNotFound(u64),

    #[error("invalid correction: {0}")]
    InvalidCorrection(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
