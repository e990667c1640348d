//! Persistence boundary of the attendance engine.
//!
//! The engine only talks to these traits. `mysql` is the production backend;
//! `memory` backs the unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::model::attendance::{AttendanceRecord, NewAttendance};
use crate::model::enrollment::Enrollment;
use crate::model::holiday::Holiday;

#[cfg(test)]
pub mod memory;
pub mod mysql;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The (enrollment, date) pair already has a record.
    #[error("attendance already exists for enrollment {enrollment_id} on {date}")]
    Duplicate {
        enrollment_id: u64,
        date: NaiveDate,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid stored data: {0}")]
    InvalidData(String),
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn find_by_enrollment_and_date(
        &self,
        enrollment_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError>;

    async fn find_by_id(&self, id: u64) -> Result<Option<AttendanceRecord>, StoreError>;

    /// Fails with [`StoreError::Duplicate`] when the (enrollment, date) pair
    /// is taken. Implementations must enforce this atomically.
    async fn insert(&self, record: NewAttendance) -> Result<AttendanceRecord, StoreError>;

    async fn save(&self, record: &AttendanceRecord) -> Result<(), StoreError>;

    /// Records dated on or before `date` with an entry and no exit.
    async fn find_open_records_as_of(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, StoreError>;

    async fn find_by_date(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, StoreError>;

    /// Every record, ordered by date then id.
    async fn find_all(&self) -> Result<Vec<AttendanceRecord>, StoreError>;

    async fn find_by_enrollment_between(
        &self,
        enrollment_id: u64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, StoreError>;
}

#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    async fn find_by_uid_and_school_year(
        &self,
        uid: &str,
        school_year: &str,
    ) -> Result<Option<Enrollment>, StoreError>;

    async fn find_by_id(&self, id: u64) -> Result<Option<Enrollment>, StoreError>;

    async fn find_all(&self) -> Result<Vec<Enrollment>, StoreError>;

    /// Enrollments of a course and group, matched by their names.
    async fn find_by_course_and_group(
        &self,
        course: &str,
        group: &str,
    ) -> Result<Vec<Enrollment>, StoreError>;
}

#[async_trait]
pub trait HolidayStore: Send + Sync {
    async fn exists_on_date(&self, date: NaiveDate) -> Result<bool, StoreError>;

    async fn find_all(&self) -> Result<Vec<Holiday>, StoreError>;

    async fn insert(&self, date: NaiveDate, name: &str) -> Result<Holiday, StoreError>;

    async fn delete(&self, id: u64) -> Result<bool, StoreError>;
}

/// The three collaborators the engine is wired with.
#[derive(Clone)]
pub struct Stores {
    pub attendance: Arc<dyn AttendanceStore>,
    pub enrollments: Arc<dyn EnrollmentStore>,
    pub holidays: Arc<dyn HolidayStore>,
}

impl Stores {
    pub fn mysql(pool: sqlx::MySqlPool) -> Self {
        Self {
            attendance: Arc::new(mysql::MySqlAttendanceStore::new(pool.clone())),
            enrollments: Arc::new(mysql::MySqlEnrollmentStore::new(pool.clone())),
            holidays: Arc::new(mysql::MySqlHolidayStore::new(pool)),
        }
    }
}
