use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

/// Displayed state of one attendance day.
///
/// The stored value is always derived from the entry/exit timestamps (see
/// `service::status`), except for the placeholders written by the reconciler.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
    ToSchema,
)]
pub enum AttendanceStatus {
    #[serde(rename = "FALTA")]
    #[strum(serialize = "FALTA")]
    Absent,
    #[serde(rename = "PRESENTE")]
    #[strum(serialize = "PRESENTE")]
    Present,
    #[serde(rename = "SIN SALIDA")]
    #[strum(serialize = "SIN SALIDA")]
    NoExit,
    #[serde(rename = "COMPLETA")]
    #[strum(serialize = "COMPLETA")]
    Complete,
    #[serde(rename = "FESTIVO")]
    #[strum(serialize = "FESTIVO")]
    Holiday,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": 1,
    "enrollment_id": 42,
    "date": "2024-10-02",
    "entry_at": "2024-10-02T08:58:12",
    "exit_at": null,
    "status": "PRESENTE",
    "justification": null,
    "modified_at": "2024-10-02T08:58:12"
}))]
pub struct AttendanceRecord {
    pub id: u64,
    pub enrollment_id: u64,
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub entry_at: Option<NaiveDateTime>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub exit_at: Option<NaiveDateTime>,
    pub status: AttendanceStatus,
    /// Free text left by whoever corrected the record by hand
    pub justification: Option<String>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub modified_at: Option<NaiveDateTime>,
}

impl AttendanceRecord {
    /// Entry registered, exit still missing.
    pub fn is_open(&self) -> bool {
        self.entry_at.is_some() && self.exit_at.is_none()
    }

    /// Absence/holiday row created by the reconciler with no timestamps.
    pub fn is_placeholder(&self) -> bool {
        self.entry_at.is_none()
    }
}

/// A record that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttendance {
    pub enrollment_id: u64,
    pub date: NaiveDate,
    pub entry_at: Option<NaiveDateTime>,
    pub exit_at: Option<NaiveDateTime>,
    pub status: AttendanceStatus,
    pub modified_at: Option<NaiveDateTime>,
}

impl NewAttendance {
    pub fn entry(enrollment_id: u64, now: NaiveDateTime) -> Self {
        Self {
            enrollment_id,
            date: now.date(),
            entry_at: Some(now),
            exit_at: None,
            status: AttendanceStatus::Present,
            modified_at: Some(now),
        }
    }

    pub fn placeholder(
        enrollment_id: u64,
        date: NaiveDate,
        status: AttendanceStatus,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            enrollment_id,
            date,
            entry_at: None,
            exit_at: None,
            status,
            modified_at: Some(now),
        }
    }
}
