//! Entry/exit registration and the card-scan pipeline.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;

use crate::error::AttendanceError;
use crate::model::attendance::{AttendanceRecord, AttendanceStatus, NewAttendance};
use crate::model::enrollment::Enrollment;
use crate::model::school_year::SchoolYear;
use crate::service::resolver::EnrollmentResolver;
use crate::service::status::recompute_status;
use crate::store::{AttendanceStore, StoreError};
use crate::utils::clock::Clock;
use crate::utils::keyed_lock::KeyedLocks;

/// What a card tap turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Entry(AttendanceRecord),
    Exit(AttendanceRecord),
    /// The day was already complete; nothing written.
    AlreadyComplete(AttendanceRecord),
}

/// Manual edit of a record's timestamps.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct Correction {
    #[schema(example = "2024-10-02T08:55:00", value_type = Option<String>, format = "date-time")]
    pub entry_at: Option<NaiveDateTime>,
    #[schema(example = "2024-10-02T14:30:00", value_type = Option<String>, format = "date-time")]
    pub exit_at: Option<NaiveDateTime>,
    #[schema(example = "Forgot to badge out, confirmed by tutor")]
    pub justification: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StatusCount {
    #[schema(example = "PRESENTE")]
    pub status: AttendanceStatus,
    #[schema(example = 12)]
    pub count: usize,
}

pub struct AttendanceService {
    records: Arc<dyn AttendanceStore>,
    resolver: Arc<EnrollmentResolver>,
    clock: Arc<dyn Clock>,
    locks: Arc<KeyedLocks<u64>>,
}

impl AttendanceService {
    pub fn new(
        records: Arc<dyn AttendanceStore>,
        resolver: Arc<EnrollmentResolver>,
        clock: Arc<dyn Clock>,
        locks: Arc<KeyedLocks<u64>>,
    ) -> Self {
        Self {
            records,
            resolver,
            clock,
            locks,
        }
    }

    pub fn resolver(&self) -> &EnrollmentResolver {
        &self.resolver
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Registers today's entry for an enrollment.
    ///
    /// An absence placeholder left by the reconciler is filled in rather than
    /// rejected; any record that already has an entry is.
    #[instrument(skip(self))]
    pub async fn register_entry(&self, enrollment_id: u64) -> Result<AttendanceRecord, AttendanceError> {
        self.require_enrollment(enrollment_id).await?;
        let _guard = self.locks.lock(enrollment_id).await;
        let now = self.clock.now();

        match self.records.find_by_enrollment_and_date(enrollment_id, now.date()).await? {
            Some(existing) if !existing.is_placeholder() => {
                Err(AttendanceError::AlreadyRegisteredToday {
                    enrollment_id,
                    date: now.date(),
                })
            }
            Some(placeholder) => self.fill_entry(placeholder, now).await,
            None => self.insert_entry(enrollment_id, now).await,
        }
    }

    /// Registers today's exit. A later exit overwrites an earlier one.
    #[instrument(skip(self))]
    pub async fn register_exit(&self, enrollment_id: u64) -> Result<AttendanceRecord, AttendanceError> {
        self.require_enrollment(enrollment_id).await?;
        let _guard = self.locks.lock(enrollment_id).await;
        let now = self.clock.now();

        match self.records.find_by_enrollment_and_date(enrollment_id, now.date()).await? {
            Some(record) if !record.is_placeholder() => self.close(record, now).await,
            _ => Err(AttendanceError::NoEntryToday {
                enrollment_id,
                date: now.date(),
            }),
        }
    }

    /// Turns a card tap into an entry or an exit depending on today's record.
    pub async fn register_scan(&self, uid: &str) -> Result<ScanOutcome, AttendanceError> {
        let today = self.clock.today();
        let enrollment = self
            .resolver
            .resolve(uid, today)
            .await?
            .ok_or_else(|| AttendanceError::EnrollmentNotFound(format!("card {uid}")))?;

        let _guard = self.locks.lock(enrollment.id).await;
        let now = self.clock.now();

        let outcome = match self
            .records
            .find_by_enrollment_and_date(enrollment.id, now.date())
            .await?
        {
            None => ScanOutcome::Entry(self.insert_entry(enrollment.id, now).await?),
            Some(record) if record.is_placeholder() => {
                ScanOutcome::Entry(self.fill_entry(record, now).await?)
            }
            Some(record) if record.is_open() => ScanOutcome::Exit(self.close(record, now).await?),
            Some(record) => ScanOutcome::AlreadyComplete(record),
        };
        Ok(outcome)
    }

    /// Scan entry point for the reader pipeline: never fails, only logs.
    pub async fn handle_scan(&self, uid: &str) -> Option<ScanOutcome> {
        match self.register_scan(uid).await {
            Ok(outcome) => {
                match &outcome {
                    ScanOutcome::Entry(r) => {
                        info!(uid, enrollment_id = r.enrollment_id, "Entry registered")
                    }
                    ScanOutcome::Exit(r) => {
                        info!(uid, enrollment_id = r.enrollment_id, "Exit registered")
                    }
                    ScanOutcome::AlreadyComplete(r) => {
                        debug!(uid, enrollment_id = r.enrollment_id, "Day already complete, scan ignored")
                    }
                }
                Some(outcome)
            }
            Err(AttendanceError::EnrollmentNotFound(_)) => {
                warn!(uid, "Card is not linked to any enrollment of the current school year");
                None
            }
            Err(e) => {
                warn!(uid, error = %e, "Scan could not be registered");
                None
            }
        }
    }

    pub async fn get_record(
        &self,
        enrollment_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, AttendanceError> {
        Ok(self
            .records
            .find_by_enrollment_and_date(enrollment_id, date)
            .await?)
    }

    /// Replaces the timestamps of a record; the status is always recomputed.
    #[instrument(skip(self, correction))]
    pub async fn correct_record(
        &self,
        record_id: u64,
        correction: Correction,
    ) -> Result<AttendanceRecord, AttendanceError> {
        let mut record = self
            .records
            .find_by_id(record_id)
            .await?
            .ok_or(AttendanceError::RecordNotFound(record_id))?;

        match (correction.entry_at, correction.exit_at) {
            (None, Some(_)) => {
                return Err(AttendanceError::InvalidCorrection(
                    "exit time without entry time".into(),
                ));
            }
            (Some(entry), Some(exit)) if exit < entry => {
                return Err(AttendanceError::InvalidCorrection(
                    "exit time is earlier than entry time".into(),
                ));
            }
            _ => {}
        }

        let _guard = self.locks.lock(record.enrollment_id).await;
        let now = self.clock.now();
        record.entry_at = correction.entry_at;
        record.exit_at = correction.exit_at;
        record.status = recompute_status(record.entry_at, record.exit_at, now);
        record.justification = correction.justification;
        record.modified_at = Some(now);
        self.records.save(&record).await?;

        info!(record_id, status = %record.status, "Attendance corrected");
        Ok(record)
    }

    pub async fn all_records(&self) -> Result<Vec<AttendanceRecord>, AttendanceError> {
        Ok(self.records.find_all().await?)
    }

    pub async fn records_on_date(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, AttendanceError> {
        Ok(self.records.find_by_date(date).await?)
    }

    pub async fn records_in_range(
        &self,
        enrollment_id: u64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, AttendanceError> {
        Ok(self
            .records
            .find_by_enrollment_between(enrollment_id, from, to)
            .await?)
    }

    /// Number of days per status in the range; every status is listed.
    pub async fn status_counts(
        &self,
        enrollment_id: u64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<StatusCount>, AttendanceError> {
        let mut counts: BTreeMap<AttendanceStatus, usize> =
            AttendanceStatus::iter().map(|s| (s, 0)).collect();
        for record in self.records_in_range(enrollment_id, from, to).await? {
            *counts.entry(record.status).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(status, count)| StatusCount { status, count })
            .collect())
    }

    pub async fn records_for_school_year(
        &self,
        enrollment_id: u64,
        school_year: SchoolYear,
        status: Option<AttendanceStatus>,
    ) -> Result<Vec<AttendanceRecord>, AttendanceError> {
        let (Some(from), Some(to)) = (school_year.first_day(), school_year.last_day()) else {
            return Ok(Vec::new());
        };
        let mut records = self.records_in_range(enrollment_id, from, to).await?;
        if let Some(status) = status {
            records.retain(|r| r.status == status);
        }
        Ok(records)
    }

    /// The enrollment, provided it belongs to today's school year.
    async fn require_enrollment(&self, enrollment_id: u64) -> Result<Enrollment, AttendanceError> {
        let today = self.clock.today();
        self.resolver
            .find_by_id(enrollment_id)
            .await?
            .filter(|e| e.is_active_on(today))
            .ok_or_else(|| AttendanceError::EnrollmentNotFound(format!("enrollment {enrollment_id}")))
    }

    async fn insert_entry(
        &self,
        enrollment_id: u64,
        now: NaiveDateTime,
    ) -> Result<AttendanceRecord, AttendanceError> {
        match self.records.insert(NewAttendance::entry(enrollment_id, now)).await {
            Ok(record) => Ok(record),
            Err(StoreError::Duplicate { enrollment_id, date }) => {
                Err(AttendanceError::AlreadyRegisteredToday { enrollment_id, date })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn fill_entry(
        &self,
        mut record: AttendanceRecord,
        now: NaiveDateTime,
    ) -> Result<AttendanceRecord, AttendanceError> {
        record.entry_at = Some(now);
        record.exit_at = None;
        // same as a fresh entry, whatever the hour
        record.status = AttendanceStatus::Present;
        record.modified_at = Some(now);
        self.records.save(&record).await?;
        Ok(record)
    }

    async fn close(
        &self,
        mut record: AttendanceRecord,
        now: NaiveDateTime,
    ) -> Result<AttendanceRecord, AttendanceError> {
        record.exit_at = Some(now);
        record.status = recompute_status(record.entry_at, record.exit_at, now);
        record.modified_at = Some(now);
        self.records.save(&record).await?;
        Ok(record)
    }
}
