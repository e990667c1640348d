//! Daily close-out of dangling records and back-fill of missing days.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;

use crate::model::attendance::{AttendanceRecord, AttendanceStatus, NewAttendance};
use crate::service::calendar::HolidayCalendar;
use crate::service::status::{cutoff, placeholder_status};
use crate::store::{AttendanceStore, EnrollmentStore, StoreError};
use crate::utils::clock::Clock;
use crate::utils::keyed_lock::KeyedLocks;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Weekend,
    Vacation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CloseReport {
    pub closed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AbsenceReport {
    pub skipped: Option<SkipReason>,
    pub absences: usize,
    pub holidays: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReconcileReport {
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub closed: CloseReport,
    pub generated: AbsenceReport,
}

pub struct DailyReconciler {
    records: Arc<dyn AttendanceStore>,
    enrollments: Arc<dyn EnrollmentStore>,
    calendar: Arc<HolidayCalendar>,
    clock: Arc<dyn Clock>,
    locks: Arc<KeyedLocks<u64>>,
}

impl DailyReconciler {
    pub fn new(
        records: Arc<dyn AttendanceStore>,
        enrollments: Arc<dyn EnrollmentStore>,
        calendar: Arc<HolidayCalendar>,
        clock: Arc<dyn Clock>,
        locks: Arc<KeyedLocks<u64>>,
    ) -> Self {
        Self {
            records,
            enrollments,
            calendar,
            clock,
            locks,
        }
    }

    pub fn calendar(&self) -> &HolidayCalendar {
        &self.calendar
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    /// Closes records of `date` still missing an exit, stamping the cutoff as
    /// exit time (or the entry time, for entries made after the cutoff).
    /// Does nothing before that date's cutoff has passed.
    #[instrument(skip(self))]
    pub async fn close_dangling(&self, date: NaiveDate) -> Result<CloseReport, StoreError> {
        if self.clock.now() < cutoff(date) {
            debug!(%date, "Cutoff not reached yet, nothing to close");
            return Ok(CloseReport::default());
        }
        let open: Vec<_> = self
            .records
            .find_by_date(date)
            .await?
            .into_iter()
            .filter(AttendanceRecord::is_open)
            .collect();
        Ok(self.close_all(open).await)
    }

    /// Closes every open record whose cutoff is already behind us, whatever
    /// its date. Repairs state after the process was down.
    #[instrument(skip(self))]
    pub async fn close_overdue(&self) -> Result<CloseReport, StoreError> {
        let now = self.clock.now();
        let overdue: Vec<_> = self
            .records
            .find_open_records_as_of(now.date())
            .await?
            .into_iter()
            .filter(|r| cutoff(r.date) <= now)
            .collect();
        Ok(self.close_all(overdue).await)
    }

    async fn close_all(&self, candidates: Vec<AttendanceRecord>) -> CloseReport {
        let mut report = CloseReport::default();
        for candidate in candidates {
            match self.close_one(candidate).await {
                Ok(true) => report.closed += 1,
                Ok(false) => {}
                Err((record, e)) => {
                    warn!(
                        record_id = record.id,
                        enrollment_id = record.enrollment_id,
                        error = %e,
                        "Could not close dangling attendance"
                    );
                    report.failed += 1;
                }
            }
        }
        if report.closed > 0 || report.failed > 0 {
            info!(closed = report.closed, failed = report.failed, "Dangling attendance closed");
        }
        report
    }

    async fn close_one(
        &self,
        candidate: AttendanceRecord,
    ) -> Result<bool, (AttendanceRecord, StoreError)> {
        let _guard = self.locks.lock(candidate.enrollment_id).await;

        // re-read under the lock; a scan may have closed it meanwhile
        let current = match self.records.find_by_id(candidate.id).await {
            Ok(Some(current)) => current,
            Ok(None) => return Ok(false),
            Err(e) => return Err((candidate, e)),
        };
        if !current.is_open() {
            return Ok(false);
        }

        let mut record = current;
        let stamp = cutoff(record.date);
        // exit never precedes entry
        record.exit_at = Some(record.entry_at.map_or(stamp, |entry| entry.max(stamp)));
        record.status = AttendanceStatus::NoExit;
        record.modified_at = Some(self.clock.now());
        match self.records.save(&record).await {
            Ok(()) => Ok(true),
            Err(e) => Err((record, e)),
        }
    }

    /// Creates a `FALTA` (or `FESTIVO` on holidays) row for every enrollment
    /// active on `date` that has none. Weekends and vacation days are skipped.
    #[instrument(skip(self))]
    pub async fn generate_absences(&self, date: NaiveDate) -> Result<AbsenceReport, StoreError> {
        if let Some(reason) = self.skip_reason(date) {
            debug!(%date, ?reason, "No absences generated");
            return Ok(AbsenceReport {
                skipped: Some(reason),
                ..Default::default()
            });
        }

        let status = placeholder_status(self.calendar.is_holiday(date).await?);
        let mut report = AbsenceReport::default();

        for enrollment in self.enrollments.find_all().await? {
            if !enrollment.is_active_on(date) {
                continue;
            }
            match self.ensure_placeholder(enrollment.id, date, status).await {
                Ok(true) if status == AttendanceStatus::Holiday => report.holidays += 1,
                Ok(true) => report.absences += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(enrollment_id = enrollment.id, %date, error = %e, "Could not create placeholder");
                    report.failed += 1;
                }
            }
        }

        info!(
            %date,
            absences = report.absences,
            holidays = report.holidays,
            failed = report.failed,
            "Placeholders generated"
        );
        Ok(report)
    }

    fn skip_reason(&self, date: NaiveDate) -> Option<SkipReason> {
        if HolidayCalendar::is_weekend(date) {
            Some(SkipReason::Weekend)
        } else if self.calendar.is_vacation(date) {
            Some(SkipReason::Vacation)
        } else {
            None
        }
    }

    /// Inserts the placeholder unless the day already has a record. Holds the
    /// enrollment's lock so a concurrent scan sees either nothing or the
    /// placeholder, and upgrades the latter.
    async fn ensure_placeholder(
        &self,
        enrollment_id: u64,
        date: NaiveDate,
        status: AttendanceStatus,
    ) -> Result<bool, StoreError> {
        let _guard = self.locks.lock(enrollment_id).await;
        if self
            .records
            .find_by_enrollment_and_date(enrollment_id, date)
            .await?
            .is_some()
        {
            return Ok(false);
        }
        let placeholder = NewAttendance::placeholder(enrollment_id, date, status, self.clock.now());
        match self.records.insert(placeholder).await {
            Ok(_) => Ok(true),
            Err(StoreError::Duplicate { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Records of one course and group on `date`, for enrollments active that
    /// day. When `date` is today, members without a record get their
    /// placeholder first; past days are returned as stored.
    #[instrument(skip(self))]
    pub async fn records_for_group(
        &self,
        course: &str,
        group: &str,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let members: Vec<_> = self
            .enrollments
            .find_by_course_and_group(course, group)
            .await?
            .into_iter()
            .filter(|e| e.is_active_on(date))
            .collect();

        let placeholder = if date == self.clock.today() && self.skip_reason(date).is_none() {
            Some(placeholder_status(self.calendar.is_holiday(date).await?))
        } else {
            None
        };

        let mut records = Vec::with_capacity(members.len());
        for enrollment in members {
            if let Some(status) = placeholder {
                self.ensure_placeholder(enrollment.id, date, status).await?;
            }
            if let Some(record) = self
                .records
                .find_by_enrollment_and_date(enrollment.id, date)
                .await?
            {
                records.push(record);
            }
        }
        debug!(course, group, %date, found = records.len(), "Group attendance listed");
        Ok(records)
    }

    /// Full pass for one date. Safe to re-run; failures are logged and
    /// counted, never propagated.
    #[instrument(skip(self))]
    pub async fn run(&self, date: NaiveDate) -> ReconcileReport {
        let closed = self.close_dangling(date).await.unwrap_or_else(|e| {
            warn!(%date, error = %e, "Closing dangling attendance failed");
            CloseReport {
                closed: 0,
                failed: 1,
            }
        });
        let generated = self.generate_absences(date).await.unwrap_or_else(|e| {
            warn!(%date, error = %e, "Generating absences failed");
            AbsenceReport {
                failed: 1,
                ..Default::default()
            }
        });
        ReconcileReport {
            date,
            closed,
            generated,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::time::Duration;

    use crate::model::enrollment::Enrollment;
    use crate::service::resolver::tests::enrollment;
    use crate::store::memory::{MemoryAttendanceStore, MemoryEnrollmentStore, MemoryHolidayStore};
    use crate::utils::clock::FixedClock;

    pub struct Fixture {
        pub records: Arc<MemoryAttendanceStore>,
        pub clock: Arc<FixedClock>,
        pub calendar: Arc<HolidayCalendar>,
        pub locks: Arc<KeyedLocks<u64>>,
        pub reconciler: DailyReconciler,
    }

    fn d(m: u32, day: u32) -> NaiveDate {
        let year = if m >= 9 { 2024 } else { 2025 };
        NaiveDate::from_ymd_opt(year, m, day).unwrap()
    }

    /// Enrollments 1..=3 in 2024-2025, 4 in 2023-2024, all "1 DAM" group A
    /// except 3 (group B); Monday 2024-10-14 is a holiday.
    pub fn fixture(now: NaiveDateTime) -> Fixture {
        let records = Arc::new(MemoryAttendanceStore::new());
        let enrollments = Arc::new(MemoryEnrollmentStore::with(vec![
            enrollment(1, Some("A1"), "2024-2025"),
            enrollment(2, Some("A2"), "2024-2025"),
            Enrollment {
                group_id: 2,
                group_name: "B".into(),
                ..enrollment(3, None, "2024-2025")
            },
            enrollment(4, Some("A1"), "2023-2024"),
        ]));
        let holidays = Arc::new(MemoryHolidayStore::with_dates(&[d(10, 14)]));
        let calendar = Arc::new(HolidayCalendar::new(holidays));
        let clock = Arc::new(FixedClock::new(now));
        let locks = Arc::new(KeyedLocks::new());
        let reconciler = DailyReconciler::new(
            records.clone(),
            enrollments,
            calendar.clone(),
            clock.clone(),
            locks.clone(),
        );
        Fixture {
            records,
            clock,
            calendar,
            locks,
            reconciler,
        }
    }

    #[tokio::test]
    async fn weekday_creates_falta_for_active_enrollments() {
        let f = fixture(FixedClock::instant(2024, 10, 3, 0, 5));
        let report = f.reconciler.generate_absences(d(10, 2)).await.unwrap();
        assert_eq!(report.absences, 3);
        assert_eq!(report.skipped, None);

        let rows = f.records.all();
        assert_eq!(rows.len(), 3);
        for row in rows {
            assert_eq!(row.status, AttendanceStatus::Absent);
            assert_eq!(row.entry_at, None);
            assert_eq!(row.exit_at, None);
            assert_eq!(row.date, d(10, 2));
        }
        assert_eq!(f.records.count_for(4, d(10, 2)), 0);
    }

    #[tokio::test]
    async fn saturday_creates_nothing() {
        let f = fixture(FixedClock::instant(2024, 10, 7, 0, 5));
        let report = f.reconciler.generate_absences(d(10, 5)).await.unwrap();
        assert_eq!(report.skipped, Some(SkipReason::Weekend));
        assert!(f.records.all().is_empty());
    }

    #[tokio::test]
    async fn holiday_creates_festivo() {
        let f = fixture(FixedClock::instant(2024, 10, 15, 0, 5));
        // one enrollment already scanned in that day
        f.records
            .insert(NewAttendance::entry(2, FixedClock::instant(2024, 10, 14, 9, 0)))
            .await
            .unwrap();

        let report = f.reconciler.generate_absences(d(10, 14)).await.unwrap();
        assert_eq!(report.holidays, 2);
        assert_eq!(report.absences, 0);
        let statuses: Vec<_> = f
            .records
            .all()
            .into_iter()
            .filter(|r| r.enrollment_id != 2)
            .map(|r| r.status)
            .collect();
        assert_eq!(statuses, vec![AttendanceStatus::Holiday; 2]);
    }

    #[tokio::test]
    async fn vacation_days_are_skipped() {
        let f = fixture(FixedClock::instant(2024, 12, 24, 0, 5));
        f.calendar.set_vacations([d(12, 23)]);
        let report = f.reconciler.generate_absences(d(12, 23)).await.unwrap();
        assert_eq!(report.skipped, Some(SkipReason::Vacation));
        assert!(f.records.all().is_empty());
    }

    #[tokio::test]
    async fn generation_is_idempotent_and_survives_failures() {
        let f = fixture(FixedClock::instant(2024, 10, 3, 0, 5));
        f.records.fail_writes_for(2);

        let first = f.reconciler.generate_absences(d(10, 2)).await.unwrap();
        assert_eq!(first.absences, 2);
        assert_eq!(first.failed, 1);

        let second = f.reconciler.generate_absences(d(10, 2)).await.unwrap();
        assert_eq!(second.absences, 0);
        assert_eq!(f.records.count_for(1, d(10, 2)), 1);
        assert_eq!(f.records.count_for(3, d(10, 2)), 1);
    }

    #[tokio::test]
    async fn close_dangling_twice_is_a_noop() {
        let f = fixture(FixedClock::instant(2024, 10, 2, 23, 30));
        f.records
            .insert(NewAttendance::entry(1, FixedClock::instant(2024, 10, 2, 9, 0)))
            .await
            .unwrap();

        let first = f.reconciler.close_dangling(d(10, 2)).await.unwrap();
        assert_eq!(first.closed, 1);
        let row = f.records.all().pop().unwrap();
        assert_eq!(row.status, AttendanceStatus::NoExit);
        assert_eq!(row.exit_at, Some(FixedClock::instant(2024, 10, 2, 23, 0)));

        let second = f.reconciler.close_dangling(d(10, 2)).await.unwrap();
        assert_eq!(second, CloseReport::default());
        assert_eq!(f.records.all().pop().unwrap(), row);
    }

    #[tokio::test]
    async fn close_dangling_waits_for_the_cutoff() {
        let f = fixture(FixedClock::instant(2024, 10, 2, 18, 0));
        f.records
            .insert(NewAttendance::entry(1, FixedClock::instant(2024, 10, 2, 9, 0)))
            .await
            .unwrap();

        let report = f.reconciler.close_dangling(d(10, 2)).await.unwrap();
        assert_eq!(report.closed, 0);
        assert!(f.records.all()[0].is_open());

        f.clock.set(FixedClock::instant(2024, 10, 3, 0, 5));
        assert_eq!(f.reconciler.close_dangling(d(10, 2)).await.unwrap().closed, 1);
    }

    #[tokio::test]
    async fn entry_after_cutoff_is_closed_at_its_own_time() {
        let f = fixture(FixedClock::instant(2024, 10, 3, 0, 5));
        let late = FixedClock::instant(2024, 10, 2, 23, 30);
        f.records.insert(NewAttendance::entry(1, late)).await.unwrap();

        assert_eq!(f.reconciler.close_dangling(d(10, 2)).await.unwrap().closed, 1);
        let row = f.records.all().pop().unwrap();
        assert_eq!(row.status, AttendanceStatus::NoExit);
        assert_eq!(row.exit_at, Some(late));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn placeholder_waits_for_a_scan_holding_the_enrollment() {
        let f = fixture(FixedClock::instant(2024, 10, 2, 9, 0));
        let reconciler = Arc::new(f.reconciler);

        let guard = f.locks.lock(1).await;
        let task = {
            let reconciler = reconciler.clone();
            tokio::spawn(async move { reconciler.generate_absences(d(10, 2)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());

        // the scan's own insert still finds the day free
        f.records
            .insert(NewAttendance::entry(1, FixedClock::instant(2024, 10, 2, 9, 0)))
            .await
            .unwrap();
        drop(guard);

        let report = task.await.unwrap().unwrap();
        assert_eq!(report.absences, 2);
        let day_one = f.records.all().into_iter().find(|r| r.enrollment_id == 1).unwrap();
        assert_eq!(day_one.status, AttendanceStatus::Present);
    }

    #[tokio::test]
    async fn group_listing_today_creates_missing_placeholders() {
        let f = fixture(FixedClock::instant(2024, 10, 2, 9, 0));
        f.records
            .insert(NewAttendance::entry(1, FixedClock::instant(2024, 10, 2, 8, 55)))
            .await
            .unwrap();

        let listed = f.reconciler.records_for_group("1 DAM", "A", d(10, 2)).await.unwrap();
        let summary: Vec<_> = listed.iter().map(|r| (r.enrollment_id, r.status)).collect();
        assert_eq!(
            summary,
            vec![(1, AttendanceStatus::Present), (2, AttendanceStatus::Absent)]
        );
        // other group and past school year untouched
        assert_eq!(f.records.count_for(3, d(10, 2)), 0);
        assert_eq!(f.records.count_for(4, d(10, 2)), 0);

        let again = f.reconciler.records_for_group("1 DAM", "A", d(10, 2)).await.unwrap();
        assert_eq!(again, listed);
        assert_eq!(f.records.all().len(), 2);
    }

    #[tokio::test]
    async fn group_listing_of_past_days_is_read_only() {
        let f = fixture(FixedClock::instant(2024, 10, 2, 9, 0));
        let listed = f.reconciler.records_for_group("1 DAM", "A", d(10, 1)).await.unwrap();
        assert!(listed.is_empty());
        assert!(f.records.all().is_empty());

        let unknown = f.reconciler.records_for_group("2 ASIR", "A", d(10, 2)).await.unwrap();
        assert!(unknown.is_empty());
        assert!(f.records.all().is_empty());
    }

    #[tokio::test]
    async fn group_listing_follows_the_calendar() {
        let f = fixture(FixedClock::instant(2024, 10, 14, 9, 0));
        let holiday = f.reconciler.records_for_group("1 DAM", "A", d(10, 14)).await.unwrap();
        assert_eq!(
            holiday.iter().map(|r| r.status).collect::<Vec<_>>(),
            vec![AttendanceStatus::Holiday; 2]
        );

        f.clock.set(FixedClock::instant(2024, 10, 19, 10, 0));
        let saturday = f.reconciler.records_for_group("1 DAM", "A", d(10, 19)).await.unwrap();
        assert!(saturday.is_empty());
    }

    #[tokio::test]
    async fn run_closes_and_backfills() {
        let f = fixture(FixedClock::instant(2024, 10, 3, 0, 5));
        f.records
            .insert(NewAttendance::entry(1, FixedClock::instant(2024, 10, 2, 9, 0)))
            .await
            .unwrap();

        let report = f.reconciler.run(d(10, 2)).await;
        assert_eq!(report.closed.closed, 1);
        assert_eq!(report.generated.absences, 2);
        assert_eq!(f.records.all().len(), 3);

        let again = f.reconciler.run(d(10, 2)).await;
        assert_eq!(again.closed.closed, 0);
        assert_eq!(again.generated.absences, 0);
    }
}
