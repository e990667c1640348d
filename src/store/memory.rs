use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::model::attendance::{AttendanceRecord, NewAttendance};
use crate::model::enrollment::Enrollment;
use crate::model::holiday::Holiday;
use crate::store::{AttendanceStore, EnrollmentStore, HolidayStore, StoreError};

#[derive(Default)]
struct AttendanceTable {
    next_id: u64,
    rows: BTreeMap<u64, AttendanceRecord>,
    by_key: HashMap<(u64, NaiveDate), u64>,
    failing_enrollments: HashSet<u64>,
}

/// In-memory attendance table with the same (enrollment, date) uniqueness as
/// the SQL schema.
#[derive(Default)]
pub struct MemoryAttendanceStore {
    table: RwLock<AttendanceTable>,
}

impl MemoryAttendanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes for this enrollment fail with `Unavailable` from now on.
    pub fn fail_writes_for(&self, enrollment_id: u64) {
        self.table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .failing_enrollments
            .insert(enrollment_id);
    }

    pub fn all(&self) -> Vec<AttendanceRecord> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.rows.values().cloned().collect()
    }

    pub fn count_for(&self, enrollment_id: u64, date: NaiveDate) -> usize {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table
            .rows
            .values()
            .filter(|r| r.enrollment_id == enrollment_id && r.date == date)
            .count()
    }

    fn select<F>(&self, filter: F) -> Vec<AttendanceRecord>
    where
        F: Fn(&AttendanceRecord) -> bool,
    {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.rows.values().filter(|r| filter(r)).cloned().collect()
    }
}

#[async_trait]
impl AttendanceStore for MemoryAttendanceStore {
    async fn find_by_enrollment_and_date(
        &self,
        enrollment_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        Ok(table
            .by_key
            .get(&(enrollment_id, date))
            .and_then(|id| table.rows.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<AttendanceRecord>, StoreError> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        Ok(table.rows.get(&id).cloned())
    }

    async fn insert(&self, record: NewAttendance) -> Result<AttendanceRecord, StoreError> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        if table.failing_enrollments.contains(&record.enrollment_id) {
            return Err(StoreError::Unavailable("injected failure".into()));
        }
        let key = (record.enrollment_id, record.date);
        if table.by_key.contains_key(&key) {
            return Err(StoreError::Duplicate {
                enrollment_id: record.enrollment_id,
                date: record.date,
            });
        }

        table.next_id += 1;
        let stored = AttendanceRecord {
            id: table.next_id,
            enrollment_id: record.enrollment_id,
            date: record.date,
            entry_at: record.entry_at,
            exit_at: record.exit_at,
            status: record.status,
            justification: None,
            modified_at: record.modified_at,
        };
        table.by_key.insert(key, stored.id);
        table.rows.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn save(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        if table.failing_enrollments.contains(&record.enrollment_id) {
            return Err(StoreError::Unavailable("injected failure".into()));
        }
        if let Some(row) = table.rows.get_mut(&record.id) {
            *row = record.clone();
        }
        Ok(())
    }

    async fn find_open_records_as_of(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        Ok(self.select(|r| r.is_open() && r.date <= date))
    }

    async fn find_by_date(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, StoreError> {
        Ok(self.select(|r| r.date == date))
    }

    async fn find_all(&self) -> Result<Vec<AttendanceRecord>, StoreError> {
        let mut rows = self.select(|_| true);
        rows.sort_by_key(|r| (r.date, r.id));
        Ok(rows)
    }

    async fn find_by_enrollment_between(
        &self,
        enrollment_id: u64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let mut rows =
            self.select(|r| r.enrollment_id == enrollment_id && from <= r.date && r.date <= to);
        rows.sort_by_key(|r| r.date);
        Ok(rows)
    }
}

#[derive(Default)]
pub struct MemoryEnrollmentStore {
    rows: RwLock<Vec<Enrollment>>,
}

impl MemoryEnrollmentStore {
    pub fn with(enrollments: Vec<Enrollment>) -> Self {
        Self {
            rows: RwLock::new(enrollments),
        }
    }
}

#[async_trait]
impl EnrollmentStore for MemoryEnrollmentStore {
    async fn find_by_uid_and_school_year(
        &self,
        uid: &str,
        school_year: &str,
    ) -> Result<Option<Enrollment>, StoreError> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        Ok(rows
            .iter()
            .find(|e| e.card_uid.as_deref() == Some(uid) && e.school_year == school_year)
            .cloned())
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<Enrollment>, StoreError> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        Ok(rows.iter().find(|e| e.id == id).cloned())
    }

    async fn find_all(&self) -> Result<Vec<Enrollment>, StoreError> {
        Ok(self.rows.read().unwrap_or_else(PoisonError::into_inner).clone())
    }

    async fn find_by_course_and_group(
        &self,
        course: &str,
        group: &str,
    ) -> Result<Vec<Enrollment>, StoreError> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        Ok(rows
            .iter()
            .filter(|e| e.course_name == course && e.group_name == group)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryHolidayStore {
    rows: RwLock<Vec<Holiday>>,
}

impl MemoryHolidayStore {
    pub fn with_dates(dates: &[NaiveDate]) -> Self {
        let rows = dates
            .iter()
            .enumerate()
            .map(|(i, date)| Holiday {
                id: i as u64 + 1,
                date: *date,
                name: "Festivo".into(),
            })
            .collect();
        Self {
            rows: RwLock::new(rows),
        }
    }
}

#[async_trait]
impl HolidayStore for MemoryHolidayStore {
    async fn exists_on_date(&self, date: NaiveDate) -> Result<bool, StoreError> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        Ok(rows.iter().any(|h| h.date == date))
    }

    async fn find_all(&self) -> Result<Vec<Holiday>, StoreError> {
        let mut rows = self.rows.read().unwrap_or_else(PoisonError::into_inner).clone();
        rows.sort_by_key(|h| h.date);
        Ok(rows)
    }

    async fn insert(&self, date: NaiveDate, name: &str) -> Result<Holiday, StoreError> {
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        let id = rows.iter().map(|h| h.id).max().unwrap_or(0) + 1;
        let holiday = Holiday {
            id,
            date,
            name: name.to_string(),
        };
        rows.push(holiday.clone());
        Ok(holiday)
    }

    async fn delete(&self, id: u64) -> Result<bool, StoreError> {
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        let before = rows.len();
        rows.retain(|h| h.id != id);
        Ok(rows.len() != before)
    }
}
