use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::{FromRow, MySqlPool};

use crate::model::attendance::{AttendanceRecord, AttendanceStatus, NewAttendance};
use crate::model::enrollment::Enrollment;
use crate::model::holiday::Holiday;
use crate::store::{AttendanceStore, EnrollmentStore, HolidayStore, StoreError};

#[derive(FromRow)]
struct AttendanceRow {
    id: u64,
    enrollment_id: u64,
    date: NaiveDate,
    entry_at: Option<NaiveDateTime>,
    exit_at: Option<NaiveDateTime>,
    status: String,
    justification: Option<String>,
    modified_at: Option<NaiveDateTime>,
}

impl TryFrom<AttendanceRow> for AttendanceRecord {
    type Error = StoreError;

    fn try_from(row: AttendanceRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<AttendanceStatus>().map_err(|_| {
            StoreError::InvalidData(format!(
                "attendance {} has unknown status {:?}",
                row.id, row.status
            ))
        })?;

        Ok(AttendanceRecord {
            id: row.id,
            enrollment_id: row.enrollment_id,
            date: row.date,
            entry_at: row.entry_at,
            exit_at: row.exit_at,
            status,
            justification: row.justification,
            modified_at: row.modified_at,
        })
    }
}

fn into_records(rows: Vec<AttendanceRow>) -> Result<Vec<AttendanceRecord>, StoreError> {
    rows.into_iter().map(AttendanceRecord::try_from).collect()
}

const ATTENDANCE_COLUMNS: &str = r#"
    id, enrollment_id, date, entry_at, exit_at, status, justification, modified_at
"#;

pub struct MySqlAttendanceStore {
    pool: MySqlPool,
}

impl MySqlAttendanceStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttendanceStore for MySqlAttendanceStore {
    async fn find_by_enrollment_and_date(
        &self,
        enrollment_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        let sql = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE enrollment_id = ? AND date = ?"
        );
        sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(enrollment_id)
            .bind(date)
            .fetch_optional(&self.pool)
            .await?
            .map(AttendanceRecord::try_from)
            .transpose()
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<AttendanceRecord>, StoreError> {
        let sql = format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE id = ?");
        sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(AttendanceRecord::try_from)
            .transpose()
    }

    async fn insert(&self, record: NewAttendance) -> Result<AttendanceRecord, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendance (enrollment_id, date, entry_at, exit_at, status, modified_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.enrollment_id)
        .bind(record.date)
        .bind(record.entry_at)
        .bind(record.exit_at)
        .bind(record.status.to_string())
        .bind(record.modified_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(AttendanceRecord {
                id: done.last_insert_id(),
                enrollment_id: record.enrollment_id,
                date: record.date,
                entry_at: record.entry_at,
                exit_at: record.exit_at,
                status: record.status,
                justification: None,
                modified_at: record.modified_at,
            }),
            // SQLSTATE 23000 also covers foreign keys; only 1062 is a duplicate
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::Duplicate {
                    enrollment_id: record.enrollment_id,
                    date: record.date,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE attendance
            SET entry_at = ?, exit_at = ?, status = ?, justification = ?, modified_at = ?
            WHERE id = ?
            "#,
        )
        .bind(record.entry_at)
        .bind(record.exit_at)
        .bind(record.status.to_string())
        .bind(record.justification.as_deref())
        .bind(record.modified_at)
        .bind(record.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_open_records_as_of(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let sql = format!(
            r#"
            SELECT {ATTENDANCE_COLUMNS} FROM attendance
            WHERE entry_at IS NOT NULL AND exit_at IS NULL AND date <= ?
            ORDER BY date, id
            "#
        );
        let rows = sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(date)
            .fetch_all(&self.pool)
            .await?;
        into_records(rows)
    }

    async fn find_by_date(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, StoreError> {
        let sql = format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE date = ? ORDER BY id");
        let rows = sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(date)
            .fetch_all(&self.pool)
            .await?;
        into_records(rows)
    }

    async fn find_all(&self) -> Result<Vec<AttendanceRecord>, StoreError> {
        let sql = format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance ORDER BY date, id");
        let rows = sqlx::query_as::<_, AttendanceRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        into_records(rows)
    }

    async fn find_by_enrollment_between(
        &self,
        enrollment_id: u64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let sql = format!(
            r#"
            SELECT {ATTENDANCE_COLUMNS} FROM attendance
            WHERE enrollment_id = ? AND date BETWEEN ? AND ?
            ORDER BY date
            "#
        );
        let rows = sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(enrollment_id)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;
        into_records(rows)
    }
}

const ENROLLMENT_SELECT: &str = r#"
    SELECT
        e.id,
        e.student_id,
        e.course_id,
        e.group_id,
        e.school_year,
        e.card_uid,
        CONCAT(s.first_name, ' ', s.last_name) AS student_name,
        c.name AS course_name,
        g.name AS group_name
    FROM enrollments e
    JOIN students s ON s.id = e.student_id
    JOIN courses c ON c.id = e.course_id
    JOIN class_groups g ON g.id = e.group_id
"#;

pub struct MySqlEnrollmentStore {
    pool: MySqlPool,
}

impl MySqlEnrollmentStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EnrollmentStore for MySqlEnrollmentStore {
    async fn find_by_uid_and_school_year(
        &self,
        uid: &str,
        school_year: &str,
    ) -> Result<Option<Enrollment>, StoreError> {
        let sql = format!("{ENROLLMENT_SELECT} WHERE e.card_uid = ? AND e.school_year = ?");
        let enrollment = sqlx::query_as::<_, Enrollment>(&sql)
            .bind(uid)
            .bind(school_year)
            .fetch_optional(&self.pool)
            .await?;
        Ok(enrollment)
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<Enrollment>, StoreError> {
        let sql = format!("{ENROLLMENT_SELECT} WHERE e.id = ?");
        let enrollment = sqlx::query_as::<_, Enrollment>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(enrollment)
    }

    async fn find_all(&self) -> Result<Vec<Enrollment>, StoreError> {
        let sql = format!("{ENROLLMENT_SELECT} ORDER BY e.id");
        let enrollments = sqlx::query_as::<_, Enrollment>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(enrollments)
    }

    async fn find_by_course_and_group(
        &self,
        course: &str,
        group: &str,
    ) -> Result<Vec<Enrollment>, StoreError> {
        let sql = format!("{ENROLLMENT_SELECT} WHERE c.name = ? AND g.name = ? ORDER BY e.id");
        let enrollments = sqlx::query_as::<_, Enrollment>(&sql)
            .bind(course)
            .bind(group)
            .fetch_all(&self.pool)
            .await?;
        Ok(enrollments)
    }
}

pub struct MySqlHolidayStore {
    pool: MySqlPool,
}

impl MySqlHolidayStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HolidayStore for MySqlHolidayStore {
    async fn exists_on_date(&self, date: NaiveDate) -> Result<bool, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM holidays WHERE date = ?")
            .bind(date)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn find_all(&self) -> Result<Vec<Holiday>, StoreError> {
        let holidays =
            sqlx::query_as::<_, Holiday>("SELECT id, date, name FROM holidays ORDER BY date")
                .fetch_all(&self.pool)
                .await?;
        Ok(holidays)
    }

    async fn insert(&self, date: NaiveDate, name: &str) -> Result<Holiday, StoreError> {
        let done = sqlx::query("INSERT INTO holidays (date, name) VALUES (?, ?)")
            .bind(date)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(Holiday {
            id: done.last_insert_id(),
            date,
            name: name.to_string(),
        })
    }

    async fn delete(&self, id: u64) -> Result<bool, StoreError> {
        let done = sqlx::query("DELETE FROM holidays WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }
}
