use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::school_year::SchoolYear;

/// One student's registration in a course and group for a school year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 42,
    "student_id": 7,
    "course_id": 2,
    "group_id": 3,
    "school_year": "2024-2025",
    "card_uid": "04A1B2C3",
    "student_name": "Lucia Martin",
    "course_name": "1 DAM",
    "group_name": "A"
}))]
pub struct Enrollment {
    pub id: u64,
    pub student_id: u64,
    pub course_id: u64,
    pub group_id: u64,
    #[schema(example = "2024-2025")]
    pub school_year: String,
    #[schema(example = "04A1B2C3", nullable = true)]
    pub card_uid: Option<String>,
    pub student_name: String,
    pub course_name: String,
    pub group_name: String,
}

impl Enrollment {
    /// Whether `date` falls inside this enrollment's school year.
    /// Enrollments with a malformed label are never active.
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.school_year
            .parse::<SchoolYear>()
            .map(|year| year.contains(date))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_follows_school_year_label() {
        let mut e = Enrollment {
            id: 1,
            student_id: 1,
            course_id: 1,
            group_id: 1,
            school_year: "2024-2025".into(),
            card_uid: None,
            student_name: "A B".into(),
            course_name: "C".into(),
            group_name: "G".into(),
        };
        let oct = NaiveDate::from_ymd_opt(2024, 10, 2).unwrap();
        assert!(e.is_active_on(oct));
        assert!(!e.is_active_on(NaiveDate::from_ymd_opt(2025, 7, 15).unwrap()));

        e.school_year = "2024".into();
        assert!(!e.is_active_on(oct));
    }
}
