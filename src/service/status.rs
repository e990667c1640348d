//! The single rule deriving an attendance status from its timestamps.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::model::attendance::AttendanceStatus;

/// Hour of the day after which an open record counts as abandoned.
pub const CUTOFF_HOUR: i64 = 23;

/// Cutoff instant for a record dated `date` (always on its own date).
pub fn cutoff(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN) + Duration::hours(CUTOFF_HOUR)
}

pub fn recompute_status(
    entry: Option<NaiveDateTime>,
    exit: Option<NaiveDateTime>,
    now: NaiveDateTime,
) -> AttendanceStatus {
    match (entry, exit) {
        (None, _) => AttendanceStatus::Absent,
        (Some(entry), None) if now < cutoff(entry.date()) => AttendanceStatus::Present,
        (Some(_), None) => AttendanceStatus::NoExit,
        (Some(_), Some(_)) => AttendanceStatus::Complete,
    }
}

/// Status for a reconciler-created row with no activity.
pub fn placeholder_status(is_holiday: bool) -> AttendanceStatus {
    if is_holiday {
        AttendanceStatus::Holiday
    } else {
        AttendanceStatus::Absent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 10, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn open_record_turns_into_no_exit_at_cutoff() {
        let entry = Some(at(2, 9, 0));
        assert_eq!(
            recompute_status(entry, None, at(2, 10, 0)),
            AttendanceStatus::Present
        );
        assert_eq!(
            recompute_status(entry, None, at(2, 23, 0)),
            AttendanceStatus::NoExit
        );
        assert_eq!(
            recompute_status(entry, None, at(2, 23, 30)),
            AttendanceStatus::NoExit
        );
    }

    #[test]
    fn cutoff_is_taken_from_the_entry_date() {
        // evaluated the next morning, before 23:00 of "now"'s day
        assert_eq!(
            recompute_status(Some(at(1, 9, 0)), None, at(2, 8, 0)),
            AttendanceStatus::NoExit
        );
    }

    #[test]
    fn exit_always_completes() {
        assert_eq!(
            recompute_status(Some(at(2, 9, 0)), Some(at(2, 23, 45)), at(3, 1, 0)),
            AttendanceStatus::Complete
        );
    }

    #[test]
    fn missing_entry_is_an_absence() {
        assert_eq!(recompute_status(None, None, at(2, 12, 0)), AttendanceStatus::Absent);
        assert_eq!(
            recompute_status(None, Some(at(2, 14, 0)), at(2, 15, 0)),
            AttendanceStatus::Absent
        );
    }

    #[test]
    fn cutoff_is_23h_on_the_same_day() {
        assert_eq!(cutoff(at(2, 0, 0).date()), at(2, 23, 0));
        assert_eq!(placeholder_status(true), AttendanceStatus::Holiday);
        assert_eq!(placeholder_status(false), AttendanceStatus::Absent);
    }
}
