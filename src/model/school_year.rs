use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use derive_more::Display;

/// Academic year running from September 1st to June 30th, labelled "2024-2025".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display(fmt = "{}-{}", start, end)]
pub struct SchoolYear {
    pub start: i32,
    pub end: i32,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid school year label: {0:?} (expected YYYY-YYYY)")]
pub struct SchoolYearParseError(pub String);

impl SchoolYear {
    /// The school year a calendar date falls in. September starts a new one.
    pub fn containing(date: NaiveDate) -> Self {
        if date.month() >= 9 {
            Self {
                start: date.year(),
                end: date.year() + 1,
            }
        } else {
            Self {
                start: date.year() - 1,
                end: date.year(),
            }
        }
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.start, 9, 1)
    }

    pub fn last_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.end, 6, 30)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        match (self.first_day(), self.last_day()) {
            (Some(first), Some(last)) => first <= date && date <= last,
            _ => false,
        }
    }
}

impl FromStr for SchoolYear {
    type Err = SchoolYearParseError;

    // Accepts "2024-2025" and the slash form "2024/2025".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || SchoolYearParseError(s.to_string());
        let (start, end) = s.split_once(['-', '/']).ok_or_else(err)?;
        let start: i32 = start.trim().parse().map_err(|_| err())?;
        let end: i32 = end.trim().parse().map_err(|_| err())?;
        if end <= start {
            return Err(err());
        }
        Ok(Self { start, end })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn september_starts_the_year() {
        assert_eq!(SchoolYear::containing(d(2024, 9, 1)).to_string(), "2024-2025");
        assert_eq!(SchoolYear::containing(d(2025, 8, 31)).to_string(), "2024-2025");
        assert_eq!(SchoolYear::containing(d(2025, 1, 15)).to_string(), "2024-2025");
    }

    #[test]
    fn range_is_september_to_june() {
        let year: SchoolYear = "2024-2025".parse().unwrap();
        assert!(year.contains(d(2024, 9, 1)));
        assert!(year.contains(d(2024, 10, 2)));
        assert!(year.contains(d(2025, 6, 30)));
        assert!(!year.contains(d(2025, 7, 1)));
        assert!(!year.contains(d(2024, 8, 31)));
    }

    #[test]
    fn parses_both_separators() {
        assert_eq!(
            "2023/2024".parse::<SchoolYear>(),
            Ok(SchoolYear { start: 2023, end: 2024 })
        );
        assert_eq!(
            " 2023 - 2024 ".trim().parse::<SchoolYear>(),
            Ok(SchoolYear { start: 2023, end: 2024 })
        );
        assert!("2024".parse::<SchoolYear>().is_err());
        assert!("2025-2024".parse::<SchoolYear>().is_err());
        assert!("abcd-efgh".parse::<SchoolYear>().is_err());
    }
}
