use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{Datelike, NaiveDate, Weekday};
use tracing::{info, warn};

use crate::store::{HolidayStore, StoreError};

const DATE_FORMAT: &str = "%d-%m-%Y";
const DEFAULT_HOLIDAY_NAME: &str = "Festivo";

/// Answers "is this a school day" questions for the reconciler.
///
/// Holidays live in the holiday store (kept in sync with a local file);
/// vacation days are held in memory and reloaded from their own file.
pub struct HolidayCalendar {
    holidays: Arc<dyn HolidayStore>,
    vacations: RwLock<BTreeSet<NaiveDate>>,
}

impl HolidayCalendar {
    pub fn new(holidays: Arc<dyn HolidayStore>) -> Self {
        Self {
            holidays,
            vacations: RwLock::new(BTreeSet::new()),
        }
    }

    pub fn is_weekend(date: NaiveDate) -> bool {
        matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    pub fn is_vacation(&self, date: NaiveDate) -> bool {
        self.vacations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&date)
    }

    pub async fn is_holiday(&self, date: NaiveDate) -> Result<bool, StoreError> {
        self.holidays.exists_on_date(date).await
    }

    pub fn set_vacations<I: IntoIterator<Item = NaiveDate>>(&self, days: I) {
        let days: BTreeSet<NaiveDate> = days.into_iter().collect();
        *self.vacations.write().unwrap_or_else(PoisonError::into_inner) = days;
    }

    /// Reloads vacations from `path`. A missing file leaves no vacation days.
    pub async fn load_vacations(&self, path: &Path) -> usize {
        let days = match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let parsed = parse_vacations(&content);
                for token in &parsed.invalid {
                    warn!(file = %path.display(), token = %token, "Ignoring malformed vacation entry");
                }
                parsed.dates
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Vacations file not readable, assuming none");
                Vec::new()
            }
        };
        let count = days.len();
        self.set_vacations(days);
        info!(count, "Vacation days loaded");
        count
    }

    /// Re-imports the holiday file into the store and reloads vacations.
    pub async fn refresh(&self, holidays_file: &Path, vacations_file: &Path) {
        if let Err(e) = sync_holidays_from_file(self.holidays.as_ref(), holidays_file).await {
            warn!(error = %e, "Holiday import failed, keeping stored holidays");
        }
        self.load_vacations(vacations_file).await;
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ParsedDates {
    pub dates: Vec<NaiveDate>,
    pub invalid: Vec<String>,
}

fn tokens(content: &str) -> impl Iterator<Item = &str> {
    content
        .split([';', '\n', '\r'])
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn parse_date(token: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(token.trim(), DATE_FORMAT).ok()
}

/// Parses `dd-mm-yyyy` dates separated by `;` or newlines.
pub fn parse_holidays(content: &str) -> ParsedDates {
    let mut parsed = ParsedDates::default();
    for token in tokens(content) {
        match parse_date(token) {
            Some(date) => parsed.dates.push(date),
            None => parsed.invalid.push(token.to_string()),
        }
    }
    parsed
}

/// Like [`parse_holidays`], plus closed ranges written `dd-mm-yyyy..dd-mm-yyyy`.
pub fn parse_vacations(content: &str) -> ParsedDates {
    let mut parsed = ParsedDates::default();
    for token in tokens(content) {
        let range = match token.split_once("..") {
            Some((from, to)) => parse_date(from).zip(parse_date(to)),
            None => parse_date(token).map(|d| (d, d)),
        };
        match range {
            Some((from, to)) if from <= to => {
                parsed.dates.extend(from.iter_days().take_while(|d| *d <= to));
            }
            _ => parsed.invalid.push(token.to_string()),
        }
    }
    parsed
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct HolidaySync {
    pub inserted: usize,
    pub removed: usize,
    pub total: usize,
}

/// Makes the holiday store mirror the dates listed in `path`.
///
/// Stored dates missing from the file are deleted, new ones are inserted.
pub async fn sync_holidays_from_file(
    store: &dyn HolidayStore,
    path: &Path,
) -> anyhow::Result<HolidaySync> {
    let content = tokio::fs::read_to_string(path).await?;
    let parsed = parse_holidays(&content);
    for token in &parsed.invalid {
        warn!(file = %path.display(), token = %token, "Ignoring malformed holiday date");
    }
    let wanted: BTreeSet<NaiveDate> = parsed.dates.into_iter().collect();

    let stored = store.find_all().await?;
    let mut sync = HolidaySync::default();
    let mut present = BTreeSet::new();

    for holiday in stored {
        if wanted.contains(&holiday.date) {
            present.insert(holiday.date);
        } else if store.delete(holiday.id).await? {
            sync.removed += 1;
        }
    }

    for date in wanted.difference(&present) {
        store.insert(*date, DEFAULT_HOLIDAY_NAME).await?;
        sync.inserted += 1;
    }

    sync.total = wanted.len();
    info!(
        inserted = sync.inserted,
        removed = sync.removed,
        total = sync.total,
        "Holidays synchronised"
    );
    Ok(sync)
}
