//! Date and hour handling for reanalysis requests.

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TimeParseError {
    #[error("Invalid hour: '{0}'. Expected 0-23 or HH:00")]
    InvalidHour(String),

    #[error("Invalid date: '{0}'. Expected YYYY-MM-DD")]
    InvalidDate(String),
}

/// Parse a comma-separated hour list: `"0,6,12"` or `"00:00,06:00"`.
pub fn parse_hours(s: &str) -> Result<Vec<u8>, TimeParseError> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let hour = part.split(':').next().unwrap_or(part);
            hour.parse::<u8>()
                .ok()
                .filter(|h| *h <= 23)
                .ok_or_else(|| TimeParseError::InvalidHour(part.to_string()))
        })
        .collect()
}

/// Parse an ISO calendar date.
pub fn parse_date(s: &str) -> Result<NaiveDate, TimeParseError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| TimeParseError::InvalidDate(s.to_string()))
}

/// Every calendar day from `start` to `end`, inclusive.
pub fn dates_in_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|d| *d <= end).collect()
}

/// Hour rendered the way the provider expects it (`"06:00"`).
pub fn format_hour(hour: u8) -> String {
    format!("{:02}:00", hour)
}

/// Compact timestamp used in output file names (`20240101_0600`).
pub fn file_stamp(time: &DateTime<Utc>) -> String {
    time.format("%Y%m%d_%H%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_hours_both_forms() {
        assert_eq!(parse_hours("0,6,12").unwrap(), vec![0, 6, 12]);
        assert_eq!(parse_hours("00:00, 18:00").unwrap(), vec![0, 18]);
        assert!(parse_hours("24").is_err());
        assert!(parse_hours("noon").is_err());
    }

    #[test]
    fn test_dates_in_range_inclusive() {
        let start = parse_date("2024-02-28").unwrap();
        let end = parse_date("2024-03-01").unwrap();
        let days = dates_in_range(start, end);
        assert_eq!(days.len(), 3);
        assert_eq!(days[1], NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert!(dates_in_range(end, start).is_empty());
    }

    #[test]
    fn test_file_stamp() {
        let t = Utc.with_ymd_and_hms(2024, 1, 5, 6, 0, 0).unwrap();
        assert_eq!(file_stamp(&t), "20240105_0600");
        assert_eq!(format_hour(6), "06:00");
    }
}
