//! Relative layout expiry.

use chrono::{DateTime, Duration, Months, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LayoutError, LayoutResult};

/// Timestamp format of the `expires` field
pub const EXPIRES_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Offset from "now" at which a layout expires.
///
/// Years and months are calendar offsets (a month after January 31st is the
/// last day of February); days are 24-hour offsets applied afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelativeExpiration {
    pub days: u32,
    pub months: u32,
    pub years: u32,
}

impl RelativeExpiration {
    pub fn new(days: u32, months: u32, years: u32) -> Self {
        Self {
            days,
            months,
            years,
        }
    }

    pub fn days(days: u32) -> Self {
        Self::new(days, 0, 0)
    }

    pub fn months(months: u32) -> Self {
        Self::new(0, months, 0)
    }

    pub fn years(years: u32) -> Self {
        Self::new(0, 0, years)
    }

    /// The expiry instant for a layout created at `now`, in whole seconds.
    pub fn expires_at(&self, now: DateTime<Utc>) -> LayoutResult<DateTime<Utc>> {
        let out_of_range = || {
            LayoutError::InvalidInput(format!(
                "expiry {} years, {} months, {} days is out of range",
                self.years, self.months, self.days
            ))
        };

        let total_months = self
            .years
            .checked_mul(12)
            .and_then(|m| m.checked_add(self.months))
            .ok_or_else(out_of_range)?;

        now.trunc_subsecs(0)
            .checked_add_months(Months::new(total_months))
            .and_then(|t| t.checked_add_signed(Duration::days(i64::from(self.days))))
            .ok_or_else(out_of_range)
    }
}

/// Render an instant the way the `expires` field stores it.
pub fn format_expires(at: DateTime<Utc>) -> String {
    at.format(EXPIRES_FORMAT).to_string()
}

/// Parse an `expires` value.
pub fn parse_expires(s: &str) -> LayoutResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| LayoutError::InvalidInput(format!("invalid expires timestamp {s:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_zero_offset_truncates_subseconds() {
        let now = at(2024, 3, 1, 12, 0, 5) + Duration::milliseconds(750);
        let expires = RelativeExpiration::default().expires_at(now).unwrap();
        assert_eq!(expires, at(2024, 3, 1, 12, 0, 5));
        assert_eq!(format_expires(expires), "2024-03-01T12:00:05Z");
    }

    #[test]
    fn test_one_year() {
        let now = at(2024, 3, 1, 12, 0, 0);
        let expires = RelativeExpiration::years(1).expires_at(now).unwrap();
        assert_eq!(format_expires(expires), "2025-03-01T12:00:00Z");
    }

    #[test]
    fn test_month_end_clamps() {
        let now = at(2023, 1, 31, 0, 0, 0);
        let expires = RelativeExpiration::months(1).expires_at(now).unwrap();
        assert_eq!(expires, at(2023, 2, 28, 0, 0, 0));
    }

    #[test]
    fn test_leap_day_plus_year() {
        let now = at(2024, 2, 29, 8, 30, 0);
        let expires = RelativeExpiration::years(1).expires_at(now).unwrap();
        assert_eq!(expires, at(2025, 2, 28, 8, 30, 0));
    }

    #[test]
    fn test_days_after_months() {
        let now = at(2024, 1, 31, 0, 0, 0);
        let expires = RelativeExpiration::new(1, 1, 0).expires_at(now).unwrap();
        // Jan 31 + 1 month = Feb 29 (leap year), + 1 day = Mar 1
        assert_eq!(expires, at(2024, 3, 1, 0, 0, 0));
    }

    #[test]
    fn test_overflow_is_invalid_input() {
        let now = at(2024, 1, 1, 0, 0, 0);
        let err = RelativeExpiration::years(u32::MAX).expires_at(now).unwrap_err();
        assert!(matches!(err, LayoutError::InvalidInput(_)));
    }

    #[test]
    fn test_parse_round_trip() {
        let t = at(2030, 12, 24, 23, 59, 59);
        assert_eq!(parse_expires(&format_expires(t)).unwrap(), t);
        assert!(parse_expires("next tuesday").is_err());
    }
}
