//! Auction countdown parsing
//!
//! The detail page shows the time left until the auction in four cells
//! (days, hours, minutes, seconds). The cells are decorated with
//! non-breaking spaces and inline markup around the number.

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;

static FIRST_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+").expect("number pattern should compile"));

/// Values read from the four countdown cells
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Countdown {
    pub days: Option<u32>,
    pub hours: Option<u32>,
    pub minutes: Option<u32>,
    pub seconds: Option<u32>,
}

impl Countdown {
    /// Parses the inner HTML of the days, hours, minutes and seconds cells
    pub fn from_cells(cells: &[Option<String>; 4]) -> Self {
        let [days, hours, minutes, seconds] =
            cells.each_ref().map(|cell| cell.as_deref().and_then(parse_countdown_cell));
        Self {
            days,
            hours,
            minutes,
            seconds,
        }
    }

    fn parts(&self) -> [Option<u32>; 4] {
        [self.days, self.hours, self.minutes, self.seconds]
    }
}

/// Reads the first integer of a countdown cell
///
/// Markup and entities are stripped before the number is searched for.
pub fn parse_countdown_cell(inner_html: &str) -> Option<u32> {
    let text: String = Html::parse_fragment(inner_html)
        .root_element()
        .text()
        .collect();
    let text = text.replace('\u{a0}', " ");

    FIRST_NUMBER.find(&text)?.as_str().parse().ok()
}

/// Computes when the auction ends, relative to `now`
///
/// - no cell readable: `None`
/// - every cell zero: `now`
/// - otherwise `now` plus each readable component; unreadable cells count as zero
///
/// An offset that overflows the calendar yields `None`.
pub fn auction_end(countdown: &Countdown, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let parts = countdown.parts();

    if parts.iter().all(Option::is_none) {
        return None;
    }
    if parts.iter().all(|part| *part == Some(0)) {
        return Some(now);
    }

    let offset = Duration::days(i64::from(countdown.days.unwrap_or(0)))
        + Duration::hours(i64::from(countdown.hours.unwrap_or(0)))
        + Duration::minutes(i64::from(countdown.minutes.unwrap_or(0)))
        + Duration::seconds(i64::from(countdown.seconds.unwrap_or(0)));

    now.checked_add_signed(offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    fn countdown(parts: [Option<u32>; 4]) -> Countdown {
        Countdown {
            days: parts[0],
            hours: parts[1],
            minutes: parts[2],
            seconds: parts[3],
        }
    }

    #[test]
    fn test_parse_cell_strips_markup() {
        assert_eq!(parse_countdown_cell("&nbsp;<b>12</b>&nbsp;dias"), Some(12));
        assert_eq!(parse_countdown_cell("<span> 07 </span>"), Some(7));
        assert_eq!(parse_countdown_cell("3 dias 4 horas"), Some(3));
        assert_eq!(parse_countdown_cell("&nbsp;--&nbsp;"), None);
        assert_eq!(parse_countdown_cell(""), None);
    }

    #[test]
    fn test_all_zero_is_now() {
        let end = auction_end(&countdown([Some(0); 4]), now());
        assert_eq!(end, Some(now()));
    }

    #[test]
    fn test_all_absent_is_none() {
        assert_eq!(auction_end(&Countdown::default(), now()), None);
    }

    #[test]
    fn test_one_day() {
        let end = auction_end(&countdown([Some(1), Some(0), Some(0), Some(0)]), now());
        assert_eq!(end, Some(now() + Duration::days(1)));
    }

    #[test]
    fn test_missing_components_count_as_zero() {
        let end = auction_end(&countdown([None, Some(2), None, Some(30)]), now());
        assert_eq!(
            end,
            Some(now() + Duration::hours(2) + Duration::seconds(30))
        );
    }

    #[test]
    fn test_from_cells() {
        let cells = [
            Some("&nbsp;<b>2</b>&nbsp;".to_string()),
            Some("3".to_string()),
            None,
            Some("sem prazo".to_string()),
        ];
        let parsed = Countdown::from_cells(&cells);
        assert_eq!(parsed, countdown([Some(2), Some(3), None, None]));
    }
}
