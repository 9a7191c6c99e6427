//! National holiday calendars used for the `is_holiday` feature.
//!
//! The region is configuration, and a fitted model records the region it was
//! trained with so prediction dates are flagged against the same calendar.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HolidayRegion {
    /// United States federal holidays, with weekend observance shifts.
    #[default]
    Us,
    /// India national holidays (Republic Day, Independence Day, Gandhi Jayanti).
    In,
    /// No holidays; the flag is always zero.
    None,
}

impl HolidayRegion {
    pub fn as_str(&self) -> &'static str {
        match self {
            HolidayRegion::Us => "us",
            HolidayRegion::In => "in",
            HolidayRegion::None => "none",
        }
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        match self {
            HolidayRegion::Us => {
                // Jan 1 falling on a Saturday is observed on Dec 31 of the prior year.
                us_federal_holidays(date.year()).contains(&date)
                    || us_federal_holidays(date.year() + 1).contains(&date)
            }
            HolidayRegion::In => india_national_holidays(date.year()).contains(&date),
            HolidayRegion::None => false,
        }
    }
}

impl std::fmt::Display for HolidayRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HolidayRegion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "us" => Ok(HolidayRegion::Us),
            "in" => Ok(HolidayRegion::In),
            "none" => Ok(HolidayRegion::None),
            other => Err(format!("unknown holiday region: {other}")),
        }
    }
}

/// US federal holidays for a year, including observed dates.
///
/// Fixed-date holidays falling on a Saturday are observed the Friday before
/// and on a Sunday the Monday after. Both the actual and the observed date
/// are flagged.
pub fn us_federal_holidays(year: i32) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(16);

    let mut fixed = |month: u32, day: u32| {
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            days.push(date);
            match date.weekday() {
                Weekday::Sat => days.push(date - Duration::days(1)),
                Weekday::Sun => days.push(date + Duration::days(1)),
                _ => {}
            }
        }
    };

    fixed(1, 1);
    if year >= 2021 {
        fixed(6, 19);
    }
    fixed(7, 4);
    fixed(11, 11);
    fixed(12, 25);

    let floating = [
        // Martin Luther King Jr. Day, Washington's Birthday
        (year >= 1986).then(|| nth_weekday(year, 1, Weekday::Mon, 3)),
        Some(nth_weekday(year, 2, Weekday::Mon, 3)),
        // Memorial Day
        Some(last_weekday(year, 5, Weekday::Mon)),
        // Labor Day, Columbus Day, Thanksgiving
        Some(nth_weekday(year, 9, Weekday::Mon, 1)),
        Some(nth_weekday(year, 10, Weekday::Mon, 2)),
        Some(nth_weekday(year, 11, Weekday::Thu, 4)),
    ];
    days.extend(floating.into_iter().flatten().flatten());

    days.sort();
    days.dedup();
    days
}

/// India national (gazetted, fixed-date) holidays for a year.
pub fn india_national_holidays(year: i32) -> Vec<NaiveDate> {
    [(1, 26), (8, 15), (10, 2)]
        .into_iter()
        .filter_map(|(month, day)| NaiveDate::from_ymd_opt(year, month, day))
        .collect()
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u8) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
}

fn last_weekday(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    nth_weekday(year, month, weekday, 5).or_else(|| nth_weekday(year, month, weekday, 4))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[rstest]
    #[case::new_year(date(2024, 1, 1))]
    #[case::mlk_day(date(2024, 1, 15))]
    #[case::presidents_day(date(2024, 2, 19))]
    #[case::memorial_day(date(2024, 5, 27))]
    #[case::juneteenth(date(2024, 6, 19))]
    #[case::independence_day(date(2024, 7, 4))]
    #[case::labor_day(date(2024, 9, 2))]
    #[case::columbus_day(date(2024, 10, 14))]
    #[case::veterans_day(date(2024, 11, 11))]
    #[case::thanksgiving(date(2024, 11, 28))]
    #[case::christmas(date(2024, 12, 25))]
    fn test_us_holidays_2024(#[case] day: NaiveDate) {
        assert!(HolidayRegion::Us.is_holiday(day));
    }

    #[test]
    fn test_us_observed_shifts() {
        // 2026-07-04 is a Saturday, observed Friday 2026-07-03
        assert!(HolidayRegion::Us.is_holiday(date(2026, 7, 3)));
        // 2022-12-25 is a Sunday, observed Monday 2022-12-26
        assert!(HolidayRegion::Us.is_holiday(date(2022, 12, 26)));
        // 2022-01-01 is a Saturday, observed Friday 2021-12-31
        assert!(HolidayRegion::Us.is_holiday(date(2021, 12, 31)));
    }

    #[test]
    fn test_us_regular_days_are_not_holidays() {
        assert!(!HolidayRegion::Us.is_holiday(date(2024, 3, 12)));
        assert!(!HolidayRegion::Us.is_holiday(date(2024, 8, 15)));
        assert!(!HolidayRegion::Us.is_holiday(date(2020, 6, 19)));
    }

    #[test]
    fn test_india_holidays() {
        assert!(HolidayRegion::In.is_holiday(date(2025, 1, 26)));
        assert!(HolidayRegion::In.is_holiday(date(2025, 8, 15)));
        assert!(HolidayRegion::In.is_holiday(date(2025, 10, 2)));
        assert!(!HolidayRegion::In.is_holiday(date(2025, 7, 4)));
    }

    #[test]
    fn test_none_region() {
        assert!(!HolidayRegion::None.is_holiday(date(2024, 12, 25)));
    }

    #[test]
    fn test_region_parse() {
        assert_eq!("US".parse::<HolidayRegion>().unwrap(), HolidayRegion::Us);
        assert_eq!("in".parse::<HolidayRegion>().unwrap(), HolidayRegion::In);
        assert!("fr".parse::<HolidayRegion>().is_err());
    }
}
