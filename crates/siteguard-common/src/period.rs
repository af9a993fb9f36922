use chrono::{Datelike, Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// Granularity of a reporting period.
///
/// # Examples
///
/// ```
/// use siteguard_common::period::Granularity;
///
/// let g: Granularity = "week".parse().unwrap();
/// assert_eq!(g, Granularity::Week);
/// assert_eq!(g.to_string(), "week");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Week,
    Month,
    Year,
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Granularity::Day => write!(f, "day"),
            Granularity::Week => write!(f, "week"),
            Granularity::Month => write!(f, "month"),
            Granularity::Year => write!(f, "year"),
        }
    }
}

impl std::str::FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "day" => Ok(Granularity::Day),
            "week" => Ok(Granularity::Week),
            "month" => Ok(Granularity::Month),
            "year" => Ok(Granularity::Year),
            _ => Err(format!("unknown period granularity: {s}")),
        }
    }
}

/// One concrete occurrence of a reporting period: a granularity plus
/// the first day of that occurrence. Weeks start on Monday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub granularity: Granularity,
    pub start: NaiveDate,
}

impl Period {
    pub fn new(granularity: Granularity, start: NaiveDate) -> Self {
        Self { granularity, start }
    }

    /// The period of `granularity` that contains `date`, with `start`
    /// normalized to the period boundary.
    pub fn containing(granularity: Granularity, date: NaiveDate) -> Self {
        let start = match granularity {
            Granularity::Day => date,
            Granularity::Week => {
                date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
            }
            Granularity::Month => date.with_day(1).unwrap_or(date),
            Granularity::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date),
        };
        Self { granularity, start }
    }

    /// The immediately preceding occurrence of the same granularity.
    pub fn previous(&self) -> Period {
        let start = match self.granularity {
            Granularity::Day => self.start - Duration::days(1),
            Granularity::Week => self.start - Duration::days(7),
            Granularity::Month => self
                .start
                .checked_sub_months(Months::new(1))
                .unwrap_or(self.start),
            Granularity::Year => self
                .start
                .checked_sub_months(Months::new(12))
                .unwrap_or(self.start),
        };
        Period::new(self.granularity, start)
    }

    /// The same occurrence one year earlier, or `None` for yearly
    /// granularity where a year-over-year baseline is undefined.
    /// Weekly periods step back 52 weeks so the start stays on Monday.
    pub fn previous_year(&self) -> Option<Period> {
        let start = match self.granularity {
            Granularity::Year => return None,
            Granularity::Week => self.start - Duration::days(364),
            _ => self.start.checked_sub_months(Months::new(12))?,
        };
        Some(Period::new(self.granularity, start))
    }

    /// Last day of the period, inclusive.
    pub fn end(&self) -> NaiveDate {
        match self.granularity {
            Granularity::Day => self.start,
            Granularity::Week => self.start + Duration::days(6),
            Granularity::Month => self
                .start
                .checked_add_months(Months::new(1))
                .map(|d| d - Duration::days(1))
                .unwrap_or(self.start),
            Granularity::Year => {
                NaiveDate::from_ymd_opt(self.start.year(), 12, 31).unwrap_or(self.start)
            }
        }
    }

    /// Human-readable heading for message subjects, e.g.
    /// `Thursday 31 December 2009` or `Week 21 December - 27 December 2009`.
    pub fn label(&self) -> String {
        match self.granularity {
            Granularity::Day => self.start.format("%A %-d %B %Y").to_string(),
            Granularity::Week => format!(
                "Week {} - {}",
                self.start.format("%-d %B"),
                self.end().format("%-d %B %Y")
            ),
            Granularity::Month => self.start.format("%Y, %B").to_string(),
            Granularity::Year => self.start.format("%Y").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn containing_normalizes_to_period_start() {
        let p = Period::containing(Granularity::Week, date(2009, 12, 24));
        assert_eq!(p.start, date(2009, 12, 21)); // Monday
        assert_eq!(p.end(), date(2009, 12, 27));

        let p = Period::containing(Granularity::Month, date(2009, 12, 24));
        assert_eq!(p.start, date(2009, 12, 1));
        assert_eq!(p.end(), date(2009, 12, 31));

        let p = Period::containing(Granularity::Year, date(2009, 12, 24));
        assert_eq!(p.start, date(2009, 1, 1));
    }

    #[test]
    fn previous_steps_back_one_occurrence() {
        let day = Period::new(Granularity::Day, date(2010, 1, 1));
        assert_eq!(day.previous().start, date(2009, 12, 31));

        let week = Period::new(Granularity::Week, date(2009, 12, 28));
        assert_eq!(week.previous().start, date(2009, 12, 21));

        let month = Period::new(Granularity::Month, date(2010, 1, 1));
        assert_eq!(month.previous().start, date(2009, 12, 1));

        let year = Period::new(Granularity::Year, date(2010, 1, 1));
        assert_eq!(year.previous().start, date(2009, 1, 1));
    }

    #[test]
    fn previous_year_undefined_for_yearly_periods() {
        let year = Period::new(Granularity::Year, date(2010, 1, 1));
        assert!(year.previous_year().is_none());

        let month = Period::new(Granularity::Month, date(2010, 3, 1));
        assert_eq!(month.previous_year().unwrap().start, date(2009, 3, 1));
    }

    #[test]
    fn previous_year_week_stays_on_monday() {
        let week = Period::new(Granularity::Week, date(2009, 12, 21));
        let prior = week.previous_year().unwrap();
        assert_eq!(
            prior.start.weekday(),
            chrono::Weekday::Mon,
            "was {}",
            prior.start
        );
    }

    #[test]
    fn labels_match_subject_headings() {
        let day = Period::new(Granularity::Day, date(2009, 12, 31));
        assert_eq!(day.label(), "Thursday 31 December 2009");

        let week = Period::new(Granularity::Week, date(2009, 12, 21));
        assert_eq!(week.label(), "Week 21 December - 27 December 2009");

        let month = Period::new(Granularity::Month, date(2009, 12, 1));
        assert_eq!(month.label(), "2009, December");

        let year = Period::new(Granularity::Year, date(2009, 1, 1));
        assert_eq!(year.label(), "2009");
    }
}
