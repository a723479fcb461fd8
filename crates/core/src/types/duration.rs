//! ISO 8601 durations with microsecond precision.
//!
//! A duration is stored as a signed count of microseconds. Calendar units
//! use fixed lengths (a year is 365 days, a month is 30 days) so that two
//! durations can always be compared and normalized without a reference
//! date.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use crate::error::ModelError;

const MICROS_PER_SECOND: i64 = 1_000_000;
const MICROS_PER_MINUTE: i64 = 60 * MICROS_PER_SECOND;
const MICROS_PER_HOUR: i64 = 60 * MICROS_PER_MINUTE;
const MICROS_PER_DAY: i64 = 24 * MICROS_PER_HOUR;
const MICROS_PER_WEEK: i64 = 7 * MICROS_PER_DAY;
const MICROS_PER_MONTH: i64 = 30 * MICROS_PER_DAY;
const MICROS_PER_YEAR: i64 = 365 * MICROS_PER_DAY;

/// A signed span of time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Duration {
    micros: i64,
}

/// Normalized decomposition of a duration's magnitude.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DurationParts {
    pub years: i64,
    pub months: i64,
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
    pub micros: i64,
}

impl Duration {
    pub const ZERO: Duration = Duration { micros: 0 };

    pub fn from_micros(micros: i64) -> Self {
        Duration { micros }
    }

    pub fn from_seconds(seconds: i64) -> Self {
        Duration {
            micros: seconds.saturating_mul(MICROS_PER_SECOND),
        }
    }

    /// Parse the `[-]PnYnMnWnDTnHnMn.nS` subset of ISO 8601.
    pub fn parse(text: &str) -> Result<Self, ModelError> {
        let invalid = || ModelError::InvalidDuration(text.to_string());

        let (negative, rest) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let rest = rest.strip_prefix('P').ok_or_else(invalid)?;
        let (date_part, time_part) = match rest.split_once('T') {
            Some((date, time)) => {
                if time.is_empty() {
                    return Err(invalid());
                }
                (date, Some(time))
            }
            None => (rest, None),
        };
        if date_part.is_empty() && time_part.is_none() {
            return Err(invalid());
        }

        let mut total: i64 = 0;
        let mut accumulate = |amount: i64, unit: i64| -> Result<(), ModelError> {
            total = amount
                .checked_mul(unit)
                .and_then(|v| total.checked_add(v))
                .ok_or_else(invalid)?;
            Ok(())
        };

        let date_units: [(char, i64); 4] = [
            ('Y', MICROS_PER_YEAR),
            ('M', MICROS_PER_MONTH),
            ('W', MICROS_PER_WEEK),
            ('D', MICROS_PER_DAY),
        ];
        for (amount, unit) in split_designators(date_part, &date_units).ok_or_else(invalid)? {
            let whole: i64 = amount.parse().map_err(|_| invalid())?;
            accumulate(whole, unit)?;
        }

        if let Some(time) = time_part {
            let time_units: [(char, i64); 3] = [
                ('H', MICROS_PER_HOUR),
                ('M', MICROS_PER_MINUTE),
                ('S', MICROS_PER_SECOND),
            ];
            for (amount, unit) in split_designators(time, &time_units).ok_or_else(invalid)? {
                if unit == MICROS_PER_SECOND {
                    let micros = parse_seconds(amount).ok_or_else(invalid)?;
                    accumulate(micros, 1)?;
                } else {
                    let whole: i64 = amount.parse().map_err(|_| invalid())?;
                    accumulate(whole, unit)?;
                }
            }
        }

        Ok(Duration {
            micros: if negative { -total } else { total },
        })
    }

    pub fn total_micros(&self) -> i64 {
        self.micros
    }

    /// Total elapsed time in (fractional) seconds.
    pub fn total_seconds(&self) -> f64 {
        self.micros as f64 / MICROS_PER_SECOND as f64
    }

    pub fn is_negative(&self) -> bool {
        self.micros < 0
    }

    pub fn is_zero(&self) -> bool {
        self.micros == 0
    }

    /// Decompose the magnitude into normalized calendar and clock units.
    pub fn parts(&self) -> DurationParts {
        let mut rest = self.micros.unsigned_abs();
        let mut take = |unit: i64| {
            let unit = unit as u64;
            let n = rest / unit;
            rest %= unit;
            n as i64
        };
        let years = take(MICROS_PER_YEAR);
        let months = take(MICROS_PER_MONTH);
        let days = take(MICROS_PER_DAY);
        let hours = take(MICROS_PER_HOUR);
        let minutes = take(MICROS_PER_MINUTE);
        let seconds = take(MICROS_PER_SECOND);
        DurationParts {
            years,
            months,
            days,
            hours,
            minutes,
            seconds,
            micros: rest as i64,
        }
    }

    pub fn shorter_than(&self, other: &Duration) -> bool {
        self.micros < other.micros
    }

    pub fn longer_than_or_equals(&self, other: &Duration) -> bool {
        self.micros >= other.micros
    }
}

/// Split `"1Y2M3D"` into `[("1", YEAR), ("2", MONTH), ("3", DAY)]`,
/// enforcing designator order and rejecting repeats.
fn split_designators<'a>(text: &'a str, units: &[(char, i64)]) -> Option<Vec<(&'a str, i64)>> {
    let mut out = Vec::new();
    let mut next_unit = 0;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if c.is_ascii_digit() || c == '.' {
            continue;
        }
        let pos = units[next_unit..].iter().position(|(d, _)| *d == c)?;
        let amount = &text[start..i];
        if amount.is_empty() {
            return None;
        }
        out.push((amount, units[next_unit + pos].1));
        next_unit += pos + 1;
        start = i + c.len_utf8();
    }
    if start != text.len() {
        return None;
    }
    Some(out)
}

/// Seconds with an optional fraction, truncated to microseconds.
fn parse_seconds(amount: &str) -> Option<i64> {
    let (whole, fraction) = match amount.split_once('.') {
        Some((w, f)) => (w, f),
        None => (amount, ""),
    };
    if whole.is_empty() || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let whole: i64 = whole.parse().ok()?;
    let mut micros: i64 = 0;
    for (i, digit) in fraction.chars().take(6).enumerate() {
        let d = digit.to_digit(10)? as i64;
        micros += d * 10_i64.pow(5 - i as u32);
    }
    whole.checked_mul(MICROS_PER_SECOND)?.checked_add(micros)
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Duration {
        Duration {
            micros: self.micros.saturating_add(rhs.micros),
        }
    }
}

impl Sub for Duration {
    type Output = Duration;

    fn sub(self, rhs: Duration) -> Duration {
        Duration {
            micros: self.micros.saturating_sub(rhs.micros),
        }
    }
}

impl PartialOrd for Duration {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Duration {
    fn cmp(&self, other: &Self) -> Ordering {
        self.micros.cmp(&other.micros)
    }
}

impl FromStr for Duration {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Duration::parse(s)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.micros == 0 {
            return f.write_str("PT0S");
        }
        let p = self.parts();
        if self.is_negative() {
            f.write_str("-")?;
        }
        f.write_str("P")?;
        if p.years > 0 {
            write!(f, "{}Y", p.years)?;
        }
        if p.months > 0 {
            write!(f, "{}M", p.months)?;
        }
        if p.days > 0 {
            write!(f, "{}D", p.days)?;
        }
        if p.hours > 0 || p.minutes > 0 || p.seconds > 0 || p.micros > 0 {
            f.write_str("T")?;
            if p.hours > 0 {
                write!(f, "{}H", p.hours)?;
            }
            if p.minutes > 0 {
                write!(f, "{}M", p.minutes)?;
            }
            if p.micros > 0 {
                let fraction = format!("{:06}", p.micros);
                write!(f, "{}.{}S", p.seconds, fraction.trim_end_matches('0'))?;
            } else if p.seconds > 0 {
                write!(f, "{}S", p.seconds)?;
            }
        }
        Ok(())
    }
}
