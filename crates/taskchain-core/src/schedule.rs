//! Provider cron schedules.
//!
//! A schedule has six fields: minute, hour, day-of-month, month, day-of-week
//! and year, rendered as `cron(<min> <hour> <day> <month> <weekday> <year>)`.
//! Exactly one of day-of-month and day-of-week must be `?`.

use crate::error::{Result, TaskchainError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// CronOptions
// ---------------------------------------------------------------------------

/// Field-by-field schedule options. Unset fields take provider defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minute: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hour: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub week_day: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
}

impl CronOptions {
    /// Every ten minutes, around the clock.
    pub fn every_ten_minutes() -> Self {
        Self {
            minute: Some("*/10".to_string()),
            hour: Some("*".to_string()),
            day: Some("*".to_string()),
            month: Some("*".to_string()),
            week_day: None,
            year: Some("*".to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// FieldKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Minute,
    Hour,
    Day,
    Month,
    WeekDay,
    Year,
}

impl FieldKind {
    fn all() -> [FieldKind; 6] {
        [
            FieldKind::Minute,
            FieldKind::Hour,
            FieldKind::Day,
            FieldKind::Month,
            FieldKind::WeekDay,
            FieldKind::Year,
        ]
    }

    fn bounds(self) -> (u32, u32) {
        match self {
            FieldKind::Minute => (0, 59),
            FieldKind::Hour => (0, 23),
            FieldKind::Day => (1, 31),
            FieldKind::Month => (1, 12),
            FieldKind::WeekDay => (1, 7),
            FieldKind::Year => (1970, 2100),
        }
    }

    fn name(self) -> &'static str {
        match self {
            FieldKind::Minute => "minute",
            FieldKind::Hour => "hour",
            FieldKind::Day => "day-of-month",
            FieldKind::Month => "month",
            FieldKind::WeekDay => "day-of-week",
            FieldKind::Year => "year",
        }
    }

    fn named_value(self, token: &str) -> Option<u32> {
        const MONTHS: [&str; 12] = [
            "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
        ];
        const DAYS: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];
        let upper = token.to_ascii_uppercase();
        let table: &[&str] = match self {
            FieldKind::Month => &MONTHS,
            FieldKind::WeekDay => &DAYS,
            _ => return None,
        };
        table
            .iter()
            .position(|n| *n == upper)
            .map(|i| i as u32 + 1)
    }
}

// ---------------------------------------------------------------------------
// CronField
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CronField {
    /// `*`
    Any,
    /// `?`, only valid for day-of-month and day-of-week.
    NoSpecificValue,
    /// `*/step` or `start/step`
    Step { start: u32, step: u32 },
    /// `start-end`, inclusive.
    Range { start: u32, end: u32 },
    /// One value or a comma-separated list.
    Values(Vec<u32>),
}

impl CronField {
    pub fn parse(kind: FieldKind, text: &str) -> std::result::Result<Self, String> {
        let (min, max) = kind.bounds();
        let value = |token: &str| -> std::result::Result<u32, String> {
            let v = match token.parse::<u32>() {
                Ok(v) => v,
                Err(_) => kind
                    .named_value(token)
                    .ok_or_else(|| format!("bad {} value '{token}'", kind.name()))?,
            };
            if v < min || v > max {
                return Err(format!(
                    "{} value {v} out of range {min}-{max}",
                    kind.name()
                ));
            }
            Ok(v)
        };

        match text {
            "" => Err(format!("empty {} field", kind.name())),
            "*" => Ok(CronField::Any),
            "?" => match kind {
                FieldKind::Day | FieldKind::WeekDay => Ok(CronField::NoSpecificValue),
                _ => Err(format!("'?' is not allowed in the {} field", kind.name())),
            },
            _ if text.contains('/') => {
                let (base, step) = text
                    .split_once('/')
                    .ok_or_else(|| format!("bad step '{text}'"))?;
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("bad {} step '{step}'", kind.name()))?;
                if step == 0 || step > max {
                    return Err(format!("{} step {step} out of range", kind.name()));
                }
                let start = if base == "*" { min } else { value(base)? };
                Ok(CronField::Step { start, step })
            }
            _ if text.contains(',') => {
                let values = text
                    .split(',')
                    .map(value)
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(CronField::Values(values))
            }
            _ if text.contains('-') => {
                let (a, b) = text
                    .split_once('-')
                    .ok_or_else(|| format!("bad range '{text}'"))?;
                let (start, end) = (value(a)?, value(b)?);
                if start > end {
                    return Err(format!("{} range {start}-{end} is reversed", kind.name()));
                }
                Ok(CronField::Range { start, end })
            }
            _ => Ok(CronField::Values(vec![value(text)?])),
        }
    }

    fn render(&self, kind: FieldKind) -> String {
        match self {
            CronField::Any => "*".to_string(),
            CronField::NoSpecificValue => "?".to_string(),
            CronField::Step { start, step } if *start == kind.bounds().0 => format!("*/{step}"),
            CronField::Step { start, step } => format!("{start}/{step}"),
            CronField::Range { start, end } => format!("{start}-{end}"),
            CronField::Values(values) => values
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    fn is_wildcard(&self) -> bool {
        matches!(self, CronField::Any | CronField::NoSpecificValue)
    }
}

// ---------------------------------------------------------------------------
// CronSchedule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CronSchedule {
    pub minute: CronField,
    pub hour: CronField,
    pub day: CronField,
    pub month: CronField,
    pub week_day: CronField,
    pub year: CronField,
}

impl CronSchedule {
    /// Build a schedule from options, filling the fields the caller left out.
    ///
    /// Day-of-month defaults to `*` unless a day-of-week was given, in which
    /// case it becomes `?`. Day-of-week defaults to `?`.
    pub fn from_options(opts: &CronOptions) -> Result<Self> {
        if opts.day.is_some() && opts.week_day.is_some() {
            return Err(TaskchainError::InvalidCron {
                expression: format!("{opts:?}"),
                reason: "cannot supply both day and week_day".to_string(),
            });
        }
        let day_default = if opts.week_day.is_some() { "?" } else { "*" };
        let fields = [
            opts.minute.as_deref().unwrap_or("*"),
            opts.hour.as_deref().unwrap_or("*"),
            opts.day.as_deref().unwrap_or(day_default),
            opts.month.as_deref().unwrap_or("*"),
            opts.week_day.as_deref().unwrap_or("?"),
            opts.year.as_deref().unwrap_or("*"),
        ];
        Self::from_fields(&fields.join(" "))
    }

    /// Parse `cron(m h d M w y)`; the `cron(...)` wrapper is optional.
    pub fn parse(expression: &str) -> Result<Self> {
        let trimmed = expression.trim();
        let inner = trimmed
            .strip_prefix("cron(")
            .and_then(|s| s.strip_suffix(')'))
            .unwrap_or(trimmed);
        Self::from_fields(inner).map_err(|e| match e {
            TaskchainError::InvalidCron { reason, .. } => TaskchainError::InvalidCron {
                expression: expression.to_string(),
                reason,
            },
            other => other,
        })
    }

    fn from_fields(text: &str) -> Result<Self> {
        let invalid = |reason: String| TaskchainError::InvalidCron {
            expression: text.to_string(),
            reason,
        };
        let parts: Vec<&str> = text.split_whitespace().collect();
        if parts.len() != 6 {
            return Err(invalid(format!("expected 6 fields, found {}", parts.len())));
        }
        let mut fields = Vec::with_capacity(6);
        for (kind, part) in FieldKind::all().into_iter().zip(parts) {
            fields.push(CronField::parse(kind, part).map_err(invalid)?);
        }
        let mut it = fields.into_iter();
        // Six fields were pushed above.
        let (Some(minute), Some(hour), Some(day), Some(month), Some(week_day), Some(year)) =
            (it.next(), it.next(), it.next(), it.next(), it.next(), it.next())
        else {
            return Err(invalid("expected 6 fields".to_string()));
        };

        let day_unset = day == CronField::NoSpecificValue;
        let week_unset = week_day == CronField::NoSpecificValue;
        if day_unset == week_unset {
            return Err(invalid(
                "exactly one of day-of-month and day-of-week must be '?'".to_string(),
            ));
        }

        Ok(Self {
            minute,
            hour,
            day,
            month,
            week_day,
            year,
        })
    }

    fn rendered_fields(&self) -> [String; 6] {
        [
            self.minute.render(FieldKind::Minute),
            self.hour.render(FieldKind::Hour),
            self.day.render(FieldKind::Day),
            self.month.render(FieldKind::Month),
            self.week_day.render(FieldKind::WeekDay),
            self.year.render(FieldKind::Year),
        ]
    }

    /// Provider schedule expression, e.g. `cron(*/10 * * * ? *)`.
    pub fn expression(&self) -> String {
        format!("cron({})", self.rendered_fields().join(" "))
    }

    pub fn fires_every_minute(&self) -> bool {
        matches!(
            self.minute,
            CronField::Any | CronField::Step { step: 1, .. }
        ) && self.hour == CronField::Any
    }

    /// Short English rendering used by `taskchain schedule`.
    pub fn describe(&self) -> String {
        let minute = match &self.minute {
            CronField::Any => "every minute".to_string(),
            CronField::Step { start: 0, step } => format!("every {step} minutes"),
            CronField::Step { start, step } => format!("every {step} minutes from minute {start}"),
            other => format!("at minute {}", other.render(FieldKind::Minute)),
        };
        let hour = match &self.hour {
            CronField::Any => "every hour".to_string(),
            CronField::Step { step, .. } => format!("every {step} hours"),
            other => format!("at hour {}", other.render(FieldKind::Hour)),
        };
        let day = if self.day.is_wildcard() && self.week_day.is_wildcard() {
            "every day".to_string()
        } else if self.day.is_wildcard() {
            format!("on weekday {}", self.week_day.render(FieldKind::WeekDay))
        } else {
            format!("on day {}", self.day.render(FieldKind::Day))
        };
        let mut parts = vec![minute, hour, day];
        if !self.month.is_wildcard() {
            parts.push(format!("in month {}", self.month.render(FieldKind::Month)));
        }
        if !self.year.is_wildcard() {
            parts.push(format!("in year {}", self.year.render(FieldKind::Year)));
        }
        parts.join(", ")
    }

    /// The same schedule in the seven-field form of the `cron` crate
    /// (seconds first, `?` widened to `*`).
    fn to_cron_crate(&self) -> Result<cron::Schedule> {
        let fields = self.rendered_fields().map(|f| if f == "?" { "*".to_string() } else { f });
        let text = format!("0 {}", fields.join(" "));
        cron::Schedule::from_str(&text).map_err(|e| TaskchainError::InvalidCron {
            expression: self.expression(),
            reason: e.to_string(),
        })
    }

    /// Next `count` fire times strictly after `after`, in UTC.
    pub fn next_fires(&self, after: DateTime<Utc>, count: usize) -> Result<Vec<DateTime<Utc>>> {
        let schedule = self.to_cron_crate()?;
        Ok(schedule.after(&after).take(count).collect())
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression())
    }
}

impl FromStr for CronSchedule {
    type Err = TaskchainError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CronSchedule {
    type Error = TaskchainError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<CronSchedule> for String {
    fn from(s: CronSchedule) -> Self {
        s.expression()
    }
}
