//! Date span partitioning
//!
//! Splits a date span into an ordered sequence of retrieval windows at a
//! configurable granularity. Windows are contiguous, non-overlapping and
//! chronologically ordered; labels are unique within one run.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// A date span, inclusive of both endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateSpan {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateSpan {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, PipelineError> {
        if end < start {
            return Err(PipelineError::InvalidSpan(format!(
                "end {} precedes start {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// Span covering one full calendar year (Jan 1 through Dec 31).
    pub fn full_year(year: i32) -> Result<Self, PipelineError> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1);
        let end = NaiveDate::from_ymd_opt(year, 12, 31);
        match (start, end) {
            (Some(start), Some(end)) => Ok(Self { start, end }),
            _ => Err(PipelineError::InvalidSpan(format!(
                "year {} is out of range",
                year
            ))),
        }
    }
}

impl fmt::Display for DateSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Partition granularity for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Daily,
    Monthly,
    Quarterly,
    Yearly,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Granularity::Daily => "daily",
            Granularity::Monthly => "monthly",
            Granularity::Quarterly => "quarterly",
            Granularity::Yearly => "yearly",
        };
        f.write_str(name)
    }
}

impl FromStr for Granularity {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" | "day" => Ok(Granularity::Daily),
            "monthly" | "month" => Ok(Granularity::Monthly),
            "quarterly" | "quarter" => Ok(Granularity::Quarterly),
            "yearly" | "year" => Ok(Granularity::Yearly),
            other => Err(PipelineError::Config(format!(
                "unknown granularity: {}",
                other
            ))),
        }
    }
}

/// One retrieval window: a labeled date interval, inclusive of both ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub label: String,
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}..{}]", self.label, self.start, self.end)
    }
}

fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .expect("valid calendar month")
}

/// Generate the ordered window sequence covering `span`.
///
/// Monthly and quarterly labels carry a year prefix only when the span
/// crosses a calendar year boundary, so labels stay unique within one run.
pub fn generate(span: DateSpan, granularity: Granularity) -> Result<Vec<Window>, PipelineError> {
    if span.end < span.start {
        return Err(PipelineError::InvalidSpan(format!(
            "end {} precedes start {}",
            span.end, span.start
        )));
    }

    let multi_year = span.start.year() != span.end.year();
    let mut windows = Vec::new();
    let mut cursor = span.start;

    match granularity {
        Granularity::Daily => {
            let mut counter = 1usize;
            while cursor <= span.end {
                windows.push(Window {
                    start: cursor,
                    end: cursor,
                    label: format!("P{}", counter),
                });
                counter += 1;
                match cursor.succ_opt() {
                    Some(next) => cursor = next,
                    None => break,
                }
            }
        }
        Granularity::Monthly => {
            while cursor <= span.end {
                let month_end = last_day_of_month(cursor.year(), cursor.month());
                let end = month_end.min(span.end);
                let label = if multi_year {
                    format!("{}-M{:02}", cursor.year(), cursor.month())
                } else {
                    format!("M{:02}", cursor.month())
                };
                windows.push(Window {
                    start: cursor,
                    end,
                    label,
                });
                match end.succ_opt() {
                    Some(next) => cursor = next,
                    None => break,
                }
            }
        }
        Granularity::Quarterly => {
            while cursor <= span.end {
                let quarter = cursor.month0() / 3 + 1;
                let quarter_end = last_day_of_month(cursor.year(), quarter * 3);
                let end = quarter_end.min(span.end);
                let label = if multi_year {
                    format!("{}-Q{}", cursor.year(), quarter)
                } else {
                    format!("Q{}", quarter)
                };
                windows.push(Window {
                    start: cursor,
                    end,
                    label,
                });
                match end.succ_opt() {
                    Some(next) => cursor = next,
                    None => break,
                }
            }
        }
        Granularity::Yearly => {
            while cursor <= span.end {
                let year_end = last_day_of_month(cursor.year(), 12);
                let end = year_end.min(span.end);
                windows.push(Window {
                    start: cursor,
                    end,
                    label: format!("Y{}", cursor.year()),
                });
                match end.succ_opt() {
                    Some(next) => cursor = next,
                    None => break,
                }
            }
        }
    }

    Ok(windows)
}
