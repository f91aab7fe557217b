use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Serialize, Serializer};
use uuid::Uuid;

// Academic years start in July.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Term {
    First,
    Second,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    pub start_year: i32,
    pub term: Term,
}

impl Period {
    pub fn new(start_year: i32, term: Term) -> Self {
        Self { start_year, term }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        if date.month() >= 7 {
            Self::new(date.year(), Term::First)
        } else {
            Self::new(date.year() - 1, Term::Second)
        }
    }

    pub fn next(self) -> Self {
        match self.term {
            Term::First => Self::new(self.start_year, Term::Second),
            Term::Second => Self::new(self.start_year + 1, Term::First),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let term = match self.term {
            Term::First => 1,
            Term::Second => 2,
        };
        write!(f, "{}/{}-{}", self.start_year, self.start_year + 1, term)
    }
}

impl Serialize for Period {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePeriodError(pub String);

impl fmt::Display for ParsePeriodError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid period label '{}', expected YYYY/YYYY-T or YYYY-T", self.0)
    }
}

impl std::error::Error for ParsePeriodError {}

impl FromStr for Period {
    type Err = ParsePeriodError;

    // Accepts `2024/2025-1` and the short form `2024-1`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ParsePeriodError(value.to_string());
        let (years, term) = value.trim().rsplit_once('-').ok_or_else(invalid)?;
        let term = match term {
            "1" => Term::First,
            "2" => Term::Second,
            _ => return Err(invalid()),
        };
        let start_year = match years.split_once('/') {
            Some((start, end)) => {
                let start: i32 = start.parse().map_err(|_| invalid())?;
                let end: i32 = end.parse().map_err(|_| invalid())?;
                if end != start + 1 {
                    return Err(invalid());
                }
                start
            }
            None => years.parse().map_err(|_| invalid())?,
        };
        Ok(Self::new(start_year, term))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScorePoint {
    pub period: Period,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Series {
    points: Vec<ScorePoint>,
}

impl Series {
    // Callers average same-period points first; a repeated period keeps its first point.
    pub fn new(mut points: Vec<ScorePoint>) -> Self {
        points.sort_by_key(|point| point.period);
        points.dedup_by_key(|point| point.period);
        Self { points }
    }

    #[cfg(test)]
    pub fn from_values(values: &[f64]) -> Self {
        let mut period = Period::new(2020, Term::First);
        let mut points = Vec::with_capacity(values.len());
        for &value in values {
            points.push(ScorePoint { period, value });
            period = period.next();
        }
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|point| point.value).collect()
    }

    pub fn last_period(&self) -> Option<Period> {
        self.points.last().map(|point| point.period)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Student {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub class_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradeRow {
    pub student_id: Uuid,
    pub subject: String,
    pub period: Period,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawGradeRow {
    pub student_id: Uuid,
    pub student_name: String,
    pub subject: String,
    pub graded_on: NaiveDate,
    pub score: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    SuddenDrop,
    BelowThreshold,
    DecliningTrend,
    PredictedFailure,
    HighVolatility,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub severity: Severity,
    pub priority: u8,
    pub message: String,
    pub detail: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsufficientData {
    pub data_points: usize,
    pub required_points: usize,
    pub message: String,
}

impl InsufficientData {
    pub fn new(data_points: usize, required_points: usize) -> Self {
        let missing = required_points.saturating_sub(data_points);
        Self {
            data_points,
            required_points,
            message: format!(
                "Need {missing} more period(s) of grades ({data_points} of {required_points} available)"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Ready(T),
    InsufficientData(InsufficientData),
}

impl<T> Outcome<T> {
    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::InsufficientData(_))
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Outcome::Ready(value) => Some(value),
            Outcome::InsufficientData(_) => None,
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a, B> {
    error: bool,
    #[serde(flatten)]
    body: &'a B,
}

impl<T: Serialize> Serialize for Outcome<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Outcome::Ready(body) => Envelope { error: false, body }.serialize(serializer),
            Outcome::InsufficientData(body) => Envelope { error: true, body }.serialize(serializer),
        }
    }
}
