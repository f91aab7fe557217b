use std::io::Read;

use anyhow::Context;
use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::models::{GradeRow, Period, RawGradeRow};

// Legacy grade sheets read blank scores as zero; that stays opt-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingScorePolicy {
    #[default]
    Reject,
    #[value(name = "zero")]
    CoerceToZero,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoreError {
    #[error("missing score")]
    Missing,
    #[error("score '{0}' is not a number")]
    NotNumeric(String),
    #[error("score {0} is outside 0-100")]
    OutOfRange(f64),
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{student} in {subject} ({period}): {source}")]
pub struct IngestError {
    pub student: String,
    pub subject: String,
    pub period: Period,
    #[source]
    pub source: ScoreError,
}

fn parse_score(raw: Option<&str>) -> Result<f64, ScoreError> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Err(ScoreError::Missing),
        Some(raw) => raw,
    };
    let value: f64 = raw
        .parse()
        .map_err(|_| ScoreError::NotNumeric(raw.to_string()))?;
    if !value.is_finite() {
        return Err(ScoreError::NotNumeric(raw.to_string()));
    }
    if !(0.0..=100.0).contains(&value) {
        return Err(ScoreError::OutOfRange(value));
    }
    Ok(value)
}

// Out-of-range scores are rejected under every policy.
pub fn check_score(raw: Option<&str>, policy: MissingScorePolicy) -> Result<f64, ScoreError> {
    match (parse_score(raw), policy) {
        (Ok(value), _) => Ok(value),
        (Err(err @ ScoreError::OutOfRange(_)), _) => Err(err),
        (Err(err), MissingScorePolicy::CoerceToZero) => {
            warn!(raw = ?raw, reason = %err, "coercing unusable score to zero");
            Ok(0.0)
        }
        (Err(err), MissingScorePolicy::Reject) => Err(err),
    }
}

pub fn validate_row(row: &RawGradeRow, policy: MissingScorePolicy) -> Result<GradeRow, IngestError> {
    let period = Period::from_date(row.graded_on);
    let score = check_score(row.score.as_deref(), policy).map_err(|source| IngestError {
        student: row.student_name.clone(),
        subject: row.subject.clone(),
        period,
        source,
    })?;

    Ok(GradeRow {
        student_id: row.student_id,
        subject: row.subject.clone(),
        period,
        score,
    })
}

pub fn partition_rows(
    rows: &[RawGradeRow],
    policy: MissingScorePolicy,
) -> (Vec<GradeRow>, Vec<IngestError>) {
    let mut valid = Vec::with_capacity(rows.len());
    let mut rejected = Vec::new();
    for row in rows {
        match validate_row(row, policy) {
            Ok(grade) => valid.push(grade),
            Err(err) => {
                warn!(error = %err, "skipping grade");
                rejected.push(err);
            }
        }
    }
    (valid, rejected)
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImportRow {
    pub full_name: String,
    pub email: String,
    pub class_name: String,
    pub subject: String,
    pub component: String,
    pub graded_on: NaiveDate,
    pub score: Option<String>,
    pub source_key: Option<String>,
}

// The whole file is validated before anything is stored.
pub fn read_import_rows<R: Read>(
    reader: R,
    policy: MissingScorePolicy,
) -> anyhow::Result<Vec<ImportRow>> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();

    for (index, result) in reader.deserialize::<ImportRow>().enumerate() {
        let record = index + 1;
        let mut row = result.with_context(|| format!("malformed CSV record {record}"))?;
        let score = check_score(row.score.as_deref(), policy).with_context(|| {
            format!(
                "CSV record {record} ({}, {}, {})",
                row.email, row.subject, row.graded_on
            )
        })?;
        row.score = Some(score.to_string());
        rows.push(row);
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const HEADER: &str = "full_name,email,class_name,subject,component,graded_on,score,source_key\n";

    fn raw(score: Option<&str>) -> RawGradeRow {
        RawGradeRow {
            student_id: Uuid::new_v4(),
            student_name: "Nadia Putri".to_string(),
            subject: "Mathematics".to_string(),
            graded_on: NaiveDate::from_ymd_opt(2024, 10, 1).unwrap(),
            score: score.map(str::to_string),
        }
    }

    #[test]
    fn accepts_valid_scores() {
        let row = validate_row(&raw(Some(" 78.5 ")), MissingScorePolicy::Reject).unwrap();
        assert_eq!(row.score, 78.5);
        assert_eq!(row.period.to_string(), "2024/2025-1");
    }

    #[test]
    fn rejects_missing_and_non_numeric_by_default() {
        let missing = validate_row(&raw(None), MissingScorePolicy::Reject).unwrap_err();
        assert_eq!(missing.source, ScoreError::Missing);
        let blank = validate_row(&raw(Some("  ")), MissingScorePolicy::Reject).unwrap_err();
        assert_eq!(blank.source, ScoreError::Missing);
        let text = validate_row(&raw(Some("absent")), MissingScorePolicy::Reject).unwrap_err();
        assert_eq!(text.source, ScoreError::NotNumeric("absent".to_string()));
        assert!(text.to_string().starts_with("Nadia Putri in Mathematics (2024/2025-1)"));
    }

    #[test]
    fn coerces_to_zero_when_asked() {
        for score in [None, Some(""), Some("absent"), Some("NaN")] {
            let row = validate_row(&raw(score), MissingScorePolicy::CoerceToZero).unwrap();
            assert_eq!(row.score, 0.0);
        }
    }

    #[test]
    fn out_of_range_is_always_rejected() {
        for policy in [MissingScorePolicy::Reject, MissingScorePolicy::CoerceToZero] {
            assert_eq!(check_score(Some("104"), policy), Err(ScoreError::OutOfRange(104.0)));
        }
    }

    #[test]
    fn bad_grade_does_not_hide_the_rest() {
        let rows = vec![raw(Some("71")), raw(Some("52")), raw(Some("150"))];
        for policy in [MissingScorePolicy::Reject, MissingScorePolicy::CoerceToZero] {
            let (valid, rejected) = partition_rows(&rows, policy);
            let scores: Vec<f64> = valid.iter().map(|row| row.score).collect();
            assert_eq!(scores, vec![71.0, 52.0]);
            assert_eq!(rejected.len(), 1);
            assert_eq!(rejected[0].source, ScoreError::OutOfRange(150.0));
        }
    }

    #[test]
    fn import_normalizes_valid_scores() {
        let csv = format!(
            "{HEADER}Rin Sato,rin@school.example,XI-B,Physics,final,2024-11-25, 52.50 ,k1\n\
             Rin Sato,rin@school.example,XI-B,Physics,final,2025-05-19,61,\n"
        );
        let rows = read_import_rows(csv.as_bytes(), MissingScorePolicy::Reject).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].score.as_deref(), Some("52.5"));
        assert_eq!(rows[0].source_key.as_deref(), Some("k1"));
        assert_eq!(rows[1].source_key, None);
    }

    #[test]
    fn import_rejects_out_of_range_naming_the_record() {
        let csv = format!(
            "{HEADER}Rin Sato,rin@school.example,XI-B,Physics,final,2024-11-25,71,k1\n\
             Lena Fischer,lena@school.example,XI-B,Physics,final,2024-11-25,150,k2\n"
        );
        for policy in [MissingScorePolicy::Reject, MissingScorePolicy::CoerceToZero] {
            let err = read_import_rows(csv.as_bytes(), policy).unwrap_err();
            let message = format!("{err:#}");
            assert!(message.contains("CSV record 2"), "{message}");
            assert!(message.contains("lena@school.example"), "{message}");
            assert!(message.contains("outside 0-100"), "{message}");
        }
    }

    #[test]
    fn import_blank_score_follows_policy() {
        let csv = format!("{HEADER}Lena Fischer,lena@school.example,XI-B,Physics,final,2024-05-20,,k3\n");
        let err = read_import_rows(csv.as_bytes(), MissingScorePolicy::Reject).unwrap_err();
        assert!(format!("{err:#}").contains("missing score"));

        let rows = read_import_rows(csv.as_bytes(), MissingScorePolicy::CoerceToZero).unwrap();
        assert_eq!(rows[0].score.as_deref(), Some("0"));
    }

    #[test]
    fn demo_sheet_imports_under_default_policy() {
        let csv = include_str!("../demos/sample_grades.csv");
        let rows = read_import_rows(csv.as_bytes(), MissingScorePolicy::Reject).unwrap();
        assert_eq!(rows.len(), 7);
        assert!(rows.iter().all(|row| row.score.is_some()));
    }
}
