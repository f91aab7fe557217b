use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::forecast::{self, Forecast};
use crate::models::{GradeRow, Outcome, Period, ScorePoint, Series, Severity, Student};
use crate::regression;
use crate::trend::{self, TrendAnalysis};
use crate::warnings::{WarningDetector, WarningReport};

pub type SeriesIndex = BTreeMap<Uuid, BTreeMap<String, Series>>;

// Same-period rows (several graded components in one term) are averaged.
pub fn build_series(rows: &[GradeRow]) -> SeriesIndex {
    let mut sums: BTreeMap<Uuid, BTreeMap<String, BTreeMap<Period, (f64, usize)>>> =
        BTreeMap::new();
    for row in rows {
        let entry = sums
            .entry(row.student_id)
            .or_default()
            .entry(row.subject.clone())
            .or_default()
            .entry(row.period)
            .or_insert((0.0, 0));
        entry.0 += row.score;
        entry.1 += 1;
    }

    sums.into_iter()
        .map(|(student_id, subjects)| {
            let subjects = subjects
                .into_iter()
                .map(|(subject, periods)| {
                    let points = periods
                        .into_iter()
                        .map(|(period, (total, count))| ScorePoint {
                            period,
                            value: total / count as f64,
                        })
                        .collect();
                    (subject, Series::new(points))
                })
                .collect();
            (student_id, subjects)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAnalysis {
    pub subject: String,
    pub series: Series,
    pub trend: Outcome<TrendAnalysis>,
    pub forecast: Outcome<Forecast>,
    pub warnings: Outcome<WarningReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentAnalysis {
    pub student: Student,
    pub subjects: Vec<SubjectAnalysis>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentFlag {
    pub student: Student,
    pub severity: Severity,
    pub warning_count: usize,
    pub subjects: Vec<String>,
    pub headline: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassWarnings {
    pub total_students: usize,
    pub students_with_warnings: usize,
    pub critical: Vec<StudentFlag>,
    pub high: Vec<StudentFlag>,
    pub medium: Vec<StudentFlag>,
}

impl ClassWarnings {
    fn push(&mut self, flag: StudentFlag) {
        self.students_with_warnings += 1;
        match flag.severity {
            Severity::Critical => self.critical.push(flag),
            Severity::High => self.high.push(flag),
            Severity::Medium | Severity::Low => self.medium.push(flag),
        }
    }

    fn sort_buckets(&mut self) {
        for bucket in [&mut self.critical, &mut self.high, &mut self.medium] {
            bucket.sort_by(|a, b| {
                b.warning_count
                    .cmp(&a.warning_count)
                    .then_with(|| a.student.full_name.cmp(&b.student.full_name))
                    .then_with(|| a.student.id.cmp(&b.student.id))
            });
        }
    }
}

pub struct Analyzer<'a> {
    config: &'a EngineConfig,
    detector: WarningDetector,
}

impl<'a> Analyzer<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self::with_detector(config, WarningDetector::standard())
    }

    pub fn with_detector(config: &'a EngineConfig, detector: WarningDetector) -> Self {
        Self { config, detector }
    }

    pub fn analyze_series(&self, subject: &str, series: Series) -> SubjectAnalysis {
        let fit = regression::fit(&series);
        let trend = trend::classify(self.config, series.len(), &fit);
        let forecast = forecast::forecast_next(self.config, &series, &fit);
        let warnings = self.detector.evaluate(self.config, &series, &fit, &forecast);
        debug!(
            subject,
            points = series.len(),
            slope = fit.slope,
            insufficient = trend.is_error(),
            warnings = warnings.ready().map_or(0, |report| report.warnings.len()),
            "analyzed series"
        );
        SubjectAnalysis {
            subject: subject.to_string(),
            series,
            trend,
            forecast,
            warnings,
        }
    }

    pub fn analyze_student(&self, student: &Student, rows: &[GradeRow]) -> StudentAnalysis {
        let mut index = build_series(rows);
        self.analyze_indexed(student, index.remove(&student.id).unwrap_or_default())
    }

    fn analyze_indexed(&self, student: &Student, subjects: BTreeMap<String, Series>) -> StudentAnalysis {
        let subjects = subjects
            .into_iter()
            .map(|(subject, series)| self.analyze_series(&subject, series))
            .collect();
        StudentAnalysis {
            student: student.clone(),
            subjects,
        }
    }

    pub fn analyze_roster(&self, roster: &[Student], rows: &[GradeRow]) -> Vec<StudentAnalysis> {
        let mut index = build_series(rows);
        roster
            .iter()
            .map(|student| self.analyze_indexed(student, index.remove(&student.id).unwrap_or_default()))
            .collect()
    }

    pub fn class_warnings(&self, roster: &[Student], rows: &[GradeRow]) -> ClassWarnings {
        summarize_class(&self.analyze_roster(roster, rows))
    }
}

fn flag_student(analysis: &StudentAnalysis) -> Option<StudentFlag> {
    let reports: Vec<(&str, &WarningReport)> = analysis
        .subjects
        .iter()
        .filter_map(|subject| match &subject.warnings {
            Outcome::Ready(report) if !report.warnings.is_empty() => {
                Some((subject.subject.as_str(), report))
            }
            _ => None,
        })
        .collect();

    let severity = reports.iter().filter_map(|(_, report)| report.max_severity()).max()?;
    let headline = reports
        .iter()
        .flat_map(|(_, report)| report.warnings.iter())
        .min_by_key(|warning| (std::cmp::Reverse(warning.severity), warning.priority))
        .map(|warning| warning.message.clone())
        .unwrap_or_default();

    Some(StudentFlag {
        student: analysis.student.clone(),
        severity,
        warning_count: reports.iter().map(|(_, report)| report.warnings.len()).sum(),
        subjects: reports.iter().map(|(subject, _)| subject.to_string()).collect(),
        headline,
    })
}

// Students without warnings count toward the total but stay out of the buckets.
pub fn summarize_class(analyses: &[StudentAnalysis]) -> ClassWarnings {
    let mut summary = analyses.iter().filter_map(flag_student).fold(
        ClassWarnings {
            total_students: analyses.len(),
            ..ClassWarnings::default()
        },
        |mut summary, flag| {
            summary.push(flag);
            summary
        },
    );
    summary.sort_buckets();
    summary
}
