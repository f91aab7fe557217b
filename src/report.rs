use std::collections::HashMap;
use std::fmt::Write;

use crate::analysis::{ClassWarnings, StudentAnalysis, StudentFlag};
use crate::models::{Outcome, WarningKind};

#[derive(Debug, Clone, PartialEq)]
pub struct WarningKindSummary {
    pub kind: WarningKind,
    pub count: usize,
    pub students: usize,
}

fn kind_label(kind: WarningKind) -> &'static str {
    match kind {
        WarningKind::SuddenDrop => "Sudden drop",
        WarningKind::BelowThreshold => "Below passing score",
        WarningKind::DecliningTrend => "Declining trend",
        WarningKind::PredictedFailure => "Predicted failure",
        WarningKind::HighVolatility => "High volatility",
    }
}

pub fn summarize_by_kind(analyses: &[StudentAnalysis]) -> Vec<WarningKindSummary> {
    let mut map: HashMap<WarningKind, (usize, Vec<uuid::Uuid>)> = HashMap::new();

    for analysis in analyses {
        for subject in &analysis.subjects {
            let Outcome::Ready(report) = &subject.warnings else {
                continue;
            };
            for warning in &report.warnings {
                let entry = map.entry(warning.kind).or_default();
                entry.0 += 1;
                if !entry.1.contains(&analysis.student.id) {
                    entry.1.push(analysis.student.id);
                }
            }
        }
    }

    let mut summaries: Vec<WarningKindSummary> = map
        .into_iter()
        .map(|(kind, (count, students))| WarningKindSummary {
            kind,
            count,
            students: students.len(),
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| kind_label(a.kind).cmp(kind_label(b.kind)))
    });
    summaries
}

fn write_bucket(output: &mut String, title: &str, flags: &[StudentFlag]) {
    let _ = writeln!(output, "### {} ({})", title, flags.len());
    if flags.is_empty() {
        let _ = writeln!(output, "None.");
    }
    for flag in flags {
        let _ = writeln!(
            output,
            "- {} ({}): {} warning(s) in {}. {}",
            flag.student.full_name,
            flag.student.email,
            flag.warning_count,
            flag.subjects.join(", "),
            flag.headline
        );
    }
    let _ = writeln!(output);
}

pub fn write_subject_lines(output: &mut String, analysis: &StudentAnalysis) {
    if analysis.subjects.is_empty() {
        let _ = writeln!(output, "- No grades recorded.");
        return;
    }

    for subject in &analysis.subjects {
        let trend = match &subject.trend {
            Outcome::Ready(trend) => trend.interpretation_text.clone(),
            Outcome::InsufficientData(info) => info.message.clone(),
        };
        let forecast = match &subject.forecast {
            Outcome::Ready(forecast) => format!(
                "next period {:.1} ({:.1} to {:.1})",
                forecast.predicted_value, forecast.lower_bound, forecast.upper_bound
            ),
            Outcome::InsufficientData(_) => "no forecast yet".to_string(),
        };
        let _ = writeln!(
            output,
            "- {} [{} period(s)]: {}; {}",
            subject.subject,
            subject.series.len(),
            trend,
            forecast
        );

        if let Outcome::Ready(report) = &subject.warnings {
            for warning in &report.warnings {
                let _ = writeln!(
                    output,
                    "  - [{}] {}. {} {}",
                    warning.severity, warning.message, warning.detail, warning.recommendation
                );
            }
        }
    }
}

pub fn render_student(analysis: &StudentAnalysis) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "{} ({}, class {})",
        analysis.student.full_name, analysis.student.email, analysis.student.class_name
    );
    write_subject_lines(&mut output, analysis);
    output
}

pub fn build_report(
    class_name: &str,
    summary: &ClassWarnings,
    analyses: &[StudentAnalysis],
) -> String {
    let kinds = summarize_by_kind(analyses);
    let mut output = String::new();

    let _ = writeln!(output, "# Grade Trend Early Warning Report");
    let _ = writeln!(
        output,
        "Class {}: {} of {} students flagged",
        class_name, summary.students_with_warnings, summary.total_students
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Warning Mix");

    if kinds.is_empty() {
        let _ = writeln!(output, "No warnings raised for this class.");
    } else {
        for kind in kinds.iter() {
            let _ = writeln!(
                output,
                "- {}: {} warning(s) across {} student(s)",
                kind_label(kind.kind),
                kind.count,
                kind.students
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Students Needing Attention");
    write_bucket(&mut output, "Critical", &summary.critical);
    write_bucket(&mut output, "High", &summary.high);
    write_bucket(&mut output, "Watch", &summary.medium);

    let _ = writeln!(output, "## Subject Trends");
    if analyses.is_empty() {
        let _ = writeln!(output, "No students enrolled in this class.");
    }
    for analysis in analyses {
        let _ = writeln!(output);
        let _ = writeln!(output, "### {}", analysis.student.full_name);
        write_subject_lines(&mut output, analysis);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Analyzer;
    use crate::config::EngineConfig;
    use crate::models::{GradeRow, Period, Student, Term};
    use uuid::Uuid;

    fn student(name: &str) -> Student {
        Student {
            id: Uuid::new_v4(),
            full_name: name.to_string(),
            email: "student@school.example".to_string(),
            class_name: "XI-A".to_string(),
        }
    }

    fn rows(student: &Student, subject: &str, scores: &[f64]) -> Vec<GradeRow> {
        let mut period = Period::new(2023, Term::First);
        let mut rows = Vec::new();
        for &score in scores {
            rows.push(GradeRow {
                student_id: student.id,
                subject: subject.to_string(),
                period,
                score,
            });
            period = period.next();
        }
        rows
    }

    #[test]
    fn report_lists_buckets_and_trends() {
        let config = EngineConfig::default();
        let analyzer = Analyzer::new(&config);
        let jules = student("Jules Moreno");
        let avery = student("Avery Lee");
        let mut grades = rows(&jules, "Mathematics", &[72.0, 70.0, 66.0, 48.0]);
        grades.extend(rows(&avery, "Mathematics", &[78.0, 80.0, 83.0, 85.0]));
        let roster = vec![avery.clone(), jules.clone()];

        let analyses = analyzer.analyze_roster(&roster, &grades);
        let summary = crate::analysis::summarize_class(&analyses);
        let report = build_report("XI-A", &summary, &analyses);

        assert!(report.contains("Class XI-A: 1 of 2 students flagged"));
        assert!(report.contains("### Critical (1)"));
        assert!(report.contains("- Jules Moreno"));
        assert!(report.contains("### Watch (0)"));
        assert!(report.contains("Strong increase"));
        assert!(report.contains("- Sudden drop: 1 warning(s) across 1 student(s)"));
    }

    #[test]
    fn kind_summary_counts_students_once() {
        let config = EngineConfig::default();
        let analyzer = Analyzer::new(&config);
        let sam = student("Sam Ortiz");
        let mut grades = rows(&sam, "English", &[55.0, 50.0]);
        grades.extend(rows(&sam, "Biology", &[52.0, 51.0]));
        let analyses = vec![analyzer.analyze_student(&sam, &grades)];

        let summaries = summarize_by_kind(&analyses);
        assert_eq!(
            summaries,
            vec![WarningKindSummary {
                kind: WarningKind::BelowThreshold,
                count: 2,
                students: 1,
            }]
        );
    }

    #[test]
    fn student_without_history_says_so() {
        let config = EngineConfig::default();
        let analysis = Analyzer::new(&config).analyze_student(&student("Omar Haddad"), &[]);
        assert!(render_student(&analysis).contains("No grades recorded."));
    }
}
