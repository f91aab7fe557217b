use serde::Serialize;
use tracing::trace;

use crate::config::EngineConfig;
use crate::forecast::Forecast;
use crate::models::{InsufficientData, Outcome, Series, Severity, Warning, WarningKind};
use crate::regression::{self, Regression};

pub struct RuleContext<'a> {
    pub config: &'a EngineConfig,
    pub values: &'a [f64],
    pub regression: &'a Regression,
    pub forecast: &'a Outcome<Forecast>,
}

pub trait WarningRule: Send + Sync {
    fn kind(&self) -> WarningKind;

    fn min_points(&self, config: &EngineConfig) -> usize;

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Warning>;
}

pub struct SuddenDrop;

impl WarningRule for SuddenDrop {
    fn kind(&self) -> WarningKind {
        WarningKind::SuddenDrop
    }

    fn min_points(&self, config: &EngineConfig) -> usize {
        config.rule_minimums.sudden_drop
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Warning> {
        let [.., previous, last] = ctx.values else {
            return None;
        };
        let delta = last - previous;
        if delta > ctx.config.sudden_drop_delta {
            return None;
        }
        Some(Warning {
            kind: self.kind(),
            severity: Severity::Critical,
            priority: 0,
            message: format!("Score dropped sharply by {:.1} points", delta.abs()),
            detail: format!("Latest score {last:.1}, previous period {previous:.1}"),
            recommendation: "Meet with the student this week to find out what changed."
                .to_string(),
        })
    }
}

pub struct BelowThreshold;

impl WarningRule for BelowThreshold {
    fn kind(&self) -> WarningKind {
        WarningKind::BelowThreshold
    }

    fn min_points(&self, config: &EngineConfig) -> usize {
        config.rule_minimums.below_threshold
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Warning> {
        let passing = ctx.config.passing_score;
        let streak = ctx
            .values
            .iter()
            .rev()
            .take_while(|&&value| value < passing)
            .count();
        if streak < ctx.config.consecutive_failures {
            return None;
        }
        Some(Warning {
            kind: self.kind(),
            severity: Severity::High,
            priority: 1,
            message: format!("Below passing score for {streak} consecutive periods"),
            detail: format!("Passing score is {passing:.0}"),
            recommendation: "Schedule remedial sessions and review the missed material."
                .to_string(),
        })
    }
}

pub struct DecliningTrend;

impl WarningRule for DecliningTrend {
    fn kind(&self) -> WarningKind {
        WarningKind::DecliningTrend
    }

    fn min_points(&self, config: &EngineConfig) -> usize {
        config.rule_minimums.declining_trend
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Warning> {
        let config = ctx.config;
        let slope = ctx.regression.slope;
        if slope > config.declining_slope {
            return None;
        }
        let severity = if slope <= config.declining_high_slope {
            Severity::High
        } else if slope <= config.declining_medium_slope {
            Severity::Medium
        } else {
            Severity::Low
        };
        Some(Warning {
            kind: self.kind(),
            severity,
            priority: if severity == Severity::High { 1 } else { 2 },
            message: format!("Scores declining by {:.1} points per period", slope.abs()),
            detail: format!(
                "Linear trend over {} periods, R\u{b2} {:.2}",
                ctx.values.len(),
                ctx.regression.r_squared
            ),
            recommendation: "Monitor closely and check in with the subject teacher.".to_string(),
        })
    }
}

pub struct PredictedFailure;

impl WarningRule for PredictedFailure {
    fn kind(&self) -> WarningKind {
        WarningKind::PredictedFailure
    }

    fn min_points(&self, config: &EngineConfig) -> usize {
        config.rule_minimums.predicted_failure
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Warning> {
        let forecast = ctx.forecast.ready()?;
        let passing = ctx.config.passing_score;
        if forecast.predicted_value >= passing {
            return None;
        }
        Some(Warning {
            kind: self.kind(),
            severity: Severity::High,
            priority: 1,
            message: format!(
                "Next period projected at {:.1}, below passing score {passing:.0}",
                forecast.predicted_value
            ),
            detail: format!(
                "Projected range {:.1} to {:.1}",
                forecast.lower_bound, forecast.upper_bound
            ),
            recommendation: "Start intervention now, before the next assessment.".to_string(),
        })
    }
}

pub struct HighVolatility;

impl WarningRule for HighVolatility {
    fn kind(&self) -> WarningKind {
        WarningKind::HighVolatility
    }

    fn min_points(&self, config: &EngineConfig) -> usize {
        config.rule_minimums.high_volatility
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Warning> {
        let spread = regression::population_std_dev(ctx.values);
        if spread <= ctx.config.volatility_std_dev {
            return None;
        }
        Some(Warning {
            kind: self.kind(),
            severity: Severity::Medium,
            priority: 3,
            message: "Scores swing widely between periods".to_string(),
            detail: format!("Standard deviation {spread:.1}"),
            recommendation: "Look for inconsistent study habits or external factors."
                .to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarningReport {
    pub data_points: usize,
    pub warnings: Vec<Warning>,
    pub has_critical: bool,
    pub has_high: bool,
}

impl WarningReport {
    pub fn max_severity(&self) -> Option<Severity> {
        self.warnings.iter().map(|warning| warning.severity).max()
    }
}

pub struct WarningDetector {
    rules: Vec<Box<dyn WarningRule>>,
}

impl Default for WarningDetector {
    fn default() -> Self {
        Self::standard()
    }
}

impl WarningDetector {
    pub fn standard() -> Self {
        Self::with_rules(vec![
            Box::new(SuddenDrop),
            Box::new(BelowThreshold),
            Box::new(DecliningTrend),
            Box::new(PredictedFailure),
            Box::new(HighVolatility),
        ])
    }

    pub fn with_rules(rules: Vec<Box<dyn WarningRule>>) -> Self {
        Self { rules }
    }

    pub fn evaluate(
        &self,
        config: &EngineConfig,
        series: &Series,
        regression: &Regression,
        forecast: &Outcome<Forecast>,
    ) -> Outcome<WarningReport> {
        let data_points = series.len();
        let required = config.min_warning_points();
        if data_points < required {
            return Outcome::InsufficientData(InsufficientData::new(data_points, required));
        }

        let values = series.values();
        let ctx = RuleContext {
            config,
            values: &values,
            regression,
            forecast,
        };

        let mut warnings: Vec<Warning> = self
            .rules
            .iter()
            .filter(|rule| data_points >= rule.min_points(config))
            .filter_map(|rule| {
                let warning = rule.evaluate(&ctx);
                trace!(rule = ?rule.kind(), fired = warning.is_some(), "evaluated warning rule");
                warning
            })
            .collect();
        // Stable: equal priorities keep registration order.
        warnings.sort_by_key(|warning| warning.priority);

        let has_critical = warnings.iter().any(|w| w.severity == Severity::Critical);
        let has_high = warnings.iter().any(|w| w.severity == Severity::High);
        Outcome::Ready(WarningReport {
            data_points,
            warnings,
            has_critical,
            has_high,
        })
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast;

    fn detect_with(config: &EngineConfig, values: &[f64]) -> Outcome<WarningReport> {
        let series = Series::from_values(values);
        let fit = regression::fit(&series);
        let forecast = forecast::forecast_next(config, &series, &fit);
        WarningDetector::standard().evaluate(config, &series, &fit, &forecast)
    }

    fn detect(values: &[f64]) -> Outcome<WarningReport> {
        detect_with(&EngineConfig::default(), values)
    }

    fn kinds(report: &WarningReport) -> Vec<WarningKind> {
        report.warnings.iter().map(|w| w.kind).collect()
    }

    struct Fixed {
        kind: WarningKind,
        priority: u8,
    }

    impl WarningRule for Fixed {
        fn kind(&self) -> WarningKind {
            self.kind
        }

        fn min_points(&self, _config: &EngineConfig) -> usize {
            2
        }

        fn evaluate(&self, _ctx: &RuleContext<'_>) -> Option<Warning> {
            Some(Warning {
                kind: self.kind,
                severity: Severity::Low,
                priority: self.priority,
                message: String::new(),
                detail: String::new(),
                recommendation: String::new(),
            })
        }
    }

    #[test]
    fn single_point_is_insufficient() {
        for values in [&[][..], &[45.0][..]] {
            match detect(values) {
                Outcome::InsufficientData(info) => {
                    assert_eq!(info.data_points, values.len());
                    assert_eq!(info.required_points, 2);
                }
                Outcome::Ready(_) => panic!("expected insufficient data"),
            }
        }
    }

    #[test]
    fn sorts_by_priority_keeping_registration_order() {
        let detector = WarningDetector::with_rules(vec![
            Box::new(Fixed { kind: WarningKind::DecliningTrend, priority: 2 }),
            Box::new(Fixed { kind: WarningKind::SuddenDrop, priority: 0 }),
            Box::new(Fixed { kind: WarningKind::BelowThreshold, priority: 1 }),
            Box::new(Fixed { kind: WarningKind::HighVolatility, priority: 3 }),
            Box::new(Fixed { kind: WarningKind::PredictedFailure, priority: 1 }),
        ]);
        let config = EngineConfig::default();
        let series = Series::from_values(&[70.0, 71.0]);
        let fit = regression::fit(&series);
        let forecast = forecast::forecast_next(&config, &series, &fit);
        let outcome = detector.evaluate(&config, &series, &fit, &forecast);
        let report = outcome.ready().unwrap();
        let priorities: Vec<u8> = report.warnings.iter().map(|w| w.priority).collect();
        assert_eq!(priorities, vec![0, 1, 1, 2, 3]);
        assert_eq!(report.warnings[1].kind, WarningKind::BelowThreshold);
        assert_eq!(report.warnings[2].kind, WarningKind::PredictedFailure);
    }

    #[test]
    fn sudden_drop_precedes_declining_trend() {
        let outcome = detect(&[70.0, 70.0, 40.0]);
        let report = outcome.ready().unwrap();
        assert_eq!(
            kinds(report),
            vec![
                WarningKind::SuddenDrop,
                WarningKind::DecliningTrend,
                WarningKind::PredictedFailure
            ]
        );
        let drop = &report.warnings[0];
        assert_eq!(drop.severity, Severity::Critical);
        assert_eq!(drop.priority, 0);
        // slope -15 over three points
        assert_eq!(report.warnings[1].severity, Severity::High);
        assert!(report.has_critical);
        assert!(report.has_high);
    }

    #[test]
    fn two_failing_periods_trigger_below_threshold() {
        let outcome = detect(&[55.0, 50.0]);
        let report = outcome.ready().unwrap();
        assert_eq!(kinds(report), vec![WarningKind::BelowThreshold]);
        assert_eq!(report.warnings[0].severity, Severity::High);
        assert_eq!(report.warnings[0].priority, 1);
        assert!(!report.has_critical);
    }

    #[test]
    fn drop_of_exactly_fifteen_fires() {
        let outcome = detect(&[80.0, 65.0]);
        assert_eq!(kinds(outcome.ready().unwrap()), vec![WarningKind::SuddenDrop]);
        let outcome = detect(&[80.0, 65.5]);
        assert!(outcome.ready().unwrap().warnings.is_empty());
    }

    #[test]
    fn declining_severity_tiers() {
        // slopes -0.5, -1.0 and -2.0 sit on the tier boundaries
        let low = detect(&[80.0, 79.5, 79.0]);
        let medium = detect(&[80.0, 79.0, 78.0]);
        let high = detect(&[80.0, 78.0, 76.0]);
        let severity = |outcome: &Outcome<WarningReport>| {
            outcome
                .ready()
                .unwrap()
                .warnings
                .iter()
                .find(|w| w.kind == WarningKind::DecliningTrend)
                .map(|w| (w.severity, w.priority))
        };
        assert_eq!(severity(&low), Some((Severity::Low, 2)));
        assert_eq!(severity(&medium), Some((Severity::Medium, 2)));
        assert_eq!(severity(&high), Some((Severity::High, 1)));
        assert_eq!(severity(&detect(&[80.0, 79.8, 79.6])), None);
    }

    #[test]
    fn volatility_needs_four_points() {
        let three = detect(&[90.0, 60.0, 90.0]);
        assert!(!kinds(three.ready().unwrap()).contains(&WarningKind::HighVolatility));

        let four = detect(&[90.0, 65.0, 90.0, 65.0]);
        let report = four.ready().unwrap();
        let volatility = report
            .warnings
            .iter()
            .find(|w| w.kind == WarningKind::HighVolatility)
            .expect("std dev 12.5 exceeds 10");
        assert_eq!(volatility.severity, Severity::Medium);
        assert_eq!(report.warnings.last().map(|w| w.priority), Some(3));
    }

    #[test]
    fn healthy_series_reports_nothing() {
        let outcome = detect(&[80.0, 82.0, 79.0, 83.0, 81.0, 84.0]);
        let report = outcome.ready().unwrap();
        assert!(report.warnings.is_empty());
        assert_eq!(report.max_severity(), None);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let first = serde_json::to_string(&detect(&[70.0, 70.0, 40.0])).unwrap();
        let second = serde_json::to_string(&detect(&[70.0, 70.0, 40.0])).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn passing_score_itself_is_not_failing() {
        let outcome = detect(&[60.0, 60.0]);
        assert!(outcome.ready().unwrap().warnings.is_empty());

        let outcome = detect(&[70.0, 60.0, 59.0]);
        assert!(!kinds(outcome.ready().unwrap()).contains(&WarningKind::BelowThreshold));

        let outcome = detect(&[70.0, 59.9, 59.0]);
        assert!(kinds(outcome.ready().unwrap()).contains(&WarningKind::BelowThreshold));
    }

    #[test]
    fn std_dev_of_exactly_ten_is_not_volatile() {
        // mean 80, every point 10 away
        let outcome = detect(&[70.0, 90.0, 70.0, 90.0]);
        let report = outcome.ready().unwrap();
        assert!(!kinds(report).contains(&WarningKind::HighVolatility));
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn injected_thresholds_reach_the_rules() {
        let mut config = EngineConfig {
            passing_score: 70.0,
            ..EngineConfig::default()
        };
        config.rule_minimums.high_volatility = 5;

        assert!(detect(&[65.0, 62.0]).ready().unwrap().warnings.is_empty());
        let outcome = detect_with(&config, &[65.0, 62.0]);
        assert_eq!(kinds(outcome.ready().unwrap()), vec![WarningKind::BelowThreshold]);
        assert!(outcome.ready().unwrap().warnings[0].detail.contains("70"));

        let volatile = [90.0, 65.0, 90.0, 65.0];
        assert!(kinds(detect(&volatile).ready().unwrap()).contains(&WarningKind::HighVolatility));
        let outcome = detect_with(&config, &volatile);
        assert!(!kinds(outcome.ready().unwrap()).contains(&WarningKind::HighVolatility));
    }

    #[test]
    fn injected_minimum_changes_insufficient_threshold() {
        let config = EngineConfig {
            min_trend_points: 3,
            ..EngineConfig::default()
        };
        match detect_with(&config, &[55.0, 50.0]) {
            Outcome::InsufficientData(info) => assert_eq!(info.required_points, 3),
            Outcome::Ready(_) => panic!("expected insufficient data"),
        }
    }
}
