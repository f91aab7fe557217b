use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Sample counts at which each confidence bucket starts; below `low` is very low.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfidenceBoundaries {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub very_high: usize,
}

impl Default for ConfidenceBoundaries {
    fn default() -> Self {
        Self {
            low: 3,
            medium: 4,
            high: 6,
            very_high: 9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuleMinimums {
    pub sudden_drop: usize,
    pub below_threshold: usize,
    pub declining_trend: usize,
    pub predicted_failure: usize,
    pub high_volatility: usize,
}

impl Default for RuleMinimums {
    fn default() -> Self {
        Self {
            sudden_drop: 2,
            below_threshold: 2,
            declining_trend: 3,
            predicted_failure: 3,
            high_volatility: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub min_trend_points: usize,
    pub practical_min_points: usize,
    pub emerging_pattern_points: usize,
    pub clear_pattern_points: usize,

    pub score_floor: f64,
    pub score_ceiling: f64,

    pub strong_increase_slope: f64,
    pub moderate_increase_slope: f64,
    pub stable_floor_slope: f64,
    pub mild_decrease_floor_slope: f64,

    pub confidence: ConfidenceBoundaries,

    // KKM
    pub passing_score: f64,
    pub sudden_drop_delta: f64,
    pub consecutive_failures: usize,
    pub declining_slope: f64,
    pub declining_medium_slope: f64,
    pub declining_high_slope: f64,
    pub volatility_std_dev: f64,
    pub rule_minimums: RuleMinimums,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_trend_points: 2,
            practical_min_points: 3,
            emerging_pattern_points: 4,
            clear_pattern_points: 6,
            score_floor: 0.0,
            score_ceiling: 100.0,
            strong_increase_slope: 1.0,
            moderate_increase_slope: 0.3,
            stable_floor_slope: -0.3,
            mild_decrease_floor_slope: -1.0,
            confidence: ConfidenceBoundaries::default(),
            passing_score: 60.0,
            sudden_drop_delta: -15.0,
            consecutive_failures: 2,
            declining_slope: -0.5,
            declining_medium_slope: -1.0,
            declining_high_slope: -2.0,
            volatility_std_dev: 10.0,
            rule_minimums: RuleMinimums::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: EngineConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_trend_points < 2 {
            return Err(ConfigError::Invalid(
                "min_trend_points must be at least 2".to_string(),
            ));
        }
        if self.practical_min_points < self.min_trend_points {
            return Err(ConfigError::Invalid(
                "practical_min_points must not be below min_trend_points".to_string(),
            ));
        }
        if !(self.practical_min_points <= self.emerging_pattern_points
            && self.emerging_pattern_points <= self.clear_pattern_points)
        {
            return Err(ConfigError::Invalid(
                "pattern tiers must ascend: practical <= emerging <= clear".to_string(),
            ));
        }
        if self.score_floor >= self.score_ceiling {
            return Err(ConfigError::Invalid(format!(
                "score range [{}, {}] is empty",
                self.score_floor, self.score_ceiling
            )));
        }
        if !(self.strong_increase_slope > self.moderate_increase_slope
            && self.moderate_increase_slope > self.stable_floor_slope
            && self.stable_floor_slope > self.mild_decrease_floor_slope)
        {
            return Err(ConfigError::Invalid(
                "slope cut points must strictly descend from strong increase to mild decrease"
                    .to_string(),
            ));
        }
        let bounds = &self.confidence;
        if !(bounds.low < bounds.medium && bounds.medium < bounds.high && bounds.high < bounds.very_high)
        {
            return Err(ConfigError::Invalid(
                "confidence boundaries must strictly ascend".to_string(),
            ));
        }
        if !(self.declining_slope >= self.declining_medium_slope
            && self.declining_medium_slope >= self.declining_high_slope)
        {
            return Err(ConfigError::Invalid(
                "declining slopes must descend: trigger >= medium >= high".to_string(),
            ));
        }
        let minimums = &self.rule_minimums;
        let smallest = [
            minimums.sudden_drop,
            minimums.below_threshold,
            minimums.declining_trend,
            minimums.predicted_failure,
            minimums.high_volatility,
        ]
        .into_iter()
        .min()
        .unwrap_or(0);
        if smallest < self.min_trend_points {
            return Err(ConfigError::Invalid(
                "rule minimums must not be below min_trend_points".to_string(),
            ));
        }
        if minimums.predicted_failure < self.practical_min_points {
            return Err(ConfigError::Invalid(
                "predicted_failure needs at least practical_min_points".to_string(),
            ));
        }
        if self.consecutive_failures == 0 {
            return Err(ConfigError::Invalid(
                "consecutive_failures must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn clamp_score(&self, value: f64) -> f64 {
        value.clamp(self.score_floor, self.score_ceiling)
    }

    pub fn min_warning_points(&self) -> usize {
        self.min_trend_points
    }
}
