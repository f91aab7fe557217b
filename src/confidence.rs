use serde::Serialize;

use crate::config::EngineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Confidence {
    pub level: ConfidenceLevel,
    pub label: &'static str,
    pub message: String,
}

pub fn score(config: &EngineConfig, data_points: usize) -> Confidence {
    let bounds = &config.confidence;
    let (level, label, message) = if data_points >= bounds.very_high {
        (
            ConfidenceLevel::VeryHigh,
            "Very High",
            format!("Confidence is very high: {data_points} periods of history."),
        )
    } else if data_points >= bounds.high {
        (
            ConfidenceLevel::High,
            "High",
            format!("Confidence is high: {data_points} periods give a stable picture."),
        )
    } else if data_points >= bounds.medium {
        (
            ConfidenceLevel::Medium,
            "Medium",
            format!(
                "Confidence is medium; it rises once {} or more periods are available.",
                bounds.high
            ),
        )
    } else if data_points >= bounds.low {
        (
            ConfidenceLevel::Low,
            "Low",
            format!(
                "Confidence is low; treat this as a first signal until {}+ periods exist.",
                bounds.medium
            ),
        )
    } else {
        (
            ConfidenceLevel::VeryLow,
            "Very Low",
            format!(
                "Confidence is very low; results become more accurate after {}+ periods.",
                bounds.low
            ),
        )
    };

    Confidence {
        level,
        label,
        message,
    }
}
