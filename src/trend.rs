use serde::Serialize;

use crate::confidence::{self, ConfidenceLevel};
use crate::config::EngineConfig;
use crate::models::{InsufficientData, Outcome};
use crate::regression::Regression;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendCategory {
    StrongIncrease,
    ModerateIncrease,
    Stable,
    MildDecrease,
    SignificantDecrease,
}

impl TrendCategory {
    pub fn label(self) -> &'static str {
        match self {
            TrendCategory::StrongIncrease => "Strong increase",
            TrendCategory::ModerateIncrease => "Moderate increase",
            TrendCategory::Stable => "Stable",
            TrendCategory::MildDecrease => "Mild decrease",
            TrendCategory::SignificantDecrease => "Significant decrease",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendAnalysis {
    pub data_points: usize,
    pub trend_category: TrendCategory,
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub confidence_level: ConfidenceLevel,
    pub confidence_label: &'static str,
    pub interpretation_text: String,
    pub show_low_data_warning: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_data_message: Option<String>,
}

pub fn categorize(config: &EngineConfig, slope: f64) -> TrendCategory {
    if slope > config.strong_increase_slope {
        TrendCategory::StrongIncrease
    } else if slope > config.moderate_increase_slope {
        TrendCategory::ModerateIncrease
    } else if slope >= config.stable_floor_slope {
        TrendCategory::Stable
    } else if slope >= config.mild_decrease_floor_slope {
        TrendCategory::MildDecrease
    } else {
        TrendCategory::SignificantDecrease
    }
}

fn caveat(config: &EngineConfig, data_points: usize) -> &'static str {
    if data_points >= config.clear_pattern_points {
        "pattern clear long-term"
    } else if data_points >= config.emerging_pattern_points {
        "pattern emerging"
    } else if data_points >= config.practical_min_points {
        "watch next period"
    } else {
        "very limited data"
    }
}

fn interpretation(category: TrendCategory, slope: f64, caveat: &str) -> String {
    let movement = match category {
        TrendCategory::Stable => "scores are holding steady".to_string(),
        _ if slope > 0.0 => format!("scores rise about {:.1} points per period", slope),
        _ => format!("scores fall about {:.1} points per period", slope.abs()),
    };
    format!("{}: {} ({})", category.label(), movement, caveat)
}

pub fn classify(
    config: &EngineConfig,
    data_points: usize,
    regression: &Regression,
) -> Outcome<TrendAnalysis> {
    if data_points < config.min_trend_points {
        return Outcome::InsufficientData(InsufficientData::new(
            data_points,
            config.min_trend_points,
        ));
    }

    let category = categorize(config, regression.slope);
    let confidence = confidence::score(config, data_points);
    let show_low_data_warning = data_points < config.practical_min_points;
    let low_data_message = show_low_data_warning.then(|| {
        let missing = config.practical_min_points - data_points;
        format!(
            "Only {data_points} period(s) of grades; {missing} more period(s) recommended before relying on this trend."
        )
    });

    Outcome::Ready(TrendAnalysis {
        data_points,
        trend_category: category,
        slope: regression.slope,
        intercept: regression.intercept,
        r_squared: regression.r_squared,
        confidence_level: confidence.level,
        confidence_label: confidence.label,
        interpretation_text: interpretation(category, regression.slope, caveat(config, data_points)),
        show_low_data_warning,
        low_data_message,
    })
}
