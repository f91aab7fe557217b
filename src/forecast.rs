use serde::Serialize;

use crate::confidence::{self, ConfidenceLevel};
use crate::config::EngineConfig;
use crate::models::{InsufficientData, Outcome, Period, Series};
use crate::regression::{self, Regression};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Forecast {
    pub data_points: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<Period>,
    pub predicted_value: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub confidence_level: ConfidenceLevel,
    pub confidence_message: String,
}

pub fn forecast_next(
    config: &EngineConfig,
    series: &Series,
    regression: &Regression,
) -> Outcome<Forecast> {
    let data_points = series.len();
    if data_points < config.practical_min_points {
        return Outcome::InsufficientData(InsufficientData::new(
            data_points,
            config.practical_min_points,
        ));
    }

    let predicted = config.clamp_score(regression.predict(data_points as f64));
    let spread = regression::population_std_dev(&series.values());
    let confidence = confidence::score(config, data_points);

    Outcome::Ready(Forecast {
        data_points,
        period: series.last_period().map(Period::next),
        predicted_value: predicted,
        lower_bound: config.clamp_score(predicted - spread),
        upper_bound: config.clamp_score(predicted + spread),
        confidence_level: confidence.level,
        confidence_message: confidence.message,
    })
}
