use serde::Serialize;

use crate::models::Series;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Regression {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

impl Regression {
    pub const FLAT: Regression = Regression {
        slope: 0.0,
        intercept: 0.0,
        r_squared: 0.0,
    };

    pub fn predict(&self, index: f64) -> f64 {
        self.slope * index + self.intercept
    }
}

pub fn fit(series: &Series) -> Regression {
    fit_values(&series.values())
}

// Fewer than two values fit as a flat zero line.
pub fn fit_values(values: &[f64]) -> Regression {
    if values.len() < 2 {
        return Regression::FLAT;
    }

    let n = values.len() as f64;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_xx = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_xx += x * x;
    }

    // Non-zero for n >= 2 since the x values are distinct.
    let denominator = n * sum_xx - sum_x * sum_x;
    let slope = (n * sum_xy - sum_x * sum_y) / denominator;
    let intercept = (sum_y - slope * sum_x) / n;

    let mean = sum_y / n;
    let mut ss_total = 0.0;
    let mut ss_residual = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let fitted = slope * i as f64 + intercept;
        ss_total += (y - mean).powi(2);
        ss_residual += (y - fitted).powi(2);
    }
    let r_squared = if ss_total == 0.0 {
        0.0
    } else {
        1.0 - ss_residual / ss_total
    };

    Regression {
        slope,
        intercept,
        r_squared,
    }
}

pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_series_fit_flat() {
        assert_eq!(fit_values(&[]), Regression::FLAT);
        assert_eq!(fit_values(&[88.0]), Regression::FLAT);
    }

    #[test]
    fn constant_series_has_zero_slope_and_r_squared() {
        let fit = fit_values(&[75.0, 75.0, 75.0, 75.0]);
        assert_eq!(fit.slope, 0.0);
        assert_eq!(fit.r_squared, 0.0);
        assert!((fit.intercept - 75.0).abs() < 1e-9);
    }

    #[test]
    fn matches_closed_form_for_six_terms() {
        let fit = fit_values(&[80.0, 82.0, 79.0, 83.0, 81.0, 84.0]);
        // slope = (6*1233 - 15*489) / (6*55 - 15^2) = 63 / 105
        assert!((fit.slope - 0.6).abs() < 1e-12);
        assert!((fit.intercept - 80.0).abs() < 1e-12);
        assert!((fit.r_squared - 0.36).abs() < 1e-9);
    }

    #[test]
    fn perfect_line_has_unit_r_squared() {
        let fit = fit_values(&[60.0, 65.0, 70.0]);
        assert!((fit.slope - 5.0).abs() < 1e-12);
        assert!((fit.r_squared - 1.0).abs() < 1e-12);
        assert!((fit.predict(3.0) - 75.0).abs() < 1e-9);
    }

    #[test]
    fn std_dev_is_population_form() {
        assert_eq!(population_std_dev(&[]), 0.0);
        let sd = population_std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((sd - 2.0).abs() < 1e-12);
    }
}
