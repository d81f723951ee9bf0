use crate::prelude::RegressionError;

/// Result of an ordinary least-squares line fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// Pearson correlation coefficient.
    pub r: f64,
}

impl LinearFit {
    pub fn evaluate(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Fits `y = slope * x + intercept` over paired samples.
pub fn linear_regression(
    xs: &[f64],
    ys: &[f64],
    min_points: usize,
) -> Result<LinearFit, RegressionError> {
    let count = xs.len().min(ys.len());
    if count < min_points.max(2) {
        return Err(RegressionError::InsufficientPoints {
            needed: min_points.max(2),
            got: count,
        });
    }

    let n = count as f64;
    let mean_x = xs[..count].iter().sum::<f64>() / n;
    let mean_y = ys[..count].iter().sum::<f64>() / n;

    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for (&x, &y) in xs.iter().zip(ys.iter()) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }

    if sxx == 0.0 {
        return Err(RegressionError::Degenerate);
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    // A perfectly flat y still fits exactly.
    let r = if syy == 0.0 {
        1.0
    } else {
        sxy / (sxx * syy).sqrt()
    };

    Ok(LinearFit {
        slope,
        intercept,
        r,
    })
}

/// Fits `ln(y) = slope * ln(x) + intercept`, i.e. the power law `y = e^intercept * x^slope`.
pub fn log_log_regression(
    xs: &[f64],
    ys: &[f64],
    min_points: usize,
) -> Result<LinearFit, RegressionError> {
    let log_x = log_all(xs)?;
    let log_y = log_all(ys)?;
    linear_regression(&log_x, &log_y, min_points)
}

fn log_all(values: &[f64]) -> Result<Vec<f64>, RegressionError> {
    values
        .iter()
        .map(|&value| {
            if value > 0.0 && value.is_finite() {
                Ok(value.ln())
            } else {
                Err(RegressionError::NonPositive(value))
            }
        })
        .collect()
}
