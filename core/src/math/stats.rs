pub struct StatsHelper;

impl StatsHelper {
    pub fn mean(samples: &[f64]) -> Option<f64> {
        if samples.is_empty() {
            return None;
        }
        Some(samples.iter().sum::<f64>() / samples.len() as f64)
    }

    /// Population standard deviation (divides by `n`, not `n - 1`).
    pub fn population_std_dev(samples: &[f64]) -> Option<f64> {
        let mean = Self::mean(samples)?;
        let variance = samples
            .iter()
            .map(|&value| (value - mean) * (value - mean))
            .sum::<f64>()
            / samples.len() as f64;
        Some(variance.sqrt())
    }

    /// Upper median: the element at index `len / 2` of the sorted samples.
    pub fn median(samples: &[f64]) -> Option<f64> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        Some(sorted[sorted.len() / 2])
    }

    /// Trapezoidal integral of `values` over `time`.
    pub fn trapezoid(time: &[f64], values: &[f64]) -> f64 {
        time.windows(2)
            .zip(values.windows(2))
            .map(|(t, v)| (t[1] - t[0]) * (v[0] + v[1]) / 2.0)
            .sum()
    }

    /// Largest value and the index of its first occurrence.
    pub fn max_with_index(samples: &[f64]) -> Option<(usize, f64)> {
        samples
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best, (idx, value)| match best {
                Some((_, current)) if current >= value => best,
                _ => Some((idx, value)),
            })
    }
}
