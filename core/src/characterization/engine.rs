//! Propellant burn-rate law from several firings of the same propellant.
//!
//! Each loaded firing contributes its average chamber pressure, burn time and
//! C*. Once the operator supplies the burning web of at least three firings,
//! `r = a * P^n` is fitted in log-log space.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::math::{log_log_regression, StatsHelper};
use crate::prelude::CharacterizationError;
use crate::processing::FiringFile;
use crate::telemetry::LogManager;

pub const MIN_CHARACTERIZATION_POINTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterizationPoint {
    pub source_path: PathBuf,
    /// Pa
    pub average_pressure: f64,
    /// s
    pub burn_time: f64,
    /// m/s
    pub c_star: f64,
    /// Web thickness burned through, m.
    pub burn_web: Option<f64>,
}

impl CharacterizationPoint {
    /// m/s; `None` until a web is set.
    pub fn burn_rate(&self) -> Option<f64> {
        match self.burn_web {
            Some(web) if self.burn_time > 0.0 => Some(web / self.burn_time),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterizationResult {
    /// Burn-rate coefficient.
    pub a: f64,
    /// Pressure exponent.
    pub n: f64,
    pub r: f64,
    pub c_star: f64,
    pub c_star_std_dev: f64,
    pub min_pressure: f64,
    pub max_pressure: f64,
}

impl CharacterizationResult {
    pub fn burn_rate_at(&self, pressure: f64) -> f64 {
        self.a * pressure.powf(self.n)
    }
}

pub struct CharacterizationEngine {
    points: Vec<CharacterizationPoint>,
    logger: LogManager,
}

impl CharacterizationEngine {
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
            logger: LogManager::new("characterization"),
        }
    }

    pub fn points(&self) -> &[CharacterizationPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn load_firing<P: AsRef<Path>>(&mut self, path: P) -> Result<usize, CharacterizationError> {
        let path = path.as_ref();
        self.ensure_new(path)?;
        let firing = FiringFile::load(path)?;
        self.add_firing(path, &firing)
    }

    /// Reprocesses `firing` and appends its point. Returns the new index.
    pub fn add_firing<P: AsRef<Path>>(
        &mut self,
        path: P,
        firing: &FiringFile,
    ) -> Result<usize, CharacterizationError> {
        let path = path.as_ref();
        self.ensure_new(path)?;
        if firing.pressure_conv.is_none() {
            return Err(CharacterizationError::NoPressureData(path.to_path_buf()));
        }
        let result = firing.process()?;
        let point = CharacterizationPoint {
            source_path: path.to_path_buf(),
            average_pressure: result.average_pressure(),
            burn_time: result.burn_time(),
            c_star: result.c_star(),
            burn_web: None,
        };
        self.logger.record(&format!(
            "loaded {} (average pressure {:.0} Pa, burn time {:.3} s)",
            path.display(),
            point.average_pressure,
            point.burn_time
        ));
        self.points.push(point);
        Ok(self.points.len() - 1)
    }

    fn ensure_new(&self, path: &Path) -> Result<(), CharacterizationError> {
        if self.points.iter().any(|p| p.source_path == path) {
            return Err(CharacterizationError::AlreadyLoaded(path.to_path_buf()));
        }
        Ok(())
    }

    pub fn set_web(&mut self, index: usize, web: Option<f64>) -> Result<(), CharacterizationError> {
        let point = self
            .points
            .get_mut(index)
            .ok_or(CharacterizationError::InvalidIndex(index))?;
        point.burn_web = web;
        Ok(())
    }

    pub fn set_all_webs(&mut self, web: Option<f64>) {
        for point in &mut self.points {
            point.burn_web = web;
        }
    }

    pub fn remove(&mut self, index: usize) -> Result<CharacterizationPoint, CharacterizationError> {
        if index >= self.points.len() {
            return Err(CharacterizationError::InvalidIndex(index));
        }
        Ok(self.points.remove(index))
    }

    /// `(average pressure, burn rate)` of every point with a web.
    pub fn burn_rate_points(&self) -> Vec<(f64, f64)> {
        self.points
            .iter()
            .filter_map(|p| p.burn_rate().map(|rate| (p.average_pressure, rate)))
            .collect()
    }

    pub fn try_result(&self) -> Result<CharacterizationResult, CharacterizationError> {
        if self.points.is_empty() {
            return Err(CharacterizationError::Empty);
        }
        let c_stars: Vec<f64> = self.points.iter().map(|p| p.c_star).collect();
        let c_star = StatsHelper::mean(&c_stars).ok_or(CharacterizationError::Empty)?;
        let c_star_std_dev =
            StatsHelper::population_std_dev(&c_stars).ok_or(CharacterizationError::Empty)?;

        let pressures = self.points.iter().map(|p| p.average_pressure);
        let min_pressure = pressures.clone().fold(f64::INFINITY, f64::min);
        let max_pressure = pressures.fold(f64::NEG_INFINITY, f64::max);

        let (rate_pressures, rates): (Vec<f64>, Vec<f64>) =
            self.burn_rate_points().into_iter().unzip();
        let fit = log_log_regression(&rate_pressures, &rates, MIN_CHARACTERIZATION_POINTS)?;

        Ok(CharacterizationResult {
            a: fit.intercept.exp(),
            n: fit.slope,
            r: fit.r,
            c_star,
            c_star_std_dev,
            min_pressure,
            max_pressure,
        })
    }

    /// Like [`try_result`](Self::try_result), but an unavailable result is
    /// only logged.
    pub fn result(&self) -> Option<CharacterizationResult> {
        match self.try_result() {
            Ok(result) => Some(result),
            Err(err) => {
                self.logger
                    .detail(&format!("characterization unavailable: {}", err));
                None
            }
        }
    }
}

impl Default for CharacterizationEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::RegressionError;
    use crate::processing::{Converter, MotorConfig, MotorOrientation, RawData, TransducerKind};
    use approx::assert_relative_eq;
    use tempfile::tempdir;

    const A: f64 = 2.0e-5;
    const N: f64 = 0.35;

    /// Flat pressure burn of `burn_samples` samples at `counts` above baseline.
    fn pressure_firing(counts: f64, burn_samples: u32) -> FiringFile {
        let mut raw = RawData::default();
        for i in 0..(20 + burn_samples) {
            let burning = (15..15 + burn_samples).contains(&i);
            let pressure = if burning { 50_000.0 + counts } else { 50_000.0 };
            raw.push(10.0 + 10.0 * f64::from(i), 0.0, pressure);
        }
        FiringFile {
            raw_data: raw,
            motor_info: MotorConfig {
                orientation: MotorOrientation::Horizontal,
                ..MotorConfig::default()
            },
            force_conv: None,
            pressure_conv: Some(Converter::new(
                "pt",
                TransducerKind::PressureTransducer,
                10.0,
                -1000.0,
            )),
        }
    }

    fn engine_with_three() -> CharacterizationEngine {
        let mut engine = CharacterizationEngine::new();
        engine.add_firing("a.json", &pressure_firing(100_000.0, 11)).unwrap();
        engine.add_firing("b.json", &pressure_firing(200_000.0, 21)).unwrap();
        engine.add_firing("c.json", &pressure_firing(400_000.0, 41)).unwrap();
        engine
    }

    fn matching_web(point: &CharacterizationPoint) -> f64 {
        A * point.average_pressure.powf(N) * point.burn_time
    }

    #[test]
    fn extracts_pressure_and_burn_time() {
        let engine = engine_with_three();
        let first = &engine.points()[0];
        assert_relative_eq!(first.average_pressure, 1.0e6, max_relative = 1e-9);
        assert_relative_eq!(first.burn_time, 0.1, epsilon = 1e-12);
        assert_eq!(first.burn_rate(), None);
    }

    #[test]
    fn fits_power_law_once_webs_are_set() {
        let mut engine = engine_with_three();
        assert!(matches!(
            engine.try_result(),
            Err(CharacterizationError::Regression(
                RegressionError::InsufficientPoints { needed: 3, got: 0 }
            ))
        ));
        assert_eq!(engine.result(), None);

        let webs: Vec<f64> = engine.points().iter().map(matching_web).collect();
        for (index, web) in webs.into_iter().enumerate() {
            engine.set_web(index, Some(web)).unwrap();
        }
        let result = engine.result().unwrap();
        assert_relative_eq!(result.n, N, epsilon = 1e-9);
        assert_relative_eq!(result.a, A, max_relative = 1e-6);
        assert_relative_eq!(result.r, 1.0, epsilon = 1e-9);
        assert_relative_eq!(result.min_pressure, 1.0e6, max_relative = 1e-9);
        assert_relative_eq!(result.max_pressure, 4.0e6, max_relative = 1e-9);
        assert_relative_eq!(
            result.burn_rate_at(2.0e6),
            A * 2.0e6_f64.powf(N),
            max_relative = 1e-6
        );
        assert!(result.c_star_std_dev > 0.0);
        assert_eq!(engine.burn_rate_points().len(), 3);
    }

    #[test]
    fn c_star_statistics_include_points_without_webs() {
        let mut engine = engine_with_three();
        engine.set_all_webs(Some(0.01));
        engine.set_web(2, None).unwrap();
        assert_eq!(engine.burn_rate_points().len(), 2);
        assert!(engine.result().is_none());

        engine.set_all_webs(Some(0.01));
        let result = engine.result().unwrap();
        let mean = engine.points().iter().map(|p| p.c_star).sum::<f64>() / 3.0;
        assert_relative_eq!(result.c_star, mean, max_relative = 1e-12);
    }

    #[test]
    fn rejects_duplicates_and_missing_pressure() {
        let mut engine = engine_with_three();
        assert!(matches!(
            engine.add_firing("a.json", &pressure_firing(1.0, 11)),
            Err(CharacterizationError::AlreadyLoaded(_))
        ));

        let mut no_pressure = pressure_firing(100_000.0, 11);
        no_pressure.pressure_conv = None;
        no_pressure.force_conv = Some(Converter::new("cell", TransducerKind::LoadCell, 1.0, 0.0));
        assert!(matches!(
            engine.add_firing("d.json", &no_pressure),
            Err(CharacterizationError::NoPressureData(_))
        ));

        assert!(matches!(engine.remove(9), Err(CharacterizationError::InvalidIndex(9))));
        engine.remove(0).unwrap();
        assert_eq!(engine.len(), 2);
        engine.add_firing("a.json", &pressure_firing(100_000.0, 11)).unwrap();
        assert!(matches!(
            CharacterizationEngine::new().try_result(),
            Err(CharacterizationError::Empty)
        ));
    }

    #[test]
    fn loads_firing_files_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("firing.json");
        pressure_firing(100_000.0, 11).save(&path).unwrap();

        let mut engine = CharacterizationEngine::new();
        assert_eq!(engine.load_firing(&path).unwrap(), 0);
        assert!(matches!(
            engine.load_firing(&path),
            Err(CharacterizationError::AlreadyLoaded(_))
        ));
        assert!(matches!(
            engine.load_firing(dir.path().join("missing.json")),
            Err(CharacterizationError::File(_))
        ));
    }
}
