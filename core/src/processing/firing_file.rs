use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::converter::Converter;
use super::motor::{MotorConfig, MotorResult};
use super::pipeline::SignalProcessor;
use crate::prelude::{FiringFileError, ProcessingResult};

/// Column-oriented raw acquisition: time in ms, force and pressure in ADC counts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawData {
    pub time: Vec<f64>,
    pub force: Vec<f64>,
    pub pressure: Vec<f64>,
}

impl RawData {
    pub fn push(&mut self, time_ms: f64, force: f64, pressure: f64) {
        self.time.push(time_ms);
        self.force.push(force);
        self.pressure.push(pressure);
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

/// Persisted acquisition record. Reprocessing it reproduces the original result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiringFile {
    pub raw_data: RawData,
    pub motor_info: MotorConfig,
    pub force_conv: Option<Converter>,
    pub pressure_conv: Option<Converter>,
}

impl FiringFile {
    pub fn from_json(json: &str) -> Result<Self, FiringFileError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, FiringFileError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, FiringFileError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), FiringFileError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn process(&self) -> ProcessingResult<MotorResult> {
        SignalProcessor::process(
            &self.raw_data,
            self.force_conv.as_ref(),
            self.pressure_conv.as_ref(),
            &self.motor_info,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::converter::TransducerKind;
    use crate::processing::motor::MotorOrientation;
    use tempfile::NamedTempFile;

    fn sample_file() -> FiringFile {
        let mut raw = RawData::default();
        for i in 0..40u32 {
            let time = 10.0 + 6.5 * f64::from(i);
            let burning = (15..30).contains(&i);
            let force = if burning { 90_000.0 + 1_000.0 * f64::from(i) } else { 50_000.0 };
            let pressure = if burning { 300_000.0 } else { 20_000.0 };
            raw.push(time.round(), force, pressure);
        }
        FiringFile {
            raw_data: raw,
            motor_info: MotorConfig {
                orientation: MotorOrientation::Horizontal,
                ..MotorConfig::default()
            },
            force_conv: Some(Converter::new("cell", TransducerKind::LoadCell, 0.01, -10.0)),
            pressure_conv: None,
        }
    }

    #[test]
    fn json_uses_camel_case_and_null_converters() {
        let json = sample_file().to_json().unwrap();
        assert!(json.contains("\"rawData\""));
        assert!(json.contains("\"motorInfo\""));
        assert!(json.contains("\"cutoffThresholdPercent\""));
        assert!(json.contains("\"pressureConv\": null"));
    }

    #[test]
    fn saved_file_reprocesses_to_identical_result() {
        let file = sample_file();
        let original = file.process().unwrap();

        let temp = NamedTempFile::new().unwrap();
        original.to_firing_file().save(temp.path()).unwrap();
        let reloaded = FiringFile::load(temp.path()).unwrap();

        assert_eq!(reloaded, file);
        assert_eq!(reloaded.process().unwrap(), original);
    }

    #[test]
    fn malformed_json_is_a_format_error() {
        let err = FiringFile::from_json("{\"rawData\": 3}").unwrap_err();
        assert!(matches!(err, FiringFileError::Format(_)));
    }
}
