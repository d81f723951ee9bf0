use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransducerKind {
    #[serde(rename = "Load Cell")]
    LoadCell,
    #[serde(rename = "Pressure Transducer")]
    PressureTransducer,
}

impl TransducerKind {
    /// SI unit the converter produces.
    pub fn base_unit(&self) -> &'static str {
        match self {
            TransducerKind::LoadCell => "N",
            TransducerKind::PressureTransducer => "Pa",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TransducerKind::LoadCell => "Load Cell",
            TransducerKind::PressureTransducer => "Pressure Transducer",
        }
    }
}

/// Linear map between raw ADC counts and engineering units: `value = ratio * raw + offset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Converter {
    pub name: String,
    pub kind: TransducerKind,
    pub ratio: f64,
    pub offset: f64,
}

impl Converter {
    pub fn new(name: impl Into<String>, kind: TransducerKind, ratio: f64, offset: f64) -> Self {
        Self {
            name: name.into(),
            kind,
            ratio,
            offset,
        }
    }

    pub fn convert(&self, raw: f64) -> f64 {
        self.ratio * raw + self.offset
    }

    pub fn to_raw(&self, value: f64) -> f64 {
        (value - self.offset) / self.ratio
    }

    pub fn convert_all(&self, raw: &[f64]) -> Vec<f64> {
        raw.iter().map(|&value| self.convert(value)).collect()
    }
}
