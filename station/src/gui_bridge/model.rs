use rmtscore::acquisition::LiveReading;
use rmtscore::processing::{MotorResult, PerformanceSummary};
use serde::Serialize;

/// Latest processed firing as served to the presentation layer.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResultsModel {
    pub summary: Option<PerformanceSummary>,
    pub time: Vec<f64>,
    pub force: Vec<f64>,
    pub pressure: Vec<f64>,
    /// True once the acquisition has every sample.
    pub complete: bool,
    pub status: String,
}

impl ResultsModel {
    pub fn from_result(result: &MotorResult, complete: bool) -> Self {
        Self {
            summary: Some(PerformanceSummary::from_result(result)),
            time: result.time().to_vec(),
            force: if result.has_force() {
                result.force().to_vec()
            } else {
                Vec::new()
            },
            pressure: if result.has_pressure() {
                result.pressure().to_vec()
            } else {
                Vec::new()
            },
            complete,
            status: if complete {
                "results available".to_string()
            } else {
                "receiving results".to_string()
            },
        }
    }
}

/// Most recent live transducer reading.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LiveModel {
    pub reading: Option<LiveReading>,
    pub board_errors: Vec<String>,
}
