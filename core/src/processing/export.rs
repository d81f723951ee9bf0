use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use super::firing_file::RawData;
use super::motor::MotorResult;
use crate::prelude::ExportError;

pub const CSV_HEADER: [&str; 3] = ["time(s)", "force(N)", "pressure(Pa)"];
pub const RAW_CSV_HEADER: [&str; 3] = ["time(ms)", "force(counts)", "pressure(counts)"];

/// Writes the trimmed engineering-unit curves, four decimals per value.
pub fn write_csv<W: Write>(result: &MotorResult, writer: W) -> Result<(), ExportError> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(CSV_HEADER)?;
    for ((time, force), pressure) in result
        .time()
        .iter()
        .zip(result.force())
        .zip(result.pressure())
    {
        csv.write_record([
            format!("{:.4}", time),
            format!("{:.4}", force),
            format!("{:.4}", pressure),
        ])?;
    }
    csv.flush()?;
    Ok(())
}

/// Writes the untrimmed acquisition as recorded by the board.
pub fn write_raw_csv<W: Write>(raw: &RawData, writer: W) -> Result<(), ExportError> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(RAW_CSV_HEADER)?;
    for ((time, force), pressure) in raw.time.iter().zip(&raw.force).zip(&raw.pressure) {
        csv.write_record([time.to_string(), force.to_string(), pressure.to_string()])?;
    }
    csv.flush()?;
    Ok(())
}

pub fn save_csv<P: AsRef<Path>>(result: &MotorResult, path: P) -> Result<(), ExportError> {
    write_csv(result, File::create(path)?)
}

pub fn save_raw_csv<P: AsRef<Path>>(raw: &RawData, path: P) -> Result<(), ExportError> {
    write_raw_csv(raw, File::create(path)?)
}

/// Headline numbers of one firing. Channel-specific fields are absent when
/// the matching converter was not used.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    pub designation: Option<String>,
    pub impulse: Option<f64>,
    pub isp: Option<f64>,
    pub peak_thrust: Option<f64>,
    pub average_thrust: Option<f64>,
    pub peak_pressure: Option<f64>,
    pub average_pressure: Option<f64>,
    pub c_star: Option<f64>,
    pub thrust_coefficient: Option<f64>,
    pub burn_time: f64,
    pub startup_transient: f64,
    pub propellant_mass: f64,
    pub num_datapoints: usize,
}

impl PerformanceSummary {
    pub fn from_result(result: &MotorResult) -> Self {
        let force = result.has_force();
        let pressure = result.has_pressure();
        Self {
            designation: force.then(|| result.designation()),
            impulse: force.then(|| result.impulse()),
            isp: force.then(|| result.isp()),
            peak_thrust: force.then(|| result.peak_thrust()),
            average_thrust: force.then(|| result.average_thrust()),
            peak_pressure: pressure.then(|| result.peak_pressure()),
            average_pressure: pressure.then(|| result.average_pressure()),
            c_star: pressure.then(|| result.c_star()),
            thrust_coefficient: result.thrust_coefficient(),
            burn_time: result.burn_time(),
            startup_transient: result.startup_transient(),
            propellant_mass: result.config().propellant_mass,
            num_datapoints: result.num_datapoints(),
        }
    }

    /// Plain-text report, one metric per line.
    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        if let Some(designation) = &self.designation {
            lines.push(format!("Motor designation:   {}", designation));
        }
        lines.push(format!("Burn time:           {:.3} s", self.burn_time));
        lines.push(format!("Startup transient:   {:.3} s", self.startup_transient));
        let optional = [
            ("Total impulse:", self.impulse, "N·s"),
            ("Specific impulse:", self.isp, "s"),
            ("Peak thrust:", self.peak_thrust, "N"),
            ("Average thrust:", self.average_thrust, "N"),
            ("Peak pressure:", self.peak_pressure, "Pa"),
            ("Average pressure:", self.average_pressure, "Pa"),
            ("C*:", self.c_star, "m/s"),
            ("Thrust coefficient:", self.thrust_coefficient, ""),
        ];
        for (label, value, unit) in optional {
            if let Some(value) = value {
                lines.push(format!("{:<20} {:.3} {}", label, value, unit).trim_end().to_string());
            }
        }
        lines.push(format!("Propellant mass:     {:.3} kg", self.propellant_mass));
        lines.join("\n")
    }
}
