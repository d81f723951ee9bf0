use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use super::converter::Converter;
use super::firing_file::{FiringFile, RawData};
use crate::math::stats::StatsHelper;

pub const GRAVITY: f64 = 9.81;
/// Smallest total impulse with a letter class (the 'A' class starts at 1.25 N·s).
pub const MIN_CLASSIFIED_IMPULSE: f64 = 1.25;
pub const NOT_APPLICABLE: &str = "N/A";
/// Floor applied to chamber pressure when dividing by it.
pub const PRESSURE_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MotorOrientation {
    #[default]
    Vertical,
    Horizontal,
}

/// Operator-supplied description of the motor under test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MotorConfig {
    pub orientation: MotorOrientation,
    /// kg
    pub propellant_mass: f64,
    /// kg
    pub hardware_mass: f64,
    /// m
    pub throat_diameter: f64,
    /// Percentage of the peak below which samples are outside the burn.
    pub cutoff_threshold_percent: f64,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            orientation: MotorOrientation::Vertical,
            propellant_mass: 1.0,
            hardware_mass: 1.0,
            throat_diameter: 0.01,
            cutoff_threshold_percent: 5.0,
        }
    }
}

impl MotorConfig {
    pub fn throat_area(&self) -> f64 {
        PI * (self.throat_diameter / 2.0).powi(2)
    }
}

/// Trimmed, calibrated curves of one firing together with everything needed
/// to recompute them.
#[derive(Debug, Clone, PartialEq)]
pub struct MotorResult {
    time: Vec<f64>,
    force: Vec<f64>,
    pressure: Vec<f64>,
    burn_time: f64,
    startup_transient: f64,
    config: MotorConfig,
    raw: RawData,
    force_conv: Option<Converter>,
    pressure_conv: Option<Converter>,
}

impl MotorResult {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        time: Vec<f64>,
        force: Vec<f64>,
        pressure: Vec<f64>,
        burn_time: f64,
        startup_transient: f64,
        config: MotorConfig,
        raw: RawData,
        force_conv: Option<Converter>,
        pressure_conv: Option<Converter>,
    ) -> Self {
        Self {
            time,
            force,
            pressure,
            burn_time,
            startup_transient,
            config,
            raw,
            force_conv,
            pressure_conv,
        }
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn force(&self) -> &[f64] {
        &self.force
    }

    pub fn pressure(&self) -> &[f64] {
        &self.pressure
    }

    pub fn num_datapoints(&self) -> usize {
        self.time.len()
    }

    pub fn config(&self) -> &MotorConfig {
        &self.config
    }

    pub fn raw(&self) -> &RawData {
        &self.raw
    }

    pub fn force_converter(&self) -> Option<&Converter> {
        self.force_conv.as_ref()
    }

    pub fn pressure_converter(&self) -> Option<&Converter> {
        self.pressure_conv.as_ref()
    }

    pub fn has_force(&self) -> bool {
        self.force_conv.is_some()
    }

    pub fn has_pressure(&self) -> bool {
        self.pressure_conv.is_some()
    }

    /// Seconds between the first and last sample of the burn window.
    pub fn burn_time(&self) -> f64 {
        self.burn_time
    }

    /// Seconds from the end of the calibration frames to the start of the burn.
    pub fn startup_transient(&self) -> f64 {
        self.startup_transient
    }

    pub fn impulse(&self) -> f64 {
        StatsHelper::trapezoid(&self.time, &self.force)
    }

    pub fn average_thrust(&self) -> f64 {
        if self.burn_time > 0.0 {
            self.impulse() / self.burn_time
        } else {
            0.0
        }
    }

    pub fn peak_thrust(&self) -> f64 {
        StatsHelper::max_with_index(&self.force)
            .map(|(_, peak)| peak)
            .unwrap_or(0.0)
    }

    pub fn integrated_pressure(&self) -> f64 {
        StatsHelper::trapezoid(&self.time, &self.pressure)
    }

    pub fn average_pressure(&self) -> f64 {
        if self.burn_time > 0.0 {
            self.integrated_pressure() / self.burn_time
        } else {
            0.0
        }
    }

    pub fn peak_pressure(&self) -> f64 {
        StatsHelper::max_with_index(&self.pressure)
            .map(|(_, peak)| peak)
            .unwrap_or(0.0)
    }

    /// Characteristic velocity, m/s.
    pub fn c_star(&self) -> f64 {
        self.config.throat_area() * self.integrated_pressure() / self.config.propellant_mass
    }

    /// Median of the instantaneous thrust coefficient; needs both channels.
    pub fn thrust_coefficient(&self) -> Option<f64> {
        if !(self.has_force() && self.has_pressure()) {
            return None;
        }
        let throat_area = self.config.throat_area();
        let samples: Vec<f64> = self
            .force
            .iter()
            .zip(&self.pressure)
            .map(|(&force, &pressure)| force / (throat_area * pressure.max(PRESSURE_EPSILON)))
            .collect();
        StatsHelper::median(&samples)
    }

    /// Specific impulse, s.
    pub fn isp(&self) -> f64 {
        self.impulse() / (self.config.propellant_mass * GRAVITY)
    }

    pub fn designation(&self) -> String {
        motor_designation(self.impulse(), self.average_thrust())
    }

    /// Everything needed to reproduce this result exactly.
    pub fn to_firing_file(&self) -> FiringFile {
        FiringFile {
            raw_data: self.raw.clone(),
            motor_info: self.config.clone(),
            force_conv: self.force_conv.clone(),
            pressure_conv: self.pressure_conv.clone(),
        }
    }
}

/// Letter class from total impulse followed by the rounded average thrust, e.g. `"H220"`.
pub fn motor_designation(impulse: f64, average_thrust: f64) -> String {
    // log2 is undefined at and below zero; anything under the 'A' class is unclassified.
    if !(impulse >= MIN_CLASSIFIED_IMPULSE) {
        return NOT_APPLICABLE.to_string();
    }
    let class = (impulse / MIN_CLASSIFIED_IMPULSE).log2().floor() as u32;
    let letter = char::from_u32(u32::from(b'A') + class).unwrap_or('?');
    format!("{}{}", letter, average_thrust.round() as i64)
}
