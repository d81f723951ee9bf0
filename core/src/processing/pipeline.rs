//! Raw acquisition to calibrated motor curves.
//!
//! Stages, in order: outlier smoothing, calibration-frame offset removal, unit
//! conversion, burn-window trim, re-zeroed timing and vertical-stand weight
//! compensation. Every stage works on owned copies; the input is never mutated.

use std::ops::Range;

use super::converter::Converter;
use super::firing_file::RawData;
use super::motor::{MotorConfig, MotorOrientation, MotorResult, GRAVITY};
use crate::math::stats::StatsHelper;
use crate::prelude::{ProcessingError, ProcessingResult};
use crate::telemetry::log::LogManager;

/// Samples recorded before ignition, used only to find each channel's zero.
pub const NUM_CAL_FRAMES: usize = 10;
/// Stand-in burn time when the window is a single sample.
const BURN_TIME_EPSILON: f64 = 1e-9;

/// Replaces isolated spikes (more than twice both neighbours) with the
/// neighbours' average. One left-to-right pass.
pub fn reject_outliers(values: &mut [f64]) {
    if values.len() < 3 {
        return;
    }
    for i in 1..values.len() - 1 {
        let (prev, next) = (values[i - 1], values[i + 1]);
        if values[i] > 2.0 * prev && values[i] > 2.0 * next {
            values[i] = (prev + next) / 2.0;
        }
    }
}

/// Shifts a raw channel so the median calibration frame lands on the
/// converter's raw value for zero.
fn remove_offset(channel: &mut [f64], converter: &Converter) {
    let frames = &channel[..channel.len().min(NUM_CAL_FRAMES)];
    let Some(zero_reference) = StatsHelper::median(frames) else {
        return;
    };
    let shift = converter.to_raw(0.0) - zero_reference;
    for value in channel.iter_mut() {
        *value += shift;
    }
}

/// Contiguous run of samples around the peak that stay above
/// `threshold_percent` of it. `None` when nothing exceeds the threshold.
pub fn burn_window(channel: &[f64], threshold_percent: f64) -> Option<Range<usize>> {
    let (peak_index, peak) = StatsHelper::max_with_index(channel)?;
    let threshold = peak * threshold_percent / 100.0;
    if !(peak > threshold) {
        return None;
    }

    let mut end = peak_index;
    while end < channel.len() && channel[end] > threshold {
        end += 1;
    }
    let mut start = peak_index;
    while start > 0 && channel[start - 1] > threshold {
        start -= 1;
    }
    Some(start..end)
}

pub struct SignalProcessor;

impl SignalProcessor {
    pub fn process(
        raw: &RawData,
        force_conv: Option<&Converter>,
        pressure_conv: Option<&Converter>,
        config: &MotorConfig,
    ) -> ProcessingResult<MotorResult> {
        if force_conv.is_none() && pressure_conv.is_none() {
            return Err(ProcessingError::MissingConverter);
        }
        if raw.force.len() != raw.time.len() || raw.pressure.len() != raw.time.len() {
            return Err(ProcessingError::MismatchedChannels {
                time: raw.time.len(),
                force: raw.force.len(),
                pressure: raw.pressure.len(),
            });
        }
        if raw.time.len() <= NUM_CAL_FRAMES {
            return Err(ProcessingError::NoDatapoints);
        }

        let mut force = raw.force.clone();
        let mut pressure = raw.pressure.clone();
        reject_outliers(&mut force);
        reject_outliers(&mut pressure);

        if let Some(conv) = force_conv {
            remove_offset(&mut force, conv);
        }
        if let Some(conv) = pressure_conv {
            remove_offset(&mut pressure, conv);
        }

        let cal_end_time = raw.time[NUM_CAL_FRAMES - 1] / 1000.0;
        let mut time: Vec<f64> = raw.time[NUM_CAL_FRAMES..]
            .iter()
            .map(|ms| ms / 1000.0)
            .collect();
        let mut force = force.split_off(NUM_CAL_FRAMES);
        let mut pressure = pressure.split_off(NUM_CAL_FRAMES);

        if let Some(conv) = force_conv {
            force = conv.convert_all(&force);
        }
        if let Some(conv) = pressure_conv {
            pressure = conv.convert_all(&pressure);
        }

        // Force drives the trim whenever it is available.
        let trim_channel = if force_conv.is_some() { &force } else { &pressure };
        let window = burn_window(trim_channel, config.cutoff_threshold_percent)
            .ok_or(ProcessingError::NoFiringDetected)?;
        let mut time = time.drain(window.clone()).collect::<Vec<_>>();
        let mut force = force.drain(window.clone()).collect::<Vec<_>>();
        let pressure = pressure.drain(window).collect::<Vec<_>>();

        let start = time[0];
        let burn_time = time[time.len() - 1] - start;
        let startup_transient = start - cal_end_time;
        for t in time.iter_mut() {
            *t -= start;
        }

        if config.orientation == MotorOrientation::Vertical && force_conv.is_some() {
            let duration = if burn_time > 0.0 {
                burn_time
            } else {
                BURN_TIME_EPSILON
            };
            let propellant_weight = config.propellant_mass * GRAVITY;
            for (f, t) in force.iter_mut().zip(&time) {
                *f += (t / duration) * propellant_weight;
            }
        }

        LogManager::new("processing").detail(&format!(
            "burn window of {} samples, burn time {:.3} s",
            time.len(),
            burn_time
        ));

        Ok(MotorResult::new(
            time,
            force,
            pressure,
            burn_time,
            startup_transient,
            config.clone(),
            raw.clone(),
            force_conv.cloned(),
            pressure_conv.cloned(),
        ))
    }
}
