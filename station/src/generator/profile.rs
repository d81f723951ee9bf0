use super::template::{pressure_curve, thrust_curve};
use anyhow::Context;
use rand::{rngs::StdRng, Rng, SeedableRng};
#[cfg(test)]
use rmtscore::acquisition::PACKET_STRIDE;
use rmtscore::prelude::{Converter, MotorConfig, TransducerKind};
use rmtscore::processing::{FiringFile, RawData};
use rmtscore::protocol::packet::MAX_COUNTS;
use rmtscore::protocol::ResultPacket;
#[cfg(test)]
use rmtscore::protocol::VersionPacket;
use serde::{Deserialize, Serialize};

/// Shape of a synthetic firing recording, in raw board units.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Total samples; rounded up to a whole recording block.
    pub samples: usize,
    pub burn_start: usize,
    pub burn_samples: usize,
    pub sample_interval_ms: f64,
    pub force_baseline: u32,
    pub force_peak: u32,
    pub pressure_baseline: u32,
    pub pressure_peak: u32,
    /// Peak-to-peak noise in counts.
    pub noise: u32,
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            samples: 640,
            burn_start: 60,
            burn_samples: 300,
            sample_interval_ms: 6.5,
            force_baseline: 110_000,
            force_peak: 1_800_000,
            pressure_baseline: 760_000,
            pressure_peak: 2_400_000,
            noise: 400,
            seed: 0,
        }
    }
}

impl GeneratorConfig {
    fn total_samples(&self) -> usize {
        let block = 64;
        (self.samples.max(1) + block - 1) / block * block
    }
}

/// Load cell and pressure transducer matching the generator's count ranges.
pub fn default_converters() -> (Converter, Converter) {
    (
        Converter::new("sim-load-cell", TransducerKind::LoadCell, 0.001196223066, -129.125946),
        Converter::new(
            "sim-pressure",
            TransducerKind::PressureTransducer,
            1.642723486,
            -1248467.135,
        ),
    )
}

/// One noisy sample per sequence number, in sequence order.
pub fn build_samples(config: &GeneratorConfig) -> anyhow::Result<Vec<ResultPacket>> {
    let total = config.total_samples();
    if total > usize::from(u16::MAX) + 1 {
        anyhow::bail!("{} samples exceed the 16-bit sequence space", total);
    }
    let mut rng = StdRng::seed_from_u64(config.seed);
    let half_noise = i64::from(config.noise / 2);

    let mut samples = Vec::with_capacity(total);
    for index in 0..total {
        let fraction = if config.burn_samples == 0 {
            -1.0
        } else {
            (index as f64 - config.burn_start as f64) / config.burn_samples as f64
        };
        let force = f64::from(config.force_baseline)
            + f64::from(config.force_peak) * thrust_curve(fraction);
        let pressure = f64::from(config.pressure_baseline)
            + f64::from(config.pressure_peak) * pressure_curve(fraction);
        let mut jitter = || {
            if half_noise == 0 {
                0
            } else {
                rng.gen_range(-half_noise..=half_noise)
            }
        };
        let force = clamp_counts(force as i64 + jitter());
        let pressure = clamp_counts(pressure as i64 + jitter());

        let time_ms = (10.0 + config.sample_interval_ms * index as f64).round();
        let time_ms = u16::try_from(time_ms as i64)
            .with_context(|| format!("sample {} time {} ms overflows", index, time_ms))?;
        samples.push(ResultPacket {
            sequence: index as u16,
            time_ms,
            force,
            pressure,
        });
    }
    Ok(samples)
}

fn clamp_counts(value: i64) -> u32 {
    value.clamp(0, i64::from(MAX_COUNTS)) as u32
}

pub fn build_raw(config: &GeneratorConfig) -> anyhow::Result<RawData> {
    let mut raw = RawData::default();
    for sample in build_samples(config)? {
        raw.push(
            f64::from(sample.time_ms),
            f64::from(sample.force),
            f64::from(sample.pressure),
        );
    }
    Ok(raw)
}

pub fn build_firing_file(config: &GeneratorConfig, motor: MotorConfig) -> anyhow::Result<FiringFile> {
    let (force_conv, pressure_conv) = default_converters();
    Ok(FiringFile {
        raw_data: build_raw(config)?,
        motor_info: motor,
        force_conv: Some(force_conv),
        pressure_conv: Some(pressure_conv),
    })
}

/// Samples in the order the firmware transmits them: every tenth sample,
/// then the next offset.
#[cfg(test)]
pub fn stride_order(samples: &[ResultPacket]) -> Vec<ResultPacket> {
    let stride = usize::from(PACKET_STRIDE);
    (0..stride)
        .flat_map(|offset| samples.iter().skip(offset).step_by(stride).copied())
        .collect()
}

/// The version report of a board this station supports.
#[cfg(test)]
pub fn supported_version() -> VersionPacket {
    VersionPacket {
        firmware_version: 5,
        hardware_version: 2,
    }
}
