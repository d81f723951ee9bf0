use crate::gui_bridge::bridge::GuiBridge;
use crate::gui_bridge::model::ResultsModel;
use crate::workflow::config::StationConfig;
use crate::workflow::profiles::ProfileStore;
use anyhow::Context;
use log::{info, warn};
use rmtscore::acquisition::{CalibrationSession, ConverterCandidate, FiringSession, SessionEvent};
use rmtscore::prelude::{Converter, InboundPacket, MotorResult, SerialTransport, TransducerKind};
use rmtscore::processing::{save_csv, save_raw_csv, FiringFile, PerformanceSummary};
use rmtscore::transport::CommandLink;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;

/// Where an acquisition writes its records.
#[derive(Debug, Clone, Default)]
pub struct OutputPaths<'a> {
    pub firing: Option<&'a Path>,
    pub csv: Option<&'a Path>,
    pub raw_csv: Option<&'a Path>,
}

#[derive(Clone)]
pub struct Runner {
    config: StationConfig,
    bridge: Option<GuiBridge>,
}

impl Runner {
    pub fn new(config: StationConfig) -> Self {
        Self {
            config,
            bridge: None,
        }
    }

    pub fn with_bridge(mut self, bridge: GuiBridge) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Resolves the configured force and pressure profiles.
    pub fn converters(
        &self,
        store: &ProfileStore,
    ) -> anyhow::Result<(Option<Converter>, Option<Converter>)> {
        let force = self
            .config
            .force_profile
            .as_deref()
            .map(|name| store.require(name, TransducerKind::LoadCell))
            .transpose()?;
        let pressure = self
            .config
            .pressure_profile
            .as_deref()
            .map(|name| store.require(name, TransducerKind::PressureTransducer))
            .transpose()?;
        if force.is_none() && pressure.is_none() {
            anyhow::bail!("configure at least one of force_profile or pressure_profile");
        }
        Ok((force, pressure))
    }

    pub fn process_file(&self, path: &Path) -> anyhow::Result<MotorResult> {
        let firing = FiringFile::load(path)
            .with_context(|| format!("loading firing file {}", path.display()))?;
        let result = firing
            .process()
            .with_context(|| format!("processing firing file {}", path.display()))?;
        if let Some(bridge) = &self.bridge {
            bridge.publish(ResultsModel::from_result(&result, true));
        }
        Ok(result)
    }

    pub fn write_outputs(&self, result: &MotorResult, outputs: &OutputPaths<'_>) -> anyhow::Result<()> {
        if let Some(path) = outputs.firing {
            result
                .to_firing_file()
                .save(path)
                .with_context(|| format!("writing firing file {}", path.display()))?;
            info!("wrote firing file {}", path.display());
        }
        if let Some(path) = outputs.csv {
            save_csv(result, path).with_context(|| format!("writing csv {}", path.display()))?;
        }
        if let Some(path) = outputs.raw_csv {
            save_raw_csv(result.raw(), path)
                .with_context(|| format!("writing raw csv {}", path.display()))?;
        }
        Ok(())
    }

    /// Connects to the configured port and collects one firing.
    pub async fn acquire(
        &self,
        store: &ProfileStore,
        fire_ms: Option<u16>,
    ) -> anyhow::Result<Arc<MotorResult>> {
        let (force_conv, pressure_conv) = self.converters(store)?;
        let port = self.config.port()?;
        let (transport, packets) = SerialTransport::channel(self.config.transport_settings());
        transport
            .connect(port)
            .with_context(|| format!("connecting to {}", port))?;
        info!("connected to {}, waiting for board version", port);

        let mut session =
            FiringSession::new(transport, force_conv, pressure_conv, self.config.motor.clone());
        self.drive_firing(&mut session, packets, fire_ms).await
    }

    /// Feeds packets to `session` until results are available, the link
    /// closes or the operator interrupts.
    pub async fn drive_firing<L: CommandLink>(
        &self,
        session: &mut FiringSession<L>,
        mut packets: UnboundedReceiver<InboundPacket>,
        fire_ms: Option<u16>,
    ) -> anyhow::Result<Arc<MotorResult>> {
        let mut events = session.subscribe();
        let ctrl_c = signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                biased;
                packet = packets.recv() => match packet {
                    Some(packet) => session.handle_packet(packet),
                    None => anyhow::bail!("serial link closed before all results arrived"),
                },
                _ = &mut ctrl_c => {
                    if let Err(err) = session.stop() {
                        warn!("could not send stop: {}", err);
                    }
                    session.close();
                    anyhow::bail!("acquisition interrupted");
                }
            }

            loop {
                let event = match events.try_recv() {
                    Ok(event) => event,
                    Err(TryRecvError::Lagged(skipped)) => {
                        warn!("skipped {} session events", skipped);
                        continue;
                    }
                    Err(_) => break,
                };
                if let Some(result) = self.handle_event(session, event, fire_ms)? {
                    return Ok(result);
                }
            }
        }
    }

    fn handle_event<L: CommandLink>(
        &self,
        session: &mut FiringSession<L>,
        event: SessionEvent,
        fire_ms: Option<u16>,
    ) -> anyhow::Result<Option<Arc<MotorResult>>> {
        match event {
            SessionEvent::VersionAccepted(_) => {
                if let Some(duration) = fire_ms {
                    session.fire(duration).context("sending fire command")?;
                    self.status(&format!("fire command sent ({} ms)", duration));
                } else {
                    self.status("connected, waiting for results");
                }
            }
            SessionEvent::VersionRejected { hardware, firmware } => {
                anyhow::bail!(
                    "unsupported device (hardware revision {}, firmware {})",
                    hardware,
                    firmware
                );
            }
            SessionEvent::Live(reading) => {
                if let Some(bridge) = &self.bridge {
                    bridge.publish_live(reading);
                }
            }
            SessionEvent::BoardErrors(messages) => {
                for message in &messages {
                    info!("board: {}", message);
                }
                if let Some(bridge) = &self.bridge {
                    bridge.publish_errors(messages);
                }
            }
            SessionEvent::FullSizeKnown(size) => {
                self.status(&format!("receiving {} samples", size));
            }
            SessionEvent::NewResult(result) => {
                if let Some(bridge) = &self.bridge {
                    bridge.publish(ResultsModel::from_result(&result, false));
                }
            }
            SessionEvent::ResultsAvailable(outcome) => {
                let result = outcome.context("final processing pass failed")?;
                if let Some(bridge) = &self.bridge {
                    bridge.publish(ResultsModel::from_result(&result, true));
                }
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    fn status(&self, message: &str) {
        match &self.bridge {
            Some(bridge) => bridge.publish_status(message),
            None => info!("{}", message),
        }
    }

    /// Connects to the configured port and runs an interactive calibration
    /// driven by `lines`.
    pub async fn calibrate(
        &self,
        kind: TransducerKind,
        name: &str,
        lines: UnboundedReceiver<String>,
    ) -> anyhow::Result<Option<ConverterCandidate>> {
        let port = self.config.port()?;
        let (transport, packets) = SerialTransport::channel(self.config.transport_settings());
        transport
            .connect(port)
            .with_context(|| format!("connecting to {}", port))?;
        let mut session = CalibrationSession::new(transport, kind, name);
        drive_calibration(&mut session, packets, lines).await
    }
}

/// Operator commands: `c` capture, `r <index> [value]` set or clear a real
/// value, `d <index>` delete, `p` list, `s` accept the fit, `q` abandon.
pub async fn drive_calibration<L: CommandLink>(
    session: &mut CalibrationSession<L>,
    mut packets: UnboundedReceiver<InboundPacket>,
    mut lines: UnboundedReceiver<String>,
) -> anyhow::Result<Option<ConverterCandidate>> {
    session.start();
    let unit = session.kind().base_unit();
    loop {
        tokio::select! {
            biased;
            Some(packet) = packets.recv() => {
                session.handle_packet(packet);
            }
            line = lines.recv() => {
                let Some(line) = line else {
                    session.close();
                    return Ok(None);
                };
                let words: Vec<&str> = line.split_whitespace().collect();
                match words.as_slice() {
                    ["c"] | ["capture"] => match session.capture() {
                        Ok(index) => println!(
                            "point {}: raw {:.1}",
                            index,
                            session.points()[index].raw_reading
                        ),
                        Err(err) => println!("{}", err),
                    },
                    ["r", index] | ["r", index, _] => {
                        let value = match words.get(2) {
                            Some(text) => match text.parse::<f64>() {
                                Ok(value) => Some(value),
                                Err(_) => {
                                    println!("not a number: {}", text);
                                    continue;
                                }
                            },
                            None => None,
                        };
                        match index.parse::<usize>() {
                            Ok(index) => {
                                if let Err(err) = session.set_real(index, value) {
                                    println!("{}", err);
                                }
                            }
                            Err(_) => println!("not an index: {}", index),
                        }
                    }
                    ["d", index] => match index.parse::<usize>() {
                        Ok(index) => {
                            if let Err(err) = session.delete(index) {
                                println!("{}", err);
                            }
                        }
                        Err(_) => println!("not an index: {}", index),
                    },
                    ["p"] => {
                        for (index, point) in session.points().iter().enumerate() {
                            match point.real_value {
                                Some(real) => println!("{}: raw {:.1} -> {} {}", index, point.raw_reading, real, unit),
                                None => println!("{}: raw {:.1}", index, point.raw_reading),
                            }
                        }
                        if let Some(candidate) = session.candidate() {
                            println!(
                                "fit: ratio {:.9}, offset {:.6}, r {:.6}",
                                candidate.converter.ratio, candidate.converter.offset, candidate.r
                            );
                        }
                    }
                    ["s"] => match session.candidate() {
                        Some(candidate) => {
                            session.close();
                            return Ok(Some(candidate));
                        }
                        None => println!("need at least three points with real values"),
                    },
                    ["q"] => {
                        session.close();
                        return Ok(None);
                    }
                    [] => {}
                    _ => println!("unknown command: {}", line),
                }
            }
        }
    }
}

/// Multi-line report of a processed firing for the terminal.
pub fn summarize(result: &MotorResult) -> String {
    PerformanceSummary::from_result(result).render()
}
