use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use generator::profile::{build_firing_file, GeneratorConfig};
use gui_bridge::bridge::GuiBridge;
use rmtscore::characterization::CharacterizationEngine;
use rmtscore::prelude::TransducerKind;
use std::io::BufRead;
use std::path::PathBuf;
use std::thread;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use tokio::sync::mpsc;
use workflow::config::StationConfig;
use workflow::profiles::ProfileStore;
use workflow::runner::{summarize, OutputPaths, Runner};

mod generator;
mod gui_bridge;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Rocket motor test stand ground station")]
struct Args {
    /// Load station settings from YAML
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Serial port, overriding the config file
    #[arg(long, global = true)]
    port: Option<String>,
    /// Publish results over the HTTP bridge
    #[arg(long, global = true, default_value_t = false)]
    serve: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    LoadCell,
    PressureTransducer,
}

impl From<KindArg> for TransducerKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::LoadCell => TransducerKind::LoadCell,
            KindArg::PressureTransducer => TransducerKind::PressureTransducer,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Connect to the stand, optionally fire, and collect the recording
    Acquire {
        /// Send a fire command once the board is accepted
        #[arg(long, default_value_t = false)]
        fire: bool,
        /// Firing duration in ms, overriding the config file
        #[arg(long)]
        duration: Option<u16>,
        #[arg(long, default_value = "firing.json")]
        output: PathBuf,
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long)]
        raw_csv: Option<PathBuf>,
    },
    /// Calibrate one transducer interactively and store the result
    Calibrate {
        #[arg(value_enum)]
        kind: KindArg,
        name: String,
    },
    /// Reprocess a firing file
    Process {
        file: PathBuf,
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long)]
        raw_csv: Option<PathBuf>,
    },
    /// Fit a burn-rate law over several firings of one propellant
    Characterize {
        files: Vec<PathBuf>,
        /// Burning web in metres, applied to every firing
        #[arg(long)]
        web: Option<f64>,
        /// Per-firing webs in metres, in file order
        #[arg(long, value_delimiter = ',')]
        webs: Vec<f64>,
    },
    /// Write a synthetic firing file
    Simulate {
        #[arg(long, default_value = "simulated.json")]
        output: PathBuf,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// List stored transducer profiles
    Profiles {
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
        /// Delete the named profile from the store
        #[arg(long)]
        remove: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => StationConfig::load(path)?,
        None => StationConfig::default(),
    };
    if let Some(port) = args.port.clone() {
        config.port = Some(port);
    }

    let mut runner = Runner::new(config.clone());
    let bridge = if args.serve {
        let bridge = GuiBridge::new();
        bridge.serve(config.bridge_address);
        runner = runner.with_bridge(bridge.clone());
        Some(bridge)
    } else {
        None
    };

    let runtime = TokioBuilder::new_multi_thread()
        .enable_all()
        .build()
        .context("creating async runtime")?;

    match args.command {
        Command::Acquire {
            fire,
            duration,
            output,
            csv,
            raw_csv,
        } => {
            let store = ProfileStore::load(&config.profiles_path)?;
            let fire_ms = fire.then(|| duration.unwrap_or(config.fire_duration_ms));
            let result = runtime.block_on(runner.acquire(&store, fire_ms))?;
            runner.write_outputs(
                &result,
                &OutputPaths {
                    firing: Some(&output),
                    csv: csv.as_deref(),
                    raw_csv: raw_csv.as_deref(),
                },
            )?;
            println!("{}", summarize(&result));
        }
        Command::Calibrate { kind, name } => {
            let mut store = ProfileStore::load(&config.profiles_path)?;
            let (tx, lines) = mpsc::unbounded_channel();
            thread::spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            });
            println!("commands: c capture, r <index> [value], d <index>, p list, s save, q quit");
            match runtime.block_on(runner.calibrate(kind.into(), &name, lines))? {
                Some(candidate) => {
                    println!(
                        "saving {}: ratio {}, offset {}, r {:.6}",
                        name, candidate.converter.ratio, candidate.converter.offset, candidate.r
                    );
                    store.upsert(candidate.converter);
                    store.save()?;
                }
                None => println!("calibration abandoned"),
            }
        }
        Command::Process { file, csv, raw_csv } => {
            let result = runner.process_file(&file)?;
            runner.write_outputs(
                &result,
                &OutputPaths {
                    firing: None,
                    csv: csv.as_deref(),
                    raw_csv: raw_csv.as_deref(),
                },
            )?;
            println!("{}", summarize(&result));
        }
        Command::Characterize { files, web, webs } => {
            let mut engine = CharacterizationEngine::new();
            for file in &files {
                engine
                    .load_firing(file)
                    .with_context(|| format!("adding {} to characterization", file.display()))?;
            }
            engine.set_all_webs(web);
            for (index, web) in webs.into_iter().enumerate() {
                engine.set_web(index, Some(web))?;
            }
            for point in engine.points() {
                println!(
                    "{}: average pressure {:.0} Pa, burn time {:.3} s, C* {:.1} m/s",
                    point.source_path.display(),
                    point.average_pressure,
                    point.burn_time,
                    point.c_star
                );
            }
            let result = engine
                .try_result()
                .context("characterization unavailable")?;
            println!(
                "burn rate r = {:.6e} * P^{:.4} (r = {:.4})",
                result.a, result.n, result.r
            );
            println!(
                "C* {:.1} ± {:.1} m/s, pressure {:.0} .. {:.0} Pa",
                result.c_star, result.c_star_std_dev, result.min_pressure, result.max_pressure
            );
        }
        Command::Simulate { output, seed } => {
            let generator = GeneratorConfig {
                seed,
                ..GeneratorConfig::default()
            };
            let firing = build_firing_file(&generator, config.motor.clone())?;
            firing
                .save(&output)
                .with_context(|| format!("writing {}", output.display()))?;
            let result = runner.process_file(&output)?;
            println!("wrote {}\n{}", output.display(), summarize(&result));
        }
        Command::Profiles { kind, remove } => {
            let mut store = ProfileStore::load(&config.profiles_path)?;
            if let Some(name) = remove {
                store
                    .remove(&name)
                    .with_context(|| format!("no profile named {}", name))?;
                store.save()?;
                println!("removed {}", name);
            }
            let profiles: Vec<_> = match kind {
                Some(kind) => store.by_kind(kind.into()).collect(),
                None => store.profiles().iter().collect(),
            };
            for profile in profiles {
                println!(
                    "{:<20} {:<20} ratio {} offset {}",
                    profile.name,
                    profile.kind.label(),
                    profile.ratio,
                    profile.offset
                );
            }
        }
    }

    if let Some(bridge) = bridge {
        bridge.publish_status("HTTP bridge running (Ctrl+C to stop)...");
        runtime.block_on(async {
            signal::ctrl_c().await.context("awaiting Ctrl+C to exit")?;
            Ok::<(), anyhow::Error>(())
        })?;
    }

    Ok(())
}
