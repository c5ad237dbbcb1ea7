mod config;
mod script;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::PulseConfig;
use env_logger::Env;
use pulse_device::sim::Transition;
use pulse_device::{Frame, LogRenderer, RenderLoop, SimOptions, Simulation, StateKind};
use pulse_device::display::RenderStats;
use pulse_lib::{
    detectors::ppg::{detect_ppi, PpgDetectorConfig},
    io::history::{DirStorage, History, MemStorage, Storage, DEFAULT_HISTORY_CAPACITY},
    io::text as text_io,
    metrics::hrv,
    signal::Sample,
};
use script::{parse_script, ScriptStep};
use serde::Serialize;
use serde_json::Value;
use std::{
    io::{self, Read},
    path::{Path, PathBuf},
    time::Duration,
};

#[derive(Parser)]
#[command(
    name = "pulse",
    version,
    about = "PulseCheck: PPG pulse detection, HRV and device simulation"
)]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect pulse-to-pulse intervals in raw ADC samples from stdin or --input
    Detect {
        #[arg(long, default_value_t = 250)]
        fs: u32,
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Time-domain HRV summary of intervals (ms) from stdin or --input
    Hrv {
        #[arg(long)]
        input: Option<PathBuf>,
        /// Drop intervals further than this fraction from the mean first
        #[arg(long)]
        preprocess: Option<f64>,
    },
    /// Inspect or clear a stored measurement history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Run the device in virtual time against a synthetic sensor and loopback brokers
    Simulate {
        /// `.toml` with [link], [device] and [sim] tables, or a legacy settings file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Persist history here instead of in memory
        #[arg(long)]
        history_dir: Option<PathBuf>,
        /// Steps separated by commas or spaces: wait:<ms>, push, sw, cw, ccw
        #[arg(long, default_value = "")]
        script: String,
        /// Start in the menu instead of booting through splash and connect
        #[arg(long)]
        skip_boot: bool,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        period_ms: Option<f64>,
        #[arg(long)]
        jitter_ms: Option<f64>,
        /// Flat signal, as with no finger on the sensor
        #[arg(long)]
        no_contact: bool,
        /// Keep the wireless link down
        #[arg(long)]
        offline: bool,
        /// Remote analysis requests are never answered
        #[arg(long)]
        no_analysis_service: bool,
        /// Run the render thread alongside and report its counters
        #[arg(long)]
        render: bool,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// Entry names, newest first
    List {
        #[arg(long)]
        dir: PathBuf,
    },
    /// One entry as JSON
    Show {
        #[arg(long)]
        dir: PathBuf,
        name: String,
    },
    /// Delete every entry
    Clear {
        #[arg(long)]
        dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();

    match cli.command {
        Commands::Detect { fs, input } => cmd_detect(fs, input.as_deref())?,
        Commands::Hrv { input, preprocess } => cmd_hrv(input.as_deref(), preprocess)?,
        Commands::History { action } => cmd_history(action)?,
        Commands::Simulate {
            config,
            history_dir,
            script,
            skip_boot,
            seed,
            period_ms,
            jitter_ms,
            no_contact,
            offline,
            no_analysis_service,
            render,
        } => {
            let mut cfg = match config {
                Some(path) => PulseConfig::load(&path)?,
                None => PulseConfig::default(),
            };
            let sim = &mut cfg.sim;
            if let Some(seed) = seed {
                sim.seed = seed;
            }
            if let Some(period) = period_ms {
                sim.pulse_period_ms = period;
            }
            if let Some(jitter) = jitter_ms {
                sim.jitter_ms = jitter;
            }
            sim.contact &= !no_contact;
            sim.analysis_service &= !no_analysis_service;
            if offline {
                sim.link_delay_polls = None;
            }
            cmd_simulate(cfg, history_dir.as_deref(), &script, skip_boot, render)?
        }
    }
    Ok(())
}

fn read_input(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

fn cmd_detect(fs: u32, input: Option<&Path>) -> Result<()> {
    let samples: Vec<Sample> = text_io::parse_sample_series(&read_input(input)?)?;
    let cfg = PpgDetectorConfig {
        fs_hz: fs,
        ..PpgDetectorConfig::default()
    };
    let detection = detect_ppi(&samples, &cfg);
    log::info!(
        "{} intervals from {} samples",
        detection.ppi.len(),
        detection.sample_count
    );
    println!("{}", serde_json::to_string(&detection)?);
    Ok(())
}

fn cmd_hrv(input: Option<&Path>, preprocess: Option<f64>) -> Result<()> {
    let mut ppi = text_io::parse_ppi_series(&read_input(input)?)?;
    if let Some(pct) = preprocess {
        ppi = hrv::preprocess(&ppi, pct).context("preprocessing intervals")?;
    }
    let summary = hrv::summarize(&ppi).context("summarizing intervals")?;
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn open_history(dir: &Path) -> Result<History> {
    let storage = DirStorage::open(dir)
        .with_context(|| format!("failed to open history {}", dir.display()))?;
    Ok(History::new(Box::new(storage), DEFAULT_HISTORY_CAPACITY))
}

fn cmd_history(action: HistoryAction) -> Result<()> {
    match action {
        HistoryAction::List { dir } => {
            let history = open_history(&dir)?;
            println!("{}", serde_json::to_string(&history.newest_first()?)?);
        }
        HistoryAction::Show { dir, name } => {
            let history = open_history(&dir)?;
            let record = history.read(&name)?;
            println!("{}", serde_json::to_string(&record)?);
        }
        HistoryAction::Clear { dir } => {
            let mut history = open_history(&dir)?;
            let removed = history.clear()?;
            log::info!("removed {} entries from {}", removed, dir.display());
            println!("{}", serde_json::json!({ "removed": removed }));
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct PublishedSummary {
    port: u16,
    topic: String,
    payload: Value,
}

#[derive(Serialize)]
struct SimSummary {
    final_state: StateKind,
    elapsed_ms: u64,
    transitions: Vec<Transition>,
    error: Option<Vec<String>>,
    screen: Frame,
    history: Vec<String>,
    published: Vec<PublishedSummary>,
    dropped_inputs: usize,
    render: Option<RenderStats>,
}

fn cmd_simulate(
    cfg: PulseConfig,
    history_dir: Option<&Path>,
    script: &str,
    skip_boot: bool,
    render: bool,
) -> Result<()> {
    let steps = parse_script(script)?;
    let storage: Box<dyn Storage> = match history_dir {
        Some(dir) => Box::new(
            DirStorage::open(dir)
                .with_context(|| format!("failed to open history {}", dir.display()))?,
        ),
        None => Box::new(MemStorage::new()),
    };
    let options: SimOptions = cfg.sim;
    let render_period = Duration::from_millis(cfg.device.render_period_ms.max(1));
    let mut sim = if skip_boot {
        Simulation::starting_in(
            pulse_device::State::menu(),
            cfg.device,
            cfg.link,
            storage,
            &options,
        )
    } else {
        Simulation::new(cfg.device, cfg.link, storage, &options)
    };

    let render_loop = render.then(|| {
        RenderLoop::start(
            sim.board().screen.clone(),
            Box::new(LogRenderer::default()),
            render_period,
        )
    });

    for step in steps {
        let delivered = match step {
            ScriptStep::Wait(ms) => {
                sim.run_for(ms);
                true
            }
            ScriptStep::Push => sim.press_confirm(),
            ScriptStep::Sw => sim.press_reconnect(),
            ScriptStep::Cw => sim.turn(1),
            ScriptStep::Ccw => sim.turn(-1),
        };
        if !delivered {
            log::info!("{:?} at {} ms was not delivered", step, sim.now_ms());
        }
    }

    let render_stats = render_loop.map(RenderLoop::stop);
    let hardware = sim.machine().hardware();
    let summary = SimSummary {
        final_state: sim.kind(),
        elapsed_ms: sim.now_ms(),
        transitions: sim.transitions().to_vec(),
        error: sim.machine().state().error_lines().map(<[String]>::to_vec),
        screen: sim.frame(),
        history: hardware.history.newest_first()?,
        published: sim
            .board()
            .network
            .published()
            .into_iter()
            .map(|p| PublishedSummary {
                port: p.port,
                payload: serde_json::from_slice(&p.payload)
                    .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&p.payload).into())),
                topic: p.topic,
            })
            .collect(),
        dropped_inputs: sim.board().events.dropped(),
        render: render_stats,
    };
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}
