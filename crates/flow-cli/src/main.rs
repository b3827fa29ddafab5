use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use flow_junction::{doctor, Junction, JunctionConfig, PathSources, PhaseTimings, RunState};
use flow_proto::{Approach, JunctionEvent};
use flow_vision::{init_detector, open_source, RoadProcessor, VisionConfig};

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Parser)]
#[command(name = "flowsig", version, about = "FlowSignal - video-driven four-way signal timing")]
struct Cli {
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate configuration and configured video paths.
    Doctor,
    /// Process all four approaches, then run the signal sequence.
    Run {
        #[arg(long)]
        north: Option<PathBuf>,
        #[arg(long)]
        east: Option<PathBuf>,
        #[arg(long)]
        south: Option<PathBuf>,
        #[arg(long)]
        west: Option<PathBuf>,
    },
    /// Process a single video and print its green time.
    Process {
        path: PathBuf,
        #[arg(long, default_value = "north")]
        approach: Approach,
    },
    /// Green time for a given peak vehicle count.
    Estimate { count: usize },
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct Config {
    vision: VisionConfig,
    timing: PhaseTimings,
    sources: SourcesCfg,
    output: OutputCfg,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SourcesCfg {
    north: Option<PathBuf>,
    east: Option<PathBuf>,
    south: Option<PathBuf>,
    west: Option<PathBuf>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
struct OutputCfg {
    format: String, // "text" | "json"
}

impl Default for OutputCfg {
    fn default() -> Self {
        Self { format: "text".into() }
    }
}

impl Config {
    fn junction(&self) -> JunctionConfig {
        JunctionConfig { vision: self.vision.clone(), timing: self.timing }
    }
}

fn load_config(path: Option<&str>) -> Result<Config> {
    let Some(path) = path else { return Ok(Config::default()); };
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
    toml::from_str(&s).context("parse config toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref())?;

    match cli.cmd {
        Command::Doctor => doctor_cmd(&cfg)?,
        Command::Run { north, east, south, west } => {
            let sources = PathSources::new([
                north.or_else(|| cfg.sources.north.clone()),
                east.or_else(|| cfg.sources.east.clone()),
                south.or_else(|| cfg.sources.south.clone()),
                west.or_else(|| cfg.sources.west.clone()),
            ]);
            run(&cfg, sources).await?
        }
        Command::Process { path, approach } => process(&cfg, path, approach).await?,
        Command::Estimate { count } => {
            println!("{}", cfg.vision.flow.green_seconds(count));
        }
    }
    Ok(())
}

fn doctor_cmd(cfg: &Config) -> Result<()> {
    info!("doctor: starting");
    doctor::check_config(&cfg.junction())?;

    let configured = [&cfg.sources.north, &cfg.sources.east, &cfg.sources.south, &cfg.sources.west];
    for (approach, path) in Approach::ALL.into_iter().zip(configured) {
        match path {
            None => warn!("doctor: no video for {} (default green will be used)", approach),
            Some(p) if !p.exists() => warn!("doctor: {} video missing: {}", approach, p.display()),
            Some(p) => info!("doctor: {} -> {}", approach, p.display()),
        }
    }
    anyhow::ensure!(
        matches!(cfg.output.format.as_str(), "text" | "json"),
        "output.format must be \"text\" or \"json\""
    );

    info!("doctor: OK");
    Ok(())
}

async fn run(cfg: &Config, sources: PathSources) -> Result<()> {
    info!("run: starting");
    let (mut junction, rx) = Junction::new(cfg.junction());
    let presenter = tokio::spawn(present(rx, cfg.output.format == "json"));

    if let Err(e) = junction.start(sources).await {
        let _ = presenter.await;
        return Err(e).context("start junction");
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancelled = false;
    let end = loop {
        tokio::select! {
            _ = &mut ctrl_c, if !cancelled => {
                warn!("run: interrupt, cancelling");
                junction.cancel();
                cancelled = true;
            }
            _ = tokio::time::sleep(Duration::from_millis(200)) => {
                if !junction.is_running() {
                    break junction.join().await;
                }
            }
        }
    };
    let _ = presenter.await;

    let st = junction.state();
    for a in Approach::ALL {
        match &st.road(a).result {
            Some(r) => println!(
                "{:<5}  green={:>2}s  max_count={:<3} emergency={}  ({:?})",
                a, r.green_s, r.max_count, r.emergency, r.origin
            ),
            None => println!("{:<5}  not processed", a),
        }
    }

    match end {
        Some(RunState::Completed) | Some(RunState::Cancelled) => Ok(()),
        Some(RunState::Failed(msg)) => anyhow::bail!("junction run failed: {}", msg),
        other => anyhow::bail!("junction run ended unexpectedly: {:?}", other),
    }
}

/// Presentation side: renders events until the run ends.
async fn present(mut rx: mpsc::Receiver<JunctionEvent>, json: bool) {
    while let Some(ev) = rx.recv().await {
        if json {
            match serde_json::to_string(&ev) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("present: encode event: {}", e),
            }
        } else {
            println!("{}", ev);
        }
        if ev.is_terminal() {
            break;
        }
    }
}

async fn process(cfg: &Config, path: PathBuf, approach: Approach) -> Result<()> {
    let vision = cfg.vision.clone();
    let r = tokio::task::spawn_blocking(move || -> Result<_> {
        let mut detector = init_detector(&vision)?;
        let mut source = open_source(&path)?;
        let mut proc = RoadProcessor::new(approach, &vision);
        let stop = AtomicBool::new(false);
        let r = proc.run(source.as_mut(), detector.as_mut(), &stop)?;
        Ok((r, proc.stats().clone()))
    })
    .await
    .context("processing task")??;

    let (r, stats) = r;
    println!("approach:   {}", r.approach);
    println!("frames:     {}", stats.frames);
    println!("max_count:  {}", r.max_count);
    println!("green:      {}s", r.green_s);
    println!("emergency:  {}", r.emergency);
    println!("ignored:    {} (low confidence: {})", stats.ignored, stats.low_conf);
    Ok(())
}
