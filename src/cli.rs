use crate::camera::{CameraManager, CaptureSettings, NokhwaBackend};
use crate::config::{load_config, load_config_from, Config};
use crate::controller::{CameraSession, Controller};
use crate::device::{select_physical_camera_index, DeviceProbe, NokhwaProbe, SelectorPolicy};
use crate::error::Result;
use crate::events::{stdout_sink, EventSink};
use crate::frame::Frame;
use crate::pipeline::Coordinator;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "object-voice",
    version,
    about = "Gives a voice to the object in front of the camera"
)]
pub struct Cli {
    /// Configuration file (defaults to $OBJECT_VOICE_CONFIG or config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read commands from stdin and report progress on stdout
    Serve {
        /// Camera index; skips physical camera selection
        #[arg(short, long)]
        camera: Option<u32>,
        /// Root of the capture, processed, debug and voice directories
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
    },
    /// Print the enumerable cameras and the one that would be selected
    ListCameras,
    /// Run the pipeline once on an image file
    Process { image: PathBuf },
}

pub fn run_cli() {
    // stdout carries events; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    if let Err(e) = execute(cli) {
        error!("{e}");
        std::process::exit(1);
    }
}

pub fn resolve_config(cli_path: Option<&PathBuf>) -> Config {
    match cli_path {
        Some(p) => load_config_from(p),
        None => load_config(),
    }
}

pub fn execute(cli: Cli) -> Result<()> {
    let mut cfg = resolve_config(cli.config.as_ref());
    match cli.command {
        Commands::Serve { camera, data_dir } => {
            if let Some(d) = data_dir {
                cfg.pipeline.data_dir = d;
            }
            if camera.is_some() {
                cfg.camera.index = camera;
            }
            serve(cfg);
            Ok(())
        }
        Commands::ListCameras => {
            list_cameras(&cfg);
            Ok(())
        }
        Commands::Process { image } => process(cfg, image),
    }
}

fn selector_policy(cfg: &Config) -> SelectorPolicy {
    SelectorPolicy {
        exclude_patterns: cfg.camera.exclude_patterns.clone(),
        min_fps: cfg.camera.min_fps,
        fallback_index: cfg.camera.fallback_index,
    }
}

fn serve(cfg: Config) {
    let index = match cfg.camera.index {
        Some(i) => i,
        None => select_physical_camera_index(&mut NokhwaProbe, &selector_policy(&cfg)),
    };
    info!(camera = index, data_dir = %cfg.pipeline.data_dir.display(), "starting");
    let events: Arc<dyn EventSink> = Arc::new(stdout_sink());
    let debounce = Duration::from_millis(cfg.pipeline.debounce_ms);
    let worker_events = events.clone();
    let controller = Controller::spawn(events, debounce, move || {
        let coordinator = Coordinator::from_config(&cfg, worker_events);
        let settings = CaptureSettings::from(&cfg.camera);
        let mut camera = CameraManager::new(NokhwaBackend, index, settings);
        // a camera that fails to open now is retried by the first capture
        if let Err(e) = camera.initialize(index, (cfg.camera.width, cfg.camera.height), cfg.camera.manual) {
            error!("{e}");
        }
        Ok(CameraSession::new(
            camera,
            coordinator,
            cfg.camera.warmup_frames,
            cfg.camera.sample_frames,
        ))
    });
    controller.run(std::io::stdin().lock());
    info!("stopped");
}

fn list_cameras(cfg: &Config) {
    let mut probe = NokhwaProbe;
    match probe.enumerate() {
        Some(devices) => {
            for d in devices {
                println!("{}: {}", d.index, d.name);
            }
        }
        None => println!("device names unavailable"),
    }
    let selected = select_physical_camera_index(&mut probe, &selector_policy(cfg));
    println!("selected: {selected}");
}

fn process(cfg: Config, image: PathBuf) -> Result<()> {
    let frame = Frame::open(&image)?;
    debug!(width = frame.width(), height = frame.height(), "image loaded");
    let events: Arc<dyn EventSink> = Arc::new(stdout_sink());
    let mut coordinator = Coordinator::from_config(&cfg, events);
    let pair = coordinator.run_capture_pipeline(frame);
    info!(message = %pair.message, attribution = %pair.attribution, "done");
    Ok(())
}
