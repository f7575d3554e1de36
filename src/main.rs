//! AdhesioSense - headless adhesion classification
//!
//! Classifies still images, replays a directory of frames through the live
//! scanner and manages the stored result history.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use adhesio_sense::capture::{CaptureConfig, CaptureController, DirectoryCamera};
use adhesio_sense::classifier::{ClassifierClient, RemoteClassifier, ResultRecord};
use adhesio_sense::config::{self, AppConfig, BackendKind};
use adhesio_sense::shared::CaptureEvent;
use adhesio_sense::storage::{self, ResultStore, SqliteSettings};

/// AdhesioSense - adhesion detection from camera frames
#[derive(Parser, Debug)]
#[command(name = "adhesio-sense")]
#[command(about = "Classify images for adhesion and keep a history of results")]
struct Args {
    /// Configuration file (defaults to <config dir>/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured classifier backend
    #[arg(long, global = true, value_enum)]
    backend: Option<BackendArg>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify a single image
    Classify {
        image: PathBuf,
        /// Store the result in the history
        #[arg(long)]
        save: bool,
    },
    /// List stored results, newest first
    History,
    /// Delete one stored result
    Delete { id: String },
    /// Delete all stored results
    Clear,
    /// Query the remote classifier's health endpoint
    Health,
    /// Live scan a directory of frames
    Scan {
        dir: PathBuf,
        /// How long to scan before finalizing
        #[arg(long, default_value = "3000")]
        duration_ms: u64,
        /// Classify and store a full-resolution frame when the scan ends
        #[arg(long)]
        save_final: bool,
    },
    /// Write the current configuration to disk
    InitConfig,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    OnDevice,
    Remote,
    Mock,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::OnDevice => BackendKind::OnDevice,
            BackendArg::Remote => BackendKind::Remote,
            BackendArg::Mock => BackendKind::Mock,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => storage::get_config_dir()?.join("config.toml"),
    };
    let mut config = load_or_create_config(&config_path);
    if let Some(backend) = args.backend {
        config.classifier.backend = backend.into();
    }

    match args.command {
        Command::Classify { image, save } => classify(&config, &image, save).await,
        Command::History => history(&config),
        Command::Delete { id } => {
            let store = open_store(&config)?;
            if store.get(&id)?.is_none() {
                warn!("No stored result with id {}", id);
            }
            store.delete(&id)?;
            Ok(())
        }
        Command::Clear => {
            open_store(&config)?.clear()?;
            info!("Result history cleared");
            Ok(())
        }
        Command::Health => health(&config).await,
        Command::Scan {
            dir,
            duration_ms,
            save_final,
        } => scan(&config, dir, Duration::from_millis(duration_ms), save_final).await,
        Command::InitConfig => {
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            config::save_config(&config, &config_path)?;
            println!("Wrote configuration to {}", config_path.display());
            Ok(())
        }
    }
}

/// Load configuration from file or create default
fn load_or_create_config(config_path: &Path) -> AppConfig {
    if config_path.exists() {
        match config::load_config(config_path) {
            Ok(config) => {
                info!("Loaded configuration from {:?}", config_path);
                return config;
            }
            Err(e) => warn!("Ignoring invalid configuration {:?}: {:#}", config_path, e),
        }
    }
    info!("Using default configuration");
    AppConfig::default()
}

fn open_store(config: &AppConfig) -> Result<ResultStore<SqliteSettings>> {
    let path = match &config.storage.database_path {
        Some(path) => path.clone(),
        None => storage::get_data_dir()?.join("settings.db"),
    };
    let settings = SqliteSettings::open(&path)
        .with_context(|| format!("Failed to open settings database {:?}", path))?;
    Ok(ResultStore::with_key(settings, config.storage.history_key.clone()))
}

fn print_record(record: &ResultRecord) {
    println!(
        "{}  {}  {:<16} {:>6.1}%  {}",
        record.timestamp.format("%Y-%m-%d %H:%M:%S"),
        record.id,
        record.prediction.label(),
        record.probability * 100.0,
        record.image_path
    );
    if let Some(error) = &record.error {
        println!("    error: {}", error);
    }
}

async fn classify(config: &AppConfig, image: &Path, save: bool) -> Result<()> {
    let client = ClassifierClient::from_config(config)?;
    let record = client.classify_file(image).await;
    print_record(&record);

    if save {
        if record.is_error() {
            bail!("Not saving failed classification");
        }
        open_store(config)?.save(record)?;
        info!("Result saved");
    }
    Ok(())
}

fn history(config: &AppConfig) -> Result<()> {
    let records = open_store(config)?.list()?;
    if records.is_empty() {
        println!("No stored results");
    }
    for record in &records {
        print_record(record);
    }
    Ok(())
}

async fn health(config: &AppConfig) -> Result<()> {
    let remote = RemoteClassifier::new(&config.classifier, config.capture.scratch_dir.clone())?;
    let status = remote.health().await?;
    println!(
        "{}: {} ({}) version {}",
        remote.endpoint(),
        status.status,
        status.message,
        status.version
    );
    Ok(())
}

async fn scan(config: &AppConfig, dir: PathBuf, duration: Duration, save_final: bool) -> Result<()> {
    let client = ClassifierClient::from_config(config)?;
    let camera = DirectoryCamera::new(dir, config.capture.preview_max_dimension);
    let controller = CaptureController::new(
        Box::new(camera),
        client.clone(),
        CaptureConfig::from(&config.capture),
    );

    let events = controller.subscribe();
    let printer = std::thread::spawn(move || {
        for event in events {
            match event {
                CaptureEvent::ResultPublished { sequence, record } => {
                    print!("#{:<4} ", sequence);
                    print_record(&record);
                }
                CaptureEvent::FrameFailed { message } => warn!("Frame failed: {}", message),
                CaptureEvent::StateChanged { from, to } => info!("{:?} -> {:?}", from, to),
                CaptureEvent::Classifying { .. } => {}
            }
        }
    });

    controller.initialize()?;
    controller.start_live_scan()?;
    tokio::time::sleep(duration).await;
    let frame = controller.finalize_capture()?;
    let status = controller.status();
    controller.dispose();
    if printer.join().is_err() {
        warn!("Event printer panicked");
    }

    info!("Captured {} frames", status.frames_captured);

    if save_final {
        let captures = storage::get_data_dir()?.join("captures");
        let path = frame.save_to_dir(&captures)?;
        let record = client.classify_file(&path).await;
        print_record(&record);
        if record.is_error() {
            bail!("Final frame could not be classified");
        }
        open_store(config)?.save(record)?;
        info!("Final result saved");
    }
    Ok(())
}
