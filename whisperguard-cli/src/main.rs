//! whisperguard - capture microphone audio and send it for analysis
//!
//! Subcommands:
//! - `whisperguard analyze <file.wav>` - Submit an existing WAV file
//! - `whisperguard record` - Record until Enter (or `--seconds`), then submit
//! - `whisperguard monitor` - Stream fixed-length chunks until stopped
//! - `whisperguard devices` - List capture devices

use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use whisperguard_core::{
    CaptureDelegate, ContainerArchive, ContinuousController, Dispatcher, EncodedContainer, HttpDispatcher,
    RecordingController, SessionState, WhisperGuardConfig,
};

mod config;
mod delegate;
mod input;

use delegate::CliDelegate;

#[derive(Parser)]
#[command(name = "whisperguard")]
#[command(about = "Capture microphone audio and submit it to a WhisperGuard analysis service")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// TOML config file (default: ./whisperguard.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Analysis service base URL, e.g. http://127.0.0.1:5000
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Detection sensitivity in [0, 1]
    #[arg(long, global = true)]
    sensitivity: Option<f32>,

    /// Ask the service to keep evidence for every submission
    #[arg(long, global = true)]
    force_save: bool,

    /// Capture device id or friendly name
    #[arg(long, global = true)]
    device: Option<String>,

    /// Use a generated tone instead of the microphone
    #[arg(long, global = true)]
    synthetic: bool,

    /// Keep a copy of every submitted WAV (plus metadata) in this directory
    #[arg(long, global = true)]
    save_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit an existing WAV file
    Analyze {
        /// Path to a PCM WAV file
        file: PathBuf,
    },

    /// Record once, then submit the whole recording
    Record {
        /// Stop automatically after this many seconds
        #[arg(short, long)]
        seconds: Option<f64>,
    },

    /// Stream fixed-length chunks to the service until stopped
    Monitor {
        /// Stop automatically after this many seconds
        #[arg(short, long)]
        seconds: Option<f64>,
    },

    /// List capture devices
    Devices,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let overrides = config::Overrides {
        endpoint: cli.global.endpoint.clone(),
        sensitivity: cli.global.sensitivity,
        force_save: cli.global.force_save,
        mic_device: cli.global.device.clone(),
    };
    let config_path = cli.global.config.clone().or_else(config::default_path);
    let config = config::load(config_path.as_deref(), &overrides)?;

    let archive = cli
        .global
        .save_dir
        .as_ref()
        .map(ContainerArchive::new)
        .transpose()?;

    match cli.command {
        Commands::Analyze { file } => analyze(&config, file, archive),
        Commands::Record { seconds } => record(&config, cli.global.synthetic, seconds, archive),
        Commands::Monitor { seconds } => monitor(&config, cli.global.synthetic, seconds, archive),
        Commands::Devices => devices(),
    }
}

/// Read a WAV file from disk as an upload named after the file.
fn load_upload(file: &Path) -> Result<EncodedContainer> {
    let bytes = fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.wav".into());
    EncodedContainer::from_wav_bytes(name, bytes).with_context(|| format!("{} is not a PCM WAV file", file.display()))
}

fn analyze(config: &WhisperGuardConfig, file: PathBuf, archive: Option<ContainerArchive>) -> Result<()> {
    let container = load_upload(&file)?;
    log::info!(
        "Submitting {} ({:.2}s at {} Hz)",
        file.display(),
        container.duration_secs(),
        container.sample_rate()
    );

    if let Some(archive) = &archive {
        archive.save(&container)?;
    }

    let dispatcher = HttpDispatcher::new(&config.dispatch)?;
    let result = dispatcher.submit(&container, &config.capture.params)?;
    println!("{}", serde_json::to_string_pretty(&result.body)?);
    Ok(())
}

fn record(
    config: &WhisperGuardConfig,
    synthetic: bool,
    seconds: Option<f64>,
    archive: Option<ContainerArchive>,
) -> Result<()> {
    let dispatcher = HttpDispatcher::new(&config.dispatch)?;
    let mut controller = RecordingController::new(
        input::open(&config.capture, synthetic),
        dispatcher,
        config.capture.clone(),
    );
    controller.set_delegate(Arc::new(CliDelegate::new(archive)));

    controller.start()?;
    eprintln!("Recording from {}. {}", controller.session().device_info().name, stop_hint(seconds));
    wait_for_stop(seconds)?;

    match controller.stop()? {
        Some(result) => println!("{}", serde_json::to_string_pretty(&result.body)?),
        None => log::warn!("Nothing was recorded"),
    }
    Ok(())
}

fn monitor(
    config: &WhisperGuardConfig,
    synthetic: bool,
    seconds: Option<f64>,
    archive: Option<ContainerArchive>,
) -> Result<()> {
    let dispatcher = HttpDispatcher::new(&config.dispatch)?;
    let delegate = Arc::new(CliDelegate::new(archive));
    let mut controller = ContinuousController::new(
        input::open(&config.capture, synthetic),
        dispatcher,
        config.capture.clone(),
    );
    controller.set_delegate(Arc::clone(&delegate) as Arc<dyn CaptureDelegate>);

    controller.start()?;
    eprintln!(
        "Monitoring at {} Hz in {} ms chunks. {}",
        controller.sample_rate(),
        config.capture.chunk_period_ms,
        stop_hint(seconds)
    );
    wait_for_stop(seconds)?;
    let ended = controller.state();
    controller.stop();

    let drain_deadline = Instant::now() + config.dispatch.timeout() + Duration::from_secs(1);
    while controller.pending_dispatches() > 0 && Instant::now() < drain_deadline {
        thread::sleep(Duration::from_millis(50));
    }
    if controller.pending_dispatches() > 0 {
        log::warn!("{} chunk(s) still in flight at exit", controller.pending_dispatches());
    }

    log::info!(
        "Sent {} chunk(s), {} failed",
        controller.chunks_sent(),
        delegate.failures()
    );
    if let SessionState::Error(e) = ended {
        bail!("monitoring ended early: {}", e);
    }
    Ok(())
}

fn devices() -> Result<()> {
    let devices = input::list_devices()?;
    if devices.is_empty() {
        bail!("no capture devices found");
    }
    for device in devices {
        println!(
            "{} {}  ({}){}",
            if device.is_default { "*" } else { " " },
            device.name,
            device.id,
            device
                .transport_type
                .map(|t| format!(" [{:?}]", t))
                .unwrap_or_default()
        );
    }
    Ok(())
}

fn stop_hint(seconds: Option<f64>) -> String {
    match seconds {
        Some(s) => format!("Stopping after {} s or on Enter.", s),
        None => "Press Enter to stop.".into(),
    }
}

/// Block until Enter is pressed or `seconds` elapse.
fn wait_for_stop(seconds: Option<f64>) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("stdin-wait".into())
        .spawn(move || {
            let mut line = String::new();
            if let Ok(n) = std::io::stdin().lock().read_line(&mut line) {
                if n > 0 {
                    let _ = tx.send(());
                }
            }
        })
        .context("failed to spawn stdin reader")?;

    match seconds {
        Some(s) if s.is_finite() && s >= 0.0 => {
            let _ = rx.recv_timeout(Duration::from_secs_f64(s));
        }
        Some(s) => bail!("invalid duration: {}", s),
        // Without a terminal, stdin hits EOF and the sender drops.
        None => {
            let _ = rx.recv();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use whisperguard_core::processing::wav_format::encode_pcm16_mono;
    use whisperguard_core::ContainerKind;

    #[test]
    fn upload_is_named_after_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("door.wav");
        fs::write(&path, encode_pcm16_mono(&[0.0; 160], 16000)).unwrap();

        let container = load_upload(&path).unwrap();
        assert_eq!(container.file_name(), "door.wav");
        assert_eq!(
            container.kind(),
            &ContainerKind::Upload {
                file_name: "door.wav".into()
            }
        );
        assert_eq!(container.sample_count(), 160);
    }

    #[test]
    fn non_wav_upload_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.wav");
        fs::write(&path, b"not a riff file at all, just some text padding it out").unwrap();
        assert!(load_upload(&path).is_err());
        assert!(load_upload(&dir.path().join("missing.wav")).is_err());
    }
}
