use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use video_recorder::{
    CameraFacing, Config, Quality, RecordingOptions, SessionPhase, SimulatedBackend,
    StaticPermissions, SurfaceHandle, VideoRecorder,
};

const DEFAULT_CONFIG: &str = "config/video-recorder";

#[derive(Parser)]
#[command(name = "video-recorder")]
#[command(about = "Camera recording sessions against the simulated device backend")]
#[command(version)]
struct Cli {
    /// Config file (without extension)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a video and print its result as JSON
    Record {
        /// low, medium, high or highest
        #[arg(short, long)]
        quality: Option<String>,

        /// Automatic stop after this many seconds (0 = unbounded)
        #[arg(short, long)]
        max_duration: Option<f64>,

        /// front or back
        #[arg(short, long)]
        camera: Option<String>,

        /// Output filename prefix
        #[arg(short, long)]
        prefix: Option<String>,

        /// Record without an audio track
        #[arg(long)]
        no_audio: bool,

        /// Stop after this many seconds (default: wait for max duration or Ctrl-C)
        #[arg(short, long)]
        duration: Option<f64>,

        /// Switch to the other camera before recording
        #[arg(long)]
        switch_camera: bool,
    },

    /// List the video modes a camera supports
    Modes {
        #[arg(short, long, default_value = "back")]
        camera: String,

        /// List audio modes instead
        #[arg(long)]
        audio: bool,
    },

    /// Delete a recording
    Delete {
        path: PathBuf,

        /// Also delete its thumbnail
        #[arg(long)]
        thumbnail: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref())?;

    info!("Loaded config: {}", cfg.service.name);

    let backend = SimulatedBackend::new();
    let recorder = VideoRecorder::new(
        cfg,
        backend.device_backend(),
        Arc::new(StaticPermissions::granted()),
    );

    match cli.command {
        Commands::Record {
            quality,
            max_duration,
            camera,
            prefix,
            no_audio,
            duration,
            switch_camera,
        } => {
            let mut options = recorder.config().defaults.clone();
            if let Some(quality) = quality {
                options.quality = quality.parse::<Quality>()?;
            }
            if let Some(max_duration) = max_duration {
                options.max_duration = max_duration;
            }
            if let Some(camera) = camera {
                options.camera = camera.parse::<CameraFacing>()?;
            }
            if let Some(prefix) = prefix {
                options.file_name_prefix = prefix;
            }
            if no_audio {
                options.enable_audio = false;
            }

            record(&recorder, options, duration, switch_camera).await
        }
        Commands::Modes { camera, audio } => {
            let modes = if audio {
                recorder.supported_audio_modes()
            } else {
                recorder.supported_video_modes(camera.parse::<CameraFacing>()?)
            };
            println!("{}", serde_json::to_string_pretty(&modes)?);
            Ok(())
        }
        Commands::Delete { path, thumbnail } => {
            recorder.delete_recording(&path, thumbnail)?;
            Ok(())
        }
    }
}

fn load_config(path: Option<&str>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None if Path::new(&format!("{}.toml", DEFAULT_CONFIG)).exists() => {
            Config::load(DEFAULT_CONFIG)
        }
        None => {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}

async fn record(
    recorder: &VideoRecorder,
    options: RecordingOptions,
    duration: Option<f64>,
    switch_camera: bool,
) -> Result<()> {
    let stop_after = duration
        .map(|secs| {
            Duration::try_from_secs_f64(secs)
                .map_err(|_| anyhow!("--duration must be a non-negative number of seconds"))
        })
        .transpose()?;

    let (session, completion) = recorder
        .open_session(options, Some(SurfaceHandle::new()))
        .await?;

    // Portrait phone-sized viewport
    if let Some(layout) = session.surface_resized(1080, 2400).await? {
        debug!("Preview layout: {:?}", layout);
    }

    if switch_camera {
        session.switch_camera().await?;
    }

    let started = session.start().await?;
    info!(
        "Recording {} -> {}",
        started.recording_id,
        started.video_path.display()
    );

    let mut indicator = session.indicator();
    tokio::spawn(async move {
        let mut last = None;
        while indicator.changed().await.is_ok() {
            let current = *indicator.borrow();
            if current.phase != SessionPhase::Recording {
                break;
            }
            if last != Some(current.elapsed_secs) {
                info!("● {}", current.label());
                last = Some(current.elapsed_secs);
            }
        }
    });

    let outcome = completion.wait();
    tokio::pin!(outcome);

    let outcome = tokio::select! {
        outcome = &mut outcome => outcome,
        _ = stop_signal(stop_after) => {
            if let Err(e) = session.stop().await {
                warn!("Stop failed: {}", e);
            }
            (&mut outcome).await
        }
    };

    session.teardown().await?;

    let result = outcome.into_result()?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn stop_signal(after: Option<Duration>) {
    match after {
        Some(after) => {
            tokio::select! {
                _ = tokio::time::sleep(after) => {}
                _ = tokio::signal::ctrl_c() => info!("Interrupted"),
            }
        }
        None => {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted");
            }
        }
    }
}
