// polyp-scope command line interface
// Serve the examination UI, run headless examinations and manage the database

mod headless;

use anyhow::Context;
use clap::{Parser, Subcommand};
use polyp_core::{PersistencePolicy, ScopeConfig};
use polyp_eye::{encode_image_sequence, load_detector, EndoscopeDevice, Examination};
use polyp_server::AppState;
use polyp_storage::{
    create_pool, init_database, query_endoscope_device, reset_database, seed_defaults,
    DbFrameSink, DbPool, RecorderSettings, SeedDefaults,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_FILE: &str = "polyp.toml";

#[derive(Parser, Debug)]
#[command(name = "polyp")]
#[command(about = "Colonoscopy polyp detection: examination UI, headless runs and local records", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML or YAML). Defaults to ./polyp.toml if present
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the examination UI
    ///
    /// The default detector backend is ONNX, which needs a build with
    /// `--features onnx`. Other builds must set `backend = "none"` under
    /// `[detector]` in the config file.
    Serve {
        /// Address to bind, e.g. 0.0.0.0:7860
        #[arg(long)]
        bind: Option<String>,

        /// Recording policy: off, session or every:<n>
        #[arg(long)]
        persistence: Option<String>,
    },

    /// Feed a video through the examination without a UI
    Run {
        /// Video file, or a directory of numbered images
        #[arg(long)]
        video: PathBuf,

        /// Write one annotated JPEG per frame into this directory
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Encode the annotated frames into this mp4 instead
        #[arg(long)]
        out_video: Option<PathBuf>,

        /// Frame rate of --out-video
        #[arg(long, default_value = "25")]
        fps: u32,

        /// Do not draw bounding boxes
        #[arg(long)]
        no_detection: bool,

        /// Do not draw segmentation masks
        #[arg(long)]
        no_segmentation: bool,

        /// Recording policy: off, session or every:<n>
        #[arg(long)]
        persistence: Option<String>,
    },

    /// Database operations
    #[command(subcommand)]
    Db(DbCommands),

    /// Encode a directory of images into an mp4
    Encode {
        /// Directory of numbered JPEG or PNG images
        #[arg(long)]
        images: PathBuf,

        /// Output mp4 path
        #[arg(long)]
        output: PathBuf,

        #[arg(long, default_value = "5")]
        fps: u32,
    },
}

#[derive(Subcommand, Debug)]
enum DbCommands {
    /// Create the nine tables if they do not exist
    Init,
    /// Insert the default doctor, device, models and patient
    Seed,
    /// Delete the database and image outputs, then recreate and seed
    Reset,
    /// Print one endoscope device as JSON
    ShowDevice {
        #[arg(long)]
        id: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { bind, persistence } => serve(config, bind, persistence).await,
        Commands::Run {
            video,
            out_dir,
            out_video,
            fps,
            no_detection,
            no_segmentation,
            persistence,
        } => {
            let output = headless::resolve_output(out_dir, out_video, fps)?;
            run(config, video, output, !no_detection, !no_segmentation, persistence).await
        }
        Commands::Db(cmd) => handle_db_command(&config, cmd).await,
        Commands::Encode {
            images,
            output,
            fps,
        } => encode(images, output, fps).await,
    }
}

fn init_logging(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ScopeConfig> {
    let default_path = Path::new(DEFAULT_CONFIG_FILE);
    let path = match path {
        Some(path) => Some(path),
        None if default_path.is_file() => Some(default_path),
        None => None,
    };

    let mut config = match path {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            ScopeConfig::from_file(path)
                .with_context(|| format!("cannot load {}", path.display()))?
        }
        None => ScopeConfig::default(),
    };
    config.apply_env().context("invalid POLYP_* environment override")?;
    Ok(config)
}

fn apply_persistence(config: &mut ScopeConfig, persistence: Option<String>) -> anyhow::Result<()> {
    if let Some(policy) = persistence {
        config.storage.persistence = PersistencePolicy::parse(&policy)?;
    }
    Ok(())
}

async fn open_database(config: &ScopeConfig) -> anyhow::Result<DbPool> {
    let path = &config.storage.database_path;
    let pool = create_pool(path, true)
        .await
        .with_context(|| format!("cannot open database {}", path.display()))?;
    init_database(&pool).await?;
    Ok(pool)
}

/// Build the examination, attaching a recorder when the policy asks for one.
fn build_examination(
    config: &ScopeConfig,
    pool: &DbPool,
) -> anyhow::Result<(Examination, Option<JoinHandle<()>>)> {
    let detector = load_detector(&config.detector).context("failed to load the detector")?;
    let descriptor = detector.descriptor();
    info!("Detector ready: {} {}", descriptor.name, descriptor.version);

    let device = EndoscopeDevice::from_config(&config.device);
    let examination = Examination::from_config(detector, device, &config.examination);

    let policy = config.storage.persistence;
    if !policy.records_session() {
        return Ok((examination, None));
    }
    let (sink, handle) = DbFrameSink::spawn(pool.clone(), RecorderSettings::from_config(config));
    info!("Recording sessions with policy {:?}", policy);
    Ok((examination.with_recorder(Arc::new(sink), policy), Some(handle)))
}

async fn drain_recorder(recorder: Option<JoinHandle<()>>) {
    let Some(handle) = recorder else {
        return;
    };
    match tokio::time::timeout(Duration::from_secs(10), handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Recorder task failed: {}", e),
        Err(_) => warn!("Recorder did not drain in time; some frames may be missing"),
    }
}

async fn serve(
    mut config: ScopeConfig,
    bind: Option<String>,
    persistence: Option<String>,
) -> anyhow::Result<()> {
    if let Some(bind) = bind {
        config.server.bind_address = bind;
    }
    apply_persistence(&mut config, persistence)?;
    config.validate()?;

    let pool = open_database(&config).await?;
    let (examination, recorder) = build_examination(&config, &pool)?;

    let state = AppState::new(examination, &config.server).with_database(pool.clone());
    polyp_server::serve(state, &config.server.bind_address)
        .await
        .with_context(|| format!("server on {} failed", config.server.bind_address))?;

    drain_recorder(recorder).await;
    pool.close().await;
    Ok(())
}

async fn run(
    mut config: ScopeConfig,
    video: PathBuf,
    output: headless::Output,
    detection: bool,
    segmentation: bool,
    persistence: Option<String>,
) -> anyhow::Result<()> {
    apply_persistence(&mut config, persistence)?;
    config.examination.detection_enabled = detection;
    config.examination.segmentation_enabled = segmentation;
    config.validate()?;

    let pool = open_database(&config).await?;
    let (examination, recorder) = build_examination(&config, &pool)?;
    let quality = config.server.jpeg_quality;

    let summary = tokio::task::spawn_blocking(move || {
        headless::run(&examination, &video, &output, quality)
    })
    .await??;
    info!(
        "Examination finished: {} frames, {} detections",
        summary.frames, summary.detections
    );

    drain_recorder(recorder).await;
    pool.close().await;
    Ok(())
}

async fn handle_db_command(config: &ScopeConfig, cmd: DbCommands) -> anyhow::Result<()> {
    match cmd {
        DbCommands::Init => {
            let pool = open_database(config).await?;
            info!("Database ready at {}", config.storage.database_path.display());
            pool.close().await;
        }
        DbCommands::Seed => {
            let pool = open_database(config).await?;
            let ids = seed_defaults(&pool, &SeedDefaults::from_config(config)).await?;
            println!(
                "{}",
                serde_json::json!({
                    "doctor_id": ids.doctor_id,
                    "patient_id": ids.patient_id,
                    "device_id": ids.device_id,
                    "detection_model_id": ids.detection_model_id,
                    "segmentation_model_id": ids.segmentation_model_id,
                })
            );
            pool.close().await;
        }
        DbCommands::Reset => {
            let storage = &config.storage;
            let pool = reset_database(
                &storage.database_path,
                &[
                    storage.raw_output_dir.as_path(),
                    storage.segmented_output_dir.as_path(),
                ],
                &SeedDefaults::from_config(config),
            )
            .await?;
            info!("Database reset at {}", storage.database_path.display());
            pool.close().await;
        }
        DbCommands::ShowDevice { id } => {
            let pool = open_database(config).await?;
            let device = query_endoscope_device(&pool, id).await?;
            println!("{}", serde_json::to_string_pretty(&device)?);
            pool.close().await;
        }
    }
    Ok(())
}

async fn encode(images: PathBuf, output: PathBuf, fps: u32) -> anyhow::Result<()> {
    if fps == 0 {
        anyhow::bail!("--fps must be at least 1");
    }
    let written = tokio::task::spawn_blocking(move || {
        encode_image_sequence(&images, &output, fps).map(|n| (n, output))
    })
    .await??;
    info!("Wrote {} frames to {}", written.0, written.1.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_parse_serve() {
        let cli = Cli::try_parse_from(["polyp", "serve", "--bind", "0.0.0.0:8000"]).unwrap();
        match cli.command {
            Commands::Serve { bind, persistence } => {
                assert_eq!(bind.as_deref(), Some("0.0.0.0:8000"));
                assert!(persistence.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_serve_help_names_onnx_requirement() {
        let help = Cli::command()
            .find_subcommand_mut("serve")
            .unwrap()
            .render_long_help()
            .to_string();
        let help = help.split_whitespace().collect::<Vec<_>>().join(" ");
        assert!(help.contains("--features onnx"));
        assert!(help.contains(r#"backend = "none""#));
    }

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "polyp",
            "--verbose",
            "run",
            "--video",
            "clip.mp4",
            "--out-video",
            "out.mp4",
            "--no-segmentation",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Run {
                video,
                out_video,
                fps,
                no_detection,
                no_segmentation,
                ..
            } => {
                assert_eq!(video, PathBuf::from("clip.mp4"));
                assert_eq!(out_video, Some(PathBuf::from("out.mp4")));
                assert_eq!(fps, 25);
                assert!(!no_detection);
                assert!(no_segmentation);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_db_and_encode() {
        let cli = Cli::try_parse_from(["polyp", "db", "show-device", "--id", "3"]).unwrap();
        assert!(matches!(cli.command, Commands::Db(DbCommands::ShowDevice { id: 3 })));

        let cli =
            Cli::try_parse_from(["polyp", "encode", "--images", "seq", "--output", "a.mp4"])
                .unwrap();
        assert!(matches!(cli.command, Commands::Encode { fps: 5, .. }));

        assert!(Cli::try_parse_from(["polyp", "db", "drop"]).is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scope.toml");
        std::fs::write(&path, "[server]\njpeg_quality = 70\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.server.jpeg_quality, 70);

        assert!(load_config(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn test_apply_persistence_flag() {
        let mut config = ScopeConfig::default();
        apply_persistence(&mut config, Some("every:10".to_string())).unwrap();
        assert_eq!(config.storage.persistence, PersistencePolicy::EveryNFrames(10));
        assert!(apply_persistence(&mut config, Some("always".to_string())).is_err());
    }
}
