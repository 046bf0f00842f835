use anyhow::Result;
use clap::Parser;
use iris_camera::{FfmpegCamera, MockCamera};
use iris_encoder::JpegFrameEncoder;
use iris_ops::{init_tracing, SessionJournal};
use iris_session::SessionController;
use iris_transport::{SessionTransport, WebSocketTransport};
use iris_types::config::{
    CameraConfig, EncoderConfig, IrisConfig, OpsConfig, SessionConfig, TransportConfig,
};

mod ui;

#[derive(Debug, Parser)]
#[command(name = "iris-cli", about = "Webcam face-enrollment capture client")]
struct Args {
    /// Path to a TOML config file.
    #[arg(long, default_value = "configs/dev.toml")]
    config: String,
    /// Use the synthetic camera instead of a real capture device.
    #[arg(long)]
    mock_camera: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args.config);
    init_tracing(&config.ops)?;

    let journal = SessionJournal::new();
    let encoder = JpegFrameEncoder::new(&config.encoder);
    let mut transport = WebSocketTransport::new(&config.transport);
    transport.connect().await?;

    let (cmd_tx, cmd_rx) = tokio::sync::mpsc::channel(16);
    let (upd_tx, upd_rx) = std::sync::mpsc::channel();

    let summary = format!(
        "server={} device={} cadence={}ms",
        config.transport.server_url, config.camera.device, config.session.frame_interval_ms
    );

    let controller_handle = if args.mock_camera {
        let camera = MockCamera::new(config.camera.clone());
        let controller = SessionController::new(
            config.session.clone(),
            camera,
            transport,
            encoder,
            journal.clone(),
        );
        tokio::spawn(controller.run(cmd_rx, upd_tx))
    } else {
        let camera = FfmpegCamera::new(config.camera.clone());
        let controller = SessionController::new(
            config.session.clone(),
            camera,
            transport,
            encoder,
            journal.clone(),
        );
        tokio::spawn(controller.run(cmd_rx, upd_tx))
    };

    tokio::task::spawn_blocking(move || ui::run(upd_rx, cmd_tx, summary)).await??;
    controller_handle.await??;

    if let Err(err) = journal.export(&config.ops.journal_dir).await {
        tracing::warn!("journal export failed: {err}");
    }
    Ok(())
}

fn load_config(path: &str) -> IrisConfig {
    match IrisConfig::from_file(path) {
        Ok(cfg) => {
            if let Err(err) = cfg.validate() {
                eprintln!("Invalid config in '{path}': {err}. Falling back to internal defaults.");
                default_config()
            } else {
                cfg
            }
        }
        Err(err) => {
            eprintln!("Failed to load config from '{path}': {err}. Falling back to internal defaults.");
            default_config()
        }
    }
}

fn default_config() -> IrisConfig {
    let config = IrisConfig {
        camera: CameraConfig {
            device: "/dev/video0".into(),
            fixed_resolution: None,
            ffmpeg_path: None,
        },
        encoder: EncoderConfig { jpeg_quality: 0.8 },
        transport: TransportConfig {
            server_url: "ws://127.0.0.1:5000/stream".into(),
            connect_timeout_ms: 3_000,
        },
        session: SessionConfig {
            frame_interval_ms: 500,
        },
        ops: OpsConfig {
            log_level: "info".into(),
            journal_dir: "journal".into(),
        },
    };
    debug_assert!(config.validate().is_ok());
    config
}
