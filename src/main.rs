//! Vimbax-camera binary for testing frame acquisition on V4L2 devices.

use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::time::Duration;

use clap::Parser;
use tracing::{info, info_span, warn};
use tracing_subscriber::EnvFilter;
use vimbax_camera::{AcquisitionConfig, DeviceSession, SessionOptions, V4l2Transport};

/// Stream frames from a camera and print their headers.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// TOML file with acquisition settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Camera id, extended id or serial (first available when omitted)
    #[arg(long)]
    camera: Option<String>,

    /// Number of frames to receive before stopping
    #[arg(short = 'n', long, default_value_t = 30)]
    frames: usize,

    /// Number of frame buffers (overrides the config file)
    #[arg(short, long)]
    buffers: Option<usize>,

    /// Do not run AcquisitionStart after queuing buffers
    #[arg(long)]
    no_acquisition: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    if let Err(err) = run(Args::parse()) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> vimbax_camera::Result<()> {
    let mut config = AcquisitionConfig::load(args.config.as_deref())?;
    if let Some(camera) = args.camera {
        config.camera_id = Some(camera);
    }
    if let Some(buffers) = args.buffers {
        config.buffer_count = buffers;
    }
    if args.no_acquisition {
        config.start_acquisition = false;
    }

    let span = info_span!("vimbax");
    let transport = Arc::new(V4l2Transport::new(span.clone()));
    let options = SessionOptions {
        command_wait: config.command_wait(),
        span,
    };
    let session = DeviceSession::open(transport, config.camera_name(), options)?;

    println!("Camera: {}", session.info().camera_name);
    println!("Model: {}", session.info().model_name);
    println!("Serial: {}", session.info().serial);

    if let Some(path) = &config.settings_file {
        session.settings_load(path)?;
    }

    let (tx, rx) = mpsc::channel();
    session.start_streaming(
        config.buffer_count,
        move |frame| {
            // Receiver gone means we are shutting down
            let _ = tx.send(frame);
        },
        config.start_acquisition,
    )?;

    let mut received = 0;
    while received < args.frames {
        let Ok(frame) = rx.recv_timeout(Duration::from_secs(5)) else {
            warn!("no frame within 5s");
            break;
        };
        println!(
            "Frame {}: {}x{} {} ({} bytes), timestamp: {:?}",
            frame.frame_id(),
            frame.width(),
            frame.height(),
            frame.encoding(),
            frame.with_data(<[u8]>::len),
            frame.stamp().as_duration()
        );
        frame.queue()?;
        received += 1;
    }

    session.stop_streaming()?;
    info!(received, "done");
    Ok(())
}
