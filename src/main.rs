//! sec-camera binary: run a preview loop and optionally take a snapshot.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use log::info;

use sec_camera::{
    CameraId, CameraSession, FourCC, Result, SessionConfig, StaticProperties, V4L2Opener,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Sensor {
    Back,
    Front,
}

impl From<Sensor> for CameraId {
    fn from(sensor: Sensor) -> Self {
        match sensor {
            Sensor::Back => Self::Back,
            Sensor::Front => Self::Front,
        }
    }
}

/// Exercise a camera session against real device nodes.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Preview and still capture node.
    #[arg(long, default_value = "/dev/video0")]
    capture_device: PathBuf,

    /// Recording node.
    #[arg(long, default_value = "/dev/video2")]
    record_device: PathBuf,

    /// Which sensor to open.
    #[arg(long, value_enum, default_value_t = Sensor::Back)]
    sensor: Sensor,

    /// Preview width.
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Preview height.
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Preview frames to pull before stopping.
    #[arg(long, default_value_t = 30)]
    frames: u32,

    /// Check sensor health every N preview frames.
    #[arg(long)]
    esd_interval: Option<u32>,

    /// Take a sensor-encoded snapshot and write it here.
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

fn main() {
    env_logger::init();
    if let Err(err) = run(&Args::parse()) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let mut config = SessionConfig::default()
        .with_capture_device(&args.capture_device)
        .with_record_device(&args.record_device);
    if let Some(frames) = args.esd_interval {
        config = config.with_esd_check_interval(frames);
    }

    let mut session = CameraSession::new(V4L2Opener, config, Box::new(StaticProperties::new()));
    session.init(args.sensor.into())?;
    println!("Sensor: {}", session.sensor_name()?);

    session.set_preview_size(args.width, args.height, FourCC::NV21)?;
    session.start_preview()?;
    for _ in 0..args.frames {
        let index = session.get_preview()?;
        let addrs = session.preview_phys_addr(index)?;
        info!("preview buffer {index}: y={:#010x} cbcr={:#010x}", addrs.y, addrs.cbcr);
    }
    session.stop_preview()?;
    println!("Pulled {} preview frames", args.frames);

    if let Some(path) = &args.snapshot {
        session.begin_snapshot(false)?;
        let jpeg = session.get_jpeg()?;
        std::fs::write(path, session.jpeg_data(&jpeg)?)?;
        session.end_snapshot()?;
        println!("Wrote {} byte JPEG to {}", jpeg.size, path.display());
    }

    session.deinit();
    Ok(())
}
