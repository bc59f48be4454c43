//! Plotcap entrypoint: capture HPGL from a serial port, render to PNG/PDF.

use std::io::{self, Read};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use core_capture::{ByteSource, CaptureSession, run_capture};
use core_config::{PortSection, load_capture_config, load_render_config};
use core_render::RenderOptions;
use tracing::{info, warn};

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(
    name = "plotcap",
    version,
    about = "Capture HPGL over a serial port, plot the image, and save it to a file"
)]
struct Args {
    /// Capture driver TOML config (image/dump filenames, serial port).
    capture_config: PathBuf,
    /// Renderer TOML config (paper, crop, pens, text font).
    render_config: PathBuf,
    /// Serial port; overrides the setting from the capture config.
    #[arg(long)]
    port: Option<String>,
    /// Output directory for relative filename patterns. Defaults to the
    /// current working directory.
    #[arg(long, short = 'd')]
    dir: Option<PathBuf>,
    /// Verbose logging.
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Serial transport behind the capture loop's byte-source seam.
struct SerialSource {
    port: Box<dyn serialport::SerialPort>,
}

impl ByteSource for SerialSource {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.port.set_timeout(timeout).map_err(io::Error::other)
    }

    fn read_some(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }
}

fn open_port(config: &PortSection) -> Result<Box<dyn ByteSource>> {
    let parity = match config.parity {
        core_config::Parity::None => serialport::Parity::None,
        core_config::Parity::Even => serialport::Parity::Even,
        core_config::Parity::Odd => serialport::Parity::Odd,
    };
    if config.rtscts && config.xonxoff {
        warn!(target: "capture", "both rtscts and xonxoff set; using rtscts");
    }
    if config.dsrdtr {
        warn!(target: "capture", "dsrdtr flow control is not supported; ignoring");
    }
    let flow_control = if config.rtscts {
        serialport::FlowControl::Hardware
    } else if config.xonxoff {
        serialport::FlowControl::Software
    } else {
        serialport::FlowControl::None
    };

    let port = serialport::new(&config.name, config.baud)
        .parity(parity)
        .flow_control(flow_control)
        .timeout(Duration::from_millis(500))
        .open()
        .with_context(|| format!("opening serial port {}", config.name))?;
    // Discard whatever was sitting in the receive buffer before we attached.
    port.clear(serialport::ClearBuffer::Input)
        .with_context(|| format!("clearing input buffer of {}", config.name))?;
    info!(
        target: "capture",
        port = config.name.as_str(),
        baud = config.baud,
        "port_opened"
    );
    Ok(Box::new(SerialSource { port }))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    info!(target: "runtime", "startup");

    let mut capture_config = load_capture_config(&args.capture_config)?;
    let render_config = load_render_config(&args.render_config)?;
    if let Some(port) = args.port {
        capture_config.port.name = port;
    }
    if let Some(dir) = &args.dir
        && !dir.is_dir()
    {
        bail!("directory {} does not exist", dir.display());
    }

    let options = RenderOptions::from_config(&render_config)?;
    let mut session = CaptureSession::new(options, &capture_config, args.dir.as_deref())?;
    let source = open_port(&capture_config.port)?;

    run_capture(source, &mut session).await?;
    info!(target: "runtime", "exiting");
    Ok(())
}
