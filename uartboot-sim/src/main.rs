//! uartboot-sim - host-side simulator for the uartboot update agent.
//!
//! Runs the real agent core against an in-memory flash model, bridged
//! to a serial port (typically one end of a virtual pair, e.g. from
//! `socat -d -d pty,raw,echo=0 pty,raw,echo=0`), so a host flashing
//! tool can be exercised without a board. The flash contents can be
//! persisted to a backing file across runs.

use std::fs;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{debug, error, info, warn};

use uartboot::agent::{Clock, Transport};
use uartboot::{Agent, System, ring, verified_entry};

mod flash;

use flash::{FlashImage, SimFlash};

/// Serial read poll interval for the receive thread.
const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// uartboot device simulator.
///
/// Environment variables:
///   UARTBOOT_PORT   - Serial port to listen on
///   UARTBOOT_BAUD   - Baud rate (default: 115200)
#[derive(Parser)]
#[command(name = "uartboot-sim")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Serial port to listen on (e.g. /dev/pts/3).
    #[arg(short, long, env = "UARTBOOT_PORT")]
    port: String,

    /// Baud rate.
    #[arg(short, long, default_value = "115200", env = "UARTBOOT_BAUD")]
    baud: u32,

    /// Backing file for the flash contents; loaded at startup if it
    /// exists and saved on shutdown.
    #[arg(short, long, env = "UARTBOOT_FLASH_FILE")]
    flash_file: Option<PathBuf>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Outbound half of the serial bridge.
struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
}

impl Transport for SerialTransport {
    fn write(&mut self, bytes: &[u8]) -> uartboot::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }
}

/// Millisecond ticks from process start.
struct WallClock {
    start: Instant,
}

impl Clock for WallClock {
    fn ticks_ms(&self) -> u32 {
        #[allow(clippy::cast_possible_truncation)] // wrapping ticks by contract
        {
            self.start.elapsed().as_millis() as u32
        }
    }
}

/// Simulated reset and boot-transfer endpoints.
///
/// A real implementation tears the peripherals down and jumps; the
/// simulator persists the flash image and exits the process, which
/// satisfies the never-returns contract.
struct SimSystem {
    mem: FlashImage,
    flash_file: Option<PathBuf>,
}

impl System for SimSystem {
    fn reset(&mut self) -> ! {
        info!("device reset requested");
        persist(&self.mem, self.flash_file.as_deref());
        process::exit(0)
    }

    fn launch(&mut self, address: u32) -> ! {
        info!("transferring control to application at {address:#010x}");
        persist(&self.mem, self.flash_file.as_deref());
        process::exit(0)
    }
}

fn persist(mem: &FlashImage, path: Option<&Path>) {
    let Some(path) = path else { return };
    let mem = mem.lock().expect("flash image lock");
    match fs::write(path, &*mem) {
        Ok(()) => info!("flash image saved to {}", path.display()),
        Err(e) => error!("saving flash image failed: {e}"),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    let initial = match &cli.flash_file {
        Some(path) if path.exists() => {
            info!("loading flash image from {}", path.display());
            Some(fs::read(path).context("reading flash image")?)
        }
        _ => None,
    };
    let mem = flash::image(initial);

    {
        let mem = FlashImage::clone(&mem);
        let path = cli.flash_file.clone();
        ctrlc::set_handler(move || {
            persist(&mem, path.as_deref());
            process::exit(130);
        })
        .context("installing Ctrl-C handler")?;
    }

    let port = serialport::new(&cli.port, cli.baud)
        .timeout(READ_TIMEOUT)
        .open()
        .with_context(|| format!("opening serial port {}", cli.port))?;
    info!("listening on {} at {} baud", cli.port, cli.baud);

    let (producer, consumer) = ring::channel(ring::RX_RING_CAPACITY);
    spawn_receiver(port.try_clone().context("cloning serial port")?, producer);

    let mut agent = Agent::new(
        SerialTransport { port },
        SimFlash::new(FlashImage::clone(&mem)),
        WallClock {
            start: Instant::now(),
        },
        consumer,
    );

    match verified_entry(agent.region_mut())? {
        Some(address) => info!("valid application installed at {address:#010x}"),
        None => info!("no valid application installed, staying in update mode"),
    }

    let mut system = SimSystem {
        mem,
        flash_file: cli.flash_file.clone(),
    };
    agent.run(&mut system).context("agent loop failed")
}

/// Receive path: the only code touching the ring producer.
///
/// Mirrors the device's byte-received interrupt: read what arrived
/// and push it, nothing else.
fn spawn_receiver(mut port: Box<dyn serialport::SerialPort>, mut producer: ring::Producer) {
    thread::spawn(move || {
        let mut buf = [0u8; 256];
        loop {
            match port.read(&mut buf) {
                Ok(0) => {}
                Ok(n) => {
                    debug!("received {n} bytes");
                    let accepted = producer.push_slice(&buf[..n]);
                    if accepted < n {
                        warn!("receive queue full, dropped {} bytes", n - accepted);
                    }
                }
                Err(e) if e.kind() == ErrorKind::TimedOut => {}
                Err(e) => {
                    error!("serial read failed: {e}");
                    break;
                }
            }
        }
    });
}
