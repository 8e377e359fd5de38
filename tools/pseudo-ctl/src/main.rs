//! pseudo-ctl - drive the pseudo character device from the command line
//!
//! The driver is loaded in-process against a fresh registry for every run.
//!
//! Commands:
//! - `pseudo-ctl info` - Load the driver and list its devices
//! - `pseudo-ctl rw` - Write bytes at an offset and read them back
//! - `pseudo-ctl stress` - Run concurrent writers on one device and verify the result
//! - `pseudo-ctl drill` - Fail one registration step and check that nothing leaks

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use pseudo_chrdev::Operation;
use pseudo_driver::{DriverParams, OpenFile, PseudoDriver, Registry};

#[derive(Parser)]
#[command(name = "pseudo-ctl")]
#[command(version)]
#[command(about = "Pseudo character device harness", long_about = None)]
struct Cli {
    /// Parameter file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the number of devices
    #[arg(long, global = true)]
    devices: Option<u32>,

    /// Override the per-device capacity in bytes
    #[arg(long, global = true)]
    capacity: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the driver and list its devices
    Info,

    /// Write text at an offset, then read it back
    Rw {
        /// Device index
        #[arg(long, default_value_t = 0)]
        device: usize,

        /// Byte offset
        #[arg(long, default_value_t = 0)]
        offset: u64,

        /// Text to write
        #[arg(long)]
        data: String,

        /// Bytes to read back (default: length of the data)
        #[arg(long)]
        read_len: Option<usize>,
    },

    /// Concurrent disjoint writers on device 0
    Stress {
        /// Writer threads
        #[arg(long, default_value_t = 4)]
        threads: usize,

        /// Bytes per writer
        #[arg(long, default_value_t = 4096)]
        chunk: usize,
    },

    /// Make one registration step fail and check the rollback
    Drill {
        /// Step to fail
        #[arg(long, value_enum)]
        fail: FailPoint,

        /// Successful calls to let through before failing
        #[arg(long, default_value_t = 0)]
        after: u32,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FailPoint {
    Allocate,
    Register,
    Publish,
}

impl From<FailPoint> for Operation {
    fn from(point: FailPoint) -> Self {
        match point {
            FailPoint::Allocate => Operation::AllocateIdentityBlock,
            FailPoint::Register => Operation::RegisterDevice,
            FailPoint::Publish => Operation::PublishName,
        }
    }
}

fn load_params(cli: &Cli) -> Result<DriverParams> {
    let mut params = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Cannot read {}", path.display()))?;
            DriverParams::from_toml_str(&text)
                .with_context(|| format!("Invalid parameters in {}", path.display()))?
        }
        None => DriverParams::default(),
    };

    if let Some(devices) = cli.devices {
        params.device_count = devices;
    }
    if let Some(capacity) = cli.capacity {
        params.capacity = capacity;
    }
    params.validate()?;

    Ok(params)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let params = load_params(&cli)?;
    let registry = Arc::new(Registry::new());

    match cli.command {
        Commands::Info => show_info(registry, params),
        Commands::Rw {
            device,
            offset,
            data,
            read_len,
        } => write_read(registry, params, device, offset, &data, read_len),
        Commands::Stress { threads, chunk } => stress(registry, params, threads, chunk),
        Commands::Drill { fail, after } => drill(registry, params, fail.into(), after),
    }
}

fn load(registry: &Arc<Registry>, params: DriverParams) -> Result<PseudoDriver<Registry>> {
    PseudoDriver::initialize(registry.clone(), params).context("Cannot load driver")
}

fn show_info(registry: Arc<Registry>, params: DriverParams) -> Result<()> {
    let driver = load(&registry, params)?;

    let range = driver.range().ok_or_else(|| anyhow!("Driver has no identity block"))?;
    println!("{} {} ({})", "Region:".bold(), range, driver.params().region_name);
    for context in driver.devices() {
        println!(
            "  {:<10} {:<16} {} bytes",
            context.number().to_string().cyan(),
            context.name(),
            context.capacity()
        );
    }

    println!("\n{}", "Parameters:".bold());
    print!("{}", toml::to_string(driver.params())?);
    Ok(())
}

fn write_read(
    registry: Arc<Registry>,
    params: DriverParams,
    device: usize,
    offset: u64,
    data: &str,
    read_len: Option<usize>,
) -> Result<()> {
    let driver = load(&registry, params)?;
    let context = driver
        .device(device)
        .with_context(|| format!("No device {} ({} loaded)", device, driver.devices().len()))?;

    let session = registry.open(context.number())?;

    let mut pos = offset;
    let written = session
        .write(&mut pos, data.as_bytes())
        .with_context(|| format!("Write at offset {} failed", offset))?;
    println!(
        "{} wrote {} of {} bytes at {}, cursor {}",
        "✓".green(),
        written,
        data.len(),
        offset,
        pos
    );

    let mut pos = offset;
    let len = read_buffer_len(read_len.unwrap_or(data.len()), context.capacity());
    let mut out = vec![0u8; len];
    let read = session
        .read(&mut pos, &mut out[..])
        .with_context(|| format!("Read at offset {} failed", offset))?;
    println!(
        "{} read {} bytes: {:?}",
        "✓".green(),
        read,
        String::from_utf8_lossy(&out[..read])
    );

    session.release()?;
    Ok(())
}

/// Reads never return more than the device holds
fn read_buffer_len(requested: usize, capacity: usize) -> usize {
    requested.min(capacity)
}

fn stress(
    registry: Arc<Registry>,
    params: DriverParams,
    threads: usize,
    chunk: usize,
) -> Result<()> {
    if threads == 0 || chunk == 0 {
        bail!("threads and chunk must be positive");
    }
    let needed = threads
        .checked_mul(chunk)
        .ok_or_else(|| anyhow!("threads * chunk overflows"))?;
    if needed > params.capacity {
        bail!(
            "{} threads x {} bytes needs {} bytes, device holds {}",
            threads,
            chunk,
            needed,
            params.capacity
        );
    }

    let driver = load(&registry, params)?;
    let context = driver.device(0).context("No device 0")?;
    let number = context.number();

    log::info!("stress: {} writers x {} bytes on {}", threads, chunk, number);
    let started = Instant::now();
    let written = crossbeam::thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let registry = &registry;
                s.spawn(move |_| -> Result<usize> {
                    let session = registry.open(number)?;
                    let data = vec![pattern(t); chunk];
                    let mut pos = (t * chunk) as u64;
                    let n = session.write(&mut pos, &data[..])?;
                    session.release()?;
                    Ok(n)
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().map_err(|_| anyhow!("Writer thread panicked"))?)
            .sum::<Result<usize>>()
    })
    .map_err(|_| anyhow!("Writer thread panicked"))??;
    let elapsed = started.elapsed();

    let content = context.snapshot();
    for t in 0..threads {
        let region = &content[t * chunk..(t + 1) * chunk];
        if let Some(bad) = region.iter().position(|b| *b != pattern(t)) {
            log::error!("stress: writer {} region corrupted", t);
            bail!("Writer {} lost data at byte {}", t, t * chunk + bad);
        }
    }

    println!(
        "{} {} writers, {} bytes verified in {:?}",
        "✓".green(),
        threads,
        written,
        elapsed
    );
    Ok(())
}

fn pattern(writer: usize) -> u8 {
    (writer % 255) as u8 + 1
}

fn drill(registry: Arc<Registry>, params: DriverParams, fail: Operation, after: u32) -> Result<()> {
    log::info!("drill: failing {} after {} successful call(s)", fail, after);
    registry.inject_failure_after(fail, after);

    match PseudoDriver::initialize(registry.clone(), params) {
        Ok(driver) => {
            println!(
                "{} {} never failed; {} device(s) loaded",
                "!".yellow(),
                fail,
                driver.devices().len()
            );
        }
        Err(err) => {
            println!("{} load failed: {} (errno {})", "✓".green(), err, err.to_errno());
        }
    }

    let registered = registry.registered_count();
    let blocks = registry.allocated_blocks();
    if registered != 0 || blocks != 0 {
        bail!(
            "Leaked {} registration(s) and {} identity block(s)",
            registered,
            blocks
        );
    }
    println!("{} nothing left registered", "✓".green());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_buffer_bounded_by_capacity() {
        assert_eq!(read_buffer_len(5, 16), 5);
        assert_eq!(read_buffer_len(100_000_000_000_000, 16), 16);
        assert_eq!(read_buffer_len(usize::MAX, 0), 0);
    }

    #[test]
    fn test_oversized_read_len_reads_whole_device() {
        let registry = Arc::new(Registry::new());
        let params = DriverParams::default().with_capacity(16);
        write_read(registry, params, 0, 0, "HELLO", Some(100_000_000_000_000)).unwrap();
    }
}
