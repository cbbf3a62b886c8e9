//! ubootvar-fs CLI
//!
//! Command-line interface for U-Boot style environment images.
//!
//! Provides commands for:
//! - Listing, reading, setting and removing variables
//! - Showing space usage
//! - Writing a fresh environment from a text file
//! - Mounting the environment as a directory (with the `fuse` feature)

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::debug;

use ubootvar_fs::disk::{open_store, BackingStore};
use ubootvar_fs::{format, VarTable};

/// Format bytes as human-readable size
fn format_bytes(bytes: usize) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Parse a decimal or `0x`-prefixed hexadecimal number
fn parse_number(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number {:?}: {}", s, e))
}

#[derive(Parser)]
#[command(name = "ubootvar-fs")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Edit U-Boot style KEY=VALUE environment images")]
#[command(long_about = "ubootvar-fs - U-Boot environment tool\n\n\
    Operates on a raw environment blob: KEY=VALUE records, each terminated by a\n\
    NUL byte, followed by an empty record. The blob keeps its size; edits move\n\
    the following records in place.\n\n\
    Examples:\n\
      ubootvar-fs -i env.bin list\n\
      ubootvar-fs -i env.bin set bootdelay 0\n\
      ubootvar-fs -i flash.bin --offset 0x3e0000 --size 0x20000 info\n\
      ubootvar-fs -i env.bin mount /mnt/env")]
pub struct Cli {
    /// Environment image (file or block device)
    #[arg(short, long, value_name = "FILE", global = true, default_value = "env.bin")]
    pub image: PathBuf,

    /// Byte offset of the environment inside the image
    #[arg(long, value_name = "BYTES", global = true, default_value = "0", value_parser = parse_number)]
    pub offset: u64,

    /// Environment size (default: rest of the image)
    #[arg(long, value_name = "BYTES", global = true, value_parser = parse_number)]
    pub size: Option<u64>,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print all variables as NAME=VALUE, in storage order
    List {
        /// Print names only
        #[arg(short, long)]
        names: bool,
    },

    /// Print the value of one variable
    Get {
        /// Variable name
        name: String,
    },

    /// Set a variable, creating it if needed
    Set {
        /// Variable name
        name: String,

        /// New value
        value: String,
    },

    /// Remove a variable
    Unset {
        /// Variable name
        name: String,
    },

    /// Show space usage
    Info,

    /// Overwrite the environment with the contents of a text file
    #[command(long_about = "Overwrite the environment with the contents of a text file\n\n\
        Each non-empty line not starting with '#' is a NAME=VALUE pair. Without\n\
        --from the environment is cleared.\n\n\
        Example:\n\
          ubootvar-fs -i env.bin format --from defaults.txt")]
    Format {
        /// Text file with NAME=VALUE lines
        #[arg(long, value_name = "FILE")]
        from: Option<PathBuf>,
    },

    /// Mount the environment as a directory (one file per variable)
    #[cfg(feature = "fuse")]
    #[command(long_about = "Mount the environment as a directory\n\n\
        Runs until interrupted; changes are written back to the image on\n\
        fsync, close and unmount.\n\n\
        Example:\n\
          ubootvar-fs -i env.bin mount /mnt/env\n\
          echo -n 0 > /mnt/env/bootdelay")]
    Mount {
        /// Directory to mount on
        #[arg(value_name = "DIR")]
        mountpoint: PathBuf,

        /// Mount read-only
        #[arg(long)]
        read_only: bool,

        /// Allow other users to access the mount
        #[arg(long)]
        allow_other: bool,
    },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match cli.command {
        Commands::List { names } => {
            let (_, table) = load(&cli.image, cli.offset, cli.size, true)?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            for var in &table {
                out.write_all(var.name())?;
                if !names {
                    out.write_all(b"=")?;
                    out.write_all(var.value())?;
                }
                out.write_all(b"\n")?;
            }
        }

        Commands::Get { name } => {
            let (_, table) = load(&cli.image, cli.offset, cli.size, true)?;
            let Some(var) = table.lookup(&name) else {
                bail!("variable {} not found", name);
            };
            let mut out = io::stdout().lock();
            out.write_all(var.value())?;
            out.write_all(b"\n")?;
        }

        Commands::Set { name, value } => {
            let (mut store, mut table) = load(&cli.image, cli.offset, cli.size, false)?;
            table
                .set(&name, &value)
                .with_context(|| format!("cannot set {}", name))?;
            save(store.as_mut(), &table)?;
        }

        Commands::Unset { name } => {
            let (mut store, mut table) = load(&cli.image, cli.offset, cli.size, false)?;
            let Some(id) = table.lookup(&name).map(|v| v.id()) else {
                bail!("variable {} not found", name);
            };
            table.remove(id)?;
            save(store.as_mut(), &table)?;
        }

        Commands::Info => {
            let (store, table) = load(&cli.image, cli.offset, cli.size, true)?;
            println!("Image:      {}", store.describe());
            println!("Capacity:   {}", format_bytes(table.capacity()));
            println!("Used:       {}", format_bytes(table.end()));
            println!("Free:       {}", format_bytes(table.free_space().saturating_sub(1)));
            println!("Variables:  {}", table.len());
            if table.skipped_records() > 0 {
                println!("Skipped:    {} malformed records", table.skipped_records());
            }
        }

        Commands::Format { from } => {
            let mut store = open_store(&cli.image, cli.offset, cli.size, false)
                .with_context(|| format!("cannot open {}", cli.image.display()))?;

            let text = match &from {
                Some(path) => fs::read_to_string(path)
                    .with_context(|| format!("cannot read {}", path.display()))?,
                None => String::new(),
            };
            let pairs = parse_defaults(&text)?;
            let blob = format::serialize(pairs.iter().map(|(n, v)| (n, v)), store.size() as usize)?;

            store.store(&blob)?;
            store.sync()?;
            debug!("wrote {} variables to {}", pairs.len(), store.describe());
        }

        #[cfg(feature = "fuse")]
        Commands::Mount {
            mountpoint,
            read_only,
            allow_other,
        } => {
            mount(&cli.image, cli.offset, cli.size, mountpoint, read_only, allow_other)?;
        }
    }

    Ok(())
}

fn load(
    image: &Path,
    offset: u64,
    size: Option<u64>,
    read_only: bool,
) -> Result<(Box<dyn BackingStore>, VarTable)> {
    let mut store = open_store(image, offset, size, read_only)
        .with_context(|| format!("cannot open {}", image.display()))?;
    let bytes = store.load()?;
    let table = VarTable::mount(bytes)
        .with_context(|| format!("cannot parse environment in {}", store.describe()))?;
    Ok((store, table))
}

fn save(store: &mut dyn BackingStore, table: &VarTable) -> Result<()> {
    store
        .store(table.as_bytes())
        .with_context(|| format!("cannot write {}", store.describe()))?;
    store.sync()?;
    Ok(())
}

/// Split `NAME=VALUE` lines; blank lines and `#` comments are ignored
fn parse_defaults(text: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((name, value)) = line.split_once('=') else {
            bail!("line {}: expected NAME=VALUE", lineno + 1);
        };
        pairs.push((name.to_string(), value.to_string()));
    }
    Ok(pairs)
}

#[cfg(feature = "fuse")]
fn mount(
    image: &Path,
    offset: u64,
    size: Option<u64>,
    mountpoint: PathBuf,
    read_only: bool,
    allow_other: bool,
) -> Result<()> {
    use std::sync::Arc;
    use std::time::Duration;

    use ubootvar_fs::fs::signal::{install_signal_handlers, wait_for_shutdown, ShutdownSignal};
    use ubootvar_fs::{spawn_mount, MountOptions, VarFs};

    let store = open_store(image, offset, size, read_only)
        .with_context(|| format!("cannot open {}", image.display()))?;
    let options = MountOptions {
        read_only,
        allow_other,
        fsname: store.describe(),
        ..Default::default()
    };
    let fs = VarFs::mount(store, &options)?;

    let shutdown = Arc::new(ShutdownSignal::new());
    install_signal_handlers(shutdown.clone()).context("cannot install signal handlers")?;

    let session = spawn_mount(fs, &mountpoint, &options)?;
    eprintln!("Mounted at {} (Ctrl+C to unmount)", mountpoint.display());

    wait_for_shutdown(&shutdown, Duration::from_millis(200));
    debug!("received {}, unmounting", shutdown.signal_name());
    drop(session);
    Ok(())
}
