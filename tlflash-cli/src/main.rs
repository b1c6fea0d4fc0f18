//! tlflash CLI - Command-line tool for flashing Telink chips.
//!
//! ## Features
//!
//! - Write binary files to flash
//! - Read flash contents into a file
//! - Erase flash sectors
//! - Query chip identity
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if emoji/animations should be used (TTY and colors enabled).
pub(crate) fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether the user pressed Ctrl-C.
pub(crate) fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

mod commands;
mod config;

use config::Config;

/// Errors that map to a dedicated exit code.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Bad arguments or invocation (exit 2).
    #[error("{0}")]
    Usage(String),
    /// Unusable configuration (exit 3).
    #[error("{0}")]
    Config(String),
    /// Device unreachable or not answering (exit 4).
    #[error("{0}")]
    Device(String),
    /// Interrupted by the user (exit 130).
    #[error("{0}")]
    Cancelled(String),
}

/// Exit codes.
mod exit_code {
    pub(crate) const RUNTIME: i32 = 1;
    pub(crate) const USAGE: i32 = 2;
    pub(crate) const CONFIG: i32 = 3;
    pub(crate) const DEVICE: i32 = 4;
    pub(crate) const CANCELLED: i32 = 130;
}

/// Classify an error into a process exit code.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return match cli_err {
            CliError::Usage(_) => exit_code::USAGE,
            CliError::Config(_) => exit_code::CONFIG,
            CliError::Device(_) => exit_code::DEVICE,
            CliError::Cancelled(_) => exit_code::CANCELLED,
        };
    }

    if let Some(lib_err) = err.downcast_ref::<tlflash::Error>() {
        return match lib_err {
            tlflash::Error::PortOpen { .. }
            | tlflash::Error::Serial(_)
            | tlflash::Error::HandshakeFailed(_)
            | tlflash::Error::NotConnected => exit_code::DEVICE,
            tlflash::Error::InvalidArgument(_) => exit_code::USAGE,
            tlflash::Error::Interrupted => exit_code::CANCELLED,
            _ => exit_code::RUNTIME,
        };
    }

    exit_code::RUNTIME
}

/// tlflash - Flash Telink TLSR chips through the UART bootloader.
///
/// Environment variables:
///   TLFLASH_PORT   - Default serial port
///   TLFLASH_BAUD   - Transfer baud rate (default: 921600)
///   TLFLASH_RESET  - Bootloader entry method (rts, none)
#[derive(Parser)]
#[command(name = "tlflash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = "Examples:\n  \
    tlflash -p /dev/ttyUSB0 write-flash 0x0 firmware.bin\n  \
    tlflash read-flash 0x0 0x80000 dump.bin\n  \
    tlflash erase-flash 0x78000 8")]
struct Cli {
    /// Serial port to use.
    #[arg(short, long, global = true, env = "TLFLASH_PORT")]
    port: Option<String>,

    /// Baud rate for data transfer (handshake always runs at 500000).
    #[arg(short, long, global = true, env = "TLFLASH_BAUD")]
    baud: Option<u32>,

    /// How to put the chip into bootloader mode.
    #[arg(long, global = true, value_enum, env = "TLFLASH_RESET")]
    reset: Option<ResetMode>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Bootloader entry method.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ResetMode {
    /// Pulse RTS, wired to the module's RST pin.
    #[default]
    Rts,
    /// Chip is already in the bootloader.
    None,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a binary file to flash.
    WriteFlash {
        /// Start address (decimal or 0x-prefixed hex).
        #[arg(value_parser = parse_u32)]
        address: u32,

        /// Binary file to write.
        file: PathBuf,
    },

    /// Read flash contents into a file.
    ReadFlash {
        /// Start address (decimal or 0x-prefixed hex).
        #[arg(value_parser = parse_u32)]
        address: u32,

        /// Number of bytes to read (decimal or 0x-prefixed hex).
        #[arg(value_parser = parse_u32)]
        length: u32,

        /// Destination file.
        file: PathBuf,
    },

    /// Erase flash sectors (4 KiB each).
    EraseFlash {
        /// Start address (decimal or 0x-prefixed hex).
        #[arg(value_parser = parse_u32)]
        address: u32,

        /// Number of sectors to erase (1-255).
        #[arg(value_parser = parse_u32)]
        sectors: u32,
    },

    /// Connect and print chip identity.
    ChipInfo {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List available serial ports.
    ListPorts {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Parse a decimal or `0x`-prefixed hexadecimal number.
fn parse_u32(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let parsed = if let Some(hex) = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
    {
        u32::from_str_radix(hex, 16)
    } else {
        s.parse::<u32>()
    };
    parsed.map_err(|e| format!("invalid number '{s}': {e}"))
}

/// Print an error chain to stderr.
fn report_error(err: &anyhow::Error) {
    eprintln!("{} {err}", style("Error:").red().bold());
    for cause in err.chain().skip(1) {
        eprintln!("  {} {cause}", style("caused by:").dim());
    }
}

fn main() {
    let code = match run() {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            exit_code_for(&err)
        },
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        // Prints help/version on stdout (exit 0) or usage errors on stderr (exit 2)
        Err(e) => e.exit(),
    };

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "tlflash v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Err(e) = ctrlc::set_handler(|| {
        if INTERRUPTED.swap(true, Ordering::Relaxed) {
            // Second Ctrl-C: give up immediately
            std::process::exit(exit_code::CANCELLED);
        }
    }) {
        debug!("Could not install Ctrl-C handler: {e}");
    }
    tlflash::set_interrupt_checker(was_interrupted);

    // Load configuration
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)?
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::WriteFlash { address, file } => {
            commands::flash::cmd_write_flash(&cli, &config, *address, file)?;
        },
        Commands::ReadFlash {
            address,
            length,
            file,
        } => {
            commands::flash::cmd_read_flash(&cli, &config, *address, *length, file)?;
        },
        Commands::EraseFlash { address, sectors } => {
            commands::flash::cmd_erase_flash(&cli, &config, *address, *sectors)?;
        },
        Commands::ChipInfo { json } => {
            commands::info::cmd_chip_info(&cli, &config, *json)?;
        },
        Commands::ListPorts { json } => {
            commands::info::cmd_list_ports(*json)?;
        },
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
        },
    }

    Ok(())
}
