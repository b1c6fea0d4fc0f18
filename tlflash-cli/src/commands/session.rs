//! Shared connection flow for device commands.
//!
//! Every device command opens the port, enters the bootloader, prints the
//! chip identity and then runs its operation on the returned flasher.

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use tlflash::{
    BootloaderEntry, ChipInfo, Flasher, FlasherConfig, NativePort, NoReset, Port, RtsReset,
    SerialConfig,
};

use crate::config::Config;
use crate::{Cli, CliError, ResetMode, use_fancy_output, was_interrupted};

/// Port used when neither flag, environment nor config name one.
pub(crate) const DEFAULT_PORT: &str = "/dev/ttyUSB0";

/// Bootloader entry chosen at runtime.
pub(crate) type Entry = Box<dyn FnMut(&mut dyn Port) -> bool>;

/// Flasher type used by all device commands.
pub(crate) type Session = Flasher<NativePort, Entry>;

/// Connection settings after merging flags, environment and config files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Target {
    pub(crate) port: String,
    pub(crate) baud: u32,
    pub(crate) reset: ResetMode,
}

impl Target {
    /// Resolve with precedence CLI/env > config > defaults.
    pub(crate) fn resolve(cli: &Cli, config: &Config) -> Self {
        Self {
            port: cli
                .port
                .clone()
                .or_else(|| config.port.connection.serial.clone())
                .unwrap_or_else(|| DEFAULT_PORT.to_string()),
            baud: cli
                .baud
                .or(config.port.connection.baud)
                .unwrap_or(tlflash::port::TRANSFER_BAUD),
            reset: cli
                .reset
                .or(config.flash.reset)
                .unwrap_or_default(),
        }
    }
}

impl ResetMode {
    fn entry(self) -> Entry {
        match self {
            Self::Rts => {
                let mut rts = RtsReset::default();
                Box::new(move |port: &mut dyn Port| rts.enter_bootloader(port))
            },
            Self::None => Box::new(|port: &mut dyn Port| NoReset.enter_bootloader(port)),
        }
    }
}

/// Fail with a cancellation error once Ctrl-C was pressed.
pub(crate) fn ensure_not_interrupted() -> Result<()> {
    if was_interrupted() {
        Err(CliError::Cancelled("Interrupted by user".to_string()).into())
    } else {
        Ok(())
    }
}

/// Print how the USB-TTL adapter must be wired to the module.
fn print_wiring_help() {
    eprintln!();
    eprintln!(
        "{} {}",
        style("⚠").yellow(),
        style("Please check the connection!").yellow().bold()
    );
    eprintln!();
    eprintln!("  USB-TTL   <-------->     TB Module");
    eprintln!();
    eprintln!("                / ------470------SWS");
    eprintln!("  Tx ----------+");
    eprintln!("                \\ ------470------Rx");
    eprintln!("  Rx ----------------------------Tx");
    eprintln!("  RTS----------------------------RST");
    eprintln!();
}

/// Open the port and enter the bootloader.
pub(crate) fn connect(cli: &Cli, config: &Config) -> Result<Session> {
    let target = Target::resolve(cli, config);
    debug!("Resolved target: {target:?}");

    if !cli.quiet {
        eprintln!(
            "{} Using port {} (transfer baud {})",
            style("🔌").cyan(),
            style(&target.port).green(),
            target.baud
        );
    }

    let mut flasher = Flasher::open_with_config(&SerialConfig::new(&target.port), target.reset.entry())
        .with_context(|| format!("Could not open {}", target.port))?
        .with_config(FlasherConfig::default().with_transfer_baud(target.baud));
    ensure_not_interrupted()?;

    if !cli.quiet {
        eprintln!("{} Connecting to bootloader...", style("⏳").yellow());
    }
    if let Err(err) = flasher.connect() {
        let _ = flasher.close();
        if matches!(err, tlflash::Error::HandshakeFailed(_)) && !cli.quiet {
            print_wiring_help();
        }
        return Err(err).context(CliError::Device(format!(
            "No bootloader answered on {}",
            target.port
        )));
    }
    if !cli.quiet {
        eprintln!("{} Connected", style("✓").green());
    }

    Ok(flasher)
}

/// Connect and print the chip identity, as every device command does.
pub(crate) fn connect_and_identify(cli: &Cli, config: &Config) -> Result<Session> {
    let mut flasher = connect(cli, config)?;
    let chip = flasher.read_chip_info()?;
    if !cli.quiet {
        print_chip_info(chip.as_ref());
    }
    Ok(flasher)
}

/// Print chip identity, or a notice that it is unavailable.
pub(crate) fn print_chip_info(chip: Option<&ChipInfo>) {
    match chip {
        Some(chip) => eprintln!("{} {chip}", style("ℹ").blue()),
        None => eprintln!(
            "{} {}",
            style("ℹ").blue(),
            style("Chip identity unavailable").dim()
        ),
    }
}

/// Percentage progress bar on stderr, hidden when quiet or not a TTY.
pub(crate) fn progress_bar(cli: &Cli) -> ProgressBar {
    if cli.quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(100);
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
    pb
}

/// Spinner on stderr for waits without byte progress.
pub(crate) fn spinner(cli: &Cli, message: String) -> ProgressBar {
    if cli.quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap(),
    );
    pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
    pb.set_message(message);
    pb
}
