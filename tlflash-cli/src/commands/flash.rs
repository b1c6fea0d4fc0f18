//! Write, read, and erase command implementations.

use anyhow::{Context, Result};
use console::style;
use std::fs::{self, File};
use std::io::{BufWriter, Write as _};
use std::path::Path;
use tlflash::Progress;

use super::session::{self, ensure_not_interrupted};
use crate::config::Config;
use crate::{Cli, CliError};

/// Size of one erasable flash sector.
const SECTOR_SIZE: u32 = 4096;

/// Largest sector count one erase command carries.
const MAX_ERASE_SECTORS: u32 = 255;

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percent(progress: Progress) -> u64 {
    (progress.fraction() * 100.0) as u64
}

/// Write-flash command implementation.
pub(crate) fn cmd_write_flash(cli: &Cli, config: &Config, address: u32, file: &Path) -> Result<()> {
    let data =
        fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;

    if !cli.quiet {
        eprintln!(
            "{} Writing {} ({} bytes) at 0x{address:08X}",
            style("📦").cyan(),
            file.display(),
            data.len()
        );
    }

    let mut flasher = session::connect_and_identify(cli, config)?;
    ensure_not_interrupted()?;

    let pb = session::progress_bar(cli);
    pb.set_message("Writing");
    let result = flasher.write_flash(address, &data, |p| pb.set_position(percent(p)));
    let _ = flasher.close();

    match result {
        Ok(written) => {
            pb.finish_with_message("Complete");
            if !cli.quiet {
                eprintln!(
                    "\n{} Wrote {written} bytes at 0x{address:08X}",
                    style("🎉").green().bold()
                );
            }
            Ok(())
        },
        Err(err) => {
            pb.abandon_with_message("Write failed");
            Err(err).with_context(|| format!("Writing {} failed", file.display()))
        },
    }
}

/// Read-flash command implementation.
pub(crate) fn cmd_read_flash(
    cli: &Cli,
    config: &Config,
    address: u32,
    length: u32,
    file: &Path,
) -> Result<()> {
    let length = usize::try_from(length).context("Length does not fit this platform")?;

    if !cli.quiet {
        eprintln!(
            "{} Reading {length} bytes at 0x{address:08X} into {}",
            style("📥").cyan(),
            file.display()
        );
    }

    let mut flasher = session::connect_and_identify(cli, config)?;
    ensure_not_interrupted()?;

    let out = File::create(file)
        .with_context(|| format!("Failed to create {}", file.display()))?;
    let mut sink = BufWriter::new(out);

    let pb = session::progress_bar(cli);
    pb.set_message("Reading");
    let result = flasher.read_flash(address, length, &mut sink, |p| pb.set_position(percent(p)));
    let _ = flasher.close();

    // Keep whatever prefix arrived, even on failure
    sink.flush()
        .with_context(|| format!("Failed to write {}", file.display()))?;

    match result {
        Ok(read) => {
            pb.finish_with_message("Complete");
            if !cli.quiet {
                eprintln!(
                    "\n{} Read {read} bytes into {}",
                    style("🎉").green().bold(),
                    file.display()
                );
            }
            Ok(())
        },
        Err(err) => {
            pb.abandon_with_message("Read failed");
            Err(err).with_context(|| format!("Reading into {} failed", file.display()))
        },
    }
}

/// Erase-flash command implementation.
pub(crate) fn cmd_erase_flash(cli: &Cli, config: &Config, address: u32, sectors: u32) -> Result<()> {
    if sectors == 0 || sectors > MAX_ERASE_SECTORS {
        return Err(CliError::Usage(format!(
            "Sector count must be between 1 and {MAX_ERASE_SECTORS}, got {sectors}"
        ))
        .into());
    }

    if !cli.quiet {
        eprintln!(
            "{} Erasing {sectors} sector(s) ({} KiB) at 0x{address:08X}",
            style("🗑").red(),
            sectors * SECTOR_SIZE / 1024
        );
    }

    let mut flasher = session::connect_and_identify(cli, config)?;
    ensure_not_interrupted()?;

    let pb = session::spinner(cli, format!("Erasing {sectors} sector(s)..."));
    let result = flasher.erase_sectors(address, sectors as usize, |_| pb.tick());
    let _ = flasher.close();

    match result {
        Ok(()) => {
            pb.finish_and_clear();
            if !cli.quiet {
                eprintln!("{} Erase complete", style("✓").green().bold());
            }
            Ok(())
        },
        Err(err) => {
            pb.abandon_with_message("Erase failed");
            Err(err).context("Erase failed")
        },
    }
}
