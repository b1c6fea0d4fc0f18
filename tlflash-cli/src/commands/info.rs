//! Chip info and port listing command implementations.

use anyhow::Result;
use console::style;
use tlflash::{NativePortEnumerator, PortEnumerator, PortInfo};

use super::session;
use crate::Cli;
use crate::config::Config;

/// Chip-info command implementation.
///
/// With `--json` only the JSON document goes to stdout; an unavailable
/// identity is reported as `"chip": null`.
pub(crate) fn cmd_chip_info(cli: &Cli, config: &Config, json: bool) -> Result<()> {
    let mut flasher = session::connect(cli, config)?;
    let chip = flasher.read_chip_info();
    let _ = flasher.close();
    let chip = chip?;

    if json {
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "chip": chip,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    match chip {
        Some(chip) => println!("{chip}"),
        None => session::print_chip_info(None),
    }

    Ok(())
}

fn describe_port(port: &PortInfo) -> String {
    let vid_pid = if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
        format!(" ({vid:04X}:{pid:04X})")
    } else {
        String::new()
    };
    let product = port
        .product
        .as_deref()
        .filter(|p| !p.is_empty())
        .map(|p| format!(" - {}", style(p).dim()))
        .unwrap_or_default();

    format!("{}{vid_pid}{product}", style(&port.name).cyan())
}

/// List ports command implementation.
pub(crate) fn cmd_list_ports(json: bool) -> Result<()> {
    let ports = NativePortEnumerator::list_ports()?;

    if json {
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "ports": ports,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    eprintln!(
        "{}",
        style("Available serial ports")
            .bold()
            .underlined()
    );

    if ports.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
    } else {
        for port in &ports {
            eprintln!("  {} {}", style("•").green(), describe_port(port));
        }
    }

    Ok(())
}
