//! Telink UART bootloader flasher.
//!
//! [`Flasher`] owns the serial port for the whole session and drives the
//! bootloader protocol on top of it:
//!
//! 1. enter the bootloader through a [`BootloaderEntry`] strategy,
//! 2. raise the baud rate and confirm the bootloader with `GetVersion`,
//! 3. run erase/write/read/chip-info commands, each frame awaited on its own.
//!
//! Writes retry each chunk a few times; reads and erases never retry. A
//! failing chunk aborts the remaining sequence and leaves the transferred
//! prefix in place.
//!
//! ## Example
//!
//! ```rust,no_run
//! use tlflash::{Flasher, RtsReset};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut flasher = Flasher::open("/dev/ttyUSB0", RtsReset::default())?;
//!     flasher.connect()?;
//!
//!     if let Some(info) = flasher.read_chip_info()? {
//!         println!("{info}");
//!     }
//!
//!     let firmware = std::fs::read("firmware.bin")?;
//!     flasher.write_flash(0x0, &firmware, |p| {
//!         println!("{:.0}%", p.fraction() * 100.0);
//!     })?;
//!
//!     Ok(())
//! }
//! ```

use std::io::Write;
use std::thread;
use std::time::Duration;

use log::{debug, info, trace, warn};

use crate::boot::BootloaderEntry;
use crate::error::{Error, Result};
use crate::port::{HANDSHAKE_BAUD, Port, TRANSFER_BAUD};
use crate::protocol::chip_info::{ChipInfo, split_utf8};
use crate::protocol::frame::{Command, CommandFrame, MAX_READ_CHUNK, MAX_WRITE_CHUNK};
use crate::protocol::waiter::{POLL_INTERVAL, PollConfig, wait_for_payload, wait_for_tag};

/// Delay on each side of the baud rate switch.
const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Delay between the chip info request and the single drain.
const CHIP_INFO_DELAY: Duration = Duration::from_millis(50);

/// Backoff between write attempts of the same chunk.
const WRITE_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Send-and-wait cycles per write chunk.
const MAX_WRITE_ATTEMPTS: usize = 3;

/// Polls allowed for version, write and erase replies.
const TAG_POLLS: u32 = 200;

/// Polls allowed for one read chunk.
const READ_POLLS: u32 = 500;

/// Erase wait granularity: one step per this many sectors.
const SECTORS_PER_ERASE_STEP: usize = 3;

/// Time the flash needs per erase step.
const ERASE_STEP: Duration = Duration::from_millis(100);

/// Protocol session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No bootloader session.
    Disconnected,
    /// Bootloader entry in progress.
    Handshake,
    /// Transfer baud rate applied, version not yet confirmed.
    BaudRaised,
    /// Bootloader confirmed, ready for commands.
    Ready,
    /// Erase in progress.
    Erasing,
    /// Write in progress.
    Writing,
    /// Read in progress.
    Reading,
    /// Chip info query in progress.
    QueryingChipInfo,
}

/// Progress of a chunked operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Units completed (bytes, or erase steps).
    pub done: usize,
    /// Units in total.
    pub total: usize,
}

impl Progress {
    /// Create a progress report.
    pub fn new(done: usize, total: usize) -> Self {
        Self { done, total }
    }

    /// Completed fraction in `[0, 1]`.
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            (self.done as f64 / self.total as f64).clamp(0.0, 1.0)
        }
    }
}

/// Timing and retry policy of a session.
#[derive(Debug, Clone)]
pub struct FlasherConfig {
    /// Baud rate used after the bootloader was entered.
    pub transfer_baud: u32,
    /// Delay before and after the baud switch.
    pub settle_delay: Duration,
    /// Poll schedule for version, write and erase tags.
    pub tag_poll: PollConfig,
    /// Poll schedule for one read chunk.
    pub read_poll: PollConfig,
    /// Send-and-wait cycles per write chunk.
    pub write_attempts: usize,
    /// Backoff between write attempts.
    pub write_retry_delay: Duration,
    /// Duration of one erase wait step.
    pub erase_step: Duration,
    /// Sectors covered by one erase wait step.
    pub sectors_per_erase_step: usize,
    /// Delay before draining the chip info reply.
    pub chip_info_delay: Duration,
}

impl Default for FlasherConfig {
    fn default() -> Self {
        Self {
            transfer_baud: TRANSFER_BAUD,
            settle_delay: SETTLE_DELAY,
            tag_poll: PollConfig::new(POLL_INTERVAL, TAG_POLLS),
            read_poll: PollConfig::new(POLL_INTERVAL, READ_POLLS),
            write_attempts: MAX_WRITE_ATTEMPTS,
            write_retry_delay: WRITE_RETRY_DELAY,
            erase_step: ERASE_STEP,
            sectors_per_erase_step: SECTORS_PER_ERASE_STEP,
            chip_info_delay: CHIP_INFO_DELAY,
        }
    }
}

impl FlasherConfig {
    /// Set the transfer baud rate.
    #[must_use]
    pub fn with_transfer_baud(mut self, baud: u32) -> Self {
        self.transfer_baud = baud;
        self
    }
}

/// Address of `offset` bytes past `base`, if it stays within 32 bits.
fn offset_address(base: u32, offset: usize) -> Result<u32> {
    u32::try_from(offset)
        .ok()
        .and_then(|offset| base.checked_add(offset))
        .ok_or_else(|| {
            Error::InvalidArgument(format!("0x{base:08X} + {offset} exceeds the address space"))
        })
}

/// Check that `len` bytes starting at `base` are addressable.
fn check_span(base: u32, len: usize) -> Result<()> {
    if len > 0 {
        offset_address(base, len - 1)?;
    }
    Ok(())
}

/// Telink UART bootloader session.
///
/// Generic over the port type `P` and the bootloader entry strategy `B`.
pub struct Flasher<P: Port, B: BootloaderEntry> {
    port: P,
    entry: B,
    config: FlasherConfig,
    state: SessionState,
    interrupt: Option<Box<dyn Fn() -> bool + Send>>,
}

impl<P: Port, B: BootloaderEntry> Flasher<P, B> {
    /// Create a flasher with an already opened port.
    pub fn new(port: P, entry: B) -> Self {
        Self {
            port,
            entry,
            config: FlasherConfig::default(),
            state: SessionState::Disconnected,
            interrupt: None,
        }
    }

    /// Use a session-local interrupt checker instead of the global one.
    #[must_use]
    pub fn with_interrupt_checker<F>(mut self, checker: F) -> Self
    where
        F: Fn() -> bool + Send + 'static,
    {
        self.interrupt = Some(Box::new(checker));
        self
    }

    fn check_interrupted(&self) -> Result<()> {
        let interrupted = match &self.interrupt {
            Some(checker) => checker(),
            None => crate::is_interrupted_requested(),
        };
        if interrupted {
            warn!("Interrupted, stopping {:?}", self.state);
            return Err(Error::Interrupted);
        }
        Ok(())
    }

    /// Replace the timing and retry policy.
    #[must_use]
    pub fn with_config(mut self, config: FlasherConfig) -> Self {
        self.config = config;
        self
    }

    /// Get the current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Get the timing and retry policy.
    pub fn config(&self) -> &FlasherConfig {
        &self.config
    }

    /// Get a reference to the underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Enter the bootloader, raise the baud rate and confirm the version.
    ///
    /// On any failure the session is left `Disconnected`.
    pub fn connect(&mut self) -> Result<()> {
        info!("Connecting to bootloader on {}", self.port.name());

        let result = self.try_connect();
        if result.is_err() {
            self.state = SessionState::Disconnected;
        }
        result
    }

    fn try_connect(&mut self) -> Result<()> {
        self.state = SessionState::Handshake;
        // A previous attempt may have left the port at the transfer rate
        if self.port.baud_rate() != HANDSHAKE_BAUD {
            self.port.set_baud_rate(HANDSHAKE_BAUD)?;
        }
        if !self.entry.enter_bootloader(&mut self.port) {
            return Err(Error::HandshakeFailed(
                "could not enter bootloader mode".into(),
            ));
        }

        thread::sleep(self.config.settle_delay);
        self.port.set_baud_rate(self.config.transfer_baud)?;
        self.state = SessionState::BaudRaised;
        debug!("Baud rate raised to {}", self.config.transfer_baud);
        thread::sleep(self.config.settle_delay);

        let frame = CommandFrame::GetVersion;
        self.send_command(&frame)?;
        if !wait_for_tag(&mut self.port, frame.expected_tag(), self.config.tag_poll)? {
            return Err(Error::HandshakeFailed(format!(
                "no version reply within {:?}",
                self.config.tag_poll.span()
            )));
        }

        self.state = SessionState::Ready;
        info!("Bootloader ready at {} baud", self.port.baud_rate());
        Ok(())
    }

    /// Send a command frame.
    fn send_command(&mut self, frame: &CommandFrame) -> Result<()> {
        let data = frame.encode();
        trace!(
            "Sending command {:?}: {} bytes",
            frame.command(),
            data.len()
        );
        self.port.send(&data)
    }

    /// Run `op` in `state`, returning to `Ready` afterwards.
    fn run_as<T>(
        &mut self,
        state: SessionState,
        op: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        if self.state != SessionState::Ready {
            return Err(Error::NotConnected);
        }
        self.state = state;
        let result = op(self);
        self.state = SessionState::Ready;
        result
    }

    /// Erase `sectors` sectors starting at `address`.
    ///
    /// The bootloader gives no early completion signal, so this sleeps for a
    /// time proportional to the sector count (reporting each step through
    /// `progress`) and then waits once for the erase tag. Never retried.
    pub fn erase_sectors<F>(&mut self, address: u32, sectors: usize, mut progress: F) -> Result<()>
    where
        F: FnMut(Progress),
    {
        let frame = CommandFrame::erase_flash(address, sectors)?;

        self.run_as(SessionState::Erasing, |this| {
            info!("Erasing {sectors} sector(s) at 0x{address:08X}");
            this.send_command(&frame)?;

            let steps = sectors / this.config.sectors_per_erase_step.max(1);
            for step in 1..=steps {
                this.check_interrupted()?;
                thread::sleep(this.config.erase_step);
                progress(Progress::new(step, steps));
            }

            let poll = this.config.tag_poll;
            if wait_for_tag(&mut this.port, frame.expected_tag(), poll)? {
                debug!("Erase at 0x{address:08X} confirmed");
                if steps == 0 {
                    progress(Progress::new(0, 0));
                }
                Ok(())
            } else {
                Err(Error::CommandTimeout {
                    command: Command::EraseFlash,
                    waited: this.config.erase_step.saturating_mul(
                        u32::try_from(steps).unwrap_or(u32::MAX),
                    ) + poll.span(),
                })
            }
        })
    }

    /// Write `data` starting at `address` in chunks of up to 256 bytes.
    ///
    /// Returns the number of bytes written. A chunk that fails every attempt
    /// aborts the write with [`Error::ChunkTransfer`].
    pub fn write_flash<F>(&mut self, address: u32, data: &[u8], mut progress: F) -> Result<usize>
    where
        F: FnMut(Progress),
    {
        check_span(address, data.len())?;

        self.run_as(SessionState::Writing, |this| {
            info!("Writing {} bytes at 0x{address:08X}", data.len());
            let total = data.len();
            let mut written = 0;

            for chunk in data.chunks(MAX_WRITE_CHUNK) {
                this.check_interrupted()?;
                let chunk_address = offset_address(address, written)?;
                let frame = CommandFrame::write_flash(chunk_address, chunk)?;

                if !this.write_chunk(&frame)? {
                    warn!("Write failed at 0x{chunk_address:08X} after {written} bytes");
                    return Err(Error::ChunkTransfer {
                        command: Command::WriteFlash,
                        address: chunk_address,
                        transferred: written,
                    });
                }

                written += chunk.len();
                progress(Progress::new(written, total));
            }

            debug!("Wrote {written} bytes");
            Ok(written)
        })
    }

    /// Send one write frame up to `write_attempts` times.
    fn write_chunk(&mut self, frame: &CommandFrame) -> Result<bool> {
        let attempts = self.config.write_attempts.max(1);

        for attempt in 1..=attempts {
            self.send_command(frame)?;
            if wait_for_tag(&mut self.port, frame.expected_tag(), self.config.tag_poll)? {
                return Ok(true);
            }

            if attempt < attempts {
                debug!("No write confirmation (attempt {attempt}/{attempts}), retrying");
                thread::sleep(self.config.write_retry_delay);
            }
        }

        Ok(false)
    }

    /// Read `length` bytes from `address` into `sink`, 128 bytes per frame.
    ///
    /// Each chunk is awaited once. On failure the sink keeps the chunks read
    /// so far and [`Error::ChunkTransfer`] reports how many bytes that is.
    pub fn read_flash<W, F>(
        &mut self,
        address: u32,
        length: usize,
        sink: &mut W,
        mut progress: F,
    ) -> Result<usize>
    where
        W: Write + ?Sized,
        F: FnMut(Progress),
    {
        check_span(address, length)?;

        self.run_as(SessionState::Reading, |this| {
            info!("Reading {length} bytes at 0x{address:08X}");
            let mut read = 0;

            while read < length {
                this.check_interrupted()?;
                let chunk_len = (length - read).min(MAX_READ_CHUNK);
                let chunk_address = offset_address(address, read)?;
                let frame = CommandFrame::read_flash(chunk_address, chunk_len)?;
                this.send_command(&frame)?;

                let reply = wait_for_payload(
                    &mut this.port,
                    frame.expected_tag(),
                    chunk_len,
                    this.config.read_poll,
                )?;
                let Some(chunk) = reply else {
                    warn!("Read failed at 0x{chunk_address:08X} after {read} bytes");
                    return Err(Error::ChunkTransfer {
                        command: Command::ReadFlash,
                        address: chunk_address,
                        transferred: read,
                    });
                };

                sink.write_all(&chunk)?;
                read += chunk_len;
                progress(Progress::new(read, length));
            }

            debug!("Read {read} bytes");
            Ok(read)
        })
    }

    /// Query chip identity.
    ///
    /// Relies on timing: one drain after a short fixed delay. `Ok(None)`
    /// means the reply was missing or malformed; the session stays usable.
    pub fn read_chip_info(&mut self) -> Result<Option<ChipInfo>> {
        self.run_as(SessionState::QueryingChipInfo, |this| {
            this.send_command(&CommandFrame::ChipInfo)?;
            thread::sleep(this.config.chip_info_delay);

            let raw = this.port.read_available()?;
            let (text, pending) = split_utf8(&raw);
            if !pending.is_empty() {
                trace!("Ignoring {} undecodable trailing bytes", pending.len());
            }

            let chip = ChipInfo::decode(text.as_bytes());
            match &chip {
                Some(chip) => debug!("Chip info: {chip}"),
                None => warn!("Malformed chip info reply ({} bytes)", raw.len()),
            }
            Ok(chip)
        })
    }

    /// Close the port and end the session.
    pub fn close(&mut self) -> Result<()> {
        debug!("Closing {}", self.port.name());
        self.state = SessionState::Disconnected;
        self.port.close()
    }
}

// Native-specific convenience functions
#[cfg(feature = "native")]
mod native_impl {
    use super::{BootloaderEntry, Flasher, Result};
    use crate::port::{NativePort, SerialConfig};

    impl<B: BootloaderEntry> Flasher<NativePort, B> {
        /// Open `port_name` at the handshake baud rate.
        ///
        /// # Arguments
        ///
        /// * `port_name` - Serial port name (e.g., "/dev/ttyUSB0" or "COM3")
        /// * `entry` - Strategy that puts the chip into the bootloader
        pub fn open(port_name: &str, entry: B) -> Result<Self> {
            Self::open_with_config(&SerialConfig::new(port_name), entry)
        }

        /// Open a port with a full serial configuration.
        pub fn open_with_config(config: &SerialConfig, entry: B) -> Result<Self> {
            let port = NativePort::open(config)?;
            Ok(Self::new(port, entry))
        }
    }
}
