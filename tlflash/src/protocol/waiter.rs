//! Tag matching over the raw serial byte stream.
//!
//! The bootloader has no framing on its replies. The only delimiter is the
//! success tag it appends, so the stream is treated as an append-only buffer
//! that is polled until the tag shows up or the poll ceiling is reached.

use std::thread;
use std::time::Duration;

use log::trace;

use crate::error::Result;
use crate::port::Port;

/// Default spacing between polls.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Extra bytes searched past the tag at the end of a read reply.
const TAIL_SLACK: usize = 2;

/// Poll schedule for one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Sleep between two polls.
    pub interval: Duration,
    /// Maximum number of polls before giving up.
    pub max_polls: u32,
}

impl PollConfig {
    /// Create a poll schedule.
    pub const fn new(interval: Duration, max_polls: u32) -> Self {
        Self {
            interval,
            max_polls,
        }
    }

    /// Derive the ceiling from a maximum wait at the given interval.
    ///
    /// Always allows at least one poll.
    pub fn from_timeout(max_wait: Duration, interval: Duration) -> Self {
        let polls = if interval.is_zero() {
            1
        } else {
            (max_wait.as_nanos() / interval.as_nanos()).max(1)
        };
        Self {
            interval,
            max_polls: u32::try_from(polls).unwrap_or(u32::MAX),
        }
    }

    /// Approximate wall-clock span of the full schedule.
    pub fn span(&self) -> Duration {
        self.interval.saturating_mul(self.max_polls)
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty()
        && haystack
            .windows(needle.len())
            .any(|w| w == needle)
}

/// Poll until `tag` appears anywhere in the accumulated reply.
///
/// Returns `Ok(false)` once `max_polls` polls passed without a match. A tag
/// delivered on the last allowed poll still counts.
pub fn wait_for_tag<P: Port + ?Sized>(port: &mut P, tag: &[u8], poll: PollConfig) -> Result<bool> {
    let mut buffer = Vec::new();

    for attempt in 1..=poll.max_polls {
        buffer.extend(port.read_available()?);

        if contains(&buffer, tag) {
            trace!(
                "Tag {:?} matched after {attempt} polls",
                String::from_utf8_lossy(tag)
            );
            return Ok(true);
        }

        if attempt < poll.max_polls {
            thread::sleep(poll.interval);
        }
    }

    trace!(
        "Tag {:?} not seen, buffered {} bytes",
        String::from_utf8_lossy(tag),
        buffer.len()
    );
    Ok(false)
}

/// Poll until `tag` trails at least `expected_len` payload bytes.
///
/// Only the tail of the buffer is searched, since the payload itself may
/// contain the tag bytes. On a match the first `expected_len` bytes are
/// returned; `Ok(None)` means the ceiling was reached.
pub fn wait_for_payload<P: Port + ?Sized>(
    port: &mut P,
    tag: &[u8],
    expected_len: usize,
    poll: PollConfig,
) -> Result<Option<Vec<u8>>> {
    let mut buffer = Vec::with_capacity(expected_len + tag.len() + TAIL_SLACK);
    let window = tag.len() + TAIL_SLACK;

    for attempt in 1..=poll.max_polls {
        buffer.extend(port.read_available()?);

        if buffer.len() >= expected_len + tag.len() {
            let tail = &buffer[buffer.len().saturating_sub(window)..];
            if contains(tail, tag) {
                trace!("Payload of {expected_len} bytes captured after {attempt} polls");
                buffer.truncate(expected_len);
                return Ok(Some(buffer));
            }
        }

        if attempt < poll.max_polls {
            thread::sleep(poll.interval);
        }
    }

    trace!(
        "Payload tag not seen, buffered {} of {} bytes",
        buffer.len(),
        expected_len + tag.len()
    );
    Ok(None)
}
