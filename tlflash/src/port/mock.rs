//! Simulated bootloader port for unit tests.
//!
//! Each frame written through the port is handed to a responder, which
//! returns the bytes the device would emit as a list of bursts. One burst is
//! released per [`Port::read_available`] call, so a burst at index `n`
//! arrives on the `n`-th poll after the write. An empty burst models a poll
//! where nothing has arrived yet.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

use crate::error::Result;
use crate::port::{HANDSHAKE_BAUD, Port};

type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

pub(crate) struct MockPort {
    responder: Responder,
    pending: VecDeque<Vec<u8>>,
    /// Every frame written, in order.
    pub(crate) written: Vec<Vec<u8>>,
    /// Baud rates applied through `set_baud_rate`, in order.
    pub(crate) baud_history: Vec<u32>,
    /// RTS levels applied, in order.
    pub(crate) rts_history: Vec<bool>,
    /// Number of `read_available` calls.
    pub(crate) polls: usize,
    /// Number of `clear_buffers` calls.
    pub(crate) clears: usize,
    baud_rate: u32,
    closed: bool,
}

impl MockPort {
    pub(crate) fn new<F>(responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
    {
        Self {
            responder: Box::new(responder),
            pending: VecDeque::new(),
            written: Vec::new(),
            baud_history: Vec::new(),
            rts_history: Vec::new(),
            polls: 0,
            clears: 0,
            baud_rate: HANDSHAKE_BAUD,
            closed: false,
        }
    }

    /// A device that never answers.
    pub(crate) fn silent() -> Self {
        Self::new(|_| Vec::new())
    }

    /// Queue bytes as if they had already arrived.
    pub(crate) fn inject(&mut self, data: &[u8]) {
        self.pending.push_back(data.to_vec());
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Port for MockPort {
    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        self.baud_rate = baud_rate;
        self.baud_history.push(baud_rate);
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn clear_buffers(&mut self) -> Result<()> {
        self.clears += 1;
        self.pending.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn set_rts(&mut self, level: bool) -> Result<()> {
        self.rts_history.push(level);
        Ok(())
    }

    fn read_available(&mut self) -> Result<Vec<u8>> {
        self.polls += 1;
        Ok(self.pending.pop_front().unwrap_or_default())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(mut burst) = self.pending.pop_front() else {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        };
        let n = buf.len().min(burst.len());
        buf[..n].copy_from_slice(&burst[..n]);
        if n < burst.len() {
            self.pending.push_front(burst.split_off(n));
        }
        Ok(n)
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.push(buf.to_vec());
        let reply = (self.responder)(buf);
        self.pending.extend(reply);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
