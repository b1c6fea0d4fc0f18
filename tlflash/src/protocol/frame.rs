//! Telink UART bootloader command frames.
//!
//! ## Frame Format
//!
//! ```text
//! +--------+-------------+-----------+-------+-------------------+
//! | Opcode | Payload len |  Address  | Param |       Data        |
//! +--------+-------------+-----------+-------+-------------------+
//! |   1    |      2      |     4     |   1   | 1..=256 (write)   |
//! +--------+-------------+-----------+-------+-------------------+
//! ```
//!
//! All integers are big-endian. `GetVersion` and `ChipInfo` stop after the
//! length field (which is zero). The payload length counts the address, the
//! parameter byte and the data. There is no checksum: the device confirms
//! each command by emitting a short ASCII tag.

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

/// Largest payload accepted by one `WriteFlash` frame.
pub const MAX_WRITE_CHUNK: usize = 256;

/// Largest length requested by one `ReadFlash` frame.
pub const MAX_READ_CHUNK: usize = 128;

/// Size of the address plus parameter byte.
const ADDRESSED_HEADER_LEN: u16 = 5;

/// Bootloader command opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Query the bootloader version; answered with `S`.
    GetVersion = 0x00,
    /// Program up to 256 bytes.
    WriteFlash = 0x01,
    /// Read up to 128 bytes.
    ReadFlash = 0x02,
    /// Erase a run of 4 KiB sectors.
    EraseFlash = 0x03,
    /// Query chip identity.
    ChipInfo = 0x04,
}

impl Command {
    /// Tag the device emits when this command succeeded.
    pub fn expected_tag(self) -> &'static [u8] {
        match self {
            Self::GetVersion => b"S",
            Self::WriteFlash => b"OK_01",
            Self::ReadFlash => b"OK_02",
            Self::EraseFlash => b"OK_03",
            Self::ChipInfo => b"OK_04",
        }
    }

    /// Look up a command by opcode.
    pub fn from_opcode(opcode: u8) -> Option<Self> {
        match opcode {
            0x00 => Some(Self::GetVersion),
            0x01 => Some(Self::WriteFlash),
            0x02 => Some(Self::ReadFlash),
            0x03 => Some(Self::EraseFlash),
            0x04 => Some(Self::ChipInfo),
            _ => None,
        }
    }
}

/// One encoded command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandFrame {
    /// Bootloader version query.
    GetVersion,
    /// Chip identity query.
    ChipInfo,
    /// Program `data` at `address`.
    WriteFlash {
        /// Flash address.
        address: u32,
        /// Payload, 1..=256 bytes.
        data: Vec<u8>,
    },
    /// Read `length` bytes from `address`.
    ReadFlash {
        /// Flash address.
        address: u32,
        /// Requested length, 1..=128.
        length: u8,
    },
    /// Erase `sectors` sectors starting at `address`.
    EraseFlash {
        /// Flash address.
        address: u32,
        /// Number of sectors, at least one.
        sectors: u8,
    },
}

impl CommandFrame {
    /// Build a write frame, rejecting payloads the length field can't carry.
    pub fn write_flash(address: u32, data: &[u8]) -> Result<Self> {
        if data.is_empty() || data.len() > MAX_WRITE_CHUNK {
            return Err(Error::InvalidArgument(format!(
                "write chunk must be 1..={MAX_WRITE_CHUNK} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self::WriteFlash {
            address,
            data: data.to_vec(),
        })
    }

    /// Build a read frame for `length` bytes.
    pub fn read_flash(address: u32, length: usize) -> Result<Self> {
        if length == 0 || length > MAX_READ_CHUNK {
            return Err(Error::InvalidArgument(format!(
                "read chunk must be 1..={MAX_READ_CHUNK} bytes, got {length}"
            )));
        }
        #[allow(clippy::cast_possible_truncation)] // bounded above
        let length = length as u8;
        Ok(Self::ReadFlash { address, length })
    }

    /// Build an erase frame for `sectors` sectors.
    pub fn erase_flash(address: u32, sectors: usize) -> Result<Self> {
        let sectors = u8::try_from(sectors)
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| {
                Error::InvalidArgument(format!("sector count must be 1..=255, got {sectors}"))
            })?;
        Ok(Self::EraseFlash { address, sectors })
    }

    /// Get the command type.
    pub fn command(&self) -> Command {
        match self {
            Self::GetVersion => Command::GetVersion,
            Self::ChipInfo => Command::ChipInfo,
            Self::WriteFlash { .. } => Command::WriteFlash,
            Self::ReadFlash { .. } => Command::ReadFlash,
            Self::EraseFlash { .. } => Command::EraseFlash,
        }
    }

    /// Tag that confirms this frame.
    pub fn expected_tag(&self) -> &'static [u8] {
        self.command().expected_tag()
    }

    /// Encode the frame into wire bytes.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    #[allow(clippy::cast_possible_truncation)] // data.len() <= 256 by construction
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8);
        buf.push(self.command() as u8);

        match self {
            Self::GetVersion | Self::ChipInfo => {
                buf.write_u16::<BigEndian>(0).unwrap();
            },
            Self::WriteFlash { address, data } => {
                buf.write_u16::<BigEndian>(data.len() as u16 + ADDRESSED_HEADER_LEN)
                    .unwrap();
                buf.write_u32::<BigEndian>(*address).unwrap();
                buf.push(0); // reserved
                buf.extend_from_slice(data);
            },
            Self::ReadFlash { address, length } => {
                buf.write_u16::<BigEndian>(ADDRESSED_HEADER_LEN).unwrap();
                buf.write_u32::<BigEndian>(*address).unwrap();
                buf.push(*length);
            },
            Self::EraseFlash { address, sectors } => {
                buf.write_u16::<BigEndian>(ADDRESSED_HEADER_LEN).unwrap();
                buf.write_u32::<BigEndian>(*address).unwrap();
                buf.push(*sectors);
            },
        }

        buf
    }

    /// Parse an encoded frame.
    ///
    /// Returns `None` for unknown opcodes, inconsistent length fields or
    /// trailing bytes.
    pub fn decode(data: &[u8]) -> Option<Self> {
        let mut cursor = Cursor::new(data);
        let command = Command::from_opcode(cursor.read_u8().ok()?)?;
        let payload_len = cursor.read_u16::<BigEndian>().ok()?;

        let frame = match command {
            Command::GetVersion | Command::ChipInfo => {
                if payload_len != 0 {
                    return None;
                }
                if command == Command::GetVersion {
                    Self::GetVersion
                } else {
                    Self::ChipInfo
                }
            },
            Command::WriteFlash => {
                let data_len = usize::from(payload_len.checked_sub(ADDRESSED_HEADER_LEN)?);
                let address = cursor.read_u32::<BigEndian>().ok()?;
                let _reserved = cursor.read_u8().ok()?;
                let mut payload = vec![0u8; data_len];
                cursor.read_exact(&mut payload).ok()?;
                Self::write_flash(address, &payload).ok()?
            },
            Command::ReadFlash | Command::EraseFlash => {
                if payload_len != ADDRESSED_HEADER_LEN {
                    return None;
                }
                let address = cursor.read_u32::<BigEndian>().ok()?;
                let param = cursor.read_u8().ok()?;
                if command == Command::ReadFlash {
                    Self::ReadFlash {
                        address,
                        length: param,
                    }
                } else {
                    Self::EraseFlash {
                        address,
                        sectors: param,
                    }
                }
            },
        };

        if usize::try_from(cursor.position()).ok()? != data.len() {
            return None;
        }
        Some(frame)
    }
}
