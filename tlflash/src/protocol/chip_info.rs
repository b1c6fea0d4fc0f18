//! Chip identity reply decoding.
//!
//! The `ChipInfo` command is answered with a fixed 27-byte ASCII record:
//!
//! ```text
//! offset  0     6      11   14     19       25
//!         |.....|vvvv.|cc.|pppp.|jjjjjj|..|
//!          loader ver  chip prod  JEDEC id
//! ```
//!
//! The flash size is derived from the capacity byte of the JEDEC id
//! (`1 << capacity` bytes), never looked up in a table.

use std::fmt;
use std::ops::Range;

/// Exact length of a well-formed chip info reply.
pub const CHIP_INFO_LEN: usize = 27;

const LOADER_VERSION: Range<usize> = 6..10;
const CHIP_VERSION: Range<usize> = 11..13;
const PRODUCT_ID: Range<usize> = 14..18;
const JEDEC_ID: Range<usize> = 19..25;

/// Product id that gets an extra hint when displayed.
const TLSR825X_PRODUCT_ID: &str = "5562";

/// Decoded chip identity.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ChipInfo {
    /// Bootloader version, 4 chars.
    pub loader_version: String,
    /// Chip version id, 2 chars.
    pub chip_version_id: String,
    /// Chip product id, 4 chars.
    pub chip_prod_id: String,
    /// Flash JEDEC id, 6 hex chars.
    pub jedec_id: String,
    /// Flash size derived from the JEDEC capacity byte.
    pub flash_size_kb: u64,
}

impl ChipInfo {
    /// Decode a raw reply; `None` unless it is exactly 27 well-formed bytes.
    pub fn decode(raw: &[u8]) -> Option<Self> {
        if raw.len() != CHIP_INFO_LEN {
            return None;
        }

        let field = |range: Range<usize>| -> Option<String> {
            let bytes = &raw[range];
            bytes
                .iter()
                .all(u8::is_ascii_graphic)
                .then(|| String::from_utf8_lossy(bytes).into_owned())
        };

        let jedec_id = field(JEDEC_ID)?;
        let capacity = u8::from_str_radix(&jedec_id[4..6], 16).ok()?;
        let flash_size_kb = 1u64.checked_shl(u32::from(capacity))? >> 10;

        Some(Self {
            loader_version: field(LOADER_VERSION)?,
            chip_version_id: field(CHIP_VERSION)?,
            chip_prod_id: field(PRODUCT_ID)?,
            jedec_id,
            flash_size_kb,
        })
    }

    /// Product id with the family hint for known parts.
    pub fn product_label(&self) -> String {
        if self.chip_prod_id == TLSR825X_PRODUCT_ID {
            format!("{} (825x ?)", self.chip_prod_id)
        } else {
            self.chip_prod_id.clone()
        }
    }
}

impl fmt::Display for ChipInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Loader version: {} - Chip version: {} - Chip product: {} - Flash ID: {} - Flash size: {} KB",
            self.loader_version,
            self.chip_version_id,
            self.product_label(),
            self.jedec_id,
            self.flash_size_kb
        )
    }
}

/// Split a byte slice into a valid UTF-8 prefix and the remaining bytes.
///
/// Bytes after the first invalid or incomplete sequence are returned
/// untouched, so a reply cut in the middle of a character is treated as not
/// fully arrived rather than as an error.
pub fn split_utf8(bytes: &[u8]) -> (&str, &[u8]) {
    match std::str::from_utf8(bytes) {
        Ok(s) => (s, &[]),
        Err(e) => {
            let (valid, rest) = bytes.split_at(e.valid_up_to());
            (std::str::from_utf8(valid).unwrap_or_default(), rest)
        },
    }
}
