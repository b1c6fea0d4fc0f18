//! Telink UART bootloader protocol.

pub mod chip_info;
pub mod frame;
pub mod waiter;

// Re-export common types
pub use chip_info::ChipInfo;
pub use frame::{Command, CommandFrame, MAX_READ_CHUNK, MAX_WRITE_CHUNK};
pub use waiter::{PollConfig, wait_for_payload, wait_for_tag};
