//! Bootloader wire protocol.
//!
//! The target's bootloader speaks a small command set over SPI. Every
//! transaction is initiated by the host; the target signals that it is
//! ready for the next one by pulling the ready line low.
//!
//! ```text
//! Status probe (full duplex):
//!   MOSI: 0xFF [0xFF 0xFF]
//!   MISO: status [id version]
//!
//! Unlock (write only):
//!   MOSI: 0xDC 0xAA
//!
//! Frame write (write only):
//! +----------+----------+------------------------+
//! | Len (hi) | Len (lo) |   Payload (Len bytes)  |
//! +----------+----------+------------------------+
//! |    1     |    1     |        variable        |
//! +----------+----------+------------------------+
//! ```

pub mod status;

pub use status::{ExtendedStatus, StatusByte};

/// Byte clocked out while reading status; the target ignores it.
pub const STATUS_PROBE: u8 = 0xFF;

/// Single-byte status request.
pub const GET_STATUS_CMD: [u8; 1] = [STATUS_PROBE];

/// Three-byte extended status request.
pub const GET_EXT_STATUS_CMD: [u8; 3] = [STATUS_PROBE; 3];

/// Unlock command that switches the bootloader into application update.
pub const UNLOCK_CMD: [u8; 2] = [0xDC, 0xAA];

/// Size of the big-endian length header at the start of every frame.
pub const FRAME_HEADER_SIZE: usize = 2;

/// Largest frame the bootloader accepts, header included.
pub const MAX_FRAME_SIZE: usize = 532;

/// SPI mode required by the target (CPOL=0, CPHA=1).
pub const SPI_MODE: u8 = 1;

/// SPI clock rate used for the upload.
pub const SPI_SPEED_HZ: u32 = 1_000_000;

/// SPI word width.
pub const SPI_BITS_PER_WORD: u8 = 8;
