//! Transport abstraction for the SPI bus and GPIO lines.
//!
//! The upgrade engine never touches hardware directly. It talks to the
//! target through these traits, so the protocol logic stays independent of
//! how the bus and pins are reached:
//!
//! ```text
//! +-----------------------------+
//! |   Upgrade engine            |
//! | (boot, status, transfer)    |
//! +--------------+--------------+
//!                |
//!                v
//! +--------------+--------------+
//! |  SpiBus / GpioChip traits   |
//! +--------------+--------------+
//!                |
//!                v
//! +--------------+--------------+
//! |  Linux spidev + gpiocdev    |
//! +-----------------------------+
//! ```
//!
//! All operations are blocking with a single transaction in flight. A
//! requested GPIO line is released when its handle is dropped.

#[cfg(feature = "linux")]
pub mod linux;

#[cfg(test)]
pub(crate) mod mock;

use std::fmt;

use crate::error::Result;

/// Logic level of a GPIO line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    /// Line driven or read low.
    Low,
    /// Line driven or read high.
    High,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// SPI master with blocking transfers.
///
/// The bus is expected to be configured (mode, clock rate, word width)
/// before it is handed to the upgrade engine.
pub trait SpiBus {
    /// Clock out `data`, discarding whatever the target sends back.
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Full-duplex transfer: clock out `tx` while filling `rx`.
    ///
    /// `tx` and `rx` must have the same length.
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<()>;
}

/// A GPIO line requested as an output.
pub trait OutputLine {
    /// Drive the line to `level`.
    fn set_level(&mut self, level: Level) -> Result<()>;
}

/// A GPIO line requested as an input.
pub trait InputLine {
    /// Sample the current level of the line.
    fn level(&mut self) -> Result<Level>;
}

/// Source of GPIO lines.
///
/// Lines are freed when the returned handles are dropped.
pub trait GpioChip {
    /// Handle type for output lines.
    type Output: OutputLine;
    /// Handle type for input lines.
    type Input: InputLine;

    /// Request `line` as an output, driven to `initial` immediately.
    fn request_output(&mut self, line: u32, initial: Level) -> Result<Self::Output>;

    /// Request `line` as an input.
    fn request_input(&mut self, line: u32) -> Result<Self::Input>;
}

#[cfg(feature = "linux")]
pub use linux::{LinuxGpioChip, LinuxInputLine, LinuxOutputLine, LinuxSpi, LinuxSpiConfig};
