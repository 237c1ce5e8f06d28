//! Error types for spiflasher.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::protocol::StatusByte;
use crate::upgrade::UpgradeState;

/// Result type for spiflasher operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for spiflasher operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error while reading the firmware image.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The firmware image could not be opened.
    #[error("Cannot open {}: {source}", path.display())]
    FileOpen {
        /// Path that was requested.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A frame header declares more bytes than the bootloader accepts.
    #[error("Frame size too large: {size} bytes (maximum {max})")]
    FrameTooLarge {
        /// Declared on-wire frame size (length header included).
        size: usize,
        /// Maximum accepted frame size.
        max: usize,
    },

    /// The device reported a status other than the one the protocol requires.
    #[error("Unexpected state {got} (expected {expected})")]
    UnexpectedStatus {
        /// Status the protocol requires at this point.
        expected: StatusByte,
        /// Status the device actually reported.
        got: StatusByte,
    },

    /// End of file reached with bytes left untransmitted.
    #[error("Transfer failed, completed {transmitted} bytes out of {file_size}")]
    IncompleteTransfer {
        /// Bytes accepted by the device.
        transmitted: usize,
        /// Size of the firmware image.
        file_size: usize,
    },

    /// The SPI device node could not be opened.
    #[error("Failed to open SPI device {path}: {source}")]
    SpiOpen {
        /// Device path (e.g. `/dev/spidev1.0`).
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A SPI bus parameter could not be applied.
    #[error("Failed to set SPI {setting} to {value}: {source}")]
    SpiConfig {
        /// Name of the setting (mode, speed, bits per word).
        setting: &'static str,
        /// Requested value.
        value: u32,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A SPI transfer failed.
    #[error("SPI transfer failed: {0}")]
    SpiTransfer(#[source] io::Error),

    /// GPIO line request or access failed.
    #[cfg(feature = "linux")]
    #[error("GPIO error: {0}")]
    Gpio(#[from] gpiocdev::Error),

    /// The ready line did not go low within the configured bound.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The upgrade session already reached a terminal state.
    #[error("Upgrade session already finished ({0})")]
    SessionFinished(UpgradeState),
}
