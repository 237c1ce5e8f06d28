//! # spiflasher
//!
//! A library for uploading application firmware to a microcontroller through
//! its SPI bootloader.
//!
//! The host is wired to the target with a SPI bus plus two GPIO lines: a
//! reset output used to drop the target into its bootloader, and a ready
//! input the target pulls low whenever it can accept the next transaction.
//! This crate provides:
//!
//! - Bootloader entry through a fixed reset pulse train
//! - Ready-paced status reads and the unlock handshake
//! - Length-prefixed frame parsing and upload with per-frame CRC status
//! - Offline frame layout checks for firmware images
//!
//! ## Features
//!
//! - `linux` (default): spidev and GPIO character device transport
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use spiflasher::ImageLayout;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Check the image before touching hardware
//!     let layout = ImageLayout::from_file("app.bin")?;
//!     layout.validate()?;
//!
//!     #[cfg(feature = "linux")]
//!     {
//!         use spiflasher::{LinuxGpioChip, LinuxSpiConfig, UpgradeConfig, Upgrader};
//!
//!         let mut upgrader = Upgrader::open(
//!             &LinuxSpiConfig::default(),
//!             LinuxGpioChip::default(),
//!             UpgradeConfig::default(),
//!         )?;
//!         upgrader.run("app.bin", |current, total| {
//!             println!("Uploading: {current}/{total}");
//!         })?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod image;
pub mod protocol;
pub mod transport;
pub mod upgrade;

// Re-exports for convenience
#[cfg(feature = "linux")]
pub use transport::{LinuxGpioChip, LinuxSpi, LinuxSpiConfig};
pub use {
    error::{Error, Result},
    image::{FrameBuffer, FrameInfo, ImageLayout},
    protocol::{ExtendedStatus, MAX_FRAME_SIZE, StatusByte},
    transport::{GpioChip, InputLine, Level, OutputLine, SpiBus},
    upgrade::{PollConfig, RC_ERROR, RC_OK, UpgradeConfig, UpgradeReport, UpgradeState, Upgrader},
};
