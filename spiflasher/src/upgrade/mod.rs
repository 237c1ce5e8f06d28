//! Application upgrade over the SPI bootloader.
//!
//! An upgrade runs in a fixed order and never retries:
//!
//! 1. Probe the current status (diagnostic only).
//! 2. Reset the target into its bootloader ([`boot`]).
//! 3. Read the extended status (diagnostic only).
//! 4. Unlock the bootloader ([`unlock`]).
//! 5. Stream the image frame by frame ([`transfer`]).
//!
//! ## Example
//!
//! ```rust,no_run
//! use spiflasher::transport::{LinuxGpioChip, LinuxSpiConfig};
//! use spiflasher::upgrade::{UpgradeConfig, Upgrader};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut upgrader = Upgrader::open(
//!         &LinuxSpiConfig::default(),
//!         LinuxGpioChip::default(),
//!         UpgradeConfig::default(),
//!     )?;
//!
//!     let report = upgrader.run("app.bin", |current, total| {
//!         println!("{current}/{total}");
//!     })?;
//!     println!("{} bytes in {} frames", report.bytes_transmitted, report.frames);
//!     Ok(())
//! }
//! ```

pub mod boot;
pub mod status;
pub mod transfer;
pub mod unlock;

use std::fmt;
use std::path::Path;

use log::{debug, info};

pub use boot::{PulseTrain, enter_bootloader};
pub use status::{PollConfig, StatusChannel};
pub use transfer::FrameTransfer;
pub use unlock::unlock;

use crate::error::{Error, Result};
use crate::protocol::{ExtendedStatus, StatusByte};
use crate::transport::{GpioChip, SpiBus};

/// Process exit code for a completed upgrade.
pub const RC_OK: u8 = 0;

/// Process exit code for any failure.
pub const RC_ERROR: u8 = 1;

/// GPIO line wired to the target's reset input.
pub const DEFAULT_RESET_LINE: u32 = 35;

/// GPIO line the target pulls low when it is ready for the next transaction.
pub const DEFAULT_READY_LINE: u32 = 47;

/// Line assignment and polling for an upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradeConfig {
    /// Reset output line.
    pub reset_line: u32,
    /// Ready input line.
    pub ready_line: u32,
    /// Ready-line polling.
    pub poll: PollConfig,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            reset_line: DEFAULT_RESET_LINE,
            ready_line: DEFAULT_READY_LINE,
            poll: PollConfig::default(),
        }
    }
}

impl UpgradeConfig {
    /// Use `line` as the reset output.
    #[must_use]
    pub fn with_reset_line(mut self, line: u32) -> Self {
        self.reset_line = line;
        self
    }

    /// Use `line` as the ready input.
    #[must_use]
    pub fn with_ready_line(mut self, line: u32) -> Self {
        self.ready_line = line;
        self
    }

    /// Replace the polling configuration.
    #[must_use]
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }
}

/// Progress of an upgrade session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UpgradeState {
    /// Nothing sent yet.
    Init,
    /// Reset pulse train applied.
    BootloaderEntered,
    /// Unlock command sent.
    Unlocked,
    /// Frames are being streamed.
    Transferring,
    /// Every byte of the image was accepted.
    Done,
    /// The session stopped on an error.
    Failed,
}

impl UpgradeState {
    /// Whether the session can no longer run.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for UpgradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::BootloaderEntered => "bootloader entered",
            Self::Unlocked => "unlocked",
            Self::Transferring => "transferring",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of a successful upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UpgradeReport {
    /// Status read before the reset.
    pub initial_status: StatusByte,
    /// Bootloader extended status.
    pub extended_status: ExtendedStatus,
    /// Status returned after unlock.
    pub unlock_status: StatusByte,
    /// Bytes accepted by the bootloader.
    pub bytes_transmitted: usize,
    /// Frames accepted by the bootloader.
    pub frames: usize,
}

/// Runs one upgrade over an owned SPI bus and GPIO chip.
///
/// The ready line is requested when the upgrader is created and held until
/// it is dropped.
pub struct Upgrader<S: SpiBus, G: GpioChip> {
    spi: S,
    gpio: G,
    ready: G::Input,
    config: UpgradeConfig,
    pulse_train: PulseTrain,
    state: UpgradeState,
}

impl<S: SpiBus, G: GpioChip> Upgrader<S, G> {
    /// Create an upgrader, requesting the ready line from `gpio`.
    pub fn new(spi: S, mut gpio: G, config: UpgradeConfig) -> Result<Self> {
        let ready = gpio.request_input(config.ready_line)?;
        debug!(
            "Reset line {}, ready line {}",
            config.reset_line, config.ready_line
        );

        Ok(Self {
            spi,
            gpio,
            ready,
            config,
            pulse_train: PulseTrain::bootloader_entry(),
            state: UpgradeState::Init,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_pulse_train(mut self, train: PulseTrain) -> Self {
        self.pulse_train = train;
        self
    }

    /// Current session state.
    pub fn state(&self) -> UpgradeState {
        self.state
    }

    /// Configuration in use.
    pub fn config(&self) -> &UpgradeConfig {
        &self.config
    }

    /// Release the ready line and hand back the bus and chip.
    pub fn into_parts(self) -> (S, G) {
        (self.spi, self.gpio)
    }

    /// Upload the application image at `path`.
    ///
    /// `progress` receives `(transmitted, file_size)` after each accepted
    /// frame. An upgrader runs once; later calls fail with
    /// [`Error::SessionFinished`].
    pub fn run<P, F>(&mut self, path: P, progress: F) -> Result<UpgradeReport>
    where
        P: AsRef<Path>,
        F: FnMut(usize, usize),
    {
        if self.state != UpgradeState::Init {
            return Err(Error::SessionFinished(self.state));
        }

        match self.run_inner(path.as_ref(), progress) {
            Ok(report) => {
                advance(&mut self.state, UpgradeState::Done);
                info!("Application updated");
                Ok(report)
            },
            Err(e) => {
                debug!("Upgrade stopped during {}", self.state);
                advance(&mut self.state, UpgradeState::Failed);
                Err(e)
            },
        }
    }

    fn run_inner<F>(&mut self, path: &Path, progress: F) -> Result<UpgradeReport>
    where
        F: FnMut(usize, usize),
    {
        let poll = self.config.poll;

        let initial_status =
            StatusChannel::new(&mut self.spi, &mut self.ready, poll).probe_status()?;
        info!("Initial status {initial_status}");

        enter_bootloader(&mut self.gpio, self.config.reset_line, &self.pulse_train)?;
        advance(&mut self.state, UpgradeState::BootloaderEntered);

        let mut channel = StatusChannel::new(&mut self.spi, &mut self.ready, poll);
        let extended_status = channel.read_extended_status()?;
        info!("Extended {extended_status}");

        let unlock_status = unlock(&mut channel)?;
        advance(&mut self.state, UpgradeState::Unlocked);

        info!("Write data...");
        advance(&mut self.state, UpgradeState::Transferring);
        let mut transfer = FrameTransfer::new(&mut channel);
        let bytes_transmitted = transfer.transfer_file(path, progress)?;

        Ok(UpgradeReport {
            initial_status,
            extended_status,
            unlock_status,
            bytes_transmitted,
            frames: transfer.frames_sent(),
        })
    }
}

fn advance(state: &mut UpgradeState, next: UpgradeState) {
    debug!("State {state} -> {next}");
    *state = next;
}

// Linux convenience constructor
#[cfg(feature = "linux")]
mod linux_impl {
    use super::{Result, UpgradeConfig, Upgrader};
    use crate::transport::{LinuxGpioChip, LinuxSpi, LinuxSpiConfig};

    impl Upgrader<LinuxSpi, LinuxGpioChip> {
        /// Open the spidev node described by `spi` and request the ready
        /// line on `gpio`.
        pub fn open(
            spi: &LinuxSpiConfig,
            gpio: LinuxGpioChip,
            config: UpgradeConfig,
        ) -> Result<Self> {
            let spi = LinuxSpi::open(spi)?;
            Self::new(spi, gpio, config)
        }
    }
}
