//! Linux transport: spidev for the bus, the GPIO character device for pins.
//!
//! The SPI side drives `/dev/spidevB.C` through `SPI_IOC_*` ioctls. The GPIO
//! side requests individual lines from `/dev/gpiochipN` with `gpiocdev`;
//! each line is its own request so it can be freed independently.

#![allow(unsafe_code)]

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;

use gpiocdev::line::{Offset, Value};
use gpiocdev::request::{Config, Request};
use log::{debug, info, trace};

use crate::error::{Error, Result};
use crate::protocol::{SPI_BITS_PER_WORD, SPI_MODE, SPI_SPEED_HZ};
use crate::transport::{GpioChip, InputLine, Level, OutputLine, SpiBus};

/// Default spidev node (bus 1, chip select 0).
pub const DEFAULT_SPI_DEVICE: &str = "/dev/spidev1.0";

/// Default GPIO character device.
pub const DEFAULT_GPIO_CHIP: &str = "/dev/gpiochip0";

/// Consumer label attached to requested GPIO lines.
const GPIO_CONSUMER: &str = "spiflasher";

/// spidev ioctl definitions.
mod ioctl {
    use nix::ioctl_write_ptr;

    const SPI_IOC_MAGIC: u8 = b'k';

    const SPI_IOC_TYPE_MODE: u8 = 1;
    const SPI_IOC_TYPE_BITS_PER_WORD: u8 = 3;
    const SPI_IOC_TYPE_MAX_SPEED_HZ: u8 = 4;

    ioctl_write_ptr!(spi_ioc_wr_mode, SPI_IOC_MAGIC, SPI_IOC_TYPE_MODE, u8);
    ioctl_write_ptr!(
        spi_ioc_wr_bits_per_word,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_BITS_PER_WORD,
        u8
    );
    ioctl_write_ptr!(
        spi_ioc_wr_max_speed_hz,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_MAX_SPEED_HZ,
        u32
    );

    /// Size of `struct spi_ioc_transfer`.
    pub const SPI_IOC_TRANSFER_SIZE: usize = 32;

    /// `SPI_IOC_MESSAGE(n)` = `_IOW(SPI_IOC_MAGIC, 0, char[n * sizeof(spi_ioc_transfer)])`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn spi_ioc_message(n: u8) -> libc::c_ulong {
        let size = (n as usize) * SPI_IOC_TRANSFER_SIZE;
        ((1u32 << 30) | ((size as u32) << 16) | (u32::from(SPI_IOC_MAGIC) << 8)) as libc::c_ulong
    }
}

/// Kernel `struct spi_ioc_transfer`.
#[repr(C)]
#[derive(Debug, Default, Clone)]
struct SpiIocTransfer {
    tx_buf: u64,
    rx_buf: u64,
    len: u32,
    speed_hz: u32,
    delay_usecs: u16,
    bits_per_word: u8,
    cs_change: u8,
    tx_nbits: u8,
    rx_nbits: u8,
    word_delay_usecs: u8,
    _pad: u8,
}

/// Configuration for opening a spidev node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinuxSpiConfig {
    /// Device path (e.g. "/dev/spidev1.0").
    pub device: String,
    /// Clock rate in Hz.
    pub speed_hz: u32,
    /// SPI mode (0-3).
    pub mode: u8,
}

impl Default for LinuxSpiConfig {
    fn default() -> Self {
        Self {
            device: DEFAULT_SPI_DEVICE.to_string(),
            speed_hz: SPI_SPEED_HZ,
            mode: SPI_MODE,
        }
    }
}

impl LinuxSpiConfig {
    /// Create a configuration for `device` with the bootloader's bus settings.
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Default::default()
        }
    }

    /// Set the clock rate in Hz.
    #[must_use]
    pub fn with_speed(mut self, speed_hz: u32) -> Self {
        self.speed_hz = speed_hz;
        self
    }

    /// Set the SPI mode (0-3).
    #[must_use]
    pub fn with_mode(mut self, mode: u8) -> Self {
        self.mode = mode;
        self
    }
}

/// SPI bus backed by a spidev node.
///
/// The device is closed when the value is dropped.
#[derive(Debug)]
pub struct LinuxSpi {
    file: File,
    device: String,
    speed_hz: u32,
}

impl LinuxSpi {
    /// Open and configure a spidev node.
    pub fn open(config: &LinuxSpiConfig) -> Result<Self> {
        if config.device.is_empty() {
            return Err(Error::Config("no SPI device specified".into()));
        }
        if config.mode > 3 {
            return Err(Error::Config(format!(
                "invalid SPI mode {} (must be 0-3)",
                config.mode
            )));
        }
        if config.speed_hz == 0 {
            return Err(Error::Config("SPI clock rate must be non-zero".into()));
        }

        debug!("Opening SPI device {}", config.device);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&config.device)
            .map_err(|e| Error::SpiOpen {
                path: config.device.clone(),
                source: e,
            })?;
        let fd = file.as_raw_fd();

        let mode = config.mode;
        unsafe { ioctl::spi_ioc_wr_mode(fd, &mode) }.map_err(|e| Error::SpiConfig {
            setting: "mode",
            value: u32::from(mode),
            source: e.into(),
        })?;

        let bits = SPI_BITS_PER_WORD;
        unsafe { ioctl::spi_ioc_wr_bits_per_word(fd, &bits) }.map_err(|e| Error::SpiConfig {
            setting: "bits per word",
            value: u32::from(bits),
            source: e.into(),
        })?;

        let speed = config.speed_hz;
        unsafe { ioctl::spi_ioc_wr_max_speed_hz(fd, &speed) }.map_err(|e| Error::SpiConfig {
            setting: "clock rate",
            value: speed,
            source: e.into(),
        })?;

        info!(
            "Opened {} (mode={}, speed={} kHz, {} bits)",
            config.device,
            mode,
            speed / 1000,
            bits
        );

        Ok(Self {
            file,
            device: config.device.clone(),
            speed_hz: speed,
        })
    }

    /// Device path this bus was opened from.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Current clock rate in Hz.
    pub fn speed_hz(&self) -> u32 {
        self.speed_hz
    }

    /// Issue a single `SPI_IOC_MESSAGE(1)`.
    #[allow(clippy::cast_possible_truncation)]
    fn message(&mut self, tx: &[u8], rx: Option<&mut [u8]>) -> Result<()> {
        let len = u32::try_from(tx.len())
            .map_err(|_| Error::Config(format!("SPI transfer of {} bytes too long", tx.len())))?;

        let transfer = SpiIocTransfer {
            tx_buf: tx.as_ptr() as u64,
            rx_buf: rx.map_or(0, |buf| buf.as_mut_ptr() as u64),
            len,
            speed_hz: self.speed_hz,
            bits_per_word: SPI_BITS_PER_WORD,
            ..Default::default()
        };

        let ret = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                ioctl::spi_ioc_message(1),
                &raw const transfer,
            )
        };
        if ret < 0 {
            return Err(Error::SpiTransfer(std::io::Error::last_os_error()));
        }

        Ok(())
    }
}

impl SpiBus for LinuxSpi {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        trace!("SPI write {} bytes", data.len());
        self.message(data, None)
    }

    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<()> {
        if tx.len() != rx.len() {
            return Err(Error::Config(format!(
                "full-duplex transfer length mismatch: tx {} bytes, rx {} bytes",
                tx.len(),
                rx.len()
            )));
        }
        self.message(tx, Some(rx))?;
        trace!("SPI transfer {tx:02X?} -> {rx:02X?}");
        Ok(())
    }
}

impl From<Level> for Value {
    fn from(level: Level) -> Self {
        match level {
            Level::Low => Value::Inactive,
            Level::High => Value::Active,
        }
    }
}

impl From<Value> for Level {
    fn from(value: Value) -> Self {
        match value {
            Value::Inactive => Level::Low,
            Value::Active => Level::High,
        }
    }
}

/// GPIO chip reached through its character device.
#[derive(Debug, Clone)]
pub struct LinuxGpioChip {
    path: String,
}

impl LinuxGpioChip {
    /// Use the chip at `path` (e.g. "/dev/gpiochip0").
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Chip device path.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn request(&self, config: Config) -> Result<Request> {
        Ok(Request::from_config(config)
            .on_chip(&self.path)
            .with_consumer(GPIO_CONSUMER)
            .request()?)
    }
}

impl Default for LinuxGpioChip {
    fn default() -> Self {
        Self::new(DEFAULT_GPIO_CHIP)
    }
}

/// Output line held by a `gpiocdev` request; freed on drop.
pub struct LinuxOutputLine {
    request: Request,
    offset: Offset,
}

/// Input line held by a `gpiocdev` request; freed on drop.
pub struct LinuxInputLine {
    request: Request,
    offset: Offset,
}

impl GpioChip for LinuxGpioChip {
    type Output = LinuxOutputLine;
    type Input = LinuxInputLine;

    fn request_output(&mut self, line: u32, initial: Level) -> Result<LinuxOutputLine> {
        let mut config = Config::default();
        config.with_line(line).as_output(initial.into());
        let request = self.request(config)?;
        debug!("Requested {}:{line} as output ({initial})", self.path);
        Ok(LinuxOutputLine {
            request,
            offset: line,
        })
    }

    fn request_input(&mut self, line: u32) -> Result<LinuxInputLine> {
        let mut config = Config::default();
        config.with_line(line).as_input();
        let request = self.request(config)?;
        debug!("Requested {}:{line} as input", self.path);
        Ok(LinuxInputLine {
            request,
            offset: line,
        })
    }
}

impl OutputLine for LinuxOutputLine {
    fn set_level(&mut self, level: Level) -> Result<()> {
        trace!("GPIO {} -> {level}", self.offset);
        self.request.set_value(self.offset, level.into())?;
        Ok(())
    }
}

impl InputLine for LinuxInputLine {
    fn level(&mut self) -> Result<Level> {
        Ok(self.request.value(self.offset)?.into())
    }
}
