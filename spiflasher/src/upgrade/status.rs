//! Status reads paced by the ready line.

use std::thread;
use std::time::{Duration, Instant};

use log::trace;

use crate::error::{Error, Result};
use crate::protocol::{ExtendedStatus, GET_EXT_STATUS_CMD, GET_STATUS_CMD, StatusByte};
use crate::transport::{InputLine, Level, SpiBus};

/// Default interval between ready-line samples.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_micros(100);

/// How the ready line is polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Sleep between samples.
    pub interval: Duration,
    /// Give up after this long. `None` waits forever.
    pub max_wait: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_wait: None,
        }
    }
}

impl PollConfig {
    /// Set the sample interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Bound the wait for the ready line.
    #[must_use]
    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }
}

/// Status reads over a borrowed bus and ready line.
///
/// The target pulls the ready line low when it can take the next
/// transaction; every paced read waits for that first.
pub struct StatusChannel<'a, S, R> {
    spi: &'a mut S,
    ready: &'a mut R,
    poll: PollConfig,
}

impl<'a, S: SpiBus, R: InputLine> StatusChannel<'a, S, R> {
    /// Create a channel over `spi`, paced by `ready`.
    pub fn new(spi: &'a mut S, ready: &'a mut R, poll: PollConfig) -> Self {
        Self { spi, ready, poll }
    }

    /// Block until the ready line reads low.
    ///
    /// Without `max_wait` this never returns for a target that stops
    /// responding.
    pub fn wait_ready(&mut self) -> Result<()> {
        let start = Instant::now();

        while self.ready.level()? == Level::High {
            if let Some(max_wait) = self.poll.max_wait {
                if start.elapsed() >= max_wait {
                    return Err(Error::Timeout(format!(
                        "device not ready after {} ms",
                        max_wait.as_millis()
                    )));
                }
            }
            thread::sleep(self.poll.interval);
        }

        Ok(())
    }

    /// Read one status byte without waiting for the ready line.
    pub fn probe_status(&mut self) -> Result<StatusByte> {
        let mut rx = [0u8; GET_STATUS_CMD.len()];
        self.spi.transfer(&GET_STATUS_CMD, &mut rx)?;
        let status = StatusByte(rx[0]);
        trace!("status {status}");
        Ok(status)
    }

    /// Wait for ready, then read one status byte.
    pub fn read_status(&mut self) -> Result<StatusByte> {
        self.wait_ready()?;
        self.probe_status()
    }

    /// Wait for ready, then read the three-byte extended status.
    pub fn read_extended_status(&mut self) -> Result<ExtendedStatus> {
        self.wait_ready()?;
        let mut rx = [0u8; GET_EXT_STATUS_CMD.len()];
        self.spi.transfer(&GET_EXT_STATUS_CMD, &mut rx)?;
        Ok(ExtendedStatus::from(rx))
    }

    /// Write-only transfer on the underlying bus.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.spi.write(data)
    }
}
