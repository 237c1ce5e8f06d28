//! Reset pulse train that drops the target into its bootloader.
//!
//! The target's firmware watches its reset line after power-up; a specific
//! number of short low pulses inside its sampling window makes it stay in
//! the bootloader instead of starting the application. The timing below is
//! part of that hardware contract and is not tunable.

use std::thread;
use std::time::Duration;

use log::{debug, info, trace, warn};

use crate::error::Result;
use crate::transport::{GpioChip, Level, OutputLine};

/// Initial high hold before the pulses start.
pub const INITIAL_HOLD: Duration = Duration::from_millis(50);

/// Number of low/high cycles.
pub const PULSE_COUNT: usize = 10;

/// Length of each low pulse.
pub const PULSE_LOW: Duration = Duration::from_millis(2);

/// High time after each low pulse.
pub const PULSE_HIGH: Duration = Duration::from_millis(60);

/// Delay after releasing the line before the bootloader is addressed.
pub const SETTLE: Duration = Duration::from_millis(200);

/// One step of the pulse train.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulse {
    /// Level to drive.
    pub level: Level,
    /// How long to hold it.
    pub hold: Duration,
}

impl Pulse {
    const fn new(level: Level, hold: Duration) -> Self {
        Self { level, hold }
    }
}

/// Ordered level/duration steps applied to the reset line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulseTrain {
    pulses: Vec<Pulse>,
    settle: Duration,
}

impl Default for PulseTrain {
    fn default() -> Self {
        Self::bootloader_entry()
    }
}

impl PulseTrain {
    /// Build a train from explicit steps.
    ///
    /// The last step should leave the line high, since the line is
    /// released in whatever state the train ends in.
    pub fn new(pulses: Vec<Pulse>, settle: Duration) -> Self {
        Self { pulses, settle }
    }

    /// The sequence the bootloader expects: HIGH 50 ms, then ten
    /// (LOW 2 ms, HIGH 60 ms) cycles, then 200 ms settle.
    pub fn bootloader_entry() -> Self {
        let mut pulses = Vec::with_capacity(1 + 2 * PULSE_COUNT);
        pulses.push(Pulse::new(Level::High, INITIAL_HOLD));
        for _ in 0..PULSE_COUNT {
            pulses.push(Pulse::new(Level::Low, PULSE_LOW));
            pulses.push(Pulse::new(Level::High, PULSE_HIGH));
        }
        Self::new(pulses, SETTLE)
    }

    /// Steps in order.
    pub fn pulses(&self) -> &[Pulse] {
        &self.pulses
    }

    /// Delay after the line is released.
    pub fn settle(&self) -> Duration {
        self.settle
    }

    /// Time the line is held before release.
    pub fn hold_time(&self) -> Duration {
        self.pulses.iter().map(|p| p.hold).sum()
    }
}

/// Reset the target into its bootloader.
///
/// Requests `reset_line` as an output, plays `train` on it, then frees the
/// line and waits for the settle time. If driving the line fails part-way,
/// the line is pulled back high before it is freed and the error is
/// returned.
pub fn enter_bootloader<G: GpioChip>(
    gpio: &mut G,
    reset_line: u32,
    train: &PulseTrain,
) -> Result<()> {
    info!("Starting bootloader");

    let mut pin = gpio.request_output(reset_line, Level::High)?;
    let result = play(&mut pin, train);
    if result.is_err() {
        if let Err(e) = pin.set_level(Level::High) {
            warn!("Failed to restore reset line {reset_line} high: {e}");
        }
    }
    drop(pin);
    result?;

    debug!("Reset line {reset_line} released, settling");
    thread::sleep(train.settle());
    Ok(())
}

fn play<L: OutputLine>(pin: &mut L, train: &PulseTrain) -> Result<()> {
    for pulse in train.pulses() {
        trace!("reset {} for {:?}", pulse.level, pulse.hold);
        pin.set_level(pulse.level)?;
        thread::sleep(pulse.hold);
    }
    Ok(())
}
