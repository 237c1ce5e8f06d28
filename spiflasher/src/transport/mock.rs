//! Simulated bootloader for unit tests.
//!
//! The SPI bus answers full-duplex transfers from a scripted queue of
//! status bytes; the GPIO chip serves the ready line from a scripted queue
//! of levels. Every operation lands in a shared event log so tests can
//! check ordering as well as content.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::transport::{GpioChip, InputLine, Level, OutputLine, SpiBus};

/// One observed transport operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Write(Vec<u8>),
    Transfer { tx: Vec<u8>, rx: Vec<u8> },
    RequestOutput { line: u32, initial: Level },
    RequestInput { line: u32 },
    SetLevel { line: u32, level: Level },
    ReadLevel { line: u32, level: Level },
    Free { line: u32 },
}

pub(crate) type EventLog = Rc<RefCell<Vec<Event>>>;

pub(crate) fn new_log() -> EventLog {
    Rc::new(RefCell::new(Vec::new()))
}

/// All write-only payloads in order.
pub(crate) fn writes(log: &EventLog) -> Vec<Vec<u8>> {
    log.borrow()
        .iter()
        .filter_map(|e| match e {
            Event::Write(data) => Some(data.clone()),
            _ => None,
        })
        .collect()
}

/// Number of full-duplex transfers.
pub(crate) fn transfer_count(log: &EventLog) -> usize {
    log.borrow()
        .iter()
        .filter(|e| matches!(e, Event::Transfer { .. }))
        .count()
}

pub(crate) struct MockSpi {
    log: EventLog,
    responses: VecDeque<u8>,
    fail_writes: bool,
}

impl MockSpi {
    pub(crate) fn new(log: &EventLog, responses: &[u8]) -> Self {
        Self {
            log: Rc::clone(log),
            responses: responses.iter().copied().collect(),
            fail_writes: false,
        }
    }

    pub(crate) fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub(crate) fn remaining_responses(&self) -> usize {
        self.responses.len()
    }
}

impl SpiBus for MockSpi {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.fail_writes {
            return Err(Error::SpiTransfer(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "simulated bus fault",
            )));
        }
        self.log.borrow_mut().push(Event::Write(data.to_vec()));
        Ok(())
    }

    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<()> {
        assert_eq!(tx.len(), rx.len(), "full-duplex buffers must match");
        for b in rx.iter_mut() {
            *b = self.responses.pop_front().unwrap_or(0x00);
        }
        self.log.borrow_mut().push(Event::Transfer {
            tx: tx.to_vec(),
            rx: rx.to_vec(),
        });
        Ok(())
    }
}

pub(crate) struct MockGpio {
    log: EventLog,
    ready_levels: Rc<RefCell<VecDeque<Level>>>,
    fail_line: Option<u32>,
    fail_sets: Vec<usize>,
}

impl MockGpio {
    pub(crate) fn new(log: &EventLog) -> Self {
        Self {
            log: Rc::clone(log),
            ready_levels: Rc::new(RefCell::new(VecDeque::new())),
            fail_line: None,
            fail_sets: Vec::new(),
        }
    }

    /// Levels the next input line reads before settling at `Low`.
    pub(crate) fn with_ready_levels(self, levels: &[Level]) -> Self {
        self.ready_levels.borrow_mut().extend(levels.iter().copied());
        self
    }

    /// Make requests for `line` fail.
    pub(crate) fn failing_line(mut self, line: u32) -> Self {
        self.fail_line = Some(line);
        self
    }

    /// Make output lines reject the listed `set_level` calls (zero-based).
    pub(crate) fn failing_sets(mut self, calls: &[usize]) -> Self {
        self.fail_sets = calls.to_vec();
        self
    }

    fn check_line(&self, line: u32) -> Result<()> {
        if self.fail_line == Some(line) {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("line {line} busy"),
            )));
        }
        Ok(())
    }
}

pub(crate) struct MockOutput {
    line: u32,
    log: EventLog,
    sets: usize,
    fail_sets: Vec<usize>,
}

pub(crate) struct MockInput {
    line: u32,
    log: EventLog,
    levels: Rc<RefCell<VecDeque<Level>>>,
    /// Level returned once the script is exhausted.
    idle: Level,
}

impl MockInput {
    pub(crate) fn stuck_high(log: &EventLog, line: u32) -> Self {
        Self {
            line,
            log: Rc::clone(log),
            levels: Rc::new(RefCell::new(VecDeque::new())),
            idle: Level::High,
        }
    }
}

impl GpioChip for MockGpio {
    type Output = MockOutput;
    type Input = MockInput;

    fn request_output(&mut self, line: u32, initial: Level) -> Result<MockOutput> {
        self.check_line(line)?;
        self.log
            .borrow_mut()
            .push(Event::RequestOutput { line, initial });
        Ok(MockOutput {
            line,
            log: Rc::clone(&self.log),
            sets: 0,
            fail_sets: self.fail_sets.clone(),
        })
    }

    fn request_input(&mut self, line: u32) -> Result<MockInput> {
        self.check_line(line)?;
        self.log.borrow_mut().push(Event::RequestInput { line });
        Ok(MockInput {
            line,
            log: Rc::clone(&self.log),
            levels: Rc::clone(&self.ready_levels),
            idle: Level::Low,
        })
    }
}

impl OutputLine for MockOutput {
    fn set_level(&mut self, level: Level) -> Result<()> {
        let call = self.sets;
        self.sets += 1;
        if self.fail_sets.contains(&call) {
            return Err(Error::Io(io::Error::other(format!(
                "line {} write failed",
                self.line
            ))));
        }
        self.log.borrow_mut().push(Event::SetLevel {
            line: self.line,
            level,
        });
        Ok(())
    }
}

impl Drop for MockOutput {
    fn drop(&mut self) {
        self.log.borrow_mut().push(Event::Free { line: self.line });
    }
}

impl InputLine for MockInput {
    fn level(&mut self) -> Result<Level> {
        let level = self.levels.borrow_mut().pop_front().unwrap_or(self.idle);
        self.log.borrow_mut().push(Event::ReadLevel {
            line: self.line,
            level,
        });
        Ok(level)
    }
}

impl Drop for MockInput {
    fn drop(&mut self) {
        self.log.borrow_mut().push(Event::Free { line: self.line });
    }
}
