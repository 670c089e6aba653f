//! Synchronizer: a shared line whose LOW->HIGH edge gives both generators a common frame zero.
//!
//! Generators park in `WAIT_SYNC` sampling the line (the PIO does `wait 1 pin 0`). The
//! synchronizer drives the line low before the generators are armed, then raises it once.

use core::convert::Infallible;
use core::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::blocking::delay::DelayUs;
use embedded_hal::digital::v2::{InputPin, OutputPin};

/// Software sync line, for running generators without hardware.
pub struct SyncLine {
    level: AtomicBool,
}

impl SyncLine {
    pub const fn new() -> Self {
        Self {
            level: AtomicBool::new(false),
        }
    }

    pub fn is_high(&self) -> bool {
        self.level.load(Ordering::Acquire)
    }

    /// Writing end. There should only ever be one, owned by the [`Synchronizer`].
    pub fn driver(&self) -> LineDriver<'_> {
        LineDriver { line: self }
    }

    /// Reading end, one per generator.
    pub fn probe(&self) -> LineProbe<'_> {
        LineProbe { line: self }
    }
}

impl Default for SyncLine {
    fn default() -> Self {
        Self::new()
    }
}

pub struct LineDriver<'a> {
    line: &'a SyncLine,
}

impl OutputPin for LineDriver<'_> {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.line.level.store(false, Ordering::Release);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.line.level.store(true, Ordering::Release);
        Ok(())
    }
}

#[derive(Clone, Copy)]
pub struct LineProbe<'a> {
    line: &'a SyncLine,
}

impl InputPin for LineProbe<'_> {
    type Error = Infallible;

    fn is_high(&self) -> Result<bool, Self::Error> {
        Ok(self.line.is_high())
    }

    fn is_low(&self) -> Result<bool, Self::Error> {
        Ok(!self.line.is_high())
    }
}

/// Drives the sync line through the arm / release sequence.
pub struct Synchronizer<P, D> {
    line: P,
    delay: D,
    settle_us: u32,
    hold_us: u32,
    return_low: bool,
}

impl<P, D> Synchronizer<P, D>
where
    P: OutputPin<Error = Infallible>,
    D: DelayUs<u32>,
{
    /// `settle_us` is waited between arming and the edge, `hold_us` is how long the line stays
    /// high before it is returned low.
    pub fn new(line: P, delay: D, settle_us: u32, hold_us: u32) -> Self {
        Self {
            line,
            delay,
            settle_us,
            hold_us,
            return_low: true,
        }
    }

    /// Leave the line high after the edge instead of returning it low.
    ///
    /// Needed when generators sample the line at an unpredictable rate (threads), so a late
    /// sampler still sees the level.
    pub fn latched(mut self) -> Self {
        self.return_low = false;
        self
    }

    /// Hold the line low so freshly armed generators park.
    pub fn arm(&mut self) {
        self.line.set_low().unwrap_or_else(|e| match e {});
    }

    /// Raise the line once. Both parked generators start on this edge.
    pub fn release(&mut self) {
        self.delay.delay_us(self.settle_us);
        self.line.set_high().unwrap_or_else(|e| match e {});
        self.delay.delay_us(self.hold_us);
        if self.return_low {
            self.line.set_low().unwrap_or_else(|e| match e {});
        }
    }
}
