//! Channel generator: the per-channel real-time loop.
//!
//! [`ChannelGenerator::step`] advances exactly one slot. It is the software twin of the PIO
//! programs in the firmware and follows the same rules:
//!
//! - Parameters change only at a frame boundary. The mailbox is looked at once per frame, in
//!   the first slot, and nowhere else.
//! - A frame is the two spans of the active word back to back. A zero-length span is skipped,
//!   it does not produce a pulse.
//! - Without a new word the previous one is reused.
//! - Stopping is noticed at the next boundary, so it takes at most one frame. The pin is then
//!   driven LOW and stays there.
//!
//! `step` never blocks, never allocates and never logs.

use core::convert::Infallible;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embedded_hal::digital::v2::{InputPin, OutputPin};

use crate::codec::{FrameWord, Level, Polarity, Span};
use crate::mailbox::Adopter;

/// Run control for one generator, written by the control domain.
///
/// `arm` starts a new epoch. A generator that sees an epoch it has not seen before drops
/// whatever it was doing and parks in `WAIT_SYNC`, so re-arming cannot be lost even if it races
/// a halt.
pub struct Activation {
    epoch: AtomicU32,
    active: AtomicBool,
    parked: AtomicU32,
}

impl Activation {
    pub const fn new() -> Self {
        Self {
            epoch: AtomicU32::new(0),
            active: AtomicBool::new(false),
            parked: AtomicU32::new(0),
        }
    }

    /// Single writer only: the epoch bump is a plain load/store.
    pub fn arm(&self) {
        let next = self.epoch.load(Ordering::SeqCst).wrapping_add(1);
        self.epoch.store(next, Ordering::SeqCst);
        self.active.store(true, Ordering::SeqCst);
    }

    pub fn disarm(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn epoch(&self) -> u32 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// True once the generator has reached `WAIT_SYNC` in the current epoch. Stays true after
    /// the sync edge lets it run, until the next `arm`.
    pub fn parked_this_epoch(&self) -> bool {
        self.is_active() && self.parked.load(Ordering::SeqCst) == self.epoch()
    }

    fn park(&self, epoch: u32) {
        self.parked.store(epoch, Ordering::SeqCst);
    }
}

impl Default for Activation {
    fn default() -> Self {
        Self::new()
    }
}

/// One emitted slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slot {
    pub level: Level,
    /// First slot of a frame.
    pub frame_start: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Stopped,
    WaitSync,
    Running { spans: [Span; 2], slot: u32 },
}

impl State {
    fn at_boundary(&self) -> bool {
        match self {
            State::Stopped | State::WaitSync => true,
            State::Running { spans, slot } => *slot >= frame_len(spans),
        }
    }
}

fn frame_len(spans: &[Span; 2]) -> u32 {
    spans[0].slots as u32 + spans[1].slots as u32
}

pub struct ChannelGenerator<'a, P, S> {
    polarity: Polarity,
    pin: P,
    sync: Option<S>,
    mailbox: Adopter<'a>,
    activation: &'a Activation,
    active: FrameWord,
    state: State,
    seen_epoch: u32,
    frames: u32,
}

impl<'a, P, S> ChannelGenerator<'a, P, S>
where
    P: OutputPin<Error = Infallible>,
    S: InputPin<Error = Infallible>,
{
    /// A stopped generator. It parks once `activation` is armed.
    ///
    /// With `sync` set the first frame waits for the line to go high; without it the generator
    /// runs as soon as it is armed.
    pub fn new(
        polarity: Polarity,
        pin: P,
        sync: Option<S>,
        mailbox: Adopter<'a>,
        activation: &'a Activation,
        initial: FrameWord,
    ) -> Self {
        let mut generator = Self {
            polarity,
            pin,
            sync,
            mailbox,
            activation,
            active: initial,
            state: State::Stopped,
            seen_epoch: activation.epoch(),
            frames: 0,
        };
        generator.drive(Level::Low);
        generator
    }

    /// Advance one slot. `None` while parked, stopped, or without a usable word.
    pub fn step(&mut self) -> Option<Slot> {
        let mut frame_start = false;
        if self.state.at_boundary() {
            if !self.at_frame_boundary() {
                return None;
            }
            self.begin_frame();
            frame_start = true;
        }

        let State::Running { spans, slot } = &mut self.state else {
            return None;
        };
        if frame_len(spans) == 0 {
            // No usable word yet; like a blocking pull, try again next slot.
            return None;
        }
        let level = if *slot < spans[0].slots as u32 {
            spans[0].level
        } else {
            spans[1].level
        };
        *slot += 1;
        self.drive(level);
        if frame_start {
            self.frames = self.frames.wrapping_add(1);
        }
        Some(Slot { level, frame_start })
    }

    /// Boundary bookkeeping. Returns whether a frame should begin now.
    fn at_frame_boundary(&mut self) -> bool {
        if !self.activation.is_active() {
            self.quiesce();
            return false;
        }
        let epoch = self.activation.epoch();
        if epoch != self.seen_epoch {
            self.seen_epoch = epoch;
            self.drive(Level::Low);
            self.state = State::WaitSync;
            self.frames = 0;
            self.activation.park(epoch);
        }
        match self.state {
            State::Stopped => false,
            State::WaitSync => self.sync_released(),
            State::Running { .. } => true,
        }
    }

    fn sync_released(&self) -> bool {
        match &self.sync {
            Some(line) => line.is_high().unwrap_or_else(|e| match e {}),
            None => true,
        }
    }

    fn begin_frame(&mut self) {
        if let Some(word) = self.mailbox.take() {
            if word.total() > 0 {
                self.active = word;
            }
        }
        self.state = State::Running {
            spans: self.polarity.spans(self.active),
            slot: 0,
        };
    }

    fn quiesce(&mut self) {
        if self.state != State::Stopped {
            self.drive(Level::Low);
            self.state = State::Stopped;
        }
    }

    fn drive(&mut self, level: Level) {
        match level {
            Level::High => self.pin.set_high(),
            Level::Low => self.pin.set_low(),
        }
        .unwrap_or_else(|e| match e {})
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running { .. })
    }

    /// Word of the frame currently being emitted.
    pub fn active_word(&self) -> FrameWord {
        self.active
    }

    /// Frames begun since the last arm.
    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn pin(&self) -> &P {
        &self.pin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Channel;
    use crate::mailbox::Mailbox;
    use crate::sync::{LineProbe, SyncLine};

    #[derive(Default)]
    struct TestPin {
        level: Option<Level>,
        writes: usize,
    }

    impl OutputPin for TestPin {
        type Error = Infallible;

        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.level = Some(Level::Low);
            self.writes += 1;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.level = Some(Level::High);
            self.writes += 1;
            Ok(())
        }
    }

    fn collect_frame<S: InputPin<Error = Infallible>>(
        generator: &mut ChannelGenerator<'_, TestPin, S>,
        slots: usize,
    ) -> Vec<Level> {
        (0..slots)
            .map(|_| generator.step().expect("running").level)
            .collect()
    }

    fn pattern(first: (Level, usize), second: (Level, usize)) -> Vec<Level> {
        let mut v = vec![first.0; first.1];
        v.extend(std::iter::repeat(second.0).take(second.1));
        v
    }

    #[test]
    fn stays_stopped_until_armed() {
        let mut mailbox = Mailbox::new();
        let (_poster, adopter) = mailbox.split();
        let activation = Activation::new();
        let mut generator = ChannelGenerator::new(
            Polarity::HighFirst,
            TestPin::default(),
            None::<LineProbe>,
            adopter,
            &activation,
            Channel::Start.word(1, 10),
        );
        assert_eq!(generator.step(), None);
        assert_eq!(generator.state(), State::Stopped);
        assert_eq!(generator.pin().level, Some(Level::Low));
    }

    #[test]
    fn free_running_high_first_frame() {
        let mut mailbox = Mailbox::new();
        let (_poster, adopter) = mailbox.split();
        let activation = Activation::new();
        let mut generator = ChannelGenerator::new(
            Polarity::HighFirst,
            TestPin::default(),
            None::<LineProbe>,
            adopter,
            &activation,
            Channel::Start.word(3, 10),
        );
        activation.arm();
        let first = generator.step().unwrap();
        assert!(first.frame_start);
        let mut frame = vec![first.level];
        frame.extend(collect_frame(&mut generator, 9));
        assert_eq!(frame, pattern((Level::High, 3), (Level::Low, 7)));
        assert!(generator.step().unwrap().frame_start);
        assert_eq!(generator.frames(), 2);
    }

    #[test]
    fn low_first_frame_and_skipped_span() {
        let mut mailbox = Mailbox::new();
        let (mut poster, adopter) = mailbox.split();
        let activation = Activation::new();
        let mut generator = ChannelGenerator::new(
            Polarity::LowFirst,
            TestPin::default(),
            None::<LineProbe>,
            adopter,
            &activation,
            Channel::Stop.word(4, 10),
        );
        activation.arm();
        assert_eq!(
            collect_frame(&mut generator, 10),
            pattern((Level::Low, 4), (Level::High, 6))
        );

        poster.post(Channel::Stop.word(0, 10));
        assert_eq!(collect_frame(&mut generator, 10), vec![Level::High; 10]);
    }

    #[test]
    fn waits_for_sync_level() {
        let line = SyncLine::new();
        let mut mailbox = Mailbox::new();
        let (_poster, adopter) = mailbox.split();
        let activation = Activation::new();
        let mut generator = ChannelGenerator::new(
            Polarity::HighFirst,
            TestPin::default(),
            Some(line.probe()),
            adopter,
            &activation,
            Channel::Start.word(1, 5),
        );
        activation.arm();
        for _ in 0..20 {
            assert_eq!(generator.step(), None);
        }
        assert_eq!(generator.state(), State::WaitSync);
        assert!(activation.parked_this_epoch());

        let mut driver = line.driver();
        driver.set_high().unwrap();
        let slot = generator.step().unwrap();
        assert!(slot.frame_start);
        assert_eq!(slot.level, Level::High);
        assert!(activation.parked_this_epoch());
        for _ in 1..6 {
            assert!(generator.step().is_some());
        }

        activation.arm();
        assert!(!activation.parked_this_epoch());
        driver.set_low().unwrap();
        assert_eq!(generator.step(), None);
        assert!(activation.parked_this_epoch());
    }

    #[test]
    fn mid_frame_update_waits_for_boundary() {
        let mut mailbox = Mailbox::new();
        let (mut poster, adopter) = mailbox.split();
        let activation = Activation::new();
        let mut generator = ChannelGenerator::new(
            Polarity::HighFirst,
            TestPin::default(),
            None::<LineProbe>,
            adopter,
            &activation,
            Channel::Start.word(2, 8),
        );
        activation.arm();
        let mut frame = collect_frame(&mut generator, 3);
        poster.post(Channel::Start.word(6, 8));
        frame.extend(collect_frame(&mut generator, 5));
        assert_eq!(frame, pattern((Level::High, 2), (Level::Low, 6)));

        assert_eq!(
            collect_frame(&mut generator, 8),
            pattern((Level::High, 6), (Level::Low, 2))
        );
        assert_eq!(generator.active_word(), Channel::Start.word(6, 8));
    }

    #[test]
    fn disarm_takes_effect_at_boundary_and_leaves_pin_low() {
        let mut mailbox = Mailbox::new();
        let (_poster, adopter) = mailbox.split();
        let activation = Activation::new();
        let mut generator = ChannelGenerator::new(
            Polarity::LowFirst,
            TestPin::default(),
            None::<LineProbe>,
            adopter,
            &activation,
            Channel::Stop.word(2, 6),
        );
        activation.arm();
        collect_frame(&mut generator, 4);
        activation.disarm();
        // Rest of the frame still goes out.
        assert_eq!(collect_frame(&mut generator, 2), vec![Level::High; 2]);
        assert_eq!(generator.step(), None);
        assert_eq!(generator.state(), State::Stopped);
        assert_eq!(generator.pin().level, Some(Level::Low));
    }

    #[test]
    fn rearm_parks_again() {
        let line = SyncLine::new();
        let mut driver = line.driver();
        let mut mailbox = Mailbox::new();
        let (_poster, adopter) = mailbox.split();
        let activation = Activation::new();
        let mut generator = ChannelGenerator::new(
            Polarity::HighFirst,
            TestPin::default(),
            Some(line.probe()),
            adopter,
            &activation,
            Channel::Start.word(1, 4),
        );
        activation.arm();
        driver.set_high().unwrap();
        collect_frame(&mut generator, 6);

        driver.set_low().unwrap();
        activation.arm();
        collect_frame(&mut generator, 2);
        assert_eq!(generator.step(), None);
        assert_eq!(generator.state(), State::WaitSync);
        assert_eq!(generator.frames(), 0);
    }

    #[test]
    fn degenerate_word_is_not_adopted() {
        let mut mailbox = Mailbox::new();
        let (mut poster, adopter) = mailbox.split();
        let activation = Activation::new();
        let mut generator = ChannelGenerator::new(
            Polarity::HighFirst,
            TestPin::default(),
            None::<LineProbe>,
            adopter,
            &activation,
            FrameWord::encode(0, 0),
        );
        activation.arm();
        assert_eq!(generator.step(), None);
        poster.post(FrameWord::encode(3, 1));
        assert_eq!(
            collect_frame(&mut generator, 4),
            pattern((Level::High, 1), (Level::Low, 3))
        );
        poster.post(FrameWord::encode(0, 0));
        assert_eq!(
            collect_frame(&mut generator, 4),
            pattern((Level::High, 1), (Level::Low, 3))
        );
    }
}
