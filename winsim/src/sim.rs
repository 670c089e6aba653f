//! Software bench: both channel generators on their own OS threads.
//!
//! Each thread steps its generator once per slot against an absolute schedule
//! (`origin + n * period`), so the two threads cannot drift apart. The control side talks to
//! them only through the mailboxes, the activations and the sync line, the same way it talks
//! to the PIO on hardware.

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use embedded_hal::blocking::delay::DelayUs;
use embedded_hal::digital::v2::OutputPin;
use tracing::{debug, warn};
use window::{
    Activation, Backend, Channel, ChannelGenerator, FrameWord, Level, LineDriver, LineProbe,
    Mailbox, Poster, SyncLine, Synchronizer,
};

/// A pin that remembers its level and counts rising edges.
#[derive(Debug, Default)]
pub struct VirtualPin {
    high: bool,
    rising_edges: u64,
}

impl VirtualPin {
    pub fn is_high(&self) -> bool {
        self.high
    }

    pub fn rising_edges(&self) -> u64 {
        self.rising_edges
    }
}

impl OutputPin for VirtualPin {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        if !self.high {
            self.rising_edges += 1;
        }
        self.high = true;
        Ok(())
    }
}

pub struct StdDelay;

impl DelayUs<u32> for StdDelay {
    fn delay_us(&mut self, us: u32) {
        thread::sleep(Duration::from_micros(us as u64));
    }
}

pub type SimGenerator<'a> = ChannelGenerator<'a, VirtualPin, LineProbe<'a>>;

/// Everything the two domains share.
pub struct Bench {
    line: SyncLine,
    mailboxes: [Mailbox; 2],
    activations: [Activation; 2],
    shutdown: AtomicBool,
}

pub struct Wiring<'a> {
    pub backend: SoftBackend<'a>,
    /// START, STOP
    pub generators: [SimGenerator<'a>; 2],
    pub shutdown: &'a AtomicBool,
}

impl Bench {
    pub fn new() -> Self {
        Self {
            line: SyncLine::new(),
            mailboxes: [Mailbox::new(), Mailbox::new()],
            activations: [Activation::new(), Activation::new()],
            shutdown: AtomicBool::new(false),
        }
    }

    /// Connect generators and backend. With `synchronized` unset the generators ignore the sync
    /// line and start as soon as they are armed.
    pub fn wire(&mut self, synchronized: bool, park_timeout: Duration) -> Wiring<'_> {
        let Bench {
            line,
            mailboxes,
            activations,
            shutdown,
        } = self;
        let [start_box, stop_box] = mailboxes;
        let [start_run, stop_run] = &*activations;
        let (start_post, start_take) = start_box.split();
        let (stop_post, stop_take) = stop_box.split();
        let probe = synchronized.then(|| line.probe());

        let generators = [
            ChannelGenerator::new(
                Channel::Start.polarity(),
                VirtualPin::default(),
                probe,
                start_take,
                start_run,
                FrameWord::default(),
            ),
            ChannelGenerator::new(
                Channel::Stop.polarity(),
                VirtualPin::default(),
                probe,
                stop_take,
                stop_run,
                FrameWord::default(),
            ),
        ];
        Wiring {
            backend: SoftBackend {
                posters: [start_post, stop_post],
                activations: [start_run, stop_run],
                // Threads sample the line whenever they get scheduled, a pulse could be missed.
                sync: Synchronizer::new(
                    line.driver(),
                    StdDelay,
                    config::SYNC_SETTLE_MICROS,
                    config::SYNC_HOLD_MICROS,
                )
                .latched(),
                park_timeout,
            },
            generators,
            shutdown,
        }
    }
}

impl Default for Bench {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SoftBackend<'a> {
    posters: [Poster<'a>; 2],
    activations: [&'a Activation; 2],
    sync: Synchronizer<LineDriver<'a>, StdDelay>,
    park_timeout: Duration,
}

impl SoftBackend<'_> {
    fn parked(&self) -> bool {
        self.activations.iter().all(|a| a.parked_this_epoch())
    }

    /// Block until both generators sit in `WAIT_SYNC`, at most one park timeout.
    fn wait_parked(&self) -> bool {
        let deadline = Instant::now() + self.park_timeout;
        while !self.parked() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_micros(100));
        }
        true
    }
}

impl Backend for SoftBackend<'_> {
    fn stage(&mut self, channel: Channel, word: FrameWord) {
        self.posters[channel.index()].post(word);
    }

    fn arm(&mut self) {
        self.sync.arm();
        for activation in self.activations {
            activation.arm();
        }
    }

    fn release(&mut self) {
        if !self.wait_parked() {
            warn!(
                "generators not parked after {:?}, releasing anyway",
                self.park_timeout
            );
        }
        self.sync.release();
    }

    fn halt(&mut self) {
        for activation in self.activations {
            activation.disarm();
        }
    }
}

/// Shared slot schedule.
#[derive(Clone, Copy, Debug)]
pub struct SlotClock {
    origin: Instant,
    period: Duration,
}

impl SlotClock {
    pub fn new(period: Duration) -> Self {
        Self {
            origin: Instant::now(),
            period,
        }
    }

    /// Sleep until slot `n` is due. Returns immediately when running late.
    pub fn wait_for(&self, n: u64) {
        let due = self.origin + Duration::from_nanos(self.period.as_nanos() as u64 * n);
        let now = Instant::now();
        if due > now {
            thread::sleep(due - now);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaneReport {
    pub channel: Channel,
    pub frames: u64,
    /// Frames whose length was not `max_slots`.
    pub torn_frames: u64,
    /// (HIGH, LOW) slots of the last complete frame.
    pub last_frame: Option<(u32, u32)>,
    pub rising_edges: u64,
    pub high_at_exit: bool,
}

impl LaneReport {
    fn close(&mut self, frame: (u32, u32), max_slots: u16) {
        self.frames += 1;
        if frame.0 + frame.1 != max_slots as u32 {
            self.torn_frames += 1;
            warn!(
                "{} frame {} has {} slots, expected {}",
                self.channel.name(),
                self.frames,
                frame.0 + frame.1,
                max_slots
            );
        }
        debug!(
            target: "scope",
            "{} frame {}: HIGH={} LOW={}",
            self.channel.name(),
            self.frames,
            frame.0,
            frame.1
        );
        self.last_frame = Some(frame);
    }
}

/// Generator thread body. Runs until `shutdown` is set.
pub fn run_lane(
    channel: Channel,
    mut generator: SimGenerator<'_>,
    clock: SlotClock,
    shutdown: &AtomicBool,
    max_slots: u16,
) -> LaneReport {
    let mut report = LaneReport {
        channel,
        frames: 0,
        torn_frames: 0,
        last_frame: None,
        rising_edges: 0,
        high_at_exit: false,
    };
    let mut frame: Option<(u32, u32)> = None;
    let mut n = 0u64;
    while !shutdown.load(Ordering::Acquire) {
        match generator.step() {
            Some(slot) => {
                if slot.frame_start {
                    if let Some(done) = frame.take() {
                        report.close(done, max_slots);
                    }
                    frame = Some((0, 0));
                }
                if let Some(counts) = frame.as_mut() {
                    match slot.level {
                        Level::High => counts.0 += 1,
                        Level::Low => counts.1 += 1,
                    }
                }
            }
            // Only happens on a boundary, so whatever was open is complete.
            None => {
                if let Some(done) = frame.take() {
                    report.close(done, max_slots);
                }
            }
        }
        n += 1;
        clock.wait_for(n);
    }
    report.rising_edges = generator.pin().rising_edges();
    report.high_at_exit = generator.pin().is_high();
    report
}

struct ShutdownOnDrop<'a>(&'a AtomicBool);

impl Drop for ShutdownOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Run both generator threads while `control` drives the backend, then stop the threads.
pub fn run_bench<'a, R>(
    wiring: Wiring<'a>,
    clock: SlotClock,
    max_slots: u16,
    control: impl FnOnce(SoftBackend<'a>) -> R,
) -> thread::Result<(R, [LaneReport; 2])> {
    let Wiring {
        backend,
        generators: [start, stop],
        shutdown,
    } = wiring;
    thread::scope(|s| {
        let start = s.spawn(move || run_lane(Channel::Start, start, clock, shutdown, max_slots));
        let stop = s.spawn(move || run_lane(Channel::Stop, stop, clock, shutdown, max_slots));
        let result = {
            let _guard = ShutdownOnDrop(shutdown);
            control(backend)
        };
        Ok((result, [start.join()?, stop.join()?]))
    })
}
