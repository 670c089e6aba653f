//! Lifecycle manager: start, abort and restart of both generators as a unit.
//!
//! The lifecycle owns the [`LengthController`] and talks to the generators only through a
//! [`Backend`]. On hardware the backend is a pair of PIO state machines, on the host it is a
//! pair of [`ChannelGenerator`](crate::ChannelGenerator)s on their own threads.

use core::fmt;

use fugit::MicrosDurationU64;

use crate::codec::{Channel, FrameWord};
use crate::command::{Command, CommandError};
use crate::controller::{LengthController, Session, Update};
use crate::status::USAGE;
use crate::tunables::Tunables;
use crate::Instant;

/// What the lifecycle needs from the generators.
pub trait Backend {
    /// Put `word` into the channel's mailbox. Latest wins.
    fn stage(&mut self, channel: Channel, word: FrameWord);

    /// Activate both generators. Synchronized generators park until [`Backend::release`].
    fn arm(&mut self);

    /// Raise the sync edge.
    fn release(&mut self);

    /// Deactivate both generators and leave their pins LOW.
    fn halt(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Constructed, never started.
    Idle,
    Running,
    /// Aborted. Only a restart brings it back.
    Halted,
}

/// Tells the control loop whether to keep reading commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Halted,
}

pub struct Lifecycle<B> {
    backend: B,
    controller: LengthController,
    phase: Phase,
    auto_tick: MicrosDurationU64,
    next_tick: Option<Instant>,
}

impl<B: Backend> Lifecycle<B> {
    pub fn new(backend: B, tunables: &Tunables) -> Self {
        Self {
            backend,
            controller: LengthController::new(tunables),
            phase: Phase::Idle,
            auto_tick: tunables.auto_tick,
            next_tick: None,
        }
    }

    /// Stage the current split, arm both generators and release them on one sync edge.
    pub fn start<W: fmt::Write>(&mut self, out: &mut W) {
        for channel in [Channel::Stop, Channel::Start] {
            let update = self.controller.current(channel);
            self.stage(update, out);
        }
        self.launch();
    }

    pub fn apply<W: fmt::Write>(&mut self, command: Command, out: &mut W) -> Flow {
        match command {
            Command::Abort => return self.abort(out),
            Command::Restart => return self.restart(out),
            _ if self.phase != Phase::Running => {
                log::warn!("{:?} ignored while {:?}", command, self.phase);
                emit(out, format_args!("stopped; send ^D to restart."));
                return self.flow();
            }
            Command::Increment(channel) => {
                if let Some(update) = self.controller.increment(channel) {
                    self.stage(update, out);
                }
            }
            Command::Decrement(channel) => {
                if let Some(update) = self.controller.decrement(channel) {
                    self.stage(update, out);
                }
            }
            Command::AutoToggle => {
                if self.controller.set_auto(true) {
                    log::info!("auto mode enabled");
                    self.next_tick = None;
                }
                emit(out, format_args!("AUTO: ON (both channels)"));
            }
        }
        self.flow()
    }

    /// Unrecognized input: a hint, nothing else.
    pub fn reject<W: fmt::Write>(&mut self, error: CommandError, out: &mut W) -> Flow {
        log::warn!("rejected input: {}", error);
        emit(out, format_args!("{}", USAGE));
        self.flow()
    }

    /// Stop both generators. Always honoured, also when already halted.
    pub fn abort<W: fmt::Write>(&mut self, out: &mut W) -> Flow {
        self.backend.halt();
        self.phase = Phase::Halted;
        self.next_tick = None;
        log::info!("generators halted");
        emit(out, format_args!("stopped."));
        Flow::Halted
    }

    /// Halt, go back to the defaults and run the start sequence again.
    pub fn restart<W: fmt::Write>(&mut self, out: &mut W) -> Flow {
        self.backend.halt();
        self.next_tick = None;
        log::info!("restarting with defaults");
        emit(out, format_args!("restarted."));
        for update in self.controller.reset() {
            self.stage(update, out);
        }
        self.launch();
        Flow::Continue
    }

    /// Run an auto tick if one is due. Returns whether it ticked.
    ///
    /// The first tick comes one interval after auto mode was switched on (or after the last
    /// start), each further tick one interval after the previous one.
    pub fn poll_auto<W: fmt::Write>(&mut self, now: Instant, out: &mut W) -> bool {
        if self.phase != Phase::Running || !self.controller.session().is_auto() {
            self.next_tick = None;
            return false;
        }
        let due = *self.next_tick.get_or_insert(now + self.auto_tick);
        if now < due {
            return false;
        }
        self.next_tick = Some(now + self.auto_tick);
        for update in self.controller.auto_tick() {
            self.stage(update, out);
        }
        true
    }

    fn launch(&mut self) {
        self.backend.arm();
        self.backend.release();
        self.phase = Phase::Running;
        log::info!("generators released");
    }

    fn stage<W: fmt::Write>(&mut self, update: Update, out: &mut W) {
        self.backend.stage(update.channel, update.word);
        emit(out, format_args!("{}", update.status));
    }

    fn flow(&self) -> Flow {
        match self.phase {
            Phase::Halted => Flow::Halted,
            Phase::Idle | Phase::Running => Flow::Continue,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn session(&self) -> &Session {
        self.controller.session()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

/// One line of output. Write errors are dropped: a lost control connection must not stop
/// anything.
fn emit<W: fmt::Write>(out: &mut W, line: fmt::Arguments<'_>) {
    let _ = out.write_fmt(line);
    let _ = out.write_str("\r\n");
}
