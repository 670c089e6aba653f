use pio::Instruction;
use pio::InstructionOperands;
use pio::JmpCondition;
use pio::SetDestination;
use pio_proc::pio_file;
use rp_pico::hal;
use rp_pico::hal::pac;

// Import pio crates
use embedded_hal::blocking::delay::DelayUs;
use embedded_hal::digital::v2::OutputPin;
use hal::pio::{SM0, SM1};
use rp_pico::hal::pio::PIOExt;
use rp_pico::hal::pio::Running;
use rp_pico::hal::pio::StateMachine;
use rp_pico::hal::pio::Stopped;
use rp_pico::hal::pio::Tx;
use rp_pico::hal::pio::ValidStateMachine;

use window::{Adopter, Backend, Channel, FrameWord, Mailbox, Poster, Synchronizer};

type StartSm = (pac::PIO0, SM0);
type StopSm = (pac::PIO0, SM1);

enum Engine<SM: ValidStateMachine> {
    Stopped(StateMachine<SM, Stopped>),
    Running(StateMachine<SM, Running>),
    Switching,
}

/// One channel: a state machine, its TX FIFO and the mailbox feeding it.
struct Lane<'a, SM: ValidStateMachine> {
    engine: Engine<SM>,
    tx: Tx<SM>,
    mailbox: Adopter<'a>,
    origin: u8,
}

const SET_PINS_LOW: Instruction = Instruction {
    operands: InstructionOperands::SET {
        destination: SetDestination::PINS,
        data: 0,
    },
    delay: 0,
    side_set: None,
};

const PULL_NOBLOCK: Instruction = Instruction {
    operands: InstructionOperands::PULL {
        if_empty: false,
        block: false,
    },
    delay: 0,
    side_set: None,
};

impl<SM: ValidStateMachine> Lane<'_, SM> {
    fn take_stopped(&mut self) -> Option<StateMachine<SM, Stopped>> {
        match core::mem::replace(&mut self.engine, Engine::Switching) {
            Engine::Running(sm) => Some(sm.stop()),
            Engine::Stopped(sm) => Some(sm),
            Engine::Switching => None,
        }
    }

    fn halt(&mut self) {
        let Some(mut sm) = self.take_stopped() else {
            return;
        };
        sm.exec_instruction(SET_PINS_LOW);
        self.engine = Engine::Stopped(sm);
    }

    /// Restart from the program origin. The state machine then parks on `wait 1 pin 0`.
    fn arm(&mut self) {
        let Some(mut sm) = self.take_stopped() else {
            return;
        };
        // Words left over from before the halt must not end up in the first frame.
        while !self.tx.is_empty() {
            sm.exec_instruction(PULL_NOBLOCK);
        }
        sm.exec_instruction(SET_PINS_LOW);
        sm.restart();
        sm.exec_instruction(Instruction {
            operands: InstructionOperands::JMP {
                condition: JmpCondition::Always,
                address: self.origin,
            },
            delay: 0,
            side_set: None,
        });
        self.engine = Engine::Running(sm.start());
    }

    /// Move the latest posted word into the FIFO, but only into an empty one: the FIFO never
    /// queues behind the mailbox.
    fn pump(&mut self) {
        if !self.tx.is_empty() {
            return;
        }
        if let Some(word) = self.mailbox.take() {
            if word.total() > 0 {
                self.tx.write(word.raw());
            }
        }
    }

    fn is_running(&self) -> bool {
        matches!(self.engine, Engine::Running(_))
    }
}

/// Both generators on PIO0 plus the sync line.
pub struct PioBackend<'a, P, D> {
    start: Lane<'a, StartSm>,
    stop: Lane<'a, StopSm>,
    posters: [Poster<'a>; 2],
    sync: Synchronizer<P, D>,
}

impl<'a, P, D> PioBackend<'a, P, D>
where
    P: OutputPin<Error = core::convert::Infallible>,
    D: DelayUs<u32>,
{
    /// Call from the main loop. Cheap when nothing is pending.
    pub fn pump(&mut self) {
        self.start.pump();
        self.stop.pump();
    }

    pub fn is_running(&self) -> bool {
        self.start.is_running() && self.stop.is_running()
    }
}

impl<P, D> Backend for PioBackend<'_, P, D>
where
    P: OutputPin<Error = core::convert::Infallible>,
    D: DelayUs<u32>,
{
    fn stage(&mut self, channel: Channel, word: FrameWord) {
        self.posters[channel.index()].post(word);
    }

    fn arm(&mut self) {
        self.sync.arm();
        self.start.arm();
        self.stop.arm();
        // The first `pull block` has to find its word the moment the edge comes.
        self.pump();
    }

    fn release(&mut self) {
        self.sync.release();
    }

    fn halt(&mut self) {
        self.start.halt();
        self.stop.halt();
    }
}

pub struct OutputPins {
    pub start: u8,
    pub stop: u8,
    pub sync: u8,
}

pub fn setup_output<'a, P, D>(
    pio: pac::PIO0,
    resets: &mut pac::RESETS,
    pins: OutputPins,
    start_mailbox: &'a mut Mailbox,
    stop_mailbox: &'a mut Mailbox,
    sync: Synchronizer<P, D>,
) -> PioBackend<'a, P, D> {
    let (mut pio0, sm0, sm1, _, _) = pio.split(resets);

    let high_first = pio_file!("./src/window.pio", select_program("window_high_first"));
    let low_first = pio_file!("./src/window.pio", select_program("window_low_first"));
    let high_first = pio0.install(&high_first.program).unwrap();
    let low_first = pio0.install(&low_first.program).unwrap();
    let start_origin = high_first.offset();
    let stop_origin = low_first.offset();

    // Same frame word for both programs. Shifting right hands out the HIGH count first,
    // shifting left the LOW count.
    let (mut start_sm, _, start_tx) = hal::pio::PIOBuilder::from_program(high_first)
        .set_pins(pins.start, 1)
        .side_set_pin_base(pins.start)
        .in_pin_base(pins.sync)
        .out_shift_direction(hal::pio::ShiftDirection::Right)
        .clock_divisor_fixed_point(config::CLOCK_DIVISOR_INT, config::CLOCK_DIVISOR_FRAC)
        .buffers(hal::pio::Buffers::OnlyTx)
        .build(sm0);
    let (mut stop_sm, _, stop_tx) = hal::pio::PIOBuilder::from_program(low_first)
        .set_pins(pins.stop, 1)
        .side_set_pin_base(pins.stop)
        .in_pin_base(pins.sync)
        .out_shift_direction(hal::pio::ShiftDirection::Left)
        .clock_divisor_fixed_point(config::CLOCK_DIVISOR_INT, config::CLOCK_DIVISOR_FRAC)
        .buffers(hal::pio::Buffers::OnlyTx)
        .build(sm1);

    start_sm.set_pindirs([(pins.start, hal::pio::PinDir::Output)]);
    stop_sm.set_pindirs([(pins.stop, hal::pio::PinDir::Output)]);
    start_sm.exec_instruction(SET_PINS_LOW);
    stop_sm.exec_instruction(SET_PINS_LOW);

    let (start_post, start_take) = start_mailbox.split();
    let (stop_post, stop_take) = stop_mailbox.split();

    PioBackend {
        start: Lane {
            engine: Engine::Stopped(start_sm),
            tx: start_tx,
            mailbox: start_take,
            origin: start_origin,
        },
        stop: Lane {
            engine: Engine::Stopped(stop_sm),
            tx: stop_tx,
            mailbox: stop_take,
            origin: stop_origin,
        },
        posters: [start_post, stop_post],
        sync,
    }
}
