#![no_std]

// ----------------------------------------------------------------------------
// Configurable
// ----------------------------------------------------------------------------
pub const MAX_SLOTS: u16 = 50; // Slots per frame, both channels
pub const PIO_CLOCK_HZ: u32 = 100_000_000;

pub const PIN_START: u8 = 10; // HIGH window, then LOW
pub const PIN_STOP: u8 = 20; // LOW prefix, then HIGH
pub const PIN_SYNC: u8 = 2; // Shared LOW->HIGH start edge

pub const DEFAULT_START_HIGH: u16 = 1;
pub const DEFAULT_STOP_LOW_PREFIX: u16 = 1;

pub const AUTO_TICK_MILLIS: u32 = 1000;
pub const AUTO_AT_BOOT: bool = false;

pub const SYNC_SETTLE_MICROS: u32 = 5;
pub const SYNC_HOLD_MICROS: u32 = 2;

pub const LOG_QUEUE_SIZE_KB: usize = 1;

// ----------------------------------------------------------------------------
// Should probably not be changed:
// ----------------------------------------------------------------------------
pub const CLOCK_RATE: u32 = 125_000_000;
pub const CYCLES_PER_SLOT: u32 = 2; //Also change in window.pio
pub const FRAME_OVERHEAD_CYCLES: u32 = 6; //Also change in window.pio
pub const LINE_SIZE: usize = 16;

// ----------------------------------------------------------------------------
// Derived from other values:
// ----------------------------------------------------------------------------
pub const LOG_QUEUE_SIZE: usize = LOG_QUEUE_SIZE_KB << 10;

pub const CLOCK_DIVISOR_INT: u16 = (CLOCK_RATE / PIO_CLOCK_HZ) as u16;
pub const CLOCK_DIVISOR_FRAC: u8 =
    (((CLOCK_RATE % PIO_CLOCK_HZ) as u64 * 256) / PIO_CLOCK_HZ as u64) as u8;

pub const SLOT_RATE_HZ: u32 = PIO_CLOCK_HZ / CYCLES_PER_SLOT;
pub const FRAME_CYCLES: u32 = MAX_SLOTS as u32 * CYCLES_PER_SLOT + FRAME_OVERHEAD_CYCLES;
pub const FRAME_RATE_HZ: u32 = PIO_CLOCK_HZ / FRAME_CYCLES;
