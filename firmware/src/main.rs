#![no_std]
#![no_main]

mod output;
mod queue;

use core::fmt::Write;

use embedded_hal::digital::v2::OutputPin;
// The macro for our start-up function
use rp_pico::entry;

// Ensure we halt the program on panic (if we don't mention this crate it won't
// be linked)
use panic_halt as _;

// Pull in any important traits
use rp_pico::hal;
use rp_pico::hal::pac;
use rp_pico::hal::prelude::*;

use usb_device::class_prelude::*;
use usb_device::prelude::*;
use usbd_serial::*;

use window::{Banner, Flow, Interpreter, Lifecycle, Mailbox, Synchronizer, Tunables};

use crate::output::OutputPins;
use crate::queue::Console;

/// Entry point to our bare-metal application.
///
/// The `#[entry]` macro ensures the Cortex-M start-up code calls this function
/// as soon as all global variables are initialised.
///
/// The function configures the RP2040 peripherals, starts both pulse window generators on a
/// common sync edge and then serves the USB serial console forever.
#[entry]
fn main() -> ! {
    run()
}

fn run() -> ! {
    let mut outbox = queue::OutboxQueue::default();
    let (outbox_prod, outbox_cons) = outbox.split_ref();

    // Safety: Transmute to 'static lifetime. This is fine since run actually never returns.
    let (outbox_prod, mut outbox_cons) = unsafe {
        use core::mem::transmute;
        (transmute(outbox_prod), transmute(outbox_cons))
    };
    queue::init(outbox_prod, log::LevelFilter::Info);

    let tunables = Tunables::default();
    tunables.validate().unwrap();

    let core = pac::CorePeripherals::take().unwrap();
    let mut pac = pac::Peripherals::take().unwrap();

    // Set up the watchdog driver - needed by the clock setup code
    let mut watchdog = hal::Watchdog::new(pac.WATCHDOG);

    // Configure the clocks
    //
    // The default is to generate a 125 MHz system clock
    let clocks = hal::clocks::init_clocks_and_plls(
        rp_pico::XOSC_CRYSTAL_FREQ,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    )
    .ok()
    .unwrap();

    // The single-cycle I/O block controls our GPIO pins
    let sio = hal::Sio::new(pac.SIO);

    // Set the pins up according to their function on this particular board
    let pins = rp_pico::Pins::new(
        pac.IO_BANK0,
        pac.PADS_BANK0,
        sio.gpio_bank0,
        &mut pac.RESETS,
    );

    //USB
    let usb_bus = UsbBusAllocator::new(hal::usb::UsbBus::new(
        pac.USBCTRL_REGS,
        pac.USBCTRL_DPRAM,
        clocks.usb_clock,
        true,
        &mut pac.RESETS,
    ));

    let mut serial = SerialPort::new(&usb_bus);

    let mut usb_dev = UsbDeviceBuilder::new(&usb_bus, UsbVidPid(0x16c0, 0x27dd))
        .product("Pulse window generator")
        .device_class(USB_CLASS_CDC)
        .build();

    // Keep in sync with config::PIN_START, PIN_STOP and PIN_SYNC
    let _start_pin = pins.gpio10.into_mode::<hal::gpio::FunctionPio0>();
    let _stop_pin = pins.gpio20.into_mode::<hal::gpio::FunctionPio0>();
    let mut sync_pin = pins.gpio2.into_push_pull_output();
    sync_pin.set_low().unwrap();

    let delay = cortex_m::delay::Delay::new(core.SYST, clocks.system_clock.freq().to_Hz());
    let sync = Synchronizer::new(
        sync_pin,
        delay,
        config::SYNC_SETTLE_MICROS,
        config::SYNC_HOLD_MICROS,
    );

    let mut start_mailbox = Mailbox::new();
    let mut stop_mailbox = Mailbox::new();
    let backend = output::setup_output(
        pac.PIO0,
        &mut pac.RESETS,
        OutputPins {
            start: config::PIN_START,
            stop: config::PIN_STOP,
            sync: config::PIN_SYNC,
        },
        &mut start_mailbox,
        &mut stop_mailbox,
        sync,
    );

    let timer = hal::Timer::new(pac.TIMER, &mut pac.RESETS);
    let mut led_pin = pins.led.into_push_pull_output();

    let mut lifecycle = Lifecycle::new(backend, &tunables);
    let mut interpreter = Interpreter::new();

    lifecycle.start(&mut Console);
    let _ = write!(
        Console,
        "{}\r\n",
        Banner {
            tunables: &tunables,
            pins: Some((config::PIN_SYNC, config::PIN_START, config::PIN_STOP)),
            frame_rate_hz: Some(config::FRAME_RATE_HZ),
        }
    );

    // ----------------------------------------------------------------------------
    // Main loop! -----------------------------------------------------------------
    // ----------------------------------------------------------------------------
    let mut rx = [0u8; 64];
    loop {
        lifecycle.backend_mut().pump();

        if usb_dev.poll(&mut [&mut serial]) {
            if let Ok(n) = serial.read(&mut rx) {
                if interpreter.feed_all(&rx[..n], &mut lifecycle, &mut Console)
                    == Some(Flow::Halted)
                {
                    log::debug!("halted, waiting for ^D");
                }
            }
        }

        lifecycle.poll_auto(timer.get_counter(), &mut Console);

        if lifecycle.backend().is_running() {
            led_pin.set_high().unwrap();
        } else {
            led_pin.set_low().unwrap();
        }

        queue::drain(&mut outbox_cons, &mut serial);
    }
}
