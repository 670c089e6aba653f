use core::cell::RefCell;
use core::fmt::Write;

use cortex_m::interrupt::Mutex;
use usb_device::bus::UsbBus;
use usbd_serial::SerialPort;

pub type OutboxQueue = ringbuf::StaticRb<u8, { config::LOG_QUEUE_SIZE }>;
pub type OutboxConsumer = ringbuf::consumer::Consumer<u8, &'static OutboxQueue>;
pub type OutboxProducer = ringbuf::producer::Producer<u8, &'static OutboxQueue>;

// Text waiting for the USB port: status lines and log records.
static OUTBOX: Mutex<RefCell<Option<OutboxProducer>>> = Mutex::new(RefCell::new(None));

struct ProducerWriter<'a>(&'a mut OutboxProducer);

impl Write for ProducerWriter<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        // Overflow drops the tail, the generators do not wait for the host.
        self.0.push_slice(s.as_bytes());
        Ok(())
    }
}

fn with_outbox(f: impl FnOnce(&mut ProducerWriter)) {
    cortex_m::interrupt::free(|cs| {
        if let Some(producer) = OUTBOX.borrow(cs).borrow_mut().as_mut() {
            f(&mut ProducerWriter(producer));
        }
    });
}

/// Status output for the command interpreter.
pub struct Console;

impl Write for Console {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        with_outbox(|w| {
            let _ = w.write_str(s);
        });
        Ok(())
    }
}

struct SerialLogger;

impl log::Log for SerialLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        with_outbox(|w| {
            let _ = write!(w, "[{}] {}\r\n", record.level(), record.args());
        });
    }

    fn flush(&self) {}
}

static LOGGER: SerialLogger = SerialLogger;

pub fn init(producer: OutboxProducer, level: log::LevelFilter) {
    cortex_m::interrupt::free(|cs| {
        OUTBOX.borrow(cs).replace(Some(producer));
    });
    // Safety: called once from core 0 before anything logs. No CAS on the M0+.
    unsafe {
        let _ = log::set_logger_racy(&LOGGER);
        log::set_max_level_racy(level);
    }
}

/// Hand as much queued text to the serial port as it takes.
pub fn drain<B: UsbBus>(consumer: &mut OutboxConsumer, serial: &mut SerialPort<B>) {
    while !consumer.is_empty() {
        let (head, _) = consumer.as_slices();
        match serial.write(head) {
            Ok(written) if written > 0 => {
                consumer.skip(written);
            }
            _ => break,
        }
    }
}
