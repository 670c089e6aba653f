//! Threaded runs of the software bench. Timing is loose, so these only check what must hold
//! regardless of scheduling.

use std::thread;
use std::time::Duration;

use window::{Channel, Interpreter, Lifecycle, Tunables};
use winsim::sim::{run_bench, Bench, SlotClock};

fn tunables() -> Tunables {
    Tunables {
        max_slots: 10,
        start_default: 1,
        stop_default: 1,
        ..Tunables::default()
    }
}

#[test]
fn updates_land_whole_and_abort_leaves_pins_low() {
    let tunables = tunables();
    let mut bench = Bench::new();
    let wiring = bench.wire(true, Duration::from_secs(2));
    let clock = SlotClock::new(Duration::from_micros(50));

    let (out, reports) = run_bench(wiring, clock, tunables.max_slots, |backend| {
        let mut lifecycle = Lifecycle::new(backend, &tunables);
        let mut out = String::new();
        lifecycle.start(&mut out);
        thread::sleep(Duration::from_millis(20));
        Interpreter::new().feed_all(b"i\r\ni\r\ni\r\ni\r\ni\r\nw\r\n", &mut lifecycle, &mut out);
        thread::sleep(Duration::from_millis(50));
        lifecycle.abort(&mut out);
        thread::sleep(Duration::from_millis(50));
        out
    })
    .unwrap();

    assert!(out.ends_with("stopped.\r\n"));
    let [start, stop] = reports;
    assert_eq!(start.channel, Channel::Start);
    for report in [start, stop] {
        assert!(report.frames > 2, "{:?}", report);
        assert_eq!(report.torn_frames, 0, "{:?}", report);
        assert!(!report.high_at_exit, "{:?}", report);
    }
    assert_eq!(start.last_frame, Some((6, 4)));
    assert_eq!(stop.last_frame, Some((8, 2)));
}

#[test]
fn restart_runs_again_with_defaults() {
    let tunables = tunables();
    let mut bench = Bench::new();
    let wiring = bench.wire(true, Duration::from_secs(2));
    let clock = SlotClock::new(Duration::from_micros(50));

    let (_, [start, stop]) = run_bench(wiring, clock, tunables.max_slots, |backend| {
        let mut lifecycle = Lifecycle::new(backend, &tunables);
        let mut interpreter = Interpreter::new();
        let mut out = String::new();
        lifecycle.start(&mut out);
        interpreter.feed_all(b"i\r\ni\r\n\x03", &mut lifecycle, &mut out);
        thread::sleep(Duration::from_millis(20));
        interpreter.feed_all(b"\x04", &mut lifecycle, &mut out);
        thread::sleep(Duration::from_millis(50));
    })
    .unwrap();

    assert_eq!(start.torn_frames, 0);
    assert_eq!(stop.torn_frames, 0);
    assert_eq!(start.last_frame, Some((1, 9)));
    assert_eq!(stop.last_frame, Some((9, 1)));
}

#[test]
fn free_running_generators_start_without_the_line() {
    let tunables = tunables();
    let mut bench = Bench::new();
    let wiring = bench.wire(false, Duration::from_secs(2));
    let clock = SlotClock::new(Duration::from_micros(50));

    let (_, [start, _]) = run_bench(wiring, clock, tunables.max_slots, |backend| {
        let mut lifecycle = Lifecycle::new(backend, &tunables);
        lifecycle.start(&mut String::new());
        thread::sleep(Duration::from_millis(30));
    })
    .unwrap();

    assert!(start.frames > 0);
    assert!(start.rising_edges > 0);
}
