use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::Parser;
use fugit::{HertzU32, MicrosDurationU64};
use tracing::info;
use tracing_subscriber::EnvFilter;
use window::{Banner, Lifecycle, Tunables};
use winsim::console::TraceWriter;
use winsim::rt;
use winsim::sim::{run_bench, Bench, SlotClock};

#[derive(Parser, Debug)] // requires `derive` feature
#[command(about = "Run both pulse window generators in software, controlled from stdin")]
struct Args {
    /// Slots per frame
    #[arg(long, default_value_t = config::MAX_SLOTS)]
    max_slots: u16,

    /// Wall-clock length of one slot in microseconds
    #[arg(long, default_value_t = 10_000, value_parser = clap::value_parser!(u64).range(1..=1_000_000))]
    slot_micros: u64,

    /// START HIGH window at start and after restart
    #[arg(long, default_value_t = config::DEFAULT_START_HIGH)]
    start: u16,

    /// STOP LOW prefix at start and after restart
    #[arg(long, default_value_t = config::DEFAULT_STOP_LOW_PREFIX)]
    stop: u16,

    /// Start with auto mode on
    #[arg(long)]
    auto: bool,

    #[arg(long, default_value_t = config::AUTO_TICK_MILLIS as u64)]
    auto_tick_ms: u64,

    /// Do not wait for the sync edge
    #[arg(long)]
    free_running: bool,
}

impl Args {
    fn tunables(&self) -> Tunables {
        Tunables {
            max_slots: self.max_slots,
            slot_rate: HertzU32::from_raw((1_000_000 / self.slot_micros) as u32),
            start_default: self.start,
            stop_default: self.stop,
            auto_tick: MicrosDurationU64::millis(self.auto_tick_ms),
            auto_at_boot: self.auto || config::AUTO_AT_BOOT,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let tunables = args.tunables();
    tunables.validate().context("invalid generator settings")?;

    let period = Duration::from_micros(args.slot_micros);
    // Parking takes at most one frame.
    let park_timeout = period * (tunables.max_slots as u32 + 1) + Duration::from_millis(100);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building control runtime")?;

    let mut bench = Bench::new();
    let wiring = bench.wire(!args.free_running, park_timeout);
    let clock = SlotClock::new(period);
    info!(
        "{} slots per frame, {:?} per slot, {}",
        tunables.max_slots,
        period,
        if args.free_running {
            "free running"
        } else {
            "synchronized"
        }
    );

    let (result, reports) = run_bench(wiring, clock, tunables.max_slots, |backend| {
        let mut lifecycle = Lifecycle::new(backend, &tunables);
        let mut out = TraceWriter::default();
        lifecycle.start(&mut out);
        let banner = Banner {
            tunables: &tunables,
            pins: None,
            frame_rate_hz: None,
        };
        for line in banner.to_string().lines() {
            info!(target: "status", "{}", line.trim_end_matches('\r'));
        }
        let input = rt::stdin_chunks();
        runtime.block_on(rt::control(
            &mut lifecycle,
            std::time::Instant::now(),
            input,
            tokio::signal::ctrl_c(),
        ))
    })
    .map_err(|_| anyhow!("generator thread panicked"))?;
    runtime.shutdown_background();

    for report in reports {
        info!(
            "{}: {} frames, {} torn, {} rising edges, last frame {:?}",
            report.channel.name(),
            report.frames,
            report.torn_frames,
            report.rising_edges,
            report.last_frame
        );
    }
    result
}
