//! Control domain: stdin, the auto timer and shutdown, multiplexed on one task.

use std::future::Future;
use std::io::{self, Read};
use std::thread;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{info, warn};
use window::{Backend, Interpreter, Lifecycle};

use crate::console::TraceWriter;

/// How often auto mode is checked. The auto interval itself comes from the tunables.
const AUTO_POLL: Duration = Duration::from_millis(10);

/// Read stdin on a detached thread and forward raw chunks.
///
/// A blocking read cannot be cancelled, so it must not belong to the runtime: the process
/// exits without waiting for it.
pub fn stdin_chunks() -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel(16);
    let reader = thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            let mut stdin = io::stdin().lock();
            let mut buf = [0u8; 64];
            loop {
                match stdin.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.blocking_send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!("stdin: {}", e);
                        break;
                    }
                }
            }
        });
    if let Err(e) = reader {
        warn!("no stdin reader: {}", e);
    }
    rx
}

/// Serve commands from `input` until `shutdown` resolves. Aborts the generators before
/// returning.
pub async fn control<B, S>(
    lifecycle: &mut Lifecycle<B>,
    clock: std::time::Instant,
    mut input: mpsc::Receiver<Vec<u8>>,
    shutdown: S,
) -> anyhow::Result<()>
where
    B: Backend,
    S: Future<Output = io::Result<()>>,
{
    let mut interpreter = Interpreter::new();
    let mut out = TraceWriter::default();
    let mut auto = tokio::time::interval(AUTO_POLL);
    let mut input_open = true;

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            chunk = input.recv(), if input_open => match chunk {
                Some(bytes) => {
                    interpreter.feed_all(&bytes, lifecycle, &mut out);
                }
                None => {
                    warn!("stdin closed, generators keep running until ^C");
                    input_open = false;
                }
            },
            _ = auto.tick() => {
                let now = window::Instant::from_ticks(clock.elapsed().as_micros() as u64);
                lifecycle.poll_auto(now, &mut out);
            }
            signal = &mut shutdown => {
                signal.context("listening for ^C")?;
                info!("^C received");
                lifecycle.abort(&mut out);
                return Ok(());
            }
        }
    }
}
