/*!
 * Ticker Task
 *
 * Background task that drives the engine's two periodic loops. Both
 * intervals live in one `tokio::select!`, so ticks never run in parallel
 * and their relative order within a wall-clock tick is unspecified.
 *
 * Shutdown is graceful-with-fallback: `cancel()` asks the loop to exit and
 * marks the handle, while `Drop` aborts the task if cancellation was never
 * requested (with a warning, since that path skips the clean exit).
 */

use super::{StressEngine, ALLOCATION_TICK_PERIOD, SAMPLING_TICK_PERIOD};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

/// Control messages for the ticker task
#[derive(Debug, Clone, Copy)]
enum TickerCommand {
    /// Exit the tick loop
    Shutdown,
}

/// Handle to the background tick loop
pub struct TickerTask {
    command_tx: mpsc::UnboundedSender<TickerCommand>,
    handle: Option<tokio::task::JoinHandle<()>>,
    /// Set once cancellation was requested (lock-free)
    cancel_requested: AtomicBool,
}

impl TickerTask {
    /// Spawn the tick loop for `engine`. Requires a tokio runtime.
    pub fn spawn(engine: Arc<StressEngine>) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            run_tick_loop(engine, command_rx).await;
        });

        debug!("Ticker task spawned - allocation and sampling loops active");

        Self {
            command_tx,
            handle: Some(handle),
            cancel_requested: AtomicBool::new(false),
        }
    }

    /// Request a clean exit of the tick loop.
    ///
    /// Returns immediately; the loop drains the command on its next poll.
    /// Safe to call for a loop that has already exited on its own.
    pub fn cancel(self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
        let _ = self.command_tx.send(TickerCommand::Shutdown);
    }
}

impl Drop for TickerTask {
    fn drop(&mut self) {
        if self.cancel_requested.load(Ordering::SeqCst) {
            return;
        }

        if let Some(handle) = self.handle.take() {
            if handle.is_finished() {
                return;
            }
            warn!("TickerTask dropped without cancel() - aborting tick loop");
            handle.abort();
        }
    }
}

/// The tick loop: two independent periodic actions plus command handling.
///
/// Exits when the engine stops running (explicit stop, completion, or
/// allocation failure) or on a shutdown command. Ticks mutate engine state
/// only under the engine's lock and only while `running` is set, so an exit
/// that races a final tick is harmless.
async fn run_tick_loop(
    engine: Arc<StressEngine>,
    mut command_rx: mpsc::UnboundedReceiver<TickerCommand>,
) {
    let start = tokio::time::Instant::now();

    let mut alloc_interval =
        tokio::time::interval_at(start + ALLOCATION_TICK_PERIOD, ALLOCATION_TICK_PERIOD);
    alloc_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut sample_interval =
        tokio::time::interval_at(start + SAMPLING_TICK_PERIOD, SAMPLING_TICK_PERIOD);
    sample_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = alloc_interval.tick() => {
                engine.allocation_tick();
                if !engine.is_running() {
                    break;
                }
            }

            _ = sample_interval.tick() => {
                engine.sampling_tick();
                if !engine.is_running() {
                    break;
                }
            }

            Some(cmd) = command_rx.recv() => {
                match cmd {
                    TickerCommand::Shutdown => {
                        info!("Ticker task shutting down");
                        break;
                    }
                }
            }
        }
    }
}
