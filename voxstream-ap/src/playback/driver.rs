//! Task hosting for the decode producer and the fixed-timestep tick driver
//!
//! Local file reads run on tokio's blocking pool so a large track never
//! stalls a runtime worker.

use crate::error::Error;
use crate::playback::manager::SessionManager;
use crate::playback::producer::{DecodeProducer, RunOutcome, Step, Suspend};
use crate::playback::session::PlaybackSession;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Spawn the producer task for run `generation` of `session`
pub(crate) fn spawn_run(
    session: Arc<PlaybackSession>,
    generation: u64,
    token: CancellationToken,
    index: i32,
) -> JoinHandle<()> {
    tokio::spawn(run_producer(session, generation, token, index))
}

/// Drive a producer until it stops, is cancelled, or is superseded.
///
/// `RunOutcome::Restart` starts the next run in this same task, so a session
/// never has two producers streaming.
pub async fn run_producer(
    session: Arc<PlaybackSession>,
    generation: u64,
    token: CancellationToken,
    index: i32,
) {
    let owner = session.owner();
    let mut producer = DecodeProducer::new(Arc::clone(&session), index, token.clone());

    loop {
        // Registered before stepping so a tick during the step is not missed
        let next_tick = session.tick_notify().notified();
        tokio::pin!(next_tick);

        let Some(step) = session.with_run(generation, || producer.step()) else {
            debug!(owner = %owner, generation, "Producer run superseded");
            break;
        };

        match step {
            Step::Continue => tokio::task::yield_now().await,
            Step::Suspend(Suspend::NextTick) => {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = &mut next_tick => {}
                }
            }
            Step::Suspend(Suspend::Cooldown(delay)) => {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Step::Suspend(Suspend::Read(path)) => {
                let bytes = Arc::clone(&session.context().bytes);
                let read = tokio::task::spawn_blocking(move || bytes.read_local(&path));
                tokio::select! {
                    _ = token.cancelled() => break,
                    joined = read => producer.complete_read(joined.unwrap_or_else(|e| {
                        Err(Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))
                    })),
                }
            }
            Step::Suspend(Suspend::Fetch(url)) => {
                let bytes = Arc::clone(&session.context().bytes);
                tokio::select! {
                    _ = token.cancelled() => break,
                    result = bytes.fetch_remote(&url) => producer.complete_fetch(result),
                }
            }
            Step::Done(RunOutcome::Restart(next)) => {
                debug!(owner = %owner, next, "Restarting producer");
                producer.restart(next);
            }
            Step::Done(RunOutcome::Stopped) => break,
        }
    }

    session.finish_run(generation);
    debug!(owner = %owner, stats = ?producer.stats(), "Producer task exiting");
}

/// Tick every session at a fixed interval with the measured elapsed time
/// until `shutdown` is cancelled
pub async fn run_tick_driver(
    manager: Arc<SessionManager>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last = Instant::now();

    info!("Tick driver started ({:?} period)", period);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let now = Instant::now();
        let dt = now.duration_since(last);
        last = now;

        for (owner, error) in manager.tick_all(dt) {
            warn!(owner = %owner, "Tick failed: {}", error);
        }
    }

    info!("Tick driver stopped");
}
