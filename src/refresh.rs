use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::controller::{with_deadline, Controller};
use crate::error::Result;

/// Starts the daily Sleeper catalog refresh.
pub fn spawn_player_refresh(
    controller: Controller,
    every: Duration,
    timeout: Duration,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(run_periodic("player refresh", every, timeout, shutdown, move || {
        let controller = controller.clone();
        async move { controller.refresh_players().await.map(|_| ()) }
    }))
}

/// Runs `job` every `every`, each run bounded by `timeout`, until the
/// shutdown flag flips or its sender goes away. The first run happens one
/// period after start. A run in flight when shutdown arrives is dropped.
pub async fn run_periodic<F, Fut>(
    name: &'static str,
    every: Duration,
    timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut job: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut interval = tokio::time::interval_at(Instant::now() + every, every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("{} scheduled every {}s", name, every.as_secs());

    loop {
        tokio::select! {
            biased;
            _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => break,
            _ = interval.tick() => {
                tokio::select! {
                    biased;
                    _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => {
                        warn!("{} interrupted by shutdown", name);
                        break;
                    }
                    result = with_deadline(timeout, job()) => match result {
                        Ok(()) => info!("{} finished", name),
                        Err(e) => warn!("{} failed: {}", name, e),
                    },
                }
            }
        }
    }
    info!("{} stopped", name);
}
