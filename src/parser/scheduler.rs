use super::updater::RatesUpdater;
use crate::core::log::PARSER_TARGET;
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Runs refresh cycles every `interval` until `shutdown` resolves.
///
/// The first cycle starts immediately. A failed cycle is logged and the
/// loop keeps going. Returns the number of cycles that were started.
pub async fn run_periodic<S>(updater: &RatesUpdater, interval: Duration, shutdown: S) -> usize
where
    S: Future<Output = ()>,
{
    let period = interval.max(MIN_INTERVAL);
    info!(
        target: PARSER_TARGET,
        "Starting periodic rates update every {}s", period.as_secs()
    );

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut cycles = 0;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!(target: PARSER_TARGET, "Stopping periodic update after {} cycles", cycles);
                return cycles;
            }
            _ = ticker.tick() => {
                cycles += 1;
                match updater.run_update().await {
                    Ok(report) => info!(
                        target: PARSER_TARGET,
                        "Cycle {} committed {} rates", cycles, report.total
                    ),
                    Err(e) => error!(target: PARSER_TARGET, "Cycle {} failed: {}", cycles, e),
                }
            }
        }
    }
}
