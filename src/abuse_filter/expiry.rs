// counters are only ever overwritten, never deleted, by the limiter itself. a
// client that shows up once would stay in the map forever, so this worker
// periodically sweeps out entries whose window has ended

use std::sync::Arc;
use std::time::Duration;

use super::Clock;
use super::RateLimitStore;

fn expire_old_entries(
    store: &dyn RateLimitStore,
    clock: &dyn Clock,
) -> usize {
    store.purge_expired(clock.now())
}

/// To be run as a separate task, next to the API. Only returns if the task is
/// cancelled.
pub async fn init_expiry_worker(
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
) -> Result<(), anyhow::Error> {
    loop {
        tokio::time::sleep(interval).await;
        let purged = expire_old_entries(store.as_ref(), clock.as_ref());
        if purged > 0 {
            tracing::debug!(purged, "expired rate limit entries dropped");
        }
    }
}
