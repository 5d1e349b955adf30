use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

/// Probes every `interval` until `probe` yields a value or `cap` has elapsed.
///
/// The first probe runs immediately; the last one runs no later than `cap`.
pub async fn poll_until<T, F, Fut>(interval: Duration, cap: Duration, mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + cap;
    loop {
        if let Some(found) = probe().await {
            return Some(found);
        }
        let now = Instant::now();
        if now >= deadline {
            return None;
        }
        sleep(interval.min(deadline - now)).await;
    }
}
