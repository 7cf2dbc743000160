use std::future::Future;
use std::time::{Duration, Instant};

use tracing::info;

/// Run `op` and log how long it took. No sampling, no persistence.
pub fn timed<T>(name: &str, op: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let result = op();
    log_elapsed(name, start);
    result
}

/// Async variant of [`timed`].
pub async fn timed_async<F: Future>(name: &str, fut: F) -> F::Output {
    let start = Instant::now();
    let result = fut.await;
    log_elapsed(name, start);
    result
}

fn log_elapsed(name: &str, start: Instant) {
    let elapsed = start.elapsed();
    info!(
        operation = %name,
        elapsed_us = micros(elapsed),
        "{name} took {:0.4} seconds",
        elapsed.as_secs_f64()
    );
}

/// Saturates instead of wrapping for absurdly long runs.
fn micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}
