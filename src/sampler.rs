//! Background polling loop.
//!
//! A [`Sampler`] owns one thread, one stop token and one series. Nothing
//! is shared between sampler instances, so concurrent measurements never
//! see each other's readings.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, error, warn};

use crate::error::{SamplerError, SamplingReadError};
use crate::probe::Probe;
use crate::record::Series;

/// Spacing between reported samples when nothing else is configured.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// Stop token shared between the owner and the polling thread.
/// The condvar lets `stop()` cut a pending wait short.
struct StopToken {
    stopped: Mutex<bool>,
    wake: Condvar,
}

pub struct Sampler {
    token: Arc<StopToken>,
    handle: Option<JoinHandle<Series>>,
    collected: Option<Series>,
}

impl Sampler {
    /// Spawn the polling thread. The probe is primed first; the first
    /// reported sample covers one full `interval`.
    pub fn start<P>(probe: P, interval: Duration) -> Result<Self, SamplerError>
    where
        P: Probe + 'static,
    {
        if interval.is_zero() {
            return Err(SamplerError::InvalidInterval(interval));
        }

        let token = Arc::new(StopToken {
            stopped: Mutex::new(false),
            wake: Condvar::new(),
        });

        let thread_token = token.clone();
        let handle = thread::Builder::new()
            .name("usage-sampler".into())
            .spawn(move || poll_loop(probe, interval, &thread_token))?;

        Ok(Self {
            token,
            handle: Some(handle),
            collected: None,
        })
    }

    /// Signal the loop and block until its thread has exited. After this
    /// returns no further sample can be appended. Calling it twice is a
    /// no-op.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        *self.token.stopped.lock() = true;
        self.token.wake.notify_all();

        let series = match handle.join() {
            Ok(series) => series,
            Err(_) => {
                error!("sampler thread panicked, series discarded");
                Series::new()
            }
        };
        debug!(samples = series.len(), "sampler stopped");
        self.collected = Some(series);
    }

    /// The readings gathered since `start()`. `None` until `stop()` has
    /// returned.
    pub fn collected(&self) -> Option<&[f64]> {
        self.collected.as_deref()
    }

    /// Stop (if still running) and hand over the series.
    pub fn finish(mut self) -> Series {
        self.stop();
        self.collected.take().unwrap_or_default()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

/// Stops and joins. Blocks for at most one in-flight probe read, since
/// the stop token cuts any pending interval short.
impl Drop for Sampler {
    fn drop(&mut self) {
        self.stop();
    }
}

// ─── Polling loop ────────────────────────────────────────────────

fn poll_loop<P: Probe>(mut probe: P, interval: Duration, token: &StopToken) -> Series {
    let mut series = Series::new();

    if let Err(e) = probe.prime() {
        warn!(error = %e, "probe baseline failed");
    }

    let mut stopped = token.stopped.lock();
    loop {
        if !wait_interval(token, &mut stopped, interval) {
            break;
        }

        // Release the token while polling so stop() never waits on the probe.
        let reading = MutexGuard::unlocked(&mut stopped, || probe.read()).and_then(finite);
        match reading {
            Ok(value) => series.push(value),
            Err(e) => warn!(error = %e, "sample skipped"),
        }
    }

    series
}

fn finite(v: f64) -> Result<f64, SamplingReadError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(SamplingReadError::NonFinite(v))
    }
}

/// Sleep one interval on the condvar. Returns `false` once stop is
/// signalled, in which case the partial interval is dropped.
fn wait_interval(token: &StopToken, stopped: &mut MutexGuard<'_, bool>, interval: Duration) -> bool {
    let deadline = Instant::now() + interval;
    while !**stopped {
        if token.wake.wait_until(stopped, deadline).timed_out() {
            break;
        }
    }
    !**stopped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn zero_interval_is_rejected() {
        let res = Sampler::start(probe::from_fn(|| Ok(1.0)), Duration::ZERO);
        assert!(matches!(res, Err(SamplerError::InvalidInterval(_))));
    }

    #[test]
    fn nothing_collected_before_stop() {
        let mut s = Sampler::start(probe::from_fn(|| Ok(1.0)), Duration::from_millis(5)).unwrap();
        assert!(s.collected().is_none());
        assert!(s.is_running());
        s.stop();
        assert!(!s.is_running());
        assert!(s.collected().is_some());
    }

    #[test]
    fn samples_roughly_once_per_interval() {
        let mut s = Sampler::start(probe::from_fn(|| Ok(50.0)), Duration::from_millis(20)).unwrap();
        thread::sleep(Duration::from_millis(210));
        s.stop();
        let n = s.collected().unwrap().len();
        assert!((6..=11).contains(&n), "got {n} samples");
    }

    #[test]
    fn no_reads_after_stop_returns() {
        let reads = Arc::new(AtomicUsize::new(0));
        let counter = reads.clone();
        let mut s = Sampler::start(
            probe::from_fn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(0.0)
            }),
            Duration::from_millis(2),
        )
        .unwrap();
        thread::sleep(Duration::from_millis(30));
        s.stop();

        let at_stop = reads.load(Ordering::SeqCst);
        assert_eq!(at_stop, s.collected().unwrap().len());
        thread::sleep(Duration::from_millis(30));
        assert_eq!(reads.load(Ordering::SeqCst), at_stop);
    }

    #[test]
    fn failed_reads_are_skipped() {
        let mut n = 0u32;
        let mut s = Sampler::start(
            probe::from_fn(move || {
                n += 1;
                if n % 2 == 0 {
                    Err(SamplingReadError::probe("flaky"))
                } else {
                    Ok(f64::from(n))
                }
            }),
            Duration::from_millis(5),
        )
        .unwrap();
        thread::sleep(Duration::from_millis(60));
        s.stop();
        let series = s.collected().unwrap();
        assert!(!series.is_empty());
        assert!(series.iter().all(|v| (*v as u32) % 2 == 1));
        assert!(series.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn non_finite_readings_are_skipped() {
        let mut n = 0u32;
        let mut s = Sampler::start(
            probe::from_fn(move || {
                n += 1;
                Ok(match n % 3 {
                    0 => f64::NAN,
                    1 => f64::INFINITY,
                    _ => 42.0,
                })
            }),
            Duration::from_millis(3),
        )
        .unwrap();
        thread::sleep(Duration::from_millis(60));
        s.stop();
        let series = s.collected().unwrap();
        assert!(!series.is_empty());
        assert!(series.iter().all(|v| *v == 42.0));
    }

    #[test]
    fn stop_does_not_wait_out_the_interval() {
        let mut s = Sampler::start(probe::from_fn(|| Ok(1.0)), Duration::from_secs(10)).unwrap();
        let t = Instant::now();
        s.stop();
        assert!(t.elapsed() < Duration::from_secs(1));
        assert!(s.collected().unwrap().is_empty());
    }

    #[test]
    fn drop_waits_only_for_the_read_in_flight() {
        let s = Sampler::start(
            probe::from_fn(|| {
                thread::sleep(Duration::from_millis(50));
                Ok(1.0)
            }),
            Duration::from_millis(1),
        )
        .unwrap();
        thread::sleep(Duration::from_millis(20));
        let t = Instant::now();
        drop(s);
        assert!(t.elapsed() < Duration::from_millis(250), "drop took {:?}", t.elapsed());
    }

    #[test]
    fn probe_panic_yields_empty_series() {
        let s = Sampler::start(
            probe::from_fn(|| -> Result<f64, SamplingReadError> { panic!("boom") }),
            Duration::from_millis(1),
        )
        .unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(s.finish().is_empty());
    }
}
