//! The measurement wrapper.
//!
//! A [`Monitor`] runs an operation on the caller's thread while a fresh
//! [`Sampler`] polls in the background, then writes the resulting
//! [`Record`] to its sink. The operation's own output (including any
//! `Err` it returns) is handed back untouched; sink failures never leak
//! into it.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{SamplerError, SinkWriteError};
use crate::probe::{CpuProbe, Probe, RamProbe};
use crate::record::{Record, Series};
use crate::sampler::{Sampler, DEFAULT_INTERVAL};
use crate::sink::{memory, Sink};

/// Builds a fresh probe for every measured invocation.
pub type ProbeFactory = Arc<dyn Fn() -> Box<dyn Probe> + Send + Sync>;

// ─── Configuration ───────────────────────────────────────────────

#[derive(Clone)]
pub struct MonitorConfig {
    /// When false the operation runs bare: no sampler, no record.
    pub enabled: bool,
    /// When false records are built but not written anywhere.
    pub persist: bool,
    /// Where records go. `None` selects the process-wide memory sink.
    pub sink: Option<Arc<dyn Sink>>,
    /// Overrides the operation name used as the sink key.
    pub name: Option<String>,
    /// Minimum spacing between samples.
    pub interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            persist: true,
            sink: None,
            name: None,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl fmt::Debug for MonitorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorConfig")
            .field("enabled", &self.enabled)
            .field("persist", &self.persist)
            .field("sink", &self.sink.as_ref().map(|_| "external"))
            .field("name", &self.name)
            .field("interval", &self.interval)
            .finish()
    }
}

// ─── Result of one measured call ─────────────────────────────────

#[derive(Debug)]
pub struct Measured<T> {
    /// Whatever the operation returned.
    pub output: T,
    /// Resolved operation name.
    pub name: String,
    /// `None` when monitoring is disabled.
    pub record: Option<Record>,
    /// Outcome of the sink write. `None` when nothing was written.
    pub persisted: Option<Result<(), SinkWriteError>>,
}

impl<T> Measured<T> {
    pub fn into_output(self) -> T {
        self.output
    }
}

// ─── Monitor ─────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Monitor {
    enabled: bool,
    persist: bool,
    name: Option<String>,
    interval: Duration,
    sink: Arc<dyn Sink>,
    probe: ProbeFactory,
}

impl Monitor {
    /// CPU utilization monitor. Defaults to [`memory::cpu_usage_results`].
    pub fn cpu(config: MonitorConfig) -> Result<Self, SamplerError> {
        Self::with_probe(
            config,
            || Box::new(CpuProbe::new()) as Box<dyn Probe>,
            memory::cpu_usage_results(),
        )
    }

    /// Process memory monitor. Defaults to [`memory::ram_usage_results`].
    pub fn ram(config: MonitorConfig) -> Result<Self, SamplerError> {
        Self::with_probe(
            config,
            || Box::new(RamProbe::new()) as Box<dyn Probe>,
            memory::ram_usage_results(),
        )
    }

    /// Monitor over an arbitrary probe. `default_sink` is used unless the
    /// config names one.
    pub fn with_probe<F>(
        config: MonitorConfig,
        probe: F,
        default_sink: Arc<dyn Sink>,
    ) -> Result<Self, SamplerError>
    where
        F: Fn() -> Box<dyn Probe> + Send + Sync + 'static,
    {
        if config.interval.is_zero() {
            return Err(SamplerError::InvalidInterval(config.interval));
        }

        Ok(Self {
            enabled: config.enabled,
            persist: config.persist,
            name: config.name,
            interval: config.interval,
            sink: config.sink.unwrap_or(default_sink),
            probe: Arc::new(probe),
        })
    }

    pub fn sink(&self) -> &Arc<dyn Sink> {
        &self.sink
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The configured override, else `name`.
    pub fn resolve_name(&self, name: &str) -> String {
        self.name.clone().unwrap_or_else(|| name.to_owned())
    }

    // ── Sync ────────────────────────────────────────────────────

    /// Run `op` under measurement and return its output unchanged.
    /// Sink write failures are logged, not returned.
    pub fn call<T>(&self, name: &str, op: impl FnOnce() -> T) -> T {
        self.measure(name, op).into_output()
    }

    /// Run `op` under measurement and report everything that happened.
    pub fn measure<T>(&self, name: &str, op: impl FnOnce() -> T) -> Measured<T> {
        let name = self.resolve_name(name);
        if !self.enabled {
            return Measured {
                output: op(),
                name,
                record: None,
                persisted: None,
            };
        }

        // Dropped during unwinding if `op` panics, which stops the thread.
        let sampler = self.start_sampler(&name);
        let started = Instant::now();
        let output = op();
        let duration = started.elapsed();
        let series = sampler.map(Sampler::finish).unwrap_or_default();

        let record = self.build_record(&name, series, duration);
        let persisted = self.persist.then(|| self.write(&name, &record));

        Measured {
            output,
            name,
            record: Some(record),
            persisted,
        }
    }

    /// Compose `op` with this monitor. The operation name is taken from
    /// the function's own name unless the config overrides it.
    pub fn wrap<A, T, F>(&self, op: F) -> impl Fn(A) -> T
    where
        F: Fn(A) -> T,
    {
        let monitor = self.clone();
        let name = operation_name::<F>();
        move |arg| monitor.call(name, || op(arg))
    }

    // ── Async ───────────────────────────────────────────────────

    /// Async twin of [`Monitor::call`]. Must run inside a Tokio runtime.
    pub async fn call_async<F: Future>(&self, name: &str, fut: F) -> F::Output {
        self.measure_async(name, fut).await.into_output()
    }

    /// Async twin of [`Monitor::measure`]. Joining the sampler and the
    /// sink write both run on the blocking pool.
    pub async fn measure_async<F: Future>(&self, name: &str, fut: F) -> Measured<F::Output> {
        let name = self.resolve_name(name);
        if !self.enabled {
            return Measured {
                output: fut.await,
                name,
                record: None,
                persisted: None,
            };
        }

        // Also stopped on drop if this future is cancelled mid-await; that
        // path joins inline, bounded by one probe read.
        let sampler = self.start_sampler(&name);
        let started = Instant::now();
        let output = fut.await;
        let duration = started.elapsed();
        let series = tokio::task::spawn_blocking(move || sampler.map(Sampler::finish))
            .await
            .ok()
            .flatten()
            .unwrap_or_default();

        let record = self.build_record(&name, series, duration);
        let persisted = if self.persist {
            let sink = self.sink.clone();
            let key = name.clone();
            let rec = record.clone();
            let res = tokio::task::spawn_blocking(move || sink.append(&key, &rec))
                .await
                .map_err(SinkWriteError::from)
                .and_then(|r| r);
            if let Err(e) = &res {
                warn!(operation = %name, error = %e, "failed to persist usage record");
            }
            Some(res)
        } else {
            None
        };

        Measured {
            output,
            name,
            record: Some(record),
            persisted,
        }
    }

    // ── Internals ───────────────────────────────────────────────

    fn start_sampler(&self, name: &str) -> Option<Sampler> {
        match Sampler::start((self.probe)(), self.interval) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(operation = %name, error = %e, "sampler unavailable, measuring duration only");
                None
            }
        }
    }

    fn build_record(&self, name: &str, series: Series, duration: Duration) -> Record {
        debug!(
            operation = %name,
            samples = series.len(),
            secs = duration.as_secs_f64(),
            "measurement complete"
        );
        Record::new(series, duration)
    }

    fn write(&self, name: &str, record: &Record) -> Result<(), SinkWriteError> {
        let res = self.sink.append(name, record);
        if let Err(e) = &res {
            warn!(operation = %name, error = %e, "failed to persist usage record");
        }
        res
    }
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("enabled", &self.enabled)
            .field("persist", &self.persist)
            .field("name", &self.name)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

/// Key used when a function type carries no usable name (fn pointers,
/// trait objects).
pub const ANONYMOUS_OPERATION: &str = "anonymous";

/// Short name of a function type: the last path segment of its type
/// name. Closures resolve to the function that defines them.
pub fn operation_name<F: ?Sized>() -> &'static str {
    let full = std::any::type_name::<F>();
    let path = full.split('<').next().unwrap_or(full);
    let path = path.trim_end_matches("::{{closure}}");
    match path.rsplit("::").next() {
        Some(last) if is_identifier(last) => last,
        _ => ANONYMOUS_OPERATION,
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe;
    use crate::sink::MemorySink;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn const_monitor(value: f64, config: MonitorConfig) -> Monitor {
        Monitor::with_probe(
            config,
            move || Box::new(probe::from_fn(move || Ok(value))) as Box<dyn Probe>,
            Arc::new(MemorySink::new()),
        )
        .unwrap()
    }

    fn parse_pdf(pages: u32) -> u32 {
        thread::sleep(Duration::from_millis(15));
        pages * 2
    }

    #[test]
    fn zero_interval_rejected_up_front() {
        let config = MonitorConfig {
            interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(Monitor::cpu(config).is_err());
    }

    #[test]
    fn override_name_wins() {
        let m = const_monitor(
            1.0,
            MonitorConfig {
                name: Some("custom".into()),
                ..Default::default()
            },
        );
        assert_eq!(m.resolve_name("whatever"), "custom");
        let out = m.measure("whatever", || 5);
        assert_eq!(out.name, "custom");
    }

    #[test]
    fn function_names_are_derived() {
        let f = parse_pdf;
        fn name_of<F>(_: &F) -> &'static str {
            operation_name::<F>()
        }
        assert_eq!(name_of(&f), "parse_pdf");
    }

    #[test]
    fn unnamed_function_types_fall_back() {
        assert_eq!(operation_name::<fn(u32) -> u32>(), ANONYMOUS_OPERATION);
        assert_eq!(operation_name::<dyn Fn(u32) -> u32>(), ANONYMOUS_OPERATION);
        assert_eq!(operation_name::<u32>(), "u32");
    }

    #[test]
    fn wrapped_fn_pointer_lands_under_anonymous() {
        let sink = Arc::new(MemorySink::new());
        let m = Monitor::with_probe(
            MonitorConfig {
                interval: Duration::from_millis(5),
                sink: Some(sink.clone()),
                ..Default::default()
            },
            || Box::new(probe::from_fn(|| Ok(7.0))) as Box<dyn Probe>,
            Arc::new(MemorySink::new()),
        )
        .unwrap();

        let ptr: fn(u32) -> u32 = parse_pdf;
        assert_eq!(m.wrap(ptr)(2), 4);
        assert_eq!(sink.names(), vec![ANONYMOUS_OPERATION]);
    }

    #[test]
    fn wrap_records_under_function_name() {
        let sink = Arc::new(MemorySink::new());
        let m = Monitor::with_probe(
            MonitorConfig {
                interval: Duration::from_millis(5),
                sink: Some(sink.clone()),
                ..Default::default()
            },
            || Box::new(probe::from_fn(|| Ok(7.0))) as Box<dyn Probe>,
            Arc::new(MemorySink::new()),
        )
        .unwrap();

        let wrapped = m.wrap(parse_pdf);
        assert_eq!(wrapped(21), 42);
        assert_eq!(wrapped(1), 2);

        let history = sink.history("parse_pdf");
        assert_eq!(history.len(), 2);
        assert!(history[0].duration() >= Duration::from_millis(15));
    }

    #[test]
    fn persist_off_builds_but_does_not_write() {
        let sink = Arc::new(MemorySink::new());
        let m = const_monitor(
            3.0,
            MonitorConfig {
                persist: false,
                sink: Some(sink.clone()),
                ..Default::default()
            },
        );
        let out = m.measure("dry_run", || "ok");
        assert_eq!(out.output, "ok");
        assert!(out.record.is_some());
        assert!(out.persisted.is_none());
        assert!(sink.is_empty());
    }

    #[test]
    fn panicking_operation_still_stops_sampler() {
        let reads = Arc::new(AtomicUsize::new(0));
        let counter = reads.clone();
        let sink = Arc::new(MemorySink::new());
        let m = Monitor::with_probe(
            MonitorConfig {
                interval: Duration::from_millis(2),
                sink: Some(sink.clone()),
                ..Default::default()
            },
            move || {
                let counter = counter.clone();
                Box::new(probe::from_fn(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(1.0)
                })) as Box<dyn Probe>
            },
            Arc::new(MemorySink::new()),
        )
        .unwrap();

        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            m.call("explodes", || -> u8 {
                thread::sleep(Duration::from_millis(30));
                panic!("op failed")
            })
        }));
        assert!(res.is_err());

        let after = reads.load(Ordering::SeqCst);
        assert!(after > 0, "sampler never ran");
        thread::sleep(Duration::from_millis(40));
        assert_eq!(reads.load(Ordering::SeqCst), after);
        assert!(sink.is_empty());
    }
}
