//! Sampling sources.
//!
//! A [`Probe`] is anything that can report one scalar reading on demand.
//! The sampler calls [`Probe::prime`] once when it starts, then
//! [`Probe::read`] once per interval.

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use crate::error::SamplingReadError;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// A single scalar reading source.
pub trait Probe: Send {
    /// Establish a baseline. Whatever this observes is never reported.
    fn prime(&mut self) -> Result<(), SamplingReadError> {
        Ok(())
    }

    /// Take one reading.
    fn read(&mut self) -> Result<f64, SamplingReadError>;
}

/// Adapts a closure into a [`Probe`]. See [`from_fn`].
pub struct FnProbe<F>(F);

/// Build a probe from a closure. Handy for synthetic sources in tests.
pub fn from_fn<F>(f: F) -> FnProbe<F>
where
    F: FnMut() -> Result<f64, SamplingReadError> + Send,
{
    FnProbe(f)
}

impl<F> Probe for FnProbe<F>
where
    F: FnMut() -> Result<f64, SamplingReadError> + Send,
{
    fn read(&mut self) -> Result<f64, SamplingReadError> {
        (self.0)()
    }
}

impl Probe for Box<dyn Probe> {
    fn prime(&mut self) -> Result<(), SamplingReadError> {
        (**self).prime()
    }

    fn read(&mut self) -> Result<f64, SamplingReadError> {
        (**self).read()
    }
}

// ─── Resource kinds ──────────────────────────────────────────────

/// What a series measures. Decides the external key prefix and how the
/// report labels it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Host-wide CPU utilization, percent.
    Cpu,
    /// Resident memory of this process, MB.
    Ram,
}

impl ResourceKind {
    pub fn key_prefix(self) -> &'static str {
        match self {
            Self::Cpu => "cpu_usage_",
            Self::Ram => "ram_usage_",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Self::Cpu => "%",
            Self::Ram => "MB",
        }
    }
}

// ─── CPU ─────────────────────────────────────────────────────────

/// Global CPU utilization (0.0–100.0) since the previous read.
pub struct CpuProbe {
    sys: System,
}

impl CpuProbe {
    pub fn new() -> Self {
        Self { sys: System::new() }
    }
}

impl Default for CpuProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Probe for CpuProbe {
    fn prime(&mut self) -> Result<(), SamplingReadError> {
        // First refresh only seeds the tick counters.
        self.sys.refresh_cpu_usage();
        if self.sys.cpus().is_empty() {
            return Err(SamplingReadError::Unsupported);
        }
        Ok(())
    }

    fn read(&mut self) -> Result<f64, SamplingReadError> {
        self.sys.refresh_cpu_usage();
        if self.sys.cpus().is_empty() {
            return Err(SamplingReadError::Unsupported);
        }
        let usage = f64::from(self.sys.global_cpu_usage());
        Ok(usage.clamp(0.0, 100.0))
    }
}

// ─── RAM ─────────────────────────────────────────────────────────

/// Resident set size of the current process, in MB.
pub struct RamProbe {
    sys: System,
    pid: Option<Pid>,
}

impl RamProbe {
    pub fn new() -> Self {
        Self {
            sys: System::new(),
            pid: sysinfo::get_current_pid().ok(),
        }
    }
}

impl Default for RamProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Probe for RamProbe {
    fn read(&mut self) -> Result<f64, SamplingReadError> {
        let pid = self.pid.ok_or(SamplingReadError::ProcessNotFound)?;
        self.sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::new().with_memory(),
        );
        let process = self
            .sys
            .process(pid)
            .ok_or(SamplingReadError::ProcessNotFound)?;
        Ok(process.memory() as f64 / BYTES_PER_MB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_probe_reads_in_order() {
        let mut n = 0.0;
        let mut probe = from_fn(move || {
            n += 1.0;
            Ok(n)
        });
        assert!(probe.prime().is_ok());
        assert_eq!(probe.read().unwrap(), 1.0);
        assert_eq!(probe.read().unwrap(), 2.0);
    }

    #[test]
    fn key_prefixes_match_resource() {
        assert_eq!(ResourceKind::Cpu.key_prefix(), "cpu_usage_");
        assert_eq!(ResourceKind::Ram.key_prefix(), "ram_usage_");
        assert_eq!(ResourceKind::Ram.unit(), "MB");
    }

    #[test]
    fn cpu_reading_is_a_percentage() {
        let mut probe = CpuProbe::new();
        if probe.prime().is_err() {
            return;
        }
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        let pct = probe.read().unwrap();
        assert!((0.0..=100.0).contains(&pct));
    }

    #[test]
    fn ram_reading_is_positive() {
        let mut probe = RamProbe::new();
        let mb = probe.read().unwrap();
        assert!(mb > 0.0);
    }
}
