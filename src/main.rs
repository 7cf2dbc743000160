use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

use cpu_monitor::report::{self, UsageSummary};
use cpu_monitor::sink::memory;
use cpu_monitor::{
    redis_client, timing, Monitor, MonitorConfig, RedisSink, ResourceKind, Settings, Sink,
};

/// Runs per workload, so the report has something to average.
const RUNS: usize = 3;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!();
    println!("╔══════════════════════════════════════════════════╗");
    println!("║   🔬  CPU / RAM USAGE MONITOR                    ║");
    println!("╚══════════════════════════════════════════════════╝");
    println!();

    // ── 1. Load settings ─────────────────────────────────────────
    let settings = Settings::from_env().unwrap_or_else(|e| {
        eprintln!("❌ {e}");
        std::process::exit(1);
    });
    if !settings.enabled {
        println!("⚠️  Monitoring disabled (set MONITOR_ENABLED=1 to turn it on)");
    }

    // ── 2. Pick sinks ────────────────────────────────────────────
    let (cpu_sink, ram_sink) = match &settings.redis_url {
        Some(url) => {
            println!("🔌 Persisting to Redis at {url}");
            (redis_sink(url, ResourceKind::Cpu), redis_sink(url, ResourceKind::Ram))
        }
        None => {
            println!("🧠 Persisting in memory");
            (None, None)
        }
    };

    // ── 3. Build monitors ────────────────────────────────────────
    let cpu = Monitor::cpu(MonitorConfig {
        sink: cpu_sink,
        ..settings.monitor_config()
    })
    .unwrap_or_else(|e| {
        eprintln!("❌ {e}");
        std::process::exit(1);
    });
    let ram = Monitor::ram(MonitorConfig {
        sink: ram_sink,
        ..settings.monitor_config()
    })
    .unwrap_or_else(|e| {
        eprintln!("❌ {e}");
        std::process::exit(1);
    });

    // ── 4. Run workloads ─────────────────────────────────────────
    println!("🏃 Running {RUNS} rounds of each workload...");
    for round in 0..RUNS {
        let seed = 1000 + round as u64;

        cpu.call("busy_hash", || busy_hash(seed));
        ram.call("grow_buffers", || grow_buffers(seed));
        cpu.call_async("sleepy_io", sleepy_io(seed)).await;

        let both = ram.call("mixed", || cpu.call("mixed", || busy_hash(seed)));
        black_box(both);
    }
    println!("   ✓ done");
    println!();

    if !settings.enabled {
        return;
    }

    // ── 5. Report ────────────────────────────────────────────────
    let (cpu_report, ram_report) = match &settings.redis_url {
        Some(url) => timing::timed_async("load_usage_data", redis_reports(url)).await,
        None => (
            report::summarize_snapshot(&memory::cpu_usage_results().snapshot(), ResourceKind::Cpu),
            report::summarize_snapshot(&memory::ram_usage_results().snapshot(), ResourceKind::Ram),
        ),
    };

    print_section("CPU Usage", &cpu_report);
    print_section("RAM Usage", &ram_report);
}

fn redis_sink(url: &str, kind: ResourceKind) -> Option<Arc<dyn Sink>> {
    match RedisSink::for_resource(url, kind) {
        Ok(sink) => Some(Arc::new(sink)),
        Err(e) => {
            eprintln!("❌ Invalid Redis URL \"{url}\": {e}");
            std::process::exit(1);
        }
    }
}

async fn redis_reports(url: &str) -> (Vec<UsageSummary>, Vec<UsageSummary>) {
    let mut conn = redis_client::connect(url).await.unwrap_or_else(|e| {
        eprintln!("❌ Cannot connect to Redis: {e}");
        eprintln!("   Make sure redis-server is running");
        std::process::exit(1);
    });

    let mut summaries = Vec::with_capacity(2);
    for kind in [ResourceKind::Cpu, ResourceKind::Ram] {
        match report::load_usage_data(&mut conn, kind).await {
            Ok(data) => summaries.push(report::summarize_all(&data, kind)),
            Err(e) => {
                tracing::warn!(error = %e, ?kind, "failed to load usage data");
                summaries.push(Vec::new());
            }
        }
    }

    let ram = summaries.pop().unwrap_or_default();
    let cpu = summaries.pop().unwrap_or_default();
    (cpu, ram)
}

fn print_section(title: &str, summaries: &[UsageSummary]) {
    println!("── {title} ─────────────────────────────────────");
    if summaries.is_empty() {
        println!("   (no samples)");
    }
    for s in summaries {
        println!("   {s}");
    }
    println!();
}

// ─── Synthetic workloads ─────────────────────────────────────────

/// CPU-bound: hash a few million random words.
fn busy_hash(seed: u64) -> u64 {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut acc = 0xcbf2_9ce4_8422_2325u64;
    for _ in 0..5_000_000 {
        acc ^= rng.gen::<u64>();
        acc = acc.wrapping_mul(0x0100_0000_01b3);
    }
    acc
}

/// Memory-bound: grow then release a pile of buffers.
fn grow_buffers(seed: u64) -> usize {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut buffers = Vec::new();
    for _ in 0..64 {
        let len = rng.gen_range(256 * 1024..1024 * 1024);
        buffers.push(vec![rng.gen::<u8>(); len]);
        std::thread::sleep(Duration::from_millis(5));
    }
    buffers.iter().map(Vec::len).sum()
}

/// Mostly idle: a handful of short async waits.
async fn sleepy_io(seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    for _ in 0..5 {
        let ms = rng.gen_range(40..120);
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}
