// src/bin/gateway_cli.rs

use indicatif::{ProgressBar, ProgressStyle};
use prettytable::{row, Table};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use structopt::StructOpt;
use tokio::time;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use gateway_core::cache::CacheManager;
use gateway_core::config::{CacheConfig, CircuitBreakerConfig, GatewayConfig};
use gateway_core::discovery::{ServiceDiscovery, ServiceRecord};
use gateway_core::resilience::CircuitBreakerRegistry;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "gateway_cli",
    about = "Inspect backend health and exercise the gateway cache and circuit breakers"
)]
struct Opt {
    /// Verbosity level
    #[structopt(short, long, parse(from_occurrences), global = true)]
    verbose: usize,

    /// Disable logs
    #[structopt(long, global = true)]
    disable_logs: bool,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Run one health sweep and print the service directory
    Health {
        /// JSON configuration file; environment variables are used otherwise
        #[structopt(short, long, parse(from_os_str))]
        config: Option<PathBuf>,

        /// Per-probe timeout in milliseconds
        #[structopt(short, long)]
        timeout_ms: Option<u64>,
    },

    /// Sweep periodically until interrupted
    Watch {
        #[structopt(short, long, parse(from_os_str))]
        config: Option<PathBuf>,

        /// Delay between sweeps in milliseconds
        #[structopt(short, long, default_value = "5000")]
        interval_ms: u64,
    },

    /// Drive the cache with a random get/set workload
    CacheSim {
        #[structopt(long, default_value = "100")]
        max_entries: usize,

        /// Byte budget for the whole cache
        #[structopt(long, default_value = "65536")]
        max_size: usize,

        #[structopt(long, default_value = "200")]
        ttl_ms: u64,

        /// Number of operations to run
        #[structopt(short = "n", long, default_value = "10000")]
        operations: usize,

        /// Number of distinct keys
        #[structopt(short, long, default_value = "250")]
        keys: usize,

        /// Share of operations that are writes
        #[structopt(long, default_value = "0.3")]
        write_ratio: f64,

        #[structopt(long)]
        seed: Option<u64>,
    },

    /// Push random outcomes through one circuit breaker
    BreakerSim {
        #[structopt(short, long, default_value = "5")]
        threshold: u32,

        /// How long the circuit stays open, in milliseconds
        #[structopt(long, default_value = "500")]
        timeout_ms: u64,

        #[structopt(short = "n", long, default_value = "200")]
        requests: usize,

        /// Probability that a call fails
        #[structopt(short, long, default_value = "0.4")]
        failure_rate: f64,

        /// Delay between calls in milliseconds
        #[structopt(short, long, default_value = "20")]
        delay_ms: u64,

        #[structopt(long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opt = Opt::from_args();

    let filter = if opt.disable_logs {
        EnvFilter::new("gateway_cli=error,gateway_core=error")
    } else {
        let log_level = match opt.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        EnvFilter::new(format!(
            "gateway_cli={},gateway_core={}",
            log_level, log_level
        ))
    };
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match opt.command {
        Command::Health { config, timeout_ms } => run_health(config, timeout_ms).await,
        Command::Watch {
            config,
            interval_ms,
        } => run_watch(config, Duration::from_millis(interval_ms)).await,
        Command::CacheSim {
            max_entries,
            max_size,
            ttl_ms,
            operations,
            keys,
            write_ratio,
            seed,
        } => {
            let config = CacheConfig {
                max_size,
                max_entries,
                default_ttl: Duration::from_millis(ttl_ms),
                use_background_task: false,
                ..CacheConfig::default()
            };
            run_cache_sim(config, operations, keys, write_ratio, seed)
        }
        Command::BreakerSim {
            threshold,
            timeout_ms,
            requests,
            failure_rate,
            delay_ms,
            seed,
        } => {
            let config = CircuitBreakerConfig {
                failure_threshold: threshold,
                timeout: Duration::from_millis(timeout_ms),
                services: vec![SIM_SERVICE.to_string()],
            };
            run_breaker_sim(
                config,
                requests,
                failure_rate,
                Duration::from_millis(delay_ms),
                seed,
            )
            .await
        }
    }
}

fn load_config(path: Option<PathBuf>) -> gateway_core::Result<GatewayConfig> {
    match path {
        Some(path) => GatewayConfig::from_json_file(path),
        None => {
            dotenv::dotenv().ok();
            GatewayConfig::from_env()
        }
    }
}

fn rng_from(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

fn print_services(services: &[ServiceRecord]) {
    let mut table = Table::new();
    table.set_titles(row![
        "Service",
        "URL",
        "Status",
        "Response (ms)",
        "Version",
        "Uptime (s)",
        "Last error"
    ]);

    for record in services {
        table.add_row(row![
            record.name,
            record.url,
            format!("{:?}", record.status).to_uppercase(),
            record
                .response_time_ms
                .map(|ms| ms.to_string())
                .unwrap_or_else(|| "-".to_string()),
            record.version.as_deref().unwrap_or("-"),
            record
                .uptime
                .map(|s| format!("{:.0}", s))
                .unwrap_or_else(|| "-".to_string()),
            record.last_error.as_deref().unwrap_or("")
        ]);
    }

    table.printstd();
}

async fn run_health(
    config: Option<PathBuf>,
    timeout_ms: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(config)?;
    if let Some(ms) = timeout_ms {
        config.discovery.check_timeout = Duration::from_millis(ms);
    }

    let discovery = ServiceDiscovery::new(config.discovery)?;
    let started = Instant::now();
    let services = discovery.check_all_services().await;

    print_services(&services);
    let stats = discovery.get_health_check_stats().await;
    println!(
        "{}/{} healthy ({:.1}%), sweep took {:?}",
        stats.healthy,
        stats.total_services,
        stats.health_ratio,
        started.elapsed()
    );

    Ok(())
}

async fn run_watch(
    config: Option<PathBuf>,
    interval: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config)?;
    let discovery = ServiceDiscovery::new(config.discovery)?;

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
    })?;

    info!(interval_ms = interval.as_millis() as u64, "Watching services, press Ctrl-C to stop");

    let tick = Duration::from_millis(100);
    let mut sweep = 0usize;
    while running.load(Ordering::SeqCst) {
        sweep += 1;
        let services = discovery.check_all_services().await;
        println!("\nSweep {} at {}", sweep, chrono::Utc::now().format("%H:%M:%S"));
        print_services(&services);

        // Sleep in short steps so Ctrl-C is noticed quickly
        let wake_at = Instant::now() + interval;
        while running.load(Ordering::SeqCst) && Instant::now() < wake_at {
            time::sleep(tick).await;
        }
    }

    println!("Stopped after {} sweeps", sweep);
    Ok(())
}

fn run_cache_sim(
    config: CacheConfig,
    operations: usize,
    keys: usize,
    write_ratio: f64,
    seed: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    if keys == 0 {
        return Err("need at least one key".into());
    }

    let cache: CacheManager<String> = CacheManager::with_sizer(
        config,
        Arc::new(|value: &String| Ok(value.len())),
    )?;
    let mut rng = rng_from(seed);

    let progress = ProgressBar::new(operations as u64);
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );

    let started = Instant::now();
    let mut rejected = 0usize;
    for i in 0..operations {
        let key = format!("key-{}", rng.random_range(0..keys));
        if rng.random_bool(write_ratio.clamp(0.0, 1.0)) {
            let value = "x".repeat(rng.random_range(16..2048));
            if !cache.set(key, value) {
                rejected += 1;
            }
        } else {
            cache.get(&key);
        }

        if i % 100 == 0 {
            progress.set_message(format!("hit rate {:.1}%", cache.get_stats().hit_rate));
        }
        progress.inc(1);
    }
    progress.finish_with_message("done");

    let stats = cache.get_detailed_stats();
    let mut table = Table::new();
    table.set_titles(row!["Metric", "Value"]);
    table.add_row(row!["Operations", operations]);
    table.add_row(row!["Elapsed", format!("{:?}", started.elapsed())]);
    table.add_row(row!["Hits", stats.stats.hits]);
    table.add_row(row!["Misses", stats.stats.misses]);
    table.add_row(row!["Hit rate", format!("{:.2}%", stats.stats.hit_rate)]);
    table.add_row(row!["Evictions", stats.stats.evictions]);
    table.add_row(row!["Rejected writes", rejected]);
    table.add_row(row!["Entries", format!("{} / {}", stats.stats.entry_count, stats.max_entries)]);
    table.add_row(row!["Bytes", format!("{} / {}", stats.stats.total_size, stats.max_size)]);
    table.add_row(row!["Expired, not yet swept", stats.expired_entries]);
    table.printstd();

    Ok(())
}

const SIM_SERVICE: &str = "simulated-service";

async fn run_breaker_sim(
    config: CircuitBreakerConfig,
    requests: usize,
    failure_rate: f64,
    delay: Duration,
    seed: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let registry = CircuitBreakerRegistry::new(config)?;
    let mut rng = rng_from(seed);

    let mut succeeded = 0usize;
    let mut failed = 0usize;
    let mut rejected = 0usize;
    let mut last_state = None;

    for i in 0..requests {
        if registry.is_available(SIM_SERVICE).await {
            let ok = !rng.random_bool(failure_rate.clamp(0.0, 1.0));
            registry.record_result(SIM_SERVICE, ok).await;
            if ok {
                succeeded += 1;
            } else {
                failed += 1;
            }
        } else {
            rejected += 1;
        }

        let state = registry.get_state(SIM_SERVICE).await.map(|s| s.state);
        if state != last_state {
            println!("request {:>5}: {:?}", i + 1, state);
            last_state = state;
        }

        time::sleep(delay).await;
    }

    let mut table = Table::new();
    table.set_titles(row![
        "Service",
        "State",
        "Requests",
        "Failures",
        "Failure rate",
        "Succeeded",
        "Failed",
        "Rejected"
    ]);
    for metrics in registry.get_metrics().await {
        table.add_row(row![
            metrics.service,
            format!("{:?}", metrics.state),
            metrics.total_requests,
            metrics.failure_count,
            format!("{:.1}%", metrics.failure_rate),
            succeeded,
            failed,
            rejected
        ]);
    }
    table.printstd();

    Ok(())
}
