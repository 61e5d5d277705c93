// src/bin/gateway_bench.rs

use std::sync::Arc;
use std::time::{Duration, Instant};
use structopt::StructOpt;
use tokio::sync::{Barrier, Semaphore};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use gateway_core::cache::CacheManager;
use gateway_core::config::{CacheConfig, CircuitBreakerConfig};
use gateway_core::resilience::CircuitBreakerRegistry;

#[derive(Debug, Clone, StructOpt)]
#[structopt(
    name = "gateway_bench",
    about = "A benchmarking tool for the gateway cache and circuit breakers"
)]
struct Opt {
    /// Component to benchmark
    #[structopt(short, long, possible_values = &["cache", "breaker", "all"], default_value = "all")]
    target: String,

    /// Maximum number of cache entries
    #[structopt(long, default_value = "10000")]
    max_entries: usize,

    /// Number of distinct keys (cache) or services (breaker) per worker
    #[structopt(short, long, default_value = "1000")]
    keys: usize,

    /// Number of concurrent workers
    #[structopt(short = "u", long, default_value = "10")]
    num_workers: usize,

    /// Number of operations per worker
    #[structopt(short = "r", long, default_value = "10000")]
    ops_per_worker: usize,

    /// Number of iterations to run
    #[structopt(short, long, default_value = "3")]
    iterations: usize,

    /// Maximum concurrency level
    #[structopt(short = "c", long, default_value = "100")]
    concurrency: usize,

    /// Verbosity level
    #[structopt(short, long, parse(from_occurrences))]
    verbose: usize,

    /// Disable logs
    #[structopt(long)]
    disable_logs: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opt = Opt::from_args();

    let filter = if opt.disable_logs {
        EnvFilter::new("gateway_bench=error,gateway_core=error")
    } else {
        let log_level = match opt.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        EnvFilter::new(format!(
            "gateway_bench={},gateway_core={}",
            log_level, log_level
        ))
    };
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if opt.num_workers == 0 || opt.keys == 0 || opt.iterations == 0 {
        return Err("workers, keys and iterations must be > 0".into());
    }

    let targets = if opt.target == "all" {
        vec!["cache", "breaker"]
    } else {
        vec![opt.target.as_str()]
    };

    for target in targets {
        match target {
            "cache" => benchmark_cache(&opt).await?,
            "breaker" => benchmark_breaker(&opt).await?,
            _ => return Err(format!("Unknown target: {}", target).into()),
        }
    }

    Ok(())
}

async fn benchmark_cache(opt: &Opt) -> Result<(), Box<dyn std::error::Error>> {
    let cache: Arc<CacheManager<String>> = Arc::new(CacheManager::new(CacheConfig {
        max_entries: opt.max_entries,
        default_ttl: Duration::from_secs(60),
        ..CacheConfig::default()
    })?);

    if !opt.disable_logs {
        info!(
            max_entries = opt.max_entries,
            keys = opt.keys,
            "Benchmarking cache"
        );
    }

    let keys = opt.keys;
    run_benchmark("Cache get/set (1 write : 3 reads)", opt, move |worker, op| {
        let cache = cache.clone();
        async move {
            let key = format!("w{}-k{}", worker, op % keys);
            if op % 4 == 0 {
                cache.set(key, format!("value-{}", op))
            } else {
                cache.get(&key).is_some()
            }
        }
    })
    .await
}

async fn benchmark_breaker(opt: &Opt) -> Result<(), Box<dyn std::error::Error>> {
    let registry = Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig {
        failure_threshold: 5,
        timeout: Duration::from_millis(10),
        services: Vec::new(),
    })?);

    if !opt.disable_logs {
        info!(services = opt.keys, "Benchmarking circuit breakers");
    }

    let keys = opt.keys;
    run_benchmark("Circuit breaker check/record (10% failures)", opt, move |worker, op| {
        let registry = registry.clone();
        async move {
            let service = format!("service-{}", (worker * 31 + op) % keys);
            if registry.is_available(&service).await {
                registry.record_result(&service, op % 10 != 0).await;
                true
            } else {
                false
            }
        }
    })
    .await
}

/// Run `op(worker, index)` `ops_per_worker` times on every worker, all
/// workers released together, and print throughput per iteration
async fn run_benchmark<F, Fut>(name: &str, opt: &Opt, op: F) -> Result<(), Box<dyn std::error::Error>>
where
    F: Fn(usize, usize) -> Fut + Send + Sync + Clone + 'static,
    Fut: std::future::Future<Output = bool> + Send + 'static,
{
    println!("\nRunning benchmark: {}", name);
    println!("======================={}", "=".repeat(name.len()));

    let mut total_duration = Duration::from_secs(0);
    let mut total_ok = 0;
    let mut total_other = 0;

    for iteration in 0..opt.iterations {
        if !opt.disable_logs {
            info!("Starting iteration {} of {}", iteration + 1, opt.iterations);
        }

        let start_time = Instant::now();

        // Create a barrier to start all tasks at once
        let barrier = Arc::new(Barrier::new(opt.num_workers));
        let semaphore = Arc::new(Semaphore::new(opt.concurrency.max(1)));
        let mut handles = Vec::with_capacity(opt.num_workers);

        for worker in 0..opt.num_workers {
            let op = op.clone();
            let barrier = barrier.clone();
            let semaphore = semaphore.clone();
            let ops = opt.ops_per_worker;

            handles.push(tokio::spawn(async move {
                barrier.wait().await;

                let mut ok = 0usize;
                let mut other = 0usize;
                for i in 0..ops {
                    // Closed semaphore means the benchmark is being torn down
                    let Ok(_permit) = semaphore.acquire().await else {
                        break;
                    };
                    if op(worker, i).await {
                        ok += 1;
                    } else {
                        other += 1;
                    }
                }
                (ok, other)
            }));
        }

        let results = futures::future::join_all(handles).await;

        let mut iteration_ok = 0;
        let mut iteration_other = 0;
        for result in results {
            match result {
                Ok((ok, other)) => {
                    iteration_ok += ok;
                    iteration_other += other;
                }
                Err(e) => warn!("Worker failed: {}", e),
            }
        }

        let elapsed = start_time.elapsed();
        total_duration += elapsed;
        total_ok += iteration_ok;
        total_other += iteration_other;

        let total_ops = iteration_ok + iteration_other;
        println!(
            "Iteration {}: {:?}, {} ok, {} other, {:.2} ops/sec",
            iteration + 1,
            elapsed,
            iteration_ok,
            iteration_other,
            total_ops as f64 / elapsed.as_secs_f64()
        );
    }

    let total_ops = total_ok + total_other;
    println!("\nBenchmark Results for {}:", name);
    println!("  Total Operations:   {}", total_ops);
    println!(
        "  Ok:                 {} ({:.1}%)",
        total_ok,
        100.0 * total_ok as f64 / total_ops.max(1) as f64
    );
    println!("  Avg. Duration:      {:?}", total_duration / opt.iterations as u32);
    println!(
        "  Avg. Throughput:    {:.2} ops/second",
        total_ops as f64 / total_duration.as_secs_f64()
    );

    Ok(())
}
