// src/bin/route_limiter_bench.rs

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use structopt::StructOpt;
use tokio::sync::{Barrier, Semaphore};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use route_limiter::config::{InMemoryConfig, RedisConfig, RemoteStoreConfig};
use route_limiter::storage::{MemoryStorage, RedisStorage, RestStorage};
use route_limiter::{
    BoundedLocalLimiter, RateLimitConfig, RateLimiter, Registry, RemoteStoreLimiter,
};

#[derive(Debug, Clone, StructOpt)]
#[structopt(
    name = "route_limiter_bench",
    about = "Measure throughput of the route rate limiter backends"
)]
struct Opt {
    /// Backend to benchmark ("rest" reads UPSTASH_REDIS_REST_URL / _TOKEN)
    #[structopt(short, long, possible_values = &["memory", "redis", "rest"], default_value = "memory")]
    storage: String,

    /// Redis URL (when using Redis storage)
    #[structopt(long, default_value = "redis://localhost:6379")]
    redis_url: String,

    /// Path prefix the benchmark rule applies to
    #[structopt(short, long, default_value = "/bench")]
    path: String,

    /// Maximum number of requests allowed per caller
    #[structopt(short, long, default_value = "1000")]
    max_requests: u64,

    /// Window duration in seconds
    #[structopt(short, long, default_value = "60")]
    window_seconds: u64,

    /// Number of concurrent callers to simulate
    #[structopt(short = "u", long, default_value = "10")]
    num_users: usize,

    /// Number of requests per caller
    #[structopt(short = "r", long, default_value = "100")]
    requests_per_user: usize,

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
    dotenv::dotenv().ok();
    let opt = Opt::from_args();

    let filter = if opt.disable_logs {
        "route_limiter_bench=error,route_limiter=error".to_string()
    } else {
        let log_level = match opt.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        format!("route_limiter_bench={},route_limiter={}", log_level, log_level)
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(filter))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })?;

    let registry = Registry::empty().with_rule(
        opt.path.clone(),
        RateLimitConfig::new(opt.max_requests, Duration::from_secs(opt.window_seconds))?,
    )?;

    let (limiter, name): (Arc<dyn RateLimiter>, &str) = match opt.storage.as_str() {
        "memory" => {
            let storage = MemoryStorage::new(InMemoryConfig {
                max_entries: 100_000,
                cleanup_threshold: 80_000,
                use_background_task: true,
                ..InMemoryConfig::default()
            });
            (
                Arc::new(BoundedLocalLimiter::with_storage(registry, storage)),
                "Fixed Window (Memory)",
            )
        }
        "redis" => {
            let config = RedisConfig {
                url: opt.redis_url.clone(),
                key_prefix: "route_limiter_bench".to_string(),
                connection_timeout: Duration::from_secs(5),
            };
            let storage = match RedisStorage::new(config).await {
                Ok(storage) => storage,
                Err(e) => {
                    error!("Failed to connect to Redis: {}", e);
                    return Err(format!("Failed to connect to Redis: {}", e).into());
                }
            };
            (
                Arc::new(RemoteStoreLimiter::new(storage, registry)),
                "Sliding Window (Redis)",
            )
        }
        "rest" => {
            let Some(config) = RemoteStoreConfig::from_env() else {
                return Err("UPSTASH_REDIS_REST_URL and UPSTASH_REDIS_REST_TOKEN must be set".into());
            };
            (
                Arc::new(RemoteStoreLimiter::new(RestStorage::new(config)?, registry)),
                "Sliding Window (REST)",
            )
        }
        other => return Err(format!("Unknown storage backend: {}", other).into()),
    };

    if !opt.disable_logs {
        info!(
            "Configuration: max_requests={}, window={}s, backend={}",
            opt.max_requests,
            opt.window_seconds,
            limiter.backend_name()
        );
    }

    run_benchmark(limiter, name, opt, stop).await
}

async fn run_benchmark(
    limiter: Arc<dyn RateLimiter>,
    name: &str,
    opt: Opt,
    stop: Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("\nRunning benchmark: {}", name);
    println!("======================={}", "=".repeat(name.len()));

    let total = (opt.iterations * opt.num_users * opt.requests_per_user) as u64;
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )?
        .progress_chars("=> "),
    );

    let mut total_duration = Duration::from_secs(0);
    let mut total_allowed = 0;
    let mut total_denied = 0;
    let mut completed_iterations = 0u32;

    for iteration in 0..opt.iterations {
        if stop.load(Ordering::SeqCst) {
            warn!("Interrupted, skipping remaining iterations");
            break;
        }
        pb.set_message(format!("iteration {}/{}", iteration + 1, opt.iterations));

        // Each iteration starts from an empty window
        for i in 0..opt.num_users {
            limiter.reset(&format!("user_{}", i), &opt.path).await;
        }

        let start_time = Instant::now();

        let barrier = Arc::new(Barrier::new(opt.num_users));
        let semaphore = Arc::new(Semaphore::new(opt.concurrency));
        let mut handles = Vec::with_capacity(opt.num_users);

        for user_id in 0..opt.num_users {
            let limiter = Arc::clone(&limiter);
            let barrier = Arc::clone(&barrier);
            let semaphore = Arc::clone(&semaphore);
            let stop = Arc::clone(&stop);
            let pb = pb.clone();
            let identifier = format!("user_{}", user_id);
            let path = opt.path.clone();
            let requests_per_user = opt.requests_per_user;

            handles.push(tokio::spawn(async move {
                barrier.wait().await;

                let mut allowed = 0;
                let mut denied = 0;

                for _ in 0..requests_per_user {
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }
                    let Ok(_permit) = semaphore.acquire().await else {
                        break;
                    };

                    if limiter.check(&identifier, &path).await.allowed {
                        allowed += 1;
                    } else {
                        denied += 1;
                    }
                    pb.inc(1);
                }

                (allowed, denied)
            }));
        }

        let results = futures::future::join_all(handles).await;

        let mut iteration_allowed = 0;
        let mut iteration_denied = 0;
        for result in results {
            match result {
                Ok((allowed, denied)) => {
                    iteration_allowed += allowed;
                    iteration_denied += denied;
                }
                Err(e) => error!("Benchmark task failed: {}", e),
            }
        }

        let elapsed = start_time.elapsed();
        total_duration += elapsed;
        total_allowed += iteration_allowed;
        total_denied += iteration_denied;
        completed_iterations += 1;

        let total_requests = iteration_allowed + iteration_denied;
        let requests_per_second = total_requests as f64 / elapsed.as_secs_f64();

        pb.println(format!(
            "Iteration {}: {:?}, {} allowed, {} denied, {:.2} req/sec",
            iteration + 1,
            elapsed,
            iteration_allowed,
            iteration_denied,
            requests_per_second
        ));
    }

    pb.finish_with_message("Done");

    let total_requests = total_allowed + total_denied;
    if completed_iterations == 0 || total_requests == 0 {
        println!("\nNo requests completed");
        return Ok(());
    }

    let avg_duration = total_duration / completed_iterations;
    let avg_requests_per_second = total_requests as f64 / total_duration.as_secs_f64();

    println!("\nBenchmark Results for {}:", name);
    println!("  Total Requests:     {}", total_requests);
    println!(
        "  Allowed:            {} ({:.1}%)",
        total_allowed,
        100.0 * total_allowed as f64 / total_requests as f64
    );
    println!(
        "  Denied:             {} ({:.1}%)",
        total_denied,
        100.0 * total_denied as f64 / total_requests as f64
    );
    println!("  Avg. Duration:      {:?}", avg_duration);
    println!(
        "  Avg. Throughput:    {:.2} requests/second",
        avg_requests_per_second
    );

    Ok(())
}
