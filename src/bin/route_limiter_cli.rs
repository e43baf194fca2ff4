// src/bin/route_limiter_cli.rs

use prettytable::{row, Table};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use structopt::StructOpt;
use tokio::time;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use route_limiter::{create_limiter, get_limiter, RateLimitResult, RateLimiter, Registry};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "route_limiter_cli",
    about = "Simulate traffic from one caller against the route rate limiter"
)]
struct Opt {
    /// Caller identifier (usually the client IP)
    #[structopt(short, long, default_value = "127.0.0.1")]
    identifier: String,

    /// Request path to check
    #[structopt(short, long, default_value = "/api/auth/login")]
    path: String,

    /// JSON file with ordered rules ([{"prefix", "max_requests", "window_ms"}])
    #[structopt(short, long, parse(from_os_str))]
    rules: Option<PathBuf>,

    /// Always use the in-memory backend, ignoring the environment
    #[structopt(long)]
    local: bool,

    /// Simulation mode
    #[structopt(long, possible_values = &["burst", "steady", "sine_wave", "custom"], default_value = "burst")]
    simulation: String,

    /// Number of requests to simulate
    #[structopt(short = "n", long, default_value = "10")]
    num_requests: usize,

    /// Time between requests in milliseconds (for steady and sine_wave modes)
    #[structopt(short = "t", long, default_value = "100")]
    request_interval_ms: u64,

    /// Verbosity level
    #[structopt(short, long, parse(from_occurrences))]
    verbose: usize,

    /// Disable logs
    #[structopt(long)]
    disable_logs: bool,
}

struct Tally {
    table: Table,
    allowed: usize,
    denied: usize,
}

impl Tally {
    fn new() -> Self {
        let mut table = Table::new();
        table.set_titles(row!["#", "Decision", "Remaining", "Retry after (s)"]);
        Self {
            table,
            allowed: 0,
            denied: 0,
        }
    }

    fn record(&mut self, n: usize, result: &RateLimitResult, disable_logs: bool) {
        let remaining = if result.is_unlimited() {
            "unlimited".to_string()
        } else {
            result.remaining.to_string()
        };
        let retry_after = result
            .retry_after
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());

        if result.allowed {
            self.allowed += 1;
            if !disable_logs {
                info!("Request {}: ALLOWED (remaining: {})", n, remaining);
            }
            self.table.add_row(row![n, "ALLOWED", remaining, retry_after]);
        } else {
            self.denied += 1;
            if !disable_logs {
                warn!("Request {}: DENIED (retry after: {}s)", n, retry_after);
            }
            self.table.add_row(row![n, "DENIED", remaining, retry_after]);
        }
    }

    fn print(&self, title: &str, elapsed: Duration) {
        println!("\n{} Results:", title);
        self.table.printstd();

        let mut summary = Table::new();
        summary.add_row(row!["Total requests", self.allowed + self.denied]);
        summary.add_row(row!["Allowed", self.allowed]);
        summary.add_row(row!["Denied", self.denied]);
        summary.add_row(row![
            "Time elapsed",
            format!("{:?}", elapsed)
        ]);
        summary.printstd();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let opt = Opt::from_args();

    let filter = if opt.disable_logs {
        "route_limiter_cli=error,route_limiter=error".to_string()
    } else {
        let log_level = match opt.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        format!("route_limiter_cli={},route_limiter={}", log_level, log_level)
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(filter))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let registry = match &opt.rules {
        Some(path) => {
            let json = std::fs::read_to_string(path)?;
            Some(Registry::from_json(&json)?)
        }
        None => None,
    };

    let limiter: Arc<dyn RateLimiter> = if opt.local {
        Arc::new(create_limiter(registry))
    } else {
        get_limiter(registry).await
    };

    if !opt.disable_logs {
        info!(
            "Checking {} as {} with the {} backend",
            opt.path,
            opt.identifier,
            limiter.backend_name()
        );
    }

    match opt.simulation.as_str() {
        "burst" => simulate_burst(&opt, limiter.as_ref()).await,
        "steady" => simulate_paced(&opt, limiter.as_ref(), |_| 1.0, "Steady").await,
        "sine_wave" => {
            let n = opt.num_requests.max(1) as f64;
            let wave = move |i: usize| {
                // Vary interval between 0.5x and 1.5x the base interval
                let phase = (i as f64 * std::f64::consts::PI * 2.0) / n;
                1.0 + 0.5 * phase.sin()
            };
            simulate_paced(&opt, limiter.as_ref(), wave, "Sine Wave").await
        }
        "custom" => simulate_custom(&opt, limiter.as_ref()).await,
        other => {
            error!("Unknown simulation mode: {}", other);
            Err("Unknown simulation mode".into())
        }
    }
}

// Simulate a burst of requests all at once
async fn simulate_burst(
    opt: &Opt,
    limiter: &dyn RateLimiter,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut tally = Tally::new();
    let start_time = Instant::now();

    for i in 0..opt.num_requests {
        let result = limiter.check(&opt.identifier, &opt.path).await;
        tally.record(i + 1, &result, opt.disable_logs);
    }

    tally.print("Burst Simulation", start_time.elapsed());
    Ok(())
}

// Requests spaced by the base interval scaled by `factor(i)`
async fn simulate_paced<F>(
    opt: &Opt,
    limiter: &dyn RateLimiter,
    factor: F,
    title: &str,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: Fn(usize) -> f64,
{
    let mut tally = Tally::new();
    let base_interval = Duration::from_millis(opt.request_interval_ms);
    let start_time = Instant::now();

    for i in 0..opt.num_requests {
        let request_time = Instant::now();

        let result = limiter.check(&opt.identifier, &opt.path).await;
        tally.record(i + 1, &result, opt.disable_logs);

        let this_interval = base_interval.mul_f64(factor(i).max(0.0));
        let elapsed = request_time.elapsed();
        if elapsed < this_interval {
            time::sleep(this_interval - elapsed).await;
        }
    }

    tally.print(&format!("{} Simulation", title), start_time.elapsed());
    Ok(())
}

// One request per line of input; "reset" clears the caller's window
async fn simulate_custom(
    opt: &Opt,
    limiter: &dyn RateLimiter,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("\nCustom Simulation Mode");
    println!("----------------------");
    println!("Press Enter to make a request, 'reset' to clear the window, or 'quit' to exit");

    let mut tally = Tally::new();
    let start_time = Instant::now();
    let mut input_buffer = String::new();
    let mut n = 0;

    loop {
        input_buffer.clear();
        if std::io::stdin().read_line(&mut input_buffer)? == 0 {
            break;
        }

        match input_buffer.trim() {
            "quit" | "exit" | "q" => break,
            "reset" => {
                limiter.reset(&opt.identifier, &opt.path).await;
                println!("Window cleared for {}", opt.identifier);
            }
            _ => {
                n += 1;
                let result = limiter.check(&opt.identifier, &opt.path).await;
                if result.allowed {
                    println!("ALLOWED (remaining: {})", result.remaining);
                } else {
                    println!("DENIED (retry after: {:?}s)", result.retry_after);
                }
                tally.record(n, &result, true);
            }
        }
    }

    tally.print("Custom Simulation", start_time.elapsed());
    Ok(())
}
