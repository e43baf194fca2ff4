use dotenv::dotenv;
use route_limiter::{get_limiter, init_logging};
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();

    let mut args = std::env::args().skip(1);
    let (Some(identifier), Some(path)) = (args.next(), args.next()) else {
        eprintln!("usage: route_limiter <identifier> <path>");
        std::process::exit(2);
    };

    let limiter = get_limiter(None).await;
    debug!(backend = limiter.backend_name(), "Limiter ready");

    let result = limiter.check(&identifier, &path).await;
    if result.allowed {
        info!(identifier = %identifier, path = %path, remaining = result.remaining, "Request allowed");
    } else {
        warn!(identifier = %identifier, path = %path, retry_after = ?result.retry_after, "Request rejected");
    }

    match serde_json::to_string_pretty(&result) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("failed to encode result: {}", e),
    }
}
