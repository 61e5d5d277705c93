use dotenv::dotenv;
use gateway_core::{init_logging, Gateway, GatewayConfig};
use std::time::Duration;
use tokio::time;
use tracing::{error, info};

const STATUS_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();
    info!("API gateway core starting up");

    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    let gateway: Gateway<serde_json::Value> = match Gateway::new(config) {
        Ok(gateway) => gateway,
        Err(e) => {
            error!(error = %e, "Failed to initialize gateway");
            std::process::exit(1);
        }
    };

    gateway.discovery().start_health_checks();

    let mut status_timer = time::interval(STATUS_INTERVAL);
    loop {
        tokio::select! {
            _ = status_timer.tick() => {
                let status = gateway.status().await;
                info!(
                    healthy = status.health.healthy,
                    unhealthy = status.health.unhealthy,
                    cache_entries = status.cache.stats.entry_count,
                    hit_rate = status.cache.stats.hit_rate,
                    "Gateway status"
                );
                match serde_json::to_string(&status) {
                    Ok(json) => tracing::debug!(status = %json, "Full status"),
                    Err(e) => error!(error = %e, "Failed to serialize status"),
                }
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(error = %e, "Failed to listen for shutdown signal");
                }
                break;
            }
        }
    }

    gateway.shutdown();
    info!("API gateway core stopped");
}
