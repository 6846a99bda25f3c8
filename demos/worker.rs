use std::time::Duration;

use tokio::time::sleep;
use tracing::info;

use fluent_log_forwarder::env::logger_config_from_env;
use fluent_log_forwarder::init::init_tracing;
use fluent_log_forwarder::ForwardLogger;

const WORKERS: usize = 10;
const TICKS: usize = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = logger_config_from_env()?;
    let handle = ForwardLogger::new(config)?;
    init_tracing(&handle)?;

    let mut tasks = Vec::with_capacity(WORKERS);
    for worker_id in 0..WORKERS {
        tasks.push(tokio::spawn(async move {
            for tick in 0..TICKS {
                info!(worker_id, tick, "log collected");
                sleep(Duration::from_millis(200)).await;
            }
        }));
    }
    let mut joined = Ok(());
    for task in tasks {
        if let Err(e) = task.await {
            joined = Err(e);
        }
    }

    let closed = handle.close().await;
    let stats = handle.logger().stats();
    println!(
        "emitted {} records ({} dropped, {} failed)",
        stats.emitted, stats.dropped, stats.failed
    );

    joined?;
    closed?;
    Ok(())
}
