use std::sync::Arc;
use std::time::Instant;

use tracing::error;

use fluent_log_forwarder::init::{init_tracing_with_config, LayerConfig};
use fluent_log_forwarder::noop_transport::NoopTransport;
use fluent_log_forwarder::{ForwardLogger, LoggerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = LoggerConfig {
        channel_capacity: 50_000,
        ..LoggerConfig::default()
    };
    let handle = ForwardLogger::with_transport(config, Arc::new(NoopTransport))?;
    init_tracing_with_config(&handle, LayerConfig { enable_stdout: false })?;

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "load test error");
    }

    let elapsed = start.elapsed();
    println!("sent {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    handle.close().await?;
    let stats = handle.logger().stats();
    println!("emitted {}, dropped {}", stats.emitted, stats.dropped);
    Ok(())
}
