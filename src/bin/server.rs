use std::error::Error;

use coapum_ingest::{serve, IngestQueue, ListenerConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Runs a listener and prints every accepted reading as a JSON line.
///
/// Usage: `coapum-ingest-server [config.json]`
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!("Loading configuration from {}", path);
            ListenerConfig::from_file(path)?
        }
        None => ListenerConfig::default(),
    };

    let (ingest, mut readings) = IngestQueue::new(config.ingest_queue_capacity);

    let consumer = tokio::spawn(async move {
        while let Some(reading) = readings.recv().await {
            match serde_json::to_string(&reading) {
                Ok(line) => println!("{}", line),
                Err(err) => error!("Unable to serialize reading for {}: {}", reading.asset, err),
            }
        }
    });

    serve(config, ingest, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    })
    .await?;

    // The listener owned the only sender, so the consumer drains and exits
    consumer.await?;

    Ok(())
}
