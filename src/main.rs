use std::sync::Arc;
use std::time::Duration;

use unsub_scan::config::ScanConfig;
use unsub_scan::imap::ImapConnector;
use unsub_scan::report::write_report;
use unsub_scan::scan::{ProgressCounter, ScanOptions, ScanPipeline, SearchQuery};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = match ScanConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    eprintln!("📭 Unsub Scan v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   IMAP: {}:{} ({})", config.imap_host, config.imap_port, config.mailbox);
    eprintln!("   User: {}", config.credentials.user);
    eprintln!("   Workers: {}", config.workers);
    eprintln!("   Output: {}\n", config.output_path.display());

    let connector = Arc::new(ImapConnector::from_config(&config));
    let options = ScanOptions {
        workers: config.workers,
        query: SearchQuery::body_contains(config.search_term.clone()),
        keyword: config.search_term.clone(),
    };

    let progress = Arc::new(ProgressCounter::new());
    let ticker = spawn_progress_ticker(Arc::clone(&progress), config.progress_interval);

    let mut pipeline = ScanPipeline::new(connector, options).with_progress(progress.clone());
    let outcome = pipeline.run().await;
    ticker.abort();

    let result = match outcome {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Error ({} phase): {e}", e.phase());
            std::process::exit(1);
        }
    };

    write_report(&config.output_path, &result, config.output_format).await?;

    let (done, total) = progress.snapshot();
    eprintln!(
        "   Scanned {done}/{total} messages: {} senders, {} links → {}",
        result.len(),
        result.target_count(),
        config.output_path.display()
    );
    Ok(())
}

/// Log progress every `interval` until aborted.
fn spawn_progress_ticker(
    progress: Arc<ProgressCounter>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        tick.tick().await;
        loop {
            tick.tick().await;
            let (done, total) = progress.snapshot();
            if total > 0 {
                tracing::info!(done, total, "Scan progress");
            }
        }
    })
}
