//! Process entry point: wires up logging, loads durable state, and runs
//! batches until told to stop or until the crawl queue is exhausted (spec
//! §5). Ported from `CrawlerMain`.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::prelude::*;

use crawlet::config::CrawlerConfig;
use crawlet::coordinator::BatchCoordinator;
use crawlet::error::BatchError;
use crawlet::fetcher::Fetcher;
use crawlet::log_relay::LogRelayLayer;
use crawlet::persistence;
use crawlet::robots::RobotsCache;
use crawlet::shutdown::ShutdownFlag;
use crawlet::state::CrawlState;

const CONFIG_FILE_PATH: &str = "crawlet.toml";

fn main() -> anyhow::Result<()> {
    let config = CrawlerConfig::load(CONFIG_FILE_PATH)?;
    init_logging(&config)?;

    info!("basic initialization performed");

    let shutdown = ShutdownFlag::install()?;
    let mut state = load_saved_state(&config)?;

    let robots = RobotsCache::new();
    let fetcher = Fetcher::new(&config)?;
    let coordinator = BatchCoordinator::new(&config, &robots, &fetcher);

    start_timeout(config.crawler_start_timeout_secs);
    info!("starting crawler");

    while shutdown.should_continue() {
        match coordinator.run_batch(&mut state) {
            Ok(()) => {}
            Err(BatchError::QueueExhausted) => break,
            Err(err @ BatchError::Persist(_)) => return Err(err.into()),
        }
    }

    info!("exiting crawler");
    Ok(())
}

fn init_logging(config: &CrawlerConfig) -> anyhow::Result<()> {
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let relay_layer = LogRelayLayer::bind(&config.logger_socket_host, config.logger_socket_port).ok();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(relay_layer)
        .init();

    Ok(())
}

/// Loads `crawled_urls`/`crawl_queue` from disk, falling back to the
/// configured start URLs when the queue file is empty. Mirrors
/// `CrawlerMain._load_saved_crawled_urls_and_crawl_queue`.
fn load_saved_state(config: &CrawlerConfig) -> anyhow::Result<CrawlState> {
    info!("loading saved crawled URLs and crawl queue");

    let crawled_urls: HashSet<String> = persistence::read_1d_csv_to_set(&config.crawled_urls_file)?;
    let mut crawl_queue = persistence::read_1d_csv_to_vec(&config.crawl_queue_file)?;

    if crawl_queue.is_empty() {
        info!("the crawl queue is empty, using the default start URLs");
        crawl_queue = config.start_urls.clone();
    }

    info!(
        crawled_urls = crawled_urls.len(),
        crawl_queue = crawl_queue.len(),
        "crawled URLs and crawl queue loaded"
    );

    for path in [&config.crawled_urls_file, &config.crawl_queue_file, &config.web_index_file] {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
    }

    Ok(CrawlState::new(crawled_urls, crawl_queue))
}

fn start_timeout(mut seconds: u64) {
    while seconds > 0 {
        info!(seconds, "crawler starting");
        std::thread::sleep(Duration::from_secs(1));
        seconds -= 1;
    }
}
