//! One crawl-thread's worth of work: fetch and extract a slice of the crawl
//! queue sequentially (spec §5). Ported from `CrawlerThread.thread_entry`/
//! `_crawl`; OS threads stand in for the teacher's tokio tasks, since the
//! underlying `CrawlerThread` is itself a plain `threading.Thread` worker,
//! not an async one.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::config::CrawlerConfig;
use crate::extractor::extract_page;
use crate::fetcher::Fetcher;
use crate::page::PageRecord;
use crate::robots::RobotsCache;
use crate::url_wrapper::UrlWrapper;

/// Everything one worker thread produced from its slice of the queue.
/// Mirrors `CrawlerThread.new_crawled_urls`/`new_crawl_queue`/`crawled_pages_data`.
#[derive(Default)]
pub struct WorkerOutcome {
    pub new_crawled_urls: Vec<String>,
    pub new_crawl_queue: Vec<String>,
    pub crawled_pages: Vec<PageRecord>,
}

pub struct Worker {
    pub thread_id: usize,
    urls: Vec<String>,
}

impl Worker {
    pub fn new(thread_id: usize, urls: Vec<String>) -> Self {
        Self { thread_id, urls }
    }

    /// Runs the worker's whole slice on the calling thread. Errors for an
    /// individual URL are logged and swallowed; they never abort the batch.
    pub fn run(
        self,
        crawled_urls: &HashSet<String>,
        robots: &RobotsCache,
        fetcher: &Fetcher,
        config: &CrawlerConfig,
        crawl_timestamp: i64,
    ) -> WorkerOutcome {
        info!(thread_id = self.thread_id, "crawler thread has started");

        let mut outcome = WorkerOutcome::default();

        for (i, url) in self.urls.iter().enumerate() {
            let index = i + 1;

            let original_url = match UrlWrapper::new(url, config) {
                Ok(u) => u,
                Err(e) => {
                    debug!(
                        thread_id = self.thread_id,
                        url_index = index,
                        error = %e,
                        "not saving crawled webpage: invalid URL"
                    );
                    continue;
                }
            };

            match extract_page(&original_url, crawled_urls, robots, fetcher, config, crawl_timestamp) {
                Ok(result) => {
                    info!(
                        thread_id = self.thread_id,
                        url_index = index,
                        url = %original_url.url,
                        redirected = result.record.was_redirected,
                        links_added = result.links.len(),
                        "saving crawled webpage"
                    );

                    outcome.new_crawled_urls.push(original_url.canonical_url.clone());
                    outcome
                        .new_crawled_urls
                        .push(result.record.final_url.canonical_url.clone());
                    outcome.new_crawl_queue.extend(result.links);
                    outcome.crawled_pages.push(result.record);
                }
                Err(e) => {
                    debug!(
                        thread_id = self.thread_id,
                        url_index = index,
                        url = %original_url.url,
                        error = %e,
                        "not saving crawled webpage"
                    );
                    outcome.new_crawled_urls.push(original_url.canonical_url);
                }
            }
        }

        info!(thread_id = self.thread_id, "crawler thread has finished");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_urls_are_skipped_without_panicking() {
        let config = CrawlerConfig::default();
        let robots = RobotsCache::new();
        let fetcher = Fetcher::new(&config).unwrap();
        let crawled = HashSet::new();

        let worker = Worker::new(1, vec!["not a url".to_string()]);
        let outcome = worker.run(&crawled, &robots, &fetcher, &config, 0);

        assert!(outcome.crawled_pages.is_empty());
        assert!(outcome.new_crawled_urls.is_empty());
    }

    #[test]
    fn already_crawled_url_is_recorded_but_not_fetched() {
        let config = CrawlerConfig::default();
        let robots = RobotsCache::new();
        let fetcher = Fetcher::new(&config).unwrap();

        let url = UrlWrapper::new("https://example.com/", &config).unwrap();
        let mut crawled = HashSet::new();
        crawled.insert(url.canonical_url.clone());

        let worker = Worker::new(1, vec!["https://example.com/".to_string()]);
        let outcome = worker.run(&crawled, &robots, &fetcher, &config, 0);

        assert!(outcome.crawled_pages.is_empty());
        assert_eq!(outcome.new_crawled_urls, vec![url.canonical_url]);
    }
}
