//! Runs one crawl batch: prune the queue, fan out worker threads, merge
//! their results back into durable state, then persist (spec §5).
//! Ported from `CrawlerBatchCoordinator`.

use std::collections::HashSet;
use std::thread;

use tracing::info;

use crate::config::CrawlerConfig;
use crate::error::{BatchError, PersistError};
use crate::fetcher::Fetcher;
use crate::page::PageRecord;
use crate::persistence;
use crate::robots::RobotsCache;
use crate::state::CrawlState;
use crate::url_wrapper::UrlWrapper;
use crate::worker::Worker;

const QUEUE_PRUNE_PROGRESS_INTERVAL: usize = 2500;

pub struct BatchCoordinator<'a> {
    config: &'a CrawlerConfig,
    robots: &'a RobotsCache,
    fetcher: &'a Fetcher,
}

impl<'a> BatchCoordinator<'a> {
    pub fn new(config: &'a CrawlerConfig, robots: &'a RobotsCache, fetcher: &'a Fetcher) -> Self {
        Self {
            config,
            robots,
            fetcher,
        }
    }

    pub fn run_batch(&self, state: &mut CrawlState) -> Result<(), BatchError> {
        info!("starting to crawl a new batch");

        self.remove_already_crawled_pages_from_crawl_queue(state);

        let batches = self.split_into_thread_batches(state);
        if batches.is_empty() {
            info!("all pages in the crawl queue were crawled, there is nothing more to do");
            return Err(BatchError::QueueExhausted);
        }

        let crawl_timestamp = unix_timestamp_secs();

        let outcomes: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = batches
                .into_iter()
                .enumerate()
                .map(|(i, urls)| {
                    let thread_id = i + 1;
                    let crawled_urls = &state.crawled_urls;
                    scope.spawn(move || {
                        info!(thread_id, pages_to_crawl = urls.len(), "started crawler thread");
                        Worker::new(thread_id, urls).run(
                            crawled_urls,
                            self.robots,
                            self.fetcher,
                            self.config,
                            crawl_timestamp,
                        )
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|h| h.join().expect("crawler thread panicked"))
                .collect()
        });

        let mut new_crawled_urls = Vec::new();
        let mut new_crawl_queue = Vec::new();
        let mut new_pages = Vec::new();
        for outcome in outcomes {
            new_crawled_urls.extend(outcome.new_crawled_urls);
            new_crawl_queue.extend(outcome.new_crawl_queue);
            new_pages.extend(outcome.crawled_pages);
        }

        info!(
            fetched_pages = new_crawled_urls.len(),
            crawled_pages = new_pages.len(),
            new_queue_urls = new_crawl_queue.len(),
            "all threads from this batch finished"
        );

        let unique_pages = self.deduplicate_new_pages(new_pages, &state.crawled_urls);
        self.combine_new_data_with_old_data(state, new_crawled_urls, new_crawl_queue);

        state.shuffle_queue();
        state.truncate_queue(self.config.max_crawl_queue_size);

        self.save_new_data(state, &unique_pages)?;

        info!("crawl batch finished");
        Ok(())
    }

    fn remove_already_crawled_pages_from_crawl_queue(&self, state: &mut CrawlState) {
        info!("removing already crawled pages from the crawl queue");

        let total = state.crawl_queue.len();
        let crawled_urls = &state.crawled_urls;
        let config = self.config;

        let new_queue: Vec<String> = state
            .crawl_queue
            .iter()
            .enumerate()
            .filter_map(|(i, url)| {
                if (i + 1) % QUEUE_PRUNE_PROGRESS_INTERVAL == 0 {
                    info!(progress = i + 1, total, "already-crawled pages removal progress");
                }

                let canonical = UrlWrapper::new(url, config).ok()?.canonical_url;
                if crawled_urls.contains(&canonical) {
                    None
                } else {
                    Some(url.clone())
                }
            })
            .collect();

        state.crawl_queue = new_queue;
        info!("already crawled pages removed from the crawl queue");
    }

    fn split_into_thread_batches(&self, state: &mut CrawlState) -> Vec<Vec<String>> {
        let mut batches = Vec::new();
        for _ in 0..self.config.crawler_threads {
            if state.crawl_queue.is_empty() {
                break;
            }
            let take = self.config.crawl_thread_batch_size.min(state.crawl_queue.len());
            batches.push(state.crawl_queue.drain(0..take).collect());
        }
        batches
    }

    /// Drops pages crawled more than once within the batch (can happen via
    /// redirects landing two different queue entries on the same page) and
    /// pages that collide with a canonical URL already recorded in a
    /// previous batch. Mirrors `_combine_new_data_with_old_data`'s
    /// `_check_if_page_was_crawled_more_times` plus its already-crawled check.
    fn deduplicate_new_pages(
        &self,
        pages: Vec<PageRecord>,
        already_crawled: &HashSet<String>,
    ) -> Vec<PageRecord> {
        let mut original_counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
        let mut final_counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
        for page in &pages {
            *original_counts.entry(page.original_url.canonical_url.as_str()).or_insert(0) += 1;
            *final_counts.entry(page.final_url.canonical_url.as_str()).or_insert(0) += 1;
        }

        pages
            .into_iter()
            .filter(|page| {
                let crawled_more_than_once = original_counts[page.original_url.canonical_url.as_str()] > 1
                    || final_counts[page.final_url.canonical_url.as_str()] > 1;
                if crawled_more_than_once {
                    return false;
                }

                !already_crawled.contains(&page.original_url.canonical_url)
                    && !already_crawled.contains(&page.final_url.canonical_url)
            })
            .collect()
    }

    fn combine_new_data_with_old_data(
        &self,
        state: &mut CrawlState,
        new_crawled_urls: Vec<String>,
        new_crawl_queue: Vec<String>,
    ) {
        info!("combining the new crawled data with the old data");

        state.crawled_urls.extend(new_crawled_urls);

        let union: HashSet<String> = state
            .crawl_queue
            .drain(..)
            .chain(new_crawl_queue)
            .collect();
        state.crawl_queue = union.into_iter().collect();
    }

    /// Persistence failures are fatal (spec §7): a disk-full or permission
    /// error here means durable state no longer matches what's in memory, so
    /// the caller must stop the crawler rather than carry on as if the batch
    /// had saved.
    fn save_new_data(&self, state: &CrawlState, pages: &[PageRecord]) -> Result<(), PersistError> {
        info!(
            crawled_urls = state.crawled_urls.len(),
            crawl_queue = state.crawl_queue.len(),
            crawled_pages = pages.len(),
            "saving new data"
        );

        persistence::write_iterable_to_csv(&self.config.crawled_urls_file, state.crawled_urls.iter())?;
        persistence::write_iterable_to_csv(&self.config.crawl_queue_file, state.crawl_queue.iter())?;

        let json_rows: Vec<String> = pages.iter().filter_map(|p| p.to_json().ok()).collect();
        persistence::append_iterable_to_csv(&self.config.web_index_file, json_rows)?;

        info!("new data saved");
        Ok(())
    }
}

fn unix_timestamp_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CrawlerConfig {
        let mut config = CrawlerConfig::default();
        config.crawler_threads = 2;
        config.crawl_thread_batch_size = 2;
        config
    }

    #[test]
    fn split_into_thread_batches_respects_batch_size_and_thread_count() {
        let config = config();
        let robots = RobotsCache::new();
        let fetcher = Fetcher::new(&config).unwrap();
        let coordinator = BatchCoordinator::new(&config, &robots, &fetcher);

        let mut state = CrawlState::new(
            HashSet::new(),
            vec!["a", "b", "c", "d", "e"].iter().map(|s| s.to_string()).collect(),
        );

        let batches = coordinator.split_into_thread_batches(&mut state);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].len(), 2);
        assert_eq!(state.crawl_queue, vec!["e".to_string()]);
    }

    #[test]
    fn empty_queue_yields_no_batches() {
        let config = config();
        let robots = RobotsCache::new();
        let fetcher = Fetcher::new(&config).unwrap();
        let coordinator = BatchCoordinator::new(&config, &robots, &fetcher);

        let mut state = CrawlState::new(HashSet::new(), Vec::new());
        assert!(coordinator.split_into_thread_batches(&mut state).is_empty());
    }

    #[test]
    fn duplicate_original_url_pages_are_dropped() {
        let config = CrawlerConfig::default();
        let robots = RobotsCache::new();
        let fetcher = Fetcher::new(&config).unwrap();
        let coordinator = BatchCoordinator::new(&config, &robots, &fetcher);

        let url_a = UrlWrapper::new("https://example.com/a", &config).unwrap();
        let url_b = UrlWrapper::new("https://example.com/a", &config).unwrap();

        let page = |original: UrlWrapper, final_: UrlWrapper| {
            PageRecord::new(
                original,
                final_,
                0,
                "en".into(),
                "Title".into(),
                Default::default(),
                "".into(),
                "".into(),
                "".into(),
                "content".into(),
                1.0,
                "".into(),
                "".into(),
                0,
                &config,
            )
            .unwrap()
        };

        let pages = vec![
            page(url_a.clone(), url_a.clone()),
            page(url_b.clone(), url_b.clone()),
        ];

        let deduped = coordinator.deduplicate_new_pages(pages, &HashSet::new());
        assert!(deduped.is_empty());
    }
}
