//! The crawler's durable state: the set of already-crawled canonical URLs
//! and the pending crawl queue (spec §3, §5). Ported from
//! `GlobalVarsHolder`, which is just these two collections passed by
//! reference into each batch.

use std::collections::HashSet;

use rand::seq::SliceRandom;

pub struct CrawlState {
    pub crawled_urls: HashSet<String>,
    pub crawl_queue: Vec<String>,
}

impl CrawlState {
    pub fn new(crawled_urls: HashSet<String>, crawl_queue: Vec<String>) -> Self {
        Self {
            crawled_urls,
            crawl_queue,
        }
    }

    /// Shuffles the crawl queue in place with a fresh OS-seeded RNG. Mirrors
    /// `CrawlerBatchCoordinator._shuffle_and_reduce_crawl_queue_size`'s call
    /// to `random.shuffle`.
    pub fn shuffle_queue(&mut self) {
        self.crawl_queue.shuffle(&mut rand::thread_rng());
    }

    /// Same shuffle, but with a caller-supplied RNG so tests can assert on a
    /// deterministic permutation.
    pub fn shuffle_queue_with(&mut self, rng: &mut impl rand::Rng) {
        self.crawl_queue.shuffle(rng);
    }

    pub fn truncate_queue(&mut self, max_size: usize) {
        self.crawl_queue.truncate(max_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn shuffle_with_a_seeded_rng_is_deterministic() {
        let mut a = CrawlState::new(HashSet::new(), vec!["1", "2", "3", "4", "5"].iter().map(|s| s.to_string()).collect());
        let mut b = CrawlState::new(HashSet::new(), vec!["1", "2", "3", "4", "5"].iter().map(|s| s.to_string()).collect());

        a.shuffle_queue_with(&mut rand::rngs::StdRng::seed_from_u64(42));
        b.shuffle_queue_with(&mut rand::rngs::StdRng::seed_from_u64(42));

        assert_eq!(a.crawl_queue, b.crawl_queue);
    }

    #[test]
    fn truncate_queue_caps_at_max_size() {
        let mut state = CrawlState::new(HashSet::new(), vec!["1", "2", "3"].iter().map(|s| s.to_string()).collect());
        state.truncate_queue(2);
        assert_eq!(state.crawl_queue.len(), 2);
    }
}
