//! `crawlet` is a batch-oriented web crawler. Each batch pops a slice of
//! URLs off a durable crawl queue, fetches and extracts them across a pool
//! of worker threads while respecting per-host `robots.txt` politeness, and
//! folds the results back into a canonical-URL-deduplicated page index.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod log_relay;
pub mod page;
pub mod persistence;
pub mod robots;
pub mod shutdown;
pub mod state;
pub mod url_wrapper;
pub mod worker;

pub use config::CrawlerConfig;
pub use error::{BatchError, ExtractError, FetchError, PageRecordError, PersistError, UrlError};
pub use page::PageRecord;
pub use url_wrapper::UrlWrapper;
