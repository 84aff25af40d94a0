//! Tagged error variants for each stage of the per-URL admission pipeline.
//!
//! Every per-URL failure is caught at the narrowest scope where it occurs
//! and never propagates past the worker loop (spec §7): each stage returns
//! its own error type, and [`ExtractError`] is the sum type the extractor's
//! pipeline short-circuits on with `?`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UrlError {
    #[error("the URL is too long ({0} bytes)")]
    TooLong(usize),
    #[error("the URL could not be parsed")]
    ParseFailed,
    #[error("the query string could not be parsed")]
    InvalidQuery,
    #[error("the URL contains a NUL or newline character")]
    ForbiddenCharacters,
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
    #[error("the URL's host doesn't look like a hostname: {0}")]
    InvalidHost(String),
    #[error("this URL's hostname is filtered: {0}")]
    HostnameFiltered(String),
    #[error("this URL's hostname points to a mobile website: {0}")]
    MobileHostname(String),
    #[error("this hostname points to the mobile variant of Wikipedia: {0}")]
    MobileWikipedia(String),
    #[error("this hostname points to a forbidden Wikipedia language mutation: {0}")]
    ForbiddenWikipediaLanguage(String),
    #[error("this URL's path is filtered: {0}")]
    PathFiltered(String),
    #[error("the file extension of this URL's path is filtered: {0}")]
    ExtensionFiltered(String),
    #[error("the URL's path doesn't start with a slash")]
    InvalidPath,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to fetch: {0}")]
    Request(String),
    #[error("the page is too big (at least {0} bytes)")]
    TooBig(usize),
    #[error("the server responded with a non-200 status code ({0})")]
    BadStatus(u16),
    #[error("Content-Type is not present in the HTTP response headers")]
    MissingContentType,
    #[error("Content-Type \"{0}\" is not allowed")]
    DisallowedContentType(String),
    #[error("the fetched file's URL was invalid: {0}")]
    InvalidUrl(#[from] UrlError),
}

#[derive(Debug, Error)]
pub enum PageRecordError {
    #[error("the title on this webpage is empty or wasn't found")]
    EmptyTitle,
    #[error("there wasn't any meaningful content on this webpage")]
    EmptyContentSnippet,
    #[error("this HTML document's language identifier is too long ({0})")]
    LanguageTooLong(String),
}

/// Sum type for the extractor's 13-stage pipeline (spec §4.4). Each variant
/// names the stage that aborted the URL so the worker can log it without
/// string matching.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("this webpage was already crawled (by original URL)")]
    AlreadyCrawled,
    #[error("the robots file prevents fetching this website")]
    RobotsDenied,
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("the original fetched URL differs from the URL that was supposed to be fetched")]
    FetchIntegrityMismatch,
    #[error("this webpage was already crawled (by final URL)")]
    AlreadyCrawledFinal,
    #[error("failed to parse the HTML document")]
    HtmlParseFailed,
    #[error("the robots meta tag prevents fetching this webpage")]
    RobotsMetaDenied,
    #[error("the language of this page ({0}) is not allowed to be crawled")]
    LanguageNotAllowed(String),
    #[error(transparent)]
    PageRecord(#[from] PageRecordError),
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode a CSV row: {0}")]
    Csv(#[from] csv::Error),
}

/// Outcome of [`crate::coordinator::BatchCoordinator::run_batch`]. Unlike the
/// per-URL errors above, which are swallowed at the narrowest scope (spec
/// §7), both variants here are meant to stop the main loop: `QueueExhausted`
/// gracefully, `Persist` fatally, since a failed save leaves durable state
/// out of sync with what's actually on disk.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("the crawl queue is empty, there is nothing more to crawl")]
    QueueExhausted,
    #[error("failed to save crawl progress: {0}")]
    Persist(#[from] PersistError),
}
