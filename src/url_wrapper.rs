//! A validated, canonicalized HTTP(S) URL (spec §3, §4.1).
//!
//! Ported field-for-field from `URLWrapper.py`: canonicalization always
//! precedes validation, and the canonical form is the scheme-stripped
//! identity string used for crawl-history deduplication.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::config::CrawlerConfig;
use crate::error::UrlError;

static HOSTNAME_BASIC_CHECK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-z.-]+$").expect("static regex is valid"));
static HOSTNAME_DOUBLEDOTS_CHECK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.-]{2,}").expect("static regex is valid"));

const UTM_PREFIX: &str = "utm_";
const FBCLID: &str = "fbclid";

/// A canonicalized, validated URL plus its deduplication identity.
#[derive(Debug, Clone)]
pub struct UrlWrapper {
    /// Canonical form, with scheme, ready to fetch.
    pub url: Url,
    /// Scheme-stripped `host + path + ("?" + query)` identity string. Two
    /// URLs are the same crawled page iff this matches byte-for-byte.
    pub canonical_url: String,
}

impl PartialEq for UrlWrapper {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_url == other.canonical_url
    }
}

impl Eq for UrlWrapper {}

impl UrlWrapper {
    /// Parses, canonicalizes, and validates an absolute URL string.
    pub fn new(absolute_url: &str, config: &CrawlerConfig) -> Result<Self, UrlError> {
        Self::check_length(absolute_url, config)?;

        let parsed = Url::parse(absolute_url).map_err(|_| UrlError::ParseFailed)?;
        let canonicalized = Self::canonicalize(parsed, config)?;

        let url_string = canonicalized.as_str().to_string();
        Self::check_length(&url_string, config)?;

        Self::validate(&canonicalized, config)?;
        Self::validate_wikipedia(canonicalized.host_str().unwrap_or(""), config)?;

        let canonical_url = Self::generate_canonical_url(&canonicalized);

        Ok(Self {
            url: canonicalized,
            canonical_url,
        })
    }

    /// Resolves `relative` against `base` and builds a [`UrlWrapper`] from
    /// the result.
    pub fn from_relative(base: &Url, relative: &str, config: &CrawlerConfig) -> Result<Self, UrlError> {
        let absolute = base.join(relative).map_err(|_| UrlError::ParseFailed)?;
        Self::new(absolute.as_str(), config)
    }

    fn check_length(url: &str, config: &CrawlerConfig) -> Result<(), UrlError> {
        if url.len() > config.url_max_length {
            return Err(UrlError::TooLong(url.len()));
        }
        Ok(())
    }

    /// Lowercases scheme/host, strips trailing dots from the host, collapses
    /// repeated path slashes, drops UTM/fbclid query params, and empties the
    /// fragment. Mirrors `URLWrapper._canonicalize_parsed_url`.
    fn canonicalize(mut parsed: Url, config: &CrawlerConfig) -> Result<Url, UrlError> {
        let scheme = parsed.scheme().to_ascii_lowercase();
        parsed
            .set_scheme(&scheme)
            .map_err(|_| UrlError::UnsupportedScheme(scheme.clone()))?;

        if let Some(host) = parsed.host_str() {
            let host = host.trim().to_ascii_lowercase();
            let host = host.trim_end_matches('.').to_string();
            parsed
                .set_host(Some(&host))
                .map_err(|_| UrlError::ParseFailed)?;
        }

        let collapsed_path = collapse_slashes(parsed.path());
        parsed.set_path(&collapsed_path);

        let query = Self::remove_useless_query_params(parsed.query(), config)?;
        parsed.set_query(query.as_deref());

        parsed.set_fragment(None);

        Ok(parsed)
    }

    /// Drops query parameters whose lowercase key starts with `utm_` or
    /// equals `fbclid`. Mirrors `URLWrapper._remove_useless_query_string_params`.
    fn remove_useless_query_params(
        query: Option<&str>,
        _config: &CrawlerConfig,
    ) -> Result<Option<String>, UrlError> {
        let Some(query) = query else {
            return Ok(None);
        };

        let remaining: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .filter(|(k, _)| {
                let lower = k.to_ascii_lowercase();
                !(lower.starts_with(UTM_PREFIX) || lower == FBCLID)
            })
            .collect();

        if remaining.is_empty() {
            return Ok(None);
        }

        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(remaining)
            .finish();
        Ok(Some(encoded))
    }

    /// Mirrors `URLWrapper._validate_url`.
    fn validate(parsed: &Url, config: &CrawlerConfig) -> Result<(), UrlError> {
        let as_str = parsed.as_str();
        if as_str.contains('\0') || as_str.contains('\r') || as_str.contains('\n') {
            return Err(UrlError::ForbiddenCharacters);
        }

        let scheme = parsed.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(UrlError::UnsupportedScheme(scheme.to_string()));
        }

        let hostname = parsed.host_str().unwrap_or("").to_string();
        if !HOSTNAME_BASIC_CHECK.is_match(&hostname)
            || HOSTNAME_DOUBLEDOTS_CHECK.is_match(&hostname)
            || hostname.matches('.').count() < 1
        {
            return Err(UrlError::InvalidHost(hostname));
        }

        if let Some(filter) = &config.hostname_filter {
            if filter.is_match(&hostname) {
                return Err(UrlError::HostnameFiltered(hostname));
            }
        }

        if !config.crawl_mobile_pages && (hostname.starts_with("m.") || hostname.starts_with("www.m.")) {
            return Err(UrlError::MobileHostname(hostname));
        }

        let path = parsed.path();
        if let Some(filter) = &config.path_filter {
            if filter.is_match(path) {
                return Err(UrlError::PathFiltered(path.to_string()));
            }
        }

        let extension = path
            .trim_end_matches('/')
            .rsplit('.')
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        if config.filtered_file_extensions.contains(&extension) {
            return Err(UrlError::ExtensionFiltered(path.to_string()));
        }

        if !path.starts_with('/') {
            return Err(UrlError::InvalidPath);
        }

        Ok(())
    }

    /// Mirrors `URLWrapper._validate_wikipedia_url`.
    fn validate_wikipedia(hostname: &str, config: &CrawlerConfig) -> Result<(), UrlError> {
        if !hostname.ends_with(".wikipedia.org") {
            return Ok(());
        }

        if !config.crawl_mobile_pages && hostname.ends_with(".m.wikipedia.org") {
            return Err(UrlError::MobileWikipedia(hostname.to_string()));
        }

        if let Some(allowed) = &config.allowed_wikipedia_languages {
            if !hostname.starts_with("www.") {
                let matches_allowed = allowed
                    .iter()
                    .any(|lang| hostname.starts_with(&format!("{lang}.")));
                if !matches_allowed {
                    return Err(UrlError::ForbiddenWikipediaLanguage(hostname.to_string()));
                }
            }
        }

        Ok(())
    }

    /// `netloc + path + ("?" + query)`, scheme-stripped. Mirrors
    /// `URLWrapper._generate_canonical_url`.
    fn generate_canonical_url(parsed: &Url) -> String {
        let host_and_port = match parsed.port() {
            Some(port) => format!("{}:{}", parsed.host_str().unwrap_or(""), port),
            None => parsed.host_str().unwrap_or("").to_string(),
        };

        let mut canonical = format!("{host_and_port}{}", parsed.path());
        if let Some(query) = parsed.query() {
            if !query.is_empty() {
                canonical.push('?');
                canonical.push_str(query);
            }
        }
        canonical
    }
}

fn collapse_slashes(path: &str) -> String {
    let mut result = String::with_capacity(path.len());
    let mut prev_was_slash = false;
    for c in path.chars() {
        if c == '/' {
            if prev_was_slash {
                continue;
            }
            prev_was_slash = true;
        } else {
            prev_was_slash = false;
        }
        result.push(c);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CrawlerConfig {
        CrawlerConfig::default()
    }

    #[test]
    fn canonicalizes_scheme_host_and_query() {
        // `:443` is the default port for `https`, so `url::Url` elides it on
        // serialization (WHATWG URL spec) even though it was explicit here.
        let wrapper = UrlWrapper::new(
            "https://Example.COM:443/a//b/?utm_source=x&q=1#frag",
            &config(),
        )
        .unwrap();
        assert_eq!(wrapper.url.as_str(), "https://example.com/a/b/?q=1");
        assert_eq!(wrapper.canonical_url, "example.com/a/b/?q=1");
    }

    #[test]
    fn rejects_filtered_hostname() {
        let err = UrlWrapper::new("http://foo.onion/", &config()).unwrap_err();
        assert!(matches!(err, UrlError::HostnameFiltered(_)));
    }

    #[test]
    fn rejects_mobile_hostname_when_disabled() {
        let err = UrlWrapper::new("http://m.example.org/", &config()).unwrap_err();
        assert!(matches!(err, UrlError::MobileHostname(_)));
    }

    #[test]
    fn rejects_filtered_extension() {
        let err = UrlWrapper::new("https://example.com/file.pdf", &config()).unwrap_err();
        assert!(matches!(err, UrlError::ExtensionFiltered(_)));
    }

    #[test]
    fn canonicalization_is_idempotent() {
        let once = UrlWrapper::new("https://Example.COM/a//b/?utm_source=x", &config()).unwrap();
        let twice = UrlWrapper::new(once.url.as_str(), &config()).unwrap();
        assert_eq!(once.canonical_url, twice.canonical_url);
    }

    #[test]
    fn scheme_is_stripped_from_canonical_identity() {
        let http = UrlWrapper::new("http://example.com/y", &config()).unwrap();
        let https = UrlWrapper::new("https://example.com/y", &config()).unwrap();
        assert_eq!(http.canonical_url, https.canonical_url);
    }

    #[test]
    fn rejects_wikipedia_mobile_subdomain() {
        let err = UrlWrapper::new("https://en.m.wikipedia.org/wiki/Rust", &config()).unwrap_err();
        assert!(matches!(err, UrlError::MobileWikipedia(_)));
    }

    #[test]
    fn rejects_disallowed_wikipedia_language() {
        let err =
            UrlWrapper::new("https://de.wikipedia.org/wiki/Rust", &config()).unwrap_err();
        assert!(matches!(err, UrlError::ForbiddenWikipediaLanguage(_)));
    }

    #[test]
    fn allows_www_wikipedia_regardless_of_language_list() {
        let ok = UrlWrapper::new("https://www.wikipedia.org/", &config());
        assert!(ok.is_ok());
    }
}
