//! Blocking HTTP GET with a size cap, content-type gate, redirect capture,
//! and UTF-8-with-Latin-1-fallback decoding (spec §4.3).
//!
//! Grounded on `RequestsWrapper.py`'s chunked-read loop and decode fallback,
//! with `crawly`'s `reqwest::Client` construction swapped to the blocking
//! client (the teacher is async; spec §5's concurrency model is OS threads).

use std::io::Read;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::HeaderMap;

use crate::config::CrawlerConfig;
use crate::error::FetchError;
use crate::url_wrapper::UrlWrapper;

const FETCH_CHUNK_SIZE: usize = 65_536;

/// One or more content types, any of which satisfies the gate.
pub enum AllowedContentType<'a> {
    None,
    One(&'a str),
    AnyOf(&'a [&'a str]),
}

pub struct FetchedFile {
    pub status: u16,
    pub body: String,
    /// The request URL, re-wrapped and re-validated (spec §4.3: "a
    /// rejection here aborts the fetch").
    pub original_url: UrlWrapper,
    /// The post-redirect URL, re-wrapped and re-validated.
    pub final_url: UrlWrapper,
    pub headers: HeaderMap,
}

pub struct Fetcher {
    client: Client,
    fail_on_bigger_size: bool,
    fail_on_non_200_status_code: bool,
}

impl Fetcher {
    pub fn new(config: &CrawlerConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.http_request_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(Self {
            client,
            fail_on_bigger_size: false,
            fail_on_non_200_status_code: true,
        })
    }

    /// Fetches `url_wrapper.url`, gating on content type and size, and
    /// returns a fully validated [`FetchedFile`].
    pub fn fetch(
        &self,
        url_wrapper: &UrlWrapper,
        allowed_content_type: AllowedContentType,
        max_size: usize,
        config: &CrawlerConfig,
    ) -> Result<FetchedFile, FetchError> {
        let (response_url, status, headers, body_bytes) =
            self.download(url_wrapper.url.as_str(), max_size)?;

        if self.fail_on_non_200_status_code && status != 200 {
            return Err(FetchError::BadStatus(status));
        }

        Self::check_content_type(&headers, &allowed_content_type)?;

        let body = decode(body_bytes);

        let original_url = UrlWrapper::new(url_wrapper.url.as_str(), config)?;
        let final_url = UrlWrapper::new(response_url.as_str(), config)?;

        Ok(FetchedFile {
            status,
            body,
            original_url,
            final_url,
            headers,
        })
    }

    /// Fetches raw decoded text without re-validating the URL (used for
    /// `robots.txt`, whose `.txt` extension may be filtered even though the
    /// file itself is always legitimate to fetch). Mirrors
    /// `RequestsWrapper.fetch_text_only_and_skip_url_check`.
    pub fn fetch_text_only(
        &self,
        url: &str,
        allowed_content_type: &str,
        max_size: usize,
        _config: &CrawlerConfig,
    ) -> Result<String, FetchError> {
        let (_response_url, status, headers, body_bytes) = self.download(url, max_size)?;

        if self.fail_on_non_200_status_code && status != 200 {
            return Err(FetchError::BadStatus(status));
        }

        Self::check_content_type(&headers, &AllowedContentType::One(allowed_content_type))?;

        Ok(decode(body_bytes))
    }

    fn download(&self, url: &str, max_size: usize) -> Result<(reqwest::Url, u16, HeaderMap, Vec<u8>), FetchError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let response_url = response.url().clone();
        let status = response.status().as_u16();
        let headers = response.headers().clone();

        let mut data = Vec::new();
        let mut chunk = vec![0u8; FETCH_CHUNK_SIZE];
        loop {
            let read = response
                .read(&mut chunk)
                .map_err(|e| FetchError::Request(e.to_string()))?;
            if read == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..read]);

            if data.len() > max_size {
                if self.fail_on_bigger_size {
                    return Err(FetchError::TooBig(data.len()));
                }
                break;
            }
        }

        Ok((response_url, status, headers, data))
    }

    fn check_content_type(headers: &HeaderMap, allowed: &AllowedContentType) -> Result<(), FetchError> {
        let allowed_list: &[&str] = match allowed {
            AllowedContentType::None => return Ok(()),
            AllowedContentType::One(s) => std::slice::from_ref(s),
            AllowedContentType::AnyOf(list) => list,
        };

        let header_value = headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .ok_or(FetchError::MissingContentType)?
            .to_ascii_lowercase();

        if allowed_list
            .iter()
            .any(|candidate| header_value.contains(&candidate.to_ascii_lowercase()))
        {
            Ok(())
        } else {
            Err(FetchError::DisallowedContentType(header_value))
        }
    }
}

/// Tries UTF-8 first, falls back to Latin-1 (which cannot fail, since it
/// covers all 256 byte values). Mirrors `RequestsWrapper._decode_data`.
fn decode(data: Vec<u8>) -> String {
    match String::from_utf8(data) {
        Ok(text) => text,
        Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_valid_utf8() {
        assert_eq!(decode("héllo".as_bytes().to_vec()), "héllo");
    }

    #[test]
    fn falls_back_to_latin1_on_invalid_utf8() {
        let bytes = vec![0xE9, 0x20, b'x']; // 0xE9 is invalid as a UTF-8 lead byte here
        let decoded = decode(bytes);
        assert_eq!(decoded.chars().next().unwrap() as u32, 0xE9);
    }
}
