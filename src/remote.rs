use std::io::Read;
use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{CONTENT_LENGTH, HeaderMap, HeaderValue, RANGE, USER_AGENT};
use tracing::{debug, warn};

use crate::config::HttpSettings;
use crate::error::HarvestError;

pub type BodyReader = Box<dyn Read + Send>;

/// Response to a ranged GET.
pub enum RangeBody {
    /// 206: the body starts at the requested offset.
    Partial(BodyReader),
    /// 200: the server ignored the range and sends the whole resource.
    Full(BodyReader),
    /// 416: nothing exists past the requested offset.
    Exhausted,
}

pub trait RemoteSource: Send + Sync {
    /// Content length from a metadata-only request. `None` when the server sends none, or zero.
    fn content_length(&self, url: &str) -> Result<Option<u64>, HarvestError>;

    /// Opens the resource from `offset`; no Range header is sent for offset 0.
    fn open_range(&self, url: &str, offset: u64) -> Result<RangeBody, HarvestError>;
}

#[derive(Clone)]
pub struct HttpRemote {
    client: Client,
    max_retries: usize,
}

impl HttpRemote {
    pub fn new(settings: &HttpSettings) -> Result<Self, HarvestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&settings.user_agent).map_err(|err| {
                HarvestError::ConfigParse(format!("invalid user agent: {err}"))
            })?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .timeout(Duration::from_secs(settings.read_timeout_secs))
            .build()
            .map_err(|err| HarvestError::ConfigParse(format!("http client: {err}")))?;
        Ok(Self {
            client,
            max_retries: settings.max_retries,
        })
    }

    fn send_with_retries<F>(&self, url: &str, mut make_req: F) -> Result<Response, reqwest::Error>
    where
        F: FnMut() -> RequestBuilder,
    {
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < self.max_retries && is_retryable_status(status) {
                        warn!(url, status, attempt, "retrying request");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < self.max_retries && is_retryable_error(&err) {
                        warn!(url, error = %err, attempt, "retrying request");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }
}

impl RemoteSource for HttpRemote {
    fn content_length(&self, url: &str) -> Result<Option<u64>, HarvestError> {
        let response = self
            .send_with_retries(url, || self.client.head(url))
            .map_err(|err| HarvestError::UnreachableResource {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(HarvestError::UnreachableResource {
                url: url.to_string(),
                message: format!("status {}", response.status().as_u16()),
            });
        }
        // Read the header directly: the body of a HEAD response is always empty.
        let length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|length| *length > 0);
        debug!(url, ?length, "probed remote length");
        Ok(length)
    }

    fn open_range(&self, url: &str, offset: u64) -> Result<RangeBody, HarvestError> {
        let response = self
            .send_with_retries(url, || {
                let request = self.client.get(url);
                if offset > 0 {
                    request.header(RANGE, format!("bytes={offset}-"))
                } else {
                    request
                }
            })
            .map_err(|err| HarvestError::TransferError {
                url: url.to_string(),
                message: err.to_string(),
            })?;

        match response.status() {
            StatusCode::PARTIAL_CONTENT => Ok(RangeBody::Partial(Box::new(response))),
            StatusCode::RANGE_NOT_SATISFIABLE if offset > 0 => Ok(RangeBody::Exhausted),
            status if status.is_success() => Ok(RangeBody::Full(Box::new(response))),
            status => {
                let message = response
                    .text()
                    .ok()
                    .filter(|body| !body.trim().is_empty())
                    .map(|body| format!("status {}: {}", status.as_u16(), body.trim()))
                    .unwrap_or_else(|| format!("status {}", status.as_u16()));
                Err(HarvestError::TransferError {
                    url: url.to_string(),
                    message,
                })
            }
        }
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(429));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(416));
    }

    #[test]
    fn client_builds_from_default_settings() {
        assert!(HttpRemote::new(&HttpSettings::default()).is_ok());
    }
}
