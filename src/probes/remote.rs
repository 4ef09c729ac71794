//! Real single-connection download over HTTP.

use super::http::USER_AGENT;
use super::{DataProbe, ProbeError};
use crate::errors::ScannerError;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, CONNECTION};
use reqwest::Client as ReqwestClient;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

pub const DEFAULT_DOWNLOAD_URL: &str = "https://speed.cloudflare.com/__down";

/// Downloads `bytes` from a speed-test endpoint that sizes its response
/// from a `bytes` query parameter.
#[derive(Debug, Clone)]
pub struct RemoteDownloadProbe {
    client: ReqwestClient,
    base: Url,
}

impl RemoteDownloadProbe {
    pub fn new(base: Url, timeout: Duration) -> Result<Self, ScannerError> {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(CONNECTION, HeaderValue::from_static("close"));

        let client = ReqwestClient::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ScannerError::config("failed to build HTTP client").with_source(e)
            })?;

        Ok(Self { client, base })
    }

    pub fn url_for(&self, bytes: u64) -> Url {
        let mut url = self.base.clone();
        url.query_pairs_mut().append_pair("bytes", &bytes.to_string());
        url
    }
}

impl DataProbe for RemoteDownloadProbe {
    async fn transfer(&self, bytes: u64) -> Result<Duration, ProbeError> {
        let url = self.url_for(bytes);
        let started = Instant::now();

        let body = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| ProbeError::from_reqwest(e, started.elapsed()))?
            .bytes()
            .await
            .map_err(|e| ProbeError::from_reqwest(e, started.elapsed()))?;

        let elapsed = started.elapsed();
        if (body.len() as u64) < bytes {
            return Err(ProbeError::network(
                format!("short download: {} of {} bytes", body.len(), bytes),
                elapsed,
            ));
        }

        debug!("Downloaded {} bytes in {:?}", body.len(), elapsed);
        Ok(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for_sets_bytes_query() {
        let probe = RemoteDownloadProbe::new(
            Url::parse(DEFAULT_DOWNLOAD_URL).unwrap(),
            Duration::from_secs(3),
        )
        .unwrap();

        assert_eq!(
            probe.url_for(100_000).as_str(),
            "https://speed.cloudflare.com/__down?bytes=100000"
        );
    }
}
