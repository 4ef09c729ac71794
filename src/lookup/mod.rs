//! Client for the external lookup services behind `net-scanner info`.

pub mod ip;

use crate::errors::{to_scanner_error, ScannerError};
use crate::probes::http::USER_AGENT;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT as USER_AGENT_HEADER};
use reqwest::{Client as ReqwestClient, Method};
use serde::Deserialize;
use std::borrow::Cow;
use std::time::Duration;

pub use ip::{DohRequest, DohResponse, IpApiRequest, IpApiResponse, IpifyRequest};

pub trait Request {
    type Response: for<'de> Deserialize<'de>;

    const METHOD: Method = Method::GET;

    /// Absolute URL of the service.
    fn url(&self) -> Cow<'_, str>;

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT_HEADER, HeaderValue::from_static(USER_AGENT));
        headers
    }
}

impl<R: Request> Request for &R {
    type Response = R::Response;

    const METHOD: Method = R::METHOD;

    fn url(&self) -> Cow<'_, str> {
        (**self).url()
    }

    fn headers(&self) -> HeaderMap {
        (**self).headers()
    }
}

#[derive(Debug, Clone)]
pub struct Client {
    client: ReqwestClient,
}

impl Client {
    pub fn new(timeout: Duration) -> Result<Self, ScannerError> {
        let client = ReqwestClient::builder().timeout(timeout).build().map_err(
            |e| ScannerError::config("failed to build HTTP client").with_source(e),
        )?;

        Ok(Client { client })
    }

    pub async fn send<R: Request>(
        &self,
        request: R,
    ) -> Result<R::Response, ScannerError> {
        let url = request.url().into_owned();
        debug!("{} {}", R::METHOD, url);

        let text = self
            .fetch(R::METHOD, &url, request.headers())
            .await
            .map_err(|e| to_scanner_error(e, &format!("request to {} failed", url)))?;

        parse_response::<R::Response>(&text)
            .map_err(|e| to_scanner_error(e, &format!("unexpected response from {}", url)))
    }

    /// Whether `url` answers a `HEAD` at all, whatever the status.
    pub async fn reachable(&self, url: &str) -> bool {
        match self.client.head(url).send().await {
            Ok(response) => {
                debug!("HEAD {} -> {}", url, response.status());
                true
            }
            Err(e) => {
                debug!("HEAD {} failed: {}", url, e);
                false
            }
        }
    }

    async fn fetch(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let response = self
            .client
            .request(method, url)
            .headers(headers)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.text().await?)
    }
}

/// JSON first; some services answer with a bare value in `text/plain`.
fn parse_response<T: for<'de> Deserialize<'de>>(
    text: &str,
) -> Result<T, Box<dyn std::error::Error + Send + Sync>> {
    if let Ok(parsed) = serde_json::from_str::<T>(text) {
        return Ok(parsed);
    }

    Ok(serde_plain::from_str(text.trim())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_json() {
        let parsed: IpApiResponse =
            parse_response(r#"{"ip": "203.0.113.7", "org": "Example Net"}"#).unwrap();
        assert_eq!(parsed.ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(parsed.org.as_deref(), Some("Example Net"));
    }

    #[test]
    fn test_parse_response_plain_text() {
        let parsed: String = parse_response("203.0.113.7\n").unwrap();
        assert_eq!(parsed, "203.0.113.7");
    }

    #[test]
    fn test_default_headers_carry_user_agent() {
        let headers = IpifyRequest.headers();
        assert_eq!(headers.get(USER_AGENT_HEADER).unwrap(), USER_AGENT);
    }
}
