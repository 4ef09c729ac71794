use crate::lookup::Request;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Public address and geolocation of the caller.
///
/// Every field is optional; the service omits what it does not know and
/// returns `{"error": true, ...}` when rate limited.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IpApiResponse {
    pub ip: Option<String>,
    /// ISP or organisation owning the address.
    pub org: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country_name: Option<String>,
    pub country_code: Option<String>,
    pub timezone: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default)]
    pub error: bool,
    pub reason: Option<String>,
}

pub struct IpApiRequest;

impl Request for IpApiRequest {
    type Response = IpApiResponse;

    fn url(&self) -> Cow<'_, str> {
        "https://ipapi.co/json/".into()
    }
}

/// Public address only, as plain text.
pub struct IpifyRequest;

impl Request for IpifyRequest {
    type Response = String;

    fn url(&self) -> Cow<'_, str> {
        "https://api.ipify.org".into()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DohResponse {
    /// DNS response code, 0 is NOERROR.
    #[serde(rename = "Status")]
    pub status: u16,
}

/// A-record query over DNS-over-HTTPS in the JSON wire format.
pub struct DohRequest {
    pub name: String,
}

impl Default for DohRequest {
    fn default() -> Self {
        Self { name: "example.com".to_string() }
    }
}

impl Request for DohRequest {
    type Response = DohResponse;

    fn url(&self) -> Cow<'_, str> {
        format!("https://cloudflare-dns.com/dns-query?name={}&type=A", self.name)
            .into()
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/dns-json"));
        headers
    }
}
