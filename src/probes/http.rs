//! Latency probe over HTTP with TCP fallback.
//!
//! Each round trip is attempted with three mechanisms, in order:
//! 1. `HEAD` with caching disabled; any HTTP status counts as an answer.
//! 2. `GET` with a random query parameter, mirroring a cache-busted
//!    resource load; again any status counts.
//! 3. A bare TCP handshake with the endpoint's host and port.
//!
//! Every mechanism runs under the probe timeout, so one round trip may
//! take up to three timeouts before it gives up.

use super::{NetworkProbe, ProbeError};
use crate::errors::ScannerError;
use crate::fallback::FallbackChain;
use futures::FutureExt;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, PRAGMA};
use reqwest::Client as ReqwestClient;
use std::net::{IpAddr, SocketAddr, TcpStream};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

pub(crate) const USER_AGENT: &str = concat!(
    env!("CARGO_PKG_NAME"),
    "/",
    env!("CARGO_PKG_VERSION")
);

/// Mechanisms tried per round trip.
const MECHANISMS: u32 = 3;

#[derive(Clone)]
pub struct HttpProbe {
    client: ReqwestClient,
    resolver: TokioAsyncResolver,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, ScannerError> {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

        let client = ReqwestClient::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ScannerError::config("failed to build HTTP client").with_source(e)
            })?;

        Ok(Self { client, resolver: system_resolver(), timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn head(&self, endpoint: &Url) -> Result<Duration, ProbeError> {
        let started = Instant::now();
        self.client
            .head(endpoint.clone())
            .send()
            .await
            .map_err(|e| ProbeError::from_reqwest(e, started.elapsed()))?;

        Ok(started.elapsed())
    }

    async fn cache_busted_get(
        &self,
        endpoint: &Url,
    ) -> Result<Duration, ProbeError> {
        let mut url = endpoint.clone();
        url.query_pairs_mut()
            .append_pair("nocache", &rand::random::<u64>().to_string());

        let started = Instant::now();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProbeError::from_reqwest(e, started.elapsed()))?;
        // Resource loads finish when the body has arrived.
        let _ = response.bytes().await;

        Ok(started.elapsed())
    }

    async fn tcp_handshake(&self, endpoint: &Url) -> Result<Duration, ProbeError> {
        let started = Instant::now();
        let host = endpoint.host_str().ok_or_else(|| {
            ProbeError::network(
                format!("{} has no host", endpoint),
                started.elapsed(),
            )
        })?;
        let port = endpoint.port_or_known_default().unwrap_or(443);

        let address = self.resolve(host).await.map_err(|message| {
            ProbeError::network(message, started.elapsed())
        })?;

        measure_tcp_latency(address, port, self.timeout).await
    }

    async fn resolve(&self, host: &str) -> Result<IpAddr, String> {
        if let Ok(address) = host.parse::<IpAddr>() {
            return Ok(address);
        }

        let response = self
            .resolver
            .lookup_ip(host)
            .await
            .map_err(|e| format!("dns lookup for {} failed: {}", host, e))?;

        let addresses: Vec<IpAddr> = response.iter().collect();

        addresses
            .iter()
            .find(|address| address.is_ipv4())
            .or_else(|| addresses.first())
            .copied()
            .ok_or_else(|| format!("no addresses for {}", host))
    }
}

impl NetworkProbe for HttpProbe {
    async fn send(&self, endpoint: &Url) -> Result<Duration, ProbeError> {
        let chain = FallbackChain::new(format!("probe {}", endpoint))
            .then("head", self.timeout, move || self.head(endpoint).boxed())
            .then("cache-busted get", self.timeout, move || {
                self.cache_busted_get(endpoint).boxed()
            })
            .then("tcp handshake", self.timeout, move || {
                self.tcp_handshake(endpoint).boxed()
            });

        let elapsed = chain.run().await.into_result()?;
        debug!("Probe {} answered in {:?}", endpoint, elapsed);
        Ok(elapsed)
    }

    fn deadline(&self, per_attempt: Duration) -> Duration {
        per_attempt * MECHANISMS
    }
}

/// Resolver from the system configuration, or public defaults when the
/// system configuration cannot be read.
pub(crate) fn system_resolver() -> TokioAsyncResolver {
    TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|_| {
        TokioAsyncResolver::tokio(
            ResolverConfig::default(),
            ResolverOpts::default(),
        )
    })
}

/// Time a TCP handshake.
///
/// Runs on the blocking thread pool via `spawn_blocking` to avoid
/// starving the tokio async runtime.
pub(crate) async fn measure_tcp_latency(
    address: IpAddr,
    port: u16,
    timeout: Duration,
) -> Result<Duration, ProbeError> {
    let started = Instant::now();

    let handshake = tokio::task::spawn_blocking(move || {
        let begin = std::time::Instant::now();
        let stream =
            TcpStream::connect_timeout(&SocketAddr::new(address, port), timeout)?;
        let latency = begin.elapsed();

        drop(stream);

        Ok::<_, std::io::Error>(latency)
    })
    .await
    .map_err(|e| ProbeError::network(e.to_string(), started.elapsed()))?;

    handshake.map_err(|e| ProbeError::from_io(e, started.elapsed()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[tokio::test]
    async fn test_measure_tcp_latency_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let latency = measure_tcp_latency(
            IpAddr::from([127, 0, 0, 1]),
            port,
            Duration::from_secs(3),
        )
        .await
        .unwrap();

        assert!(latency < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_measure_tcp_latency_refused_keeps_elapsed() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let error = measure_tcp_latency(
            IpAddr::from([127, 0, 0, 1]),
            port,
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();

        assert!(error.elapsed < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_send_falls_back_to_tcp_handshake() {
        // A listener that accepts but never speaks HTTP: the HTTP
        // strategies time out, the handshake succeeds.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let endpoint: Url =
            format!("http://127.0.0.1:{}/favicon.ico", port).parse().unwrap();

        let probe = HttpProbe::new(Duration::from_millis(300)).unwrap();
        let elapsed = probe.send(&endpoint).await.unwrap();

        assert!(elapsed < Duration::from_millis(300));
        drop(listener);
    }

    #[test]
    fn test_deadline_covers_every_mechanism() {
        let probe = HttpProbe::new(Duration::from_millis(300)).unwrap();
        assert_eq!(
            probe.deadline(Duration::from_millis(300)),
            Duration::from_millis(900)
        );
    }
}
