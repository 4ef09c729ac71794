//! Locally observable connectivity facts.
//!
//! Every fact is optional. A lookup that fails is logged and reported as
//! unknown; [`NetworkScanner::scan`] itself never fails.

use crate::engine::TestConfig;
use crate::errors::ScannerError;
use crate::lookup::{Client, DohRequest, IpApiRequest, IpifyRequest};
use crate::measurements::ConnectionHint;
use crate::probes::http::system_resolver;
use crate::probes::{HttpProbe, NetworkProbe};
use crate::stats::mean;
use hickory_resolver::TokioAsyncResolver;
use log::{debug, warn};
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;
use tokio::time::{timeout, Instant};
use url::Url;

const IPV6_CHECK_URL: &str = "https://ipv6.google.com";
const DNS_TIMING_HOST: &str = "www.google.com";
/// Any routable address; the socket is connected but nothing is sent.
const ROUTE_PROBE_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), 80);
const RTT_SAMPLES: usize = 3;
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);

/// Public address and geolocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PublicAddress {
    pub ip: Option<String>,
    pub isp: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub timezone: Option<String>,
    /// Latitude and longitude in degrees.
    pub coordinates: Option<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostInfo {
    pub hostname: Option<String>,
    pub os: &'static str,
    pub arch: &'static str,
    pub family: &'static str,
}

impl HostInfo {
    pub fn current() -> Self {
        Self {
            hostname: hostname(),
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
            family: std::env::consts::FAMILY,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkInfo {
    pub online: bool,
    pub public: PublicAddress,
    pub local_ip: Option<IpAddr>,
    pub ipv6_supported: bool,
    pub dns_over_https: bool,
    pub dns_resolution_ms: Option<f64>,
    pub rtt_ms: Option<f64>,
    pub host: HostInfo,
    pub connection: ConnectionHint,
}

pub struct NetworkScanner<P> {
    client: Client,
    probe: P,
    resolver: TokioAsyncResolver,
    endpoints: Vec<Url>,
    probe_timeout: Duration,
    hint: ConnectionHint,
}

impl NetworkScanner<HttpProbe> {
    pub fn new(config: &TestConfig, hint: ConnectionHint) -> Result<Self, ScannerError> {
        let probe = HttpProbe::new(config.probe_timeout)?;
        Self::with_probe(config, probe, hint)
    }
}

impl<P: NetworkProbe> NetworkScanner<P> {
    pub fn with_probe(
        config: &TestConfig,
        probe: P,
        hint: ConnectionHint,
    ) -> Result<Self, ScannerError> {
        Ok(Self {
            client: Client::new(LOOKUP_TIMEOUT)?,
            probe,
            resolver: system_resolver(),
            endpoints: config.latency_endpoints.clone(),
            probe_timeout: config.probe_timeout,
            hint,
        })
    }

    /// Gather every fact concurrently.
    pub async fn scan(&self) -> NetworkInfo {
        let (public, ipv6_supported, dns_over_https, dns_resolution_ms, rtt_ms) = tokio::join!(
            self.public_address(),
            self.client.reachable(IPV6_CHECK_URL),
            self.dns_over_https(),
            self.dns_resolution_time(),
            self.round_trip_time(),
        );

        let online = public.ip.is_some()
            || ipv6_supported
            || dns_over_https
            || dns_resolution_ms.is_some()
            || rtt_ms.is_some();

        NetworkInfo {
            online,
            public,
            local_ip: local_ip(),
            ipv6_supported,
            dns_over_https,
            dns_resolution_ms,
            rtt_ms,
            host: HostInfo::current(),
            connection: self.hint,
        }
    }

    async fn public_address(&self) -> PublicAddress {
        match self.client.send(IpApiRequest).await {
            Ok(response) if !response.error => {
                return PublicAddress {
                    ip: response.ip,
                    isp: response.org,
                    country: response.country_name,
                    country_code: response.country_code,
                    region: response.region,
                    city: response.city,
                    timezone: response.timezone,
                    coordinates: response.latitude.zip(response.longitude),
                };
            }
            Ok(response) => warn!(
                "Geolocation lookup refused: {}",
                response.reason.as_deref().unwrap_or("no reason given")
            ),
            Err(e) => warn!("Geolocation lookup failed: {}", e),
        }

        match self.client.send(IpifyRequest).await {
            Ok(ip) => PublicAddress { ip: Some(ip), ..PublicAddress::default() },
            Err(e) => {
                warn!("Public IP lookup failed: {}", e);
                PublicAddress::default()
            }
        }
    }

    async fn dns_over_https(&self) -> bool {
        match self.client.send(DohRequest::default()).await {
            Ok(response) => {
                debug!("DoH answered with status {}", response.status);
                true
            }
            Err(e) => {
                debug!("DoH unavailable: {}", e);
                false
            }
        }
    }

    async fn dns_resolution_time(&self) -> Option<f64> {
        let started = Instant::now();
        match timeout(LOOKUP_TIMEOUT, self.resolver.lookup_ip(DNS_TIMING_HOST)).await {
            Ok(Ok(_)) => Some((started.elapsed().as_secs_f64() * 1000.0).round()),
            Ok(Err(e)) => {
                warn!("Resolving {} failed: {}", DNS_TIMING_HOST, e);
                None
            }
            Err(_) => {
                warn!("Resolving {} timed out", DNS_TIMING_HOST);
                None
            }
        }
    }

    /// Mean of a few successful round trips, rounded to whole ms.
    pub async fn round_trip_time(&self) -> Option<f64> {
        if self.endpoints.is_empty() {
            return None;
        }

        let mut samples = Vec::with_capacity(RTT_SAMPLES);
        for i in 0..RTT_SAMPLES {
            let endpoint = &self.endpoints[i % self.endpoints.len()];
            match timeout(self.probe_timeout, self.probe.send(endpoint)).await {
                Ok(Ok(elapsed)) => samples.push(elapsed.as_secs_f64() * 1000.0),
                Ok(Err(e)) => debug!("RTT sample to {} failed: {}", endpoint, e),
                Err(_) => debug!("RTT sample to {} timed out", endpoint),
            }
        }

        mean(&samples).map(f64::round)
    }
}

/// Address of the interface that routes to the internet.
///
/// Connecting a UDP socket only selects a route; no packet leaves the
/// host. Link-local and unspecified addresses are not reported.
pub fn local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect(ROUTE_PROBE_ADDR).ok()?;
    let address = socket.local_addr().ok()?.ip();

    usable_local_ip(address).then_some(address)
}

fn usable_local_ip(address: IpAddr) -> bool {
    match address {
        IpAddr::V4(v4) => !v4.is_unspecified() && !v4.is_link_local(),
        IpAddr::V6(v6) => {
            !v6.is_unspecified() && (v6.segments()[0] & 0xffc0) != 0xfe80
        }
    }
}

fn hostname() -> Option<String> {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .chain(std::fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::ProbeError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails every other call.
    struct AlternatingProbe {
        calls: AtomicUsize,
    }

    impl NetworkProbe for AlternatingProbe {
        async fn send(&self, _endpoint: &Url) -> Result<Duration, ProbeError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call % 2 == 1 {
                return Err(ProbeError::network("refused", Duration::from_millis(1)));
            }
            Ok(Duration::from_millis(10 + call as u64 * 10))
        }
    }

    struct DeadProbe;

    impl NetworkProbe for DeadProbe {
        async fn send(&self, _endpoint: &Url) -> Result<Duration, ProbeError> {
            Err(ProbeError::network("offline", Duration::from_millis(1)))
        }
    }

    fn scanner<P: NetworkProbe>(probe: P) -> NetworkScanner<P> {
        NetworkScanner::with_probe(&TestConfig::default(), probe, ConnectionHint::default())
            .unwrap()
    }

    #[tokio::test]
    async fn test_rtt_averages_successful_samples() {
        let scanner = scanner(AlternatingProbe { calls: AtomicUsize::new(0) });

        // Calls 0 and 2 succeed with 10 ms and 30 ms.
        assert_eq!(scanner.round_trip_time().await, Some(20.0));
    }

    #[tokio::test]
    async fn test_rtt_unknown_when_every_sample_fails() {
        let scanner = scanner(DeadProbe);
        assert_eq!(scanner.round_trip_time().await, None);
    }

    #[test]
    fn test_link_local_is_not_usable() {
        assert!(!usable_local_ip("169.254.10.20".parse().unwrap()));
        assert!(!usable_local_ip("0.0.0.0".parse().unwrap()));
        assert!(!usable_local_ip("fe80::1".parse().unwrap()));
        assert!(usable_local_ip("192.168.1.23".parse().unwrap()));
        assert!(usable_local_ip("2001:db8::5".parse().unwrap()));
    }

    #[test]
    fn test_host_info_matches_target() {
        let host = HostInfo::current();
        assert_eq!(host.os, std::env::consts::OS);
        assert_eq!(host.arch, std::env::consts::ARCH);
        assert!(!host.family.is_empty());
    }
}
