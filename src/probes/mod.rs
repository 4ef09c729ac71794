//! Timing probes consumed by the measurement engine.
//!
//! A probe only reports how long something took. `NetworkProbe` times a
//! round trip to an endpoint, `DataProbe` times moving a payload of a given
//! size. Both report failures as [`ProbeError`], which still carries the
//! elapsed time so a failed probe can be used as a timing proxy.

use crate::errors::{ErrorKind, ScannerError};
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use url::Url;

pub mod http;
pub mod local;
pub mod remote;

pub use http::HttpProbe;
pub use local::{LocalDataProbe, SimulatedUploadProbe};
pub use remote::RemoteDownloadProbe;

/// Times one round trip to an endpoint.
pub trait NetworkProbe {
    /// Returns the elapsed time of the round trip. Implementations try
    /// their own fallback mechanism before giving up.
    fn send(
        &self,
        endpoint: &Url,
    ) -> impl Future<Output = Result<Duration, ProbeError>> + Send;

    /// Longest a whole `send` may take when each mechanism is allowed
    /// `per_attempt`. Probes with a single mechanism keep the default.
    fn deadline(&self, per_attempt: Duration) -> Duration {
        per_attempt
    }
}

/// Times the transfer of a synthetic payload.
pub trait DataProbe {
    fn transfer(
        &self,
        bytes: u64,
    ) -> impl Future<Output = Result<Duration, ProbeError>> + Send;
}

/// How a probe failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeFailure {
    /// No answer within the probe's timeout.
    Timeout,
    /// The transport failed before an answer arrived.
    Network,
}

/// Where download payloads come from.
#[derive(Debug, Clone)]
pub enum DownloadProbe {
    Local(LocalDataProbe),
    Remote(RemoteDownloadProbe),
}

impl DataProbe for DownloadProbe {
    async fn transfer(&self, bytes: u64) -> Result<Duration, ProbeError> {
        match self {
            DownloadProbe::Local(probe) => probe.transfer(bytes).await,
            DownloadProbe::Remote(probe) => probe.transfer(bytes).await,
        }
    }
}

/// A failed probe, with the time spent before it failed.
#[derive(Debug, Clone)]
pub struct ProbeError {
    pub failure: ProbeFailure,
    pub elapsed: Duration,
    pub message: String,
}

impl ProbeError {
    pub fn timeout(message: impl Into<String>, elapsed: Duration) -> Self {
        Self { failure: ProbeFailure::Timeout, elapsed, message: message.into() }
    }

    pub fn network(message: impl Into<String>, elapsed: Duration) -> Self {
        Self { failure: ProbeFailure::Network, elapsed, message: message.into() }
    }

    pub(crate) fn from_reqwest(error: reqwest::Error, elapsed: Duration) -> Self {
        if error.is_timeout() {
            Self::timeout(error.to_string(), elapsed)
        } else {
            Self::network(error.to_string(), elapsed)
        }
    }

    pub(crate) fn from_io(error: std::io::Error, elapsed: Duration) -> Self {
        if error.kind() == std::io::ErrorKind::TimedOut {
            Self::timeout(error.to_string(), elapsed)
        } else {
            Self::network(error.to_string(), elapsed)
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self.failure {
            ProbeFailure::Timeout => ErrorKind::ProbeTimeout,
            ProbeFailure::Network => ErrorKind::ProbeNetworkFailure,
        }
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} after {:.0} ms",
            self.message,
            self.elapsed.as_secs_f64() * 1000.0
        )
    }
}

impl Error for ProbeError {}

impl From<ProbeError> for ScannerError {
    fn from(error: ProbeError) -> Self {
        ScannerError::new(error.kind(), error.to_string()).with_source(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_error_kinds() {
        let timeout = ProbeError::timeout("slow", Duration::from_secs(3));
        assert_eq!(timeout.kind(), ErrorKind::ProbeTimeout);

        let network = ProbeError::network("refused", Duration::from_millis(5));
        assert_eq!(network.kind(), ErrorKind::ProbeNetworkFailure);
    }

    #[test]
    fn test_probe_error_display_includes_elapsed() {
        let error = ProbeError::network("refused", Duration::from_millis(250));
        assert_eq!(error.to_string(), "refused after 250 ms");
    }

    #[test]
    fn test_probe_error_into_scanner_error() {
        let error: ScannerError =
            ProbeError::timeout("slow", Duration::from_secs(3)).into();
        assert_eq!(error.kind, ErrorKind::ProbeTimeout);
        assert!(error.message.contains("slow"));
    }

    #[test]
    fn test_io_timeout_maps_to_timeout() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "late");
        let error = ProbeError::from_io(io, Duration::from_millis(10));
        assert_eq!(error.failure, ProbeFailure::Timeout);
    }
}
