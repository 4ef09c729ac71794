//! Result data structures.
//!
//! [`TestResult`] is the persisted record of one completed speed test.
//! It serializes as `{timestamp, download, upload, ping, jitter}` with an
//! RFC 3339 timestamp so the history file stays readable by hand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::stats::{mean, population_std_dev};

/// Latency summary of one ping round.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyResult {
    /// Mean round trip in milliseconds, rounded to the nearest integer.
    pub average: f64,
    /// Population standard deviation of the samples, rounded likewise.
    pub jitter: f64,
}

impl LatencyResult {
    pub fn new(average: f64, jitter: f64) -> Self {
        Self { average, jitter }
    }

    /// Summarise raw samples (milliseconds).
    ///
    /// The mean is rounded first and jitter is taken about that rounded
    /// average, then rounded itself. An empty sample set yields zeros.
    pub fn from_samples(samples: &[f64]) -> Self {
        let Some(average) = mean(samples).map(f64::round) else {
            return Self::new(0.0, 0.0);
        };
        let jitter = population_std_dev(samples, average).unwrap_or(0.0);

        Self::new(average, jitter.round())
    }
}

/// One completed speed test, as stored in the history.
///
/// Read-only once built: fields are only reachable through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    timestamp: DateTime<Utc>,
    download: f64,
    upload: f64,
    ping: f64,
    jitter: f64,
}

impl TestResult {
    pub fn new(
        timestamp: DateTime<Utc>,
        download: f64,
        upload: f64,
        latency: LatencyResult,
    ) -> Self {
        Self {
            timestamp,
            download,
            upload,
            ping: latency.average,
            jitter: latency.jitter,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Download throughput in Mbps.
    pub fn download(&self) -> f64 {
        self.download
    }

    /// Upload throughput in Mbps.
    pub fn upload(&self) -> f64 {
        self.upload
    }

    /// Average latency in milliseconds.
    pub fn ping(&self) -> f64 {
        self.ping
    }

    /// Latency jitter in milliseconds.
    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    /// Every numeric field is finite and non-negative.
    pub fn is_valid(&self) -> bool {
        [self.download, self.upload, self.ping, self.jitter]
            .iter()
            .all(|value| value.is_finite() && *value >= 0.0)
    }

    pub fn download_quality(&self) -> ConnectionQuality {
        ConnectionQuality::from_mbps(self.download)
    }
}

/// Coarse rating of a throughput figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionQuality {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl ConnectionQuality {
    pub fn from_mbps(mbps: f64) -> Self {
        if mbps < 1.0 {
            ConnectionQuality::Poor
        } else if mbps < 5.0 {
            ConnectionQuality::Fair
        } else if mbps < 25.0 {
            ConnectionQuality::Good
        } else {
            ConnectionQuality::Excellent
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ConnectionQuality::Poor => "Poor",
            ConnectionQuality::Fair => "Fair",
            ConnectionQuality::Good => "Good",
            ConnectionQuality::Excellent => "Excellent",
        }
    }
}

impl fmt::Display for ConnectionQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Human-readable byte count, base 1024, up to gigabytes.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut exponent = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && exponent < UNITS.len() - 1 {
        value /= 1024.0;
        exponent += 1;
    }

    // Two decimals, trailing zeros dropped.
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[exponent])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_latency_identical_samples_have_no_jitter() {
        let latency = LatencyResult::from_samples(&[42.0, 42.0, 42.0]);
        assert_eq!(latency.average, 42.0);
        assert_eq!(latency.jitter, 0.0);
    }

    #[test]
    fn test_latency_rounds_both_fields() {
        // mean 20, population std dev sqrt(200/3) = 8.16
        let latency = LatencyResult::from_samples(&[10.0, 20.0, 30.0]);
        assert_eq!(latency.average, 20.0);
        assert_eq!(latency.jitter, 8.0);

        let latency = LatencyResult::from_samples(&[10.4, 10.4, 10.9]);
        assert_eq!(latency.average, 11.0);
    }

    #[test]
    fn test_jitter_is_about_rounded_average() {
        // Exact mean 1/3 rounds to 0; deviation about 0 is sqrt(1/3) -> 1.
        // About the exact mean it would be sqrt(2/9) -> 0.
        let latency = LatencyResult::from_samples(&[0.0, 0.0, 1.0]);
        assert_eq!(latency.average, 0.0);
        assert_eq!(latency.jitter, 1.0);
    }

    #[test]
    fn test_latency_empty_samples() {
        assert_eq!(LatencyResult::from_samples(&[]), LatencyResult::new(0.0, 0.0));
    }

    #[test]
    fn test_test_result_validity() {
        let timestamp = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        let result = TestResult::new(
            timestamp,
            42.5,
            30.1,
            LatencyResult::new(20.0, 3.0),
        );
        assert!(result.is_valid());
        assert_eq!(result.ping(), 20.0);
        assert_eq!(result.jitter(), 3.0);
        assert_eq!(result.timestamp(), timestamp);

        let broken = TestResult::new(
            timestamp,
            f64::NAN,
            30.1,
            LatencyResult::new(20.0, 3.0),
        );
        assert!(!broken.is_valid());

        let negative =
            TestResult::new(timestamp, 42.5, -1.0, LatencyResult::new(20.0, 3.0));
        assert!(!negative.is_valid());
    }

    #[test]
    fn test_test_result_json_shape() {
        let timestamp = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        let result =
            TestResult::new(timestamp, 12.5, 10.0, LatencyResult::new(35.0, 4.0));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["timestamp"], "2026-10-18T12:00:00Z");
        assert_eq!(json["download"], 12.5);
        assert_eq!(json["upload"], 10.0);
        assert_eq!(json["ping"], 35.0);
        assert_eq!(json["jitter"], 4.0);
    }

    #[test]
    fn test_connection_quality_thresholds() {
        assert_eq!(ConnectionQuality::from_mbps(0.5), ConnectionQuality::Poor);
        assert_eq!(ConnectionQuality::from_mbps(1.0), ConnectionQuality::Fair);
        assert_eq!(ConnectionQuality::from_mbps(4.99), ConnectionQuality::Fair);
        assert_eq!(ConnectionQuality::from_mbps(5.0), ConnectionQuality::Good);
        assert_eq!(
            ConnectionQuality::from_mbps(25.0),
            ConnectionQuality::Excellent
        );
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 Bytes");
        assert_eq!(format_bytes(512), "512 Bytes");
        assert_eq!(format_bytes(1024), "1 KB");
        assert_eq!(format_bytes(100_000), "97.66 KB");
        assert_eq!(format_bytes(1_048_576), "1 MB");
        assert_eq!(format_bytes(1_500_000_000), "1.4 GB");
    }
}
