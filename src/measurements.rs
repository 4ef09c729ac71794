//! Throughput arithmetic and the simulated-throughput fallback.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Upload is assumed slower than download on typical last-mile links.
pub const UPLOAD_DERATING: f64 = 0.8;

/// Base rate used when nothing is known about the link.
pub const DEFAULT_BASE_MBPS: f64 = 10.0;

/// Half-width of the symmetric random band applied to simulated rates.
pub const SIMULATION_VARIATION: f64 = 0.2;

/// Direction of a throughput measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Download,
    Upload,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Download => f.write_str("download"),
            Direction::Upload => f.write_str("upload"),
        }
    }
}

/// Convert a transfer of `bytes` taking `elapsed` into megabits per second.
///
/// Returns `None` when the elapsed time is zero or the rate is not finite,
/// so an instantaneous transfer never produces `inf`.
pub fn throughput_mbps(bytes: u64, elapsed: Duration) -> Option<f64> {
    let seconds = elapsed.as_secs_f64();
    if seconds <= 0.0 {
        return None;
    }

    let mbps = (bytes as f64 * 8.0) / (seconds * 1_000_000.0);
    (mbps.is_finite() && mbps >= 0.0).then_some(mbps)
}

/// Effective link class, as a browser's Network Information API reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectiveConnectionType {
    #[serde(rename = "slow-2g")]
    Slow2g,
    #[serde(rename = "2g")]
    TwoG,
    #[serde(rename = "3g")]
    ThreeG,
    #[serde(rename = "4g")]
    FourG,
}

impl EffectiveConnectionType {
    /// Typical downlink for this class, in Mbps.
    pub fn base_mbps(&self) -> f64 {
        match self {
            EffectiveConnectionType::Slow2g => 0.5,
            EffectiveConnectionType::TwoG => 2.0,
            EffectiveConnectionType::ThreeG => 10.0,
            EffectiveConnectionType::FourG => 50.0,
        }
    }
}

impl FromStr for EffectiveConnectionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "slow-2g" => Ok(EffectiveConnectionType::Slow2g),
            "2g" => Ok(EffectiveConnectionType::TwoG),
            "3g" => Ok(EffectiveConnectionType::ThreeG),
            "4g" => Ok(EffectiveConnectionType::FourG),
            other => Err(format!(
                "unknown connection type '{}' (expected slow-2g, 2g, 3g or 4g)",
                other
            )),
        }
    }
}

impl fmt::Display for EffectiveConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EffectiveConnectionType::Slow2g => "slow-2g",
            EffectiveConnectionType::TwoG => "2g",
            EffectiveConnectionType::ThreeG => "3g",
            EffectiveConnectionType::FourG => "4g",
        };
        f.write_str(name)
    }
}

/// What the environment tells us about the link, if anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionHint {
    pub effective_type: Option<EffectiveConnectionType>,
    /// Reported downlink estimate in Mbps.
    pub downlink_mbps: Option<f64>,
}

impl ConnectionHint {
    pub fn new(
        effective_type: Option<EffectiveConnectionType>,
        downlink_mbps: Option<f64>,
    ) -> Self {
        Self { effective_type, downlink_mbps }
    }

    /// Base rate for simulation: the effective type wins, then a usable
    /// downlink estimate, then [`DEFAULT_BASE_MBPS`].
    pub fn base_mbps(&self) -> f64 {
        if let Some(effective_type) = self.effective_type {
            return effective_type.base_mbps();
        }

        self.downlink_mbps
            .filter(|mbps| mbps.is_finite() && *mbps > 0.0)
            .unwrap_or(DEFAULT_BASE_MBPS)
    }

    /// Upper bound of what [`simulated_throughput`] can return.
    pub fn max_simulated_mbps(&self, direction: Direction) -> f64 {
        derate(self.base_mbps() * (1.0 + SIMULATION_VARIATION), direction)
    }

    /// Lower bound of what [`simulated_throughput`] can return.
    pub fn min_simulated_mbps(&self, direction: Direction) -> f64 {
        derate(self.base_mbps() * (1.0 - SIMULATION_VARIATION), direction)
    }
}

/// Apply the upload derating to a rate measured for `direction`.
pub fn derate(mbps: f64, direction: Direction) -> f64 {
    match direction {
        Direction::Download => mbps,
        Direction::Upload => mbps * UPLOAD_DERATING,
    }
}

/// A placeholder rate, not a measurement.
///
/// Only used when real measurement could not complete. The value is the
/// hint's base rate, perturbed by up to ±20% and derated for uploads; it
/// says nothing about actual link conditions.
pub fn simulated_throughput<R: Rng + ?Sized>(
    direction: Direction,
    hint: &ConnectionHint,
    rng: &mut R,
) -> f64 {
    let variation =
        rng.gen_range(-SIMULATION_VARIATION..=SIMULATION_VARIATION);
    let mbps = hint.base_mbps() * (1.0 + variation);

    derate(mbps, direction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_throughput_mbps_basic() {
        // 100 KB in 100 ms = 8 Mbps
        let mbps = throughput_mbps(100_000, Duration::from_millis(100)).unwrap();
        assert!((mbps - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_throughput_mbps_zero_elapsed() {
        assert_eq!(throughput_mbps(100_000, Duration::ZERO), None);
    }

    #[test]
    fn test_derate_upload_only() {
        assert!((derate(10.0, Direction::Download) - 10.0).abs() < 1e-9);
        assert!((derate(10.0, Direction::Upload) - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_hint_base_defaults_to_ten() {
        assert!((ConnectionHint::default().base_mbps() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_hint_effective_type_wins_over_downlink() {
        let hint = ConnectionHint::new(
            Some(EffectiveConnectionType::FourG),
            Some(3.0),
        );
        assert!((hint.base_mbps() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_hint_uses_downlink_without_type() {
        let hint = ConnectionHint::new(None, Some(3.5));
        assert!((hint.base_mbps() - 3.5).abs() < 1e-9);

        let nonsense = ConnectionHint::new(None, Some(f64::NAN));
        assert!((nonsense.base_mbps() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_effective_type_parse() {
        assert_eq!(
            "slow-2g".parse::<EffectiveConnectionType>(),
            Ok(EffectiveConnectionType::Slow2g)
        );
        assert_eq!(
            "4G".parse::<EffectiveConnectionType>(),
            Ok(EffectiveConnectionType::FourG)
        );
        assert!("5g".parse::<EffectiveConnectionType>().is_err());
    }

    fn any_hint() -> impl Strategy<Value = ConnectionHint> {
        let effective_type = prop_oneof![
            Just(None),
            Just(Some(EffectiveConnectionType::Slow2g)),
            Just(Some(EffectiveConnectionType::TwoG)),
            Just(Some(EffectiveConnectionType::ThreeG)),
            Just(Some(EffectiveConnectionType::FourG)),
        ];
        let downlink = prop::option::of(0.1f64..1000.0);

        (effective_type, downlink)
            .prop_map(|(effective_type, downlink_mbps)| {
                ConnectionHint::new(effective_type, downlink_mbps)
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Property: simulated download stays within ±20% of the base rate
        #[test]
        fn simulated_download_within_band(hint in any_hint(), seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let mbps = simulated_throughput(Direction::Download, &hint, &mut rng);

            prop_assert!(mbps >= hint.min_simulated_mbps(Direction::Download) - 1e-9);
            prop_assert!(mbps <= hint.max_simulated_mbps(Direction::Download) + 1e-9);
        }

        /// Property: simulated upload is the derated band and never exceeds
        /// 0.8 × the download ceiling
        #[test]
        fn simulated_upload_is_derated(hint in any_hint(), seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let base = hint.base_mbps();

            for _ in 0..10 {
                let mbps = simulated_throughput(Direction::Upload, &hint, &mut rng);

                prop_assert!(mbps >= base * 0.8 * 0.8 - 1e-9);
                prop_assert!(mbps <= base * 1.2 * 0.8 + 1e-9);
                prop_assert!(mbps <= hint.max_simulated_mbps(Direction::Download) * UPLOAD_DERATING + 1e-9);
            }
        }
    }
}
