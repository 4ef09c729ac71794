pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation of `values` around `center`.
pub fn population_std_dev(values: &[f64], center: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let variance = values
        .iter()
        .map(|value| (value - center).powi(2))
        .sum::<f64>()
        / values.len() as f64;

    Some(variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_mean_empty() {
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn test_mean_values() {
        assert_eq!(mean(&[10.0, 20.0, 30.0]), Some(20.0));
    }

    #[test]
    fn test_std_dev_identical_values() {
        assert_eq!(population_std_dev(&[42.0, 42.0, 42.0], 42.0), Some(0.0));
    }

    #[test]
    fn test_std_dev_known_values() {
        // sqrt(((10-20)^2 + 0 + (30-20)^2) / 3) = sqrt(200/3)
        let std_dev = population_std_dev(&[10.0, 20.0, 30.0], 20.0).unwrap();
        assert!((std_dev - (200.0f64 / 3.0).sqrt()).abs() < 1e-9);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Property: the mean of non-negative values lies between their
        /// minimum and maximum
        #[test]
        fn mean_within_bounds(
            values in prop::collection::vec(0.0f64..10_000.0, 1..50),
        ) {
            let m = mean(&values).unwrap();
            let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

            prop_assert!(m >= min - 1e-9 && m <= max + 1e-9);
        }

        /// Property: standard deviation is never negative
        #[test]
        fn std_dev_non_negative(
            values in prop::collection::vec(0.0f64..10_000.0, 1..50),
        ) {
            let m = mean(&values).unwrap();
            let std_dev = population_std_dev(&values, m).unwrap();

            prop_assert!(std_dev >= 0.0);
            prop_assert!(std_dev.is_finite());
        }
    }
}
