//! Ordered fallback strategies with per-strategy timeouts.
//!
//! A [`FallbackChain`] holds named strategies that are tried in order until
//! one succeeds. Each strategy runs under its own timeout, so a hanging
//! primary probe hands over to the next mechanism instead of stalling the
//! whole measurement.

use crate::probes::ProbeError;
use futures::future::BoxFuture;
use log::{debug, warn};
use std::time::Duration;
use tokio::time::{timeout, Instant};

type Attempt<'a, T> =
    Box<dyn Fn() -> BoxFuture<'a, Result<T, ProbeError>> + Send + Sync + 'a>;

/// One named mechanism in a chain.
struct Strategy<'a, T> {
    name: &'static str,
    timeout: Duration,
    attempt: Attempt<'a, T>,
}

/// Outcome of running a chain.
#[derive(Debug)]
pub enum FallbackResult<T> {
    /// A strategy produced a value.
    Success {
        value: T,
        /// Name of the strategy that succeeded.
        strategy: &'static str,
        /// Number of strategies tried, including the winner.
        attempts: usize,
    },
    /// Every strategy failed.
    Exhausted {
        /// The error of the last strategy tried.
        last_error: ProbeError,
        attempts: usize,
    },
}

impl<T> FallbackResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, FallbackResult::Success { .. })
    }

    pub fn ok(self) -> Option<T> {
        match self {
            FallbackResult::Success { value, .. } => Some(value),
            FallbackResult::Exhausted { .. } => None,
        }
    }

    pub fn into_result(self) -> Result<T, ProbeError> {
        match self {
            FallbackResult::Success { value, .. } => Ok(value),
            FallbackResult::Exhausted { last_error, .. } => Err(last_error),
        }
    }
}

/// Strategies tried in sequence, first success wins.
pub struct FallbackChain<'a, T> {
    operation: String,
    strategies: Vec<Strategy<'a, T>>,
}

impl<'a, T: Send> FallbackChain<'a, T> {
    pub fn new(operation: impl Into<String>) -> Self {
        Self { operation: operation.into(), strategies: Vec::new() }
    }

    /// Append a strategy. It only runs if every earlier strategy failed.
    pub fn then<F>(
        mut self,
        name: &'static str,
        timeout: Duration,
        attempt: F,
    ) -> Self
    where
        F: Fn() -> BoxFuture<'a, Result<T, ProbeError>> + Send + Sync + 'a,
    {
        self.strategies.push(Strategy { name, timeout, attempt: Box::new(attempt) });
        self
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name).collect()
    }

    pub async fn run(&self) -> FallbackResult<T> {
        let mut last_error = ProbeError::network(
            format!("{}: no strategies configured", self.operation),
            Duration::ZERO,
        );

        for (index, strategy) in self.strategies.iter().enumerate() {
            let attempts = index + 1;
            let started = Instant::now();

            match timeout(strategy.timeout, (strategy.attempt)()).await {
                Ok(Ok(value)) => {
                    if index > 0 {
                        debug!(
                            "{}: succeeded with fallback '{}'",
                            self.operation, strategy.name
                        );
                    }
                    return FallbackResult::Success {
                        value,
                        strategy: strategy.name,
                        attempts,
                    };
                }
                Ok(Err(error)) => {
                    warn!(
                        "{}: '{}' failed: {}",
                        self.operation, strategy.name, error
                    );
                    last_error = error;
                }
                Err(_) => {
                    warn!(
                        "{}: '{}' timed out after {:?}",
                        self.operation, strategy.name, strategy.timeout
                    );
                    last_error = ProbeError::timeout(
                        format!("{} timed out", strategy.name),
                        started.elapsed(),
                    );
                }
            }
        }

        FallbackResult::Exhausted { last_error, attempts: self.strategies.len() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicU32, Ordering};

    const LONG: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_first_strategy_wins() {
        let calls = AtomicU32::new(0);
        let chain: FallbackChain<'_, u32> = FallbackChain::new("test op")
            .then("primary", LONG, || async { Ok::<_, ProbeError>(1) }.boxed())
            .then("secondary", LONG, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, ProbeError>(2) }.boxed()
            });

        match chain.run().await {
            FallbackResult::Success { value, strategy, attempts } => {
                assert_eq!(value, 1);
                assert_eq!(strategy, "primary");
                assert_eq!(attempts, 1);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_falls_through_to_next_strategy() {
        let chain: FallbackChain<'_, u32> = FallbackChain::new("test op")
            .then("primary", LONG, || {
                async {
                    Err::<u32, _>(ProbeError::network("refused", Duration::from_millis(3)))
                }
                .boxed()
            })
            .then("secondary", LONG, || async { Ok::<_, ProbeError>(7) }.boxed());

        match chain.run().await {
            FallbackResult::Success { value, strategy, attempts } => {
                assert_eq!(value, 7);
                assert_eq!(strategy, "secondary");
                assert_eq!(attempts, 2);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exhausted_keeps_last_error() {
        let chain: FallbackChain<'_, u32> = FallbackChain::new("test op")
            .then("primary", LONG, || {
                async { Err::<u32, _>(ProbeError::network("first", Duration::from_millis(1))) }
                    .boxed()
            })
            .then("secondary", LONG, || {
                async {
                    Err::<u32, _>(ProbeError::network("second", Duration::from_millis(40)))
                }
                .boxed()
            });

        match chain.run().await {
            FallbackResult::Exhausted { last_error, attempts } => {
                assert_eq!(attempts, 2);
                assert_eq!(last_error.message, "second");
                assert_eq!(last_error.elapsed, Duration::from_millis(40));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_strategy_timeout_moves_on() {
        let chain: FallbackChain<'_, u32> = FallbackChain::new("test op")
            .then("hanging", Duration::from_secs(3), || {
                async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok::<_, ProbeError>(1)
                }
                .boxed()
            })
            .then("quick", LONG, || async { Ok::<_, ProbeError>(2) }.boxed());

        let result = chain.run().await;
        assert!(result.is_success());
        assert_eq!(result.ok(), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_error_reports_elapsed() {
        let chain: FallbackChain<'_, u32> = FallbackChain::new("test op")
            .then("hanging", Duration::from_secs(3), || {
                async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok::<_, ProbeError>(1)
                }
                .boxed()
            });

        let error = chain.run().await.into_result().unwrap_err();
        assert_eq!(error.failure, crate::probes::ProbeFailure::Timeout);
        assert!(error.elapsed >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_empty_chain_is_exhausted() {
        let chain: FallbackChain<'_, u32> = FallbackChain::new("empty");
        assert!(chain.is_empty());

        match chain.run().await {
            FallbackResult::Exhausted { attempts, .. } => assert_eq!(attempts, 0),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_strategy_names_in_order() {
        let chain: FallbackChain<'_, u32> = FallbackChain::new("names")
            .then("a", LONG, || async { Ok::<_, ProbeError>(1) }.boxed())
            .then("b", LONG, || async { Ok::<_, ProbeError>(2) }.boxed());
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.strategy_names(), vec!["a", "b"]);
    }
}
