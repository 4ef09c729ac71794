//! Progress reporting for speed test runs.
//!
//! The engine announces each phase transition through a [`ProgressSink`].
//! Sinks are called on the measuring task and must not block.

use std::fmt;

/// Phases of a speed test, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPhase {
    Latency,
    Download,
    Upload,
    Complete,
}

impl TestPhase {
    /// Percent-complete hint reported when this phase starts.
    pub fn percent(&self) -> u8 {
        match self {
            TestPhase::Latency => 20,
            TestPhase::Download => 60,
            TestPhase::Upload => 90,
            TestPhase::Complete => 100,
        }
    }

    /// Status line for display.
    pub fn status(&self) -> &'static str {
        match self {
            TestPhase::Latency => "Testing ping...",
            TestPhase::Download => "Testing download speed...",
            TestPhase::Upload => "Testing upload speed...",
            TestPhase::Complete => "Test completed!",
        }
    }
}

impl fmt::Display for TestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TestPhase::Latency => "latency",
            TestPhase::Download => "download",
            TestPhase::Upload => "upload",
            TestPhase::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Receives phase transitions from the engine.
pub trait ProgressSink: Send + Sync {
    /// `percent` is in `0..=100`.
    fn on_phase(&self, phase: TestPhase, percent: u8);
}

impl<F> ProgressSink for F
where
    F: Fn(TestPhase, u8) + Send + Sync,
{
    fn on_phase(&self, phase: TestPhase, percent: u8) {
        self(phase, percent)
    }
}

/// Discards all progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_phase(&self, _phase: TestPhase, _percent: u8) {}
}
