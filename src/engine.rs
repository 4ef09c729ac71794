use crate::errors::ScannerError;
use crate::measurements::{
    derate, simulated_throughput, throughput_mbps, ConnectionHint, Direction,
};
use crate::probes::local::SimulatedUploadProbe;
use crate::probes::{DataProbe, NetworkProbe};
use crate::progress::{ProgressSink, TestPhase};
use crate::results::{LatencyResult, TestResult};
use chrono::Utc;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

/// Beacons used for latency sampling, visited round-robin.
pub const DEFAULT_LATENCY_ENDPOINTS: [&str; 3] = [
    "https://www.google.com/favicon.ico",
    "https://www.cloudflare.com/favicon.ico",
    "https://httpbin.org/get",
];

/// Configuration for the measurement engine.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Number of latency samples per run.
    /// Default: 5
    pub latency_samples: usize,

    /// Pause between consecutive latency samples.
    /// Default: 100ms
    pub inter_sample_delay: Duration,

    /// Endpoints probed for latency, round-robin by sample index.
    pub latency_endpoints: Vec<Url>,

    /// Payload sizes for the download phase, in bytes.
    /// Default: 100KB, 500KB, 1MB
    pub download_sizes: Vec<u64>,

    /// Payload size for the upload phase, in bytes.
    /// Default: 100KB
    pub upload_payload_bytes: u64,

    /// Bound on any single probe before it counts as failed.
    /// Default: 3s
    pub probe_timeout: Duration,

    /// Bounds of the simulated upload processing delay.
    /// Default: 500ms to 1500ms
    pub upload_delay_min: Duration,
    pub upload_delay_max: Duration,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            latency_samples: 5,
            inter_sample_delay: Duration::from_millis(100),
            latency_endpoints: DEFAULT_LATENCY_ENDPOINTS
                .iter()
                .filter_map(|endpoint| Url::parse(endpoint).ok())
                .collect(),
            download_sizes: vec![
                100_000,   // 100KB
                500_000,   // 500KB
                1_000_000, // 1MB
            ],
            upload_payload_bytes: 100_000,
            probe_timeout: Duration::from_secs(3),
            upload_delay_min: SimulatedUploadProbe::DEFAULT_MIN_DELAY,
            upload_delay_max: SimulatedUploadProbe::DEFAULT_MAX_DELAY,
        }
    }
}

impl TestConfig {
    pub fn validate(&self) -> Result<(), ScannerError> {
        if self.latency_samples == 0 {
            return Err(ScannerError::config(
                "latency sample count must be at least 1",
            ));
        }
        if self.latency_endpoints.is_empty() {
            return Err(ScannerError::config(
                "at least one latency endpoint is required",
            ));
        }
        if self.download_sizes.is_empty() {
            return Err(ScannerError::config(
                "at least one download size is required",
            ));
        }
        if self.download_sizes.contains(&0) || self.upload_payload_bytes == 0 {
            return Err(ScannerError::config("payload sizes must be non-zero"));
        }
        if self.probe_timeout.is_zero() {
            return Err(ScannerError::config("probe timeout must be non-zero"));
        }
        if self.upload_delay_min > self.upload_delay_max {
            return Err(ScannerError::config(
                "upload delay minimum exceeds its maximum",
            ));
        }
        Ok(())
    }
}

/// Lifecycle of a speed test run.
///
/// `Completed` and `Aborted` are terminal for a run; a new run may start
/// from `Idle` or `Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    RunningLatency,
    RunningDownload,
    RunningUpload,
    Completed,
    Aborted,
}

impl EngineState {
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            EngineState::RunningLatency
                | EngineState::RunningDownload
                | EngineState::RunningUpload
        )
    }
}

/// Produces one [`TestResult`] per run from three probes.
///
/// At most one run is in flight at a time. A second call to
/// [`run_speed_test`](Self::run_speed_test) while one is running fails
/// with `ConcurrentRunRejected` and leaves the running test untouched.
/// Probe failures never fail a run: they are timed, skipped or replaced
/// by simulated values.
///
/// # Example
/// ```no_run
/// use net_scanner::engine::{MeasurementEngine, TestConfig};
/// use net_scanner::probes::{HttpProbe, LocalDataProbe, SimulatedUploadProbe};
/// use net_scanner::progress::NoProgress;
///
/// #[tokio::main]
/// async fn main() {
///     let config = TestConfig::default();
///     let latency = HttpProbe::new(config.probe_timeout).unwrap();
///     let engine = MeasurementEngine::new(
///         config,
///         latency,
///         LocalDataProbe::new(),
///         SimulatedUploadProbe::default(),
///     );
///     let result = engine.run_speed_test(&NoProgress).await.unwrap();
///     println!("Download: {:.2} Mbps", result.download());
/// }
/// ```
pub struct MeasurementEngine<N, D, U> {
    config: TestConfig,
    latency_probe: N,
    download_probe: D,
    upload_probe: U,
    hint: ConnectionHint,
    busy: AtomicBool,
    state: Mutex<EngineState>,
}

impl<N, D, U> MeasurementEngine<N, D, U>
where
    N: NetworkProbe,
    D: DataProbe,
    U: DataProbe,
{
    pub fn new(
        config: TestConfig,
        latency_probe: N,
        download_probe: D,
        upload_probe: U,
    ) -> Self {
        Self {
            config,
            latency_probe,
            download_probe,
            upload_probe,
            hint: ConnectionHint::default(),
            busy: AtomicBool::new(false),
            state: Mutex::new(EngineState::Idle),
        }
    }

    /// Link information used to pick the simulated fallback rate.
    pub fn with_connection_hint(mut self, hint: ConnectionHint) -> Self {
        self.hint = hint;
        self
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.state.lock().map(|state| *state).unwrap_or(EngineState::Aborted)
    }

    pub fn is_running(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Run latency, download and upload measurements, in that order.
    ///
    /// Reports each phase to `progress` before it starts and `Complete`
    /// at the end. Dropping the returned future mid-run leaves the engine
    /// in [`EngineState::Aborted`].
    pub async fn run_speed_test(
        &self,
        progress: &dyn ProgressSink,
    ) -> Result<TestResult, ScannerError> {
        let _guard = RunGuard::acquire(&self.busy, &self.state)?;
        info!("Starting speed test sequence");

        self.enter(EngineState::RunningLatency, TestPhase::Latency, progress);
        let latency = self
            .measure_latency(
                self.config.latency_samples,
                &self.latency_probe,
                self.config.inter_sample_delay,
            )
            .await;
        info!("Ping: {} ms, jitter: {} ms", latency.average, latency.jitter);

        self.enter(EngineState::RunningDownload, TestPhase::Download, progress);
        let download = self
            .measure_download(&self.config.download_sizes, &self.download_probe)
            .await;
        info!("Download: {:.2} Mbps", download);

        self.enter(EngineState::RunningUpload, TestPhase::Upload, progress);
        let upload = self
            .measure_upload(self.config.upload_payload_bytes, &self.upload_probe)
            .await;
        info!("Upload: {:.2} Mbps", upload);

        let result = TestResult::new(Utc::now(), download, upload, latency);
        self.enter(EngineState::Completed, TestPhase::Complete, progress);

        Ok(result)
    }

    /// Sample round-trip latency `sample_count` times, one at a time.
    ///
    /// Endpoints are visited round-robin by sample index. The probe
    /// timeout applies to each of the probe's own mechanisms; a whole
    /// sample is bounded by [`NetworkProbe::deadline`]. A failed probe
    /// still contributes the time it took to fail, and a sample that hits
    /// the deadline contributes the deadline itself, so no sample is
    /// dropped.
    pub async fn measure_latency<P: NetworkProbe>(
        &self,
        sample_count: usize,
        probe: &P,
        inter_sample_delay: Duration,
    ) -> LatencyResult {
        let endpoints = &self.config.latency_endpoints;
        if endpoints.is_empty() {
            warn!("No latency endpoints configured");
            return LatencyResult::new(0.0, 0.0);
        }

        let sample_count = sample_count.max(1);
        let deadline = probe.deadline(self.config.probe_timeout);
        let mut samples = Vec::with_capacity(sample_count);

        for i in 0..sample_count {
            let endpoint = &endpoints[i % endpoints.len()];

            let elapsed = match timeout(deadline, probe.send(endpoint)).await {
                    Ok(Ok(elapsed)) => elapsed,
                    Ok(Err(error)) => {
                        warn!(
                            "Latency sample {}/{} to {} failed: {}",
                            i + 1,
                            sample_count,
                            endpoint,
                            error
                        );
                        error.elapsed
                    }
                    Err(_) => {
                        warn!(
                            "Latency sample {}/{} to {} timed out",
                            i + 1,
                            sample_count,
                            endpoint
                        );
                        deadline
                    }
                };

            let sample_ms = elapsed.as_secs_f64() * 1000.0;
            debug!("Latency sample {}/{}: {:.2} ms", i + 1, sample_count, sample_ms);
            samples.push(sample_ms);

            if !inter_sample_delay.is_zero() {
                tokio::time::sleep(inter_sample_delay).await;
            }
        }

        LatencyResult::from_samples(&samples)
    }

    /// Time one transfer per size, smallest first, and average the rates.
    ///
    /// Failed sizes are skipped. If none succeed the simulated download
    /// rate is returned instead.
    pub async fn measure_download<P: DataProbe>(
        &self,
        sizes_bytes: &[u64],
        probe: &P,
    ) -> f64 {
        let mut sizes = sizes_bytes.to_vec();
        sizes.sort_unstable();

        let mut rates = Vec::with_capacity(sizes.len());

        for bytes in sizes {
            match self.timed_transfer(probe, bytes).await {
                Some(mbps) => {
                    debug!("Download {}B: {:.2} Mbps", bytes, mbps);
                    rates.push(mbps);
                }
                None => warn!("Download {}B failed, skipping size", bytes),
            }
        }

        if rates.is_empty() {
            warn!("No download size completed, using simulated rate");
            return self.simulate_throughput(Direction::Download);
        }

        rates.iter().sum::<f64>() / rates.len() as f64
    }

    /// Time one upload-sized transfer and derate it.
    ///
    /// Falls back to the simulated upload rate on failure.
    pub async fn measure_upload<P: DataProbe>(
        &self,
        payload_bytes: u64,
        probe: &P,
    ) -> f64 {
        match self.timed_transfer(probe, payload_bytes).await {
            Some(mbps) => derate(mbps, Direction::Upload),
            None => {
                warn!("Upload measurement failed, using simulated rate");
                self.simulate_throughput(Direction::Upload)
            }
        }
    }

    /// Placeholder rate for when measurement is unavailable.
    ///
    /// This is not a measurement. See
    /// [`simulated_throughput`](crate::measurements::simulated_throughput).
    pub fn simulate_throughput(&self, direction: Direction) -> f64 {
        let mbps =
            simulated_throughput(direction, &self.hint, &mut rand::thread_rng());
        debug!("Simulated {} rate: {:.2} Mbps", direction, mbps);
        mbps
    }

    async fn timed_transfer<P: DataProbe>(
        &self,
        probe: &P,
        bytes: u64,
    ) -> Option<f64> {
        match timeout(self.config.probe_timeout, probe.transfer(bytes)).await {
            Ok(Ok(elapsed)) => throughput_mbps(bytes, elapsed),
            Ok(Err(error)) => {
                warn!("Transfer of {} bytes failed: {}", bytes, error);
                None
            }
            Err(_) => {
                warn!(
                    "Transfer of {} bytes timed out after {:?}",
                    bytes, self.config.probe_timeout
                );
                None
            }
        }
    }

    fn enter(
        &self,
        state: EngineState,
        phase: TestPhase,
        progress: &dyn ProgressSink,
    ) {
        if let Ok(mut current) = self.state.lock() {
            debug!("Engine state {:?} -> {:?}", *current, state);
            *current = state;
        }
        progress.on_phase(phase, phase.percent());
    }
}

/// Holds the busy flag for the duration of a run.
///
/// On drop a completed run returns the engine to `Idle`; a run dropped
/// while still measuring leaves it `Aborted`.
struct RunGuard<'a> {
    busy: &'a AtomicBool,
    state: &'a Mutex<EngineState>,
}

impl<'a> RunGuard<'a> {
    fn acquire(
        busy: &'a AtomicBool,
        state: &'a Mutex<EngineState>,
    ) -> Result<Self, ScannerError> {
        if busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Speed test rejected: another run is in flight");
            return Err(ScannerError::busy());
        }

        Ok(Self { busy, state })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            *state = match *state {
                EngineState::Completed => EngineState::Idle,
                running if running.is_running() => {
                    warn!("Speed test aborted during {:?}", running);
                    EngineState::Aborted
                }
                other => other,
            };
        }
        self.busy.store(false, Ordering::SeqCst);
    }
}
