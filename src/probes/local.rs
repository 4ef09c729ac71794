//! In-process data probes.
//!
//! These do not touch the network. [`LocalDataProbe`] pushes a synthetic
//! payload through an in-memory pipe and times it, [`SimulatedUploadProbe`]
//! adds a randomised processing delay on top. Both stand in for real
//! transfers, so the rates they produce describe the host, not the link.

use super::{DataProbe, ProbeError};
use log::debug;
use rand::Rng;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;

/// Capacity of the in-memory pipe between writer and reader.
const PIPE_CAPACITY: usize = 64 * 1024;

/// Times a payload of the requested size through an in-memory pipe.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalDataProbe;

impl LocalDataProbe {
    pub fn new() -> Self {
        Self
    }

    async fn round_trip(bytes: u64) -> Result<Duration, ProbeError> {
        let started = Instant::now();
        let size = usize::try_from(bytes).map_err(|_| {
            ProbeError::network(
                format!("payload of {} bytes is too large", bytes),
                started.elapsed(),
            )
        })?;

        let payload = vec![b'x'; size];
        let (mut writer, mut reader) = tokio::io::duplex(PIPE_CAPACITY);

        let write = async move {
            writer.write_all(&payload).await?;
            writer.shutdown().await
        };
        let read = async move {
            let mut received = Vec::with_capacity(size);
            reader.read_to_end(&mut received).await.map(|_| received.len())
        };

        let (written, received) = tokio::join!(write, read);
        written.map_err(|e| ProbeError::from_io(e, started.elapsed()))?;
        let received =
            received.map_err(|e| ProbeError::from_io(e, started.elapsed()))?;

        if received != size {
            return Err(ProbeError::network(
                format!("short transfer: {} of {} bytes", received, size),
                started.elapsed(),
            ));
        }

        Ok(started.elapsed())
    }
}

impl DataProbe for LocalDataProbe {
    async fn transfer(&self, bytes: u64) -> Result<Duration, ProbeError> {
        let elapsed = Self::round_trip(bytes).await?;
        debug!("Local transfer of {} bytes took {:?}", bytes, elapsed);
        Ok(elapsed)
    }
}

/// A local round trip followed by a random "processing" delay.
///
/// Nothing is uploaded anywhere. The delay keeps the resulting rate in a
/// plausible range instead of reporting memory bandwidth.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedUploadProbe {
    min_delay: Duration,
    max_delay: Duration,
}

impl SimulatedUploadProbe {
    pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(500);
    pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(1500);

    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        if min_delay <= max_delay {
            Self { min_delay, max_delay }
        } else {
            Self { min_delay: max_delay, max_delay: min_delay }
        }
    }

    fn processing_delay(&self) -> Duration {
        if self.min_delay == self.max_delay {
            return self.min_delay;
        }
        rand::thread_rng().gen_range(self.min_delay..=self.max_delay)
    }
}

impl Default for SimulatedUploadProbe {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MIN_DELAY, Self::DEFAULT_MAX_DELAY)
    }
}

impl DataProbe for SimulatedUploadProbe {
    async fn transfer(&self, bytes: u64) -> Result<Duration, ProbeError> {
        let started = Instant::now();
        let delay = self.processing_delay();

        LocalDataProbe::round_trip(bytes).await?;
        tokio::time::sleep(delay).await;

        Ok(started.elapsed())
    }
}
