//! Error types for the scanner.
//!
//! Probe failures are absorbed by the measurement engine and never reach
//! the caller of a speed test. The variants that do surface are concurrent
//! run rejection, persistence failures and configuration mistakes.

use std::error::Error;
use std::fmt;

/// Exit codes for the application.
pub mod exit_codes {
    /// Successful execution.
    pub const SUCCESS: i32 = 0;
    /// Network error (connection failed, timeout, etc.).
    pub const NETWORK_ERROR: i32 = 1;
    /// A lookup service answered with an error.
    pub const API_ERROR: i32 = 2;
    /// Configuration error (invalid arguments).
    pub const CONFIG_ERROR: i32 = 3;
    /// The history could not be written.
    pub const PERSISTENCE_ERROR: i32 = 5;
    /// A speed test was already in flight.
    pub const BUSY: i32 = 6;
    /// Interrupted by the user (Ctrl-C).
    pub const INTERRUPTED: i32 = 130;
    /// Unknown/unexpected error.
    pub const UNKNOWN_ERROR: i32 = 99;
}

/// Categories of errors the scanner distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A probe did not answer within its timeout.
    ProbeTimeout,
    /// A probe failed at the transport level.
    ProbeNetworkFailure,
    /// The durable history store rejected a write.
    PersistenceFailure,
    /// `run_speed_test` was called while another run was in flight.
    ConcurrentRunRejected,
    /// Network connectivity issues outside of measurement probes.
    Network,
    /// DNS resolution failures.
    Dns,
    /// A lookup service returned an error response.
    Api,
    /// Invalid configuration or arguments.
    Config,
    /// The user interrupted a running operation.
    Interrupted,
    /// Unknown or unexpected errors.
    Unknown,
}

impl ErrorKind {
    /// Get the exit code for this error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::ProbeTimeout
            | ErrorKind::ProbeNetworkFailure
            | ErrorKind::Network
            | ErrorKind::Dns => exit_codes::NETWORK_ERROR,
            ErrorKind::Api => exit_codes::API_ERROR,
            ErrorKind::Config => exit_codes::CONFIG_ERROR,
            ErrorKind::PersistenceFailure => exit_codes::PERSISTENCE_ERROR,
            ErrorKind::ConcurrentRunRejected => exit_codes::BUSY,
            ErrorKind::Interrupted => exit_codes::INTERRUPTED,
            ErrorKind::Unknown => exit_codes::UNKNOWN_ERROR,
        }
    }

    /// Get a user-friendly description of this error kind.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorKind::ProbeTimeout => "Probe timeout",
            ErrorKind::ProbeNetworkFailure => "Probe failure",
            ErrorKind::PersistenceFailure => "Persistence error",
            ErrorKind::ConcurrentRunRejected => "Speed test busy",
            ErrorKind::Network => "Network error",
            ErrorKind::Dns => "DNS resolution error",
            ErrorKind::Api => "API error",
            ErrorKind::Config => "Configuration error",
            ErrorKind::Interrupted => "Interrupted",
            ErrorKind::Unknown => "Unknown error",
        }
    }
}

/// The crate-wide error type.
#[derive(Debug)]
pub struct ScannerError {
    /// The kind of error.
    pub kind: ErrorKind,
    /// User-friendly error message.
    pub message: String,
    /// Optional suggestion for how to resolve the error.
    pub suggestion: Option<String>,
    /// The underlying error, if any.
    pub source: Option<Box<dyn Error + Send + Sync>>,
}

impl ScannerError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), suggestion: None, source: None }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_source(
        mut self,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn exit_code(&self) -> i32 {
        self.kind.exit_code()
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PersistenceFailure, message).with_suggestion(
            "Check that the history file location is writable.",
        )
    }

    pub fn busy() -> Self {
        Self::new(
            ErrorKind::ConcurrentRunRejected,
            "a speed test is already running",
        )
        .with_suggestion("Wait for the current test to finish.")
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }
}

impl fmt::Display for ScannerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.description(), self.message)?;

        if let Some(ref suggestion) = self.suggestion {
            write!(f, "\n  Suggestion: {}", suggestion)?;
        }

        Ok(())
    }
}

impl Error for ScannerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

/// Classify an error into an ErrorKind based on its message.
///
/// Used for lookup-service failures, where reqwest only exposes the
/// underlying cause as text.
pub fn classify_error(error: &dyn Error) -> ErrorKind {
    let mut error_str = error.to_string().to_lowercase();
    let mut cause = error.source();
    while let Some(inner) = cause {
        error_str.push(' ');
        error_str.push_str(&inner.to_string().to_lowercase());
        cause = inner.source();
    }

    if error_str.contains("dns")
        || error_str.contains("resolve")
        || error_str.contains("no such host")
    {
        return ErrorKind::Dns;
    }

    if error_str.contains("timeout")
        || error_str.contains("timed out")
        || error_str.contains("deadline")
    {
        return ErrorKind::ProbeTimeout;
    }

    if error_str.contains("connection refused")
        || error_str.contains("connection reset")
        || error_str.contains("network unreachable")
        || error_str.contains("host unreachable")
        || error_str.contains("no route")
        || error_str.contains("broken pipe")
    {
        return ErrorKind::Network;
    }

    if error_str.contains("status: 4")
        || error_str.contains("status: 5")
        || error_str.contains("status client error")
        || error_str.contains("status server error")
    {
        return ErrorKind::Api;
    }

    ErrorKind::Unknown
}

/// Wrap a lookup failure with context, classifying it on the way.
pub fn to_scanner_error(
    error: Box<dyn Error + Send + Sync>,
    context: &str,
) -> ScannerError {
    let kind = classify_error(error.as_ref());
    let message = format!("{}: {}", context, error);

    let mut scanner_error = ScannerError::new(kind, message);
    scanner_error.source = Some(error);
    scanner_error
}
