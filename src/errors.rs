//! Error types for the probing pipeline.
//!
//! Only configuration problems ever reach the user as a hard failure. Every
//! error raised once the pipeline is running is logged and folded into a
//! degraded measurement by the probe that hit it.

use std::error::Error;
use std::fmt;

/// Exit codes for the application.
pub mod exit_codes {
    /// Successful execution.
    pub const SUCCESS: i32 = 0;
    /// The candidate list could not be used at all.
    pub const INPUT_ERROR: i32 = 1;
    /// Configuration error (invalid arguments).
    pub const CONFIG_ERROR: i32 = 3;
    /// Unknown/unexpected error.
    pub const UNKNOWN_ERROR: i32 = 99;
}

/// Categories of errors that can occur while probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Candidate list missing or unreadable.
    Input,
    /// Network connectivity issues.
    Network,
    /// Name resolution failures.
    Dns,
    /// Connection or read timeout.
    Timeout,
    /// TLS/SSL handshake failures.
    Tls,
    /// External tool could not be started or exited abnormally.
    Process,
    /// External tool output did not have the expected shape.
    Parse,
    /// Invalid configuration or arguments.
    Config,
    /// Unknown or unexpected errors.
    Unknown,
}

impl ErrorKind {
    /// Get the exit code for this error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::Input => exit_codes::INPUT_ERROR,
            ErrorKind::Config => exit_codes::CONFIG_ERROR,
            _ => exit_codes::UNKNOWN_ERROR,
        }
    }

    /// Get a user-friendly description of this error kind.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorKind::Input => "Input error",
            ErrorKind::Network => "Network error",
            ErrorKind::Dns => "DNS resolution error",
            ErrorKind::Timeout => "Connection timeout",
            ErrorKind::Tls => "TLS/SSL error",
            ErrorKind::Process => "Process error",
            ErrorKind::Parse => "Parse error",
            ErrorKind::Config => "Configuration error",
            ErrorKind::Unknown => "Unknown error",
        }
    }
}

/// A user-friendly error type for probe operations.
#[derive(Debug)]
pub struct ProbeError {
    /// The kind of error.
    pub kind: ErrorKind,
    /// User-friendly error message.
    pub message: String,
    /// Optional suggestion for how to resolve the error.
    pub suggestion: Option<String>,
    /// The underlying error, if any.
    pub source: Option<Box<dyn Error + Send + Sync>>,
}

impl ProbeError {
    /// Create a new ProbeError.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), suggestion: None, source: None }
    }

    /// Add a suggestion for how to resolve the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add the underlying error source.
    pub fn with_source(
        mut self,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the exit code for this error.
    pub fn exit_code(&self) -> i32 {
        self.kind.exit_code()
    }

    /// Create an input error.
    pub fn input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Input, message)
            .with_suggestion("Check that the candidate file exists and is readable.")
    }

    /// Create a process error.
    pub fn process(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Process, message).with_suggestion(
            "Make sure the ping utility is installed and may be run by this user.",
        )
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.description(), self.message)?;

        if let Some(ref suggestion) = self.suggestion {
            write!(f, "\n  Suggestion: {}", suggestion)?;
        }

        Ok(())
    }
}

impl Error for ProbeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

/// Classify an error into an ErrorKind based on its message chain.
pub fn classify_error(error: &dyn Error) -> ErrorKind {
    let mut error_str = error.to_string().to_lowercase();
    let mut source = error.source();
    while let Some(inner) = source {
        error_str.push(' ');
        error_str.push_str(&inner.to_string().to_lowercase());
        source = inner.source();
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
        return ErrorKind::Timeout;
    }

    if error_str.contains("tls")
        || error_str.contains("ssl")
        || error_str.contains("certificate")
        || error_str.contains("handshake")
    {
        return ErrorKind::Tls;
    }

    if error_str.contains("connection refused")
        || error_str.contains("connection reset")
        || error_str.contains("network unreachable")
        || error_str.contains("host unreachable")
        || error_str.contains("no route")
        || error_str.contains("broken pipe")
        || error_str.contains("error sending request")
    {
        return ErrorKind::Network;
    }

    ErrorKind::Unknown
}

/// Format an error for user display.
pub fn format_error_for_display(error: &ProbeError) -> String {
    let mut output = format!("Error: {}", error.message);

    if let Some(ref suggestion) = error.suggestion {
        output.push_str(&format!("\n\nSuggestion: {}", suggestion));
    }

    output
}
