//! # Capture Error Handling
//!
//! Error types for the asynchronous capture core, built around a single
//! `CaptureError` enum whose variants each carry an [`ErrorContext`].
//!
//! ## Error Classification
//!
//! The core distinguishes errors by *when* they can happen:
//!
//! - **Configuration errors** (`UnsupportedFormat`, `Config`): raised
//!   synchronously from `initialize`, always fatal. The driver never reaches
//!   the initialized state after one of these.
//! - **State errors** (`State`): an operation was attempted in the wrong
//!   lifecycle state (e.g. a second `initialize`).
//! - **Resource errors** (`Resource`): the rendering backend could not
//!   allocate a render target or staging buffer.
//! - **Transfer errors** (`Transfer`): a single readback failed. These are
//!   transient; the core logs and counts them but never hands them to a
//!   capture consumer.
//!
//! ## Usage
//!
//! ```rust
//! use async_capture::error::{CaptureError, HasRecoverySuggestion, classify};
//! use async_capture::format::SourceFormat;
//!
//! let error = CaptureError::unsupported_format(SourceFormat::Bgra8Unorm)
//!     .with_operation("initialize")
//!     .with_recovery_suggestion("Render into an RGBA8 or RGBA32F target before capturing");
//!
//! assert!(classify::is_fatal(&error));
//! assert!(error.recovery_suggestion().is_some());
//! ```

use std::{error::Error as StdError, fmt, time::SystemTime};

use crate::format::SourceFormat;

/// Severity levels for errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, no effect on capture
    Info,
    /// A single capture cycle was lost
    Warning,
    /// An operation failed but the driver remains usable
    Error,
    /// The driver cannot proceed
    Fatal,
}

/// Metadata about when and where an error occurred
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// When the error occurred
    pub timestamp: SystemTime,
    /// The operation being performed when the error occurred
    pub operation: Option<String>,
    /// Additional context about the error
    pub context: Option<String>,
    /// Suggested recovery action
    pub recovery_suggestion: Option<String>,
    /// Error severity level
    pub severity: ErrorSeverity,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            timestamp: SystemTime::now(),
            operation: None,
            context: None,
            recovery_suggestion: None,
            severity: ErrorSeverity::Error,
        }
    }
}

impl ErrorContext {
    /// Create a new error context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context with the given severity
    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }
}

/// Base error type for the capture core
#[derive(Debug)]
pub enum CaptureError {
    /// The source texture format is outside the capture allow-list
    UnsupportedFormat {
        format: SourceFormat,
        context: ErrorContext,
    },
    /// Configuration validation errors
    Config {
        field: String,
        value: String,
        reason: String,
        context: ErrorContext,
    },
    /// Invalid lifecycle transitions
    State {
        current_state: String,
        attempted_operation: String,
        reason: String,
        context: ErrorContext,
    },
    /// Backend allocation failures
    Resource {
        resource: String,
        reason: String,
        context: ErrorContext,
    },
    /// A single readback reported an error
    Transfer {
        slot: usize,
        reason: String,
        context: ErrorContext,
    },
    /// Encoding a captured frame failed
    Encode {
        reason: String,
        context: ErrorContext,
    },
    /// I/O errors
    Io {
        operation: String,
        path: Option<String>,
        source: std::io::Error,
        context: ErrorContext,
    },
}

impl CaptureError {
    /// Create an unsupported-format error. Always fatal.
    pub fn unsupported_format(format: SourceFormat) -> Self {
        Self::UnsupportedFormat {
            format,
            context: ErrorContext::new().with_severity(ErrorSeverity::Fatal),
        }
    }

    /// Create a configuration error
    pub fn config(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Config {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
            context: ErrorContext::new().with_severity(ErrorSeverity::Fatal),
        }
    }

    /// Create a state error
    pub fn state(
        current_state: impl Into<String>,
        attempted_operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::State {
            current_state: current_state.into(),
            attempted_operation: attempted_operation.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a resource error
    pub fn resource(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resource {
            resource: resource.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a transient transfer error for one slot
    pub fn transfer(slot: usize, reason: impl Into<String>) -> Self {
        Self::Transfer {
            slot,
            reason: reason.into(),
            context: ErrorContext::new().with_severity(ErrorSeverity::Warning),
        }
    }

    /// Create an encode error
    pub fn encode(reason: impl Into<String>) -> Self {
        Self::Encode {
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: None,
            source,
            context: ErrorContext::new(),
        }
    }

    /// Attach the path an I/O error refers to
    pub fn with_path(mut self, new_path: impl Into<String>) -> Self {
        if let Self::Io { path, .. } = &mut self {
            *path = Some(new_path.into());
        }
        self
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context_mut().context = Some(context.into());
        self
    }

    /// Add operation context
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.context_mut().operation = Some(operation.into());
        self
    }

    /// Add recovery suggestion
    pub fn with_recovery_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context_mut().recovery_suggestion = Some(suggestion.into());
        self
    }

    /// Set severity
    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.context_mut().severity = severity;
        self
    }

    /// Get the error context
    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::UnsupportedFormat { context, .. } => context,
            Self::Config { context, .. } => context,
            Self::State { context, .. } => context,
            Self::Resource { context, .. } => context,
            Self::Transfer { context, .. } => context,
            Self::Encode { context, .. } => context,
            Self::Io { context, .. } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::UnsupportedFormat { context, .. } => context,
            Self::Config { context, .. } => context,
            Self::State { context, .. } => context,
            Self::Resource { context, .. } => context,
            Self::Transfer { context, .. } => context,
            Self::Encode { context, .. } => context,
            Self::Io { context, .. } => context,
        }
    }

    /// Get the error category as a string
    pub fn category(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat { .. } => "unsupported_format",
            Self::Config { .. } => "config",
            Self::State { .. } => "state",
            Self::Resource { .. } => "resource",
            Self::Transfer { .. } => "transfer",
            Self::Encode { .. } => "encode",
            Self::Io { .. } => "io",
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::UnsupportedFormat { format, .. } => {
                write!(f, "Unsupported source format for capture: {:?}", format)
            }
            CaptureError::Config {
                field,
                value,
                reason,
                ..
            } => {
                write!(
                    f,
                    "Configuration error in '{}': {} (value: {})",
                    field, reason, value
                )
            }
            CaptureError::State {
                current_state,
                attempted_operation,
                reason,
                ..
            } => {
                write!(
                    f,
                    "Invalid state transition from '{}' when attempting '{}': {}",
                    current_state, attempted_operation, reason
                )
            }
            CaptureError::Resource {
                resource, reason, ..
            } => {
                write!(f, "Resource allocation failed for {}: {}", resource, reason)
            }
            CaptureError::Transfer { slot, reason, .. } => {
                write!(f, "Readback into slot {} failed: {}", slot, reason)
            }
            CaptureError::Encode { reason, .. } => {
                write!(f, "Encoding captured frame failed: {}", reason)
            }
            CaptureError::Io {
                operation,
                path,
                source,
                ..
            } => {
                if let Some(path) = path {
                    write!(
                        f,
                        "I/O error during {} on '{}': {}",
                        operation, path, source
                    )
                } else {
                    write!(f, "I/O error during {}: {}", operation, source)
                }
            }
        }
    }
}

impl StdError for CaptureError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type alias using our custom error type
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Trait for errors with severity levels
pub trait HasSeverity {
    /// Get the severity level of this error
    fn severity(&self) -> ErrorSeverity;
}

impl HasSeverity for CaptureError {
    fn severity(&self) -> ErrorSeverity {
        self.context().severity
    }
}

/// Trait for errors that provide recovery suggestions
pub trait HasRecoverySuggestion {
    /// Get recovery suggestion for this error
    fn recovery_suggestion(&self) -> Option<&str>;
}

impl HasRecoverySuggestion for CaptureError {
    fn recovery_suggestion(&self) -> Option<&str> {
        self.context().recovery_suggestion.as_deref()
    }
}

/// Error classification utilities
pub mod classify {
    use super::*;

    /// Transient errors affect one capture cycle and resolve on the slot's next turn
    pub fn is_transient(error: &CaptureError) -> bool {
        matches!(error, CaptureError::Transfer { .. })
    }

    /// Fatal errors prevent the driver from reaching the initialized state
    pub fn is_fatal(error: &CaptureError) -> bool {
        matches!(
            error,
            CaptureError::UnsupportedFormat { .. } | CaptureError::Config { .. }
        ) || error.severity() == ErrorSeverity::Fatal
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(error: std::io::Error) -> Self {
        Self::io("unknown", error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_format_is_fatal() {
        let error = CaptureError::unsupported_format(SourceFormat::Depth32Float);
        assert_eq!(error.category(), "unsupported_format");
        assert_eq!(error.severity(), ErrorSeverity::Fatal);
        assert!(classify::is_fatal(&error));
        assert!(!classify::is_transient(&error));
        assert!(error.to_string().contains("Depth32Float"));
    }

    #[test]
    fn test_transfer_error_is_transient() {
        let error = CaptureError::transfer(1, "device lost the mapping");
        assert!(classify::is_transient(&error));
        assert!(!classify::is_fatal(&error));
        assert_eq!(error.severity(), ErrorSeverity::Warning);
        assert_eq!(
            error.to_string(),
            "Readback into slot 1 failed: device lost the mapping"
        );
    }

    #[test]
    fn test_error_with_context() {
        let error = CaptureError::state("initialized", "initialize", "already initialized")
            .with_operation("initialize")
            .with_context("second call from host bootstrap")
            .with_recovery_suggestion("dispose the driver before re-initializing");

        assert_eq!(error.category(), "state");
        assert_eq!(error.context().operation.as_deref(), Some("initialize"));
        assert_eq!(
            error.recovery_suggestion(),
            Some("dispose the driver before re-initializing")
        );
    }

    #[test]
    fn test_io_error_source_and_path() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = CaptureError::io("write png", io).with_path("/tmp/x.png");
        assert!(error.source().is_some());
        assert!(error.to_string().contains("/tmp/x.png"));
    }
}
