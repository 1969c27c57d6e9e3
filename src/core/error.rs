//! Error types for Tonestack.
//!
//! Uses thiserror for structured errors with context. The error design follows
//! the filter contract:
//! - Malformed inputs are *not* errors: filters hand the output back untouched
//! - Allocation failures are fatal and surface as [`FilterError::Allocation`]
//! - Bad parameters are rejected once, when a config struct is validated

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for Tonestack.
///
/// This enum encompasses all error categories and enables automatic
/// conversion between specific error types.
#[derive(Error, Debug)]
pub enum ToneStackError {
    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Filter not found: {0}")]
    FilterNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Settings parse error: {0}")]
    Settings(#[from] toml::de::Error),

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors raised while running a filter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Cannot allocate an image buffer of {samples} samples")]
    Allocation { samples: usize },

    #[error("Invalid image shape {width}x{height}x{channels} ({frames} frames)")]
    InvalidShape {
        width: usize,
        height: usize,
        channels: usize,
        frames: usize,
    },

    #[error("Sample buffer has {got} samples, shape requires {expected}")]
    SampleCountMismatch { expected: usize, got: usize },

    #[error("Filter '{filter}' produced no output")]
    EmptyOutput { filter: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors from validating a configuration struct.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConfigError {
    #[error("Invalid value for '{parameter}': {reason}")]
    InvalidParameter { parameter: String, reason: String },
}

impl ConfigError {
    /// Shorthand for [`ConfigError::InvalidParameter`].
    pub fn invalid(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidParameter {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Reject anything that is not a finite, strictly positive number.
    pub fn require_positive(parameter: &str, value: f32) -> Result<(), ConfigError> {
        if value.is_finite() && value > 0.0 {
            Ok(())
        } else {
            Err(Self::invalid(
                parameter,
                format!("must be a finite positive number, got {}", value),
            ))
        }
    }

    /// Get the name of the offending parameter.
    pub fn parameter(&self) -> &str {
        match self {
            ConfigError::InvalidParameter { parameter, .. } => parameter,
        }
    }
}

impl FilterError {
    /// Check if this error means no output can be produced at all.
    ///
    /// Allocation failures are the only fatal class; everything else
    /// points at a caller mistake that can be fixed and retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FilterError::Allocation { .. })
    }
}

/// Result type alias for Tonestack operations.
pub type ToneStackResult<T> = Result<T, ToneStackError>;

/// Result type alias for filter operations.
pub type FilterResult<T> = Result<T, FilterError>;
