//! Error types and handling for `spindle_query`.
//!
//! # Design
//!
//! - Uses `thiserror` for derive-based error types
//! - Supports `anyhow` integration for gradual migration
//! - Provides recovery hints for user-facing errors
//! - Formula parse failures carry the offending token position so editors
//!   can surface "invalid syntax at position N" with a caret

use thiserror::Error;

/// Primary error type for `spindle_query` operations.
///
/// Design: Structured variants for common cases, with `Other` for
/// wrapped anyhow errors during migration.
#[derive(Error, Debug)]
pub enum QueryError {
    // === Resolution Errors ===
    /// Item exists but does not have the shape the key resolver expects.
    ///
    /// Batch consumers must skip the offending item and continue; a single
    /// malformed item never aborts a whole live-query batch.
    #[error("Item {item} does not match the expected shape: {reason}")]
    ItemShape { item: i64, reason: String },

    /// Item with the given id is not present in the reader's snapshot.
    #[error("Item not found: {item}")]
    ItemNotFound { item: i64 },

    /// The live subscription's lifetime ended before the operation ran.
    #[error("Subscription lifetime already ended")]
    LifetimeEnded,

    // === Formula Errors ===
    /// Formula text failed to parse at a known position.
    #[error("Invalid syntax at position {position}: {reason}")]
    Parse {
        position: usize,
        /// Byte length of the offending token, for caret underlining.
        span: usize,
        reason: String,
    },

    /// Operator token is not registered with the formula registry.
    #[error("Invalid syntax at position {position}: unknown operator '{token}'")]
    UnknownOperator { token: String, position: usize },

    // === Validation Errors ===
    /// Field validation failed.
    #[error("Validation failed: {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Date text could not be parsed as absolute or relative.
    #[error("Invalid date value: {value}")]
    InvalidDate { value: String },

    /// Preset identifier is not one of the known calendar presets.
    #[error("Unknown date preset: {preset}")]
    UnknownPreset { preset: String },

    // === Configuration Errors ===
    /// Tunables file error.
    #[error("Configuration error: {0}")]
    Config(String),

    // === I/O Errors ===
    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // === Wrapped errors (for gradual migration) ===
    /// Wrapped anyhow error for gradual migration.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl QueryError {
    /// Can the user fix this without code changes?
    #[must_use]
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. }
                | Self::UnknownOperator { .. }
                | Self::Validation { .. }
                | Self::InvalidDate { .. }
                | Self::UnknownPreset { .. }
        )
    }

    /// Human-friendly suggestion for fixing this error.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::UnknownOperator { .. } => Some(
                "Valid operators: in, allof, under, unset, after, before, within, during, undated, atleast, atmost, between, unvalued, has, hasall, blank",
            ),
            Self::InvalidDate { .. } => {
                Some("Use 2026-01-15, RFC3339, or a relative value like -7d, +2w, -1mo")
            }
            Self::UnknownPreset { .. } => Some(
                "Valid presets: today, yesterday, this-week, last-week, this-month, last-month",
            ),
            _ => None,
        }
    }

    /// Create a validation error for a specific field.
    #[must_use]
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a positioned parse error.
    #[must_use]
    pub fn parse(position: usize, span: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            position,
            span,
            reason: reason.into(),
        }
    }
}

/// Result type using `QueryError`.
pub type Result<T> = std::result::Result<T, QueryError>;
