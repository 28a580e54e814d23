//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! such as resource path validation and identifier parsing.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid path format or content
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Path is not a strict descendant of the watched scope
    #[error("Path not within watched scope: {0}")]
    PathNotInScope(String),

    /// Progress value outside of the representable range
    #[error("Invalid progress value: {0}")]
    InvalidProgress(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}
