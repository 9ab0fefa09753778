// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Scanwerk.
//
// "No document found" and "corrected geometry too small" are ordinary scan
// outcomes (see `ScanOutcome`), not errors.

use thiserror::Error;

/// Top-level error type for all Scanwerk operations.
#[derive(Debug, Error)]
pub enum ScanwerkError {
    // -- Input --
    #[error("source image unavailable: {0}")]
    SourceUnavailable(String),

    #[error("source fetch cancelled")]
    Cancelled,

    #[error("invalid scan options: {0}")]
    InvalidOptions(String),

    // -- Output --
    #[error("image encoding failed: {0}")]
    Encoding(String),

    // -- Configuration --
    #[error("invalid pipeline configuration: {0}")]
    Config(String),

    // -- Runtime --
    #[error("scan worker failed: {0}")]
    Worker(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScanwerkError>;
