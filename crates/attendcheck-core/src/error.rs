// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for AttendCheck.

use thiserror::Error;

/// Top-level error type for all AttendCheck operations.
///
/// Per-item variants (`OcrEngine`, `UnresolvableRecord`, `NormalizationFailure`)
/// are recoverable: the batch records them and carries on. Only the structural
/// variants ever reach a caller as a hard failure.
#[derive(Debug, Error)]
pub enum AttendCheckError {
    // -- Per-item (recoverable) --
    #[error("OCR engine failed: {0}")]
    OcrEngine(String),

    #[error("row could not be resolved into a record: {0}")]
    UnresolvableRecord(String),

    #[error("token could not be normalized: {0}")]
    NormalizationFailure(String),

    // -- Structural --
    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("CSV export failed: {0}")]
    Export(String),

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AttendCheckError {
    /// Whether the error only affects a single file, row, or token.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::OcrEngine(_) | Self::UnresolvableRecord(_) | Self::NormalizationFailure(_)
        )
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, AttendCheckError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_item_errors_are_recoverable() {
        assert!(AttendCheckError::OcrEngine("blurry".into()).is_recoverable());
        assert!(AttendCheckError::UnresolvableRecord("no id".into()).is_recoverable());
        assert!(AttendCheckError::NormalizationFailure("empty".into()).is_recoverable());
    }

    #[test]
    fn structural_errors_are_not_recoverable() {
        assert!(!AttendCheckError::InvalidBatch("empty name".into()).is_recoverable());
        assert!(!AttendCheckError::InvalidConfig("bad regex".into()).is_recoverable());
    }

    #[test]
    fn display_includes_detail() {
        let err = AttendCheckError::OcrEngine("unreadable image".into());
        assert_eq!(err.to_string(), "OCR engine failed: unreadable image");
    }
}
