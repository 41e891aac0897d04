// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OCR engine abstraction.
//
// The pipeline only needs text spans with geometry and confidence; whichever
// engine produced them is a black box behind this trait.

use attendcheck_core::error::{AttendCheckError, Result};
use attendcheck_core::types::RawToken;

/// Anything that turns one image into raw tokens.
///
/// Implementations are called from blocking worker threads and must be safe
/// to share between them.
pub trait OcrEngine: Send + Sync {
    /// Recognize the text of one encoded image.
    ///
    /// Unreadable input fails with [`AttendCheckError::OcrEngine`].
    fn recognize(&self, image: &[u8]) -> Result<Vec<RawToken>>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// Replays OCR output captured earlier: the "image" bytes are a JSON array of
/// [`RawToken`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenDumpEngine;

impl OcrEngine for TokenDumpEngine {
    fn recognize(&self, image: &[u8]) -> Result<Vec<RawToken>> {
        serde_json::from_slice(image)
            .map_err(|e| AttendCheckError::OcrEngine(format!("token dump unsupported format: {e}")))
    }

    fn name(&self) -> &str {
        "token-dump"
    }
}
