// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// attendcheck-extract — Turns one sheet's OCR tokens into student records.
//
// Pipeline stages: token normalization (width folding, confusable digits),
// row clustering and field classification (labels, header columns, positional
// fallback), and record assembly. The `ocr` feature adds an `ocrs`-backed
// engine that produces the tokens from an image.

pub mod assemble;
pub mod classify;
pub mod engine;
pub mod extractor;
pub mod labels;
pub mod layout;
pub mod normalize;

#[cfg(feature = "ocr")]
pub mod ocr;

pub use classify::{Classifier, RowCluster};
pub use engine::{OcrEngine, TokenDumpEngine};
pub use extractor::Extractor;

#[cfg(feature = "ocr")]
pub use ocr::{OcrConfig, OcrsEngine};
