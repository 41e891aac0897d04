// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-file pipeline: normalize → classify → assemble.

use attendcheck_core::config::ExtractorConfig;
use attendcheck_core::error::Result;
use attendcheck_core::types::{NameJoin, RawToken, StudentInfo};
use tracing::{debug, instrument};

use crate::assemble::assemble;
use crate::classify::{Classifier, RowCluster};
use crate::normalize::normalize_tokens;

/// Compiled extraction pipeline for one configuration.
///
/// Stateless between calls: share one instance (e.g. behind an `Arc`) across
/// every worker of a batch.
#[derive(Debug, Clone)]
pub struct Extractor {
    classifier: Classifier,
    name_join: NameJoin,
}

impl Extractor {
    /// Validate `config` and compile its patterns.
    pub fn new(config: &ExtractorConfig) -> Result<Self> {
        Ok(Self {
            classifier: Classifier::new(config)?,
            name_join: config.name_join,
        })
    }

    /// Extract every student record from one file's OCR output.
    ///
    /// Records come back top to bottom, tagged with `file_name`.
    #[instrument(skip(self, tokens), fields(file = file_name, tokens = tokens.len()))]
    pub fn extract(&self, file_name: &str, tokens: Vec<RawToken>) -> Vec<StudentInfo> {
        let rows = self.rows(tokens);
        let students = assemble(&rows, file_name, self.name_join);
        debug!(
            rows = rows.len(),
            entries = rows.iter().filter(|r| r.is_entry()).count(),
            students = students.len(),
            "file extracted"
        );
        students
    }

    /// Normalize and classify without assembling, for inspection.
    pub fn rows(&self, tokens: Vec<RawToken>) -> Vec<RowCluster> {
        self.classifier.classify(normalize_tokens(tokens))
    }
}
