// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.
//
// The extraction heuristics are tied to one institution's form layout, so the
// ID pattern, label vocabulary, and column-fallback direction all live here
// rather than in the pipeline code.

use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AttendCheckError, Result};
use crate::types::NameJoin;

/// Environment variables that override file-based settings.
pub const ENV_ID_PATTERN: &str = "ATTENDCHECK_ID_PATTERN";
pub const ENV_ID_PREFIX: &str = "ATTENDCHECK_ID_PREFIX";
pub const ENV_MIN_CONFIDENCE: &str = "ATTENDCHECK_MIN_CONFIDENCE";
pub const ENV_MAX_WORKERS: &str = "ATTENDCHECK_MAX_WORKERS";

/// Which column holds the surname when no label anchors are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnFallback {
    /// Left column = surname, right column = given name.
    #[default]
    SurnameFirst,
    /// Left column = given name, right column = surname.
    GivenNameFirst,
}

/// Where unlabelled name tokens are searched for, relative to the ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameSide {
    Left,
    Right,
    /// Left first; right only when nothing qualifies on the left.
    #[default]
    Either,
}

/// Label words that anchor name and ID columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelVocabulary {
    pub surname: Vec<String>,
    pub given_name: Vec<String>,
    /// Labels whose value holds both parts, split at the first whitespace.
    pub full_name: Vec<String>,
    pub student_id: Vec<String>,
}

impl Default for LabelVocabulary {
    fn default() -> Self {
        let owned = |words: &[&str]| words.iter().map(|w| (*w).to_owned()).collect();
        Self {
            surname: owned(&["Surname", "Family name", "Last name", "姓", "氏", "苗字"]),
            given_name: owned(&["Name", "Given name", "First name", "名"]),
            full_name: owned(&["Full name", "Student name", "氏名", "名前", "お名前"]),
            student_id: owned(&[
                "ID",
                "Student ID",
                "Student No",
                "Student No.",
                "Student Number",
                "学籍番号",
                "学生番号",
                "番号",
            ]),
        }
    }
}

/// Settings for the per-file extraction pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Unanchored regex locating a student ID inside a token.
    pub id_pattern: String,
    /// Institution prefix printed before the digits (e.g. `abc-`). Tokens
    /// containing it are never treated as names.
    pub id_prefix: String,
    /// Name candidates matching this regex are discarded.
    pub name_exclusion_pattern: Option<String>,
    /// ID candidates below this OCR confidence are ignored.
    pub min_id_confidence: f32,
    /// Minimum vertical overlap, as a fraction of the smaller box height, for
    /// two tokens to share a row.
    pub row_overlap_threshold: f32,
    pub column_fallback: ColumnFallback,
    pub name_side: NameSide,
    /// Upper bound on unlabelled name tokens taken next to an ID.
    pub max_fallback_name_tokens: usize,
    pub name_join: NameJoin,
    pub labels: LabelVocabulary,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            id_pattern: r"\b(?:[A-Za-z]{1,4}-)?\d{6,10}\b".into(),
            id_prefix: String::new(),
            name_exclusion_pattern: Some(r#"[!@#$%^&*,.?"{}|<>]"#.into()),
            min_id_confidence: 0.5,
            row_overlap_threshold: 0.5,
            column_fallback: ColumnFallback::default(),
            name_side: NameSide::default(),
            max_fallback_name_tokens: 2,
            name_join: NameJoin::default(),
            labels: LabelVocabulary::default(),
        }
    }
}

impl ExtractorConfig {
    /// Check that both regexes compile and numeric settings are in range.
    pub fn validate(&self) -> Result<()> {
        if self.id_pattern.trim().is_empty() {
            return Err(AttendCheckError::InvalidConfig(
                "id_pattern must not be empty".into(),
            ));
        }
        Regex::new(&self.id_pattern).map_err(|e| {
            AttendCheckError::InvalidConfig(format!("id_pattern {:?}: {e}", self.id_pattern))
        })?;
        if let Some(pattern) = &self.name_exclusion_pattern {
            Regex::new(pattern).map_err(|e| {
                AttendCheckError::InvalidConfig(format!("name_exclusion_pattern {pattern:?}: {e}"))
            })?;
        }
        if !(0.0..=1.0).contains(&self.min_id_confidence) {
            return Err(AttendCheckError::InvalidConfig(format!(
                "min_id_confidence must be within [0, 1], got {}",
                self.min_id_confidence
            )));
        }
        if !(self.row_overlap_threshold > 0.0 && self.row_overlap_threshold <= 1.0) {
            return Err(AttendCheckError::InvalidConfig(format!(
                "row_overlap_threshold must be within (0, 1], got {}",
                self.row_overlap_threshold
            )));
        }
        Ok(())
    }
}

/// Settings for the batch aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Files processed concurrently.
    pub max_workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

/// Settings for the CSV exporter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Prefix the output with a UTF-8 byte order mark so spreadsheet tools
    /// detect the encoding.
    pub bom: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self { bom: true }
    }
}

/// Complete application settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub extractor: ExtractorConfig,
    pub batch: BatchConfig,
    pub export: ExportOptions,
}

impl AppConfig {
    /// Load settings from a JSON file, apply environment overrides, and
    /// validate the result.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&text)?;
        info!(path = %path.display(), "configuration loaded");
        config.finish(|key| std::env::var(key).ok())
    }

    /// Defaults plus environment overrides, validated.
    pub fn from_env() -> Result<Self> {
        Self::default().finish(|key| std::env::var(key).ok())
    }

    fn finish(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        self.apply_overrides(lookup)?;
        self.validate()?;
        Ok(self)
    }

    /// Apply overrides from `lookup` (normally the process environment).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(pattern) = lookup(ENV_ID_PATTERN) {
            debug!(%pattern, "id_pattern overridden from environment");
            self.extractor.id_pattern = pattern;
        }
        if let Some(prefix) = lookup(ENV_ID_PREFIX) {
            debug!(%prefix, "id_prefix overridden from environment");
            self.extractor.id_prefix = prefix;
        }
        if let Some(raw) = lookup(ENV_MIN_CONFIDENCE) {
            self.extractor.min_id_confidence = raw.trim().parse().map_err(|e| {
                AttendCheckError::InvalidConfig(format!("{ENV_MIN_CONFIDENCE}={raw:?}: {e}"))
            })?;
        }
        if let Some(raw) = lookup(ENV_MAX_WORKERS) {
            self.batch.max_workers = raw.trim().parse().map_err(|e| {
                AttendCheckError::InvalidConfig(format!("{ENV_MAX_WORKERS}={raw:?}: {e}"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.extractor.validate()?;
        if self.batch.max_workers == 0 {
            return Err(AttendCheckError::InvalidConfig(
                "max_workers must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        AppConfig::default().validate().expect("defaults validate");
    }

    #[test]
    fn bad_id_pattern_is_rejected() {
        let config = ExtractorConfig {
            id_pattern: "(unclosed".into(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AttendCheckError::InvalidConfig(_))
        ));
    }

    #[test]
    fn empty_id_pattern_is_rejected() {
        let config = ExtractorConfig {
            id_pattern: "  ".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn overlap_threshold_out_of_range_is_rejected() {
        let config = ExtractorConfig {
            row_overlap_threshold: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        config
            .apply_overrides(env(&[
                (ENV_ID_PATTERN, r"abc-\d{7}"),
                (ENV_ID_PREFIX, "abc-"),
                (ENV_MIN_CONFIDENCE, "0.7"),
                (ENV_MAX_WORKERS, "3"),
            ]))
            .expect("overrides");
        assert_eq!(config.extractor.id_pattern, r"abc-\d{7}");
        assert_eq!(config.extractor.id_prefix, "abc-");
        assert_eq!(config.extractor.min_id_confidence, 0.7);
        assert_eq!(config.batch.max_workers, 3);
    }

    #[test]
    fn unparsable_env_override_is_an_error() {
        let mut config = AppConfig::default();
        let result = config.apply_overrides(env(&[(ENV_MAX_WORKERS, "many")]));
        assert!(matches!(result, Err(AttendCheckError::InvalidConfig(_))));
    }

    #[test]
    fn load_partial_json_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{"extractor": {{"id_prefix": "abc-", "name_join": "concat"}}, "export": {{"bom": false}}}}"#
        )
        .expect("write config");

        let config = AppConfig::load(file.path()).expect("load");
        assert_eq!(config.extractor.id_prefix, "abc-");
        assert_eq!(config.extractor.name_join, NameJoin::Concat);
        assert!(!config.export.bom);
        assert_eq!(config.extractor.max_fallback_name_tokens, 2);
        assert!(config.extractor.labels.surname.iter().any(|l| l == "Surname"));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let result = AppConfig::load("/nonexistent/attendcheck/config.json");
        assert!(matches!(result, Err(AttendCheckError::Io(_))));
    }
}
