// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Batch aggregator — runs the per-file pipeline over many files on a bounded
// pool of blocking workers and stitches the results back into submission
// order.
//
// Files never share state: each worker owns its input and the shared
// `Extractor` is immutable. Cancellation stops scheduling new files; files
// already handed to a worker run to completion.

use std::collections::HashMap;
use std::sync::Arc;

use attendcheck_core::config::BatchConfig;
use attendcheck_core::error::{AttendCheckError, Result};
use attendcheck_core::types::{
    BatchId, BatchResult, FileWarning, RawToken, StudentInfo, WarningKind,
};
use attendcheck_extract::{Extractor, OcrEngine};
use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Lowercase hex SHA-256 of `data`, used to spot re-uploaded images.
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Input to one worker.
enum Job {
    Tokens(Vec<RawToken>),
    Image {
        engine: Arc<dyn OcrEngine>,
        bytes: Vec<u8>,
    },
}

/// What happens to one submitted file.
enum Plan {
    Run(Job),
    Skip(FileWarning),
}

/// What one file contributed.
#[derive(Debug)]
enum Outcome {
    Records(Vec<StudentInfo>),
    Warning(FileWarning),
}

/// Runs batches of files through one [`Extractor`].
#[derive(Debug, Clone)]
pub struct BatchAggregator {
    extractor: Arc<Extractor>,
    config: BatchConfig,
}

impl BatchAggregator {
    pub fn new(extractor: Extractor, config: BatchConfig) -> Result<Self> {
        if config.max_workers == 0 {
            return Err(AttendCheckError::InvalidConfig(
                "max_workers must be at least 1".into(),
            ));
        }
        Ok(Self {
            extractor: Arc::new(extractor),
            config,
        })
    }

    /// Aggregate files whose OCR output is already available.
    #[instrument(skip_all, fields(files = files.len()))]
    pub async fn aggregate_tokens(
        &self,
        files: Vec<(String, Vec<RawToken>)>,
        cancel: &CancellationToken,
    ) -> Result<BatchResult> {
        check_file_names(files.iter().map(|(name, _)| name.as_str()))?;
        let plans = files
            .into_iter()
            .map(|(name, tokens)| (name, Plan::Run(Job::Tokens(tokens))))
            .collect();
        Ok(self.run(plans, cancel).await)
    }

    /// Recognize and aggregate a batch of encoded images.
    ///
    /// An image byte-identical to an earlier one in the same batch is not
    /// processed again and yields a [`WarningKind::DuplicateFile`] warning.
    #[instrument(skip_all, fields(files = files.len(), engine = engine.name()))]
    pub async fn analyze_images(
        &self,
        engine: Arc<dyn OcrEngine>,
        files: Vec<(String, Vec<u8>)>,
        cancel: &CancellationToken,
    ) -> Result<BatchResult> {
        check_file_names(files.iter().map(|(name, _)| name.as_str()))?;

        let mut first_seen: HashMap<String, String> = HashMap::new();
        let mut plans = Vec::with_capacity(files.len());
        for (name, bytes) in files {
            let hash = content_hash(&bytes);
            let plan = match first_seen.get(&hash) {
                Some(original) => {
                    debug!(file = %name, %original, "duplicate upload skipped");
                    Plan::Skip(FileWarning::new(
                        name.clone(),
                        WarningKind::DuplicateFile,
                        format!("identical to {original}"),
                    ))
                }
                None => {
                    first_seen.insert(hash, name.clone());
                    Plan::Run(Job::Image {
                        engine: Arc::clone(&engine),
                        bytes,
                    })
                }
            };
            plans.push((name, plan));
        }
        Ok(self.run(plans, cancel).await)
    }

    /// Schedule every runnable file, wait for the workers, and re-sequence.
    async fn run(&self, plans: Vec<(String, Plan)>, cancel: &CancellationToken) -> BatchResult {
        let total = plans.len();
        let semaphore = Arc::new(Semaphore::new(self.config.max_workers));
        let mut slots: Vec<Option<Outcome>> = (0..total).map(|_| None).collect();
        let mut names: Vec<String> = Vec::with_capacity(total);
        let mut workers: JoinSet<(usize, Outcome)> = JoinSet::new();

        for (index, (name, plan)) in plans.into_iter().enumerate() {
            names.push(name.clone());
            let job = match plan {
                Plan::Run(job) => job,
                Plan::Skip(warning) => {
                    slots[index] = Some(Outcome::Warning(warning));
                    continue;
                }
            };

            // Wait for a free worker, unless the batch is cancelled first.
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                slots[index] = Some(Outcome::Warning(FileWarning::new(
                    name,
                    WarningKind::Cancelled,
                    "batch cancelled before this file started",
                )));
                continue;
            };

            let extractor = Arc::clone(&self.extractor);
            workers.spawn_blocking(move || {
                let _permit = permit;
                (index, process_file(&extractor, &name, job))
            });
        }

        let mut files_processed = 0;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    files_processed += 1;
                    slots[index] = Some(outcome);
                }
                Err(err) => warn!(error = %err, "extraction worker did not complete"),
            }
        }

        let mut students = Vec::new();
        let mut warnings = Vec::new();
        for (slot, name) in slots.into_iter().zip(names) {
            match slot {
                Some(Outcome::Records(records)) => students.extend(records),
                Some(Outcome::Warning(warning)) => warnings.push(warning),
                None => warnings.push(FileWarning::new(
                    name,
                    WarningKind::OcrFailed,
                    "extraction worker stopped unexpectedly",
                )),
            }
        }

        let result = BatchResult {
            batch_id: BatchId::new(),
            students,
            warnings,
            files_processed,
            completed_at: Utc::now(),
        };
        info!(
            batch_id = %result.batch_id,
            files = total,
            files_processed,
            students = result.students.len(),
            warnings = result.warnings.len(),
            cancelled = cancel.is_cancelled(),
            "batch complete"
        );
        result
    }
}

/// Every file needs a non-empty name: it is the record's provenance.
fn check_file_names<'a>(mut names: impl Iterator<Item = &'a str>) -> Result<()> {
    match names.position(|name| name.trim().is_empty()) {
        Some(index) => Err(AttendCheckError::InvalidBatch(format!(
            "file #{index} has an empty name"
        ))),
        None => Ok(()),
    }
}

/// One file through OCR (if needed) and the extractor. Runs on a blocking
/// worker thread.
fn process_file(extractor: &Extractor, name: &str, job: Job) -> Outcome {
    let tokens = match job {
        Job::Tokens(tokens) => tokens,
        Job::Image { engine, bytes } => match engine.recognize(&bytes) {
            Ok(tokens) => tokens,
            Err(err) => {
                warn!(file = name, error = %err, "OCR failed");
                return Outcome::Warning(FileWarning::new(
                    name,
                    WarningKind::OcrFailed,
                    err.to_string(),
                ));
            }
        },
    };

    if tokens.iter().all(|t| t.text.trim().is_empty()) {
        warn!(file = name, "no text recognized");
        return Outcome::Warning(FileWarning::new(
            name,
            WarningKind::NoText,
            "no text was recognized in this file",
        ));
    }

    Outcome::Records(extractor.extract(name, tokens))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use attendcheck_core::config::ExtractorConfig;
    use attendcheck_core::types::BoundingBox;

    fn aggregator(max_workers: usize) -> BatchAggregator {
        let extractor = Extractor::new(&ExtractorConfig::default()).expect("extractor");
        BatchAggregator::new(extractor, BatchConfig { max_workers }).expect("aggregator")
    }

    fn raw(text: &str, x0: f32, confidence: f32) -> RawToken {
        RawToken::new(text, BoundingBox::new(x0, 0.0, x0 + 90.0, 20.0), confidence)
    }

    fn sheet(id: &str, surname: &str) -> Vec<RawToken> {
        vec![raw(surname, 0.0, 0.9), raw(id, 100.0, 0.9)]
    }

    /// Test engine: the image bytes are the token dump; bytes starting with
    /// `slow:` sleep first, `fail` is rejected.
    struct ScriptedEngine;

    impl OcrEngine for ScriptedEngine {
        fn recognize(&self, image: &[u8]) -> Result<Vec<RawToken>> {
            let text = String::from_utf8_lossy(image);
            if text == "fail" {
                return Err(AttendCheckError::OcrEngine("image decode failed".into()));
            }
            let text = match text.strip_prefix("slow:") {
                Some(rest) => {
                    std::thread::sleep(Duration::from_millis(150));
                    rest.to_owned()
                }
                None => text.into_owned(),
            };
            if text.is_empty() {
                return Ok(Vec::new());
            }
            let (surname, id) = text.split_once(' ').unwrap_or(("", text.as_str()));
            Ok(sheet(id, surname))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn image(text: &str) -> Vec<u8> {
        text.as_bytes().to_vec()
    }

    #[tokio::test]
    async fn labelled_scenario_through_batch() {
        let tokens = vec![
            raw("Surname: Yamada", 0.0, 0.9),
            raw("Name: Taro", 100.0, 0.95),
            raw("ID: 20231234", 200.0, 0.99),
        ];
        let result = aggregator(2)
            .aggregate_tokens(vec![("sheet.png".into(), tokens)], &CancellationToken::new())
            .await
            .expect("batch");
        assert_eq!(result.students.len(), 1);
        assert!(result.warnings.is_empty());
        let s = &result.students[0];
        assert_eq!(s.student_id_num, "20231234");
        assert_eq!(s.surname, "Yamada");
        assert_eq!(s.name, "Taro");
        assert_eq!(s.confidence, 0.9);
        assert_eq!(s.file_name, "sheet.png");
    }

    #[tokio::test]
    async fn submission_order_survives_out_of_order_completion() {
        let files = vec![
            ("a.png".to_owned(), image("slow:Yamada 20231234")),
            ("b.png".to_owned(), image("Sato 20231235")),
            ("c.png".to_owned(), image("Suzuki 20231236")),
        ];
        let result = aggregator(3)
            .analyze_images(Arc::new(ScriptedEngine), files, &CancellationToken::new())
            .await
            .expect("batch");
        let order: Vec<&str> = result.students.iter().map(|s| s.file_name.as_str()).collect();
        assert_eq!(order, vec!["a.png", "b.png", "c.png"]);
        assert_eq!(result.files_processed, 3);
    }

    #[tokio::test]
    async fn failing_file_becomes_a_warning() {
        let files = vec![
            ("good.png".to_owned(), image("Yamada 20231234")),
            ("bad.png".to_owned(), image("fail")),
            ("blank.png".to_owned(), image("")),
        ];
        let result = aggregator(2)
            .analyze_images(Arc::new(ScriptedEngine), files, &CancellationToken::new())
            .await
            .expect("batch");
        assert_eq!(result.students.len(), 1);
        assert_eq!(result.students[0].file_name, "good.png");
        let kinds: Vec<(&str, WarningKind)> = result
            .warnings
            .iter()
            .map(|w| (w.file_name.as_str(), w.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![("bad.png", WarningKind::OcrFailed), ("blank.png", WarningKind::NoText)]
        );
    }

    #[tokio::test]
    async fn identical_images_are_processed_once() {
        let files = vec![
            ("scan-1.png".to_owned(), image("Yamada 20231234")),
            ("scan-1 copy.png".to_owned(), image("Yamada 20231234")),
        ];
        let result = aggregator(2)
            .analyze_images(Arc::new(ScriptedEngine), files, &CancellationToken::new())
            .await
            .expect("batch");
        assert_eq!(result.students.len(), 1);
        assert_eq!(result.files_processed, 1);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].kind, WarningKind::DuplicateFile);
        assert_eq!(result.warnings[0].file_name, "scan-1 copy.png");
        assert!(result.warnings[0].reason.contains("scan-1.png"));
    }

    #[tokio::test]
    async fn cancelled_batch_schedules_nothing_new() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let files = vec![
            ("a.png".to_owned(), sheet("20231234", "Yamada")),
            ("b.png".to_owned(), sheet("20231235", "Sato")),
        ];
        let result = aggregator(1)
            .aggregate_tokens(files, &cancel)
            .await
            .expect("batch");
        assert!(result.students.is_empty());
        assert_eq!(result.files_processed, 0);
        assert!(result.warnings.iter().all(|w| w.kind == WarningKind::Cancelled));
        assert_eq!(result.warnings.len(), 2);
    }

    #[tokio::test]
    async fn in_flight_file_finishes_after_cancel() {
        let cancel = CancellationToken::new();
        let files = vec![
            ("a.png".to_owned(), image("slow:Yamada 20231234")),
            ("b.png".to_owned(), image("Sato 20231235")),
        ];
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });
        // One worker: b.png waits for a.png's permit, and the cancel lands
        // while a.png is still running.
        let result = aggregator(1)
            .analyze_images(Arc::new(ScriptedEngine), files, &cancel)
            .await
            .expect("batch");
        assert_eq!(result.students.len(), 1);
        assert_eq!(result.students[0].file_name, "a.png");
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].file_name, "b.png");
        assert_eq!(result.warnings[0].kind, WarningKind::Cancelled);
    }

    #[tokio::test]
    async fn row_without_id_is_not_a_warning() {
        let files = vec![("a.png".to_owned(), vec![raw("Attendance list", 0.0, 0.9)])];
        let result = aggregator(1)
            .aggregate_tokens(files, &CancellationToken::new())
            .await
            .expect("batch");
        assert!(result.students.is_empty());
        assert!(result.warnings.is_empty());
        assert_eq!(result.files_processed, 1);
    }

    #[tokio::test]
    async fn empty_file_name_rejects_the_batch() {
        let files = vec![
            ("a.png".to_owned(), sheet("20231234", "Yamada")),
            ("  ".to_owned(), sheet("20231235", "Sato")),
        ];
        let result = aggregator(1)
            .aggregate_tokens(files, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(AttendCheckError::InvalidBatch(_))));
    }

    #[test]
    fn zero_workers_is_invalid() {
        let extractor = Extractor::new(&ExtractorConfig::default()).expect("extractor");
        let result = BatchAggregator::new(extractor, BatchConfig { max_workers: 0 });
        assert!(matches!(result, Err(AttendCheckError::InvalidConfig(_))));
    }

    #[test]
    fn content_hash_is_hex_sha256() {
        // SHA-256("hello")
        assert_eq!(
            content_hash(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[tokio::test]
    async fn merged_duplicates_across_files_keep_best_record() {
        let files = vec![
            ("a.png".to_owned(), vec![raw("Yamada", 0.0, 0.6), raw("20231234", 100.0, 0.9)]),
            ("b.png".to_owned(), sheet("20231299", "Sato")),
            ("c.png".to_owned(), vec![raw("Yamada", 0.0, 0.95), raw("20231234", 100.0, 0.95)]),
        ];
        let result = aggregator(2)
            .aggregate_tokens(files, &CancellationToken::new())
            .await
            .expect("batch")
            .merge_duplicates();
        let ids: Vec<(&str, &str)> = result
            .students
            .iter()
            .map(|s| (s.student_id_num.as_str(), s.file_name.as_str()))
            .collect();
        assert_eq!(ids, vec![("20231234", "c.png"), ("20231299", "b.png")]);
    }
}
