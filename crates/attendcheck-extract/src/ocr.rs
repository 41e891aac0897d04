// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Word-level OCR backed by `ocrs`, a pure-Rust engine running its neural
// network models through `rten`.
//
// Only compiled with the `ocr` feature:
//
// ```toml
// attendcheck-extract = { path = "crates/attendcheck-extract", features = ["ocr"] }
// ```
//
// # Model Setup
//
// Two model files are required:
//
// - **Detection model** (`text-detection.rten`) locates words in the image.
// - **Recognition model** (`text-recognition.rten`) decodes their characters.
//
// Running `ocrs-cli` once downloads both to `$XDG_CACHE_HOME/ocrs`
// (typically `~/.cache/ocrs`), which is where [`OcrConfig::default`] looks.
//
// `ocrs` reports no per-word confidence, so every token it yields carries
// confidence 1.0.

use std::path::{Path, PathBuf};

use attendcheck_core::error::{AttendCheckError, Result};
use attendcheck_core::types::{BoundingBox, RawToken};
use ocrs::{ImageSource, OcrEngine as OcrsInner, OcrEngineParams, TextItem};
use rten::Model;
use tracing::{debug, info, instrument};

use crate::engine::OcrEngine;

const DETECTION_MODEL_FILENAME: &str = "text-detection.rten";
const RECOGNITION_MODEL_FILENAME: &str = "text-recognition.rten";

/// `$XDG_CACHE_HOME/ocrs`, falling back to `~/.cache/ocrs`.
fn default_model_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        PathBuf::from(xdg).join("ocrs")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".cache").join("ocrs")
    } else {
        PathBuf::from("ocrs-models")
    }
}

/// Where to find the two model files.
#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub detection_model_path: PathBuf,
    pub recognition_model_path: PathBuf,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self::from_dir(default_model_dir())
    }
}

impl OcrConfig {
    /// Expects `dir` to contain `text-detection.rten` and `text-recognition.rten`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            detection_model_path: dir.join(DETECTION_MODEL_FILENAME),
            recognition_model_path: dir.join(RECOGNITION_MODEL_FILENAME),
        }
    }

    /// Fails with [`AttendCheckError::OcrEngine`] if either model is missing.
    pub fn validate(&self) -> Result<()> {
        for path in [&self.detection_model_path, &self.recognition_model_path] {
            if !path.exists() {
                return Err(AttendCheckError::OcrEngine(format!(
                    "model not found at {}; run `ocrs-cli` once to download models",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

/// [`OcrEngine`] implementation over `ocrs`.
///
/// Model loading is the expensive step: build one engine per run and share it
/// across every file of the batch.
pub struct OcrsEngine {
    engine: OcrsInner,
}

impl OcrsEngine {
    /// Load both models named by `config`.
    ///
    /// `ocrs` and `rten` are unusably slow in debug builds; run release builds.
    #[instrument(skip_all, fields(
        detection = %config.detection_model_path.display(),
        recognition = %config.recognition_model_path.display(),
    ))]
    pub fn new(config: &OcrConfig) -> Result<Self> {
        config.validate()?;

        let load = |path: &Path| {
            Model::load_file(path).map_err(|err| {
                AttendCheckError::OcrEngine(format!(
                    "failed to load model from {}: {err}",
                    path.display()
                ))
            })
        };
        info!("loading OCR models");
        let detection_model = load(&config.detection_model_path)?;
        let recognition_model = load(&config.recognition_model_path)?;

        let engine = OcrsInner::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|err| AttendCheckError::OcrEngine(format!("failed to initialise model: {err}")))?;

        info!("OCR engine ready");
        Ok(Self { engine })
    }

    pub fn from_model_dir(dir: impl AsRef<Path>) -> Result<Self> {
        Self::new(&OcrConfig::from_dir(dir))
    }
}

impl OcrEngine for OcrsEngine {
    #[instrument(skip_all, fields(bytes = image.len()))]
    fn recognize(&self, image: &[u8]) -> Result<Vec<RawToken>> {
        let decoded = image::load_from_memory(image)
            .map_err(|err| AttendCheckError::OcrEngine(format!("image decode failed: {err}")))?;
        let rgb = decoded.to_rgb8();
        let (width, height) = rgb.dimensions();

        let source = ImageSource::from_bytes(rgb.as_raw(), (width, height)).map_err(|err| {
            AttendCheckError::OcrEngine(format!(
                "image decode failed for {width}x{height} source: {err}"
            ))
        })?;
        let input = self
            .engine
            .prepare_input(source)
            .map_err(|err| AttendCheckError::OcrEngine(format!("preprocessing failed: {err}")))?;

        let word_rects = self
            .engine
            .detect_words(&input)
            .map_err(|err| AttendCheckError::OcrEngine(format!("word detection failed: {err}")))?;
        let line_rects = self.engine.find_text_lines(&input, &word_rects);
        let lines = self
            .engine
            .recognize_text(&input, &line_rects)
            .map_err(|err| AttendCheckError::OcrEngine(format!("recognition failed: {err}")))?;

        let mut tokens = Vec::new();
        for line in lines.iter().flatten() {
            for word in line.words() {
                let text = word.to_string();
                if text.trim().is_empty() {
                    continue;
                }
                let rect = word.bounding_rect();
                tokens.push(RawToken::new(
                    text,
                    BoundingBox::new(
                        rect.left() as f32,
                        rect.top() as f32,
                        rect.right() as f32,
                        rect.bottom() as f32,
                    ),
                    1.0,
                ));
            }
        }

        debug!(
            width,
            height,
            words = word_rects.len(),
            tokens = tokens.len(),
            "OCR complete"
        );
        Ok(tokens)
    }

    fn name(&self) -> &str {
        "ocrs"
    }
}

/// Whether both models are present in the default cache directory.
pub fn models_available() -> bool {
    OcrConfig::default().validate().is_ok()
}
