// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Input discovery and the engine that routes each file to the right reader.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use attendcheck_core::error::{AttendCheckError, Result};
use attendcheck_core::types::RawToken;
use attendcheck_extract::{OcrEngine, TokenDumpEngine};
use walkdir::WalkDir;
#[cfg(feature = "ocr")]
use attendcheck_extract::OcrsEngine;

/// Captured OCR output: a JSON array of tokens.
pub const TOKEN_DUMP_EXTENSION: &str = "json";

/// Photos accepted when built with the `ocr` feature.
pub const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

pub fn is_token_dump(path: &Path) -> bool {
    extension_of(path).is_some_and(|e| e == TOKEN_DUMP_EXTENSION)
}

pub fn is_image(path: &Path) -> bool {
    extension_of(path).is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
}

/// The files to analyse: `input` itself, or the supported files anywhere
/// below it, sorted by path.
pub fn collect_inputs(input: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        bail!("input not found: {}", input.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(input).follow_links(false) {
        let entry = entry.with_context(|| format!("walking {}", input.display()))?;
        let path = entry.path();
        if entry.file_type().is_file() && (is_token_dump(path) || is_image(path)) {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    if files.is_empty() {
        bail!("no token dumps or images found in {}", input.display());
    }
    Ok(files)
}

/// Read every file, keyed by its file name.
pub fn read_inputs(paths: &[PathBuf]) -> anyhow::Result<Vec<(String, Vec<u8>)>> {
    paths
        .iter()
        .map(|path| {
            let bytes =
                std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            Ok((name, bytes))
        })
        .collect()
}

/// Token dumps are JSON arrays; no supported image format starts with `[`.
fn looks_like_token_dump(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'[')
}

/// Replays token dumps and, when available, runs OCR on photos.
#[derive(Default)]
pub struct SourceEngine {
    #[cfg(feature = "ocr")]
    ocr: Option<OcrsEngine>,
}

impl SourceEngine {
    #[cfg(feature = "ocr")]
    pub fn with_ocr(ocr: OcrsEngine) -> Self {
        Self { ocr: Some(ocr) }
    }

    #[cfg(feature = "ocr")]
    fn recognize_image(&self, image: &[u8]) -> Result<Vec<RawToken>> {
        match &self.ocr {
            Some(engine) => engine.recognize(image),
            None => Err(AttendCheckError::OcrEngine(
                "text recognition model not loaded".into(),
            )),
        }
    }

    #[cfg(not(feature = "ocr"))]
    fn recognize_image(&self, _image: &[u8]) -> Result<Vec<RawToken>> {
        Err(AttendCheckError::OcrEngine(
            "image input unsupported: built without the `ocr` feature".into(),
        ))
    }
}

impl OcrEngine for SourceEngine {
    fn recognize(&self, image: &[u8]) -> Result<Vec<RawToken>> {
        if looks_like_token_dump(image) {
            TokenDumpEngine.recognize(image)
        } else {
            self.recognize_image(image)
        }
    }

    fn name(&self) -> &str {
        "source"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_inputs_are_filtered_and_sorted() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["b.json", "a.JSON", "notes.txt", "c.png"] {
            std::fs::write(dir.path().join(name), b"[]").expect("write");
        }
        std::fs::create_dir(dir.path().join("nested.json")).expect("mkdir");

        let files = collect_inputs(dir.path()).expect("inputs");
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().expect("name").to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.JSON", "b.json", "c.png"]);
    }

    #[test]
    fn subdirectories_are_searched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("week-2").join("mon");
        std::fs::create_dir_all(&nested).expect("mkdir");
        std::fs::write(dir.path().join("z.json"), b"[]").expect("write");
        std::fs::write(nested.join("a.png"), b"[]").expect("write");
        std::fs::write(nested.join("readme.md"), b"").expect("write");

        let files = collect_inputs(dir.path()).expect("inputs");
        assert_eq!(files, vec![nested.join("a.png"), dir.path().join("z.json")]);
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(collect_inputs(dir.path()).is_err());
        assert!(collect_inputs(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn read_inputs_keys_by_file_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sheet-1.json");
        std::fs::write(&path, b"[]").expect("write");
        let inputs = read_inputs(&[path]).expect("read");
        assert_eq!(inputs, vec![("sheet-1.json".to_owned(), b"[]".to_vec())]);
    }

    #[test]
    fn token_dumps_are_replayed() {
        let dump = br#"  [{"text": "20231234", "bounding_box": {"x0": 0, "y0": 0, "x1": 50, "y1": 20}, "confidence": 0.9}]"#;
        let tokens = SourceEngine::default().recognize(dump).expect("tokens");
        assert_eq!(tokens.len(), 1);
    }

    #[cfg(not(feature = "ocr"))]
    #[test]
    fn images_need_the_ocr_feature() {
        let png_magic = b"\x89PNG\r\n\x1a\n";
        let result = SourceEngine::default().recognize(png_magic);
        assert!(matches!(result, Err(AttendCheckError::OcrEngine(_))));
    }
}
