// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Operator-facing error messages.
//
// Every technical error and per-file warning is mapped to a plain sentence and
// a concrete next step, so whoever is collecting the attendance sheets can
// tell which photos to retake.

use crate::error::AttendCheckError;
use crate::types::{FileWarning, WarningKind};

/// Severity of an error from the operator's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Nothing went wrong that affects the result (e.g. a skipped duplicate).
    Info,
    /// One file is missing from the result; retaking the photo should help.
    Retake,
    /// The operator must change something (configuration, input list).
    ActionRequired,
    /// The run cannot continue.
    Fatal,
}

/// A human-readable error with plain message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Short summary (shown as a heading).
    pub message: String,
    /// What the operator should try.
    pub suggestion: String,
    pub severity: Severity,
}

/// Convert an `AttendCheckError` into a `HumanError`.
pub fn humanize_error(err: &AttendCheckError) -> HumanError {
    match err {
        AttendCheckError::OcrEngine(detail) => humanize_ocr_error(detail),

        AttendCheckError::UnresolvableRecord(_) => HumanError {
            message: "A row on the sheet had no readable student ID.".into(),
            suggestion: "If a student is missing from the list, check that their ID is clearly visible in the photo.".into(),
            severity: Severity::Info,
        },

        AttendCheckError::NormalizationFailure(_) => HumanError {
            message: "Some text in the photo could not be read.".into(),
            suggestion: "This is usually harmless. Retake the photo if a student is missing.".into(),
            severity: Severity::Info,
        },

        AttendCheckError::InvalidBatch(detail) => HumanError {
            message: "The list of files to analyse is not valid.".into(),
            suggestion: format!("Check the uploaded files and try again. ({detail})"),
            severity: Severity::ActionRequired,
        },

        AttendCheckError::InvalidConfig(detail) => HumanError {
            message: "The settings file has a problem.".into(),
            suggestion: format!("Fix the setting named below and run again. ({detail})"),
            severity: Severity::ActionRequired,
        },

        AttendCheckError::Export(_) => HumanError {
            message: "The attendance list could not be written.".into(),
            suggestion: "Try exporting again. If this keeps happening, please report it.".into(),
            severity: Severity::Fatal,
        },

        AttendCheckError::Io(io_err) => {
            if io_err.kind() == std::io::ErrorKind::NotFound {
                HumanError {
                    message: "The file couldn't be found.".into(),
                    suggestion: "It may have been moved or deleted. Check the path and try again.".into(),
                    severity: Severity::ActionRequired,
                }
            } else if io_err.kind() == std::io::ErrorKind::PermissionDenied {
                HumanError {
                    message: "Permission denied while reading or writing a file.".into(),
                    suggestion: "Check the file permissions, or choose a different output folder.".into(),
                    severity: Severity::ActionRequired,
                }
            } else {
                HumanError {
                    message: "There was a problem reading or writing a file.".into(),
                    suggestion: "Try again. If this keeps happening, the disk may be full.".into(),
                    severity: Severity::Fatal,
                }
            }
        }

        AttendCheckError::Serialization(_) => HumanError {
            message: "A data file is not in the expected format.".into(),
            suggestion: "Check that the settings or token files are valid JSON.".into(),
            severity: Severity::ActionRequired,
        },
    }
}

/// Convert a per-file batch warning into a `HumanError`.
pub fn humanize_warning(warning: &FileWarning) -> HumanError {
    let file = &warning.file_name;
    match warning.kind {
        WarningKind::OcrFailed => {
            let mut human = humanize_ocr_error(&warning.reason);
            human.message = format!("{file}: {}", human.message);
            human
        }
        WarningKind::NoText => HumanError {
            message: format!("{file}: no text was found in this photo."),
            suggestion: "Make sure the sheet fills the frame and is in focus, then retake the photo.".into(),
            severity: Severity::Retake,
        },
        WarningKind::DuplicateFile => HumanError {
            message: format!("{file}: this photo was uploaded twice."),
            suggestion: "The copy was skipped. Nothing needs to be done.".into(),
            severity: Severity::Info,
        },
        WarningKind::Cancelled => HumanError {
            message: format!("{file}: not analysed because the run was cancelled."),
            suggestion: "Run the analysis again to include this photo.".into(),
            severity: Severity::ActionRequired,
        },
    }
}

/// Parse OCR-engine error details into human-readable messages.
fn humanize_ocr_error(detail: &str) -> HumanError {
    let lower = detail.to_ascii_lowercase();

    if lower.contains("decode") || lower.contains("unsupported") || lower.contains("format") {
        HumanError {
            message: "This file is not an image we can read.".into(),
            suggestion: "Save the photo as JPEG or PNG and upload it again.".into(),
            severity: Severity::Retake,
        }
    } else if lower.contains("model") {
        HumanError {
            message: "The text recognition models are not installed.".into(),
            suggestion: format!("Install the OCR models and run again. ({detail})"),
            severity: Severity::ActionRequired,
        }
    } else {
        HumanError {
            message: "Text recognition didn't work on this photo.".into(),
            suggestion: "Retake the photo with better lighting, making sure the text is sharp and not at an angle.".into(),
            severity: Severity::Retake,
        }
    }
}
