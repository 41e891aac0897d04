// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// attendcheck-batch — Many files in, one ordered attendance list out.
//
// The aggregator fans files out to blocking workers and re-sequences their
// records into submission order; the exporter writes the result as CSV.

pub mod aggregate;
pub mod export;

pub use aggregate::BatchAggregator;
pub use export::{CSV_CONTENT_TYPE, DEFAULT_EXPORT_FILENAME, export_csv, export_split};
