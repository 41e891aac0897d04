// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Row clustering by vertical interval overlap.
//
// Sheets are photographed at slight angles and with uneven line spacing, so
// rows are inferred from the token boxes themselves instead of a fixed grid.

use std::cmp::Ordering;

use attendcheck_core::types::{BoundingBox, NormalizedToken};

/// Tokens that sit on the same physical line, left to right.
#[derive(Debug, Clone)]
pub struct Row {
    pub tokens: Vec<NormalizedToken>,
    /// Union of the member boxes.
    pub band: BoundingBox,
}

/// Group tokens into rows, ordered top to bottom.
///
/// Tokens are visited by vertical centre. A token joins the current row when
/// its vertical overlap with the row band is at least `threshold` times the
/// smaller of the two heights; otherwise it opens a new row. Ordering uses
/// `total_cmp` throughout so identical input always yields identical rows.
pub fn cluster_rows(tokens: Vec<NormalizedToken>, threshold: f32) -> Vec<Row> {
    let mut sorted = tokens;
    sorted.sort_by(|a, b| {
        a.bbox()
            .center_y()
            .total_cmp(&b.bbox().center_y())
            .then_with(|| a.bbox().x0.total_cmp(&b.bbox().x0))
    });

    let mut rows: Vec<Row> = Vec::new();
    for token in sorted {
        let bbox = *token.bbox();
        match rows.last_mut() {
            Some(row) if shares_row(&row.band, &bbox, threshold) => {
                row.band = row.band.union(&bbox);
                row.tokens.push(token);
            }
            _ => rows.push(Row {
                tokens: vec![token],
                band: bbox,
            }),
        }
    }

    for row in &mut rows {
        row.tokens.sort_by(|a, b| compare_left_to_right(a.bbox(), b.bbox()));
    }
    rows
}

fn shares_row(band: &BoundingBox, bbox: &BoundingBox, threshold: f32) -> bool {
    let smaller = band.height().min(bbox.height());
    if smaller <= 0.0 {
        // Degenerate boxes: fall back to "centre inside the band".
        let cy = bbox.center_y();
        return cy >= band.y0 && cy <= band.y1;
    }
    band.vertical_overlap(bbox) / smaller >= threshold
}

fn compare_left_to_right(a: &BoundingBox, b: &BoundingBox) -> Ordering {
    a.x0.total_cmp(&b.x0).then_with(|| a.y0.total_cmp(&b.y0))
}
