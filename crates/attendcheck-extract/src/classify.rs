// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Field classifier — assigns ID / surname / given-name / noise roles to the
// normalized tokens of one file, row by row.
//
// Resolution order for name text:
//
// 1. a label with an inline value ("Surname: Yamada"),
// 2. the nearest bare label to the left in the same row,
// 3. the header column above (a row of bare labels, e.g. a table header),
// 4. positional fallback next to the ID (left column = surname by default).

use attendcheck_core::config::{ColumnFallback, ExtractorConfig, NameSide};
use attendcheck_core::error::{AttendCheckError, Result};
use attendcheck_core::types::{BoundingBox, ClassifiedToken, FieldRole, NormalizedToken};
use regex::Regex;
use tracing::trace;

use crate::labels::{LabelKind, LabelMatcher};
use crate::layout::{Row, cluster_rows};
use crate::normalize::{correct_confusables, is_digit_heavy};

/// Horizontal search radius for unlabelled names, in multiples of the ID
/// token's height.
const FALLBACK_GAP_FACTOR: f32 = 5.0;

/// One row of a sheet after classification.
#[derive(Debug, Clone)]
pub enum RowCluster {
    /// Exactly one token carries an ID role.
    Entry {
        band: BoundingBox,
        tokens: Vec<ClassifiedToken>,
    },
    /// Bare labels only; fixes the columns for the rows beneath it.
    Header {
        band: BoundingBox,
        tokens: Vec<ClassifiedToken>,
    },
    /// No decodable ID. Produces no record.
    Skipped {
        band: BoundingBox,
        tokens: Vec<ClassifiedToken>,
    },
}

impl RowCluster {
    pub fn band(&self) -> &BoundingBox {
        match self {
            Self::Entry { band, .. } | Self::Header { band, .. } | Self::Skipped { band, .. } => {
                band
            }
        }
    }

    pub fn tokens(&self) -> &[ClassifiedToken] {
        match self {
            Self::Entry { tokens, .. }
            | Self::Header { tokens, .. }
            | Self::Skipped { tokens, .. } => tokens,
        }
    }

    pub fn into_tokens(self) -> Vec<ClassifiedToken> {
        match self {
            Self::Entry { tokens, .. }
            | Self::Header { tokens, .. }
            | Self::Skipped { tokens, .. } => tokens,
        }
    }

    pub fn is_entry(&self) -> bool {
        matches!(self, Self::Entry { .. })
    }
}

/// A bare label and the column it occupies.
#[derive(Debug, Clone, Copy)]
struct Anchor {
    kind: LabelKind,
    bbox: BoundingBox,
}

/// An ID found inside a token.
#[derive(Debug, Clone)]
struct IdMatch {
    text: String,
    digit_len: usize,
    /// Text before the match (label removed), e.g. "山田 太郎(" in
    /// "山田 太郎(abc-1234567)".
    leading: String,
}

/// Per-token outcome before row-level resolution.
#[derive(Debug)]
enum Slot {
    Id(IdMatch),
    Anchor(LabelKind),
    /// Name text already attributed through an inline label.
    Labelled(LabelKind, String),
    /// Name-like text waiting for a column.
    Candidate(String),
    Noise,
}

/// Compiled classification rules for one [`ExtractorConfig`].
#[derive(Debug, Clone)]
pub struct Classifier {
    id_regex: Regex,
    exclusion: Option<Regex>,
    labels: LabelMatcher,
    id_prefix: String,
    min_id_confidence: f32,
    row_overlap_threshold: f32,
    column_fallback: ColumnFallback,
    name_side: NameSide,
    max_fallback_name_tokens: usize,
}

impl Classifier {
    pub fn new(config: &ExtractorConfig) -> Result<Self> {
        config.validate()?;
        let id_regex = Regex::new(&config.id_pattern)
            .map_err(|e| AttendCheckError::InvalidConfig(format!("id_pattern: {e}")))?;
        let exclusion = config
            .name_exclusion_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| AttendCheckError::InvalidConfig(format!("name_exclusion_pattern: {e}")))?;

        Ok(Self {
            id_regex,
            exclusion,
            labels: LabelMatcher::new(&config.labels),
            id_prefix: config.id_prefix.clone(),
            min_id_confidence: config.min_id_confidence,
            row_overlap_threshold: config.row_overlap_threshold,
            column_fallback: config.column_fallback,
            name_side: config.name_side,
            max_fallback_name_tokens: config.max_fallback_name_tokens,
        })
    }

    /// Classify the tokens of one file into rows, top to bottom.
    pub fn classify(&self, tokens: Vec<NormalizedToken>) -> Vec<RowCluster> {
        let mut header: Vec<Anchor> = Vec::new();
        cluster_rows(tokens, self.row_overlap_threshold)
            .into_iter()
            .map(|row| {
                let cluster = self.classify_row(row, &header);
                if let RowCluster::Header { tokens, .. } = &cluster {
                    header = tokens
                        .iter()
                        .filter_map(|t| {
                            let m = self.labels.match_label(&t.token.normalized_text)?;
                            m.is_anchor().then_some(Anchor {
                                kind: m.kind,
                                bbox: *t.bbox(),
                            })
                        })
                        .collect();
                }
                cluster
            })
            .collect()
    }

    /// Classify and flatten: one classified token per surviving token, plus
    /// one per extra field when a single token carried several.
    pub fn classify_flat(&self, tokens: Vec<NormalizedToken>) -> Vec<ClassifiedToken> {
        self.classify(tokens)
            .into_iter()
            .flat_map(RowCluster::into_tokens)
            .collect()
    }

    fn classify_row(&self, row: Row, header: &[Anchor]) -> RowCluster {
        let Row { tokens, band } = row;
        let mut slots: Vec<Slot> = tokens.iter().map(|t| self.inspect(t)).collect();

        // Several IDs on one row: longest digit run, then leftmost (tokens
        // are already left to right).
        let winner = slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| match s {
                Slot::Id(m) => Some((i, m.digit_len)),
                _ => None,
            })
            .fold(None, |best: Option<(usize, usize)>, (i, len)| match best {
                Some((_, best_len)) if best_len >= len => best,
                _ => Some((i, len)),
            })
            .map(|(i, _)| i);

        for (i, slot) in slots.iter_mut().enumerate() {
            if matches!(slot, Slot::Id(_)) && Some(i) != winner {
                trace!(index = i, "ID candidate lost tie-break");
                *slot = Slot::Noise;
            }
        }

        let anchors: Vec<Anchor> = slots
            .iter()
            .zip(&tokens)
            .filter_map(|(s, t)| match s {
                Slot::Anchor(kind) => Some(Anchor {
                    kind: *kind,
                    bbox: *t.bbox(),
                }),
                _ => None,
            })
            .collect();

        // Resolve candidates through same-row anchors, then the header.
        let mut resolved: Vec<Option<LabelKind>> = vec![None; tokens.len()];
        let inline_name = winner.is_some_and(|i| match &slots[i] {
            Slot::Id(m) => self.name_value(&m.leading).is_some(),
            _ => false,
        });
        let mut any_labelled =
            inline_name || slots.iter().any(|s| matches!(s, Slot::Labelled(..)));
        for (i, slot) in slots.iter().enumerate() {
            if let Slot::Candidate(_) = slot {
                let bbox = tokens[i].bbox();
                let kind = anchor_left_of(&anchors, bbox)
                    .or_else(|| header_column(header, bbox))
                    .filter(|k| *k != LabelKind::StudentId);
                if kind.is_some() {
                    any_labelled = true;
                }
                resolved[i] = kind;
            }
        }

        // Positional fallback only when no label said anything about names.
        let mut fallback: Vec<(usize, FieldRole)> = Vec::new();
        if let Some(id_index) = winner {
            if !any_labelled {
                fallback = self.fallback_columns(&slots, &tokens, id_index);
            }
        }

        let mut classified = Vec::with_capacity(tokens.len());
        for (i, (slot, token)) in slots.into_iter().zip(tokens).enumerate() {
            match slot {
                Slot::Id(m) => {
                    let role = if m.text.chars().all(|c| c.is_ascii_digit()) {
                        FieldRole::StudentIdNum
                    } else {
                        FieldRole::StudentIdFull
                    };
                    let leading = self.name_value(&m.leading);
                    classified.push(ClassifiedToken {
                        token: token.clone(),
                        role,
                        value: m.text,
                    });
                    // "山田 太郎(abc-1234567)": the name shares the ID token.
                    if let Some(name) = leading {
                        push_split_name(&mut classified, &token, &name, self.column_fallback);
                    }
                }
                Slot::Labelled(kind, value) => {
                    push_labelled(&mut classified, token, kind, value, self.column_fallback)
                }
                Slot::Candidate(value) => match (resolved[i], fallback.iter().find(|(j, _)| *j == i)) {
                    (Some(kind), _) => {
                        push_labelled(&mut classified, token, kind, value, self.column_fallback)
                    }
                    (None, Some((_, FieldRole::Surname | FieldRole::GivenName))) if fallback.len() == 1 => {
                        push_split_name(&mut classified, &token, &value, self.column_fallback)
                    }
                    (None, Some((_, role))) => classified.push(ClassifiedToken {
                        token,
                        role: *role,
                        value,
                    }),
                    (None, None) => push_noise(&mut classified, token),
                },
                Slot::Anchor(_) | Slot::Noise => push_noise(&mut classified, token),
            }
        }

        if winner.is_some() {
            RowCluster::Entry {
                band,
                tokens: classified,
            }
        } else if !anchors.is_empty() {
            RowCluster::Header {
                band,
                tokens: classified,
            }
        } else {
            RowCluster::Skipped {
                band,
                tokens: classified,
            }
        }
    }

    /// First pass over a single token: label, ID, or name candidate.
    fn inspect(&self, token: &NormalizedToken) -> Slot {
        let text = token.normalized_text.as_str();
        let label = self.labels.match_label(text);

        match label {
            Some(m) if m.is_anchor() => return Slot::Anchor(m.kind),
            Some(m) if m.kind != LabelKind::StudentId => {
                return match self.name_value(m.value) {
                    Some(value) => Slot::Labelled(m.kind, value),
                    None => Slot::Noise,
                };
            }
            _ => {}
        }

        let body = label.map_or(text, |m| m.value);
        if token.confidence() >= self.min_id_confidence {
            if let Some(id) = self.find_id(body) {
                return Slot::Id(id);
            }
        }
        if label.is_some() {
            // "ID: ???" without a usable number.
            return Slot::Noise;
        }
        match self.name_value(body) {
            Some(value) => Slot::Candidate(value),
            None => Slot::Noise,
        }
    }

    /// Search for an ID, retrying digit-heavy text with confusables corrected.
    fn find_id(&self, body: &str) -> Option<IdMatch> {
        let to_match = |haystack: &str| {
            self.id_regex.find(haystack).map(|m| IdMatch {
                text: m.as_str().to_owned(),
                digit_len: m.as_str().chars().filter(|c| c.is_ascii_digit()).count(),
                leading: haystack[..m.start()].to_owned(),
            })
        };

        if let Some(found) = to_match(body) {
            return Some(found);
        }

        // Keep the institution prefix intact; only the number part is fixed.
        let (prefix, number) = match body.get(..self.id_prefix.len()) {
            Some(head) if !self.id_prefix.is_empty() && head.eq_ignore_ascii_case(&self.id_prefix) => {
                (head, &body[self.id_prefix.len()..])
            }
            _ => ("", body),
        };
        if !is_digit_heavy(number) {
            return None;
        }
        let corrected = format!("{prefix}{}", correct_confusables(number));
        let found = to_match(&corrected)?;
        trace!(original = body, corrected = %found.text, "ID recovered from confusable glyphs");
        Some(found)
    }

    /// Clean name text; `None` when it cannot be a name.
    fn name_value(&self, text: &str) -> Option<String> {
        let cleaned = text
            .trim()
            .trim_matches(|c: char| matches!(c, '(' | ')' | '[' | ']' | '「' | '」'))
            .trim();
        if cleaned.is_empty() || !cleaned.chars().any(char::is_alphabetic) {
            return None;
        }
        if !self.id_prefix.is_empty() && cleaned.contains(&self.id_prefix) {
            return None;
        }
        if self.id_regex.is_match(cleaned) {
            return None;
        }
        if self.exclusion.as_ref().is_some_and(|re| re.is_match(cleaned)) {
            return None;
        }
        Some(cleaned.to_owned())
    }

    /// Pick unlabelled name tokens next to the ID and assign columns.
    fn fallback_columns(
        &self,
        slots: &[Slot],
        tokens: &[NormalizedToken],
        id_index: usize,
    ) -> Vec<(usize, FieldRole)> {
        let id_box = tokens[id_index].bbox();
        let max_gap = id_box.height().max(1.0) * FALLBACK_GAP_FACTOR;
        let candidates: Vec<usize> = slots
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(s, Slot::Candidate(_)))
            .map(|(i, _)| i)
            .collect();

        let left = || {
            // Closest first, walking leftwards from the ID.
            let mut picked = Vec::new();
            let mut edge = id_box.x0;
            for &i in candidates.iter().rev().filter(|&&i| tokens[i].bbox().x1 <= id_box.x0) {
                let bbox = tokens[i].bbox();
                if edge - bbox.x1 > max_gap || picked.len() >= self.max_fallback_name_tokens {
                    break;
                }
                picked.push(i);
                edge = bbox.x0;
            }
            picked
        };
        let right = || {
            let mut picked = Vec::new();
            let mut edge = id_box.x1;
            for &i in candidates.iter().filter(|&&i| tokens[i].bbox().x0 >= id_box.x1) {
                let bbox = tokens[i].bbox();
                if bbox.x0 - edge > max_gap || picked.len() >= self.max_fallback_name_tokens {
                    break;
                }
                picked.push(i);
                edge = bbox.x1;
            }
            picked
        };

        let mut picked = match self.name_side {
            NameSide::Left => left(),
            NameSide::Right => right(),
            NameSide::Either => {
                let on_left = left();
                if on_left.is_empty() { right() } else { on_left }
            }
        };
        // Token indices follow x order.
        picked.sort_unstable();

        let surname_at = match self.column_fallback {
            ColumnFallback::SurnameFirst => 0,
            ColumnFallback::GivenNameFirst => picked.len().saturating_sub(1),
        };
        picked
            .iter()
            .enumerate()
            .map(|(n, &i)| {
                let role = if n == surname_at {
                    FieldRole::Surname
                } else {
                    FieldRole::GivenName
                };
                (i, role)
            })
            .collect()
    }
}

/// The bare same-row label closest on the left of `bbox`.
fn anchor_left_of(anchors: &[Anchor], bbox: &BoundingBox) -> Option<LabelKind> {
    anchors
        .iter()
        .filter(|a| a.bbox.x0 < bbox.x0)
        .max_by(|a, b| a.bbox.x0.total_cmp(&b.bbox.x0))
        .map(|a| a.kind)
}

/// The header column above `bbox`: the one with the largest horizontal
/// overlap. Text outside every column belongs to none.
fn header_column(header: &[Anchor], bbox: &BoundingBox) -> Option<LabelKind> {
    header
        .iter()
        .map(|a| (a, a.bbox.horizontal_overlap(bbox)))
        .filter(|(_, overlap)| *overlap > 0.0)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(a, _)| a.kind)
}

fn push_noise(out: &mut Vec<ClassifiedToken>, token: NormalizedToken) {
    let value = token.normalized_text.clone();
    out.push(ClassifiedToken {
        token,
        role: FieldRole::Noise,
        value,
    });
}

fn push_labelled(
    out: &mut Vec<ClassifiedToken>,
    token: NormalizedToken,
    kind: LabelKind,
    value: String,
    order: ColumnFallback,
) {
    let role = match kind {
        LabelKind::Surname => FieldRole::Surname,
        LabelKind::GivenName => FieldRole::GivenName,
        LabelKind::FullName => return push_split_name(out, &token, &value, order),
        // Name-like text under an ID column is not a name.
        LabelKind::StudentId => return push_noise(out, token),
    };
    out.push(ClassifiedToken { token, role, value });
}

/// Split "Yamada Taro" at the first whitespace into two classified tokens.
/// Text without whitespace becomes the surname alone.
fn push_split_name(
    out: &mut Vec<ClassifiedToken>,
    token: &NormalizedToken,
    value: &str,
    order: ColumnFallback,
) {
    let (first, second) = match value.split_once(' ') {
        Some((a, b)) => (a.trim(), b.trim()),
        None => (value.trim(), ""),
    };
    let (surname, given) = match (order, second.is_empty()) {
        (ColumnFallback::GivenNameFirst, false) => (second, first),
        _ => (first, second),
    };
    for (role, part) in [(FieldRole::Surname, surname), (FieldRole::GivenName, given)] {
        if !part.is_empty() {
            out.push(ClassifiedToken {
                token: token.clone(),
                role,
                value: part.to_owned(),
            });
        }
    }
}
