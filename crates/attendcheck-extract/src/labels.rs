// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Label vocabulary matching ("Surname", "Name", "学籍番号", ...).

use attendcheck_core::config::LabelVocabulary;

/// What a label announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    Surname,
    GivenName,
    /// Surname and given name in one value.
    FullName,
    StudentId,
}

/// A label found at the start of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelMatch<'a> {
    pub kind: LabelKind,
    /// Text after the label and its separator. Empty for a bare anchor.
    pub value: &'a str,
}

impl LabelMatch<'_> {
    /// A label with no inline value only marks a column.
    pub fn is_anchor(&self) -> bool {
        self.value.is_empty()
    }
}

/// Matches token text against the configured vocabulary.
#[derive(Debug, Clone)]
pub struct LabelMatcher {
    /// Longest label first so "Family name" wins over "Name"-like prefixes.
    entries: Vec<(String, LabelKind)>,
}

impl LabelMatcher {
    pub fn new(vocabulary: &LabelVocabulary) -> Self {
        let groups = [
            (&vocabulary.surname, LabelKind::Surname),
            (&vocabulary.given_name, LabelKind::GivenName),
            (&vocabulary.full_name, LabelKind::FullName),
            (&vocabulary.student_id, LabelKind::StudentId),
        ];
        let mut entries: Vec<(String, LabelKind)> = groups
            .iter()
            .flat_map(|(labels, kind)| {
                labels
                    .iter()
                    .map(|l| l.trim().to_owned())
                    .filter(|l| !l.is_empty())
                    .map(move |l| (l, *kind))
            })
            .collect();
        // Stable: equal lengths keep vocabulary order.
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { entries }
    }

    /// Match `text` as `<label>` or `<label><separator><value>`.
    ///
    /// ASCII letters compare case-insensitively. The separator is a colon,
    /// an equals sign, or whitespace; a label glued to following text ("名取")
    /// is not a label.
    pub fn match_label<'a>(&self, text: &'a str) -> Option<LabelMatch<'a>> {
        self.entries.iter().find_map(|(label, kind)| {
            let head = text.get(..label.len())?;
            if !head.eq_ignore_ascii_case(label) {
                return None;
            }
            let rest = &text[label.len()..];
            if !rest.is_empty() && !rest.starts_with(is_separator) {
                return None;
            }
            Some(LabelMatch {
                kind: *kind,
                value: rest.trim_start_matches(is_separator).trim_end(),
            })
        })
    }
}

fn is_separator(c: char) -> bool {
    c == ':' || c == '=' || c.is_whitespace()
}
