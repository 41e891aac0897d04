// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the AttendCheck extraction pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one analysis request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(pub Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Axis-aligned bounding box in image pixel coordinates (y grows downward).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoundingBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        (self.x1 - self.x0).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y1 - self.y0).max(0.0)
    }

    pub fn center_x(&self) -> f32 {
        (self.x0 + self.x1) / 2.0
    }

    pub fn center_y(&self) -> f32 {
        (self.y0 + self.y1) / 2.0
    }

    /// Length of the shared vertical interval (0 when disjoint).
    pub fn vertical_overlap(&self, other: &BoundingBox) -> f32 {
        (self.y1.min(other.y1) - self.y0.max(other.y0)).max(0.0)
    }

    /// Length of the shared horizontal interval (0 when disjoint).
    pub fn horizontal_overlap(&self, other: &BoundingBox) -> f32 {
        (self.x1.min(other.x1) - self.x0.max(other.x0)).max(0.0)
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

/// One OCR-detected text span, exactly as the engine reported it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawToken {
    pub text: String,
    pub bounding_box: BoundingBox,
    /// Recognition confidence in `[0, 1]`.
    pub confidence: f32,
}

impl RawToken {
    pub fn new(text: impl Into<String>, bounding_box: BoundingBox, confidence: f32) -> Self {
        Self {
            text: text.into(),
            bounding_box,
            confidence,
        }
    }
}

/// A raw token after width folding and whitespace cleanup. Not yet classified.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedToken {
    pub raw: RawToken,
    pub normalized_text: String,
}

impl NormalizedToken {
    pub fn bbox(&self) -> &BoundingBox {
        &self.raw.bounding_box
    }

    pub fn confidence(&self) -> f32 {
        self.raw.confidence
    }
}

/// Role assigned to a token by the field classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldRole {
    /// ID as printed, including a prefix or suffix (e.g. `abc-1234567`).
    StudentIdFull,
    /// ID printed as a bare digit run.
    StudentIdNum,
    Surname,
    GivenName,
    /// Anything else. Never reaches record assembly.
    Noise,
}

impl FieldRole {
    pub fn is_id(&self) -> bool {
        matches!(self, Self::StudentIdFull | Self::StudentIdNum)
    }

    pub fn is_name(&self) -> bool {
        matches!(self, Self::Surname | Self::GivenName)
    }
}

/// A normalized token with exactly one role.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedToken {
    pub token: NormalizedToken,
    pub role: FieldRole,
    /// Field content carried by the token: the ID match for ID roles, the
    /// label-stripped name text for name roles, the whole text for noise.
    pub value: String,
}

impl ClassifiedToken {
    pub fn bbox(&self) -> &BoundingBox {
        self.token.bbox()
    }

    pub fn confidence(&self) -> f32 {
        self.token.confidence()
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// How surname and given name are joined into `full_name`.
///
/// The default [`NameJoin::Auto`] gives "Yamada Taro" for Latin names and
/// "山田太郎" for CJK ones. Use [`NameJoin::Concat`] for "YamadaTaro".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameJoin {
    /// No separator when either part contains CJK, a single space otherwise.
    #[default]
    Auto,
    /// Always concatenate without a separator.
    Concat,
    /// Always join with a single space.
    Space,
}

/// Whether `c` belongs to a CJK script (Han, kana, Hangul).
pub fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x1100..=0x11FF      // Hangul Jamo
        | 0x3005..=0x3007    // 々 〆 〇
        | 0x3040..=0x309F    // Hiragana
        | 0x30A0..=0x30FF    // Katakana
        | 0x3400..=0x4DBF    // CJK Extension A
        | 0x4E00..=0x9FFF    // CJK Unified Ideographs
        | 0xAC00..=0xD7AF    // Hangul syllables
        | 0xF900..=0xFAFF    // CJK Compatibility Ideographs
        | 0xFF66..=0xFF9F    // Half-width katakana
        | 0x20000..=0x2A6DF  // CJK Extension B
    )
}

pub fn contains_cjk(s: &str) -> bool {
    s.chars().any(is_cjk)
}

/// ASCII digits of `s`, in their original order.
pub fn digits_only(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Join surname and given name. Empty parts never produce a stray separator.
pub fn join_full_name(surname: &str, name: &str, join: NameJoin) -> String {
    if surname.is_empty() || name.is_empty() {
        return format!("{surname}{name}");
    }
    let separator = match join {
        NameJoin::Concat => "",
        NameJoin::Space => " ",
        NameJoin::Auto if contains_cjk(surname) || contains_cjk(name) => "",
        NameJoin::Auto => " ",
    };
    format!("{surname}{separator}{name}")
}

/// One detected student. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentInfo {
    /// ID as printed, e.g. `abc-1234567`.
    pub student_id_full: String,
    /// Digits of `student_id_full`, e.g. `1234567`.
    pub student_id_num: String,
    pub surname: String,
    /// Given name.
    pub name: String,
    pub full_name: String,
    /// Weakest-link confidence over the contributing tokens.
    pub confidence: f32,
    /// Source image that produced this record.
    #[serde(default)]
    pub file_name: String,
}

impl StudentInfo {
    /// Build a record, deriving `student_id_num` and `full_name` so the two
    /// invariants hold by construction.
    pub fn new(
        student_id_full: impl Into<String>,
        surname: impl Into<String>,
        name: impl Into<String>,
        join: NameJoin,
        confidence: f32,
        file_name: impl Into<String>,
    ) -> Self {
        let student_id_full = student_id_full.into();
        let surname = surname.into();
        let name = name.into();
        Self {
            student_id_num: digits_only(&student_id_full),
            full_name: join_full_name(&surname, &name, join),
            student_id_full,
            surname,
            name,
            confidence,
            file_name: file_name.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Batch results
// ---------------------------------------------------------------------------

/// Why a file contributed no records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// The OCR engine rejected the image.
    OcrFailed,
    /// The image produced no usable text.
    NoText,
    /// Byte-identical to an earlier file in the same batch.
    DuplicateFile,
    /// The batch was cancelled before this file was scheduled.
    Cancelled,
}

/// A per-file gap in the batch result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileWarning {
    pub file_name: String,
    pub kind: WarningKind,
    pub reason: String,
}

impl FileWarning {
    pub fn new(file_name: impl Into<String>, kind: WarningKind, reason: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            kind,
            reason: reason.into(),
        }
    }
}

/// Everything one analysis request produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: BatchId,
    /// Records in file submission order, then top-to-bottom within a file.
    pub students: Vec<StudentInfo>,
    pub warnings: Vec<FileWarning>,
    pub files_processed: usize,
    pub completed_at: DateTime<Utc>,
}

impl BatchResult {
    /// Collapse records sharing a `student_id_num` across files.
    ///
    /// The surviving record sits at the first occurrence's position and carries
    /// the contents (including provenance) of the highest-confidence duplicate;
    /// ties keep the earlier record.
    pub fn merge_duplicates(mut self) -> Self {
        let mut merged: Vec<StudentInfo> = Vec::with_capacity(self.students.len());
        for student in self.students.drain(..) {
            match merged
                .iter_mut()
                .find(|kept| kept.student_id_num == student.student_id_num)
            {
                Some(kept) if student.confidence > kept.confidence => *kept = student,
                Some(_) => {}
                None => merged.push(student),
            }
        }
        self.students = merged;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, confidence: f32, file: &str) -> StudentInfo {
        StudentInfo::new(id, "Yamada", "Taro", NameJoin::Auto, confidence, file)
    }

    #[test]
    fn digits_only_keeps_order() {
        assert_eq!(digits_only("abc-12a34"), "1234");
        assert_eq!(digits_only("no digits"), "");
    }

    #[test]
    fn join_uses_space_for_latin_and_nothing_for_cjk() {
        assert_eq!(join_full_name("Yamada", "Taro", NameJoin::Auto), "Yamada Taro");
        assert_eq!(join_full_name("山田", "太郎", NameJoin::Auto), "山田太郎");
        assert_eq!(join_full_name("Yamada", "Taro", NameJoin::Concat), "YamadaTaro");
        assert_eq!(join_full_name("山田", "太郎", NameJoin::Space), "山田 太郎");
    }

    #[test]
    fn join_with_empty_part_has_no_separator() {
        assert_eq!(join_full_name("Yamada", "", NameJoin::Space), "Yamada");
        assert_eq!(join_full_name("", "Taro", NameJoin::Auto), "Taro");
        assert_eq!(join_full_name("", "", NameJoin::Auto), "");
    }

    #[test]
    fn student_info_derives_num_and_full_name() {
        let s = StudentInfo::new("abc-1234567", "山田", "太郎", NameJoin::Auto, 0.8, "a.png");
        assert_eq!(s.student_id_num, "1234567");
        assert_eq!(s.full_name, "山田太郎");
        assert_eq!(s.file_name, "a.png");
    }

    #[test]
    fn bounding_box_overlaps() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 4.0, 20.0, 12.0);
        assert_eq!(a.vertical_overlap(&b), 6.0);
        assert_eq!(a.horizontal_overlap(&b), 5.0);
        let c = BoundingBox::new(0.0, 20.0, 10.0, 30.0);
        assert_eq!(a.vertical_overlap(&c), 0.0);
        assert_eq!(a.union(&c), BoundingBox::new(0.0, 0.0, 10.0, 30.0));
    }

    #[test]
    fn cjk_detection() {
        assert!(contains_cjk("山田"));
        assert!(contains_cjk("やまだ"));
        assert!(contains_cjk("김"));
        assert!(!contains_cjk("Yamada"));
    }

    #[test]
    fn merge_duplicates_keeps_first_position_and_best_confidence() {
        let batch = BatchResult {
            batch_id: BatchId::new(),
            students: vec![
                record("1111111", 0.7, "a.png"),
                record("2222222", 0.9, "a.png"),
                record("1111111", 0.95, "b.png"),
                record("2222222", 0.9, "b.png"),
            ],
            warnings: Vec::new(),
            files_processed: 2,
            completed_at: Utc::now(),
        };

        let merged = batch.merge_duplicates();
        assert_eq!(merged.students.len(), 2);
        assert_eq!(merged.students[0].student_id_num, "1111111");
        assert_eq!(merged.students[0].file_name, "b.png");
        // Tie keeps the earlier record.
        assert_eq!(merged.students[1].file_name, "a.png");
    }
}
