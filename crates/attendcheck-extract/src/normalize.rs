// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Token normalizer — width folding, whitespace cleanup, and the confusable
// glyph table used for numeric ID candidates.

use attendcheck_core::error::{AttendCheckError, Result};
use attendcheck_core::types::{NormalizedToken, RawToken};
use tracing::{debug, trace};

/// Normalize every token of one file, dropping the ones that cannot be used.
///
/// The output is never longer than the input and keeps the input order.
pub fn normalize_tokens(tokens: Vec<RawToken>) -> Vec<NormalizedToken> {
    let total = tokens.len();
    let normalized: Vec<NormalizedToken> = tokens
        .into_iter()
        .filter_map(|token| match normalize_token(token) {
            Ok(token) => Some(token),
            Err(err) => {
                trace!(error = %err, "token dropped");
                None
            }
        })
        .collect();

    if normalized.len() < total {
        debug!(dropped = total - normalized.len(), kept = normalized.len(), "tokens normalized");
    }
    normalized
}

/// Normalize a single token.
///
/// Fails with [`AttendCheckError::NormalizationFailure`] when the confidence is
/// zero, negative, or not a number, or when no text survives cleanup.
pub fn normalize_token(mut token: RawToken) -> Result<NormalizedToken> {
    if !token.confidence.is_finite() || token.confidence <= 0.0 {
        return Err(AttendCheckError::NormalizationFailure(format!(
            "confidence {} for {:?}",
            token.confidence, token.text
        )));
    }
    token.confidence = token.confidence.min(1.0);

    let normalized_text = collapse_whitespace(&fold_width(&token.text));
    if normalized_text.is_empty() {
        return Err(AttendCheckError::NormalizationFailure(format!(
            "no text left in {:?}",
            token.text
        )));
    }

    Ok(NormalizedToken {
        raw: token,
        normalized_text,
    })
}

/// Full-width forms of U+FF61..=U+FF9F, in code point order.
const HALF_WIDTH_KANA: &str = "。「」、・ヲァィゥェォャュョッーアイウエオカキクケコサシスセソタチツテトナニヌネノハヒフヘホマミムメモヤユヨラリルレロワン゛゜";

const VOICED_MARK: char = '\u{FF9E}';
const SEMI_VOICED_MARK: char = '\u{FF9F}';

/// Fold full-width ASCII variants to their half-width forms, half-width
/// katakana to full-width (combining ﾞ and ﾟ into the preceding kana), and the
/// ideographic space to a plain space. Zero-width and control characters are
/// removed.
pub fn fold_width(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{3000}' => out.push(' '),
            '\u{FF01}'..='\u{FF5E}' => out.extend(char::from_u32(c as u32 - 0xFEE0)),
            VOICED_MARK | SEMI_VOICED_MARK => {
                let voiced = out
                    .chars()
                    .next_back()
                    .and_then(|prev| voice(prev, c == SEMI_VOICED_MARK));
                match voiced {
                    Some(kana) => {
                        out.pop();
                        out.push(kana);
                    }
                    None => out.extend(full_width_kana(c)),
                }
            }
            '\u{FF61}'..='\u{FF9D}' => out.extend(full_width_kana(c)),
            '\u{200B}'..='\u{200D}' | '\u{FEFF}' => {}
            c if c.is_control() => out.push(' '),
            c => out.push(c),
        }
    }
    out
}

fn full_width_kana(c: char) -> Option<char> {
    HALF_WIDTH_KANA.chars().nth((c as u32).checked_sub(0xFF61)? as usize)
}

/// ｶ + ﾞ → ガ, ﾊ + ﾟ → パ.
fn voice(kana: char, semi: bool) -> Option<char> {
    let offset = match (kana, semi) {
        ('ウ', false) => return Some('ヴ'),
        ('カ'..='チ', false) if (kana as u32 - 'カ' as u32) % 2 == 0 => 1,
        ('ツ' | 'テ' | 'ト', false) => 1,
        ('ハ'..='ホ', _) if (kana as u32 - 'ハ' as u32) % 3 == 0 => {
            if semi { 2 } else { 1 }
        }
        _ => return None,
    };
    char::from_u32(kana as u32 + offset)
}

/// Trim and collapse every whitespace run to one space.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Map glyphs commonly mis-read inside digit runs to the digit they stand for.
///
/// Only meant for text already known to be a numeric ID candidate: applied to
/// a name it would turn "Sato" into "5at0".
pub fn correct_confusables(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'O' | 'o' | 'Q' | 'D' => '0',
            'I' | 'l' | '|' | 'i' | '!' => '1',
            'Z' | 'z' => '2',
            'S' | 's' => '5',
            'B' => '8',
            'G' | 'b' => '6',
            'g' | 'q' => '9',
            'T' => '7',
            c => c,
        })
        .collect()
}

/// Whether at least 60% of the alphanumeric characters in `text` are digits.
pub fn is_digit_heavy(text: &str) -> bool {
    let (digits, alnum) = text.chars().fold((0usize, 0usize), |(d, a), c| {
        if c.is_ascii_digit() {
            (d + 1, a + 1)
        } else if c.is_alphanumeric() || c == '|' || c == '!' {
            (d, a + 1)
        } else {
            (d, a)
        }
    });
    alnum > 0 && digits * 5 >= alnum * 3
}

#[cfg(test)]
mod tests {
    use super::*;
    use attendcheck_core::types::BoundingBox;

    fn raw(text: &str, confidence: f32) -> RawToken {
        RawToken::new(text, BoundingBox::new(0.0, 0.0, 10.0, 10.0), confidence)
    }

    #[test]
    fn full_width_is_folded() {
        assert_eq!(fold_width("ＩＤ：２０２３１２３４"), "ID:20231234");
        assert_eq!(fold_width("山田\u{3000}太郎"), "山田 太郎");
    }

    #[test]
    fn half_width_katakana_is_widened() {
        assert_eq!(fold_width("ﾔﾏﾀﾞ ﾀﾛｳ"), "ヤマダ タロウ");
        assert_eq!(fold_width("ﾊﾟｸ ｳﾞｨｰ"), "パク ヴィー");
        assert_eq!(fold_width("ﾞｱ"), "゛ア");
        assert_eq!(fold_width("ﾔﾏﾀﾞ"), fold_width("ヤマダ"));
    }

    #[test]
    fn whitespace_is_collapsed_and_trimmed() {
        assert_eq!(collapse_whitespace("  Yamada \t  Taro \n"), "Yamada Taro");
    }

    #[test]
    fn zero_width_characters_are_removed() {
        assert_eq!(fold_width("Ya\u{200B}mada\u{FEFF}"), "Yamada");
    }

    #[test]
    fn zero_confidence_token_is_dropped() {
        assert!(matches!(
            normalize_token(raw("Yamada", 0.0)),
            Err(AttendCheckError::NormalizationFailure(_))
        ));
        assert!(normalize_token(raw("Yamada", f32::NAN)).is_err());
    }

    #[test]
    fn blank_token_is_dropped() {
        assert!(normalize_token(raw(" \u{3000} ", 0.9)).is_err());
    }

    #[test]
    fn confidence_is_clamped() {
        let token = normalize_token(raw("Taro", 1.5)).expect("normalized");
        assert_eq!(token.confidence(), 1.0);
    }

    #[test]
    fn normalize_tokens_keeps_order_and_drops_failures() {
        let tokens = vec![raw("A", 0.9), raw("", 0.9), raw("B", 0.0), raw("Ｃ", 0.5)];
        let texts: Vec<String> = normalize_tokens(tokens)
            .into_iter()
            .map(|t| t.normalized_text)
            .collect();
        assert_eq!(texts, vec!["A", "C"]);
    }

    #[test]
    fn confusables_map_to_digits() {
        assert_eq!(correct_confusables("2O23l234"), "20231234");
        assert_eq!(correct_confusables("I2S4B6"), "125486");
    }

    #[test]
    fn digit_heavy_detection() {
        assert!(is_digit_heavy("2O23l234"));
        assert!(is_digit_heavy("1234567"));
        assert!(!is_digit_heavy("Yamada"));
        assert!(!is_digit_heavy("Sato1"));
        assert!(!is_digit_heavy("--"));
    }
}
