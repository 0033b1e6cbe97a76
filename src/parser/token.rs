//! Tokens: scanned words joined with lexicon senses.
//!
//! Unknown words are not errors. They become opaque tokens and flow onward,
//! because an unknown word is usually a project name ("the chorus", "the arp
//! pad") that only the resolver can judge.

use crate::canon::lexicon::{DegreeMark, LexEntry, Lexicon};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::normalize::{RawWord, WordShape};

// ============================================================================
// Spans
// ============================================================================

/// Byte range into the original instruction text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both.
    pub fn merge(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }

    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        text.get(self.start..self.end).unwrap_or("")
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

// ============================================================================
// Tokens
// ============================================================================

/// What the tokenizer decided a word is.
#[derive(Debug, Clone, PartialEq)]
pub enum Lexeme {
    /// A lexicon word, with its full entry sense.
    Known(LexEntry),
    /// A literal number.
    Number(f64),
    /// A note name like c2 or f#3, as a MIDI pitch.
    Note(u8),
    Comma,
    Slash,
    /// Not in the lexicon. Kept verbatim for name resolution.
    Opaque,
}

/// One token with its surface form, folded form, span, and degree morphology.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub lexeme: Lexeme,
    pub surface: String,
    pub folded: String,
    pub span: Span,
    pub degree: DegreeMark,
}

impl Token {
    pub fn entry(&self) -> Option<&LexEntry> {
        match &self.lexeme {
            Lexeme::Known(entry) => Some(entry),
            _ => None,
        }
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self.lexeme, Lexeme::Opaque)
    }

    pub fn number(&self) -> Option<f64> {
        match self.lexeme {
            Lexeme::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn note_pitch(&self) -> Option<u8> {
        match self.lexeme {
            Lexeme::Note(p) => Some(p),
            _ => None,
        }
    }
}

/// Parse a note name such as "c2", "f#3", or "eb4" into a MIDI pitch.
/// Octave numbering follows the convention where c4 is middle C (60).
fn note_pitch(folded: &str) -> Option<u8> {
    let mut chars = folded.chars();
    let letter = chars.next()?;
    let base: i32 = match letter {
        'c' => 0,
        'd' => 2,
        'e' => 4,
        'f' => 5,
        'g' => 7,
        'a' => 9,
        'b' => 11,
        _ => return None,
    };
    let rest: String = chars.collect();
    let (accidental, octave_str) = if let Some(stripped) = rest.strip_prefix('#') {
        (1, stripped)
    } else if let Some(stripped) = rest.strip_prefix('b') {
        (-1, stripped)
    } else {
        (0, rest.as_str())
    };
    if octave_str.is_empty() || octave_str.len() > 1 {
        return None;
    }
    let octave: i32 = octave_str.parse().ok()?;
    let pitch = (octave + 1) * 12 + base + accidental;
    u8::try_from(pitch).ok()
}

/// Turn scanned words into tokens against a lexicon.
pub fn tokenize(words: &[RawWord], lexicon: &Lexicon) -> Vec<Token> {
    words
        .iter()
        .map(|word| {
            let (lexeme, degree) = match word.shape {
                WordShape::Number => (
                    Lexeme::Number(word.surface.parse().unwrap_or(0.0)),
                    DegreeMark::Positive,
                ),
                WordShape::Comma => (Lexeme::Comma, DegreeMark::Positive),
                WordShape::Slash => (Lexeme::Slash, DegreeMark::Positive),
                WordShape::Word => match lexicon.lookup_inflected(&word.folded) {
                    Some((entry, mark)) => (Lexeme::Known(entry.clone()), mark),
                    None => match note_pitch(&word.folded) {
                        Some(pitch) => (Lexeme::Note(pitch), DegreeMark::Positive),
                        None => (Lexeme::Opaque, DegreeMark::Positive),
                    },
                },
            };
            Token {
                lexeme,
                surface: word.surface.clone(),
                folded: word.folded.clone(),
                span: word.span,
                degree,
            }
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::lexicon::LexCategory;
    use crate::canon::CanonBundle;
    use crate::parser::normalize::scan;

    fn tokens(text: &str) -> Vec<Token> {
        let canon = CanonBundle::embedded().unwrap();
        tokenize(&scan(text), &canon.lexicon)
    }

    #[test]
    fn test_comparative_keeps_surface_and_span() {
        let toks = tokens("make the chorus brighter");
        let last = toks.last().unwrap();
        assert_eq!(last.surface, "brighter");
        assert_eq!(last.degree, DegreeMark::Comparative);
        let entry = last.entry().unwrap();
        assert_eq!(entry.lexeme.as_str(), "bright");
    }

    #[test]
    fn test_unknown_word_is_opaque() {
        let toks = tokens("make the chorus brighter");
        assert!(toks[2].is_opaque());
        assert_eq!(toks[2].folded, "chorus");
    }

    #[test]
    fn test_numbers_and_meter_slash() {
        let toks = tokens("keep it in 4/4");
        assert_eq!(toks[3].number(), Some(4.0));
        assert_eq!(toks[4].lexeme, Lexeme::Slash);
        assert_eq!(toks[5].number(), Some(4.0));
    }

    #[test]
    fn test_note_names() {
        assert_eq!(note_pitch("c4"), Some(60));
        assert_eq!(note_pitch("a4"), Some(69));
        assert_eq!(note_pitch("f#3"), Some(54));
        assert_eq!(note_pitch("eb2"), Some(39));
        assert_eq!(note_pitch("h2"), None);
        assert_eq!(note_pitch("c"), None);
    }

    #[test]
    fn test_note_token_in_context() {
        let toks = tokens("keep the bass within c2 to c4");
        let notes: Vec<u8> = toks.iter().filter_map(|t| t.note_pitch()).collect();
        assert_eq!(notes, vec![36, 60]);
    }

    #[test]
    fn test_negation_contraction() {
        let toks = tokens("don't touch the drums");
        let entry = toks[0].entry().unwrap();
        assert_eq!(entry.category, LexCategory::Negation);
    }
}
