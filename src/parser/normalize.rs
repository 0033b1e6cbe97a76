//! Surface normalization and word scanning.
//!
//! Scanning splits the raw instruction into words, numbers, and the few
//! punctuation marks the grammar cares about, keeping byte spans into the
//! original text so every later stage can point back at what the user typed.
//! Folding happens per word; the original string is never rewritten.

use nom::branch::alt;
use nom::bytes::complete::take_while1;
use nom::character::complete::anychar;
use nom::combinator::{map, recognize};
use nom::sequence::pair;
use nom::IResult;
use unicode_normalization::UnicodeNormalization;

use super::token::Span;

/// NFKC-fold and lowercase a surface form for lexicon and symbol matching.
/// Apostrophes and hyphens are dropped so "don't" and "counter-melody" meet
/// their canonical spellings.
pub fn casefold(value: &str) -> String {
    value
        .nfkc()
        .flat_map(|c| c.to_lowercase())
        .filter(|c| *c != '\'' && *c != '\u{2019}' && *c != '-')
        .collect()
}

/// One scanned unit, before lexicon lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct RawWord {
    pub surface: String,
    pub folded: String,
    pub shape: WordShape,
    pub span: Span,
}

/// Rough shape of a scanned unit, guiding token classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordShape {
    Word,
    Number,
    Comma,
    Slash,
}

fn is_word_char(c: char) -> bool {
    c.is_alphabetic() || c == '\'' || c == '\u{2019}' || c == '-' || c == '#'
}

fn number(input: &str) -> IResult<&str, (&str, WordShape)> {
    map(
        recognize(pair(
            take_while1(|c: char| c.is_ascii_digit()),
            nom::combinator::opt(pair(
                nom::character::complete::char('.'),
                take_while1(|c: char| c.is_ascii_digit()),
            )),
        )),
        |s| (s, WordShape::Number),
    )(input)
}

fn word(input: &str) -> IResult<&str, (&str, WordShape)> {
    // A trailing digit run stays attached so note names ("c2", "f#4") scan
    // as one unit.
    map(
        recognize(pair(
            take_while1(is_word_char),
            nom::bytes::complete::take_while(|c: char| c.is_ascii_digit()),
        )),
        |s| (s, WordShape::Word),
    )(input)
}

fn comma(input: &str) -> IResult<&str, (&str, WordShape)> {
    map(nom::bytes::complete::tag(","), |s| (s, WordShape::Comma))(input)
}

fn slash(input: &str) -> IResult<&str, (&str, WordShape)> {
    map(nom::bytes::complete::tag("/"), |s| (s, WordShape::Slash))(input)
}

fn unit(input: &str) -> IResult<&str, (&str, WordShape)> {
    alt((number, word, comma, slash))(input)
}

/// Split an instruction into scanned units with byte spans.
///
/// Whitespace and punctuation outside the kept set are skipped. Scanning
/// never fails; unrecognizable bytes are simply passed over.
pub fn scan(input: &str) -> Vec<RawWord> {
    let mut out = Vec::new();
    let mut rest = input;
    while !rest.is_empty() {
        let consumed = input.len() - rest.len();
        match unit(rest) {
            Ok((remaining, (surface, shape))) => {
                let span = Span::new(consumed, consumed + surface.len());
                out.push(RawWord {
                    surface: surface.to_string(),
                    folded: casefold(surface),
                    shape,
                    span,
                });
                rest = remaining;
            }
            Err(_) => {
                // Not a unit start: drop one char and continue.
                match anychar::<&str, nom::error::Error<&str>>(rest) {
                    Ok((remaining, _)) => rest = remaining,
                    Err(_) => break,
                }
            }
        }
    }
    out
}
