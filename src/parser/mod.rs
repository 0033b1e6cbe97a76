//! Front half of the instruction pipeline: text in, ranked readings out.
//!
//! ```text
//!   "make the chorus brighter"
//!        |
//!        v
//!   normalize::scan      words with byte spans, casefolded
//!        |
//!        v
//!   token::tokenize      lexicon lookup, numbers, note names
//!        |
//!        v
//!   forest::parse        every grammatical reading, scored
//!        |
//!        v
//!   disambig::disambiguate   clear winner, tie, or no parse
//! ```
//!
//! Everything here is deterministic and offline. The same utterance against
//! the same lexicon always yields the same verdict.

pub mod disambig;
pub mod forest;
pub mod grammar;
pub mod normalize;
pub mod token;

pub use disambig::ParseVerdict;
pub use forest::ParseForest;
pub use token::{Span, Token};

use crate::canon::lexicon::Lexicon;
use crate::config::CompilerConfig;

// ============================================================================
// Facade
// ============================================================================

/// Everything the later stages need from the parse of one utterance.
#[derive(Debug)]
pub struct ParseAnalysis {
    pub tokens: Vec<Token>,
    pub forest: ParseForest,
    pub verdict: ParseVerdict,
}

/// Run the full front half over one utterance.
pub fn analyze(utterance: &str, lexicon: &Lexicon, config: &CompilerConfig) -> ParseAnalysis {
    let words = normalize::scan(utterance);
    let tokens = token::tokenize(&words, lexicon);
    let forest = forest::parse(&tokens, config);
    let verdict = disambig::disambiguate(&forest, config);
    ParseAnalysis {
        tokens,
        forest,
        verdict,
    }
}

/// Tokens the lexicon could not account for. Articles and other trivia get
/// lexicon entries, so a leftover opaque word is worth telling the user about.
pub fn unknown_words(tokens: &[Token]) -> Vec<&Token> {
    tokens.iter().filter(|t| t.is_opaque()).collect()
}

/// Closest vocabulary spellings to an unknown word, best first. The pool
/// covers inflected forms too, so "brigther" finds "brighter".
pub fn suggest_surfaces(word: &str, lexicon: &Lexicon, config: &CompilerConfig) -> Vec<String> {
    let mut scored: Vec<(String, f64)> = lexicon
        .suggestion_surfaces()
        .into_iter()
        .map(|surface| {
            let score = strsim::jaro_winkler(word, &surface);
            (surface, score)
        })
        .filter(|(_, score)| *score >= config.suggestion_threshold)
        .collect();
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    scored.truncate(config.max_suggestions);
    scored.into_iter().map(|(surface, _)| surface).collect()
}

/// Among several unknown words, the one most likely to be a typo of a
/// vocabulary word, with its suggestions. Opaque words far from every
/// surface (project names like "chorus") lose to near misses.
pub fn best_typo_candidate<'a>(
    unknown: &[&'a Token],
    lexicon: &Lexicon,
    config: &CompilerConfig,
) -> Option<(&'a Token, Vec<String>)> {
    let mut best: Option<(&'a Token, Vec<String>, f64)> = None;
    for word in unknown {
        let suggestions = suggest_surfaces(&word.folded, lexicon, config);
        let Some(top) = suggestions.first() else {
            continue;
        };
        let score = strsim::jaro_winkler(&word.folded, top);
        if best.as_ref().is_none_or(|(_, _, s)| score > *s) {
            best = Some((word, suggestions, score));
        }
    }
    best.map(|(word, suggestions, _)| (word, suggestions))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::CanonBundle;

    #[test]
    fn test_analyze_end_to_end() {
        let canon = CanonBundle::embedded().unwrap();
        let analysis = analyze(
            "make the chorus brighter",
            &canon.lexicon,
            &CompilerConfig::default(),
        );
        assert_eq!(analysis.tokens.len(), 4);
        assert!(matches!(analysis.verdict, ParseVerdict::Selected { .. }));
    }

    #[test]
    fn test_unknown_words_surface_typos() {
        let canon = CanonBundle::embedded().unwrap();
        let analysis = analyze(
            "make the chorus brigther",
            &canon.lexicon,
            &CompilerConfig::default(),
        );
        // Both the project name and the typo are opaque to the lexicon.
        let unknown = unknown_words(&analysis.tokens);
        let folded: Vec<&str> = unknown.iter().map(|t| t.folded.as_str()).collect();
        assert_eq!(folded, vec!["chorus", "brigther"]);
    }

    #[test]
    fn test_typo_candidate_beats_project_name() {
        let canon = CanonBundle::embedded().unwrap();
        let config = CompilerConfig::default();
        let analysis = analyze("make the chorus brigther", &canon.lexicon, &config);
        let unknown = unknown_words(&analysis.tokens);
        let (word, suggestions) =
            best_typo_candidate(&unknown, &canon.lexicon, &config).unwrap();
        assert_eq!(word.folded, "brigther");
        assert!(
            suggestions.iter().any(|s| s == "brighter"),
            "got {:?}",
            suggestions
        );
    }

    #[test]
    fn test_suggestions_recover_typo() {
        let canon = CanonBundle::embedded().unwrap();
        let suggestions = suggest_surfaces("brigther", &canon.lexicon, &CompilerConfig::default());
        assert!(
            suggestions.iter().any(|s| s == "brighter"),
            "got {:?}",
            suggestions
        );
    }

    #[test]
    fn test_suggestions_empty_for_distant_word() {
        let canon = CanonBundle::embedded().unwrap();
        let suggestions = suggest_surfaces("xylophone", &canon.lexicon, &CompilerConfig::default());
        assert!(suggestions.len() <= CompilerConfig::default().max_suggestions);
        assert!(!suggestions.iter().any(|s| s == "brighter"));
    }
}
