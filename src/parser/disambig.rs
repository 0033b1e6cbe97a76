//! Margin-based selection among competing readings.
//!
//! The forest ranks whole-utterance readings by score. A reading is selected
//! outright only when it beats every rival by at least the configured margin;
//! readings inside the margin are genuinely competitive and must survive to
//! the composer, which either collapses them into one identical intent or
//! surfaces the difference as a clarification question. Guessing between
//! close readings is never an option.

use crate::config::CompilerConfig;

use super::forest::ParseForest;

// ============================================================================
// Verdict
// ============================================================================

/// Outcome of ranking a forest's roots, holding node indices into the forest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseVerdict {
    /// No reading covered the whole utterance.
    NoParse,
    /// One reading stood clear of every rival.
    Selected { root: usize },
    /// Two or more readings scored within the margin, best first.
    Ambiguous { roots: Vec<usize> },
}

// ============================================================================
// Selection
// ============================================================================

/// Rank the forest's roots and apply the margin rule.
pub fn disambiguate(forest: &ParseForest, config: &CompilerConfig) -> ParseVerdict {
    let mut ranked: Vec<(usize, f32)> = forest
        .roots
        .iter()
        .map(|&i| (i, forest.nodes[i].priority))
        .collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    let Some(&(best, best_score)) = ranked.first() else {
        return ParseVerdict::NoParse;
    };
    let mut contenders = vec![best];
    contenders.extend(
        ranked[1..]
            .iter()
            .take_while(|(_, score)| best_score - score < config.disambig_margin)
            .map(|&(i, _)| i),
    );
    if contenders.len() == 1 {
        ParseVerdict::Selected { root: best }
    } else {
        ParseVerdict::Ambiguous { roots: contenders }
    }
}

// ============================================================================
// Tests
// ============================================================================
