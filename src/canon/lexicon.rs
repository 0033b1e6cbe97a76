//! Canonical lexicon: surface words to lexemes with senses.
//!
//! The lexicon is canon data loaded from YAML, not code. Each entry names a
//! canonical lexeme, the grammatical category the parser should treat it as,
//! and whatever sense payload applies (axis and polarity for "bright", a
//! layer role for "melody", an amount for "slightly"). Comparative and
//! superlative inflections are reduced here so "brighter" finds "bright".

use super::axis::{Amount, Axis, Direction, Element, PreserveMode};
use crate::error::CanonError;
use crate::project::LayerRole;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// Lexeme identity
// ============================================================================

/// Canonical identity of a vocabulary word.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LexemeId(pub String);

impl LexemeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LexemeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Degree marking recovered from inflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegreeMark {
    Positive,
    Comparative,
    Superlative,
}

// ============================================================================
// Categories
// ============================================================================

/// Grammatical category of a lexicon entry. Closed set: the grammar only has
/// rules for these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LexCategory {
    /// Axis-bearing adjective ("bright").
    AxisAdjective,
    /// Axis-bearing verb ("brighten").
    AxisVerb,
    /// Usable both ways ("slow", "thin").
    AxisWord,
    /// Axis name used as a noun ("brightness", "tempo").
    AxisNoun,
    RoleNoun,
    ElementNoun,
    CausativeVerb,
    IncreaseVerb,
    DecreaseVerb,
    SetVerb,
    IntroduceVerb,
    RemoveVerb,
    PreserveVerb,
    ChangeVerb,
    ShowVerb,
    ExplainVerb,
    UndoVerb,
    RedoVerb,
    DoVerb,
    BringVerb,
    PreferVerb,
    DegreeWord,
    MoreWord,
    LessWord,
    ThanWord,
    PreserveModeWord,
    OnlyWord,
    Negation,
    Determiner,
    Pronoun,
    ConjunctionAnd,
    ConjunctionBut,
    Particle,
    BarWord,
    TempoUnit,
    EditsNoun,
    SectionWord,
    LayerWord,
    AgainWord,
    Preposition,
}

// ============================================================================
// Entries
// ============================================================================

/// A lexicon entry with its full sense payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexEntry {
    pub lexeme: LexemeId,
    pub category: LexCategory,
    #[serde(default)]
    pub axis: Option<Axis>,
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(default)]
    pub role: Option<LayerRole>,
    #[serde(default)]
    pub element: Option<Element>,
    #[serde(default)]
    pub amount: Option<Amount>,
    #[serde(default)]
    pub mode: Option<PreserveMode>,
}

#[derive(Debug, Deserialize)]
struct LexEntrySpec {
    lexeme: String,
    category: LexCategory,
    #[serde(default)]
    surfaces: Vec<String>,
    #[serde(default)]
    axis: Option<Axis>,
    #[serde(default)]
    direction: Option<Direction>,
    #[serde(default)]
    role: Option<LayerRole>,
    #[serde(default)]
    element: Option<Element>,
    #[serde(default)]
    amount: Option<Amount>,
    #[serde(default)]
    mode: Option<PreserveMode>,
}

#[derive(Debug, Deserialize)]
struct LexiconSpec {
    version: String,
    entries: Vec<LexEntrySpec>,
}

// ============================================================================
// Lexicon
// ============================================================================

/// Loaded, validated lexicon.
#[derive(Debug, Clone)]
pub struct Lexicon {
    version: String,
    entries: Vec<LexEntry>,
    by_surface: HashMap<String, usize>,
}

impl Lexicon {
    /// Parse and validate lexicon YAML.
    pub fn from_yaml(source: &str, file: &str) -> Result<Self, CanonError> {
        let spec: LexiconSpec = serde_yaml::from_str(source).map_err(|e| CanonError::Parse {
            file: file.to_string(),
            source: e,
        })?;
        let mut entries: Vec<LexEntry> = Vec::with_capacity(spec.entries.len());
        let mut by_surface: HashMap<String, usize> = HashMap::new();
        for entry_spec in spec.entries {
            let index = entries.len();
            let entry = LexEntry {
                lexeme: LexemeId(entry_spec.lexeme.clone()),
                category: entry_spec.category,
                axis: entry_spec.axis,
                direction: entry_spec.direction,
                role: entry_spec.role,
                element: entry_spec.element,
                amount: entry_spec.amount,
                mode: entry_spec.mode,
            };
            let mut surfaces = entry_spec.surfaces;
            if !surfaces.iter().any(|s| s == &entry_spec.lexeme) {
                surfaces.push(entry_spec.lexeme.clone());
            }
            for surface in surfaces {
                let folded = crate::parser::normalize::casefold(&surface);
                if let Some(prev) = by_surface.insert(folded.clone(), index) {
                    return Err(CanonError::DuplicateSurface {
                        surface: folded,
                        first: entries[prev].lexeme.0.clone(),
                        second: entry_spec.lexeme,
                    });
                }
            }
            entries.push(entry);
        }
        Ok(Self {
            version: spec.version,
            entries,
            by_surface,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact lookup of a folded surface form.
    pub fn lookup(&self, folded: &str) -> Option<&LexEntry> {
        self.by_surface.get(folded).map(|i| &self.entries[*i])
    }

    /// Lookup with comparative/superlative reduction. Returns the entry and
    /// the degree recovered from the inflection.
    pub fn lookup_inflected(&self, folded: &str) -> Option<(&LexEntry, DegreeMark)> {
        if let Some(entry) = self.lookup(folded) {
            return Some((entry, DegreeMark::Positive));
        }
        for (suffix, mark) in [("er", DegreeMark::Comparative), ("est", DegreeMark::Superlative)] {
            if let Some(stem) = folded.strip_suffix(suffix) {
                if stem.len() < 2 {
                    continue;
                }
                for candidate in Self::stem_candidates(stem) {
                    if let Some(entry) = self.lookup(&candidate) {
                        if matches!(
                            entry.category,
                            LexCategory::AxisAdjective | LexCategory::AxisWord
                        ) {
                            return Some((entry, mark));
                        }
                    }
                }
            }
        }
        None
    }

    /// Spelling variants a comparative stem may correspond to:
    /// "bright", "larg"+e, "busi"->"busy", "bigg"->"big".
    fn stem_candidates(stem: &str) -> Vec<String> {
        let mut out = vec![stem.to_string(), format!("{}e", stem)];
        if let Some(prefix) = stem.strip_suffix('i') {
            out.push(format!("{}y", prefix));
        }
        let chars: Vec<char> = stem.chars().collect();
        if chars.len() >= 2 && chars[chars.len() - 1] == chars[chars.len() - 2] {
            out.push(chars[..chars.len() - 1].iter().collect());
        }
        out
    }

    /// The axis an adjective or axis-noun lexeme names, if any.
    pub fn axis_for(&self, lexeme: &LexemeId) -> Option<Axis> {
        self.entries
            .iter()
            .find(|e| &e.lexeme == lexeme)
            .and_then(|e| e.axis.clone())
    }

    /// All surfaces a suggestion may point at: every base surface plus the
    /// comparative and superlative spellings of gradable ones, so a typo
    /// like "brigther" can land on "brighter".
    pub fn suggestion_surfaces(&self) -> Vec<String> {
        let mut out: Vec<String> = self.by_surface.keys().cloned().collect();
        for (surface, index) in &self.by_surface {
            if matches!(
                self.entries[*index].category,
                LexCategory::AxisAdjective | LexCategory::AxisWord
            ) {
                out.push(Self::inflect(surface, "er"));
                out.push(Self::inflect(surface, "est"));
            }
        }
        out.sort();
        out.dedup();
        out
    }

    /// Attach a degree suffix with the usual spelling adjustments:
    /// "sparse"+er -> "sparser", "busy"+er -> "busier", "thin"+er ->
    /// "thinner". The result round-trips through `lookup_inflected`.
    fn inflect(surface: &str, suffix: &str) -> String {
        let chars: Vec<char> = surface.chars().collect();
        let n = chars.len();
        let is_vowel = |c: char| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u');
        if surface.ends_with('e') {
            return format!("{}{}", &surface[..surface.len() - 1], suffix);
        }
        if n >= 2 && surface.ends_with('y') && !is_vowel(chars[n - 2]) {
            return format!("{}i{}", &surface[..surface.len() - 1], suffix);
        }
        if n >= 3 {
            let last = chars[n - 1];
            if !is_vowel(last)
                && !matches!(last, 'w' | 'x' | 'y')
                && is_vowel(chars[n - 2])
                && !is_vowel(chars[n - 3])
            {
                return format!("{}{}{}", surface, last, suffix);
            }
        }
        format!("{}{}", surface, suffix)
    }
}

// ============================================================================
// Tests
// ============================================================================
