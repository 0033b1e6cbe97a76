//! Canon data: the closed vocabulary the compiler interprets against.
//!
//! Two tables travel together as a [`CanonBundle`]: the lexicon (surface
//! words to lexemes) and the lever table (goals to action templates). Default
//! copies ship embedded in the binary so the compiler works offline with no
//! setup; hosts can load a different canon directory to swap vocabularies.

pub mod axis;
pub mod lexicon;
pub mod lever;

pub use axis::{Amount, Axis, Direction, Element, PreserveMode};
pub use lexicon::{DegreeMark, LexCategory, LexEntry, LexemeId, Lexicon};
pub use lever::{ActionTemplate, Lever, LeverKey, LeverTable};

use crate::error::CanonError;
use std::path::Path;

const EMBEDDED_LEXICON: &str = include_str!("../../canon/lexicon.yaml");
const EMBEDDED_LEVERS: &str = include_str!("../../canon/levers.yaml");

/// The lexicon and lever table a compiler instance interprets with.
#[derive(Debug, Clone)]
pub struct CanonBundle {
    pub lexicon: Lexicon,
    pub levers: LeverTable,
}

impl CanonBundle {
    /// Load the canon shipped with the crate.
    pub fn embedded() -> Result<Self, CanonError> {
        Ok(Self {
            lexicon: Lexicon::from_yaml(EMBEDDED_LEXICON, "canon/lexicon.yaml")?,
            levers: LeverTable::from_yaml(EMBEDDED_LEVERS, "canon/levers.yaml")?,
        })
    }

    /// Load a canon directory containing `lexicon.yaml` and `levers.yaml`.
    pub fn from_dir(dir: &Path) -> Result<Self, CanonError> {
        let lexicon_path = dir.join("lexicon.yaml");
        let levers_path = dir.join("levers.yaml");
        let lexicon_src =
            std::fs::read_to_string(&lexicon_path).map_err(|e| CanonError::Io {
                file: lexicon_path.display().to_string(),
                source: e,
            })?;
        let levers_src = std::fs::read_to_string(&levers_path).map_err(|e| CanonError::Io {
            file: levers_path.display().to_string(),
            source: e,
        })?;
        Ok(Self {
            lexicon: Lexicon::from_yaml(&lexicon_src, &lexicon_path.display().to_string())?,
            levers: LeverTable::from_yaml(&levers_src, &levers_path.display().to_string())?,
        })
    }

    /// Version string recorded into every edit package, pinning the
    /// vocabulary an interpretation was made under.
    pub fn version(&self) -> String {
        format!("{}+{}", self.lexicon.version(), self.levers.version())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_canon_loads() {
        let canon = CanonBundle::embedded().unwrap();
        assert!(!canon.lexicon.is_empty());
        assert!(!canon.levers.is_empty());
    }

    #[test]
    fn test_embedded_lexicon_covers_core_words() {
        let canon = CanonBundle::embedded().unwrap();
        for word in ["make", "bright", "melody", "keep", "undo", "the"] {
            assert!(
                canon.lexicon.lookup(word).is_some(),
                "embedded lexicon is missing '{}'",
                word
            );
        }
    }

    #[test]
    fn test_every_core_axis_has_both_directions() {
        use crate::canon::axis::{Axis, Direction};
        let canon = CanonBundle::embedded().unwrap();
        for axis in Axis::CORE {
            if axis == Axis::Tempo || axis == Axis::Onset {
                continue;
            }
            for direction in [Direction::Up, Direction::Down] {
                let key = LeverKey::Move {
                    axis: axis.clone(),
                    direction,
                };
                assert!(
                    !canon.levers.matching(&key).is_empty(),
                    "no lever for {} {}",
                    axis,
                    direction
                );
            }
        }
    }

    #[test]
    fn test_version_combines_both_tables() {
        let canon = CanonBundle::embedded().unwrap();
        assert!(canon.version().contains('+'));
    }
}
