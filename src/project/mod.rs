//! Typed project model: snapshots, identifiers, and the symbol table.
//!
//! The compiler never holds a live connection to the host application. It
//! works from an immutable [`model::ProjectSnapshot`] taken at the start of a
//! request, addresses entities through typed ids, and resolves names through
//! the read-only [`SymbolTable`] derived from the snapshot.

pub mod diff;
pub mod model;

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Typed identifiers
// ============================================================================

macro_rules! typed_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Deterministically derive an id from a parent id and a tag.
            /// Used when an edit manufactures new entities so that compiling
            /// the same plan twice yields identical packages.
            pub fn derived(parent: Uuid, tag: &str) -> Self {
                let mut seed = parent.as_bytes().to_vec();
                seed.extend_from_slice(tag.as_bytes());
                Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, &seed))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

typed_id!(
    /// Identifies a named section of the timeline.
    SectionId
);
typed_id!(
    /// Identifies a layer (a track-like lane of events with a role).
    LayerId
);
typed_id!(
    /// Identifies a card in a layer's processing chain.
    CardId
);
typed_id!(
    /// Identifies a single note event.
    EventId
);
typed_id!(
    /// Identifies a compiled edit package.
    PackageId
);
typed_id!(
    /// Identifies a dialogue session.
    SessionId
);

// ============================================================================
// Layer roles
// ============================================================================

/// Musical function of a layer. Role words in instructions ("the melody",
/// "the drums") resolve against these rather than against display names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerRole {
    Melody,
    Countermelody,
    Harmony,
    Bass,
    Drums,
    Pads,
    Lead,
    Fx,
}

impl fmt::Display for LayerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LayerRole::Melody => "melody",
            LayerRole::Countermelody => "countermelody",
            LayerRole::Harmony => "harmony",
            LayerRole::Bass => "bass",
            LayerRole::Drums => "drums",
            LayerRole::Pads => "pads",
            LayerRole::Lead => "lead",
            LayerRole::Fx => "fx",
        };
        write!(f, "{}", name)
    }
}

// ============================================================================
// Symbol table
// ============================================================================

/// A section name visible to reference resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionSymbol {
    pub id: SectionId,
    pub name: String,
}

/// A layer name plus role visible to reference resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSymbol {
    pub id: LayerId,
    pub name: String,
    pub role: LayerRole,
}

/// A card name visible to reference resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardSymbol {
    pub id: CardId,
    pub name: String,
}

/// Read-only view of every addressable name in a project snapshot.
///
/// `revision` pins the symbol table to the snapshot it came from so that
/// clarification continuations can detect a world that moved underneath them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolTable {
    pub revision: u64,
    pub sections: Vec<SectionSymbol>,
    pub layers: Vec<LayerSymbol>,
    pub cards: Vec<CardSymbol>,
}

impl SymbolTable {
    /// Extract the addressable names from a snapshot.
    pub fn from_snapshot(snapshot: &model::ProjectSnapshot) -> Self {
        Self {
            revision: snapshot.revision,
            sections: snapshot
                .sections
                .iter()
                .map(|s| SectionSymbol {
                    id: s.id,
                    name: s.name.clone(),
                })
                .collect(),
            layers: snapshot
                .layers
                .iter()
                .map(|l| LayerSymbol {
                    id: l.id,
                    name: l.name.clone(),
                    role: l.role,
                })
                .collect(),
            cards: snapshot
                .cards
                .values()
                .map(|c| CardSymbol {
                    id: c.id,
                    name: c.name.clone(),
                })
                .collect(),
        }
    }

    /// Sections whose folded name equals the query.
    pub fn sections_named(&self, folded: &str) -> Vec<&SectionSymbol> {
        self.sections
            .iter()
            .filter(|s| crate::parser::normalize::casefold(&s.name) == folded)
            .collect()
    }

    /// Layers whose folded name equals the query.
    pub fn layers_named(&self, folded: &str) -> Vec<&LayerSymbol> {
        self.layers
            .iter()
            .filter(|l| crate::parser::normalize::casefold(&l.name) == folded)
            .collect()
    }

    /// Layers carrying the given role, in declaration order.
    pub fn layers_with_role(&self, role: LayerRole) -> Vec<&LayerSymbol> {
        self.layers.iter().filter(|l| l.role == role).collect()
    }

    /// Every name in the table, for fuzzy suggestion ranking.
    pub fn all_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        names.extend(self.sections.iter().map(|s| s.name.clone()));
        names.extend(self.layers.iter().map(|l| l.name.clone()));
        names.extend(self.cards.iter().map(|c| c.name.clone()));
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_ids_are_distinct_types() {
        let section = SectionId::new();
        let json = serde_json::to_string(&section).unwrap();
        let back: SectionId = serde_json::from_str(&json).unwrap();
        assert_eq!(section, back);
    }

    #[test]
    fn test_derived_ids_are_deterministic() {
        let parent = Uuid::new_v4();
        let a = EventId::derived(parent, "echo:0");
        let b = EventId::derived(parent, "echo:0");
        let c = EventId::derived(parent, "echo:1");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_symbol_table_lookups_fold_case() {
        let table = SymbolTable {
            revision: 1,
            sections: vec![SectionSymbol {
                id: SectionId::new(),
                name: "Chorus".to_string(),
            }],
            layers: vec![LayerSymbol {
                id: LayerId::new(),
                name: "Lead Synth".to_string(),
                role: LayerRole::Lead,
            }],
            cards: vec![],
        };
        assert_eq!(table.sections_named("chorus").len(), 1);
        assert_eq!(table.layers_named("lead synth").len(), 1);
        assert_eq!(table.layers_with_role(LayerRole::Lead).len(), 1);
        assert!(table.layers_with_role(LayerRole::Bass).is_empty());
    }
}
