//! Snapshot model of the host project.
//!
//! ```text
//!   ProjectSnapshot
//!     |- sections   named, non-overlapping tick ranges
//!     |- layers     role-tagged lanes: params + card chain + events
//!     |- cards      processing cards referenced by layer chains
//!     `- events     note events, kept sorted for stable diffs
//! ```
//!
//! Ticks are integer transport positions at `ppq` pulses per quarter note,
//! matching the host tracker. All scope math happens in ticks.

use super::{CardId, EventId, LayerId, LayerRole, SectionId};
use crate::intent::Scope;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Transport position in pulses.
pub type Tick = i64;

/// Default pulses per quarter note used by fixtures and tests.
pub const DEFAULT_PPQ: Tick = 480;

// ============================================================================
// Vocabulary
// ============================================================================

/// Continuous per-layer parameters addressable by edits.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ParamKey {
    Cutoff,
    Resonance,
    ReverbSend,
    DelaySend,
    Volume,
    Pan,
    Attack,
    Release,
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParamKey::Cutoff => "cutoff",
            ParamKey::Resonance => "resonance",
            ParamKey::ReverbSend => "reverb_send",
            ParamKey::DelaySend => "delay_send",
            ParamKey::Volume => "volume",
            ParamKey::Pan => "pan",
            ParamKey::Attack => "attack",
            ParamKey::Release => "release",
        };
        write!(f, "{}", name)
    }
}

/// Effect card kinds the edit library knows how to insert and remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    HighShelf,
    LowPass,
    Reverb,
    Delay,
    Chorus,
    Saturator,
    Compressor,
    Arpeggiator,
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EffectKind::HighShelf => "high shelf",
            EffectKind::LowPass => "low pass",
            EffectKind::Reverb => "reverb",
            EffectKind::Delay => "delay",
            EffectKind::Chorus => "chorus",
            EffectKind::Saturator => "saturator",
            EffectKind::Compressor => "compressor",
            EffectKind::Arpeggiator => "arpeggiator",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CardKind {
    Instrument,
    Effect { effect: EffectKind },
}

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub name: String,
    pub kind: CardKind,
}

/// A single note event. Pitch is a MIDI note number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub id: EventId,
    pub layer: LayerId,
    pub start: Tick,
    pub duration: Tick,
    pub pitch: u8,
    pub velocity: u8,
}

impl NoteEvent {
    pub fn end(&self) -> Tick {
        self.start + self.duration
    }

    /// Canonical sort key keeping snapshot comparisons stable.
    pub fn sort_key(&self) -> (LayerId, Tick, EventId) {
        (self.layer, self.start, self.id)
    }
}

/// A named slice of the timeline. `end` is exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: SectionId,
    pub name: String,
    pub start: Tick,
    pub end: Tick,
}

impl Section {
    pub fn contains(&self, tick: Tick) -> bool {
        tick >= self.start && tick < self.end
    }
}

/// A role-tagged lane of events with parameters and a card chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub role: LayerRole,
    pub params: BTreeMap<ParamKey, f64>,
    pub chain: Vec<CardId>,
}

/// Bars-per-minute style meter, e.g. 4/4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meter {
    pub numerator: u8,
    pub denominator: u8,
}

impl Meter {
    pub fn new(numerator: u8, denominator: u8) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Ticks in one bar at the given resolution.
    pub fn ticks_per_bar(&self, ppq: Tick) -> Tick {
        let quarters_per_bar = self.numerator as f64 * 4.0 / self.denominator as f64;
        (quarters_per_bar * ppq as f64).round() as Tick
    }
}

impl fmt::Display for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Immutable picture of the project a request compiles against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub revision: u64,
    pub ppq: Tick,
    pub tempo_bpm: f64,
    pub meter: Meter,
    pub sections: Vec<Section>,
    pub layers: Vec<Layer>,
    pub cards: BTreeMap<CardId, Card>,
    pub events: Vec<NoteEvent>,
}

impl ProjectSnapshot {
    /// Restore canonical event ordering after mutation.
    pub fn normalize(&mut self) {
        self.events.sort_by_key(|e| e.sort_key());
    }

    pub fn section(&self, id: SectionId) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == id)
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    /// Layers carrying a role, in declaration order.
    pub fn layers_with_role(&self, role: LayerRole) -> Vec<&Layer> {
        self.layers.iter().filter(|l| l.role == role).collect()
    }

    pub fn event(&self, id: EventId) -> Option<&NoteEvent> {
        self.events.iter().find(|e| e.id == id)
    }

    /// End of the last section, or of the last event if sections are absent.
    pub fn length_ticks(&self) -> Tick {
        let section_end = self.sections.iter().map(|s| s.end).max().unwrap_or(0);
        let event_end = self.events.iter().map(|e| e.end()).max().unwrap_or(0);
        section_end.max(event_end)
    }

    /// Tick range covered by a scope. Layer and event scopes span the whole
    /// timeline; their restriction happens by entity, not by range.
    pub fn scope_range(&self, scope: &Scope) -> (Tick, Tick) {
        match scope {
            Scope::Section { id } => self
                .section(*id)
                .map(|s| (s.start, s.end))
                .unwrap_or((0, self.length_ticks())),
            Scope::GlobalRange { start, end } => (*start, *end),
            Scope::Layer { .. } | Scope::EventSelection { .. } => (0, self.length_ticks()),
        }
    }

    /// Whether a scope covers the entire timeline.
    pub fn scope_is_global(&self, scope: &Scope) -> bool {
        let (start, end) = self.scope_range(scope);
        start <= 0 && end >= self.length_ticks()
    }

    /// Events a scope selects, in canonical order.
    pub fn events_in_scope<'a>(&'a self, scope: &'a Scope) -> Vec<&'a NoteEvent> {
        match scope {
            Scope::Layer { id } => self.events.iter().filter(|e| e.layer == *id).collect(),
            Scope::EventSelection { ids } => self
                .events
                .iter()
                .filter(|e| ids.contains(&e.id))
                .collect(),
            _ => {
                let (start, end) = self.scope_range(scope);
                self.events
                    .iter()
                    .filter(|e| e.start >= start && e.start < end)
                    .collect()
            }
        }
    }

    /// Layers that own at least one event selected by the scope. For a layer
    /// scope this is the layer itself even when silent.
    pub fn layers_in_scope(&self, scope: &Scope) -> Vec<LayerId> {
        match scope {
            Scope::Layer { id } => vec![*id],
            _ => {
                let selected = self.events_in_scope(scope);
                let mut out: Vec<LayerId> = Vec::new();
                for layer in &self.layers {
                    if selected.iter().any(|e| e.layer == layer.id) {
                        out.push(layer.id);
                    }
                }
                out
            }
        }
    }

    /// Bar number (1-based) containing a tick.
    pub fn bar_of(&self, tick: Tick) -> u32 {
        let per_bar = self.meter.ticks_per_bar(self.ppq).max(1);
        (tick / per_bar) as u32 + 1
    }

    /// Tick where a 1-based bar begins.
    pub fn bar_start(&self, bar: u32) -> Tick {
        let per_bar = self.meter.ticks_per_bar(self.ppq);
        (bar.saturating_sub(1) as Tick) * per_bar
    }
}

// ============================================================================
// Tests
// ============================================================================
