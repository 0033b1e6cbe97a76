//! Structured diffs between project snapshots.
//!
//! Every edit package carries the diff it will cause, computed from a staged
//! copy rather than predicted from the plan. Constraint checking and the
//! user-facing summary both read this structure, so it has to be exact.

use super::model::{Card, NoteEvent, ParamKey, ProjectSnapshot};
use super::{EventId, LayerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Change records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum EventChange {
    Added { event: NoteEvent },
    Removed { event: NoteEvent },
    Modified { before: NoteEvent, after: NoteEvent },
}

impl EventChange {
    pub fn layer(&self) -> LayerId {
        match self {
            EventChange::Added { event } | EventChange::Removed { event } => event.layer,
            EventChange::Modified { after, .. } => after.layer,
        }
    }

    pub fn event_id(&self) -> EventId {
        match self {
            EventChange::Added { event } | EventChange::Removed { event } => event.id,
            EventChange::Modified { after, .. } => after.id,
        }
    }

    pub fn invert(&self) -> EventChange {
        match self {
            EventChange::Added { event } => EventChange::Removed {
                event: event.clone(),
            },
            EventChange::Removed { event } => EventChange::Added {
                event: event.clone(),
            },
            EventChange::Modified { before, after } => EventChange::Modified {
                before: after.clone(),
                after: before.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamChange {
    pub layer: LayerId,
    pub param: ParamKey,
    pub before: Option<f64>,
    pub after: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardChange {
    pub layer: LayerId,
    pub card: Card,
    pub position: usize,
    pub added: bool,
}

// ============================================================================
// ProjectDiff
// ============================================================================

/// Exact difference between two snapshots of the same project.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProjectDiff {
    pub events: Vec<EventChange>,
    pub params: Vec<ParamChange>,
    pub cards: Vec<CardChange>,
    pub tempo: Option<(f64, f64)>,
    pub meter: Option<(String, String)>,
}

impl ProjectDiff {
    /// Compute the diff from `before` to `after`. Both snapshots must be in
    /// canonical order (see [`ProjectSnapshot::normalize`]).
    pub fn between(before: &ProjectSnapshot, after: &ProjectSnapshot) -> Self {
        let mut diff = ProjectDiff::default();

        let old: BTreeMap<EventId, &NoteEvent> =
            before.events.iter().map(|e| (e.id, e)).collect();
        let new: BTreeMap<EventId, &NoteEvent> = after.events.iter().map(|e| (e.id, e)).collect();

        for (id, event) in &new {
            match old.get(id) {
                None => diff.events.push(EventChange::Added {
                    event: (*event).clone(),
                }),
                Some(prev) if prev != event => diff.events.push(EventChange::Modified {
                    before: (*prev).clone(),
                    after: (*event).clone(),
                }),
                Some(_) => {}
            }
        }
        for (id, event) in &old {
            if !new.contains_key(id) {
                diff.events.push(EventChange::Removed {
                    event: (*event).clone(),
                });
            }
        }

        for layer_after in &after.layers {
            let layer_before = before.layer(layer_after.id);
            let empty = BTreeMap::new();
            let params_before = layer_before.map(|l| &l.params).unwrap_or(&empty);
            for (key, value) in &layer_after.params {
                let prev = params_before.get(key).copied();
                if prev != Some(*value) {
                    diff.params.push(ParamChange {
                        layer: layer_after.id,
                        param: *key,
                        before: prev,
                        after: Some(*value),
                    });
                }
            }
            for (key, value) in params_before {
                if !layer_after.params.contains_key(key) {
                    diff.params.push(ParamChange {
                        layer: layer_after.id,
                        param: *key,
                        before: Some(*value),
                        after: None,
                    });
                }
            }

            if let Some(layer_before) = layer_before {
                diff.diff_chain(layer_before, layer_after, before, after);
            }
        }

        if (before.tempo_bpm - after.tempo_bpm).abs() > f64::EPSILON {
            diff.tempo = Some((before.tempo_bpm, after.tempo_bpm));
        }
        if before.meter != after.meter {
            diff.meter = Some((before.meter.to_string(), after.meter.to_string()));
        }

        diff
    }

    fn diff_chain(
        &mut self,
        layer_before: &super::model::Layer,
        layer_after: &super::model::Layer,
        before: &ProjectSnapshot,
        after: &ProjectSnapshot,
    ) {
        for (pos, card_id) in layer_after.chain.iter().enumerate() {
            if !layer_before.chain.contains(card_id) {
                if let Some(card) = after.cards.get(card_id) {
                    self.cards.push(CardChange {
                        layer: layer_after.id,
                        card: card.clone(),
                        position: pos,
                        added: true,
                    });
                }
            }
        }
        for (pos, card_id) in layer_before.chain.iter().enumerate() {
            if !layer_after.chain.contains(card_id) {
                if let Some(card) = before.cards.get(card_id) {
                    self.cards.push(CardChange {
                        layer: layer_before.id,
                        card: card.clone(),
                        position: pos,
                        added: false,
                    });
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
            && self.params.is_empty()
            && self.cards.is_empty()
            && self.tempo.is_none()
            && self.meter.is_none()
    }

    /// The reverse diff, describing the undo of this one.
    pub fn invert(&self) -> ProjectDiff {
        ProjectDiff {
            events: self.events.iter().map(EventChange::invert).collect(),
            params: self
                .params
                .iter()
                .map(|p| ParamChange {
                    layer: p.layer,
                    param: p.param,
                    before: p.after,
                    after: p.before,
                })
                .collect(),
            cards: self
                .cards
                .iter()
                .map(|c| CardChange {
                    layer: c.layer,
                    card: c.card.clone(),
                    position: c.position,
                    added: !c.added,
                })
                .collect(),
            tempo: self.tempo.map(|(b, a)| (a, b)),
            meter: self.meter.clone().map(|(b, a)| (a, b)),
        }
    }

    /// Whether any change in this diff lands on the given layer.
    pub fn touches_layer(&self, layer: LayerId) -> bool {
        self.events.iter().any(|e| e.layer() == layer)
            || self.params.iter().any(|p| p.layer == layer)
            || self.cards.iter().any(|c| c.layer == layer)
    }

    /// Event changes landing on the given layer.
    pub fn event_changes_on(&self, layer: LayerId) -> Vec<&EventChange> {
        self.events.iter().filter(|e| e.layer() == layer).collect()
    }

    /// Layers touched by any change, deduplicated in first-seen order.
    pub fn touched_layers(&self) -> Vec<LayerId> {
        let mut out: Vec<LayerId> = Vec::new();
        let mut push = |id: LayerId| {
            if !out.contains(&id) {
                out.push(id);
            }
        };
        for e in &self.events {
            push(e.layer());
        }
        for p in &self.params {
            push(p.layer);
        }
        for c in &self.cards {
            push(c.layer);
        }
        out
    }

    pub fn stats(&self) -> DiffStats {
        let mut stats = DiffStats::default();
        for change in &self.events {
            match change {
                EventChange::Added { .. } => stats.events_added += 1,
                EventChange::Removed { .. } => stats.events_removed += 1,
                EventChange::Modified { .. } => stats.events_modified += 1,
            }
        }
        stats.params_changed = self.params.len();
        stats.cards_changed = self.cards.len();
        stats.tempo_changed = self.tempo.is_some();
        stats.meter_changed = self.meter.is_some();
        stats
    }
}

/// Change counts for summaries and plan cost.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub events_added: usize,
    pub events_removed: usize,
    pub events_modified: usize,
    pub params_changed: usize,
    pub cards_changed: usize,
    pub tempo_changed: bool,
    pub meter_changed: bool,
}

impl DiffStats {
    pub fn total(&self) -> usize {
        self.events_added
            + self.events_removed
            + self.events_modified
            + self.params_changed
            + self.cards_changed
            + usize::from(self.tempo_changed)
            + usize::from(self.meter_changed)
    }
}

impl fmt::Display for DiffStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "+{} -{} ~{} events, {} params, {} cards",
            self.events_added,
            self.events_removed,
            self.events_modified,
            self.params_changed,
            self.cards_changed
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
