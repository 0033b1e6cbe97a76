//! Concrete edit operations and the packages that carry them.
//!
//! An [`Action`] is one bounded change to a staged snapshot: a lever template
//! bound to a layer, a tick range, and concrete magnitudes. Applying actions
//! is deterministic, including the ids of any events or cards they create, so
//! compiling the same plan against the same snapshot twice yields identical
//! packages.
//!
//! An [`EditPackage`] is the unit the host commits: the operations, the exact
//! diff they caused on the staged copy, the inverse diff that undoes them,
//! and the explanation of why they were chosen.

pub mod compiler;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CompileError;
use crate::explain::Explanation;
use crate::project::diff::{EventChange, ProjectDiff};
use crate::project::model::{
    Card, CardKind, EffectKind, Meter, NoteEvent, ParamKey, ProjectSnapshot, Tick,
};
use crate::project::{CardId, EventId, LayerId, PackageId};

/// Velocity scaling applied to events manufactured by an echo.
const ECHO_VELOCITY_FACTOR: f64 = 0.8;

// ============================================================================
// Actions
// ============================================================================

/// Concrete operation bound to magnitudes. Tick offsets are pre-converted
/// from beats at bind time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ActionOp {
    Transpose { semitones: i32 },
    ScaleVelocity { factor: f64 },
    ShiftEvents { ticks: Tick },
    ThinEvents { keep_ratio: f64 },
    ClearEvents,
    EchoEvents {
        source_layer: LayerId,
        offset_ticks: Tick,
        transpose: i32,
    },
    AdjustParam { param: ParamKey, delta: f64 },
    SetParam { param: ParamKey, value: f64 },
    InsertEffect { effect: EffectKind },
    RemoveEffect { effect: EffectKind },
    SetTempo { bpm: f64 },
}

/// One bounded change: an operation, the layer it lands on, and the tick
/// range it may touch. Transport operations carry no layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub layer: Option<LayerId>,
    pub start: Tick,
    pub end: Tick,
    pub op: ActionOp,
}

impl Action {
    fn selects(&self, event: &NoteEvent) -> bool {
        Some(event.layer) == self.layer && event.start >= self.start && event.start < self.end
    }
}

// ============================================================================
// Application
// ============================================================================

fn param_range(param: ParamKey) -> (f64, f64) {
    match param {
        ParamKey::Pan => (-1.0, 1.0),
        _ => (0.0, 1.0),
    }
}

/// Neutral value assumed for a parameter a layer has never set.
fn param_default(param: ParamKey) -> f64 {
    match param {
        ParamKey::Volume => 0.8,
        ParamKey::Cutoff => 0.5,
        ParamKey::Pan => 0.0,
        _ => 0.2,
    }
}

fn clamp_pitch(pitch: i32) -> u8 {
    pitch.clamp(0, 127) as u8
}

fn clamp_velocity(velocity: f64) -> u8 {
    (velocity.round() as i64).clamp(1, 127) as u8
}

/// Apply one action to a staged snapshot.
///
/// `op_tag` seeds the derived ids of any entities the action manufactures;
/// callers pass a stable per-operation tag so replays reproduce ids exactly.
pub fn apply_action(
    snapshot: &mut ProjectSnapshot,
    action: &Action,
    op_tag: &str,
) -> Result<(), CompileError> {
    if let Some(layer) = action.layer {
        if snapshot.layer(layer).is_none() {
            return Err(CompileError::InvalidOperation {
                reason: format!("layer {} not present in snapshot", layer),
            });
        }
    }
    match &action.op {
        ActionOp::Transpose { semitones } => {
            for event in snapshot.events.iter_mut().filter(|e| action.selects(e)) {
                event.pitch = clamp_pitch(event.pitch as i32 + semitones);
            }
        }
        ActionOp::ScaleVelocity { factor } => {
            for event in snapshot.events.iter_mut().filter(|e| action.selects(e)) {
                event.velocity = clamp_velocity(event.velocity as f64 * factor);
            }
        }
        ActionOp::ShiftEvents { ticks } => {
            for event in snapshot.events.iter_mut().filter(|e| action.selects(e)) {
                event.start = (event.start + ticks).max(0);
            }
        }
        ActionOp::ThinEvents { keep_ratio } => {
            thin_events(snapshot, action, *keep_ratio);
        }
        ActionOp::ClearEvents => {
            snapshot.events.retain(|e| !action.selects(e));
        }
        ActionOp::EchoEvents {
            source_layer,
            offset_ticks,
            transpose,
        } => {
            echo_events(snapshot, action, *source_layer, *offset_ticks, *transpose, op_tag)?;
        }
        ActionOp::AdjustParam { param, delta } => {
            adjust_param(snapshot, action, *param, |current| current + delta)?;
        }
        ActionOp::SetParam { param, value } => {
            adjust_param(snapshot, action, *param, |_| *value)?;
        }
        ActionOp::InsertEffect { effect } => {
            insert_effect(snapshot, action, *effect, op_tag)?;
        }
        ActionOp::RemoveEffect { effect } => {
            remove_effect(snapshot, action, *effect)?;
        }
        ActionOp::SetTempo { bpm } => {
            snapshot.tempo_bpm = *bpm;
        }
    }
    snapshot.normalize();
    Ok(())
}

/// Drop a deterministic subset of selected events, keeping roughly
/// `keep_ratio` of them by canonical order.
fn thin_events(snapshot: &mut ProjectSnapshot, action: &Action, keep_ratio: f64) {
    let drop_ratio = (1.0 - keep_ratio).clamp(0.0, 1.0);
    let mut index = 0usize;
    snapshot.events.retain(|event| {
        if !action.selects(event) {
            return true;
        }
        let drops_before = (index as f64 * drop_ratio).floor();
        let drops_after = ((index + 1) as f64 * drop_ratio).floor();
        index += 1;
        drops_after <= drops_before
    });
}

fn echo_events(
    snapshot: &mut ProjectSnapshot,
    action: &Action,
    source_layer: LayerId,
    offset_ticks: Tick,
    transpose: i32,
    op_tag: &str,
) -> Result<(), CompileError> {
    let Some(target) = action.layer else {
        return Err(CompileError::InvalidOperation {
            reason: "echo requires a target layer".to_string(),
        });
    };
    if snapshot.layer(source_layer).is_none() {
        return Err(CompileError::InvalidOperation {
            reason: format!("echo source layer {} not present", source_layer),
        });
    }
    let copies: Vec<NoteEvent> = snapshot
        .events
        .iter()
        .filter(|e| {
            e.layer == source_layer && e.start >= action.start && e.start < action.end
        })
        .map(|source| NoteEvent {
            id: EventId::derived(source.id.0, op_tag),
            layer: target,
            start: (source.start + offset_ticks).max(0),
            duration: source.duration,
            pitch: clamp_pitch(source.pitch as i32 + transpose),
            velocity: clamp_velocity(source.velocity as f64 * ECHO_VELOCITY_FACTOR),
        })
        .collect();
    for copy in copies {
        // Replays regenerate the same derived ids; skip material already there.
        if snapshot.event(copy.id).is_none() {
            snapshot.events.push(copy);
        }
    }
    Ok(())
}

fn adjust_param(
    snapshot: &mut ProjectSnapshot,
    action: &Action,
    param: ParamKey,
    update: impl Fn(f64) -> f64,
) -> Result<(), CompileError> {
    let Some(layer_id) = action.layer else {
        return Err(CompileError::InvalidOperation {
            reason: format!("parameter {} requires a target layer", param),
        });
    };
    let Some(layer) = snapshot.layer_mut(layer_id) else {
        return Err(CompileError::InvalidOperation {
            reason: format!("layer {} not present in snapshot", layer_id),
        });
    };
    let (min, max) = param_range(param);
    let current = layer
        .params
        .get(&param)
        .copied()
        .unwrap_or_else(|| param_default(param));
    layer.params.insert(param, update(current).clamp(min, max));
    Ok(())
}

fn insert_effect(
    snapshot: &mut ProjectSnapshot,
    action: &Action,
    effect: EffectKind,
    op_tag: &str,
) -> Result<(), CompileError> {
    let Some(layer_id) = action.layer else {
        return Err(CompileError::InvalidOperation {
            reason: format!("effect {} requires a target layer", effect),
        });
    };
    let already = {
        let Some(layer) = snapshot.layer(layer_id) else {
            return Err(CompileError::InvalidOperation {
                reason: format!("layer {} not present in snapshot", layer_id),
            });
        };
        layer.chain.iter().any(|card_id| {
            matches!(
                snapshot.cards.get(card_id).map(|c| &c.kind),
                Some(CardKind::Effect { effect: e }) if *e == effect
            )
        })
    };
    if already {
        return Ok(());
    }
    let card = Card {
        id: CardId::derived(layer_id.0, op_tag),
        name: effect.to_string(),
        kind: CardKind::Effect { effect },
    };
    snapshot.cards.insert(card.id, card.clone());
    if let Some(layer) = snapshot.layer_mut(layer_id) {
        layer.chain.push(card.id);
    }
    Ok(())
}

fn remove_effect(
    snapshot: &mut ProjectSnapshot,
    action: &Action,
    effect: EffectKind,
) -> Result<(), CompileError> {
    let Some(layer_id) = action.layer else {
        return Err(CompileError::InvalidOperation {
            reason: format!("effect {} requires a target layer", effect),
        });
    };
    let removed: Vec<CardId> = {
        let Some(layer) = snapshot.layer(layer_id) else {
            return Err(CompileError::InvalidOperation {
                reason: format!("layer {} not present in snapshot", layer_id),
            });
        };
        layer
            .chain
            .iter()
            .copied()
            .filter(|card_id| {
                matches!(
                    snapshot.cards.get(card_id).map(|c| &c.kind),
                    Some(CardKind::Effect { effect: e }) if *e == effect
                )
            })
            .collect()
    };
    if let Some(layer) = snapshot.layer_mut(layer_id) {
        layer.chain.retain(|id| !removed.contains(id));
    }
    for card_id in removed {
        let referenced = snapshot.layers.iter().any(|l| l.chain.contains(&card_id));
        if !referenced {
            snapshot.cards.remove(&card_id);
        }
    }
    Ok(())
}

// ============================================================================
// Diff application
// ============================================================================

/// Apply a recorded diff literally. Undo applies a package's inverse diff;
/// redo applies its forward diff.
pub fn apply_diff(snapshot: &mut ProjectSnapshot, diff: &ProjectDiff) -> Result<(), CompileError> {
    for change in &diff.events {
        match change {
            EventChange::Added { event } => {
                if snapshot.event(event.id).is_some() {
                    return Err(CompileError::InvalidOperation {
                        reason: format!("event {} already present", event.id),
                    });
                }
                snapshot.events.push(event.clone());
            }
            EventChange::Removed { event } => {
                let before = snapshot.events.len();
                snapshot.events.retain(|e| e.id != event.id);
                if snapshot.events.len() == before {
                    return Err(CompileError::InvalidOperation {
                        reason: format!("event {} not present to remove", event.id),
                    });
                }
            }
            EventChange::Modified { after, .. } => {
                let Some(slot) = snapshot.events.iter_mut().find(|e| e.id == after.id) else {
                    return Err(CompileError::InvalidOperation {
                        reason: format!("event {} not present to modify", after.id),
                    });
                };
                *slot = after.clone();
            }
        }
    }
    for change in &diff.params {
        let Some(layer) = snapshot.layer_mut(change.layer) else {
            return Err(CompileError::InvalidOperation {
                reason: format!("layer {} not present in snapshot", change.layer),
            });
        };
        match change.after {
            Some(value) => {
                layer.params.insert(change.param, value);
            }
            None => {
                layer.params.remove(&change.param);
            }
        }
    }
    for change in &diff.cards {
        let Some(layer) = snapshot.layer_mut(change.layer) else {
            return Err(CompileError::InvalidOperation {
                reason: format!("layer {} not present in snapshot", change.layer),
            });
        };
        if change.added {
            let position = change.position.min(layer.chain.len());
            layer.chain.insert(position, change.card.id);
            snapshot.cards.insert(change.card.id, change.card.clone());
        } else {
            layer.chain.retain(|id| *id != change.card.id);
            let still_referenced = snapshot
                .layers
                .iter()
                .any(|l| l.chain.contains(&change.card.id));
            if !still_referenced {
                snapshot.cards.remove(&change.card.id);
            }
        }
    }
    if let Some((_, after)) = diff.tempo {
        snapshot.tempo_bpm = after;
    }
    if let Some((_, after)) = &diff.meter {
        snapshot.meter = parse_meter(after)?;
    }
    snapshot.normalize();
    Ok(())
}

fn parse_meter(text: &str) -> Result<Meter, CompileError> {
    let invalid = || CompileError::InvalidOperation {
        reason: format!("malformed meter '{}'", text),
    };
    let (numerator, denominator) = text.split_once('/').ok_or_else(invalid)?;
    Ok(Meter::new(
        numerator.parse().map_err(|_| invalid())?,
        denominator.parse().map_err(|_| invalid())?,
    ))
}

// ============================================================================
// Packages
// ============================================================================

/// The committed unit of work: operations, their exact effect, and the way
/// back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditPackage {
    pub id: PackageId,
    pub created_at: DateTime<Utc>,
    /// Lexicon the instruction was compiled under.
    pub lexicon_version: String,
    /// Snapshot revision the package applies cleanly to.
    pub base_revision: u64,
    /// One-line human summary of the edit.
    pub summary: String,
    pub operations: Vec<Action>,
    /// Exact change the operations caused on the staged snapshot.
    pub diff: ProjectDiff,
    /// Diff that restores the staged snapshot to its base state.
    pub inverse: ProjectDiff,
    pub explanation: Explanation,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::model::{Layer, Meter, DEFAULT_PPQ};
    use crate::project::LayerRole;
    use std::collections::BTreeMap;

    fn snapshot() -> (ProjectSnapshot, LayerId, LayerId) {
        let melody = LayerId::new();
        let harmony = LayerId::new();
        let mut events = Vec::new();
        for i in 0..4 {
            events.push(NoteEvent {
                id: EventId::new(),
                layer: melody,
                start: i * 480,
                duration: 240,
                pitch: 60 + i as u8,
                velocity: 90,
            });
        }
        let mut snap = ProjectSnapshot {
            revision: 1,
            ppq: DEFAULT_PPQ,
            tempo_bpm: 120.0,
            meter: Meter::new(4, 4),
            sections: vec![],
            layers: vec![
                Layer {
                    id: melody,
                    name: "melody".to_string(),
                    role: LayerRole::Melody,
                    params: BTreeMap::new(),
                    chain: vec![],
                },
                Layer {
                    id: harmony,
                    name: "harmony".to_string(),
                    role: LayerRole::Harmony,
                    params: BTreeMap::new(),
                    chain: vec![],
                },
            ],
            cards: BTreeMap::new(),
            events,
        };
        snap.normalize();
        (snap, melody, harmony)
    }

    fn act(layer: LayerId, end: Tick, op: ActionOp) -> Action {
        Action {
            layer: Some(layer),
            start: 0,
            end,
            op,
        }
    }

    #[test]
    fn test_transpose_clamps_to_midi_range() {
        let (mut snap, melody, _) = snapshot();
        snap.events[0].pitch = 125;
        let action = act(melody, 10_000, ActionOp::Transpose { semitones: 12 });
        apply_action(&mut snap, &action, "op0").unwrap();
        assert!(snap.events.iter().all(|e| e.pitch <= 127));
        assert_eq!(snap.events[0].pitch, 127);
    }

    #[test]
    fn test_scope_range_limits_selection() {
        let (mut snap, melody, _) = snapshot();
        let action = Action {
            layer: Some(melody),
            start: 0,
            end: 960,
            op: ActionOp::ScaleVelocity { factor: 0.5 },
        };
        apply_action(&mut snap, &action, "op0").unwrap();
        let touched: Vec<u8> = snap.events.iter().map(|e| e.velocity).collect();
        assert_eq!(touched, vec![45, 45, 90, 90]);
    }

    #[test]
    fn test_thin_events_is_deterministic() {
        let (mut snap, melody, _) = snapshot();
        let action = act(melody, 10_000, ActionOp::ThinEvents { keep_ratio: 0.7 });
        let mut again = snap.clone();
        apply_action(&mut snap, &action, "op0").unwrap();
        apply_action(&mut again, &action, "op0").unwrap();
        assert_eq!(snap.events, again.events);
        assert!(snap.events.len() < 4);
        assert!(!snap.events.is_empty());
    }

    #[test]
    fn test_echo_derives_stable_event_ids() {
        let (snap, melody, harmony) = snapshot();
        let action = Action {
            layer: Some(harmony),
            start: 0,
            end: 10_000,
            op: ActionOp::EchoEvents {
                source_layer: melody,
                offset_ticks: 240,
                transpose: -5,
            },
        };
        let mut first = snap.clone();
        let mut second = snap.clone();
        apply_action(&mut first, &action, "op0").unwrap();
        apply_action(&mut second, &action, "op0").unwrap();
        let ids_first: Vec<EventId> = first
            .events
            .iter()
            .filter(|e| e.layer == harmony)
            .map(|e| e.id)
            .collect();
        let ids_second: Vec<EventId> = second
            .events
            .iter()
            .filter(|e| e.layer == harmony)
            .map(|e| e.id)
            .collect();
        assert_eq!(ids_first, ids_second);
        assert_eq!(ids_first.len(), 4);
    }

    #[test]
    fn test_insert_effect_is_idempotent() {
        let (mut snap, melody, _) = snapshot();
        let action = act(
            melody,
            10_000,
            ActionOp::InsertEffect {
                effect: EffectKind::Reverb,
            },
        );
        apply_action(&mut snap, &action, "op0").unwrap();
        apply_action(&mut snap, &action, "op1").unwrap();
        assert_eq!(snap.layers[0].chain.len(), 1);
        assert_eq!(snap.cards.len(), 1);
    }

    #[test]
    fn test_remove_effect_drops_card() {
        let (mut snap, melody, _) = snapshot();
        let insert = act(
            melody,
            10_000,
            ActionOp::InsertEffect {
                effect: EffectKind::Delay,
            },
        );
        apply_action(&mut snap, &insert, "op0").unwrap();
        let remove = act(
            melody,
            10_000,
            ActionOp::RemoveEffect {
                effect: EffectKind::Delay,
            },
        );
        apply_action(&mut snap, &remove, "op1").unwrap();
        assert!(snap.layers[0].chain.is_empty());
        assert!(snap.cards.is_empty());
    }

    #[test]
    fn test_unknown_layer_is_an_error() {
        let (mut snap, _, _) = snapshot();
        let action = act(LayerId::new(), 10_000, ActionOp::ClearEvents);
        match apply_action(&mut snap, &action, "op0") {
            Err(CompileError::InvalidOperation { reason }) => {
                assert!(reason.contains("not present"));
            }
            other => panic!("Expected invalid operation, got {:?}", other),
        }
    }

    #[test]
    fn test_apply_inverse_diff_restores_snapshot() {
        let (snap, melody, _) = snapshot();
        let mut staged = snap.clone();
        let action = act(melody, 10_000, ActionOp::Transpose { semitones: 7 });
        apply_action(&mut staged, &action, "op0").unwrap();
        let diff = ProjectDiff::between(&snap, &staged);
        assert!(!diff.is_empty());
        let mut restored = staged.clone();
        apply_diff(&mut restored, &diff.invert()).unwrap();
        assert_eq!(restored, snap);
    }

    #[test]
    fn test_apply_diff_rejects_missing_event() {
        let (snap, melody, _) = snapshot();
        let mut staged = snap.clone();
        let action = act(melody, 10_000, ActionOp::ClearEvents);
        apply_action(&mut staged, &action, "op0").unwrap();
        let diff = ProjectDiff::between(&snap, &staged);
        // Removing the same events twice must fail loudly.
        let mut twice = staged.clone();
        match apply_diff(&mut twice, &diff) {
            Err(CompileError::InvalidOperation { .. }) => {}
            other => panic!("Expected invalid operation, got {:?}", other),
        }
    }

    #[test]
    fn test_adjust_param_clamps() {
        let (mut snap, melody, _) = snapshot();
        let action = act(
            melody,
            10_000,
            ActionOp::AdjustParam {
                param: ParamKey::Cutoff,
                delta: 0.9,
            },
        );
        apply_action(&mut snap, &action, "op0").unwrap();
        assert_eq!(snap.layers[0].params.get(&ParamKey::Cutoff), Some(&1.0));
    }
}
