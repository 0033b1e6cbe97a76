//! Candidate simulation and constraint checking.
//!
//! A candidate is never trusted on intent: its actions run against a staged
//! copy of the snapshot, and every constraint is judged on the exact diff
//! that application produced. The same checks run again at package compile
//! time, so what the planner accepted is what the package guarantees.

use crate::error::{CompileError, CompileResult};
use crate::explain::ConstraintCheck;
use crate::intent::{Constraint, EditIntent, EditTarget};
use crate::project::diff::{EventChange, ProjectDiff};
use crate::project::model::{NoteEvent, ProjectSnapshot, Tick};
use crate::project::{LayerId, LayerRole};

use super::search::Candidate;

// ============================================================================
// Simulation
// ============================================================================

/// The observed effect of one candidate on a staged snapshot.
#[derive(Debug, Clone)]
pub struct Simulated {
    pub after: ProjectSnapshot,
    pub diff: ProjectDiff,
    pub checks: Vec<ConstraintCheck>,
}

impl Simulated {
    pub fn hard_violation(&self) -> Option<&ConstraintCheck> {
        self.checks.iter().find(|c| c.hard && !c.satisfied)
    }

    pub fn soft_violations(&self) -> usize {
        self.checks.iter().filter(|c| !c.hard && !c.satisfied).count()
    }
}

/// Run a candidate's actions on a fork of the snapshot and judge every
/// constraint against the resulting diff.
pub fn simulate(
    candidate: &Candidate,
    intent: &EditIntent,
    snapshot: &ProjectSnapshot,
) -> CompileResult<Simulated> {
    let mut staged = snapshot.clone();
    for (index, action) in candidate.actions().enumerate() {
        // Stable per-slot tags keep derived ids identical across re-runs.
        apply_staged(&mut staged, action, &format!("plan:op{}", index))?;
    }
    let diff = ProjectDiff::between(snapshot, &staged);
    let checks = check_constraints(intent, snapshot, &staged, &diff);
    Ok(Simulated {
        after: staged,
        diff,
        checks,
    })
}

fn apply_staged(
    staged: &mut ProjectSnapshot,
    action: &crate::edit::Action,
    tag: &str,
) -> CompileResult<()> {
    crate::edit::apply_action(staged, action, tag).map_err(|err| match err {
        CompileError::InvalidOperation { reason } => CompileError::StagingFailure { reason },
        other => other,
    })
}

// ============================================================================
// Constraint checks
// ============================================================================

/// Judge every constraint of the intent against a computed diff.
pub fn check_constraints(
    intent: &EditIntent,
    before: &ProjectSnapshot,
    after: &ProjectSnapshot,
    diff: &ProjectDiff,
) -> Vec<ConstraintCheck> {
    intent
        .constraints
        .iter()
        .map(|constraint| {
            let (satisfied, detail) = judge(constraint, before, after, diff);
            ConstraintCheck {
                constraint: constraint.to_string(),
                hard: constraint.is_hard(),
                satisfied,
                detail,
            }
        })
        .collect()
}

fn judge(
    constraint: &Constraint,
    before: &ProjectSnapshot,
    after: &ProjectSnapshot,
    diff: &ProjectDiff,
) -> (bool, String) {
    match constraint {
        Constraint::Preserve { target, mode, .. } => {
            judge_preserve(target, *mode, before, diff)
        }
        Constraint::OnlyChange { targets, .. } => judge_only_change(targets, before, diff),
        Constraint::Tempo { bpm, tolerance, .. } => {
            let delta = (after.tempo_bpm - bpm).abs();
            if delta <= *tolerance {
                (true, format!("tempo is {} bpm", after.tempo_bpm))
            } else {
                (
                    false,
                    format!("tempo moved to {} bpm, outside ±{}", after.tempo_bpm, tolerance),
                )
            }
        }
        Constraint::Meter {
            numerator,
            denominator,
            ..
        } => {
            let wanted = format!("{}/{}", numerator, denominator);
            let got = after.meter.to_string();
            if got == wanted {
                (true, format!("meter stayed {}", got))
            } else {
                (false, format!("meter became {}", got))
            }
        }
        Constraint::RangeLimit {
            voice,
            min_pitch,
            max_pitch,
            ..
        } => judge_range(*voice, *min_pitch, *max_pitch, before, diff),
    }
}

// ----------------------------------------------------------------------------
// Preserve
// ----------------------------------------------------------------------------

use crate::canon::axis::PreserveMode;

fn judge_preserve(
    target: &EditTarget,
    mode: PreserveMode,
    before: &ProjectSnapshot,
    diff: &ProjectDiff,
) -> (bool, String) {
    match target {
        EditTarget::Tempo => {
            if diff.tempo.is_none() {
                (true, "tempo untouched".to_string())
            } else {
                (false, "tempo was changed".to_string())
            }
        }
        EditTarget::Everything => {
            if diff.is_empty() {
                (true, "nothing changed".to_string())
            } else {
                (false, format!("{} changes made", diff.stats().total()))
            }
        }
        EditTarget::Role { role } => {
            let layers: Vec<LayerId> =
                before.layers_with_role(*role).iter().map(|l| l.id).collect();
            let changes: Vec<&EventChange> = diff
                .events
                .iter()
                .filter(|c| layers.contains(&c.layer()))
                .collect();
            judge_event_changes(&changes, mode, &format!("{}", role))
        }
        EditTarget::Layer { id } => {
            let changes = diff.event_changes_on(*id);
            let name = before
                .layer(*id)
                .map(|l| l.name.clone())
                .unwrap_or_else(|| "layer".to_string());
            judge_event_changes(&changes, mode, &name)
        }
        EditTarget::Section { id } => {
            let Some(section) = before.section(*id) else {
                return (false, "section no longer exists".to_string());
            };
            let in_range = |event: &NoteEvent| {
                event.start >= section.start && event.start < section.end
            };
            let changes: Vec<&EventChange> = diff
                .events
                .iter()
                .filter(|c| match c {
                    EventChange::Added { event } | EventChange::Removed { event } => {
                        in_range(event)
                    }
                    EventChange::Modified { before, after } => {
                        in_range(before) || in_range(after)
                    }
                })
                .collect();
            judge_event_changes(&changes, mode, &section.name)
        }
    }
}

/// Judge a set of event changes on protected material against a mode.
///
/// Exact allows nothing. Functional keeps the event set and its rhythm: no
/// additions or removals, starts and durations fixed, and any pitch movement
/// uniform across the changed events. Recognizable keeps identity looser:
/// nothing removed, modified events stay on their onsets.
fn judge_event_changes(
    changes: &[&EventChange],
    mode: PreserveMode,
    name: &str,
) -> (bool, String) {
    if changes.is_empty() {
        return (true, format!("no {} events changed", name));
    }
    match mode {
        PreserveMode::Exact => (
            false,
            format!("{} {} event(s) changed", changes.len(), name),
        ),
        PreserveMode::Functional => {
            let mut pitch_deltas: Vec<i32> = Vec::new();
            for change in changes {
                match change {
                    EventChange::Added { .. } => {
                        return (false, format!("events were added to the {}", name));
                    }
                    EventChange::Removed { .. } => {
                        return (false, format!("{} events were removed", name));
                    }
                    EventChange::Modified { before, after } => {
                        if before.start != after.start || before.duration != after.duration {
                            return (false, format!("{} rhythm was altered", name));
                        }
                        let delta = after.pitch as i32 - before.pitch as i32;
                        if delta != 0 && !pitch_deltas.contains(&delta) {
                            pitch_deltas.push(delta);
                        }
                    }
                }
            }
            if pitch_deltas.len() > 1 {
                (false, format!("{} intervals were reshaped", name))
            } else {
                (
                    true,
                    format!("{} kept its shape ({} event(s) adjusted)", name, changes.len()),
                )
            }
        }
        PreserveMode::Recognizable => {
            for change in changes {
                match change {
                    EventChange::Removed { .. } => {
                        return (false, format!("{} events were removed", name));
                    }
                    EventChange::Modified { before, after } if before.start != after.start => {
                        return (false, format!("{} onsets were moved", name));
                    }
                    _ => {}
                }
            }
            (
                true,
                format!("{} stayed recognizable ({} change(s))", name, changes.len()),
            )
        }
    }
}

// ----------------------------------------------------------------------------
// OnlyChange
// ----------------------------------------------------------------------------

fn judge_only_change(
    targets: &[EditTarget],
    before: &ProjectSnapshot,
    diff: &ProjectDiff,
) -> (bool, String) {
    if targets.iter().any(|t| matches!(t, EditTarget::Everything)) {
        return (true, "all changes permitted".to_string());
    }
    let mut allowed_layers: Vec<LayerId> = Vec::new();
    let mut allowed_ranges: Vec<(Tick, Tick)> = Vec::new();
    let mut tempo_allowed = false;
    for target in targets {
        match target {
            EditTarget::Role { role } => {
                allowed_layers.extend(before.layers_with_role(*role).iter().map(|l| l.id));
            }
            EditTarget::Layer { id } => allowed_layers.push(*id),
            EditTarget::Section { id } => {
                if let Some(section) = before.section(*id) {
                    allowed_ranges.push((section.start, section.end));
                }
            }
            EditTarget::Tempo => tempo_allowed = true,
            EditTarget::Everything => unreachable!(),
        }
    }
    let in_allowed_range =
        |tick: Tick| allowed_ranges.iter().any(|(s, e)| tick >= *s && tick < *e);
    for change in &diff.events {
        let layer_ok = allowed_layers.contains(&change.layer());
        let range_ok = match change {
            EventChange::Added { event } | EventChange::Removed { event } => {
                in_allowed_range(event.start)
            }
            EventChange::Modified { before, after } => {
                in_allowed_range(before.start) && in_allowed_range(after.start)
            }
        };
        if !layer_ok && !range_ok {
            return (
                false,
                format!("{} was changed", layer_name(before, change.layer())),
            );
        }
    }
    for change in &diff.params {
        if !allowed_layers.contains(&change.layer) {
            return (
                false,
                format!("{} parameters were changed", layer_name(before, change.layer)),
            );
        }
    }
    for change in &diff.cards {
        if !allowed_layers.contains(&change.layer) {
            return (
                false,
                format!("{} effects were changed", layer_name(before, change.layer)),
            );
        }
    }
    if diff.tempo.is_some() && !tempo_allowed {
        return (false, "the tempo was changed".to_string());
    }
    if diff.meter.is_some() {
        return (false, "the meter was changed".to_string());
    }
    (true, "all changes landed on permitted material".to_string())
}

fn layer_name(snapshot: &ProjectSnapshot, id: LayerId) -> String {
    snapshot
        .layer(id)
        .map(|l| format!("the {} layer", l.name))
        .unwrap_or_else(|| "an unknown layer".to_string())
}

// ----------------------------------------------------------------------------
// RangeLimit
// ----------------------------------------------------------------------------

fn judge_range(
    voice: LayerRole,
    min_pitch: u8,
    max_pitch: u8,
    before: &ProjectSnapshot,
    diff: &ProjectDiff,
) -> (bool, String) {
    let layers: Vec<LayerId> = before.layers_with_role(voice).iter().map(|l| l.id).collect();
    for change in &diff.events {
        if !layers.contains(&change.layer()) {
            continue;
        }
        let pitch = match change {
            EventChange::Added { event } => event.pitch,
            EventChange::Modified { after, .. } => after.pitch,
            EventChange::Removed { .. } => continue,
        };
        if pitch < min_pitch || pitch > max_pitch {
            return (
                false,
                format!("a {} note landed at pitch {}", voice, pitch),
            );
        }
    }
    (true, format!("{} stayed within range", voice))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::axis::{Amount, Axis};
    use crate::edit::{Action, ActionOp};
    use crate::intent::{Goal, Preference, Scope};
    use crate::planner::search::GoalBinding;
    use crate::project::model::{Layer, Meter, NoteEvent, Section, DEFAULT_PPQ};
    use crate::project::{EventId, SectionId};
    use std::collections::BTreeMap;

    fn snapshot() -> (ProjectSnapshot, LayerId, LayerId) {
        let bar = Meter::new(4, 4).ticks_per_bar(DEFAULT_PPQ);
        let melody = LayerId::new();
        let pads = LayerId::new();
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
        events.push(NoteEvent {
            id: EventId::new(),
            layer: pads,
            start: 0,
            duration: 960,
            pitch: 48,
            velocity: 70,
        });
        let mut snap = ProjectSnapshot {
            revision: 1,
            ppq: DEFAULT_PPQ,
            tempo_bpm: 120.0,
            meter: Meter::new(4, 4),
            sections: vec![Section {
                id: SectionId::new(),
                name: "chorus".to_string(),
                start: 0,
                end: 4 * bar,
            }],
            layers: vec![
                Layer {
                    id: melody,
                    name: "melody".to_string(),
                    role: LayerRole::Melody,
                    params: BTreeMap::new(),
                    chain: vec![],
                },
                Layer {
                    id: pads,
                    name: "pads".to_string(),
                    role: LayerRole::Pads,
                    params: BTreeMap::new(),
                    chain: vec![],
                },
            ],
            cards: BTreeMap::new(),
            events,
        };
        snap.normalize();
        (snap, melody, pads)
    }

    fn candidate(actions: Vec<Action>) -> Candidate {
        Candidate {
            choices: vec![GoalBinding {
                goal_index: 0,
                lever_order: 0,
                lever_id: "test-lever".to_string(),
                summary: "test".to_string(),
                advised: false,
                actions,
            }],
        }
    }

    fn intent(constraints: Vec<Constraint>, snap: &ProjectSnapshot) -> EditIntent {
        EditIntent {
            scope: Scope::Section {
                id: snap.sections[0].id,
            },
            goals: vec![Goal::Increase {
                axis: Axis::Brightness,
                amount: Amount::Moderate,
            }],
            constraints,
            preferences: vec![Preference::FewerEdits],
            assumed_defaults: vec![],
        }
    }

    fn preserve_melody(mode: PreserveMode) -> Constraint {
        Constraint::Preserve {
            target: EditTarget::Role {
                role: LayerRole::Melody,
            },
            mode,
            hard: true,
        }
    }

    #[test]
    fn test_param_edit_passes_exact_melody_preserve() {
        let (snap, _, pads) = snapshot();
        let cand = candidate(vec![Action {
            layer: Some(pads),
            start: 0,
            end: snap.length_ticks(),
            op: ActionOp::AdjustParam {
                param: crate::project::model::ParamKey::Cutoff,
                delta: 0.2,
            },
        }]);
        let sim = simulate(
            &cand,
            &intent(vec![preserve_melody(PreserveMode::Exact)], &snap),
            &snap,
        )
        .unwrap();
        assert!(sim.hard_violation().is_none(), "checks: {:?}", sim.checks);
        assert!(!sim.diff.is_empty());
    }

    #[test]
    fn test_transposing_melody_violates_exact_preserve() {
        let (snap, melody, _) = snapshot();
        let cand = candidate(vec![Action {
            layer: Some(melody),
            start: 0,
            end: snap.length_ticks(),
            op: ActionOp::Transpose { semitones: 2 },
        }]);
        let sim = simulate(
            &cand,
            &intent(vec![preserve_melody(PreserveMode::Exact)], &snap),
            &snap,
        )
        .unwrap();
        let violation = sim.hard_violation().expect("Expected a violation");
        assert!(violation.detail.contains("melody"));
    }

    #[test]
    fn test_uniform_transpose_passes_functional_preserve() {
        let (snap, melody, _) = snapshot();
        let cand = candidate(vec![Action {
            layer: Some(melody),
            start: 0,
            end: snap.length_ticks(),
            op: ActionOp::Transpose { semitones: 12 },
        }]);
        let sim = simulate(
            &cand,
            &intent(vec![preserve_melody(PreserveMode::Functional)], &snap),
            &snap,
        )
        .unwrap();
        assert!(sim.hard_violation().is_none(), "checks: {:?}", sim.checks);
    }

    #[test]
    fn test_thinning_melody_violates_functional_preserve() {
        let (snap, melody, _) = snapshot();
        let cand = candidate(vec![Action {
            layer: Some(melody),
            start: 0,
            end: snap.length_ticks(),
            op: ActionOp::ThinEvents { keep_ratio: 0.5 },
        }]);
        let sim = simulate(
            &cand,
            &intent(vec![preserve_melody(PreserveMode::Functional)], &snap),
            &snap,
        )
        .unwrap();
        let violation = sim.hard_violation().expect("Expected a violation");
        assert!(violation.detail.contains("removed"));
    }

    #[test]
    fn test_velocity_change_passes_recognizable_preserve() {
        let (snap, melody, _) = snapshot();
        let cand = candidate(vec![Action {
            layer: Some(melody),
            start: 0,
            end: snap.length_ticks(),
            op: ActionOp::ScaleVelocity { factor: 1.2 },
        }]);
        let sim = simulate(
            &cand,
            &intent(vec![preserve_melody(PreserveMode::Recognizable)], &snap),
            &snap,
        )
        .unwrap();
        assert!(sim.hard_violation().is_none(), "checks: {:?}", sim.checks);
    }

    #[test]
    fn test_only_change_rejects_off_target_layers() {
        let (snap, melody, _) = snapshot();
        let only_pads = Constraint::OnlyChange {
            targets: vec![EditTarget::Role {
                role: LayerRole::Pads,
            }],
            hard: true,
        };
        let cand = candidate(vec![Action {
            layer: Some(melody),
            start: 0,
            end: snap.length_ticks(),
            op: ActionOp::Transpose { semitones: 2 },
        }]);
        let sim = simulate(&cand, &intent(vec![only_pads], &snap), &snap).unwrap();
        let violation = sim.hard_violation().expect("Expected a violation");
        assert!(violation.detail.contains("melody"), "got {:?}", violation);
    }

    #[test]
    fn test_tempo_pin_judged_on_resulting_tempo() {
        let (snap, _, _) = snapshot();
        let pin = Constraint::Tempo {
            bpm: 120.0,
            tolerance: 2.0,
            hard: true,
        };
        let within = candidate(vec![Action {
            layer: None,
            start: 0,
            end: snap.length_ticks(),
            op: ActionOp::SetTempo { bpm: 121.0 },
        }]);
        let sim = simulate(&within, &intent(vec![pin.clone()], &snap), &snap).unwrap();
        assert!(sim.hard_violation().is_none());
        let outside = candidate(vec![Action {
            layer: None,
            start: 0,
            end: snap.length_ticks(),
            op: ActionOp::SetTempo { bpm: 140.0 },
        }]);
        let sim = simulate(&outside, &intent(vec![pin], &snap), &snap).unwrap();
        assert!(sim.hard_violation().is_some());
    }

    #[test]
    fn test_range_limit_checks_changed_notes_only() {
        let (snap, melody, _) = snapshot();
        let limit = Constraint::RangeLimit {
            voice: LayerRole::Melody,
            min_pitch: 55,
            max_pitch: 70,
            hard: true,
        };
        let ok = candidate(vec![Action {
            layer: Some(melody),
            start: 0,
            end: snap.length_ticks(),
            op: ActionOp::Transpose { semitones: 3 },
        }]);
        let sim = simulate(&ok, &intent(vec![limit.clone()], &snap), &snap).unwrap();
        assert!(sim.hard_violation().is_none(), "checks: {:?}", sim.checks);
        let too_far = candidate(vec![Action {
            layer: Some(melody),
            start: 0,
            end: snap.length_ticks(),
            op: ActionOp::Transpose { semitones: 12 },
        }]);
        let sim = simulate(&too_far, &intent(vec![limit], &snap), &snap).unwrap();
        let violation = sim.hard_violation().expect("Expected a violation");
        assert!(violation.detail.contains("pitch"));
    }

    #[test]
    fn test_soft_violation_counts_but_does_not_reject() {
        let (snap, melody, _) = snapshot();
        let soft = Constraint::Preserve {
            target: EditTarget::Role {
                role: LayerRole::Melody,
            },
            mode: PreserveMode::Exact,
            hard: false,
        };
        let cand = candidate(vec![Action {
            layer: Some(melody),
            start: 0,
            end: snap.length_ticks(),
            op: ActionOp::Transpose { semitones: 1 },
        }]);
        let sim = simulate(&cand, &intent(vec![soft], &snap), &snap).unwrap();
        assert!(sim.hard_violation().is_none());
        assert_eq!(sim.soft_violations(), 1);
    }
}
