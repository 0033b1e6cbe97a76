//! Structural validation and constraint-set conflict detection.
//!
//! Two failure shapes come out of here. A structural problem means the
//! intent refers to things the snapshot does not have, or carries values
//! outside musical plausibility; it reads as a conversational report. A
//! [`ConstraintConflict`] means the constraints themselves cannot all hold
//! at once; it names the conflicting constraints by index so the caller can
//! point at the exact words that collided. Conflicting constraints are
//! never silently dropped or reordered.

use serde::{Deserialize, Serialize};

use crate::config;
use crate::project::model::ProjectSnapshot;

use super::{Constraint, EditIntent, EditTarget, Goal, Scope};
use crate::canon::axis::{Axis, PreserveMode};

// ============================================================================
// Outcome types
// ============================================================================

/// One side of a reported conflict: which constraint, rendered for humans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictParty {
    /// Index into the intent's constraint list.
    pub index: usize,
    pub constraint: String,
}

/// A set of hard constraints that cannot all hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintConflict {
    pub parties: Vec<ConflictParty>,
    pub explanation: String,
}

/// Why an intent was rejected before planning.
#[derive(Debug, Clone, PartialEq)]
pub enum TypecheckIssue {
    /// The intent refers to entities or values this project cannot satisfy.
    Invalid { reason: String },
    /// The hard constraint set contradicts itself.
    Conflict(ConstraintConflict),
}

// ============================================================================
// Entry point
// ============================================================================

/// Validate a resolved edit intent against the snapshot it will run on.
pub fn typecheck(intent: &EditIntent, snapshot: &ProjectSnapshot) -> Result<(), TypecheckIssue> {
    check_scope(&intent.scope, snapshot)?;
    for goal in &intent.goals {
        check_goal(goal)?;
    }
    for constraint in &intent.constraints {
        check_constraint(constraint, snapshot)?;
    }
    if let Some(conflict) = find_conflict(intent, snapshot) {
        return Err(TypecheckIssue::Conflict(conflict));
    }
    Ok(())
}

fn invalid(reason: String) -> TypecheckIssue {
    TypecheckIssue::Invalid { reason }
}

// ============================================================================
// Structural checks
// ============================================================================

fn check_scope(scope: &Scope, snapshot: &ProjectSnapshot) -> Result<(), TypecheckIssue> {
    match scope {
        Scope::Section { id } => {
            if snapshot.section(*id).is_none() {
                return Err(invalid(
                    "the section this refers to is no longer in the project".to_string(),
                ));
            }
        }
        Scope::Layer { id } => {
            if snapshot.layer(*id).is_none() {
                return Err(invalid(
                    "the layer this refers to is no longer in the project".to_string(),
                ));
            }
        }
        Scope::EventSelection { ids } => {
            if ids.is_empty() {
                return Err(invalid("the selection is empty".to_string()));
            }
            if ids.iter().any(|id| snapshot.event(*id).is_none()) {
                return Err(invalid(
                    "some selected events are no longer in the project".to_string(),
                ));
            }
        }
        Scope::GlobalRange { start, end } => {
            if start >= end {
                return Err(invalid("the addressed range is empty".to_string()));
            }
        }
    }
    Ok(())
}

fn check_goal(goal: &Goal) -> Result<(), TypecheckIssue> {
    if let Goal::SetTo { axis, value } = goal {
        if *axis == Axis::Tempo
            && (*value < config::TEMPO_MIN_BPM || *value > config::TEMPO_MAX_BPM)
        {
            return Err(invalid(format!(
                "{} bpm is outside the playable range ({}..{})",
                value,
                config::TEMPO_MIN_BPM,
                config::TEMPO_MAX_BPM
            )));
        }
    }
    Ok(())
}

fn check_constraint(
    constraint: &Constraint,
    snapshot: &ProjectSnapshot,
) -> Result<(), TypecheckIssue> {
    match constraint {
        Constraint::Preserve { target, .. } => check_target(target, snapshot),
        Constraint::OnlyChange { targets, .. } => {
            if targets.is_empty() {
                return Err(invalid(
                    "an only-change constraint needs at least one target".to_string(),
                ));
            }
            for target in targets {
                check_target(target, snapshot)?;
            }
            Ok(())
        }
        Constraint::Tempo { bpm, tolerance, .. } => {
            if *bpm < config::TEMPO_MIN_BPM || *bpm > config::TEMPO_MAX_BPM {
                return Err(invalid(format!(
                    "{} bpm is outside the playable range ({}..{})",
                    bpm,
                    config::TEMPO_MIN_BPM,
                    config::TEMPO_MAX_BPM
                )));
            }
            if *tolerance < 0.0 {
                return Err(invalid("tempo tolerance cannot be negative".to_string()));
            }
            Ok(())
        }
        Constraint::Meter {
            numerator,
            denominator,
            ..
        } => {
            if *numerator == 0 || !denominator.is_power_of_two() || *denominator == 0 {
                return Err(invalid(format!(
                    "{}/{} is not a playable meter",
                    numerator, denominator
                )));
            }
            Ok(())
        }
        Constraint::RangeLimit {
            voice,
            min_pitch,
            max_pitch,
            ..
        } => {
            if min_pitch > max_pitch {
                return Err(invalid(format!(
                    "the pitch range for the {} is upside down ({}..{})",
                    voice, min_pitch, max_pitch
                )));
            }
            if snapshot.layers_with_role(*voice).is_empty() {
                return Err(invalid(format!(
                    "there is no {} layer to range-limit",
                    voice
                )));
            }
            Ok(())
        }
    }
}

fn check_target(target: &EditTarget, snapshot: &ProjectSnapshot) -> Result<(), TypecheckIssue> {
    match target {
        EditTarget::Role { role } => {
            if snapshot.layers_with_role(*role).is_empty() {
                return Err(invalid(format!(
                    "there is no {} layer in this project to protect",
                    role
                )));
            }
        }
        EditTarget::Layer { id } => {
            if snapshot.layer(*id).is_none() {
                return Err(invalid(
                    "a protected layer is no longer in the project".to_string(),
                ));
            }
        }
        EditTarget::Section { id } => {
            if snapshot.section(*id).is_none() {
                return Err(invalid(
                    "a protected section is no longer in the project".to_string(),
                ));
            }
        }
        EditTarget::Tempo | EditTarget::Everything => {}
    }
    Ok(())
}

// ============================================================================
// Conflict detection
// ============================================================================

/// Direct contradictions among hard constraints, and between hard
/// constraints and the goals they would forbid outright.
fn find_conflict(intent: &EditIntent, snapshot: &ProjectSnapshot) -> Option<ConstraintConflict> {
    let hard: Vec<(usize, &Constraint)> = intent
        .constraints
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_hard())
        .collect();

    for (a_pos, &(ai, a)) in hard.iter().enumerate() {
        for &(bi, b) in &hard[a_pos + 1..] {
            if let Some(explanation) = pair_conflict(a, b) {
                return Some(conflict(&[(ai, a), (bi, b)], explanation));
            }
        }
    }

    // A hard tempo pin forbids a goal that sets the tempo elsewhere.
    for &(ai, a) in &hard {
        if let Constraint::Tempo { bpm, tolerance, .. } = a {
            for goal in &intent.goals {
                if let Goal::SetTo {
                    axis: Axis::Tempo,
                    value,
                } = goal
                {
                    if (value - bpm).abs() > *tolerance {
                        return Some(conflict(
                            &[(ai, a)],
                            format!(
                                "the tempo is pinned at {} bpm but the instruction sets it to {}",
                                bpm, value
                            ),
                        ));
                    }
                }
            }
        }
    }

    // Preserving something exactly while aiming every goal at it leaves the
    // planner nowhere to act; report that up front instead of searching.
    if !intent.goals.is_empty() {
        for &(ai, a) in &hard {
            if let Constraint::Preserve {
                target,
                mode: PreserveMode::Exact,
                ..
            } = a
            {
                if target_covers_scope(target, &intent.scope, snapshot) {
                    return Some(conflict(
                        &[(ai, a)],
                        format!(
                            "everything this instruction may touch is inside '{}', \
                             which must stay exactly as it is",
                            target
                        ),
                    ));
                }
            }
        }
    }

    // Only-change lists whose every entry is exactly preserved allow nothing.
    for &(ai, a) in &hard {
        if let Constraint::OnlyChange { targets, .. } = a {
            let all_frozen = targets.iter().all(|t| {
                hard.iter().any(|&(_, c)| {
                    matches!(
                        c,
                        Constraint::Preserve {
                            target,
                            mode: PreserveMode::Exact,
                            ..
                        } if target == t
                    )
                })
            });
            if all_frozen && !intent.goals.is_empty() {
                let parties: Vec<(usize, &Constraint)> = hard
                    .iter()
                    .filter(|&&(i, c)| {
                        i == ai || matches!(c, Constraint::Preserve { target, .. } if targets.contains(target))
                    })
                    .copied()
                    .collect();
                return Some(conflict(
                    &parties,
                    "every layer the instruction is allowed to change must also stay \
                     exactly as it is"
                        .to_string(),
                ));
            }
        }
    }

    None
}

/// A contradiction visible from two constraints alone.
fn pair_conflict(a: &Constraint, b: &Constraint) -> Option<String> {
    match (a, b) {
        (
            Constraint::Tempo {
                bpm: a_bpm,
                tolerance: a_tol,
                ..
            },
            Constraint::Tempo {
                bpm: b_bpm,
                tolerance: b_tol,
                ..
            },
        ) if (a_bpm - b_bpm).abs() > a_tol + b_tol => Some(format!(
            "the tempo cannot be both {} and {} bpm",
            a_bpm, b_bpm
        )),
        (
            Constraint::Meter {
                numerator: an,
                denominator: ad,
                ..
            },
            Constraint::Meter {
                numerator: bn,
                denominator: bd,
                ..
            },
        ) if (an, ad) != (bn, bd) => Some(format!(
            "the meter cannot be both {}/{} and {}/{}",
            an, ad, bn, bd
        )),
        (
            Constraint::Preserve {
                target,
                mode: PreserveMode::Exact,
                ..
            },
            Constraint::OnlyChange { targets, .. },
        )
        | (
            Constraint::OnlyChange { targets, .. },
            Constraint::Preserve {
                target,
                mode: PreserveMode::Exact,
                ..
            },
        ) if targets.len() == 1 && &targets[0] == target => Some(format!(
            "'{}' is both the only thing allowed to change and a thing that \
             must stay exactly as it is",
            target
        )),
        _ => None,
    }
}

/// Whether an exactly-preserved target encloses the whole edit scope.
fn target_covers_scope(target: &EditTarget, scope: &Scope, snapshot: &ProjectSnapshot) -> bool {
    match target {
        EditTarget::Everything => true,
        EditTarget::Layer { id } => matches!(scope, Scope::Layer { id: s } if s == id),
        EditTarget::Role { role } => match scope {
            Scope::Layer { id } => snapshot
                .layer(*id)
                .map(|l| l.role == *role)
                .unwrap_or(false),
            _ => false,
        },
        EditTarget::Section { id } => matches!(scope, Scope::Section { id: s } if s == id),
        EditTarget::Tempo => false,
    }
}

fn conflict(parties: &[(usize, &Constraint)], explanation: String) -> ConstraintConflict {
    ConstraintConflict {
        parties: parties
            .iter()
            .map(|(index, constraint)| ConflictParty {
                index: *index,
                constraint: constraint.to_string(),
            })
            .collect(),
        explanation,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::axis::Amount;
    use crate::intent::Preference;
    use crate::project::model::{Layer, Meter, DEFAULT_PPQ};
    use crate::project::{LayerId, LayerRole, SectionId};
    use std::collections::BTreeMap;

    fn snapshot() -> (ProjectSnapshot, SectionId, LayerId) {
        let chorus = SectionId::new();
        let melody = LayerId::new();
        (
            ProjectSnapshot {
                revision: 1,
                ppq: DEFAULT_PPQ,
                tempo_bpm: 120.0,
                meter: Meter::new(4, 4),
                sections: vec![crate::project::model::Section {
                    id: chorus,
                    name: "chorus".to_string(),
                    start: 0,
                    end: 4 * 1920,
                }],
                layers: vec![Layer {
                    id: melody,
                    name: "melody".to_string(),
                    role: LayerRole::Melody,
                    params: BTreeMap::new(),
                    chain: vec![],
                }],
                cards: BTreeMap::new(),
                events: vec![],
            },
            chorus,
            melody,
        )
    }

    fn edit(scope: Scope, goals: Vec<Goal>, constraints: Vec<Constraint>) -> EditIntent {
        EditIntent {
            scope,
            goals,
            constraints,
            preferences: vec![Preference::FewerEdits],
            assumed_defaults: vec![],
        }
    }

    fn brighter() -> Goal {
        Goal::Increase {
            axis: Axis::Brightness,
            amount: Amount::Moderate,
        }
    }

    #[test]
    fn test_valid_intent_passes() {
        let (snap, chorus, _) = snapshot();
        let intent = edit(
            Scope::Section { id: chorus },
            vec![brighter()],
            vec![Constraint::Preserve {
                target: EditTarget::Role {
                    role: LayerRole::Melody,
                },
                mode: PreserveMode::Exact,
                hard: true,
            }],
        );
        assert_eq!(typecheck(&intent, &snap), Ok(()));
    }

    #[test]
    fn test_missing_section_is_structural() {
        let (snap, _, _) = snapshot();
        let intent = edit(
            Scope::Section {
                id: SectionId::new(),
            },
            vec![brighter()],
            vec![],
        );
        match typecheck(&intent, &snap) {
            Err(TypecheckIssue::Invalid { reason }) => {
                assert!(reason.contains("no longer"), "got {:?}", reason);
            }
            other => panic!("Expected structural rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_preserve_role_without_layer_is_structural() {
        let (snap, chorus, _) = snapshot();
        let intent = edit(
            Scope::Section { id: chorus },
            vec![brighter()],
            vec![Constraint::Preserve {
                target: EditTarget::Role {
                    role: LayerRole::Drums,
                },
                mode: PreserveMode::Exact,
                hard: true,
            }],
        );
        match typecheck(&intent, &snap) {
            Err(TypecheckIssue::Invalid { reason }) => {
                assert!(reason.contains("drums"), "got {:?}", reason);
            }
            other => panic!("Expected structural rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_two_hard_tempos_conflict() {
        let (snap, chorus, _) = snapshot();
        let intent = edit(
            Scope::Section { id: chorus },
            vec![],
            vec![
                Constraint::Tempo {
                    bpm: 120.0,
                    tolerance: 1.0,
                    hard: true,
                },
                Constraint::Tempo {
                    bpm: 90.0,
                    tolerance: 1.0,
                    hard: true,
                },
            ],
        );
        match typecheck(&intent, &snap) {
            Err(TypecheckIssue::Conflict(conflict)) => {
                assert_eq!(conflict.parties.len(), 2);
                assert_eq!(conflict.parties[0].index, 0);
                assert_eq!(conflict.parties[1].index, 1);
                assert!(conflict.explanation.contains("120"));
                assert!(conflict.explanation.contains("90"));
            }
            other => panic!("Expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_soft_tempo_disagreement_is_not_a_conflict() {
        let (snap, chorus, _) = snapshot();
        let intent = edit(
            Scope::Section { id: chorus },
            vec![],
            vec![
                Constraint::Tempo {
                    bpm: 120.0,
                    tolerance: 1.0,
                    hard: true,
                },
                Constraint::Tempo {
                    bpm: 90.0,
                    tolerance: 1.0,
                    hard: false,
                },
            ],
        );
        assert_eq!(typecheck(&intent, &snap), Ok(()));
    }

    #[test]
    fn test_tempo_pin_conflicts_with_set_goal() {
        let (snap, chorus, _) = snapshot();
        let intent = edit(
            Scope::Section { id: chorus },
            vec![Goal::SetTo {
                axis: Axis::Tempo,
                value: 140.0,
            }],
            vec![Constraint::Tempo {
                bpm: 120.0,
                tolerance: 2.0,
                hard: true,
            }],
        );
        match typecheck(&intent, &snap) {
            Err(TypecheckIssue::Conflict(conflict)) => {
                assert!(conflict.explanation.contains("pinned"));
            }
            other => panic!("Expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_preserve_everything_with_goals_conflicts() {
        let (snap, chorus, _) = snapshot();
        let intent = edit(
            Scope::Section { id: chorus },
            vec![brighter()],
            vec![Constraint::Preserve {
                target: EditTarget::Everything,
                mode: PreserveMode::Exact,
                hard: true,
            }],
        );
        assert!(matches!(
            typecheck(&intent, &snap),
            Err(TypecheckIssue::Conflict(_))
        ));
    }

    #[test]
    fn test_preserve_scope_layer_exactly_conflicts() {
        let (snap, _, melody) = snapshot();
        let intent = edit(
            Scope::Layer { id: melody },
            vec![brighter()],
            vec![Constraint::Preserve {
                target: EditTarget::Role {
                    role: LayerRole::Melody,
                },
                mode: PreserveMode::Exact,
                hard: true,
            }],
        );
        match typecheck(&intent, &snap) {
            Err(TypecheckIssue::Conflict(conflict)) => {
                assert!(conflict.explanation.contains("exactly as it is"));
            }
            other => panic!("Expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_only_change_of_frozen_target_conflicts() {
        let (snap, chorus, melody) = snapshot();
        let intent = edit(
            Scope::Section { id: chorus },
            vec![brighter()],
            vec![
                Constraint::OnlyChange {
                    targets: vec![EditTarget::Layer { id: melody }],
                    hard: true,
                },
                Constraint::Preserve {
                    target: EditTarget::Layer { id: melody },
                    mode: PreserveMode::Exact,
                    hard: true,
                },
            ],
        );
        assert!(matches!(
            typecheck(&intent, &snap),
            Err(TypecheckIssue::Conflict(_))
        ));
    }

    #[test]
    fn test_upside_down_range_limit_is_structural() {
        let (snap, chorus, _) = snapshot();
        let intent = edit(
            Scope::Section { id: chorus },
            vec![],
            vec![Constraint::RangeLimit {
                voice: LayerRole::Melody,
                min_pitch: 80,
                max_pitch: 40,
                hard: true,
            }],
        );
        assert!(matches!(
            typecheck(&intent, &snap),
            Err(TypecheckIssue::Invalid { .. })
        ));
    }

    #[test]
    fn test_implausible_tempo_goal_is_structural() {
        let (snap, chorus, _) = snapshot();
        let intent = edit(
            Scope::Section { id: chorus },
            vec![Goal::SetTo {
                axis: Axis::Tempo,
                value: 1200.0,
            }],
            vec![],
        );
        match typecheck(&intent, &snap) {
            Err(TypecheckIssue::Invalid { reason }) => {
                assert!(reason.contains("playable range"));
            }
            other => panic!("Expected structural rejection, got {:?}", other),
        }
    }
}
