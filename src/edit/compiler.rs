//! Package compilation: a selected plan becomes a committed-shape package.
//!
//! The compiler stages the plan's actions on a fork of the snapshot, records
//! the exact diff and its inverse, and re-judges every constraint against
//! that diff. A hard constraint that fails here is an internal fault, not a
//! conversational outcome: the planner only hands over validated plans, so
//! any disagreement between simulation and staging is surfaced as an error
//! rather than silently shipped.
//!
//! Package identity is derived, not random. The same plan against the same
//! revision compiles to the same package id, event ids and all, which is
//! what makes replays and transcript comparisons exact.

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::error::{CompileError, CompileResult};
use crate::explain::{describe_intent, Explanation};
use crate::intent::EditIntent;
use crate::planner::simulate::check_constraints;
use crate::planner::Plan;
use crate::project::diff::ProjectDiff;
use crate::project::model::ProjectSnapshot;
use crate::project::PackageId;

use super::{apply_action, EditPackage};

/// Compile a validated plan into an edit package against a snapshot.
pub fn compile(
    plan: &Plan,
    intent: &EditIntent,
    snapshot: &ProjectSnapshot,
    lexicon_version: &str,
) -> CompileResult<EditPackage> {
    let id = package_id(plan, snapshot)?;

    let mut staged = snapshot.clone();
    for (index, action) in plan.actions.iter().enumerate() {
        apply_action(&mut staged, action, &format!("{}:op{}", id, index))?;
    }
    let diff = ProjectDiff::between(snapshot, &staged);

    // The package guarantees what its diff shows, so the constraints are
    // judged once more against the staged result rather than trusted from
    // planning time.
    let checks = check_constraints(intent, snapshot, &staged, &diff);
    if let Some(violated) = checks.iter().find(|c| c.hard && !c.satisfied) {
        return Err(CompileError::Validation {
            reason: format!(
                "staged edit violates '{}': {}",
                violated.constraint, violated.detail
            ),
        });
    }

    let stats = diff.stats();
    let summary = format!(
        "{} in {}",
        if plan.summary.is_empty() {
            "no change".to_string()
        } else {
            plan.summary.clone()
        },
        crate::explain::describe_scope(&intent.scope, snapshot)
    );
    let explanation = Explanation {
        reading: describe_intent(intent, snapshot),
        levers: plan.levers.clone(),
        assumed: intent
            .assumed_defaults
            .iter()
            .map(|d| format!("{}: {}", d.slot, d.value))
            .collect(),
        checks,
        stats,
    };
    debug!(package = %id, changes = stats.total(), "compiled edit package");
    Ok(EditPackage {
        id,
        created_at: Utc::now(),
        lexicon_version: lexicon_version.to_string(),
        base_revision: snapshot.revision,
        summary,
        operations: plan.actions.clone(),
        inverse: diff.invert(),
        diff,
        explanation,
    })
}

/// Deterministic package identity from the base revision and the serialized
/// operations.
fn package_id(plan: &Plan, snapshot: &ProjectSnapshot) -> CompileResult<PackageId> {
    let ops = serde_json::to_string(&plan.actions)?;
    Ok(PackageId::derived(
        Uuid::NAMESPACE_OID,
        &format!("rev{}:{}", snapshot.revision, ops),
    ))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::axis::{Amount, Axis, PreserveMode};
    use crate::edit::{apply_diff, Action, ActionOp};
    use crate::explain::LeverChoice;
    use crate::intent::{Constraint, EditTarget, Goal, Preference, Scope};
    use crate::project::diff::DiffStats;
    use crate::project::model::{Layer, Meter, NoteEvent, ParamKey, Section, DEFAULT_PPQ};
    use crate::project::{EventId, LayerId, LayerRole, SectionId};
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
        let mut snap = ProjectSnapshot {
            revision: 2,
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

    fn intent(snap: &ProjectSnapshot, constraints: Vec<Constraint>) -> EditIntent {
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

    fn plan_with(actions: Vec<Action>) -> Plan {
        Plan {
            levers: vec![LeverChoice {
                goal: "brightness up (moderate)".to_string(),
                lever: "brightness-up-timbre".to_string(),
                summary: "open filter cutoffs".to_string(),
            }],
            actions,
            checks: vec![],
            stats: DiffStats::default(),
            score: 1.0,
            summary: "open filter cutoffs".to_string(),
        }
    }

    fn cutoff_action(layer: LayerId, snap: &ProjectSnapshot) -> Action {
        Action {
            layer: Some(layer),
            start: 0,
            end: snap.length_ticks(),
            op: ActionOp::AdjustParam {
                param: ParamKey::Cutoff,
                delta: 0.15,
            },
        }
    }

    #[test]
    fn test_same_plan_compiles_to_identical_package() {
        let (snap, _, pads) = snapshot();
        let plan = plan_with(vec![cutoff_action(pads, &snap)]);
        let intent = intent(&snap, vec![]);
        let first = compile(&plan, &intent, &snap, "1.2.0").unwrap();
        let second = compile(&plan, &intent, &snap, "1.2.0").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.diff, second.diff);
        assert_eq!(first.inverse, second.inverse);
    }

    #[test]
    fn test_inverse_diff_restores_base_snapshot() {
        let (snap, melody, _) = snapshot();
        let plan = plan_with(vec![Action {
            layer: Some(melody),
            start: 0,
            end: snap.length_ticks(),
            op: ActionOp::Transpose { semitones: 5 },
        }]);
        let package = compile(&plan, &intent(&snap, vec![]), &snap, "1.2.0").unwrap();
        let mut forward = snap.clone();
        apply_diff(&mut forward, &package.diff).unwrap();
        let mut back = forward.clone();
        apply_diff(&mut back, &package.inverse).unwrap();
        assert_eq!(back, snap);
    }

    #[test]
    fn test_hard_violation_at_staging_is_an_error() {
        let (snap, melody, _) = snapshot();
        let plan = plan_with(vec![Action {
            layer: Some(melody),
            start: 0,
            end: snap.length_ticks(),
            op: ActionOp::Transpose { semitones: 5 },
        }]);
        let guarded = intent(
            &snap,
            vec![Constraint::Preserve {
                target: EditTarget::Role {
                    role: LayerRole::Melody,
                },
                mode: PreserveMode::Exact,
                hard: true,
            }],
        );
        match compile(&plan, &guarded, &snap, "1.2.0") {
            Err(CompileError::Validation { reason }) => {
                assert!(reason.contains("preserve the melody"), "got {:?}", reason);
            }
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_package_carries_explanation_and_base_revision() {
        let (snap, _, pads) = snapshot();
        let plan = plan_with(vec![cutoff_action(pads, &snap)]);
        let package = compile(&plan, &intent(&snap, vec![]), &snap, "1.2.0").unwrap();
        assert_eq!(package.base_revision, 2);
        assert_eq!(package.lexicon_version, "1.2.0");
        assert!(package.summary.contains("chorus"));
        assert!(package.explanation.reading.contains("brightness"));
        assert_eq!(package.explanation.stats.params_changed, 1);
    }

    #[test]
    fn test_empty_plan_compiles_to_empty_diff() {
        let (snap, _, _) = snapshot();
        let plan = Plan {
            levers: vec![],
            actions: vec![],
            checks: vec![],
            stats: DiffStats::default(),
            score: 1.0,
            summary: String::new(),
        };
        let package = compile(&plan, &intent(&snap, vec![]), &snap, "1.2.0").unwrap();
        assert!(package.diff.is_empty());
        assert!(package.inverse.is_empty());
        assert!(package.summary.contains("no change"));
    }
}
