//! Bounded planning: from a typed intent to a validated, scored plan.
//!
//! The planner walks a fixed set of phases. Candidate generation binds
//! levers to concrete actions, validation simulates each candidate and
//! rejects hard constraint violations, scoring ranks the survivors, and
//! selection either picks a clear winner or surfaces near-ties as an
//! explicit choice. Every phase is bounded by [`CompilerConfig`] and the
//! whole walk is deterministic for a given snapshot and canon.

pub mod search;
pub mod simulate;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::canon::lever::LeverTable;
use crate::config::CompilerConfig;
use crate::edit::Action;
use crate::explain::{ConstraintCheck, LeverChoice};
use crate::host::ReasoningEngine;
use crate::intent::{EditIntent, Preference};
use crate::project::diff::DiffStats;
use crate::project::model::ProjectSnapshot;

use search::Candidate;
use simulate::Simulated;

// ============================================================================
// Plans
// ============================================================================

/// A validated, scored plan ready for package compilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Which lever answered each goal, in goal order.
    pub levers: Vec<LeverChoice>,
    pub actions: Vec<Action>,
    /// Constraint verdicts from simulation, all satisfied on hard ones.
    pub checks: Vec<ConstraintCheck>,
    pub stats: DiffStats,
    pub score: f64,
    /// One line naming the tactics, used as an option label.
    pub summary: String,
}

/// Why no plan exists for an intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Infeasibility {
    pub reason: String,
    /// Constraints every candidate fell to, when that is what blocked.
    pub blocking: Vec<String>,
}

/// Result of a planning walk.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutcome {
    /// One plan clearly won.
    Selected { plan: Plan },
    /// The best plans score within epsilon of each other; the user picks.
    Options { plans: Vec<Plan> },
    /// No candidate satisfies the hard constraints.
    Infeasible(Infeasibility),
}

/// Phases of one planning walk, in order. Tracked for tracing and tested
/// for coverage; the walk never revisits a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerPhase {
    Idle,
    GeneratingCandidates,
    Validating,
    Scoring,
    Selected,
    Infeasible,
}

// ============================================================================
// Planning
// ============================================================================

/// Plan an intent against a snapshot.
pub fn plan(
    intent: &EditIntent,
    snapshot: &ProjectSnapshot,
    levers: &LeverTable,
    engine: &dyn ReasoningEngine,
    config: &CompilerConfig,
) -> crate::error::CompileResult<PlanOutcome> {
    let mut phase = PlannerPhase::Idle;

    // "keep it the same" compiles to a plan that does nothing.
    if intent.goals.is_empty() {
        debug!("empty goal set, empty plan");
        return Ok(PlanOutcome::Selected {
            plan: Plan {
                levers: vec![],
                actions: vec![],
                checks: vec![],
                stats: DiffStats::default(),
                score: 1.0,
                summary: "leave everything as it is".to_string(),
            },
        });
    }

    phase = advance(phase, PlannerPhase::GeneratingCandidates);
    let candidates = match search::enumerate(intent, snapshot, levers, engine, config) {
        Ok(candidates) => candidates,
        Err(reason) => {
            advance(phase, PlannerPhase::Infeasible);
            return Ok(PlanOutcome::Infeasible(Infeasibility {
                reason,
                blocking: vec![],
            }));
        }
    };

    phase = advance(phase, PlannerPhase::Validating);
    let mut survivors: Vec<(Candidate, Simulated)> = Vec::new();
    let mut blocking: Vec<String> = Vec::new();
    for candidate in candidates {
        let simulated = simulate::simulate(&candidate, intent, snapshot)?;
        match simulated.hard_violation() {
            Some(violation) => {
                if !blocking.contains(&violation.constraint) {
                    blocking.push(violation.constraint.clone());
                }
            }
            None => survivors.push((candidate, simulated)),
        }
    }
    if survivors.is_empty() {
        advance(phase, PlannerPhase::Infeasible);
        let reason = if blocking.is_empty() {
            "no candidate plan could be simulated".to_string()
        } else {
            format!(
                "every way of doing this violates: {}",
                blocking.join("; ")
            )
        };
        return Ok(PlanOutcome::Infeasible(Infeasibility { reason, blocking }));
    }

    phase = advance(phase, PlannerPhase::Scoring);
    let mut plans: Vec<(Vec<usize>, Plan)> = survivors
        .into_iter()
        .map(|(candidate, simulated)| {
            let score = score(&candidate, &simulated, intent, snapshot, config);
            let key = candidate.order_key();
            (key, build_plan(candidate, simulated, intent, score))
        })
        .collect();
    // Best score first; equal scores fall back to lever declaration order.
    plans.sort_by(|(ka, a), (kb, b)| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| ka.cmp(kb))
    });
    // Distinct plans only: alternatives that compile to the same actions are
    // the same plan however they were reached.
    let mut distinct: Vec<Plan> = Vec::new();
    for (_, plan) in plans {
        if !distinct.iter().any(|p| p.actions == plan.actions) {
            distinct.push(plan);
        }
    }

    let near: Vec<Plan> = distinct
        .iter()
        .take(config.max_surfaced_options)
        .filter(|p| distinct[0].score - p.score < config.plan_epsilon)
        .cloned()
        .collect();
    if near.len() > 1 {
        advance(phase, PlannerPhase::Selected);
        debug!(options = near.len(), "plans within epsilon, surfacing choice");
        return Ok(PlanOutcome::Options { plans: near });
    }
    advance(phase, PlannerPhase::Selected);
    let plan = distinct.remove(0);
    debug!(score = plan.score, summary = %plan.summary, "plan selected");
    Ok(PlanOutcome::Selected { plan })
}

fn advance(from: PlannerPhase, to: PlannerPhase) -> PlannerPhase {
    debug!(?from, ?to, "planner phase");
    to
}

fn build_plan(candidate: Candidate, simulated: Simulated, intent: &EditIntent, score: f64) -> Plan {
    let summary = candidate
        .choices
        .iter()
        .map(|c| c.summary.clone())
        .collect::<Vec<_>>()
        .join("; ");
    Plan {
        levers: candidate
            .choices
            .iter()
            .map(|c| LeverChoice {
                goal: intent
                    .goals
                    .get(c.goal_index)
                    .map(|g| g.to_string())
                    .unwrap_or_default(),
                lever: c.lever_id.clone(),
                summary: c.summary.clone(),
            })
            .collect(),
        actions: candidate.actions().cloned().collect(),
        checks: simulated.checks,
        stats: simulated.diff.stats(),
        score,
        summary,
    }
}

// ============================================================================
// Scoring
// ============================================================================

/// Higher is better. Starts from 1.0 and applies soft-constraint penalties,
/// diff-size cost, and layer preferences.
fn score(
    candidate: &Candidate,
    simulated: &Simulated,
    intent: &EditIntent,
    snapshot: &ProjectSnapshot,
    config: &CompilerConfig,
) -> f64 {
    let stats = simulated.diff.stats();
    let mut score = 1.0;
    score -= config.soft_violation_penalty * simulated.soft_violations() as f64;
    score -= config.diff_cost_weight * stats.total() as f64;
    let fewer_edits = intent
        .preferences
        .iter()
        .any(|p| matches!(p, Preference::FewerEdits));
    if fewer_edits {
        score -= config.fewer_edits_weight * candidate.action_count() as f64;
    }
    let touched = simulated.diff.touched_layers();
    for preference in &intent.preferences {
        match preference {
            Preference::PreferLayer { role } => {
                let all_preferred = !touched.is_empty()
                    && touched.iter().all(|id| {
                        snapshot.layer(*id).map(|l| l.role == *role).unwrap_or(false)
                    });
                if all_preferred {
                    score += config.prefer_layer_boost;
                }
            }
            Preference::AvoidLayer { role } => {
                let avoided_hits = touched
                    .iter()
                    .filter(|id| {
                        snapshot.layer(**id).map(|l| l.role == *role).unwrap_or(false)
                    })
                    .count();
                score -= config.avoid_layer_penalty * avoided_hits as f64;
            }
            Preference::FewerEdits => {}
        }
    }
    score
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::axis::{Amount, Axis, PreserveMode};
    use crate::canon::CanonBundle;
    use crate::edit::ActionOp;
    use crate::host::NoReasoning;
    use crate::intent::{Constraint, EditTarget, Goal, Scope};
    use crate::project::model::{Layer, Meter, NoteEvent, Section, DEFAULT_PPQ};
    use crate::project::{EventId, LayerId, LayerRole, SectionId};
    use std::collections::BTreeMap;

    fn snapshot() -> ProjectSnapshot {
        let bar = Meter::new(4, 4).ticks_per_bar(DEFAULT_PPQ);
        let melody = LayerId::new();
        let pads = LayerId::new();
        let bass = LayerId::new();
        let mut events = Vec::new();
        for i in 0..4 {
            events.push(NoteEvent {
                id: EventId::new(),
                layer: melody,
                start: 4 * bar + i * 480,
                duration: 240,
                pitch: 62 + i as u8,
                velocity: 92,
            });
            events.push(NoteEvent {
                id: EventId::new(),
                layer: pads,
                start: 4 * bar + i * 960,
                duration: 900,
                pitch: 50 + i as u8,
                velocity: 70,
            });
            events.push(NoteEvent {
                id: EventId::new(),
                layer: bass,
                start: 4 * bar + i * 960,
                duration: 450,
                pitch: 38,
                velocity: 96,
            });
        }
        let mut snap = ProjectSnapshot {
            revision: 3,
            ppq: DEFAULT_PPQ,
            tempo_bpm: 118.0,
            meter: Meter::new(4, 4),
            sections: vec![
                Section {
                    id: SectionId::new(),
                    name: "verse".to_string(),
                    start: 0,
                    end: 4 * bar,
                },
                Section {
                    id: SectionId::new(),
                    name: "chorus".to_string(),
                    start: 4 * bar,
                    end: 8 * bar,
                },
            ],
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
                Layer {
                    id: bass,
                    name: "bass".to_string(),
                    role: LayerRole::Bass,
                    params: BTreeMap::new(),
                    chain: vec![],
                },
            ],
            cards: BTreeMap::new(),
            events,
        };
        snap.normalize();
        snap
    }

    fn chorus(snap: &ProjectSnapshot) -> Scope {
        Scope::Section {
            id: snap.sections.iter().find(|s| s.name == "chorus").unwrap().id,
        }
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

    fn run(intent: &EditIntent, snap: &ProjectSnapshot) -> PlanOutcome {
        let canon = CanonBundle::embedded().unwrap();
        plan(
            intent,
            snap,
            &canon.levers,
            &NoReasoning,
            &CompilerConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_goals_yield_empty_plan() {
        let snap = snapshot();
        let outcome = run(&edit(chorus(&snap), vec![], vec![]), &snap);
        match outcome {
            PlanOutcome::Selected { plan } => {
                assert!(plan.actions.is_empty());
                assert_eq!(plan.stats.total(), 0);
            }
            other => panic!("Expected empty plan, got {:?}", other),
        }
    }

    #[test]
    fn test_preserved_melody_steers_plan_elsewhere() {
        let snap = snapshot();
        let melody_exact = Constraint::Preserve {
            target: EditTarget::Role {
                role: LayerRole::Melody,
            },
            mode: PreserveMode::Exact,
            hard: true,
        };
        let intent = edit(
            chorus(&snap),
            vec![Goal::Increase {
                axis: Axis::Brightness,
                amount: Amount::Moderate,
            }],
            vec![melody_exact],
        );
        match run(&intent, &snap) {
            PlanOutcome::Selected { plan } => {
                let melody_id = snap.layers_with_role(LayerRole::Melody)[0].id;
                for check in &plan.checks {
                    assert!(check.satisfied, "failed check: {:?}", check);
                }
                for action in &plan.actions {
                    if let ActionOp::Transpose { .. } = action.op {
                        assert_ne!(action.layer, Some(melody_id));
                    }
                }
            }
            PlanOutcome::Options { plans } => {
                assert!(plans.iter().all(|p| p.checks.iter().all(|c| c.satisfied)));
            }
            other => panic!("Expected a plan, got {:?}", other),
        }
    }

    #[test]
    fn test_contradictory_freeze_is_infeasible_with_named_constraint() {
        let snap = snapshot();
        let freeze_all = Constraint::Preserve {
            target: EditTarget::Everything,
            mode: PreserveMode::Exact,
            hard: true,
        };
        let intent = edit(
            chorus(&snap),
            vec![Goal::Increase {
                axis: Axis::Brightness,
                amount: Amount::Moderate,
            }],
            vec![freeze_all],
        );
        match run(&intent, &snap) {
            PlanOutcome::Infeasible(infeasibility) => {
                assert!(
                    infeasibility
                        .blocking
                        .iter()
                        .any(|c| c.contains("preserve everything")),
                    "got {:?}",
                    infeasibility
                );
            }
            other => panic!("Expected infeasible, got {:?}", other),
        }
    }

    #[test]
    fn test_avoid_layer_preference_lowers_plans_touching_it() {
        let snap = snapshot();
        let mut intent = edit(
            chorus(&snap),
            vec![Goal::Increase {
                axis: Axis::Warmth,
                amount: Amount::Moderate,
            }],
            vec![],
        );
        intent.preferences = vec![Preference::AvoidLayer {
            role: LayerRole::Bass,
        }];
        let canon = CanonBundle::embedded().unwrap();
        let config = CompilerConfig {
            // Make the penalty decisive so the test pins the ordering.
            avoid_layer_penalty: 10.0,
            plan_epsilon: 0.0001,
            ..CompilerConfig::default()
        };
        let outcome = plan(&intent, &snap, &canon.levers, &NoReasoning, &config).unwrap();
        let bass_id = snap.layers_with_role(LayerRole::Bass)[0].id;
        match outcome {
            PlanOutcome::Selected { plan } => {
                assert!(plan.actions.iter().all(|a| a.layer != Some(bass_id)));
            }
            PlanOutcome::Options { plans } => {
                assert!(plans[0].actions.iter().all(|a| a.layer != Some(bass_id)));
            }
            other => panic!("Expected a plan, got {:?}", other),
        }
    }

    #[test]
    fn test_near_ties_surface_as_options() {
        let snap = snapshot();
        let intent = edit(
            chorus(&snap),
            vec![Goal::Increase {
                axis: Axis::Brightness,
                amount: Amount::Moderate,
            }],
            vec![],
        );
        let canon = CanonBundle::embedded().unwrap();
        // A huge epsilon makes every surviving plan a near-tie.
        let config = CompilerConfig {
            plan_epsilon: 10.0,
            ..CompilerConfig::default()
        };
        match plan(&intent, &snap, &canon.levers, &NoReasoning, &config).unwrap() {
            PlanOutcome::Options { plans } => {
                assert!(plans.len() > 1);
                assert!(plans.len() <= config.max_surfaced_options);
                let first_two: Vec<&str> =
                    plans.iter().take(2).map(|p| p.summary.as_str()).collect();
                assert_ne!(first_two[0], first_two[1]);
            }
            other => panic!("Expected options, got {:?}", other),
        }
    }

    #[test]
    fn test_planning_is_deterministic() {
        let snap = snapshot();
        let intent = edit(
            chorus(&snap),
            vec![Goal::Decrease {
                axis: Axis::Energy,
                amount: Amount::Slight,
            }],
            vec![],
        );
        let first = run(&intent, &snap);
        let second = run(&intent, &snap);
        assert_eq!(first, second);
    }
}
