//! Bounded candidate generation: goals to concrete action bundles.
//!
//! For each goal the search collects the levers that answer it, binds each
//! lever's templates against the resolved scope into concrete [`Action`]s,
//! and then combines one binding per goal into candidate plans. Everything
//! is capped: alternatives per goal by `search_width`, candidates by
//! `max_plan_candidates`, actions per candidate by `max_plan_actions`.
//! Enumeration order is lever declaration order, which is the deterministic
//! tie-break the scorer relies on.

use tracing::debug;

use crate::canon::axis::{Amount, Element};
use crate::canon::lever::{ActionTemplate, Lever, LeverKey, LeverTable};
use crate::config::{self, CompilerConfig};
use crate::edit::{Action, ActionOp};
use crate::host::ReasoningEngine;
use crate::intent::{EditIntent, Goal, Scope, Subject};
use crate::project::model::{ProjectSnapshot, Tick};
use crate::project::{LayerId, LayerRole};

// ============================================================================
// Candidates
// ============================================================================

/// One lever bound to concrete actions for one goal.
#[derive(Debug, Clone, PartialEq)]
pub struct GoalBinding {
    pub goal_index: usize,
    /// Position of the lever in the canon table; the final tie-break.
    pub lever_order: usize,
    pub lever_id: String,
    pub summary: String,
    /// Set when the reasoning engine proposed this lever.
    pub advised: bool,
    pub actions: Vec<Action>,
}

/// One binding per goal; a whole-plan candidate before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub choices: Vec<GoalBinding>,
}

impl Candidate {
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.choices.iter().flat_map(|c| c.actions.iter())
    }

    pub fn action_count(&self) -> usize {
        self.choices.iter().map(|c| c.actions.len()).sum()
    }

    /// Lexicographic key over lever declaration orders, used for the
    /// deterministic tie-break among equal-scored candidates.
    pub fn order_key(&self) -> Vec<usize> {
        self.choices.iter().map(|c| c.lever_order).collect()
    }
}

// ============================================================================
// Enumeration
// ============================================================================

/// Enumerate candidate plans for an intent.
///
/// Returns a human-readable reason instead when some goal has no bindable
/// tactic in this project; the caller reports that as infeasibility.
pub fn enumerate(
    intent: &EditIntent,
    snapshot: &ProjectSnapshot,
    levers: &LeverTable,
    engine: &dyn ReasoningEngine,
    config: &CompilerConfig,
) -> Result<Vec<Candidate>, String> {
    let mut per_goal: Vec<Vec<GoalBinding>> = Vec::with_capacity(intent.goals.len());
    for (index, goal) in intent.goals.iter().enumerate() {
        let alternatives = alternatives_for(index, goal, &intent.scope, snapshot, levers, engine, config);
        if alternatives.is_empty() {
            return Err(format!(
                "no tactic can {} with the material in {}",
                goal,
                scope_noun(&intent.scope, snapshot)
            ));
        }
        per_goal.push(alternatives);
    }

    let mut candidates: Vec<Candidate> = Vec::new();
    let mut cursor = vec![0usize; per_goal.len()];
    loop {
        if candidates.len() >= config.max_plan_candidates {
            break;
        }
        let candidate = Candidate {
            choices: cursor
                .iter()
                .zip(&per_goal)
                .map(|(&i, alts)| alts[i].clone())
                .collect(),
        };
        if candidate.action_count() <= config.max_plan_actions {
            candidates.push(candidate);
        }
        // Odometer increment, last goal fastest, so earlier levers come first.
        let mut pos = per_goal.len();
        loop {
            if pos == 0 {
                debug!(candidates = candidates.len(), "candidate enumeration complete");
                return Ok(candidates);
            }
            pos -= 1;
            cursor[pos] += 1;
            if cursor[pos] < per_goal[pos].len() {
                break;
            }
            cursor[pos] = 0;
        }
    }
    debug!(candidates = candidates.len(), "candidate cap reached");
    Ok(candidates)
}

/// Bindable levers for one goal, declaration order first, engine advice
/// after, truncated to the search width.
fn alternatives_for(
    goal_index: usize,
    goal: &Goal,
    scope: &Scope,
    snapshot: &ProjectSnapshot,
    levers: &LeverTable,
    engine: &dyn ReasoningEngine,
    config: &CompilerConfig,
) -> Vec<GoalBinding> {
    let Some(key) = lever_key(goal) else {
        return Vec::new();
    };
    let mut out: Vec<GoalBinding> = Vec::new();
    for (order, lever) in levers.matching(&key) {
        if let Some(actions) = bind_lever(lever, goal, scope, snapshot) {
            out.push(GoalBinding {
                goal_index,
                lever_order: order,
                lever_id: lever.id.clone(),
                summary: lever.summary.clone(),
                advised: false,
                actions,
            });
        }
    }
    // Advisory suggestions join after the table's own order; they are never
    // trusted to skip binding or validation.
    for answer in engine.query(goal) {
        if out.iter().any(|b| b.lever_id == answer.lever) {
            continue;
        }
        let Some(lever) = levers.lever(&answer.lever) else {
            continue;
        };
        if lever.key != key {
            continue;
        }
        let order = levers
            .matching(&key)
            .iter()
            .find(|(_, l)| l.id == lever.id)
            .map(|(o, _)| *o)
            .unwrap_or(usize::MAX);
        if let Some(actions) = bind_lever(lever, goal, scope, snapshot) {
            out.push(GoalBinding {
                goal_index,
                lever_order: order,
                lever_id: lever.id.clone(),
                summary: lever.summary.clone(),
                advised: true,
                actions,
            });
        }
    }
    out.truncate(config.search_width);
    out
}

/// The table key a goal looks up.
fn lever_key(goal: &Goal) -> Option<LeverKey> {
    match goal {
        Goal::Increase { axis, .. } => Some(LeverKey::Move {
            axis: axis.clone(),
            direction: crate::canon::axis::Direction::Up,
        }),
        Goal::Decrease { axis, .. } => Some(LeverKey::Move {
            axis: axis.clone(),
            direction: crate::canon::axis::Direction::Down,
        }),
        Goal::SetTo { axis, .. } => Some(LeverKey::Set { axis: axis.clone() }),
        Goal::Introduce { subject, .. } => match subject_element(subject) {
            Some(element) => Some(LeverKey::IntroduceElement { element }),
            None => None,
        },
        Goal::Remove { subject, .. } => match subject {
            Subject::Role { .. } => Some(LeverKey::RemoveRole),
            Subject::Element { .. } => subject_element(subject)
                .map(|element| Some(LeverKey::RemoveElement { element }))
                .unwrap_or(None),
        },
    }
}

/// Role subjects that are really elements ("add a countermelody").
fn subject_element(subject: &Subject) -> Option<Element> {
    match subject {
        Subject::Element { element } => Some(element.clone()),
        Subject::Role {
            role: LayerRole::Countermelody,
        } => Some(Element::Countermelody),
        Subject::Role { .. } => None,
    }
}

// ============================================================================
// Binding
// ============================================================================

/// Instantiate a lever's templates against the scope. `None` when the lever
/// has nothing to act on here.
fn bind_lever(
    lever: &Lever,
    goal: &Goal,
    scope: &Scope,
    snapshot: &ProjectSnapshot,
) -> Option<Vec<Action>> {
    let (start, end) = snapshot.scope_range(scope);
    let amount = goal_amount(goal);
    let mut actions: Vec<Action> = Vec::new();
    for template in &lever.actions {
        if is_transport(template) {
            // Transport moves are global by nature; a section-scoped request
            // must not bend the whole piece's tempo.
            if !snapshot.scope_is_global(scope) {
                return None;
            }
            actions.push(Action {
                layer: None,
                start,
                end,
                op: bind_transport(template, goal, amount, snapshot)?,
            });
            continue;
        }
        let targets = target_layers(lever, goal, template, scope, snapshot);
        if targets.is_empty() {
            return None;
        }
        for layer in targets {
            actions.push(Action {
                layer: Some(layer),
                start,
                end,
                op: bind_template(template, amount, snapshot)?,
            });
        }
    }
    Some(actions)
}

fn goal_amount(goal: &Goal) -> Amount {
    match goal {
        Goal::Increase { amount, .. } | Goal::Decrease { amount, .. } => *amount,
        Goal::Introduce { amount, .. } | Goal::Remove { amount, .. } => {
            amount.unwrap_or(Amount::Moderate)
        }
        Goal::SetTo { .. } => Amount::Moderate,
    }
}

fn is_transport(template: &ActionTemplate) -> bool {
    matches!(
        template,
        ActionTemplate::ScaleTempo { .. } | ActionTemplate::SetTempoValue
    )
}

/// Whether a template creates material rather than reshaping what is there.
/// Introducing templates may land on layers silent in the scope.
fn introduces(template: &ActionTemplate) -> bool {
    matches!(
        template,
        ActionTemplate::EchoEvents { .. } | ActionTemplate::InsertEffect { .. }
    )
}

/// Layers a template lands on within the scope.
fn target_layers(
    lever: &Lever,
    goal: &Goal,
    template: &ActionTemplate,
    scope: &Scope,
    snapshot: &ProjectSnapshot,
) -> Vec<LayerId> {
    // An explicit layer scope overrides the lever's role filter.
    if let Scope::Layer { id } = scope {
        return vec![*id];
    }
    // Removing a role's material binds to that role regardless of filters.
    if let Goal::Remove {
        subject: Subject::Role { role },
        ..
    } = goal
    {
        if lever.key == LeverKey::RemoveRole {
            let sounding = snapshot.layers_in_scope(scope);
            return snapshot
                .layers_with_role(*role)
                .iter()
                .map(|l| l.id)
                .filter(|id| sounding.contains(id))
                .collect();
        }
    }
    if lever.apply_to.is_empty() {
        return snapshot.layers_in_scope(scope);
    }
    let sounding = snapshot.layers_in_scope(scope);
    let mut out: Vec<LayerId> = Vec::new();
    for role in &lever.apply_to {
        for layer in snapshot.layers_with_role(*role) {
            let eligible = introduces(template) || sounding.contains(&layer.id);
            if eligible && !out.contains(&layer.id) {
                out.push(layer.id);
                // One layer per lever keeps edits small; the first matching
                // role in apply_to order wins.
                if introduces(template) {
                    return out;
                }
            }
        }
    }
    out
}

/// Scale a template's magnitudes by the goal amount and convert beats to
/// ticks at the project's resolution.
fn bind_template(
    template: &ActionTemplate,
    amount: Amount,
    snapshot: &ProjectSnapshot,
) -> Option<ActionOp> {
    let factor = amount.factor();
    let op = match template {
        ActionTemplate::Transpose { semitones } => ActionOp::Transpose {
            semitones: scale_semitones(*semitones, factor),
        },
        ActionTemplate::ScaleVelocity { factor: f } => ActionOp::ScaleVelocity {
            factor: 1.0 + (f - 1.0) * factor,
        },
        ActionTemplate::ShiftEvents { beats } => ActionOp::ShiftEvents {
            ticks: beats_to_ticks(beats * factor, snapshot.ppq),
        },
        ActionTemplate::ThinEvents { keep_ratio } => ActionOp::ThinEvents {
            keep_ratio: (1.0 - (1.0 - keep_ratio) * factor).clamp(0.05, 1.0),
        },
        ActionTemplate::ClearEvents => ActionOp::ClearEvents,
        ActionTemplate::EchoEvents {
            source_role,
            offset_beats,
            transpose,
        } => {
            let source = snapshot.layers_with_role(*source_role).first()?.id;
            ActionOp::EchoEvents {
                source_layer: source,
                offset_ticks: beats_to_ticks(*offset_beats, snapshot.ppq),
                transpose: *transpose,
            }
        }
        ActionTemplate::AdjustParam { param, delta } => ActionOp::AdjustParam {
            param: *param,
            delta: delta * factor,
        },
        ActionTemplate::SetParam { param, value } => ActionOp::SetParam {
            param: *param,
            value: *value,
        },
        ActionTemplate::InsertEffect { effect } => ActionOp::InsertEffect { effect: *effect },
        ActionTemplate::RemoveEffect { effect } => ActionOp::RemoveEffect { effect: *effect },
        ActionTemplate::ScaleTempo { .. } | ActionTemplate::SetTempoValue => return None,
    };
    Some(op)
}

fn bind_transport(
    template: &ActionTemplate,
    goal: &Goal,
    amount: Amount,
    snapshot: &ProjectSnapshot,
) -> Option<ActionOp> {
    match template {
        ActionTemplate::ScaleTempo { factor } => {
            let scaled = 1.0 + (factor - 1.0) * amount.factor();
            let bpm = (snapshot.tempo_bpm * scaled)
                .clamp(config::TEMPO_MIN_BPM, config::TEMPO_MAX_BPM);
            Some(ActionOp::SetTempo { bpm })
        }
        ActionTemplate::SetTempoValue => match goal {
            Goal::SetTo { value, .. } => Some(ActionOp::SetTempo { bpm: *value }),
            _ => None,
        },
        _ => None,
    }
}

fn scale_semitones(semitones: i32, factor: f64) -> i32 {
    let scaled = (semitones as f64 * factor).round() as i32;
    if scaled == 0 && semitones != 0 {
        semitones.signum()
    } else {
        scaled
    }
}

fn beats_to_ticks(beats: f64, ppq: Tick) -> Tick {
    (beats * ppq as f64).round() as Tick
}

fn scope_noun(scope: &Scope, snapshot: &ProjectSnapshot) -> String {
    crate::explain::describe_scope(scope, snapshot)
}

// ============================================================================
// Tests
// ============================================================================
