//! Semantic composition: parse readings into intent drafts.
//!
//! Composition walks the clause list of each surviving reading and folds it
//! into one [`IntentDraft`]. It is a pure tree transform: no project state,
//! no dialogue state, only what the utterance itself says. Anything the
//! utterance leaves open in a way the later resolver cannot settle from
//! context becomes an explicit [`Hole`].
//!
//! Readings that cannot form a well-shaped intent (a command mixed into an
//! edit, goals aimed at two different places) are rejected with a reason
//! rather than silently repaired. Distinct readings that compose to the same
//! draft collapse here, so spurious grammatical ambiguity never reaches the
//! user.

use crate::canon::axis::Amount;
use crate::parser::forest::ParseForest;
use crate::parser::grammar::{ClauseSem, CommandSem, GoalSem, NodeSem, NounSem};

use super::{
    AssumedDefault, DraftAction, EditDraft, GoalDraft, Hole, HoleBinding, HoleCandidate, HoleKind,
    IntentDraft, Preference, RefSite, ScopeRef,
};

// ============================================================================
// Entry point
// ============================================================================

/// Result of composing every candidate reading of one utterance.
#[derive(Debug)]
pub struct Composition {
    /// Structurally distinct interpretations, best reading first.
    pub drafts: Vec<IntentDraft>,
    /// Why readings were dropped, used when nothing survives.
    pub rejections: Vec<String>,
}

/// Compose each candidate root into a draft, folding duplicates.
pub fn compose(utterance: &str, forest: &ParseForest, roots: &[usize]) -> Composition {
    let mut drafts: Vec<IntentDraft> = Vec::new();
    let mut rejections: Vec<String> = Vec::new();
    for &root in roots {
        let NodeSem::Utterance(clauses) = &forest.nodes[root].sem else {
            continue;
        };
        match compose_reading(utterance, clauses) {
            Ok(draft) => {
                if !drafts.contains(&draft) {
                    drafts.push(draft);
                }
            }
            Err(reason) => {
                if !rejections.contains(&reason) {
                    rejections.push(reason);
                }
            }
        }
    }
    Composition { drafts, rejections }
}

// ============================================================================
// One reading
// ============================================================================

fn compose_reading(utterance: &str, clauses: &[ClauseSem]) -> Result<IntentDraft, String> {
    if let Some(command) = clauses.iter().find_map(|c| match c {
        ClauseSem::Command(command) => Some(command),
        _ => None,
    }) {
        if clauses.len() > 1 {
            return Err(
                "undo, redo, inspect, and explain stand alone; send edits as their own instruction"
                    .to_string(),
            );
        }
        let action = match command {
            CommandSem::Undo => DraftAction::Undo,
            CommandSem::Redo => DraftAction::Redo,
            CommandSem::Again => DraftAction::Again,
            CommandSem::Explain => DraftAction::Explain,
            CommandSem::Inspect { scope } => DraftAction::Inspect {
                scope: scope.clone(),
            },
        };
        return Ok(IntentDraft {
            utterance: utterance.to_string(),
            action,
            holes: Vec::new(),
        });
    }

    let mut edit = EditDraft {
        scope: ScopeRef::Implied,
        goals: Vec::new(),
        constraints: Vec::new(),
        preferences: Vec::new(),
        assumed_defaults: Vec::new(),
    };
    let mut holes: Vec<Hole> = Vec::new();
    let mut goal_scopes: Vec<ScopeRef> = Vec::new();
    let mut baseline_goals: Vec<usize> = Vec::new();

    for clause in clauses {
        match clause {
            ClauseSem::Goal(goal) => {
                let offset = edit.goals.len();
                fold_goal_clause(goal, offset, &mut edit, &mut holes, &mut baseline_goals);
                goal_scopes.push(goal.scope.clone());
            }
            ClauseSem::Constraint { draft, defaults } => {
                edit.constraints.push(draft.clone());
                edit.assumed_defaults.extend(defaults.iter().cloned());
            }
            ClauseSem::Pref(pref) => edit.preferences.push(pref.clone()),
            ClauseSem::Command(_) => {}
        }
    }

    edit.scope = unify_scopes(&goal_scopes)?;
    apply_amount_defaults(&mut edit, &baseline_goals);

    Ok(IntentDraft {
        utterance: utterance.to_string(),
        action: DraftAction::Edit(edit),
        holes,
    })
}

fn fold_goal_clause(
    goal: &GoalSem,
    offset: usize,
    edit: &mut EditDraft,
    holes: &mut Vec<Hole>,
    baseline_goals: &mut Vec<usize>,
) {
    edit.goals.extend(goal.goals.iter().cloned());
    edit.constraints.extend(goal.constraints.iter().cloned());
    edit.assumed_defaults.extend(goal.defaults.iter().cloned());
    for baseline in &goal.baselines {
        let index = offset + baseline.goal;
        baseline_goals.push(index);
        holes.push(baseline_hole(holes.len() as u32, index, &baseline.noun));
    }
}

/// A comparative baseline cannot be measured offline, so the difference it
/// implies is asked for rather than guessed.
fn baseline_hole(id: u32, goal_index: usize, noun: &NounSem) -> Hole {
    let place = noun_gloss(noun);
    let candidates = [
        (Amount::Slight, "just noticeable", 0.25),
        (Amount::Moderate, "a clear step", 0.5),
        (Amount::Strong, "a big step", 0.25),
    ]
    .into_iter()
    .map(|(amount, label, score)| HoleCandidate {
        label: format!("{} ({})", amount, label),
        binding: HoleBinding::Amount(amount),
        score,
    })
    .collect();
    Hole {
        id,
        site: RefSite::Goal { index: goal_index },
        kind: HoleKind::Baseline,
        span: noun.span(),
        question: format!(
            "taking {} as the reference, how big should the difference be?",
            place
        ),
        candidates,
    }
}

// ============================================================================
// Scope unification
// ============================================================================

/// Combine the scopes stated by each goal clause into one.
///
/// Explicit places must agree; an anaphor rides along with an explicit
/// place named elsewhere in the same utterance; implied scopes inherit
/// whatever the rest establishes.
fn unify_scopes(scopes: &[ScopeRef]) -> Result<ScopeRef, String> {
    let explicit: Vec<&ScopeRef> = scopes
        .iter()
        .filter(|s| {
            !matches!(s, ScopeRef::Implied | ScopeRef::Anaphor { .. })
        })
        .collect();
    if let Some(first) = explicit.first() {
        for other in &explicit[1..] {
            if !same_place(first, other) {
                return Err(format!(
                    "this asks for edits in two different places ({} and {}); \
                     send them as separate instructions so each can be undone on its own",
                    scope_gloss(first),
                    scope_gloss(other)
                ));
            }
        }
        return Ok((*first).clone());
    }
    if let Some(anaphor) = scopes.iter().find(|s| matches!(s, ScopeRef::Anaphor { .. })) {
        return Ok(anaphor.clone());
    }
    Ok(ScopeRef::Implied)
}

fn same_place(a: &ScopeRef, b: &ScopeRef) -> bool {
    match (a, b) {
        (ScopeRef::Named { name: an, .. }, ScopeRef::Named { name: bn, .. }) => an == bn,
        (ScopeRef::Role { role: ar, .. }, ScopeRef::Role { role: br, .. }) => ar == br,
        (
            ScopeRef::BarRange {
                start_bar: asb,
                end_bar: aeb,
                ..
            },
            ScopeRef::BarRange {
                start_bar: bsb,
                end_bar: beb,
                ..
            },
        ) => asb == bsb && aeb == beb,
        (ScopeRef::Everything { .. }, ScopeRef::Everything { .. }) => true,
        _ => false,
    }
}

fn scope_gloss(scope: &ScopeRef) -> String {
    match scope {
        ScopeRef::Named { name, .. } => format!("the {}", name),
        ScopeRef::Role { role, .. } => format!("the {}", role),
        ScopeRef::BarRange {
            start_bar,
            end_bar: Some(end),
            ..
        } => format!("bars {} to {}", start_bar, end),
        ScopeRef::BarRange { start_bar, .. } => format!("bar {}", start_bar),
        ScopeRef::Anaphor { .. } => "that".to_string(),
        ScopeRef::Everything { .. } => "everything".to_string(),
        ScopeRef::Implied => "the piece".to_string(),
    }
}

fn noun_gloss(noun: &NounSem) -> String {
    match noun {
        NounSem::Role { role, .. } => format!("the {}", role),
        NounSem::Element { element, .. } => format!("the {}", element),
        NounSem::Named { name, .. } => format!("the {}", name),
        NounSem::Anaphor { .. } => "that".to_string(),
        NounSem::Everything { .. } => "everything".to_string(),
        NounSem::AxisRef { axis, .. } => format!("the {}", axis),
        NounSem::Bars {
            start_bar,
            end_bar: Some(end),
            ..
        } => format!("bars {} to {}", start_bar, end),
        NounSem::Bars { start_bar, .. } => format!("bar {}", start_bar),
    }
}

// ============================================================================
// Defaults
// ============================================================================

/// Unstated adjustment amounts default to moderate, recorded for later
/// explanation. Goals waiting on a baseline answer keep their amount open.
fn apply_amount_defaults(edit: &mut EditDraft, baseline_goals: &[usize]) {
    for (index, goal) in edit.goals.iter_mut().enumerate() {
        if baseline_goals.contains(&index) {
            continue;
        }
        if let GoalDraft::Adjust {
            amount: amount @ None,
            span,
            ..
        } = goal
        {
            *amount = Some(Amount::Moderate);
            edit.assumed_defaults.push(AssumedDefault {
                slot: "amount".to_string(),
                value: Amount::Moderate.to_string(),
                span: *span,
            });
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
