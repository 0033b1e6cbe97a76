//! Intent representation.
//!
//! Two layers live here. Draft types carry what composition can know without
//! looking at the project: surface references by name, unresolved amounts,
//! holes. Final types carry fully typed references into the project snapshot
//! and are what the typechecker and planner consume.
//!
//! ```text
//!   parse tree --compose--> IntentDraft --resolve--> Intent
//!                           (names, holes)           (typed ids)
//! ```

pub mod compose;
pub mod resolve;
pub mod typecheck;

use crate::canon::axis::{Amount, Axis, Direction, Element, PreserveMode};
use crate::parser::token::Span;
use crate::project::model::Tick;
use crate::project::{EventId, LayerId, LayerRole, SectionId};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

// ============================================================================
// Resolved scope and targets
// ============================================================================

/// Where an edit applies. Always a typed reference, never a name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scope {
    Section { id: SectionId },
    GlobalRange { start: Tick, end: Tick },
    Layer { id: LayerId },
    EventSelection { ids: Vec<EventId> },
}

impl Scope {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Scope::Section { .. } => "section",
            Scope::GlobalRange { .. } => "range",
            Scope::Layer { .. } => "layer",
            Scope::EventSelection { .. } => "events",
        }
    }
}

/// What a constraint protects or permits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum EditTarget {
    /// Every layer carrying a role ("the melody").
    Role { role: LayerRole },
    /// A specific layer.
    Layer { id: LayerId },
    /// A named section's material.
    Section { id: SectionId },
    /// The transport tempo.
    Tempo,
    /// The whole project.
    Everything,
}

impl fmt::Display for EditTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditTarget::Role { role } => write!(f, "the {}", role),
            EditTarget::Layer { .. } => write!(f, "that layer"),
            EditTarget::Section { .. } => write!(f, "that section"),
            EditTarget::Tempo => write!(f, "the tempo"),
            EditTarget::Everything => write!(f, "everything"),
        }
    }
}

// ============================================================================
// Goals
// ============================================================================

/// The thing an introduce/remove goal is about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "subject", rename_all = "snake_case")]
pub enum Subject {
    Element { element: Element },
    Role { role: LayerRole },
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Element { element } => write!(f, "{}", element),
            Subject::Role { role } => write!(f, "the {}", role),
        }
    }
}

/// A desired musical change. Closed set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "goal", rename_all = "snake_case")]
pub enum Goal {
    Increase { axis: Axis, amount: Amount },
    Decrease { axis: Axis, amount: Amount },
    SetTo { axis: Axis, value: f64 },
    Introduce { subject: Subject, amount: Option<Amount> },
    Remove { subject: Subject, amount: Option<Amount> },
}

impl Goal {
    pub fn axis(&self) -> Option<&Axis> {
        match self {
            Goal::Increase { axis, .. } | Goal::Decrease { axis, .. } | Goal::SetTo { axis, .. } => {
                Some(axis)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Goal::Increase { axis, amount } => write!(f, "{} up ({})", axis, amount),
            Goal::Decrease { axis, amount } => write!(f, "{} down ({})", axis, amount),
            Goal::SetTo { axis, value } => write!(f, "{} = {}", axis, value),
            Goal::Introduce { subject, .. } => write!(f, "introduce {}", subject),
            Goal::Remove { subject, .. } => write!(f, "remove {}", subject),
        }
    }
}

// ============================================================================
// Constraints and preferences
// ============================================================================

/// A bound the plan must respect. `hard` constraints reject candidates;
/// soft ones only cost score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "constraint", rename_all = "snake_case")]
pub enum Constraint {
    Preserve {
        target: EditTarget,
        mode: PreserveMode,
        hard: bool,
    },
    OnlyChange {
        targets: Vec<EditTarget>,
        hard: bool,
    },
    Tempo {
        bpm: f64,
        tolerance: f64,
        hard: bool,
    },
    Meter {
        numerator: u8,
        denominator: u8,
        hard: bool,
    },
    RangeLimit {
        voice: LayerRole,
        min_pitch: u8,
        max_pitch: u8,
        hard: bool,
    },
}

impl Constraint {
    pub fn is_hard(&self) -> bool {
        match self {
            Constraint::Preserve { hard, .. }
            | Constraint::OnlyChange { hard, .. }
            | Constraint::Tempo { hard, .. }
            | Constraint::Meter { hard, .. }
            | Constraint::RangeLimit { hard, .. } => *hard,
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Preserve { target, mode, .. } => {
                write!(f, "preserve {} ({})", target, mode)
            }
            Constraint::OnlyChange { targets, .. } => {
                let names: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
                write!(f, "only change {}", names.join(", "))
            }
            Constraint::Tempo { bpm, tolerance, .. } => {
                write!(f, "tempo {} bpm (±{})", bpm, tolerance)
            }
            Constraint::Meter {
                numerator,
                denominator,
                ..
            } => write!(f, "meter {}/{}", numerator, denominator),
            Constraint::RangeLimit {
                voice,
                min_pitch,
                max_pitch,
                ..
            } => write!(f, "{} within pitches {}..{}", voice, min_pitch, max_pitch),
        }
    }
}

/// A soft wish about how the plan should be chosen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "preference", rename_all = "snake_case")]
pub enum Preference {
    FewerEdits,
    PreferLayer { role: LayerRole },
    AvoidLayer { role: LayerRole },
}

/// A default the compiler filled in, kept for explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssumedDefault {
    pub slot: String,
    pub value: String,
    pub span: Span,
}

// ============================================================================
// Final intent
// ============================================================================

/// A fully resolved edit request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditIntent {
    pub scope: Scope,
    pub goals: Vec<Goal>,
    pub constraints: Vec<Constraint>,
    pub preferences: Vec<Preference>,
    pub assumed_defaults: Vec<AssumedDefault>,
}

/// Everything an utterance can resolve to. Closed set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    Edit(EditIntent),
    Inspect { scope: Scope },
    Undo,
    Redo,
    Explain,
}

impl Intent {
    pub fn intent_name(&self) -> &'static str {
        match self {
            Intent::Edit(_) => "edit",
            Intent::Inspect { .. } => "inspect",
            Intent::Undo => "undo",
            Intent::Redo => "redo",
            Intent::Explain => "explain",
        }
    }

    /// Whether executing this intent can change the project.
    pub fn is_mutating(&self) -> bool {
        matches!(self, Intent::Edit(_) | Intent::Undo | Intent::Redo)
    }
}

// ============================================================================
// Draft (pre-resolution) forms
// ============================================================================

/// Hint recovered from syntax about what kind of thing a name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKindHint {
    Section,
    Layer,
}

/// A scope as the utterance stated it, before symbol binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "ref", rename_all = "snake_case")]
pub enum ScopeRef {
    Named {
        name: String,
        hint: Option<ScopeKindHint>,
        span: Span,
    },
    Role {
        role: LayerRole,
        span: Span,
    },
    BarRange {
        start_bar: u32,
        end_bar: Option<u32>,
        span: Span,
    },
    Anaphor {
        span: Span,
    },
    /// "everything": the whole piece, regardless of dialogue focus.
    Everything {
        span: Span,
    },
    Implied,
}

impl ScopeRef {
    pub fn is_implied(&self) -> bool {
        matches!(self, ScopeRef::Implied)
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            ScopeRef::Named { span, .. }
            | ScopeRef::Role { span, .. }
            | ScopeRef::BarRange { span, .. }
            | ScopeRef::Anaphor { span }
            | ScopeRef::Everything { span } => Some(*span),
            ScopeRef::Implied => None,
        }
    }
}

/// A constraint target as stated, before symbol binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "ref", rename_all = "snake_case")]
pub enum TargetRef {
    Role { role: LayerRole, span: Span },
    Named { name: String, span: Span },
    Anaphor { span: Span },
    Tempo { span: Span },
    Everything { span: Span },
}

/// An introduce/remove subject as stated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "ref", rename_all = "snake_case")]
pub enum SubjectRef {
    Element { element: Element, span: Span },
    Role { role: LayerRole, span: Span },
    Anaphor { span: Span },
}

/// A goal as composed from the parse tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "goal", rename_all = "snake_case")]
pub enum GoalDraft {
    Adjust {
        axis: Axis,
        direction: Direction,
        amount: Option<Amount>,
        span: Span,
    },
    SetTo {
        axis: Axis,
        value: f64,
        span: Span,
    },
    Introduce {
        subject: SubjectRef,
        amount: Option<Amount>,
        span: Span,
    },
    Remove {
        subject: SubjectRef,
        amount: Option<Amount>,
        span: Span,
    },
}

/// A constraint as composed from the parse tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "constraint", rename_all = "snake_case")]
pub enum ConstraintDraft {
    Preserve {
        target: TargetRef,
        mode: PreserveMode,
        hard: bool,
        span: Span,
    },
    OnlyChange {
        targets: Vec<TargetRef>,
        hard: bool,
        span: Span,
    },
    Tempo {
        bpm: f64,
        tolerance: f64,
        hard: bool,
        span: Span,
    },
    Meter {
        numerator: u8,
        denominator: u8,
        hard: bool,
        span: Span,
    },
    RangeLimit {
        voice: LayerRole,
        min_pitch: u8,
        max_pitch: u8,
        hard: bool,
        span: Span,
    },
}

/// A drafted edit: surface references plus any holes composition left open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditDraft {
    pub scope: ScopeRef,
    pub goals: Vec<GoalDraft>,
    pub constraints: Vec<ConstraintDraft>,
    pub preferences: Vec<Preference>,
    pub assumed_defaults: Vec<AssumedDefault>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DraftAction {
    Edit(EditDraft),
    Inspect { scope: ScopeRef },
    Undo,
    Redo,
    Explain,
    /// "do that again": replay the previous edit intent against the
    /// current project state.
    Again,
}

/// Output of semantic composition for one interpretation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentDraft {
    pub utterance: String,
    pub action: DraftAction,
    pub holes: Vec<Hole>,
}

impl IntentDraft {
    /// A short rendering used as an option label when interpretations are
    /// surfaced for choice.
    pub fn gloss(&self) -> String {
        match &self.action {
            DraftAction::Edit(edit) => {
                let goals: Vec<String> = edit.goals.iter().map(gloss_goal).collect();
                let mut text = goals.join(" and ");
                if text.is_empty() {
                    text = "leave things as they are".to_string();
                }
                if !edit.constraints.is_empty() {
                    text.push_str(&format!(" (with {} constraint(s))", edit.constraints.len()));
                }
                text
            }
            DraftAction::Inspect { .. } => "describe the selection".to_string(),
            DraftAction::Undo => "undo the last edit".to_string(),
            DraftAction::Redo => "redo the undone edit".to_string(),
            DraftAction::Explain => "explain the last edit".to_string(),
            DraftAction::Again => "repeat the last edit".to_string(),
        }
    }
}

fn gloss_goal(goal: &GoalDraft) -> String {
    match goal {
        GoalDraft::Adjust {
            axis, direction, ..
        } => format!("move {} {}", axis, direction),
        GoalDraft::SetTo { axis, value, .. } => format!("set {} to {}", axis, value),
        GoalDraft::Introduce { subject, .. } => match subject {
            SubjectRef::Element { element, .. } => format!("bring in a {}", element),
            SubjectRef::Role { role, .. } => format!("bring in the {}", role),
            SubjectRef::Anaphor { .. } => "bring something in".to_string(),
        },
        GoalDraft::Remove { subject, .. } => match subject {
            SubjectRef::Element { element, .. } => format!("remove the {}", element),
            SubjectRef::Role { role, .. } => format!("remove the {}", role),
            SubjectRef::Anaphor { .. } => "remove something".to_string(),
        },
    }
}

// ============================================================================
// Holes
// ============================================================================

/// Index of a hole within its draft.
pub type HoleId = u32;

/// Which slot of the draft a hole stands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "site", rename_all = "snake_case")]
pub enum RefSite {
    Scope,
    Constraint { index: usize },
    Goal { index: usize },
    Inspect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoleKind {
    /// An unresolved reference to project material.
    Referent,
    /// A degree the utterance left unsaid in a way that cannot default.
    Amount,
    /// A comparison baseline ("darker than the verse").
    Baseline,
    /// An introduce/remove subject stated only as a pronoun.
    Subject,
}

/// One candidate resolution for a hole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoleCandidate {
    pub label: String,
    pub binding: HoleBinding,
    pub score: f32,
}

/// The typed value a hole resolves to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "binding", rename_all = "snake_case")]
pub enum HoleBinding {
    Scope(Scope),
    Target(EditTarget),
    Amount(Amount),
    Subject(Subject),
}

/// A placeholder for something the utterance did not pin down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hole {
    pub id: HoleId,
    pub site: RefSite,
    pub kind: HoleKind,
    pub span: Span,
    pub question: String,
    pub candidates: SmallVec<[HoleCandidate; 4]>,
}

// ============================================================================
// Tests
// ============================================================================
