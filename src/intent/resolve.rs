//! Pragmatic resolution: names and pronouns to typed project references.
//!
//! Binding priority, in order: (1) an explicit name stated in the utterance,
//! (2) the dialogue focus when the reference is anaphoric or implied, (3) the
//! unique entity of the required type, (4) a clarification question. A guess
//! is never substituted for a musically consequential binding.
//!
//! Clarifications are data, not errors. Each one carries a [`ResumeToken`]
//! with everything needed to continue once answered, so the pipeline itself
//! stays stateless across the round trip. Tokens pin the session, lexicon
//! version, and symbol revision they were minted against; a token presented
//! after the world moved is rejected as stale rather than misapplied.

use serde::{Deserialize, Serialize};

use crate::canon::axis::{Amount, Axis, Direction, Element};
use crate::config::CompilerConfig;
use crate::parser::normalize::casefold;
use crate::parser::token::Span;
use crate::project::model::{ProjectSnapshot, Tick};
use crate::project::{SessionId, SymbolTable};
use crate::session::DialogueState;

use super::{
    Constraint, ConstraintDraft, DraftAction, EditDraft, EditIntent, EditTarget, Goal, GoalDraft,
    Hole, HoleBinding, HoleCandidate, HoleId, HoleKind, Intent, IntentDraft, RefSite, Scope,
    ScopeKindHint, ScopeRef, Subject, SubjectRef, TargetRef,
};

// ============================================================================
// Clarification data
// ============================================================================

/// Why a clarification is being asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClarifyKind {
    /// Competing readings of the whole utterance.
    Reading,
    /// A name or pronoun that did not bind.
    Referent,
    /// A degree that cannot default.
    Amount,
    /// An introduce/remove subject that did not bind.
    Subject,
    /// Near-tied plans; the user picks the tactic.
    Plan,
}

/// One selectable answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarifyOption {
    pub index: usize,
    pub label: String,
}

/// Continuation payload inside a resume token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resume", rename_all = "snake_case")]
pub enum ResumePayload {
    /// Pick one of the composed readings.
    Readings { drafts: Vec<IntentDraft> },
    /// Fill one hole of the draft with the chosen candidate's binding.
    Hole {
        draft: IntentDraft,
        hole: Hole,
        /// Bindings already answered in earlier round trips.
        pins: Vec<(RefSite, HoleBinding)>,
    },
    /// Pick one of several near-tied plans for an already resolved intent.
    Plans {
        intent: EditIntent,
        utterance: String,
        plans: Vec<crate::planner::Plan>,
    },
}

/// Everything needed to continue a clarified request. Opaque to the caller;
/// returned verbatim with the chosen option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeToken {
    pub session: SessionId,
    pub lexicon_version: String,
    pub symbol_revision: u64,
    pub payload: ResumePayload,
}

/// A question the compiler needs answered before it can continue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationRequest {
    pub kind: ClarifyKind,
    pub question: String,
    pub options: Vec<ClarifyOption>,
    pub token: ResumeToken,
}

/// The caller's reply to a clarification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarifyAnswer {
    pub token: ResumeToken,
    /// Index into the request's options.
    pub choice: usize,
}

// ============================================================================
// Resolution outcome
// ============================================================================

/// What resolving one draft produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved(Intent),
    Clarify(ClarificationRequest),
    /// The draft cannot proceed in this world; conversational message.
    Report { message: String },
}

/// Read-only context resolution runs against.
pub struct ResolveCx<'a> {
    pub session: &'a DialogueState,
    pub snapshot: &'a ProjectSnapshot,
    pub symbols: &'a SymbolTable,
    pub config: &'a CompilerConfig,
    pub lexicon_version: &'a str,
}

impl ResolveCx<'_> {
    fn token(&self, payload: ResumePayload) -> ResumeToken {
        ResumeToken {
            session: self.session.session_id,
            lexicon_version: self.lexicon_version.to_string(),
            symbol_revision: self.symbols.revision,
            payload,
        }
    }

    fn whole_piece(&self) -> Scope {
        Scope::GlobalRange {
            start: 0,
            end: self.snapshot.length_ticks(),
        }
    }
}

/// Check a resume token against the live world.
pub fn verify_token(token: &ResumeToken, cx: &ResolveCx<'_>) -> Result<(), String> {
    if token.session != cx.session.session_id {
        return Err("token belongs to a different session".to_string());
    }
    if token.lexicon_version != cx.lexicon_version {
        return Err(format!(
            "lexicon moved from {} to {}",
            token.lexicon_version, cx.lexicon_version
        ));
    }
    if token.symbol_revision != cx.symbols.revision {
        return Err(format!(
            "project moved from revision {} to {}",
            token.symbol_revision, cx.symbols.revision
        ));
    }
    Ok(())
}

/// Build the request asking which reading was meant.
pub fn reading_request(drafts: Vec<IntentDraft>, cx: &ResolveCx<'_>) -> ClarificationRequest {
    let options = drafts
        .iter()
        .take(cx.config.max_surfaced_options)
        .enumerate()
        .map(|(index, draft)| ClarifyOption {
            index,
            label: draft.gloss(),
        })
        .collect();
    ClarificationRequest {
        kind: ClarifyKind::Reading,
        question: "that can be read more than one way; which did you mean?".to_string(),
        options,
        token: cx.token(ResumePayload::Readings { drafts }),
    }
}

// ============================================================================
// Entry point
// ============================================================================

/// Resolve one draft against the dialogue and project context.
///
/// `pins` carries bindings already answered through clarification round
/// trips; a pinned site is used in place of fresh binding and satisfies any
/// hole standing at that site.
pub fn resolve(
    draft: &IntentDraft,
    pins: &[(RefSite, HoleBinding)],
    cx: &ResolveCx<'_>,
) -> Resolution {
    if let Some(hole) = draft
        .holes
        .iter()
        .find(|h| !pins.iter().any(|(site, _)| *site == h.site))
    {
        return Resolution::Clarify(hole_request(draft, hole, pins, cx));
    }
    match &draft.action {
        DraftAction::Undo => Resolution::Resolved(Intent::Undo),
        DraftAction::Redo => Resolution::Resolved(Intent::Redo),
        DraftAction::Explain => Resolution::Resolved(Intent::Explain),
        DraftAction::Again => match cx.session.last_edit_intent() {
            Some(edit) => Resolution::Resolved(Intent::Edit(edit.clone())),
            None => Resolution::Report {
                message: "there is no previous edit to repeat".to_string(),
            },
        },
        DraftAction::Inspect { scope } => {
            match bind_scope(scope, RefSite::Inspect, false, draft, pins, cx) {
                Bind::Bound(scope) => Resolution::Resolved(Intent::Inspect { scope }),
                Bind::Ask(request) => Resolution::Clarify(request),
                Bind::Fail(message) => Resolution::Report { message },
            }
        }
        DraftAction::Edit(edit) => resolve_edit(edit, draft, pins, cx),
    }
}

fn hole_request(
    draft: &IntentDraft,
    hole: &Hole,
    pins: &[(RefSite, HoleBinding)],
    cx: &ResolveCx<'_>,
) -> ClarificationRequest {
    let kind = match hole.kind {
        HoleKind::Referent => ClarifyKind::Referent,
        HoleKind::Amount | HoleKind::Baseline => ClarifyKind::Amount,
        HoleKind::Subject => ClarifyKind::Subject,
    };
    let options = hole
        .candidates
        .iter()
        .take(cx.config.max_surfaced_options)
        .enumerate()
        .map(|(index, candidate)| ClarifyOption {
            index,
            label: candidate.label.clone(),
        })
        .collect();
    ClarificationRequest {
        kind,
        question: hole.question.clone(),
        options,
        token: cx.token(ResumePayload::Hole {
            draft: draft.clone(),
            hole: hole.clone(),
            pins: pins.to_vec(),
        }),
    }
}

// ============================================================================
// Edit resolution
// ============================================================================

/// Internal binding result: bound, needs asking, or cannot proceed.
enum Bind<T> {
    Bound(T),
    Ask(ClarificationRequest),
    Fail(String),
}

fn resolve_edit(
    edit: &EditDraft,
    draft: &IntentDraft,
    pins: &[(RefSite, HoleBinding)],
    cx: &ResolveCx<'_>,
) -> Resolution {
    let needs_scope = edit.goals.iter().any(goal_needs_scope);
    let scope = match bind_scope(&edit.scope, RefSite::Scope, needs_scope, draft, pins, cx) {
        Bind::Bound(scope) => scope,
        Bind::Ask(request) => return Resolution::Clarify(request),
        Bind::Fail(message) => return Resolution::Report { message },
    };

    let mut goals = Vec::with_capacity(edit.goals.len());
    for (index, goal_draft) in edit.goals.iter().enumerate() {
        match bind_goal(goal_draft, index, draft, pins, cx) {
            Bind::Bound(goal) => goals.push(goal),
            Bind::Ask(request) => return Resolution::Clarify(request),
            Bind::Fail(message) => return Resolution::Report { message },
        }
    }

    let mut constraints = Vec::with_capacity(edit.constraints.len());
    for (index, constraint) in edit.constraints.iter().enumerate() {
        match bind_constraint(constraint, index, draft, pins, cx) {
            Bind::Bound(constraint) => constraints.push(constraint),
            Bind::Ask(request) => return Resolution::Clarify(request),
            Bind::Fail(message) => return Resolution::Report { message },
        }
    }

    Resolution::Resolved(Intent::Edit(EditIntent {
        scope,
        goals,
        constraints,
        preferences: edit.preferences.clone(),
        assumed_defaults: edit.assumed_defaults.clone(),
    }))
}

/// Tempo goals act on the transport and need no spatial scope.
fn goal_needs_scope(goal: &GoalDraft) -> bool {
    match goal {
        GoalDraft::Adjust { axis, .. } | GoalDraft::SetTo { axis, .. } => *axis != Axis::Tempo,
        GoalDraft::Introduce { .. } | GoalDraft::Remove { .. } => true,
    }
}

// ============================================================================
// Scope binding
// ============================================================================

fn bind_scope(
    scope: &ScopeRef,
    site: RefSite,
    needs_scope: bool,
    draft: &IntentDraft,
    pins: &[(RefSite, HoleBinding)],
    cx: &ResolveCx<'_>,
) -> Bind<Scope> {
    if let Some(HoleBinding::Scope(pinned)) = pinned(pins, site) {
        return Bind::Bound(pinned.clone());
    }
    match scope {
        ScopeRef::Named { name, hint, span } => {
            bind_named_scope(name, *hint, *span, site, draft, pins, cx)
        }
        ScopeRef::Role { role, span } => {
            let layers = cx.symbols.layers_with_role(*role);
            match layers.len() {
                0 => Bind::Fail(format!("there is no {} layer in this project", role)),
                1 => Bind::Bound(Scope::Layer { id: layers[0].id }),
                _ => {
                    let candidates: Vec<HoleCandidate> = layers
                        .iter()
                        .map(|l| HoleCandidate {
                            label: format!("the {} layer", l.name),
                            binding: HoleBinding::Scope(Scope::Layer { id: l.id }),
                            score: 0.5,
                        })
                        .collect();
                    Bind::Ask(candidate_request(
                        format!("more than one layer plays {}; which one?", role),
                        HoleKind::Referent,
                        site,
                        *span,
                        candidates,
                        draft,
                        pins,
                        cx,
                    ))
                }
            }
        }
        ScopeRef::BarRange {
            start_bar,
            end_bar,
            span: _,
        } => bind_bar_range(*start_bar, *end_bar, cx),
        ScopeRef::Anaphor { span } => match &cx.session.focus {
            Some(focus) => Bind::Bound(focus.clone()),
            // "it" with nothing in focus has no referent; never guess one.
            None => ask_where(*span, site, draft, pins, cx),
        },
        ScopeRef::Everything { .. } => Bind::Bound(cx.whole_piece()),
        ScopeRef::Implied => {
            if let Some(focus) = &cx.session.focus {
                return Bind::Bound(focus.clone());
            }
            if !needs_scope {
                return Bind::Bound(cx.whole_piece());
            }
            ask_where(Span::new(0, 0), site, draft, pins, cx)
        }
    }
}

/// Clarification offering every section plus the whole piece as the place
/// an unanchored edit could land.
fn ask_where(
    span: Span,
    site: RefSite,
    draft: &IntentDraft,
    pins: &[(RefSite, HoleBinding)],
    cx: &ResolveCx<'_>,
) -> Bind<Scope> {
    let mut candidates: Vec<HoleCandidate> = cx
        .symbols
        .sections
        .iter()
        .map(|s| HoleCandidate {
            label: format!("the {} section", s.name),
            binding: HoleBinding::Scope(Scope::Section { id: s.id }),
            score: 0.5,
        })
        .collect();
    candidates.push(HoleCandidate {
        label: "the whole piece".to_string(),
        binding: HoleBinding::Scope(cx.whole_piece()),
        score: 0.4,
    });
    Bind::Ask(candidate_request(
        "where should this apply?".to_string(),
        HoleKind::Referent,
        site,
        span,
        candidates,
        draft,
        pins,
        cx,
    ))
}

fn bind_named_scope(
    name: &str,
    hint: Option<ScopeKindHint>,
    span: Span,
    site: RefSite,
    draft: &IntentDraft,
    pins: &[(RefSite, HoleBinding)],
    cx: &ResolveCx<'_>,
) -> Bind<Scope> {
    let folded = casefold(name);
    let mut candidates: Vec<HoleCandidate> = Vec::new();
    if hint != Some(ScopeKindHint::Layer) {
        for section in cx.symbols.sections_named(&folded) {
            let label = cx
                .snapshot
                .section(section.id)
                .map(|s| format!("{} (from bar {})", s.name, cx.snapshot.bar_of(s.start)))
                .unwrap_or_else(|| section.name.clone());
            candidates.push(HoleCandidate {
                label,
                binding: HoleBinding::Scope(Scope::Section { id: section.id }),
                score: 0.5,
            });
        }
    }
    if hint != Some(ScopeKindHint::Section) {
        for layer in cx.symbols.layers_named(&folded) {
            candidates.push(HoleCandidate {
                label: format!("the {} layer", layer.name),
                binding: HoleBinding::Scope(Scope::Layer { id: layer.id }),
                score: 0.5,
            });
        }
    }
    match candidates.len() {
        1 => match &candidates[0].binding {
            HoleBinding::Scope(scope) => Bind::Bound(scope.clone()),
            _ => Bind::Fail(format!("'{}' did not bind to a place", name)),
        },
        0 => unknown_name(name, &folded, site, span, draft, pins, cx),
        _ => Bind::Ask(candidate_request(
            format!("more than one thing is called '{}'; which one?", name),
            HoleKind::Referent,
            site,
            span,
            candidates,
            draft,
            pins,
            cx,
        )),
    }
}

/// An unknown name either earns fuzzy suggestions or an honest listing of
/// what exists.
fn unknown_name(
    name: &str,
    folded: &str,
    site: RefSite,
    span: Span,
    draft: &IntentDraft,
    pins: &[(RefSite, HoleBinding)],
    cx: &ResolveCx<'_>,
) -> Bind<Scope> {
    let mut scored: Vec<(f64, HoleCandidate)> = Vec::new();
    for section in &cx.symbols.sections {
        let score = strsim::jaro_winkler(folded, &casefold(&section.name));
        if score >= cx.config.suggestion_threshold {
            scored.push((
                score,
                HoleCandidate {
                    label: format!("the {} section", section.name),
                    binding: HoleBinding::Scope(Scope::Section { id: section.id }),
                    score: score as f32,
                },
            ));
        }
    }
    for layer in &cx.symbols.layers {
        let score = strsim::jaro_winkler(folded, &casefold(&layer.name));
        if score >= cx.config.suggestion_threshold {
            scored.push((
                score,
                HoleCandidate {
                    label: format!("the {} layer", layer.name),
                    binding: HoleBinding::Scope(Scope::Layer { id: layer.id }),
                    score: score as f32,
                },
            ));
        }
    }
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(cx.config.max_suggestions);
    if scored.is_empty() {
        let known: Vec<String> = cx
            .symbols
            .sections
            .iter()
            .map(|s| s.name.clone())
            .chain(cx.symbols.layers.iter().map(|l| l.name.clone()))
            .take(cx.config.max_surfaced_options)
            .collect();
        return Bind::Fail(if known.is_empty() {
            format!("nothing in this project is called '{}'", name)
        } else {
            format!(
                "nothing in this project is called '{}'; I can see {}",
                name,
                known.join(", ")
            )
        });
    }
    let candidates = scored.into_iter().map(|(_, c)| c).collect();
    Bind::Ask(candidate_request(
        format!("I don't know '{}'; did you mean one of these?", name),
        HoleKind::Referent,
        site,
        span,
        candidates,
        draft,
        pins,
        cx,
    ))
}

fn bind_bar_range(start_bar: u32, end_bar: Option<u32>, cx: &ResolveCx<'_>) -> Bind<Scope> {
    let length = cx.snapshot.length_ticks();
    let last_bar = cx.snapshot.bar_of(length.saturating_sub(1).max(0));
    if start_bar > last_bar {
        return Bind::Fail(format!(
            "the piece ends at bar {}; bar {} is past the end",
            last_bar, start_bar
        ));
    }
    let start: Tick = cx.snapshot.bar_start(start_bar);
    let end: Tick = cx.snapshot.bar_start(end_bar.unwrap_or(start_bar) + 1);
    Bind::Bound(Scope::GlobalRange { start, end })
}

// ============================================================================
// Goal and constraint binding
// ============================================================================

fn bind_goal(
    goal: &GoalDraft,
    index: usize,
    draft: &IntentDraft,
    pins: &[(RefSite, HoleBinding)],
    cx: &ResolveCx<'_>,
) -> Bind<Goal> {
    let site = RefSite::Goal { index };
    match goal {
        GoalDraft::Adjust {
            axis,
            direction,
            amount,
            ..
        } => {
            let amount = match amount {
                Some(amount) => *amount,
                None => match pinned(pins, site) {
                    Some(HoleBinding::Amount(amount)) => *amount,
                    _ => Amount::Moderate,
                },
            };
            Bind::Bound(match direction {
                Direction::Up => Goal::Increase {
                    axis: axis.clone(),
                    amount,
                },
                Direction::Down => Goal::Decrease {
                    axis: axis.clone(),
                    amount,
                },
            })
        }
        GoalDraft::SetTo { axis, value, .. } => Bind::Bound(Goal::SetTo {
            axis: axis.clone(),
            value: *value,
        }),
        GoalDraft::Introduce { subject, amount, .. } => {
            match bind_subject(subject, site, draft, pins, cx) {
                Bind::Bound(subject) => Bind::Bound(Goal::Introduce {
                    subject,
                    amount: *amount,
                }),
                Bind::Ask(request) => Bind::Ask(request),
                Bind::Fail(message) => Bind::Fail(message),
            }
        }
        GoalDraft::Remove { subject, amount, .. } => {
            match bind_subject(subject, site, draft, pins, cx) {
                Bind::Bound(subject) => Bind::Bound(Goal::Remove {
                    subject,
                    amount: *amount,
                }),
                Bind::Ask(request) => Bind::Ask(request),
                Bind::Fail(message) => Bind::Fail(message),
            }
        }
    }
}

fn bind_subject(
    subject: &SubjectRef,
    site: RefSite,
    draft: &IntentDraft,
    pins: &[(RefSite, HoleBinding)],
    cx: &ResolveCx<'_>,
) -> Bind<Subject> {
    if let Some(HoleBinding::Subject(pinned)) = pinned(pins, site) {
        return Bind::Bound(pinned.clone());
    }
    match subject {
        SubjectRef::Element { element, .. } => Bind::Bound(Subject::Element {
            element: element.clone(),
        }),
        SubjectRef::Role { role, .. } => Bind::Bound(Subject::Role { role: *role }),
        SubjectRef::Anaphor { span } => {
            if let Some(Scope::Layer { id }) = &cx.session.focus {
                if let Some(layer) = cx.snapshot.layer(*id) {
                    return Bind::Bound(Subject::Role { role: layer.role });
                }
            }
            let elements = [
                Element::Countermelody,
                Element::Arpeggio,
                Element::Echo,
                Element::Shimmer,
                Element::Drive,
            ];
            let candidates: Vec<HoleCandidate> = elements
                .into_iter()
                .map(|element| HoleCandidate {
                    label: format!("a {}", element),
                    binding: HoleBinding::Subject(Subject::Element { element }),
                    score: 0.5,
                })
                .collect();
            Bind::Ask(candidate_request(
                "what should that be?".to_string(),
                HoleKind::Subject,
                site,
                *span,
                candidates,
                draft,
                pins,
                cx,
            ))
        }
    }
}

fn bind_constraint(
    constraint: &ConstraintDraft,
    index: usize,
    draft: &IntentDraft,
    pins: &[(RefSite, HoleBinding)],
    cx: &ResolveCx<'_>,
) -> Bind<Constraint> {
    let site = RefSite::Constraint { index };
    match constraint {
        ConstraintDraft::Preserve {
            target, mode, hard, ..
        } => match bind_target(target, site, draft, pins, cx) {
            Bind::Bound(target) => Bind::Bound(Constraint::Preserve {
                target,
                mode: *mode,
                hard: *hard,
            }),
            Bind::Ask(request) => Bind::Ask(request),
            Bind::Fail(message) => Bind::Fail(message),
        },
        ConstraintDraft::OnlyChange { targets, hard, .. } => {
            let mut bound = Vec::with_capacity(targets.len());
            for target in targets {
                match bind_target(target, site, draft, pins, cx) {
                    Bind::Bound(target) => bound.push(target),
                    Bind::Ask(request) => return Bind::Ask(request),
                    Bind::Fail(message) => return Bind::Fail(message),
                }
            }
            Bind::Bound(Constraint::OnlyChange {
                targets: bound,
                hard: *hard,
            })
        }
        ConstraintDraft::Tempo {
            bpm,
            tolerance,
            hard,
            ..
        } => Bind::Bound(Constraint::Tempo {
            bpm: *bpm,
            tolerance: *tolerance,
            hard: *hard,
        }),
        ConstraintDraft::Meter {
            numerator,
            denominator,
            hard,
            ..
        } => Bind::Bound(Constraint::Meter {
            numerator: *numerator,
            denominator: *denominator,
            hard: *hard,
        }),
        ConstraintDraft::RangeLimit {
            voice,
            min_pitch,
            max_pitch,
            hard,
            ..
        } => Bind::Bound(Constraint::RangeLimit {
            voice: *voice,
            min_pitch: *min_pitch,
            max_pitch: *max_pitch,
            hard: *hard,
        }),
    }
}

fn bind_target(
    target: &TargetRef,
    site: RefSite,
    draft: &IntentDraft,
    pins: &[(RefSite, HoleBinding)],
    cx: &ResolveCx<'_>,
) -> Bind<EditTarget> {
    if let Some(HoleBinding::Target(pinned)) = pinned(pins, site) {
        return Bind::Bound(pinned.clone());
    }
    match target {
        TargetRef::Role { role, .. } => Bind::Bound(EditTarget::Role { role: *role }),
        TargetRef::Tempo { .. } => Bind::Bound(EditTarget::Tempo),
        TargetRef::Everything { .. } => Bind::Bound(EditTarget::Everything),
        TargetRef::Named { name, span } => {
            let folded = casefold(name);
            let sections = cx.symbols.sections_named(&folded);
            let layers = cx.symbols.layers_named(&folded);
            match (sections.len(), layers.len()) {
                (1, 0) => Bind::Bound(EditTarget::Section {
                    id: sections[0].id,
                }),
                (0, 1) => Bind::Bound(EditTarget::Layer { id: layers[0].id }),
                (0, 0) => Bind::Fail(format!(
                    "nothing in this project is called '{}' to protect",
                    name
                )),
                _ => {
                    let mut candidates: Vec<HoleCandidate> = sections
                        .iter()
                        .map(|s| HoleCandidate {
                            label: format!("the {} section", s.name),
                            binding: HoleBinding::Target(EditTarget::Section { id: s.id }),
                            score: 0.5,
                        })
                        .collect();
                    candidates.extend(layers.iter().map(|l| HoleCandidate {
                        label: format!("the {} layer", l.name),
                        binding: HoleBinding::Target(EditTarget::Layer { id: l.id }),
                        score: 0.5,
                    }));
                    Bind::Ask(candidate_request(
                        format!("more than one thing is called '{}'; which one?", name),
                        HoleKind::Referent,
                        site,
                        *span,
                        candidates,
                        draft,
                        pins,
                        cx,
                    ))
                }
            }
        }
        TargetRef::Anaphor { span } => match &cx.session.focus {
            Some(Scope::Section { id }) => Bind::Bound(EditTarget::Section { id: *id }),
            Some(Scope::Layer { id }) => Bind::Bound(EditTarget::Layer { id: *id }),
            _ => {
                let candidates: Vec<HoleCandidate> = cx
                    .symbols
                    .layers
                    .iter()
                    .map(|l| HoleCandidate {
                        label: format!("the {} layer", l.name),
                        binding: HoleBinding::Target(EditTarget::Layer { id: l.id }),
                        score: 0.5,
                    })
                    .collect();
                Bind::Ask(candidate_request(
                    "what should stay untouched?".to_string(),
                    HoleKind::Referent,
                    site,
                    *span,
                    candidates,
                    draft,
                    pins,
                    cx,
                ))
            }
        },
    }
}

// ============================================================================
// Shared plumbing
// ============================================================================

fn pinned<'a>(pins: &'a [(RefSite, HoleBinding)], site: RefSite) -> Option<&'a HoleBinding> {
    pins.iter()
        .find(|(pinned_site, _)| *pinned_site == site)
        .map(|(_, binding)| binding)
}

/// Build a clarification around a synthesized hole so the answer can be
/// pinned and resolution re-run.
#[allow(clippy::too_many_arguments)]
fn candidate_request(
    question: String,
    kind: HoleKind,
    site: RefSite,
    span: Span,
    candidates: Vec<HoleCandidate>,
    draft: &IntentDraft,
    pins: &[(RefSite, HoleBinding)],
    cx: &ResolveCx<'_>,
) -> ClarificationRequest {
    let hole = Hole {
        id: next_hole_id(draft),
        site,
        kind,
        span,
        question,
        candidates: candidates.into(),
    };
    hole_request_for(draft, &hole, pins, cx)
}

fn next_hole_id(draft: &IntentDraft) -> HoleId {
    draft
        .holes
        .iter()
        .map(|h| h.id + 1)
        .max()
        .unwrap_or(0)
}

fn hole_request_for(
    draft: &IntentDraft,
    hole: &Hole,
    pins: &[(RefSite, HoleBinding)],
    cx: &ResolveCx<'_>,
) -> ClarificationRequest {
    hole_request(draft, hole, pins, cx)
}

// ============================================================================
// Tests
// ============================================================================
