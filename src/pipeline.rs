//! The end-to-end instruction pipeline.
//!
//! [`Compiler`] owns the canon, the configuration, and the dialogue state of
//! one conversation, and drives an utterance through every stage:
//!
//! ```text
//!   text -> parse -> compose -> resolve -> typecheck -> plan -> package
//! ```
//!
//! Every conversational outcome is a value in [`CompileOutcome`]; the
//! `Result` layer is reserved for infrastructure faults. Compilation never
//! touches the project: a [`ReadyEdit`] is inert until the caller passes it
//! to [`Compiler::commit`], and the dialogue state only advances when a
//! commit succeeds.
//!
//! Long requests can be abandoned cooperatively: a [`CancelFlag`] is checked
//! at each stage boundary and cancellation surfaces as
//! [`crate::error::CompileError::Cancelled`] naming the stage it stopped at.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::canon::CanonBundle;
use crate::config::CompilerConfig;
use crate::edit::{compiler as package_compiler, EditPackage};
use crate::error::{CompileError, CompileResult};
use crate::explain::{describe_selection, Explanation};
use crate::host::{CommitResult, NoReasoning, ProjectHost, ReasoningEngine};
use crate::intent::resolve::{
    reading_request, resolve, verify_token, ClarificationRequest, ClarifyAnswer, ClarifyKind,
    ClarifyOption, Resolution, ResolveCx, ResumePayload,
};
use crate::intent::typecheck::{typecheck, ConstraintConflict, TypecheckIssue};
use crate::intent::{compose, EditIntent, HoleBinding, Intent, IntentDraft, RefSite};
use crate::parser::{analyze, best_typo_candidate, unknown_words, ParseVerdict};
use crate::planner::{self, Infeasibility, Plan, PlanOutcome};
use crate::project::model::ProjectSnapshot;
use crate::project::{PackageId, SymbolTable};
use crate::session::{DialogueState, TurnRecord};

// ============================================================================
// Cancellation
// ============================================================================

/// Shared cancellation switch, checked at stage boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

fn gate(cancel: &CancelFlag, stage: &'static str) -> CompileResult<()> {
    if cancel.is_cancelled() {
        Err(CompileError::Cancelled { stage })
    } else {
        Ok(())
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Where a ready package came from; commit updates the dialogue state
/// differently for each.
#[derive(Debug, Clone, PartialEq)]
pub enum PackageOrigin {
    /// Compiled fresh from an edit intent.
    Fresh { intent: EditIntent },
    /// Reverses the committed package with this id.
    Undo { of: PackageId },
    /// Re-applies the undone package with this id.
    Redo { of: PackageId },
}

/// A compiled package waiting for the caller's decision.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyEdit {
    pub package: EditPackage,
    pub origin: PackageOrigin,
    pub utterance: String,
}

/// Every way a compile can end without an infrastructure fault.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileOutcome {
    /// A package is staged and previewable; nothing is applied yet.
    Ready(ReadyEdit),
    /// The compiler needs an answer before it can continue.
    Clarification(ClarificationRequest),
    /// The constraints contradict each other; nothing was plannable.
    Conflict(ConstraintConflict),
    /// Constraints are coherent but no plan satisfies them here.
    Infeasible(Infeasibility),
    /// The grammar budget ran out before a full reading emerged.
    ParseTimeout { applications: usize },
    /// No reading covered the utterance.
    NoParse {
        message: String,
        suggestions: Vec<String>,
    },
    /// A conversational dead end with an honest message.
    Report { message: String },
    /// The answer to an inspect question.
    Inspection { report: String },
    /// The rendered account of the last committed edit.
    Explanation { text: String },
}

impl CompileOutcome {
    /// One user-facing rendering, options lettered for reply.
    pub fn render(&self) -> String {
        match self {
            CompileOutcome::Ready(ready) => {
                format!(
                    "{} ({})",
                    ready.package.summary, ready.package.explanation.stats
                )
            }
            CompileOutcome::Clarification(request) => {
                let mut lines = vec![request.question.clone()];
                for option in &request.options {
                    lines.push(format!("  {}) {}", option_letter(option.index), option.label));
                }
                lines.join("\n")
            }
            CompileOutcome::Conflict(conflict) => {
                let parties: Vec<&str> = conflict
                    .parties
                    .iter()
                    .map(|p| p.constraint.as_str())
                    .collect();
                format!(
                    "those constraints contradict each other ({}): {}",
                    parties.join(" vs "),
                    conflict.explanation
                )
            }
            CompileOutcome::Infeasible(infeasibility) => {
                format!("I can't do that here: {}", infeasibility.reason)
            }
            CompileOutcome::ParseTimeout { .. } => {
                "that instruction is too tangled for me to read; try splitting it up".to_string()
            }
            CompileOutcome::NoParse {
                message,
                suggestions,
            } => {
                if suggestions.is_empty() {
                    message.clone()
                } else {
                    format!("{} (did you mean: {}?)", message, suggestions.join(", "))
                }
            }
            CompileOutcome::Report { message } => message.clone(),
            CompileOutcome::Inspection { report } => report.clone(),
            CompileOutcome::Explanation { text } => text.clone(),
        }
    }
}

fn option_letter(index: usize) -> char {
    (b'A' + (index % 26) as u8) as char
}

// ============================================================================
// Compiler
// ============================================================================

/// One conversation's compiler: canon, config, dialogue state, and an
/// optional reasoning engine.
pub struct Compiler {
    canon: CanonBundle,
    config: CompilerConfig,
    session: DialogueState,
    engine: Box<dyn ReasoningEngine>,
}

impl Compiler {
    /// A compiler over the embedded canon with default configuration.
    pub fn new() -> CompileResult<Self> {
        Ok(Self::with_canon(CanonBundle::embedded()?))
    }

    pub fn with_canon(canon: CanonBundle) -> Self {
        Self {
            canon,
            config: CompilerConfig::default(),
            session: DialogueState::new(),
            engine: Box::new(NoReasoning),
        }
    }

    pub fn with_config(mut self, config: CompilerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_engine(mut self, engine: impl ReasoningEngine + 'static) -> Self {
        self.engine = Box::new(engine);
        self
    }

    pub fn session(&self) -> &DialogueState {
        &self.session
    }

    pub fn canon_version(&self) -> String {
        self.canon.version()
    }

    // ------------------------------------------------------------------
    // Entry points
    // ------------------------------------------------------------------

    /// Compile one utterance against the host's current snapshot.
    pub fn compile(
        &mut self,
        host: &dyn ProjectHost,
        utterance: &str,
    ) -> CompileResult<CompileOutcome> {
        self.compile_cancellable(host, utterance, &CancelFlag::new())
    }

    /// Compile with a cooperative cancellation flag.
    pub fn compile_cancellable(
        &mut self,
        host: &dyn ProjectHost,
        utterance: &str,
        cancel: &CancelFlag,
    ) -> CompileResult<CompileOutcome> {
        let snapshot = host.snapshot();
        info!(utterance, revision = snapshot.revision, "compiling instruction");

        gate(cancel, "parser")?;
        let analysis = analyze(utterance, &self.canon.lexicon, &self.config);
        if analysis.forest.exhausted {
            debug!(applications = analysis.forest.applications, "parse budget exhausted");
            return Ok(CompileOutcome::ParseTimeout {
                applications: analysis.forest.applications,
            });
        }
        let roots = match &analysis.verdict {
            ParseVerdict::Selected { root } => vec![*root],
            ParseVerdict::Ambiguous { roots } => roots.clone(),
            ParseVerdict::NoParse => {
                return Ok(self.no_parse(utterance, &analysis.tokens));
            }
        };

        gate(cancel, "compose")?;
        let composition = compose::compose(utterance, &analysis.forest, &roots);
        let mut drafts = composition.drafts;
        if drafts.is_empty() {
            let message = composition
                .rejections
                .first()
                .cloned()
                .unwrap_or_else(|| "I couldn't make sense of that instruction".to_string());
            return Ok(CompileOutcome::Report { message });
        }
        if drafts.len() > 1 {
            let symbols = SymbolTable::from_snapshot(&snapshot);
            let cx = self.cx(&snapshot, &symbols);
            return Ok(CompileOutcome::Clarification(reading_request(drafts, &cx)));
        }
        let draft = drafts.remove(0);

        self.finish_draft(&draft, &[], &snapshot, utterance, cancel)
    }

    /// Continue a clarified request with the chosen option.
    pub fn resume(
        &mut self,
        host: &dyn ProjectHost,
        answer: &ClarifyAnswer,
    ) -> CompileResult<CompileOutcome> {
        self.resume_cancellable(host, answer, &CancelFlag::new())
    }

    pub fn resume_cancellable(
        &mut self,
        host: &dyn ProjectHost,
        answer: &ClarifyAnswer,
        cancel: &CancelFlag,
    ) -> CompileResult<CompileOutcome> {
        let snapshot = host.snapshot();
        let symbols = SymbolTable::from_snapshot(&snapshot);
        {
            let cx = self.cx(&snapshot, &symbols);
            verify_token(&answer.token, &cx)
                .map_err(|reason| CompileError::StaleResume { reason })?;
        }
        match &answer.token.payload {
            ResumePayload::Readings { drafts } => {
                let draft = drafts.get(answer.choice).ok_or_else(|| {
                    CompileError::Validation {
                        reason: format!("option {} is not on offer", answer.choice),
                    }
                })?;
                let utterance = draft.utterance.clone();
                self.finish_draft(&draft.clone(), &[], &snapshot, &utterance, cancel)
            }
            ResumePayload::Hole { draft, hole, pins } => {
                let candidate = hole.candidates.get(answer.choice).ok_or_else(|| {
                    CompileError::Validation {
                        reason: format!("option {} is not on offer", answer.choice),
                    }
                })?;
                let mut pins = pins.clone();
                pins.push((hole.site, candidate.binding.clone()));
                let utterance = draft.utterance.clone();
                self.finish_draft(&draft.clone(), &pins, &snapshot, &utterance, cancel)
            }
            ResumePayload::Plans {
                intent,
                utterance,
                plans,
            } => {
                let plan = plans.get(answer.choice).ok_or_else(|| {
                    CompileError::Validation {
                        reason: format!("option {} is not on offer", answer.choice),
                    }
                })?;
                gate(cancel, "package")?;
                self.package_plan(plan, intent, &snapshot, utterance)
            }
        }
    }

    /// Apply a ready edit through the host and advance the dialogue state.
    pub fn commit(
        &mut self,
        host: &mut dyn ProjectHost,
        ready: &ReadyEdit,
    ) -> CompileResult<CommitResult> {
        let result = host.commit(&ready.package)?;
        let CommitResult::Committed { revision } = &result else {
            return Ok(result);
        };
        debug!(revision, package = %ready.package.id, "commit accepted");
        match &ready.origin {
            PackageOrigin::Fresh { intent } => {
                self.session.focus = Some(intent.scope.clone());
                self.session.push_committed(ready.package.clone());
                self.session.record_turn(TurnRecord {
                    utterance: ready.utterance.clone(),
                    intent: Intent::Edit(intent.clone()),
                    package: Some(ready.package.id),
                    at: Utc::now(),
                });
            }
            PackageOrigin::Undo { of } => {
                if let Some(pos) = self.session.undo_stack.iter().position(|p| p.id == *of) {
                    let undone = self.session.undo_stack.remove(pos);
                    self.session.redo_stack.push(undone);
                }
                self.session.last_package = self.session.undo_stack.last().map(|p| p.id);
                self.session.record_turn(TurnRecord {
                    utterance: ready.utterance.clone(),
                    intent: Intent::Undo,
                    package: Some(ready.package.id),
                    at: Utc::now(),
                });
            }
            PackageOrigin::Redo { of } => {
                if let Some(pos) = self.session.redo_stack.iter().position(|p| p.id == *of) {
                    let redone = self.session.redo_stack.remove(pos);
                    self.session.last_package = Some(redone.id);
                    self.session.undo_stack.push(redone);
                }
                self.session.record_turn(TurnRecord {
                    utterance: ready.utterance.clone(),
                    intent: Intent::Redo,
                    package: Some(ready.package.id),
                    at: Utc::now(),
                });
            }
        }
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Back half
    // ------------------------------------------------------------------

    fn finish_draft(
        &mut self,
        draft: &IntentDraft,
        pins: &[(RefSite, HoleBinding)],
        snapshot: &ProjectSnapshot,
        utterance: &str,
        cancel: &CancelFlag,
    ) -> CompileResult<CompileOutcome> {
        gate(cancel, "resolve")?;
        let symbols = SymbolTable::from_snapshot(snapshot);
        let resolution = {
            let cx = self.cx(snapshot, &symbols);
            resolve(draft, pins, &cx)
        };
        let intent = match resolution {
            Resolution::Resolved(intent) => intent,
            Resolution::Clarify(request) => return Ok(CompileOutcome::Clarification(request)),
            Resolution::Report { message } => return Ok(CompileOutcome::Report { message }),
        };
        debug!(intent = intent.intent_name(), "utterance resolved");

        match intent {
            Intent::Edit(edit) => self.finish_edit(edit, snapshot, utterance, cancel),
            Intent::Inspect { scope } => {
                let report = describe_selection(&scope, snapshot);
                self.session.focus = Some(scope.clone());
                self.session.record_turn(TurnRecord {
                    utterance: utterance.to_string(),
                    intent: Intent::Inspect { scope },
                    package: None,
                    at: Utc::now(),
                });
                Ok(CompileOutcome::Inspection { report })
            }
            Intent::Undo => self.stage_undo(snapshot, utterance),
            Intent::Redo => self.stage_redo(snapshot, utterance),
            Intent::Explain => {
                let outcome = match self.session.undo_stack.last() {
                    Some(package) => CompileOutcome::Explanation {
                        text: package.explanation.render(),
                    },
                    None => CompileOutcome::Report {
                        message: "nothing has been applied yet, so there is nothing to explain"
                            .to_string(),
                    },
                };
                self.session.record_turn(TurnRecord {
                    utterance: utterance.to_string(),
                    intent: Intent::Explain,
                    package: None,
                    at: Utc::now(),
                });
                Ok(outcome)
            }
        }
    }

    fn finish_edit(
        &mut self,
        intent: EditIntent,
        snapshot: &ProjectSnapshot,
        utterance: &str,
        cancel: &CancelFlag,
    ) -> CompileResult<CompileOutcome> {
        gate(cancel, "typecheck")?;
        match typecheck(&intent, snapshot) {
            Ok(()) => {}
            Err(TypecheckIssue::Invalid { reason }) => {
                return Ok(CompileOutcome::Report { message: reason });
            }
            Err(TypecheckIssue::Conflict(conflict)) => {
                return Ok(CompileOutcome::Conflict(conflict));
            }
        }

        gate(cancel, "planner")?;
        let outcome = planner::plan(
            &intent,
            snapshot,
            &self.canon.levers,
            self.engine.as_ref(),
            &self.config,
        )?;
        match outcome {
            PlanOutcome::Selected { plan } => {
                gate(cancel, "package")?;
                self.package_plan(&plan, &intent, snapshot, utterance)
            }
            PlanOutcome::Options { plans } => {
                let symbols = SymbolTable::from_snapshot(snapshot);
                let cx = self.cx(snapshot, &symbols);
                Ok(CompileOutcome::Clarification(plan_request(
                    plans, intent, utterance, &cx,
                )))
            }
            PlanOutcome::Infeasible(infeasibility) => {
                Ok(CompileOutcome::Infeasible(infeasibility))
            }
        }
    }

    fn package_plan(
        &self,
        plan: &Plan,
        intent: &EditIntent,
        snapshot: &ProjectSnapshot,
        utterance: &str,
    ) -> CompileResult<CompileOutcome> {
        let package =
            package_compiler::compile(plan, intent, snapshot, &self.canon.version())?;
        Ok(CompileOutcome::Ready(ReadyEdit {
            package,
            origin: PackageOrigin::Fresh {
                intent: intent.clone(),
            },
            utterance: utterance.to_string(),
        }))
    }

    fn stage_undo(
        &self,
        snapshot: &ProjectSnapshot,
        utterance: &str,
    ) -> CompileResult<CompileOutcome> {
        let Some(last) = self.session.undo_stack.last() else {
            return Ok(CompileOutcome::Report {
                message: "there is nothing to undo".to_string(),
            });
        };
        let package = reversal_package(last, snapshot, true);
        Ok(CompileOutcome::Ready(ReadyEdit {
            package,
            origin: PackageOrigin::Undo { of: last.id },
            utterance: utterance.to_string(),
        }))
    }

    fn stage_redo(
        &self,
        snapshot: &ProjectSnapshot,
        utterance: &str,
    ) -> CompileResult<CompileOutcome> {
        let Some(last) = self.session.redo_stack.last() else {
            return Ok(CompileOutcome::Report {
                message: "there is nothing to redo".to_string(),
            });
        };
        let package = reversal_package(last, snapshot, false);
        Ok(CompileOutcome::Ready(ReadyEdit {
            package,
            origin: PackageOrigin::Redo { of: last.id },
            utterance: utterance.to_string(),
        }))
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    fn no_parse(&self, utterance: &str, tokens: &[crate::parser::Token]) -> CompileOutcome {
        let unknown = unknown_words(tokens);
        if let Some((word, suggestions)) =
            best_typo_candidate(&unknown, &self.canon.lexicon, &self.config)
        {
            return CompileOutcome::NoParse {
                message: format!("I don't know the word '{}'", word.folded),
                suggestions,
            };
        }
        if let Some(word) = unknown.first() {
            return CompileOutcome::NoParse {
                message: format!("I don't know the word '{}'", word.folded),
                suggestions: vec![],
            };
        }
        debug!(utterance, "no parse without unknown words");
        CompileOutcome::NoParse {
            message: "I couldn't read that as an instruction".to_string(),
            suggestions: vec![],
        }
    }

    fn cx<'a>(
        &'a self,
        snapshot: &'a ProjectSnapshot,
        symbols: &'a SymbolTable,
    ) -> ResolveCx<'a> {
        ResolveCx {
            session: &self.session,
            snapshot,
            symbols,
            config: &self.config,
            lexicon_version: self.lexicon_version(),
        }
    }

    fn lexicon_version(&self) -> &str {
        self.canon.lexicon.version()
    }
}

/// Build the clarification surfacing near-tied plans.
fn plan_request(
    plans: Vec<Plan>,
    intent: EditIntent,
    utterance: &str,
    cx: &ResolveCx<'_>,
) -> ClarificationRequest {
    let options = plans
        .iter()
        .enumerate()
        .map(|(index, plan)| ClarifyOption {
            index,
            label: plan.summary.clone(),
        })
        .collect();
    let token = cx_token(cx, ResumePayload::Plans {
        intent,
        utterance: utterance.to_string(),
        plans,
    });
    ClarificationRequest {
        kind: ClarifyKind::Plan,
        question: "I can do that more than one way; which do you prefer?".to_string(),
        options,
        token,
    }
}

fn cx_token(cx: &ResolveCx<'_>, payload: ResumePayload) -> crate::intent::resolve::ResumeToken {
    crate::intent::resolve::ResumeToken {
        session: cx.session.session_id,
        lexicon_version: cx.lexicon_version.to_string(),
        symbol_revision: cx.symbols.revision,
        payload,
    }
}

/// An undo or redo package built from a previously committed one. Its diff
/// is the recorded inverse (or forward) diff re-based onto the current
/// revision; nothing is recomputed from operations.
fn reversal_package(
    source: &EditPackage,
    snapshot: &ProjectSnapshot,
    undo: bool,
) -> EditPackage {
    let (diff, inverse, verb, tag) = if undo {
        (source.inverse.clone(), source.diff.clone(), "undo", "undo")
    } else {
        (source.diff.clone(), source.inverse.clone(), "redo", "redo")
    };
    let stats = diff.stats();
    EditPackage {
        id: PackageId::derived(source.id.0, tag),
        created_at: Utc::now(),
        lexicon_version: source.lexicon_version.clone(),
        base_revision: snapshot.revision,
        summary: format!("{} \"{}\"", verb, source.summary),
        operations: vec![],
        diff,
        inverse,
        explanation: Explanation {
            reading: format!("{} the edit \"{}\"", verb, source.summary),
            levers: vec![],
            assumed: vec![],
            checks: vec![],
            stats,
        },
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryProject;
    use crate::project::model::{Layer, Meter, NoteEvent, Section, DEFAULT_PPQ};
    use crate::project::{EventId, LayerId, LayerRole, SectionId};
    use std::collections::BTreeMap;

    fn demo_project() -> MemoryProject {
        let bar = Meter::new(4, 4).ticks_per_bar(DEFAULT_PPQ);
        let melody = LayerId::new();
        let harmony = LayerId::new();
        let pads = LayerId::new();
        let bass = LayerId::new();
        let mut events = Vec::new();
        for i in 0..8 {
            events.push(NoteEvent {
                id: EventId::new(),
                layer: melody,
                start: i * 1920,
                duration: 480,
                pitch: 60 + (i % 5) as u8,
                velocity: 90,
            });
            events.push(NoteEvent {
                id: EventId::new(),
                layer: harmony,
                start: i * 1920,
                duration: 1440,
                pitch: 55,
                velocity: 75,
            });
            events.push(NoteEvent {
                id: EventId::new(),
                layer: pads,
                start: i * 1920,
                duration: 1800,
                pitch: 52,
                velocity: 72,
            });
            events.push(NoteEvent {
                id: EventId::new(),
                layer: bass,
                start: i * 1920,
                duration: 900,
                pitch: 40,
                velocity: 95,
            });
        }
        let mut snap = ProjectSnapshot {
            revision: 1,
            ppq: DEFAULT_PPQ,
            tempo_bpm: 120.0,
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
                    id: harmony,
                    name: "harmony".to_string(),
                    role: LayerRole::Harmony,
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
        MemoryProject::new(snap)
    }

    fn ready(outcome: CompileOutcome) -> ReadyEdit {
        match outcome {
            CompileOutcome::Ready(ready) => ready,
            other => panic!("Expected ready edit, got {:?}", other),
        }
    }

    #[test]
    fn test_compile_does_not_touch_the_project() {
        let host = demo_project();
        let before = host.snapshot();
        let mut compiler = Compiler::new().unwrap();
        let outcome = compiler
            .compile(&host, "make the chorus brighter")
            .unwrap();
        assert!(matches!(outcome, CompileOutcome::Ready(_)));
        assert_eq!(host.snapshot(), before);
        assert!(compiler.session().history().count() == 0);
    }

    #[test]
    fn test_commit_applies_and_updates_focus() {
        let mut host = demo_project();
        let mut compiler = Compiler::new().unwrap();
        let outcome = compiler
            .compile(&host, "make the chorus brighter")
            .unwrap();
        let edit = ready(outcome);
        match compiler.commit(&mut host, &edit).unwrap() {
            CommitResult::Committed { revision } => assert_eq!(revision, 2),
            other => panic!("Expected commit, got {:?}", other),
        }
        let chorus = host
            .snapshot()
            .sections
            .iter()
            .find(|s| s.name == "chorus")
            .unwrap()
            .id;
        assert_eq!(
            compiler.session().focus,
            Some(crate::intent::Scope::Section { id: chorus })
        );
        assert_eq!(compiler.session().history().count(), 1);
    }

    #[test]
    fn test_unknown_word_yields_suggestions() {
        let host = demo_project();
        let mut compiler = Compiler::new().unwrap();
        let outcome = compiler
            .compile(&host, "make the chorus brigther")
            .unwrap();
        match outcome {
            CompileOutcome::NoParse {
                message,
                suggestions,
            } => {
                assert!(message.contains("brigther"));
                assert!(suggestions.iter().any(|s| s == "brighter"));
            }
            other => panic!("Expected no-parse, got {:?}", other),
        }
    }

    #[test]
    fn test_undo_then_redo_roundtrip() {
        let material =
            |s: &ProjectSnapshot| (s.events.clone(), s.layers.clone(), s.cards.clone());
        let mut host = demo_project();
        let base = host.snapshot();
        let mut compiler = Compiler::new().unwrap();

        let edit = ready(compiler.compile(&host, "make the chorus brighter").unwrap());
        compiler.commit(&mut host, &edit).unwrap();
        let after_edit = host.snapshot();
        assert_ne!(material(&after_edit), material(&base));

        let undo = ready(compiler.compile(&host, "undo that").unwrap());
        compiler.commit(&mut host, &undo).unwrap();
        let after_undo = host.snapshot();
        assert_eq!(material(&after_undo), material(&base));

        let redo = ready(compiler.compile(&host, "redo that").unwrap());
        compiler.commit(&mut host, &redo).unwrap();
        let after_redo = host.snapshot();
        assert_eq!(material(&after_redo), material(&after_edit));
    }

    #[test]
    fn test_undo_with_empty_history_reports() {
        let host = demo_project();
        let mut compiler = Compiler::new().unwrap();
        match compiler.compile(&host, "undo that").unwrap() {
            CompileOutcome::Report { message } => {
                assert!(message.contains("nothing to undo"));
            }
            other => panic!("Expected report, got {:?}", other),
        }
    }

    #[test]
    fn test_explain_after_commit_renders_account() {
        let mut host = demo_project();
        let mut compiler = Compiler::new().unwrap();
        let edit = ready(compiler.compile(&host, "make the chorus brighter").unwrap());
        compiler.commit(&mut host, &edit).unwrap();
        match compiler.compile(&host, "explain that").unwrap() {
            CompileOutcome::Explanation { text } => {
                assert!(text.contains("I read this as"), "got {:?}", text);
                assert!(text.contains("brightness"), "got {:?}", text);
            }
            other => panic!("Expected explanation, got {:?}", other),
        }
    }

    #[test]
    fn test_inspect_reports_and_sets_focus() {
        let host = demo_project();
        let mut compiler = Compiler::new().unwrap();
        match compiler.compile(&host, "describe the chorus").unwrap() {
            CompileOutcome::Inspection { report } => {
                assert!(report.contains("chorus"), "got {:?}", report);
                assert!(report.contains("melody"), "got {:?}", report);
            }
            other => panic!("Expected inspection, got {:?}", other),
        }
        assert!(matches!(
            compiler.session().focus,
            Some(crate::intent::Scope::Section { .. })
        ));
    }

    #[test]
    fn test_cancel_before_start_names_first_stage() {
        let host = demo_project();
        let mut compiler = Compiler::new().unwrap();
        let cancel = CancelFlag::new();
        cancel.cancel();
        match compiler.compile_cancellable(&host, "make the chorus brighter", &cancel) {
            Err(CompileError::Cancelled { stage }) => assert_eq!(stage, "parser"),
            other => panic!("Expected cancellation, got {:?}", other),
        }
    }

    #[test]
    fn test_stale_token_rejected_after_project_moves() {
        let mut host = demo_project();
        let mut compiler = Compiler::new().unwrap();
        let request = match compiler.compile(&host, "make the chorsu brighter").unwrap() {
            CompileOutcome::Clarification(request) => request,
            other => panic!("Expected clarification, got {:?}", other),
        };
        // Commit an edit in between, moving the symbol revision.
        let edit = ready(compiler.compile(&host, "make the chorus brighter").unwrap());
        compiler.commit(&mut host, &edit).unwrap();
        let answer = ClarifyAnswer {
            token: request.token,
            choice: 0,
        };
        match compiler.resume(&host, &answer) {
            Err(CompileError::StaleResume { reason }) => {
                assert!(reason.contains("revision"), "got {:?}", reason);
            }
            other => panic!("Expected stale resume, got {:?}", other),
        }
    }

    #[test]
    fn test_resume_after_typo_clarification() {
        let host = demo_project();
        let mut compiler = Compiler::new().unwrap();
        let request = match compiler.compile(&host, "make the chorsu brighter").unwrap() {
            CompileOutcome::Clarification(request) => request,
            other => panic!("Expected clarification, got {:?}", other),
        };
        let chorus_option = request
            .options
            .iter()
            .find(|o| o.label.contains("chorus"))
            .expect("chorus should be suggested");
        let answer = ClarifyAnswer {
            token: request.token.clone(),
            choice: chorus_option.index,
        };
        let outcome = compiler.resume(&host, &answer).unwrap();
        let edit = ready(outcome);
        assert!(edit.package.summary.contains("chorus"), "got {:?}", edit.package.summary);
    }

    #[test]
    fn test_render_letters_clarification_options() {
        let host = demo_project();
        let mut compiler = Compiler::new().unwrap();
        let outcome = compiler.compile(&host, "make the chorsu brighter").unwrap();
        let text = outcome.render();
        assert!(text.contains("A)"), "got {:?}", text);
    }
}
