//! Instruction grammar.
//!
//! A small phrase grammar over token classes, evaluated bottom-up by the
//! chart in [`super::forest`]. Every rule pairs a shape (the `rhs` symbol
//! sequence) with a build function that assembles a typed semantic payload
//! from the children, so a completed parse node IS its meaning and no
//! separate tree walk has to re-derive it. Build functions return `None` to
//! veto a match whose shape fits but whose senses do not (a bar number that
//! is not a whole number, a preserve target that names an element).
//!
//! Rule priorities feed the parse score: a node's score is its rule priority
//! plus the scores of its children. The disambiguator compares root scores;
//! rules that deliberately share a shape and a priority (the two readings of
//! "bring it in earlier") therefore tie and force a clarification.

use crate::canon::axis::{Amount, Axis, Direction, Element, PreserveMode};
use crate::canon::lexicon::{LexCategory, LexEntry};
use crate::config::{TEMPO_MAX_BPM, TEMPO_MIN_BPM, TEMPO_TOLERANCE_BPM};
use crate::intent::{
    AssumedDefault, ConstraintDraft, GoalDraft, Preference, ScopeKindHint, ScopeRef, SubjectRef,
    TargetRef,
};
use crate::project::LayerRole;
use smallvec::SmallVec;

use super::forest::ChartNode;
use super::token::{Lexeme, Span, Token};

// ============================================================================
// Token classes
// ============================================================================

/// Terminal symbol classes. A token may belong to more than one class
/// ("warm" works as adjective and verb, "countermelody" as role and
/// element), in which case the chart seeds one leaf node per class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokClass {
    AxisAdj,
    AxisVerb,
    AxisNoun,
    RoleNoun,
    ElementNoun,
    CausVerb,
    IncrVerb,
    DecrVerb,
    SetVerb,
    IntroVerb,
    RemoveVerb,
    KeepVerb,
    ChangeVerb,
    ShowVerb,
    ExplainVerb,
    UndoVerb,
    RedoVerb,
    DoVerb,
    BringVerb,
    PreferVerb,
    DegreeWord,
    MoreWord,
    LessWord,
    ThanWord,
    ModeWord,
    OnlyWord,
    Neg,
    Det,
    Pronoun,
    ConjAnd,
    ConjBut,
    Particle,
    BarWord,
    TempoUnit,
    EditsNoun,
    SectionWord,
    LayerWord,
    AgainWord,
    PrepIn,
    PrepTo,
    PrepAt,
    PrepFrom,
    PrepOf,
    PrepWithin,
    Number,
    NoteName,
    Comma,
    Slash,
    Opaque,
}

/// Classes a token can serve as. Empty means the token cannot participate
/// in any rule (an unmapped preposition), which simply yields no parse.
pub fn classify(token: &Token) -> SmallVec<[TokClass; 2]> {
    let mut out = SmallVec::new();
    match &token.lexeme {
        Lexeme::Number(_) => out.push(TokClass::Number),
        Lexeme::Note(_) => out.push(TokClass::NoteName),
        Lexeme::Comma => out.push(TokClass::Comma),
        Lexeme::Slash => out.push(TokClass::Slash),
        Lexeme::Opaque => out.push(TokClass::Opaque),
        Lexeme::Known(entry) => match entry.category {
            LexCategory::AxisAdjective => out.push(TokClass::AxisAdj),
            LexCategory::AxisWord => {
                out.push(TokClass::AxisAdj);
                out.push(TokClass::AxisVerb);
            }
            LexCategory::AxisVerb => out.push(TokClass::AxisVerb),
            LexCategory::AxisNoun => out.push(TokClass::AxisNoun),
            LexCategory::RoleNoun => {
                out.push(TokClass::RoleNoun);
                if entry.element.is_some() {
                    out.push(TokClass::ElementNoun);
                }
            }
            LexCategory::ElementNoun => out.push(TokClass::ElementNoun),
            LexCategory::CausativeVerb => out.push(TokClass::CausVerb),
            LexCategory::IncreaseVerb => out.push(TokClass::IncrVerb),
            LexCategory::DecreaseVerb => out.push(TokClass::DecrVerb),
            LexCategory::SetVerb => out.push(TokClass::SetVerb),
            LexCategory::IntroduceVerb => out.push(TokClass::IntroVerb),
            LexCategory::RemoveVerb => out.push(TokClass::RemoveVerb),
            LexCategory::PreserveVerb => out.push(TokClass::KeepVerb),
            LexCategory::ChangeVerb => out.push(TokClass::ChangeVerb),
            LexCategory::ShowVerb => out.push(TokClass::ShowVerb),
            LexCategory::ExplainVerb => out.push(TokClass::ExplainVerb),
            LexCategory::UndoVerb => out.push(TokClass::UndoVerb),
            LexCategory::RedoVerb => out.push(TokClass::RedoVerb),
            LexCategory::DoVerb => out.push(TokClass::DoVerb),
            LexCategory::BringVerb => out.push(TokClass::BringVerb),
            LexCategory::PreferVerb => out.push(TokClass::PreferVerb),
            LexCategory::DegreeWord => out.push(TokClass::DegreeWord),
            LexCategory::MoreWord => out.push(TokClass::MoreWord),
            LexCategory::LessWord => out.push(TokClass::LessWord),
            LexCategory::ThanWord => out.push(TokClass::ThanWord),
            LexCategory::PreserveModeWord => out.push(TokClass::ModeWord),
            LexCategory::OnlyWord => out.push(TokClass::OnlyWord),
            LexCategory::Negation => out.push(TokClass::Neg),
            LexCategory::Determiner => out.push(TokClass::Det),
            LexCategory::Pronoun => out.push(TokClass::Pronoun),
            LexCategory::ConjunctionAnd => out.push(TokClass::ConjAnd),
            LexCategory::ConjunctionBut => out.push(TokClass::ConjBut),
            LexCategory::Particle => out.push(TokClass::Particle),
            LexCategory::BarWord => out.push(TokClass::BarWord),
            LexCategory::TempoUnit => out.push(TokClass::TempoUnit),
            LexCategory::EditsNoun => out.push(TokClass::EditsNoun),
            LexCategory::SectionWord => out.push(TokClass::SectionWord),
            LexCategory::LayerWord => out.push(TokClass::LayerWord),
            LexCategory::AgainWord => out.push(TokClass::AgainWord),
            LexCategory::Preposition => match entry.lexeme.as_str() {
                "in" => out.push(TokClass::PrepIn),
                "to" => out.push(TokClass::PrepTo),
                "at" => out.push(TokClass::PrepAt),
                "from" => out.push(TokClass::PrepFrom),
                "of" => out.push(TokClass::PrepOf),
                "within" => out.push(TokClass::PrepWithin),
                _ => {}
            },
        },
    }
    out
}

// ============================================================================
// Categories and symbols
// ============================================================================

/// Chart node category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cat {
    Leaf(TokClass),
    Deg,
    ModeP,
    AdjP,
    AdjList,
    Np,
    NpList,
    ScopePp,
    GoalVp,
    ConstraintVp,
    PrefVp,
    Clause,
    Utt,
}

/// One symbol in a rule's right-hand side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sym {
    T(TokClass),
    N(Cat),
}

// ============================================================================
// Semantic payloads
// ============================================================================

/// An adjective phrase sense: which axis, which way, how much, and an
/// optional comparison baseline ("darker than the verse").
#[derive(Debug, Clone, PartialEq)]
pub struct AdjSem {
    pub axis: Axis,
    pub direction: Direction,
    pub amount: Option<Amount>,
    pub baseline: Option<NounSem>,
    pub span: Span,
}

/// A noun phrase sense.
#[derive(Debug, Clone, PartialEq)]
pub enum NounSem {
    Role { role: LayerRole, span: Span },
    Element { element: Element, span: Span },
    Named { name: String, hint: Option<ScopeKindHint>, span: Span },
    Anaphor { span: Span },
    Everything { span: Span },
    AxisRef { axis: Axis, span: Span },
    Bars { start_bar: u32, end_bar: Option<u32>, span: Span },
}

impl NounSem {
    pub fn span(&self) -> Span {
        match self {
            NounSem::Role { span, .. }
            | NounSem::Element { span, .. }
            | NounSem::Named { span, .. }
            | NounSem::Anaphor { span }
            | NounSem::Everything { span }
            | NounSem::AxisRef { span, .. }
            | NounSem::Bars { span, .. } => *span,
        }
    }
}

/// A comparison baseline attached to one goal of a goal phrase.
#[derive(Debug, Clone, PartialEq)]
pub struct GoalBaseline {
    pub goal: usize,
    pub noun: NounSem,
}

/// A goal phrase sense: the stated scope, the drafted goals, plus any
/// constraints and defaults the phrasing itself implies.
#[derive(Debug, Clone, PartialEq)]
pub struct GoalSem {
    pub scope: ScopeRef,
    pub goals: Vec<GoalDraft>,
    pub constraints: Vec<ConstraintDraft>,
    pub defaults: Vec<AssumedDefault>,
    pub baselines: Vec<GoalBaseline>,
}

/// A session command recognized at clause level.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandSem {
    Undo,
    Redo,
    Again,
    Explain,
    Inspect { scope: ScopeRef },
}

/// One clause of an utterance.
#[derive(Debug, Clone, PartialEq)]
pub enum ClauseSem {
    Goal(GoalSem),
    Constraint {
        draft: ConstraintDraft,
        defaults: Vec<AssumedDefault>,
    },
    Pref(Preference),
    Command(CommandSem),
}

/// Payload carried by a chart node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeSem {
    /// Leaf payloads live on the token itself.
    Token,
    Amount(Amount),
    Mode(PreserveMode),
    Adj(AdjSem),
    AdjList(Vec<AdjSem>),
    Noun(NounSem),
    NounList(Vec<NounSem>),
    ScopePhrase(ScopeRef),
    Goal(GoalSem),
    Constraint {
        draft: ConstraintDraft,
        defaults: Vec<AssumedDefault>,
    },
    Pref(Preference),
    Clause(ClauseSem),
    Utterance(Vec<ClauseSem>),
}

// ============================================================================
// Rules
// ============================================================================

/// Context handed to build functions: the token stream, for leaf senses.
pub struct RuleCtx<'a> {
    pub tokens: &'a [Token],
}

impl RuleCtx<'_> {
    fn token(&self, node: &ChartNode) -> Option<&Token> {
        node.tok.and_then(|i| self.tokens.get(i))
    }

    fn entry(&self, node: &ChartNode) -> Option<&LexEntry> {
        self.token(node).and_then(|t| t.entry())
    }

    fn lexeme_is(&self, node: &ChartNode, id: &str) -> bool {
        self.entry(node).map(|e| e.lexeme.as_str() == id).unwrap_or(false)
    }

    fn folded_is(&self, node: &ChartNode, word: &str) -> bool {
        self.token(node).map(|t| t.folded == word).unwrap_or(false)
    }

    fn number(&self, node: &ChartNode) -> Option<f64> {
        self.token(node).and_then(|t| t.number())
    }

    fn note(&self, node: &ChartNode) -> Option<u8> {
        self.token(node).and_then(|t| t.note_pitch())
    }

    fn surface(&self, node: &ChartNode) -> Option<&str> {
        self.token(node).map(|t| t.surface.as_str())
    }
}

pub type BuildFn = fn(&RuleCtx<'_>, &[&ChartNode], Span) -> Option<NodeSem>;

/// One grammar rule.
pub struct Rule {
    pub name: &'static str,
    pub lhs: Cat,
    pub rhs: &'static [Sym],
    pub priority: f32,
    pub build: BuildFn,
}

use Cat as C;
use Sym::{N, T};
use TokClass as K;

/// The builtin rule set, in match order. Order only matters for ties in
/// interpretation listings; scoring is by priority.
pub static RULES: &[Rule] = &[
    // ---- degree phrases ----------------------------------------------------
    Rule { name: "deg-word", lhs: C::Deg, rhs: &[T(K::DegreeWord)], priority: 1.0, build: b_deg_word },
    Rule { name: "deg-det", lhs: C::Deg, rhs: &[T(K::Det), T(K::DegreeWord)], priority: 1.1, build: b_deg_det },
    // ---- preserve-mode phrases ---------------------------------------------
    Rule { name: "mode-word", lhs: C::ModeP, rhs: &[T(K::ModeWord)], priority: 1.0, build: b_mode_word },
    Rule { name: "mode-det", lhs: C::ModeP, rhs: &[T(K::Det), T(K::ModeWord)], priority: 1.1, build: b_mode_det },
    Rule { name: "mode-chain", lhs: C::ModeP, rhs: &[T(K::ModeWord), N(C::ModeP)], priority: 1.2, build: b_mode_chain },
    // ---- adjective phrases -------------------------------------------------
    Rule { name: "adjp-bare", lhs: C::AdjP, rhs: &[T(K::AxisAdj)], priority: 1.0, build: b_adjp_bare },
    Rule { name: "adjp-deg", lhs: C::AdjP, rhs: &[N(C::Deg), T(K::AxisAdj)], priority: 1.2, build: b_adjp_deg },
    Rule { name: "adjp-more", lhs: C::AdjP, rhs: &[T(K::MoreWord), T(K::AxisAdj)], priority: 1.0, build: b_adjp_more },
    Rule { name: "adjp-less", lhs: C::AdjP, rhs: &[T(K::LessWord), T(K::AxisAdj)], priority: 1.2, build: b_adjp_less },
    Rule { name: "adjp-deg-more", lhs: C::AdjP, rhs: &[N(C::Deg), T(K::MoreWord), T(K::AxisAdj)], priority: 1.3, build: b_adjp_deg_more },
    Rule { name: "adjp-deg-less", lhs: C::AdjP, rhs: &[N(C::Deg), T(K::LessWord), T(K::AxisAdj)], priority: 1.4, build: b_adjp_deg_less },
    Rule { name: "adjp-than", lhs: C::AdjP, rhs: &[N(C::AdjP), T(K::ThanWord), N(C::Np)], priority: 1.3, build: b_adjp_than },
    Rule { name: "adjlist-one", lhs: C::AdjList, rhs: &[N(C::AdjP)], priority: 0.5, build: b_adjlist_one },
    Rule { name: "adjlist-and", lhs: C::AdjList, rhs: &[N(C::AdjList), T(K::ConjAnd), N(C::AdjP)], priority: 1.0, build: b_adjlist_and },
    // ---- noun phrases ------------------------------------------------------
    Rule { name: "np-role", lhs: C::Np, rhs: &[T(K::Det), T(K::RoleNoun)], priority: 1.0, build: b_np_role },
    Rule { name: "np-role-bare", lhs: C::Np, rhs: &[T(K::RoleNoun)], priority: 0.8, build: b_np_role_bare },
    Rule { name: "np-role-layer", lhs: C::Np, rhs: &[T(K::Det), T(K::RoleNoun), T(K::LayerWord)], priority: 1.2, build: b_np_role },
    Rule { name: "np-element", lhs: C::Np, rhs: &[T(K::Det), T(K::ElementNoun)], priority: 1.0, build: b_np_element },
    Rule { name: "np-element-bare", lhs: C::Np, rhs: &[T(K::ElementNoun)], priority: 0.8, build: b_np_element_bare },
    Rule { name: "np-named", lhs: C::Np, rhs: &[T(K::Det), T(K::Opaque)], priority: 0.9, build: b_np_named },
    Rule { name: "np-named-two", lhs: C::Np, rhs: &[T(K::Det), T(K::Opaque), T(K::Opaque)], priority: 0.9, build: b_np_named_two },
    Rule { name: "np-named-section", lhs: C::Np, rhs: &[T(K::Det), T(K::Opaque), T(K::SectionWord)], priority: 1.2, build: b_np_named_section },
    Rule { name: "np-named-layer", lhs: C::Np, rhs: &[T(K::Det), T(K::Opaque), T(K::LayerWord)], priority: 1.2, build: b_np_named_layer },
    Rule { name: "np-named-bare", lhs: C::Np, rhs: &[T(K::Opaque)], priority: 0.4, build: b_np_named_bare },
    Rule { name: "np-pronoun", lhs: C::Np, rhs: &[T(K::Pronoun)], priority: 1.0, build: b_np_pronoun },
    Rule { name: "np-axis", lhs: C::Np, rhs: &[T(K::Det), T(K::AxisNoun)], priority: 1.0, build: b_np_axis },
    Rule { name: "np-axis-bare", lhs: C::Np, rhs: &[T(K::AxisNoun)], priority: 0.8, build: b_np_axis_bare },
    Rule { name: "np-bar-one", lhs: C::Np, rhs: &[T(K::BarWord), T(K::Number)], priority: 1.2, build: b_np_bar_one },
    Rule { name: "np-bars-to", lhs: C::Np, rhs: &[T(K::BarWord), T(K::Number), T(K::PrepTo), T(K::Number)], priority: 1.3, build: b_np_bars_to },
    Rule { name: "np-bars-to-long", lhs: C::Np, rhs: &[T(K::BarWord), T(K::Number), T(K::PrepTo), T(K::BarWord), T(K::Number)], priority: 1.3, build: b_np_bars_to_long },
    Rule { name: "np-bars-juxt", lhs: C::Np, rhs: &[T(K::BarWord), T(K::Number), T(K::Number)], priority: 1.1, build: b_np_bars_juxt },
    Rule { name: "nplist-one", lhs: C::NpList, rhs: &[N(C::Np)], priority: 0.5, build: b_nplist_one },
    Rule { name: "nplist-and", lhs: C::NpList, rhs: &[N(C::NpList), T(K::ConjAnd), N(C::Np)], priority: 1.0, build: b_nplist_append },
    Rule { name: "nplist-comma", lhs: C::NpList, rhs: &[N(C::NpList), T(K::Comma), N(C::Np)], priority: 0.9, build: b_nplist_append },
    // ---- scope phrases -----------------------------------------------------
    Rule { name: "scope-in-np", lhs: C::ScopePp, rhs: &[T(K::PrepIn), N(C::Np)], priority: 1.2, build: b_scope_in_np },
    Rule { name: "scope-from-np", lhs: C::ScopePp, rhs: &[T(K::PrepFrom), N(C::Np)], priority: 1.2, build: b_scope_from_np },
    // ---- goal phrases ------------------------------------------------------
    Rule { name: "goal-make", lhs: C::GoalVp, rhs: &[T(K::CausVerb), N(C::Np), N(C::AdjList)], priority: 1.5, build: b_goal_make },
    Rule { name: "goal-adjverb", lhs: C::GoalVp, rhs: &[T(K::AxisVerb), N(C::Np)], priority: 1.3, build: b_goal_adjverb },
    Rule { name: "goal-adjverb-deg", lhs: C::GoalVp, rhs: &[T(K::AxisVerb), N(C::Np), N(C::Deg)], priority: 1.5, build: b_goal_adjverb_deg },
    Rule { name: "goal-deg-adjverb", lhs: C::GoalVp, rhs: &[N(C::Deg), T(K::AxisVerb), N(C::Np)], priority: 1.5, build: b_goal_deg_adjverb },
    Rule { name: "goal-adjverb-part", lhs: C::GoalVp, rhs: &[T(K::AxisVerb), N(C::Np), T(K::Particle)], priority: 1.4, build: b_goal_adjverb_part },
    Rule { name: "goal-adjverb-part-deg", lhs: C::GoalVp, rhs: &[T(K::AxisVerb), N(C::Np), T(K::Particle), N(C::Deg)], priority: 1.6, build: b_goal_adjverb_part_deg },
    Rule { name: "goal-incr", lhs: C::GoalVp, rhs: &[T(K::IncrVerb), N(C::Np)], priority: 1.3, build: b_goal_incr },
    Rule { name: "goal-incr-deg", lhs: C::GoalVp, rhs: &[T(K::IncrVerb), N(C::Np), N(C::Deg)], priority: 1.5, build: b_goal_incr_deg },
    Rule { name: "goal-decr", lhs: C::GoalVp, rhs: &[T(K::DecrVerb), N(C::Np)], priority: 1.3, build: b_goal_decr },
    Rule { name: "goal-decr-deg", lhs: C::GoalVp, rhs: &[T(K::DecrVerb), N(C::Np), N(C::Deg)], priority: 1.5, build: b_goal_decr_deg },
    Rule { name: "goal-incr-of", lhs: C::GoalVp, rhs: &[T(K::IncrVerb), N(C::Np), T(K::PrepOf), N(C::Np)], priority: 1.6, build: b_goal_incr_of },
    Rule { name: "goal-decr-of", lhs: C::GoalVp, rhs: &[T(K::DecrVerb), N(C::Np), T(K::PrepOf), N(C::Np)], priority: 1.6, build: b_goal_decr_of },
    Rule { name: "goal-set", lhs: C::GoalVp, rhs: &[T(K::SetVerb), N(C::Np), T(K::PrepTo), T(K::Number)], priority: 1.6, build: b_goal_set },
    Rule { name: "goal-set-unit", lhs: C::GoalVp, rhs: &[T(K::SetVerb), N(C::Np), T(K::PrepTo), T(K::Number), T(K::TempoUnit)], priority: 1.7, build: b_goal_set_unit },
    Rule { name: "goal-add", lhs: C::GoalVp, rhs: &[T(K::IntroVerb), N(C::Np)], priority: 1.3, build: b_goal_add },
    Rule { name: "goal-add-scoped", lhs: C::GoalVp, rhs: &[T(K::IntroVerb), N(C::Np), N(C::ScopePp)], priority: 1.6, build: b_goal_add_scoped },
    Rule { name: "goal-remove", lhs: C::GoalVp, rhs: &[T(K::RemoveVerb), N(C::Np)], priority: 1.3, build: b_goal_remove },
    Rule { name: "goal-remove-scoped", lhs: C::GoalVp, rhs: &[T(K::RemoveVerb), N(C::Np), N(C::ScopePp)], priority: 1.6, build: b_goal_remove_scoped },
    Rule { name: "goal-remove-part", lhs: C::GoalVp, rhs: &[T(K::RemoveVerb), N(C::Np), T(K::Particle)], priority: 1.35, build: b_goal_remove_part },
    Rule { name: "goal-bring-in-post", lhs: C::GoalVp, rhs: &[T(K::BringVerb), N(C::Np), T(K::PrepIn)], priority: 1.3, build: b_goal_bring_in },
    Rule { name: "goal-bring-in-pre", lhs: C::GoalVp, rhs: &[T(K::BringVerb), T(K::PrepIn), N(C::Np)], priority: 1.4, build: b_goal_bring_in_pre },
    // Two readings of one shape, tied on purpose so neither wins outright.
    Rule { name: "goal-bring-shift", lhs: C::GoalVp, rhs: &[T(K::BringVerb), N(C::Np), T(K::PrepIn), T(K::AxisAdj)], priority: 1.5, build: b_goal_bring_shift },
    Rule { name: "goal-bring-intro", lhs: C::GoalVp, rhs: &[T(K::BringVerb), N(C::Np), T(K::PrepIn), T(K::AxisAdj)], priority: 1.5, build: b_goal_bring_intro },
    Rule { name: "goal-bring-up", lhs: C::GoalVp, rhs: &[T(K::BringVerb), N(C::Np), T(K::Particle)], priority: 1.4, build: b_goal_bring_up },
    Rule { name: "goal-axisnoun-part", lhs: C::GoalVp, rhs: &[T(K::AxisNoun), N(C::Np), T(K::Particle)], priority: 1.2, build: b_goal_axisnoun_part },
    // ---- constraint phrases ------------------------------------------------
    Rule { name: "con-keep-mode", lhs: C::ConstraintVp, rhs: &[T(K::KeepVerb), N(C::Np), N(C::ModeP)], priority: 1.5, build: b_con_keep_mode },
    Rule { name: "con-keep-bare", lhs: C::ConstraintVp, rhs: &[T(K::KeepVerb), N(C::Np)], priority: 1.0, build: b_con_keep_bare },
    Rule { name: "con-keep-tempo-at", lhs: C::ConstraintVp, rhs: &[T(K::KeepVerb), N(C::Np), T(K::PrepAt), T(K::Number)], priority: 1.6, build: b_con_keep_tempo_at },
    Rule { name: "con-keep-tempo-at-unit", lhs: C::ConstraintVp, rhs: &[T(K::KeepVerb), N(C::Np), T(K::PrepAt), T(K::Number), T(K::TempoUnit)], priority: 1.7, build: b_con_keep_tempo_at },
    Rule { name: "con-keep-meter", lhs: C::ConstraintVp, rhs: &[T(K::KeepVerb), N(C::Np), T(K::PrepIn), T(K::Number), T(K::Slash), T(K::Number)], priority: 1.6, build: b_con_keep_meter },
    Rule { name: "con-keep-range-to", lhs: C::ConstraintVp, rhs: &[T(K::KeepVerb), N(C::Np), T(K::PrepWithin), T(K::NoteName), T(K::PrepTo), T(K::NoteName)], priority: 1.7, build: b_con_keep_range },
    Rule { name: "con-keep-range-and", lhs: C::ConstraintVp, rhs: &[T(K::KeepVerb), N(C::Np), T(K::PrepWithin), T(K::NoteName), T(K::ConjAnd), T(K::NoteName)], priority: 1.6, build: b_con_keep_range },
    Rule { name: "con-dont-change", lhs: C::ConstraintVp, rhs: &[T(K::Neg), T(K::ChangeVerb), N(C::Np)], priority: 1.5, build: b_con_dont_change },
    Rule { name: "con-only-change", lhs: C::ConstraintVp, rhs: &[T(K::OnlyWord), T(K::ChangeVerb), N(C::NpList)], priority: 1.5, build: b_con_only_change },
    Rule { name: "con-change-only", lhs: C::ConstraintVp, rhs: &[T(K::ChangeVerb), T(K::OnlyWord), N(C::NpList)], priority: 1.4, build: b_con_only_change_rev },
    // ---- preference phrases ------------------------------------------------
    Rule { name: "pref-fewer", lhs: C::PrefVp, rhs: &[T(K::PreferVerb), T(K::LessWord), T(K::EditsNoun)], priority: 1.5, build: b_pref_fewer },
    Rule { name: "pref-fewer-bare", lhs: C::PrefVp, rhs: &[T(K::LessWord), T(K::EditsNoun)], priority: 0.9, build: b_pref_fewer_bare },
    Rule { name: "pref-layer", lhs: C::PrefVp, rhs: &[T(K::PreferVerb), N(C::Np)], priority: 1.2, build: b_pref_layer },
    // ---- clauses -----------------------------------------------------------
    Rule { name: "clause-goal", lhs: C::Clause, rhs: &[N(C::GoalVp)], priority: 1.0, build: b_clause_goal },
    Rule { name: "clause-goal-scoped", lhs: C::Clause, rhs: &[N(C::GoalVp), N(C::ScopePp)], priority: 1.3, build: b_clause_goal_scoped },
    Rule { name: "clause-scoped-goal", lhs: C::Clause, rhs: &[N(C::ScopePp), N(C::GoalVp)], priority: 1.2, build: b_clause_scoped_goal },
    Rule { name: "clause-scoped-comma-goal", lhs: C::Clause, rhs: &[N(C::ScopePp), T(K::Comma), N(C::GoalVp)], priority: 1.2, build: b_clause_scoped_comma_goal },
    Rule { name: "clause-con", lhs: C::Clause, rhs: &[N(C::ConstraintVp)], priority: 1.0, build: b_clause_con },
    Rule { name: "clause-pref", lhs: C::Clause, rhs: &[N(C::PrefVp)], priority: 1.0, build: b_clause_pref },
    Rule { name: "clause-undo", lhs: C::Clause, rhs: &[T(K::UndoVerb)], priority: 1.2, build: b_clause_undo },
    Rule { name: "clause-undo-obj", lhs: C::Clause, rhs: &[T(K::UndoVerb), N(C::Np)], priority: 1.3, build: b_clause_undo_obj },
    Rule { name: "clause-undo-edits", lhs: C::Clause, rhs: &[T(K::UndoVerb), T(K::Det), T(K::EditsNoun)], priority: 1.3, build: b_clause_undo },
    Rule { name: "clause-redo", lhs: C::Clause, rhs: &[T(K::RedoVerb)], priority: 1.2, build: b_clause_redo },
    Rule { name: "clause-redo-obj", lhs: C::Clause, rhs: &[T(K::RedoVerb), N(C::Np)], priority: 1.3, build: b_clause_redo_obj },
    Rule { name: "clause-again", lhs: C::Clause, rhs: &[T(K::DoVerb), N(C::Np), T(K::AgainWord)], priority: 1.5, build: b_clause_again },
    Rule { name: "clause-inspect", lhs: C::Clause, rhs: &[T(K::ShowVerb), N(C::Np)], priority: 1.3, build: b_clause_inspect },
    Rule { name: "clause-inspect-me", lhs: C::Clause, rhs: &[T(K::ShowVerb), T(K::Opaque), N(C::Np)], priority: 1.35, build: b_clause_inspect_me },
    Rule { name: "clause-show-edits", lhs: C::Clause, rhs: &[T(K::ShowVerb), T(K::Det), T(K::EditsNoun)], priority: 1.35, build: b_clause_show_edits },
    Rule { name: "clause-show-me-edits", lhs: C::Clause, rhs: &[T(K::ShowVerb), T(K::Opaque), T(K::Det), T(K::EditsNoun)], priority: 1.4, build: b_clause_show_me_edits },
    Rule { name: "clause-explain", lhs: C::Clause, rhs: &[T(K::ExplainVerb)], priority: 1.2, build: b_clause_explain },
    Rule { name: "clause-explain-obj", lhs: C::Clause, rhs: &[T(K::ExplainVerb), N(C::Np)], priority: 1.3, build: b_clause_explain_obj },
    // ---- utterances --------------------------------------------------------
    Rule { name: "utt-one", lhs: C::Utt, rhs: &[N(C::Clause)], priority: 1.0, build: b_utt_one },
    Rule { name: "utt-and", lhs: C::Utt, rhs: &[N(C::Utt), T(K::ConjAnd), N(C::Clause)], priority: 1.0, build: b_utt_join },
    Rule { name: "utt-but", lhs: C::Utt, rhs: &[N(C::Utt), T(K::ConjBut), N(C::Clause)], priority: 1.0, build: b_utt_join },
    Rule { name: "utt-comma", lhs: C::Utt, rhs: &[N(C::Utt), T(K::Comma), N(C::Clause)], priority: 0.9, build: b_utt_join },
    Rule { name: "utt-comma-and", lhs: C::Utt, rhs: &[N(C::Utt), T(K::Comma), T(K::ConjAnd), N(C::Clause)], priority: 0.9, build: b_utt_join_4 },
    Rule { name: "utt-comma-but", lhs: C::Utt, rhs: &[N(C::Utt), T(K::Comma), T(K::ConjBut), N(C::Clause)], priority: 0.9, build: b_utt_join_4 },
];

// ============================================================================
// Child sem accessors
// ============================================================================

fn sem_amount(node: &ChartNode) -> Option<Amount> {
    match &node.sem {
        NodeSem::Amount(a) => Some(*a),
        _ => None,
    }
}

fn sem_mode(node: &ChartNode) -> Option<PreserveMode> {
    match &node.sem {
        NodeSem::Mode(m) => Some(*m),
        _ => None,
    }
}

fn sem_adj(node: &ChartNode) -> Option<&AdjSem> {
    match &node.sem {
        NodeSem::Adj(a) => Some(a),
        _ => None,
    }
}

fn sem_adjlist(node: &ChartNode) -> Option<&[AdjSem]> {
    match &node.sem {
        NodeSem::AdjList(list) => Some(list),
        _ => None,
    }
}

fn sem_noun(node: &ChartNode) -> Option<&NounSem> {
    match &node.sem {
        NodeSem::Noun(n) => Some(n),
        _ => None,
    }
}

fn sem_nounlist(node: &ChartNode) -> Option<&[NounSem]> {
    match &node.sem {
        NodeSem::NounList(list) => Some(list),
        _ => None,
    }
}

fn sem_scope(node: &ChartNode) -> Option<&ScopeRef> {
    match &node.sem {
        NodeSem::ScopePhrase(s) => Some(s),
        _ => None,
    }
}

fn sem_goal(node: &ChartNode) -> Option<&GoalSem> {
    match &node.sem {
        NodeSem::Goal(g) => Some(g),
        _ => None,
    }
}

// ============================================================================
// Sense conversions
// ============================================================================

/// Roles that double as introducible elements. "Add a countermelody" means
/// the element regardless of whether the word parsed as role or element.
fn role_element_twin(role: LayerRole) -> Option<Element> {
    match role {
        LayerRole::Countermelody => Some(Element::Countermelody),
        _ => None,
    }
}

fn noun_to_scope(noun: &NounSem) -> Option<ScopeRef> {
    match noun {
        NounSem::Role { role, span } => Some(ScopeRef::Role {
            role: *role,
            span: *span,
        }),
        NounSem::Named { name, hint, span } => Some(ScopeRef::Named {
            name: name.clone(),
            hint: *hint,
            span: *span,
        }),
        NounSem::Anaphor { span } => Some(ScopeRef::Anaphor { span: *span }),
        NounSem::Everything { span } => Some(ScopeRef::Everything { span: *span }),
        NounSem::Bars {
            start_bar,
            end_bar,
            span,
        } => Some(ScopeRef::BarRange {
            start_bar: *start_bar,
            end_bar: *end_bar,
            span: *span,
        }),
        NounSem::Element { .. } | NounSem::AxisRef { .. } => None,
    }
}

fn noun_to_target(noun: &NounSem) -> Option<TargetRef> {
    match noun {
        NounSem::Role { role, span } => Some(TargetRef::Role {
            role: *role,
            span: *span,
        }),
        NounSem::Named { name, span, .. } => Some(TargetRef::Named {
            name: name.clone(),
            span: *span,
        }),
        NounSem::Anaphor { span } => Some(TargetRef::Anaphor { span: *span }),
        NounSem::Everything { span } => Some(TargetRef::Everything { span: *span }),
        NounSem::AxisRef { axis, span } => match axis {
            Axis::Tempo => Some(TargetRef::Tempo { span: *span }),
            _ => None,
        },
        NounSem::Element { .. } | NounSem::Bars { .. } => None,
    }
}

fn noun_to_subject(noun: &NounSem) -> Option<SubjectRef> {
    match noun {
        NounSem::Element { element, span } => Some(SubjectRef::Element {
            element: element.clone(),
            span: *span,
        }),
        NounSem::Role { role, span } => match role_element_twin(*role) {
            Some(element) => Some(SubjectRef::Element {
                element,
                span: *span,
            }),
            None => Some(SubjectRef::Role {
                role: *role,
                span: *span,
            }),
        },
        NounSem::Anaphor { span } => Some(SubjectRef::Anaphor { span: *span }),
        NounSem::Named { .. }
        | NounSem::Everything { .. }
        | NounSem::AxisRef { .. }
        | NounSem::Bars { .. } => None,
    }
}

fn goal_sem(scope: ScopeRef, goals: Vec<GoalDraft>) -> NodeSem {
    NodeSem::Goal(GoalSem {
        scope,
        goals,
        constraints: Vec::new(),
        defaults: Vec::new(),
        baselines: Vec::new(),
    })
}

fn direction_particle(direction: Direction) -> &'static str {
    match direction {
        Direction::Up => "up",
        Direction::Down => "down",
    }
}

fn particle_direction(ctx: &RuleCtx<'_>, node: &ChartNode) -> Option<Direction> {
    if ctx.lexeme_is(node, "up") {
        Some(Direction::Up)
    } else if ctx.lexeme_is(node, "down") {
        Some(Direction::Down)
    } else {
        None
    }
}

fn bar_number(ctx: &RuleCtx<'_>, node: &ChartNode) -> Option<u32> {
    let n = ctx.number(node)?;
    if n.fract() == 0.0 && (1.0..=10_000.0).contains(&n) {
        Some(n as u32)
    } else {
        None
    }
}

fn plausible_bpm(value: f64) -> bool {
    (TEMPO_MIN_BPM..=TEMPO_MAX_BPM).contains(&value)
}

// ============================================================================
// Builders: degree, mode, adjectives
// ============================================================================

fn b_deg_word(ctx: &RuleCtx<'_>, children: &[&ChartNode], _span: Span) -> Option<NodeSem> {
    let [word] = children else { return None };
    Some(NodeSem::Amount(ctx.entry(word)?.amount?))
}

fn b_deg_det(ctx: &RuleCtx<'_>, children: &[&ChartNode], _span: Span) -> Option<NodeSem> {
    let [_det, word] = children else { return None };
    Some(NodeSem::Amount(ctx.entry(word)?.amount?))
}

fn b_mode_word(ctx: &RuleCtx<'_>, children: &[&ChartNode], _span: Span) -> Option<NodeSem> {
    let [word] = children else { return None };
    Some(NodeSem::Mode(ctx.entry(word)?.mode?))
}

fn b_mode_det(ctx: &RuleCtx<'_>, children: &[&ChartNode], _span: Span) -> Option<NodeSem> {
    let [_det, word] = children else { return None };
    Some(NodeSem::Mode(ctx.entry(word)?.mode?))
}

// "functionally the same": the leading word carries the intended mode and
// the trailing phrase is a vacuous complement.
fn b_mode_chain(ctx: &RuleCtx<'_>, children: &[&ChartNode], _span: Span) -> Option<NodeSem> {
    let [word, _rest] = children else { return None };
    Some(NodeSem::Mode(ctx.entry(word)?.mode?))
}

fn adj_from_entry(
    ctx: &RuleCtx<'_>,
    node: &ChartNode,
    amount: Option<Amount>,
    flip: bool,
    span: Span,
) -> Option<AdjSem> {
    let entry = ctx.entry(node)?;
    let axis = entry.axis.clone()?;
    let mut direction = entry.direction?;
    if flip {
        direction = direction.flip();
    }
    Some(AdjSem {
        axis,
        direction,
        amount,
        baseline: None,
        span,
    })
}

fn b_adjp_bare(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [adj] = children else { return None };
    Some(NodeSem::Adj(adj_from_entry(ctx, adj, None, false, span)?))
}

fn b_adjp_deg(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [deg, adj] = children else { return None };
    let amount = sem_amount(deg)?;
    Some(NodeSem::Adj(adj_from_entry(ctx, adj, Some(amount), false, span)?))
}

fn b_adjp_more(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_more, adj] = children else { return None };
    Some(NodeSem::Adj(adj_from_entry(ctx, adj, None, false, span)?))
}

fn b_adjp_less(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_less, adj] = children else { return None };
    Some(NodeSem::Adj(adj_from_entry(ctx, adj, None, true, span)?))
}

fn b_adjp_deg_more(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [deg, _more, adj] = children else { return None };
    let amount = sem_amount(deg)?;
    Some(NodeSem::Adj(adj_from_entry(ctx, adj, Some(amount), false, span)?))
}

fn b_adjp_deg_less(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [deg, _less, adj] = children else { return None };
    let amount = sem_amount(deg)?;
    Some(NodeSem::Adj(adj_from_entry(ctx, adj, Some(amount), true, span)?))
}

fn b_adjp_than(_ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [adjp, _than, np] = children else { return None };
    let inner = sem_adj(adjp)?;
    if inner.baseline.is_some() {
        return None;
    }
    let noun = sem_noun(np)?;
    match noun {
        NounSem::Named { .. } | NounSem::Role { .. } | NounSem::Anaphor { .. } => {}
        _ => return None,
    }
    let mut adj = inner.clone();
    adj.baseline = Some(noun.clone());
    adj.span = span;
    Some(NodeSem::Adj(adj))
}

fn b_adjlist_one(_ctx: &RuleCtx<'_>, children: &[&ChartNode], _span: Span) -> Option<NodeSem> {
    let [adjp] = children else { return None };
    Some(NodeSem::AdjList(vec![sem_adj(adjp)?.clone()]))
}

fn b_adjlist_and(_ctx: &RuleCtx<'_>, children: &[&ChartNode], _span: Span) -> Option<NodeSem> {
    let [list, _and, adjp] = children else { return None };
    let mut adjs = sem_adjlist(list)?.to_vec();
    adjs.push(sem_adj(adjp)?.clone());
    Some(NodeSem::AdjList(adjs))
}

// ============================================================================
// Builders: noun phrases
// ============================================================================

fn b_np_role(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let role = children.get(1).and_then(|n| ctx.entry(n))?.role?;
    Some(NodeSem::Noun(NounSem::Role { role, span }))
}

fn b_np_role_bare(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [word] = children else { return None };
    let role = ctx.entry(word)?.role?;
    Some(NodeSem::Noun(NounSem::Role { role, span }))
}

fn b_np_element(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_det, word] = children else { return None };
    let element = ctx.entry(word)?.element.clone()?;
    Some(NodeSem::Noun(NounSem::Element { element, span }))
}

fn b_np_element_bare(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [word] = children else { return None };
    let element = ctx.entry(word)?.element.clone()?;
    Some(NodeSem::Noun(NounSem::Element { element, span }))
}

fn named_noun(name: &str, hint: Option<ScopeKindHint>, span: Span) -> Option<NodeSem> {
    if name.trim().is_empty() {
        return None;
    }
    Some(NodeSem::Noun(NounSem::Named {
        name: name.to_string(),
        hint,
        span,
    }))
}

fn b_np_named(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_det, word] = children else { return None };
    named_noun(ctx.surface(word)?, None, span)
}

fn b_np_named_two(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_det, first, second] = children else { return None };
    let name = format!("{} {}", ctx.surface(first)?, ctx.surface(second)?);
    named_noun(&name, None, span)
}

fn b_np_named_section(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_det, word, _kind] = children else { return None };
    named_noun(ctx.surface(word)?, Some(ScopeKindHint::Section), span)
}

fn b_np_named_layer(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_det, word, _kind] = children else { return None };
    named_noun(ctx.surface(word)?, Some(ScopeKindHint::Layer), span)
}

fn b_np_named_bare(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [word] = children else { return None };
    named_noun(ctx.surface(word)?, None, span)
}

fn b_np_pronoun(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [word] = children else { return None };
    if ctx.lexeme_is(word, "everything") {
        Some(NodeSem::Noun(NounSem::Everything { span }))
    } else {
        Some(NodeSem::Noun(NounSem::Anaphor { span }))
    }
}

fn b_np_axis(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_det, word] = children else { return None };
    let axis = ctx.entry(word)?.axis.clone()?;
    Some(NodeSem::Noun(NounSem::AxisRef { axis, span }))
}

fn b_np_axis_bare(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [word] = children else { return None };
    let axis = ctx.entry(word)?.axis.clone()?;
    Some(NodeSem::Noun(NounSem::AxisRef { axis, span }))
}

fn b_nplist_one(_ctx: &RuleCtx<'_>, children: &[&ChartNode], _span: Span) -> Option<NodeSem> {
    let [np] = children else { return None };
    Some(NodeSem::NounList(vec![sem_noun(np)?.clone()]))
}

fn b_nplist_append(_ctx: &RuleCtx<'_>, children: &[&ChartNode], _span: Span) -> Option<NodeSem> {
    let [list, _sep, np] = children else { return None };
    let mut nouns = sem_nounlist(list)?.to_vec();
    nouns.push(sem_noun(np)?.clone());
    Some(NodeSem::NounList(nouns))
}

fn bar_noun(start: u32, end: Option<u32>, span: Span) -> Option<NodeSem> {
    if let Some(end) = end {
        if end < start {
            return None;
        }
    }
    Some(NodeSem::Noun(NounSem::Bars {
        start_bar: start,
        end_bar: end,
        span,
    }))
}

fn b_np_bar_one(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_bar, num] = children else { return None };
    bar_noun(bar_number(ctx, num)?, None, span)
}

fn b_np_bars_to(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_bar, first, _to, second] = children else { return None };
    bar_noun(
        bar_number(ctx, first)?,
        Some(bar_number(ctx, second)?),
        span,
    )
}

fn b_np_bars_to_long(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_bar1, first, _to, _bar2, second] = children else { return None };
    bar_noun(
        bar_number(ctx, first)?,
        Some(bar_number(ctx, second)?),
        span,
    )
}

// "bars 9 16": a typed range whose dash the scanner dropped.
fn b_np_bars_juxt(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_bar, first, second] = children else { return None };
    let start = bar_number(ctx, first)?;
    let end = bar_number(ctx, second)?;
    if end <= start {
        return None;
    }
    bar_noun(start, Some(end), span)
}

// ============================================================================
// Builders: scope phrases
// ============================================================================

fn b_scope_in_np(_ctx: &RuleCtx<'_>, children: &[&ChartNode], _span: Span) -> Option<NodeSem> {
    let [_prep, np] = children else { return None };
    Some(NodeSem::ScopePhrase(noun_to_scope(sem_noun(np)?)?))
}

// "from bars 9 to 16": only a bar noun makes sense after "from".
fn b_scope_from_np(_ctx: &RuleCtx<'_>, children: &[&ChartNode], _span: Span) -> Option<NodeSem> {
    let [_prep, np] = children else { return None };
    let noun = sem_noun(np)?;
    match noun {
        NounSem::Bars { .. } => Some(NodeSem::ScopePhrase(noun_to_scope(noun)?)),
        _ => None,
    }
}

// ============================================================================
// Builders: goal phrases
// ============================================================================

fn b_goal_make(_ctx: &RuleCtx<'_>, children: &[&ChartNode], _span: Span) -> Option<NodeSem> {
    let [_verb, np, list] = children else { return None };
    let scope = noun_to_scope(sem_noun(np)?)?;
    let adjs = sem_adjlist(list)?;
    let mut goals = Vec::with_capacity(adjs.len());
    let mut baselines = Vec::new();
    for adj in adjs {
        if let Some(noun) = &adj.baseline {
            baselines.push(GoalBaseline {
                goal: goals.len(),
                noun: noun.clone(),
            });
        }
        goals.push(GoalDraft::Adjust {
            axis: adj.axis.clone(),
            direction: adj.direction,
            amount: adj.amount,
            span: adj.span,
        });
    }
    Some(NodeSem::Goal(GoalSem {
        scope,
        goals,
        constraints: Vec::new(),
        defaults: Vec::new(),
        baselines,
    }))
}

fn axis_verb_goal(
    ctx: &RuleCtx<'_>,
    verb: &ChartNode,
    np: &ChartNode,
    amount: Option<Amount>,
    span: Span,
) -> Option<NodeSem> {
    let entry = ctx.entry(verb)?;
    let axis = entry.axis.clone()?;
    let direction = entry.direction?;
    let scope = noun_to_scope(sem_noun(np)?)?;
    Some(goal_sem(
        scope,
        vec![GoalDraft::Adjust {
            axis,
            direction,
            amount,
            span,
        }],
    ))
}

fn b_goal_adjverb(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [verb, np] = children else { return None };
    axis_verb_goal(ctx, verb, np, None, span)
}

fn b_goal_adjverb_deg(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [verb, np, deg] = children else { return None };
    axis_verb_goal(ctx, verb, np, Some(sem_amount(deg)?), span)
}

fn b_goal_deg_adjverb(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [deg, verb, np] = children else { return None };
    axis_verb_goal(ctx, verb, np, Some(sem_amount(deg)?), span)
}

// "slow it down": the particle must agree with the verb's own direction.
fn b_goal_adjverb_part(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [verb, np, part] = children else { return None };
    let direction = ctx.entry(verb)?.direction?;
    if !ctx.lexeme_is(part, direction_particle(direction)) {
        return None;
    }
    axis_verb_goal(ctx, verb, np, None, span)
}

fn b_goal_adjverb_part_deg(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [verb, np, part, deg] = children else { return None };
    let direction = ctx.entry(verb)?.direction?;
    if !ctx.lexeme_is(part, direction_particle(direction)) {
        return None;
    }
    axis_verb_goal(ctx, verb, np, Some(sem_amount(deg)?), span)
}

fn axis_noun_goal(
    np: &ChartNode,
    direction: Direction,
    amount: Option<Amount>,
    span: Span,
) -> Option<NodeSem> {
    let NounSem::AxisRef { axis, .. } = sem_noun(np)? else {
        return None;
    };
    Some(goal_sem(
        ScopeRef::Implied,
        vec![GoalDraft::Adjust {
            axis: axis.clone(),
            direction,
            amount,
            span,
        }],
    ))
}

fn b_goal_incr(_ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_verb, np] = children else { return None };
    axis_noun_goal(np, Direction::Up, None, span)
}

fn b_goal_incr_deg(_ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_verb, np, deg] = children else { return None };
    axis_noun_goal(np, Direction::Up, Some(sem_amount(deg)?), span)
}

fn b_goal_decr(_ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_verb, np] = children else { return None };
    axis_noun_goal(np, Direction::Down, None, span)
}

fn b_goal_decr_deg(_ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_verb, np, deg] = children else { return None };
    axis_noun_goal(np, Direction::Down, Some(sem_amount(deg)?), span)
}

// "increase the brightness of the pads": axis noun plus an explicit scope.
fn axis_of_goal(
    axis_np: &ChartNode,
    scope_np: &ChartNode,
    direction: Direction,
    span: Span,
) -> Option<NodeSem> {
    let NounSem::AxisRef { axis, .. } = sem_noun(axis_np)? else {
        return None;
    };
    let scope = noun_to_scope(sem_noun(scope_np)?)?;
    Some(goal_sem(
        scope,
        vec![GoalDraft::Adjust {
            axis: axis.clone(),
            direction,
            amount: None,
            span,
        }],
    ))
}

fn b_goal_incr_of(_ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_verb, axis_np, _of, scope_np] = children else { return None };
    axis_of_goal(axis_np, scope_np, Direction::Up, span)
}

fn b_goal_decr_of(_ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_verb, axis_np, _of, scope_np] = children else { return None };
    axis_of_goal(axis_np, scope_np, Direction::Down, span)
}

fn set_goal(ctx: &RuleCtx<'_>, np: &ChartNode, num: &ChartNode, span: Span) -> Option<NodeSem> {
    let NounSem::AxisRef { axis, .. } = sem_noun(np)? else {
        return None;
    };
    let value = ctx.number(num)?;
    if *axis == Axis::Tempo && !plausible_bpm(value) {
        return None;
    }
    if !value.is_finite() {
        return None;
    }
    Some(goal_sem(
        ScopeRef::Implied,
        vec![GoalDraft::SetTo {
            axis: axis.clone(),
            value,
            span,
        }],
    ))
}

fn b_goal_set(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_verb, np, _to, num] = children else { return None };
    set_goal(ctx, np, num, span)
}

fn b_goal_set_unit(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_verb, np, _to, num, _unit] = children else { return None };
    let NounSem::AxisRef { axis, .. } = sem_noun(np)? else {
        return None;
    };
    if *axis != Axis::Tempo {
        return None;
    }
    set_goal(ctx, np, num, span)
}

fn b_goal_add(_ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_verb, np] = children else { return None };
    let subject = noun_to_subject(sem_noun(np)?)?;
    Some(goal_sem(
        ScopeRef::Implied,
        vec![GoalDraft::Introduce {
            subject,
            amount: None,
            span,
        }],
    ))
}

fn b_goal_add_scoped(_ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_verb, np, pp] = children else { return None };
    let subject = noun_to_subject(sem_noun(np)?)?;
    Some(goal_sem(
        sem_scope(pp)?.clone(),
        vec![GoalDraft::Introduce {
            subject,
            amount: None,
            span,
        }],
    ))
}

fn b_goal_remove(_ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_verb, np] = children else { return None };
    let subject = noun_to_subject(sem_noun(np)?)?;
    Some(goal_sem(
        ScopeRef::Implied,
        vec![GoalDraft::Remove {
            subject,
            amount: None,
            span,
        }],
    ))
}

fn b_goal_remove_scoped(_ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_verb, np, pp] = children else { return None };
    let subject = noun_to_subject(sem_noun(np)?)?;
    Some(goal_sem(
        sem_scope(pp)?.clone(),
        vec![GoalDraft::Remove {
            subject,
            amount: None,
            span,
        }],
    ))
}

fn b_goal_remove_part(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_verb, np, part] = children else { return None };
    if !ctx.lexeme_is(part, "out") {
        return None;
    }
    let subject = noun_to_subject(sem_noun(np)?)?;
    Some(goal_sem(
        ScopeRef::Implied,
        vec![GoalDraft::Remove {
            subject,
            amount: None,
            span,
        }],
    ))
}

fn bring_in_goal(np: &ChartNode, span: Span) -> Option<NodeSem> {
    let subject = noun_to_subject(sem_noun(np)?)?;
    Some(goal_sem(
        ScopeRef::Implied,
        vec![GoalDraft::Introduce {
            subject,
            amount: None,
            span,
        }],
    ))
}

fn b_goal_bring_in(_ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_verb, np, _in] = children else { return None };
    bring_in_goal(np, span)
}

fn b_goal_bring_in_pre(_ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_verb, _in, np] = children else { return None };
    bring_in_goal(np, span)
}

// Reading one of "bring it in earlier" / "bring the pads in soft": adjust
// the named axis on the material that is already there.
fn b_goal_bring_shift(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_verb, np, _in, adj] = children else { return None };
    let entry = ctx.entry(adj)?;
    let axis = entry.axis.clone()?;
    let direction = entry.direction?;
    let scope = noun_to_scope(sem_noun(np)?)?;
    Some(goal_sem(
        scope,
        vec![GoalDraft::Adjust {
            axis,
            direction,
            amount: None,
            span,
        }],
    ))
}

// Reading two: introduce the referent, entering in the stated manner
// (earlier than it would otherwise land, or at low loudness).
fn b_goal_bring_intro(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_verb, np, _in, adj] = children else { return None };
    let entry = ctx.entry(adj)?;
    let axis = entry.axis.clone()?;
    let direction = entry.direction?;
    let subject = noun_to_subject(sem_noun(np)?)?;
    Some(goal_sem(
        ScopeRef::Implied,
        vec![
            GoalDraft::Introduce {
                subject,
                amount: None,
                span,
            },
            GoalDraft::Adjust {
                axis,
                direction,
                amount: None,
                span,
            },
        ],
    ))
}

// "bring the energy up".
fn b_goal_bring_up(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_verb, np, part] = children else { return None };
    let direction = particle_direction(ctx, part)?;
    axis_noun_goal(np, direction, None, span)
}

// "speed it up": axis noun used verbally, scope from the object.
fn b_goal_axisnoun_part(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [noun, np, part] = children else { return None };
    let axis = ctx.entry(noun)?.axis.clone()?;
    let direction = particle_direction(ctx, part)?;
    let scope = noun_to_scope(sem_noun(np)?)?;
    Some(goal_sem(
        scope,
        vec![GoalDraft::Adjust {
            axis,
            direction,
            amount: None,
            span,
        }],
    ))
}

// ============================================================================
// Builders: constraint phrases
// ============================================================================

fn b_con_keep_mode(_ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_verb, np, mode] = children else { return None };
    let target = noun_to_target(sem_noun(np)?)?;
    Some(NodeSem::Constraint {
        draft: ConstraintDraft::Preserve {
            target,
            mode: sem_mode(mode)?,
            hard: true,
            span,
        },
        defaults: Vec::new(),
    })
}

fn b_con_keep_bare(_ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_verb, np] = children else { return None };
    let target = noun_to_target(sem_noun(np)?)?;
    Some(NodeSem::Constraint {
        draft: ConstraintDraft::Preserve {
            target,
            mode: PreserveMode::Exact,
            hard: true,
            span,
        },
        defaults: vec![AssumedDefault {
            slot: "preserve_mode".to_string(),
            value: "exact".to_string(),
            span,
        }],
    })
}

fn b_con_keep_tempo_at(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let (np, num) = match children {
        [_verb, np, _at, num] | [_verb, np, _at, num, _] => (np, num),
        _ => return None,
    };
    let NounSem::AxisRef { axis, .. } = sem_noun(np)? else {
        return None;
    };
    if *axis != Axis::Tempo {
        return None;
    }
    let bpm = ctx.number(num)?;
    if !plausible_bpm(bpm) {
        return None;
    }
    Some(NodeSem::Constraint {
        draft: ConstraintDraft::Tempo {
            bpm,
            tolerance: TEMPO_TOLERANCE_BPM,
            hard: true,
            span,
        },
        defaults: Vec::new(),
    })
}

fn b_con_keep_meter(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_verb, np, _in, num1, _slash, num2] = children else { return None };
    match sem_noun(np)? {
        NounSem::Anaphor { .. } | NounSem::Everything { .. } => {}
        _ => return None,
    }
    let numerator = ctx.number(num1)?;
    let denominator = ctx.number(num2)?;
    if numerator.fract() != 0.0 || denominator.fract() != 0.0 {
        return None;
    }
    let numerator = numerator as i64;
    let denominator = denominator as i64;
    if !(1..=32).contains(&numerator) || ![1, 2, 4, 8, 16, 32].contains(&denominator) {
        return None;
    }
    Some(NodeSem::Constraint {
        draft: ConstraintDraft::Meter {
            numerator: numerator as u8,
            denominator: denominator as u8,
            hard: true,
            span,
        },
        defaults: Vec::new(),
    })
}

fn b_con_keep_range(ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_verb, np, _within, low, _sep, high] = children else { return None };
    let NounSem::Role { role, .. } = sem_noun(np)? else {
        return None;
    };
    let first = ctx.note(low)?;
    let second = ctx.note(high)?;
    if first == second {
        return None;
    }
    Some(NodeSem::Constraint {
        draft: ConstraintDraft::RangeLimit {
            voice: *role,
            min_pitch: first.min(second),
            max_pitch: first.max(second),
            hard: true,
            span,
        },
        defaults: Vec::new(),
    })
}

fn b_con_dont_change(_ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_neg, _verb, np] = children else { return None };
    let target = noun_to_target(sem_noun(np)?)?;
    Some(NodeSem::Constraint {
        draft: ConstraintDraft::Preserve {
            target,
            mode: PreserveMode::Exact,
            hard: true,
            span,
        },
        defaults: Vec::new(),
    })
}

fn only_change(nouns: &[NounSem], span: Span) -> Option<NodeSem> {
    let targets: Option<Vec<TargetRef>> = nouns.iter().map(noun_to_target).collect();
    let targets = targets?;
    if targets.is_empty() {
        return None;
    }
    Some(NodeSem::Constraint {
        draft: ConstraintDraft::OnlyChange {
            targets,
            hard: true,
            span,
        },
        defaults: Vec::new(),
    })
}

fn b_con_only_change(_ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_only, _verb, list] = children else { return None };
    only_change(sem_nounlist(list)?, span)
}

fn b_con_only_change_rev(_ctx: &RuleCtx<'_>, children: &[&ChartNode], span: Span) -> Option<NodeSem> {
    let [_verb, _only, list] = children else { return None };
    only_change(sem_nounlist(list)?, span)
}

// ============================================================================
// Builders: preferences
// ============================================================================

fn b_pref_fewer(ctx: &RuleCtx<'_>, children: &[&ChartNode], _span: Span) -> Option<NodeSem> {
    let [verb, _less, _edits] = children else { return None };
    if !ctx.lexeme_is(verb, "prefer") {
        return None;
    }
    Some(NodeSem::Pref(Preference::FewerEdits))
}

fn b_pref_fewer_bare(_ctx: &RuleCtx<'_>, children: &[&ChartNode], _span: Span) -> Option<NodeSem> {
    let [_less, _edits] = children else { return None };
    Some(NodeSem::Pref(Preference::FewerEdits))
}

fn b_pref_layer(ctx: &RuleCtx<'_>, children: &[&ChartNode], _span: Span) -> Option<NodeSem> {
    let [verb, np] = children else { return None };
    let NounSem::Role { role, .. } = sem_noun(np)? else {
        return None;
    };
    let pref = if ctx.lexeme_is(verb, "avoid") {
        Preference::AvoidLayer { role: *role }
    } else {
        Preference::PreferLayer { role: *role }
    };
    Some(NodeSem::Pref(pref))
}

// ============================================================================
// Builders: clauses
// ============================================================================

fn b_clause_goal(_ctx: &RuleCtx<'_>, children: &[&ChartNode], _span: Span) -> Option<NodeSem> {
    let [gv] = children else { return None };
    Some(NodeSem::Clause(ClauseSem::Goal(sem_goal(gv)?.clone())))
}

/// Attach a trailing or leading scope phrase to a goal. An implied or
/// anaphoric scope is refined to the phrase; a role scope keeps the phrase
/// as the region and narrows edits to the role via an only-change bound.
fn attach_scope(goal: &GoalSem, scope: &ScopeRef) -> Option<GoalSem> {
    let mut merged = goal.clone();
    match &goal.scope {
        ScopeRef::Implied | ScopeRef::Anaphor { .. } => {
            merged.scope = scope.clone();
        }
        ScopeRef::Role { role, span } => {
            merged.scope = scope.clone();
            merged.constraints.push(ConstraintDraft::OnlyChange {
                targets: vec![TargetRef::Role {
                    role: *role,
                    span: *span,
                }],
                hard: true,
                span: *span,
            });
        }
        _ => return None,
    }
    Some(merged)
}

fn b_clause_goal_scoped(_ctx: &RuleCtx<'_>, children: &[&ChartNode], _span: Span) -> Option<NodeSem> {
    let [gv, pp] = children else { return None };
    let merged = attach_scope(sem_goal(gv)?, sem_scope(pp)?)?;
    Some(NodeSem::Clause(ClauseSem::Goal(merged)))
}

fn b_clause_scoped_goal(_ctx: &RuleCtx<'_>, children: &[&ChartNode], _span: Span) -> Option<NodeSem> {
    let [pp, gv] = children else { return None };
    let merged = attach_scope(sem_goal(gv)?, sem_scope(pp)?)?;
    Some(NodeSem::Clause(ClauseSem::Goal(merged)))
}

fn b_clause_scoped_comma_goal(
    _ctx: &RuleCtx<'_>,
    children: &[&ChartNode],
    _span: Span,
) -> Option<NodeSem> {
    let [pp, _comma, gv] = children else { return None };
    let merged = attach_scope(sem_goal(gv)?, sem_scope(pp)?)?;
    Some(NodeSem::Clause(ClauseSem::Goal(merged)))
}

fn b_clause_con(_ctx: &RuleCtx<'_>, children: &[&ChartNode], _span: Span) -> Option<NodeSem> {
    let [con] = children else { return None };
    match &con.sem {
        NodeSem::Constraint { draft, defaults } => Some(NodeSem::Clause(ClauseSem::Constraint {
            draft: draft.clone(),
            defaults: defaults.clone(),
        })),
        _ => None,
    }
}

fn b_clause_pref(_ctx: &RuleCtx<'_>, children: &[&ChartNode], _span: Span) -> Option<NodeSem> {
    let [pref] = children else { return None };
    match &pref.sem {
        NodeSem::Pref(p) => Some(NodeSem::Clause(ClauseSem::Pref(p.clone()))),
        _ => None,
    }
}

fn b_clause_undo(_ctx: &RuleCtx<'_>, _children: &[&ChartNode], _span: Span) -> Option<NodeSem> {
    Some(NodeSem::Clause(ClauseSem::Command(CommandSem::Undo)))
}

fn b_clause_undo_obj(_ctx: &RuleCtx<'_>, children: &[&ChartNode], _span: Span) -> Option<NodeSem> {
    let [_verb, np] = children else { return None };
    match sem_noun(np)? {
        NounSem::Anaphor { .. } => Some(NodeSem::Clause(ClauseSem::Command(CommandSem::Undo))),
        _ => None,
    }
}

fn b_clause_redo(_ctx: &RuleCtx<'_>, _children: &[&ChartNode], _span: Span) -> Option<NodeSem> {
    Some(NodeSem::Clause(ClauseSem::Command(CommandSem::Redo)))
}

fn b_clause_redo_obj(_ctx: &RuleCtx<'_>, children: &[&ChartNode], _span: Span) -> Option<NodeSem> {
    let [_verb, np] = children else { return None };
    match sem_noun(np)? {
        NounSem::Anaphor { .. } => Some(NodeSem::Clause(ClauseSem::Command(CommandSem::Redo))),
        _ => None,
    }
}

fn b_clause_again(_ctx: &RuleCtx<'_>, children: &[&ChartNode], _span: Span) -> Option<NodeSem> {
    let [_do, np, _again] = children else { return None };
    match sem_noun(np)? {
        NounSem::Anaphor { .. } => Some(NodeSem::Clause(ClauseSem::Command(CommandSem::Again))),
        _ => None,
    }
}

fn b_clause_inspect(_ctx: &RuleCtx<'_>, children: &[&ChartNode], _span: Span) -> Option<NodeSem> {
    let [_verb, np] = children else { return None };
    let scope = noun_to_scope(sem_noun(np)?)?;
    Some(NodeSem::Clause(ClauseSem::Command(CommandSem::Inspect {
        scope,
    })))
}

fn b_clause_inspect_me(ctx: &RuleCtx<'_>, children: &[&ChartNode], _span: Span) -> Option<NodeSem> {
    let [_verb, dative, np] = children else { return None };
    if !ctx.folded_is(dative, "me") && !ctx.folded_is(dative, "us") {
        return None;
    }
    let scope = noun_to_scope(sem_noun(np)?)?;
    Some(NodeSem::Clause(ClauseSem::Command(CommandSem::Inspect {
        scope,
    })))
}

fn b_clause_show_edits(_ctx: &RuleCtx<'_>, children: &[&ChartNode], _span: Span) -> Option<NodeSem> {
    let [_verb, _det, _edits] = children else { return None };
    Some(NodeSem::Clause(ClauseSem::Command(CommandSem::Explain)))
}

fn b_clause_show_me_edits(
    ctx: &RuleCtx<'_>,
    children: &[&ChartNode],
    _span: Span,
) -> Option<NodeSem> {
    let [_verb, dative, _det, _edits] = children else { return None };
    if !ctx.folded_is(dative, "me") && !ctx.folded_is(dative, "us") {
        return None;
    }
    Some(NodeSem::Clause(ClauseSem::Command(CommandSem::Explain)))
}

fn b_clause_explain(_ctx: &RuleCtx<'_>, _children: &[&ChartNode], _span: Span) -> Option<NodeSem> {
    Some(NodeSem::Clause(ClauseSem::Command(CommandSem::Explain)))
}

fn b_clause_explain_obj(_ctx: &RuleCtx<'_>, children: &[&ChartNode], _span: Span) -> Option<NodeSem> {
    let [_verb, np] = children else { return None };
    match sem_noun(np)? {
        NounSem::Anaphor { .. } => Some(NodeSem::Clause(ClauseSem::Command(CommandSem::Explain))),
        _ => None,
    }
}

// ============================================================================
// Builders: utterances
// ============================================================================

fn clause_of(node: &ChartNode) -> Option<&ClauseSem> {
    match &node.sem {
        NodeSem::Clause(c) => Some(c),
        _ => None,
    }
}

fn utterance_of(node: &ChartNode) -> Option<&[ClauseSem]> {
    match &node.sem {
        NodeSem::Utterance(clauses) => Some(clauses),
        _ => None,
    }
}

fn b_utt_one(_ctx: &RuleCtx<'_>, children: &[&ChartNode], _span: Span) -> Option<NodeSem> {
    let [clause] = children else { return None };
    Some(NodeSem::Utterance(vec![clause_of(clause)?.clone()]))
}

fn b_utt_join(_ctx: &RuleCtx<'_>, children: &[&ChartNode], _span: Span) -> Option<NodeSem> {
    let [utt, _sep, clause] = children else { return None };
    let mut clauses = utterance_of(utt)?.to_vec();
    clauses.push(clause_of(clause)?.clone());
    Some(NodeSem::Utterance(clauses))
}

fn b_utt_join_4(_ctx: &RuleCtx<'_>, children: &[&ChartNode], _span: Span) -> Option<NodeSem> {
    let [utt, _comma, _conj, clause] = children else { return None };
    let mut clauses = utterance_of(utt)?.to_vec();
    clauses.push(clause_of(clause)?.clone());
    Some(NodeSem::Utterance(clauses))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::CanonBundle;
    use crate::parser::normalize::scan;
    use crate::parser::token::tokenize;
    use std::collections::HashSet;

    fn classes(text: &str) -> Vec<SmallVec<[TokClass; 2]>> {
        let canon = CanonBundle::embedded().unwrap();
        tokenize(&scan(text), &canon.lexicon)
            .iter()
            .map(classify)
            .collect()
    }

    #[test]
    fn test_rule_names_are_unique() {
        let mut seen = HashSet::new();
        for rule in RULES {
            assert!(seen.insert(rule.name), "duplicate rule name {}", rule.name);
            assert!(!rule.rhs.is_empty(), "empty rhs in {}", rule.name);
            assert!(rule.priority > 0.0, "non-positive priority in {}", rule.name);
        }
    }

    #[test]
    fn test_rules_never_reference_leaf_cats() {
        for rule in RULES {
            assert!(!matches!(rule.lhs, Cat::Leaf(_)), "leaf lhs in {}", rule.name);
            for sym in rule.rhs {
                if let Sym::N(cat) = sym {
                    assert!(!matches!(cat, Cat::Leaf(_)), "leaf rhs in {}", rule.name);
                }
            }
        }
    }

    #[test]
    fn test_classify_shapes() {
        let cls = classes("brighter, 9 / chorus");
        assert_eq!(cls[0].as_slice(), &[TokClass::AxisAdj]);
        assert_eq!(cls[1].as_slice(), &[TokClass::Comma]);
        assert_eq!(cls[2].as_slice(), &[TokClass::Number]);
        assert_eq!(cls[3].as_slice(), &[TokClass::Slash]);
        assert_eq!(cls[4].as_slice(), &[TokClass::Opaque]);
    }

    #[test]
    fn test_axis_word_is_both_adjective_and_verb() {
        let cls = classes("warm");
        assert!(cls[0].contains(&TokClass::AxisAdj));
        assert!(cls[0].contains(&TokClass::AxisVerb));
    }

    #[test]
    fn test_countermelody_is_role_and_element() {
        let cls = classes("countermelody");
        assert!(cls[0].contains(&TokClass::RoleNoun));
        assert!(cls[0].contains(&TokClass::ElementNoun));
    }

    #[test]
    fn test_prepositions_split_by_lexeme() {
        let cls = classes("in to at from of between");
        assert_eq!(cls[0].as_slice(), &[TokClass::PrepIn]);
        assert_eq!(cls[1].as_slice(), &[TokClass::PrepTo]);
        assert_eq!(cls[2].as_slice(), &[TokClass::PrepAt]);
        assert_eq!(cls[3].as_slice(), &[TokClass::PrepFrom]);
        assert_eq!(cls[4].as_slice(), &[TokClass::PrepOf]);
        assert_eq!(cls[5].as_slice(), &[TokClass::PrepWithin]);
    }

    #[test]
    fn test_countermelody_subject_normalizes_to_element() {
        let noun = NounSem::Role {
            role: LayerRole::Countermelody,
            span: Span::new(0, 13),
        };
        match noun_to_subject(&noun) {
            Some(SubjectRef::Element { element, .. }) => {
                assert_eq!(element, Element::Countermelody)
            }
            other => panic!("Expected element subject, got {:?}", other),
        }
    }

    #[test]
    fn test_axis_noun_rejected_as_preserve_target_unless_tempo() {
        let tempo = NounSem::AxisRef {
            axis: Axis::Tempo,
            span: Span::new(0, 5),
        };
        assert!(matches!(noun_to_target(&tempo), Some(TargetRef::Tempo { .. })));
        let brightness = NounSem::AxisRef {
            axis: Axis::Brightness,
            span: Span::new(0, 10),
        };
        assert!(noun_to_target(&brightness).is_none());
    }

    #[test]
    fn test_attach_scope_narrows_role_goal() {
        let goal = GoalSem {
            scope: ScopeRef::Role {
                role: LayerRole::Pads,
                span: Span::new(9, 17),
            },
            goals: vec![],
            constraints: vec![],
            defaults: vec![],
            baselines: vec![],
        };
        let section = ScopeRef::Named {
            name: "chorus".to_string(),
            hint: None,
            span: Span::new(21, 31),
        };
        let merged = attach_scope(&goal, &section).unwrap();
        assert_eq!(merged.scope, section);
        assert_eq!(merged.constraints.len(), 1);
        match &merged.constraints[0] {
            ConstraintDraft::OnlyChange { targets, .. } => {
                assert!(matches!(
                    targets[0],
                    TargetRef::Role {
                        role: LayerRole::Pads,
                        ..
                    }
                ));
            }
            other => panic!("Expected only-change narrowing, got {:?}", other),
        }
    }

    #[test]
    fn test_bar_range_rejects_inverted() {
        assert!(bar_noun(9, Some(4), Span::new(0, 10)).is_none());
        assert!(bar_noun(4, Some(9), Span::new(0, 10)).is_some());
        assert!(bar_noun(4, None, Span::new(0, 6)).is_some());
    }
}
