//! Human-readable accounts of what an edit did and why.
//!
//! Every package carries a structured [`Explanation`] built at compile time:
//! how the instruction was read, which tactic answered each goal, what was
//! assumed, and how each constraint fared against the real diff. "explain
//! that" renders this structure; nothing is reconstructed after the fact.

use serde::{Deserialize, Serialize};

use crate::intent::{EditIntent, Scope};
use crate::project::diff::DiffStats;
use crate::project::model::ProjectSnapshot;

// ============================================================================
// Structure
// ============================================================================

/// The tactic chosen for one goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeverChoice {
    /// The goal as stated, e.g. "brightness up (moderate)".
    pub goal: String,
    /// Lever id from the lever table.
    pub lever: String,
    /// The lever's own summary line.
    pub summary: String,
}

/// How one constraint fared against the compiled diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintCheck {
    pub constraint: String,
    pub hard: bool,
    pub satisfied: bool,
    /// What the check saw, e.g. "no melody events changed".
    pub detail: String,
}

/// Structured account attached to every edit package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    /// The instruction as understood, with the resolved scope named.
    pub reading: String,
    pub levers: Vec<LeverChoice>,
    /// Defaults filled in without asking, e.g. "amount: moderate".
    pub assumed: Vec<String>,
    pub checks: Vec<ConstraintCheck>,
    pub stats: DiffStats,
}

impl Explanation {
    /// Multi-line rendering for "explain that".
    pub fn render(&self) -> String {
        let mut lines = vec![format!("I read this as: {}", self.reading)];
        for choice in &self.levers {
            lines.push(format!(
                "- {}: {} ({})",
                choice.goal, choice.summary, choice.lever
            ));
        }
        if !self.assumed.is_empty() {
            lines.push(format!("Assumed: {}", self.assumed.join(", ")));
        }
        for check in &self.checks {
            let verdict = if check.satisfied { "held" } else { "NOT held" };
            lines.push(format!("- {} {}: {}", check.constraint, verdict, check.detail));
        }
        lines.push(format!("Changes: {}", self.stats));
        lines.join("\n")
    }
}

// ============================================================================
// Naming helpers
// ============================================================================

/// Render a resolved scope with the names the user knows.
pub fn describe_scope(scope: &Scope, snapshot: &ProjectSnapshot) -> String {
    match scope {
        Scope::Section { id } => snapshot
            .section(*id)
            .map(|s| format!("the {} section", s.name))
            .unwrap_or_else(|| "a removed section".to_string()),
        Scope::GlobalRange { start, end } => {
            if *start <= 0 && *end >= snapshot.length_ticks() {
                "the whole piece".to_string()
            } else {
                format!(
                    "bars {} to {}",
                    snapshot.bar_of(*start),
                    snapshot.bar_of((*end - 1).max(0))
                )
            }
        }
        Scope::Layer { id } => snapshot
            .layer(*id)
            .map(|l| format!("the {} layer", l.name))
            .unwrap_or_else(|| "a removed layer".to_string()),
        Scope::EventSelection { ids } => format!("{} selected events", ids.len()),
    }
}

/// One line stating scope, goals, and constraint count.
pub fn describe_intent(intent: &EditIntent, snapshot: &ProjectSnapshot) -> String {
    let goals: Vec<String> = intent.goals.iter().map(|g| g.to_string()).collect();
    let mut text = format!(
        "{} in {}",
        if goals.is_empty() {
            "no change".to_string()
        } else {
            goals.join(", ")
        },
        describe_scope(&intent.scope, snapshot)
    );
    if !intent.constraints.is_empty() {
        let constraints: Vec<String> =
            intent.constraints.iter().map(|c| c.to_string()).collect();
        text.push_str(&format!("; keeping {}", constraints.join(", ")));
    }
    text
}

/// Multi-line report for "what's in the chorus?".
pub fn describe_selection(scope: &Scope, snapshot: &ProjectSnapshot) -> String {
    let (start, end) = snapshot.scope_range(scope);
    let events = snapshot.events_in_scope(scope);
    let mut lines = vec![format!(
        "{}: bars {} to {}",
        describe_scope(scope, snapshot),
        snapshot.bar_of(start),
        snapshot.bar_of((end - 1).max(start))
    )];
    let mut sounding: Vec<String> = Vec::new();
    for layer in &snapshot.layers {
        let count = events.iter().filter(|e| e.layer == layer.id).count();
        if count > 0 {
            sounding.push(format!("{} ({} notes, {})", layer.name, count, layer.role));
        }
    }
    if sounding.is_empty() {
        lines.push("nothing is playing here".to_string());
    } else {
        lines.push(format!("playing: {}", sounding.join(", ")));
    }
    lines.push(format!(
        "tempo {} bpm, meter {}",
        snapshot.tempo_bpm, snapshot.meter
    ));
    lines.join("\n")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::axis::{Amount, Axis, PreserveMode};
    use crate::intent::{Constraint, EditTarget, Goal};
    use crate::project::model::{Meter, Section, DEFAULT_PPQ};
    use crate::project::{LayerRole, SectionId};
    use std::collections::BTreeMap;

    fn snapshot() -> (ProjectSnapshot, SectionId) {
        let chorus = SectionId::new();
        (
            ProjectSnapshot {
                revision: 1,
                ppq: DEFAULT_PPQ,
                tempo_bpm: 120.0,
                meter: Meter::new(4, 4),
                sections: vec![Section {
                    id: chorus,
                    name: "chorus".to_string(),
                    start: 0,
                    end: 4 * 1920,
                }],
                layers: vec![],
                cards: BTreeMap::new(),
                events: vec![],
            },
            chorus,
        )
    }

    #[test]
    fn test_describe_intent_names_section_and_constraints() {
        let (snap, chorus) = snapshot();
        let intent = EditIntent {
            scope: Scope::Section { id: chorus },
            goals: vec![Goal::Increase {
                axis: Axis::Brightness,
                amount: Amount::Moderate,
            }],
            constraints: vec![Constraint::Preserve {
                target: EditTarget::Role {
                    role: LayerRole::Melody,
                },
                mode: PreserveMode::Exact,
                hard: true,
            }],
            preferences: vec![],
            assumed_defaults: vec![],
        };
        let text = describe_intent(&intent, &snap);
        assert!(text.contains("brightness up (moderate)"), "got {:?}", text);
        assert!(text.contains("chorus"), "got {:?}", text);
        assert!(text.contains("preserve the melody (exact)"), "got {:?}", text);
    }

    #[test]
    fn test_global_range_reads_as_whole_piece() {
        let (snap, _) = snapshot();
        let scope = Scope::GlobalRange {
            start: 0,
            end: snap.length_ticks(),
        };
        assert_eq!(describe_scope(&scope, &snap), "the whole piece");
    }

    #[test]
    fn test_describe_selection_lists_sounding_layers() {
        use crate::project::model::{Layer, NoteEvent};
        use crate::project::{EventId, LayerId};
        let (mut snap, chorus) = snapshot();
        let melody = LayerId::new();
        snap.layers.push(Layer {
            id: melody,
            name: "melody".to_string(),
            role: LayerRole::Melody,
            params: BTreeMap::new(),
            chain: vec![],
        });
        snap.events.push(NoteEvent {
            id: EventId::new(),
            layer: melody,
            start: 0,
            duration: 240,
            pitch: 60,
            velocity: 90,
        });
        snap.normalize();
        let report = describe_selection(&Scope::Section { id: chorus }, &snap);
        assert!(report.contains("melody (1 notes, melody)"), "got {:?}", report);
        assert!(report.contains("tempo 120 bpm"), "got {:?}", report);
    }

    #[test]
    fn test_render_lists_checks_and_stats() {
        let explanation = Explanation {
            reading: "brightness up (moderate) in the chorus section".to_string(),
            levers: vec![LeverChoice {
                goal: "brightness up (moderate)".to_string(),
                lever: "brightness-up-timbre".to_string(),
                summary: "open filter cutoffs".to_string(),
            }],
            assumed: vec!["amount: moderate".to_string()],
            checks: vec![ConstraintCheck {
                constraint: "preserve the melody (exact)".to_string(),
                hard: true,
                satisfied: true,
                detail: "no melody events changed".to_string(),
            }],
            stats: DiffStats::default(),
        };
        let text = explanation.render();
        assert!(text.contains("I read this as"));
        assert!(text.contains("held"));
        assert!(text.contains("brightness-up-timbre"));
    }
}
