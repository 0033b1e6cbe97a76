//! Dialogue state carried between utterances.
//!
//! One [`DialogueState`] lives per conversation. It remembers what "it"
//! refers to, which package "undo" targets, and a bounded history of accepted
//! turns for "do that again". It is updated only after an utterance is
//! accepted; clarification round-trips and failed compiles leave it
//! untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::config;
use crate::edit::EditPackage;
use crate::intent::{EditIntent, Intent, Scope};
use crate::project::{PackageId, SessionId};

// ============================================================================
// Turn records
// ============================================================================

/// One accepted utterance and what it became.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub utterance: String,
    pub intent: Intent,
    /// Package the turn committed, when it was a mutating turn.
    pub package: Option<PackageId>,
    pub at: DateTime<Utc>,
}

// ============================================================================
// Dialogue state
// ============================================================================

/// Per-conversation memory. Created at session start, updated after every
/// accepted utterance, cleared on explicit reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueState {
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
    /// Last scope an accepted utterance addressed; anaphora binds here.
    pub focus: Option<Scope>,
    /// Package of the most recent committed edit.
    pub last_package: Option<PackageId>,
    history: VecDeque<TurnRecord>,
    history_capacity: usize,
    /// Committed packages most-recent-last; "undo" pops from here.
    pub undo_stack: Vec<EditPackage>,
    /// Undone packages most-recent-last; "redo" pops from here.
    pub redo_stack: Vec<EditPackage>,
}

impl DialogueState {
    pub fn new() -> Self {
        Self::with_history_capacity(config::HISTORY_CAPACITY)
    }

    pub fn with_history_capacity(capacity: usize) -> Self {
        Self {
            session_id: SessionId::new(),
            created_at: Utc::now(),
            focus: None,
            last_package: None,
            history: VecDeque::new(),
            history_capacity: capacity.max(1),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
        }
    }

    /// Record an accepted turn, evicting the oldest beyond capacity.
    pub fn record_turn(&mut self, record: TurnRecord) {
        self.history.push_back(record);
        while self.history.len() > self.history_capacity {
            self.history.pop_front();
        }
    }

    pub fn history(&self) -> impl Iterator<Item = &TurnRecord> {
        self.history.iter()
    }

    /// Most recent accepted edit intent, for "do that again".
    pub fn last_edit_intent(&self) -> Option<&EditIntent> {
        self.history.iter().rev().find_map(|t| match &t.intent {
            Intent::Edit(edit) => Some(edit),
            _ => None,
        })
    }

    /// Push a committed package onto the undo stack. A fresh edit makes the
    /// redo stack unreachable, so it clears.
    pub fn push_committed(&mut self, package: EditPackage) {
        self.last_package = Some(package.id);
        self.undo_stack.push(package);
        self.redo_stack.clear();
    }

    /// Clear everything but the session identity.
    pub fn reset(&mut self) {
        self.focus = None;
        self.last_package = None;
        self.history.clear();
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

impl Default for DialogueState {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::axis::{Amount, Axis};
    use crate::intent::Goal;
    use crate::project::SectionId;

    fn edit_intent() -> Intent {
        Intent::Edit(EditIntent {
            scope: Scope::Section {
                id: SectionId::new(),
            },
            goals: vec![Goal::Increase {
                axis: Axis::Brightness,
                amount: Amount::Moderate,
            }],
            constraints: vec![],
            preferences: vec![],
            assumed_defaults: vec![],
        })
    }

    fn turn(utterance: &str, intent: Intent) -> TurnRecord {
        TurnRecord {
            utterance: utterance.to_string(),
            intent,
            package: None,
            at: Utc::now(),
        }
    }

    #[test]
    fn test_history_evicts_oldest() {
        let mut state = DialogueState::with_history_capacity(2);
        state.record_turn(turn("one", Intent::Explain));
        state.record_turn(turn("two", Intent::Explain));
        state.record_turn(turn("three", Intent::Explain));
        let utterances: Vec<&str> = state.history().map(|t| t.utterance.as_str()).collect();
        assert_eq!(utterances, vec!["two", "three"]);
    }

    #[test]
    fn test_last_edit_intent_skips_commands() {
        let mut state = DialogueState::new();
        state.record_turn(turn("make it brighter", edit_intent()));
        state.record_turn(turn("explain that", Intent::Explain));
        let last = state.last_edit_intent();
        assert!(last.is_some());
        assert_eq!(last.map(|e| e.goals.len()), Some(1));
    }

    #[test]
    fn test_reset_clears_focus_and_stacks() {
        let mut state = DialogueState::new();
        state.focus = Some(Scope::Section {
            id: SectionId::new(),
        });
        state.record_turn(turn("make it brighter", edit_intent()));
        let id = state.session_id;
        state.reset();
        assert_eq!(state.session_id, id);
        assert!(state.focus.is_none());
        assert_eq!(state.history().count(), 0);
    }
}
