//! Boundary with the embedding host application.
//!
//! The compiler never mutates project state directly. It reads an immutable
//! snapshot, produces an [`EditPackage`], and hands it across this boundary
//! for commit. [`MemoryProject`] is a complete in-process host used by tests
//! and demos; a real host implements the same traits over its own stores.
//!
//! The reasoning engine is advisory only: it may suggest levers for a goal,
//! and every suggestion still passes the same constraint-diff validation as
//! a lever the planner found itself.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::edit::{apply_diff, EditPackage};
use crate::error::{CompileError, CompileResult};
use crate::intent::Goal;
use crate::project::model::ProjectSnapshot;
use crate::project::PackageId;

// ============================================================================
// Reasoning engine
// ============================================================================

/// One advisory suggestion: a lever id from the canon table plus the reason
/// the engine offered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub lever: String,
    pub rationale: String,
}

/// Synchronous, side-effect-free domain knowledge queries.
pub trait ReasoningEngine {
    /// Lever suggestions for a goal, best first. Unknown lever ids and
    /// levers that do not answer the goal are ignored by the planner.
    fn query(&self, goal: &Goal) -> Vec<Answer>;
}

/// The default engine: no advice, the lever table speaks for itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReasoning;

impl ReasoningEngine for NoReasoning {
    fn query(&self, _goal: &Goal) -> Vec<Answer> {
        Vec::new()
    }
}

/// A canned engine for tests and demos: fixed answers per goal rendering.
#[derive(Debug, Clone, Default)]
pub struct ScriptedReasoning {
    answers: Vec<(String, Answer)>,
}

impl ScriptedReasoning {
    pub fn suggest(mut self, goal_text: &str, lever: &str, rationale: &str) -> Self {
        self.answers.push((
            goal_text.to_string(),
            Answer {
                lever: lever.to_string(),
                rationale: rationale.to_string(),
            },
        ));
        self
    }
}

impl ReasoningEngine for ScriptedReasoning {
    fn query(&self, goal: &Goal) -> Vec<Answer> {
        let rendered = goal.to_string();
        self.answers
            .iter()
            .filter(|(text, _)| *text == rendered)
            .map(|(_, answer)| answer.clone())
            .collect()
    }
}

// ============================================================================
// Project host
// ============================================================================

/// Result of asking the host to commit a package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommitResult {
    /// The package applied cleanly; the project is now at this revision.
    Committed { revision: u64 },
    /// The host declined; the project is unchanged.
    Rejected { reason: String },
}

/// The execution surface the compiler drives. Nothing below this level is
/// ever called directly.
pub trait ProjectHost {
    /// Immutable snapshot of the current project state.
    fn snapshot(&self) -> ProjectSnapshot;

    /// Apply a package atomically. On any failure the visible project state
    /// is exactly what it was before the call.
    fn commit(&mut self, package: &EditPackage) -> CompileResult<CommitResult>;

    /// Re-apply the inverse of a previously committed package.
    fn rollback(&mut self, id: PackageId) -> CompileResult<CommitResult>;
}

// ============================================================================
// In-memory host
// ============================================================================

/// A self-contained host holding the project in memory. Commits stage the
/// diff on a fork first, so a failing package leaves no partial state.
#[derive(Debug, Clone)]
pub struct MemoryProject {
    current: ProjectSnapshot,
    committed: Vec<EditPackage>,
}

impl MemoryProject {
    pub fn new(snapshot: ProjectSnapshot) -> Self {
        Self {
            current: snapshot,
            committed: Vec::new(),
        }
    }

    /// Packages committed so far, oldest first.
    pub fn history(&self) -> &[EditPackage] {
        &self.committed
    }
}

impl ProjectHost for MemoryProject {
    fn snapshot(&self) -> ProjectSnapshot {
        self.current.clone()
    }

    fn commit(&mut self, package: &EditPackage) -> CompileResult<CommitResult> {
        if package.base_revision != self.current.revision {
            return Ok(CommitResult::Rejected {
                reason: format!(
                    "package targets revision {} but project is at {}",
                    package.base_revision, self.current.revision
                ),
            });
        }
        // Stage on a fork; the live snapshot is replaced only on success.
        let mut staged = self.current.clone();
        if let Err(err) = apply_diff(&mut staged, &package.diff) {
            return Err(CompileError::CommitFailure {
                reason: err.to_string(),
            });
        }
        staged.revision += 1;
        debug!(package = %package.id, revision = staged.revision, "committed edit package");
        self.current = staged;
        self.committed.push(package.clone());
        Ok(CommitResult::Committed {
            revision: self.current.revision,
        })
    }

    fn rollback(&mut self, id: PackageId) -> CompileResult<CommitResult> {
        let Some(package) = self.committed.iter().find(|p| p.id == id).cloned() else {
            return Err(CompileError::RollbackFailure {
                reason: format!("no committed package {}", id),
            });
        };
        // Only the newest commit can be rolled back; later packages may
        // depend on the state this one produced.
        if package.base_revision + 1 != self.current.revision {
            return Err(CompileError::RevisionMismatch {
                expected: package.base_revision + 1,
                found: self.current.revision,
            });
        }
        let mut staged = self.current.clone();
        if let Err(err) = apply_diff(&mut staged, &package.inverse) {
            return Err(CompileError::RollbackFailure {
                reason: err.to_string(),
            });
        }
        staged.revision += 1;
        debug!(package = %id, revision = staged.revision, "rolled back edit package");
        self.current = staged;
        self.committed.retain(|p| p.id != id);
        Ok(CommitResult::Committed {
            revision: self.current.revision,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explain::Explanation;
    use crate::project::diff::ProjectDiff;
    use crate::project::model::{Layer, Meter, NoteEvent, DEFAULT_PPQ};
    use crate::project::{EventId, LayerId, LayerRole};
    use std::collections::BTreeMap;

    fn snapshot() -> ProjectSnapshot {
        let layer = LayerId::new();
        let mut snap = ProjectSnapshot {
            revision: 1,
            ppq: DEFAULT_PPQ,
            tempo_bpm: 120.0,
            meter: Meter::new(4, 4),
            sections: vec![],
            layers: vec![Layer {
                id: layer,
                name: "melody".to_string(),
                role: LayerRole::Melody,
                params: BTreeMap::new(),
                chain: vec![],
            }],
            cards: BTreeMap::new(),
            events: vec![NoteEvent {
                id: EventId::new(),
                layer,
                start: 0,
                duration: 240,
                pitch: 60,
                velocity: 90,
            }],
        };
        snap.normalize();
        snap
    }

    fn package_for(before: &ProjectSnapshot, after: &ProjectSnapshot) -> EditPackage {
        let diff = ProjectDiff::between(before, after);
        EditPackage {
            id: crate::project::PackageId::new(),
            created_at: chrono::Utc::now(),
            lexicon_version: "1.0.0".to_string(),
            base_revision: before.revision,
            summary: "test edit".to_string(),
            operations: vec![],
            inverse: diff.invert(),
            diff,
            explanation: Explanation {
                reading: "test edit".to_string(),
                levers: vec![],
                assumed: vec![],
                checks: vec![],
                stats: Default::default(),
            },
        }
    }

    #[test]
    fn test_commit_advances_revision_and_applies_diff() {
        let before = snapshot();
        let mut after = before.clone();
        after.events[0].pitch = 67;
        after.normalize();
        let package = package_for(&before, &after);
        let mut host = MemoryProject::new(before);
        match host.commit(&package).unwrap() {
            CommitResult::Committed { revision } => assert_eq!(revision, 2),
            other => panic!("Expected commit, got {:?}", other),
        }
        assert_eq!(host.snapshot().events[0].pitch, 67);
        assert_eq!(host.history().len(), 1);
    }

    #[test]
    fn test_stale_package_rejected_without_mutation() {
        let before = snapshot();
        let mut after = before.clone();
        after.events[0].pitch = 67;
        let mut package = package_for(&before, &after);
        package.base_revision = 9;
        let mut host = MemoryProject::new(before.clone());
        match host.commit(&package).unwrap() {
            CommitResult::Rejected { reason } => assert!(reason.contains("revision")),
            other => panic!("Expected rejection, got {:?}", other),
        }
        assert_eq!(host.snapshot(), before);
    }

    #[test]
    fn test_rollback_restores_events() {
        let before = snapshot();
        let mut after = before.clone();
        after.events[0].velocity = 40;
        after.normalize();
        let package = package_for(&before, &after);
        let mut host = MemoryProject::new(before.clone());
        host.commit(&package).unwrap();
        host.rollback(package.id).unwrap();
        let restored = host.snapshot();
        assert_eq!(restored.events, before.events);
        assert_eq!(restored.revision, 3);
        assert!(host.history().is_empty());
    }

    #[test]
    fn test_commit_of_unappliable_diff_fails_cleanly() {
        let before = snapshot();
        let mut package = package_for(&before, &before);
        let ghost = NoteEvent {
            id: EventId::new(),
            layer: before.layers[0].id,
            start: 0,
            duration: 240,
            pitch: 64,
            velocity: 80,
        };
        package.diff = ProjectDiff {
            events: vec![crate::project::diff::EventChange::Removed { event: ghost }],
            ..Default::default()
        };
        let mut host = MemoryProject::new(before.clone());
        match host.commit(&package) {
            Err(CompileError::CommitFailure { reason }) => {
                assert!(reason.contains("not present"));
            }
            other => panic!("Expected commit failure, got {:?}", other),
        }
        assert_eq!(host.snapshot(), before);
    }

    #[test]
    fn test_rollback_below_the_top_commit_is_refused() {
        let base = snapshot();
        let mut first_after = base.clone();
        first_after.events[0].velocity = 40;
        first_after.normalize();
        let first = package_for(&base, &first_after);

        let mut host = MemoryProject::new(base);
        host.commit(&first).unwrap();
        let mid = host.snapshot();
        let mut second_after = mid.clone();
        second_after.events[0].pitch = 67;
        second_after.normalize();
        let second = package_for(&mid, &second_after);
        host.commit(&second).unwrap();

        match host.rollback(first.id) {
            Err(CompileError::RevisionMismatch { expected, found }) => {
                assert_eq!(expected, 2);
                assert_eq!(found, 3);
            }
            other => panic!("Expected revision mismatch, got {:?}", other),
        }
        // The newest commit still rolls back.
        host.rollback(second.id).unwrap();
    }

    #[test]
    fn test_rollback_of_unknown_package_fails() {
        let mut host = MemoryProject::new(snapshot());
        match host.rollback(crate::project::PackageId::new()) {
            Err(CompileError::RollbackFailure { reason }) => {
                assert!(reason.contains("no committed package"));
            }
            other => panic!("Expected rollback failure, got {:?}", other),
        }
    }

    #[test]
    fn test_scripted_reasoning_matches_goal_text() {
        use crate::canon::axis::{Amount, Axis};
        let engine = ScriptedReasoning::default().suggest(
            "brightness up (moderate)",
            "brightness-up-shelf",
            "shelf keeps pitch material intact",
        );
        let goal = Goal::Increase {
            axis: Axis::Brightness,
            amount: Amount::Moderate,
        };
        let answers = engine.query(&goal);
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].lever, "brightness-up-shelf");
        assert!(NoReasoning.query(&goal).is_empty());
    }
}
