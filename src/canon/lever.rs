//! Lever table: from goals to candidate action bundles.
//!
//! A lever is one musical tactic for moving an axis or introducing material:
//! "brightness up via timbre" is a different lever from "brightness up via
//! register". Levers are canon data loaded from YAML. For a goal the planner
//! asks the table for matching levers in declaration order; declaration order
//! is the deterministic tie-break all the way down.

use super::axis::{Axis, Direction, Element};
use crate::error::CanonError;
use crate::project::model::{EffectKind, ParamKey};
use crate::project::LayerRole;
use serde::{Deserialize, Serialize};

// ============================================================================
// Action templates
// ============================================================================

/// An unbound action inside a lever. Magnitudes here are the `Moderate`
/// baseline; the planner scales them by the goal's amount factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ActionTemplate {
    Transpose { semitones: i32 },
    ScaleVelocity { factor: f64 },
    ShiftEvents { beats: f64 },
    ThinEvents { keep_ratio: f64 },
    ClearEvents,
    EchoEvents {
        source_role: LayerRole,
        offset_beats: f64,
        transpose: i32,
    },
    AdjustParam { param: ParamKey, delta: f64 },
    SetParam { param: ParamKey, value: f64 },
    InsertEffect { effect: EffectKind },
    RemoveEffect { effect: EffectKind },
    ScaleTempo { factor: f64 },
    SetTempoValue,
}

// ============================================================================
// Lever definitions
// ============================================================================

/// What kind of goal a lever answers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LeverKey {
    Move { axis: Axis, direction: Direction },
    Set { axis: Axis },
    IntroduceElement { element: Element },
    RemoveElement { element: Element },
    /// Remove a role's material; the role is bound from the goal.
    RemoveRole,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lever {
    pub id: String,
    pub key: LeverKey,
    /// Roles this lever applies to. Empty means every layer with material in
    /// scope. An explicit layer scope overrides the filter.
    pub apply_to: Vec<LayerRole>,
    pub actions: Vec<ActionTemplate>,
    pub summary: String,
}

#[derive(Debug, Deserialize)]
struct LeverSpec {
    id: String,
    #[serde(default)]
    axis: Option<Axis>,
    #[serde(default)]
    direction: Option<Direction>,
    #[serde(default)]
    set: bool,
    #[serde(default)]
    element: Option<Element>,
    #[serde(default)]
    mode: Option<SubjectMode>,
    #[serde(default)]
    any_role: bool,
    #[serde(default)]
    apply_to: Vec<LayerRole>,
    actions: Vec<ActionTemplate>,
    #[serde(default)]
    summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum SubjectMode {
    Introduce,
    Remove,
}

#[derive(Debug, Deserialize)]
struct LeverTableSpec {
    version: String,
    levers: Vec<LeverSpec>,
}

// ============================================================================
// Lever table
// ============================================================================

/// Validated lever table in declaration order.
#[derive(Debug, Clone)]
pub struct LeverTable {
    version: String,
    levers: Vec<Lever>,
}

impl LeverTable {
    pub fn from_yaml(source: &str, file: &str) -> Result<Self, CanonError> {
        let spec: LeverTableSpec = serde_yaml::from_str(source).map_err(|e| CanonError::Parse {
            file: file.to_string(),
            source: e,
        })?;
        let mut levers = Vec::with_capacity(spec.levers.len());
        for lever_spec in spec.levers {
            if lever_spec.actions.is_empty() {
                return Err(CanonError::EmptyLever {
                    lever: lever_spec.id,
                });
            }
            let key = Self::key_of(&lever_spec)?;
            if levers.iter().any(|l: &Lever| l.id == lever_spec.id) {
                return Err(CanonError::DuplicateLever {
                    lever: lever_spec.id,
                });
            }
            levers.push(Lever {
                id: lever_spec.id,
                key,
                apply_to: lever_spec.apply_to,
                actions: lever_spec.actions,
                summary: lever_spec.summary,
            });
        }
        Ok(Self {
            version: spec.version,
            levers,
        })
    }

    fn key_of(spec: &LeverSpec) -> Result<LeverKey, CanonError> {
        if let Some(axis) = &spec.axis {
            if spec.set {
                return Ok(LeverKey::Set { axis: axis.clone() });
            }
            if let Some(direction) = spec.direction {
                return Ok(LeverKey::Move {
                    axis: axis.clone(),
                    direction,
                });
            }
        }
        if let Some(element) = &spec.element {
            return match spec.mode {
                Some(SubjectMode::Introduce) | None => Ok(LeverKey::IntroduceElement {
                    element: element.clone(),
                }),
                Some(SubjectMode::Remove) => Ok(LeverKey::RemoveElement {
                    element: element.clone(),
                }),
            };
        }
        if spec.any_role && spec.mode == Some(SubjectMode::Remove) {
            return Ok(LeverKey::RemoveRole);
        }
        Err(CanonError::LeverWithoutKey {
            lever: spec.id.clone(),
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.levers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levers.is_empty()
    }

    pub fn lever(&self, id: &str) -> Option<&Lever> {
        self.levers.iter().find(|l| l.id == id)
    }

    /// Levers matching a key, in declaration order, with their indices.
    pub fn matching(&self, key: &LeverKey) -> Vec<(usize, &Lever)> {
        self.levers
            .iter()
            .enumerate()
            .filter(|(_, l)| &l.key == key)
            .collect()
    }

    /// Every axis with at least one movement lever. Used to report which
    /// goals are actually plannable.
    pub fn movable_axes(&self) -> Vec<Axis> {
        let mut out: Vec<Axis> = Vec::new();
        for lever in &self.levers {
            if let LeverKey::Move { axis, .. } = &lever.key {
                if !out.contains(axis) {
                    out.push(axis.clone());
                }
            }
        }
        out
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version: "1.0.0"
levers:
  - id: brightness-up-timbre
    axis: brightness
    direction: up
    apply_to: [melody, lead, pads, harmony]
    summary: open filters
    actions:
      - op: adjust_param
        param: cutoff
        delta: 0.2
  - id: brightness-up-register
    axis: brightness
    direction: up
    apply_to: [melody, lead]
    summary: lift register
    actions:
      - op: transpose
        semitones: 12
  - id: tempo-set
    axis: tempo
    set: true
    summary: set transport tempo
    actions:
      - op: set_tempo_value
  - id: remove-role-events
    any_role: true
    mode: remove
    summary: clear a role's material
    actions:
      - op: clear_events
"#;

    #[test]
    fn test_matching_respects_declaration_order() {
        let table = LeverTable::from_yaml(SAMPLE, "levers.yaml").unwrap();
        let key = LeverKey::Move {
            axis: Axis::Brightness,
            direction: Direction::Up,
        };
        let found = table.matching(&key);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].1.id, "brightness-up-timbre");
        assert_eq!(found[1].1.id, "brightness-up-register");
    }

    #[test]
    fn test_set_and_remove_role_keys() {
        let table = LeverTable::from_yaml(SAMPLE, "levers.yaml").unwrap();
        assert_eq!(
            table.matching(&LeverKey::Set { axis: Axis::Tempo }).len(),
            1
        );
        assert_eq!(table.matching(&LeverKey::RemoveRole).len(), 1);
    }

    #[test]
    fn test_empty_lever_rejected() {
        let yaml = r#"
version: "1.0.0"
levers:
  - id: hollow
    axis: brightness
    direction: up
    actions: []
"#;
        match LeverTable::from_yaml(yaml, "levers.yaml") {
            Err(CanonError::EmptyLever { lever }) => assert_eq!(lever, "hollow"),
            other => panic!("Expected empty lever error, got {:?}", other),
        }
    }

    #[test]
    fn test_keyless_lever_rejected() {
        let yaml = r#"
version: "1.0.0"
levers:
  - id: drifting
    summary: no key
    actions:
      - op: clear_events
"#;
        assert!(matches!(
            LeverTable::from_yaml(yaml, "levers.yaml"),
            Err(CanonError::LeverWithoutKey { .. })
        ));
    }

    #[test]
    fn test_movable_axes_deduplicated() {
        let table = LeverTable::from_yaml(SAMPLE, "levers.yaml").unwrap();
        assert_eq!(table.movable_axes(), vec![Axis::Brightness]);
    }
}
