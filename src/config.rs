//! Compiler tunables.
//!
//! Every threshold that shapes interpretation or planning lives here as a
//! named constant with a documented default, and [`CompilerConfig`] carries
//! the per-instance values so hosts can tighten or relax behavior without
//! recompiling. Instances are plain data and serialize cleanly, which keeps
//! configured behavior reproducible across runs.

use serde::{Deserialize, Serialize};

// ============================================================================
// Interpretation thresholds
// ============================================================================

/// Minimum score gap between the best parse and the runner-up before the
/// best parse is selected without asking. Below this margin the reading is
/// genuinely ambiguous and the candidates are surfaced as options.
pub const DISAMBIG_MARGIN: f32 = 0.25;

/// Hard ceiling on grammar rule applications for a single utterance.
/// Exceeding it aborts the parse with a timeout outcome.
pub const MAX_RULE_APPLICATIONS: usize = 20_000;

/// Maximum distinct interpretations surfaced in one clarification.
pub const MAX_SURFACED_OPTIONS: usize = 4;

/// Jaro-Winkler similarity floor for "did you mean" name suggestions.
pub const SUGGESTION_THRESHOLD: f64 = 0.80;

/// Maximum name suggestions offered for an unresolved reference.
pub const MAX_SUGGESTIONS: usize = 5;

// ============================================================================
// Planning bounds
// ============================================================================

/// How many lever alternatives are considered per goal.
pub const SEARCH_WIDTH: usize = 4;

/// Cap on candidate plans enumerated for one intent.
pub const MAX_PLAN_CANDIDATES: usize = 24;

/// Cap on concrete actions in a single plan.
pub const MAX_PLAN_ACTIONS: usize = 16;

/// Two plans whose scores differ by less than this are treated as equal
/// and surfaced to the user as an explicit choice.
pub const PLAN_EPSILON: f64 = 0.05;

/// Score penalty applied per violated soft constraint.
pub const SOFT_VIOLATION_PENALTY: f64 = 0.5;

/// Score bonus when every touched layer matches a preferred role.
pub const PREFER_LAYER_BOOST: f64 = 0.15;

/// Score penalty when a plan touches a layer the user asked to avoid.
pub const AVOID_LAYER_PENALTY: f64 = 0.2;

/// Additional per-change cost weight when the user prefers fewer edits.
pub const FEWER_EDITS_WEIGHT: f64 = 0.1;

/// Base weight converting diff size into plan cost.
pub const DIFF_COST_WEIGHT: f64 = 0.05;

// ============================================================================
// Musical plausibility bounds
// ============================================================================

/// Tolerance band, in bpm, for a "keep the tempo at N" constraint.
pub const TEMPO_TOLERANCE_BPM: f64 = 0.5;

/// Lowest tempo an instruction may name or a plan may produce.
pub const TEMPO_MIN_BPM: f64 = 20.0;

/// Highest tempo an instruction may name or a plan may produce.
pub const TEMPO_MAX_BPM: f64 = 400.0;

// ============================================================================
// Session bounds
// ============================================================================

/// Bounded turn history retained in dialogue state.
pub const HISTORY_CAPACITY: usize = 16;

// ============================================================================
// Config struct
// ============================================================================

/// Tunable knobs for one compiler instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerConfig {
    pub disambig_margin: f32,
    pub max_rule_applications: usize,
    pub max_surfaced_options: usize,
    pub suggestion_threshold: f64,
    pub max_suggestions: usize,
    pub search_width: usize,
    pub max_plan_candidates: usize,
    pub max_plan_actions: usize,
    pub plan_epsilon: f64,
    pub soft_violation_penalty: f64,
    pub prefer_layer_boost: f64,
    pub avoid_layer_penalty: f64,
    pub fewer_edits_weight: f64,
    pub diff_cost_weight: f64,
    pub history_capacity: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            disambig_margin: DISAMBIG_MARGIN,
            max_rule_applications: MAX_RULE_APPLICATIONS,
            max_surfaced_options: MAX_SURFACED_OPTIONS,
            suggestion_threshold: SUGGESTION_THRESHOLD,
            max_suggestions: MAX_SUGGESTIONS,
            search_width: SEARCH_WIDTH,
            max_plan_candidates: MAX_PLAN_CANDIDATES,
            max_plan_actions: MAX_PLAN_ACTIONS,
            plan_epsilon: PLAN_EPSILON,
            soft_violation_penalty: SOFT_VIOLATION_PENALTY,
            prefer_layer_boost: PREFER_LAYER_BOOST,
            avoid_layer_penalty: AVOID_LAYER_PENALTY,
            fewer_edits_weight: FEWER_EDITS_WEIGHT,
            diff_cost_weight: DIFF_COST_WEIGHT,
            history_capacity: HISTORY_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_constants() {
        let config = CompilerConfig::default();
        assert_eq!(config.disambig_margin, DISAMBIG_MARGIN);
        assert_eq!(config.max_rule_applications, MAX_RULE_APPLICATIONS);
        assert_eq!(config.plan_epsilon, PLAN_EPSILON);
        assert_eq!(config.history_capacity, HISTORY_CAPACITY);
    }

    #[test]
    fn test_config_roundtrips_through_json() {
        let config = CompilerConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: CompilerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_plan_candidates, config.max_plan_candidates);
        assert_eq!(back.suggestion_threshold, config.suggestion_threshold);
    }

    #[test]
    fn test_margin_is_a_sane_fraction() {
        assert!(DISAMBIG_MARGIN > 0.0 && DISAMBIG_MARGIN < 1.0);
        assert!(PLAN_EPSILON > 0.0 && PLAN_EPSILON < 1.0);
    }
}
