//! Perceptual axes and edit vocabulary.
//!
//! The core vocabulary is closed: the compiler only ever plans against axes
//! and subjects it knows how to move. Hosts may register additional entries
//! under a namespace ("ns:name"), which parse and serialize cleanly but only
//! become plannable once a lever exists for them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Axis
// ============================================================================

/// A perceptual dimension an instruction can push on.
///
/// Serialized as its canonical name ("brightness"), or "ns:name" for
/// host-registered extensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Axis {
    Brightness,
    Warmth,
    Energy,
    Density,
    Tension,
    Loudness,
    Tempo,
    /// Entry timing of material. Moving down means earlier.
    Onset,
    Extension {
        namespace: String,
        name: String,
    },
}

impl Axis {
    pub const CORE: [Axis; 8] = [
        Axis::Brightness,
        Axis::Warmth,
        Axis::Energy,
        Axis::Density,
        Axis::Tension,
        Axis::Loudness,
        Axis::Tempo,
        Axis::Onset,
    ];

    pub fn name(&self) -> String {
        match self {
            Axis::Brightness => "brightness".to_string(),
            Axis::Warmth => "warmth".to_string(),
            Axis::Energy => "energy".to_string(),
            Axis::Density => "density".to_string(),
            Axis::Tension => "tension".to_string(),
            Axis::Loudness => "loudness".to_string(),
            Axis::Tempo => "tempo".to_string(),
            Axis::Onset => "onset".to_string(),
            Axis::Extension { namespace, name } => format!("{}:{}", namespace, name),
        }
    }

    pub fn is_extension(&self) -> bool {
        matches!(self, Axis::Extension { .. })
    }
}

impl FromStr for Axis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some((ns, name)) = s.split_once(':') {
            if ns.is_empty() || name.is_empty() {
                return Err(format!("malformed extension axis '{}'", s));
            }
            return Ok(Axis::Extension {
                namespace: ns.to_string(),
                name: name.to_string(),
            });
        }
        match s {
            "brightness" => Ok(Axis::Brightness),
            "warmth" => Ok(Axis::Warmth),
            "energy" => Ok(Axis::Energy),
            "density" => Ok(Axis::Density),
            "tension" => Ok(Axis::Tension),
            "loudness" => Ok(Axis::Loudness),
            "tempo" => Ok(Axis::Tempo),
            "onset" => Ok(Axis::Onset),
            other => Err(format!("unknown axis '{}'", other)),
        }
    }
}

impl TryFrom<String> for Axis {
    type Error = String;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Axis> for String {
    fn from(a: Axis) -> String {
        a.name()
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// Direction
// ============================================================================

/// Which way an axis is pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn flip(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

// ============================================================================
// Amount
// ============================================================================

/// Coarse magnitude attached to a goal.
///
/// Degree words in an instruction map onto these three steps. A missing
/// degree defaults to `Moderate` and the default is recorded on the intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Amount {
    Slight,
    Moderate,
    Strong,
}

impl Amount {
    /// Scaling factor applied to lever template magnitudes.
    pub fn factor(self) -> f64 {
        match self {
            Amount::Slight => 0.5,
            Amount::Moderate => 1.0,
            Amount::Strong => 1.6,
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Amount::Slight => write!(f, "slight"),
            Amount::Moderate => write!(f, "moderate"),
            Amount::Strong => write!(f, "strong"),
        }
    }
}

// ============================================================================
// Preserve modes
// ============================================================================

/// How strictly preserved material must survive an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreserveMode {
    /// Nothing about the target may change.
    Exact,
    /// Onsets and pitch classes must survive; dynamics and color are free.
    Functional,
    /// The contour must survive; pitches and dynamics are free.
    Recognizable,
}

impl PreserveMode {
    /// The stricter of two modes, used when an instruction stacks
    /// preserve words ("exactly the same").
    pub fn strictest(self, other: PreserveMode) -> PreserveMode {
        use PreserveMode::*;
        match (self, other) {
            (Exact, _) | (_, Exact) => Exact,
            (Functional, _) | (_, Functional) => Functional,
            _ => Recognizable,
        }
    }
}

impl fmt::Display for PreserveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreserveMode::Exact => write!(f, "exact"),
            PreserveMode::Functional => write!(f, "functional"),
            PreserveMode::Recognizable => write!(f, "recognizable"),
        }
    }
}

// ============================================================================
// Element
// ============================================================================

/// A nameable musical ingredient that can be introduced or removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Element {
    Countermelody,
    Arpeggio,
    Echo,
    Shimmer,
    Drive,
    Extension {
        namespace: String,
        name: String,
    },
}

impl Element {
    pub fn name(&self) -> String {
        match self {
            Element::Countermelody => "countermelody".to_string(),
            Element::Arpeggio => "arpeggio".to_string(),
            Element::Echo => "echo".to_string(),
            Element::Shimmer => "shimmer".to_string(),
            Element::Drive => "drive".to_string(),
            Element::Extension { namespace, name } => format!("{}:{}", namespace, name),
        }
    }
}

impl FromStr for Element {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some((ns, name)) = s.split_once(':') {
            if ns.is_empty() || name.is_empty() {
                return Err(format!("malformed extension element '{}'", s));
            }
            return Ok(Element::Extension {
                namespace: ns.to_string(),
                name: name.to_string(),
            });
        }
        match s {
            "countermelody" => Ok(Element::Countermelody),
            "arpeggio" => Ok(Element::Arpeggio),
            "echo" => Ok(Element::Echo),
            "shimmer" => Ok(Element::Shimmer),
            "drive" => Ok(Element::Drive),
            other => Err(format!("unknown element '{}'", other)),
        }
    }
}

impl TryFrom<String> for Element {
    type Error = String;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Element> for String {
    fn from(e: Element) -> String {
        e.name()
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// Tests
// ============================================================================
