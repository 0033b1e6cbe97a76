//! Shared fixture for the integration suites: a small two-section project
//! with one layer per common role, hosted in memory.

#![allow(dead_code)]

use std::collections::BTreeMap;

use attacca::host::MemoryProject;
use attacca::pipeline::{CompileOutcome, ReadyEdit};
use attacca::project::model::{
    Layer, Meter, NoteEvent, ProjectSnapshot, Section, Tick, DEFAULT_PPQ,
};
use attacca::project::{EventId, LayerId, LayerRole, SectionId};

pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Four bars of verse, four bars of chorus, one note per bar on each of
/// melody, harmony, pads, and bass.
pub fn demo_snapshot() -> ProjectSnapshot {
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
            start: i * bar,
            duration: 480,
            pitch: 60 + (i % 5) as u8,
            velocity: 90,
        });
        events.push(NoteEvent {
            id: EventId::new(),
            layer: harmony,
            start: i * bar,
            duration: 1440,
            pitch: 55,
            velocity: 75,
        });
        events.push(NoteEvent {
            id: EventId::new(),
            layer: pads,
            start: i * bar,
            duration: 1800,
            pitch: 52,
            velocity: 70,
        });
        events.push(NoteEvent {
            id: EventId::new(),
            layer: bass,
            start: i * bar,
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
            layer(melody, "melody", LayerRole::Melody),
            layer(harmony, "harmony", LayerRole::Harmony),
            layer(pads, "pads", LayerRole::Pads),
            layer(bass, "bass", LayerRole::Bass),
        ],
        cards: BTreeMap::new(),
        events,
    };
    snap.normalize();
    snap
}

fn layer(id: LayerId, name: &str, role: LayerRole) -> Layer {
    Layer {
        id,
        name: name.to_string(),
        role,
        params: BTreeMap::new(),
        chain: vec![],
    }
}

pub fn demo_project() -> MemoryProject {
    init_tracing();
    MemoryProject::new(demo_snapshot())
}

pub fn ready(outcome: CompileOutcome) -> ReadyEdit {
    match outcome {
        CompileOutcome::Ready(ready) => ready,
        other => panic!("Expected a ready edit, got: {}", other.render()),
    }
}

pub fn section_range(snapshot: &ProjectSnapshot, name: &str) -> (Tick, Tick) {
    let section = snapshot
        .sections
        .iter()
        .find(|s| s.name == name)
        .unwrap_or_else(|| panic!("no section named {}", name));
    (section.start, section.end)
}

pub fn layer_named(snapshot: &ProjectSnapshot, name: &str) -> LayerId {
    snapshot
        .layers
        .iter()
        .find(|l| l.name == name)
        .unwrap_or_else(|| panic!("no layer named {}", name))
        .id
}
