use bevy::reflect::{Reflect, std_traits::ReflectDefault};
use serde::{Deserialize, Serialize};

/// Event data
#[derive(Clone, Debug, Reflect, Serialize, Deserialize, Default, PartialEq)]
#[reflect(Default)]
pub struct AnimationEvent {
    pub id: String,
}

impl AnimationEvent {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Structure containing a sampled event and relevant metadata
#[derive(Clone, Debug, Reflect, Serialize, Deserialize, PartialEq)]
#[reflect(Default)]
pub struct SampledEvent {
    /// Event that was sampled
    pub event: AnimationEvent,
    /// Weight of event (is reduced by blending, for example), 0.0 to 1.0
    pub weight: f32,
    /// Percentage of total event duration at sampling time, 0.0 to 1.0
    pub percentage: f32,
    /// Track the event was sampled from, if any
    pub track: Option<String>,
}

impl Default for SampledEvent {
    fn default() -> Self {
        Self {
            event: AnimationEvent::default(),
            weight: 1.,
            percentage: 1.,
            track: None,
        }
    }
}

impl SampledEvent {
    pub fn instant(event: AnimationEvent) -> Self {
        Self {
            event,
            ..Default::default()
        }
    }
}

/// Events emitted during a single tick
#[derive(Clone, Debug, Reflect, Serialize, Deserialize, Default, PartialEq)]
#[reflect(Default)]
pub struct EventBuffer {
    pub events: Vec<SampledEvent>,
}

impl EventBuffer {
    pub fn with_events(events: impl Into<Vec<SampledEvent>>) -> Self {
        Self {
            events: events.into(),
        }
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn push(&mut self, event: SampledEvent) {
        self.events.push(event);
    }

    /// Appends the events of `other`, multiplying their weights by `weight`.
    pub fn extend_weighted(&mut self, other: &EventBuffer, weight: f32) {
        self.events.extend(other.events.iter().map(|ev| SampledEvent {
            weight: ev.weight * weight,
            ..ev.clone()
        }));
    }

    pub fn scale_weights(&mut self, factor: f32) {
        for ev in &mut self.events {
            ev.weight *= factor;
        }
    }

    /// Replaces the contents with a copy of `other`.
    pub fn copy_from(&mut self, other: &EventBuffer) {
        self.events.clear();
        self.events.extend(other.events.iter().cloned());
    }

    pub fn iter(&self) -> impl Iterator<Item = &SampledEvent> {
        self.events.iter()
    }
}
