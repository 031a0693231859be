use bevy::reflect::{Reflect, std_traits::ReflectDefault};
use serde::{Deserialize, Serialize};

/// Tuning for one joint taking part in a simulated object.
#[derive(Reflect, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[reflect(Default)]
#[serde(default)]
pub struct SimulatedJoint {
    /// Name of the skeleton joint this particle drives
    pub joint: String,
    pub mass: f32,
    /// How strongly the particle is pulled back toward its animated position
    pub stiffness: f32,
    pub damping: f32,
    pub gravity_factor: f32,
    /// Fraction of tangential velocity removed on contact, 0.0 to 1.0
    pub friction: f32,
    pub collision_radius: f32,
    /// Pinned joints follow the animation exactly
    pub pinned: bool,
    /// Colliders carrying any of these tags are ignored for this joint
    pub collider_exclusion_tags: Vec<String>,
}

impl Default for SimulatedJoint {
    fn default() -> Self {
        Self {
            joint: String::new(),
            mass: 1.,
            stiffness: 0.,
            damping: 0.001,
            gravity_factor: 1.,
            friction: 0.,
            collision_radius: 0.05,
            pinned: false,
            collider_exclusion_tags: Vec::new(),
        }
    }
}

impl SimulatedJoint {
    pub fn new(joint: impl Into<String>) -> Self {
        Self {
            joint: joint.into(),
            ..Default::default()
        }
    }
}

/// A named group of joints simulated together (a ponytail, a cape, a dangling strap...).
#[derive(Reflect, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[reflect(Default)]
pub struct SimulatedObject {
    pub name: String,
    pub joints: Vec<SimulatedJoint>,
    /// Only colliders carrying one of these tags are considered
    #[serde(default)]
    pub collider_tags: Vec<String>,
}

impl SimulatedObject {
    pub fn new(name: impl Into<String>, joints: Vec<SimulatedJoint>) -> Self {
        Self {
            name: name.into(),
            joints,
            collider_tags: Vec::new(),
        }
    }

    pub fn with_collider_tags(mut self, tags: Vec<String>) -> Self {
        self.collider_tags = tags;
        self
    }
}

/// Every simulated object defined for an actor.
#[derive(Reflect, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[reflect(Default)]
pub struct SimulatedObjectSetup {
    #[serde(default)]
    pub objects: Vec<SimulatedObject>,
}

impl SimulatedObjectSetup {
    pub fn new(objects: Vec<SimulatedObject>) -> Self {
        Self { objects }
    }

    pub fn from_ron(source: &str) -> Result<Self, ron::error::SpannedError> {
        ron::de::from_str(source)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&SimulatedObject> {
        self.objects.iter().find(|obj| obj.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SimulatedObject> {
        self.objects.iter()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
