use bevy::prelude::*;

use crate::colliders::{ColliderConfig, ColliderShape};

/// A collider resolved against the skeleton, positioned once per update from the animated
/// model-space pose.
#[derive(Debug, Clone)]
pub struct CollisionObject {
    pub shape: ColliderShape,
    pub joint: usize,
    pub offset: Transform,
    pub tags: Vec<String>,
    pub placement: Transform,
}

impl CollisionObject {
    pub fn from_config(config: &ColliderConfig, joint: usize) -> Self {
        Self {
            shape: config.shape.clone(),
            joint,
            offset: Transform::from_isometry(config.offset),
            tags: config.tags.clone(),
            placement: Transform::IDENTITY,
        }
    }

    pub fn update_placement(&mut self, model_space: &[Transform]) {
        let joint = model_space[self.joint];
        // Colliders follow the joint's position and orientation but not its scale.
        self.placement = Transform::from_translation(joint.translation)
            .with_rotation(joint.rotation)
            * self.offset;
    }

    pub fn is_excluded_by(&self, exclusion_tags: &[String]) -> bool {
        self.tags.iter().any(|tag| exclusion_tags.contains(tag))
    }

    pub fn push_out(&self, point: Vec3, radius: f32) -> Option<Vec3> {
        self.shape.push_out(&self.placement, point, radius)
    }
}
