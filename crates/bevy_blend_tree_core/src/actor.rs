use std::sync::Arc;

use bevy::prelude::*;

use crate::{
    colliders::SkeletonColliders, errors::SkeletonError, pose::Pose, simulated_object::SimulatedObjectSetup,
    skeleton::Skeleton,
};

/// Everything a blend tree instance needs to know about the character it animates: joint
/// topology, bind pose, morph target count, simulated-object setup and colliders.
#[derive(Debug, Clone)]
pub struct Actor {
    name: String,
    skeleton: Arc<Skeleton>,
    bind_pose: Pose,
    num_morph_targets: usize,
    simulated_object_setup: Option<Arc<SimulatedObjectSetup>>,
    colliders: SkeletonColliders,
    motion_extraction_joint: Option<usize>,
}

impl Actor {
    /// Creates an actor from its skeleton and the local-space bind transform of every joint.
    pub fn new(
        name: impl Into<String>,
        skeleton: Arc<Skeleton>,
        bind_transforms: Vec<Transform>,
    ) -> Result<Self, SkeletonError> {
        if bind_transforms.len() != skeleton.num_joints() {
            return Err(SkeletonError::BindPoseSizeMismatch {
                expected: skeleton.num_joints(),
                got: bind_transforms.len(),
            });
        }

        let mut bind_pose = Pose::new_linked(skeleton.clone(), 0);
        for (index, transform) in bind_transforms.into_iter().enumerate() {
            bind_pose.set_local_space_transform(index, transform);
        }
        bind_pose.force_update_full_model_space_pose();

        Ok(Self {
            name: name.into(),
            skeleton,
            bind_pose,
            num_morph_targets: 0,
            simulated_object_setup: None,
            colliders: SkeletonColliders::default(),
            motion_extraction_joint: None,
        })
    }

    pub fn with_num_morph_targets(mut self, num_morph_targets: usize) -> Self {
        self.num_morph_targets = num_morph_targets;
        let mut bind_pose = Pose::new_linked(self.skeleton.clone(), num_morph_targets);
        for index in 0..self.skeleton.num_joints() {
            bind_pose.set_local_space_transform(
                index,
                self.bind_pose.local_space_transform_direct(index),
            );
        }
        bind_pose.force_update_full_model_space_pose();
        self.bind_pose = bind_pose;
        self
    }

    pub fn with_simulated_object_setup(mut self, setup: SimulatedObjectSetup) -> Self {
        self.simulated_object_setup = Some(Arc::new(setup));
        self
    }

    pub fn with_colliders(mut self, colliders: SkeletonColliders) -> Self {
        self.colliders = colliders;
        self
    }

    /// Unknown joint names leave the motion extraction joint unset.
    pub fn with_motion_extraction_joint(mut self, joint_name: &str) -> Self {
        self.motion_extraction_joint = self.skeleton.find_joint_by_name(joint_name);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn skeleton(&self) -> &Arc<Skeleton> {
        &self.skeleton
    }

    /// The bind pose, with every model-space transform already computed.
    pub fn bind_pose(&self) -> &Pose {
        &self.bind_pose
    }

    pub fn num_morph_targets(&self) -> usize {
        self.num_morph_targets
    }

    pub fn simulated_object_setup(&self) -> Option<&Arc<SimulatedObjectSetup>> {
        self.simulated_object_setup.as_ref()
    }

    pub fn colliders(&self) -> &SkeletonColliders {
        &self.colliders
    }

    pub fn motion_extraction_joint(&self) -> Option<usize> {
        self.motion_extraction_joint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_pose_is_fully_computed() {
        let skeleton = Arc::new(Skeleton::chain(3));
        let actor = Actor::new(
            "chain",
            skeleton,
            vec![Transform::from_xyz(0., 1., 0.); 3],
        )
        .unwrap()
        .with_num_morph_targets(2);

        let bind = actor.bind_pose();
        assert_eq!(bind.num_morph_weights(), 2);
        assert_eq!(
            bind.model_space_transform_direct(2).translation,
            Vec3::new(0., 3., 0.)
        );
    }

    #[test]
    fn rejects_wrong_bind_pose_size() {
        let result = Actor::new("chain", Arc::new(Skeleton::chain(3)), vec![]);
        assert_eq!(
            result.err(),
            Some(SkeletonError::BindPoseSizeMismatch {
                expected: 3,
                got: 0
            })
        );
    }
}
