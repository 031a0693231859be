mod pose_data;

pub use pose_data::*;

use std::{any::TypeId, sync::Arc};

use bevy::{platform::collections::HashMap, prelude::*};
use bitflags::bitflags;

use crate::{
    actor::Actor,
    interpolation::{additive::Additive, linear::InterpolateLinear},
    skeleton::Skeleton,
    transform_ext::TransformExt,
};

bitflags! {
    /// Per-joint cache state.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct JointFlags: u8 {
        const LOCAL_READY = 1 << 0;
        const MODEL_READY = 1 << 1;
    }
}

/// Per-joint transforms for one skeleton at one instant.
///
/// A pose starts out empty and becomes usable once linked to a skeleton, which fixes its joint
/// count. Local-space transforms are the source of truth; model-space transforms are derived
/// lazily (`parent_model * local`) and cached per joint. Setting a local transform invalidates
/// the cached model transform of that joint and of every joint below it.
///
/// Accessing joints of an unlinked pose, or joints out of range, panics.
#[derive(Clone, Debug, Default)]
pub struct Pose {
    skeleton: Option<Arc<Skeleton>>,
    local_transforms: Vec<Transform>,
    model_transforms: Vec<Transform>,
    flags: Vec<JointFlags>,
    morph_weights: Vec<f32>,
    pose_datas: HashMap<TypeId, Box<dyn PoseData>>,
}

impl Pose {
    pub fn new_linked(skeleton: Arc<Skeleton>, num_morph_weights: usize) -> Self {
        let mut pose = Self::default();
        pose.link_to_skeleton(skeleton, num_morph_weights);
        pose
    }

    /// Binds the pose to a topology, resizing storage and resetting every joint to identity.
    pub fn link_to_skeleton(&mut self, skeleton: Arc<Skeleton>, num_morph_weights: usize) {
        let num_joints = skeleton.num_joints();

        self.local_transforms.clear();
        self.local_transforms
            .resize(num_joints, Transform::IDENTITY);
        self.model_transforms.clear();
        self.model_transforms
            .resize(num_joints, Transform::IDENTITY);
        self.flags.clear();
        self.flags.resize(num_joints, JointFlags::LOCAL_READY);
        self.morph_weights.clear();
        self.morph_weights.resize(num_morph_weights, 0.);
        self.skeleton = Some(skeleton);
    }

    /// Links to the actor's skeleton unless already linked to it.
    pub fn link_to_actor(&mut self, actor: &Actor) {
        let same_skeleton = self
            .skeleton
            .as_ref()
            .is_some_and(|s| Arc::ptr_eq(s, actor.skeleton()));
        if !same_skeleton || self.morph_weights.len() != actor.num_morph_targets() {
            self.link_to_skeleton(actor.skeleton().clone(), actor.num_morph_targets());
        }
    }

    /// Empties the pose, leaving it unlinked.
    pub fn clear(&mut self) {
        self.skeleton = None;
        self.local_transforms.clear();
        self.model_transforms.clear();
        self.flags.clear();
        self.morph_weights.clear();
        self.pose_datas.clear();
    }

    pub fn is_linked(&self) -> bool {
        self.skeleton.is_some()
    }

    pub fn skeleton(&self) -> Option<&Arc<Skeleton>> {
        self.skeleton.as_ref()
    }

    pub fn num_transforms(&self) -> usize {
        self.local_transforms.len()
    }

    pub fn joint_flags(&self, index: usize) -> JointFlags {
        self.flags[index]
    }

    fn linked_skeleton(&self) -> &Skeleton {
        self.skeleton
            .as_deref()
            .expect("pose accessed before being linked to a skeleton")
    }

    pub fn init_from_bind_pose(&mut self, actor: &Actor) {
        self.init_from_pose(actor.bind_pose());
    }

    /// Copies `other` into this pose, reusing this pose's storage.
    pub fn init_from_pose(&mut self, other: &Pose) {
        self.skeleton = other.skeleton.clone();
        self.local_transforms.clone_from(&other.local_transforms);
        self.model_transforms.clone_from(&other.model_transforms);
        self.flags.clone_from(&other.flags);
        self.morph_weights.clone_from(&other.morph_weights);
        self.pose_datas.clone_from(&other.pose_datas);
    }

    // Local space
    // -----------

    /// Local transform of a joint. If the local transform was invalidated it is derived from
    /// the model-space transforms without caching it; see
    /// [`Pose::update_local_space_transform`].
    pub fn local_space_transform(&self, index: usize) -> Transform {
        if self.flags[index].contains(JointFlags::LOCAL_READY) {
            self.local_transforms[index]
        } else {
            self.derive_local_from_model(index)
        }
    }

    pub fn local_space_transform_direct(&self, index: usize) -> Transform {
        self.local_transforms[index]
    }

    pub fn local_space_transforms_direct(&self) -> &[Transform] {
        &self.local_transforms
    }

    pub fn set_local_space_transform(&mut self, index: usize, transform: Transform) {
        self.local_transforms[index] = transform;
        self.flags[index].insert(JointFlags::LOCAL_READY);
        self.invalidate_model_space_subtree(index);
    }

    pub fn set_local_space_transform_direct(&mut self, index: usize, transform: Transform) {
        self.local_transforms[index] = transform;
    }

    pub fn invalidate_local_space_transform(&mut self, index: usize) {
        self.flags[index].remove(JointFlags::LOCAL_READY);
    }

    pub fn invalidate_all_local_space_transforms(&mut self) {
        for flags in self.flags.iter_mut() {
            flags.remove(JointFlags::LOCAL_READY);
        }
    }

    /// Recomputes and caches the local transform of a joint from model space.
    pub fn update_local_space_transform(&mut self, index: usize) {
        if self.flags[index].contains(JointFlags::LOCAL_READY) {
            return;
        }
        let local = self.derive_local_from_model(index);
        self.local_transforms[index] = local;
        self.flags[index].insert(JointFlags::LOCAL_READY);
    }

    pub fn update_all_local_space_transforms(&mut self) {
        for index in 0..self.num_transforms() {
            self.update_local_space_transform(index);
        }
    }

    fn derive_local_from_model(&self, index: usize) -> Transform {
        let model = self.compute_model_space_transform(index);
        match self.linked_skeleton().parent(index) {
            Some(parent) => model.relative_to(&self.compute_model_space_transform(parent)),
            None => model,
        }
    }

    // Model space
    // -----------

    /// Model-space transform of a joint, recomputing and caching it (and any stale ancestors)
    /// when needed.
    pub fn model_space_transform(&mut self, index: usize) -> Transform {
        if !self.flags[index].contains(JointFlags::MODEL_READY) {
            self.update_model_space_transform(index);
        }
        self.model_transforms[index]
    }

    pub fn model_space_transform_direct(&self, index: usize) -> Transform {
        self.model_transforms[index]
    }

    /// Model-space transform computed from the cache where it is valid, without writing
    /// anything back. Usable through a shared reference.
    pub fn compute_model_space_transform(&self, index: usize) -> Transform {
        if self.flags[index].contains(JointFlags::MODEL_READY) {
            return self.model_transforms[index];
        }
        let local = self.local_transforms[index];
        match self.linked_skeleton().parent(index) {
            Some(parent) => self.compute_model_space_transform(parent) * local,
            None => local,
        }
    }

    /// Sets the model-space transform of a joint, updating its local transform to match and
    /// invalidating every joint below it.
    pub fn set_model_space_transform(&mut self, index: usize, transform: Transform) {
        let parent = self.linked_skeleton().parent(index);
        let local = match parent {
            Some(parent) => transform.relative_to(&self.model_space_transform(parent)),
            None => transform,
        };

        self.local_transforms[index] = local;
        self.model_transforms[index] = transform;
        self.flags[index].insert(JointFlags::LOCAL_READY | JointFlags::MODEL_READY);

        let Self {
            skeleton, flags, ..
        } = self;
        let skeleton = skeleton
            .as_deref()
            .expect("pose accessed before being linked to a skeleton");
        for child in skeleton.children(index) {
            skeleton.for_each_in_subtree(*child, |j| flags[j].remove(JointFlags::MODEL_READY));
        }
    }

    pub fn set_model_space_transform_direct(&mut self, index: usize, transform: Transform) {
        self.model_transforms[index] = transform;
    }

    pub fn invalidate_model_space_transform(&mut self, index: usize) {
        self.flags[index].remove(JointFlags::MODEL_READY);
    }

    pub fn invalidate_all_model_space_transforms(&mut self) {
        for flags in self.flags.iter_mut() {
            flags.remove(JointFlags::MODEL_READY);
        }
    }

    fn invalidate_model_space_subtree(&mut self, index: usize) {
        let Self {
            skeleton, flags, ..
        } = self;
        let skeleton = skeleton
            .as_deref()
            .expect("pose accessed before being linked to a skeleton");
        skeleton.for_each_in_subtree(index, |j| flags[j].remove(JointFlags::MODEL_READY));
    }

    /// Recomputes the model transform of `index`, walking up only as far as the nearest
    /// ancestor with a valid cache.
    pub fn update_model_space_transform(&mut self, index: usize) {
        let skeleton = self
            .skeleton
            .clone()
            .expect("pose accessed before being linked to a skeleton");

        let mut chain = vec![index];
        let mut current = skeleton.parent(index);
        while let Some(joint) = current {
            if self.flags[joint].contains(JointFlags::MODEL_READY) {
                break;
            }
            chain.push(joint);
            current = skeleton.parent(joint);
        }

        for joint in chain.into_iter().rev() {
            let local = self.local_space_transform(joint);
            self.model_transforms[joint] = match skeleton.parent(joint) {
                Some(parent) => self.model_transforms[parent] * local,
                None => local,
            };
            self.flags[joint].insert(JointFlags::MODEL_READY);
        }
    }

    /// Brings every stale model-space transform up to date.
    pub fn update_all_model_space_transforms(&mut self) {
        for index in 0..self.num_transforms() {
            if !self.flags[index].contains(JointFlags::MODEL_READY) {
                // Parents precede children, so the parent is already valid here.
                self.update_model_space_transform(index);
            }
        }
    }

    /// Recomputes every model-space transform regardless of cache state.
    pub fn force_update_full_model_space_pose(&mut self) {
        self.invalidate_all_model_space_transforms();
        self.update_all_model_space_transforms();
    }

    /// Writes the model-space transform of every joint into `out` without touching the cache.
    pub fn model_space_transforms_into(&self, out: &mut Vec<Transform>) {
        let skeleton = self.linked_skeleton();
        out.clear();
        for index in 0..self.num_transforms() {
            let transform = if self.flags[index].contains(JointFlags::MODEL_READY) {
                self.model_transforms[index]
            } else {
                let local = self.local_space_transform(index);
                match skeleton.parent(index) {
                    Some(parent) => out[parent] * local,
                    None => local,
                }
            };
            out.push(transform);
        }
    }

    // Morph weights
    // -------------

    pub fn num_morph_weights(&self) -> usize {
        self.morph_weights.len()
    }

    pub fn morph_weight(&self, index: usize) -> f32 {
        self.morph_weights[index]
    }

    pub fn set_morph_weight(&mut self, index: usize, weight: f32) {
        self.morph_weights[index] = weight;
    }

    pub fn morph_weights(&self) -> &[f32] {
        &self.morph_weights
    }

    // Pose data
    // ---------

    pub fn add_pose_data<T: PoseData>(&mut self, data: T) {
        self.pose_datas.insert(TypeId::of::<T>(), Box::new(data));
    }

    pub fn pose_data<T: PoseData>(&self) -> Option<&T> {
        self.pose_datas
            .get(&TypeId::of::<T>())
            .and_then(|data| data.as_any().downcast_ref::<T>())
    }

    pub fn pose_data_mut<T: PoseData>(&mut self) -> Option<&mut T> {
        self.pose_datas
            .get_mut(&TypeId::of::<T>())
            .and_then(|data| data.as_any_mut().downcast_mut::<T>())
    }

    pub fn remove_pose_data<T: PoseData>(&mut self) -> Option<Box<dyn PoseData>> {
        self.pose_datas.remove(&TypeId::of::<T>())
    }

    pub fn clear_pose_datas(&mut self) {
        self.pose_datas.clear();
    }

    // Whole-pose operations
    // ---------------------

    fn map_local_transforms(&mut self, other: &Pose, f: impl Fn(&Transform, &Transform) -> Transform) {
        assert_eq!(
            self.num_transforms(),
            other.num_transforms(),
            "poses must share a topology"
        );
        for index in 0..self.num_transforms() {
            let a = self.local_space_transform(index);
            let b = other.local_space_transform(index);
            self.local_transforms[index] = f(&a, &b);
            self.flags[index] = JointFlags::LOCAL_READY;
        }
    }

    fn map_morph_weights(&mut self, other: &Pose, f: impl Fn(f32, f32) -> f32) {
        for (a, b) in self.morph_weights.iter_mut().zip(other.morph_weights.iter()) {
            *a = f(*a, *b);
        }
    }

    /// Interpolates toward `other`: linear for positions, scales and morph weights, spherical
    /// for rotations. The weight is not clamped.
    pub fn blend(&mut self, other: &Pose, weight: f32) {
        self.map_local_transforms(other, |a, b| a.interpolate_linear(b, weight));
        self.map_morph_weights(other, |a, b| a.interpolate_linear(&b, weight));

        for (type_id, data) in self.pose_datas.iter_mut() {
            if let Some(other_data) = other.pose_datas.get(type_id) {
                data.blend(other_data.as_ref(), weight);
            }
        }
    }

    /// Layers the additive pose `other` on top of this pose.
    pub fn apply_additive(&mut self, other: &Pose, weight: f32) {
        self.map_local_transforms(other, |a, b| a.apply_additive(b, weight));
        self.map_morph_weights(other, |a, b| a.apply_additive(&b, weight));
    }

    /// Turns this pose into the delta that takes `reference` to it.
    pub fn make_additive(&mut self, reference: &Pose) {
        self.map_local_transforms(reference, |a, b| a.make_additive(b));
        self.map_morph_weights(reference, |a, b| a.make_additive(&b));
    }

    /// Unclamped weighted accumulation. Rotations are summed component-wise, so call
    /// [`Pose::normalize_quaternions`] once every contributor has been added.
    pub fn sum(&mut self, other: &Pose, weight: f32) {
        self.map_local_transforms(other, |a, b| a.sum_weighted(b, weight));
        self.map_morph_weights(other, |a, b| a.sum_weighted(&b, weight));
    }

    /// Expresses every local transform relative to the matching transform of `other`.
    pub fn make_relative_to(&mut self, other: &Pose) {
        self.map_local_transforms(other, |a, b| a.relative_to(b));
    }

    /// Sets every local transform and morph weight to zero, ready for [`Pose::sum`].
    pub fn zero(&mut self) {
        for (transform, flags) in self.local_transforms.iter_mut().zip(self.flags.iter_mut()) {
            *transform = Transform::zeroed();
            *flags = JointFlags::LOCAL_READY;
        }
        for weight in self.morph_weights.iter_mut() {
            *weight = 0.;
        }
    }

    pub fn normalize_quaternions(&mut self) {
        for index in 0..self.num_transforms() {
            let rotation = self.local_transforms[index].rotation;
            if rotation.length_squared() > f32::EPSILON {
                self.local_transforms[index].rotation = rotation.normalize();
            } else {
                self.local_transforms[index].rotation = Quat::IDENTITY;
            }
        }
        self.invalidate_all_model_space_transforms();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::Joint;

    fn chain(num_joints: usize) -> Arc<Skeleton> {
        Arc::new(Skeleton::chain(num_joints))
    }

    fn offset_pose(skeleton: &Arc<Skeleton>, offset: Vec3, angle: f32) -> Pose {
        let mut pose = Pose::new_linked(skeleton.clone(), 2);
        for i in 0..skeleton.num_joints() {
            pose.set_local_space_transform(
                i,
                Transform::from_translation(offset * (i as f32 + 1.))
                    .with_rotation(Quat::from_rotation_z(angle)),
            );
        }
        pose.set_morph_weight(0, angle);
        pose
    }

    #[test]
    fn linking_matches_joint_count() {
        let skeleton = chain(5);
        let pose = Pose::new_linked(skeleton.clone(), 3);
        assert!(pose.is_linked());
        assert_eq!(pose.num_transforms(), skeleton.num_joints());
        assert_eq!(pose.num_morph_weights(), 3);

        let mut pose = pose;
        pose.clear();
        assert!(!pose.is_linked());
        assert_eq!(pose.num_transforms(), 0);
    }

    #[test]
    fn model_space_composes_parents() {
        let skeleton = chain(3);
        let mut pose = Pose::new_linked(skeleton, 0);
        for i in 0..3 {
            pose.set_local_space_transform(i, Transform::from_xyz(0., 1., 0.));
        }
        assert_eq!(
            pose.model_space_transform(2).translation,
            Vec3::new(0., 3., 0.)
        );
        assert!(pose.joint_flags(1).contains(JointFlags::MODEL_READY));
    }

    #[test]
    fn set_local_invalidates_descendants_only() {
        // 0 -> 1 -> 2, and 0 -> 3
        let skeleton = Arc::new(
            Skeleton::new(vec![
                Joint::new("root", None),
                Joint::new("a", Some(0)),
                Joint::new("b", Some(1)),
                Joint::new("c", Some(0)),
            ])
            .unwrap(),
        );
        let mut pose = Pose::new_linked(skeleton, 0);
        for i in 0..4 {
            pose.set_local_space_transform(i, Transform::from_xyz(1., 0., 0.));
        }
        pose.update_all_model_space_transforms();
        let sibling_before = pose.model_space_transform(3);

        pose.set_local_space_transform(1, Transform::from_xyz(5., 0., 0.));
        assert!(!pose.joint_flags(1).contains(JointFlags::MODEL_READY));
        assert!(!pose.joint_flags(2).contains(JointFlags::MODEL_READY));
        assert!(pose.joint_flags(0).contains(JointFlags::MODEL_READY));
        assert!(pose.joint_flags(3).contains(JointFlags::MODEL_READY));

        assert_eq!(pose.model_space_transform(2).translation, Vec3::new(7., 0., 0.));
        assert_eq!(pose.model_space_transform(3), sibling_before);
    }

    #[test]
    fn direct_setters_bypass_flags() {
        let skeleton = chain(2);
        let mut pose = Pose::new_linked(skeleton, 0);
        pose.update_all_model_space_transforms();
        pose.set_local_space_transform_direct(0, Transform::from_xyz(1., 0., 0.));
        // The cache was not invalidated, so the stale value is returned.
        assert_eq!(pose.model_space_transform(1), Transform::IDENTITY);

        pose.force_update_full_model_space_pose();
        assert_eq!(pose.model_space_transform(1).translation, Vec3::X);
    }

    #[test]
    fn set_model_space_updates_local() {
        let skeleton = chain(2);
        let mut pose = Pose::new_linked(skeleton, 0);
        pose.set_local_space_transform(0, Transform::from_xyz(1., 0., 0.));
        pose.set_model_space_transform(1, Transform::from_xyz(1., 2., 0.));
        assert!(
            pose.local_space_transform(1)
                .is_close(&Transform::from_xyz(0., 2., 0.), 1e-6)
        );
    }

    #[test]
    fn model_space_transforms_into_matches_cached() {
        let skeleton = chain(4);
        let mut pose = offset_pose(&skeleton, Vec3::Y, 0.3);
        let mut out = Vec::new();
        pose.model_space_transforms_into(&mut out);
        for (i, transform) in out.iter().enumerate() {
            assert!(transform.is_close(&pose.model_space_transform(i), 1e-5));
        }
    }

    #[test]
    fn blend_endpoints() {
        let skeleton = chain(5);
        let a = offset_pose(&skeleton, Vec3::X, 0.2);
        let b = offset_pose(&skeleton, Vec3::Y, 1.1);

        let mut at_zero = a.clone();
        at_zero.blend(&b, 0.);
        let mut at_one = a.clone();
        at_one.blend(&b, 1.);

        for i in 0..5 {
            assert_eq!(at_zero.local_space_transform(i), a.local_space_transform(i));
            assert_eq!(at_one.local_space_transform(i), b.local_space_transform(i));
        }
        assert_eq!(at_zero.morph_weights(), a.morph_weights());
        assert_eq!(at_one.morph_weights(), b.morph_weights());
    }

    #[test]
    fn additive_roundtrip() {
        let skeleton = chain(5);
        let reference = offset_pose(&skeleton, Vec3::X, 0.2);
        let target = offset_pose(&skeleton, Vec3::new(0.5, 1., 0.), -0.7);

        let mut delta = target.clone();
        delta.make_additive(&reference);
        let mut restored = reference.clone();
        restored.apply_additive(&delta, 1.);

        for i in 0..5 {
            assert!(
                restored
                    .local_space_transform(i)
                    .is_close(&target.local_space_transform(i), 1e-5)
            );
        }
        assert!((restored.morph_weight(0) - target.morph_weight(0)).abs() < 1e-6);
    }

    #[test]
    fn sum_then_normalize_averages() {
        let skeleton = chain(2);
        let a = offset_pose(&skeleton, Vec3::X, 0.);
        let b = offset_pose(&skeleton, Vec3::Y, 0.);

        let mut acc = a.clone();
        acc.zero();
        acc.sum(&a, 0.5);
        acc.sum(&b, 0.5);
        acc.normalize_quaternions();

        assert!(
            acc.local_space_transform(0)
                .translation
                .abs_diff_eq(Vec3::new(0.5, 0.5, 0.), 1e-6)
        );
        assert!(
            acc.local_space_transform(0)
                .rotation
                .abs_diff_eq(Quat::IDENTITY, 1e-6)
        );
    }

    #[test]
    fn relative_to_matches_offsets() {
        let skeleton = chain(3);
        let mut a = Pose::new_linked(skeleton.clone(), 0);
        let mut b = Pose::new_linked(skeleton, 0);
        for i in 0..3 {
            let i_f = i as f32;
            a.set_local_space_transform(i, Transform::from_xyz(i_f, i_f, i_f));
            b.set_local_space_transform(i, Transform::from_xyz(i_f - 1., i_f - 1., i_f - 1.));
        }
        a.make_relative_to(&b);
        for i in 0..3 {
            assert!(
                a.local_space_transform(i)
                    .translation
                    .abs_diff_eq(Vec3::ONE, 1e-6)
            );
        }
    }

    #[derive(Clone, Debug, PartialEq)]
    struct Stiffness(f32);

    impl PoseData for Stiffness {
        fn blend(&mut self, other: &dyn PoseData, weight: f32) {
            if let Some(other) = other.as_any().downcast_ref::<Stiffness>() {
                self.0 += (other.0 - self.0) * weight;
            }
        }
    }

    #[test]
    fn pose_data_blends_with_pose() {
        let skeleton = chain(1);
        let mut a = Pose::new_linked(skeleton.clone(), 0);
        a.add_pose_data(Stiffness(0.));
        let mut b = Pose::new_linked(skeleton, 0);
        b.add_pose_data(Stiffness(1.));

        a.blend(&b, 0.25);
        assert_eq!(a.pose_data::<Stiffness>(), Some(&Stiffness(0.25)));
        assert!(a.remove_pose_data::<Stiffness>().is_some());
        assert!(a.pose_data::<Stiffness>().is_none());
    }
}
