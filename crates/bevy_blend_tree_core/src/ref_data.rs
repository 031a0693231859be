use bevy::prelude::*;

use crate::{edge_data::events::EventBuffer, interpolation::linear::InterpolateLinear};

/// Ancillary per-tick output of a node: the events it emitted and the root motion it
/// extracted. Produced during post-update and blended with the same weight as the poses.
#[derive(Clone, Debug, Default, Reflect, PartialEq)]
pub struct RefData {
    pub events: EventBuffer,
    pub trajectory_delta: Transform,
    pub trajectory_delta_mirrored: Transform,
}

impl RefData {
    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    pub fn zero_trajectory_delta(&mut self) {
        self.trajectory_delta = Transform::IDENTITY;
        self.trajectory_delta_mirrored = Transform::IDENTITY;
    }

    /// Resets to "nothing happened this tick".
    pub fn clear(&mut self) {
        self.clear_events();
        self.zero_trajectory_delta();
    }

    pub fn copy_trajectory_from(&mut self, other: &RefData) {
        self.trajectory_delta = other.trajectory_delta;
        self.trajectory_delta_mirrored = other.trajectory_delta_mirrored;
    }

    /// Sets the trajectory deltas to the blend of `a` and `b`.
    pub fn blend_trajectory(&mut self, a: &RefData, b: &RefData, weight: f32) {
        self.trajectory_delta = a
            .trajectory_delta
            .interpolate_linear(&b.trajectory_delta, weight);
        self.trajectory_delta_mirrored = a
            .trajectory_delta_mirrored
            .interpolate_linear(&b.trajectory_delta_mirrored, weight);
    }
}

/// Mirrors a root-motion delta across the YZ plane.
pub fn mirror_delta(delta: &Transform) -> Transform {
    Transform {
        translation: delta.translation * Vec3::new(-1., 1., 1.),
        rotation: Quat::from_xyzw(
            delta.rotation.x,
            -delta.rotation.y,
            -delta.rotation.z,
            delta.rotation.w,
        ),
        scale: delta.scale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_trajectory_halfway() {
        let mut a = RefData::default();
        a.trajectory_delta.translation = Vec3::X;
        let mut b = RefData::default();
        b.trajectory_delta.translation = Vec3::Z;

        let mut out = RefData::default();
        out.blend_trajectory(&a, &b, 0.5);
        assert!(
            out.trajectory_delta
                .translation
                .abs_diff_eq(Vec3::new(0.5, 0., 0.5), 1e-6)
        );
    }

    #[test]
    fn mirror_flips_x() {
        let delta = Transform::from_xyz(1., 2., 3.).with_rotation(Quat::from_rotation_y(0.5));
        let mirrored = mirror_delta(&delta);
        assert_eq!(mirrored.translation, Vec3::new(-1., 2., 3.));
        assert!(
            mirrored
                .rotation
                .abs_diff_eq(Quat::from_rotation_y(-0.5), 1e-6)
        );
    }
}
