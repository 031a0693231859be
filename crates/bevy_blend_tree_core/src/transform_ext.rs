use bevy::prelude::*;

/// Transform helpers not provided by bevy directly.
pub trait TransformExt {
    fn inverse(&self) -> Self;

    /// `self` expressed in the space of `other`.
    fn relative_to(&self, other: &Self) -> Self;

    /// All-zero transform, the starting point for weighted accumulation.
    fn zeroed() -> Self;

    fn is_close(&self, other: &Self, epsilon: f32) -> bool;
}

impl TransformExt for Transform {
    fn inverse(&self) -> Self {
        Transform::from_matrix(self.to_matrix().inverse())
    }

    fn relative_to(&self, other: &Self) -> Self {
        other.inverse() * *self
    }

    fn zeroed() -> Self {
        Transform {
            translation: Vec3::ZERO,
            rotation: Quat::from_xyzw(0., 0., 0., 0.),
            scale: Vec3::ZERO,
        }
    }

    fn is_close(&self, other: &Self, epsilon: f32) -> bool {
        self.translation.abs_diff_eq(other.translation, epsilon)
            && (self.rotation.abs_diff_eq(other.rotation, epsilon)
                || self.rotation.abs_diff_eq(-other.rotation, epsilon))
            && self.scale.abs_diff_eq(other.scale, epsilon)
    }
}
