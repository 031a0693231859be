use bevy::prelude::*;

use super::{is_full_weight, is_zero_weight, linear::InterpolateLinear};

/// Additive layering of transforms.
///
/// A delta produced by [`Additive::make_additive`] against a reference, applied back onto that
/// same reference with [`Additive::apply_additive`], reproduces the original transform.
pub trait Additive {
    /// Delta that takes `reference` to `self`.
    fn make_additive(&self, reference: &Self) -> Self;

    /// Layers `delta` on top of `self` with the given weight. A weight of zero leaves `self`
    /// unchanged.
    fn apply_additive(&self, delta: &Self, weight: f32) -> Self;

    /// Unclamped weighted accumulation, used when summing several contributors.
    fn sum_weighted(&self, other: &Self, weight: f32) -> Self;
}

impl Additive for Transform {
    fn make_additive(&self, reference: &Self) -> Self {
        Transform {
            translation: self.translation - reference.translation,
            rotation: reference.rotation.inverse() * self.rotation,
            scale: self.scale / reference.scale,
        }
    }

    fn apply_additive(&self, delta: &Self, weight: f32) -> Self {
        if is_zero_weight(weight) {
            return *self;
        }

        if is_full_weight(weight) {
            return Transform {
                translation: self.translation + delta.translation,
                rotation: (self.rotation * delta.rotation).normalize(),
                scale: self.scale * delta.scale,
            };
        }

        Transform {
            translation: self.translation + delta.translation * weight,
            rotation: self
                .rotation
                .interpolate_linear(&(self.rotation * delta.rotation), weight)
                .normalize(),
            scale: self.scale * Vec3::ONE.lerp(delta.scale, weight),
        }
    }

    fn sum_weighted(&self, other: &Self, weight: f32) -> Self {
        Transform {
            translation: self.translation + other.translation * weight,
            rotation: self.rotation + other.rotation * weight,
            scale: self.scale + other.scale * weight,
        }
    }
}

impl Additive for f32 {
    fn make_additive(&self, reference: &Self) -> Self {
        self - reference
    }

    fn apply_additive(&self, delta: &Self, weight: f32) -> Self {
        self + delta * weight
    }

    fn sum_weighted(&self, other: &Self, weight: f32) -> Self {
        self + other * weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(seed: f32) -> Transform {
        Transform {
            translation: Vec3::new(seed, seed * 2., -seed),
            rotation: Quat::from_euler(EulerRot::XYZ, 0.1 * seed, 0.4, -0.2 * seed),
            scale: Vec3::new(1. + seed * 0.1, 1., 2.),
        }
    }

    #[test]
    fn make_then_apply_is_identity() {
        let reference = sample(1.);
        let target = sample(3.);
        let delta = target.make_additive(&reference);
        let restored = reference.apply_additive(&delta, 1.);

        assert!(restored.translation.abs_diff_eq(target.translation, 1e-5));
        assert!(restored.rotation.abs_diff_eq(target.rotation, 1e-5));
        assert!(restored.scale.abs_diff_eq(target.scale, 1e-5));
    }

    #[test]
    fn zero_weight_is_noop() {
        let base = sample(2.);
        assert_eq!(base.apply_additive(&sample(5.), 0.), base);
    }

    #[test]
    fn partial_weight_scales_translation_and_scale() {
        let base = Transform::from_xyz(1., 1., 1.);
        let delta = Transform::from_xyz(2., 0., 0.).with_scale(Vec3::splat(3.));
        let result = base.apply_additive(&delta, 0.5);

        assert!(result.translation.abs_diff_eq(Vec3::new(2., 1., 1.), 1e-6));
        assert!(result.scale.abs_diff_eq(Vec3::splat(2.), 1e-6));
    }
}
