pub mod additive;
pub mod linear;

/// Tolerance used when deciding whether a blend weight is effectively zero or one.
pub const WEIGHT_EPSILON: f32 = 1.0e-5;

pub fn is_zero_weight(weight: f32) -> bool {
    weight < WEIGHT_EPSILON
}

pub fn is_full_weight(weight: f32) -> bool {
    weight > 1.0 - WEIGHT_EPSILON
}
