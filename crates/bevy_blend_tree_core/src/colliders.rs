use bevy::{
    math::{
        Isometry3d, Vec3,
        primitives::{Capsule3d, Cuboid, Sphere},
    },
    reflect::Reflect,
    transform::components::Transform,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Reflect, PartialEq, Serialize, Deserialize)]
pub enum ColliderShape {
    Sphere(Sphere),
    /// Capsule aligned with the local Y axis
    Capsule(Capsule3d),
    Cuboid(Cuboid),
}

#[derive(Debug, Clone, Reflect, Serialize, Deserialize)]
pub struct ColliderConfig {
    pub shape: ColliderShape,
    /// Name of the joint the collider follows
    pub attached_to: String,
    /// Offset from the joint's model-space transform
    pub offset: Isometry3d,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Default for ColliderConfig {
    fn default() -> Self {
        Self {
            shape: ColliderShape::Sphere(Sphere::new(0.1)),
            attached_to: String::new(),
            offset: Isometry3d::default(),
            tags: Vec::new(),
        }
    }
}

impl ColliderConfig {
    pub fn has_any_tag(&self, tags: &[String]) -> bool {
        self.tags.iter().any(|tag| tags.contains(tag))
    }
}

/// Collision volumes attached to the joints of an actor.
#[derive(Debug, Clone, Default, Reflect, Serialize, Deserialize)]
pub struct SkeletonColliders {
    #[serde(default)]
    colliders: Vec<ColliderConfig>,
}

impl SkeletonColliders {
    pub fn new(colliders: Vec<ColliderConfig>) -> Self {
        Self { colliders }
    }

    pub fn add_collider(&mut self, config: ColliderConfig) {
        self.colliders.push(config);
    }

    pub fn collider_count(&self) -> usize {
        self.colliders.len()
    }

    pub fn iter_colliders(&self) -> impl Iterator<Item = &ColliderConfig> {
        self.colliders.iter()
    }

    /// Colliders carrying at least one of `tags`.
    pub fn iter_tagged<'a>(
        &'a self,
        tags: &'a [String],
    ) -> impl Iterator<Item = &'a ColliderConfig> + 'a {
        self.colliders.iter().filter(|c| c.has_any_tag(tags))
    }
}

impl ColliderShape {
    /// If a sphere of `radius` centered at `point` penetrates the shape placed at `placement`,
    /// returns the closest position that just touches its surface.
    pub fn push_out(&self, placement: &Transform, point: Vec3, radius: f32) -> Option<Vec3> {
        match self {
            ColliderShape::Sphere(sphere) => {
                push_out_of_sphere(placement.translation, sphere.radius, point, radius)
            }
            ColliderShape::Capsule(capsule) => {
                let axis = placement.rotation * Vec3::Y * capsule.half_length;
                let a = placement.translation - axis;
                let b = placement.translation + axis;
                let ab = b - a;
                let t = if ab.length_squared() > f32::EPSILON {
                    ((point - a).dot(ab) / ab.length_squared()).clamp(0., 1.)
                } else {
                    0.
                };
                push_out_of_sphere(a + ab * t, capsule.radius, point, radius)
            }
            ColliderShape::Cuboid(cuboid) => {
                let local = placement.rotation.inverse() * (point - placement.translation);
                let half = cuboid.half_size + Vec3::splat(radius);
                let inside = local.abs().cmplt(half).all();
                if !inside {
                    return None;
                }
                // Push out along the axis of least penetration.
                let depth = half - local.abs();
                let mut pushed = local;
                if depth.x <= depth.y && depth.x <= depth.z {
                    pushed.x = half.x.copysign(local.x);
                } else if depth.y <= depth.z {
                    pushed.y = half.y.copysign(local.y);
                } else {
                    pushed.z = half.z.copysign(local.z);
                }
                Some(placement.translation + placement.rotation * pushed)
            }
        }
    }
}

fn push_out_of_sphere(center: Vec3, shape_radius: f32, point: Vec3, radius: f32) -> Option<Vec3> {
    let min_distance = shape_radius + radius;
    let offset = point - center;
    let distance_squared = offset.length_squared();
    if distance_squared >= min_distance * min_distance {
        return None;
    }
    let direction = if distance_squared > f32::EPSILON {
        offset / distance_squared.sqrt()
    } else {
        Vec3::Y
    };
    Some(center + direction * min_distance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_pushes_out_to_surface() {
        let shape = ColliderShape::Sphere(Sphere::new(1.));
        let placement = Transform::IDENTITY;
        let pushed = shape
            .push_out(&placement, Vec3::new(0.5, 0., 0.), 0.1)
            .unwrap();
        assert!(pushed.abs_diff_eq(Vec3::new(1.1, 0., 0.), 1e-6));
        assert!(
            shape
                .push_out(&placement, Vec3::new(2., 0., 0.), 0.1)
                .is_none()
        );
    }

    #[test]
    fn capsule_uses_closest_segment_point() {
        let shape = ColliderShape::Capsule(Capsule3d::new(0.5, 2.));
        let placement = Transform::from_xyz(0., 1., 0.);
        let pushed = shape
            .push_out(&placement, Vec3::new(0.2, 1.5, 0.), 0.)
            .unwrap();
        assert!(pushed.abs_diff_eq(Vec3::new(0.5, 1.5, 0.), 1e-5));
    }

    #[test]
    fn cuboid_pushes_along_shallowest_axis() {
        let shape = ColliderShape::Cuboid(Cuboid::new(2., 2., 2.));
        let pushed = shape
            .push_out(&Transform::IDENTITY, Vec3::new(0.9, 0.1, 0.), 0.)
            .unwrap();
        assert!(pushed.abs_diff_eq(Vec3::new(1., 0.1, 0.), 1e-6));
    }

    #[test]
    fn tagged_filtering() {
        let colliders = SkeletonColliders::new(vec![
            ColliderConfig {
                tags: vec!["head".into()],
                ..Default::default()
            },
            ColliderConfig {
                tags: vec!["legs".into()],
                ..Default::default()
            },
        ]);
        let tags = vec!["head".to_string()];
        assert_eq!(colliders.iter_tagged(&tags).count(), 1);
    }
}
