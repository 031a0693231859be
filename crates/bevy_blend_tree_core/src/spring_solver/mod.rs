mod collision;

pub use collision::*;

use bevy::{log::warn, platform::collections::HashMap, prelude::*};

use crate::{
    actor::Actor,
    errors::SolverInitError,
    interpolation::is_zero_weight,
    pose::Pose,
    simulated_object::{SimulatedJoint, SimulatedObject},
};

/// Upper bound on fixed steps taken in a single update. Time beyond it is dropped, so a long
/// hitch slows the simulation down instead of stalling the frame.
pub const MAX_STEPS_PER_UPDATE: usize = 10;

pub const DEFAULT_GRAVITY: Vec3 = Vec3::new(0., -9.81, 0.);

/// One simulated point mass, tracking a single joint.
#[derive(Debug, Clone)]
pub struct SpringParticle {
    pub joint: usize,
    /// Index of the parent particle, if any
    pub parent: Option<usize>,
    pub position: Vec3,
    pub prev_position: Vec3,
    pub inv_mass: f32,
    /// Tuning read every step, so it can be adjusted at runtime
    pub config: SimulatedJoint,
    /// Anchors stand in for non-simulated parents. They are never written back to the pose.
    pub is_anchor: bool,
    /// Animated model-space position at the end of the last update
    pub target: Vec3,
    prev_target: Vec3,
}

impl SpringParticle {
    /// Whether the particle is carried by the animation instead of being integrated.
    pub fn is_fixed(&self) -> bool {
        self.inv_mass == 0.
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spring {
    pub particle_a: usize,
    pub particle_b: usize,
    pub rest_length: f32,
}

pub struct InitSettings<'a> {
    pub actor: &'a Actor,
    pub simulated_object: &'a SimulatedObject,
    pub collider_tags: &'a [String],
    /// Owner name, used in log messages
    pub name: &'a str,
}

/// Verlet particle system driving the joints of one simulated object.
///
/// The solver runs at a fixed time step. Each update accumulates the elapsed time and takes as
/// many steps as fit, interpolating the animated targets across those steps.
#[derive(Debug, Clone)]
pub struct SpringSolver {
    name: String,
    particles: Vec<SpringParticle>,
    springs: Vec<Spring>,
    collision_objects: Vec<CollisionObject>,
    fixed_time_step: f32,
    num_iterations: usize,
    collision_enabled: bool,
    time_accumulator: f32,
    gravity: Vec3,
    stiffness_factor: f32,
    gravity_factor: f32,
    damping_factor: f32,
    needs_stabilize: bool,
    model_space: Vec<Transform>,
}

impl Default for SpringSolver {
    fn default() -> Self {
        Self {
            name: String::new(),
            particles: Vec::new(),
            springs: Vec::new(),
            collision_objects: Vec::new(),
            fixed_time_step: 1. / 60.,
            num_iterations: 2,
            collision_enabled: true,
            time_accumulator: 0.,
            gravity: DEFAULT_GRAVITY,
            stiffness_factor: 1.,
            gravity_factor: 1.,
            damping_factor: 1.,
            needs_stabilize: true,
            model_space: Vec::new(),
        }
    }
}

impl SpringSolver {
    pub fn init(&mut self, settings: InitSettings) -> Result<(), SolverInitError> {
        let InitSettings {
            actor,
            simulated_object,
            collider_tags,
            name,
        } = settings;
        let skeleton = actor.skeleton();
        let bind_pose = actor.bind_pose();

        self.name = name.to_string();
        self.particles.clear();
        self.springs.clear();
        self.collision_objects.clear();
        self.time_accumulator = 0.;
        self.needs_stabilize = true;

        let mut joints: Vec<(usize, &SimulatedJoint)> = Vec::new();
        for joint_config in simulated_object.joints.iter() {
            let Some(joint) = skeleton.find_joint_by_name(&joint_config.joint) else {
                warn!(
                    "[{}] joint {:?} of simulated object {:?} is not in the skeleton, skipping it",
                    name, joint_config.joint, simulated_object.name
                );
                continue;
            };
            if joints.iter().any(|(existing, _)| *existing == joint) {
                return Err(SolverInitError::DuplicateJoint {
                    node: name.to_string(),
                    object: simulated_object.name.clone(),
                    joint: joint_config.joint.clone(),
                });
            }
            joints.push((joint, joint_config));
        }

        if joints.is_empty() {
            return Err(SolverInitError::EmptyParticleSet {
                node: name.to_string(),
                object: simulated_object.name.clone(),
            });
        }

        // Parents precede children in the skeleton, so sorting by joint index lets every
        // particle find its parent particle already created.
        joints.sort_by_key(|(joint, _)| *joint);

        let mut particle_of_joint: HashMap<usize, usize> = HashMap::default();
        for (joint, joint_config) in joints {
            let parent = match nearest_particle_ancestor(skeleton, joint, &particle_of_joint) {
                Some(parent) => Some(parent),
                None => skeleton.parent(joint).map(|parent_joint| {
                    let pinned = SimulatedJoint {
                        pinned: true,
                        ..Default::default()
                    };
                    let mut anchor = new_particle(parent_joint, None, bind_pose, pinned);
                    anchor.is_anchor = true;
                    self.particles.push(anchor);
                    particle_of_joint.insert(parent_joint, self.particles.len() - 1);
                    self.particles.len() - 1
                }),
            };

            let index = self.particles.len();
            self.particles
                .push(new_particle(joint, parent, bind_pose, joint_config.clone()));
            particle_of_joint.insert(joint, index);

            if let Some(parent) = parent {
                let rest_length = self.particles[index]
                    .position
                    .distance(self.particles[parent].position);
                self.springs.push(Spring {
                    particle_a: parent,
                    particle_b: index,
                    rest_length,
                });
            }
        }

        for config in actor.colliders().iter_tagged(collider_tags) {
            match skeleton.find_joint_by_name(&config.attached_to) {
                Some(joint) => self
                    .collision_objects
                    .push(CollisionObject::from_config(config, joint)),
                None => warn!(
                    "[{}] collider attached to unknown joint {:?} is ignored",
                    name, config.attached_to
                ),
            }
        }

        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn particles(&self) -> &[SpringParticle] {
        &self.particles
    }

    pub fn springs(&self) -> &[Spring] {
        &self.springs
    }

    pub fn collision_objects(&self) -> &[CollisionObject] {
        &self.collision_objects
    }

    /// Number of particles driving actual joints, anchors excluded.
    pub fn num_simulated_joints(&self) -> usize {
        self.particles.iter().filter(|p| !p.is_anchor).count()
    }

    /// Non-positive time steps are ignored.
    pub fn set_fixed_time_step(&mut self, time_step: f32) {
        if time_step > 0. {
            self.fixed_time_step = time_step;
        }
    }

    pub fn fixed_time_step(&self) -> f32 {
        self.fixed_time_step
    }

    pub fn set_num_iterations(&mut self, num_iterations: usize) {
        self.num_iterations = num_iterations.max(1);
    }

    pub fn num_iterations(&self) -> usize {
        self.num_iterations
    }

    pub fn set_collision_enabled(&mut self, enabled: bool) {
        self.collision_enabled = enabled;
    }

    pub fn collision_enabled(&self) -> bool {
        self.collision_enabled
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
    }

    pub fn set_stiffness_factor(&mut self, factor: f32) {
        self.stiffness_factor = factor;
    }

    pub fn set_gravity_factor(&mut self, factor: f32) {
        self.gravity_factor = factor;
    }

    pub fn set_damping_factor(&mut self, factor: f32) {
        self.damping_factor = factor;
    }

    /// Applies `f` to every particle, anchors included.
    pub fn adjust_particles(&mut self, mut f: impl FnMut(&mut SpringParticle)) {
        for particle in self.particles.iter_mut() {
            f(particle);
        }
    }

    /// Drops all accumulated velocity, keeping particles at the last animated positions.
    pub fn stabilize(&mut self) {
        for particle in self.particles.iter_mut() {
            particle.position = particle.target;
            particle.prev_position = particle.target;
            particle.prev_target = particle.target;
        }
        self.time_accumulator = 0.;
    }

    /// Moves every particle onto `pose` and drops all accumulated velocity.
    pub fn stabilize_with_pose(&mut self, pose: &Pose) {
        pose.model_space_transforms_into(&mut self.model_space);
        for particle in self.particles.iter_mut() {
            particle.target = self.model_space[particle.joint].translation;
        }
        self.stabilize();
        self.needs_stabilize = false;
    }

    /// Advances the simulation by `delta_time` toward the animated `input` and writes the result
    /// into `output`, which is expected to already hold a copy of `input`. With a weight of zero
    /// the simulation still advances but `output` is left untouched.
    pub fn update(&mut self, input: &Pose, output: &mut Pose, delta_time: f32, weight: f32) {
        if self.particles.is_empty() {
            return;
        }

        if self.needs_stabilize {
            self.stabilize_with_pose(input);
        } else {
            input.model_space_transforms_into(&mut self.model_space);
            for particle in self.particles.iter_mut() {
                particle.target = self.model_space[particle.joint].translation;
            }
        }

        for object in self.collision_objects.iter_mut() {
            object.update_placement(&self.model_space);
        }

        self.time_accumulator += delta_time.max(0.);
        let mut num_steps = (self.time_accumulator / self.fixed_time_step).floor() as usize;
        if num_steps > MAX_STEPS_PER_UPDATE {
            num_steps = MAX_STEPS_PER_UPDATE;
            self.time_accumulator = 0.;
        } else {
            self.time_accumulator -= num_steps as f32 * self.fixed_time_step;
        }

        for step in 1..=num_steps {
            let alpha = step as f32 / num_steps as f32;
            self.step(alpha);
        }

        for particle in self.particles.iter_mut() {
            particle.prev_target = particle.target;
        }

        if !is_zero_weight(weight) {
            self.write_pose(output, weight.clamp(0., 1.));
        }
    }

    fn step(&mut self, alpha: f32) {
        let h = self.fixed_time_step;

        for particle in self.particles.iter_mut() {
            let animated = particle.prev_target.lerp(particle.target, alpha);
            if particle.is_fixed() {
                particle.prev_position = particle.position;
                particle.position = animated;
                continue;
            }

            let damping = (particle.config.damping * self.damping_factor).clamp(0., 1.);
            let velocity = (particle.position - particle.prev_position) * (1. - damping);
            let acceleration = self.gravity * particle.config.gravity_factor * self.gravity_factor;

            let mut next = particle.position + velocity + acceleration * h * h;
            let pull = (particle.config.stiffness * self.stiffness_factor * h).clamp(0., 1.);
            next = next.lerp(animated, pull);

            particle.prev_position = particle.position;
            particle.position = next;
        }

        for _ in 0..self.num_iterations {
            self.satisfy_springs();
            if self.collision_enabled {
                self.resolve_collisions();
            }
        }
    }

    fn satisfy_springs(&mut self) {
        for spring in self.springs.iter() {
            let a = &self.particles[spring.particle_a];
            let b = &self.particles[spring.particle_b];
            let total_inv_mass = a.inv_mass + b.inv_mass;
            if total_inv_mass <= 0. {
                continue;
            }

            let delta = b.position - a.position;
            let length = delta.length();
            if length <= f32::EPSILON {
                continue;
            }
            let correction = delta * ((length - spring.rest_length) / (length * total_inv_mass));
            let (inv_a, inv_b) = (a.inv_mass, b.inv_mass);

            self.particles[spring.particle_a].position += correction * inv_a;
            self.particles[spring.particle_b].position -= correction * inv_b;
        }
    }

    fn resolve_collisions(&mut self) {
        for particle in self.particles.iter_mut() {
            if particle.is_fixed() {
                continue;
            }
            for object in self.collision_objects.iter() {
                if object.is_excluded_by(&particle.config.collider_exclusion_tags) {
                    continue;
                }
                if let Some(pushed) =
                    object.push_out(particle.position, particle.config.collision_radius)
                {
                    particle.position = pushed;
                    let friction = particle.config.friction.clamp(0., 1.);
                    particle.prev_position = particle.prev_position.lerp(pushed, friction);
                }
            }
        }
    }

    fn write_pose(&self, output: &mut Pose, weight: f32) {
        for (index, particle) in self.particles.iter().enumerate() {
            if particle.is_anchor {
                continue;
            }

            let position = particle.target.lerp(particle.position, weight);
            let mut transform = output.model_space_transform(particle.joint);
            transform.translation = position;
            output.set_model_space_transform(particle.joint, transform);

            let Some(child) = self.particles.iter().find(|p| p.parent == Some(index)) else {
                continue;
            };
            let current = output.model_space_transform(child.joint).translation - position;
            let desired = child.target.lerp(child.position, weight) - position;
            if current.length_squared() <= f32::EPSILON || desired.length_squared() <= f32::EPSILON
            {
                continue;
            }
            transform.rotation =
                Quat::from_rotation_arc(current.normalize(), desired.normalize()) * transform.rotation;
            output.set_model_space_transform(particle.joint, transform);
        }
    }
}

fn nearest_particle_ancestor(
    skeleton: &crate::skeleton::Skeleton,
    joint: usize,
    particle_of_joint: &HashMap<usize, usize>,
) -> Option<usize> {
    let mut current = skeleton.parent(joint);
    while let Some(ancestor) = current {
        if let Some(particle) = particle_of_joint.get(&ancestor) {
            return Some(*particle);
        }
        current = skeleton.parent(ancestor);
    }
    None
}

fn new_particle(
    joint: usize,
    parent: Option<usize>,
    bind_pose: &Pose,
    config: SimulatedJoint,
) -> SpringParticle {
    let position = bind_pose.model_space_transform_direct(joint).translation;
    let inv_mass = if config.pinned || config.mass <= 0. {
        0.
    } else {
        1. / config.mass
    };
    SpringParticle {
        joint,
        parent,
        position,
        prev_position: position,
        inv_mass,
        config,
        is_anchor: false,
        target: position,
        prev_target: position,
    }
}
