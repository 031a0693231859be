use bevy::prelude::*;
use bevy_blend_tree_core::{
    actor::Actor,
    animation_node::{NodeLike, ReflectNodeLike},
    blend_tree::NodeIndex,
    context::{node_context::NodeContext, spec_context::SpecContext},
    edge_data::DataSpec,
    errors::GraphError,
    graph_instance::GraphInstance,
    spring_solver::{InitSettings, SpringParticle, SpringSolver},
    unique_data::NodeFlags,
};
use serde::{Deserialize, Serialize};

pub const MIN_UPDATE_RATE: f32 = 10.;
pub const MAX_UPDATE_RATE: f32 = 150.;
pub const MIN_NUM_ITERATIONS: usize = 1;
pub const MAX_NUM_ITERATIONS: usize = 10;

/// Runs spring simulations for a set of the actor's simulated objects on top of the input pose.
#[derive(Reflect, Clone, Debug, Serialize, Deserialize)]
#[reflect(Default, NodeLike)]
#[type_path = "bevy_blend_tree::builtin_nodes"]
#[serde(default)]
pub struct SimulatedObjectNode {
    /// Names of simulated objects in the actor's setup
    pub simulated_object_names: Vec<String>,
    pub stiffness_factor: f32,
    pub gravity_factor: f32,
    pub damping_factor: f32,
    /// Simulation steps per second
    pub update_rate: f32,
    pub num_iterations: usize,
    pub collision_detection: bool,
}

impl Default for SimulatedObjectNode {
    fn default() -> Self {
        Self {
            simulated_object_names: Vec::new(),
            stiffness_factor: 1.,
            gravity_factor: 1.,
            damping_factor: 1.,
            update_rate: 60.,
            num_iterations: 2,
            collision_detection: true,
        }
    }
}

#[derive(Debug)]
pub struct Simulation {
    pub simulated_object_name: String,
    pub solver: SpringSolver,
}

#[derive(Debug)]
pub struct SimulatedObjectState {
    pub simulations: Vec<Simulation>,
    /// Solvers are (re)built on the next output
    pub must_update: bool,
    pub is_valid: bool,
    /// Time accumulated since the last output
    pub time_passed: f32,
}

impl Default for SimulatedObjectState {
    fn default() -> Self {
        Self {
            simulations: Vec::new(),
            must_update: true,
            is_valid: false,
            time_passed: 0.,
        }
    }
}

impl SimulatedObjectNode {
    pub const IN_POSE: &'static str = "pose";
    pub const IN_STIFFNESS_FACTOR: &'static str = "stiffness_factor";
    pub const IN_GRAVITY_FACTOR: &'static str = "gravity_factor";
    pub const IN_DAMPING_FACTOR: &'static str = "damping_factor";
    pub const IN_WEIGHT: &'static str = "weight";
    pub const OUT_POSE: &'static str = "pose";

    const POSE_PORT: usize = 0;
    const STIFFNESS_PORT: usize = 1;
    const GRAVITY_PORT: usize = 2;
    const DAMPING_PORT: usize = 3;
    const WEIGHT_PORT: usize = 4;

    pub fn new(simulated_object_names: Vec<String>) -> Self {
        Self {
            simulated_object_names,
            ..default()
        }
    }

    pub fn clamped_update_rate(&self) -> f32 {
        self.update_rate.clamp(MIN_UPDATE_RATE, MAX_UPDATE_RATE)
    }

    pub fn clamped_num_iterations(&self) -> usize {
        self.num_iterations
            .clamp(MIN_NUM_ITERATIONS, MAX_NUM_ITERATIONS)
    }

    /// Rebuilds one solver per simulated object of the setup named by this node, in setup order.
    /// Unknown names and objects that fail to initialize are skipped. Returns false when the
    /// actor has no simulated object setup.
    fn init_solvers(&self, state: &mut SimulatedObjectState, actor: &Actor, node_name: &str) -> bool {
        state.simulations.clear();
        state.time_passed = 0.;

        let Some(setup) = actor.simulated_object_setup() else {
            warn!("[{node_name}] actor {:?} has no simulated object setup", actor.name());
            return false;
        };

        for name in &self.simulated_object_names {
            if setup.find_by_name(name).is_none() {
                warn!("[{node_name}] unknown simulated object {name:?}");
            }
        }

        for object in setup
            .iter()
            .filter(|object| self.simulated_object_names.contains(&object.name))
        {
            let mut solver = SpringSolver::default();
            let settings = InitSettings {
                actor,
                simulated_object: object,
                collider_tags: &object.collider_tags,
                name: node_name,
            };
            if let Err(error) = solver.init(settings) {
                warn!("{error}");
                continue;
            }
            solver.set_fixed_time_step(1. / self.clamped_update_rate());
            solver.set_num_iterations(self.clamped_num_iterations());
            solver.set_collision_enabled(self.collision_detection);

            state.simulations.push(Simulation {
                simulated_object_name: object.name.clone(),
                solver,
            });
        }
        true
    }

    fn factor(&self, ctx: &NodeContext, port: usize, fallback: f32) -> Result<f32, GraphError> {
        Ok(ctx.input_f32(port)?.unwrap_or(fallback))
    }

    /// Applies `f` to every particle of this node's solvers in each of `instances`.
    pub fn adjust_particles<'a>(
        instances: impl IntoIterator<Item = &'a mut GraphInstance>,
        node: NodeIndex,
        mut f: impl FnMut(&mut SpringParticle),
    ) {
        Self::for_each_state(instances, node, |state| {
            for simulation in state.simulations.iter_mut() {
                simulation.solver.adjust_particles(&mut f);
            }
        });
    }

    pub fn on_num_iterations_changed<'a>(
        &self,
        instances: impl IntoIterator<Item = &'a mut GraphInstance>,
        node: NodeIndex,
    ) {
        let num_iterations = self.clamped_num_iterations();
        Self::for_each_state(instances, node, |state| {
            for simulation in state.simulations.iter_mut() {
                simulation.solver.set_num_iterations(num_iterations);
            }
        });
    }

    pub fn on_update_rate_changed<'a>(
        &self,
        instances: impl IntoIterator<Item = &'a mut GraphInstance>,
        node: NodeIndex,
    ) {
        let time_step = 1. / self.clamped_update_rate();
        Self::for_each_state(instances, node, |state| {
            for simulation in state.simulations.iter_mut() {
                simulation.solver.set_fixed_time_step(time_step);
            }
        });
    }

    /// Marks the solvers of every instance for a rebuild, e.g. after editing the
    /// simulated object setup.
    pub fn reinit<'a>(instances: impl IntoIterator<Item = &'a mut GraphInstance>, node: NodeIndex) {
        Self::for_each_state(instances, node, |state| state.must_update = true);
    }

    fn for_each_state<'a>(
        instances: impl IntoIterator<Item = &'a mut GraphInstance>,
        node: NodeIndex,
        mut f: impl FnMut(&mut SimulatedObjectState),
    ) {
        for instance in instances {
            if let Some(state) = instance.node_state_mut::<SimulatedObjectState>(node) {
                f(state);
            }
        }
    }
}

impl NodeLike for SimulatedObjectNode {
    fn display_name(&self) -> String {
        "Simulated Object".into()
    }

    fn spec(&self, mut ctx: SpecContext) -> Result<(), GraphError> {
        ctx.add_input_pose(Self::IN_POSE)
            .add_input_data(Self::IN_STIFFNESS_FACTOR, DataSpec::F32)
            .add_input_data(Self::IN_GRAVITY_FACTOR, DataSpec::F32)
            .add_input_data(Self::IN_DAMPING_FACTOR, DataSpec::F32)
            .add_input_data(Self::IN_WEIGHT, DataSpec::F32)
            .add_output_pose(Self::OUT_POSE);
        Ok(())
    }

    fn top_down_update(&self, ctx: &mut NodeContext, delta_time: f32) -> Result<(), GraphError> {
        if !ctx.is_enabled() {
            return ctx.top_down_input(Self::POSE_PORT, delta_time);
        }
        ctx.default_top_down_update(delta_time)
    }

    fn update(&self, ctx: &mut NodeContext, delta_time: f32) -> Result<(), GraphError> {
        if !ctx.is_enabled() {
            ctx.update_input(Self::POSE_PORT, delta_time)?;
            return match ctx.source(Self::POSE_PORT) {
                Some(source) => ctx.copy_timing_from(source),
                None => Ok(()),
            };
        }
        ctx.default_update(delta_time)?;
        ctx.state_mut_or_insert_with(SimulatedObjectState::default)?
            .time_passed += delta_time;
        Ok(())
    }

    fn post_update(&self, ctx: &mut NodeContext, delta_time: f32) -> Result<(), GraphError> {
        if !ctx.is_enabled() {
            ctx.post_update_input(Self::POSE_PORT, delta_time)?;
            let mut ref_data = ctx.request_ref_data();
            if let Some(input) = ctx.input_ref_data(Self::POSE_PORT) {
                ref_data.events.copy_from(&input.events);
                ref_data.copy_trajectory_from(input);
            }
            ctx.set_output_ref_data(ref_data);
            return Ok(());
        }
        ctx.default_post_update(delta_time)
    }

    fn output(&self, ctx: &mut NodeContext) -> Result<(), GraphError> {
        // Disabled nodes forward their input pose and leave the solvers untouched.
        if !ctx.is_enabled() {
            ctx.output_input(Self::POSE_PORT)?;
            ctx.output_input_pose_copy(Self::POSE_PORT);
            return Ok(());
        }
        for port in 0..=Self::WEIGHT_PORT {
            ctx.output_input(port)?;
        }
        if !ctx.is_connected(Self::POSE_PORT) {
            ctx.output_bind_pose();
            return Ok(());
        }

        let stiffness = self.factor(ctx, Self::STIFFNESS_PORT, self.stiffness_factor)?;
        let gravity = self.factor(ctx, Self::GRAVITY_PORT, self.gravity_factor)?;
        let damping = self.factor(ctx, Self::DAMPING_PORT, self.damping_factor)?;
        let weight = self.factor(ctx, Self::WEIGHT_PORT, 1.)?.clamp(0., 1.);

        let actor = ctx.actor();
        let node_name = ctx.name();
        let mut output = ctx.request_pose();

        let is_valid = {
            let (state, input) =
                ctx.state_and_input_pose(Self::POSE_PORT, SimulatedObjectState::default)?;
            match input {
                None => {
                    output.init_from_bind_pose(&actor);
                    true
                }
                Some(input) => {
                    output.init_from_pose(input);
                    if state.must_update {
                        let is_valid = self.init_solvers(state, &actor, node_name);
                        state.is_valid = is_valid;
                        state.must_update = false;
                    }

                    let time_passed = std::mem::take(&mut state.time_passed);
                    if state.is_valid {
                        for simulation in state.simulations.iter_mut() {
                            let solver = &mut simulation.solver;
                            solver.set_stiffness_factor(stiffness);
                            solver.set_gravity_factor(gravity);
                            solver.set_damping_factor(damping);
                            solver.set_collision_enabled(self.collision_detection);
                            solver.update(input, &mut output, time_passed, weight);
                        }
                    }
                    state.is_valid
                }
            }
        };

        ctx.set_flag(NodeFlags::HAS_ERROR, !is_valid)?;
        ctx.set_output_pose(output);
        Ok(())
    }

    fn rewind(&self, ctx: &mut NodeContext) -> Result<(), GraphError> {
        ctx.default_rewind()?;
        let state = ctx.state_mut_or_insert_with(SimulatedObjectState::default)?;
        state.time_passed = 0.;
        for simulation in state.simulations.iter_mut() {
            simulation.solver.stabilize();
        }
        Ok(())
    }
}
