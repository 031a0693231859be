//! Node implementations shipped with `bevy_blend_tree`.

use bevy::app::{App, Plugin};

use crate::{
    bind_pose_node::BindPoseNode,
    blend_n_node::{BlendNNode, BlendNParamWeight, EventMode},
    f32::const_f32::ConstF32,
    hub_node::HubNode,
    parameter_node::ParameterNode,
    pass_through_node::PassThroughNode,
    pose_source_node::{JointOverride, PoseSourceNode, TimedEvent},
    simulated_object_node::SimulatedObjectNode,
};

pub mod bind_pose_node;
pub mod blend_n_node;
pub mod f32;
pub mod hub_node;
pub mod parameter_node;
pub mod pass_through_node;
pub mod pose_source_node;
pub mod simulated_object_node;

#[cfg(test)]
mod tests;

pub struct BuiltinNodesPlugin;

impl Plugin for BuiltinNodesPlugin {
    fn build(&self, app: &mut App) {
        self.register_nodes(app);
        self.register_other(app);
    }
}

impl BuiltinNodesPlugin {
    /// Registers built-in node implementations
    fn register_nodes(&self, app: &mut App) {
        app //
            .register_type::<BlendNNode>()
            .register_type::<SimulatedObjectNode>()
            .register_type::<HubNode>()
            .register_type::<PassThroughNode>()
            .register_type::<BindPoseNode>()
            .register_type::<PoseSourceNode>()
            .register_type::<ParameterNode>()
            // f32
            .register_type::<ConstF32>();
    }

    fn register_other(&self, app: &mut App) {
        app //
            .register_type::<EventMode>()
            .register_type::<BlendNParamWeight>()
            .register_type::<JointOverride>()
            .register_type::<TimedEvent>();
    }
}
