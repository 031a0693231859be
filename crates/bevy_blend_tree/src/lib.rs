//! # Bevy Blend Tree
//!
//! **Bevy Blend Tree** evaluates runtime blend trees for skeletal animation in
//! [Bevy](https://bevyengine.org/).
//!
//! ## Overview
//!
//! A [`BlendTree`] is an immutable, shareable set of nodes connected through typed ports.
//! Each animated character owns a [`GraphInstance`] holding all per-character evaluation
//! state: node timing, flags, node-specific state such as spring solvers, and pooled pose
//! buffers. One tree can drive any number of instances.
//!
//! Every tick runs four phases over the tree, starting from its root:
//! 1. *top-down update*, where weights, play speeds and synchronization flow from the root to
//!    the leaves;
//! 2. *update*, where leaves advance their time and parents adopt the resulting timelines;
//! 3. *post-update*, where events and root motion are gathered and blended;
//! 4. *output*, where poses are produced and blended.
//!
//! The simplest way to drive trees is to add the [`BlendTreePlugin`] and spawn entities with a
//! [`BlendTreePlayer`], which ticks its instance every frame using [`Time`]:
//!
//! ```ignore
//!     let mut tree = BlendTree::new();
//!     let walk = tree.add_node("walk", PoseSourceNode::new(1.2))?;
//!     let run = tree.add_node("run", PoseSourceNode::new(0.8))?;
//!     let speed = tree.add_node("speed", ParameterNode::new("speed", DataSpec::F32))?;
//!     let blend = tree.add_node("locomotion", BlendNNode::new(SyncMode::ClipBased, EventMode::MostActive))?;
//!     tree.connect(walk, PoseSourceNode::OUT_POSE, blend, BlendNNode::IN_POSES[0])?;
//!     tree.connect(run, PoseSourceNode::OUT_POSE, blend, BlendNNode::IN_POSES[1])?;
//!     tree.connect(speed, ParameterNode::OUTPUT, blend, BlendNNode::IN_WEIGHT)?;
//!     tree.set_root(blend)?;
//!     tree.initialize();
//!
//!     commands.spawn(BlendTreePlayer::new(Arc::new(tree), actor)?);
//! ```
//!
//! ## Nodes
//!
//! The currently implemented nodes are:
//! - [`BlendNNode`]: Blends up to ten poses placed along a one-dimensional weight axis, with
//!   optional motion synchronization and event filtering.
//! - [`SimulatedObjectNode`]: Runs spring simulations for secondary motion (hair, tails,
//!   straps) on top of its input pose.
//! - [`HubNode`]: Routes one of several inputs to its output.
//! - [`PassThroughNode`]: Forwards its input.
//! - [`BindPoseNode`]: Outputs the actor's bind pose.
//! - [`PoseSourceNode`]: A looping motion source with a fixed pose, sync track, events and
//!   root motion.
//! - [`ParameterNode`]: Reads an instance parameter.
//! - [`ConstF32`]: Outputs a constant float.
//!
//! [`BlendTree`]: bevy_blend_tree_core::blend_tree::BlendTree
//! [`GraphInstance`]: bevy_blend_tree_core::graph_instance::GraphInstance
//! [`Time`]: bevy::time::Time
//! [`BlendNNode`]: bevy_blend_tree_builtin_nodes::blend_n_node::BlendNNode
//! [`SimulatedObjectNode`]: bevy_blend_tree_builtin_nodes::simulated_object_node::SimulatedObjectNode
//! [`HubNode`]: bevy_blend_tree_builtin_nodes::hub_node::HubNode
//! [`PassThroughNode`]: bevy_blend_tree_builtin_nodes::pass_through_node::PassThroughNode
//! [`BindPoseNode`]: bevy_blend_tree_builtin_nodes::bind_pose_node::BindPoseNode
//! [`PoseSourceNode`]: bevy_blend_tree_builtin_nodes::pose_source_node::PoseSourceNode
//! [`ParameterNode`]: bevy_blend_tree_builtin_nodes::parameter_node::ParameterNode
//! [`ConstF32`]: bevy_blend_tree_builtin_nodes::f32::const_f32::ConstF32

pub mod player;
pub mod plugin;
pub mod systems;

pub use bevy_blend_tree_builtin_nodes;
pub use bevy_blend_tree_core;

pub mod prelude {
    pub use bevy_blend_tree_builtin_nodes::{
        BuiltinNodesPlugin,
        bind_pose_node::BindPoseNode,
        blend_n_node::{BlendNNode, BlendNParamWeight, EventMode},
        f32::const_f32::ConstF32,
        hub_node::HubNode,
        parameter_node::ParameterNode,
        pass_through_node::PassThroughNode,
        pose_source_node::{JointOverride, PoseSourceNode},
        simulated_object_node::SimulatedObjectNode,
    };
    pub use bevy_blend_tree_core::prelude::*;
    pub use super::player::BlendTreePlayer;
    pub use super::plugin::BlendTreePlugin;
}
