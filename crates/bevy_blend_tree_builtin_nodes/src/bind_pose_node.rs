use bevy::prelude::*;
use bevy_blend_tree_core::{
    animation_node::{NodeLike, ReflectNodeLike},
    context::{node_context::NodeContext, spec_context::SpecContext},
    errors::GraphError,
};

#[derive(Reflect, Clone, Debug, Default)]
#[reflect(Default, NodeLike)]
#[type_path = "bevy_blend_tree::builtin_nodes"]
pub struct BindPoseNode;

impl BindPoseNode {
    pub const OUT_POSE: &'static str = "pose";

    pub fn new() -> Self {
        Self
    }
}

impl NodeLike for BindPoseNode {
    fn display_name(&self) -> String {
        "Bind Pose".into()
    }

    fn spec(&self, mut ctx: SpecContext) -> Result<(), GraphError> {
        ctx.add_output_pose(Self::OUT_POSE);
        Ok(())
    }

    fn output(&self, ctx: &mut NodeContext) -> Result<(), GraphError> {
        ctx.output_bind_pose();
        Ok(())
    }
}
