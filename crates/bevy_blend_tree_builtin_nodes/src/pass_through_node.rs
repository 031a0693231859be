use bevy::prelude::*;
use bevy_blend_tree_core::{
    animation_node::{NodeLike, ReflectNodeLike},
    context::spec_context::SpecContext,
    errors::GraphError,
};

#[derive(Reflect, Clone, Debug, Default)]
#[reflect(Default, NodeLike)]
#[type_path = "bevy_blend_tree::builtin_nodes"]
pub struct PassThroughNode;

impl PassThroughNode {
    pub const IN_POSE: &'static str = "pose";
    pub const OUT_POSE: &'static str = "pose";

    pub fn new() -> Self {
        Self
    }
}

impl NodeLike for PassThroughNode {
    fn display_name(&self) -> String {
        "Pass Through".into()
    }

    fn spec(&self, mut ctx: SpecContext) -> Result<(), GraphError> {
        ctx.add_input_pose(Self::IN_POSE)
            .add_output_pose(Self::OUT_POSE);
        Ok(())
    }
}
