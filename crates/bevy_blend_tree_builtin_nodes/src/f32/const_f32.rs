use bevy::prelude::*;
use bevy_blend_tree_core::{
    animation_node::{NodeLike, ReflectNodeLike},
    context::{node_context::NodeContext, spec_context::SpecContext},
    edge_data::DataSpec,
    errors::GraphError,
};
use serde::{Deserialize, Serialize};

#[derive(Reflect, Clone, Debug, Default, Serialize, Deserialize)]
#[reflect(Default, NodeLike)]
#[type_path = "bevy_blend_tree::builtin_nodes"]
pub struct ConstF32 {
    pub constant: f32,
}

impl ConstF32 {
    pub const OUTPUT: &'static str = "out";

    pub fn new(constant: f32) -> Self {
        Self { constant }
    }
}

impl NodeLike for ConstF32 {
    fn display_name(&self) -> String {
        "F32".into()
    }

    fn top_down_update(&self, ctx: &mut NodeContext, _: f32) -> Result<(), GraphError> {
        ctx.set_output_value(0, self.constant)
    }

    fn spec(&self, mut ctx: SpecContext) -> Result<(), GraphError> {
        ctx.add_output_data(Self::OUTPUT, DataSpec::F32);

        Ok(())
    }
}
