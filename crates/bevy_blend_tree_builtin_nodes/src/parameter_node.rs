use bevy::prelude::*;
use bevy_blend_tree_core::{
    animation_node::{NodeLike, ReflectNodeLike},
    context::{node_context::NodeContext, spec_context::SpecContext},
    edge_data::{DataSpec, DataValue},
    errors::GraphError,
};
use serde::{Deserialize, Serialize};

/// Exposes an instance parameter as a data output. Missing parameters yield the default value
/// of the output type.
#[derive(Reflect, Clone, Debug, Default, Serialize, Deserialize)]
#[reflect(Default, NodeLike)]
#[type_path = "bevy_blend_tree::builtin_nodes"]
pub struct ParameterNode {
    pub parameter: String,
    pub spec: DataSpec,
}

impl ParameterNode {
    pub const OUTPUT: &'static str = "value";

    pub fn new(parameter: impl Into<String>, spec: DataSpec) -> Self {
        Self {
            parameter: parameter.into(),
            spec,
        }
    }

    fn read(&self, ctx: &NodeContext) -> Result<Option<DataValue>, GraphError> {
        match ctx.parameter(&self.parameter) {
            Some(value) if self.spec.accepts(value.spec()) => Ok(Some(value)),
            Some(value) => Err(GraphError::MismatchedDataType(
                format!("{:?}", self.spec),
                format!("{:?}", value.spec()),
            )),
            None => Ok(DataValue::default_from_spec(self.spec)),
        }
    }
}

impl NodeLike for ParameterNode {
    fn display_name(&self) -> String {
        format!("Parameter {}", self.parameter)
    }

    fn spec(&self, mut ctx: SpecContext) -> Result<(), GraphError> {
        ctx.add_output_data(Self::OUTPUT, self.spec);
        Ok(())
    }

    fn top_down_update(&self, ctx: &mut NodeContext, _: f32) -> Result<(), GraphError> {
        match self.read(ctx)? {
            Some(value) => ctx.set_output_value(0, value),
            None => Ok(()),
        }
    }
}
