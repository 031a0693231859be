use std::sync::Arc;

use bevy::prelude::*;

use crate::{
    actor::Actor,
    animation_node::NodeLike,
    context::{node_context::NodeContext, spec_context::SpecContext},
    edge_data::DataSpec,
    errors::GraphError,
    skeleton::Skeleton,
};

/// Chain of `num_joints` joints, each offset one unit along Y from its parent.
pub fn chain_actor(num_joints: usize) -> Arc<Actor> {
    let skeleton = Arc::new(Skeleton::chain(num_joints));
    let bind = (0..num_joints)
        .map(|i| {
            if i == 0 {
                Transform::IDENTITY
            } else {
                Transform::from_xyz(0., 1., 0.)
            }
        })
        .collect();
    Arc::new(Actor::new("chain", skeleton, bind).unwrap())
}

#[derive(Reflect, Clone, Debug, Default)]
pub struct TestPass;

impl NodeLike for TestPass {
    fn spec(&self, mut ctx: SpecContext) -> Result<(), GraphError> {
        ctx.add_input_pose("pose").add_output_pose("pose");
        Ok(())
    }

    fn display_name(&self) -> String {
        "Test pass".into()
    }
}

#[derive(Reflect, Clone, Debug, Default)]
pub struct TestValue(pub f32);

impl NodeLike for TestValue {
    fn spec(&self, mut ctx: SpecContext) -> Result<(), GraphError> {
        ctx.add_output_data("value", DataSpec::F32);
        Ok(())
    }

    fn display_name(&self) -> String {
        "Test value".into()
    }

    fn top_down_update(&self, ctx: &mut NodeContext, _: f32) -> Result<(), GraphError> {
        ctx.set_output_value(0, self.0)
    }
}

/// Pose node with a float input, recording what it read and how often it was notified.
#[derive(Reflect, Clone, Debug, Default)]
pub struct TestReader {
    pub init_calls: usize,
    pub notifications: usize,
}

impl NodeLike for TestReader {
    fn spec(&self, mut ctx: SpecContext) -> Result<(), GraphError> {
        ctx.add_input_pose("pose")
            .add_input_data("amount", DataSpec::F32)
            .add_output_pose("pose");
        Ok(())
    }

    fn display_name(&self) -> String {
        "Test reader".into()
    }

    fn update(&self, ctx: &mut NodeContext, delta_time: f32) -> Result<(), GraphError> {
        ctx.default_update(delta_time)?;
        let amount = ctx.input_f32(1)?.unwrap_or_default();
        *ctx.state_mut_or_insert_with(|| 0.0_f32)? = amount;
        Ok(())
    }

    fn on_init(&mut self, _: &[bool]) {
        self.init_calls += 1;
    }

    fn on_connections_changed(&mut self, _: &[bool]) {
        self.notifications += 1;
    }
}
