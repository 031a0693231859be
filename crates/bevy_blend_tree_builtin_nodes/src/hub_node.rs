use bevy::prelude::*;
use bevy_blend_tree_core::{
    animation_node::{NodeLike, ReflectNodeLike},
    blend_tree::{BlendTree, NodeIndex},
    context::{node_context::NodeContext, spec_context::SpecContext},
    errors::{GraphError, GraphResult},
    graph_instance::GraphInstance,
};

pub const MAX_HUB_INPUTS: usize = 8;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HubState {
    pub selected: Option<usize>,
}

/// Routes one of several pose inputs to its output. Only the routed input is evaluated.
#[derive(Reflect, Clone, Debug, Default)]
#[reflect(Default, NodeLike)]
#[type_path = "bevy_blend_tree::builtin_nodes"]
pub struct HubNode;

impl HubNode {
    pub const IN_POSES: [&'static str; MAX_HUB_INPUTS] = [
        "pose_0", "pose_1", "pose_2", "pose_3", "pose_4", "pose_5", "pose_6", "pose_7",
    ];
    pub const OUT_POSE: &'static str = "pose";

    pub fn new() -> Self {
        Self
    }

    /// Selects the input port routed by the hub `node` of `instance`. `None` falls back to
    /// the first connected input.
    pub fn set_selected_source(
        instance: &mut GraphInstance,
        tree: &BlendTree,
        node: NodeIndex,
        port: Option<usize>,
    ) -> GraphResult<()> {
        instance
            .node_state_mut_or_insert_with(tree, node, HubState::default)?
            .selected = port;
        Ok(())
    }

    /// Port currently routed: the selected one when connected, otherwise the first connected.
    fn routed_port(ctx: &NodeContext) -> Option<usize> {
        let selected = ctx
            .state::<HubState>()
            .and_then(|state| state.selected)
            .filter(|port| ctx.is_connected(*port));
        selected.or_else(|| (0..MAX_HUB_INPUTS).find(|port| ctx.is_connected(*port)))
    }
}

impl NodeLike for HubNode {
    fn display_name(&self) -> String {
        "Hub".into()
    }

    fn spec(&self, mut ctx: SpecContext) -> Result<(), GraphError> {
        for name in Self::IN_POSES {
            ctx.add_input_pose(name);
        }
        ctx.add_output_pose(Self::OUT_POSE);
        Ok(())
    }

    fn top_down_update(&self, ctx: &mut NodeContext, delta_time: f32) -> Result<(), GraphError> {
        if !ctx.is_enabled() {
            return Ok(());
        }
        let Some(source) = Self::routed_port(ctx).and_then(|port| ctx.source(port)) else {
            return Ok(());
        };
        let (global_weight, play_speed) = {
            let data = ctx.data_mut()?;
            (data.global_weight, data.play_speed)
        };
        let data = ctx.node_data_mut(source)?;
        data.global_weight = global_weight;
        data.local_weight = 1.;
        data.play_speed = play_speed;
        ctx.top_down_node(source, delta_time)
    }

    fn update(&self, ctx: &mut NodeContext, delta_time: f32) -> Result<(), GraphError> {
        let Some(source) = Self::routed_port(ctx)
            .and_then(|port| ctx.source(port))
            .filter(|_| ctx.is_enabled())
        else {
            ctx.data_mut()?.clear();
            return Ok(());
        };
        ctx.update_node(source, delta_time)?;
        ctx.copy_timing_from(source)
    }

    fn post_update(&self, ctx: &mut NodeContext, delta_time: f32) -> Result<(), GraphError> {
        let Some(port) = Self::routed_port(ctx).filter(|_| ctx.is_enabled()) else {
            ctx.output_empty_ref_data();
            return Ok(());
        };
        ctx.post_update_input(port, delta_time)?;

        let mut ref_data = ctx.request_ref_data();
        if let Some(input) = ctx.input_ref_data(port) {
            ref_data.events.copy_from(&input.events);
            ref_data.copy_trajectory_from(input);
        }
        ctx.set_output_ref_data(ref_data);
        Ok(())
    }

    fn output(&self, ctx: &mut NodeContext) -> Result<(), GraphError> {
        let Some(port) = Self::routed_port(ctx).filter(|_| ctx.is_enabled()) else {
            ctx.output_bind_pose();
            return Ok(());
        };
        ctx.output_input(port)?;
        ctx.output_input_pose_copy(port);
        Ok(())
    }
}
