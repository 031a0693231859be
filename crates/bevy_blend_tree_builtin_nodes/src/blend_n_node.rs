use bevy::prelude::*;
use bevy_blend_tree_core::{
    animation_node::{NodeLike, ReflectNodeLike},
    blend_tree::NodeIndex,
    context::{node_context::NodeContext, spec_context::SpecContext},
    edge_data::{DataSpec, events::EventBuffer},
    errors::GraphError,
    interpolation::{is_full_weight, is_zero_weight},
    ref_data::RefData,
    sync::{SyncMode, calc_sync_factors},
    unique_data::NodeFlags,
};
use serde::{Deserialize, Serialize};

/// Number of pose inputs of a [`BlendNNode`].
pub const MAX_POSE_INPUTS: usize = 10;

/// Which inputs contribute events to the output of a blend.
#[derive(Reflect, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[reflect(Default)]
pub enum EventMode {
    /// Only the primary (lower bracket) input
    PrimaryOnly,
    /// Only the secondary (upper bracket) input, falling back to the primary
    SecondaryOnly,
    Both,
    /// Whichever input has the larger blend weight
    #[default]
    MostActive,
    None,
}

/// Weight value at which a pose input is fully active.
#[derive(Reflect, Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BlendNParamWeight {
    pub port: usize,
    pub weight_range: f32,
}

impl BlendNParamWeight {
    pub fn new(port: usize, weight_range: f32) -> Self {
        Self { port, weight_range }
    }
}

/// The two pose ports a weight falls between, and the fraction from the first to the second.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlendSelection {
    pub port_a: usize,
    pub port_b: usize,
    pub weight: f32,
}

impl BlendSelection {
    fn single(port: usize) -> Self {
        Self {
            port_a: port,
            port_b: port,
            weight: 0.,
        }
    }
}

/// Finds the bracket of `param_weights` (ascending by weight range) containing `weight`.
///
/// Weights at or outside the ends collapse onto the extreme port with a weight of zero, as do
/// weights within epsilon of the ends of the first and last bracket.
pub fn select_blend_ports(
    param_weights: &[BlendNParamWeight],
    weight: f32,
) -> Option<BlendSelection> {
    let first = param_weights.first()?;
    let last = param_weights.last()?;
    if weight <= first.weight_range {
        return Some(BlendSelection::single(first.port));
    }

    let count = param_weights.len();
    for i in 1..count {
        let lower = param_weights[i - 1];
        let upper = param_weights[i];
        if weight > upper.weight_range {
            continue;
        }

        let span = upper.weight_range - lower.weight_range;
        let fraction = if span > f32::EPSILON {
            (weight - lower.weight_range) / span
        } else {
            0.
        };

        if i == 1 && is_zero_weight(fraction) {
            return Some(BlendSelection::single(first.port));
        }
        if i == count - 1 && is_full_weight(fraction) {
            return Some(BlendSelection::single(last.port));
        }
        return Some(BlendSelection {
            port_a: lower.port,
            port_b: upper.port,
            weight: fraction,
        });
    }

    Some(BlendSelection::single(last.port))
}

/// A [`BlendSelection`] resolved to the nodes connected to the selected ports.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlendCandidates {
    pub port_a: usize,
    pub port_b: usize,
    pub node_a: NodeIndex,
    pub node_b: Option<NodeIndex>,
    pub weight: f32,
}

impl BlendCandidates {
    /// Whether only one distinct source is involved.
    pub fn is_single(&self) -> bool {
        self.node_b.is_none_or(|b| b == self.node_a)
    }

    /// The secondary source, when different from the primary one.
    pub fn distinct_b(&self) -> Option<NodeIndex> {
        self.node_b.filter(|b| *b != self.node_a)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct BlendNState {
    /// Pose ports selected during the last synchronized top-down update
    pub ports: Option<(usize, usize)>,
}

/// Blends between up to ten poses placed along a one-dimensional weight axis.
///
/// Each connected pose input is assigned a weight range value. The value of the `weight`
/// input selects the two neighbouring poses on that axis and how far to blend between them.
#[derive(Reflect, Clone, Debug, Default, Serialize, Deserialize)]
#[reflect(Default, NodeLike)]
#[type_path = "bevy_blend_tree::builtin_nodes"]
pub struct BlendNNode {
    pub sync_mode: SyncMode,
    pub event_mode: EventMode,
    /// Ordered by port, with ascending weight ranges
    pub param_weights: Vec<BlendNParamWeight>,
}

impl BlendNNode {
    pub const IN_POSES: [&'static str; MAX_POSE_INPUTS] = [
        "pose_0", "pose_1", "pose_2", "pose_3", "pose_4", "pose_5", "pose_6", "pose_7", "pose_8",
        "pose_9",
    ];
    pub const IN_WEIGHT: &'static str = "weight";
    pub const OUT_POSE: &'static str = "pose";

    pub const WEIGHT_PORT: usize = MAX_POSE_INPUTS;

    pub fn new(sync_mode: SyncMode, event_mode: EventMode) -> Self {
        Self {
            sync_mode,
            event_mode,
            param_weights: Vec::new(),
        }
    }

    pub fn with_param_weights(mut self, param_weights: Vec<BlendNParamWeight>) -> Self {
        self.param_weights = param_weights;
        self
    }

    /// Spreads the weight ranges of the current entries evenly over `[min, max]`.
    pub fn set_param_weights_equally_distributed(&mut self, min: f32, max: f32) {
        let count = self.param_weights.len();
        if count == 0 {
            return;
        }
        let step = if count > 1 {
            (max - min) / (count - 1) as f32
        } else {
            0.
        };
        let mut weight_range = min;
        for param_weight in self.param_weights[..count - 1].iter_mut() {
            param_weight.weight_range = weight_range;
            weight_range += step;
        }
        self.param_weights[count - 1].weight_range = max;
    }

    /// Rebuilds the entries from the connected pose ports. Existing entries keep their
    /// ranges; new ones are spread evenly between the existing entries around them.
    pub fn update_param_weights(&mut self, connected: &[bool]) {
        let previous: Vec<_> = std::mem::take(&mut self.param_weights);
        let mut pending_defaults = 0;
        let mut last_existing: Option<f32> = None;

        for port in (0..MAX_POSE_INPUTS).filter(|port| connected.get(*port).copied().unwrap_or(false)) {
            match previous.iter().find(|entry| entry.port == port) {
                None => {
                    let default = self
                        .param_weights
                        .last()
                        .map(|entry| entry.weight_range)
                        .unwrap_or(0.);
                    self.param_weights
                        .push(BlendNParamWeight::new(port, default));
                    pending_defaults += 1;
                }
                Some(existing) => {
                    let value = existing.weight_range;
                    self.param_weights
                        .push(BlendNParamWeight::new(port, value));

                    let step = last_existing
                        .map(|last| (value - last) / (pending_defaults + 1) as f32)
                        .unwrap_or(0.);
                    let len = self.param_weights.len();
                    let mut weight_range = value;
                    for i in 1..=pending_defaults {
                        weight_range -= step;
                        self.param_weights[len - 1 - i].weight_range = weight_range;
                    }
                    pending_defaults = 0;
                    last_existing = Some(value);
                }
            }
        }
    }

    /// Evenly distributed ranges over `[0, 1]` for every connected pose port.
    fn init_default_param_weights(&mut self, connected: &[bool]) {
        self.param_weights = (0..MAX_POSE_INPUTS)
            .filter(|port| connected.get(*port).copied().unwrap_or(false))
            .enumerate()
            .map(|(i, port)| BlendNParamWeight::new(port, i as f32))
            .collect();

        let max = self
            .param_weights
            .last()
            .map(|entry| entry.weight_range)
            .unwrap_or(0.);
        if max > f32::EPSILON {
            for entry in self.param_weights.iter_mut() {
                entry.weight_range /= max;
            }
        }
    }

    /// Current blend weight: the `weight` input when enabled and connected, otherwise the
    /// first weight range (selecting the first pose).
    fn blend_weight(&self, ctx: &NodeContext) -> Result<Option<f32>, GraphError> {
        let Some(first) = self.param_weights.first() else {
            return Ok(None);
        };
        let mut weight = first.weight_range;
        if ctx.is_enabled()
            && let Some(value) = ctx.input_f32(Self::WEIGHT_PORT)?
        {
            weight = value;
        }
        Ok(Some(weight))
    }

    pub fn find_blend_nodes(&self, ctx: &NodeContext) -> Result<Option<BlendCandidates>, GraphError> {
        let Some(weight) = self.blend_weight(ctx)? else {
            return Ok(None);
        };
        let Some(selection) = select_blend_ports(&self.param_weights, weight) else {
            return Ok(None);
        };
        let Some(node_a) = ctx.source(selection.port_a) else {
            return Ok(None);
        };
        Ok(Some(BlendCandidates {
            port_a: selection.port_a,
            port_b: selection.port_b,
            node_a,
            node_b: ctx.source(selection.port_b),
            weight: selection.weight,
        }))
    }

    /// Syncs the primary input to this node and every other connected input to the primary.
    fn sync_motions(
        &self,
        ctx: &mut NodeContext,
        candidates: &BlendCandidates,
    ) -> Result<(), GraphError> {
        let Some(node_b) = candidates.node_b else {
            return Ok(());
        };
        let this = ctx.node_index();
        let node_a = candidates.node_a;
        let ports = Some((candidates.port_a, candidates.port_b));

        let state = ctx.state_mut_or_insert_with(BlendNState::default)?;
        let resync = state.ports != ports;
        state.ports = ports;

        if resync {
            ctx.set_flag_recursive(node_a, NodeFlags::RESYNC, true)?;
        }
        ctx.auto_sync(this, node_a, 0., SyncMode::TrackBased, resync)?;

        let synced = ctx.has_flag(NodeFlags::SYNCED);
        for port in 0..MAX_POSE_INPUTS {
            let Some(source) = ctx.source(port) else {
                continue;
            };
            if !synced {
                ctx.set_flag_recursive(source, NodeFlags::SYNCED, true)?;
            }
            if source == node_a {
                continue;
            }
            if resync {
                ctx.set_flag_recursive(source, NodeFlags::RESYNC, true)?;
            }
            ctx.auto_sync(node_a, source, candidates.weight, self.sync_mode, resync)?;
        }

        // `auto_sync` only retimes followers. The leader's speed is scaled here by its own
        // factor so both inputs advance at the same normalized rate.
        if node_b != node_a {
            let (Some(a), Some(b)) = (ctx.node_data(node_a), ctx.node_data(node_b)) else {
                return Ok(());
            };
            let factors = calc_sync_factors(
                a.play_speed,
                a.duration,
                b.play_speed,
                b.duration,
                self.sync_mode,
                candidates.weight,
            );
            ctx.node_data_mut(node_a)?.play_speed *= factors.leader;
        }
        Ok(())
    }

    fn filter_events(
        &self,
        a: Option<&RefData>,
        b: Option<&RefData>,
        weight: f32,
        out: &mut EventBuffer,
    ) {
        let (weight_a, weight_b) = if b.is_some() {
            (1. - weight, weight)
        } else {
            (1., 0.)
        };
        let mut take = |source: Option<&RefData>, source_weight: f32| {
            if let Some(source) = source {
                out.extend_weighted(&source.events, source_weight);
            }
        };

        match self.event_mode {
            EventMode::PrimaryOnly => take(a, weight_a),
            EventMode::SecondaryOnly => match b {
                Some(_) => take(b, weight_b),
                None => take(a, weight_a),
            },
            EventMode::Both => {
                take(a, weight_a);
                take(b, weight_b);
            }
            EventMode::MostActive => {
                if b.is_some() && weight >= 0.5 {
                    take(b, weight_b);
                } else {
                    take(a, weight_a);
                }
            }
            EventMode::None => {}
        }
    }
}

impl NodeLike for BlendNNode {
    fn display_name(&self) -> String {
        "Blend N".into()
    }

    fn spec(&self, mut ctx: SpecContext) -> Result<(), GraphError> {
        for name in Self::IN_POSES {
            ctx.add_input_pose(name);
        }
        ctx.add_input_data(Self::IN_WEIGHT, DataSpec::F32)
            .add_output_pose(Self::OUT_POSE);
        Ok(())
    }

    fn on_init(&mut self, connected: &[bool]) {
        if self.param_weights.is_empty() {
            self.init_default_param_weights(connected);
        } else {
            self.update_param_weights(connected);
        }
    }

    fn on_connections_changed(&mut self, connected: &[bool]) {
        self.update_param_weights(connected);
    }

    fn top_down_update(&self, ctx: &mut NodeContext, delta_time: f32) -> Result<(), GraphError> {
        if !ctx.is_enabled() {
            return Ok(());
        }
        let (global_weight, play_speed) = {
            let data = ctx.data_mut()?;
            (data.global_weight, data.play_speed)
        };

        if let Some(weight_source) = ctx.source(Self::WEIGHT_PORT) {
            ctx.node_data_mut(weight_source)?.global_weight = global_weight;
            ctx.top_down_node(weight_source, delta_time)?;
        }

        let Some(candidates) = self.find_blend_nodes(ctx)? else {
            return Ok(());
        };
        let weight = candidates.weight;

        if self.sync_mode != SyncMode::Disabled {
            self.sync_motions(ctx, &candidates)?;
        } else {
            for node in [Some(candidates.node_a), candidates.node_b]
                .into_iter()
                .flatten()
            {
                let data = ctx.node_data_mut(node)?;
                data.play_speed = play_speed;
                if data.has_flag(NodeFlags::SYNCED) {
                    ctx.set_flag_recursive(node, NodeFlags::SYNCED, false)?;
                }
            }
        }

        let data_a = ctx.node_data_mut(candidates.node_a)?;
        data_a.global_weight = global_weight * (1. - weight);
        data_a.local_weight = 1. - weight;
        if let Some(node_b) = candidates.node_b {
            let data_b = ctx.node_data_mut(node_b)?;
            data_b.global_weight = global_weight * weight;
            data_b.local_weight = weight;
        }
        if candidates.node_b == Some(candidates.node_a) {
            let data_a = ctx.node_data_mut(candidates.node_a)?;
            if is_zero_weight(weight) {
                data_a.global_weight = global_weight;
                data_a.local_weight = 1.;
            } else if is_full_weight(weight) {
                data_a.global_weight = 0.;
                data_a.local_weight = 0.;
            }
        }

        ctx.top_down_node(candidates.node_a, delta_time)?;
        if let Some(node_b) = candidates.distinct_b() {
            ctx.top_down_node(node_b, delta_time)?;
        }
        Ok(())
    }

    fn update(&self, ctx: &mut NodeContext, delta_time: f32) -> Result<(), GraphError> {
        if !ctx.is_enabled() {
            ctx.data_mut()?.clear();
            return Ok(());
        }
        ctx.update_input(Self::WEIGHT_PORT, delta_time)?;

        let Some(candidates) = self.find_blend_nodes(ctx)? else {
            ctx.data_mut()?.clear();
            return Ok(());
        };
        ctx.update_node(candidates.node_a, delta_time)?;
        if let Some(node_b) = candidates.distinct_b() {
            ctx.update_node(node_b, delta_time)?;
        }

        ctx.copy_timing_from(candidates.node_a)?;
        let factors = {
            let a = ctx
                .node_data(candidates.node_a)
                .ok_or(GraphError::MissingNode(candidates.node_a))?;
            let b = candidates
                .node_b
                .and_then(|node| ctx.node_data(node))
                .unwrap_or(a);
            calc_sync_factors(
                a.play_speed,
                a.duration,
                b.play_speed,
                b.duration,
                self.sync_mode,
                candidates.weight,
            )
        };
        ctx.data_mut()?.play_speed = factors.play_speed * factors.leader;
        Ok(())
    }

    fn post_update(&self, ctx: &mut NodeContext, delta_time: f32) -> Result<(), GraphError> {
        if !ctx.is_enabled() {
            ctx.output_empty_ref_data();
            return Ok(());
        }
        ctx.post_update_input(Self::WEIGHT_PORT, delta_time)?;

        let Some(candidates) = self.find_blend_nodes(ctx)? else {
            ctx.output_empty_ref_data();
            return Ok(());
        };
        ctx.post_update_node(candidates.node_a, delta_time)?;
        if let Some(node_b) = candidates.distinct_b() {
            ctx.post_update_node(node_b, delta_time)?;
        }

        let mut ref_data = ctx.request_ref_data();
        let a = ctx.node_ref_data(candidates.node_a);
        let b = candidates
            .distinct_b()
            .and_then(|node| ctx.node_ref_data(node));
        self.filter_events(a, b, candidates.weight, &mut ref_data.events);
        match (a, b) {
            (Some(a), Some(b)) => ref_data.blend_trajectory(a, b, candidates.weight),
            (Some(a), None) => ref_data.copy_trajectory_from(a),
            _ => {}
        }
        ctx.set_output_ref_data(ref_data);
        Ok(())
    }

    fn output(&self, ctx: &mut NodeContext) -> Result<(), GraphError> {
        if !ctx.is_enabled() || ctx.node().num_connections() == 0 {
            ctx.output_bind_pose();
            return Ok(());
        }
        ctx.output_input(Self::WEIGHT_PORT)?;

        let Some(candidates) = self.find_blend_nodes(ctx)? else {
            ctx.output_bind_pose();
            return Ok(());
        };
        let weight = candidates.weight;

        ctx.output_node(candidates.node_a)?;
        let Some(node_b) = candidates.distinct_b() else {
            ctx.output_input_pose_copy(candidates.port_a);
            return Ok(());
        };
        if is_zero_weight(weight) {
            ctx.output_input_pose_copy(candidates.port_a);
            return Ok(());
        }

        ctx.output_node(node_b)?;
        if is_full_weight(weight) {
            ctx.output_input_pose_copy(candidates.port_b);
            return Ok(());
        }

        let mut pose = ctx.request_pose();
        match (
            ctx.input_pose(candidates.port_a),
            ctx.input_pose(candidates.port_b),
        ) {
            (Some(a), Some(b)) => {
                pose.init_from_pose(a);
                pose.blend(b, weight);
            }
            (Some(a), None) => pose.init_from_pose(a),
            _ => pose.init_from_bind_pose(&ctx.actor()),
        }
        ctx.set_output_pose(pose);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bevy_blend_tree_core::edge_data::events::{AnimationEvent, SampledEvent};

    use super::*;

    fn weights(values: &[(usize, f32)]) -> Vec<BlendNParamWeight> {
        values
            .iter()
            .map(|(port, range)| BlendNParamWeight::new(*port, *range))
            .collect()
    }

    fn connected(ports: &[usize]) -> Vec<bool> {
        let mut connected = vec![false; MAX_POSE_INPUTS + 1];
        for port in ports {
            connected[*port] = true;
        }
        connected
    }

    #[test]
    fn selects_bracket_and_fraction() {
        let param_weights = weights(&[(0, 0.), (1, 0.5), (2, 1.)]);
        assert_eq!(
            select_blend_ports(&param_weights, 0.25),
            Some(BlendSelection {
                port_a: 0,
                port_b: 1,
                weight: 0.5
            })
        );

        let upper = select_blend_ports(&param_weights, 0.875).unwrap();
        assert_eq!((upper.port_a, upper.port_b), (1, 2));
        assert!((upper.weight - 0.75).abs() < 1e-6);
    }

    #[test]
    fn collapses_at_the_ends() {
        let param_weights = weights(&[(0, 0.), (1, 0.5), (2, 1.)]);
        assert_eq!(
            select_blend_ports(&param_weights, -1.),
            Some(BlendSelection::single(0))
        );
        assert_eq!(
            select_blend_ports(&param_weights, 1.),
            Some(BlendSelection::single(2))
        );
        assert_eq!(
            select_blend_ports(&param_weights, 3.),
            Some(BlendSelection::single(2))
        );
        assert_eq!(
            select_blend_ports(&param_weights, 0.000_001),
            Some(BlendSelection::single(0))
        );
    }

    #[test]
    fn degenerate_weight_tables() {
        assert_eq!(select_blend_ports(&[], 0.5), None);
        assert_eq!(
            select_blend_ports(&weights(&[(3, 0.2)]), 5.),
            Some(BlendSelection::single(3))
        );
        // Zero-width bracket does not divide by zero
        let selection = select_blend_ports(&weights(&[(0, 0.), (1, 0.5), (2, 0.5), (3, 1.)]), 0.5)
            .unwrap();
        assert!(selection.weight.is_finite());
    }

    #[test]
    fn default_weights_are_evenly_distributed() {
        let mut node = BlendNNode::default();
        node.on_init(&connected(&[0, 2, 3]));
        assert_eq!(node.param_weights, weights(&[(0, 0.), (2, 0.5), (3, 1.)]));

        node.set_param_weights_equally_distributed(-1., 3.);
        assert_eq!(node.param_weights, weights(&[(0, -1.), (2, 1.), (3, 3.)]));
    }

    #[test]
    fn new_ports_are_back_filled_between_existing_ranges() {
        let mut node =
            BlendNNode::default().with_param_weights(weights(&[(0, 0.), (3, 1.)]));
        node.on_connections_changed(&connected(&[0, 1, 2, 3]));

        let ranges: Vec<_> = node.param_weights.iter().map(|w| w.weight_range).collect();
        assert_eq!(
            node.param_weights.iter().map(|w| w.port).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
        assert!((ranges[1] - 1. / 3.).abs() < 1e-6);
        assert!((ranges[2] - 2. / 3.).abs() < 1e-6);
        assert_eq!(ranges[3], 1.);
    }

    #[test]
    fn trailing_and_removed_ports() {
        let mut node =
            BlendNNode::default().with_param_weights(weights(&[(0, 0.), (1, 0.4), (2, 1.)]));
        node.on_connections_changed(&connected(&[0, 2, 5]));
        assert_eq!(node.param_weights, weights(&[(0, 0.), (2, 1.), (5, 1.)]));
    }

    #[test]
    fn event_filtering_per_mode() {
        let a = RefData {
            events: EventBuffer::with_events(vec![SampledEvent::instant(AnimationEvent::new(
                "a",
            ))]),
            ..default()
        };
        let b = RefData {
            events: EventBuffer::with_events(vec![SampledEvent::instant(AnimationEvent::new(
                "b",
            ))]),
            ..default()
        };

        let ev = |id: &str, weight: f32| (id.to_string(), weight);
        let collect = |mode: EventMode, b: Option<&RefData>, weight: f32| {
            let node = BlendNNode::new(SyncMode::Disabled, mode);
            let mut out = EventBuffer::default();
            node.filter_events(Some(&a), b, weight, &mut out);
            out.iter()
                .map(|e| (e.event.id.clone(), e.weight))
                .collect::<Vec<_>>()
        };

        assert_eq!(collect(EventMode::PrimaryOnly, Some(&b), 0.25), vec![ev("a", 0.75)]);
        assert_eq!(collect(EventMode::SecondaryOnly, Some(&b), 0.25), vec![ev("b", 0.25)]);
        assert_eq!(collect(EventMode::SecondaryOnly, None, 0.25), vec![ev("a", 1.)]);
        assert_eq!(
            collect(EventMode::Both, Some(&b), 0.25),
            vec![ev("a", 0.75), ev("b", 0.25)]
        );
        assert_eq!(collect(EventMode::MostActive, Some(&b), 0.25), vec![ev("a", 0.75)]);
        assert_eq!(collect(EventMode::MostActive, Some(&b), 0.75), vec![ev("b", 0.75)]);
        assert!(collect(EventMode::None, Some(&b), 0.5).is_empty());
    }
}
