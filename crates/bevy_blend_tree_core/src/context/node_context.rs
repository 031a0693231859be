use std::sync::Arc;

use crate::{
    actor::Actor,
    animation_node::{AnimationNode, Connection},
    blend_tree::{BlendTree, NodeIndex},
    edge_data::{DataSpec, DataValue},
    errors::{GraphError, GraphResult},
    graph_instance::{
        GraphInstance, perform_output, perform_post_update, perform_top_down_update,
        perform_update,
    },
    pose::Pose,
    ref_data::RefData,
    sync::{SyncMode, SyncSide, SyncTrack, auto_sync},
    unique_data::{NodeData, NodeFlags, UniqueDataType},
};

/// View of one node while it is being evaluated inside a graph instance.
///
/// Gives access to the node's definition, its unique data, the outputs of its input sources
/// and the instance's buffer pools, and lets the node drive evaluation of its inputs.
pub struct NodeContext<'a> {
    tree: &'a BlendTree,
    instance: &'a mut GraphInstance,
    node_index: NodeIndex,
    node: &'a AnimationNode,
}

impl<'a> NodeContext<'a> {
    pub(crate) fn new(
        tree: &'a BlendTree,
        instance: &'a mut GraphInstance,
        node_index: NodeIndex,
    ) -> GraphResult<Self> {
        let node = tree
            .node(node_index)
            .ok_or(GraphError::MissingNode(node_index))?;
        Ok(Self {
            tree,
            instance,
            node_index,
            node,
        })
    }

    pub fn node_index(&self) -> NodeIndex {
        self.node_index
    }

    pub fn tree(&self) -> &'a BlendTree {
        self.tree
    }

    pub fn node(&self) -> &'a AnimationNode {
        self.node
    }

    pub fn name(&self) -> &'a str {
        &self.node().name
    }

    pub fn is_enabled(&self) -> bool {
        self.node().is_enabled()
    }

    pub fn actor(&self) -> Arc<Actor> {
        self.instance.actor.clone()
    }

    pub fn parameter(&self, name: &str) -> Option<DataValue> {
        self.instance.parameter(name)
    }

    // Unique data
    // -----------

    pub fn data(&self) -> GraphResult<&NodeData> {
        self.instance
            .unique_data
            .get(self.node_index)
            .ok_or(GraphError::MissingNode(self.node_index))
    }

    pub fn data_mut(&mut self) -> GraphResult<&mut NodeData> {
        self.instance.node_data_mut(self.tree, self.node_index)
    }

    /// Unique data of any node of the tree, created on demand.
    pub fn node_data_mut(&mut self, node: NodeIndex) -> GraphResult<&mut NodeData> {
        self.instance.node_data_mut(self.tree, node)
    }

    pub fn node_data(&self, node: NodeIndex) -> Option<&NodeData> {
        self.instance.unique_data.get(node)
    }

    /// Unique data of the node connected to `port`.
    pub fn source_data(&self, port: usize) -> Option<&NodeData> {
        self.source(port).and_then(|source| self.node_data(source))
    }

    pub fn state<T: UniqueDataType>(&self) -> Option<&T> {
        self.data().ok().and_then(NodeData::state::<T>)
    }

    pub fn state_mut_or_insert_with<T: UniqueDataType>(
        &mut self,
        default: impl FnOnce() -> T,
    ) -> GraphResult<&mut T> {
        let node = self.node_index;
        self.data_mut()?.state_mut_or_insert_with(node, default)
    }

    /// Node state together with the pose produced by the source of `port`, for nodes that
    /// read an input pose while mutating their own state.
    pub fn state_and_input_pose<T: UniqueDataType>(
        &mut self,
        port: usize,
        default: impl FnOnce() -> T,
    ) -> GraphResult<(&mut T, Option<&Pose>)> {
        let node = self.node_index;
        let source = self.source(port);
        let revision = self.tree.revision(node);
        let num_outputs = self.node().outputs().len();

        let GraphInstance {
            unique_data, poses, ..
        } = &mut *self.instance;
        let pose = source.and_then(|source| poses[source.index()].as_ref());
        let state = unique_data
            .get_or_create(node, revision, num_outputs)?
            .state_mut_or_insert_with(node, default)?;
        Ok((state, pose))
    }

    pub fn set_flag(&mut self, flag: NodeFlags, value: bool) -> GraphResult<()> {
        self.data_mut()?.set_flag(flag, value);
        Ok(())
    }

    pub fn has_flag(&self, flag: NodeFlags) -> bool {
        self.data().is_ok_and(|data| data.has_flag(flag))
    }

    /// Sets or clears `flag` on `node` and every node it transitively reads from.
    pub fn set_flag_recursive(
        &mut self,
        node: NodeIndex,
        flag: NodeFlags,
        value: bool,
    ) -> GraphResult<()> {
        let mut stack = vec![node];
        let mut seen = vec![false; self.tree.num_nodes()];
        while let Some(current) = stack.pop() {
            if std::mem::replace(&mut seen[current.index()], true) {
                continue;
            }
            self.node_data_mut(current)?.set_flag(flag, value);
            let animation_node = self
                .tree
                .node(current)
                .ok_or(GraphError::MissingNode(current))?;
            stack.extend(
                animation_node
                    .inputs()
                    .iter()
                    .filter_map(|input| input.connection.map(|c| c.source)),
            );
        }
        Ok(())
    }

    /// Adopts the timeline of `source`: duration, times, play speed and sync track.
    pub fn copy_timing_from(&mut self, source: NodeIndex) -> GraphResult<()> {
        let node = self.node_index;
        self.node_data_mut(source)?;
        self.data_mut()?;
        if let Some((source, data)) = self.instance.unique_data.pair_mut(source, node) {
            data.copy_timing_from(source);
        }
        Ok(())
    }

    // Synchronization
    // ---------------

    /// Sync track describing the timeline of `node`, as reported by its sync track source.
    pub fn sync_track_of(&self, node: NodeIndex) -> Option<&'a SyncTrack> {
        let source = self.node_data(node)?.sync_track_source?;
        self.tree.node(source)?.inner().sync_track()
    }

    /// Makes the timeline of `follower` follow the one of `leader`, see [`auto_sync`].
    pub fn auto_sync(
        &mut self,
        leader: NodeIndex,
        follower: NodeIndex,
        weight: f32,
        mode: SyncMode,
        resync: bool,
    ) -> GraphResult<()> {
        self.node_data_mut(leader)?;
        self.node_data_mut(follower)?;
        let leader_track = self.sync_track_of(leader);
        let follower_track = self.sync_track_of(follower);

        if let Some((leader_data, follower_data)) =
            self.instance.unique_data.pair_mut(leader, follower)
        {
            auto_sync(
                SyncSide {
                    data: leader_data,
                    track: leader_track,
                },
                follower_data,
                follower_track,
                weight,
                mode,
                resync,
            );
        }
        Ok(())
    }

    // Connections
    // -----------

    pub fn connection(&self, port: usize) -> Option<Connection> {
        self.node().connection(port)
    }

    pub fn source(&self, port: usize) -> Option<NodeIndex> {
        self.connection(port).map(|c| c.source)
    }

    pub fn is_connected(&self, port: usize) -> bool {
        self.connection(port).is_some()
    }

    pub fn connected_inputs(&self) -> Vec<bool> {
        self.node().connected_inputs()
    }

    pub fn num_inputs(&self) -> usize {
        self.node().inputs().len()
    }

    // Evaluation of other nodes
    // -------------------------

    pub fn top_down_node(&mut self, node: NodeIndex, delta_time: f32) -> GraphResult<()> {
        perform_top_down_update(self.tree, self.instance, node, delta_time)
    }

    pub fn update_node(&mut self, node: NodeIndex, delta_time: f32) -> GraphResult<()> {
        perform_update(self.tree, self.instance, node, delta_time)
    }

    pub fn post_update_node(&mut self, node: NodeIndex, delta_time: f32) -> GraphResult<()> {
        perform_post_update(self.tree, self.instance, node, delta_time)
    }

    pub fn output_node(&mut self, node: NodeIndex) -> GraphResult<()> {
        perform_output(self.tree, self.instance, node)
    }

    /// Runs the top-down phase on the source of `port`, if connected.
    pub fn top_down_input(&mut self, port: usize, delta_time: f32) -> GraphResult<()> {
        match self.source(port) {
            Some(source) => self.top_down_node(source, delta_time),
            None => Ok(()),
        }
    }

    pub fn update_input(&mut self, port: usize, delta_time: f32) -> GraphResult<()> {
        match self.source(port) {
            Some(source) => self.update_node(source, delta_time),
            None => Ok(()),
        }
    }

    pub fn post_update_input(&mut self, port: usize, delta_time: f32) -> GraphResult<()> {
        match self.source(port) {
            Some(source) => self.post_update_node(source, delta_time),
            None => Ok(()),
        }
    }

    pub fn output_input(&mut self, port: usize) -> GraphResult<()> {
        match self.source(port) {
            Some(source) => self.output_node(source),
            None => Ok(()),
        }
    }

    // Data values
    // -----------

    /// Value produced by the source of a data input, if connected and already resolved.
    pub fn input_value(&self, port: usize) -> Option<DataValue> {
        let connection = self.connection(port)?;
        self.node_data(connection.source)?
            .outputs
            .get(connection.source_port)
            .copied()
            .flatten()
    }

    pub fn input_f32(&self, port: usize) -> GraphResult<Option<f32>> {
        self.input_value(port)
            .map(|value| value.as_number())
            .transpose()
    }

    pub fn set_output_value(&mut self, port: usize, value: impl Into<DataValue>) -> GraphResult<()> {
        let node = self.node_index;
        let slot = self
            .data_mut()?
            .outputs
            .get_mut(port)
            .ok_or_else(|| GraphError::MissingOutputPort(node, port.to_string()))?;
        *slot = Some(value.into());
        Ok(())
    }

    // Poses
    // -----

    pub fn input_pose(&self, port: usize) -> Option<&Pose> {
        self.source(port).and_then(|source| self.node_pose(source))
    }

    pub fn node_pose(&self, node: NodeIndex) -> Option<&Pose> {
        self.instance
            .poses
            .get(node.index())
            .and_then(Option::as_ref)
    }

    /// A pooled pose linked to the instance's actor. Its joint values are unspecified.
    pub fn request_pose(&mut self) -> Pose {
        let mut pose = self.instance.pose_pool.acquire();
        pose.link_to_actor(&self.instance.actor);
        pose
    }

    /// Publishes the output pose of this node for the current tick.
    pub fn set_output_pose(&mut self, pose: Pose) {
        let slot = &mut self.instance.poses[self.node_index.index()];
        if let Some(previous) = slot.replace(pose) {
            self.instance.pose_pool.release(previous);
        }
    }

    pub fn output_bind_pose(&mut self) {
        let mut pose = self.request_pose();
        pose.init_from_bind_pose(&self.instance.actor);
        self.set_output_pose(pose);
    }

    /// Outputs a copy of the pose on `port`, or the bind pose when there is none.
    pub fn output_input_pose_copy(&mut self, port: usize) {
        let mut pose = self.request_pose();
        match self.input_pose(port) {
            Some(input) => pose.init_from_pose(input),
            None => pose.init_from_bind_pose(&self.instance.actor),
        }
        self.set_output_pose(pose);
    }

    // Events and root motion
    // ----------------------

    pub fn input_ref_data(&self, port: usize) -> Option<&RefData> {
        self.source(port).and_then(|source| self.node_ref_data(source))
    }

    pub fn node_ref_data(&self, node: NodeIndex) -> Option<&RefData> {
        self.instance
            .ref_datas
            .get(node.index())
            .and_then(Option::as_ref)
    }

    /// A pooled, cleared ref data buffer.
    pub fn request_ref_data(&mut self) -> RefData {
        let mut ref_data = self.instance.ref_data_pool.acquire();
        ref_data.clear();
        ref_data
    }

    pub fn set_output_ref_data(&mut self, ref_data: RefData) {
        let slot = &mut self.instance.ref_datas[self.node_index.index()];
        if let Some(previous) = slot.replace(ref_data) {
            self.instance.ref_data_pool.release(previous);
        }
    }

    pub fn output_empty_ref_data(&mut self) {
        let ref_data = self.request_ref_data();
        self.set_output_ref_data(ref_data);
    }

    // Default phase behaviour
    // -----------------------

    /// Propagates weights to every connected input and play speed to pose inputs. A synced
    /// node also hands its time to its first pose input.
    pub fn default_top_down_update(&mut self, delta_time: f32) -> GraphResult<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        let (global_weight, play_speed, current_time, synced) = {
            let data = self.data_mut()?;
            (
                data.global_weight,
                data.play_speed,
                data.current_time,
                data.has_flag(NodeFlags::SYNCED),
            )
        };
        let node = self.node();
        let first_pose = node.first_connected_pose_input();

        for (port, input) in node.inputs().iter().enumerate() {
            let Some(connection) = input.connection else {
                continue;
            };
            let source = self.node_data_mut(connection.source)?;
            source.global_weight = global_weight;
            source.local_weight = 1.;
            if input.spec == DataSpec::Pose {
                source.play_speed = play_speed;
                if synced && first_pose == Some(port) {
                    source.current_time = current_time;
                }
            }
            self.top_down_node(connection.source, delta_time)?;
        }
        Ok(())
    }

    /// Updates every connected input, then adopts the timeline of the first pose input.
    pub fn default_update(&mut self, delta_time: f32) -> GraphResult<()> {
        if !self.is_enabled() {
            self.data_mut()?.clear();
            return Ok(());
        }
        let node = self.node();
        for source in node
            .inputs()
            .iter()
            .filter_map(|input| input.connection.map(|c| c.source))
        {
            self.update_node(source, delta_time)?;
        }

        match node
            .first_connected_pose_input()
            .and_then(|port| node.connection(port))
        {
            Some(connection) => self.copy_timing_from(connection.source),
            None => Ok(()),
        }
    }

    /// Post-updates every connected input and forwards the events and root motion of the
    /// first pose input.
    pub fn default_post_update(&mut self, delta_time: f32) -> GraphResult<()> {
        let node = self.node();
        if !node.has_pose_output() {
            return Ok(());
        }
        if !self.is_enabled() {
            self.output_empty_ref_data();
            return Ok(());
        }
        for source in node
            .inputs()
            .iter()
            .filter(|input| input.spec == DataSpec::Pose)
            .filter_map(|input| input.connection.map(|c| c.source))
        {
            self.post_update_node(source, delta_time)?;
        }

        let mut ref_data = self.request_ref_data();
        if let Some(input) = node
            .first_connected_pose_input()
            .and_then(|port| self.input_ref_data(port))
        {
            ref_data.events.copy_from(&input.events);
            ref_data.copy_trajectory_from(input);
        }
        self.set_output_ref_data(ref_data);
        Ok(())
    }

    /// Outputs every connected input and passes the first pose input through, falling back to
    /// the bind pose.
    pub fn default_output(&mut self) -> GraphResult<()> {
        let node = self.node();
        if !self.is_enabled() {
            if node.has_pose_output() {
                self.output_bind_pose();
            }
            return Ok(());
        }
        for source in node
            .inputs()
            .iter()
            .filter_map(|input| input.connection.map(|c| c.source))
        {
            self.output_node(source)?;
        }
        if !node.has_pose_output() {
            return Ok(());
        }
        match node.first_connected_pose_input() {
            Some(port) => self.output_input_pose_copy(port),
            None => self.output_bind_pose(),
        }
        Ok(())
    }

    pub fn default_rewind(&mut self) -> GraphResult<()> {
        let data = self.data_mut()?;
        data.current_time = 0.;
        data.pre_sync_time = 0.;
        Ok(())
    }
}
