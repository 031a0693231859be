use std::sync::Arc;

use bevy::log::trace;
use indexmap::IndexMap;

use crate::{
    actor::Actor,
    blend_tree::{BlendTree, NodeIndex},
    context::node_context::NodeContext,
    edge_data::{DataSpec, DataValue},
    errors::{GraphError, GraphResult},
    pool::BufferPool,
    pose::Pose,
    ref_data::RefData,
    unique_data::{NodeData, NodeFlags, UniqueDataStore, UniqueDataType, VisitedPhases},
};

/// The phase a graph instance expects to run next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TickPhase {
    #[default]
    BeginTick,
    TopDownUpdate,
    Update,
    PostUpdate,
    Output,
}

/// Per-character evaluation state of a [`BlendTree`].
///
/// The tree is shared and read-only during evaluation; everything that changes while ticking
/// lives here: per-node unique data, parameter values, intermediate buffers and the final
/// output. Intermediate poses and event buffers are taken from pools and handed back as soon
/// as every consumer has read them.
#[derive(Debug)]
pub struct GraphInstance {
    pub(crate) actor: Arc<Actor>,
    pub(crate) parameters: IndexMap<String, DataValue>,
    pub(crate) unique_data: UniqueDataStore,
    pub(crate) poses: Vec<Option<Pose>>,
    pub(crate) ref_datas: Vec<Option<RefData>>,
    pose_consumers: Vec<usize>,
    ref_data_consumers: Vec<usize>,
    pub(crate) pose_pool: BufferPool<Pose>,
    pub(crate) ref_data_pool: BufferPool<RefData>,
    output_pose: Pose,
    root_ref_data: RefData,
    next_phase: TickPhase,
    play_speed: f32,
}

impl GraphInstance {
    pub fn new(tree: &BlendTree, actor: Arc<Actor>) -> GraphResult<Self> {
        if !tree.is_initialized() {
            return Err(GraphError::TreeNotInitialized);
        }
        let num_nodes = tree.num_nodes();

        Ok(Self {
            output_pose: actor.bind_pose().clone(),
            actor,
            parameters: tree.parameters().clone(),
            unique_data: UniqueDataStore::new(num_nodes),
            poses: vec![None; num_nodes],
            ref_datas: vec![None; num_nodes],
            pose_consumers: vec![0; num_nodes],
            ref_data_consumers: vec![0; num_nodes],
            pose_pool: BufferPool::default(),
            ref_data_pool: BufferPool::default(),
            root_ref_data: RefData::default(),
            next_phase: TickPhase::BeginTick,
            play_speed: 1.,
        })
    }

    pub fn actor(&self) -> &Arc<Actor> {
        &self.actor
    }

    /// Switches to another actor. All unique data is dropped, since solvers and cached timing
    /// refer to the previous skeleton.
    pub fn set_actor(&mut self, actor: Arc<Actor>) {
        self.output_pose = actor.bind_pose().clone();
        self.actor = actor;
        self.unique_data.reset();
        self.release_buffers();
        self.pose_pool.shrink();
    }

    pub fn parameter(&self, name: &str) -> Option<DataValue> {
        self.parameters.get(name).copied()
    }

    pub fn parameters(&self) -> &IndexMap<String, DataValue> {
        &self.parameters
    }

    pub fn set_parameter(&mut self, name: impl Into<String>, value: impl Into<DataValue>) {
        self.parameters.insert(name.into(), value.into());
    }

    pub fn play_speed(&self) -> f32 {
        self.play_speed
    }

    /// Speed multiplier applied at the root every tick.
    pub fn set_play_speed(&mut self, play_speed: f32) {
        self.play_speed = play_speed;
    }

    pub fn output_pose(&self) -> &Pose {
        &self.output_pose
    }

    /// Events and root motion of the last completed post-update.
    pub fn root_ref_data(&self) -> &RefData {
        &self.root_ref_data
    }

    pub fn next_phase(&self) -> TickPhase {
        self.next_phase
    }

    pub fn unique_data(&self) -> &UniqueDataStore {
        &self.unique_data
    }

    pub fn node_data(&self, node: NodeIndex) -> Option<&NodeData> {
        self.unique_data.get(node)
    }

    pub fn node_state<T: UniqueDataType>(&self, node: NodeIndex) -> Option<&T> {
        self.unique_data.get(node).and_then(NodeData::state::<T>)
    }

    pub fn node_state_mut<T: UniqueDataType>(&mut self, node: NodeIndex) -> Option<&mut T> {
        self.unique_data
            .get_mut(node)
            .and_then(NodeData::state_mut::<T>)
    }

    /// Node state of `node`, created along with its unique data when missing.
    pub fn node_state_mut_or_insert_with<T: UniqueDataType>(
        &mut self,
        tree: &BlendTree,
        node: NodeIndex,
        default: impl FnOnce() -> T,
    ) -> GraphResult<&mut T> {
        self.sync_layout(tree)?;
        self.node_data_mut(tree, node)?
            .state_mut_or_insert_with(node, default)
    }

    pub fn has_flag(&self, node: NodeIndex, flag: NodeFlags) -> bool {
        self.unique_data
            .get(node)
            .is_some_and(|data| data.has_flag(flag))
    }

    /// Drops the unique data of one node; it is recreated on next use.
    pub fn invalidate_unique_data(&mut self, node: NodeIndex) {
        self.unique_data.invalidate(node);
    }

    pub fn reset_unique_data(&mut self) {
        self.unique_data.reset();
    }

    pub fn pose_pool(&self) -> &BufferPool<Pose> {
        &self.pose_pool
    }

    pub fn ref_data_pool(&self) -> &BufferPool<RefData> {
        &self.ref_data_pool
    }

    /// Unique data of `node`, created or recreated as needed for the node's current revision.
    pub(crate) fn node_data_mut(
        &mut self,
        tree: &BlendTree,
        node: NodeIndex,
    ) -> GraphResult<&mut NodeData> {
        let num_outputs = tree
            .node(node)
            .ok_or(GraphError::MissingNode(node))?
            .outputs()
            .len();
        self.unique_data
            .get_or_create(node, tree.revision(node), num_outputs)
    }

    /// Grows the per-node storage when nodes were added to the tree since the last tick.
    fn sync_layout(&mut self, tree: &BlendTree) -> GraphResult<()> {
        let num_nodes = tree.num_nodes();
        if num_nodes < self.poses.len() {
            return Err(GraphError::InstanceLayoutMismatch);
        }
        if num_nodes > self.poses.len() {
            self.unique_data.resize(num_nodes);
            self.poses.resize(num_nodes, None);
            self.ref_datas.resize(num_nodes, None);
            self.pose_consumers.resize(num_nodes, 0);
            self.ref_data_consumers.resize(num_nodes, 0);
        }
        Ok(())
    }

    fn release_buffers(&mut self) {
        for pose in self.poses.iter_mut().filter_map(Option::take) {
            self.pose_pool.release(pose);
        }
        for ref_data in self.ref_datas.iter_mut().filter_map(Option::take) {
            self.ref_data_pool.release(ref_data);
        }
    }

    fn expect_phase(&self, phase: TickPhase) -> GraphResult<()> {
        if self.next_phase != phase {
            return Err(GraphError::PhaseOrder {
                expected: format!("{:?}", self.next_phase),
                got: format!("{phase:?}"),
            });
        }
        Ok(())
    }

    fn root(tree: &BlendTree) -> GraphResult<NodeIndex> {
        tree.root().ok_or(GraphError::MissingRoot)
    }

    /// Starts a new tick. Can be called at any point, abandoning a partially evaluated tick.
    pub fn begin_tick(&mut self, tree: &BlendTree) -> GraphResult<()> {
        self.sync_layout(tree)?;
        self.release_buffers();
        for i in 0..tree.num_nodes() {
            let count = tree.consumer_count(NodeIndex(i));
            self.pose_consumers[i] = count;
            self.ref_data_consumers[i] = count;
        }
        self.unique_data.clear_visited();
        self.next_phase = TickPhase::TopDownUpdate;
        Ok(())
    }

    pub fn top_down_update(&mut self, tree: &BlendTree, delta_time: f32) -> GraphResult<()> {
        self.expect_phase(TickPhase::TopDownUpdate)?;
        let root = Self::root(tree)?;

        let play_speed = self.play_speed;
        let data = self.node_data_mut(tree, root)?;
        data.global_weight = 1.;
        data.local_weight = 1.;
        data.play_speed = play_speed;

        perform_top_down_update(tree, self, root, delta_time)?;
        self.next_phase = TickPhase::Update;
        Ok(())
    }

    pub fn update(&mut self, tree: &BlendTree, delta_time: f32) -> GraphResult<()> {
        self.expect_phase(TickPhase::Update)?;
        let root = Self::root(tree)?;
        perform_update(tree, self, root, delta_time)?;
        self.next_phase = TickPhase::PostUpdate;
        Ok(())
    }

    pub fn post_update(&mut self, tree: &BlendTree, delta_time: f32) -> GraphResult<()> {
        self.expect_phase(TickPhase::PostUpdate)?;
        let root = Self::root(tree)?;
        perform_post_update(tree, self, root, delta_time)?;

        match self.ref_datas[root.index()].take() {
            Some(ref_data) => {
                let previous = std::mem::replace(&mut self.root_ref_data, ref_data);
                self.ref_data_pool.release(previous);
            }
            None => self.root_ref_data.clear(),
        }
        self.next_phase = TickPhase::Output;
        Ok(())
    }

    pub fn output(&mut self, tree: &BlendTree) -> GraphResult<()> {
        self.expect_phase(TickPhase::Output)?;
        let root = Self::root(tree)?;
        perform_output(tree, self, root)?;

        match self.poses[root.index()].take() {
            Some(pose) => {
                let previous = std::mem::replace(&mut self.output_pose, pose);
                self.pose_pool.release(previous);
            }
            None => self.output_pose.init_from_bind_pose(&self.actor),
        }
        self.release_buffers();
        self.next_phase = TickPhase::BeginTick;
        Ok(())
    }

    /// Runs all phases of one tick.
    pub fn tick(&mut self, tree: &BlendTree, delta_time: f32) -> GraphResult<()> {
        self.begin_tick(tree)?;
        self.top_down_update(tree, delta_time)?;
        self.update(tree, delta_time)?;
        self.post_update(tree, delta_time)?;
        self.output(tree)
    }

    /// Resets the timeline of every node, as if playback started over.
    pub fn rewind(&mut self, tree: &BlendTree) -> GraphResult<()> {
        self.sync_layout(tree)?;
        for (index, node) in tree.nodes() {
            self.node_data_mut(tree, index)?;
            node.inner
                .rewind(&mut NodeContext::new(tree, self, index)?)?;
        }
        Ok(())
    }

    fn release_consumed_poses(&mut self, tree: &BlendTree, node: NodeIndex) {
        let Some(animation_node) = tree.node(node) else {
            return;
        };
        for input in animation_node.inputs() {
            let Some(connection) = input.connection else {
                continue;
            };
            if input.spec != DataSpec::Pose {
                continue;
            }
            let source = connection.source.index();
            let remaining = &mut self.pose_consumers[source];
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0
                && let Some(pose) = self.poses[source].take()
            {
                self.pose_pool.release(pose);
            }
        }
    }

    fn release_consumed_ref_data(&mut self, tree: &BlendTree, node: NodeIndex) {
        let Some(animation_node) = tree.node(node) else {
            return;
        };
        for input in animation_node.inputs() {
            let Some(connection) = input.connection else {
                continue;
            };
            if input.spec != DataSpec::Pose {
                continue;
            }
            let source = connection.source.index();
            let remaining = &mut self.ref_data_consumers[source];
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0
                && let Some(ref_data) = self.ref_datas[source].take()
            {
                self.ref_data_pool.release(ref_data);
            }
        }
    }
}

/// Marks `phase` as visited for `node`, returning false if it already ran this tick.
fn visit(
    tree: &BlendTree,
    instance: &mut GraphInstance,
    node: NodeIndex,
    phase: VisitedPhases,
) -> GraphResult<bool> {
    let data = instance.node_data_mut(tree, node)?;
    if data.visited.contains(phase) {
        return Ok(false);
    }
    data.visited.insert(phase);
    Ok(true)
}

pub(crate) fn perform_top_down_update(
    tree: &BlendTree,
    instance: &mut GraphInstance,
    node: NodeIndex,
    delta_time: f32,
) -> GraphResult<()> {
    let animation_node = tree.node(node).ok_or(GraphError::MissingNode(node))?;
    if !visit(tree, instance, node, VisitedPhases::TOP_DOWN)? {
        return Ok(());
    }
    animation_node
        .inner
        .top_down_update(&mut NodeContext::new(tree, instance, node)?, delta_time)
}

pub(crate) fn perform_update(
    tree: &BlendTree,
    instance: &mut GraphInstance,
    node: NodeIndex,
    delta_time: f32,
) -> GraphResult<()> {
    let animation_node = tree.node(node).ok_or(GraphError::MissingNode(node))?;
    if !visit(tree, instance, node, VisitedPhases::UPDATE)? {
        return Ok(());
    }
    animation_node
        .inner
        .update(&mut NodeContext::new(tree, instance, node)?, delta_time)?;

    // A resync request is honoured by exactly one update.
    instance
        .node_data_mut(tree, node)?
        .set_flag(NodeFlags::RESYNC, false);
    Ok(())
}

pub(crate) fn perform_post_update(
    tree: &BlendTree,
    instance: &mut GraphInstance,
    node: NodeIndex,
    delta_time: f32,
) -> GraphResult<()> {
    let animation_node = tree.node(node).ok_or(GraphError::MissingNode(node))?;
    if !visit(tree, instance, node, VisitedPhases::POST_UPDATE)? {
        return Ok(());
    }
    animation_node
        .inner
        .post_update(&mut NodeContext::new(tree, instance, node)?, delta_time)?;
    instance.release_consumed_ref_data(tree, node);
    Ok(())
}

pub(crate) fn perform_output(
    tree: &BlendTree,
    instance: &mut GraphInstance,
    node: NodeIndex,
) -> GraphResult<()> {
    let animation_node = tree.node(node).ok_or(GraphError::MissingNode(node))?;
    if !visit(tree, instance, node, VisitedPhases::OUTPUT)? {
        return Ok(());
    }
    trace!("Output of node {:?} ({})", node, animation_node.name);
    animation_node
        .inner
        .output(&mut NodeContext::new(tree, instance, node)?)?;
    instance.release_consumed_poses(tree, node);
    Ok(())
}

#[cfg(test)]
mod tests {
    use bevy::prelude::*;

    use super::*;
    use crate::test_utils::{TestPass, TestReader, TestValue, chain_actor};

    fn pass_chain(length: usize) -> (BlendTree, Vec<NodeIndex>) {
        let mut tree = BlendTree::new();
        let nodes: Vec<_> = (0..length)
            .map(|i| tree.add_node(format!("pass_{i}"), TestPass).unwrap())
            .collect();
        for pair in nodes.windows(2) {
            tree.connect(pair[0], "pose", pair[1], "pose").unwrap();
        }
        tree.set_root(nodes[length - 1]).unwrap();
        tree.initialize();
        (tree, nodes)
    }

    #[test]
    fn requires_initialized_tree() {
        let tree = BlendTree::new();
        assert_eq!(
            GraphInstance::new(&tree, chain_actor(2)).err(),
            Some(GraphError::TreeNotInitialized)
        );
    }

    #[test]
    fn phases_run_in_order() {
        let (tree, _) = pass_chain(2);
        let mut instance = GraphInstance::new(&tree, chain_actor(3)).unwrap();

        assert_eq!(
            instance.update(&tree, 0.1),
            Err(GraphError::PhaseOrder {
                expected: "BeginTick".into(),
                got: "Update".into()
            })
        );

        instance.begin_tick(&tree).unwrap();
        instance.top_down_update(&tree, 0.1).unwrap();
        assert!(instance.output(&tree).is_err());
        instance.update(&tree, 0.1).unwrap();
        instance.post_update(&tree, 0.1).unwrap();
        instance.output(&tree).unwrap();
        assert_eq!(instance.next_phase(), TickPhase::BeginTick);

        // Abandoning a tick halfway is allowed.
        instance.begin_tick(&tree).unwrap();
        instance.top_down_update(&tree, 0.1).unwrap();
        instance.begin_tick(&tree).unwrap();
        assert_eq!(instance.next_phase(), TickPhase::TopDownUpdate);
    }

    #[test]
    fn missing_root_is_an_error() {
        let mut tree = BlendTree::new();
        tree.add_node("pass", TestPass).unwrap();
        tree.initialize();
        let mut instance = GraphInstance::new(&tree, chain_actor(2)).unwrap();
        assert_eq!(instance.tick(&tree, 0.1), Err(GraphError::MissingRoot));
    }

    #[test]
    fn unconnected_chain_outputs_bind_pose() {
        let (tree, nodes) = pass_chain(3);
        let actor = chain_actor(3);
        let mut instance = GraphInstance::new(&tree, actor.clone()).unwrap();
        instance.tick(&tree, 0.1).unwrap();

        let mut output = instance.output_pose().clone();
        assert_eq!(output.num_transforms(), 3);
        assert!(
            output
                .model_space_transform(2)
                .translation
                .abs_diff_eq(Vec3::new(0., 2., 0.), 1e-6)
        );
        assert_eq!(instance.unique_data().num_live(), nodes.len());
        assert!(instance.root_ref_data().events.is_empty());
    }

    #[test]
    fn buffers_are_recycled_between_ticks() {
        let (tree, _) = pass_chain(4);
        let mut instance = GraphInstance::new(&tree, chain_actor(2)).unwrap();

        instance.tick(&tree, 0.1).unwrap();
        let allocated = instance.pose_pool().total_allocated();
        for _ in 0..5 {
            instance.tick(&tree, 0.1).unwrap();
        }
        assert_eq!(instance.pose_pool().total_allocated(), allocated);
        assert!(allocated <= 3);
    }

    #[test]
    fn data_values_flow_through_connections() {
        let mut tree = BlendTree::new();
        let value = tree.add_node("value", TestValue(0.75)).unwrap();
        let reader = tree.add_node("reader", TestReader::default()).unwrap();
        tree.connect(value, "value", reader, "amount").unwrap();
        tree.set_root(reader).unwrap();
        tree.initialize();

        let mut instance = GraphInstance::new(&tree, chain_actor(2)).unwrap();
        instance.tick(&tree, 0.1).unwrap();
        assert_eq!(instance.node_state::<f32>(reader), Some(&0.75));
    }

    #[test]
    fn definition_edits_recreate_unique_data() {
        let mut tree = BlendTree::new();
        let reader = tree.add_node("reader", TestReader::default()).unwrap();
        tree.set_root(reader).unwrap();
        tree.initialize();

        let mut instance = GraphInstance::new(&tree, chain_actor(2)).unwrap();
        instance.tick(&tree, 0.1).unwrap();
        instance
            .unique_data
            .get_mut(reader)
            .unwrap()
            .set_flag(NodeFlags::HAS_ERROR, true);

        tree.node_mut(reader);
        instance.tick(&tree, 0.1).unwrap();
        assert!(!instance.has_flag(reader, NodeFlags::HAS_ERROR));
    }

    #[test]
    fn instances_grow_with_the_tree() {
        let (mut tree, nodes) = pass_chain(2);
        let mut instance = GraphInstance::new(&tree, chain_actor(2)).unwrap();
        instance.tick(&tree, 0.1).unwrap();

        let head = tree.add_node("head", TestPass).unwrap();
        tree.connect(head, "pose", nodes[0], "pose").unwrap();
        instance.tick(&tree, 0.1).unwrap();
        assert!(instance.node_data(head).is_some());
    }

    #[test]
    fn rewind_resets_time() {
        let (tree, nodes) = pass_chain(2);
        let mut instance = GraphInstance::new(&tree, chain_actor(2)).unwrap();
        instance.tick(&tree, 0.1).unwrap();
        instance.unique_data.get_mut(nodes[0]).unwrap().current_time = 0.5;

        instance.rewind(&tree).unwrap();
        assert_eq!(instance.node_data(nodes[0]).unwrap().current_time, 0.);
    }
}
