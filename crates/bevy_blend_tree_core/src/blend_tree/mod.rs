use bevy::{log::warn, reflect::Reflect};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    animation_node::{AnimationNode, Connection, NodeLike},
    edge_data::{DataSpec, DataValue},
    errors::{GraphError, GraphResult},
};

/// Index of a node inside its [`BlendTree`]. Stable for the lifetime of the tree.
#[derive(
    Reflect, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct NodeIndex(pub usize);

impl NodeIndex {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Shared, immutable-during-evaluation definition of a blend tree: the nodes, their
/// connections and the root whose output is the final pose.
///
/// Any number of graph instances can evaluate the same tree. Editing a node after
/// initialization bumps its revision, which makes instances recreate that node's unique data.
#[derive(Debug, Clone, Default)]
pub struct BlendTree {
    nodes: Vec<AnimationNode>,
    root: Option<NodeIndex>,
    revisions: Vec<u64>,
    /// Number of pose connections reading from each node
    consumer_counts: Vec<usize>,
    parameters: IndexMap<String, DataValue>,
    initialized: bool,
}

impl BlendTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: impl Into<String>, node: impl NodeLike) -> GraphResult<NodeIndex> {
        self.add_animation_node(AnimationNode::new(name, node)?)
    }

    pub fn add_animation_node(&mut self, mut node: AnimationNode) -> GraphResult<NodeIndex> {
        let index = NodeIndex(self.nodes.len());
        if self.initialized {
            let connected = node.connected_inputs();
            node.inner.on_init(&connected);
        }
        self.nodes.push(node);
        self.revisions.push(0);
        self.consumer_counts.push(0);
        Ok(index)
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, node: NodeIndex) -> Option<&AnimationNode> {
        self.nodes.get(node.index())
    }

    /// Mutable access to a node definition. Counts as an edit of the node.
    pub fn node_mut(&mut self, node: NodeIndex) -> Option<&mut AnimationNode> {
        self.bump_revision(node);
        self.nodes.get_mut(node.index())
    }

    /// Typed mutable access to a node's behaviour, counting as an edit of the node.
    pub fn node_inner_mut<T: NodeLike>(&mut self, node: NodeIndex) -> Option<&mut T> {
        self.node_mut(node).and_then(|node| node.inner_as_mut::<T>())
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &AnimationNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (NodeIndex(i), node))
    }

    pub fn find_node_by_name(&self, name: &str) -> Option<NodeIndex> {
        self.nodes
            .iter()
            .position(|node| node.name == name)
            .map(NodeIndex)
    }

    pub fn input_index(&self, node: NodeIndex, port: &str) -> GraphResult<usize> {
        self.node(node)
            .ok_or(GraphError::MissingNode(node))?
            .input_index(port)
            .ok_or_else(|| GraphError::MissingInputPort(node, port.into()))
    }

    pub fn output_index(&self, node: NodeIndex, port: &str) -> GraphResult<usize> {
        self.node(node)
            .ok_or(GraphError::MissingNode(node))?
            .output_index(port)
            .ok_or_else(|| GraphError::MissingOutputPort(node, port.into()))
    }

    /// Connects an output of `source` to an input of `target`, replacing whatever the input was
    /// connected to.
    pub fn connect(
        &mut self,
        source: NodeIndex,
        source_port: &str,
        target: NodeIndex,
        target_port: &str,
    ) -> GraphResult<()> {
        let source_port = self.output_index(source, source_port)?;
        let target_port = self.input_index(target, target_port)?;
        self.connect_ports(source, source_port, target, target_port)
    }

    pub fn connect_ports(
        &mut self,
        source: NodeIndex,
        source_port: usize,
        target: NodeIndex,
        target_port: usize,
    ) -> GraphResult<()> {
        let source_node = self.node(source).ok_or(GraphError::MissingNode(source))?;
        let target_node = self.node(target).ok_or(GraphError::MissingNode(target))?;

        let output = source_node
            .outputs
            .get(source_port)
            .ok_or_else(|| GraphError::MissingOutputPort(source, source_port.to_string()))?;
        let input = target_node
            .inputs
            .get(target_port)
            .ok_or_else(|| GraphError::MissingInputPort(target, target_port.to_string()))?;

        if !input.spec.accepts(output.spec) {
            return Err(GraphError::InconsistentPortTypes(
                format!("{:?}", output.spec),
                format!("{:?}", input.spec),
            ));
        }

        if self.depends_on(source, target) {
            return Err(GraphError::CycleDetected(source, target));
        }

        let is_pose = input.spec == DataSpec::Pose;
        let previous = self.nodes[target.index()].inputs[target_port]
            .connection
            .replace(Connection {
                source,
                source_port,
            });
        if is_pose {
            if let Some(previous) = previous {
                self.consumer_counts[previous.source.index()] -= 1;
            }
            self.consumer_counts[source.index()] += 1;
        }

        self.connections_changed(target);
        Ok(())
    }

    /// Removes the connection feeding an input, returning it.
    pub fn disconnect(&mut self, target: NodeIndex, target_port: &str) -> GraphResult<Option<Connection>> {
        let port = self.input_index(target, target_port)?;
        let input = &mut self.nodes[target.index()].inputs[port];
        let removed = input.connection.take();
        if let Some(removed) = removed
            && input.spec == DataSpec::Pose
        {
            self.consumer_counts[removed.source.index()] -= 1;
        }
        if removed.is_some() {
            self.connections_changed(target);
        }
        Ok(removed)
    }

    /// Whether `node` transitively reads from `dependency` (or is it).
    fn depends_on(&self, node: NodeIndex, dependency: NodeIndex) -> bool {
        let mut stack = vec![node];
        let mut seen = vec![false; self.nodes.len()];
        while let Some(current) = stack.pop() {
            if current == dependency {
                return true;
            }
            if std::mem::replace(&mut seen[current.index()], true) {
                continue;
            }
            stack.extend(
                self.nodes[current.index()]
                    .inputs
                    .iter()
                    .filter_map(|input| input.connection.map(|c| c.source)),
            );
        }
        false
    }

    fn connections_changed(&mut self, node: NodeIndex) {
        if !self.initialized {
            return;
        }
        let animation_node = &mut self.nodes[node.index()];
        let connected = animation_node.connected_inputs();
        animation_node.inner.on_connections_changed(&connected);
        self.bump_revision(node);
    }

    fn bump_revision(&mut self, node: NodeIndex) {
        if let Some(revision) = self.revisions.get_mut(node.index()) {
            *revision += 1;
        }
    }

    pub fn set_root(&mut self, node: NodeIndex) -> GraphResult<()> {
        let animation_node = self.node(node).ok_or(GraphError::MissingNode(node))?;
        if !animation_node.has_pose_output() {
            warn!(
                "Root node {:?} ({}) has no pose output; instances will output the bind pose",
                node, animation_node.name
            );
        }
        self.root = Some(node);
        Ok(())
    }

    pub fn root(&self) -> Option<NodeIndex> {
        self.root
    }

    pub fn set_enabled(&mut self, node: NodeIndex, enabled: bool) -> GraphResult<()> {
        self.nodes
            .get_mut(node.index())
            .ok_or(GraphError::MissingNode(node))?
            .enabled = enabled;
        Ok(())
    }

    pub fn is_enabled(&self, node: NodeIndex) -> bool {
        self.node(node).is_some_and(AnimationNode::is_enabled)
    }

    /// Runs the one-time initialization hook of every node. Required before creating
    /// instances.
    pub fn initialize(&mut self) {
        if self.initialized {
            return;
        }
        for node in self.nodes.iter_mut() {
            let connected = node.connected_inputs();
            node.inner.on_init(&connected);
        }
        self.initialized = true;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Definition revision of a node. Connection changes after initialization and every
    /// [`BlendTree::node_mut`] access bump it.
    pub fn revision(&self, node: NodeIndex) -> u64 {
        self.revisions.get(node.index()).copied().unwrap_or_default()
    }

    /// Number of pose inputs reading the output of `node`.
    pub fn consumer_count(&self, node: NodeIndex) -> usize {
        self.consumer_counts.get(node.index()).copied().unwrap_or_default()
    }

    /// Declares a named parameter with its default value. Instances copy the defaults on
    /// creation and can override them.
    pub fn add_parameter(&mut self, name: impl Into<String>, default: impl Into<DataValue>) {
        self.parameters.insert(name.into(), default.into());
    }

    pub fn parameters(&self) -> &IndexMap<String, DataValue> {
        &self.parameters
    }
}
