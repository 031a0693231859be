use std::fmt::Debug;

use bevy::reflect::prelude::*;

use crate::{
    blend_tree::NodeIndex,
    context::{
        node_context::NodeContext,
        spec_context::{NodeSpec, SpecContext},
    },
    edge_data::DataSpec,
    errors::GraphError,
    sync::SyncTrack,
};

/// Behaviour of one kind of blend tree node.
///
/// Every tick a graph instance drives its nodes through four phases, each started from the
/// root and recursing into input sources on demand:
///
/// 1. [`NodeLike::top_down_update`]: weights, play speeds and sync directives flow from the
///    root toward the leaves. Value nodes also resolve their data outputs here.
/// 2. [`NodeLike::update`]: leaves advance time, composite nodes gather timing from their
///    inputs.
/// 3. [`NodeLike::post_update`]: events and root motion are gathered and blended.
/// 4. [`NodeLike::output`]: poses are produced.
///
/// Each phase runs at most once per node per tick. The default implementations behave like a
/// pass-through of the first connected pose input.
#[reflect_trait]
pub trait NodeLike: NodeLikeClone + Send + Sync + Debug + Reflect + 'static {
    fn spec(&self, ctx: SpecContext) -> Result<(), GraphError>;

    /// The name of this node.
    fn display_name(&self) -> String;

    fn top_down_update(&self, ctx: &mut NodeContext, delta_time: f32) -> Result<(), GraphError> {
        ctx.default_top_down_update(delta_time)
    }

    fn update(&self, ctx: &mut NodeContext, delta_time: f32) -> Result<(), GraphError> {
        ctx.default_update(delta_time)
    }

    fn post_update(&self, ctx: &mut NodeContext, delta_time: f32) -> Result<(), GraphError> {
        ctx.default_post_update(delta_time)
    }

    fn output(&self, ctx: &mut NodeContext) -> Result<(), GraphError> {
        ctx.default_output()
    }

    fn rewind(&self, ctx: &mut NodeContext) -> Result<(), GraphError> {
        ctx.default_rewind()
    }

    /// Called once per node when the blend tree is initialized, with the connection state of
    /// every input port.
    #[allow(unused_variables)]
    fn on_init(&mut self, connected: &[bool]) {}

    /// Called after an input of an initialized tree was connected or disconnected.
    #[allow(unused_variables)]
    fn on_connections_changed(&mut self, connected: &[bool]) {}

    /// Sync markers of the timeline this node produces, if it is a motion source.
    fn sync_track(&self) -> Option<&SyncTrack> {
        None
    }
}

pub trait NodeLikeClone {
    fn clone_node_like(&self) -> Box<dyn NodeLike>;
}

impl<T> NodeLikeClone for T
where
    T: 'static + NodeLike + Clone,
{
    fn clone_node_like(&self) -> Box<dyn NodeLike> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn NodeLike> {
    fn clone(&self) -> Self {
        self.clone_node_like()
    }
}

/// Incoming edge of an input port.
#[derive(Reflect, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Connection {
    pub source: NodeIndex,
    pub source_port: usize,
}

#[derive(Reflect, Clone, Debug, PartialEq)]
pub struct InputPort {
    pub name: String,
    pub spec: DataSpec,
    pub connection: Option<Connection>,
}

#[derive(Reflect, Clone, Debug, PartialEq)]
pub struct OutputPort {
    pub name: String,
    pub spec: DataSpec,
}

/// A node placed in a blend tree: its behaviour plus the ports it declared.
#[derive(Debug, Clone)]
pub struct AnimationNode {
    pub name: String,
    pub(crate) enabled: bool,
    pub(crate) inner: Box<dyn NodeLike>,
    pub(crate) inputs: Vec<InputPort>,
    pub(crate) outputs: Vec<OutputPort>,
}

impl AnimationNode {
    pub fn new(name: impl Into<String>, inner: impl NodeLike) -> Result<Self, GraphError> {
        Self::from_boxed(name, Box::new(inner))
    }

    pub fn from_boxed(name: impl Into<String>, inner: Box<dyn NodeLike>) -> Result<Self, GraphError> {
        let mut spec = NodeSpec::default();
        inner.spec(SpecContext::new(&mut spec))?;

        Ok(Self {
            name: name.into(),
            enabled: true,
            inner,
            inputs: spec
                .inputs
                .into_iter()
                .map(|(name, spec)| InputPort {
                    name,
                    spec,
                    connection: None,
                })
                .collect(),
            outputs: spec
                .outputs
                .into_iter()
                .map(|(name, spec)| OutputPort { name, spec })
                .collect(),
        })
    }

    pub fn inner(&self) -> &dyn NodeLike {
        self.inner.as_ref()
    }

    pub fn inner_as<T: NodeLike>(&self) -> Option<&T> {
        self.inner.as_any().downcast_ref::<T>()
    }

    pub fn inner_as_mut<T: NodeLike>(&mut self) -> Option<&mut T> {
        self.inner.as_any_mut().downcast_mut::<T>()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn inputs(&self) -> &[InputPort] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[OutputPort] {
        &self.outputs
    }

    pub fn input_index(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|port| port.name == name)
    }

    pub fn output_index(&self, name: &str) -> Option<usize> {
        self.outputs.iter().position(|port| port.name == name)
    }

    pub fn connection(&self, port: usize) -> Option<Connection> {
        self.inputs.get(port).and_then(|port| port.connection)
    }

    pub fn connected_inputs(&self) -> Vec<bool> {
        self.inputs
            .iter()
            .map(|port| port.connection.is_some())
            .collect()
    }

    pub fn num_connections(&self) -> usize {
        self.inputs
            .iter()
            .filter(|port| port.connection.is_some())
            .count()
    }

    pub fn has_pose_output(&self) -> bool {
        self.outputs.iter().any(|port| port.spec == DataSpec::Pose)
    }

    /// First pose input that has a connection.
    pub fn first_connected_pose_input(&self) -> Option<usize> {
        self.inputs
            .iter()
            .position(|port| port.spec == DataSpec::Pose && port.connection.is_some())
    }
}
