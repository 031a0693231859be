use std::{any::Any, fmt::Debug};

use bevy::log::debug;
use bitflags::bitflags;

use crate::{blend_tree::NodeIndex, edge_data::DataValue, errors::GraphError};

bitflags! {
    /// Per-instance state flags of a node.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Hash)]
    pub struct NodeFlags: u8 {
        /// The node's timeline is driven by a sync leader
        const SYNCED = 1 << 0;
        /// The node must snap its phase to its leader on the next sync
        const RESYNC = 1 << 1;
        const SYNC_LEADER = 1 << 2;
        /// A configuration error was detected; the node is producing a fallback output
        const HAS_ERROR = 1 << 3;
    }
}

bitflags! {
    /// Phases a node has already run during the current tick.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Hash)]
    pub struct VisitedPhases: u8 {
        const TOP_DOWN = 1 << 0;
        const UPDATE = 1 << 1;
        const POST_UPDATE = 1 << 2;
        const OUTPUT = 1 << 3;
    }
}

/// Node-specific extension stored alongside the common unique data.
pub trait UniqueDataType: Any + Debug + Send + Sync + 'static {}

impl<T> UniqueDataType for T where T: Any + Debug + Send + Sync + 'static {}

/// Transient evaluation state of one node inside one graph instance.
#[derive(Debug)]
pub struct NodeData {
    pub global_weight: f32,
    pub local_weight: f32,
    pub play_speed: f32,
    pub current_time: f32,
    /// Time before this tick's advance, used to detect crossed events
    pub pre_sync_time: f32,
    pub duration: f32,
    /// Node whose sync track describes this node's timeline
    pub sync_track_source: Option<NodeIndex>,
    pub flags: NodeFlags,
    pub(crate) visited: VisitedPhases,
    pub(crate) revision: u64,
    pub outputs: Vec<Option<DataValue>>,
    state: Option<Box<dyn UniqueDataType>>,
}

impl NodeData {
    pub fn new(revision: u64, num_outputs: usize) -> Self {
        Self {
            global_weight: 1.,
            local_weight: 1.,
            play_speed: 1.,
            current_time: 0.,
            pre_sync_time: 0.,
            duration: 0.,
            sync_track_source: None,
            flags: NodeFlags::empty(),
            visited: VisitedPhases::empty(),
            revision,
            outputs: vec![None; num_outputs],
            state: None,
        }
    }

    /// Resets timing and weights to a neutral state. Flags, cached outputs and the node-specific
    /// state are kept.
    pub fn clear(&mut self) {
        self.global_weight = 1.;
        self.local_weight = 1.;
        self.play_speed = 1.;
        self.current_time = 0.;
        self.pre_sync_time = 0.;
        self.duration = 0.;
        self.sync_track_source = None;
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Current time as a fraction of the duration, or zero for timeless nodes.
    pub fn normalized_time(&self) -> f32 {
        if self.duration > 0. {
            self.current_time / self.duration
        } else {
            0.
        }
    }

    /// Copies the timeline of `other`: duration, times, play speed and sync track.
    pub fn copy_timing_from(&mut self, other: &NodeData) {
        self.duration = other.duration;
        self.current_time = other.current_time;
        self.pre_sync_time = other.pre_sync_time;
        self.play_speed = other.play_speed;
        self.sync_track_source = other.sync_track_source;
    }

    pub fn set_flag(&mut self, flag: NodeFlags, value: bool) {
        self.flags.set(flag, value);
    }

    pub fn has_flag(&self, flag: NodeFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn has_state(&self) -> bool {
        self.state.is_some()
    }

    pub fn state<T: UniqueDataType>(&self) -> Option<&T> {
        self.state.as_ref().and_then(|state| {
            let state: &dyn Any = state.as_ref();
            state.downcast_ref::<T>()
        })
    }

    pub fn state_mut<T: UniqueDataType>(&mut self) -> Option<&mut T> {
        self.state.as_mut().and_then(|state| {
            let state: &mut dyn Any = state.as_mut();
            state.downcast_mut::<T>()
        })
    }

    /// Returns the node-specific state, creating it with `default` when absent. Fails when a
    /// state of a different type is already stored.
    pub fn state_mut_or_insert_with<T: UniqueDataType>(
        &mut self,
        node: NodeIndex,
        default: impl FnOnce() -> T,
    ) -> Result<&mut T, GraphError> {
        let state: &mut dyn Any = self
            .state
            .get_or_insert_with(|| Box::new(default()) as Box<dyn UniqueDataType>)
            .as_mut();
        state
            .downcast_mut::<T>()
            .ok_or(GraphError::MismatchedStateType(node))
    }

    pub fn clear_state(&mut self) {
        self.state = None;
    }
}

/// Slab of [`NodeData`] indexed by [`NodeIndex`], owned by a single graph instance.
#[derive(Debug, Default)]
pub struct UniqueDataStore {
    slots: Vec<Option<NodeData>>,
}

impl UniqueDataStore {
    pub fn new(num_nodes: usize) -> Self {
        let mut store = Self::default();
        store.resize(num_nodes);
        store
    }

    pub fn resize(&mut self, num_nodes: usize) {
        self.slots.resize_with(num_nodes, || None);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of nodes whose unique data currently exists.
    pub fn num_live(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn get(&self, node: NodeIndex) -> Option<&NodeData> {
        self.slots.get(node.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, node: NodeIndex) -> Option<&mut NodeData> {
        self.slots.get_mut(node.index()).and_then(Option::as_mut)
    }

    /// Returns the unique data of `node`, creating it on first use and recreating it when the
    /// node definition changed since it was created.
    pub fn get_or_create(
        &mut self,
        node: NodeIndex,
        revision: u64,
        num_outputs: usize,
    ) -> Result<&mut NodeData, GraphError> {
        let slot = self
            .slots
            .get_mut(node.index())
            .ok_or(GraphError::MissingNode(node))?;

        let stale = slot.as_ref().is_some_and(|data| data.revision != revision);
        if stale {
            debug!("Recreating unique data of node {node:?} after a definition change");
        }
        if stale || slot.is_none() {
            *slot = Some(NodeData::new(revision, num_outputs));
        }

        slot.as_mut().ok_or(GraphError::MissingNode(node))
    }

    /// Shared access to `a` together with mutable access to `b`. `None` when either is missing
    /// or both are the same node.
    pub fn pair_mut(&mut self, a: NodeIndex, b: NodeIndex) -> Option<(&NodeData, &mut NodeData)> {
        let (i, j) = (a.index(), b.index());
        if i == j || i >= self.slots.len() || j >= self.slots.len() {
            return None;
        }
        if i < j {
            let (left, right) = self.slots.split_at_mut(j);
            Some((left[i].as_ref()?, right[0].as_mut()?))
        } else {
            let (left, right) = self.slots.split_at_mut(i);
            Some((right[0].as_ref()?, left[j].as_mut()?))
        }
    }

    /// Drops the unique data of `node`; it is recreated on next use.
    pub fn invalidate(&mut self, node: NodeIndex) {
        if let Some(slot) = self.slots.get_mut(node.index()) {
            *slot = None;
        }
    }

    /// Drops the unique data of every node.
    pub fn reset(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
    }

    pub fn clear_visited(&mut self) {
        for data in self.slots.iter_mut().flatten() {
            data.visited = VisitedPhases::empty();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeIndex, &NodeData)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|data| (NodeIndex(i), data)))
    }
}
