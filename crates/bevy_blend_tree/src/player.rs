use std::sync::Arc;

use bevy::{log::warn, prelude::*};
use bevy_blend_tree_core::{
    actor::Actor,
    blend_tree::BlendTree,
    edge_data::DataValue,
    errors::{GraphError, GraphResult},
    graph_instance::GraphInstance,
    pose::Pose,
    ref_data::RefData,
};

/// Plays a blend tree for one character.
#[derive(Component)]
pub struct BlendTreePlayer {
    tree: Arc<BlendTree>,
    instance: GraphInstance,
    pub(crate) paused: bool,
    /// Error that ocurred during tree evaluation in the last frame
    error: Option<GraphError>,
}

impl BlendTreePlayer {
    /// Creates a player for an initialized `tree`, animating `actor`.
    pub fn new(tree: Arc<BlendTree>, actor: Arc<Actor>) -> GraphResult<Self> {
        let instance = GraphInstance::new(&tree, actor)?;
        Ok(Self {
            tree,
            instance,
            paused: false,
            error: None,
        })
    }

    pub fn tree(&self) -> &Arc<BlendTree> {
        &self.tree
    }

    pub fn instance(&self) -> &GraphInstance {
        &self.instance
    }

    pub fn instance_mut(&mut self) -> &mut GraphInstance {
        &mut self.instance
    }

    pub fn pause(&mut self) -> &mut Self {
        self.paused = true;
        self
    }

    pub fn resume(&mut self) -> &mut Self {
        self.paused = false;
        self
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_parameter(&mut self, name: impl Into<String>, value: impl Into<DataValue>) {
        self.instance.set_parameter(name, value);
    }

    pub fn parameter(&self, name: &str) -> Option<DataValue> {
        self.instance.parameter(name)
    }

    /// Pose produced by the last completed tick.
    pub fn pose(&self) -> &Pose {
        self.instance.output_pose()
    }

    /// Events and root motion of the last completed tick.
    pub fn ref_data(&self) -> &RefData {
        self.instance.root_ref_data()
    }

    pub fn error(&self) -> Option<&GraphError> {
        self.error.as_ref()
    }

    /// Resets every node timeline to its start.
    pub fn rewind(&mut self) -> GraphResult<()> {
        self.instance.rewind(&self.tree)
    }

    /// Runs one full tick, keeping the error if evaluation fails.
    pub fn tick(&mut self, delta_time: f32) {
        if self.paused {
            return;
        }
        match self.instance.tick(&self.tree, delta_time) {
            Ok(()) => self.error = None,
            Err(error) => {
                if self.error.as_ref() != Some(&error) {
                    warn!("Blend tree evaluation failed: {error}");
                }
                self.error = Some(error);
            }
        }
    }
}
