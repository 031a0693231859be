pub mod actor;
pub mod animation_node;
pub mod blend_tree;
pub mod colliders;
pub mod context;
pub mod edge_data;
pub mod errors;
pub mod graph_instance;
pub mod instance_registry;
pub mod interpolation;
pub mod plugin;
pub mod pool;
pub mod pose;
pub mod ref_data;
pub mod simulated_object;
pub mod skeleton;
pub mod spring_solver;
pub mod sync;
pub mod transform_ext;
pub mod unique_data;

pub mod prelude {
    use super::*;
    pub use actor::Actor;
    pub use animation_node::{AnimationNode, Connection, NodeLike, ReflectNodeLike};
    pub use blend_tree::{BlendTree, NodeIndex};
    pub use context::{
        node_context::NodeContext,
        spec_context::{NodeSpec, SpecContext},
    };
    pub use edge_data::{
        DataSpec, DataValue,
        events::{AnimationEvent, EventBuffer, SampledEvent},
    };
    pub use errors::{GraphError, GraphResult};
    pub use graph_instance::{GraphInstance, TickPhase};
    pub use instance_registry::{GraphInstances, InstanceId};
    pub use plugin::BlendTreeCorePlugin;
    pub use pose::Pose;
    pub use ref_data::RefData;
    pub use skeleton::Skeleton;
    pub use sync::{SyncMode, SyncTrack};
    pub use unique_data::{NodeData, NodeFlags};
}

#[cfg(test)]
pub(crate) mod test_utils;
