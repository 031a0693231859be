use bevy::app::{App, Plugin};

use crate::{
    animation_node::{Connection, InputPort, OutputPort},
    blend_tree::NodeIndex,
    colliders::{ColliderConfig, ColliderShape, SkeletonColliders},
    edge_data::{
        DataSpec, DataValue,
        events::{AnimationEvent, EventBuffer, SampledEvent},
    },
    ref_data::RefData,
    simulated_object::{SimulatedJoint, SimulatedObject, SimulatedObjectSetup},
    skeleton::{Joint, Skeleton},
    sync::{SyncMarker, SyncMode, SyncTrack},
};

/// Registers the reflected types of the blend tree core
pub struct BlendTreeCorePlugin;

impl Plugin for BlendTreeCorePlugin {
    fn build(&self, app: &mut App) {
        self.register_types(app);
    }
}

impl BlendTreeCorePlugin {
    fn register_types(&self, app: &mut App) {
        app //
            .register_type::<NodeIndex>()
            .register_type::<Connection>()
            .register_type::<InputPort>()
            .register_type::<OutputPort>()
            .register_type::<DataValue>()
            .register_type::<DataSpec>()
            .register_type::<AnimationEvent>()
            .register_type::<SampledEvent>()
            .register_type::<EventBuffer>()
            .register_type::<RefData>()
            .register_type::<SyncMode>()
            .register_type::<SyncMarker>()
            .register_type::<SyncTrack>()
            .register_type::<Joint>()
            .register_type::<Skeleton>()
            .register_type::<SimulatedJoint>()
            .register_type::<SimulatedObject>()
            .register_type::<SimulatedObjectSetup>()
            .register_type::<ColliderShape>()
            .register_type::<ColliderConfig>()
            .register_type::<SkeletonColliders>();
    }
}
