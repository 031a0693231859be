use bevy::{prelude::*, transform::TransformSystems};
use bevy_blend_tree_builtin_nodes::BuiltinNodesPlugin;
use bevy_blend_tree_core::plugin::BlendTreeCorePlugin;

use crate::systems::blend_tree_player;

/// Registers core and builtin node types, and ticks [`BlendTreePlayer`]s every frame.
///
/// [`BlendTreePlayer`]: crate::player::BlendTreePlayer
pub struct BlendTreePlugin;

impl Plugin for BlendTreePlugin {
    fn build(&self, app: &mut App) {
        app //
            .add_plugins((BlendTreeCorePlugin, BuiltinNodesPlugin))
            .add_systems(
                PostUpdate,
                blend_tree_player.before(TransformSystems::Propagate),
            );
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use bevy::time::TimeUpdateStrategy;
    use bevy_blend_tree_builtin_nodes::{
        blend_n_node::BlendNNode, pose_source_node::PoseSourceNode,
    };
    use bevy_blend_tree_core::{
        actor::Actor, blend_tree::BlendTree, errors::GraphError, skeleton::Skeleton,
    };

    use super::*;
    use crate::player::BlendTreePlayer;

    fn actor() -> Arc<Actor> {
        let skeleton = Arc::new(Skeleton::chain(2));
        Arc::new(
            Actor::new(
                "pair",
                skeleton,
                vec![Transform::IDENTITY, Transform::from_xyz(0., 1., 0.)],
            )
            .unwrap(),
        )
    }

    fn app() -> App {
        let mut app = App::new();
        app.add_plugins((MinimalPlugins, BlendTreePlugin))
            .insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_millis(100)));
        app
    }

    #[test]
    fn players_advance_with_time() {
        let mut tree = BlendTree::new();
        let source = tree.add_node("source", PoseSourceNode::new(10.)).unwrap();
        let blend = tree.add_node("blend", BlendNNode::default()).unwrap();
        tree.connect(source, PoseSourceNode::OUT_POSE, blend, BlendNNode::IN_POSES[0])
            .unwrap();
        tree.set_root(blend).unwrap();
        tree.initialize();
        let tree = Arc::new(tree);

        let mut app = app();
        let playing = app
            .world_mut()
            .spawn(BlendTreePlayer::new(tree.clone(), actor()).unwrap())
            .id();
        let mut paused = BlendTreePlayer::new(tree, actor()).unwrap();
        paused.pause();
        let paused = app.world_mut().spawn(paused).id();

        for _ in 0..3 {
            app.update();
        }

        let player = app.world().get::<BlendTreePlayer>(playing).unwrap();
        assert!(player.error().is_none());
        let time = player.instance().node_data(source).unwrap().current_time;
        assert!(time > 0.);

        let player = app.world().get::<BlendTreePlayer>(paused).unwrap();
        assert!(player.instance().node_data(source).is_none());
    }

    #[test]
    fn evaluation_errors_are_kept_on_the_player() {
        let mut tree = BlendTree::new();
        tree.add_node("source", PoseSourceNode::new(1.)).unwrap();
        tree.initialize();

        let mut app = app();
        let entity = app
            .world_mut()
            .spawn(BlendTreePlayer::new(Arc::new(tree), actor()).unwrap())
            .id();
        app.update();

        let player = app.world().get::<BlendTreePlayer>(entity).unwrap();
        assert_eq!(player.error(), Some(&GraphError::MissingRoot));
    }
}
