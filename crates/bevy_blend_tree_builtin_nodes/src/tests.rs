use std::sync::Arc;

use bevy::prelude::*;
use bevy_blend_tree_core::{
    actor::Actor,
    blend_tree::{BlendTree, NodeIndex},
    edge_data::{DataSpec, events::AnimationEvent},
    graph_instance::GraphInstance,
    instance_registry::GraphInstances,
    simulated_object::{SimulatedJoint, SimulatedObject, SimulatedObjectSetup},
    skeleton::Skeleton,
    sync::SyncMode,
    unique_data::NodeFlags,
};

use crate::{
    blend_n_node::{BlendNNode, BlendNParamWeight, EventMode},
    f32::const_f32::ConstF32,
    hub_node::HubNode,
    parameter_node::ParameterNode,
    pose_source_node::{JointOverride, PoseSourceNode},
    simulated_object_node::{SimulatedObjectNode, SimulatedObjectState},
};

fn chain_actor(num_joints: usize) -> Actor {
    let skeleton = Arc::new(Skeleton::chain(num_joints));
    let bind = (0..num_joints)
        .map(|i| {
            if i == 0 {
                Transform::IDENTITY
            } else {
                Transform::from_xyz(0., 1., 0.)
            }
        })
        .collect();
    Actor::new("chain", skeleton, bind).unwrap()
}

/// Source whose second joint is moved `x` units sideways.
fn shifted_source(x: f32) -> PoseSourceNode {
    PoseSourceNode::new(1.).with_override(JointOverride::new(
        "joint_1",
        Vec3::new(x, 1., 0.),
        Quat::IDENTITY,
    ))
}

fn joint_1_x(instance: &GraphInstance) -> f32 {
    instance.output_pose().local_space_transform(1).translation.x
}

/// BlendN root fed by one source per entry of `offsets` and a constant weight.
fn blend_tree(offsets: &[f32], weight: f32, blend: BlendNNode) -> (BlendTree, NodeIndex, Vec<NodeIndex>) {
    let mut tree = BlendTree::new();
    let sources: Vec<_> = offsets
        .iter()
        .enumerate()
        .map(|(i, x)| tree.add_node(format!("source_{i}"), shifted_source(*x)).unwrap())
        .collect();
    let weight = tree.add_node("weight", ConstF32::new(weight)).unwrap();
    let blend = tree.add_node("blend", blend).unwrap();
    for (i, source) in sources.iter().enumerate() {
        tree.connect(
            *source,
            PoseSourceNode::OUT_POSE,
            blend,
            BlendNNode::IN_POSES[i],
        )
        .unwrap();
    }
    tree.connect(weight, ConstF32::OUTPUT, blend, BlendNNode::IN_WEIGHT)
        .unwrap();
    tree.set_root(blend).unwrap();
    tree.initialize();
    (tree, blend, sources)
}

#[test]
fn blends_the_bracketing_pair() {
    let (tree, _, _) = blend_tree(&[0., 2., 4.], 0.25, BlendNNode::default());
    let mut instance = GraphInstance::new(&tree, Arc::new(chain_actor(5))).unwrap();
    instance.tick(&tree, 0.1).unwrap();

    assert!((joint_1_x(&instance) - 1.).abs() < 1e-5);
    let mut pose = instance.output_pose().clone();
    assert!(
        pose.model_space_transform(4)
            .translation
            .abs_diff_eq(Vec3::new(1., 4., 0.), 1e-5)
    );
}

#[test]
fn weights_outside_the_range_select_an_end() {
    let (tree, _, _) = blend_tree(&[0., 2., 4.], 7., BlendNNode::default());
    let mut instance = GraphInstance::new(&tree, Arc::new(chain_actor(3))).unwrap();
    instance.tick(&tree, 0.1).unwrap();
    assert_eq!(joint_1_x(&instance), 4.);

    let (tree, _, _) = blend_tree(&[0., 2., 4.], -3., BlendNNode::default());
    let mut instance = GraphInstance::new(&tree, Arc::new(chain_actor(3))).unwrap();
    instance.tick(&tree, 0.1).unwrap();
    assert_eq!(joint_1_x(&instance), 0.);
}

#[test]
fn single_input_passes_through() {
    let mut tree = BlendTree::new();
    let source = tree.add_node("source", shifted_source(3.)).unwrap();
    let blend = tree.add_node("blend", BlendNNode::default()).unwrap();
    tree.connect(source, PoseSourceNode::OUT_POSE, blend, BlendNNode::IN_POSES[4])
        .unwrap();
    tree.set_root(blend).unwrap();
    tree.initialize();

    let mut instance = GraphInstance::new(&tree, Arc::new(chain_actor(3))).unwrap();
    instance.tick(&tree, 0.1).unwrap();
    assert_eq!(joint_1_x(&instance), 3.);
}

#[test]
fn unconnected_blend_outputs_bind_pose() {
    let mut tree = BlendTree::new();
    let blend = tree.add_node("blend", BlendNNode::default()).unwrap();
    tree.set_root(blend).unwrap();
    tree.initialize();

    let mut instance = GraphInstance::new(&tree, Arc::new(chain_actor(3))).unwrap();
    instance.tick(&tree, 0.1).unwrap();
    assert_eq!(
        instance.output_pose().local_space_transform(1),
        Transform::from_xyz(0., 1., 0.)
    );
}

#[test]
fn disabled_blend_outputs_bind_pose() {
    let (mut tree, blend, _) = blend_tree(&[0., 2.], 0.5, BlendNNode::default());
    tree.set_enabled(blend, false).unwrap();

    let mut instance = GraphInstance::new(&tree, Arc::new(chain_actor(3))).unwrap();
    instance.tick(&tree, 0.1).unwrap();
    assert_eq!(joint_1_x(&instance), 0.);
    assert!(instance.root_ref_data().events.is_empty());
}

#[test]
fn most_active_events_and_blended_root_motion() {
    let mut tree = BlendTree::new();
    let slow = tree
        .add_node(
            "slow",
            PoseSourceNode::new(1.)
                .with_event(0.05, AnimationEvent::new("slow_step"))
                .with_root_velocity(Vec3::X),
        )
        .unwrap();
    let fast = tree
        .add_node(
            "fast",
            PoseSourceNode::new(1.)
                .with_event(0.05, AnimationEvent::new("fast_step"))
                .with_root_velocity(Vec3::X * 3.),
        )
        .unwrap();
    let weight = tree.add_node("weight", ConstF32::new(0.75)).unwrap();
    let blend = tree
        .add_node(
            "blend",
            BlendNNode::new(SyncMode::Disabled, EventMode::MostActive),
        )
        .unwrap();
    tree.connect(slow, PoseSourceNode::OUT_POSE, blend, BlendNNode::IN_POSES[0])
        .unwrap();
    tree.connect(fast, PoseSourceNode::OUT_POSE, blend, BlendNNode::IN_POSES[1])
        .unwrap();
    tree.connect(weight, ConstF32::OUTPUT, blend, BlendNNode::IN_WEIGHT)
        .unwrap();
    tree.set_root(blend).unwrap();
    tree.initialize();

    let mut instance = GraphInstance::new(&tree, Arc::new(chain_actor(2))).unwrap();
    instance.tick(&tree, 0.1).unwrap();

    let ref_data = instance.root_ref_data();
    let events: Vec<_> = ref_data.events.iter().collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event.id, "fast_step");
    assert!((events[0].weight - 0.75).abs() < 1e-6);
    assert!((ref_data.trajectory_delta.translation.x - 0.25).abs() < 1e-5);
    assert!((ref_data.trajectory_delta_mirrored.translation.x + 0.25).abs() < 1e-5);

    // The event lies behind the playhead on the next tick
    instance.tick(&tree, 0.1).unwrap();
    assert!(instance.root_ref_data().events.is_empty());
}

#[test]
fn clip_based_sync_matches_normalized_rates() {
    let mut tree = BlendTree::new();
    let short = tree.add_node("short", PoseSourceNode::new(1.)).unwrap();
    let long = tree.add_node("long", PoseSourceNode::new(2.)).unwrap();
    let weight = tree.add_node("weight", ConstF32::new(0.5)).unwrap();
    let blend = tree
        .add_node(
            "blend",
            BlendNNode::new(SyncMode::ClipBased, EventMode::default()),
        )
        .unwrap();
    tree.connect(short, PoseSourceNode::OUT_POSE, blend, BlendNNode::IN_POSES[0])
        .unwrap();
    tree.connect(long, PoseSourceNode::OUT_POSE, blend, BlendNNode::IN_POSES[1])
        .unwrap();
    tree.connect(weight, ConstF32::OUTPUT, blend, BlendNNode::IN_WEIGHT)
        .unwrap();
    tree.set_root(blend).unwrap();
    tree.initialize();

    let mut instance = GraphInstance::new(&tree, Arc::new(chain_actor(2))).unwrap();
    instance.tick(&tree, 0.1).unwrap();
    instance.tick(&tree, 0.1).unwrap();

    let short_data = instance.node_data(short).unwrap();
    let long_data = instance.node_data(long).unwrap();
    assert!(short_data.has_flag(NodeFlags::SYNCED));
    assert!(long_data.has_flag(NodeFlags::SYNCED));
    assert!((short_data.play_speed - 0.75).abs() < 1e-6);
    assert!((long_data.play_speed - 1.5).abs() < 1e-6);
    assert!(
        (short_data.play_speed / short_data.duration - long_data.play_speed / long_data.duration)
            .abs()
            < 1e-6
    );
}

#[test]
fn hub_routes_the_selected_source() {
    let mut tree = BlendTree::new();
    let left = tree.add_node("left", shifted_source(1.)).unwrap();
    let right = tree.add_node("right", shifted_source(5.)).unwrap();
    let hub = tree.add_node("hub", HubNode::new()).unwrap();
    tree.connect(left, PoseSourceNode::OUT_POSE, hub, HubNode::IN_POSES[0])
        .unwrap();
    tree.connect(right, PoseSourceNode::OUT_POSE, hub, HubNode::IN_POSES[2])
        .unwrap();
    tree.set_root(hub).unwrap();
    tree.initialize();

    let mut instance = GraphInstance::new(&tree, Arc::new(chain_actor(3))).unwrap();
    instance.tick(&tree, 0.1).unwrap();
    assert_eq!(joint_1_x(&instance), 1.);

    HubNode::set_selected_source(&mut instance, &tree, hub, Some(2)).unwrap();
    instance.tick(&tree, 0.1).unwrap();
    assert_eq!(joint_1_x(&instance), 5.);
    // Only the routed source advances
    assert!((instance.node_data(left).unwrap().current_time - 0.1).abs() < 1e-6);

    HubNode::set_selected_source(&mut instance, &tree, hub, Some(1)).unwrap();
    instance.tick(&tree, 0.1).unwrap();
    assert_eq!(joint_1_x(&instance), 1.);
}

#[test]
fn parameters_drive_the_blend_weight() {
    let mut tree = BlendTree::new();
    let a = tree.add_node("a", shifted_source(0.)).unwrap();
    let b = tree.add_node("b", shifted_source(4.)).unwrap();
    let parameter = tree
        .add_node("speed", ParameterNode::new("speed", DataSpec::F32))
        .unwrap();
    let blend = tree.add_node("blend", BlendNNode::default()).unwrap();
    tree.connect(a, PoseSourceNode::OUT_POSE, blend, BlendNNode::IN_POSES[0])
        .unwrap();
    tree.connect(b, PoseSourceNode::OUT_POSE, blend, BlendNNode::IN_POSES[1])
        .unwrap();
    tree.connect(parameter, ParameterNode::OUTPUT, blend, BlendNNode::IN_WEIGHT)
        .unwrap();
    tree.set_root(blend).unwrap();
    tree.add_parameter("speed", 0.5_f32);
    tree.initialize();

    let mut instance = GraphInstance::new(&tree, Arc::new(chain_actor(3))).unwrap();
    instance.tick(&tree, 0.1).unwrap();
    assert!((joint_1_x(&instance) - 2.).abs() < 1e-5);

    instance.set_parameter("speed", 1_f32);
    instance.tick(&tree, 0.1).unwrap();
    assert_eq!(joint_1_x(&instance), 4.);
}

fn simulated_tree(weight: f32) -> (BlendTree, NodeIndex) {
    simulated_tree_with(SimulatedObjectNode::new(vec!["tail".into(), "missing".into()]), weight)
}

fn simulated_tree_with(node: SimulatedObjectNode, weight: f32) -> (BlendTree, NodeIndex) {
    let mut tree = BlendTree::new();
    let source = tree.add_node("source", shifted_source(0.5)).unwrap();
    let weight = tree.add_node("weight", ConstF32::new(weight)).unwrap();
    let simulated = tree.add_node("tail", node).unwrap();
    tree.connect(
        source,
        PoseSourceNode::OUT_POSE,
        simulated,
        SimulatedObjectNode::IN_POSE,
    )
    .unwrap();
    tree.connect(
        weight,
        ConstF32::OUTPUT,
        simulated,
        SimulatedObjectNode::IN_WEIGHT,
    )
    .unwrap();
    tree.set_root(simulated).unwrap();
    tree.initialize();
    (tree, simulated)
}

fn tail_actor() -> Actor {
    chain_actor(4).with_simulated_object_setup(SimulatedObjectSetup::new(vec![
        SimulatedObject::new(
            "tail",
            vec![SimulatedJoint::new("joint_2"), SimulatedJoint::new("joint_3")],
        ),
    ]))
}

/// Asserts the output is exactly the pose produced by `shifted_source(0.5)` on a four joint chain.
fn assert_source_pose(instance: &GraphInstance) {
    let pose = instance.output_pose();
    let expected = [
        Transform::IDENTITY,
        Transform::from_xyz(0.5, 1., 0.),
        Transform::from_xyz(0., 1., 0.),
        Transform::from_xyz(0., 1., 0.),
    ];
    for (joint, transform) in expected.iter().enumerate() {
        assert_eq!(pose.local_space_transform(joint), *transform, "joint {joint}");
    }
}

#[test]
fn missing_setup_flags_error_and_passes_through() {
    let (tree, simulated) = simulated_tree(1.);
    let mut instance = GraphInstance::new(&tree, Arc::new(chain_actor(4))).unwrap();
    for _ in 0..3 {
        instance.tick(&tree, 0.1).unwrap();
    }

    assert!(instance.has_flag(simulated, NodeFlags::HAS_ERROR));
    let state = instance
        .node_state::<SimulatedObjectState>(simulated)
        .unwrap();
    assert!(!state.is_valid);
    assert!(state.simulations.is_empty());
    assert_source_pose(&instance);
}

#[test]
fn disabled_simulation_passes_input_through() {
    let (mut tree, simulated) = simulated_tree(1.);
    tree.set_enabled(simulated, false).unwrap();
    let mut instance = GraphInstance::new(&tree, Arc::new(tail_actor())).unwrap();
    for _ in 0..5 {
        instance.tick(&tree, 1. / 30.).unwrap();
    }

    assert_source_pose(&instance);
    assert!(instance.node_state::<SimulatedObjectState>(simulated).is_none());
    // The input keeps advancing while the node is bypassed
    assert!((instance.node_data(simulated).unwrap().current_time - 5. / 30.).abs() < 1e-5);

    tree.set_enabled(simulated, true).unwrap();
    instance.tick(&tree, 1. / 30.).unwrap();
    let state = instance
        .node_state::<SimulatedObjectState>(simulated)
        .unwrap();
    assert!(state.is_valid);
    assert_eq!(state.simulations.len(), 1);
}

#[test]
fn repeated_object_names_build_one_solver() {
    let (tree, simulated) = simulated_tree_with(
        SimulatedObjectNode::new(vec!["tail".into(), "tail".into()]),
        1.,
    );
    let mut instance = GraphInstance::new(&tree, Arc::new(tail_actor())).unwrap();
    instance.tick(&tree, 1. / 60.).unwrap();

    let state = instance
        .node_state::<SimulatedObjectState>(simulated)
        .unwrap();
    assert_eq!(state.simulations.len(), 1);
    assert_eq!(state.simulations[0].simulated_object_name, "tail");
}

#[test]
fn zero_weight_keeps_input_but_steps_solvers() {
    let (tree, simulated) = simulated_tree(0.);
    let mut instance = GraphInstance::new(&tree, Arc::new(tail_actor())).unwrap();
    for _ in 0..5 {
        instance.tick(&tree, 1. / 30.).unwrap();
    }

    assert!(!instance.has_flag(simulated, NodeFlags::HAS_ERROR));
    let state = instance
        .node_state::<SimulatedObjectState>(simulated)
        .unwrap();
    // The unknown object name is skipped
    assert_eq!(state.simulations.len(), 1);
    assert_eq!(state.simulations[0].simulated_object_name, "tail");
    assert_eq!(state.time_passed, 0.);

    let mut pose = instance.output_pose().clone();
    assert!(
        pose.model_space_transform(3)
            .translation
            .abs_diff_eq(Vec3::new(0.5, 3., 0.), 1e-5)
    );
}

#[test]
fn broadcast_reconfiguration() {
    let (tree, simulated) = simulated_tree(1.);
    let actor = Arc::new(tail_actor());
    let mut instances = GraphInstances::new();
    instances.insert(GraphInstance::new(&tree, actor.clone()).unwrap());
    let removed = instances.insert(GraphInstance::new(&tree, actor.clone()).unwrap());
    instances.insert(GraphInstance::new(&tree, actor).unwrap());
    for instance in instances.instances_mut() {
        instance.tick(&tree, 1. / 60.).unwrap();
    }
    let removed = instances.remove(removed).unwrap();

    let node = SimulatedObjectNode {
        num_iterations: 50,
        update_rate: 30.,
        ..SimulatedObjectNode::default()
    };
    node.on_num_iterations_changed(instances.instances_mut(), simulated);
    node.on_update_rate_changed(instances.instances_mut(), simulated);
    SimulatedObjectNode::adjust_particles(instances.instances_mut(), simulated, |particle| {
        particle.config.gravity_factor = 0.
    });
    SimulatedObjectNode::reinit(instances.instances_mut(), simulated);

    assert_eq!(instances.len(), 2);
    for (_, instance) in instances.iter() {
        let state = instance
            .node_state::<SimulatedObjectState>(simulated)
            .unwrap();
        assert!(state.must_update);
        let solver = &state.simulations[0].solver;
        assert_eq!(solver.num_iterations(), 10);
        assert!((solver.fixed_time_step() - 1. / 30.).abs() < 1e-6);
        assert!(
            solver
                .particles()
                .iter()
                .all(|particle| particle.config.gravity_factor == 0.)
        );
    }

    // Instances outside the registry are not reconfigured
    let state = removed
        .node_state::<SimulatedObjectState>(simulated)
        .unwrap();
    assert!(!state.must_update);
    assert_eq!(state.simulations[0].solver.num_iterations(), 2);
}

#[test]
fn node_parameters_from_ron() {
    let node: SimulatedObjectNode =
        ron::de::from_str(r#"(simulated_object_names: ["tail"], update_rate: 500.)"#).unwrap();
    assert_eq!(node.simulated_object_names, vec!["tail".to_string()]);
    assert_eq!(node.clamped_update_rate(), 150.);
    assert_eq!(node.num_iterations, 2);
    assert_eq!(node.stiffness_factor, 1.);

    let blend: BlendNNode = ron::de::from_str(
        r#"(
            sync_mode: ClipBased,
            event_mode: Both,
            param_weights: [(port: 0, weight_range: 0.), (port: 2, weight_range: 2.)],
        )"#,
    )
    .unwrap();
    assert_eq!(blend.sync_mode, SyncMode::ClipBased);
    assert_eq!(blend.event_mode, EventMode::Both);
    assert_eq!(blend.param_weights[1], BlendNParamWeight::new(2, 2.));
}

#[test]
fn simulated_object_setup_from_ron() {
    let setup = SimulatedObjectSetup::from_ron(
        r#"(
            objects: [
                (
                    name: "tail",
                    joints: [(joint: "joint_2", stiffness: 0.5), (joint: "joint_3")],
                ),
            ],
        )"#,
    )
    .unwrap();
    assert_eq!(setup.len(), 1);
    let tail = setup.find_by_name("tail").unwrap();
    assert_eq!(tail.joints[0].stiffness, 0.5);
    assert_eq!(tail.joints[1].mass, 1.);
}
