use bevy::prelude::*;
use bevy_blend_tree_core::{
    animation_node::{NodeLike, ReflectNodeLike},
    context::{node_context::NodeContext, spec_context::SpecContext},
    edge_data::events::{AnimationEvent, SampledEvent},
    errors::GraphError,
    ref_data::mirror_delta,
    sync::SyncTrack,
    unique_data::NodeFlags,
};
use serde::{Deserialize, Serialize};

/// Local translation and rotation replacing a joint's bind pose.
#[derive(Reflect, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JointOverride {
    pub joint: String,
    pub translation: Vec3,
    pub rotation: Quat,
}

impl JointOverride {
    pub fn new(joint: impl Into<String>, translation: Vec3, rotation: Quat) -> Self {
        Self {
            joint: joint.into(),
            translation,
            rotation,
        }
    }
}

#[derive(Reflect, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimedEvent {
    pub time: f32,
    pub event: AnimationEvent,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct PoseSourceState {
    /// Time at the start of the last update
    pub previous_time: f32,
    /// Unwrapped time advanced by the last update
    pub elapsed: f32,
}

/// A looping motion with a fixed pose: the bind pose with some joints overridden.
///
/// It advances its own time, exposes its sync track and emits timed events and a constant
/// root velocity, which makes it the leaf motion of a blend tree.
#[derive(Reflect, Clone, Debug, Serialize, Deserialize)]
#[reflect(Default, NodeLike)]
#[type_path = "bevy_blend_tree::builtin_nodes"]
#[serde(default)]
pub struct PoseSourceNode {
    pub joint_overrides: Vec<JointOverride>,
    pub duration: f32,
    pub play_speed: f32,
    pub sync_track: SyncTrack,
    pub events: Vec<TimedEvent>,
    /// Root motion per second of playback
    pub root_velocity: Vec3,
}

impl Default for PoseSourceNode {
    fn default() -> Self {
        Self {
            joint_overrides: Vec::new(),
            duration: 1.,
            play_speed: 1.,
            sync_track: SyncTrack::default(),
            events: Vec::new(),
            root_velocity: Vec3::ZERO,
        }
    }
}

impl PoseSourceNode {
    pub const OUT_POSE: &'static str = "pose";

    pub fn new(duration: f32) -> Self {
        Self {
            duration,
            ..default()
        }
    }

    pub fn with_override(mut self, joint_override: JointOverride) -> Self {
        self.joint_overrides.push(joint_override);
        self
    }

    pub fn with_sync_track(mut self, sync_track: SyncTrack) -> Self {
        self.sync_track = sync_track;
        self
    }

    pub fn with_event(mut self, time: f32, event: AnimationEvent) -> Self {
        self.events.push(TimedEvent { time, event });
        self
    }

    pub fn with_root_velocity(mut self, root_velocity: Vec3) -> Self {
        self.root_velocity = root_velocity;
        self
    }

    pub fn with_play_speed(mut self, play_speed: f32) -> Self {
        self.play_speed = play_speed;
        self
    }

    fn publish_timeline(&self, ctx: &mut NodeContext) -> Result<(), GraphError> {
        let node = ctx.node_index();
        let data = ctx.data_mut()?;
        data.duration = self.duration.max(0.);
        data.sync_track_source = Some(node);
        Ok(())
    }

    /// Whether an event at `time` lies in the wrapped interval `(from, from + elapsed]`.
    fn crossed(&self, time: f32, from: f32, elapsed: f32) -> bool {
        if self.duration <= 0. || elapsed <= 0. {
            return false;
        }
        if elapsed >= self.duration {
            return true;
        }
        let offset = (time - from).rem_euclid(self.duration);
        offset > 0. && offset <= elapsed
    }
}

impl NodeLike for PoseSourceNode {
    fn display_name(&self) -> String {
        "Pose Source".into()
    }

    fn spec(&self, mut ctx: SpecContext) -> Result<(), GraphError> {
        ctx.add_output_pose(Self::OUT_POSE);
        Ok(())
    }

    fn sync_track(&self) -> Option<&SyncTrack> {
        Some(&self.sync_track)
    }

    fn top_down_update(&self, ctx: &mut NodeContext, _: f32) -> Result<(), GraphError> {
        if !ctx.is_enabled() {
            return Ok(());
        }
        self.publish_timeline(ctx)
    }

    fn update(&self, ctx: &mut NodeContext, delta_time: f32) -> Result<(), GraphError> {
        if !ctx.is_enabled() {
            ctx.data_mut()?.clear();
            return Ok(());
        }
        self.publish_timeline(ctx)?;

        let data = ctx.data_mut()?;
        // Synced sources follow the speed handed down by the leader.
        let speed = if data.has_flag(NodeFlags::SYNCED) {
            data.play_speed
        } else {
            data.play_speed * self.play_speed
        };
        let previous_time = data.current_time;
        let elapsed = (delta_time * speed).max(0.);
        data.pre_sync_time = previous_time;
        data.current_time = if self.duration > 0. {
            (previous_time + elapsed).rem_euclid(self.duration)
        } else {
            0.
        };

        *ctx.state_mut_or_insert_with(PoseSourceState::default)? = PoseSourceState {
            previous_time,
            elapsed,
        };
        Ok(())
    }

    fn post_update(&self, ctx: &mut NodeContext, _: f32) -> Result<(), GraphError> {
        let Some(state) = ctx.state::<PoseSourceState>().copied().filter(|_| ctx.is_enabled())
        else {
            ctx.output_empty_ref_data();
            return Ok(());
        };

        let mut ref_data = ctx.request_ref_data();
        for timed in &self.events {
            if self.crossed(timed.time, state.previous_time, state.elapsed) {
                let mut sampled = SampledEvent::instant(timed.event.clone());
                if self.duration > 0. {
                    sampled.percentage = timed.time / self.duration;
                }
                ref_data.events.push(sampled);
            }
        }
        ref_data.trajectory_delta = Transform::from_translation(self.root_velocity * state.elapsed);
        ref_data.trajectory_delta_mirrored = mirror_delta(&ref_data.trajectory_delta);
        ctx.set_output_ref_data(ref_data);
        Ok(())
    }

    fn output(&self, ctx: &mut NodeContext) -> Result<(), GraphError> {
        let actor = ctx.actor();
        let mut pose = ctx.request_pose();
        pose.init_from_bind_pose(&actor);
        if ctx.is_enabled() {
            for joint_override in &self.joint_overrides {
                let Some(index) = actor.skeleton().find_joint_by_name(&joint_override.joint)
                else {
                    continue;
                };
                let mut transform = pose.local_space_transform(index);
                transform.translation = joint_override.translation;
                transform.rotation = joint_override.rotation;
                pose.set_local_space_transform(index, transform);
            }
        }
        ctx.set_output_pose(pose);
        Ok(())
    }

    fn rewind(&self, ctx: &mut NodeContext) -> Result<(), GraphError> {
        ctx.default_rewind()?;
        *ctx.state_mut_or_insert_with(PoseSourceState::default)? = PoseSourceState::default();
        Ok(())
    }
}
