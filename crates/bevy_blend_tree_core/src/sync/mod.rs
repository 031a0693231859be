use bevy::reflect::{Reflect, std_traits::ReflectDefault};
use serde::{Deserialize, Serialize};

use crate::{
    interpolation::linear::InterpolateLinear,
    unique_data::{NodeData, NodeFlags},
};

/// How the timelines of several motion sources feeding one node are reconciled.
#[derive(Reflect, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[reflect(Default)]
pub enum SyncMode {
    /// Every source plays at its own pace
    #[default]
    Disabled,
    /// Followers match the leader segment by segment, using sync markers
    TrackBased,
    /// Followers match the leader's normalized time over the full clip
    ClipBased,
}

#[derive(Reflect, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncMarker {
    pub time: f32,
    pub id: String,
}

impl SyncMarker {
    pub fn new(time: f32, id: impl Into<String>) -> Self {
        Self {
            time,
            id: id.into(),
        }
    }
}

/// Markers splitting a looping timeline into segments (e.g. left foot down, right foot down).
/// Markers are kept sorted by time.
#[derive(Reflect, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<SyncMarker>", into = "Vec<SyncMarker>")]
pub struct SyncTrack {
    markers: Vec<SyncMarker>,
}

/// A segment between two consecutive markers, wrapping around at the end of the timeline.
pub type SyncSegment = (usize, usize);

impl SyncTrack {
    pub fn new(mut markers: Vec<SyncMarker>) -> Self {
        markers.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { markers }
    }

    pub fn markers(&self) -> &[SyncMarker] {
        &self.markers
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// The segment containing `time`. Times before the first marker belong to the wrapping
    /// segment that starts at the last marker.
    pub fn find_segment(&self, time: f32) -> Option<SyncSegment> {
        if self.markers.is_empty() {
            return None;
        }
        let last = self.markers.len() - 1;
        Some(
            match self.markers.iter().position(|marker| marker.time > time) {
                Some(0) | None => (last, 0),
                Some(right) => (right - 1, right),
            },
        )
    }

    pub fn segment_length(&self, segment: SyncSegment, duration: f32) -> f32 {
        let start = self.markers[segment.0].time;
        let end = self.markers[segment.1].time;
        if end > start {
            end - start
        } else {
            end + duration - start
        }
    }

    /// Segment containing `time` and how far into it `time` is, from 0 to 1.
    pub fn segment_progress(&self, time: f32, duration: f32) -> Option<(SyncSegment, f32)> {
        let segment = self.find_segment(time)?;
        let length = self.segment_length(segment, duration);
        let mut elapsed = time - self.markers[segment.0].time;
        if elapsed < 0. {
            elapsed += duration;
        }
        let progress = if length > f32::EPSILON {
            (elapsed / length).clamp(0., 1.)
        } else {
            0.
        };
        Some((segment, progress))
    }

    /// The segment of this track bounded by the same marker ids as `segment` of `other`,
    /// falling back to the segment starting at the same marker index.
    pub fn find_matching_segment(
        &self,
        other: &SyncTrack,
        segment: SyncSegment,
    ) -> Option<SyncSegment> {
        if self.markers.is_empty() {
            return None;
        }
        let len = self.markers.len();
        let start_id = &other.markers[segment.0].id;
        let end_id = &other.markers[segment.1].id;

        let matching = (0..len).find(|&i| {
            self.markers[i].id == *start_id && self.markers[(i + 1) % len].id == *end_id
        });
        let start = matching.unwrap_or(segment.0 % len);
        Some((start, (start + 1) % len))
    }

    /// Time at `progress` through `segment`, wrapped into `[0, duration)`.
    pub fn time_in_segment(&self, segment: SyncSegment, progress: f32, duration: f32) -> f32 {
        let time =
            self.markers[segment.0].time + progress * self.segment_length(segment, duration);
        if duration > 0. && time >= duration {
            time - duration
        } else {
            time
        }
    }
}

impl From<Vec<SyncMarker>> for SyncTrack {
    fn from(value: Vec<SyncMarker>) -> Self {
        Self::new(value)
    }
}

impl From<SyncTrack> for Vec<SyncMarker> {
    fn from(value: SyncTrack) -> Self {
        value.markers
    }
}

/// Speed multipliers that make a leader and a follower progress through their timelines at
/// the same normalized rate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SyncFactors {
    pub leader: f32,
    pub follower: f32,
    pub play_speed: f32,
}

/// With syncing disabled, or a timeless side, both factors are 1 and only the play speed is
/// blended. Otherwise the blended duration is interpolated by `weight` between leader and
/// follower.
pub fn calc_sync_factors(
    leader_speed: f32,
    leader_duration: f32,
    follower_speed: f32,
    follower_duration: f32,
    mode: SyncMode,
    weight: f32,
) -> SyncFactors {
    let play_speed = leader_speed.interpolate_linear(&follower_speed, weight);

    if mode == SyncMode::Disabled
        || leader_duration <= f32::EPSILON
        || follower_duration <= f32::EPSILON
    {
        return SyncFactors {
            leader: 1.,
            follower: 1.,
            play_speed,
        };
    }

    SyncFactors {
        leader: 1_f32.interpolate_linear(&(leader_duration / follower_duration), weight),
        follower: (follower_duration / leader_duration).interpolate_linear(&1., weight),
        play_speed,
    }
}

/// A node timeline taking part in a sync, with its optional sync track.
#[derive(Clone, Copy)]
pub struct SyncSide<'a> {
    pub data: &'a NodeData,
    pub track: Option<&'a SyncTrack>,
}

/// Makes `follower` follow the timeline of `leader`.
///
/// Track-based syncing locks the follower's phase to the matching segment every tick. Clip-based
/// syncing, and track-based syncing without usable tracks, only moves the follower's time when
/// `resync` is set. In every enabled mode the follower's play speed is scaled so both
/// timelines progress at the same normalized rate.
pub fn auto_sync(
    leader: SyncSide,
    follower: &mut NodeData,
    follower_track: Option<&SyncTrack>,
    weight: f32,
    mode: SyncMode,
    resync: bool,
) {
    if mode == SyncMode::Disabled {
        return;
    }

    let tracks = match (leader.track, follower_track) {
        (Some(l), Some(f)) if mode == SyncMode::TrackBased && !l.is_empty() && !f.is_empty() => {
            Some((l, f))
        }
        _ => None,
    };

    let (leader_duration, follower_duration) = match tracks {
        Some((leader_track, track)) => {
            let Some((segment, progress)) =
                leader_track.segment_progress(leader.data.current_time, leader.data.duration)
            else {
                return;
            };
            let Some(matching) = track.find_matching_segment(leader_track, segment) else {
                return;
            };
            follower.current_time = track.time_in_segment(matching, progress, follower.duration);
            (
                leader_track.segment_length(segment, leader.data.duration),
                track.segment_length(matching, follower.duration),
            )
        }
        None => {
            if resync && follower.duration > 0. {
                follower.current_time = leader.data.normalized_time() * follower.duration;
            }
            (leader.data.duration, follower.duration)
        }
    };

    let factors = calc_sync_factors(
        leader.data.play_speed,
        leader_duration,
        follower.play_speed,
        follower_duration,
        mode,
        weight,
    );
    follower.play_speed = leader.data.play_speed * factors.follower;
    follower.set_flag(NodeFlags::SYNCED, true);
}
