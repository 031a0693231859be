use bevy::prelude::*;

use crate::player::BlendTreePlayer;

/// Ticks every [`BlendTreePlayer`] by the frame's delta time. Players are independent, so they
/// are evaluated in parallel.
pub fn blend_tree_player(time: Res<Time>, mut players: Query<&mut BlendTreePlayer>) {
    let delta_time = time.delta_secs();
    players
        .par_iter_mut()
        .for_each(|mut player| player.tick(delta_time));
}
