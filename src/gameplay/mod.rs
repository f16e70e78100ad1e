pub mod physics;
pub mod race;
pub mod scene;
pub mod vehicle;

use crate::config::GameConfig;
use crate::states::GameState;
use bevy::prelude::*;
use physics::PhysicsBindingPlugin;
use race::RacePlugin;
use scene::TrackScenePlugin;
use vehicle::VehicleGameplayPlugin;

/// Per-frame order: read input, create pending bodies, drive vehicles, then evaluate the race.
/// The physics step itself runs in `PostUpdate`.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameplaySet {
    Input,
    Bodies,
    Vehicles,
    Race,
}

pub struct GameplayPlugin;

impl Plugin for GameplayPlugin {
    fn build(&self, app: &mut App) {
        app.configure_sets(
            Update,
            (
                GameplaySet::Input,
                GameplaySet::Bodies,
                GameplaySet::Vehicles,
                GameplaySet::Race,
            )
                .chain()
                .run_if(in_state(GameState::InRun))
                .run_if(resource_exists::<GameConfig>),
        )
        .add_plugins(PhysicsBindingPlugin)
        .add_plugins(TrackScenePlugin)
        .add_plugins(VehicleGameplayPlugin)
        .add_plugins(RacePlugin);
    }
}
