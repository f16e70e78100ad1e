mod progress;
mod state;

pub use progress::{
    check_player_progress, distance_to_next_checkpoint, order_checkpoints, rank_positions,
    targeted_checkpoints, Checkpoint, CheckpointTarget, ProgressEvent, RacePlayer, RankingEntry,
};
pub use state::{race_status_text, CountdownTick, RaceManager, RaceState};

use super::physics::{reset_body_to_spawn, PhysicsBodySpec};
use super::vehicle::{DriverControlled, RaycastVehicle, VehicleControl};
use super::GameplaySet;
use crate::config::GameConfig;
use bevy::prelude::*;
use bevy_rapier3d::prelude::*;

pub struct RacePlugin;

impl Plugin for RacePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<RaceOverview>()
            .init_resource::<RaceInputState>()
            .init_resource::<RaceInputBindings>()
            .add_message::<RaceResetEvent>()
            .add_systems(Update, read_race_input.in_set(GameplaySet::Input))
            .add_systems(
                Update,
                (
                    update_race,
                    reset_player_bodies,
                    sync_checkpoint_markers,
                    publish_race_overview,
                )
                    .chain()
                    .in_set(GameplaySet::Race),
            );
    }
}

/// Everything the HUD and the input gate need to know about the race, refreshed every frame.
#[derive(Resource, Debug, Clone, PartialEq)]
pub struct RaceOverview {
    pub state: Option<RaceState>,
    pub status: String,
    pub input_disabled: bool,
    pub countdown: u32,
    pub race_time_s: f32,
    pub current_lap_time_s: f32,
    pub best_lap_s: Option<f32>,
    pub current_lap: u32,
    pub max_laps: u32,
    pub position: u32,
    pub player_count: usize,
    pub next_checkpoint_index: usize,
    pub distance_to_next_m: f32,
    pub speed_mps: f32,
}

impl Default for RaceOverview {
    fn default() -> Self {
        Self {
            state: None,
            status: race_status_text(None),
            input_disabled: true,
            countdown: 0,
            race_time_s: 0.0,
            current_lap_time_s: 0.0,
            best_lap_s: None,
            current_lap: 1,
            max_laps: 0,
            position: 1,
            player_count: 0,
            next_checkpoint_index: 0,
            distance_to_next_m: 0.0,
            speed_mps: 0.0,
        }
    }
}

impl RaceOverview {
    pub fn is_race_active(&self) -> bool {
        self.state == Some(RaceState::Racing)
    }

    pub fn from_race(
        manager: Option<&RaceManager>,
        local_player: Option<&RacePlayer>,
        player_count: usize,
        distance_to_next_m: f32,
        speed_mps: f32,
    ) -> Self {
        let mut overview = Self {
            status: race_status_text(manager),
            speed_mps,
            player_count,
            ..Self::default()
        };
        let Some(manager) = manager else {
            return overview;
        };

        overview.state = Some(manager.state);
        overview.input_disabled = manager.is_input_disabled();
        overview.countdown = manager.countdown_display();

        if let Some(player) = local_player {
            overview.race_time_s = player.race_time_s;
            overview.current_lap_time_s = player.current_lap_time_s;
            overview.best_lap_s = player.best_lap();
            overview.current_lap = player.current_lap.min(player.max_laps.max(1));
            overview.max_laps = player.max_laps;
            overview.position = player.position;
            overview.next_checkpoint_index = player.next_checkpoint_index;
            overview.distance_to_next_m = distance_to_next_m;
        }
        overview
    }
}

#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct RaceInputState {
    pub start_pressed: bool,
    /// Set from outside the race (pause menu); resets the race from any state.
    pub restart_requested: bool,
}

#[derive(Resource, Debug, Clone)]
pub struct RaceInputBindings {
    pub start: Vec<KeyCode>,
}

impl Default for RaceInputBindings {
    fn default() -> Self {
        Self {
            start: vec![KeyCode::KeyR],
        }
    }
}

/// Written whenever the race returns to WAITING; bodies of race players go back to the grid.
#[derive(Message, Debug, Clone, Copy)]
pub struct RaceResetEvent;

type RacePlayerQuery<'w, 's> = Query<
    'w,
    's,
    (
        Entity,
        Option<&'static Name>,
        &'static Transform,
        &'static mut RacePlayer,
    ),
>;

fn read_race_input(
    keyboard: Res<ButtonInput<KeyCode>>,
    bindings: Res<RaceInputBindings>,
    mut race_input: ResMut<RaceInputState>,
) {
    if bindings.start.iter().any(|key| keyboard.just_pressed(*key)) {
        race_input.start_pressed = true;
    }
}

fn update_race(
    time: Res<Time>,
    config: Res<GameConfig>,
    mut race_input: ResMut<RaceInputState>,
    mut manager_query: Query<&mut RaceManager>,
    mut player_query: RacePlayerQuery,
    mut checkpoint_query: Query<(&Transform, &mut Checkpoint)>,
    mut reset_events: MessageWriter<RaceResetEvent>,
) {
    let start_pressed = std::mem::take(&mut race_input.start_pressed);
    let restart_requested = std::mem::take(&mut race_input.restart_requested);

    let Some(mut manager) = manager_query.iter_mut().next() else {
        if start_pressed {
            warn!("Race start requested, but the track has no race manager.");
        }
        return;
    };
    if !manager.discovered {
        manager.discovered = true;
        info!(
            "Race manager found; auto-start in {:.1}s.",
            manager.auto_start_delay_s
        );
    }

    let checkpoints = order_checkpoints(
        checkpoint_query
            .iter()
            .map(|(transform, checkpoint)| CheckpointTarget {
                index: checkpoint.index,
                position: transform.translation,
                radius: checkpoint.radius,
                is_finish_line: checkpoint.is_finish_line,
            })
            .collect(),
    );
    if manager.total_checkpoints != checkpoints.len() {
        manager.total_checkpoints = checkpoints.len();
    }

    let dt = time.delta_secs();
    if restart_requested {
        reset_race(&mut manager, &mut player_query, &mut reset_events);
    } else {
        match manager.state {
            RaceState::Waiting => {
                if start_pressed {
                    manager.request_start();
                    info!("Race countdown started.");
                } else if manager.tick_waiting(dt) {
                    info!("Race countdown started automatically.");
                }
            }
            RaceState::Countdown => match manager.tick_countdown(dt, time.elapsed_secs()) {
                CountdownTick::Announce(count) => info!("{count}..."),
                CountdownTick::Go => info!("GO!"),
                CountdownTick::Holding => {}
            },
            RaceState::Racing => {
                advance_players(
                    &mut player_query,
                    &checkpoints,
                    dt,
                    config.race.race.lap_guard_seconds,
                );
                let all_completed = player_query
                    .iter()
                    .map(|(_, _, _, player)| player.race_completed);
                if manager.finish_if_all_completed(all_completed) {
                    log_race_results(&player_query);
                }
            }
            RaceState::Finished => {
                if start_pressed {
                    reset_race(&mut manager, &mut player_query, &mut reset_events);
                }
            }
        }
    }

    let visible = targeted_checkpoints(
        player_query
            .iter()
            .map(|(_, _, _, player)| player.next_checkpoint_index),
        checkpoints.len(),
    );
    for (_, mut checkpoint) in &mut checkpoint_query {
        let is_visible = visible.get(checkpoint.index).copied().unwrap_or(false);
        if checkpoint.visible != is_visible {
            checkpoint.visible = is_visible;
        }
    }
}

fn advance_players(
    player_query: &mut RacePlayerQuery,
    checkpoints: &[CheckpointTarget],
    dt: f32,
    lap_guard_s: f32,
) {
    for (_, name, transform, mut player) in player_query.iter_mut() {
        if player.race_completed {
            continue;
        }

        player.advance_timers(dt);
        let Some(event) =
            check_player_progress(&mut player, transform.translation, checkpoints, lap_guard_s)
        else {
            continue;
        };

        let label = name.map(|name| name.as_str()).unwrap_or("player");
        match event {
            ProgressEvent::CheckpointReached { index } => {
                info!("`{label}` reached checkpoint {index}.");
            }
            ProgressEvent::LapCompleted {
                completed_lap,
                lap_time_s,
            } => {
                info!("`{label}` completed lap {completed_lap} in {lap_time_s:.2}s.");
            }
            ProgressEvent::RaceCompleted {
                race_time_s,
                best_lap_s,
            } => {
                info!(
                    "`{label}` finished the race in {race_time_s:.2}s (best lap {best_lap_s:.2}s)."
                );
            }
        }
    }

    let entries: Vec<(Entity, RankingEntry)> = player_query
        .iter()
        .map(|(entity, _, transform, player)| {
            (
                entity,
                RankingEntry {
                    lap: player.current_lap,
                    next_checkpoint_index: player.next_checkpoint_index,
                    distance_to_next_m: distance_to_next_checkpoint(
                        player,
                        transform.translation,
                        checkpoints,
                    ),
                },
            )
        })
        .collect();
    let positions =
        rank_positions(&entries.iter().map(|(_, entry)| *entry).collect::<Vec<_>>());

    for ((entity, _), position) in entries.iter().zip(positions) {
        if let Ok((_, _, _, mut player)) = player_query.get_mut(*entity) {
            if player.position != position {
                player.position = position;
            }
        }
    }
}

fn reset_race(
    manager: &mut RaceManager,
    player_query: &mut RacePlayerQuery,
    reset_events: &mut MessageWriter<RaceResetEvent>,
) {
    manager.reset();
    for (_, _, _, mut player) in player_query.iter_mut() {
        player.reset(manager.total_checkpoints);
    }
    reset_events.write(RaceResetEvent);
    info!("Race reset; waiting for start.");
}

fn log_race_results(player_query: &RacePlayerQuery) {
    let mut results: Vec<(u32, String, f32, Option<f32>)> = player_query
        .iter()
        .map(|(_, name, _, player)| {
            (
                player.position,
                name.map(|name| name.as_str().to_string())
                    .unwrap_or_else(|| "player".to_string()),
                player.race_time_s,
                player.best_lap(),
            )
        })
        .collect();
    results.sort_by_key(|(position, ..)| *position);

    info!("Race finished. Results:");
    for (position, name, race_time_s, best_lap_s) in results {
        match best_lap_s {
            Some(best) => info!("  P{position} `{name}`: {race_time_s:.2}s, best lap {best:.2}s"),
            None => info!("  P{position} `{name}`: {race_time_s:.2}s"),
        }
    }
}

#[allow(clippy::type_complexity)]
fn reset_player_bodies(
    mut reset_events: MessageReader<RaceResetEvent>,
    mut body_query: Query<
        (
            &PhysicsBodySpec,
            &mut Transform,
            &mut Velocity,
            &mut ExternalForce,
            Option<&mut VehicleControl>,
            Option<&mut RaycastVehicle>,
            Option<&mut GravityScale>,
        ),
        With<RacePlayer>,
    >,
) {
    if reset_events.read().count() == 0 {
        return;
    }

    for (spec, mut transform, mut velocity, mut external_force, control, vehicle, gravity_scale) in
        &mut body_query
    {
        if !spec.added_to_world {
            continue;
        }
        reset_body_to_spawn(spec, &mut transform, &mut velocity, &mut external_force);
        if let Some(mut control) = control {
            control.reset();
        }
        if let Some(mut vehicle) = vehicle {
            vehicle.reset_wheels();
        }
        if let Some(mut gravity_scale) = gravity_scale {
            gravity_scale.0 = 1.0;
        }
    }
}

fn sync_checkpoint_markers(
    mut marker_query: Query<(&Checkpoint, &mut Visibility), Changed<Checkpoint>>,
) {
    for (checkpoint, mut visibility) in &mut marker_query {
        *visibility = if checkpoint.visible {
            Visibility::Visible
        } else {
            Visibility::Hidden
        };
    }
}

fn publish_race_overview(
    manager_query: Query<&RaceManager>,
    player_query: Query<(&Transform, &RacePlayer, Has<DriverControlled>, Option<&Velocity>)>,
    checkpoint_query: Query<(&Transform, &Checkpoint)>,
    mut overview: ResMut<RaceOverview>,
) {
    let manager = manager_query.iter().next();
    let local_player = player_query
        .iter()
        .find(|(_, _, driver, _)| *driver)
        .or_else(|| player_query.iter().next());

    let (player, distance_to_next_m, speed_mps) = match local_player {
        Some((transform, player, _, velocity)) => {
            let checkpoints = order_checkpoints(
                checkpoint_query
                    .iter()
                    .map(|(checkpoint_transform, checkpoint)| CheckpointTarget {
                        index: checkpoint.index,
                        position: checkpoint_transform.translation,
                        radius: checkpoint.radius,
                        is_finish_line: checkpoint.is_finish_line,
                    })
                    .collect(),
            );
            (
                Some(player),
                distance_to_next_checkpoint(player, transform.translation, &checkpoints),
                velocity.map(|velocity| velocity.linvel.length()).unwrap_or(0.0),
            )
        }
        None => (None, 0.0, 0.0),
    };

    let next = RaceOverview::from_race(
        manager,
        player,
        player_query.iter().count(),
        distance_to_next_m,
        speed_mps,
    );
    if *overview != next {
        *overview = next;
    }
}
