use super::physics::{BodyAppearance, EulerAngles, PhysicsBodySpec};
use super::race::{Checkpoint, RaceManager, RacePlayer};
use super::vehicle::{DriverControlled, WheelVisualsRequested};
use crate::config::{BodySpec, GameConfig};
use crate::states::GameState;
use bevy::prelude::*;

const CHECKPOINT_COLOR: Color = Color::srgba(0.2, 0.75, 1.0, 0.35);
const FINISH_LINE_COLOR: Color = Color::srgba(1.0, 0.85, 0.2, 0.4);

pub struct TrackScenePlugin;

impl Plugin for TrackScenePlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            OnEnter(GameState::InRun),
            spawn_track_scene.run_if(resource_exists::<GameConfig>),
        );
    }
}

/// Everything spawned from the track file.
#[derive(Component, Debug, Clone, Copy)]
pub struct TrackEntity;

pub fn body_spawn_transform(body: &BodySpec) -> Transform {
    Transform::from_translation(Vec3::from_array(body.position))
        .with_rotation(EulerAngles::from_degrees(body.rotation_degrees).to_quat())
        .with_scale(Vec3::from_array(body.scale))
}

fn spawn_track_scene(
    mut commands: Commands,
    config: Res<GameConfig>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    existing_track: Query<(), With<TrackEntity>>,
) {
    if !existing_track.is_empty() {
        return;
    }

    let track = &config.track;
    let race = &config.race.race;

    commands.spawn((
        Name::new("FillLight"),
        TrackEntity,
        DirectionalLight {
            illuminance: 2_500.0,
            shadows_enabled: false,
            ..default()
        },
        Transform::from_xyz(-20.0, 25.0, -30.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));
    commands.spawn((
        Name::new("Sun"),
        TrackEntity,
        DirectionalLight {
            illuminance: 9_000.0,
            shadows_enabled: true,
            ..default()
        },
        Transform::from_xyz(30.0, 60.0, 20.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    for body in &track.bodies {
        let spawn = body_spawn_transform(body);
        let spec = PhysicsBodySpec::new(body.mesh.clone(), body.mass, spawn);
        let [r, g, b] = body.color;

        let mut entity_commands = commands.spawn((
            Name::new(body.name.clone()),
            TrackEntity,
            spec.spawn_transform(),
            Visibility::default(),
            BodyAppearance {
                color: Color::srgb(r, g, b),
            },
            spec,
        ));
        if body.driver {
            entity_commands.insert(DriverControlled);
        }
        if body.wheel_visuals {
            entity_commands.insert(WheelVisualsRequested);
        }
        if let Some(player) = &body.race_player {
            entity_commands.insert(RacePlayer::new(
                player.max_laps.unwrap_or(race.default_max_laps),
            ));
        }
    }

    for checkpoint in &track.checkpoints {
        let radius = checkpoint.radius.unwrap_or(race.default_checkpoint_radius);
        let color = if checkpoint.is_finish_line {
            FINISH_LINE_COLOR
        } else {
            CHECKPOINT_COLOR
        };

        commands.spawn((
            Name::new(format!("Checkpoint{}", checkpoint.index)),
            TrackEntity,
            Checkpoint {
                index: checkpoint.index,
                radius,
                is_finish_line: checkpoint.is_finish_line,
                visible: false,
            },
            Mesh3d(meshes.add(Sphere::new(radius))),
            MeshMaterial3d(materials.add(StandardMaterial {
                base_color: color,
                alpha_mode: AlphaMode::Blend,
                unlit: true,
                ..default()
            })),
            Transform::from_translation(Vec3::from_array(checkpoint.position)),
            Visibility::Hidden,
        ));
    }

    if let Some(manager) = &track.race_manager {
        commands.spawn((
            Name::new("RaceManager"),
            TrackEntity,
            RaceManager::new(
                manager.countdown_seconds.unwrap_or(race.countdown_seconds),
                race.auto_start_delay_seconds,
            ),
        ));
    } else if track.has_race_players() {
        warn!(
            "Track `{}` has race players but no race manager; driving stays disabled.",
            track.name
        );
    }

    info!(
        "Spawned track `{}`: {} bodies, {} checkpoints.",
        track.name,
        track.bodies.len(),
        track.checkpoints.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackScene;

    #[test]
    fn spawn_transform_converts_degrees_and_keeps_scale() {
        let track: TrackScene = serde_json::from_str(
            r#"{ "bodies": [ {
                "name": "ramp", "mesh": "ramp", "mass": 0.0,
                "position": [1.0, 2.0, 3.0],
                "rotation_degrees": [0.0, 90.0, 0.0],
                "scale": [2.0, 1.0, 4.0]
            } ] }"#,
        )
        .expect("track parses");

        let transform = body_spawn_transform(&track.bodies[0]);

        assert_eq!(transform.translation, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(transform.scale, Vec3::new(2.0, 1.0, 4.0));
        assert!((transform.rotation * Vec3::Z).distance(Vec3::X) < 1e-5);
    }
}
