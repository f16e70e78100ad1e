use crate::assets::MeshLibrary;
use crate::config::GameConfig;
use crate::gameplay::race::RaceInputState;
use bevy::prelude::*;
use bevy_rapier3d::prelude::*;

#[derive(States, Debug, Clone, Copy, Eq, PartialEq, Hash, Default)]
pub enum GameState {
    #[default]
    Boot,
    Loading,
    InRun,
    Pause,
}

pub struct GameStatePlugin;

impl Plugin for GameStatePlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, setup_camera)
            .add_systems(OnEnter(GameState::Boot), enter_boot)
            .add_systems(Update, boot_to_loading.run_if(in_state(GameState::Boot)))
            .add_systems(OnEnter(GameState::Loading), enter_loading)
            .add_systems(
                Update,
                loading_to_in_run.run_if(in_state(GameState::Loading)),
            )
            .add_systems(OnEnter(GameState::InRun), enter_in_run)
            .add_systems(Update, in_run_controls.run_if(in_state(GameState::InRun)))
            .add_systems(OnEnter(GameState::Pause), enter_pause)
            .add_systems(OnExit(GameState::Pause), exit_pause)
            .add_systems(Update, pause_controls.run_if(in_state(GameState::Pause)));
    }
}

#[derive(Component)]
struct PauseOverlayRoot;

fn setup_camera(mut commands: Commands) {
    commands.spawn((
        Name::new("ChaseCamera"),
        Camera3d::default(),
        Transform::from_xyz(0.0, 8.0, -14.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));
}

fn enter_boot() {
    info!("Entered state: Boot");
}

fn boot_to_loading(mut next_state: ResMut<NextState<GameState>>) {
    next_state.set(GameState::Loading);
}

fn enter_loading() {
    info!("Entered state: Loading");
}

fn loading_to_in_run(
    config: Option<Res<GameConfig>>,
    library: Option<Res<MeshLibrary>>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    if config.is_none() || library.is_none() {
        return;
    }

    next_state.set(GameState::InRun);
}

fn enter_in_run() {
    info!("Entered state: InRun");
}

fn in_run_controls(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    if keyboard.just_pressed(KeyCode::Escape) {
        next_state.set(GameState::Pause);
    }
}

fn set_physics_active(
    rapier_config_query: &mut Query<&mut RapierConfiguration, With<DefaultRapierContext>>,
    active: bool,
) {
    if let Ok(mut rapier_config) = rapier_config_query.single_mut() {
        rapier_config.physics_pipeline_active = active;
    }
}

fn enter_pause(
    mut commands: Commands,
    mut rapier_config_query: Query<&mut RapierConfiguration, With<DefaultRapierContext>>,
) {
    set_physics_active(&mut rapier_config_query, false);

    commands
        .spawn((
            Name::new("PauseOverlay"),
            PauseOverlayRoot,
            Node {
                width: Val::Percent(100.0),
                height: Val::Percent(100.0),
                justify_content: JustifyContent::Center,
                align_items: AlignItems::Center,
                ..default()
            },
            BackgroundColor(Color::srgba(0.01, 0.02, 0.03, 0.7)),
            ZIndex(300),
        ))
        .with_children(|parent| {
            parent.spawn((
                Text::new("PAUSED\n\nEsc - Resume\nR - Restart Race"),
                TextFont {
                    font_size: 36.0,
                    ..default()
                },
                TextColor(Color::srgb(0.94, 0.97, 1.00)),
            ));
        });

    info!("Entered state: Pause");
}

fn exit_pause(
    mut commands: Commands,
    mut rapier_config_query: Query<&mut RapierConfiguration, With<DefaultRapierContext>>,
    overlay_query: Query<Entity, With<PauseOverlayRoot>>,
) {
    set_physics_active(&mut rapier_config_query, true);
    for entity in &overlay_query {
        commands.entity(entity).try_despawn();
    }
}

fn pause_controls(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut race_input: ResMut<RaceInputState>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    if keyboard.just_pressed(KeyCode::Escape) {
        next_state.set(GameState::InRun);
    }

    if keyboard.just_pressed(KeyCode::KeyR) {
        race_input.restart_requested = true;
        next_state.set(GameState::InRun);
    }
}
