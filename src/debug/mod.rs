use crate::config::{GameConfig, VehicleConfig, CONFIG_DIR};
use crate::gameplay::physics::PhysicsBodySpec;
use crate::gameplay::race::RaceOverview;
use crate::gameplay::vehicle::{speed_kmh, VehicleInputState, VehicleTelemetry};
use crate::states::GameState;
use bevy::diagnostic::{DiagnosticsStore, FrameTimeDiagnosticsPlugin};
use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts, EguiPrimaryContextPass};
use std::fs;
use std::ops::RangeInclusive;
use std::path::Path;

pub struct DebugOverlayPlugin;

impl Plugin for DebugOverlayPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<KeybindOverlayState>()
            .init_resource::<VehicleTuningPanelState>()
            .add_systems(Update, spawn_debug_overlay)
            .add_systems(Update, toggle_keybind_overlay)
            .add_systems(Update, toggle_vehicle_tuning_panel)
            .add_systems(Update, sync_keybind_overlay_visibility)
            .add_systems(
                Update,
                update_debug_overlay_text
                    .run_if(in_state(GameState::InRun))
                    .run_if(resource_exists::<GameConfig>),
            )
            .add_systems(
                EguiPrimaryContextPass,
                vehicle_tuning_panel_ui
                    .run_if(in_state(GameState::InRun))
                    .run_if(resource_exists::<GameConfig>),
            );
    }
}

#[derive(Component)]
struct DebugOverlayText;

#[derive(Component)]
struct KeybindOverlayText;

#[derive(Resource, Debug, Clone, Default)]
struct KeybindOverlayState {
    visible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TuningGroup {
    Suspension,
    Wheels,
    Chassis,
    Engine,
    Steering,
}

impl TuningGroup {
    const ALL: [Self; 5] = [
        Self::Suspension,
        Self::Wheels,
        Self::Chassis,
        Self::Engine,
        Self::Steering,
    ];

    fn title(self) -> &'static str {
        match self {
            Self::Suspension => "Suspension",
            Self::Wheels => "Wheels + Grip",
            Self::Chassis => "Chassis",
            Self::Engine => "Engine + Brakes + Air",
            Self::Steering => "Steering",
        }
    }
}

/// One editable float on `VehicleConfig`; `key` is also the TOML key in vehicles.toml.
struct TuningField {
    key: &'static str,
    group: TuningGroup,
    range: RangeInclusive<f32>,
    drag_speed: f32,
    value: fn(&mut VehicleConfig) -> &mut f32,
}

const TUNING_FIELDS: &[TuningField] = &[
    TuningField {
        key: "suspension_stiffness",
        group: TuningGroup::Suspension,
        range: 0.1..=200.0,
        drag_speed: 0.1,
        value: |v| &mut v.suspension_stiffness,
    },
    TuningField {
        key: "suspension_compression",
        group: TuningGroup::Suspension,
        range: 0.0..=20.0,
        drag_speed: 0.05,
        value: |v| &mut v.suspension_compression,
    },
    TuningField {
        key: "suspension_damping",
        group: TuningGroup::Suspension,
        range: 0.0..=20.0,
        drag_speed: 0.05,
        value: |v| &mut v.suspension_damping,
    },
    TuningField {
        key: "suspension_rest_length_m",
        group: TuningGroup::Suspension,
        range: 0.05..=2.0,
        drag_speed: 0.01,
        value: |v| &mut v.suspension_rest_length_m,
    },
    TuningField {
        key: "max_suspension_travel_m",
        group: TuningGroup::Suspension,
        range: 0.0..=2.0,
        drag_speed: 0.01,
        value: |v| &mut v.max_suspension_travel_m,
    },
    TuningField {
        key: "max_suspension_force_n",
        group: TuningGroup::Suspension,
        range: 100.0..=50_000.0,
        drag_speed: 10.0,
        value: |v| &mut v.max_suspension_force_n,
    },
    TuningField {
        key: "friction_slip",
        group: TuningGroup::Wheels,
        range: 0.01..=10.0,
        drag_speed: 0.01,
        value: |v| &mut v.friction_slip,
    },
    TuningField {
        key: "roll_influence",
        group: TuningGroup::Wheels,
        range: 0.0..=1.0,
        drag_speed: 0.01,
        value: |v| &mut v.roll_influence,
    },
    TuningField {
        key: "wheel_radius_m",
        group: TuningGroup::Wheels,
        range: 0.1..=2.0,
        drag_speed: 0.01,
        value: |v| &mut v.wheel_radius_m,
    },
    TuningField {
        key: "wheel_width_m",
        group: TuningGroup::Wheels,
        range: 0.05..=1.5,
        drag_speed: 0.01,
        value: |v| &mut v.wheel_width_m,
    },
    TuningField {
        key: "chassis_friction",
        group: TuningGroup::Chassis,
        range: 0.0..=2.0,
        drag_speed: 0.01,
        value: |v| &mut v.chassis_friction,
    },
    TuningField {
        key: "chassis_linear_damping",
        group: TuningGroup::Chassis,
        range: 0.0..=5.0,
        drag_speed: 0.01,
        value: |v| &mut v.chassis_linear_damping,
    },
    TuningField {
        key: "chassis_angular_damping",
        group: TuningGroup::Chassis,
        range: 0.0..=5.0,
        drag_speed: 0.01,
        value: |v| &mut v.chassis_angular_damping,
    },
    TuningField {
        key: "max_speed_mps",
        group: TuningGroup::Engine,
        range: 1.0..=120.0,
        drag_speed: 0.1,
        value: |v| &mut v.max_speed_mps,
    },
    TuningField {
        key: "max_engine_force_n",
        group: TuningGroup::Engine,
        range: 10.0..=10_000.0,
        drag_speed: 5.0,
        value: |v| &mut v.max_engine_force_n,
    },
    TuningField {
        key: "max_reverse_force_n",
        group: TuningGroup::Engine,
        range: 0.0..=10_000.0,
        drag_speed: 5.0,
        value: |v| &mut v.max_reverse_force_n,
    },
    TuningField {
        key: "engine_force_increment_n",
        group: TuningGroup::Engine,
        range: 1.0..=1_000.0,
        drag_speed: 1.0,
        value: |v| &mut v.engine_force_increment_n,
    },
    TuningField {
        key: "max_brake_force_n",
        group: TuningGroup::Engine,
        range: 0.0..=10_000.0,
        drag_speed: 5.0,
        value: |v| &mut v.max_brake_force_n,
    },
    TuningField {
        key: "default_brake_force_n",
        group: TuningGroup::Engine,
        range: 0.0..=2_000.0,
        drag_speed: 1.0,
        value: |v| &mut v.default_brake_force_n,
    },
    TuningField {
        key: "airborne_gravity_scale",
        group: TuningGroup::Engine,
        range: 0.0..=2.0,
        drag_speed: 0.01,
        value: |v| &mut v.airborne_gravity_scale,
    },
    TuningField {
        key: "air_control_force_n",
        group: TuningGroup::Engine,
        range: 0.0..=5_000.0,
        drag_speed: 5.0,
        value: |v| &mut v.air_control_force_n,
    },
    TuningField {
        key: "steering_increment",
        group: TuningGroup::Steering,
        range: 0.001..=0.5,
        drag_speed: 0.001,
        value: |v| &mut v.steering_increment,
    },
    TuningField {
        key: "steering_return_factor",
        group: TuningGroup::Steering,
        range: 0.0..=1.0,
        drag_speed: 0.01,
        value: |v| &mut v.steering_return_factor,
    },
    TuningField {
        key: "steering_max_angle_low_speed",
        group: TuningGroup::Steering,
        range: 0.0..=1.2,
        drag_speed: 0.005,
        value: |v| &mut v.steering_max_angle_low_speed,
    },
    TuningField {
        key: "steering_max_angle_high_speed",
        group: TuningGroup::Steering,
        range: 0.0..=1.2,
        drag_speed: 0.005,
        value: |v| &mut v.steering_max_angle_high_speed,
    },
    TuningField {
        key: "steering_speed_threshold_mps",
        group: TuningGroup::Steering,
        range: 0.1..=60.0,
        drag_speed: 0.1,
        value: |v| &mut v.steering_speed_threshold_mps,
    },
];

#[derive(Resource, Debug, Default)]
struct VehicleTuningPanelState {
    visible: bool,
    draft: Option<VehicleConfig>,
    status: String,
}

fn spawn_debug_overlay(
    mut commands: Commands,
    keybind_overlay: Res<KeybindOverlayState>,
    config: Option<Res<GameConfig>>,
    existing_overlay: Query<Entity, With<DebugOverlayText>>,
) {
    if !existing_overlay.is_empty() {
        return;
    }

    let Some(config) = config else {
        return;
    };

    if !config.game.app.debug_overlay {
        return;
    }

    commands.spawn((
        DebugOverlayText,
        Text::new("debug overlay initializing..."),
        TextFont {
            font_size: 14.0,
            ..default()
        },
        TextColor(Color::srgb(0.92, 0.95, 0.97)),
        Node {
            position_type: PositionType::Absolute,
            left: Val::Px(12.0),
            bottom: Val::Px(12.0),
            ..default()
        },
        ZIndex(100),
    ));

    commands.spawn((
        KeybindOverlayText,
        Text::new(keybind_overlay_text()),
        TextFont {
            font_size: 15.0,
            ..default()
        },
        TextColor(Color::srgb(0.90, 0.94, 0.97)),
        BackgroundColor(Color::srgba(0.06, 0.08, 0.10, 0.82)),
        BorderColor::all(Color::srgba(0.60, 0.68, 0.74, 0.9)),
        Node {
            position_type: PositionType::Absolute,
            right: Val::Px(12.0),
            top: Val::Px(90.0),
            padding: UiRect::axes(Val::Px(10.0), Val::Px(8.0)),
            border: UiRect::all(Val::Px(1.0)),
            ..default()
        },
        if keybind_overlay.visible {
            Visibility::Inherited
        } else {
            Visibility::Hidden
        },
        ZIndex(100),
    ));
}

fn update_debug_overlay_text(
    diagnostics: Res<DiagnosticsStore>,
    overview: Res<RaceOverview>,
    telemetry: Option<Res<VehicleTelemetry>>,
    input_state: Option<Res<VehicleInputState>>,
    body_query: Query<&PhysicsBodySpec>,
    mut overlay_query: Query<&mut Text, With<DebugOverlayText>>,
) {
    let Ok(mut text) = overlay_query.single_mut() else {
        return;
    };

    let fps = diagnostics
        .get(&FrameTimeDiagnosticsPlugin::FPS)
        .and_then(|value| value.smoothed())
        .unwrap_or(0.0);

    let telemetry = telemetry.map(|t| t.clone()).unwrap_or_default();
    let (accel, reverse, left, right, handbrake) = input_state
        .map(|s| (s.accelerate, s.reverse, s.steer_left, s.steer_right, s.handbrake))
        .unwrap_or_default();

    let body_count = body_query.iter().count();
    let pending_bodies = body_query.iter().filter(|spec| !spec.added_to_world).count();

    *text = Text::new(format!(
        "FPS: {fps:>5.1}\n\
Bodies: {body_count} ({pending_bodies} pending)\n\
Speed: {speed:>6.1} m/s ({kmh:.0} km/h)\n\
Wheels: {contacts}/4 in contact | skidding {skidding} | airborne {airborne}\n\
Engine {engine:>7.1} N | Brake {brake:>7.1} N | Steer {steer:>6.3} rad\n\
Input: accel={accel} reverse={reverse} left={left} right={right} handbrake={handbrake}\n\
Race: {status} | input {input}\n\
Next checkpoint #{next} at {distance:.1} m",
        speed = telemetry.speed_mps,
        kmh = speed_kmh(telemetry.speed_mps),
        contacts = telemetry.wheels_in_contact,
        skidding = telemetry.skidding_wheels,
        airborne = yes_no(telemetry.airborne),
        engine = telemetry.engine_force_n,
        brake = telemetry.brake_force_n,
        steer = telemetry.steering_rad,
        accel = yes_no(accel),
        reverse = yes_no(reverse),
        left = yes_no(left),
        right = yes_no(right),
        handbrake = yes_no(handbrake),
        status = overview.status,
        input = if overview.input_disabled { "locked" } else { "live" },
        next = overview.next_checkpoint_index,
        distance = overview.distance_to_next_m,
    ));
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn toggle_keybind_overlay(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut state: ResMut<KeybindOverlayState>,
    config: Option<Res<GameConfig>>,
) {
    let Some(config) = config else {
        return;
    };

    if !config.game.app.debug_overlay {
        return;
    }

    if keyboard.just_pressed(KeyCode::KeyH) {
        state.visible = !state.visible;
        info!(
            "Debug keybind panel {}.",
            if state.visible { "shown" } else { "hidden" }
        );
    }
}

fn sync_keybind_overlay_visibility(
    state: Res<KeybindOverlayState>,
    mut query: Query<&mut Visibility, With<KeybindOverlayText>>,
) {
    if !state.is_changed() {
        return;
    }

    let next_visibility = if state.visible {
        Visibility::Inherited
    } else {
        Visibility::Hidden
    };

    for mut visibility in &mut query {
        *visibility = next_visibility;
    }
}

fn toggle_vehicle_tuning_panel(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut panel_state: ResMut<VehicleTuningPanelState>,
    config: Option<Res<GameConfig>>,
) {
    if !keyboard.just_pressed(KeyCode::KeyV) {
        return;
    }

    panel_state.visible = !panel_state.visible;
    if panel_state.visible {
        if let Some(config) = config {
            if let Err(error) = sync_panel_state_from_config(&mut panel_state, &config) {
                panel_state.status = error;
            }
        }
        info!("Vehicle tuning panel shown.");
    } else {
        info!("Vehicle tuning panel hidden.");
    }
}

fn vehicle_tuning_panel_ui(
    mut egui_contexts: EguiContexts,
    mut panel_state: ResMut<VehicleTuningPanelState>,
    mut config: ResMut<GameConfig>,
) {
    if !panel_state.visible {
        return;
    }

    let out_of_sync = panel_state
        .draft
        .as_ref()
        .is_none_or(|draft| draft.id != config.game.app.default_vehicle);
    if out_of_sync {
        if let Err(error) = sync_panel_state_from_config(&mut panel_state, &config) {
            panel_state.status = error;
            return;
        }
    }

    let Some(mut draft) = panel_state.draft.clone() else {
        return;
    };

    let mut window_open = panel_state.visible;
    let mut draft_changed = false;
    let mut reload_clicked = false;
    let mut apply_clicked = false;
    let status = panel_state.status.clone();

    let Ok(ctx) = egui_contexts.ctx_mut() else {
        return;
    };
    egui::Window::new("Vehicle Tuning")
        .open(&mut window_open)
        .resizable(true)
        .default_width(560.0)
        .show(ctx, |ui| {
            ui.label(format!("Active vehicle: {}", draft.id));
            ui.label("Changes apply to the running car immediately.");
            ui.separator();

            for group in TuningGroup::ALL {
                ui.collapsing(group.title(), |ui| {
                    for field in TUNING_FIELDS.iter().filter(|field| field.group == group) {
                        draft_changed |= tuning_slider_row(ui, field, &mut draft);
                    }
                });
            }

            ui.separator();
            ui.horizontal(|ui| {
                if ui.button("Reload From Config").clicked() {
                    reload_clicked = true;
                }
                if ui.button("Save To vehicles.toml").clicked() {
                    apply_clicked = true;
                }
            });

            if !status.is_empty() {
                ui.separator();
                ui.label(status);
            }
        });

    panel_state.visible = window_open;

    if reload_clicked {
        match sync_panel_state_from_config(&mut panel_state, &config) {
            Ok(()) => panel_state.status = "Reloaded values from current config.".to_string(),
            Err(error) => panel_state.status = error,
        }
        return;
    }

    panel_state.draft = Some(draft.clone());

    if draft_changed {
        match apply_draft_to_runtime_config(&mut config, &draft) {
            Ok(()) => panel_state.status = "Live tuning active (not saved).".to_string(),
            Err(error) => panel_state.status = error,
        }
    }

    if apply_clicked {
        let path = Path::new(CONFIG_DIR).join("vehicles.toml");
        match persist_vehicle_tuning_and_reload(&mut config, &path, &draft) {
            Ok(message) => {
                panel_state.status = message;
                if let Err(error) = sync_panel_state_from_config(&mut panel_state, &config) {
                    panel_state.status = error;
                }
            }
            Err(error) => panel_state.status = error,
        }
    }
}

fn tuning_slider_row(ui: &mut egui::Ui, field: &TuningField, draft: &mut VehicleConfig) -> bool {
    let value = (field.value)(draft);
    let mut changed = false;
    ui.horizontal(|ui| {
        ui.label(field.key);
        changed |= ui
            .add(egui::Slider::new(value, field.range.clone()).show_value(false))
            .changed();
        changed |= ui
            .add(egui::DragValue::new(value).speed(field.drag_speed as f64))
            .changed();
    });
    changed
}

fn sync_panel_state_from_config(
    panel_state: &mut VehicleTuningPanelState,
    config: &GameConfig,
) -> Result<(), String> {
    let Some(vehicle) = config.active_vehicle() else {
        return Err(format!(
            "Vehicle tuning panel: active vehicle `{}` not found in config.",
            config.game.app.default_vehicle
        ));
    };

    panel_state.draft = Some(vehicle.clone());
    Ok(())
}

fn apply_draft_to_runtime_config(
    config: &mut GameConfig,
    draft: &VehicleConfig,
) -> Result<(), String> {
    let Some(vehicle) = config.vehicles_by_id.get_mut(&draft.id) else {
        return Err(format!(
            "Vehicle tuning panel: vehicle `{}` not found in vehicles_by_id.",
            draft.id
        ));
    };
    *vehicle = draft.clone();

    if let Some(vehicle) = config
        .vehicles
        .vehicles
        .iter_mut()
        .find(|vehicle| vehicle.id == draft.id)
    {
        *vehicle = draft.clone();
    }
    Ok(())
}

fn persist_vehicle_tuning_and_reload(
    config: &mut GameConfig,
    path: &Path,
    draft: &VehicleConfig,
) -> Result<String, String> {
    let original_raw = fs::read_to_string(path)
        .map_err(|error| format!("Failed reading `{}`: {error}", path.display()))?;
    let mut root: toml::Value = toml::from_str(&original_raw)
        .map_err(|error| format!("Failed parsing `{}`: {error}", path.display()))?;

    write_draft_to_toml_value(&mut root, draft)?;

    let updated_raw = toml::to_string_pretty(&root)
        .map_err(|error| format!("Failed serializing vehicles TOML: {error}"))?;
    fs::write(path, updated_raw)
        .map_err(|error| format!("Failed writing `{}`: {error}", path.display()))?;

    match GameConfig::load_from_dir(Path::new(CONFIG_DIR)) {
        Ok(new_config) => {
            *config = new_config;
            Ok(format!("Saved tuning to {}.", path.display()))
        }
        Err(error) => {
            if let Err(restore_error) = fs::write(path, &original_raw) {
                error!("Failed restoring `{}`: {restore_error}", path.display());
            }
            Err(format!(
                "Saved tuning failed validation: {error}. Reverted `{}`.",
                path.display()
            ))
        }
    }
}

fn write_draft_to_toml_value(root: &mut toml::Value, draft: &VehicleConfig) -> Result<(), String> {
    let Some(vehicles_array) = root.get_mut("vehicles").and_then(toml::Value::as_array_mut) else {
        return Err("vehicles.toml: missing or invalid `vehicles` array".to_string());
    };

    let Some(vehicle_table) = vehicles_array.iter_mut().find_map(|vehicle_value| {
        let table = vehicle_value.as_table_mut()?;
        if table.get("id").and_then(toml::Value::as_str) == Some(draft.id.as_str()) {
            Some(table)
        } else {
            None
        }
    }) else {
        return Err(format!(
            "vehicles.toml: could not find vehicle with id `{}`",
            draft.id
        ));
    };

    let mut draft = draft.clone();
    for field in TUNING_FIELDS {
        set_toml_float(vehicle_table, field.key, *(field.value)(&mut draft))?;
    }
    Ok(())
}

fn set_toml_float(
    table: &mut toml::map::Map<String, toml::Value>,
    key: &str,
    value: f32,
) -> Result<(), String> {
    if !value.is_finite() {
        return Err(format!("`{key}` is not a finite number"));
    }

    table.insert(key.to_string(), toml::Value::Float(value as f64));
    Ok(())
}

fn keybind_overlay_text() -> &'static str {
    "Keybinds\n\
H - Toggle this panel\n\
V - Toggle vehicle tuning panel\n\
F5 - Hot-reload config\n\
W / Up - Accelerate\n\
S / Down - Brake / reverse\n\
A D / Left Right - Steer\n\
Space - Handbrake\n\
R - Start / restart race\n\
Esc - Pause / resume"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuning_field_keys_are_unique() {
        let mut keys: Vec<_> = TUNING_FIELDS.iter().map(|field| field.key).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), TUNING_FIELDS.len());
    }

    #[test]
    fn writing_draft_updates_only_the_matching_vehicle_table() {
        let mut root: toml::Value = toml::from_str(
            r#"
[[vehicles]]
id = "roadster"
friction_slip = 1.2

[[vehicles]]
id = "truck"
friction_slip = 0.9
"#,
        )
        .expect("toml parses");

        let draft = VehicleConfig {
            friction_slip: 2.5,
            ..VehicleConfig::default()
        };
        write_draft_to_toml_value(&mut root, &draft).expect("draft writes");

        let vehicles = root["vehicles"].as_array().expect("vehicles array");
        assert_eq!(vehicles[0]["friction_slip"].as_float(), Some(2.5));
        assert_eq!(vehicles[1]["friction_slip"].as_float(), Some(0.9));
        assert!(vehicles[0].get("suspension_stiffness").is_some());
    }

    #[test]
    fn writing_draft_for_unknown_vehicle_fails() {
        let mut root: toml::Value = toml::from_str("vehicles = []").expect("toml parses");
        let draft = VehicleConfig::default();

        assert!(write_draft_to_toml_value(&mut root, &draft).is_err());
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let mut table = toml::map::Map::new();
        assert!(set_toml_float(&mut table, "friction_slip", f32::NAN).is_err());
        assert!(set_toml_float(&mut table, "friction_slip", 1.5).is_ok());
        assert_eq!(table["friction_slip"].as_float(), Some(1.5));
    }
}
