mod controller;
mod raycast;

pub use controller::{
    air_control, clamp_speed, max_steering_angle, park, speed_kmh, update_steering,
    update_throttle, AirControl, VehicleControl,
};
pub use raycast::{
    step_raycast_vehicle, ChassisState, RaycastVehicle, RaycastWheel, WheelRayHit, WHEEL_COUNT,
};

use super::physics::{ChassisExtents, PhysicsBodySpec};
use super::race::RaceOverview;
use super::GameplaySet;
use crate::config::{GameConfig, VehicleConfig};
use crate::states::GameState;
use bevy::prelude::*;
use bevy_rapier3d::prelude::*;
use std::f32::consts::FRAC_PI_2;

const CAMERA_LOOK_HEIGHT_M: f32 = 1.0;
const WHEEL_COLOR: Color = Color::srgb(0.08, 0.08, 0.09);

pub struct VehicleGameplayPlugin;

impl Plugin for VehicleGameplayPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<VehicleInputState>()
            .init_resource::<VehicleInputBindings>()
            .init_resource::<VehicleTelemetry>()
            .init_resource::<CameraFollowState>()
            .add_systems(OnEnter(GameState::InRun), reset_camera_follow_state)
            .add_systems(Update, read_vehicle_input.in_set(GameplaySet::Input))
            .add_systems(
                Update,
                (
                    attach_raycast_vehicles,
                    drive_vehicles,
                    update_vehicle_telemetry,
                )
                    .chain()
                    .in_set(GameplaySet::Vehicles),
            )
            .add_systems(
                PostUpdate,
                (sync_wheel_visuals, camera_follow_vehicle)
                    .after(PhysicsSet::Writeback)
                    .run_if(resource_exists::<GameConfig>),
            );
    }
}

/// Body steered by the local keyboard.
#[derive(Component, Debug, Clone, Copy)]
pub struct DriverControlled;

#[derive(Component, Debug, Clone, Copy)]
pub struct WheelVisualsRequested;

/// Tire mesh bound to one wheel of a chassis at spawn time.
#[derive(Component, Debug, Clone, Copy)]
pub struct WheelVisual {
    pub chassis: Entity,
    pub wheel_index: usize,
}

#[derive(Resource, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VehicleInputState {
    pub accelerate: bool,
    pub reverse: bool,
    pub steer_left: bool,
    pub steer_right: bool,
    pub handbrake: bool,
}

#[derive(Resource, Debug, Clone)]
pub struct VehicleInputBindings {
    pub accelerate: Vec<KeyCode>,
    pub reverse: Vec<KeyCode>,
    pub steer_left: Vec<KeyCode>,
    pub steer_right: Vec<KeyCode>,
    pub handbrake: Vec<KeyCode>,
}

impl Default for VehicleInputBindings {
    fn default() -> Self {
        Self {
            accelerate: vec![KeyCode::KeyW, KeyCode::ArrowUp],
            reverse: vec![KeyCode::KeyS, KeyCode::ArrowDown],
            steer_left: vec![KeyCode::KeyA, KeyCode::ArrowLeft],
            steer_right: vec![KeyCode::KeyD, KeyCode::ArrowRight],
            handbrake: vec![KeyCode::Space],
        }
    }
}

#[derive(Resource, Debug, Clone, Default)]
pub struct VehicleTelemetry {
    pub speed_mps: f32,
    pub airborne: bool,
    pub wheels_in_contact: usize,
    pub skidding_wheels: usize,
    pub engine_force_n: f32,
    pub brake_force_n: f32,
    pub steering_rad: f32,
}

#[derive(Resource, Debug, Clone, Copy, Default)]
struct CameraFollowState {
    initialized: bool,
}

fn read_vehicle_input(
    keyboard: Res<ButtonInput<KeyCode>>,
    bindings: Res<VehicleInputBindings>,
    race: Res<RaceOverview>,
    mut input_state: ResMut<VehicleInputState>,
) {
    if race.input_disabled {
        if *input_state != VehicleInputState::default() {
            *input_state = VehicleInputState::default();
        }
        return;
    }

    let held = |keys: &[KeyCode]| keys.iter().any(|key| keyboard.pressed(*key));
    input_state.accelerate = held(&bindings.accelerate);
    input_state.reverse = held(&bindings.reverse);
    input_state.steer_left = held(&bindings.steer_left);
    input_state.steer_right = held(&bindings.steer_right);
    input_state.handbrake = held(&bindings.handbrake);
}

/// Parks the car while the race holds input, otherwise feeds the held keys to the controller.
fn apply_driver_input(
    control: &mut VehicleControl,
    input: &VehicleInputState,
    input_disabled: bool,
    speed_mps: f32,
    tuning: &VehicleConfig,
) {
    if input_disabled {
        park(control, tuning);
    } else {
        update_throttle(control, input, tuning);
        update_steering(control, input, speed_mps, tuning);
    }
}

#[allow(clippy::type_complexity)]
fn attach_raycast_vehicles(
    mut commands: Commands,
    config: Res<GameConfig>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    pending_query: Query<
        (
            Entity,
            Option<&Name>,
            &PhysicsBodySpec,
            &ChassisExtents,
            Has<WheelVisualsRequested>,
        ),
        (With<DriverControlled>, Without<RaycastVehicle>),
    >,
) {
    let Some(tuning) = config.active_vehicle() else {
        return;
    };

    for (entity, name, spec, extents, wants_wheel_visuals) in &pending_query {
        if spec.is_static() || !spec.added_to_world {
            continue;
        }

        let vehicle = RaycastVehicle::new(extents.half_extents, tuning);
        let wheel_mesh = meshes.add(Cylinder::new(tuning.wheel_radius_m, tuning.wheel_width_m));
        let wheel_material = materials.add(StandardMaterial {
            base_color: WHEEL_COLOR,
            perceptual_roughness: 0.95,
            ..default()
        });

        let mut entity_commands = commands.entity(entity);
        if wants_wheel_visuals {
            entity_commands.with_children(|parent| {
                for (wheel_index, wheel) in vehicle.wheels.iter().enumerate() {
                    parent.spawn((
                        Name::new(format!("Wheel{wheel_index}")),
                        WheelVisual {
                            chassis: entity,
                            wheel_index,
                        },
                        Mesh3d(wheel_mesh.clone()),
                        MeshMaterial3d(wheel_material.clone()),
                        Transform::from_translation(
                            wheel.connection_local
                                + wheel.direction_local * wheel.suspension_length_m,
                        )
                        .with_rotation(Quat::from_rotation_z(FRAC_PI_2)),
                    ));
                }
            });
        }

        entity_commands.insert((
            vehicle,
            VehicleControl::default(),
            Sleeping::disabled(),
            Friction::coefficient(tuning.chassis_friction),
            Damping {
                linear_damping: tuning.chassis_linear_damping,
                angular_damping: tuning.chassis_angular_damping,
            },
        ));

        info!(
            "Raycast vehicle attached to `{}` using tuning `{}`.",
            name.map(|name| name.as_str()).unwrap_or(spec.mesh.as_str()),
            tuning.id
        );
    }
}

#[allow(clippy::type_complexity)]
fn drive_vehicles(
    time: Res<Time>,
    config: Res<GameConfig>,
    input_state: Res<VehicleInputState>,
    race: Res<RaceOverview>,
    rapier_context: ReadRapierContext,
    mut vehicle_query: Query<
        (
            Entity,
            &Transform,
            &PhysicsBodySpec,
            &mut VehicleControl,
            &mut RaycastVehicle,
            &mut Velocity,
            &mut ExternalForce,
            &mut GravityScale,
        ),
        With<DriverControlled>,
    >,
) {
    let Ok(rapier_context) = rapier_context.single() else {
        return;
    };
    let Some(tuning) = config.active_vehicle() else {
        return;
    };
    let dt = time.delta_secs();
    if dt <= 0.0 {
        return;
    }

    for (
        entity,
        transform,
        spec,
        mut control,
        mut vehicle,
        mut velocity,
        mut external_force,
        mut gravity_scale,
    ) in &mut vehicle_query
    {
        if spec.is_static() {
            continue;
        }

        velocity.linvel = clamp_speed(velocity.linvel, tuning.max_speed_mps);
        let speed_mps = velocity.linvel.length();

        let air = air_control(vehicle.is_airborne(), tuning);
        if gravity_scale.0 != air.gravity_scale {
            gravity_scale.0 = air.gravity_scale;
        }
        if air.cancel_spin {
            velocity.angvel = Vec3::ZERO;
        }

        apply_driver_input(
            &mut control,
            &input_state,
            race.input_disabled,
            speed_mps,
            tuning,
        );

        vehicle.sync_tuning(tuning);
        vehicle.apply_commands(&control);

        let chassis = ChassisState {
            translation: transform.translation,
            rotation: transform.rotation,
            linear_velocity: velocity.linvel,
            angular_velocity: velocity.angvel,
            mass: spec.mass,
        };
        let mut force = step_raycast_vehicle(
            &mut vehicle,
            &chassis,
            tuning,
            dt,
            |origin, direction, max_distance| {
                let filter = QueryFilter::default()
                    .exclude_sensors()
                    .exclude_rigid_body(entity);
                rapier_context
                    .cast_ray_and_get_normal(origin, direction, max_distance, false, filter)
                    .map(|(_, intersection)| WheelRayHit {
                        time_of_impact: intersection.time_of_impact,
                        normal: intersection.normal,
                    })
            },
        );
        force.force += air.lift_force;
        *external_force = force;
    }
}

fn update_vehicle_telemetry(
    vehicle_query: Query<(&Velocity, &VehicleControl, &RaycastVehicle), With<DriverControlled>>,
    mut telemetry: ResMut<VehicleTelemetry>,
) {
    let Some((velocity, control, vehicle)) = vehicle_query.iter().next() else {
        return;
    };

    telemetry.speed_mps = velocity.linvel.length();
    telemetry.airborne = vehicle.is_airborne();
    telemetry.wheels_in_contact = vehicle.contact_count();
    telemetry.skidding_wheels = vehicle.wheels.iter().filter(|wheel| wheel.skidding).count();
    telemetry.engine_force_n = control.engine_force_n;
    telemetry.brake_force_n = control.brake_force_n;
    telemetry.steering_rad = control.steering_rad;
}

fn sync_wheel_visuals(
    vehicle_query: Query<&RaycastVehicle>,
    mut wheel_query: Query<(&WheelVisual, &mut Transform)>,
) {
    for (visual, mut transform) in &mut wheel_query {
        let Ok(vehicle) = vehicle_query.get(visual.chassis) else {
            continue;
        };
        let Some(wheel) = vehicle.wheels.get(visual.wheel_index) else {
            continue;
        };

        transform.translation =
            wheel.connection_local + wheel.direction_local * wheel.suspension_length_m;
        transform.rotation = Quat::from_rotation_y(wheel.steering_rad)
            * Quat::from_rotation_x(wheel.spin_angle_rad)
            * Quat::from_rotation_z(FRAC_PI_2);
    }
}

fn reset_camera_follow_state(mut state: ResMut<CameraFollowState>) {
    *state = CameraFollowState::default();
}

fn camera_follow_vehicle(
    time: Res<Time>,
    config: Res<GameConfig>,
    mut follow_state: ResMut<CameraFollowState>,
    player_query: Query<&Transform, (With<DriverControlled>, With<RaycastVehicle>)>,
    mut camera_query: Query<&mut Transform, (With<Camera3d>, Without<DriverControlled>)>,
) {
    let Some(player_transform) = player_query.iter().next() else {
        return;
    };
    let Ok(mut camera_transform) = camera_query.single_mut() else {
        return;
    };

    let camera = &config.game.camera;
    let heading = player_transform.rotation * Vec3::Z;
    let flat_heading = Vec3::new(heading.x, 0.0, heading.z).normalize_or(Vec3::Z);
    let target = player_transform.translation - flat_heading * camera.follow_distance_m
        + Vec3::Y * camera.follow_height_m;

    if !follow_state.initialized {
        follow_state.initialized = true;
        camera_transform.translation = target;
    } else {
        let blend = (camera.follow_stiffness * time.delta_secs()).clamp(0.0, 1.0);
        camera_transform.translation = camera_transform.translation.lerp(target, blend);
    }
    camera_transform.look_at(
        player_transform.translation + Vec3::Y * CAMERA_LOOK_HEIGHT_M,
        Vec3::Y,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gameplay::race::RaceState;

    fn input_app(overview: RaceOverview) -> App {
        let mut keyboard = ButtonInput::<KeyCode>::default();
        keyboard.press(KeyCode::KeyW);

        let mut app = App::new();
        app.insert_resource(keyboard)
            .insert_resource(overview)
            .init_resource::<VehicleInputBindings>()
            .init_resource::<VehicleInputState>()
            .add_systems(Update, read_vehicle_input);
        app
    }

    #[test]
    fn held_keys_are_ignored_and_car_parks_while_input_is_disabled() {
        let tuning = VehicleConfig::default();
        let mut app = input_app(RaceOverview {
            state: Some(RaceState::Countdown),
            input_disabled: true,
            ..RaceOverview::default()
        });
        app.world_mut().resource_mut::<VehicleInputState>().steer_left = true;

        app.update();

        let input = *app.world().resource::<VehicleInputState>();
        assert_eq!(input, VehicleInputState::default());

        let mut control = VehicleControl {
            engine_force_n: 900.0,
            brake_force_n: 0.0,
            steering_rad: 0.4,
        };
        apply_driver_input(&mut control, &input, true, 10.0, &tuning);
        assert_eq!(control.engine_force_n, 0.0);
        assert_eq!(control.brake_force_n, tuning.default_brake_force_n);
        assert!(control.steering_rad.abs() < 0.4);

        {
            let mut overview = app.world_mut().resource_mut::<RaceOverview>();
            overview.state = Some(RaceState::Racing);
            overview.input_disabled = false;
        }
        app.update();

        let input = *app.world().resource::<VehicleInputState>();
        assert!(input.accelerate);
        assert!(!input.reverse && !input.steer_left && !input.steer_right);

        let mut control = VehicleControl::default();
        apply_driver_input(&mut control, &input, false, 0.0, &tuning);
        assert!(control.engine_force_n > 0.0);
        assert_eq!(control.brake_force_n, 0.0);
    }
}
