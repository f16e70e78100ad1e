use super::controller::VehicleControl;
use crate::config::VehicleConfig;
use bevy::prelude::*;
use bevy_rapier3d::prelude::ExternalForce;

pub const WHEEL_COUNT: usize = 4;

const AIRBORNE_SPIN_DECAY: f32 = 0.99;
const MIN_CONTACT_DENOMINATOR: f32 = 0.1;
const MIN_STEP_S: f32 = 0.000_1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelRayHit {
    pub time_of_impact: f32,
    pub normal: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastWheel {
    pub connection_local: Vec3,
    pub direction_local: Vec3,
    pub axle_local: Vec3,
    pub rest_length_m: f32,
    pub max_travel_m: f32,
    pub radius_m: f32,
    pub friction_slip: f32,
    pub roll_influence: f32,
    pub is_front: bool,
    pub steering_rad: f32,
    pub engine_force_n: f32,
    pub brake_force_n: f32,
    pub in_contact: bool,
    pub skidding: bool,
    pub suspension_length_m: f32,
    pub suspension_force_n: f32,
    pub contact_point: Vec3,
    pub contact_normal: Vec3,
    pub spin_angle_rad: f32,
    pub spin_delta_rad: f32,
}

impl RaycastWheel {
    fn new(connection_local: Vec3, is_front: bool, tuning: &VehicleConfig) -> Self {
        Self {
            connection_local,
            direction_local: Vec3::NEG_Y,
            axle_local: Vec3::NEG_X,
            rest_length_m: tuning.suspension_rest_length_m,
            max_travel_m: tuning.max_suspension_travel_m,
            radius_m: tuning.wheel_radius_m,
            friction_slip: tuning.friction_slip,
            roll_influence: tuning.roll_influence,
            is_front,
            steering_rad: 0.0,
            engine_force_n: 0.0,
            brake_force_n: 0.0,
            in_contact: false,
            skidding: false,
            suspension_length_m: tuning.suspension_rest_length_m,
            suspension_force_n: 0.0,
            contact_point: Vec3::ZERO,
            contact_normal: Vec3::Y,
            spin_angle_rad: 0.0,
            spin_delta_rad: 0.0,
        }
    }

    fn max_length_m(&self) -> f32 {
        self.rest_length_m + self.max_travel_m
    }

    fn min_length_m(&self) -> f32 {
        (self.rest_length_m - self.max_travel_m).max(0.0)
    }

    fn lose_contact(&mut self) {
        self.in_contact = false;
        self.skidding = false;
        self.suspension_length_m = self.max_length_m();
        self.suspension_force_n = 0.0;
        self.spin_delta_rad *= AIRBORNE_SPIN_DECAY;
        self.spin_angle_rad += self.spin_delta_rad;
    }
}

/// Four-wheel raycast vehicle. The chassis moves forward along local +Z.
///
/// Wheel order: front +X, front -X, rear +X, rear -X.
#[derive(Component, Debug, Clone)]
pub struct RaycastVehicle {
    pub wheels: [RaycastWheel; WHEEL_COUNT],
    half_extents: Vec3,
}

impl RaycastVehicle {
    pub fn new(half_extents: Vec3, tuning: &VehicleConfig) -> Self {
        let connections = wheel_connections(half_extents, tuning);
        Self {
            wheels: [0, 1, 2, 3].map(|slot| RaycastWheel::new(connections[slot], slot < 2, tuning)),
            half_extents,
        }
    }

    /// Re-reads per-wheel tuning so live edits take effect without rebuilding the vehicle.
    /// Hardpoints move with the wheel radius and placement offsets.
    pub fn sync_tuning(&mut self, tuning: &VehicleConfig) {
        let connections = wheel_connections(self.half_extents, tuning);
        for (wheel, connection_local) in self.wheels.iter_mut().zip(connections) {
            wheel.connection_local = connection_local;
            wheel.rest_length_m = tuning.suspension_rest_length_m;
            wheel.max_travel_m = tuning.max_suspension_travel_m;
            wheel.radius_m = tuning.wheel_radius_m;
            wheel.friction_slip = tuning.friction_slip;
            wheel.roll_influence = tuning.roll_influence;
        }
    }

    /// Engine force and brake on every wheel, steering on the front pair.
    pub fn apply_commands(&mut self, control: &VehicleControl) {
        for wheel in &mut self.wheels {
            wheel.engine_force_n = control.engine_force_n;
            wheel.brake_force_n = control.brake_force_n;
            wheel.steering_rad = if wheel.is_front {
                control.steering_rad
            } else {
                0.0
            };
        }
    }

    pub fn contact_count(&self) -> usize {
        self.wheels.iter().filter(|wheel| wheel.in_contact).count()
    }

    pub fn is_airborne(&self) -> bool {
        self.contact_count() == 0
    }

    pub fn reset_wheels(&mut self) {
        for wheel in &mut self.wheels {
            wheel.in_contact = false;
            wheel.skidding = false;
            wheel.suspension_length_m = wheel.rest_length_m;
            wheel.suspension_force_n = 0.0;
            wheel.spin_delta_rad = 0.0;
            wheel.steering_rad = 0.0;
            wheel.engine_force_n = 0.0;
            wheel.brake_force_n = 0.0;
        }
    }
}

/// Chassis-local hardpoints in wheel order.
fn wheel_connections(half_extents: Vec3, tuning: &VehicleConfig) -> [Vec3; WHEEL_COUNT] {
    let x = (half_extents.x - tuning.wheel_inset_x_m).max(0.0);
    let y = -half_extents.y + tuning.wheel_connection_height_m;
    let z = (half_extents.z - tuning.wheel_radius_m + tuning.wheel_offset_z_m).max(0.0);
    [
        Vec3::new(x, y, z),
        Vec3::new(-x, y, z),
        Vec3::new(x, y, -z),
        Vec3::new(-x, y, -z),
    ]
}

#[derive(Debug, Clone, Copy)]
pub struct ChassisState {
    pub translation: Vec3,
    pub rotation: Quat,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub mass: f32,
}

impl ChassisState {
    fn point_velocity(&self, world_point: Vec3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(world_point - self.translation)
    }
}

/// Casts every wheel, then returns the summed suspension, drive, brake and grip forces.
///
/// `cast_ray(origin, direction, max_distance)` reports the nearest ground hit.
pub fn step_raycast_vehicle<F>(
    vehicle: &mut RaycastVehicle,
    chassis: &ChassisState,
    tuning: &VehicleConfig,
    dt: f32,
    mut cast_ray: F,
) -> ExternalForce
where
    F: FnMut(Vec3, Vec3, f32) -> Option<WheelRayHit>,
{
    let dt = dt.max(MIN_STEP_S);
    let mass = chassis.mass.max(0.001);
    let mass_per_wheel = mass / WHEEL_COUNT as f32;
    let chassis_up = chassis.rotation * Vec3::Y;
    let center = chassis.translation;
    let mut total = ExternalForce::default();

    for wheel in &mut vehicle.wheels {
        let hardpoint = center + chassis.rotation * wheel.connection_local;
        let down = (chassis.rotation * wheel.direction_local).normalize_or(Vec3::NEG_Y);

        let Some(hit) = cast_ray(hardpoint, down, wheel.max_length_m() + wheel.radius_m) else {
            wheel.lose_contact();
            continue;
        };

        let normal = hit.normal.normalize_or(Vec3::Y);
        wheel.in_contact = true;
        wheel.contact_point = hardpoint + down * hit.time_of_impact;
        wheel.contact_normal = normal;
        wheel.suspension_length_m = (hit.time_of_impact - wheel.radius_m)
            .clamp(wheel.min_length_m(), wheel.max_length_m());

        let contact_velocity = chassis.point_velocity(wheel.contact_point);
        let denominator = normal.dot(-down);
        let (suspension_velocity, clipped_inverse) = if denominator <= MIN_CONTACT_DENOMINATOR {
            (0.0, 1.0 / MIN_CONTACT_DENOMINATOR)
        } else {
            (normal.dot(contact_velocity) / denominator, 1.0 / denominator)
        };

        let compression_m = wheel.rest_length_m - wheel.suspension_length_m;
        let damping = if suspension_velocity < 0.0 {
            tuning.suspension_compression
        } else {
            tuning.suspension_damping
        };
        let spring = tuning.suspension_stiffness * compression_m * clipped_inverse;
        wheel.suspension_force_n = ((spring - damping * suspension_velocity) * mass)
            .clamp(0.0, tuning.max_suspension_force_n);
        total += ExternalForce::at_point(
            normal * wheel.suspension_force_n,
            wheel.contact_point,
            center,
        );

        let steered_axle =
            chassis.rotation * (Quat::from_rotation_y(wheel.steering_rad) * wheel.axle_local);
        let axle = (steered_axle - normal * steered_axle.dot(normal)).normalize_or_zero();
        let forward = normal.cross(axle).normalize_or_zero();
        let forward_speed = contact_velocity.dot(forward);
        wheel.spin_delta_rad = forward_speed * dt / wheel.radius_m.max(0.01);
        wheel.spin_angle_rad += wheel.spin_delta_rad;
        if axle == Vec3::ZERO || forward == Vec3::ZERO {
            continue;
        }

        let mut forward_force = wheel.engine_force_n;
        if wheel.brake_force_n > 0.0 {
            let stopping_force = (forward_speed.abs() * mass_per_wheel / dt).min(wheel.brake_force_n);
            forward_force -= forward_speed.signum() * stopping_force;
        }
        let mut side_force = -contact_velocity.dot(axle) * mass_per_wheel / dt;

        let grip_n = wheel.suspension_force_n * wheel.friction_slip;
        let demanded_n = forward_force.hypot(side_force);
        wheel.skidding = demanded_n > grip_n;
        if wheel.skidding && demanded_n > 0.0 {
            let scale = grip_n / demanded_n;
            forward_force *= scale;
            side_force *= scale;
        }

        let relative = wheel.contact_point - center;
        let side_point =
            wheel.contact_point - chassis_up * relative.dot(chassis_up) * (1.0 - wheel.roll_influence);
        total += ExternalForce::at_point(forward * forward_force, wheel.contact_point, center);
        total += ExternalForce::at_point(axle * side_force, side_point, center);
    }

    total
}

#[cfg(test)]
mod tests {
    use super::*;

    const HALF_EXTENTS: Vec3 = Vec3::new(1.0, 0.4, 2.0);
    const MASS: f32 = 800.0;

    fn flat_ground(origin: Vec3, direction: Vec3, max_distance: f32) -> Option<WheelRayHit> {
        if direction.y >= 0.0 || origin.y <= 0.0 {
            return None;
        }
        let time_of_impact = origin.y / -direction.y;
        (time_of_impact <= max_distance).then_some(WheelRayHit {
            time_of_impact,
            normal: Vec3::Y,
        })
    }

    fn chassis_at(height: f32, linear_velocity: Vec3) -> ChassisState {
        ChassisState {
            translation: Vec3::new(0.0, height, 0.0),
            rotation: Quat::IDENTITY,
            linear_velocity,
            angular_velocity: Vec3::ZERO,
            mass: MASS,
        }
    }

    // Hardpoints sit at y = -0.2, so a chassis at 1.2 m leaves 0.1 m of compression.
    const RESTING_HEIGHT: f32 = 1.2;

    #[test]
    fn wheels_are_mirrored_with_steerable_front_pair() {
        let vehicle = RaycastVehicle::new(HALF_EXTENTS, &VehicleConfig::default());
        let [front_a, front_b, rear_a, rear_b] = vehicle.wheels;

        assert!(front_a.is_front && front_b.is_front);
        assert!(!rear_a.is_front && !rear_b.is_front);
        assert!(front_a.connection_local.z > 0.0 && rear_a.connection_local.z < 0.0);
        assert_eq!(front_a.connection_local.x, -front_b.connection_local.x);
        assert_eq!(rear_a.connection_local.x, -rear_b.connection_local.x);
        assert_eq!(front_a.connection_local.z, -rear_a.connection_local.z);
    }

    #[test]
    fn retuning_wheel_radius_moves_hardpoints() {
        let mut vehicle = RaycastVehicle::new(HALF_EXTENTS, &VehicleConfig::default());
        let before = vehicle.wheels[0].connection_local;

        let tuning = VehicleConfig {
            wheel_radius_m: 0.7,
            wheel_connection_height_m: 0.3,
            suspension_rest_length_m: 0.45,
            ..VehicleConfig::default()
        };
        vehicle.sync_tuning(&tuning);
        let rebuilt = RaycastVehicle::new(HALF_EXTENTS, &tuning);

        assert!((vehicle.wheels[0].connection_local.z - 1.3).abs() < 1e-5);
        assert!((vehicle.wheels[0].connection_local.y - -0.1).abs() < 1e-5);
        assert_ne!(vehicle.wheels[0].connection_local, before);
        for (synced, fresh) in vehicle.wheels.iter().zip(&rebuilt.wheels) {
            assert_eq!(synced.connection_local, fresh.connection_local);
            assert_eq!(synced.radius_m, 0.7);
            assert_eq!(synced.rest_length_m, 0.45);
        }
    }

    #[test]
    fn steering_reaches_only_front_wheels() {
        let mut vehicle = RaycastVehicle::new(HALF_EXTENTS, &VehicleConfig::default());
        vehicle.apply_commands(&VehicleControl {
            engine_force_n: 500.0,
            brake_force_n: 0.0,
            steering_rad: 0.3,
        });

        for wheel in &vehicle.wheels {
            assert_eq!(wheel.engine_force_n, 500.0);
            let expected = if wheel.is_front { 0.3 } else { 0.0 };
            assert_eq!(wheel.steering_rad, expected);
        }
    }

    #[test]
    fn compressed_suspension_pushes_chassis_up() {
        let tuning = VehicleConfig::default();
        let mut vehicle = RaycastVehicle::new(HALF_EXTENTS, &tuning);

        let force = step_raycast_vehicle(
            &mut vehicle,
            &chassis_at(RESTING_HEIGHT, Vec3::ZERO),
            &tuning,
            1.0 / 60.0,
            flat_ground,
        );

        assert!(!vehicle.is_airborne());
        assert_eq!(vehicle.contact_count(), 4);
        assert!(force.force.y > 0.0);
        assert!(force.torque.length() < 1.0);
        for wheel in &vehicle.wheels {
            assert!((wheel.suspension_length_m - 0.5).abs() < 1e-4);
        }
    }

    #[test]
    fn suspension_force_never_exceeds_limit() {
        let tuning = VehicleConfig::default();
        let mut vehicle = RaycastVehicle::new(HALF_EXTENTS, &tuning);

        step_raycast_vehicle(
            &mut vehicle,
            &chassis_at(0.8, Vec3::new(0.0, -15.0, 0.0)),
            &tuning,
            1.0 / 60.0,
            flat_ground,
        );

        for wheel in &vehicle.wheels {
            assert!(wheel.suspension_force_n <= tuning.max_suspension_force_n + 1e-3);
            assert!(wheel.suspension_force_n >= 0.0);
        }
    }

    #[test]
    fn vehicle_high_above_ground_is_airborne_and_spin_decays() {
        let tuning = VehicleConfig::default();
        let mut vehicle = RaycastVehicle::new(HALF_EXTENTS, &tuning);
        for wheel in &mut vehicle.wheels {
            wheel.spin_delta_rad = 1.0;
        }

        let force = step_raycast_vehicle(
            &mut vehicle,
            &chassis_at(10.0, Vec3::ZERO),
            &tuning,
            1.0 / 60.0,
            flat_ground,
        );

        assert!(vehicle.is_airborne());
        assert_eq!(force.force, Vec3::ZERO);
        for wheel in &vehicle.wheels {
            assert!((wheel.spin_delta_rad - 0.99).abs() < 1e-6);
            assert!((wheel.suspension_length_m - wheel.max_length_m()).abs() < 1e-6);
        }
    }

    #[test]
    fn engine_force_drives_along_local_forward() {
        let tuning = VehicleConfig::default();
        let mut vehicle = RaycastVehicle::new(HALF_EXTENTS, &tuning);
        vehicle.apply_commands(&VehicleControl {
            engine_force_n: 400.0,
            ..default()
        });

        let force = step_raycast_vehicle(
            &mut vehicle,
            &chassis_at(RESTING_HEIGHT, Vec3::ZERO),
            &tuning,
            1.0 / 60.0,
            flat_ground,
        );

        assert!((force.force.z - 1_600.0).abs() < 1.0);
        assert!(force.force.x.abs() < 1e-3);
    }

    #[test]
    fn brake_opposes_forward_motion() {
        let tuning = VehicleConfig::default();
        let mut vehicle = RaycastVehicle::new(HALF_EXTENTS, &tuning);
        vehicle.apply_commands(&VehicleControl {
            brake_force_n: 300.0,
            ..default()
        });

        let force = step_raycast_vehicle(
            &mut vehicle,
            &chassis_at(RESTING_HEIGHT, Vec3::new(0.0, 0.0, 12.0)),
            &tuning,
            1.0 / 60.0,
            flat_ground,
        );

        assert!(force.force.z < 0.0);
        assert!(force.force.z >= -1_200.0 - 1e-2);
    }

    #[test]
    fn sideways_slide_is_resisted_within_grip() {
        let tuning = VehicleConfig::default();
        let mut vehicle = RaycastVehicle::new(HALF_EXTENTS, &tuning);

        let force = step_raycast_vehicle(
            &mut vehicle,
            &chassis_at(RESTING_HEIGHT, Vec3::new(6.0, 0.0, 0.0)),
            &tuning,
            1.0 / 60.0,
            flat_ground,
        );

        let grip: f32 = vehicle
            .wheels
            .iter()
            .map(|wheel| wheel.suspension_force_n * wheel.friction_slip)
            .sum();
        assert!(force.force.x < 0.0);
        assert!(force.force.x.abs() <= grip + 1e-2);
        assert!(vehicle.wheels.iter().all(|wheel| wheel.skidding));
    }
}
