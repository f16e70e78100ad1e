use super::VehicleInputState;
use crate::config::VehicleConfig;
use bevy::prelude::*;

const MPS_TO_KMH: f32 = 3.6;

/// Driver commands carried between ticks.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq)]
pub struct VehicleControl {
    pub engine_force_n: f32,
    pub brake_force_n: f32,
    pub steering_rad: f32,
}

impl VehicleControl {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AirControl {
    pub gravity_scale: f32,
    pub lift_force: Vec3,
    pub cancel_spin: bool,
}

pub fn update_throttle(control: &mut VehicleControl, input: &VehicleInputState, tuning: &VehicleConfig) {
    if input.accelerate {
        control.engine_force_n = (control.engine_force_n + tuning.engine_force_increment_n)
            .min(tuning.max_engine_force_n);
        control.brake_force_n = 0.0;
    } else if input.reverse {
        control.engine_force_n = (control.engine_force_n - tuning.engine_force_increment_n)
            .max(-tuning.max_reverse_force_n);
        control.brake_force_n = 0.0;
    } else {
        control.engine_force_n = 0.0;
        control.brake_force_n = tuning.default_brake_force_n;
    }

    if input.handbrake {
        control.brake_force_n = tuning.max_brake_force_n;
    }
}

pub fn update_steering(
    control: &mut VehicleControl,
    input: &VehicleInputState,
    speed_mps: f32,
    tuning: &VehicleConfig,
) {
    if input.steer_left && !input.steer_right {
        control.steering_rad += tuning.steering_increment;
    } else if input.steer_right && !input.steer_left {
        control.steering_rad -= tuning.steering_increment;
    } else {
        control.steering_rad *= tuning.steering_return_factor;
    }

    let limit = max_steering_angle(speed_mps, tuning);
    control.steering_rad = control.steering_rad.clamp(-limit, limit);
}

/// Wide lock at standstill narrowing linearly to the high-speed lock at the threshold speed.
pub fn max_steering_angle(speed_mps: f32, tuning: &VehicleConfig) -> f32 {
    let t = if tuning.steering_speed_threshold_mps > 0.0 {
        (speed_mps.abs() / tuning.steering_speed_threshold_mps).clamp(0.0, 1.0)
    } else {
        1.0
    };
    tuning.steering_max_angle_low_speed
        + (tuning.steering_max_angle_high_speed - tuning.steering_max_angle_low_speed) * t
}

/// Commands while input is disabled: no drive, idle brake, wheels return to centre.
pub fn park(control: &mut VehicleControl, tuning: &VehicleConfig) {
    control.engine_force_n = 0.0;
    control.brake_force_n = tuning.default_brake_force_n;
    control.steering_rad *= tuning.steering_return_factor;
}

pub fn clamp_speed(linear_velocity: Vec3, max_speed_mps: f32) -> Vec3 {
    linear_velocity.clamp_length_max(max_speed_mps.max(0.0))
}

pub fn air_control(airborne: bool, tuning: &VehicleConfig) -> AirControl {
    if airborne {
        AirControl {
            gravity_scale: tuning.airborne_gravity_scale,
            lift_force: Vec3::Y * tuning.air_control_force_n,
            cancel_spin: true,
        }
    } else {
        AirControl {
            gravity_scale: 1.0,
            lift_force: Vec3::ZERO,
            cancel_spin: false,
        }
    }
}

pub fn speed_kmh(speed_mps: f32) -> f32 {
    speed_mps * MPS_TO_KMH
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuning() -> VehicleConfig {
        VehicleConfig {
            steering_speed_threshold_mps: 10.0,
            steering_max_angle_low_speed: 0.4,
            steering_max_angle_high_speed: 0.07,
            ..VehicleConfig::default()
        }
    }

    fn held(configure: impl FnOnce(&mut VehicleInputState)) -> VehicleInputState {
        let mut input = VehicleInputState::default();
        configure(&mut input);
        input
    }

    #[test]
    fn steering_limit_is_wide_at_rest_and_narrow_at_speed() {
        let tuning = tuning();

        assert!((max_steering_angle(0.0, &tuning) - 0.4).abs() < 1e-6);
        assert!((max_steering_angle(10.0, &tuning) - 0.07).abs() < 1e-6);
        assert!((max_steering_angle(25.0, &tuning) - 0.07).abs() < 1e-6);
        assert!((max_steering_angle(5.0, &tuning) - 0.235).abs() < 1e-5);
    }

    #[test]
    fn full_lock_saturates_at_speed_dependent_limit() {
        let tuning = tuning();
        let left = held(|input| input.steer_left = true);
        let right = held(|input| input.steer_right = true);

        let mut control = VehicleControl::default();
        for _ in 0..50 {
            update_steering(&mut control, &left, 0.0, &tuning);
        }
        assert!((control.steering_rad - 0.4).abs() < 1e-6);

        for _ in 0..50 {
            update_steering(&mut control, &right, 0.0, &tuning);
        }
        assert!((control.steering_rad + 0.4).abs() < 1e-6);

        update_steering(&mut control, &right, 12.0, &tuning);
        assert!((control.steering_rad + 0.07).abs() < 1e-6);
    }

    #[test]
    fn released_steering_decays_toward_centre() {
        let tuning = tuning();
        let mut control = VehicleControl {
            steering_rad: 0.3,
            ..default()
        };

        update_steering(&mut control, &VehicleInputState::default(), 0.0, &tuning);

        assert!((control.steering_rad - 0.27).abs() < 1e-6);
    }

    #[test]
    fn throttle_ramps_to_max_and_release_applies_idle_brake() {
        let tuning = tuning();
        let forward = held(|input| input.accelerate = true);
        let mut control = VehicleControl::default();

        update_throttle(&mut control, &forward, &tuning);
        assert!((control.engine_force_n - tuning.engine_force_increment_n).abs() < 1e-3);
        assert_eq!(control.brake_force_n, 0.0);

        for _ in 0..1_000 {
            update_throttle(&mut control, &forward, &tuning);
        }
        assert!((control.engine_force_n - tuning.max_engine_force_n).abs() < 1e-3);

        update_throttle(&mut control, &VehicleInputState::default(), &tuning);
        assert_eq!(control.engine_force_n, 0.0);
        assert!((control.brake_force_n - tuning.default_brake_force_n).abs() < 1e-6);
    }

    #[test]
    fn reverse_is_capped_and_handbrake_overrides_brake() {
        let tuning = tuning();
        let reverse = held(|input| {
            input.reverse = true;
            input.handbrake = true;
        });
        let mut control = VehicleControl::default();

        for _ in 0..1_000 {
            update_throttle(&mut control, &reverse, &tuning);
        }

        assert!((control.engine_force_n + tuning.max_reverse_force_n).abs() < 1e-3);
        assert!((control.brake_force_n - tuning.max_brake_force_n).abs() < 1e-6);
    }

    #[test]
    fn parked_vehicle_drops_engine_force() {
        let tuning = tuning();
        let mut control = VehicleControl {
            engine_force_n: 900.0,
            brake_force_n: 0.0,
            steering_rad: 0.2,
        };

        park(&mut control, &tuning);

        assert_eq!(control.engine_force_n, 0.0);
        assert!((control.brake_force_n - tuning.default_brake_force_n).abs() < 1e-6);
        assert!(control.steering_rad < 0.2);
    }

    #[test]
    fn speed_cap_preserves_direction() {
        let capped = clamp_speed(Vec3::new(30.0, 0.0, 40.0), 10.0);

        assert!((capped.length() - 10.0).abs() < 1e-4);
        assert!(capped.normalize().distance(Vec3::new(0.6, 0.0, 0.8)) < 1e-5);
        assert_eq!(clamp_speed(Vec3::X, 10.0), Vec3::X);
    }

    #[test]
    fn airborne_vehicles_get_reduced_gravity_and_lift() {
        let tuning = tuning();
        let air = air_control(true, &tuning);
        let ground = air_control(false, &tuning);

        assert!(air.gravity_scale < 1.0);
        assert!(air.lift_force.y > 0.0);
        assert!(air.cancel_spin);
        assert_eq!(ground.gravity_scale, 1.0);
        assert_eq!(ground.lift_force, Vec3::ZERO);
        assert!(!ground.cancel_spin);
    }

    #[test]
    fn speed_converts_to_kmh() {
        assert!((speed_kmh(10.0) - 36.0).abs() < 1e-5);
    }
}
