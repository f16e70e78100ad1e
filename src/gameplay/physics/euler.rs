use bevy::prelude::*;

/// Above this |sin(pitch)| the orientation is treated as gimbal-locked.
const GIMBAL_LOCK_THRESHOLD: f32 = 0.999_9;

/// Intrinsic yaw (Y), then pitch (X), then roll (Z), in radians.
///
/// Same convention as `Quat::from_euler(EulerRot::YXZ, yaw, pitch, roll)`. At the poles
/// (pitch = ±90°) roll is folded into yaw and reported as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EulerAngles {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

impl EulerAngles {
    pub fn from_degrees(degrees: [f32; 3]) -> Self {
        let [pitch, yaw, roll] = degrees;
        Self {
            yaw: yaw.to_radians(),
            pitch: pitch.to_radians(),
            roll: roll.to_radians(),
        }
    }

    pub fn to_quat(self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, self.roll)
    }
}

pub fn quat_to_euler(rotation: Quat) -> EulerAngles {
    let q = rotation.normalize();
    let (x, y, z, w) = (q.x, q.y, q.z, q.w);

    let sin_pitch = (2.0 * (w * x - y * z)).clamp(-1.0, 1.0);
    if sin_pitch.abs() >= GIMBAL_LOCK_THRESHOLD {
        let pitch = std::f32::consts::FRAC_PI_2.copysign(sin_pitch);
        let m00 = 1.0 - 2.0 * (y * y + z * z);
        let m01 = 2.0 * (x * y - w * z);
        let yaw = if sin_pitch > 0.0 {
            m01.atan2(m00)
        } else {
            (-m01).atan2(m00)
        };
        return EulerAngles {
            yaw,
            pitch,
            roll: 0.0,
        };
    }

    EulerAngles {
        yaw: (2.0 * (x * z + w * y)).atan2(1.0 - 2.0 * (x * x + y * y)),
        pitch: sin_pitch.asin(),
        roll: (2.0 * (x * y + w * z)).atan2(1.0 - 2.0 * (x * x + z * z)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};

    fn assert_same_rotation(expected: Quat, actual: Quat) {
        for axis in [Vec3::X, Vec3::Y, Vec3::Z, Vec3::new(0.3, -0.7, 0.2)] {
            let a = expected * axis;
            let b = actual * axis;
            assert!(
                a.distance(b) < 1e-3,
                "rotations differ on {axis:?}: {a:?} vs {b:?}"
            );
        }
    }

    #[test]
    fn recovers_generic_angles() {
        let rotation = Quat::from_euler(EulerRot::YXZ, 0.7, -0.4, 0.25);
        let euler = quat_to_euler(rotation);

        assert!((euler.yaw - 0.7).abs() < 1e-4);
        assert!((euler.pitch + 0.4).abs() < 1e-4);
        assert!((euler.roll - 0.25).abs() < 1e-4);
        assert_same_rotation(rotation, euler.to_quat());
    }

    #[test]
    fn identity_is_all_zero() {
        assert_eq!(quat_to_euler(Quat::IDENTITY), EulerAngles::default());
    }

    #[test]
    fn pitch_up_pole_rebuilds_same_orientation() {
        let rotation = Quat::from_euler(EulerRot::YXZ, FRAC_PI_4, FRAC_PI_2, 0.3);
        let euler = quat_to_euler(rotation);

        assert!((euler.pitch - FRAC_PI_2).abs() < 1e-4);
        assert_eq!(euler.roll, 0.0);
        assert!(euler.yaw.is_finite());
        assert_same_rotation(rotation, euler.to_quat());
    }

    #[test]
    fn pitch_down_pole_rebuilds_same_orientation() {
        let rotation = Quat::from_euler(EulerRot::YXZ, -1.1, -FRAC_PI_2, 0.6);
        let euler = quat_to_euler(rotation);

        assert!((euler.pitch + FRAC_PI_2).abs() < 1e-4);
        assert_eq!(euler.roll, 0.0);
        assert_same_rotation(rotation, euler.to_quat());
    }

    #[test]
    fn degrees_map_x_to_pitch_and_y_to_yaw() {
        let euler = EulerAngles::from_degrees([90.0, 180.0, 0.0]);

        assert!((euler.pitch - FRAC_PI_2).abs() < 1e-6);
        assert!((euler.yaw - std::f32::consts::PI).abs() < 1e-6);
        assert_eq!(euler.roll, 0.0);
    }
}
