use shared_definitions::{
    settings::{StabilizationSettings, SubTrimSettings},
    stabilization::{AttitudeActual, StabilizationMode},
    MAX_AXES, PITCH, ROLL, YAW,
};

use crate::{
    config::constants::HORIZON_MODE_MAX_BLEND,
    util::math::{
        misc::{bound_min_max, bound_sym, circular_modulus_deg},
        quaternion::Quaternion,
        vectors::RotationVector3D,
    },
};

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct AttitudeError {
    /// Degrees, yaw wrapped into (-180, 180].
    pub error: RotationVector3D,
    /// How far towards rate control horizon mode blends, in [0, 1].
    pub horizon_rate_fraction: f32,
}

/// Attitude error for the axes running an attitude law; other axes report no error.
/// `sticks` are normalized inputs.
pub fn calculate_attitude_errors(
    modes: &[Option<StabilizationMode>; MAX_AXES],
    sticks: &[f32; MAX_AXES],
    attitude: &AttitudeActual,
    settings: &StabilizationSettings,
    sub_trim: &SubTrimSettings,
) -> AttitudeError {
    let roll_setpoint = bound_min_max(
        sticks[ROLL] * settings.roll_max + sub_trim.roll,
        -settings.roll_max + sub_trim.roll,
        settings.roll_max + sub_trim.roll,
    );
    let pitch_setpoint = bound_min_max(
        sticks[PITCH] * settings.pitch_max + sub_trim.pitch,
        -settings.pitch_max + sub_trim.pitch,
        settings.pitch_max + sub_trim.pitch,
    );
    let mut setpoint = RotationVector3D::new(
        roll_setpoint,
        pitch_setpoint,
        sticks[YAW] * settings.yaw_max,
    );

    let mut horizon_rate_fraction = 0.0_f32;
    let current = RotationVector3D::from(attitude.rpy());

    for axis in 0..MAX_AXES {
        match modes[axis] {
            Some(StabilizationMode::Horizon) => {
                horizon_rate_fraction = horizon_rate_fraction.max(sticks[axis].abs());
            }
            // Weak leveling drifts back towards the trimmed level attitude.
            Some(StabilizationMode::WeakLeveling) => {
                setpoint[axis] = match axis {
                    ROLL => sub_trim.roll,
                    PITCH => sub_trim.pitch,
                    _ => 0.0,
                };
            }
            Some(StabilizationMode::Attitude) | Some(StabilizationMode::SystemIdent) => {}
            _ => setpoint[axis] = current[axis],
        }
    }

    let desired = Quaternion::from_rpy(setpoint);
    let actual = Quaternion::from_array(attitude.q);
    let mut error = (actual.inverse() * desired).to_rpy();
    error.yaw = circular_modulus_deg(error.yaw);

    AttitudeError {
        error,
        horizon_rate_fraction: bound_sym(horizon_rate_fraction, HORIZON_MODE_MAX_BLEND)
            / HORIZON_MODE_MAX_BLEND,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attitude(roll: f32, pitch: f32, yaw: f32) -> AttitudeActual {
        let q = Quaternion::from_rpy(RotationVector3D::new(roll, pitch, yaw));
        AttitudeActual {
            q: [q.w, q.x, q.y, q.z],
            roll,
            pitch,
            yaw,
        }
    }

    #[test]
    fn level_request_from_banked_attitude() {
        let settings = StabilizationSettings::default();
        let modes = [Some(StabilizationMode::Attitude); 3];
        let result = calculate_attitude_errors(
            &modes,
            &[0.0, 0.0, 0.0],
            &attitude(10.0, 0.0, 0.0),
            &settings,
            &SubTrimSettings::default(),
        );
        assert!((result.error.roll + 10.0).abs() < 1e-3);
        assert!(result.error.pitch.abs() < 1e-3);
    }

    #[test]
    fn rate_axes_have_no_error() {
        let settings = StabilizationSettings::default();
        let modes = [
            Some(StabilizationMode::Rate),
            Some(StabilizationMode::Attitude),
            Some(StabilizationMode::Rate),
        ];
        let result = calculate_attitude_errors(
            &modes,
            &[1.0, 0.5, 1.0],
            &attitude(0.0, 0.0, 45.0),
            &settings,
            &SubTrimSettings::default(),
        );
        assert!(result.error.roll.abs() < 0.5);
        assert!(result.error.yaw.abs() < 0.5);
        assert!(result.error.pitch > 20.0);
    }

    #[test]
    fn trim_shifts_setpoint_and_bounds() {
        let mut settings = StabilizationSettings::default();
        settings.roll_max = 30.0;
        let trim = SubTrimSettings {
            roll: 2.0,
            pitch: 0.0,
        };
        let modes = [Some(StabilizationMode::Attitude), None, None];
        let result = calculate_attitude_errors(
            &modes,
            &[1.5, 0.0, 0.0],
            &AttitudeActual::default(),
            &settings,
            &trim,
        );
        assert!((result.error.roll - 32.0).abs() < 1e-2);
    }

    #[test]
    fn horizon_fraction_uses_largest_stick() {
        let settings = StabilizationSettings::default();
        let modes = [Some(StabilizationMode::Horizon); 3];
        let result = calculate_attitude_errors(
            &modes,
            &[0.2, -0.425, 0.1],
            &AttitudeActual::default(),
            &settings,
            &SubTrimSettings::default(),
        );
        assert!((result.horizon_rate_fraction - 0.5).abs() < 1e-5);

        let saturated = calculate_attitude_errors(
            &modes,
            &[0.95, 0.0, 0.0],
            &AttitudeActual::default(),
            &settings,
            &SubTrimSettings::default(),
        );
        assert_eq!(saturated.horizon_rate_fraction, 1.0);
    }
}
