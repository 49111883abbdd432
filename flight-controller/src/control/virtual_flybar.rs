use libm::{cosf, sinf};
use shared_definitions::settings::{PidGains, VbarSettings};

use super::pid::PID;

/// Control law emulating the mechanical stabilizer bar of a helicopter rotor head.
///
/// The flybar angle of each axis lives in the integrator of that axis' VirtualBar PID.
pub trait VirtualFlybar {
    /// `command` is the normalized stick, `gyro` the measured rate in deg/s.
    fn apply(
        &mut self,
        pid: &mut PID,
        axis: usize,
        gyro: f32,
        command: f32,
        dt: f32,
        settings: &VbarSettings,
    ) -> f32;

    /// Rotates the roll and pitch flybar angles with the yaw rotation of the last tick.
    fn piro_compensate(&mut self, roll: &mut PID, pitch: &mut PID, yaw_rate: f32, dt: f32);

    fn set_decay(&mut self, decay: f32);
}

/// Gains of the VirtualBar PID: the feedback PI, with the integral bounded at the
/// maximum flybar angle.
pub fn vbar_pid_gains(settings: &VbarSettings, axis: usize) -> PidGains {
    let feedback = settings.feedback_pi[axis];
    PidGains::new(
        feedback.kp,
        feedback.ki,
        0.0,
        feedback.ki.abs() * settings.max_angle,
    )
}

/// Flybar whose angle follows the integrated gyro and slowly decays back to level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayingFlybar {
    decay: f32,
}

impl Default for DecayingFlybar {
    fn default() -> Self {
        Self { decay: 1.0 }
    }
}

impl VirtualFlybar for DecayingFlybar {
    fn apply(
        &mut self,
        pid: &mut PID,
        axis: usize,
        gyro: f32,
        command: f32,
        dt: f32,
        settings: &VbarSettings,
    ) -> f32 {
        pid.decay_integral(self.decay);
        // kp * gyro + ki * angle
        let feedback = pid.apply(gyro, dt);

        // Large stick inputs suppress gyro feedback for fast flips.
        let mut gyro_gain = 1.0_f32;
        if settings.gyro_suppress > 0.0 {
            gyro_gain = (1.0 - command.abs() * settings.gyro_suppress / 100.0).max(0.0);
        }

        command * settings.sensitivity[axis] - gyro_gain * feedback
    }

    fn piro_compensate(&mut self, roll: &mut PID, pitch: &mut PID, yaw_rate: f32, dt: f32) {
        let rotation = yaw_rate.to_radians() * dt;
        let (cy, sy) = (cosf(rotation), sinf(rotation));
        let roll_angle = roll.integrated_error();
        let pitch_angle = pitch.integrated_error();
        roll.set_integrated_error(cy * roll_angle - sy * pitch_angle);
        pitch.set_integrated_error(sy * roll_angle + cy * pitch_angle);
    }

    fn set_decay(&mut self, decay: f32) {
        self.decay = decay;
    }
}
