//! Tricopter tail handling: the tail servo tilts the rear motor, which both yaws the frame
//! and steals vertical thrust. The servo command is linearized against the real yaw force
//! and the rear motor is sped up to make up for the lost lift.

use libm::{atanf, cosf, sinf, sqrtf};
use shared_definitions::{
    actuator::ActuatorCommand,
    settings::{ActuatorChannel, ActuatorSettings, TriflightSettings},
    MAX_MIX_ACTUATORS,
};

use super::{
    airframe_stage::{AirframeOutputStage, StageInputs},
    channel_scaling::channel_bounds,
};
use crate::util::{
    error::{FlightError, FlightResult},
    math::filters::Pt1Filter,
};

pub const TAIL_SERVO_ANGLE_MID: f32 = 90.0;
pub const TAIL_SERVO_ANGLE_MAX: f32 = 50.0;
const YAW_FORCE_CURVE_SIZE: usize = 100;

const SERVO_FEEDBACK_CUTOFF_HZ: f32 = 70.0;
const TAIL_MOTOR_CUTOFF_HZ: f32 = 5.0;

/// Lift lost by a tail motor tilted to `angle` (radians), as a thrust multiplier.
pub fn pitch_correction_at_tail_angle(angle: f32, thrust_factor: f32) -> f32 {
    1.0 / (sinf(angle) - cosf(angle) / thrust_factor)
}

pub struct Triflight {
    settings: TriflightSettings,
    servo: ActuatorChannel,
    rear_motor: ActuatorChannel,
    yaw_force_curve: [f32; YAW_FORCE_CURVE_SIZE],
    max_yaw_force: f32,
    pitch_zero_angle: f32,
    throttle_range: f32,
    motor_acceleration: f32,
    servo_angle: f32,
    servo_feedback_filter: Pt1Filter,
    tail_motor_speed: f32,
    tail_motor_filter: Pt1Filter,
    virtual_tail_motor: f32,
    dynamic_yaw_gain: f32,
}

impl Triflight {
    pub fn new(actuator: &ActuatorSettings, settings: TriflightSettings) -> FlightResult<Self> {
        if settings.servo_channel >= MAX_MIX_ACTUATORS
            || settings.rear_motor_channel >= MAX_MIX_ACTUATORS
            || settings.servo_channel == settings.rear_motor_channel
        {
            return Err(FlightError::InvalidSettings("triflight channels"));
        }
        if settings.motor_thrust_factor <= 0.0 || settings.servo_max_angle <= 0.0 {
            return Err(FlightError::InvalidSettings("triflight geometry"));
        }

        let thrust_factor = settings.motor_thrust_factor;
        let min_angle = TAIL_SERVO_ANGLE_MID - settings.servo_max_angle;
        let max_angle = TAIL_SERVO_ANGLE_MID + settings.servo_max_angle;

        let mut yaw_force_curve = [0.0; YAW_FORCE_CURVE_SIZE];
        let mut max_neg_force: f32 = 0.0;
        let mut max_pos_force: f32 = 0.0;
        for (index, force) in yaw_force_curve.iter_mut().enumerate() {
            let angle = TAIL_SERVO_ANGLE_MID - TAIL_SERVO_ANGLE_MAX + index as f32;
            let angle_rad = angle.to_radians();
            *force = (-thrust_factor * cosf(angle_rad) - sinf(angle_rad))
                * pitch_correction_at_tail_angle(angle_rad, thrust_factor);

            // Only the configured travel counts towards the usable force.
            if angle >= min_angle && angle <= max_angle {
                max_neg_force = max_neg_force.min(*force);
                max_pos_force = max_pos_force.max(*force);
            }
        }

        let pitch_zero_angle =
            (2.0 * atanf((sqrtf(thrust_factor * thrust_factor + 1.0) + 1.0) / thrust_factor))
                .to_degrees();

        let rear_motor = actuator.channels[settings.rear_motor_channel];
        let throttle_range = rear_motor.max - rear_motor.neutral;
        let motor_acceleration = if throttle_range > 0.0 && settings.motor_acceleration > 0.0 {
            1.0 / settings.motor_acceleration
        } else {
            0.0
        };

        log::info!(
            "Triflight tail: max yaw force {:.2}, yaw neutral at {:.1} deg",
            max_neg_force.abs().min(max_pos_force.abs()),
            pitch_zero_angle
        );

        Ok(Self {
            settings,
            servo: actuator.channels[settings.servo_channel],
            rear_motor,
            yaw_force_curve,
            max_yaw_force: max_neg_force.abs().min(max_pos_force.abs()),
            pitch_zero_angle,
            throttle_range,
            motor_acceleration,
            servo_angle: TAIL_SERVO_ANGLE_MID,
            servo_feedback_filter: Pt1Filter::new(SERVO_FEEDBACK_CUTOFF_HZ),
            tail_motor_speed: 0.0,
            tail_motor_filter: Pt1Filter::new(TAIL_MOTOR_CUTOFF_HZ),
            virtual_tail_motor: 0.0,
            dynamic_yaw_gain: 1.0,
        })
    }

    pub fn servo_angle(&self) -> f32 {
        self.servo_angle
    }

    pub fn max_yaw_force(&self) -> f32 {
        self.max_yaw_force
    }

    /// Servo angle (degrees) at which the tail produces no yaw force.
    pub fn pitch_zero_angle(&self) -> f32 {
        self.pitch_zero_angle
    }

    /// Estimated tail motor speed, 0 at neutral and 1 at full throttle.
    pub fn virtual_tail_motor(&self) -> f32 {
        self.virtual_tail_motor
    }

    pub fn dynamic_yaw_gain(&self) -> f32 {
        self.dynamic_yaw_gain
    }

    /// Angle that yields `force`, by inverting the yaw force curve.
    pub fn angle_at_yaw_force(&self, force: f32) -> f32 {
        let curve = &self.yaw_force_curve;
        if force < curve[0] {
            return TAIL_SERVO_ANGLE_MID - TAIL_SERVO_ANGLE_MAX;
        } else if !(force < curve[YAW_FORCE_CURVE_SIZE - 1]) {
            return TAIL_SERVO_ANGLE_MID + TAIL_SERVO_ANGLE_MAX;
        }

        // curve[lower] <= force < curve[higher]
        let mut lower = 0;
        let mut higher = YAW_FORCE_CURVE_SIZE - 1;
        while higher > lower + 1 {
            let mid = (lower + higher) / 2;
            if curve[mid] > force {
                higher = mid;
            } else {
                lower = mid;
            }
        }

        TAIL_SERVO_ANGLE_MID - TAIL_SERVO_ANGLE_MAX
            + lower as f32
            + (force - curve[lower]) / (curve[higher] - curve[lower])
    }

    /// True when `servo_value` lies between the minimum and neutral pulse widths.
    fn on_min_side(&self, servo_value: f32) -> bool {
        (servo_value < self.servo.neutral) == (self.servo.min < self.servo.max)
    }

    /// Servo angle commanded by a pulse width. The minimum pulse tilts the motor to
    /// `90 + max_angle`, the maximum pulse to `90 - max_angle`.
    pub fn servo_angle_at_value(&self, servo_value: f32) -> f32 {
        let max_angle = self.settings.servo_max_angle;
        if self.on_min_side(servo_value) {
            let range = self.servo.neutral - self.servo.min;
            if range == 0.0 {
                return TAIL_SERVO_ANGLE_MID;
            }
            TAIL_SERVO_ANGLE_MID + max_angle
                - (servo_value - self.servo.min) / range * max_angle
        } else {
            let range = self.servo.max - self.servo.neutral;
            if range == 0.0 {
                return TAIL_SERVO_ANGLE_MID;
            }
            TAIL_SERVO_ANGLE_MID - (servo_value - self.servo.neutral) / range * max_angle
        }
    }

    pub fn servo_value_at_angle(&self, angle: f32) -> f32 {
        let max_angle = self.settings.servo_max_angle;
        if angle >= TAIL_SERVO_ANGLE_MID {
            let fraction = (TAIL_SERVO_ANGLE_MID + max_angle - angle) / max_angle;
            self.servo.min + fraction * (self.servo.neutral - self.servo.min)
        } else {
            let fraction = (TAIL_SERVO_ANGLE_MID - angle) / max_angle;
            self.servo.neutral + fraction * (self.servo.max - self.servo.neutral)
        }
    }

    /// Treats the mixer's servo output as a linear yaw force demand and returns the pulse
    /// width that really produces that force.
    pub fn corrected_servo_value(&self, servo_value: f32) -> f32 {
        let range = if self.on_min_side(servo_value) {
            self.servo.neutral - self.servo.min
        } else {
            self.servo.max - self.servo.neutral
        };
        let linear_force = if range == 0.0 {
            0.0
        } else {
            (self.servo.neutral - servo_value) / range * self.max_yaw_force
        };

        let corrected = self.servo_value_at_angle(self.angle_at_yaw_force(linear_force));
        let (low, high) = channel_bounds(&self.servo);
        corrected.max(low).min(high)
    }

    /// Follows the servo at its rated speed when there is no position feedback.
    pub fn virtual_servo_step(&mut self, servo_value: f32, dt: f32) {
        let set_point = self.servo_angle_at_value(servo_value);
        let max_step = dt * self.settings.servo_speed;

        if (self.servo_angle - set_point).abs() < max_step {
            self.servo_angle = set_point;
        } else if self.servo_angle < set_point {
            self.servo_angle += max_step;
        } else {
            self.servo_angle -= max_step;
        }
    }

    /// Reads the servo position from its feedback potentiometer. No reading assumes the
    /// servo is centred.
    pub fn feedback_servo_step(&mut self, adc_value: Option<f32>, dt: f32) {
        let Some(adc_value) = adc_value else {
            self.servo_angle = TAIL_SERVO_ANGLE_MID;
            return;
        };

        let feedback = self.servo_feedback_filter.apply(adc_value, dt);
        let settings = &self.settings;
        let min_side = (feedback < settings.adc_servo_feedback_mid)
            == (settings.adc_servo_feedback_min < settings.adc_servo_feedback_max);

        self.servo_angle = if min_side {
            let range = settings.adc_servo_feedback_mid - settings.adc_servo_feedback_min;
            TAIL_SERVO_ANGLE_MID + settings.servo_max_angle
                - (feedback - settings.adc_servo_feedback_min) / range * settings.servo_max_angle
        } else {
            let range = settings.adc_servo_feedback_max - settings.adc_servo_feedback_mid;
            TAIL_SERVO_ANGLE_MID
                - (feedback - settings.adc_servo_feedback_mid) / range * settings.servo_max_angle
        };
    }

    /// Extra tail motor pulse width needed to hold lift at the current servo angle.
    pub fn motor_correction(&self) -> f32 {
        let correction = self.throttle_range
            * pitch_correction_at_tail_angle(
                self.servo_angle.to_radians(),
                self.settings.motor_thrust_factor,
            )
            - self.throttle_range;
        correction * self.settings.yaw_boost
    }

    /// Tail motor speed model: slew limited spin up, then a lag for the prop.
    pub fn virtual_tail_motor_step(&mut self, setpoint: f32, dt: f32) {
        let setpoint = setpoint.max(self.rear_motor.neutral);
        let normalized = if self.throttle_range > 0.0 {
            (setpoint - self.rear_motor.neutral) / self.throttle_range
        } else {
            0.0
        };

        let max_step = dt * self.motor_acceleration;
        if (self.tail_motor_speed - normalized).abs() < max_step {
            self.tail_motor_speed = normalized;
        } else if self.tail_motor_speed < normalized {
            self.tail_motor_speed += max_step;
        } else {
            self.tail_motor_speed -= max_step;
        }

        self.virtual_tail_motor = self.tail_motor_filter.apply(self.tail_motor_speed, dt);
    }

    /// More yaw authority when the tail motor is slow, less when it is fast.
    pub fn update_dynamic_yaw(&mut self) {
        let hover = self.settings.dynamic_yaw_hover_percent;
        let range = self.rear_motor.max - self.rear_motor.neutral;
        let low_range = range * hover;
        let high_range = range - low_range;

        if low_range == 0.0 || high_range == 0.0 {
            self.dynamic_yaw_gain = 1.0;
            return;
        }

        let distance_from_hover = (self.virtual_tail_motor - hover) * range;
        self.dynamic_yaw_gain = if self.virtual_tail_motor < hover {
            let gain = self.settings.dynamic_yaw_min_throttle - 1.0;
            1.0 - distance_from_hover * gain / low_range
        } else {
            let gain = 1.0 - self.settings.dynamic_yaw_max_throttle;
            1.0 - distance_from_hover * gain / high_range
        };
    }
}

impl AirframeOutputStage for Triflight {
    fn apply_to_command(&mut self, command: &mut ActuatorCommand, inputs: &StageInputs) {
        let servo_channel = self.settings.servo_channel;
        let rear_channel = self.settings.rear_motor_channel;

        if inputs.armed {
            command.channel[servo_channel] =
                self.corrected_servo_value(command.channel[servo_channel]);

            let rear_value = command.channel[rear_channel];
            if rear_value > self.rear_motor.neutral {
                let (low, high) = channel_bounds(&self.rear_motor);
                command.channel[rear_channel] =
                    (rear_value + self.motor_correction()).max(low).min(high);
            }
        }

        if self.settings.use_servo_feedback {
            self.feedback_servo_step(inputs.servo_feedback[0], inputs.dt);
        } else {
            self.virtual_servo_step(command.channel[servo_channel], inputs.dt);
        }
        self.virtual_tail_motor_step(command.channel[rear_channel], inputs.dt);
        self.update_dynamic_yaw();
    }

    fn yaw_gain(&self) -> f32 {
        self.dynamic_yaw_gain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_definitions::settings::ChannelType;

    const DT: f32 = 0.002;

    fn actuator_settings() -> ActuatorSettings {
        let mut actuator = ActuatorSettings::default();
        actuator.channels[3] = ActuatorChannel {
            min: 1000.0,
            max: 2000.0,
            neutral: 1500.0,
            deadband: 0,
            channel_type: ChannelType::Pwm,
        };
        actuator.channels[2].neutral = 1050.0;
        actuator
    }

    fn triflight() -> Triflight {
        Triflight::new(&actuator_settings(), TriflightSettings::default()).unwrap()
    }

    #[test]
    fn rejects_shared_channels() {
        let settings = TriflightSettings {
            servo_channel: 2,
            ..Default::default()
        };
        assert!(Triflight::new(&actuator_settings(), settings).is_err());
    }

    #[test]
    fn yaw_force_grows_with_tail_angle() {
        let tri = triflight();
        for pair in tri.yaw_force_curve.windows(2) {
            assert!(pair[1] > pair[0]);
        }
        assert!(tri.max_yaw_force() > 0.0);
        assert_eq!(tri.angle_at_yaw_force(-1.0e6), 40.0);
        assert_eq!(tri.angle_at_yaw_force(1.0e6), 140.0);
    }

    #[test]
    fn pitch_zero_angle_is_the_zero_force_angle() {
        let tri = triflight();
        let thrust_factor = TriflightSettings::default().motor_thrust_factor;
        let zero_force_angle = 180.0 - atanf(thrust_factor).to_degrees();
        assert!((tri.pitch_zero_angle() - zero_force_angle).abs() < 1e-3);
        assert!((tri.angle_at_yaw_force(0.0) - zero_force_angle).abs() < 0.1);
    }

    #[test]
    fn neutral_servo_cancels_tail_yaw() {
        let tri = triflight();
        let thrust_factor = TriflightSettings::default().motor_thrust_factor;
        // Motor tilted so its torque and thrust components cancel.
        let zero_force_angle = 180.0 - atanf(thrust_factor).to_degrees();
        let corrected = tri.corrected_servo_value(1500.0);
        let angle = tri.servo_angle_at_value(corrected);
        assert!((angle - zero_force_angle).abs() < 0.1, "{}", angle);
    }

    #[test]
    fn servo_correction_is_monotonic() {
        let tri = triflight();
        let mut previous = 0.0;
        for step in 0..=100 {
            let corrected = tri.corrected_servo_value(1000.0 + step as f32 * 10.0);
            assert!(corrected >= previous);
            assert!((1000.0..=2000.0).contains(&corrected));
            previous = corrected;
        }
    }

    #[test]
    fn servo_angle_and_value_agree() {
        let tri = triflight();
        assert_eq!(tri.servo_angle_at_value(1000.0), 130.0);
        assert_eq!(tri.servo_angle_at_value(1500.0), 90.0);
        assert_eq!(tri.servo_angle_at_value(2000.0), 50.0);
        assert!((tri.servo_value_at_angle(110.0) - 1250.0).abs() < 1e-3);
        assert!((tri.servo_value_at_angle(70.0) - 1750.0).abs() < 1e-3);
    }

    #[test]
    fn virtual_servo_slews_at_rated_speed() {
        let mut tri = triflight();
        tri.virtual_servo_step(2000.0, 0.01);
        assert!((tri.servo_angle() - 87.0).abs() < 1e-4);
        for _ in 0..100 {
            tri.virtual_servo_step(2000.0, 0.01);
        }
        assert_eq!(tri.servo_angle(), 50.0);
    }

    #[test]
    fn feedback_servo_tracks_adc() {
        let mut tri = triflight();
        tri.servo_angle = 120.0;
        tri.feedback_servo_step(None, DT);
        assert_eq!(tri.servo_angle(), 90.0);

        for _ in 0..1000 {
            tri.feedback_servo_step(Some(1000.0), DT);
        }
        assert!((tri.servo_angle() - 130.0).abs() < 0.1);
    }

    #[test]
    fn tilted_tail_needs_more_throttle() {
        let mut tri = triflight();
        assert!(tri.motor_correction().abs() < 1e-3);
        tri.servo_angle = 60.0;
        assert!(tri.motor_correction() > 0.0);
    }

    #[test]
    fn dynamic_yaw_gain_follows_tail_motor() {
        let mut tri = triflight();
        tri.update_dynamic_yaw();
        assert!((tri.dynamic_yaw_gain() - 1.5).abs() < 1e-4);

        for _ in 0..2000 {
            tri.virtual_tail_motor_step(2000.0, DT);
        }
        tri.update_dynamic_yaw();
        assert!((tri.virtual_tail_motor() - 1.0).abs() < 1e-3);
        assert!((tri.dynamic_yaw_gain() - 0.75).abs() < 1e-2);
    }

    #[test]
    fn disarmed_outputs_pass_through() {
        let mut tri = triflight();
        let mut command = ActuatorCommand::default();
        command.channel[2] = 1000.0;
        command.channel[3] = 1500.0;
        let original = command;
        tri.apply_to_command(
            &mut command,
            &StageInputs {
                armed: false,
                dt: DT,
                servo_feedback: [None; 2],
            },
        );
        assert_eq!(command, original);
    }

    #[test]
    fn armed_outputs_are_corrected() {
        let mut tri = triflight();
        let mut command = ActuatorCommand::default();
        command.channel[2] = 1500.0;
        command.channel[3] = 1500.0;
        tri.apply_to_command(
            &mut command,
            &StageInputs {
                armed: true,
                dt: DT,
                servo_feedback: [None; 2],
            },
        );
        assert!(command.channel[3] < 1500.0);
        assert!(command.channel[2] >= 1500.0);
    }
}
