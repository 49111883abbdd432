use shared_definitions::{actuator::ActuatorCommand, settings::BiflightSettings};

use super::airframe_stage::{AirframeOutputStage, StageInputs};
use crate::util::math::filters::Pt1Filter;

const SERVO_FEEDBACK_CUTOFF_HZ: f32 = 70.0;

pub const LEFT: usize = 0;
pub const RIGHT: usize = 1;

/// Twin tilting rotor frame. Only measures where both servos really are; the mixer already
/// drives them.
pub struct Biflight {
    settings: BiflightSettings,
    filters: [Pt1Filter; 2],
    servo_angle: [f32; 2],
}

impl Biflight {
    pub fn new(settings: BiflightSettings) -> Self {
        Self {
            settings,
            filters: [Pt1Filter::new(SERVO_FEEDBACK_CUTOFF_HZ); 2],
            servo_angle: [0.0; 2],
        }
    }

    /// Degrees from upright, negative towards the minimum feedback reading.
    pub fn servo_angle(&self, side: usize) -> f32 {
        self.servo_angle[side]
    }

    pub fn servo_step(&mut self, feedback: [Option<f32>; 2], dt: f32) {
        for side in [LEFT, RIGHT] {
            self.servo_angle[side] = match feedback[side] {
                Some(adc_value) => {
                    let filtered = self.filters[side].apply(adc_value, dt);
                    self.angle_from_feedback(side, filtered)
                }
                None => 0.0,
            };
        }
    }

    fn angle_from_feedback(&self, side: usize, feedback: f32) -> f32 {
        let min = self.settings.adc_servo_feedback_min[side];
        let mid = self.settings.adc_servo_feedback_mid[side];
        let max = self.settings.adc_servo_feedback_max[side];
        let max_angle = self.settings.servo_max_angle;

        if (feedback < mid) == (min < max) {
            (feedback - min) / (mid - min) * max_angle - max_angle
        } else {
            (feedback - mid) / (max - mid) * max_angle
        }
    }
}

impl AirframeOutputStage for Biflight {
    fn apply_to_command(&mut self, _command: &mut ActuatorCommand, inputs: &StageInputs) {
        self.servo_step(inputs.servo_feedback, inputs.dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_feedback_reads_upright() {
        let mut biflight = Biflight::new(BiflightSettings::default());
        biflight.servo_angle = [12.0, -3.0];
        biflight.servo_step([None, None], 0.002);
        assert_eq!(biflight.servo_angle(LEFT), 0.0);
        assert_eq!(biflight.servo_angle(RIGHT), 0.0);
    }

    #[test]
    fn sides_are_measured_independently() {
        let mut biflight = Biflight::new(BiflightSettings::default());
        for _ in 0..1000 {
            biflight.servo_step([Some(1500.0), Some(3000.0)], 0.002);
        }
        assert!((biflight.servo_angle(LEFT) + 20.0).abs() < 0.05);
        assert!((biflight.servo_angle(RIGHT) - 40.0).abs() < 0.05);
    }

    #[test]
    fn reversed_feedback_range() {
        let settings = BiflightSettings {
            adc_servo_feedback_min: [3000.0; 2],
            adc_servo_feedback_max: [1000.0; 2],
            ..Default::default()
        };
        let biflight = Biflight::new(settings);
        assert_eq!(biflight.angle_from_feedback(LEFT, 3000.0), -40.0);
        assert_eq!(biflight.angle_from_feedback(LEFT, 2000.0), 0.0);
        assert_eq!(biflight.angle_from_feedback(LEFT, 1000.0), 40.0);
    }
}
