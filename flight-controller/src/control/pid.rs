use std::f32::consts::PI;

use shared_definitions::settings::PidGains;

use super::integrator::Integrator;
use crate::util::math::misc::CubicDeadband;

pub struct PID {
    proportional_multiplier: f32,
    integral_multiplier: f32,
    derivative_multiplier: f32,
    error_integrator: Integrator,
    /// Time constant of the derivative low pass, zero when unfiltered.
    derivative_tau: f32,
    /// Weight of the setpoint in the derivative term.
    derivative_gamma: f32,
    previous_derivative_input: f32,
    previous_derivative: f32,
}

impl Default for PID {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }
}

impl PID {
    pub fn new(
        proportional_multiplier: f32,
        integral_multiplier: f32,
        derivative_multiplier: f32,
        integral_limit: f32,
    ) -> Self {
        PID {
            proportional_multiplier,
            integral_multiplier,
            derivative_multiplier,
            error_integrator: Integrator::new(integral_limit),
            derivative_tau: 0.0,
            derivative_gamma: 1.0,
            previous_derivative_input: 0.0,
            previous_derivative: 0.0,
        }
    }

    pub fn configure(&mut self, gains: &PidGains) {
        self.proportional_multiplier = gains.kp;
        self.integral_multiplier = gains.ki;
        self.derivative_multiplier = gains.kd;
        self.error_integrator.set_limit(gains.i_limit);
    }

    pub fn configure_derivative(&mut self, cutoff_hz: f32, gamma: f32) {
        self.derivative_tau = if cutoff_hz > 0.0 {
            1.0 / (2.0 * PI * cutoff_hz)
        } else {
            0.0
        };
        self.derivative_gamma = gamma;
    }

    /// Setpoint form: the derivative acts on `gamma * setpoint - measured`.
    pub fn update(
        &mut self,
        desired_state: f32,
        measured_state: f32,
        iteration_length: f32,
        deadband: Option<&CubicDeadband>,
    ) -> f32 {
        let mut error = desired_state - measured_state;
        if let Some(deadband) = deadband {
            error = deadband.apply(error);
        }
        let derivative_input = self.derivative_gamma * desired_state - measured_state;
        self.compute(error, derivative_input, iteration_length)
    }

    /// Error-only form, used by the outer loops.
    pub fn apply(&mut self, error: f32, iteration_length: f32) -> f32 {
        self.compute(error, error, iteration_length)
    }

    fn compute(&mut self, error: f32, derivative_input: f32, iteration_length: f32) -> f32 {
        let accumulated = if self.integral_multiplier != 0.0 {
            self.error_integrator
                .add_new_value(error * self.integral_multiplier, iteration_length)
        } else {
            self.error_integrator.reset();
            0.0
        };

        let mut derivative_output = 0.0_f32;
        if self.derivative_multiplier != 0.0 && iteration_length > 0.0 {
            let change_rate = (derivative_input - self.previous_derivative_input) / iteration_length;
            let raw = change_rate * self.derivative_multiplier;
            derivative_output = if self.derivative_tau > 0.0 {
                self.previous_derivative
                    + iteration_length / (iteration_length + self.derivative_tau)
                        * (raw - self.previous_derivative)
            } else {
                raw
            };
            self.previous_derivative = derivative_output;
        }
        self.previous_derivative_input = derivative_input;

        error * self.proportional_multiplier + accumulated + derivative_output
    }

    pub fn zero_integral(&mut self) {
        self.error_integrator.reset();
    }

    pub fn get_integral(&self) -> f32 {
        self.error_integrator.get_current_value()
    }

    pub fn decay_integral(&mut self, factor: f32) {
        self.error_integrator.scale(factor);
    }

    /// Integral divided by the integral gain, in units of the error.
    pub fn integrated_error(&self) -> f32 {
        if self.integral_multiplier != 0.0 {
            self.error_integrator.get_current_value() / self.integral_multiplier
        } else {
            0.0
        }
    }

    pub fn set_integrated_error(&mut self, value: f32) {
        self.error_integrator.set_value(value * self.integral_multiplier);
    }

    /// Full reset, including derivative memory.
    pub fn reset(&mut self) {
        self.error_integrator.reset();
        self.previous_derivative_input = 0.0;
        self.previous_derivative = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proportional_only() {
        let mut pid = PID::new(0.5, 0.0, 0.0, 0.0);
        assert_eq!(pid.update(10.0, 4.0, 0.001, None), 3.0);
    }

    #[test]
    fn integral_is_bounded() {
        let mut pid = PID::new(0.0, 1.0, 0.0, 0.3);
        let mut out = 0.0;
        for _ in 0..10_000 {
            out = pid.update(100.0, 0.0, 0.001, None);
        }
        assert!((out - 0.3).abs() < 1e-6);
        pid.zero_integral();
        assert_eq!(pid.get_integral(), 0.0);
    }

    #[test]
    fn zero_integral_gain_clears_accumulator() {
        let mut pid = PID::new(0.0, 1.0, 0.0, 1.0);
        pid.update(1.0, 0.0, 0.1, None);
        assert!(pid.get_integral() > 0.0);
        pid.configure(&PidGains::new(0.0, 0.0, 0.0, 1.0));
        pid.update(1.0, 0.0, 0.1, None);
        assert_eq!(pid.get_integral(), 0.0);
    }

    #[test]
    fn derivative_ignores_setpoint_with_zero_gamma() {
        let mut pid = PID::new(0.0, 0.0, 1.0, 0.0);
        pid.configure_derivative(0.0, 0.0);
        pid.update(0.0, 0.0, 0.01, None);
        let out = pid.update(50.0, 0.0, 0.01, None);
        assert_eq!(out, 0.0);
        let out = pid.update(50.0, 1.0, 0.01, None);
        assert!((out + 100.0).abs() < 1e-3);
    }

    #[test]
    fn filtered_derivative_is_smaller_than_raw() {
        let mut raw = PID::new(0.0, 0.0, 1.0, 0.0);
        let mut filtered = PID::new(0.0, 0.0, 1.0, 0.0);
        filtered.configure_derivative(20.0, 1.0);
        raw.update(0.0, 0.0, 0.001, None);
        filtered.update(0.0, 0.0, 0.001, None);
        let raw_out = raw.update(0.0, 1.0, 0.001, None);
        let filtered_out = filtered.update(0.0, 1.0, 0.001, None);
        assert!(filtered_out.abs() < raw_out.abs());
        assert!(filtered_out < 0.0);
    }

    #[test]
    fn reset_clears_integral_and_derivative_memory() {
        let mut pid = PID::new(0.0, 0.5, 1.0, 0.0);
        pid.apply(2.0, 0.1);
        pid.apply(4.0, 0.1);
        assert!((pid.integrated_error() - 0.6).abs() < 1e-6);

        pid.reset();
        assert_eq!(pid.get_integral(), 0.0);
        // No memory of the last error: the derivative sees a step from zero.
        assert!((pid.apply(1.0, 0.1) - 10.05).abs() < 1e-4);
    }

    #[test]
    fn deadband_shrinks_small_errors() {
        let deadband = CubicDeadband::new(5.0, 0.2);
        let mut pid = PID::new(1.0, 0.0, 0.0, 0.0);
        let out = pid.update(1.0, 0.0, 0.001, Some(&deadband));
        assert!(out < 1.0 && out > 0.0);
    }
}
