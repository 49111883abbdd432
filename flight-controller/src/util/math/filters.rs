use std::f32::consts::PI;

/// First order low pass, parameterized by cutoff frequency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pt1Filter {
    state: f32,
    rc: f32,
}

impl Pt1Filter {
    pub fn new(cutoff_hz: f32) -> Self {
        Self {
            state: 0.0,
            rc: 1.0 / (2.0 * PI * cutoff_hz),
        }
    }

    pub fn with_state(cutoff_hz: f32, state: f32) -> Self {
        Self {
            state,
            ..Self::new(cutoff_hz)
        }
    }

    pub fn apply(&mut self, input: f32, dt: f32) -> f32 {
        self.state += dt / (self.rc + dt) * (input - self.state);
        self.state
    }

    pub fn state(&self) -> f32 {
        self.state
    }

    pub fn reset(&mut self, state: f32) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converges_to_step_input() {
        let mut filter = Pt1Filter::new(70.0);
        for _ in 0..1000 {
            filter.apply(1.0, 0.001);
        }
        assert!((filter.state() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn lags_a_step_by_one_time_constant() {
        let cutoff = 5.0;
        let mut filter = Pt1Filter::new(cutoff);
        let rc = 1.0 / (2.0 * PI * cutoff);
        let steps = (rc / 0.0001) as usize;
        for _ in 0..steps {
            filter.apply(1.0, 0.0001);
        }
        assert!((filter.state() - 0.632).abs() < 0.01);
    }
}
