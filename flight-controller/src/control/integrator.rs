/// Accumulator with a symmetric bound. A zero limit leaves it unbounded.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Integrator {
    current_value: f32,
    limit: f32,
}

impl Integrator {
    pub fn new(limit: f32) -> Self {
        Integrator {
            current_value: 0.0_f32,
            limit,
        }
    }

    pub fn add_new_value(&mut self, value: f32, interval_seconds: f32) -> f32 {
        self.current_value += value * interval_seconds;
        if self.limit > 0.0 {
            self.current_value = self.current_value.clamp(-self.limit, self.limit);
        }
        self.current_value
    }

    pub fn get_current_value(&self) -> f32 {
        self.current_value
    }

    /// Overwrites the accumulated value, keeping it within the bound.
    pub fn set_value(&mut self, value: f32) {
        self.current_value = if self.limit > 0.0 {
            value.clamp(-self.limit, self.limit)
        } else {
            value
        };
    }

    pub fn scale(&mut self, factor: f32) {
        self.current_value *= factor;
    }

    pub fn set_limit(&mut self, limit: f32) {
        self.limit = limit;
    }

    pub fn reset(&mut self) {
        self.current_value = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturates_at_limit() {
        let mut integrator = Integrator::new(2.0);
        for _ in 0..100 {
            integrator.add_new_value(10.0, 0.01);
        }
        assert_eq!(integrator.get_current_value(), 2.0);
        integrator.add_new_value(-100.0, 1.0);
        assert_eq!(integrator.get_current_value(), -2.0);
        integrator.reset();
        assert_eq!(integrator.get_current_value(), 0.0);
    }

    #[test]
    fn overwritten_values_respect_the_limit() {
        let mut integrator = Integrator::new(1.5);
        integrator.set_value(4.0);
        assert_eq!(integrator.get_current_value(), 1.5);
        integrator.scale(0.5);
        assert_eq!(integrator.get_current_value(), 0.75);
    }
}
