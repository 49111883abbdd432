use crate::MAX_AXES;

/// Plant estimate produced by autotune. Beta and tau are natural logs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemIdentResult {
    pub beta: [f32; MAX_AXES],
    pub tau: f32,
    pub bias: [f32; MAX_AXES],
    pub noise: [f32; MAX_AXES],
    pub num_af_predicts: u32,
    pub num_spilled_pts: u32,
    pub hover_throttle: f32,
    pub new_tune: bool,
}

impl Default for SystemIdentResult {
    fn default() -> Self {
        Self {
            beta: [10.0, 10.0, 7.0],
            tau: -4.0,
            bias: [0.0; MAX_AXES],
            noise: [0.0; MAX_AXES],
            num_af_predicts: 0,
            num_spilled_pts: 0,
            hover_throttle: 0.0,
            new_tune: false,
        }
    }
}
