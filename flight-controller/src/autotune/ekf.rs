//! Extended Kalman filter identifying the rate response of the airframe.
//!
//! Per axis the model is
//!
//! ```text
//! w' = w + Ts * e^beta * (u - bias)
//! u' = (Ts * u_in + e^tau * u) / (Ts + e^tau)
//! ```
//!
//! with `beta`, the bias and the motor time constant `tau` (shared by all axes) as random
//! walks. `beta` and `tau` live in the natural log domain inside the filter.
//!
//! The covariance is kept packed: per axis the 14 upper-triangular entries of the
//! {w, u, beta, tau, bias} block except (tau, tau), then one shared (tau, tau) entry.
//! Covariance between different axes is dropped, which keeps the update to one scalar
//! innovation per axis.

use libm::expf;
use shared_definitions::MAX_AXES;

pub const NUM_STATES: usize = 13;
pub const NUM_COVARIANCE: usize = 43;

const W: usize = 0;
const U: usize = 3;
const BETA: usize = 6;
pub const TAU: usize = 9;
const BIAS: usize = 10;

// Packed offsets inside one axis block.
const P_WW: usize = 0;
const P_WU: usize = 1;
const P_WB: usize = 2;
const P_WT: usize = 3;
const P_WS: usize = 4;
const P_UU: usize = 5;
const P_UB: usize = 6;
const P_UT: usize = 7;
const P_US: usize = 8;
const P_BB: usize = 9;
const P_BT: usize = 10;
const P_BS: usize = 11;
const P_TS: usize = 12;
const P_SS: usize = 13;
const AXIS_BLOCK: usize = 14;
const P_TT: usize = AXIS_BLOCK * MAX_AXES;

// Process noise.
const Q_W: f32 = 1e-4;
const Q_U: f32 = 1e-4;
const Q_BETA: f32 = 1e-5;
const Q_TAU: f32 = 1e-5;
const Q_BIAS: f32 = 1e-8;
/// Gyro measurement noise.
const S_A: f32 = 150.0;

pub const TAU_MIN: f32 = -5.5;
pub const TAU_MAX: f32 = -1.5;
pub const BIAS_LIMIT: f32 = 0.5;
pub const LN_BETA_MIN: f32 = 0.0;
pub const LN_BETA_MAX: f32 = 20.0;

const INITIAL_LN_BETA: [f32; MAX_AXES] = [10.0, 10.0, 7.0];
const INITIAL_LN_TAU: f32 = -4.0;

const fn p_index(axis: usize, offset: usize) -> usize {
    axis * AXIS_BLOCK + offset
}

/// Lower bound wins for NaN.
fn clamp_state(value: f32, min: f32, max: f32) -> f32 {
    if !(value >= min) {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateTorqueEkf {
    pub x: [f32; NUM_STATES],
    pub p: [f32; NUM_COVARIANCE],
}

impl Default for RateTorqueEkf {
    fn default() -> Self {
        let mut filter = Self {
            x: [0.0; NUM_STATES],
            p: [0.0; NUM_COVARIANCE],
        };
        filter.af_init();
        filter
    }
}

impl RateTorqueEkf {
    pub fn af_init(&mut self) {
        self.x = [0.0; NUM_STATES];
        self.x[BETA..BETA + MAX_AXES].copy_from_slice(&INITIAL_LN_BETA);
        self.x[TAU] = INITIAL_LN_TAU;

        self.p = [0.0; NUM_COVARIANCE];
        const BETA_VARIANCE: [f32; MAX_AXES] = [0.05, 0.05, 0.005];
        for axis in 0..MAX_AXES {
            self.p[p_index(axis, P_WW)] = 1.0;
            self.p[p_index(axis, P_UU)] = 10.0;
            self.p[p_index(axis, P_BB)] = BETA_VARIANCE[axis];
            self.p[p_index(axis, P_SS)] = 0.05;
        }
        self.p[P_TT] = 0.05;
    }

    /// Torque scale per axis.
    pub fn beta(&self) -> [f32; MAX_AXES] {
        [
            expf(self.x[BETA]),
            expf(self.x[BETA + 1]),
            expf(self.x[BETA + 2]),
        ]
    }

    pub fn ln_beta(&self) -> [f32; MAX_AXES] {
        [self.x[BETA], self.x[BETA + 1], self.x[BETA + 2]]
    }

    /// Motor time constant in seconds.
    pub fn tau(&self) -> f32 {
        expf(self.x[TAU])
    }

    pub fn bias(&self) -> [f32; MAX_AXES] {
        [self.x[BIAS], self.x[BIAS + 1], self.x[BIAS + 2]]
    }

    pub fn rate(&self) -> [f32; MAX_AXES] {
        [self.x[W], self.x[W + 1], self.x[W + 2]]
    }

    /// One predict/update step. `u_in` is the actuator command, `gyro` the measured rate in
    /// deg/s. Returns the innovation per axis.
    pub fn af_predict(&mut self, u_in: &[f32; MAX_AXES], gyro: &[f32; MAX_AXES], dt_s: f32) -> [f32; MAX_AXES] {
        let ts = dt_s;
        let e_tau = expf(self.x[TAU]);
        let ts_e_tau = ts + e_tau;

        // Motor response derivatives, shared.
        let c = e_tau / ts_e_tau;
        let p_tt = self.p[P_TT];

        for axis in 0..MAX_AXES {
            let w = self.x[W + axis];
            let u = self.x[U + axis];
            let e_beta = expf(self.x[BETA + axis]);
            let bias = self.x[BIAS + axis];

            // Jacobian entries; the remaining rows are identity.
            let a = ts * e_beta;
            let b = ts * e_beta * (u - bias);
            let d = e_tau * ts * (u - u_in[axis]) / (ts_e_tau * ts_e_tau);

            self.x[W + axis] = w + a * (u - bias);
            self.x[U + axis] = (ts * u_in[axis] + u * e_tau) / ts_e_tau;

            let p = &mut self.p;
            let ww = p[p_index(axis, P_WW)];
            let wu = p[p_index(axis, P_WU)];
            let wb = p[p_index(axis, P_WB)];
            let wt = p[p_index(axis, P_WT)];
            let ws = p[p_index(axis, P_WS)];
            let uu = p[p_index(axis, P_UU)];
            let ub = p[p_index(axis, P_UB)];
            let ut = p[p_index(axis, P_UT)];
            let us = p[p_index(axis, P_US)];
            let bb = p[p_index(axis, P_BB)];
            let bt = p[p_index(axis, P_BT)];
            let bs = p[p_index(axis, P_BS)];
            let ts_ = p[p_index(axis, P_TS)];
            let ss = p[p_index(axis, P_SS)];

            // Row w of F times P.
            let fw_w = ww + a * wu + b * wb - a * ws;
            let fw_u = wu + a * uu + b * ub - a * us;
            let fw_b = wb + a * ub + b * bb - a * bs;
            let fw_t = wt + a * ut + b * bt - a * ts_;
            let fw_s = ws + a * us + b * bs - a * ss;

            // Row u of F times P.
            let fu_u = c * uu + d * ut;
            let fu_b = c * ub + d * bt;
            let fu_t = c * ut + d * p_tt;
            let fu_s = c * us + d * ts_;

            p[p_index(axis, P_WW)] = fw_w + a * fw_u + b * fw_b - a * fw_s + Q_W;
            p[p_index(axis, P_WU)] = c * fw_u + d * fw_t;
            p[p_index(axis, P_WB)] = fw_b;
            p[p_index(axis, P_WT)] = fw_t;
            p[p_index(axis, P_WS)] = fw_s;
            p[p_index(axis, P_UU)] = c * fu_u + d * fu_t + Q_U;
            p[p_index(axis, P_UB)] = fu_b;
            p[p_index(axis, P_UT)] = fu_t;
            p[p_index(axis, P_US)] = fu_s;
            p[p_index(axis, P_BB)] = bb + Q_BETA;
            p[p_index(axis, P_SS)] = ss + Q_BIAS;
        }
        self.p[P_TT] += Q_TAU;

        let mut innovations = [0.0; MAX_AXES];
        for axis in 0..MAX_AXES {
            let innovation = gyro[axis] - self.x[W + axis];
            innovations[axis] = innovation;

            let p = &mut self.p;
            let ww = p[p_index(axis, P_WW)];
            let wu = p[p_index(axis, P_WU)];
            let wb = p[p_index(axis, P_WB)];
            let wt = p[p_index(axis, P_WT)];
            let ws = p[p_index(axis, P_WS)];
            let s_inv = 1.0 / (ww + S_A);

            self.x[W + axis] += ww * s_inv * innovation;
            self.x[U + axis] += wu * s_inv * innovation;
            self.x[BETA + axis] += wb * s_inv * innovation;
            self.x[TAU] += wt * s_inv * innovation;
            self.x[BIAS + axis] += ws * s_inv * innovation;

            // P -= K * H * P, with H selecting w.
            p[p_index(axis, P_WW)] -= ww * ww * s_inv;
            p[p_index(axis, P_WU)] -= ww * wu * s_inv;
            p[p_index(axis, P_WB)] -= ww * wb * s_inv;
            p[p_index(axis, P_WT)] -= ww * wt * s_inv;
            p[p_index(axis, P_WS)] -= ww * ws * s_inv;
            p[p_index(axis, P_UU)] -= wu * wu * s_inv;
            p[p_index(axis, P_UB)] -= wu * wb * s_inv;
            p[p_index(axis, P_UT)] -= wu * wt * s_inv;
            p[p_index(axis, P_US)] -= wu * ws * s_inv;
            p[p_index(axis, P_BB)] -= wb * wb * s_inv;
            p[p_index(axis, P_BT)] -= wb * wt * s_inv;
            p[p_index(axis, P_BS)] -= wb * ws * s_inv;
            p[p_index(axis, P_TS)] -= wt * ws * s_inv;
            p[p_index(axis, P_SS)] -= ws * ws * s_inv;
            p[P_TT] -= wt * wt * s_inv;
        }

        self.x[TAU] = clamp_state(self.x[TAU], TAU_MIN, TAU_MAX);
        for axis in 0..MAX_AXES {
            self.x[BETA + axis] = clamp_state(self.x[BETA + axis], LN_BETA_MIN, LN_BETA_MAX);
            self.x[BIAS + axis] = clamp_state(self.x[BIAS + axis], -BIAS_LIMIT, BIAS_LIMIT);
        }

        if self.x.iter().chain(self.p.iter()).any(|value| !value.is_finite()) {
            self.af_init();
        }

        innovations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 0.001;

    fn next_random(state: &mut u32) -> f32 {
        *state ^= *state << 13;
        *state ^= *state >> 17;
        *state ^= *state << 5;
        *state as f32 / u32::MAX as f32 * 2.0 - 1.0
    }

    fn assert_clamped(filter: &RateTorqueEkf) {
        assert!(filter.x[TAU] >= TAU_MIN && filter.x[TAU] <= TAU_MAX);
        for axis in 0..MAX_AXES {
            let bias = filter.x[BIAS + axis];
            assert!((-BIAS_LIMIT..=BIAS_LIMIT).contains(&bias));
        }
    }

    #[test]
    fn packed_layout_covers_every_entry_once() {
        assert_eq!(p_index(MAX_AXES - 1, P_SS) + 1, P_TT);
        assert_eq!(P_TT + 1, NUM_COVARIANCE);
    }

    #[test]
    fn log_domain_parameters_round_trip() {
        let filter = RateTorqueEkf::default();
        for (beta, ln_beta) in filter.beta().iter().zip(filter.ln_beta()) {
            assert!((libm::logf(*beta) - ln_beta).abs() < 1e-5);
        }
        assert!((libm::logf(filter.tau()) - INITIAL_LN_TAU).abs() < 1e-6);
    }

    #[test]
    fn quiet_input_stays_at_rest() {
        let mut filter = RateTorqueEkf::default();
        for _ in 0..1000 {
            filter.af_predict(&[0.0; 3], &[0.0; 3], DT);
        }
        for axis in 0..MAX_AXES {
            assert!(filter.x[W + axis].abs() < 1e-3);
            assert!(filter.x[U + axis].abs() < 1e-3);
            assert!((filter.x[BETA + axis] - INITIAL_LN_BETA[axis]).abs() < 1e-3);
            assert!(filter.x[BIAS + axis].abs() < 1e-3);
        }
        assert!((filter.x[TAU] - INITIAL_LN_TAU).abs() < 1e-3);
        assert!(filter.p.iter().all(|value| value.is_finite()));
    }

    #[test]
    fn clamps_hold_under_random_measurements() {
        let mut filter = RateTorqueEkf::default();
        let mut seed = 0x1234_5678_u32;
        for step in 0..20_000 {
            let u = [
                next_random(&mut seed),
                next_random(&mut seed),
                next_random(&mut seed),
            ];
            let mut gyro = [
                next_random(&mut seed) * 500.0,
                next_random(&mut seed) * 500.0,
                next_random(&mut seed) * 500.0,
            ];
            if step % 997 == 0 {
                gyro = [1e6, -1e6, 3e5];
            }
            filter.af_predict(&u, &gyro, DT);
            assert_clamped(&filter);
        }
    }

    #[test]
    fn tracks_a_simulated_axis() {
        // Plant with ln beta = 9 on every axis and tau = e^-3.5.
        let true_beta = expf(9.0);
        let true_tau = expf(-3.5);
        let mut filter = RateTorqueEkf::default();
        let mut rate = [0.0_f32; 3];
        let mut torque = [0.0_f32; 3];

        for step in 0..60_000_u32 {
            let phase = (step >> 6) & 7;
            let mut u = [0.0_f32; 3];
            let direction = if phase & 2 == 0 { 1.0 } else { -1.0 };
            match phase {
                0 | 2 | 4 | 6 => u[2] = 0.1 * direction,
                1 | 3 => u[0] = 0.1 * direction,
                _ => u[1] = 0.1 * direction,
            }
            for axis in 0..3 {
                torque[axis] += DT / (DT + true_tau) * (u[axis] - torque[axis]);
                rate[axis] += DT * true_beta * torque[axis];
                // Light damping so the simulated rates stay bounded.
                rate[axis] *= 0.999;
            }
            filter.af_predict(&u, &rate, DT);
        }

        for axis in 0..MAX_AXES {
            assert!(
                (filter.ln_beta()[axis] - 9.0).abs() < 1.0,
                "axis {} ln beta {}",
                axis,
                filter.ln_beta()[axis]
            );
        }
        assert_clamped(&filter);
    }
}
