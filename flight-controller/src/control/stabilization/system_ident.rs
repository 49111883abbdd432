use shared_definitions::{MAX_AXES, PITCH, ROLL, YAW};

use crate::config::constants::{SYSTEM_IDENT_MEASURE_TIME_S, SYSTEM_IDENT_PREPARE_TIME_MS};

/// Axis and direction of the excitation for each of the eight phases of a cycle.
const EXCITATION_PATTERN: [(usize, f32); 8] = [
    (YAW, 1.0),
    (ROLL, 1.0),
    (YAW, -1.0),
    (ROLL, -1.0),
    (YAW, 1.0),
    (PITCH, 1.0),
    (YAW, -1.0),
    (PITCH, -1.0),
];

/// Schedules the square-wave "wiggle" that autotune identifies the airframe from.
///
/// A cycle is eight phases of `2^shift` loop iterations each. The shift is chosen from the
/// loop rate so a cycle lasts roughly half a second. Measurement starts on a cycle boundary
/// once the craft had time to settle and runs for about a minute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemIdentExcitation {
    shift: u32,
    mask: u32,
    measure_length: u32,
    measuring: bool,
    enter_time_us: u64,
    measure_remaining: u32,
}

impl SystemIdentExcitation {
    pub fn new(dt_expected: f32) -> Self {
        let shift = if dt_expected < 0.0004 {
            8
        } else if dt_expected < 0.0008 {
            7
        } else if dt_expected < 0.0014 {
            6
        } else {
            5
        };
        let mask = (1_u32 << (shift + 3)) - 1;
        let measure_length = (SYSTEM_IDENT_MEASURE_TIME_S / dt_expected) as u32 & !mask;

        Self {
            shift,
            mask,
            measure_length,
            measuring: false,
            enter_time_us: 0,
            measure_remaining: 0,
        }
    }

    /// Number of loop iterations in one full cycle.
    pub fn cycle_length(&self) -> u32 {
        self.mask + 1
    }

    pub fn is_measuring(&self) -> bool {
        self.measuring && self.measure_remaining > 0
    }

    /// Per-axis bookkeeping run before the axis law. The roll axis drives the schedule.
    pub fn prepare_axis(
        &mut self,
        axis: usize,
        reinit: bool,
        iteration: u32,
        now_us: u64,
        armed: bool,
    ) {
        if axis == ROLL {
            if reinit {
                self.enter_time_us = now_us;
                self.measuring = false;
            }

            let prepared = now_us.saturating_sub(self.enter_time_us)
                > SYSTEM_IDENT_PREPARE_TIME_MS as u64 * 1000;
            if !self.measuring && prepared && iteration & self.mask == 0 {
                self.measuring = true;
                self.measure_remaining = self.measure_length;
            }
        }

        if !armed {
            self.measuring = false;
        }
    }

    /// Returns the position inside the cycle and the excitation to add to this axis output.
    pub fn excite(&mut self, axis: usize, iteration: u32, scale: f32) -> Option<(u16, f32)> {
        if !self.is_measuring() {
            return None;
        }
        if axis == YAW {
            self.measure_remaining -= 1;
        }

        let phase = ((iteration >> self.shift) & 0x07) as usize;
        let (excited_axis, direction) = EXCITATION_PATTERN[phase];
        let offset = if excited_axis == axis {
            direction * scale
        } else {
            0.0
        };
        Some(((iteration & self.mask) as u16, offset))
    }
}

/// Amount of excitation per axis. Once an estimate exists, more responsive axes get less.
pub fn excitation_scale(
    effort: f32,
    beta: f32,
    have_estimate: bool,
    reference_beta: f32,
    max: f32,
) -> f32 {
    let scale = if have_estimate {
        effort * libm::expf(reference_beta - beta)
    } else {
        effort
    };
    scale.min(max)
}

/// Convenience for computing all three axes at once.
pub fn excitation_scales(
    effort: &[f32; MAX_AXES],
    beta: &[f32; MAX_AXES],
    have_estimate: bool,
    reference_beta: f32,
    max: f32,
) -> [f32; MAX_AXES] {
    let mut scales = [0.0; MAX_AXES];
    for axis in 0..MAX_AXES {
        scales[axis] =
            excitation_scale(effort[axis], beta[axis], have_estimate, reference_beta, max);
    }
    scales
}
