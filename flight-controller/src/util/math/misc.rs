use libm::{cbrtf, fmodf, powf};

pub fn bound_min_max(value: f32, min: f32, max: f32) -> f32 {
    if value < min {
        return min;
    }
    if value > max {
        return max;
    }
    value
}

pub fn bound_sym(value: f32, range: f32) -> f32 {
    bound_min_max(value, -range, range)
}

/// Wraps an angle error in degrees into (-180, 180].
pub fn circular_modulus_deg(error: f32) -> f32 {
    let value = fmodf(error + 180.0, 360.0);
    if value <= 0.0 {
        value + 180.0
    } else {
        value - 180.0
    }
}

/// Blends a linear and a power response. `gain` is a percentage, the result stays in [-1,1].
pub fn expo_m(x: f32, gain: f32, exponent: f32) -> f32 {
    let linear = x * (100.0 - gain) / 100.0;
    let curved = powf(x.abs(), exponent) * gain / 100.0;
    let out = if x >= 0.0 {
        linear + curved
    } else {
        linear - curved
    };
    bound_sym(out, 1.0)
}

/// Precomputed coefficients of a cubic deadband; see [`cubic_deadband`].
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct CubicDeadband {
    pub width: f32,
    pub slope: f32,
    pub m: f32,
    pub r: f32,
}

impl CubicDeadband {
    pub fn new(width: f32, slope: f32) -> Self {
        let (m, r) = cubic_deadband_setup(width, slope);
        Self {
            width,
            slope,
            m,
            r,
        }
    }

    pub fn apply(&self, input: f32) -> f32 {
        cubic_deadband(input, self.width, self.slope, self.m, self.r)
    }
}

/// Returns (m, r) so the cubic section meets the unit-slope tails with matching value and slope.
pub fn cubic_deadband_setup(width: f32, slope: f32) -> (f32, f32) {
    if width <= 0.0 {
        return (0.0, 0.0);
    }
    let m = cbrtf((1.0 - slope) / (3.0 * width * width));
    let r = powf(m * width, 3.0) + slope * width;
    (m, r)
}

pub fn cubic_deadband(input: f32, width: f32, slope: f32, m: f32, r: f32) -> f32 {
    if input <= -width {
        input + width - r
    } else if input >= width {
        input - width + r
    } else {
        powf(m * input, 3.0) + slope * input
    }
}

/// Piecewise-linear lookup of `input` over `curve`, whose points span [min, max] evenly.
/// Inputs below `min` map to the first point, past the end to the last point.
pub fn linear_interpolate(input: f32, curve: &[f32], min: f32, max: f32) -> f32 {
    let Some(&last) = curve.last() else {
        return 0.0;
    };
    let num_points = curve.len();

    let mut scale = (input - min) / (max - min);
    // Also catches NaN.
    if !(scale > 0.0) {
        scale = 0.0;
    }
    scale *= (num_points - 1) as f32;
    let idx1 = scale as usize;
    scale -= idx1 as f32;
    let idx2 = idx1 + 1;
    if idx2 >= num_points {
        return last;
    }
    curve[idx1] * (1.0 - scale) + curve[idx2] * scale
}

/// Bit-level approximation of `base^exponent` for positive bases.
/// Exact for an exponent of 1.
pub fn powapprox(base: f32, exponent: f32) -> f32 {
    const ONE_BITS: i32 = 1_064_866_805;
    let offset = base.to_bits() as i32 - ONE_BITS;
    let scaled = ((exponent as f64 * offset as f64) as i32).wrapping_add(ONE_BITS);
    f32::from_bits(scaled as u32)
}
