use std::ops::{Add, AddAssign, Index, IndexMut, Mul, Sub};

/// Per-axis triple in body frame order roll, pitch, yaw.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct RotationVector3D {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

impl RotationVector3D {
    pub const fn new(roll: f32, pitch: f32, yaw: f32) -> Self {
        Self { roll, pitch, yaw }
    }

    pub fn to_array(&self) -> [f32; 3] {
        [self.roll, self.pitch, self.yaw]
    }

    pub fn map(self, mut f: impl FnMut(f32) -> f32) -> Self {
        Self {
            roll: f(self.roll),
            pitch: f(self.pitch),
            yaw: f(self.yaw),
        }
    }
}

impl From<[f32; 3]> for RotationVector3D {
    fn from(value: [f32; 3]) -> Self {
        Self {
            roll: value[0],
            pitch: value[1],
            yaw: value[2],
        }
    }
}

impl From<RotationVector3D> for [f32; 3] {
    fn from(value: RotationVector3D) -> Self {
        value.to_array()
    }
}

impl Index<usize> for RotationVector3D {
    type Output = f32;

    fn index(&self, axis: usize) -> &Self::Output {
        match axis {
            0 => &self.roll,
            1 => &self.pitch,
            _ => &self.yaw,
        }
    }
}

impl IndexMut<usize> for RotationVector3D {
    fn index_mut(&mut self, axis: usize) -> &mut Self::Output {
        match axis {
            0 => &mut self.roll,
            1 => &mut self.pitch,
            _ => &mut self.yaw,
        }
    }
}

impl Add<RotationVector3D> for RotationVector3D {
    type Output = RotationVector3D;

    fn add(self, rhs: RotationVector3D) -> Self::Output {
        Self {
            roll: self.roll + rhs.roll,
            pitch: self.pitch + rhs.pitch,
            yaw: self.yaw + rhs.yaw,
        }
    }
}

impl Sub<RotationVector3D> for RotationVector3D {
    type Output = RotationVector3D;

    fn sub(self, rhs: RotationVector3D) -> Self::Output {
        Self {
            roll: self.roll - rhs.roll,
            pitch: self.pitch - rhs.pitch,
            yaw: self.yaw - rhs.yaw,
        }
    }
}

impl AddAssign<RotationVector3D> for RotationVector3D {
    fn add_assign(&mut self, rhs: RotationVector3D) {
        self.roll += rhs.roll;
        self.pitch += rhs.pitch;
        self.yaw += rhs.yaw;
    }
}

impl Mul<f32> for RotationVector3D {
    type Output = RotationVector3D;

    fn mul(self, rhs: f32) -> Self::Output {
        self.map(|value| value * rhs)
    }
}
