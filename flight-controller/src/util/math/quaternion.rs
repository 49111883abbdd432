use std::ops::Mul;

use libm::{asinf, atan2f, cosf, sinf};

use super::vectors::RotationVector3D;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion {
        w: 1.0,
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn from_array(q: [f32; 4]) -> Self {
        Self {
            w: q[0],
            x: q[1],
            y: q[2],
            z: q[3],
        }
    }

    /// Builds the rotation for roll/pitch/yaw Euler angles in degrees, with a non-negative scalar part.
    pub fn from_rpy(rpy: RotationVector3D) -> Self {
        let phi = rpy.roll.to_radians() / 2.0;
        let theta = rpy.pitch.to_radians() / 2.0;
        let psi = rpy.yaw.to_radians() / 2.0;
        let (cphi, sphi) = (cosf(phi), sinf(phi));
        let (ctheta, stheta) = (cosf(theta), sinf(theta));
        let (cpsi, spsi) = (cosf(psi), sinf(psi));

        let q = Self {
            w: cphi * ctheta * cpsi + sphi * stheta * spsi,
            x: sphi * ctheta * cpsi - cphi * stheta * spsi,
            y: cphi * stheta * cpsi + sphi * ctheta * spsi,
            z: cphi * ctheta * spsi - sphi * stheta * cpsi,
        };
        if q.w < 0.0 {
            q.negate()
        } else {
            q
        }
    }

    pub fn to_rpy(&self) -> RotationVector3D {
        let (q0s, q1s, q2s, q3s) = (self.w * self.w, self.x * self.x, self.y * self.y, self.z * self.z);

        let r13 = 2.0 * (self.x * self.z - self.w * self.y);
        let r11 = q0s + q1s - q2s - q3s;
        let r12 = 2.0 * (self.x * self.y + self.w * self.z);
        let r23 = 2.0 * (self.y * self.z + self.w * self.x);
        let r33 = q0s - q1s - q2s + q3s;

        RotationVector3D {
            roll: atan2f(r23, r33).to_degrees(),
            pitch: asinf((-r13).clamp(-1.0, 1.0)).to_degrees(),
            yaw: atan2f(r12, r11).to_degrees(),
        }
    }

    /// Conjugate; the inverse for unit quaternions.
    pub fn inverse(&self) -> Self {
        Self {
            w: self.w,
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }

    fn negate(&self) -> Self {
        Self {
            w: -self.w,
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }
}

impl Mul<Quaternion> for Quaternion {
    type Output = Quaternion;

    fn mul(self, rhs: Quaternion) -> Self::Output {
        Quaternion {
            w: self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            x: self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            y: self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            z: self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: RotationVector3D, b: RotationVector3D) {
        assert!((a - b).to_array().iter().all(|e| e.abs() < 1e-3), "{:?} != {:?}", a, b);
    }

    #[test]
    fn rpy_survives_quaternion_conversion() {
        let rpy = RotationVector3D::new(20.0, -35.0, 120.0);
        assert_close(Quaternion::from_rpy(rpy).to_rpy(), rpy);
    }

    #[test]
    fn error_between_attitudes_is_relative_rotation() {
        let current = Quaternion::from_rpy(RotationVector3D::new(0.0, 0.0, 170.0));
        let desired = Quaternion::from_rpy(RotationVector3D::new(0.0, 0.0, -170.0));
        let error = (current.inverse() * desired).to_rpy();
        assert_close(error, RotationVector3D::new(0.0, 0.0, 20.0));
    }
}
