use bitflags::bitflags;

use crate::MAX_AXES;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StabilizationMode {
    Disabled = 0,
    Failsafe = 1,
    Manual = 2,
    Rate = 3,
    AcroPlus = 4,
    AcroDyne = 5,
    Attitude = 6,
    AxisLock = 7,
    WeakLeveling = 8,
    VirtualBar = 9,
    Horizon = 10,
    SystemIdent = 11,
    SystemIdentRate = 12,
    Poi = 13,
    CoordinatedFlight = 14,
}

impl TryFrom<u8> for StabilizationMode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use StabilizationMode::*;
        let mode = match value {
            0 => Disabled,
            1 => Failsafe,
            2 => Manual,
            3 => Rate,
            4 => AcroPlus,
            5 => AcroDyne,
            6 => Attitude,
            7 => AxisLock,
            8 => WeakLeveling,
            9 => VirtualBar,
            10 => Horizon,
            11 => SystemIdent,
            12 => SystemIdentRate,
            13 => Poi,
            14 => CoordinatedFlight,
            other => return Err(other),
        };
        Ok(mode)
    }
}

impl StabilizationMode {
    /// Modes whose setpoint is an attitude, so an attitude error is computed for them.
    pub fn uses_attitude_error(&self) -> bool {
        matches!(
            self,
            StabilizationMode::Horizon
                | StabilizationMode::WeakLeveling
                | StabilizationMode::Attitude
                | StabilizationMode::SystemIdent
        )
    }

    pub fn is_system_ident(&self) -> bool {
        matches!(
            self,
            StabilizationMode::SystemIdent | StabilizationMode::SystemIdentRate
        )
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ReprojectionMode {
    #[default]
    None,
    CameraAngle,
    HeadFree,
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct AxisFlags: u8 {
        const ROLL = 0b001;
        const PITCH = 0b010;
        const YAW = 0b100;
    }
}

impl AxisFlags {
    pub fn from_axis(axis: usize) -> Self {
        match axis {
            0 => AxisFlags::ROLL,
            1 => AxisFlags::PITCH,
            2 => AxisFlags::YAW,
            _ => AxisFlags::empty(),
        }
    }
}

/// Setpoint published by the input pipeline. Modes are carried as raw bytes since the
/// producer is outside this crate; invalid values surface as a stabilization error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilizationDesired {
    pub mode: [u8; MAX_AXES],
    /// Normalized stick per axis, in [-1,1].
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub thrust: f32,
    pub reprojection: ReprojectionMode,
    /// Turtle mode: reverse the motors to flip a crashed craft back over.
    pub flip_over_thrust_mode: bool,
}

impl Default for StabilizationDesired {
    fn default() -> Self {
        Self {
            mode: [StabilizationMode::Disabled as u8; MAX_AXES],
            roll: 0.0,
            pitch: 0.0,
            yaw: 0.0,
            thrust: 0.0,
            reprojection: ReprojectionMode::None,
            flip_over_thrust_mode: false,
        }
    }
}

impl StabilizationDesired {
    pub fn with_modes(modes: [StabilizationMode; MAX_AXES]) -> Self {
        Self {
            mode: modes.map(|mode| mode as u8),
            ..Default::default()
        }
    }

    pub fn axes(&self) -> [f32; MAX_AXES] {
        [self.roll, self.pitch, self.yaw]
    }
}

/// Estimated attitude: quaternion plus the equivalent roll/pitch/yaw in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttitudeActual {
    pub q: [f32; 4],
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

impl Default for AttitudeActual {
    fn default() -> Self {
        Self {
            q: [1.0, 0.0, 0.0, 0.0],
            roll: 0.0,
            pitch: 0.0,
            yaw: 0.0,
        }
    }
}

impl AttitudeActual {
    pub fn rpy(&self) -> [f32; MAX_AXES] {
        [self.roll, self.pitch, self.yaw]
    }
}

/// One gyro delivery: body rates in deg/s and accelerations in m/s^2.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct InertialSample {
    pub gyro: [f32; MAX_AXES],
    pub accel: [f32; MAX_AXES],
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum AirframeType {
    #[default]
    QuadX,
    QuadP,
    Hexa,
    Tri,
    Bi,
    HeliCp,
    FixedWing,
    FixedWingElevon,
    FixedWingVtail,
}

impl AirframeType {
    pub fn is_fixed_wing(&self) -> bool {
        matches!(
            self,
            AirframeType::FixedWing | AirframeType::FixedWingElevon | AirframeType::FixedWingVtail
        )
    }
}
