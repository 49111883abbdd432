use bitfield_struct::bitfield;

use crate::MAX_MIX_ACTUATORS;

pub const ACCESSORY_CHANNELS: usize = 6;

/// Normalized output of the stabilization stage, input of the mixer.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ActuatorDesired {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub thrust: f32,
    /// Loop period of the tick that produced this value, in ms.
    pub update_time: f32,
    /// Position inside the excitation pattern while system identification is measuring.
    pub system_ident_cycle: Option<u16>,
    pub flip_over_thrust_mode: bool,
}

impl ActuatorDesired {
    pub fn axes(&self) -> [f32; 3] {
        [self.roll, self.pitch, self.yaw]
    }

    pub fn set_axes(&mut self, axes: [f32; 3]) {
        self.roll = axes[0];
        self.pitch = axes[1];
        self.yaw = axes[2];
    }
}

/// Final channel values as handed to the output driver.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ActuatorCommand {
    pub channel: [f32; MAX_MIX_ACTUATORS],
    /// ms
    pub update_time: f32,
    pub max_update_time: f32,
    pub low_power_stabilization_reserve: f32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum FlightMode {
    #[default]
    Manual,
    Stabilized,
    Acro,
    Horizon,
    Autotune,
    Failsafe,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlightStatus {
    pub armed: bool,
    pub flight_mode: FlightMode,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ManualControlCommand {
    pub throttle: f32,
    pub collective: f32,
    pub accessory: [Option<f32>; ACCESSORY_CHANNELS],
}

/// Gimbal commands and the point-of-interest direction.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct CameraDesired {
    /// Normalized gimbal outputs in [-1,1], fed to the camera mixer channels.
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    /// Degrees below the horizon of the point of interest.
    pub declination: f32,
    /// Degrees, heading of the point of interest.
    pub bearing: f32,
}

impl CameraDesired {
    pub fn gimbal(&self) -> [f32; 3] {
        [self.roll, self.pitch, self.yaw]
    }
}

/// Single pending DShot command, packed in one word so it can be swapped atomically.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct DshotCommand {
    pub cmd_id: u8,
    pub num_to_send: u8,
    pub channel_mask: u16,
}
