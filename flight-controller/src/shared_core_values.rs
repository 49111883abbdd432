use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU8, Ordering};

use shared_definitions::{
    actuator::{
        ActuatorCommand, ActuatorDesired, CameraDesired, DshotCommand, FlightMode, FlightStatus,
        ManualControlCommand, ACCESSORY_CHANNELS,
    },
    alarms::{AlarmLevel, SystemAlarm},
    stabilization::{AttitudeActual, ReprojectionMode, StabilizationDesired},
    MAX_AXES, MAX_MIX_ACTUATORS,
};

use crate::util::math::vectors::RotationVector3D;

pub struct AtomicF32(AtomicU32);
impl AtomicF32 {
    pub const fn new(val: f32) -> Self {
        Self(AtomicU32::new(val.to_bits()))
    }
    pub fn load(&self, order: Ordering) -> f32 {
        f32::from_bits(self.0.load(order))
    }
    pub fn store(&self, val: f32, order: Ordering) {
        self.0.store(val.to_bits(), order)
    }
}

const ZERO_F32: AtomicF32 = AtomicF32::new(0.0);
const NOT_AVAILABLE_F32: AtomicF32 = AtomicF32::new(f32::NAN);
const ZERO_U8: AtomicU8 = AtomicU8::new(0);

/// Receiver of alarm levels.
pub trait AlarmSink {
    fn set(&self, alarm: SystemAlarm, level: AlarmLevel);
}

pub struct AtomicAlarms {
    levels: [AtomicU8; SystemAlarm::COUNT],
}

impl AtomicAlarms {
    pub const fn new() -> Self {
        Self {
            levels: [ZERO_U8; SystemAlarm::COUNT],
        }
    }

    pub fn get(&self, alarm: SystemAlarm) -> AlarmLevel {
        AlarmLevel::try_from(self.levels[alarm as usize].load(Ordering::Relaxed))
            .unwrap_or(AlarmLevel::Critical)
    }

    pub fn clear(&self, alarm: SystemAlarm) {
        self.set(alarm, AlarmLevel::Ok);
    }
}

impl AlarmSink for AtomicAlarms {
    fn set(&self, alarm: SystemAlarm, level: AlarmLevel) {
        let previous = self.levels[alarm as usize].swap(level as u8, Ordering::Relaxed);
        if previous != level as u8 {
            match level {
                AlarmLevel::Ok => log::info!("{:?} alarm cleared", alarm),
                _ => log::warn!("{:?} alarm raised to {:?}", alarm, level),
            }
        }
    }
}

pub struct AtomicStabilizationDesired {
    mode: [AtomicU8; MAX_AXES],
    roll: AtomicF32,
    pitch: AtomicF32,
    yaw: AtomicF32,
    thrust: AtomicF32,
    reprojection: AtomicU8,
    flip_over_thrust_mode: AtomicBool,
}

impl AtomicStabilizationDesired {
    pub const fn new() -> Self {
        Self {
            mode: [ZERO_U8; MAX_AXES],
            roll: ZERO_F32,
            pitch: ZERO_F32,
            yaw: ZERO_F32,
            thrust: ZERO_F32,
            reprojection: AtomicU8::new(0),
            flip_over_thrust_mode: AtomicBool::new(false),
        }
    }

    pub fn store(&self, desired: &StabilizationDesired) {
        for (slot, mode) in self.mode.iter().zip(desired.mode) {
            slot.store(mode, Ordering::Relaxed);
        }
        self.roll.store(desired.roll, Ordering::Relaxed);
        self.pitch.store(desired.pitch, Ordering::Relaxed);
        self.yaw.store(desired.yaw, Ordering::Relaxed);
        self.thrust.store(desired.thrust, Ordering::Relaxed);
        self.reprojection
            .store(desired.reprojection as u8, Ordering::Relaxed);
        self.flip_over_thrust_mode
            .store(desired.flip_over_thrust_mode, Ordering::Relaxed);
    }

    pub fn read(&self) -> StabilizationDesired {
        StabilizationDesired {
            mode: [
                self.mode[0].load(Ordering::Relaxed),
                self.mode[1].load(Ordering::Relaxed),
                self.mode[2].load(Ordering::Relaxed),
            ],
            roll: self.roll.load(Ordering::Relaxed),
            pitch: self.pitch.load(Ordering::Relaxed),
            yaw: self.yaw.load(Ordering::Relaxed),
            thrust: self.thrust.load(Ordering::Relaxed),
            reprojection: match self.reprojection.load(Ordering::Relaxed) {
                1 => ReprojectionMode::CameraAngle,
                2 => ReprojectionMode::HeadFree,
                _ => ReprojectionMode::None,
            },
            flip_over_thrust_mode: self.flip_over_thrust_mode.load(Ordering::Relaxed),
        }
    }
}

pub struct AtomicAttitudeActual {
    q: [AtomicF32; 4],
    rpy: [AtomicF32; MAX_AXES],
}

impl AtomicAttitudeActual {
    pub const fn new() -> Self {
        Self {
            q: [AtomicF32::new(1.0), ZERO_F32, ZERO_F32, ZERO_F32],
            rpy: [ZERO_F32; MAX_AXES],
        }
    }

    pub fn store(&self, attitude: &AttitudeActual) {
        for (slot, value) in self.q.iter().zip(attitude.q) {
            slot.store(value, Ordering::Relaxed);
        }
        for (slot, value) in self.rpy.iter().zip(attitude.rpy()) {
            slot.store(value, Ordering::Relaxed);
        }
    }

    pub fn read(&self) -> AttitudeActual {
        AttitudeActual {
            q: [
                self.q[0].load(Ordering::Relaxed),
                self.q[1].load(Ordering::Relaxed),
                self.q[2].load(Ordering::Relaxed),
                self.q[3].load(Ordering::Relaxed),
            ],
            roll: self.rpy[0].load(Ordering::Relaxed),
            pitch: self.rpy[1].load(Ordering::Relaxed),
            yaw: self.rpy[2].load(Ordering::Relaxed),
        }
    }
}

pub struct AtomicFlightStatus {
    pub armed: AtomicBool,
    flight_mode: AtomicU8,
}

impl AtomicFlightStatus {
    pub const fn new() -> Self {
        Self {
            armed: AtomicBool::new(false),
            flight_mode: AtomicU8::new(FlightMode::Manual as u8),
        }
    }

    pub fn store(&self, status: &FlightStatus) {
        self.flight_mode
            .store(status.flight_mode as u8, Ordering::Relaxed);
        self.armed.store(status.armed, Ordering::Release);
    }

    pub fn read(&self) -> FlightStatus {
        let flight_mode = match self.flight_mode.load(Ordering::Relaxed) {
            1 => FlightMode::Stabilized,
            2 => FlightMode::Acro,
            3 => FlightMode::Horizon,
            4 => FlightMode::Autotune,
            5 => FlightMode::Failsafe,
            _ => FlightMode::Manual,
        };
        FlightStatus {
            armed: self.armed.load(Ordering::Acquire),
            flight_mode,
        }
    }
}

/// Accessory inputs that are not available are stored as NaN.
pub struct AtomicManualControl {
    throttle: AtomicF32,
    collective: AtomicF32,
    accessory: [AtomicF32; ACCESSORY_CHANNELS],
}

impl AtomicManualControl {
    pub const fn new() -> Self {
        Self {
            throttle: AtomicF32::new(-1.0),
            collective: ZERO_F32,
            accessory: [NOT_AVAILABLE_F32; ACCESSORY_CHANNELS],
        }
    }

    pub fn store(&self, command: &ManualControlCommand) {
        self.throttle.store(command.throttle, Ordering::Relaxed);
        self.collective.store(command.collective, Ordering::Relaxed);
        for (slot, value) in self.accessory.iter().zip(command.accessory) {
            slot.store(value.unwrap_or(f32::NAN), Ordering::Relaxed);
        }
    }

    pub fn read(&self) -> ManualControlCommand {
        let mut accessory = [None; ACCESSORY_CHANNELS];
        for (value, slot) in accessory.iter_mut().zip(self.accessory.iter()) {
            let raw = slot.load(Ordering::Relaxed);
            *value = raw.is_finite().then_some(raw);
        }
        ManualControlCommand {
            throttle: self.throttle.load(Ordering::Relaxed),
            collective: self.collective.load(Ordering::Relaxed),
            accessory,
        }
    }
}

pub struct AtomicCameraDesired {
    available: AtomicBool,
    gimbal: [AtomicF32; MAX_AXES],
    declination: AtomicF32,
    bearing: AtomicF32,
}

impl AtomicCameraDesired {
    pub const fn new() -> Self {
        Self {
            available: AtomicBool::new(false),
            gimbal: [ZERO_F32; MAX_AXES],
            declination: ZERO_F32,
            bearing: ZERO_F32,
        }
    }

    pub fn store(&self, camera: Option<CameraDesired>) {
        if let Some(camera) = camera {
            for (slot, value) in self.gimbal.iter().zip(camera.gimbal()) {
                slot.store(value, Ordering::Relaxed);
            }
            self.declination.store(camera.declination, Ordering::Relaxed);
            self.bearing.store(camera.bearing, Ordering::Relaxed);
        }
        self.available.store(camera.is_some(), Ordering::Release);
    }

    pub fn read(&self) -> Option<CameraDesired> {
        if !self.available.load(Ordering::Acquire) {
            return None;
        }
        Some(CameraDesired {
            roll: self.gimbal[0].load(Ordering::Relaxed),
            pitch: self.gimbal[1].load(Ordering::Relaxed),
            yaw: self.gimbal[2].load(Ordering::Relaxed),
            declination: self.declination.load(Ordering::Relaxed),
            bearing: self.bearing.load(Ordering::Relaxed),
        })
    }
}

/// Last published stabilization output. The system ident cycle uses `u32::MAX` for none.
pub struct AtomicActuatorDesired {
    roll: AtomicF32,
    pitch: AtomicF32,
    yaw: AtomicF32,
    thrust: AtomicF32,
    update_time: AtomicF32,
    system_ident_cycle: AtomicU32,
    flip_over_thrust_mode: AtomicBool,
}

impl AtomicActuatorDesired {
    pub const fn new() -> Self {
        Self {
            roll: ZERO_F32,
            pitch: ZERO_F32,
            yaw: ZERO_F32,
            thrust: ZERO_F32,
            update_time: ZERO_F32,
            system_ident_cycle: AtomicU32::new(u32::MAX),
            flip_over_thrust_mode: AtomicBool::new(false),
        }
    }

    pub fn store(&self, desired: &ActuatorDesired) {
        self.roll.store(desired.roll, Ordering::Relaxed);
        self.pitch.store(desired.pitch, Ordering::Relaxed);
        self.yaw.store(desired.yaw, Ordering::Relaxed);
        self.thrust.store(desired.thrust, Ordering::Relaxed);
        self.update_time.store(desired.update_time, Ordering::Relaxed);
        self.system_ident_cycle.store(
            desired.system_ident_cycle.map_or(u32::MAX, u32::from),
            Ordering::Relaxed,
        );
        self.flip_over_thrust_mode
            .store(desired.flip_over_thrust_mode, Ordering::Release);
    }

    pub fn read(&self) -> ActuatorDesired {
        let flip_over_thrust_mode = self.flip_over_thrust_mode.load(Ordering::Acquire);
        ActuatorDesired {
            roll: self.roll.load(Ordering::Relaxed),
            pitch: self.pitch.load(Ordering::Relaxed),
            yaw: self.yaw.load(Ordering::Relaxed),
            thrust: self.thrust.load(Ordering::Relaxed),
            update_time: self.update_time.load(Ordering::Relaxed),
            system_ident_cycle: u16::try_from(self.system_ident_cycle.load(Ordering::Relaxed))
                .ok(),
            flip_over_thrust_mode,
        }
    }
}

pub struct AtomicActuatorCommand {
    channel: [AtomicF32; MAX_MIX_ACTUATORS],
    update_time: AtomicF32,
    max_update_time: AtomicF32,
    low_power_stabilization_reserve: AtomicF32,
}

impl AtomicActuatorCommand {
    pub const fn new() -> Self {
        Self {
            channel: [ZERO_F32; MAX_MIX_ACTUATORS],
            update_time: ZERO_F32,
            max_update_time: ZERO_F32,
            low_power_stabilization_reserve: ZERO_F32,
        }
    }

    pub fn store(&self, command: &ActuatorCommand) {
        for (slot, value) in self.channel.iter().zip(command.channel) {
            slot.store(value, Ordering::Relaxed);
        }
        self.update_time.store(command.update_time, Ordering::Relaxed);
        self.max_update_time
            .store(command.max_update_time, Ordering::Relaxed);
        self.low_power_stabilization_reserve
            .store(command.low_power_stabilization_reserve, Ordering::Relaxed);
    }

    pub fn read(&self) -> ActuatorCommand {
        let mut channel = [0.0; MAX_MIX_ACTUATORS];
        for (value, slot) in channel.iter_mut().zip(self.channel.iter()) {
            *value = slot.load(Ordering::Relaxed);
        }
        ActuatorCommand {
            channel,
            update_time: self.update_time.load(Ordering::Relaxed),
            max_update_time: self.max_update_time.load(Ordering::Relaxed),
            low_power_stabilization_reserve: self
                .low_power_stabilization_reserve
                .load(Ordering::Relaxed),
        }
    }
}

/// Single pending DShot command slot, written by anyone and consumed by the actuator task.
pub struct AtomicDshotCommand(AtomicU32);

impl AtomicDshotCommand {
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Queues `command` unless another one is still pending.
    pub fn offer(&self, command: DshotCommand) -> bool {
        self.0
            .compare_exchange(0, command.into(), Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    pub fn take(&self) -> Option<DshotCommand> {
        match self.0.swap(0, Ordering::AcqRel) {
            0 => None,
            value => Some(DshotCommand::from(value)),
        }
    }
}

pub struct AtomicRotationVector3D {
    roll: AtomicI32,
    pitch: AtomicI32,
    yaw: AtomicI32,
}

impl AtomicRotationVector3D {
    pub const fn new() -> Self {
        Self {
            roll: AtomicI32::new(0),
            pitch: AtomicI32::new(0),
            yaw: AtomicI32::new(0),
        }
    }
    pub fn store(&self, vector: RotationVector3D) {
        self.roll
            .store((vector.roll * 100.0) as i32, Ordering::Relaxed);
        self.pitch
            .store((vector.pitch * 100.0) as i32, Ordering::Relaxed);
        self.yaw
            .store((vector.yaw * 100.0) as i32, Ordering::Relaxed);
    }
    pub fn read(&self) -> RotationVector3D {
        RotationVector3D {
            roll: self.roll.load(Ordering::Relaxed) as f32 / 100.0,
            pitch: self.pitch.load(Ordering::Relaxed) as f32 / 100.0,
            yaw: self.yaw.load(Ordering::Relaxed) as f32 / 100.0,
        }
    }
}

pub struct AtomicTelemetry {
    pub loop_exec_time_us: AtomicI32,
    pub rotation_rate: AtomicRotationVector3D,
    pub rate_desired: AtomicRotationVector3D,
    pub throttle: AtomicF32,
    pub autotune_state: AtomicU8,
    pub autotune_predicts: AtomicU32,
    pub autotune_spills: AtomicU32,
}

impl AtomicTelemetry {
    pub const fn new() -> Self {
        AtomicTelemetry {
            loop_exec_time_us: AtomicI32::new(0),
            rotation_rate: AtomicRotationVector3D::new(),
            rate_desired: AtomicRotationVector3D::new(),
            throttle: ZERO_F32,
            autotune_state: AtomicU8::new(0),
            autotune_predicts: AtomicU32::new(0),
            autotune_spills: AtomicU32::new(0),
        }
    }
}

pub static SHARED_STABILIZATION_DESIRED: AtomicStabilizationDesired =
    AtomicStabilizationDesired::new();
pub static SHARED_ATTITUDE: AtomicAttitudeActual = AtomicAttitudeActual::new();
pub static SHARED_FLIGHT_STATUS: AtomicFlightStatus = AtomicFlightStatus::new();
pub static SHARED_MANUAL_CONTROL: AtomicManualControl = AtomicManualControl::new();
pub static SHARED_CAMERA_DESIRED: AtomicCameraDesired = AtomicCameraDesired::new();
pub static SHARED_ACTUATOR_DESIRED: AtomicActuatorDesired = AtomicActuatorDesired::new();
pub static SHARED_ACTUATOR_COMMAND: AtomicActuatorCommand = AtomicActuatorCommand::new();
pub static SHARED_DSHOT_COMMAND: AtomicDshotCommand = AtomicDshotCommand::new();
pub static SHARED_ALARMS: AtomicAlarms = AtomicAlarms::new();
pub static SHARED_TELEMETRY: AtomicTelemetry = AtomicTelemetry::new();
