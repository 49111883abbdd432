//! Matrix mixer turning the desired roll/pitch/yaw/thrust into channel outputs.
//!
//! Each channel owns a row of five weights applied to
//! `[curve1(thrust), curve2(source), roll, pitch, yaw]`. Motor rows are then rescaled as a
//! group so that differential commands survive saturation, and gated by the arming state.

use shared_definitions::{
    actuator::{
        ActuatorCommand, ActuatorDesired, CameraDesired, FlightMode, FlightStatus,
        ManualControlCommand,
    },
    alarms::{AlarmLevel, SystemAlarm},
    settings::{
        ActuatorSettings, Curve2Source, MixerSettings, MixerType, MIXER_VECTOR_LEN,
        MIXER_VECTOR_PITCH, MIXER_VECTOR_ROLL, MIXER_VECTOR_THROTTLE_CURVE1,
        MIXER_VECTOR_THROTTLE_CURVE2, MIXER_VECTOR_YAW,
    },
    stabilization::AirframeType,
    MAX_MIX_ACTUATORS,
};

use super::{
    channel_scaling::{scale_channel, scale_pwm},
    dshot::DshotSequencer,
    motors_state_manager::{set_channels, ChannelOutput},
};
use crate::{
    config::constants::{
        ACTUATOR_EPSILON, DSHOT_3D_ARM_COUNT, DSHOT_CMD_3D_MODE_ON, FLIP_OVER_STICK_DEADBAND,
        MIN_MIXER_CHANNELS, MIXER_SCALE,
    },
    shared_core_values::{AlarmSink, AtomicDshotCommand},
    util::math::misc::{linear_interpolate, powapprox},
};

/// Settings the mixer caches between settings changes.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct MixerConfig {
    pub mixer: MixerSettings,
    pub actuator: ActuatorSettings,
    pub airframe_type: AirframeType,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct MixerInputs {
    pub desired: ActuatorDesired,
    pub flight_status: FlightStatus,
    pub manual: ManualControlCommand,
    pub camera: Option<CameraDesired>,
}

/// Arming and throttle state of one tick, derived from the inputs.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TickState {
    armed: bool,
    stabilize_now: bool,
    flip_over: bool,
}

/// Result of the motor group rescaling.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ClipAdjustment {
    gain: f32,
    offset: f32,
    clipped: bool,
}

pub struct Mixer {
    config: MixerConfig,
    matrix: [[f32; MIXER_VECTOR_LEN]; MAX_MIX_ACTUATORS],
    desired_3d_mask: u16,
    max_power_add_bucket: f32,
    max_update_time: f32,
    previous_armed: bool,
    dshot: DshotSequencer,
    dshot_pending: &'static AtomicDshotCommand,
}

fn apply_deadband(value: f32, deadband: f32) -> f32 {
    if value.abs() < deadband {
        0.0
    } else if value > 0.0 {
        (value - deadband) / (1.0 - deadband)
    } else {
        (value + deadband) / (1.0 - deadband)
    }
}

impl Mixer {
    pub fn new(config: MixerConfig, dshot_pending: &'static AtomicDshotCommand) -> Self {
        let mut mixer = Self {
            config,
            matrix: [[0.0; MIXER_VECTOR_LEN]; MAX_MIX_ACTUATORS],
            desired_3d_mask: 0,
            max_power_add_bucket: 0.0,
            max_update_time: 0.0,
            previous_armed: false,
            dshot: DshotSequencer::new(),
            dshot_pending,
        };
        mixer.update_settings(config);
        mixer
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    pub fn low_power_stabilization_reserve(&self) -> f32 {
        self.max_power_add_bucket
    }

    /// Rebuilds the mixing matrix. Motor roll/pitch/yaw weights are boosted when the output
    /// gain limits the motors, so control authority does not depend on that limit.
    pub fn update_settings(&mut self, config: MixerConfig) {
        self.config = config;

        let gain = config.actuator.motor_input_output_gain;
        let curve_fit = config.actuator.motor_input_output_curve_fit;
        let scale_adjustment = if (0.01..1.0).contains(&gain) {
            libm::powf(1.0 / gain, 1.0 / curve_fit)
        } else {
            1.0
        };

        for (row, channel) in self.matrix.iter_mut().zip(config.mixer.channels.iter()) {
            *row = [0.0; MIXER_VECTOR_LEN];
            if !matches!(channel.mixer_type, MixerType::Motor | MixerType::Servo) {
                continue;
            }
            for (weight, raw) in row.iter_mut().zip(channel.vector.iter()) {
                *weight = *raw as f32 / MIXER_SCALE;
            }
            if channel.mixer_type == MixerType::Motor {
                row[MIXER_VECTOR_ROLL] *= scale_adjustment;
                row[MIXER_VECTOR_PITCH] *= scale_adjustment;
                row[MIXER_VECTOR_YAW] *= scale_adjustment;
            }
        }

        self.desired_3d_mask = config
            .actuator
            .channels
            .iter()
            .enumerate()
            .filter(|(_, channel)| channel.deadband != 0)
            .fold(0, |mask, (index, _)| mask | (1 << index));

        log::info!(
            "Mixer loaded: {} mixing channels, 3D mask {:#06x}",
            config.mixer.mixer_channel_count(),
            self.desired_3d_mask
        );
    }

    /// One actuator tick. Writes the outputs to `output` and reports the actuator alarm.
    pub fn update(
        &mut self,
        inputs: &MixerInputs,
        dt: f32,
        output: &mut dyn ChannelOutput,
        alarms: &dyn AlarmSink,
    ) -> ActuatorCommand {
        if self.config.mixer.mixer_channel_count() < MIN_MIXER_CHANNELS {
            return self.failsafe(output, alarms);
        }

        let (vector, state) = self.normalize_inputs(inputs);
        let armed = state.armed;

        // Knock 3D channels into 3D mode when arming. They are never taken out of it.
        if armed != self.previous_armed {
            if armed && self.desired_3d_mask != 0 {
                if self
                    .dshot
                    .send_now(DSHOT_CMD_3D_MODE_ON, DSHOT_3D_ARM_COUNT, self.desired_3d_mask)
                {
                    self.previous_armed = armed;
                }
            } else {
                self.previous_armed = armed;
            }
        }

        let mixed = self.mix_channels(&vector, inputs);
        let (channels, clipped) = self.post_process(mixed, &vector, dt, &state);

        let update_time = 1000.0 * dt;
        if update_time > self.max_update_time {
            self.max_update_time = update_time;
        }
        let command = ActuatorCommand {
            channel: channels,
            update_time,
            max_update_time: self.max_update_time,
            low_power_stabilization_reserve: self.max_power_add_bucket,
        };

        let level = match set_channels(output, &command.channel) {
            Err(error) => {
                log::error!("Actuator output failed: {}", error);
                AlarmLevel::Critical
            }
            Ok(()) if clipped && state.stabilize_now => AlarmLevel::Warning,
            Ok(()) => AlarmLevel::Ok,
        };
        alarms.set(SystemAlarm::Actuator, level);

        command
    }

    /// Safe output for every channel: motors off, servos centred.
    pub fn failsafe(&mut self, output: &mut dyn ChannelOutput, alarms: &dyn AlarmSink) -> ActuatorCommand {
        alarms.set(SystemAlarm::Actuator, AlarmLevel::Critical);

        let mut channels = [0.0; MAX_MIX_ACTUATORS];
        for (index, value) in channels.iter_mut().enumerate() {
            *value = self.channel_failsafe_value(index);
        }
        if let Err(error) = set_channels(output, &channels) {
            log::error!("Actuator failsafe output failed: {}", error);
        }

        ActuatorCommand {
            channel: channels,
            update_time: 0.0,
            max_update_time: self.max_update_time,
            low_power_stabilization_reserve: self.max_power_add_bucket,
        }
    }

    fn channel_failsafe_value(&self, index: usize) -> f32 {
        let channel = &self.config.actuator.channels[index];
        match self.config.mixer.channels[index].mixer_type {
            MixerType::Motor => scale_channel(None, index, channel, None),
            MixerType::Servo => channel.neutral,
            MixerType::Disabled => channel.min,
            _ => scale_pwm(Some(0.0), channel),
        }
    }

    fn curve2_source(&self, inputs: &MixerInputs, desired: &ActuatorDesired, throttle: f32) -> f32 {
        match self.config.mixer.curve2_source {
            Curve2Source::Throttle => throttle,
            Curve2Source::Roll => desired.roll,
            Curve2Source::Pitch => desired.pitch,
            Curve2Source::Yaw => desired.yaw,
            Curve2Source::Collective if self.config.airframe_type == AirframeType::HeliCp => {
                desired.thrust
            }
            Curve2Source::Collective => inputs.manual.collective,
            Curve2Source::Accessory(index) => inputs
                .manual
                .accessory
                .get(index)
                .copied()
                .flatten()
                .unwrap_or(0.0),
        }
    }

    /// Builds the input vector of the matrix and decides whether motors should stabilize.
    fn normalize_inputs(&self, inputs: &MixerInputs) -> ([f32; MIXER_VECTOR_LEN], TickState) {
        let mut desired = inputs.desired;
        let armed = inputs.flight_status.armed;
        let flip_over = desired.flip_over_thrust_mode;

        let mut throttle = if self.config.airframe_type == AirframeType::HeliCp {
            // Collective pitch helis take throttle from the stick, except in failsafe.
            if inputs.flight_status.flight_mode != FlightMode::Failsafe {
                inputs.manual.throttle
            } else {
                0.0
            }
        } else {
            desired.thrust
        };
        if !armed {
            throttle = 0.0;
        }
        let mut stabilize_now = throttle != 0.0;

        if flip_over {
            desired.roll = apply_deadband(desired.roll, FLIP_OVER_STICK_DEADBAND);
            desired.pitch = apply_deadband(desired.pitch, FLIP_OVER_STICK_DEADBAND);
            desired.yaw = apply_deadband(desired.yaw, FLIP_OVER_STICK_DEADBAND);
            if desired.roll == 0.0 && desired.pitch == 0.0 && desired.yaw == 0.0 {
                stabilize_now = false;
                throttle = 0.0;
            }
        }

        // The throttle curve spans [0,1]; reversed thrust uses it mirrored.
        let curve1 = if throttle < 0.0 {
            -linear_interpolate(-throttle, &self.config.mixer.throttle_curve1, 0.0, 1.0)
        } else {
            linear_interpolate(throttle, &self.config.mixer.throttle_curve1, 0.0, 1.0)
        };
        let curve2 = linear_interpolate(
            self.curve2_source(inputs, &desired, throttle),
            &self.config.mixer.throttle_curve2,
            -1.0,
            1.0,
        );

        let mut vector = [0.0; MIXER_VECTOR_LEN];
        vector[MIXER_VECTOR_THROTTLE_CURVE1] = curve1;
        vector[MIXER_VECTOR_THROTTLE_CURVE2] = curve2;
        vector[MIXER_VECTOR_ROLL] = desired.roll;
        vector[MIXER_VECTOR_PITCH] = desired.pitch;
        vector[MIXER_VECTOR_YAW] = desired.yaw;

        (
            vector,
            TickState {
                armed,
                stabilize_now,
                flip_over,
            },
        )
    }

    /// Raw per channel values. `None` marks a channel with nothing to output.
    fn mix_channels(
        &self,
        vector: &[f32; MIXER_VECTOR_LEN],
        inputs: &MixerInputs,
    ) -> [Option<f32>; MAX_MIX_ACTUATORS] {
        let mut values = [None; MAX_MIX_ACTUATORS];
        for (index, value) in values.iter_mut().enumerate() {
            *value = match self.config.mixer.channels[index].mixer_type {
                MixerType::Disabled => None,
                MixerType::Motor | MixerType::Servo => Some(
                    self.matrix[index]
                        .iter()
                        .zip(vector.iter())
                        .map(|(weight, input)| weight * input)
                        .sum(),
                ),
                MixerType::Accessory(accessory) => {
                    inputs.manual.accessory.get(accessory).copied().flatten()
                }
                MixerType::CameraRoll => inputs.camera.map(|camera| camera.gimbal()[0]),
                MixerType::CameraPitch => inputs.camera.map(|camera| camera.gimbal()[1]),
                MixerType::CameraYaw => inputs.camera.map(|camera| camera.gimbal()[2]),
            };
        }
        values
    }

    /// Leaky bucket limiting how much power low side clip management may add on average.
    /// Returns the power that may be added this tick.
    fn refill_power_bucket(&mut self, throttle: f32, dt: f32) -> f32 {
        let settings = &self.config.actuator;
        let time_constant = settings.low_power_stabilization_time_constant;
        let soft_limit = (2.0 * settings.low_power_stabilization_max_power_add)
            .max(throttle.abs())
            * time_constant;

        if self.max_power_add_bucket < soft_limit {
            self.max_power_add_bucket += settings.low_power_stabilization_max_power_add * dt;
        } else {
            let alpha = dt / (dt + time_constant);
            self.max_power_add_bucket =
                alpha * soft_limit + (1.0 - alpha) * self.max_power_add_bucket;
        }

        self.max_power_add_bucket / time_constant
    }

    /// Fits the motor group into [0,1]: compress the spread to at most 1, then shift it.
    fn clip_adjustment(
        &mut self,
        motors: &[f32; MAX_MIX_ACTUATORS],
        is_motor: &[bool; MAX_MIX_ACTUATORS],
        max_power_add: f32,
        dt: f32,
    ) -> ClipAdjustment {
        let mut min_chan = f32::INFINITY;
        let mut max_chan = f32::NEG_INFINITY;
        let mut neg_clip = 0.0;
        let mut num_motors = 0;

        for (value, _) in motors.iter().zip(is_motor.iter()).filter(|(_, motor)| **motor) {
            min_chan = min_chan.min(*value);
            max_chan = max_chan.max(*value);
            if *value < 0.0 {
                neg_clip += *value;
            }
            num_motors += 1;
        }

        if num_motors == 0 {
            return ClipAdjustment {
                gain: 1.0,
                offset: 0.0,
                clipped: false,
            };
        }

        let mut gain = 1.0;
        let mut offset = 0.0;

        if max_chan - min_chan > 1.0 {
            gain = 1.0 / (max_chan - min_chan);
            max_chan *= gain;
            min_chan *= gain;
        }

        if max_chan > 1.0 {
            offset = 1.0 - max_chan;
        } else if min_chan < 0.0 {
            // neg_clip is the throttle already given up to the low side.
            neg_clip /= num_motors as f32;
            offset = (-min_chan).min(neg_clip + max_power_add);
            self.max_power_add_bucket -= (offset - neg_clip) * dt;
        }

        ClipAdjustment {
            gain,
            offset,
            clipped: gain < 1.0 || max_chan > 1.0 || min_chan + offset < 0.0,
        }
    }

    fn post_process(
        &mut self,
        mixed: [Option<f32>; MAX_MIX_ACTUATORS],
        vector: &[f32; MIXER_VECTOR_LEN],
        dt: f32,
        state: &TickState,
    ) -> ([f32; MAX_MIX_ACTUATORS], bool) {
        let throttle = vector[MIXER_VECTOR_THROTTLE_CURVE1];
        let mut max_power_add = self.refill_power_bucket(throttle, dt);
        if state.flip_over {
            max_power_add = 0.0;
        }
        let neg_throttle = throttle < 0.0;

        let mut is_motor = [false; MAX_MIX_ACTUATORS];
        let mut motors = [0.0; MAX_MIX_ACTUATORS];
        for index in 0..MAX_MIX_ACTUATORS {
            if self.config.mixer.channels[index].mixer_type == MixerType::Motor {
                is_motor[index] = true;
                let value = mixed[index].unwrap_or(0.0);
                // Reversed thrust is mixed as if it was forward and flipped back below.
                motors[index] = if neg_throttle { -value } else { value };
            }
        }

        let adjustment = self.clip_adjustment(&motors, &is_motor, max_power_add, dt);
        let active_command = self.dshot.next_frame(state.armed, self.dshot_pending);

        let settings = self.config.actuator;
        let mut channels = [0.0; MAX_MIX_ACTUATORS];
        for index in 0..MAX_MIX_ACTUATORS {
            let value = if is_motor[index] {
                self.gate_motor(motors[index], &adjustment, state, neg_throttle, &settings)
            } else {
                mixed[index]
            };
            channels[index] =
                scale_channel(value, index, &settings.channels[index], active_command);
        }

        (channels, adjustment.clipped)
    }

    /// Applies the arming state to one motor. `None` stops it.
    fn gate_motor(
        &self,
        value: f32,
        adjustment: &ClipAdjustment,
        state: &TickState,
        neg_throttle: bool,
        settings: &ActuatorSettings,
    ) -> Option<f32> {
        let direction = if neg_throttle { -1.0 } else { 1.0 };

        if !state.armed {
            return None;
        }
        if !state.stabilize_now {
            if !settings.motors_spin_while_armed || state.flip_over {
                return None;
            }
            return Some(direction * ACTUATOR_EPSILON);
        }

        let value = value * adjustment.gain + adjustment.offset;
        if value > 0.0 {
            // Map the command through the propeller input/output curve.
            let powered = powapprox(value, settings.motor_input_output_curve_fit)
                * settings.motor_input_output_gain;
            Some(direction * powered)
        } else if state.flip_over {
            None
        } else {
            Some(direction * ACTUATOR_EPSILON)
        }
    }

    /// True while a DShot command burst is still going out.
    pub fn dshot_busy(&self) -> bool {
        self.dshot.is_busy()
    }
}
