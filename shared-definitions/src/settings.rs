use crate::{stabilization::AirframeType, MAX_AXES, MAX_MIX_ACTUATORS};

pub const MIXER_VECTOR_LEN: usize = 5;
pub const MIXER_VECTOR_THROTTLE_CURVE1: usize = 0;
pub const MIXER_VECTOR_THROTTLE_CURVE2: usize = 1;
pub const MIXER_VECTOR_ROLL: usize = 2;
pub const MIXER_VECTOR_PITCH: usize = 3;
pub const MIXER_VECTOR_YAW: usize = 4;

pub const THROTTLE_CURVE_POINTS: usize = 5;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum MixerType {
    #[default]
    Disabled,
    Motor,
    Servo,
    /// Pass-through of one of the accessory inputs, index 0..=5.
    Accessory(usize),
    CameraRoll,
    CameraPitch,
    CameraYaw,
}

impl TryFrom<u8> for MixerType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MixerType::Disabled),
            1 => Ok(MixerType::Motor),
            2 => Ok(MixerType::Servo),
            3..=8 => Ok(MixerType::Accessory((value - 3) as usize)),
            9 => Ok(MixerType::CameraRoll),
            10 => Ok(MixerType::CameraPitch),
            11 => Ok(MixerType::CameraYaw),
            other => Err(other),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Curve2Source {
    #[default]
    Throttle,
    Roll,
    Pitch,
    Yaw,
    Collective,
    /// Accessory input index 0..=2.
    Accessory(usize),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MixerChannel {
    pub mixer_type: MixerType,
    /// Weights for ThrottleCurve1, ThrottleCurve2, Roll, Pitch, Yaw; 128 is unity.
    pub vector: [i16; MIXER_VECTOR_LEN],
}

impl MixerChannel {
    pub fn motor(vector: [i16; MIXER_VECTOR_LEN]) -> Self {
        Self {
            mixer_type: MixerType::Motor,
            vector,
        }
    }

    pub fn servo(vector: [i16; MIXER_VECTOR_LEN]) -> Self {
        Self {
            mixer_type: MixerType::Servo,
            vector,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixerSettings {
    pub channels: [MixerChannel; MAX_MIX_ACTUATORS],
    pub throttle_curve1: [f32; THROTTLE_CURVE_POINTS],
    pub throttle_curve2: [f32; THROTTLE_CURVE_POINTS],
    pub curve2_source: Curve2Source,
}

impl Default for MixerSettings {
    fn default() -> Self {
        Self {
            channels: [MixerChannel::default(); MAX_MIX_ACTUATORS],
            throttle_curve1: [0.0, 0.25, 0.5, 0.75, 1.0],
            throttle_curve2: [0.0, 0.25, 0.5, 0.75, 1.0],
            curve2_source: Curve2Source::Throttle,
        }
    }
}

impl MixerSettings {
    /// Standard quad X: front left CW, front right CCW, rear right CW, rear left CCW.
    pub fn quad_x() -> Self {
        let mut settings = Self::default();
        settings.channels[0] = MixerChannel::motor([128, 0, 64, 64, -64]);
        settings.channels[1] = MixerChannel::motor([128, 0, -64, 64, 64]);
        settings.channels[2] = MixerChannel::motor([128, 0, -64, -64, -64]);
        settings.channels[3] = MixerChannel::motor([128, 0, 64, -64, 64]);
        settings
    }

    pub fn mixer_channel_count(&self) -> usize {
        self.channels
            .iter()
            .filter(|channel| {
                matches!(channel.mixer_type, MixerType::Motor | MixerType::Servo)
            })
            .count()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    #[default]
    Pwm,
    OneShot,
    DShot,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorChannel {
    pub min: f32,
    pub max: f32,
    pub neutral: f32,
    /// PWM deadband in us; for DShot channels 0 = normal, 1 = 3D, 2 = reversed 3D.
    pub deadband: u16,
    pub channel_type: ChannelType,
}

impl Default for ActuatorChannel {
    fn default() -> Self {
        Self {
            min: 1000.0,
            max: 2000.0,
            neutral: 1000.0,
            deadband: 0,
            channel_type: ChannelType::Pwm,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorSettings {
    pub channels: [ActuatorChannel; MAX_MIX_ACTUATORS],
    pub motors_spin_while_armed: bool,
    pub motor_input_output_curve_fit: f32,
    pub motor_input_output_gain: f32,
    pub low_power_stabilization_max_power_add: f32,
    /// Seconds.
    pub low_power_stabilization_time_constant: f32,
}

impl Default for ActuatorSettings {
    fn default() -> Self {
        Self {
            channels: [ActuatorChannel::default(); MAX_MIX_ACTUATORS],
            motors_spin_while_armed: false,
            motor_input_output_curve_fit: 1.0,
            motor_input_output_gain: 1.0,
            low_power_stabilization_max_power_add: 0.07,
            low_power_stabilization_time_constant: 0.3,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub i_limit: f32,
}

impl PidGains {
    pub const fn new(kp: f32, ki: f32, kd: f32, i_limit: f32) -> Self {
        Self {
            kp,
            ki,
            kd,
            i_limit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilizationSettings {
    pub rate_pid: [PidGains; MAX_AXES],
    /// Outer loop; the derivative gain is ignored.
    pub attitude_pi: [PidGains; MAX_AXES],
    pub coordinated_flight_yaw_pi: PidGains,
    /// deg/s at full stick.
    pub manual_rate: [f32; MAX_AXES],
    pub maximum_rate: [f32; MAX_AXES],
    pub poi_maximum_rate: [f32; MAX_AXES],
    /// Degrees.
    pub roll_max: f32,
    pub pitch_max: f32,
    pub yaw_max: f32,
    pub rate_expo: [u8; MAX_AXES],
    /// Tenths.
    pub rate_exponent: [u8; MAX_AXES],
    pub acro_dynamic_rate: [f32; MAX_AXES],
    /// Percent of stick.
    pub acro_dynamic_transition: [u8; MAX_AXES],
    /// Seconds.
    pub acro_dynamic_tau: f32,
    pub acro_insanity_factor: f32,
    pub acro_zero_integral_gyro: f32,
    pub acro_zero_integral_stick: f32,
    pub max_axis_lock: f32,
    pub max_axis_lock_rate: f32,
    pub weak_leveling_kp: f32,
    pub max_weak_leveling_rate: f32,
    pub low_throttle_zero_integral: bool,
    /// Seconds; zero disables the hold-open.
    pub low_power_stabilization_max_time: f32,
    /// Degrees.
    pub camera_tilt: f32,
    /// Hz; zero disables the derivative filter.
    pub derivative_cutoff: f32,
    pub derivative_gamma: f32,
    pub deadband_width: [u8; MAX_AXES],
    pub deadband_slope: [u8; MAX_AXES],
    pub autotune_actuation_effort: [f32; MAX_AXES],
}

impl Default for StabilizationSettings {
    fn default() -> Self {
        Self {
            rate_pid: [
                PidGains::new(0.0024, 0.004, 0.00004, 0.3),
                PidGains::new(0.0024, 0.004, 0.00004, 0.3),
                PidGains::new(0.0048, 0.008, 0.0, 0.3),
            ],
            attitude_pi: [
                PidGains::new(2.5, 0.0, 0.0, 50.0),
                PidGains::new(2.5, 0.0, 0.0, 50.0),
                PidGains::new(2.5, 0.0, 0.0, 50.0),
            ],
            coordinated_flight_yaw_pi: PidGains::new(0.2, 0.01, 0.0, 0.3),
            manual_rate: [150.0, 150.0, 175.0],
            maximum_rate: [300.0, 300.0, 300.0],
            poi_maximum_rate: [30.0, 30.0, 30.0],
            roll_max: 55.0,
            pitch_max: 55.0,
            yaw_max: 35.0,
            rate_expo: [0; MAX_AXES],
            rate_exponent: [30; MAX_AXES],
            acro_dynamic_rate: [0.0; MAX_AXES],
            acro_dynamic_transition: [75; MAX_AXES],
            acro_dynamic_tau: 0.35,
            acro_insanity_factor: 40.0,
            acro_zero_integral_gyro: 150.0,
            acro_zero_integral_stick: 20.0,
            max_axis_lock: 15.0,
            max_axis_lock_rate: 2.0,
            weak_leveling_kp: 0.1,
            max_weak_leveling_rate: 5.0,
            low_throttle_zero_integral: true,
            low_power_stabilization_max_time: 1.0,
            camera_tilt: 0.0,
            derivative_cutoff: 20.0,
            derivative_gamma: 1.0,
            deadband_width: [0; MAX_AXES],
            deadband_slope: [0; MAX_AXES],
            autotune_actuation_effort: [0.1, 0.1, 0.1],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VbarSettings {
    pub sensitivity: [f32; MAX_AXES],
    /// Flybar feedback gains; kd and i_limit are unused.
    pub feedback_pi: [PidGains; MAX_AXES],
    pub pid: [PidGains; MAX_AXES],
    /// Percent of gyro feedback removed at full stick.
    pub gyro_suppress: f32,
    /// Seconds; below 1 ms the flybar does not decay.
    pub tau: f32,
    /// Degrees.
    pub max_angle: f32,
    pub piro_comp: bool,
}

impl Default for VbarSettings {
    fn default() -> Self {
        Self {
            sensitivity: [0.5, 0.5, 0.5],
            feedback_pi: [
                PidGains::new(0.005, 0.002, 0.0, 0.0),
                PidGains::new(0.005, 0.002, 0.0, 0.0),
                PidGains::new(0.005, 0.002, 0.0, 0.0),
            ],
            pid: [PidGains::default(); MAX_AXES],
            gyro_suppress: 30.0,
            tau: 0.5,
            max_angle: 10.0,
            piro_comp: false,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct SubTrimSettings {
    pub roll: f32,
    pub pitch: f32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct SystemSettings {
    pub airframe_type: AirframeType,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriflightSettings {
    pub servo_channel: usize,
    pub rear_motor_channel: usize,
    /// Degrees either side of the 90 degree mid position.
    pub servo_max_angle: f32,
    pub motor_thrust_factor: f32,
    /// deg/s
    pub servo_speed: f32,
    /// Seconds from idle to full throttle.
    pub motor_acceleration: f32,
    pub yaw_boost: f32,
    pub dynamic_yaw_hover_percent: f32,
    pub dynamic_yaw_min_throttle: f32,
    pub dynamic_yaw_max_throttle: f32,
    pub use_servo_feedback: bool,
    pub adc_servo_feedback_min: f32,
    pub adc_servo_feedback_mid: f32,
    pub adc_servo_feedback_max: f32,
}

impl Default for TriflightSettings {
    fn default() -> Self {
        Self {
            servo_channel: 3,
            rear_motor_channel: 2,
            servo_max_angle: 40.0,
            motor_thrust_factor: 13.8,
            servo_speed: 300.0,
            motor_acceleration: 0.18,
            yaw_boost: 1.0,
            dynamic_yaw_hover_percent: 0.5,
            dynamic_yaw_min_throttle: 1.5,
            dynamic_yaw_max_throttle: 0.75,
            use_servo_feedback: false,
            adc_servo_feedback_min: 1000.0,
            adc_servo_feedback_mid: 2000.0,
            adc_servo_feedback_max: 3000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiflightSettings {
    pub servo_max_angle: f32,
    pub adc_servo_feedback_min: [f32; 2],
    pub adc_servo_feedback_mid: [f32; 2],
    pub adc_servo_feedback_max: [f32; 2],
}

impl Default for BiflightSettings {
    fn default() -> Self {
        Self {
            servo_max_angle: 40.0,
            adc_servo_feedback_min: [1000.0; 2],
            adc_servo_feedback_mid: [2000.0; 2],
            adc_servo_feedback_max: [3000.0; 2],
        }
    }
}
