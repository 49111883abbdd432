// Stabilization loop
pub const STABILIZATION_FAILSAFE_TIMEOUT_MS: u64 = 30;
pub const GYRO_SAMPLE_RATE_HZ: f32 = 1000.0_f32;
pub const GYRO_SAMPLE_PERIOD_S: f32 = 1.0_f32 / GYRO_SAMPLE_RATE_HZ;
pub const LOOP_PERIOD_AVERAGE_START: u32 = 100;
pub const LOOP_PERIOD_AVERAGE_END: u32 = 2100;
pub const LOOP_FREQUENCY_TOLERANCE: f32 = 0.15_f32;

// Control laws
pub const COORDINATED_FLIGHT_MIN_ROLL_THRESHOLD: f32 = 3.0_f32;
pub const COORDINATED_FLIGHT_MAX_YAW_THRESHOLD: f32 = 0.05_f32;
pub const HORIZON_MODE_MAX_BLEND: f32 = 0.85_f32;
pub const HOLD_OPEN_THRUST: f32 = 1e-6_f32;
pub const FAILSAFE_FIXED_WING_ROLL_DEG: f32 = -10.0_f32;
pub const FAILSAFE_FIXED_WING_YAW_RATE: f32 = -5.0_f32;
pub const DYNAMIC_RATE_GYRO_HEADROOM: f32 = 0.9_f32;
pub const MAX_GYRO_RATE_DEG: f32 = 2000.0_f32;

// System identification excitation
pub const SYSTEM_IDENT_PREPARE_TIME_MS: u32 = 1250;
pub const SYSTEM_IDENT_MEASURE_TIME_S: f32 = 60.0_f32;
pub const MAX_EXCITATION_SCALE: f32 = 0.25_f32;
pub const EXCITATION_REFERENCE_BETA: f32 = 10.0_f32;

// Actuator
pub const MIXER_SCALE: f32 = 128.0_f32;
pub const ACTUATOR_EPSILON: f32 = 1e-5_f32;
pub const ACTUATOR_FAILSAFE_TIMEOUT_MS: u64 = 100;
pub const MIN_MIXER_CHANNELS: usize = 2;
pub const FLIP_OVER_STICK_DEADBAND: f32 = 0.25_f32;

// DShot
pub const DSHOT_MIN_THROTTLE: f32 = 48.0_f32;
pub const DSHOT_MAX_THROTTLE: f32 = 2047.0_f32;
pub const DSHOT_3D_RANGE_MAX: f32 = 999.0_f32;
pub const DSHOT_3D_REVERSE_OFFSET: f32 = 1048.0_f32;
pub const DSHOT_CMD_MOTOR_STOP: u8 = 0;
pub const DSHOT_CMD_3D_MODE_ON: u8 = 10;
pub const DSHOT_DISARM_PRIME_COUNT: u8 = 12;
pub const DSHOT_3D_ARM_COUNT: u8 = 24;

// Autotune
pub const AUTOTUNE_QUEUE_LENGTH: usize = 64;
pub const AUTOTUNE_POLL_PERIOD_MS: u64 = 2;
pub const AUTOTUNE_SAVE_RETRY_MS: u32 = 1000;
pub const AUTOTUNE_MAX_SAMPLE_GAP: u32 = 10;
pub const THROTTLE_ACCUMULATOR_SCALE: f32 = 10_000.0_f32;
pub const AUTOTUNE_NOISE_ALPHA: f32 = 0.999_f32;

// Threads
pub const STABILIZATION_STACK_SIZE: usize = 16 * 1024;
pub const ACTUATOR_STACK_SIZE: usize = 16 * 1024;
pub const AUTOTUNE_STACK_SIZE: usize = 32 * 1024;
pub const TELEMETRY_STACK_SIZE: usize = 8 * 1024;
pub const TELEMETRY_PERIOD_MS: u64 = 250;
