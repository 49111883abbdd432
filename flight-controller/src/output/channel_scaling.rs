use libm::roundf;
use shared_definitions::{
    actuator::DshotCommand,
    settings::{ActuatorChannel, ChannelType},
};

use crate::config::constants::{
    DSHOT_3D_RANGE_MAX, DSHOT_3D_REVERSE_OFFSET, DSHOT_MAX_THROTTLE, DSHOT_MIN_THROTTLE,
};

const DSHOT_DEADBAND_NORMAL: u16 = 0;
const DSHOT_DEADBAND_3D: u16 = 1;
const DSHOT_DEADBAND_3D_REVERSED: u16 = 2;

/// Lower and upper bound of a channel, whichever way round min and max are configured.
pub fn channel_bounds(channel: &ActuatorChannel) -> (f32, f32) {
    if channel.min <= channel.max {
        (channel.min, channel.max)
    } else {
        (channel.max, channel.min)
    }
}

/// Maps a normalized value in [-1,1] to a pulse width. `None` (or a non finite value) means
/// "do not spin": the neutral point for 3D channels, the minimum otherwise.
pub fn scale_pwm(value: Option<f32>, channel: &ActuatorChannel) -> f32 {
    let mut deadband = channel.deadband as f32 / 2.0;

    let value = match value.filter(|value| value.is_finite()) {
        Some(value) => value,
        None if deadband != 0.0 => return channel.neutral,
        None => return channel.min,
    };

    if channel.min > channel.max {
        deadband = -deadband;
    }

    let scaled = if value >= 0.0 {
        value * (channel.max - channel.neutral - deadband) + channel.neutral + deadband
    } else {
        value * (channel.neutral - channel.min - deadband) + channel.neutral - deadband
    };

    let (low, high) = channel_bounds(channel);
    scaled.max(low).min(high)
}

/// Maps a normalized value to a DShot throttle word. The deadband field selects the mode:
/// 0 normal, 1 bidirectional (3D), 2 reversed bidirectional. Anything else never spins.
/// Words other than the stop word 0 stay inside the configured channel range.
pub fn scale_dshot(value: Option<f32>, channel: &ActuatorChannel) -> f32 {
    let word = dshot_word(value, channel);
    if word == 0.0 {
        return 0.0;
    }
    let (low, high) = channel_bounds(channel);
    word.max(low).min(high)
}

fn dshot_word(value: Option<f32>, channel: &ActuatorChannel) -> f32 {
    let Some(mut value) = value.filter(|value| value.is_finite()) else {
        return 0.0;
    };

    let reversed = match channel.deadband {
        DSHOT_DEADBAND_NORMAL => {
            let neutral = channel.neutral;
            let scaled = roundf((DSHOT_MAX_THROTTLE - neutral) * value) + neutral;
            let scaled = scaled.min(DSHOT_MAX_THROTTLE);
            // Only reachable with a bad neutral value.
            return if scaled < DSHOT_MIN_THROTTLE { 0.0 } else { scaled };
        }
        DSHOT_DEADBAND_3D => false,
        DSHOT_DEADBAND_3D_REVERSED => true,
        _ => return 0.0,
    };

    // Neutral is configured as if the channel was unipolar.
    let neutral = (channel.neutral - DSHOT_MIN_THROTTLE) / 2.0;

    let negative = if value < 0.0 {
        value = -value;
        !reversed
    } else {
        reversed
    };

    let scaled = roundf((DSHOT_3D_RANGE_MAX - neutral) * value + neutral)
        .min(DSHOT_3D_RANGE_MAX)
        .max(0.0);

    if negative {
        scaled + DSHOT_3D_REVERSE_OFFSET
    } else {
        scaled + DSHOT_MIN_THROTTLE
    }
}

/// Scales one channel. While a DShot command is being sent, masked DShot channels carry the
/// command id instead of a throttle value.
pub fn scale_channel(
    value: Option<f32>,
    index: usize,
    channel: &ActuatorChannel,
    active_command: Option<DshotCommand>,
) -> f32 {
    match channel.channel_type {
        ChannelType::DShot => {
            if let Some(command) = active_command {
                if command.channel_mask() & (1 << index) != 0 {
                    return command.cmd_id() as f32;
                }
            }
            scale_dshot(value, channel)
        }
        ChannelType::Pwm | ChannelType::OneShot => scale_pwm(value, channel),
    }
}
