use shared_definitions::MAX_MIX_ACTUATORS;

use crate::util::error::{FlightError, FlightResult};

/// Whatever ends up driving the servo and ESC lines.
pub trait ChannelOutput {
    fn set_channel(&mut self, index: usize, value: f32) -> FlightResult<()>;

    /// Latches the values set since the last call.
    fn update(&mut self) {}
}

/// Hands every channel value to `output`. All channels are written even if some fail; the
/// first failure is returned.
pub fn set_channels(output: &mut dyn ChannelOutput, values: &[f32]) -> FlightResult<()> {
    let mut result = Ok(());
    for (index, value) in values.iter().enumerate() {
        if let Err(error) = output.set_channel(index, *value) {
            if result.is_ok() {
                result = Err(error);
            }
        }
    }
    output.update();
    result
}

/// Channel sink that keeps the last latched values in memory, used by the host build.
#[derive(Debug, Clone)]
pub struct MotorsStateManager {
    pending: [f32; MAX_MIX_ACTUATORS],
    latched: [f32; MAX_MIX_ACTUATORS],
    updates: u32,
    broken_channel: Option<usize>,
}

impl Default for MotorsStateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MotorsStateManager {
    pub fn new() -> Self {
        Self {
            pending: [0.0; MAX_MIX_ACTUATORS],
            latched: [0.0; MAX_MIX_ACTUATORS],
            updates: 0,
            broken_channel: None,
        }
    }

    /// Makes every write to `channel` fail, as a disconnected output would.
    pub fn with_broken_channel(channel: usize) -> Self {
        Self {
            broken_channel: Some(channel),
            ..Self::new()
        }
    }

    pub fn values(&self) -> &[f32; MAX_MIX_ACTUATORS] {
        &self.latched
    }

    pub fn update_count(&self) -> u32 {
        self.updates
    }
}

impl ChannelOutput for MotorsStateManager {
    fn set_channel(&mut self, index: usize, value: f32) -> FlightResult<()> {
        if index >= MAX_MIX_ACTUATORS || self.broken_channel == Some(index) || !value.is_finite()
        {
            return Err(FlightError::ChannelOutput {
                channel: index,
                value,
            });
        }
        self.pending[index] = value;
        Ok(())
    }

    fn update(&mut self) {
        self.latched = self.pending;
        self.updates += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_latch_on_update() {
        let mut manager = MotorsStateManager::new();
        manager.set_channel(0, 1100.0).unwrap();
        assert_eq!(manager.values()[0], 0.0);
        manager.update();
        assert_eq!(manager.values()[0], 1100.0);
    }

    #[test]
    fn failed_channel_does_not_block_the_others() {
        let mut manager = MotorsStateManager::with_broken_channel(1);
        let result = set_channels(&mut manager, &[1100.0, 1200.0, 1300.0]);
        assert_eq!(
            result,
            Err(FlightError::ChannelOutput {
                channel: 1,
                value: 1200.0
            })
        );
        assert_eq!(manager.values()[0], 1100.0);
        assert_eq!(manager.values()[2], 1300.0);
        assert_eq!(manager.update_count(), 1);
    }
}
