use shared_definitions::actuator::DshotCommand;

use crate::{
    config::constants::{DSHOT_CMD_MOTOR_STOP, DSHOT_DISARM_PRIME_COUNT},
    shared_core_values::AtomicDshotCommand,
};

/// Queues a DShot command for the actuator task. Fails if one is already pending.
/// Commands are only sent while disarmed.
pub fn send_dshot_command(
    slot: &AtomicDshotCommand,
    cmd_id: u8,
    num_to_send: u8,
    channel_mask: u16,
) -> bool {
    slot.offer(
        DshotCommand::new()
            .with_cmd_id(cmd_id)
            .with_num_to_send(num_to_send)
            .with_channel_mask(channel_mask),
    )
}

/// Tracks the command currently being repeated on the DShot channels.
#[derive(Debug)]
pub struct DshotSequencer {
    current: DshotCommand,
}

impl Default for DshotSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl DshotSequencer {
    /// Starts out priming every channel with motor stop frames.
    pub fn new() -> Self {
        Self {
            current: DshotCommand::new()
                .with_cmd_id(DSHOT_CMD_MOTOR_STOP)
                .with_num_to_send(DSHOT_DISARM_PRIME_COUNT)
                .with_channel_mask(0xffff),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.current.num_to_send() != 0
    }

    /// Starts `cmd_id` right away, bypassing the pending slot. Used for the arming burst.
    pub fn send_now(&mut self, cmd_id: u8, num_to_send: u8, channel_mask: u16) -> bool {
        if self.is_busy() {
            return false;
        }
        self.current = DshotCommand::new()
            .with_cmd_id(cmd_id)
            .with_num_to_send(num_to_send)
            .with_channel_mask(channel_mask);
        true
    }

    /// Command to put on the wire this frame, if any. A command in progress always finishes;
    /// a new one is only picked up from `pending` while disarmed.
    pub fn next_frame(&mut self, armed: bool, pending: &AtomicDshotCommand) -> Option<DshotCommand> {
        if self.is_busy() {
            return Some(self.consume_one());
        }
        if armed {
            return None;
        }

        self.current = pending.take()?;
        if self.is_busy() {
            Some(self.consume_one())
        } else {
            None
        }
    }

    fn consume_one(&mut self) -> DshotCommand {
        let remaining = self.current.num_to_send() - 1;
        self.current.set_num_to_send(remaining);
        self.current
    }
}
