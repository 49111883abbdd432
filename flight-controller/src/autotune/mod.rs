pub mod ekf;
pub mod sample_tap;
pub mod task;

use std::sync::{atomic::AtomicU32, Arc};

use self::{
    sample_tap::{AutotuneRecord, AutotuneSampleTap},
    task::AutotuneTask,
};
use crate::util::sample_queue;

/// Connects the control loop tap to the identification task. Autotune stays disabled when
/// the queue cannot be allocated.
pub fn create(queue_length: usize) -> Option<(AutotuneSampleTap, AutotuneTask)> {
    let (producer, consumer) = match sample_queue::create::<AutotuneRecord>(queue_length) {
        Ok(queue) => queue,
        Err(error) => {
            log::error!("Autotune disabled: {}", error);
            return None;
        }
    };
    let spilled = Arc::new(AtomicU32::new(0));

    Some((
        AutotuneSampleTap::new(producer, spilled.clone()),
        AutotuneTask::new(consumer, spilled),
    ))
}
