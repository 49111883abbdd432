use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use shared_definitions::{actuator::ActuatorDesired, MAX_AXES};

use crate::util::sample_queue::Producer;

/// One observation: measured body rates and the actuator command applied at the same tick.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct AtQueuedData {
    pub y: [f32; MAX_AXES],
    pub u: [f32; MAX_AXES],
    pub throttle: f32,
    /// Tick counter of the control loop, wraps at u16.
    pub sample_num: u16,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AutotuneRecord {
    Sample(AtQueuedData),
    /// The excitation stopped; no more samples belong to this run.
    EndOfRun,
}

impl Default for AutotuneRecord {
    fn default() -> Self {
        AutotuneRecord::Sample(AtQueuedData::default())
    }
}

/// Producer side of the autotune queue, fed from the control loop context.
pub struct AutotuneSampleTap {
    producer: Producer<AutotuneRecord>,
    spilled: Arc<AtomicU32>,
    sample_num: u16,
    measuring: bool,
    end_of_run_pending: bool,
}

impl AutotuneSampleTap {
    pub fn new(producer: Producer<AutotuneRecord>, spilled: Arc<AtomicU32>) -> Self {
        Self {
            producer,
            spilled,
            sample_num: 0,
            measuring: false,
            end_of_run_pending: false,
        }
    }

    /// Called for every actuator command the stabilization loop produces. Queues it while
    /// the excitation runs and marks the end of the run once it stops. Never blocks: a full
    /// queue only bumps the spill counter.
    pub fn on_actuator_desired(&mut self, desired: &ActuatorDesired, gyro: &[f32; MAX_AXES]) {
        self.sample_num = self.sample_num.wrapping_add(1);

        if self.end_of_run_pending {
            self.push_end_of_run();
        }

        if desired.system_ident_cycle.is_some() {
            self.measuring = true;
            let record = AutotuneRecord::Sample(AtQueuedData {
                y: *gyro,
                u: desired.axes(),
                throttle: desired.thrust,
                sample_num: self.sample_num,
            });
            if self.producer.try_push(record).is_err() {
                self.spilled.fetch_add(1, Ordering::Relaxed);
            }
        } else if self.measuring {
            self.measuring = false;
            self.end_of_run_pending = true;
            self.push_end_of_run();
        }
    }

    fn push_end_of_run(&mut self) {
        if self.producer.try_push(AutotuneRecord::EndOfRun).is_ok() {
            self.end_of_run_pending = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::sample_queue;

    fn measuring(cycle: Option<u16>) -> ActuatorDesired {
        ActuatorDesired {
            roll: 0.1,
            pitch: -0.2,
            yaw: 0.05,
            thrust: 0.4,
            system_ident_cycle: cycle,
            ..Default::default()
        }
    }

    #[test]
    fn only_measured_ticks_are_queued() {
        let (producer, mut consumer) = sample_queue::create(8).unwrap();
        let mut tap = AutotuneSampleTap::new(producer, Arc::new(AtomicU32::new(0)));

        tap.on_actuator_desired(&measuring(None), &[0.0; 3]);
        assert!(consumer.is_empty());

        tap.on_actuator_desired(&measuring(Some(0)), &[1.0, 2.0, 3.0]);
        tap.on_actuator_desired(&measuring(Some(1)), &[1.0, 2.0, 3.0]);
        tap.on_actuator_desired(&measuring(None), &[0.0; 3]);

        let Some(AutotuneRecord::Sample(first)) = consumer.try_pop() else {
            panic!("expected a sample");
        };
        assert_eq!(first.y, [1.0, 2.0, 3.0]);
        assert_eq!(first.u, [0.1, -0.2, 0.05]);
        assert_eq!(first.throttle, 0.4);
        let Some(AutotuneRecord::Sample(second)) = consumer.try_pop() else {
            panic!("expected a sample");
        };
        assert_eq!(second.sample_num, first.sample_num.wrapping_add(1));
        assert_eq!(consumer.try_pop(), Some(AutotuneRecord::EndOfRun));
        assert!(consumer.is_empty());
    }

    #[test]
    fn full_queue_spills_and_end_marker_waits() {
        let (producer, mut consumer) = sample_queue::create(2).unwrap();
        let spilled = Arc::new(AtomicU32::new(0));
        let mut tap = AutotuneSampleTap::new(producer, spilled.clone());

        for cycle in 0..5 {
            tap.on_actuator_desired(&measuring(Some(cycle)), &[0.0; 3]);
        }
        assert_eq!(spilled.load(Ordering::Relaxed), 3);

        tap.on_actuator_desired(&measuring(None), &[0.0; 3]);
        consumer.clear();
        tap.on_actuator_desired(&measuring(None), &[0.0; 3]);
        assert_eq!(consumer.try_pop(), Some(AutotuneRecord::EndOfRun));
        assert!(consumer.is_empty());
    }
}
