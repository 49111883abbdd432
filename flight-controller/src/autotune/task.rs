use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use shared_definitions::{
    actuator::{FlightMode, FlightStatus},
    system_ident::SystemIdentResult,
    MAX_AXES,
};

use super::{
    ekf::{RateTorqueEkf, TAU},
    sample_tap::{AtQueuedData, AutotuneRecord},
};
use crate::{
    config::{
        constants::{
            AUTOTUNE_MAX_SAMPLE_GAP, AUTOTUNE_NOISE_ALPHA, AUTOTUNE_SAVE_RETRY_MS,
            GYRO_SAMPLE_PERIOD_S, THROTTLE_ACCUMULATOR_SCALE,
        },
        store::SettingsPersistence,
    },
    util::{sample_queue::Consumer, time::time_difference_ms},
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AutotuneState {
    #[default]
    Init = 0,
    Start = 1,
    WaitFirstPoint = 2,
    Run = 3,
    Waiting = 4,
}

/// Consumer side of autotune: drains the sample queue into the identification filter.
pub struct AutotuneTask {
    consumer: Consumer<AutotuneRecord>,
    spilled: Arc<AtomicU32>,
    ekf: RateTorqueEkf,
    state: AutotuneState,
    last_sample_num: Option<u16>,
    predicts: u32,
    throttle_accumulator: u32,
    noise: [f32; MAX_AXES],
    save_pending: bool,
    last_save_attempt_ms: Option<u32>,
    result: SystemIdentResult,
}

/// Fits 89% throttle for about a minute at 8 kHz, then holds at the maximum.
fn accumulate_throttle(accumulator: u32, throttle: f32) -> u32 {
    accumulator.saturating_add((throttle * THROTTLE_ACCUMULATOR_SCALE) as u32)
}

impl AutotuneTask {
    pub fn new(consumer: Consumer<AutotuneRecord>, spilled: Arc<AtomicU32>) -> Self {
        Self {
            consumer,
            spilled,
            ekf: RateTorqueEkf::default(),
            state: AutotuneState::Init,
            last_sample_num: None,
            predicts: 0,
            throttle_accumulator: 0,
            noise: [0.0; MAX_AXES],
            save_pending: false,
            last_save_attempt_ms: None,
            result: SystemIdentResult::default(),
        }
    }

    pub fn state(&self) -> AutotuneState {
        self.state
    }

    pub fn result(&self) -> &SystemIdentResult {
        &self.result
    }

    pub fn save_pending(&self) -> bool {
        self.save_pending
    }

    pub fn ekf(&self) -> &RateTorqueEkf {
        &self.ekf
    }

    fn set_state(&mut self, state: AutotuneState) {
        if state != self.state {
            log::debug!("Autotune {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    /// One polling cycle. Returns the identification result when there is something new to
    /// publish.
    pub fn step(
        &mut self,
        flight_status: FlightStatus,
        now_ms: u32,
        persistence: &mut dyn SettingsPersistence,
    ) -> Option<SystemIdentResult> {
        if !flight_status.armed {
            self.try_save(now_ms, persistence);
        }

        if flight_status.flight_mode != FlightMode::Autotune && self.state != AutotuneState::Init
        {
            self.set_state(AutotuneState::Init);
        }

        match self.state {
            AutotuneState::Init => {
                if flight_status.armed && flight_status.flight_mode == FlightMode::Autotune {
                    self.set_state(AutotuneState::Start);
                }
                None
            }
            AutotuneState::Start => {
                self.restart();
                self.set_state(AutotuneState::WaitFirstPoint);
                None
            }
            AutotuneState::WaitFirstPoint => {
                if self.consumer.read_pos().is_some() {
                    log::info!("Autotune measuring");
                    self.set_state(AutotuneState::Run);
                }
                None
            }
            AutotuneState::Run => Some(self.drain()),
            AutotuneState::Waiting => None,
        }
    }

    fn restart(&mut self) {
        self.consumer.clear();
        self.spilled.store(0, Ordering::Relaxed);
        self.ekf.af_init();
        self.last_sample_num = None;
        self.predicts = 0;
        self.throttle_accumulator = 0;
        self.noise = [0.0; MAX_AXES];
    }

    fn drain(&mut self) -> SystemIdentResult {
        while let Some(record) = self.consumer.try_pop() {
            match record {
                AutotuneRecord::Sample(data) => self.process_sample(&data),
                AutotuneRecord::EndOfRun => {
                    self.result = self.build_result(true);
                    self.save_pending = true;
                    self.last_save_attempt_ms = None;
                    log::info!(
                        "Autotune finished after {} samples, {} spilled, hover throttle {:.3}",
                        self.result.num_af_predicts,
                        self.result.num_spilled_pts,
                        self.result.hover_throttle
                    );
                    self.set_state(AutotuneState::Waiting);
                    return self.result;
                }
            }
        }

        self.result = self.build_result(false);
        self.result
    }

    fn process_sample(&mut self, data: &AtQueuedData) {
        let intervals = match self.last_sample_num {
            Some(previous) => (data.sample_num.wrapping_sub(previous) as u32)
                .clamp(1, AUTOTUNE_MAX_SAMPLE_GAP),
            None => 1,
        };
        self.last_sample_num = Some(data.sample_num);

        let innovations = self
            .ekf
            .af_predict(&data.u, &data.y, intervals as f32 * GYRO_SAMPLE_PERIOD_S);
        for (noise, innovation) in self.noise.iter_mut().zip(innovations.iter()) {
            *noise = AUTOTUNE_NOISE_ALPHA * *noise
                + (1.0 - AUTOTUNE_NOISE_ALPHA) * innovation * innovation;
        }

        self.throttle_accumulator = accumulate_throttle(self.throttle_accumulator, data.throttle);
        self.predicts += 1;
    }

    fn build_result(&self, new_tune: bool) -> SystemIdentResult {
        let hover_throttle = if self.predicts > 0 {
            self.throttle_accumulator as f32 / self.predicts as f32 / THROTTLE_ACCUMULATOR_SCALE
        } else {
            0.0
        };

        SystemIdentResult {
            beta: self.ekf.ln_beta(),
            tau: self.ekf.x[TAU],
            bias: self.ekf.bias(),
            noise: self.noise,
            num_af_predicts: self.predicts,
            num_spilled_pts: self.spilled.load(Ordering::Relaxed),
            hover_throttle,
            new_tune,
        }
    }

    /// Writes the finished tune once disarmed, retrying after a pause on failure.
    fn try_save(&mut self, now_ms: u32, persistence: &mut dyn SettingsPersistence) {
        if !self.save_pending {
            return;
        }
        if let Some(last_attempt) = self.last_save_attempt_ms {
            if time_difference_ms(last_attempt, now_ms) < AUTOTUNE_SAVE_RETRY_MS {
                return;
            }
        }

        self.last_save_attempt_ms = Some(now_ms);
        match persistence.save_system_ident(&self.result) {
            Ok(()) => {
                self.save_pending = false;
                log::info!("Autotune result saved");
            }
            Err(error) => log::warn!("Saving autotune result failed, will retry: {}", error),
        }
    }
}
