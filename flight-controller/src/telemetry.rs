use std::{
    io,
    sync::atomic::{AtomicBool, Ordering},
    thread::{self, JoinHandle},
    time::Duration,
};

use shared_definitions::alarms::SystemAlarm;

use crate::{
    config::constants::{TELEMETRY_PERIOD_MS, TELEMETRY_STACK_SIZE},
    shared_core_values::{AtomicAlarms, AtomicTelemetry},
};

pub fn log_telemetry(telemetry_data: &AtomicTelemetry, alarms: &AtomicAlarms) {
    log::info!(
        "
            Iteration Time: {:?}
            Rotation rate {:?}
            Rate desired {:?}
            Throttle {:?}
            Autotune state {} predicts {} spilled {}
            Alarms {:?}",
        telemetry_data.loop_exec_time_us.load(Ordering::Relaxed),
        telemetry_data.rotation_rate.read(),
        telemetry_data.rate_desired.read(),
        telemetry_data.throttle.load(Ordering::Relaxed),
        telemetry_data.autotune_state.load(Ordering::Relaxed),
        telemetry_data.autotune_predicts.load(Ordering::Relaxed),
        telemetry_data.autotune_spills.load(Ordering::Relaxed),
        SystemAlarm::ALL.map(|alarm| alarms.get(alarm)),
    );
}

/// Dumps telemetry periodically for debugging until `running` is cleared.
pub fn start_telemetry_thread(
    telemetry_data: &'static AtomicTelemetry,
    alarms: &'static AtomicAlarms,
    running: &'static AtomicBool,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("telemetry".into())
        .stack_size(TELEMETRY_STACK_SIZE)
        .spawn(move || {
            while running.load(Ordering::Relaxed) {
                if cfg!(feature = "telemetry-log") {
                    log_telemetry(telemetry_data, alarms);
                }
                thread::sleep(Duration::from_millis(TELEMETRY_PERIOD_MS));
            }
        })
}
