use std::{
    sync::{
        atomic::Ordering,
        mpsc::{Receiver, RecvTimeoutError},
    },
    time::Duration,
};

use shared_definitions::{
    actuator::ActuatorDesired,
    alarms::{AlarmLevel, SystemAlarm},
    stabilization::InertialSample,
    PITCH, ROLL, YAW,
};

use crate::{
    config::{
        constants::STABILIZATION_FAILSAFE_TIMEOUT_MS,
        store::{SettingsStore, SETTINGS_CHANGED, SETTINGS_STORE},
    },
    control::stabilization::{StabilizationConfig, StabilizationCore, StabilizationTick},
    shared_core_values::{
        AtomicTelemetry, SHARED_ATTITUDE, SHARED_CAMERA_DESIRED, SHARED_FLIGHT_STATUS,
        SHARED_MANUAL_CONTROL, SHARED_STABILIZATION_DESIRED,
    },
    util::{math::vectors::RotationVector3D, time::get_current_system_time_us},
};

pub enum MainControlLoopOutCommands {
    UpdateFlightState(FlightStabilizerOut),
    RaiseAlarm(SystemAlarm, AlarmLevel),
}

#[derive(Debug)]
pub struct FlightStabilizerOut {
    pub actuator: ActuatorDesired,
    /// Gyro sample the actuator command was computed from.
    pub sample: InertialSample,
}

pub fn stabilization_config(store: &SettingsStore) -> StabilizationConfig {
    StabilizationConfig {
        stabilization: store.get_stabilization(),
        vbar: store.get_vbar(),
        sub_trim: store.get_sub_trim(),
        airframe_type: store.get_system().airframe_type,
        system_ident: store.get_system_ident(),
    }
}

fn reload_settings(core: &mut StabilizationCore) {
    match SETTINGS_STORE.lock() {
        Ok(store) => {
            core.update_settings(stabilization_config(&store));
            log::info!("Stabilization settings reloaded");
        }
        Err(_) => log::error!("Settings store poisoned, keeping stabilization settings"),
    }
}

/// Runs one control law tick per gyro sample until the sample source goes away.
pub fn run_stabilization_loop(
    mut core: StabilizationCore,
    samples: &Receiver<InertialSample>,
    telemetry_data: &AtomicTelemetry,
    mut controllers_out_callback: impl FnMut(MainControlLoopOutCommands),
) {
    let timeout = Duration::from_millis(STABILIZATION_FAILSAFE_TIMEOUT_MS);

    loop {
        if SETTINGS_CHANGED.take_stabilization() {
            reload_settings(&mut core);
        }

        let sample = match samples.recv_timeout(timeout) {
            Ok(sample) => sample,
            Err(RecvTimeoutError::Timeout) => {
                controllers_out_callback(MainControlLoopOutCommands::RaiseAlarm(
                    SystemAlarm::Stabilization,
                    AlarmLevel::Warning,
                ));
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => {
                log::info!("Gyro samples stopped, leaving stabilization loop");
                break;
            }
        };

        let start_time_us = get_current_system_time_us();
        let flight_status = SHARED_FLIGHT_STATUS.read();
        let tick = StabilizationTick {
            desired: SHARED_STABILIZATION_DESIRED.read(),
            attitude: SHARED_ATTITUDE.read(),
            sample,
            armed: flight_status.armed,
            camera: SHARED_CAMERA_DESIRED.read(),
            manual_throttle: SHARED_MANUAL_CONTROL.read().throttle,
            time_us: start_time_us,
        };

        let output = core.tick(&tick);

        controllers_out_callback(MainControlLoopOutCommands::RaiseAlarm(
            SystemAlarm::Stabilization,
            output.alarm,
        ));
        controllers_out_callback(MainControlLoopOutCommands::UpdateFlightState(
            FlightStabilizerOut {
                actuator: output.actuator,
                sample,
            },
        ));

        telemetry_data.rotation_rate.store(RotationVector3D {
            roll: sample.gyro[ROLL],
            pitch: sample.gyro[PITCH],
            yaw: sample.gyro[YAW],
        });
        telemetry_data.rate_desired.store(output.rate_desired);
        telemetry_data
            .throttle
            .store(output.actuator.thrust, Ordering::Relaxed);
        telemetry_data.loop_exec_time_us.store(
            (get_current_system_time_us() - start_time_us) as i32,
            Ordering::Relaxed,
        );
    }
}
