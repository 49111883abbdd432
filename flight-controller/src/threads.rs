use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, SyncSender},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use shared_definitions::{
    actuator::{ActuatorDesired, FlightStatus},
    alarms::{AlarmLevel, SystemAlarm},
    stabilization::InertialSample,
    system_ident::SystemIdentResult,
};

use crate::{
    autotune::{self, sample_tap::AutotuneSampleTap, task::AutotuneTask},
    config::{
        constants::{
            ACTUATOR_FAILSAFE_TIMEOUT_MS, ACTUATOR_STACK_SIZE, AUTOTUNE_POLL_PERIOD_MS,
            AUTOTUNE_QUEUE_LENGTH, AUTOTUNE_STACK_SIZE, GYRO_SAMPLE_PERIOD_S,
            STABILIZATION_STACK_SIZE,
        },
        store::{SettingsPersistence, SettingsStore, SETTINGS_CHANGED, SETTINGS_STORE},
    },
    control::{
        control_loops::{run_stabilization_loop, stabilization_config, MainControlLoopOutCommands},
        stabilization::{StabilizationConfig, StabilizationCore},
    },
    output::{
        airframe_stage::{stage_for_airframe, AirframeOutputStage, StageInputs},
        mixer::{Mixer, MixerConfig, MixerInputs},
        motors_state_manager::{set_channels, ChannelOutput},
    },
    shared_core_values::{
        AlarmSink, AtomicActuatorDesired, SHARED_ACTUATOR_COMMAND, SHARED_ACTUATOR_DESIRED, SHARED_ALARMS,
        SHARED_CAMERA_DESIRED, SHARED_DSHOT_COMMAND, SHARED_FLIGHT_STATUS, SHARED_MANUAL_CONTROL,
        SHARED_TELEMETRY,
    },
    telemetry::start_telemetry_thread,
    util::{
        error::{FlightError, FlightResult},
        time::{get_current_system_time_ms, get_current_system_time_us},
    },
};

/// Handles of the running flight threads.
pub struct FlightThreads<P> {
    stabilization: JoinHandle<()>,
    actuator: JoinHandle<()>,
    autotune: JoinHandle<P>,
    telemetry: JoinHandle<()>,
    running: &'static AtomicBool,
}

impl<P> FlightThreads<P> {
    /// Waits for the control threads to finish, which happens once the gyro source is
    /// dropped, then stops the periodic ones. Returns the persistence backend.
    pub fn join(self) -> Option<P> {
        if self.stabilization.join().is_err() {
            log::error!("Stabilization thread panicked");
        }
        if self.actuator.join().is_err() {
            log::error!("Actuator thread panicked");
        }
        self.running.store(false, Ordering::Relaxed);
        if self.telemetry.join().is_err() {
            log::error!("Telemetry thread panicked");
        }
        match self.autotune.join() {
            Ok(persistence) => Some(persistence),
            Err(_) => {
                log::error!("Autotune thread panicked");
                None
            }
        }
    }
}

fn spawn<T: Send + 'static>(
    name: &'static str,
    stack_size: usize,
    body: impl FnOnce() -> T + Send + 'static,
) -> FlightResult<JoinHandle<T>> {
    thread::Builder::new()
        .name(name.into())
        .stack_size(stack_size)
        .spawn(body)
        .map_err(|error| FlightError::ThreadSpawn {
            name,
            message: error.to_string(),
        })
}

fn read_settings<T>(read: impl FnOnce(&SettingsStore) -> T) -> Option<T> {
    match SETTINGS_STORE.lock() {
        Ok(store) => Some(read(&store)),
        Err(_) => {
            log::error!("Settings store poisoned");
            None
        }
    }
}

/// Starts stabilization, actuator, autotune and telemetry. Stabilization runs once per
/// sample received on `gyro`.
pub fn start_flight_threads<P>(
    gyro: Receiver<InertialSample>,
    output: Box<dyn ChannelOutput + Send>,
    persistence: P,
    running: &'static AtomicBool,
) -> FlightResult<FlightThreads<P>>
where
    P: SettingsPersistence + Send + 'static,
{
    running.store(true, Ordering::Relaxed);

    let autotune = if cfg!(feature = "autotune") {
        autotune::create(AUTOTUNE_QUEUE_LENGTH)
    } else {
        None
    };
    let (tap, task) = match autotune {
        Some((tap, task)) => (Some(tap), Some(task)),
        None => (None, None),
    };

    let (desired_sender, desired_receiver) = mpsc::sync_channel(1);

    let stabilization = spawn("stabilization", STABILIZATION_STACK_SIZE, move || {
        stabilization_thread(gyro, desired_sender, tap)
    })?;
    let actuator = spawn("actuator", ACTUATOR_STACK_SIZE, move || {
        actuator_thread(desired_receiver, output)
    })?;
    let autotune = spawn("autotune", AUTOTUNE_STACK_SIZE, move || {
        autotune_thread(task, persistence, running)
    })?;
    let telemetry = start_telemetry_thread(&SHARED_TELEMETRY, &SHARED_ALARMS, running).map_err(
        |error| FlightError::ThreadSpawn {
            name: "telemetry",
            message: error.to_string(),
        },
    )?;

    log::info!("Flight threads started");
    Ok(FlightThreads {
        stabilization,
        actuator,
        autotune,
        telemetry,
        running,
    })
}

fn stabilization_thread(
    gyro: Receiver<InertialSample>,
    desired_sender: SyncSender<()>,
    mut tap: Option<AutotuneSampleTap>,
) {
    let config = read_settings(stabilization_config).unwrap_or_else(StabilizationConfig::default);
    // Settings are already applied, skip the first reload.
    SETTINGS_CHANGED.take_stabilization();
    let core = StabilizationCore::new(config, GYRO_SAMPLE_PERIOD_S);

    run_stabilization_loop(core, &gyro, &SHARED_TELEMETRY, |command| match command {
        MainControlLoopOutCommands::UpdateFlightState(out) => {
            SHARED_ACTUATOR_DESIRED.store(&out.actuator);
            if let Some(tap) = tap.as_mut() {
                tap.on_actuator_desired(&out.actuator, &out.sample.gyro);
            }
            // A pending wake-up already covers this update.
            let _ = desired_sender.try_send(());
        }
        MainControlLoopOutCommands::RaiseAlarm(alarm, level) => SHARED_ALARMS.set(alarm, level),
    });
    log::info!("Stabilization thread stopped");
}

fn mixer_config(store: &SettingsStore) -> MixerConfig {
    MixerConfig {
        mixer: store.get_mixer(),
        actuator: store.get_actuator(),
        airframe_type: store.get_system().airframe_type,
    }
}

fn build_stage(store: &SettingsStore) -> Option<Box<dyn AirframeOutputStage>> {
    match stage_for_airframe(
        store.get_system().airframe_type,
        &store.get_actuator(),
        store.get_triflight(),
        store.get_biflight(),
    ) {
        Ok(stage) => stage,
        Err(error) => {
            log::error!("Airframe output stage disabled: {}", error);
            SHARED_ALARMS.set(SystemAlarm::Actuator, AlarmLevel::Error);
            None
        }
    }
}

/// Waits for the next stabilization update and returns the newest published demand.
fn next_actuator_desired(
    wake: &Receiver<()>,
    latest: &AtomicActuatorDesired,
    timeout: Duration,
) -> Result<ActuatorDesired, RecvTimeoutError> {
    wake.recv_timeout(timeout)?;
    Ok(latest.read())
}

fn actuator_thread(wake: Receiver<()>, mut output: Box<dyn ChannelOutput + Send>) {
    let (config, mut stage) =
        read_settings(|store| (mixer_config(store), build_stage(store))).unwrap_or_default();
    SETTINGS_CHANGED.take_actuator();
    let mut mixer = Mixer::new(config, &SHARED_DSHOT_COMMAND);
    let timeout = Duration::from_millis(ACTUATOR_FAILSAFE_TIMEOUT_MS);
    let mut last_update_us = get_current_system_time_us();

    loop {
        if SETTINGS_CHANGED.take_actuator() {
            if let Some((config, new_stage)) =
                read_settings(|store| (mixer_config(store), build_stage(store)))
            {
                mixer.update_settings(config);
                stage = new_stage;
            }
        }

        let latest = next_actuator_desired(&wake, &SHARED_ACTUATOR_DESIRED, timeout);
        let mut actuator_desired = match latest {
            Ok(actuator_desired) => actuator_desired,
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("No actuator command for {} ms, failsafe", ACTUATOR_FAILSAFE_TIMEOUT_MS);
                SHARED_ACTUATOR_COMMAND.store(&mixer.failsafe(output.as_mut(), &SHARED_ALARMS));
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => {
                SHARED_ACTUATOR_COMMAND.store(&mixer.failsafe(output.as_mut(), &SHARED_ALARMS));
                break;
            }
        };

        let now_us = get_current_system_time_us();
        let dt = now_us.saturating_sub(last_update_us) as f32 / 1_000_000.0;
        last_update_us = now_us;

        if let Some(stage) = stage.as_ref() {
            actuator_desired.yaw *= stage.yaw_gain();
        }
        let inputs = MixerInputs {
            desired: actuator_desired,
            flight_status: SHARED_FLIGHT_STATUS.read(),
            manual: SHARED_MANUAL_CONTROL.read(),
            camera: SHARED_CAMERA_DESIRED.read(),
        };
        let mut command = mixer.update(&inputs, dt, output.as_mut(), &SHARED_ALARMS);

        if let Some(stage) = stage.as_mut() {
            let stage_inputs = StageInputs {
                armed: inputs.flight_status.armed,
                dt,
                servo_feedback: [None; 2],
            };
            stage.apply_to_command(&mut command, &stage_inputs);
            if let Err(error) = set_channels(output.as_mut(), &command.channel) {
                log::error!("Airframe stage output failed: {}", error);
                SHARED_ALARMS.set(SystemAlarm::Actuator, AlarmLevel::Critical);
            }
        }
        SHARED_ACTUATOR_COMMAND.store(&command);
    }
    log::info!("Actuator thread stopped");
}

fn publish_result(result: SystemIdentResult) {
    match SETTINGS_STORE.lock() {
        Ok(mut store) => {
            if result.new_tune {
                store.set_system_ident(result);
            } else {
                store.publish_system_ident_progress(result);
            }
        }
        Err(_) => {
            log::error!("Settings store poisoned, dropping autotune result");
            SHARED_ALARMS.set(SystemAlarm::Autotune, AlarmLevel::Error);
        }
    }
}

fn autotune_thread<P: SettingsPersistence>(
    task: Option<AutotuneTask>,
    mut persistence: P,
    running: &'static AtomicBool,
) -> P {
    let Some(mut task) = task else {
        log::info!("Autotune not available");
        return persistence;
    };
    let period = Duration::from_millis(AUTOTUNE_POLL_PERIOD_MS);

    while running.load(Ordering::Relaxed) {
        let flight_status = SHARED_FLIGHT_STATUS.read();
        if let Some(result) = task.step(flight_status, get_current_system_time_ms(), &mut persistence)
        {
            SHARED_TELEMETRY
                .autotune_predicts
                .store(result.num_af_predicts, Ordering::Relaxed);
            SHARED_TELEMETRY
                .autotune_spills
                .store(result.num_spilled_pts, Ordering::Relaxed);
            let level = if result.num_spilled_pts > 0 {
                AlarmLevel::Warning
            } else {
                AlarmLevel::Ok
            };
            SHARED_ALARMS.set(SystemAlarm::Autotune, level);
            publish_result(result);
        }
        SHARED_TELEMETRY
            .autotune_state
            .store(task.state() as u8, Ordering::Relaxed);
        thread::sleep(period);
    }

    // A tune finished right before shutdown is still worth keeping.
    task.step(FlightStatus::default(), get_current_system_time_ms(), &mut persistence);
    persistence
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actuator_sees_the_newest_demand_after_a_missed_wake_up() {
        let latest = AtomicActuatorDesired::new();
        let (wake_sender, wake) = mpsc::sync_channel(1);
        let timeout = Duration::from_millis(10);

        for roll in [0.1, 0.2] {
            latest.store(&ActuatorDesired {
                roll,
                ..Default::default()
            });
            let _ = wake_sender.try_send(());
        }

        let desired = next_actuator_desired(&wake, &latest, timeout).unwrap();
        assert_eq!(desired.roll, 0.2);
        assert_eq!(
            next_actuator_desired(&wake, &latest, timeout).unwrap_err(),
            RecvTimeoutError::Timeout
        );
        drop(wake_sender);
        assert_eq!(
            next_actuator_desired(&wake, &latest, timeout).unwrap_err(),
            RecvTimeoutError::Disconnected
        );
    }
}
