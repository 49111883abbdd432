use std::{
    sync::{atomic::AtomicBool, mpsc},
    thread,
    time::Duration,
};

use flight_core::{
    config::store::{InMemoryPersistence, SETTINGS_STORE},
    output::motors_state_manager::MotorsStateManager,
    shared_core_values::{
        SHARED_ACTUATOR_COMMAND, SHARED_ALARMS, SHARED_FLIGHT_STATUS, SHARED_STABILIZATION_DESIRED,
    },
    threads::start_flight_threads,
};
use shared_definitions::{
    actuator::{FlightMode, FlightStatus},
    alarms::{AlarmLevel, SystemAlarm},
    settings::MixerSettings,
    stabilization::{InertialSample, StabilizationDesired, StabilizationMode},
};

static RUNNING: AtomicBool = AtomicBool::new(false);

#[test]
fn hover_then_failsafe_when_the_gyro_stops() {
    SETTINGS_STORE
        .lock()
        .unwrap()
        .set_mixer(MixerSettings::quad_x())
        .unwrap();
    SHARED_STABILIZATION_DESIRED.store(&StabilizationDesired {
        thrust: 0.5,
        ..StabilizationDesired::with_modes([StabilizationMode::Rate; 3])
    });
    SHARED_FLIGHT_STATUS.store(&FlightStatus {
        armed: true,
        flight_mode: FlightMode::Acro,
    });

    let (gyro, samples) = mpsc::channel();
    let threads = start_flight_threads(
        samples,
        Box::new(MotorsStateManager::new()),
        InMemoryPersistence::default(),
        &RUNNING,
    )
    .unwrap();

    for _ in 0..300 {
        gyro.send(InertialSample::default()).unwrap();
        thread::sleep(Duration::from_millis(1));
    }
    let hovering = SHARED_ACTUATOR_COMMAND.read();
    for value in &hovering.channel[..4] {
        assert!(*value > 1400.0 && *value < 1600.0, "{}", value);
    }

    drop(gyro);
    let persistence = threads.join().unwrap();
    assert_eq!(persistence.save_count, 0);

    // Losing the control loop leaves the motors off.
    assert_eq!(SHARED_ACTUATOR_COMMAND.read().channel[..4], [1000.0; 4]);
    assert_eq!(SHARED_ALARMS.get(SystemAlarm::Actuator), AlarmLevel::Critical);
}
