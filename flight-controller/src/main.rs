use std::{
    sync::{atomic::AtomicBool, mpsc},
    thread,
    time::{Duration, Instant},
};

use flight_core::{
    config::{
        constants::{
            GYRO_SAMPLE_PERIOD_S, SYSTEM_IDENT_MEASURE_TIME_S, SYSTEM_IDENT_PREPARE_TIME_MS,
        },
        store::{InMemoryPersistence, SettingsPersistence, SETTINGS_STORE},
    },
    output::motors_state_manager::MotorsStateManager,
    shared_core_values::{
        SHARED_ACTUATOR_COMMAND, SHARED_ACTUATOR_DESIRED, SHARED_FLIGHT_STATUS,
        SHARED_STABILIZATION_DESIRED,
    },
    threads::start_flight_threads,
    util::{
        error::{FlightError, FlightResult},
        logger,
    },
};
use shared_definitions::{
    actuator::{FlightMode, FlightStatus},
    settings::MixerSettings,
    stabilization::{InertialSample, StabilizationDesired, StabilizationMode},
    system_ident::SystemIdentResult,
    MAX_AXES,
};

static RUNNING: AtomicBool = AtomicBool::new(false);

const HOVER_THRUST: f32 = 0.45;
const LANDED_SAMPLES: u32 = 1500;

/// Rigid body driven through a first order motor lag, the model autotune fits.
struct SimulatedPlant {
    gain: [f32; MAX_AXES],
    time_constant_s: f32,
    torque: [f32; MAX_AXES],
    rate: [f32; MAX_AXES],
}

impl SimulatedPlant {
    fn new() -> Self {
        Self {
            gain: [libm::expf(9.0), libm::expf(9.2), libm::expf(7.0)],
            time_constant_s: libm::expf(-3.5),
            torque: [0.0; MAX_AXES],
            rate: [0.0; MAX_AXES],
        }
    }

    fn step(&mut self, command: &[f32; MAX_AXES], dt: f32) -> InertialSample {
        for axis in 0..MAX_AXES {
            self.torque[axis] += (command[axis] - self.torque[axis]) * dt / self.time_constant_s;
            self.rate[axis] += self.gain[axis] * self.torque[axis] * dt;
        }
        InertialSample {
            gyro: self.rate,
            accel: [0.0, 0.0, -9.81],
        }
    }
}

fn configure_settings(persistence: &mut dyn SettingsPersistence) -> FlightResult<()> {
    let mut store = SETTINGS_STORE
        .lock()
        .map_err(|_| FlightError::InvalidSettings("settings store poisoned"))?;
    store.set_mixer(MixerSettings::quad_x())?;
    store.load_system_ident(persistence)?;
    Ok(())
}

/// Sends gyro samples at the nominal rate, closing the loop through the shared actuator
/// command.
fn fly(
    gyro: &mpsc::Sender<InertialSample>,
    plant: &mut SimulatedPlant,
    samples: u32,
) -> FlightResult<()> {
    let period = Duration::from_secs_f32(GYRO_SAMPLE_PERIOD_S);
    let mut next_sample = Instant::now();

    for _ in 0..samples {
        let command = SHARED_ACTUATOR_DESIRED.read().axes();
        gyro.send(plant.step(&command, GYRO_SAMPLE_PERIOD_S))
            .map_err(|_| FlightError::InvalidSettings("flight threads stopped"))?;

        next_sample += period;
        let now = Instant::now();
        if next_sample > now {
            thread::sleep(next_sample - now);
        }
    }
    Ok(())
}

fn report(result: &SystemIdentResult) {
    log::info!(
        "Identified gains {:?}, time constant {:.1} ms, hover throttle {:.2}, {} samples ({} spilled)",
        result.beta.map(libm::expf),
        libm::expf(result.tau) * 1000.0,
        result.hover_throttle,
        result.num_af_predicts,
        result.num_spilled_pts
    );
}

fn main() {
    logger::initialize_default();
    log::info!("Running simulated autotune flight");

    let mut persistence = InMemoryPersistence::default();
    if let Err(error) = configure_settings(&mut persistence) {
        log::error!("Unable to configure: {}", error);
        return;
    }

    let (gyro_sender, gyro_receiver) = mpsc::channel();
    let threads = match start_flight_threads(
        gyro_receiver,
        Box::new(MotorsStateManager::new()),
        persistence,
        &RUNNING,
    ) {
        Ok(threads) => threads,
        Err(error) => {
            log::error!("{}", error);
            return;
        }
    };

    SHARED_STABILIZATION_DESIRED.store(&StabilizationDesired {
        thrust: HOVER_THRUST,
        ..StabilizationDesired::with_modes([StabilizationMode::SystemIdentRate; MAX_AXES])
    });
    SHARED_FLIGHT_STATUS.store(&FlightStatus {
        armed: true,
        flight_mode: FlightMode::Autotune,
    });

    let flight_time_s = SYSTEM_IDENT_PREPARE_TIME_MS as f32 / 1000.0 + SYSTEM_IDENT_MEASURE_TIME_S + 1.0;
    let mut plant = SimulatedPlant::new();
    let flight = fly(
        &gyro_sender,
        &mut plant,
        (flight_time_s / GYRO_SAMPLE_PERIOD_S) as u32,
    )
    .and_then(|_| {
        log::info!("Landing, outputs {:?}", SHARED_ACTUATOR_COMMAND.read().channel);
        SHARED_FLIGHT_STATUS.store(&FlightStatus {
            armed: false,
            flight_mode: FlightMode::Autotune,
        });
        fly(&gyro_sender, &mut plant, LANDED_SAMPLES)
    });
    if let Err(error) = flight {
        log::error!("Flight aborted: {}", error);
    }

    drop(gyro_sender);
    let Some(mut persistence) = threads.join() else {
        return;
    };

    match persistence.load_system_ident() {
        Ok(Some(result)) => report(&result),
        Ok(None) => log::warn!("No tune was saved"),
        Err(error) => log::error!("{}", error),
    }
}
