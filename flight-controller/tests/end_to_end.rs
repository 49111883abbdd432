use flight_core::{
    autotune::ekf::{RateTorqueEkf, BIAS_LIMIT, LN_BETA_MAX, LN_BETA_MIN, TAU, TAU_MAX, TAU_MIN},
    control::stabilization::{StabilizationConfig, StabilizationCore, StabilizationTick},
    output::{
        mixer::{Mixer, MixerConfig, MixerInputs},
        motors_state_manager::MotorsStateManager,
    },
    shared_core_values::{AtomicAlarms, AtomicDshotCommand},
};
use shared_definitions::{
    actuator::{ActuatorDesired, FlightMode, FlightStatus},
    alarms::{AlarmLevel, SystemAlarm},
    settings::{ActuatorSettings, MixerChannel, MixerSettings},
    stabilization::{AirframeType, InertialSample, StabilizationDesired, StabilizationMode},
    MAX_AXES,
};

const DT: f32 = 0.001;

static DSHOT_SLOT: AtomicDshotCommand = AtomicDshotCommand::new();

const ARMED: FlightStatus = FlightStatus {
    armed: true,
    flight_mode: FlightMode::Acro,
};

#[test]
fn armed_at_zero_thrust_keeps_motors_at_minimum() {
    let mut core = StabilizationCore::new(StabilizationConfig::default(), DT);
    let mut mixer = Mixer::new(
        MixerConfig {
            mixer: MixerSettings::quad_x(),
            actuator: ActuatorSettings::default(),
            airframe_type: AirframeType::QuadX,
        },
        &DSHOT_SLOT,
    );
    let mut output = MotorsStateManager::new();
    let alarms = AtomicAlarms::new();

    let desired = StabilizationDesired::with_modes([StabilizationMode::Rate; MAX_AXES]);
    for iteration in 1..=50_u64 {
        let stabilized = core.tick(&StabilizationTick {
            desired,
            sample: InertialSample::default(),
            armed: true,
            time_us: iteration * 1000,
            ..Default::default()
        });
        assert_eq!(stabilized.actuator.thrust, 0.0);

        let inputs = MixerInputs {
            desired: stabilized.actuator,
            flight_status: ARMED,
            ..Default::default()
        };
        let command = mixer.update(&inputs, DT, &mut output, &alarms);
        for (channel, value) in command.channel[..4].iter().enumerate() {
            let minimum = ActuatorSettings::default().channels[channel].min;
            assert_eq!(*value, minimum);
        }
    }
    assert_eq!(output.values()[..4], [1000.0; 4]);
    assert_eq!(alarms.get(SystemAlarm::Actuator), AlarmLevel::Ok);
}

#[test]
fn roll_command_drives_opposed_motors_apart() {
    let mut settings = MixerSettings::default();
    settings.channels[0] = MixerChannel::motor([0, 0, 128, 0, 0]);
    settings.channels[1] = MixerChannel::motor([0, 0, -128, 0, 0]);
    let actuator = ActuatorSettings::default();
    let mut mixer = Mixer::new(
        MixerConfig {
            mixer: settings,
            actuator,
            airframe_type: AirframeType::QuadX,
        },
        &DSHOT_SLOT,
    );
    let mut output = MotorsStateManager::new();
    let alarms = AtomicAlarms::new();

    let inputs = MixerInputs {
        desired: ActuatorDesired {
            roll: 1.0,
            thrust: 0.5,
            ..Default::default()
        },
        flight_status: ARMED,
        ..Default::default()
    };
    let command = mixer.update(&inputs, DT, &mut output, &alarms);

    let (a, b) = (command.channel[0], command.channel[1]);
    assert!(a > b, "{} <= {}", a, b);
    for (channel, value) in [a, b].iter().enumerate() {
        let bounds = &actuator.channels[channel];
        assert!(*value >= bounds.min && *value <= bounds.max, "{}", value);
    }
}

#[test]
fn quiet_flight_keeps_the_estimate_at_rest() {
    let mut filter = RateTorqueEkf::default();
    let initial = filter;

    for _ in 0..1000 {
        filter.af_predict(&[0.0; MAX_AXES], &[0.0; MAX_AXES], DT);
    }

    for rate in filter.rate() {
        assert!(rate.abs() < 1e-3, "{}", rate);
    }
    for torque in &filter.x[3..6] {
        assert!(torque.abs() < 1e-3, "{}", torque);
    }
    for (ln_beta, start) in filter.ln_beta().iter().zip(initial.ln_beta()) {
        assert!((ln_beta - start).abs() < 0.1);
        assert!(*ln_beta > LN_BETA_MIN && *ln_beta < LN_BETA_MAX);
    }
    assert!((filter.x[TAU] - initial.x[TAU]).abs() < 0.1);
    assert!(filter.x[TAU] > TAU_MIN && filter.x[TAU] < TAU_MAX);
    for bias in filter.bias() {
        assert!(bias.abs() < BIAS_LIMIT);
    }
}
