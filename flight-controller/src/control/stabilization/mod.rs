//! Per-axis control law dispatch, run once per gyro sample.

pub mod attitude_error;
pub mod system_ident;

use libm::{cosf, expf, sinf};
use shared_definitions::{
    actuator::{ActuatorDesired, CameraDesired},
    alarms::AlarmLevel,
    settings::{StabilizationSettings, SubTrimSettings, VbarSettings},
    stabilization::{
        AirframeType, AttitudeActual, InertialSample, ReprojectionMode, StabilizationDesired,
        StabilizationMode,
    },
    system_ident::SystemIdentResult,
    MAX_AXES, PITCH, ROLL, YAW,
};

use self::{
    attitude_error::{calculate_attitude_errors, AttitudeError},
    system_ident::{excitation_scales, SystemIdentExcitation},
};
use super::{
    pid::PID,
    virtual_flybar::{vbar_pid_gains, DecayingFlybar, VirtualFlybar},
};
use crate::{
    config::constants::{
        COORDINATED_FLIGHT_MAX_YAW_THRESHOLD, COORDINATED_FLIGHT_MIN_ROLL_THRESHOLD,
        DYNAMIC_RATE_GYRO_HEADROOM, EXCITATION_REFERENCE_BETA, FAILSAFE_FIXED_WING_ROLL_DEG,
        FAILSAFE_FIXED_WING_YAW_RATE, HOLD_OPEN_THRUST, LOOP_FREQUENCY_TOLERANCE,
        LOOP_PERIOD_AVERAGE_END, LOOP_PERIOD_AVERAGE_START, MAX_EXCITATION_SCALE,
        MAX_GYRO_RATE_DEG,
    },
    util::math::{
        misc::{bound_sym, circular_modulus_deg, expo_m, CubicDeadband},
        vectors::RotationVector3D,
    },
};

/// Everything the core caches from the settings store.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct StabilizationConfig {
    pub stabilization: StabilizationSettings,
    pub vbar: VbarSettings,
    pub sub_trim: SubTrimSettings,
    pub airframe_type: AirframeType,
    pub system_ident: SystemIdentResult,
}

/// Inputs of one tick.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct StabilizationTick {
    pub desired: StabilizationDesired,
    pub attitude: AttitudeActual,
    pub sample: InertialSample,
    pub armed: bool,
    pub camera: Option<CameraDesired>,
    /// Throttle stick, used instead of thrust for collective pitch helicopters.
    pub manual_throttle: f32,
    pub time_us: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct StabilizationOutput {
    pub actuator: ActuatorDesired,
    /// Inner loop setpoints in deg/s.
    pub rate_desired: RotationVector3D,
    pub alarm: AlarmLevel,
}

struct AxisControllers {
    rate: PID,
    attitude: PID,
    /// Holds the flybar angle in VirtualBar mode.
    vbar: PID,
    /// Attitude mode axis: the decoded mode it ran last tick, `None` to force a re-init.
    previous_mode: Option<StabilizationMode>,
    axis_lock_accumulator: f32,
    max_rate_filtered: f32,
}

impl AxisControllers {
    fn new() -> Self {
        Self {
            rate: PID::default(),
            attitude: PID::default(),
            vbar: PID::default(),
            previous_mode: None,
            axis_lock_accumulator: 0.0,
            max_rate_filtered: 0.0,
        }
    }
}

/// Stabilization state carried from tick to tick.
pub struct StabilizationCore<F: VirtualFlybar = DecayingFlybar> {
    config: StabilizationConfig,
    axes: [AxisControllers; MAX_AXES],
    coordinated_flight_yaw: PID,
    flybar: F,
    deadbands: Option<[CubicDeadband; MAX_AXES]>,
    excitation_scale: [f32; MAX_AXES],
    system_ident: SystemIdentExcitation,
    dt_expected: f32,
    max_rate_alpha: f32,
    iteration: u32,
    previous_time_us: Option<u64>,
    loop_period_sum: f32,
    frequency_wrong: bool,
    last_positive_thrust_us: Option<u64>,
    previous_reprojection: Option<ReprojectionMode>,
    reference_yaw: f32,
    previous_output: [f32; MAX_AXES],
}

impl StabilizationCore<DecayingFlybar> {
    pub fn new(config: StabilizationConfig, dt_expected: f32) -> Self {
        Self::with_flybar(config, dt_expected, DecayingFlybar::default())
    }
}

impl<F: VirtualFlybar> StabilizationCore<F> {
    pub fn with_flybar(config: StabilizationConfig, dt_expected: f32, flybar: F) -> Self {
        let mut core = Self {
            config,
            axes: [AxisControllers::new(), AxisControllers::new(), AxisControllers::new()],
            coordinated_flight_yaw: PID::default(),
            flybar,
            deadbands: None,
            excitation_scale: [0.0; MAX_AXES],
            system_ident: SystemIdentExcitation::new(dt_expected),
            dt_expected,
            max_rate_alpha: 0.8,
            iteration: 0,
            previous_time_us: None,
            loop_period_sum: 0.0,
            frequency_wrong: false,
            last_positive_thrust_us: None,
            previous_reprojection: None,
            reference_yaw: 0.0,
            previous_output: [0.0; MAX_AXES],
        };
        core.update_settings(config);
        core
    }

    /// Reconfigures gains and the derived constants. Integrator state is kept.
    pub fn update_settings(&mut self, config: StabilizationConfig) {
        self.config = config;
        let settings = &config.stabilization;

        for axis in 0..MAX_AXES {
            let controllers = &mut self.axes[axis];
            controllers.rate.configure(&settings.rate_pid[axis]);
            controllers.attitude.configure(&settings.attitude_pi[axis]);
            controllers.vbar.configure(&vbar_pid_gains(&config.vbar, axis));
            // Outer loops have no derivative term.
            controllers.attitude.configure_derivative(0.0, 1.0);
            controllers
                .rate
                .configure_derivative(settings.derivative_cutoff, settings.derivative_gamma);
        }
        self.coordinated_flight_yaw
            .configure(&settings.coordinated_flight_yaw_pi);

        self.deadbands = if settings.deadband_width.iter().any(|width| *width != 0) {
            let mut deadbands = [CubicDeadband::default(); MAX_AXES];
            for axis in 0..MAX_AXES {
                deadbands[axis] = CubicDeadband::new(
                    settings.deadband_width[axis] as f32,
                    0.01 * settings.deadband_slope[axis] as f32,
                );
            }
            Some(deadbands)
        } else {
            None
        };

        self.max_rate_alpha = expf(-self.dt_expected / settings.acro_dynamic_tau);
        let vbar_decay = if config.vbar.tau < 0.001 {
            0.0
        } else {
            expf(-self.dt_expected / config.vbar.tau)
        };
        self.flybar.set_decay(vbar_decay);

        self.excitation_scale = excitation_scales(
            &settings.autotune_actuation_effort,
            &config.system_ident.beta,
            config.system_ident.num_af_predicts > 0,
            EXCITATION_REFERENCE_BETA,
            MAX_EXCITATION_SCALE,
        );

        log::info!(
            "Stabilization settings loaded, excitation scale {:?}",
            self.excitation_scale
        );
    }

    pub fn frequency_wrong(&self) -> bool {
        self.frequency_wrong
    }

    /// Integrator of the rate loop, for inspection.
    pub fn rate_integral(&self, axis: usize) -> f32 {
        self.axes[axis].rate.get_integral()
    }

    pub fn attitude_integral(&self, axis: usize) -> f32 {
        self.axes[axis].attitude.get_integral()
    }

    /// Flybar angle of the VirtualBar loop, in degrees.
    pub fn flybar_angle(&self, axis: usize) -> f32 {
        self.axes[axis].vbar.integrated_error()
    }

    fn measure_loop_period(&mut self, time_us: u64) -> f32 {
        let dt = match self.previous_time_us {
            Some(previous) => time_us.saturating_sub(previous) as f32 * 1.0e-6,
            None => self.dt_expected,
        };
        self.previous_time_us = Some(time_us);

        if self.iteration < LOOP_PERIOD_AVERAGE_START {
            self.loop_period_sum = 0.0;
        } else if self.iteration < LOOP_PERIOD_AVERAGE_END {
            self.loop_period_sum += dt;
        } else if self.iteration == LOOP_PERIOD_AVERAGE_END {
            let average =
                self.loop_period_sum / (LOOP_PERIOD_AVERAGE_END - LOOP_PERIOD_AVERAGE_START) as f32;
            if average > self.dt_expected * (1.0 + LOOP_FREQUENCY_TOLERANCE)
                || average < self.dt_expected * (1.0 - LOOP_FREQUENCY_TOLERANCE)
            {
                self.frequency_wrong = true;
                log::warn!(
                    "Loop frequency wrong, measured period {} s, expected {} s",
                    average,
                    self.dt_expected
                );
            }
        }
        dt
    }

    /// Keeps a barely positive thrust for a while after the stick went to zero, so the mixer
    /// keeps stabilizing through short throttle cuts.
    fn hold_open_thrust(&mut self, thrust: f32, time_us: u64, armed: bool) -> f32 {
        if !armed {
            self.last_positive_thrust_us = None;
        }
        let max_time_s = self.config.stabilization.low_power_stabilization_max_time;

        if thrust > HOLD_OPEN_THRUST {
            if max_time_s > 0.0 {
                self.last_positive_thrust_us = Some(time_us);
            }
            return thrust;
        }

        match self.last_positive_thrust_us {
            Some(last) if (time_us.saturating_sub(last) as f32) < max_time_s * 1.0e6 => {
                HOLD_OPEN_THRUST
            }
            _ => {
                self.last_positive_thrust_us = None;
                0.0
            }
        }
    }

    fn reproject(&mut self, desired: &mut StabilizationDesired, attitude: &AttitudeActual) {
        match desired.reprojection {
            ReprojectionMode::CameraAngle => {
                let tilt = self.config.stabilization.camera_tilt;
                if tilt != 0.0 {
                    let (c, s) = (cosf(tilt.to_radians()), sinf(tilt.to_radians()));
                    let (roll, yaw) = (desired.roll, desired.yaw);
                    desired.roll = c * roll + s * yaw;
                    desired.yaw = -s * roll + c * yaw;
                }
            }
            ReprojectionMode::HeadFree => {
                if self.previous_reprojection != Some(ReprojectionMode::HeadFree) {
                    self.reference_yaw = attitude.yaw;
                }
                let rotation = (attitude.yaw - self.reference_yaw).to_radians();
                let (c, s) = (cosf(rotation), sinf(rotation));
                let (roll, pitch) = (desired.roll, desired.pitch);
                desired.roll = c * roll + s * pitch;
                desired.pitch = c * pitch - s * roll;
            }
            ReprojectionMode::None => {}
        }
        self.previous_reprojection = Some(desired.reprojection);
    }

    /// Resolves failsafe axes into their leveling or descending-turn replacement.
    fn failsafe_checks(
        &self,
        desired: &StabilizationDesired,
        thrust: &mut f32,
    ) -> ([f32; MAX_AXES], [Result<StabilizationMode, u8>; MAX_AXES]) {
        let settings = &self.config.stabilization;
        let fixed_wing = self.config.airframe_type.is_fixed_wing();
        let mut inputs = desired.axes();
        let mut modes = desired.mode.map(StabilizationMode::try_from);

        for axis in 0..MAX_AXES {
            if modes[axis] != Ok(StabilizationMode::Failsafe) {
                continue;
            }
            // Rotorcraft drop; planes glide down in a gentle turn.
            *thrust = if fixed_wing { -1.0 } else { 0.0 };
            let (mode, input) = match (axis, fixed_wing) {
                (ROLL, true) => (
                    StabilizationMode::Attitude,
                    FAILSAFE_FIXED_WING_ROLL_DEG / settings.roll_max,
                ),
                (YAW, true) => (
                    StabilizationMode::Rate,
                    FAILSAFE_FIXED_WING_YAW_RATE / settings.manual_rate[YAW],
                ),
                (YAW, false) => (StabilizationMode::Rate, 0.0),
                _ => (StabilizationMode::Attitude, 0.0),
            };
            modes[axis] = Ok(mode);
            inputs[axis] = input;
        }
        (inputs, modes)
    }

    pub fn tick(&mut self, input: &StabilizationTick) -> StabilizationOutput {
        self.iteration = self.iteration.wrapping_add(1);
        let dt = self.measure_loop_period(input.time_us);
        let dt_expected = self.dt_expected;
        let mut error = self.frequency_wrong;

        let mut actuator = ActuatorDesired {
            thrust: self.hold_open_thrust(input.desired.thrust, input.time_us, input.armed),
            flip_over_thrust_mode: input.desired.flip_over_thrust_mode,
            ..Default::default()
        };

        let mut desired = input.desired;
        self.reproject(&mut desired, &input.attitude);

        let (sticks, raw_modes) = self.failsafe_checks(&desired, &mut actuator.thrust);
        let modes = raw_modes.map(|mode| mode.ok());

        let AttitudeError {
            error: attitude_error,
            horizon_rate_fraction,
        } = calculate_attitude_errors(
            &modes,
            &sticks,
            &input.attitude,
            &self.config.stabilization,
            &self.config.sub_trim,
        );

        let settings = self.config.stabilization;
        let gyro = input.sample.gyro;
        let max_safe_rate = MAX_GYRO_RATE_DEG * DYNAMIC_RATE_GYRO_HEADROOM;
        let mut output = [0.0_f32; MAX_AXES];
        let mut rate_desired = RotationVector3D::default();

        for axis in 0..MAX_AXES {
            let Some(mode) = modes[axis] else {
                // Unknown modes zero the axis instead of replaying a stale output.
                if let Err(raw) = raw_modes[axis] {
                    log::error!("Axis {} requested unknown stabilization mode {}", axis, raw);
                }
                error = true;
                self.axes[axis].previous_mode = None;
                continue;
            };

            let reinit = self.axes[axis].previous_mode != Some(mode);
            self.axes[axis].previous_mode = Some(mode);
            let stick = sticks[axis];
            let deadband = self.deadbands.as_ref().map(|deadbands| &deadbands[axis]);
            let controllers = &mut self.axes[axis];

            let axis_output = match mode {
                // Replaced by the failsafe checks above.
                StabilizationMode::Failsafe => 0.0,

                StabilizationMode::Rate => {
                    if reinit {
                        controllers.rate.zero_integral();
                    }
                    rate_desired[axis] = bound_sym(
                        stick * settings.manual_rate[axis],
                        settings.manual_rate[axis],
                    );
                    controllers
                        .rate
                        .update(rate_desired[axis], gyro[axis], dt_expected, deadband)
                }

                StabilizationMode::AcroDyne => {
                    if reinit {
                        controllers.rate.zero_integral();
                        controllers.max_rate_filtered = settings.manual_rate[axis];
                    }
                    let curve = expo_m(
                        stick,
                        settings.rate_expo[axis] as f32,
                        settings.rate_exponent[axis] as f32 * 0.1,
                    );
                    let break_point = settings.acro_dynamic_transition[axis] as f32 / 100.0;
                    let manual_rate = settings.manual_rate[axis];
                    let mut dynamic_rate = settings.acro_dynamic_rate[axis];
                    if dynamic_rate == 0.0 {
                        dynamic_rate = manual_rate * 1.5;
                    }
                    dynamic_rate = dynamic_rate.min(max_safe_rate);

                    let command = stick.abs();
                    let mut max_rate = manual_rate;
                    if command > break_point {
                        max_rate = (manual_rate * (command - 1.0) * (2.0 * break_point - command - 1.0)
                            + dynamic_rate * (break_point - command) * (break_point - command))
                            / ((break_point - 1.0) * (break_point - 1.0));
                    }
                    max_rate = max_rate.min(dynamic_rate);

                    controllers.max_rate_filtered = controllers.max_rate_filtered * self.max_rate_alpha
                        + max_rate * (1.0 - self.max_rate_alpha);
                    rate_desired[axis] = bound_sym(
                        curve * controllers.max_rate_filtered,
                        controllers.max_rate_filtered,
                    );
                    controllers
                        .rate
                        .update(rate_desired[axis], gyro[axis], dt_expected, deadband)
                }

                StabilizationMode::AcroPlus => {
                    if reinit {
                        controllers.rate.zero_integral();
                    }
                    let factor = stick.abs() * settings.acro_insanity_factor / 100.0;
                    rate_desired[axis] = bound_sym(
                        stick * settings.manual_rate[axis],
                        settings.manual_rate[axis],
                    );
                    // Snap maneuvers would wind the integrator up.
                    if (axis != YAW && gyro[axis].abs() > settings.acro_zero_integral_gyro)
                        || (axis == ROLL && stick.abs() > settings.acro_zero_integral_stick / 100.0)
                    {
                        controllers.rate.zero_integral();
                    }
                    let pid_output =
                        controllers
                            .rate
                            .update(rate_desired[axis], gyro[axis], dt_expected, deadband);
                    factor * stick + (1.0 - factor) * pid_output
                }

                StabilizationMode::Attitude => {
                    if reinit {
                        controllers.attitude.zero_integral();
                        controllers.rate.zero_integral();
                    }
                    rate_desired[axis] = bound_sym(
                        controllers.attitude.apply(attitude_error[axis], dt_expected),
                        settings.maximum_rate[axis],
                    );
                    controllers
                        .rate
                        .update(rate_desired[axis], gyro[axis], dt_expected, deadband)
                }

                StabilizationMode::VirtualBar => {
                    if reinit {
                        controllers.vbar.reset();
                    }
                    rate_desired[axis] = stick;
                    self.flybar.apply(
                        &mut controllers.vbar,
                        axis,
                        gyro[axis],
                        stick,
                        dt_expected,
                        &self.config.vbar,
                    )
                }

                StabilizationMode::WeakLeveling => {
                    if reinit {
                        controllers.rate.zero_integral();
                    }
                    let leveling = bound_sym(
                        attitude_error[axis] * settings.weak_leveling_kp,
                        settings.max_weak_leveling_rate,
                    );
                    rate_desired[axis] = stick * settings.manual_rate[axis] + leveling;
                    controllers
                        .rate
                        .update(rate_desired[axis], gyro[axis], dt_expected, deadband)
                }

                StabilizationMode::AxisLock => {
                    if reinit {
                        controllers.rate.zero_integral();
                    }
                    let requested_rate = stick * settings.manual_rate[axis];
                    if requested_rate.abs() > settings.max_axis_lock_rate {
                        // Deliberate input flies like rate mode.
                        rate_desired[axis] = bound_sym(requested_rate, settings.manual_rate[axis]);
                        controllers.axis_lock_accumulator = 0.0;
                    } else {
                        controllers.axis_lock_accumulator = bound_sym(
                            controllers.axis_lock_accumulator
                                + (requested_rate - gyro[axis]) * dt_expected,
                            settings.max_axis_lock,
                        );
                        rate_desired[axis] = bound_sym(
                            controllers
                                .attitude
                                .apply(controllers.axis_lock_accumulator, dt_expected),
                            settings.maximum_rate[axis],
                        );
                    }
                    controllers
                        .rate
                        .update(rate_desired[axis], gyro[axis], dt_expected, deadband)
                }

                StabilizationMode::Horizon => {
                    if reinit {
                        controllers.rate.zero_integral();
                    }
                    // The outer loop is often disengaged here and must not wind up.
                    controllers.attitude.zero_integral();
                    let attitude_rate = controllers.attitude.apply(attitude_error[axis], dt_expected);
                    let stick_rate = stick * settings.manual_rate[axis];
                    rate_desired[axis] = bound_sym(
                        attitude_rate * (1.0 - horizon_rate_fraction)
                            + stick_rate * horizon_rate_fraction,
                        settings.manual_rate[axis],
                    );
                    controllers
                        .rate
                        .update(rate_desired[axis], gyro[axis], dt_expected, deadband)
                }

                StabilizationMode::SystemIdent | StabilizationMode::SystemIdentRate => {
                    if reinit {
                        controllers.attitude.zero_integral();
                        controllers.rate.zero_integral();
                    }
                    self.system_ident.prepare_axis(
                        axis,
                        reinit,
                        self.iteration,
                        input.time_us,
                        input.armed,
                    );

                    rate_desired[axis] = if mode == StabilizationMode::SystemIdent {
                        bound_sym(
                            controllers.attitude.apply(attitude_error[axis], dt_expected),
                            settings.maximum_rate[axis],
                        )
                    } else {
                        bound_sym(
                            stick * settings.manual_rate[axis],
                            settings.manual_rate[axis],
                        )
                    };
                    let mut law_output =
                        controllers
                            .rate
                            .update(rate_desired[axis], gyro[axis], dt_expected, deadband);

                    if let Some((cycle, offset)) =
                        self.system_ident
                            .excite(axis, self.iteration, self.excitation_scale[axis])
                    {
                        actuator.system_ident_cycle = Some(cycle);
                        law_output += offset;
                    }
                    law_output
                }

                StabilizationMode::CoordinatedFlight => {
                    if axis != YAW || modes[ROLL] != Some(StabilizationMode::Attitude) {
                        error = true;
                        continue;
                    }
                    if reinit {
                        self.coordinated_flight_yaw.zero_integral();
                        controllers.rate.zero_integral();
                        controllers.axis_lock_accumulator = 0.0;
                    }

                    let requested_roll_deg = desired.roll * settings.roll_max;
                    if desired.yaw.abs() < COORDINATED_FLIGHT_MAX_YAW_THRESHOLD {
                        if requested_roll_deg.abs() > COORDINATED_FLIGHT_MIN_ROLL_THRESHOLD {
                            // A roll against the last rudder means the turn direction changed.
                            let previous_yaw = self.previous_output[YAW];
                            if (requested_roll_deg > 0.0 && previous_yaw < 0.0)
                                || (requested_roll_deg < 0.0 && previous_yaw > 0.0)
                            {
                                self.coordinated_flight_yaw.zero_integral();
                            }
                            // Coordinated means no lateral acceleration in body frame.
                            let slip_error = -input.sample.accel[1];
                            let command = self.coordinated_flight_yaw.apply(slip_error, dt_expected);
                            controllers.rate.zero_integral();
                            controllers.axis_lock_accumulator = 0.0;
                            command
                        } else {
                            controllers.axis_lock_accumulator += -gyro[YAW] * dt_expected;
                            rate_desired[YAW] = bound_sym(
                                controllers
                                    .attitude
                                    .apply(controllers.axis_lock_accumulator, dt_expected),
                                settings.maximum_rate[YAW],
                            );
                            let command =
                                controllers
                                    .rate
                                    .update(rate_desired[YAW], gyro[YAW], dt_expected, None);
                            self.coordinated_flight_yaw.zero_integral();
                            command
                        }
                    } else {
                        self.coordinated_flight_yaw.zero_integral();
                        controllers.rate.zero_integral();
                        controllers.axis_lock_accumulator = 0.0;
                        stick
                    }
                }

                StabilizationMode::Poi => {
                    if reinit {
                        controllers.attitude.zero_integral();
                        controllers.rate.zero_integral();
                    }
                    let angle_error = match input.camera {
                        Some(camera) => match axis {
                            ROLL => circular_modulus_deg(
                                camera.roll * POI_ROLL_TRACKING_FRACTION - input.attitude.roll,
                            ),
                            PITCH => {
                                circular_modulus_deg(camera.declination - input.attitude.pitch)
                            }
                            _ => circular_modulus_deg(camera.bearing - input.attitude.yaw),
                        },
                        None => {
                            error = true;
                            0.0
                        }
                    };
                    rate_desired[axis] = bound_sym(
                        controllers.attitude.apply(angle_error, dt_expected),
                        settings.poi_maximum_rate[axis],
                    );
                    controllers
                        .rate
                        .update(rate_desired[axis], gyro[axis], dt_expected, deadband)
                }

                StabilizationMode::Disabled => 0.0,
                StabilizationMode::Manual => stick,
            };

            output[axis] = bound_sym(axis_output, 1.0);
        }

        if self.config.vbar.piro_comp {
            let [roll, pitch, _] = &mut self.axes;
            self.flybar
                .piro_compensate(&mut roll.vbar, &mut pitch.vbar, gyro[YAW], dt_expected);
        }

        actuator.set_axes(output);
        actuator.update_time = dt * 1000.0;
        self.previous_output = output;

        let throttle = match self.config.airframe_type {
            AirframeType::HeliCp => input.manual_throttle,
            _ => actuator.thrust,
        };
        if !input.armed || (settings.low_throttle_zero_integral && throttle < 0.0) {
            // Every axis re-initializes once engaged again.
            for controllers in self.axes.iter_mut() {
                controllers.previous_mode = None;
            }
        }

        StabilizationOutput {
            actuator,
            rate_desired,
            alarm: if error {
                AlarmLevel::Error
            } else {
                AlarmLevel::Ok
            },
        }
    }
}

/// Share of the camera roll target followed by the airframe in POI mode.
const POI_ROLL_TRACKING_FRACTION: f32 = 0.0;

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 0.001;

    fn new_core() -> StabilizationCore {
        StabilizationCore::new(StabilizationConfig::default(), DT)
    }

    fn tick_with(
        modes: [StabilizationMode; 3],
        sticks: [f32; 3],
        gyro: [f32; 3],
        iteration: u64,
    ) -> StabilizationTick {
        let mut desired = StabilizationDesired::with_modes(modes);
        desired.roll = sticks[0];
        desired.pitch = sticks[1];
        desired.yaw = sticks[2];
        desired.thrust = 0.5;
        StabilizationTick {
            desired,
            sample: InertialSample {
                gyro,
                accel: [0.0, 0.0, -9.81],
            },
            armed: true,
            time_us: iteration * 1000,
            ..Default::default()
        }
    }

    #[test]
    fn manual_and_disabled_laws() {
        let mut core = new_core();
        let out = core.tick(&tick_with(
            [
                StabilizationMode::Manual,
                StabilizationMode::Disabled,
                StabilizationMode::Manual,
            ],
            [0.4, 0.9, -3.0],
            [0.0; 3],
            1,
        ));
        assert_eq!(out.actuator.roll, 0.4);
        assert_eq!(out.actuator.pitch, 0.0);
        assert_eq!(out.actuator.yaw, -1.0);
        assert_eq!(out.alarm, AlarmLevel::Ok);
        assert_eq!(out.actuator.system_ident_cycle, None);
    }

    #[test]
    fn rate_law_pushes_towards_stick() {
        let mut core = new_core();
        let out = core.tick(&tick_with([StabilizationMode::Rate; 3], [0.5, -0.5, 0.0], [0.0; 3], 1));
        assert!(out.actuator.roll > 0.0);
        assert!(out.actuator.pitch < 0.0);
        assert_eq!(out.rate_desired.roll, 75.0);
    }

    #[test]
    fn mode_switch_zeroes_integrators() {
        let mut core = new_core();
        for i in 1..200 {
            core.tick(&tick_with([StabilizationMode::Rate; 3], [0.5, 0.0, 0.0], [0.0; 3], i));
        }
        assert!(core.rate_integral(ROLL) > 0.0);

        core.tick(&tick_with(
            [
                StabilizationMode::Attitude,
                StabilizationMode::Rate,
                StabilizationMode::Rate,
            ],
            [0.0, 0.0, 0.0],
            [0.0; 3],
            200,
        ));
        // Level attitude with a centered stick: no error accumulated since the switch.
        assert_eq!(core.rate_integral(ROLL), 0.0);
    }

    #[test]
    fn disarm_forces_reinit() {
        let mut core = new_core();
        for i in 1..100 {
            core.tick(&tick_with([StabilizationMode::Rate; 3], [0.5, 0.0, 0.0], [0.0; 3], i));
        }
        let before = core.rate_integral(ROLL);
        let mut disarmed = tick_with([StabilizationMode::Rate; 3], [0.5, 0.0, 0.0], [0.0; 3], 100);
        disarmed.armed = false;
        core.tick(&disarmed);
        core.tick(&tick_with([StabilizationMode::Rate; 3], [0.5, 0.0, 0.0], [0.0; 3], 101));
        assert!(core.rate_integral(ROLL) < before);
    }

    #[test]
    fn unknown_mode_raises_error_and_zeroes_axis() {
        let mut core = new_core();
        let mut tick = tick_with([StabilizationMode::Manual; 3], [0.7, 0.7, 0.7], [0.0; 3], 1);
        tick.desired.mode[PITCH] = 200;
        let out = core.tick(&tick);
        assert_eq!(out.alarm, AlarmLevel::Error);
        assert_eq!(out.actuator.pitch, 0.0);
        assert_eq!(out.actuator.roll, 0.7);
    }

    #[test]
    fn coordinated_flight_requires_roll_attitude() {
        let mut core = new_core();
        let out = core.tick(&tick_with(
            [
                StabilizationMode::Rate,
                StabilizationMode::Rate,
                StabilizationMode::CoordinatedFlight,
            ],
            [0.0; 3],
            [0.0; 3],
            1,
        ));
        assert_eq!(out.alarm, AlarmLevel::Error);

        let out = core.tick(&tick_with(
            [
                StabilizationMode::CoordinatedFlight,
                StabilizationMode::Rate,
                StabilizationMode::Rate,
            ],
            [0.0; 3],
            [0.0; 3],
            2,
        ));
        assert_eq!(out.alarm, AlarmLevel::Error);
    }

    #[test]
    fn coordinated_flight_passes_yaw_stick_through() {
        let mut core = new_core();
        let out = core.tick(&tick_with(
            [
                StabilizationMode::Attitude,
                StabilizationMode::Attitude,
                StabilizationMode::CoordinatedFlight,
            ],
            [0.0, 0.0, 0.6],
            [0.0; 3],
            1,
        ));
        assert_eq!(out.alarm, AlarmLevel::Ok);
        assert_eq!(out.actuator.yaw, 0.6);
    }

    #[test]
    fn coordinated_flight_counters_slip() {
        let mut core = new_core();
        let mut tick = tick_with(
            [
                StabilizationMode::Attitude,
                StabilizationMode::Attitude,
                StabilizationMode::CoordinatedFlight,
            ],
            [0.5, 0.0, 0.0],
            [0.0; 3],
            1,
        );
        tick.sample.accel[1] = 2.0;
        let out = core.tick(&tick);
        assert!(out.actuator.yaw < 0.0);
    }

    #[test]
    fn rotorcraft_failsafe_levels_and_cuts_thrust() {
        let mut core = new_core();
        let mut tick = tick_with([StabilizationMode::Failsafe; 3], [0.9, 0.9, 0.9], [0.0; 3], 1);
        tick.attitude = AttitudeActual::default();
        let out = core.tick(&tick);
        assert_eq!(out.actuator.thrust, 0.0);
        assert!(out.actuator.roll.abs() < 1e-6);
        assert!(out.actuator.yaw.abs() < 1e-6);
        assert_eq!(out.rate_desired.yaw, 0.0);
    }

    #[test]
    fn fixed_wing_failsafe_turns_while_descending() {
        let config = StabilizationConfig {
            airframe_type: AirframeType::FixedWing,
            ..Default::default()
        };
        let mut core = StabilizationCore::new(config, DT);
        let out = core.tick(&tick_with([StabilizationMode::Failsafe; 3], [0.0; 3], [0.0; 3], 1));
        assert_eq!(out.actuator.thrust, -1.0);
        assert!((out.rate_desired.yaw - FAILSAFE_FIXED_WING_YAW_RATE).abs() < 1e-4);
        assert!(out.rate_desired.roll < 0.0);
    }

    #[test]
    fn hold_open_keeps_thrust_barely_positive() {
        let mut core = new_core();
        core.tick(&tick_with([StabilizationMode::Rate; 3], [0.0; 3], [0.0; 3], 1));

        let mut cut = tick_with([StabilizationMode::Rate; 3], [0.0; 3], [0.0; 3], 500);
        cut.desired.thrust = 0.0;
        assert_eq!(core.tick(&cut).actuator.thrust, HOLD_OPEN_THRUST);

        cut.time_us = 1_200_000;
        assert_eq!(core.tick(&cut).actuator.thrust, 0.0);
        cut.time_us = 1_201_000;
        assert_eq!(core.tick(&cut).actuator.thrust, 0.0);
    }

    #[test]
    fn hold_open_is_cleared_by_disarm() {
        let mut core = new_core();
        core.tick(&tick_with([StabilizationMode::Rate; 3], [0.0; 3], [0.0; 3], 1));
        let mut cut = tick_with([StabilizationMode::Rate; 3], [0.0; 3], [0.0; 3], 2);
        cut.desired.thrust = 0.0;
        cut.armed = false;
        assert_eq!(core.tick(&cut).actuator.thrust, 0.0);
        cut.armed = true;
        cut.time_us = 3000;
        assert_eq!(core.tick(&cut).actuator.thrust, 0.0);
    }

    #[test]
    fn camera_tilt_mixes_roll_into_yaw() {
        let mut config = StabilizationConfig::default();
        config.stabilization.camera_tilt = 90.0;
        let mut core = StabilizationCore::new(config, DT);
        let mut tick = tick_with([StabilizationMode::Manual; 3], [0.5, 0.0, 0.0], [0.0; 3], 1);
        tick.desired.reprojection = ReprojectionMode::CameraAngle;
        let out = core.tick(&tick);
        assert!(out.actuator.roll.abs() < 1e-6);
        assert!((out.actuator.yaw + 0.5).abs() < 1e-6);
    }

    #[test]
    fn headfree_rotates_by_yaw_since_engaged() {
        let mut core = new_core();
        let mut tick = tick_with([StabilizationMode::Manual; 3], [0.0, 0.5, 0.0], [0.0; 3], 1);
        tick.desired.reprojection = ReprojectionMode::HeadFree;
        tick.attitude.yaw = 30.0;
        let out = core.tick(&tick);
        assert!((out.actuator.pitch - 0.5).abs() < 1e-6);

        tick.attitude.yaw = 120.0;
        tick.time_us = 2000;
        let out = core.tick(&tick);
        assert!((out.actuator.roll - 0.5).abs() < 1e-5);
        assert!(out.actuator.pitch.abs() < 1e-5);
    }

    #[test]
    fn system_ident_publishes_cycle_after_prepare_time() {
        let mut core = new_core();
        let modes = [
            StabilizationMode::SystemIdentRate,
            StabilizationMode::SystemIdentRate,
            StabilizationMode::SystemIdentRate,
        ];
        let mut saw_cycle = false;
        let mut max_yaw: f32 = 0.0;
        for i in 1..3000 {
            let out = core.tick(&tick_with(modes, [0.0; 3], [0.0; 3], i));
            if out.actuator.system_ident_cycle.is_some() {
                saw_cycle = true;
                max_yaw = max_yaw.max(out.actuator.yaw.abs());
            }
            if i < 1250 {
                assert_eq!(out.actuator.system_ident_cycle, None);
            }
        }
        assert!(saw_cycle);
        assert!(max_yaw >= 0.09);
    }

    #[test]
    fn frequency_check_flags_slow_loops() {
        let mut core = new_core();
        let mut out = StabilizationOutput::default();
        for i in 1..=2100_u64 {
            out = core.tick(&tick_with([StabilizationMode::Manual; 3], [0.0; 3], [0.0; 3], i * 2));
        }
        assert!(core.frequency_wrong());
        assert_eq!(out.alarm, AlarmLevel::Error);

        let mut nominal = new_core();
        for i in 1..=2100_u64 {
            nominal.tick(&tick_with([StabilizationMode::Manual; 3], [0.0; 3], [0.0; 3], i));
        }
        assert!(!nominal.frequency_wrong());
    }

    #[test]
    fn acro_dyne_rate_grows_past_transition() {
        let mut core = new_core();
        let mut out = StabilizationOutput::default();
        for i in 1..2000 {
            out = core.tick(&tick_with([StabilizationMode::AcroDyne; 3], [1.0, 0.4, 0.0], [0.0; 3], i));
        }
        let manual = StabilizationSettings::default().manual_rate;
        assert!(out.rate_desired.roll > manual[ROLL] * 1.4);
        assert!(out.rate_desired.pitch < manual[PITCH] * 0.5);
    }

    #[test]
    fn horizon_blends_to_rate_at_full_stick() {
        let mut core = new_core();
        let out = core.tick(&tick_with([StabilizationMode::Horizon; 3], [1.0, 0.0, 0.0], [0.0; 3], 1));
        let manual = StabilizationSettings::default().manual_rate;
        assert_eq!(out.rate_desired.roll, manual[ROLL]);
        assert_eq!(core.attitude_integral(ROLL), 0.0);
    }

    #[test]
    fn poi_without_camera_is_an_error() {
        let mut core = new_core();
        let out = core.tick(&tick_with(
            [
                StabilizationMode::Rate,
                StabilizationMode::Rate,
                StabilizationMode::Poi,
            ],
            [0.0; 3],
            [0.0; 3],
            1,
        ));
        assert_eq!(out.alarm, AlarmLevel::Error);

        let mut tick = tick_with(
            [
                StabilizationMode::Rate,
                StabilizationMode::Rate,
                StabilizationMode::Poi,
            ],
            [0.0; 3],
            [0.0; 3],
            2,
        );
        tick.camera = Some(CameraDesired {
            bearing: 20.0,
            ..Default::default()
        });
        let out = core.tick(&tick);
        assert_eq!(out.alarm, AlarmLevel::Ok);
        assert!(out.rate_desired.yaw > 0.0);
    }

    #[test]
    fn virtual_bar_angle_resets_when_the_mode_is_engaged_again() {
        let mut core = new_core();
        let modes = [
            StabilizationMode::VirtualBar,
            StabilizationMode::Rate,
            StabilizationMode::Rate,
        ];
        for i in 1..=10 {
            core.tick(&tick_with(modes, [0.0; 3], [100.0, 0.0, 0.0], i));
        }
        assert!(core.flybar_angle(ROLL) > 0.5);
        assert!(core.flybar_angle(ROLL) <= VbarSettings::default().max_angle + 1e-4);

        core.tick(&tick_with([StabilizationMode::Rate; 3], [0.0; 3], [0.0; 3], 11));
        core.tick(&tick_with(modes, [0.0; 3], [0.0; 3], 12));
        assert_eq!(core.flybar_angle(ROLL), 0.0);
    }
}
