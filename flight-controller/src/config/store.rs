use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};

use once_cell::sync::Lazy;
use shared_definitions::{
    settings::{
        ActuatorSettings, BiflightSettings, MixerChannel, MixerSettings, MixerType,
        StabilizationSettings, SubTrimSettings, SystemSettings, TriflightSettings, VbarSettings,
        MIXER_VECTOR_LEN,
    },
    system_ident::SystemIdentResult,
    MAX_MIX_ACTUATORS,
};

use crate::{
    config::constants::MAX_EXCITATION_SCALE,
    util::error::{FlightError, FlightResult},
};

pub static SETTINGS_STORE: Lazy<Mutex<SettingsStore>> =
    Lazy::new(|| Mutex::new(SettingsStore::default()));

pub static SETTINGS_CHANGED: SettingsChangedFlags = SettingsChangedFlags::new();

/// One flag per consuming task. Tasks cache settings by value and reload when their flag is raised.
pub struct SettingsChangedFlags {
    pub actuator: AtomicBool,
    pub stabilization: AtomicBool,
}

impl SettingsChangedFlags {
    pub const fn new() -> Self {
        Self {
            actuator: AtomicBool::new(true),
            stabilization: AtomicBool::new(true),
        }
    }

    pub fn take_actuator(&self) -> bool {
        self.actuator.swap(false, Ordering::AcqRel)
    }

    pub fn take_stabilization(&self) -> bool {
        self.stabilization.swap(false, Ordering::AcqRel)
    }

    fn raise_actuator(&self) {
        self.actuator.store(true, Ordering::Release);
    }

    fn raise_stabilization(&self) {
        self.stabilization.store(true, Ordering::Release);
    }
}

/// Identification results survive reboots; everything else is compiled in or set at runtime.
pub trait SettingsPersistence {
    fn save_system_ident(&mut self, result: &SystemIdentResult) -> FlightResult<()>;
    fn load_system_ident(&mut self) -> FlightResult<Option<SystemIdentResult>>;
}

#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    saved: Option<SystemIdentResult>,
    pub save_count: u32,
}

impl SettingsPersistence for InMemoryPersistence {
    fn save_system_ident(&mut self, result: &SystemIdentResult) -> FlightResult<()> {
        self.saved = Some(*result);
        self.save_count += 1;
        Ok(())
    }

    fn load_system_ident(&mut self) -> FlightResult<Option<SystemIdentResult>> {
        Ok(self.saved)
    }
}

#[derive(Debug, Default, Clone)]
pub struct SettingsStore {
    mixer: MixerSettings,
    actuator: ActuatorSettings,
    stabilization: StabilizationSettings,
    vbar: VbarSettings,
    sub_trim: SubTrimSettings,
    system: SystemSettings,
    triflight: TriflightSettings,
    biflight: BiflightSettings,
    system_ident: SystemIdentResult,
}

impl SettingsStore {
    pub fn get_mixer(&self) -> MixerSettings {
        self.mixer
    }

    pub fn set_mixer(&mut self, settings: MixerSettings) -> FlightResult<()> {
        let curves_finite = settings
            .throttle_curve1
            .iter()
            .chain(settings.throttle_curve2.iter())
            .all(|point| point.is_finite());
        if !curves_finite {
            return Err(FlightError::InvalidSettings("throttle curve point is not finite"));
        }
        self.mixer = settings;
        SETTINGS_CHANGED.raise_actuator();
        Ok(())
    }

    /// Configures one mixer channel from its stored encoding.
    pub fn set_mixer_channel_raw(
        &mut self,
        channel: usize,
        raw_type: u8,
        vector: [i16; MIXER_VECTOR_LEN],
    ) -> FlightResult<()> {
        if channel >= MAX_MIX_ACTUATORS {
            return Err(FlightError::InvalidSettings("mixer channel out of range"));
        }
        let mixer_type =
            MixerType::try_from(raw_type).map_err(|value| FlightError::UnknownEnumValue {
                kind: "mixer type",
                value,
            })?;
        let mut settings = self.mixer;
        settings.channels[channel] = MixerChannel { mixer_type, vector };
        self.set_mixer(settings)
    }

    pub fn get_actuator(&self) -> ActuatorSettings {
        self.actuator
    }

    pub fn set_actuator(&mut self, settings: ActuatorSettings) -> FlightResult<()> {
        if !(settings.motor_input_output_curve_fit > 0.0) {
            return Err(FlightError::InvalidSettings("motor curve fit must be positive"));
        }
        if !(settings.low_power_stabilization_time_constant > 0.0) {
            return Err(FlightError::InvalidSettings(
                "low power stabilization time constant must be positive",
            ));
        }
        self.actuator = settings;
        SETTINGS_CHANGED.raise_actuator();
        Ok(())
    }

    pub fn get_stabilization(&self) -> StabilizationSettings {
        self.stabilization
    }

    pub fn set_stabilization(&mut self, settings: StabilizationSettings) -> FlightResult<()> {
        if settings.manual_rate.iter().any(|rate| !(*rate > 0.0)) {
            return Err(FlightError::InvalidSettings("manual rate must be positive"));
        }
        let effort_in_range = settings
            .autotune_actuation_effort
            .iter()
            .all(|effort| *effort > 0.0 && *effort <= MAX_EXCITATION_SCALE);
        if !effort_in_range {
            return Err(FlightError::InvalidSettings("autotune effort out of range"));
        }
        self.stabilization = settings;
        SETTINGS_CHANGED.raise_stabilization();
        Ok(())
    }

    pub fn get_vbar(&self) -> VbarSettings {
        self.vbar
    }

    pub fn set_vbar(&mut self, settings: VbarSettings) {
        self.vbar = settings;
        SETTINGS_CHANGED.raise_stabilization();
    }

    pub fn get_sub_trim(&self) -> SubTrimSettings {
        self.sub_trim
    }

    pub fn set_sub_trim(&mut self, settings: SubTrimSettings) {
        self.sub_trim = settings;
        SETTINGS_CHANGED.raise_stabilization();
    }

    pub fn get_system(&self) -> SystemSettings {
        self.system
    }

    pub fn set_system(&mut self, settings: SystemSettings) {
        self.system = settings;
        SETTINGS_CHANGED.raise_actuator();
        SETTINGS_CHANGED.raise_stabilization();
    }

    pub fn get_triflight(&self) -> TriflightSettings {
        self.triflight
    }

    pub fn set_triflight(&mut self, settings: TriflightSettings) {
        self.triflight = settings;
        SETTINGS_CHANGED.raise_actuator();
    }

    pub fn get_biflight(&self) -> BiflightSettings {
        self.biflight
    }

    pub fn set_biflight(&mut self, settings: BiflightSettings) {
        self.biflight = settings;
        SETTINGS_CHANGED.raise_actuator();
    }

    pub fn get_system_ident(&self) -> SystemIdentResult {
        self.system_ident
    }

    /// The excitation amplitude depends on the last estimate, so stabilization reloads too.
    pub fn set_system_ident(&mut self, result: SystemIdentResult) {
        self.system_ident = result;
        SETTINGS_CHANGED.raise_stabilization();
    }

    /// Records an in-flight estimate without making stabilization reload.
    pub fn publish_system_ident_progress(&mut self, result: SystemIdentResult) {
        self.system_ident = result;
    }

    pub fn load_system_ident(
        &mut self,
        persistence: &mut dyn SettingsPersistence,
    ) -> FlightResult<()> {
        if let Some(result) = persistence.load_system_ident()? {
            self.set_system_ident(result);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_mixer_type_is_validated() {
        let mut store = SettingsStore::default();
        assert!(store
            .set_mixer_channel_raw(0, 1, [128, 0, 64, 64, -64])
            .is_ok());
        assert_eq!(store.get_mixer().channels[0].mixer_type, MixerType::Motor);

        assert_eq!(
            store.set_mixer_channel_raw(1, 42, [0; MIXER_VECTOR_LEN]),
            Err(FlightError::UnknownEnumValue {
                kind: "mixer type",
                value: 42
            })
        );
        assert_eq!(store.get_mixer().channels[1].mixer_type, MixerType::Disabled);
    }

    #[test]
    fn rejects_invalid_curves() {
        let mut store = SettingsStore::default();
        let mut mixer = MixerSettings::quad_x();
        mixer.throttle_curve1[2] = f32::NAN;
        assert!(store.set_mixer(mixer).is_err());
        assert_eq!(store.get_mixer(), MixerSettings::default());
    }

    #[test]
    fn identification_result_round_trips_through_persistence() {
        let mut persistence = InMemoryPersistence::default();
        let mut result = SystemIdentResult::default();
        result.beta = [9.1, 9.3, 7.7];
        persistence.save_system_ident(&result).unwrap();

        let mut store = SettingsStore::default();
        store.load_system_ident(&mut persistence).unwrap();
        assert_eq!(store.get_system_ident().beta, [9.1, 9.3, 7.7]);
    }

    #[test]
    fn autotune_effort_is_bounded() {
        let mut store = SettingsStore::default();
        let mut settings = StabilizationSettings::default();
        settings.autotune_actuation_effort = [0.1, 0.5, 0.1];
        assert_eq!(
            store.set_stabilization(settings),
            Err(FlightError::InvalidSettings("autotune effort out of range"))
        );
        settings.autotune_actuation_effort = [0.1, 0.0, 0.1];
        assert!(store.set_stabilization(settings).is_err());
        settings.autotune_actuation_effort = [0.1, MAX_EXCITATION_SCALE, 0.2];
        assert!(store.set_stabilization(settings).is_ok());
    }

    #[test]
    fn progress_is_visible_to_readers() {
        let mut store = SettingsStore::default();
        let mut result = SystemIdentResult::default();
        result.num_af_predicts = 12;
        store.publish_system_ident_progress(result);
        assert_eq!(store.get_system_ident().num_af_predicts, 12);
        assert!(!store.get_system_ident().new_tune);
    }
}
