use shared_definitions::{
    actuator::ActuatorCommand,
    settings::{ActuatorSettings, BiflightSettings, TriflightSettings},
    stabilization::AirframeType,
};

use super::{biflight::Biflight, triflight::Triflight};
use crate::util::error::FlightResult;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct StageInputs {
    pub armed: bool,
    pub dt: f32,
    /// Raw servo feedback readings, `None` when the ADC has nothing.
    pub servo_feedback: [Option<f32>; 2],
}

/// Frame specific post processing of the mixer output.
pub trait AirframeOutputStage: Send {
    fn apply_to_command(&mut self, command: &mut ActuatorCommand, inputs: &StageInputs);

    /// Factor the mixer should apply to the desired yaw on the next tick.
    fn yaw_gain(&self) -> f32 {
        1.0
    }
}

/// Builds the stage a frame needs, if any.
pub fn stage_for_airframe(
    airframe_type: AirframeType,
    actuator: &ActuatorSettings,
    triflight: TriflightSettings,
    biflight: BiflightSettings,
) -> FlightResult<Option<Box<dyn AirframeOutputStage>>> {
    Ok(match airframe_type {
        AirframeType::Tri => Some(Box::new(Triflight::new(actuator, triflight)?)),
        AirframeType::Bi => Some(Box::new(Biflight::new(biflight))),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_tri_and_bi_get_a_stage() {
        let actuator = ActuatorSettings::default();
        let build = |airframe| {
            stage_for_airframe(
                airframe,
                &actuator,
                TriflightSettings::default(),
                BiflightSettings::default(),
            )
            .unwrap()
            .is_some()
        };
        assert!(build(AirframeType::Tri));
        assert!(build(AirframeType::Bi));
        assert!(!build(AirframeType::QuadX));
        assert!(!build(AirframeType::HeliCp));
    }

    #[test]
    fn bad_triflight_settings_are_reported() {
        let triflight = TriflightSettings {
            rear_motor_channel: 12,
            ..Default::default()
        };
        let result = stage_for_airframe(
            AirframeType::Tri,
            &ActuatorSettings::default(),
            triflight,
            BiflightSettings::default(),
        );
        assert!(result.is_err());
    }
}
