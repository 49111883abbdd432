pub mod actuator;
pub mod alarms;
pub mod settings;
pub mod stabilization;
pub mod system_ident;

pub const ROLL: usize = 0;
pub const PITCH: usize = 1;
pub const YAW: usize = 2;
pub const MAX_AXES: usize = 3;

/// Number of physical output channels the mixer drives.
pub const MAX_MIX_ACTUATORS: usize = 10;
