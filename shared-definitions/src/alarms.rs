#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SystemAlarm {
    Actuator = 0,
    Stabilization = 1,
    Autotune = 2,
}

impl SystemAlarm {
    pub const COUNT: usize = 3;

    pub const ALL: [SystemAlarm; SystemAlarm::COUNT] = [
        SystemAlarm::Actuator,
        SystemAlarm::Stabilization,
        SystemAlarm::Autotune,
    ];
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum AlarmLevel {
    #[default]
    Ok = 0,
    Warning = 1,
    Error = 2,
    Critical = 3,
}

impl TryFrom<u8> for AlarmLevel {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0 => Ok(AlarmLevel::Ok),
            1 => Ok(AlarmLevel::Warning),
            2 => Ok(AlarmLevel::Error),
            3 => Ok(AlarmLevel::Critical),
            other => Err(other),
        }
    }
}
