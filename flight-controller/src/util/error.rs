use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FlightError {
    #[error("unable to allocate a sample queue of {0} elements")]
    QueueAllocation(usize),
    #[error("sample queue is full")]
    QueueFull,
    #[error("channel {channel} rejected value {value}")]
    ChannelOutput { channel: usize, value: f32 },
    #[error("unknown {kind} value {value}")]
    UnknownEnumValue { kind: &'static str, value: u8 },
    #[error("invalid settings: {0}")]
    InvalidSettings(&'static str),
    #[error("persistence failed: {message}")]
    Persistence { message: String },
    #[error("unable to start the {name} thread: {message}")]
    ThreadSpawn { name: &'static str, message: String },
}

pub type FlightResult<T> = Result<T, FlightError>;
