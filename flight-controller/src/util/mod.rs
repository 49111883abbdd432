pub mod error;
pub mod logger;
pub mod math;
pub mod sample_queue;
pub mod time;
