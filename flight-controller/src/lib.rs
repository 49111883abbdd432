pub mod autotune;
pub mod config;
pub mod control;
pub mod output;
pub mod shared_core_values;
pub mod telemetry;
pub mod threads;
pub mod util;
