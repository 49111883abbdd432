pub mod airframe_stage;
pub mod biflight;
pub mod channel_scaling;
pub mod dshot;
pub mod mixer;
pub mod motors_state_manager;
pub mod triflight;
