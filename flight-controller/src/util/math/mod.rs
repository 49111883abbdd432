pub mod filters;
pub mod misc;
pub mod quaternion;
pub mod vectors;
