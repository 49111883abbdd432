pub mod control_loops;
pub mod integrator;
pub mod pid;
pub mod stabilization;
pub mod virtual_flybar;
