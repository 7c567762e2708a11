//! Application wiring: options, state and the run loop

pub mod options;
pub mod run;
pub mod state;
