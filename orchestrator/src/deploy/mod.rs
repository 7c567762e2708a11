//! Deployment module

pub mod command;
pub mod docker;
pub mod fsm;
pub mod git;
pub mod mock;
pub mod npm;
pub mod pipeline;
pub mod ports;
