//! Cloudlab Orchestrator Library
//!
//! Core modules for turning source repositories into running containers.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod registry;
pub mod server;
pub mod service;
pub mod storage;
pub mod utils;
