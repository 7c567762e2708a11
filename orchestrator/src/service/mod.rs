//! Deployment orchestration service

pub mod orchestrator;
