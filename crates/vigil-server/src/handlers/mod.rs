//! HTTP handlers.

pub mod config;
pub mod health;
pub mod metrics;
pub mod repos;
pub mod status;
pub mod webhook;
