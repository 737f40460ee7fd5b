// Common library for the reminder engine, shared by the API process and tests

pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod models;
pub mod registry;
pub mod retry;
pub mod schedule;
pub mod scheduler;
pub mod telemetry;
pub mod webhook;
