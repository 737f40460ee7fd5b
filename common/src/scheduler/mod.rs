// Scheduler module for due-reminder detection and dispatch

pub mod engine;

pub use engine::{Scheduler, SchedulerEngine};
