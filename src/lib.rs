// Soil node telemetry client - push/pull synchronization core
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
