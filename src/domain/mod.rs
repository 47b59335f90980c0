// Domain layer - Core telemetry models
pub mod connection;
pub mod error;
pub mod history;
pub mod telemetry;
