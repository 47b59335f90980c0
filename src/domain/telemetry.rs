// Telemetry data domain models
use chrono::{DateTime, Utc};
use std::fmt;

/// Latest known state of the node. Replaced wholesale on every broadcast.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrySnapshot {
    pub soil_raw: i64,
    pub soil_pct: u8,
    pub soil_temp: Option<f64>,
    pub air_temp: Option<f64>,
    pub humidity: Option<f64>,
    pub pump_on: bool,
    pub manual: bool,
    pub pump_life_minutes: u64,
    /// Local receipt time; `None` until the first message arrives.
    pub observed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpLabel {
    On,
    ForcedOff,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpMode {
    Manual,
    Auto,
}

impl TelemetrySnapshot {
    /// Relay state wins over the manual flag: a running pump reads `ON`
    /// even in manual mode.
    pub fn pump_label(&self) -> PumpLabel {
        if self.pump_on {
            PumpLabel::On
        } else if self.manual {
            PumpLabel::ForcedOff
        } else {
            PumpLabel::Off
        }
    }

    pub fn pump_mode(&self) -> PumpMode {
        if self.manual {
            PumpMode::Manual
        } else {
            PumpMode::Auto
        }
    }
}

impl PumpLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PumpLabel::On => "ON",
            PumpLabel::ForcedOff => "FORCED OFF",
            PumpLabel::Off => "OFF",
        }
    }
}

impl fmt::Display for PumpLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for PumpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PumpMode::Manual => f.write_str("Manual"),
            PumpMode::Auto => f.write_str("Auto"),
        }
    }
}
