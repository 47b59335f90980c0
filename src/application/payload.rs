// Wire payload normalization - the single place that knows field names
use crate::domain::error::PayloadError;
use crate::domain::telemetry::TelemetrySnapshot;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

/// Telemetry broadcast as it appears on the wire. Nodes use either the long
/// or the short field names; when a payload carries both, the long name wins.
/// Counts are read as plain JSON numbers so `42.0` is as good as `42`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WirePayload {
    soil_raw: Option<f64>,
    s_raw: Option<f64>,
    soil_pct: Option<f64>,
    s_pct: Option<f64>,
    soil_temp: Option<f64>,
    s_temp: Option<f64>,
    air_temp: Option<f64>,
    a_temp: Option<f64>,
    humidity: Option<f64>,
    hum: Option<f64>,
    pump_on: Option<bool>,
    pump: Option<bool>,
    manual: Option<bool>,
    pump_life: Option<f64>,
    life: Option<f64>,
}

fn whole(value: f64) -> i64 {
    value.round() as i64
}

/// Convert a raw payload into a snapshot stamped with `received_at`.
///
/// Absent sensor readings stay unknown. A payload that is not an object, or
/// carries a field of the wrong type, is rejected.
pub fn normalize_payload(
    payload: &Value,
    received_at: DateTime<Utc>,
) -> Result<TelemetrySnapshot, PayloadError> {
    if !payload.is_object() {
        return Err(PayloadError::NotAnObject);
    }
    let wire = WirePayload::deserialize(payload)?;

    let soil_pct = wire.soil_pct.or(wire.s_pct);
    if soil_pct.is_none() {
        tracing::warn!("Telemetry payload has no soil percentage, recording 0");
    }

    Ok(TelemetrySnapshot {
        soil_raw: wire.soil_raw.or(wire.s_raw).map_or(0, whole),
        soil_pct: soil_pct.map_or(0, whole).clamp(0, 100) as u8,
        soil_temp: wire.soil_temp.or(wire.s_temp),
        air_temp: wire.air_temp.or(wire.a_temp),
        humidity: wire.humidity.or(wire.hum),
        pump_on: wire.pump_on.or(wire.pump).unwrap_or(false),
        manual: wire.manual.unwrap_or(false),
        pump_life_minutes: wire.pump_life.or(wire.life).map_or(0, whole).max(0) as u64,
        observed_at: Some(received_at),
    })
}
