// History domain models: rolling sparkline buffer and fetched series
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};

pub const ROLLING_HISTORY_CAPACITY: usize = 24;

/// Fixed-capacity FIFO of soil moisture percentages, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RollingHistoryBuffer {
    samples: VecDeque<u8>,
}

impl RollingHistoryBuffer {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(ROLLING_HISTORY_CAPACITY),
        }
    }

    pub fn push(&mut self, soil_pct: u8) {
        if self.samples.len() == ROLLING_HISTORY_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(soil_pct);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.samples.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.iter().collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesPoint {
    pub time_ms: i64,
    pub value: f64,
}

impl TimeSeriesPoint {
    pub fn new(time_ms: i64, value: f64) -> Self {
        Self { time_ms, value }
    }
}

/// Named series keyed by field name, each ordered by timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoricalSeries {
    series: BTreeMap<String, Vec<TimeSeriesPoint>>,
}

impl HistoricalSeries {
    /// Normalize an array of `{timestamp, field: number, ...}` records.
    ///
    /// Records without a parseable timestamp are skipped. Fields that are
    /// not numbers (including `null`) contribute no point.
    pub fn from_records(records: &[Value]) -> Self {
        let mut series: BTreeMap<String, Vec<TimeSeriesPoint>> = BTreeMap::new();

        for record in records {
            let Some(fields) = record.as_object() else {
                tracing::debug!("Skipping non-object history record");
                continue;
            };
            let Some(time_ms) = fields.get("timestamp").and_then(parse_timestamp) else {
                tracing::debug!("Skipping history record without a usable timestamp");
                continue;
            };

            for (name, value) in fields {
                if name == "timestamp" {
                    continue;
                }
                if let Some(v) = value.as_f64() {
                    series
                        .entry(name.clone())
                        .or_default()
                        .push(TimeSeriesPoint::new(time_ms, v));
                }
            }
        }

        let mut result = Self { series };
        result.sort();
        result
    }

    /// Merge another set into this one; same-named series are concatenated
    /// and re-sorted by time.
    pub fn merge(mut self, other: HistoricalSeries) -> Self {
        for (name, points) in other.series {
            self.series.entry(name).or_default().extend(points);
        }
        self.sort();
        self
    }

    pub fn get(&self, name: &str) -> Option<&[TimeSeriesPoint]> {
        self.series.get(name).map(Vec::as_slice)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[TimeSeriesPoint])> {
        self.series
            .iter()
            .map(|(name, points)| (name.as_str(), points.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    fn sort(&mut self) {
        for points in self.series.values_mut() {
            points.sort_by_key(|p| p.time_ms);
        }
    }
}

/// Accepts RFC 3339 strings or epoch milliseconds.
fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc).timestamp_millis()),
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rolling_history_caps_at_capacity() {
        let mut buffer = RollingHistoryBuffer::new();
        for n in 1..=60u32 {
            buffer.push((n % 101) as u8);
            assert_eq!(buffer.len(), (n as usize).min(ROLLING_HISTORY_CAPACITY));
        }
    }

    #[test]
    fn test_rolling_history_evicts_oldest_first() {
        let mut buffer = RollingHistoryBuffer::new();
        for pct in 0..25u8 {
            buffer.push(pct);
        }
        let samples = buffer.to_vec();
        assert_eq!(samples.len(), 24);
        assert_eq!(samples.first(), Some(&1));
        assert_eq!(samples.last(), Some(&24));
    }

    #[test]
    fn test_from_records_builds_named_series() {
        let records = vec![
            json!({"timestamp": "2024-05-01T10:05:00Z", "soil_pct": 41, "soil_temp": 18.5, "humidity": null}),
            json!({"timestamp": "2024-05-01T10:00:00Z", "soil_pct": 40, "soil_temp": 18.0, "humidity": 61.0}),
        ];
        let series = HistoricalSeries::from_records(&records);

        let soil = series.get("soil_pct").unwrap();
        assert_eq!(soil.len(), 2);
        assert!(soil[0].time_ms < soil[1].time_ms);
        assert_eq!(soil[0].value, 40.0);

        assert_eq!(series.get("humidity").unwrap().len(), 1);
        assert_eq!(
            series.names().collect::<Vec<_>>(),
            vec!["humidity", "soil_pct", "soil_temp"]
        );
    }

    #[test]
    fn test_from_records_skips_bad_timestamps() {
        let records = vec![
            json!({"timestamp": "yesterday", "soil_pct": 10}),
            json!({"soil_pct": 11}),
            json!({"timestamp": 1714557600000i64, "soil_pct": 12}),
            json!("not a record"),
        ];
        let series = HistoricalSeries::from_records(&records);
        let soil = series.get("soil_pct").unwrap();
        assert_eq!(soil, &[TimeSeriesPoint::new(1714557600000, 12.0)]);
    }

    #[test]
    fn test_merge_concatenates_same_named_series() {
        let a = HistoricalSeries::from_records(&[json!({"timestamp": 2000, "soil_pct": 2})]);
        let b = HistoricalSeries::from_records(&[
            json!({"timestamp": 1000, "soil_pct": 1, "air_temp": 20.5}),
        ]);
        let merged = a.merge(b);
        let soil = merged.get("soil_pct").unwrap();
        assert_eq!(soil.iter().map(|p| p.time_ms).collect::<Vec<_>>(), vec![1000, 2000]);
        assert!(merged.get("air_temp").is_some());
    }
}
