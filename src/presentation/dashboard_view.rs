// Dashboard view model - merges live telemetry and fetched history at render time
use crate::application::history_loader::HistoryState;
use crate::application::synchronizer::TelemetryView;
use chrono::Local;

const UNKNOWN: &str = "--";
/// Bars never shrink below this height so empty readings stay visible
const MIN_BAR_PCT: u8 = 6;

#[derive(Debug, Clone, PartialEq)]
pub enum ChartStatus {
    Loading,
    Failed(String),
    Ready(Vec<(String, usize)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardView {
    pub link: &'static str,
    pub last_seen: String,
    pub soil_moisture: String,
    pub soil_raw: String,
    pub air_temp: String,
    pub humidity: String,
    pub soil_temp: String,
    pub pump: String,
    pub pump_mode: String,
    pub pump_life: String,
    pub sparkline: Vec<u8>,
    pub charts: ChartStatus,
}

fn reading(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) => format!("{} {}", v, unit),
        None => format!("{} {}", UNKNOWN, unit),
    }
}

impl DashboardView {
    pub fn compose(telemetry: &TelemetryView, history: &HistoryState) -> Self {
        let snapshot = &telemetry.snapshot;

        let charts = if history.loading {
            ChartStatus::Loading
        } else if let Some(data) = &history.data {
            ChartStatus::Ready(
                data.iter()
                    .map(|(name, points)| (name.to_string(), points.len()))
                    .collect(),
            )
        } else {
            ChartStatus::Failed(history.error.clone().unwrap_or_default())
        };

        Self {
            link: if telemetry.connected { "Live" } else { "Offline" },
            last_seen: snapshot
                .observed_at
                .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
                .unwrap_or_else(|| "--:--".to_string()),
            soil_moisture: format!("{}%", snapshot.soil_pct),
            soil_raw: format!("RAW {}", snapshot.soil_raw),
            air_temp: reading(snapshot.air_temp, "°C"),
            humidity: reading(snapshot.humidity, "%"),
            soil_temp: reading(snapshot.soil_temp, "°C"),
            pump: snapshot.pump_label().to_string(),
            pump_mode: snapshot.pump_mode().to_string(),
            pump_life: format!("{} min", snapshot.pump_life_minutes),
            sparkline: telemetry
                .history
                .iter()
                .map(|v| (*v).max(MIN_BAR_PCT))
                .collect(),
            charts,
        }
    }

    pub fn status_line(&self) -> String {
        let charts = match &self.charts {
            ChartStatus::Loading => "charts loading…".to_string(),
            ChartStatus::Failed(e) => format!("charts unavailable ({})", e),
            ChartStatus::Ready(series) => format!(
                "charts: {}",
                series
                    .iter()
                    .map(|(name, n)| format!("{}={}", name, n))
                    .collect::<Vec<_>>()
                    .join(" ")
            ),
        };
        format!(
            "[{}] {} | soil {} ({}) | air {} | humidity {} | soil temp {} | pump {} ({}, {}) | {}",
            self.link,
            self.last_seen,
            self.soil_moisture,
            self.soil_raw,
            self.air_temp,
            self.humidity,
            self.soil_temp,
            self.pump,
            self.pump_mode,
            self.pump_life,
            charts
        )
    }
}
