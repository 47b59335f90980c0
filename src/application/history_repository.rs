// Repository trait for historical series access
use crate::domain::history::HistoricalSeries;
use async_trait::async_trait;

/// Which backend shape serves the 24h lookback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistorySource {
    /// One endpoint returning a combined series of all fields
    Combined { path: String },
    /// Moisture-centric `history` and temperature/humidity `trends`
    Split {
        history_path: String,
        trends_path: String,
    },
}

#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// Fetch one endpoint's records and normalize them into named series
    async fn fetch_series(&self, path: &str) -> anyhow::Result<HistoricalSeries>;
}
