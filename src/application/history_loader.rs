// History loader - One-shot pull of longer-range series, independent of the push channel
use crate::application::history_repository::{HistoryRepository, HistorySource};
use crate::domain::history::HistoricalSeries;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryState {
    pub loading: bool,
    pub data: Option<HistoricalSeries>,
    pub error: Option<String>,
}

impl Default for HistoryState {
    /// A view starts out loading, before any fetch has been issued.
    fn default() -> Self {
        Self {
            loading: true,
            data: None,
            error: None,
        }
    }
}

#[derive(Clone)]
pub struct HistoryLoader {
    repository: Arc<dyn HistoryRepository>,
    source: HistorySource,
    state: Arc<watch::Sender<HistoryState>>,
}

impl HistoryLoader {
    pub fn new(repository: Arc<dyn HistoryRepository>, source: HistorySource) -> Self {
        let (state, _) = watch::channel(HistoryState::default());
        Self {
            repository,
            source,
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> HistoryState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<HistoryState> {
        self.state.subscribe()
    }

    /// Fetch and publish. `loading` is raised before the fetch and cleared
    /// exactly once when it settles; a failure keeps earlier data.
    pub async fn load(&self) {
        self.state.send_modify(|s| s.loading = true);

        match self.fetch().await {
            Ok(series) => {
                tracing::info!(
                    "Loaded history: {} series",
                    series.names().count()
                );
                self.state.send_modify(|s| {
                    s.loading = false;
                    s.data = Some(series);
                    s.error = None;
                });
            }
            Err(e) => {
                tracing::error!("History fetch failed: {:#}", e);
                self.state.send_modify(|s| {
                    s.loading = false;
                    s.error = Some(format!("{:#}", e));
                });
            }
        }
    }

    /// Run `load` on its own task so it never gates the push path.
    pub fn spawn_load(&self) -> JoinHandle<()> {
        let loader = self.clone();
        tokio::spawn(async move { loader.load().await })
    }

    async fn fetch(&self) -> anyhow::Result<HistoricalSeries> {
        match &self.source {
            HistorySource::Combined { path } => self.repository.fetch_series(path).await,
            HistorySource::Split {
                history_path,
                trends_path,
            } => {
                let (history, trends) = tokio::try_join!(
                    self.repository.fetch_series(history_path),
                    self.repository.fetch_series(trends_path),
                )?;
                Ok(history.merge(trends))
            }
        }
    }
}
