// Application state shared by the render loop
use crate::application::history_loader::HistoryLoader;
use crate::application::synchronizer::TelemetrySynchronizer;
use crate::presentation::dashboard_view::DashboardView;

pub struct AppState {
    pub synchronizer: TelemetrySynchronizer,
    pub history_loader: HistoryLoader,
}

impl AppState {
    pub fn render(&self) -> DashboardView {
        DashboardView::compose(&self.synchronizer.current(), &self.history_loader.state())
    }
}
