// Presentation layer - View model composed from both data sources
pub mod app_state;
pub mod dashboard_view;
