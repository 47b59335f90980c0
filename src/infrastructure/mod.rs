// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod http_history_repository;
pub mod socketio;
