// Application layer - Connection lifecycle, synchronization and history loading
pub mod connection_manager;
pub mod history_loader;
pub mod history_repository;
pub mod payload;
pub mod push_transport;
pub mod synchronizer;
