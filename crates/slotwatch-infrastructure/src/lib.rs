// Infrastructure layer - Technical implementations
// Depends on domain layer, implements its interfaces

pub mod browser;
pub mod config;
pub mod logging;
pub mod persistence;
