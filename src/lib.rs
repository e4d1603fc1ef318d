pub mod agent;
pub mod bridge;
pub mod config;
pub mod error;
pub mod fundamentals;
pub mod invalidation;
pub mod logging;
pub mod thesis;
