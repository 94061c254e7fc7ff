//! Shared types, configuration and infrastructure for the Herald
//! notification dispatch engine.

pub mod config;
pub mod db;
pub mod error;
pub mod redis_pool;
pub mod types;
