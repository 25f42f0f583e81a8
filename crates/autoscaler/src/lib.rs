//! Autoscaler daemon: configuration loading, HTTP adapters and the status API

pub mod adapters;
pub mod api;
pub mod config;
