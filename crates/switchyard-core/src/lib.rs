//! switchyard-core — shared configuration for the Switchyard daemon.
//!
//! `switchyard.toml` is parsed into [`SwitchyardConfig`], which every other
//! crate receives in pieces (`MonitorConfig` for the cutover engine,
//! `WorkflowsConfig` / `NotifyConfig` for the remote adapters).

pub mod config;

pub use config::{
    ConfigError, MonitorConfig, NotifyConfig, ServerConfig, SwitchyardConfig, WorkflowsConfig,
};
