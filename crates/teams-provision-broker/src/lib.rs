//! HTTP broker exposing sign-in, consent checks and bot provisioning.

pub mod config;
pub mod http;

pub use config::{BrokerConfig, ConfigError};
pub use http::{AppContext, SharedContext, router};
