//! 配置模块

mod app_config;
mod cli;

pub use app_config::{AppConfig, ConfigError, RefDocStrategy};
pub use cli::CliArgs;
