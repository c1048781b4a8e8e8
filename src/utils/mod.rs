//! 工具模块

pub mod attempt_log;

pub use attempt_log::{AttemptEntry, AttemptLogger, AttemptStatus};
