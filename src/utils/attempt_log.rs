//! 生成尝试日志
//!
//! 把每次生成尝试记录到 JSONL 文件，便于事后排查被拒绝的生成结果。
//! 文件只保留最新的若干条。

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::warn;
use uuid::Uuid;

use crate::llm::TokenUsage;

/// 默认保留条数
const DEFAULT_MAX_ENTRIES: usize = 1000;

/// 尝试结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Accepted,
    Rejected,
    TransportError,
}

/// 日志条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptEntry {
    pub attempt_id: String,
    pub timestamp: DateTime<Utc>,
    /// 代码单元限定名
    pub unit: String,
    /// 第几次尝试（从 1 开始）
    pub attempt: u32,
    pub max_attempts: u32,
    pub status: AttemptStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub duration_ms: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_preview: Option<String>,
}

impl AttemptEntry {
    /// 开始一次尝试
    pub fn start(unit: &str, attempt: u32, max_attempts: u32) -> PendingAttempt {
        PendingAttempt {
            unit: unit.to_string(),
            attempt,
            max_attempts,
            started: Instant::now(),
        }
    }
}

/// 进行中的尝试
#[derive(Debug)]
pub struct PendingAttempt {
    unit: String,
    attempt: u32,
    max_attempts: u32,
    started: Instant,
}

impl PendingAttempt {
    /// 结束尝试，生成日志条目
    pub fn finish(
        self,
        status: AttemptStatus,
        reason: Option<String>,
        usage: TokenUsage,
        response: Option<&str>,
    ) -> AttemptEntry {
        AttemptEntry {
            attempt_id: generate_attempt_id(),
            timestamp: Utc::now(),
            unit: self.unit,
            attempt: self.attempt,
            max_attempts: self.max_attempts,
            status,
            reason,
            duration_ms: self.started.elapsed().as_millis() as u64,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            response_preview: response.map(|r| truncate(r, 300)),
        }
    }
}

/// 生成尝试 ID
pub fn generate_attempt_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// 按字符截断
fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// 尝试日志记录器
pub struct AttemptLogger {
    log_path: PathBuf,
    max_entries: usize,
    file: Mutex<Option<File>>,
}

impl AttemptLogger {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self::with_max_entries(log_path, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(log_path: impl Into<PathBuf>, max_entries: usize) -> Self {
        let log_path = log_path.into();
        if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            let _ = fs::create_dir_all(parent);
        }
        Self {
            log_path,
            max_entries: max_entries.max(1),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }

    /// 写入日志条目（失败只记警告，不影响生成流程）
    pub fn record(&self, entry: &AttemptEntry) {
        let mut file_guard = self.file.lock();

        // 懒加载文件
        if file_guard.is_none() {
            match OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.log_path)
            {
                Ok(f) => *file_guard = Some(f),
                Err(e) => {
                    warn!("Could not open attempt log {}: {}", self.log_path.display(), e);
                    return;
                }
            }
        }

        if let Some(file) = file_guard.as_mut() {
            if let Ok(json) = serde_json::to_string(entry) {
                let _ = writeln!(file, "{}", json);
                let _ = file.flush();
            }
        }

        // 裁剪时会重建文件，之后需要重新打开
        if self.cleanup_if_needed() {
            *file_guard = None;
        }
    }

    /// 超出上限时只保留最新的条目，返回是否重写了文件
    fn cleanup_if_needed(&self) -> bool {
        let Ok(file) = File::open(&self.log_path) else {
            return false;
        };
        let lines: Vec<String> = BufReader::new(file).lines().map_while(Result::ok).collect();
        if lines.len() <= self.max_entries {
            return false;
        }

        let keep_lines = &lines[lines.len() - self.max_entries..];
        if let Ok(mut file) = File::create(&self.log_path) {
            for line in keep_lines {
                let _ = writeln!(file, "{}", line);
            }
        }
        true
    }
}
