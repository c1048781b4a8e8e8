//! 运行报告
//!
//! 每个自定义单元一行。路径以 `.json` 结尾时输出 JSON 数组，否则输出 CSV。

use serde::Serialize;
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use super::store::CodeUnitStore;
use super::types::UnitState;

/// 缺失值
pub const NO_VALUE: &str = "-";

const CSV_HEADER: &[&str] = &[
    "path",
    "name",
    "kind",
    "status",
    "reason",
    "documentation",
    "shortened documentation",
    "code_before",
    "code_after",
];

/// 报告写入错误
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("写入报告失败 ({0}): {1}")]
    IoError(PathBuf, #[source] std::io::Error),

    #[error("报告序列化失败: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 报告中的一行
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub path: String,
    pub name: String,
    pub kind: String,
    pub status: String,
    pub reason: String,
    pub documentation: String,
    pub documentation_short: String,
    pub code_before: String,
    pub code_after: String,
}

impl ReportRow {
    fn fields(&self) -> [&str; 9] {
        [
            &self.path,
            &self.name,
            &self.kind,
            &self.status,
            &self.reason,
            &self.documentation,
            &self.documentation_short,
            &self.code_before,
            &self.code_after,
        ]
    }
}

fn or_dash(value: Option<&str>) -> String {
    value.unwrap_or(NO_VALUE).to_string()
}

/// 按发现顺序生成报告行
pub fn build_rows(store: &CodeUnitStore) -> Vec<ReportRow> {
    store
        .iter()
        .filter(|u| u.custom)
        .map(|unit| {
            let reason = match &unit.state {
                UnitState::Failed { reason } => reason.clone(),
                _ => NO_VALUE.to_string(),
            };
            let code_after = match unit.state {
                UnitState::Generated => unit.generated_text.as_deref(),
                _ => None,
            };
            ReportRow {
                path: unit
                    .path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| NO_VALUE.to_string()),
                name: unit.name.clone(),
                kind: unit.kind.to_string(),
                status: unit.state.label().to_string(),
                reason,
                documentation: or_dash(unit.documentation.as_deref()),
                documentation_short: or_dash(unit.documentation_short.as_deref()),
                code_before: or_dash(unit.original_text.as_deref()),
                code_after: or_dash(code_after),
            }
        })
        .collect()
}

/// CSV 字段转义：包含逗号、引号或换行时加引号，内部引号加倍
fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

/// 渲染 CSV
pub fn to_csv(rows: &[ReportRow]) -> String {
    let mut out = CSV_HEADER.join(",");
    out.push('\n');
    for row in rows {
        let line: Vec<Cow<'_, str>> = row.fields().into_iter().map(csv_field).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

/// 写入报告
pub fn write_report(path: &Path, rows: &[ReportRow]) -> Result<(), ReportError> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let content = if is_json {
        serde_json::to_string_pretty(rows)?
    } else {
        to_csv(rows)
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ReportError::IoError(parent.to_path_buf(), e))?;
    }
    fs::write(path, content).map_err(|e| ReportError::IoError(path.to_path_buf(), e))?;
    info!("Report written to {} ({} units)", path.display(), rows.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::doc_generator::types::{UnitKind, UnitUpdate};
    use tempfile::TempDir;

    fn sample_store() -> CodeUnitStore {
        let mut store = CodeUnitStore::new();
        store.merge(
            "add",
            UnitUpdate {
                kind: Some(UnitKind::Function),
                original_text: Some("def add(a, b):\n    return a + b".to_string()),
                generated_text: Some("def add(a, b):\n    \"\"\"Add.\"\"\"\n    return a + b".to_string()),
                documentation: Some("Add.".to_string()),
                documentation_short: Some("Add.".to_string()),
                path: Some(PathBuf::from("pkg/math.py")),
                custom: Some(true),
                state: Some(UnitState::Generated),
                dependencies: vec!["np.add".to_string()],
                ..UnitUpdate::default()
            },
        );
        store.merge(
            "sub",
            UnitUpdate {
                kind: Some(UnitKind::Function),
                original_text: Some("def sub(a, b):\n    return a - b".to_string()),
                generated_text: Some("def sub(a, b):\n    return a + b".to_string()),
                path: Some(PathBuf::from("pkg/math.py")),
                custom: Some(true),
                state: Some(UnitState::Failed {
                    reason: "structural mismatch".to_string(),
                }),
                ..UnitUpdate::default()
            },
        );
        store
    }

    #[test]
    fn test_rows_skip_stubs_and_use_sentinel() {
        let rows = build_rows(&sample_store());
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].status, "generated");
        assert!(rows[0].code_after.contains("\"\"\"Add.\"\"\""));

        assert_eq!(rows[1].status, "failed");
        assert_eq!(rows[1].reason, "structural mismatch");
        assert_eq!(rows[1].documentation, NO_VALUE);
        assert_eq!(rows[1].code_after, NO_VALUE);
    }

    #[test]
    fn test_csv_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\"\nnow"), "\"say \"\"hi\"\"\nnow\"");

        let csv = to_csv(&build_rows(&sample_store()));
        assert!(csv.starts_with("path,name,kind,status,reason,documentation,"));
        assert!(csv.contains("pkg/math.py,add,function,generated,-,Add.,Add.,"));
    }

    #[test]
    fn test_write_json_and_csv() {
        let dir = TempDir::new().unwrap();
        let rows = build_rows(&sample_store());

        let json_path = dir.path().join("out/report.json");
        write_report(&json_path, &rows).unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
        assert_eq!(parsed[1]["code_after"], "-");

        let csv_path = dir.path().join("report.csv");
        write_report(&csv_path, &rows).unwrap();
        assert!(fs::read_to_string(&csv_path).unwrap().lines().count() > 2);
    }
}
