//! 写回源文件
//!
//! 不重新解析文件：把单元源码和文件内容都归一化为（行号, 去空白去注释的内容）序列，
//! 用首尾行（较长单元用首行加相邻的末两行）定位原始片段，再整体替换为生成结果。

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info};

use super::store::CodeUnitStore;
use super::types::{CodeUnit, UnitKind, UnitState};
use crate::services::code_analyzer::literal_rows_in;

/// 写回错误（只影响单个单元）
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("`{0}` 没有可定位的代码行")]
    EmptyUnit(String),

    #[error("未在文件中找到 `{0}`")]
    AnchorNotFound(String),

    #[error("`{name}` 在文件中匹配到 {count} 处")]
    Ambiguous { name: String, count: usize },

    #[error("IO错误 ({0}): {1}")]
    IoError(PathBuf, #[source] std::io::Error),
}

/// 写回统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchSummary {
    pub files_patched: usize,
    pub failures: usize,
}

/// 定位锚点
#[derive(Debug, PartialEq, Eq)]
enum Anchor<'a> {
    /// 首行与末行
    Pair { first: &'a str, last: &'a str },
    /// 首行与相邻的末两行
    Triple {
        first: &'a str,
        second_last: &'a str,
        last: &'a str,
    },
}

impl<'a> Anchor<'a> {
    fn from_lines(lines: &[(usize, &'a str)]) -> Option<Self> {
        let first = lines.first()?.1;
        let last = lines.last()?.1;
        if lines.len() <= 2 {
            Some(Anchor::Pair { first, last })
        } else {
            Some(Anchor::Triple {
                first,
                second_last: lines[lines.len() - 2].1,
                last,
            })
        }
    }

    fn first(&self) -> &'a str {
        match *self {
            Anchor::Pair { first, .. } | Anchor::Triple { first, .. } => first,
        }
    }

    /// 从第 `i` 行起向后找到的末行下标
    fn end_from(&self, lines: &[(usize, &str)], i: usize) -> Option<usize> {
        match *self {
            Anchor::Pair { first, last } => {
                let from = if first == last { i } else { i + 1 };
                (from..lines.len()).find(|&k| lines[k].1 == last)
            }
            Anchor::Triple {
                second_last, last, ..
            } => (i + 1..lines.len().saturating_sub(1))
                .find(|&k| lines[k].1 == second_last && lines[k + 1].1 == last)
                .map(|k| k + 1),
        }
    }

    /// 所有匹配区间（原始行号，含两端）
    ///
    /// 区间内还有另一处首行时以更近的起点为准，只保留互不包含的区间。
    fn matches(&self, lines: &[(usize, &str)]) -> Vec<(usize, usize)> {
        let starts: Vec<usize> = (0..lines.len())
            .filter(|&i| lines[i].1 == self.first())
            .collect();

        let mut found = Vec::new();
        for &i in &starts {
            let Some(end) = self.end_from(lines, i) else {
                continue;
            };
            if starts.iter().any(|&j| j > i && j <= end) {
                continue;
            }
            found.push((lines[i].0, lines[end].0));
        }
        found
    }
}

/// 去掉行尾注释（忽略字符串中的 `#`）
fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (Some(_), '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (None, '\'' | '"') => quote = Some(c),
            (None, '#') => return &line[..i],
            _ => {}
        }
    }
    line
}

/// 归一化为（行号, 内容），跳过空行和纯注释行
fn clean_lines<'a>(lines: &[&'a str]) -> Vec<(usize, &'a str)> {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| (i, strip_comment(line).trim()))
        .filter(|(_, content)| !content.is_empty())
        .collect()
}

/// 在 `text` 中把 `original` 所在的片段替换为 `replacement`
///
/// `replacement` 每个非空行加上 `indent` 前缀，多行字符串内部的行除外；
/// `text` 使用 CRLF 时插入行也使用 CRLF。
pub fn splice(
    name: &str,
    text: &str,
    original: &str,
    replacement: &str,
    indent: &str,
) -> Result<String, PatchError> {
    let original_lines: Vec<&str> = original.split('\n').collect();
    let original_clean = clean_lines(&original_lines);
    let anchor =
        Anchor::from_lines(&original_clean).ok_or_else(|| PatchError::EmptyUnit(name.to_string()))?;

    let file_lines: Vec<&str> = text.split('\n').collect();
    let matches = anchor.matches(&clean_lines(&file_lines));
    let (start, end) = match matches.as_slice() {
        [] => return Err(PatchError::AnchorNotFound(name.to_string())),
        [single] => *single,
        _ => {
            return Err(PatchError::Ambiguous {
                name: name.to_string(),
                count: matches.len(),
            })
        }
    };
    debug!("Anchored `{}` at lines {}-{}", name, start + 1, end + 1);

    let crlf = text.contains("\r\n");
    let last_has_cr = file_lines[end].ends_with('\r');
    let inserted: Vec<&str> = replacement.split('\n').map(|l| l.trim_end_matches('\r')).collect();
    let verbatim = if indent.is_empty() {
        BTreeSet::new()
    } else {
        literal_rows_in(&inserted.join("\n"))
    };

    let mut out: Vec<String> = file_lines[..start].iter().map(|l| l.to_string()).collect();
    for (i, line) in inserted.iter().enumerate() {
        let mut line = if verbatim.contains(&i) {
            line.to_string()
        } else if line.trim().is_empty() {
            String::new()
        } else {
            format!("{indent}{line}")
        };
        let is_last = i + 1 == inserted.len();
        if (crlf && !is_last) || (is_last && last_has_cr) {
            line.push('\r');
        }
        out.push(line);
    }
    out.extend(file_lines[end + 1..].iter().map(|l| l.to_string()));
    Ok(out.join("\n"))
}

/// 需要写回的单元：生成成功且结果与原文不同
fn needs_patch(unit: &CodeUnit) -> bool {
    unit.state == UnitState::Generated
        && match (&unit.generated_text, unit.anchor_text()) {
            (Some(generated), Some(anchor)) => generated != anchor,
            _ => false,
        }
}

/// 写回所有已生成的单元
///
/// 同一文件内先写函数和方法，再写类；文件内容未变化时不写入。
pub fn patch_files(store: &CodeUnitStore, dry_run: bool) -> PatchSummary {
    let mut summary = PatchSummary::default();

    for (path, units) in store.units_by_path() {
        let (classes, members): (Vec<&CodeUnit>, Vec<&CodeUnit>) = units
            .into_iter()
            .filter(|u| needs_patch(u))
            .partition(|u| u.kind == UnitKind::Class);
        if classes.is_empty() && members.is_empty() {
            continue;
        }

        match patch_file(&path, members.iter().chain(classes.iter()).copied(), dry_run) {
            Ok((changed, failures)) => {
                summary.failures += failures;
                if changed {
                    summary.files_patched += 1;
                }
            }
            Err(e) => {
                error!("{}", e);
                summary.failures += members.len() + classes.len();
            }
        }
    }

    summary
}

/// 写回单个文件，返回（是否改变, 失败单元数）
fn patch_file<'a>(
    path: &Path,
    units: impl Iterator<Item = &'a CodeUnit>,
    dry_run: bool,
) -> Result<(bool, usize), PatchError> {
    let original =
        fs::read_to_string(path).map_err(|e| PatchError::IoError(path.to_path_buf(), e))?;

    let mut content = original.clone();
    let mut failures = 0;
    for unit in units {
        let (Some(anchor), Some(generated)) = (unit.anchor_text(), unit.generated_text.as_deref())
        else {
            continue;
        };
        match splice(&unit.name, &content, anchor, generated, &unit.indent) {
            Ok(patched) => content = patched,
            Err(e) => {
                error!("Could not replace in {}: {}", path.display(), e);
                failures += 1;
            }
        }
    }

    if content == original {
        return Ok((false, failures));
    }
    if dry_run {
        info!("Dry run: {} would be updated", path.display());
    } else {
        fs::write(path, &content).map_err(|e| PatchError::IoError(path.to_path_buf(), e))?;
        info!("Updated {}", path.display());
    }
    Ok((true, failures))
}
