//! 代码单元存储
//!
//! 限定名到代码单元的映射，即依赖图本身。查询永不失败：未知名称返回默认记录；
//! 依赖计数每次根据当前依赖列表实时计算。

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use super::types::{CodeUnit, UnitUpdate};

/// 传给生成请求的参考文档
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceDoc {
    pub name: String,
    pub doc: String,
}

/// 代码单元存储（保持发现顺序）
#[derive(Debug, Default)]
pub struct CodeUnitStore {
    units: HashMap<String, CodeUnit>,
    order: Vec<String>,
}

impl CodeUnitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.units.contains_key(name)
    }

    /// 获取代码单元，不存在时返回默认记录
    pub fn get(&self, name: &str) -> Cow<'_, CodeUnit> {
        match self.units.get(name) {
            Some(unit) => Cow::Borrowed(unit),
            None => Cow::Owned(CodeUnit::stub(name)),
        }
    }

    /// 合并部分更新
    ///
    /// 不存在时先创建默认记录；依赖只追加尚未出现的名称，并逐个注册为桩；
    /// 其余字段为 `Some` 时直接覆盖。
    pub fn merge(&mut self, name: &str, update: UnitUpdate) {
        let UnitUpdate {
            kind,
            original_text,
            tree,
            dependencies,
            path,
            indent,
            custom,
            documentation,
            documentation_short,
            generated_text,
            base_text,
            state,
        } = update;

        let unit = self.entry(name);
        if let Some(kind) = kind {
            unit.kind = kind;
        }
        if let Some(text) = original_text {
            unit.original_text = Some(text);
        }
        if let Some(tree) = tree {
            unit.tree = Some(tree);
        }
        if let Some(path) = path {
            unit.path = Some(path);
        }
        if let Some(indent) = indent {
            unit.indent = indent;
        }
        if let Some(custom) = custom {
            unit.custom = custom;
        }
        if let Some(doc) = documentation {
            unit.documentation = Some(doc);
        }
        if let Some(short) = documentation_short {
            unit.documentation_short = Some(short);
        }
        if let Some(text) = generated_text {
            unit.generated_text = Some(text);
        }
        if let Some(text) = base_text {
            unit.base_text = Some(text);
        }
        if let Some(state) = state {
            unit.state = state;
        }

        let mut added = Vec::new();
        for dep in dependencies {
            if dep != name && !unit.dependencies.contains(&dep) {
                unit.dependencies.push(dep.clone());
                added.push(dep);
            }
        }
        for dep in added {
            self.merge(&dep, UnitUpdate::default());
        }
    }

    fn entry(&mut self, name: &str) -> &mut CodeUnit {
        if !self.units.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.units
            .entry(name.to_string())
            .or_insert_with(|| CodeUnit::stub(name))
    }

    /// 依赖总数
    pub fn dependency_count(&self, name: &str) -> usize {
        self.units.get(name).map_or(0, |u| u.dependencies.len())
    }

    /// 已有文档的依赖数
    pub fn documented_dependency_count(&self, name: &str) -> usize {
        self.units.get(name).map_or(0, |u| {
            u.dependencies
                .iter()
                .filter(|d| self.get(d).is_documented())
                .count()
        })
    }

    /// 尚无文档的依赖数
    pub fn undocumented_dependency_count(&self, name: &str) -> usize {
        self.dependency_count(name) - self.documented_dependency_count(name)
    }

    /// 按发现顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = &CodeUnit> {
        self.order.iter().filter_map(|name| self.units.get(name))
    }

    /// 项目中定义的单元名
    pub fn custom_names(&self) -> Vec<String> {
        self.iter()
            .filter(|u| u.custom)
            .map(|u| u.name.clone())
            .collect()
    }

    /// 无依赖的单元名
    pub fn leaf_names(&self) -> Vec<String> {
        self.iter()
            .filter(|u| u.dependencies.is_empty())
            .map(|u| u.name.clone())
            .collect()
    }

    /// 按所在文件分组的自定义单元（文件按首次出现排序）
    pub fn units_by_path(&self) -> Vec<(PathBuf, Vec<&CodeUnit>)> {
        let mut groups: Vec<(PathBuf, Vec<&CodeUnit>)> = Vec::new();
        for unit in self.iter().filter(|u| u.custom) {
            let Some(path) = &unit.path else {
                continue;
            };
            match groups.iter_mut().find(|(p, _)| p == path) {
                Some((_, units)) => units.push(unit),
                None => groups.push((path.clone(), vec![unit])),
            }
        }
        groups
    }

    /// 直接依赖中已有简短文档的部分
    pub fn reference_docs(&self, name: &str) -> Vec<ReferenceDoc> {
        let Some(unit) = self.units.get(name) else {
            return Vec::new();
        };
        unit.dependencies
            .iter()
            .filter_map(|dep| {
                self.units.get(dep).and_then(|d| {
                    d.documentation_short.as_ref().map(|doc| ReferenceDoc {
                        name: dep.clone(),
                        doc: doc.clone(),
                    })
                })
            })
            .collect()
    }
}

impl fmt::Display for CodeUnitStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let custom: Vec<&CodeUnit> = self.iter().filter(|u| u.custom).collect();
        let external: Vec<&CodeUnit> = self.iter().filter(|u| !u.custom).collect();

        writeln!(f, "Custom ({}):", custom.len())?;
        for unit in custom {
            writeln!(
                f,
                "  {:<9} `{}` dependencies: {}, documented: {}",
                unit.kind.to_string(),
                unit.name,
                self.dependency_count(&unit.name),
                self.documented_dependency_count(&unit.name)
            )?;
        }
        writeln!(f, "Reference ({}):", external.len())?;
        let names: Vec<String> = external.iter().map(|u| format!("`{}`", u.name)).collect();
        write!(f, "  {}", names.join(", "))
    }
}
