//! 贪心调度
//!
//! 每次从剩余的自定义单元中选出未文档化依赖最少的一个（平局按发现顺序）。
//! 计数在每次选择时实时计算，依赖环不会阻塞调度。

use super::store::CodeUnitStore;

#[derive(Debug, Default)]
pub struct Scheduler {
    /// 剩余单元，保持发现顺序
    remaining: Vec<String>,
}

impl Scheduler {
    pub fn new(names: Vec<String>) -> Self {
        Self { remaining: names }
    }

    pub fn len(&self) -> usize {
        self.remaining.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }

    /// 选出并移除下一个单元
    pub fn next(&mut self, store: &CodeUnitStore) -> Option<String> {
        let (index, _) = self
            .remaining
            .iter()
            .enumerate()
            .min_by_key(|(i, name)| (store.undocumented_dependency_count(name), *i))?;
        Some(self.remaining.remove(index))
    }
}
