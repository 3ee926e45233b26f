//! 实体存储
//!
//! 模块记录与订阅记录的持久化协作者。所有写入先进入工作副本，
//! 由调用方通过 [`EntityStore::flush`] 决定何时提交，
//! 或通过 [`EntityStore::discard`] 丢弃未提交的写入。

pub mod file;
pub mod memory;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::module::ModuleRecord;
use crate::utils::Result;

pub use file::FileStore;
pub use memory::MemoryStore;

/// 持久化的订阅记录
///
/// 只有引用模块实现类的订阅会被持久化。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    /// 订阅模式
    pub pattern: String,
    /// 处理器实现类
    pub class: String,
    /// 所属模块
    pub library: String,
}

impl SubscriptionRecord {
    /// 创建订阅记录
    pub fn new(
        pattern: impl Into<String>,
        class: impl Into<String>,
        library: impl Into<String>,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            class: class.into(),
            library: library.into(),
        }
    }
}

/// 存储内容快照
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreState {
    /// 模块记录（注册顺序）
    #[serde(default)]
    pub modules: Vec<ModuleRecord>,
    /// 订阅记录（注册顺序）
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionRecord>,
}

impl StoreState {
    /// 查找模块记录
    pub fn module(&self, library: &str) -> Option<&ModuleRecord> {
        self.modules.iter().find(|m| m.library() == library)
    }

    /// 插入或替换模块记录，替换时保留原有位置
    pub fn upsert_module(&mut self, record: &ModuleRecord) {
        match self
            .modules
            .iter_mut()
            .find(|m| m.library() == record.library())
        {
            Some(existing) => *existing = record.clone(),
            None => self.modules.push(record.clone()),
        }
    }

    /// 指定模块的订阅记录
    pub fn subscriptions_of<'a>(
        &'a self,
        library: &'a str,
    ) -> impl Iterator<Item = &'a SubscriptionRecord> {
        self.subscriptions.iter().filter(move |s| s.library == library)
    }
}

/// 实体存储接口
pub trait EntityStore: Send + Sync + fmt::Debug {
    /// 查找模块记录
    fn find_module(&self, library: &str) -> Result<Option<ModuleRecord>>;

    /// 所有模块记录（注册顺序）
    fn modules(&self) -> Result<Vec<ModuleRecord>>;

    /// 写入模块记录（不存在则插入，存在则替换）
    fn persist_module(&self, record: &ModuleRecord) -> Result<()>;

    /// 删除模块记录，返回记录是否存在
    fn remove_module(&self, library: &str) -> Result<bool>;

    /// 所有订阅记录（注册顺序）
    fn subscriptions(&self) -> Result<Vec<SubscriptionRecord>>;

    /// 写入订阅记录，已存在时不重复写入
    fn persist_subscription(&self, record: &SubscriptionRecord) -> Result<()>;

    /// 删除模块的全部订阅记录，返回删除数量
    fn remove_subscriptions(&self, library: &str) -> Result<usize>;

    /// 提交全部未提交的写入
    fn flush(&self) -> Result<()>;

    /// 丢弃全部未提交的写入
    fn discard(&self) -> Result<()>;

    /// 是否存在未提交的写入
    fn has_pending(&self) -> bool;

    /// 指定模块的订阅记录
    fn subscriptions_of(&self, library: &str) -> Result<Vec<SubscriptionRecord>> {
        Ok(self
            .subscriptions()?
            .into_iter()
            .filter(|s| s.library == library)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_keeps_position() {
        let mut state = StoreState::default();
        state.upsert_module(&ModuleRecord::new("lotgd/one"));
        state.upsert_module(&ModuleRecord::new("lotgd/two"));

        let mut updated = ModuleRecord::new("lotgd/one");
        updated.set_enabled(false);
        state.upsert_module(&updated);

        assert_eq!(state.modules.len(), 2);
        assert_eq!(state.modules[0].library(), "lotgd/one");
        assert!(!state.modules[0].is_enabled());
        assert!(state.module("lotgd/two").is_some());
    }

    #[test]
    fn test_state_json_shape() {
        let state = StoreState {
            modules: vec![],
            subscriptions: vec![SubscriptionRecord::new("h/a/*", "a/b", "a/b")],
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["subscriptions"][0]["class"], "a/b");

        let parsed: StoreState = serde_json::from_str("{}").unwrap();
        assert!(parsed.modules.is_empty());
    }
}
