//! 内存存储
//!
//! 维护工作副本与已提交副本两份状态。`flush` 把工作副本提交，
//! `discard` 把工作副本回滚到上次提交的状态。

use parking_lot::RwLock;
use tracing::{debug, trace};

use super::{EntityStore, StoreState, SubscriptionRecord};
use crate::module::ModuleRecord;
use crate::utils::Result;

/// 内存实体存储
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// 工作副本
    working: RwLock<StoreState>,
    /// 已提交副本
    committed: RwLock<StoreState>,
}

impl MemoryStore {
    /// 创建空存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 以已提交状态创建存储
    pub fn from_state(state: StoreState) -> Self {
        Self {
            working: RwLock::new(state.clone()),
            committed: RwLock::new(state),
        }
    }

    /// 已提交状态的快照
    pub fn committed(&self) -> StoreState {
        self.committed.read().clone()
    }

    /// 工作副本的快照
    pub fn working(&self) -> StoreState {
        self.working.read().clone()
    }
}

impl EntityStore for MemoryStore {
    fn find_module(&self, library: &str) -> Result<Option<ModuleRecord>> {
        Ok(self.working.read().module(library).cloned())
    }

    fn modules(&self) -> Result<Vec<ModuleRecord>> {
        Ok(self.working.read().modules.clone())
    }

    fn persist_module(&self, record: &ModuleRecord) -> Result<()> {
        trace!(library = %record.library(), "写入模块记录");
        self.working.write().upsert_module(record);
        Ok(())
    }

    fn remove_module(&self, library: &str) -> Result<bool> {
        let mut state = self.working.write();
        let before = state.modules.len();
        state.modules.retain(|m| m.library() != library);
        Ok(state.modules.len() != before)
    }

    fn subscriptions(&self) -> Result<Vec<SubscriptionRecord>> {
        Ok(self.working.read().subscriptions.clone())
    }

    fn persist_subscription(&self, record: &SubscriptionRecord) -> Result<()> {
        let mut state = self.working.write();
        if !state.subscriptions.contains(record) {
            trace!(pattern = %record.pattern, library = %record.library, "写入订阅记录");
            state.subscriptions.push(record.clone());
        }
        Ok(())
    }

    fn remove_subscriptions(&self, library: &str) -> Result<usize> {
        let mut state = self.working.write();
        let before = state.subscriptions.len();
        state.subscriptions.retain(|s| s.library != library);
        Ok(before - state.subscriptions.len())
    }

    fn flush(&self) -> Result<()> {
        let working = self.working.read().clone();
        debug!(
            modules = working.modules.len(),
            subscriptions = working.subscriptions.len(),
            "提交存储写入"
        );
        *self.committed.write() = working;
        Ok(())
    }

    fn discard(&self) -> Result<()> {
        let committed = self.committed.read().clone();
        debug!("丢弃未提交的存储写入");
        *self.working.write() = committed;
        Ok(())
    }

    fn has_pending(&self) -> bool {
        *self.working.read() != *self.committed.read()
    }
}
