//! JSON 文件存储
//!
//! 在内存存储之上，把每次提交的状态写入一个 JSON 文件。
//! 写入先落到同目录的临时文件，再重命名覆盖目标文件。

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::memory::MemoryStore;
use super::{EntityStore, StoreState, SubscriptionRecord};
use crate::module::ModuleRecord;
use crate::utils::{CoreError, Result};

/// JSON 文件实体存储
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    memory: MemoryStore,
}

impl FileStore {
    /// 打开存储文件；文件不存在时从空状态开始
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            Self::load_state(&path)?
        } else {
            debug!(path = %path.display(), "存储文件不存在，使用空状态");
            StoreState::default()
        };

        info!(
            path = %path.display(),
            modules = state.modules.len(),
            subscriptions = state.subscriptions.len(),
            "打开文件存储"
        );

        Ok(Self {
            path,
            memory: MemoryStore::from_state(state),
        })
    }

    /// 读取存储文件内容
    pub fn load_state(path: &Path) -> Result<StoreState> {
        let content = fs::read_to_string(path).map_err(|e| {
            CoreError::persistence(format!("无法读取存储文件 {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            CoreError::persistence(format!("存储文件格式错误 {}: {}", path.display(), e))
        })
    }

    /// 存储文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_state(&self, state: &StoreState) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                CoreError::persistence(format!("无法创建目录 {}: {}", parent.display(), e))
            })?;
        }

        let content = serde_json::to_string_pretty(state)?;
        let temp = self.path.with_extension("json.tmp");
        fs::write(&temp, content).map_err(|e| {
            CoreError::persistence(format!("无法写入临时文件 {}: {}", temp.display(), e))
        })?;
        fs::rename(&temp, &self.path).map_err(|e| {
            CoreError::persistence(format!("无法替换存储文件 {}: {}", self.path.display(), e))
        })?;
        Ok(())
    }
}

impl EntityStore for FileStore {
    fn find_module(&self, library: &str) -> Result<Option<ModuleRecord>> {
        self.memory.find_module(library)
    }

    fn modules(&self) -> Result<Vec<ModuleRecord>> {
        self.memory.modules()
    }

    fn persist_module(&self, record: &ModuleRecord) -> Result<()> {
        self.memory.persist_module(record)
    }

    fn remove_module(&self, library: &str) -> Result<bool> {
        self.memory.remove_module(library)
    }

    fn subscriptions(&self) -> Result<Vec<SubscriptionRecord>> {
        self.memory.subscriptions()
    }

    fn persist_subscription(&self, record: &SubscriptionRecord) -> Result<()> {
        self.memory.persist_subscription(record)
    }

    fn remove_subscriptions(&self, library: &str) -> Result<usize> {
        self.memory.remove_subscriptions(library)
    }

    fn flush(&self) -> Result<()> {
        // 先落盘，成功后才提交内存状态
        let working = self.memory.working();
        self.write_state(&working)?;
        self.memory.flush()?;
        debug!(path = %self.path.display(), "存储已写入文件");
        Ok(())
    }

    fn discard(&self) -> Result<()> {
        self.memory.discard()
    }

    fn has_pending(&self) -> bool {
        self.memory.has_pending()
    }
}
