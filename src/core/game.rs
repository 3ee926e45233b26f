//! 游戏上下文
//!
//! [`Game`] 持有一次运行所需的全部协作者：配置、事件管理器、模块目录、
//! 实体存储与扩展注册表。它作为参数传给每个事件处理器和生命周期钩子。
//!
//! # 示例
//!
//! ```rust
//! use lotgd_core::core::Game;
//! use lotgd_core::event::ContextData;
//!
//! let game = Game::builder().build();
//! let data = ContextData::empty();
//! let result = game.publish("h/lotgd/core/idle", data.clone()).unwrap();
//! assert!(ContextData::ptr_eq(&data, &result));
//! ```

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::config::CoreConfig;
use crate::event::{ContextData, EventManager, EventManagerConfig};
use crate::extension::{Extendable, ExtensionRegistry};
use crate::module::{Module, ModuleCatalog};
use crate::store::{EntityStore, FileStore, MemoryStore};
use crate::utils::Result;

/// 游戏上下文
pub struct Game {
    config: CoreConfig,
    events: EventManager,
    catalog: ModuleCatalog,
    store: Arc<dyn EntityStore>,
    extensions: ExtensionRegistry,
}

impl fmt::Debug for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Game")
            .field("events", &self.events)
            .field("catalog", &self.catalog)
            .field("store", &self.store)
            .field("extensions", &self.extensions)
            .finish()
    }
}

impl Game {
    /// 创建构建器
    pub fn builder() -> GameBuilder {
        GameBuilder::default()
    }

    /// 按配置创建
    ///
    /// 设置了 `modules.store_path` 时使用文件存储（相对路径基于 `data_dir`），
    /// 否则使用内存存储。
    pub fn from_config(config: CoreConfig) -> Result<Self> {
        let builder = match &config.modules.store_path {
            Some(path) => {
                let path = config.resolve_path(path);
                Game::builder().store(Arc::new(FileStore::open(path)?))
            }
            None => Game::builder(),
        };
        Ok(builder.config(config).build())
    }

    /// 配置
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// 事件管理器
    pub fn events(&self) -> &EventManager {
        &self.events
    }

    /// 事件管理器（可变）
    pub fn events_mut(&mut self) -> &mut EventManager {
        &mut self.events
    }

    /// 模块目录
    pub fn catalog(&self) -> &ModuleCatalog {
        &self.catalog
    }

    /// 模块目录（可变）
    pub fn catalog_mut(&mut self) -> &mut ModuleCatalog {
        &mut self.catalog
    }

    /// 实体存储
    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    /// 扩展注册表
    pub fn extensions(&self) -> &ExtensionRegistry {
        &self.extensions
    }

    /// 扩展注册表（可变）
    pub fn extensions_mut(&mut self) -> &mut ExtensionRegistry {
        &mut self.extensions
    }

    /// 发布事件
    pub fn publish(&self, event: &str, data: ContextData) -> Result<ContextData> {
        self.events.publish(self, event, data)
    }

    /// 调用实体的扩展方法
    pub fn call_extension(
        &self,
        entity: &dyn Extendable,
        method: &str,
        args: &[Value],
    ) -> Result<Value> {
        self.extensions.call(entity, method, args)
    }

    /// 提交存储中暂存的写入
    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }

    /// 关闭：拆除扩展注册表
    ///
    /// 存储中仍有未提交的写入时只记录警告，不会自动提交。
    pub fn shutdown(&mut self) {
        if self.store.has_pending() {
            warn!("存储中仍有未提交的写入");
        }
        self.extensions.teardown();
        info!("游戏上下文已关闭");
    }
}

/// 游戏上下文构建器
#[derive(Default)]
pub struct GameBuilder {
    config: CoreConfig,
    catalog: ModuleCatalog,
    store: Option<Arc<dyn EntityStore>>,
}

impl GameBuilder {
    /// 设置配置
    pub fn config(mut self, config: CoreConfig) -> Self {
        self.config = config;
        self
    }

    /// 设置实体存储
    pub fn store(mut self, store: Arc<dyn EntityStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 登记模块实现类
    pub fn module(mut self, class: impl Into<String>, module: Arc<dyn Module>) -> Self {
        self.catalog.register(class, module);
        self
    }

    /// 替换整个模块目录
    pub fn catalog(mut self, catalog: ModuleCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// 构建游戏上下文
    pub fn build(self) -> Game {
        let events = EventManager::with_config(EventManagerConfig {
            collect_stats: self.config.events.stats,
        });
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));

        debug!(classes = self.catalog.len(), "创建游戏上下文");
        Game {
            config: self.config,
            events,
            catalog: self.catalog,
            store,
            extensions: ExtensionRegistry::new(),
        }
    }
}
