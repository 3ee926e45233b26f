//! 模块目录
//!
//! 以实现类名为键登记模块实现。模块清单中的 `class` 和类处理器订阅
//! 都通过目录解析，目录中不存在的类会在注册或分发时报告 `ClassNotFound`。

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::record::ModuleRecord;
use crate::core::Game;
use crate::event::EventContext;
use crate::extension::ExtensionRegistry;
use crate::utils::Result;

/// 模块实现
///
/// 所有钩子都有默认实现，模块只需覆盖自己关心的部分。
pub trait Module: Send + Sync {
    /// 注册钩子，每个模块在注册成功时恰好调用一次
    ///
    /// 可以修改即将持久化的记录（例如写入初始属性）。
    fn on_register(&self, _game: &Game, _record: &mut ModuleRecord) -> Result<()> {
        Ok(())
    }

    /// 注销钩子
    fn on_unregister(&self, _game: &Game, _record: &ModuleRecord) -> Result<()> {
        Ok(())
    }

    /// 处理订阅的事件，默认原样返回
    fn handle_event(&self, _game: &Game, context: EventContext) -> Result<EventContext> {
        Ok(context)
    }

    /// 启动时登记扩展方法
    fn register_extensions(&self, _registry: &mut ExtensionRegistry) -> Result<()> {
        Ok(())
    }
}

/// 模块目录
#[derive(Default, Clone)]
pub struct ModuleCatalog {
    classes: BTreeMap<String, Arc<dyn Module>>,
}

impl fmt::Debug for ModuleCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleCatalog")
            .field("classes", &self.classes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ModuleCatalog {
    /// 创建空目录
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记实现类，返回被替换的旧实现
    pub fn register(
        &mut self,
        class: impl Into<String>,
        module: Arc<dyn Module>,
    ) -> Option<Arc<dyn Module>> {
        let class = class.into();
        debug!(class = %class, "登记模块实现类");
        self.classes.insert(class, module)
    }

    /// 移除实现类
    pub fn remove(&mut self, class: &str) -> Option<Arc<dyn Module>> {
        self.classes.remove(class)
    }

    /// 查找实现类
    pub fn get(&self, class: &str) -> Option<Arc<dyn Module>> {
        self.classes.get(class).cloned()
    }

    /// 是否登记了实现类
    pub fn contains(&self, class: &str) -> bool {
        self.classes.contains_key(class)
    }

    /// 全部实现类名
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    /// 实现类数量
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
