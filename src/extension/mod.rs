//! 扩展方法注册表
//!
//! 以 (实体类型, 方法名) 为键登记回调，让模块在启动阶段为核心实体
//! 追加方法。注册表有明确的生命周期：
//!
//! ```text
//! Open ──finish_init──▶ Ready ──teardown──▶ TornDown
//! ```
//!
//! - `Open`: 只允许登记
//! - `Ready`: 只允许调用
//! - `TornDown`: 所有操作都被拒绝

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::utils::{CoreError, Result};

/// 扩展方法
///
/// 接收目标实体与参数，返回 JSON 值。
pub type ExtensionFn = Arc<dyn Fn(&dyn Extendable, &[Value]) -> Result<Value> + Send + Sync>;

/// 可扩展实体
///
/// 实体通过实现此特征声明自己接受扩展方法。
pub trait Extendable {
    /// 实体类型名，作为注册表键的一部分
    fn entity_type(&self) -> &'static str;

    /// 用于在扩展方法中还原具体类型
    fn as_any(&self) -> &dyn Any;
}

/// 注册表生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryState {
    /// 启动中，接受登记
    Open,
    /// 初始化完成，接受调用
    Ready,
    /// 已销毁
    TornDown,
}

impl fmt::Display for RegistryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegistryState::Open => "open",
            RegistryState::Ready => "ready",
            RegistryState::TornDown => "torn-down",
        };
        f.write_str(name)
    }
}

/// 扩展方法注册表
pub struct ExtensionRegistry {
    methods: BTreeMap<(String, String), ExtensionFn>,
    state: RegistryState,
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("state", &self.state)
            .finish()
    }
}

impl ExtensionRegistry {
    /// 创建处于 `Open` 状态的注册表
    pub fn new() -> Self {
        Self {
            methods: BTreeMap::new(),
            state: RegistryState::Open,
        }
    }

    /// 当前状态
    pub fn state(&self) -> RegistryState {
        self.state
    }

    fn expect_state(&self, expected: RegistryState, action: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(CoreError::ExtensionRegistryState(format!(
                "{} 需要注册表处于 {} 状态，当前为 {}",
                action, expected, self.state
            )))
        }
    }

    /// 登记扩展方法
    ///
    /// # Errors
    ///
    /// - 注册表不处于 `Open` 状态时返回 `ExtensionRegistryState`
    /// - 同一 (实体类型, 方法名) 已登记时返回 `ExtensionAlreadyRegistered`
    pub fn register<F>(&mut self, entity_type: &str, method: &str, callback: F) -> Result<()>
    where
        F: Fn(&dyn Extendable, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.expect_state(RegistryState::Open, "登记扩展方法")?;

        let key = (entity_type.to_string(), method.to_string());
        if self.methods.contains_key(&key) {
            return Err(CoreError::ExtensionAlreadyRegistered {
                entity_type: key.0,
                method: key.1,
            });
        }

        debug!(entity_type = %entity_type, method = %method, "登记扩展方法");
        self.methods.insert(key, Arc::new(callback));
        Ok(())
    }

    /// 结束登记阶段，进入 `Ready` 状态
    pub fn finish_init(&mut self) -> Result<()> {
        self.expect_state(RegistryState::Open, "结束初始化")?;
        self.state = RegistryState::Ready;
        info!(methods = self.methods.len(), "扩展注册表初始化完成");
        Ok(())
    }

    /// 销毁注册表，清空所有方法
    ///
    /// 重复销毁是无操作。
    pub fn teardown(&mut self) {
        if self.state != RegistryState::TornDown {
            self.methods.clear();
            self.state = RegistryState::TornDown;
            info!("扩展注册表已销毁");
        }
    }

    /// 是否已登记指定方法
    pub fn has(&self, entity_type: &str, method: &str) -> bool {
        self.methods
            .contains_key(&(entity_type.to_string(), method.to_string()))
    }

    /// 指定实体类型的全部方法名
    pub fn methods_for<'a>(&'a self, entity_type: &'a str) -> impl Iterator<Item = &'a str> {
        self.methods
            .keys()
            .filter(move |(ty, _)| ty == entity_type)
            .map(|(_, method)| method.as_str())
    }

    /// 已登记的方法数量
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// 是否没有登记任何方法
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// 在实体上调用扩展方法
    ///
    /// # Errors
    ///
    /// - 注册表不处于 `Ready` 状态时返回 `ExtensionRegistryState`
    /// - 方法未登记时返回 `ExtensionNotFound`
    pub fn call(&self, entity: &dyn Extendable, method: &str, args: &[Value]) -> Result<Value> {
        self.expect_state(RegistryState::Ready, "调用扩展方法")?;

        let entity_type = entity.entity_type();
        let callback = self
            .methods
            .get(&(entity_type.to_string(), method.to_string()))
            .ok_or_else(|| CoreError::ExtensionNotFound {
                entity_type: entity_type.to_string(),
                method: method.to_string(),
            })?;
        callback(entity, args)
    }
}
