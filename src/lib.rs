//! # LotGD Core - 事件钩子与模块生命周期
//!
//! 文字游戏运行时的核心组件，提供以下功能：
//!
//! - **事件分发**: 按注册顺序同步调用匹配的处理器，处理器之间传递不可变的上下文数据
//! - **模块管理**: 模块的注册、注销、按依赖顺序安装和一致性校验
//! - **扩展注册表**: 为实体类型登记扩展方法
//! - **配置管理**: YAML/JSON 配置加载
//! - **日志系统**: 基于 tracing 的结构化日志
//!
//! ## 快速开始
//!
//! ```rust
//! use lotgd_core::{ContextData, Game, HandlerRef};
//! use serde_json::json;
//!
//! let mut game = Game::builder().build();
//! game.events_mut()
//!     .subscribe(
//!         "h/lotgd/core/navigate/*",
//!         HandlerRef::callback("double-gold", |_game, mut context| {
//!             let gold = context.get_data_field("gold")?.as_i64().unwrap_or(0);
//!             context.set_data_field("gold", gold * 2)?;
//!             Ok(context)
//!         }),
//!         "lotgd/bank",
//!     )
//!     .unwrap();
//!
//! let data = ContextData::from_json(json!({"gold": 21})).unwrap();
//! let result = game.publish("h/lotgd/core/navigate/bank", data).unwrap();
//! assert_eq!(result.get("gold").unwrap(), &json!(42));
//! ```
//!
//! ## 模块结构
//!
//! - `event` - 事件名、上下文数据与事件管理器
//! - `module` - 模块清单、依赖图与模块管理器
//! - `package` - 包描述与包索引
//! - `store` - 模块记录与订阅的持久化
//! - `extension` - 扩展方法注册表
//! - `core` - 运行时配置和游戏上下文
//! - `utils` - 错误类型与日志

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod core;
pub mod event;
pub mod extension;
pub mod module;
pub mod package;
pub mod store;
pub mod utils;

// 重导出常用类型，方便使用
pub use event::{
    ContextData, ContextSchema, DispatchStats, EventContext, EventManager, EventPattern,
    FieldKind, HandlerRef, Subscription,
};

pub use module::{
    DependencyGraph, InstallReport, LibraryConfig, Module, ModuleCatalog, ModuleManager,
    ModuleRecord, PropertyStore,
};

pub use extension::{Extendable, ExtensionRegistry, RegistryState};
pub use package::{Package, PackageIndex, PackageProvider};
pub use store::{EntityStore, FileStore, MemoryStore, SubscriptionRecord};

pub use utils::{error_code, CoreError, Result};
pub use utils::logger::{LogGuard, Logger, LoggerConfig, LoggerConfigBuilder, RotationStrategy};

pub use core::config::{CoreConfig, CoreConfigBuilder, EventsConfig, LogConfig, ModuleConfig};
pub use core::game::{Game, GameBuilder};

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
