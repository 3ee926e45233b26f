//! 模块管理模块
//!
//! 包含模块管理系统的核心组件：
//! - 模块实现目录与生命周期钩子
//! - 模块清单解析与校验
//! - 依赖图与安装顺序
//! - 模块记录与属性
//! - 注册、注销、启动与一致性校验

pub mod catalog;
pub mod dependency;
pub mod manager;
pub mod manifest;
pub mod record;

// 重导出常用类型
pub use catalog::{Module, ModuleCatalog};
pub use dependency::DependencyGraph;
pub use manager::{InstallFailure, InstallReport, ModuleManager};
pub use manifest::{is_valid_library_name, LibraryConfig};
pub use record::{ModuleRecord, PropertyStore, MODULE_ENTITY};
