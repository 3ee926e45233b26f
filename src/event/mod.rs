//! 事件系统
//!
//! - [`ContextData`]: 不可变、受字段声明约束的事件负载
//! - [`EventContext`]: 单个处理器看到的分发视图
//! - [`EventPattern`]: 事件名与订阅模式的解析和匹配
//! - [`EventManager`]: 有序订阅注册表与同步分发

pub mod context;
pub mod context_data;
pub mod manager;
pub mod pattern;

pub use context::EventContext;
pub use context_data::{ContextData, ContextSchema, FieldKind, FieldSpec, GENERIC_SCHEMA};
pub use manager::{
    DispatchStats, EventManager, EventManagerConfig, HandlerCallback, HandlerRef, Subscription,
};
pub use pattern::{is_valid_event_name, validate_event_name, EventPattern, WILDCARD};
