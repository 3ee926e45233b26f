//! 钩子内核错误类型定义
//!
//! 本模块定义了事件分发与模块管理中使用的所有错误类型。

use thiserror::Error;

/// 钩子内核核心错误类型
#[derive(Error, Debug)]
pub enum CoreError {
    // ==================== 上下文数据错误 ====================

    /// 上下文数据不符合声明的字段约束
    #[error("上下文数据结构错误 ({schema}): {reason}")]
    SchemaError {
        /// 数据结构名称
        schema: String,
        /// 失败原因
        reason: String,
    },

    /// 访问或修改了未声明的字段
    #[error("未知字段: '{field}' (数据结构 {schema})")]
    UnknownField {
        /// 数据结构名称
        schema: String,
        /// 字段名
        field: String,
    },

    // ==================== 事件系统错误 ====================

    /// 事件名格式无效
    #[error("事件名格式无效: '{0}'")]
    InvalidEventName(String),

    /// 订阅模式格式无效
    #[error("订阅模式格式无效: '{pattern}' - {reason}")]
    InvalidPattern {
        /// 订阅模式
        pattern: String,
        /// 失败原因
        reason: String,
    },

    /// 订阅已存在
    #[error("订阅已存在: '{pattern}' -> '{handler}' (模块 {library})")]
    SubscriptionAlreadyExists {
        /// 订阅模式
        pattern: String,
        /// 处理器类名
        handler: String,
        /// 所属模块
        library: String,
    },

    /// 订阅未找到
    #[error("订阅未找到: '{pattern}' -> '{handler}' (模块 {library})")]
    SubscriptionNotFound {
        /// 订阅模式
        pattern: String,
        /// 处理器类名
        handler: String,
        /// 所属模块
        library: String,
    },

    /// 事件处理器返回的错误
    #[error("事件处理器执行失败: {0}")]
    Handler(String),

    // ==================== 模块管理错误 ====================

    /// 模块清单格式错误
    #[error("无效的模块配置 '{library}': {reason}")]
    InvalidConfiguration {
        /// 模块名
        library: String,
        /// 失败原因
        reason: String,
    },

    /// 模块已注册
    #[error("模块已注册: '{0}'")]
    ModuleAlreadyExists(String),

    /// 模块未注册
    #[error("模块未注册: '{0}'")]
    ModuleNotFound(String),

    /// 包索引中不存在该包
    #[error("包未找到: '{0}'")]
    PackageNotFound(String),

    /// 模块实现类未找到
    #[error("模块 '{library}' 的实现类未找到: '{class}'")]
    ClassNotFound {
        /// 模块名
        library: String,
        /// 实现类名
        class: String,
    },

    /// 循环依赖
    #[error("检测到循环依赖: {0}")]
    CircularDependency(String),

    /// 依赖未找到
    #[error("模块 '{library}' 的依赖未找到: '{dependency}'")]
    DependencyNotFound {
        /// 依赖方
        library: String,
        /// 依赖项
        dependency: String,
    },

    /// 依赖注册失败
    #[error("模块 '{library}' 的依赖 '{dependency}' 注册失败")]
    DependencyFailed {
        /// 依赖方
        library: String,
        /// 依赖项
        dependency: String,
    },

    /// 版本不匹配
    #[error("版本不匹配: 模块 '{library}' 需要 '{dependency}' {required}, 但找到版本 {found}")]
    VersionMismatch {
        /// 依赖方
        library: String,
        /// 依赖项
        dependency: String,
        /// 版本要求
        required: String,
        /// 实际版本
        found: String,
    },

    /// 生命周期钩子执行失败
    #[error("模块 '{library}' 的 {hook} 钩子执行失败: {reason}")]
    LifecycleHookFailed {
        /// 模块名
        library: String,
        /// 钩子名
        hook: &'static str,
        /// 失败原因
        reason: String,
    },

    // ==================== 扩展注册表错误 ====================

    /// 扩展方法已注册
    #[error("扩展方法已注册: {entity_type}::{method}")]
    ExtensionAlreadyRegistered {
        /// 实体类型
        entity_type: String,
        /// 方法名
        method: String,
    },

    /// 扩展方法未找到
    #[error("扩展方法未找到: {entity_type}::{method}")]
    ExtensionNotFound {
        /// 实体类型
        entity_type: String,
        /// 方法名
        method: String,
    },

    /// 扩展注册表状态不允许该操作
    #[error("扩展注册表状态错误: {0}")]
    ExtensionRegistryState(String),

    // ==================== 持久化错误 ====================

    /// 实体存储失败
    #[error("持久化失败: {0}")]
    Persistence(String),

    // ==================== 配置错误 ====================

    /// 配置加载失败
    #[error("配置加载失败: {0}")]
    ConfigLoadFailed(String),

    /// 配置值无效
    #[error("配置值无效: '{key}' - {reason}")]
    InvalidConfigValue {
        /// 配置键
        key: String,
        /// 失败原因
        reason: String,
    },

    // ==================== IO 和序列化错误 ====================

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML 序列化/反序列化错误
    #[error("YAML 错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// 版本解析错误
    #[error("版本解析错误: {0}")]
    VersionParse(#[from] semver::Error),

    // ==================== 通用错误 ====================

    /// 初始化失败
    #[error("初始化失败: {0}")]
    InitFailed(String),

    /// 其他错误
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// 内核操作结果类型别名
pub type Result<T> = std::result::Result<T, CoreError>;

/// 错误码常量
pub mod error_code {
    // 上下文数据错误 (CONTEXT-xxx)
    pub const CONTEXT_SCHEMA: &str = "CONTEXT-001";
    pub const CONTEXT_UNKNOWN_FIELD: &str = "CONTEXT-002";

    // 事件错误 (EVENT-xxx)
    pub const EVENT_INVALID_NAME: &str = "EVENT-001";
    pub const EVENT_INVALID_PATTERN: &str = "EVENT-002";
    pub const EVENT_SUBSCRIPTION_EXISTS: &str = "EVENT-003";
    pub const EVENT_SUBSCRIPTION_NOT_FOUND: &str = "EVENT-004";
    pub const EVENT_HANDLER_FAILED: &str = "EVENT-005";

    // 模块错误 (MODULE-xxx)
    pub const MODULE_INVALID_CONFIGURATION: &str = "MODULE-001";
    pub const MODULE_ALREADY_EXISTS: &str = "MODULE-002";
    pub const MODULE_NOT_FOUND: &str = "MODULE-003";
    pub const MODULE_CLASS_NOT_FOUND: &str = "MODULE-004";
    pub const MODULE_CIRCULAR_DEPENDENCY: &str = "MODULE-005";
    pub const MODULE_DEPENDENCY_NOT_FOUND: &str = "MODULE-006";
    pub const MODULE_VERSION_MISMATCH: &str = "MODULE-007";
    pub const MODULE_HOOK_FAILED: &str = "MODULE-008";
    pub const MODULE_PACKAGE_NOT_FOUND: &str = "MODULE-009";
    pub const MODULE_DEPENDENCY_FAILED: &str = "MODULE-010";

    // 扩展错误 (EXTENSION-xxx)
    pub const EXTENSION_EXISTS: &str = "EXTENSION-001";
    pub const EXTENSION_NOT_FOUND: &str = "EXTENSION-002";
    pub const EXTENSION_STATE: &str = "EXTENSION-003";

    // 持久化错误 (STORE-xxx)
    pub const STORE_FAILED: &str = "STORE-001";

    // 配置错误 (CONFIG-xxx)
    pub const CONFIG_LOAD_FAILED: &str = "CONFIG-001";
    pub const CONFIG_INVALID_VALUE: &str = "CONFIG-002";
}

impl CoreError {
    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::SchemaError { .. } => error_code::CONTEXT_SCHEMA,
            CoreError::UnknownField { .. } => error_code::CONTEXT_UNKNOWN_FIELD,
            CoreError::InvalidEventName(_) => error_code::EVENT_INVALID_NAME,
            CoreError::InvalidPattern { .. } => error_code::EVENT_INVALID_PATTERN,
            CoreError::SubscriptionAlreadyExists { .. } => error_code::EVENT_SUBSCRIPTION_EXISTS,
            CoreError::SubscriptionNotFound { .. } => error_code::EVENT_SUBSCRIPTION_NOT_FOUND,
            CoreError::Handler(_) => error_code::EVENT_HANDLER_FAILED,
            CoreError::InvalidConfiguration { .. } => error_code::MODULE_INVALID_CONFIGURATION,
            CoreError::ModuleAlreadyExists(_) => error_code::MODULE_ALREADY_EXISTS,
            CoreError::ModuleNotFound(_) => error_code::MODULE_NOT_FOUND,
            CoreError::ClassNotFound { .. } => error_code::MODULE_CLASS_NOT_FOUND,
            CoreError::CircularDependency(_) => error_code::MODULE_CIRCULAR_DEPENDENCY,
            CoreError::DependencyNotFound { .. } => error_code::MODULE_DEPENDENCY_NOT_FOUND,
            CoreError::VersionMismatch { .. } => error_code::MODULE_VERSION_MISMATCH,
            CoreError::LifecycleHookFailed { .. } => error_code::MODULE_HOOK_FAILED,
            CoreError::PackageNotFound(_) => error_code::MODULE_PACKAGE_NOT_FOUND,
            CoreError::DependencyFailed { .. } => error_code::MODULE_DEPENDENCY_FAILED,
            CoreError::ExtensionAlreadyRegistered { .. } => error_code::EXTENSION_EXISTS,
            CoreError::ExtensionNotFound { .. } => error_code::EXTENSION_NOT_FOUND,
            CoreError::ExtensionRegistryState(_) => error_code::EXTENSION_STATE,
            CoreError::Persistence(_) => error_code::STORE_FAILED,
            CoreError::ConfigLoadFailed(_) => error_code::CONFIG_LOAD_FAILED,
            CoreError::InvalidConfigValue { .. } => error_code::CONFIG_INVALID_VALUE,
            _ => "UNKNOWN",
        }
    }

    /// 编排层是否把该错误视为成功（幂等注册）
    pub fn is_benign(&self) -> bool {
        matches!(self, CoreError::ModuleAlreadyExists(_))
    }

    /// 构造处理器错误
    pub fn handler(reason: impl Into<String>) -> Self {
        CoreError::Handler(reason.into())
    }

    /// 构造持久化错误
    pub fn persistence(reason: impl std::fmt::Display) -> Self {
        CoreError::Persistence(reason.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::ModuleAlreadyExists("lotgd/village".to_string());
        assert!(err.to_string().contains("lotgd/village"));

        let err = CoreError::UnknownField {
            schema: "Generic".to_string(),
            field: "hp".to_string(),
        };
        assert!(err.to_string().contains("hp"));
    }

    #[test]
    fn test_error_code() {
        let err = CoreError::ClassNotFound {
            library: "lotgd/village".to_string(),
            class: "village".to_string(),
        };
        assert_eq!(err.error_code(), error_code::MODULE_CLASS_NOT_FOUND);

        let err = CoreError::CircularDependency("a -> b -> a".to_string());
        assert_eq!(err.error_code(), error_code::MODULE_CIRCULAR_DEPENDENCY);
    }

    #[test]
    fn test_benign_errors() {
        assert!(CoreError::ModuleAlreadyExists("a/b".to_string()).is_benign());
        assert!(!CoreError::ModuleNotFound("a/b".to_string()).is_benign());
        assert!(!CoreError::handler("boom").is_benign());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let core_err: CoreError = io_err.into();
        assert!(matches!(core_err, CoreError::Io(_)));
    }
}
