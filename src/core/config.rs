//! 运行时配置
//!
//! 定义运行时的配置结构和加载逻辑。配置文件按扩展名识别：`.json` 使用 JSON，
//! 其余按 YAML 解析。

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::package::MODULE_KIND;
use crate::utils::{CoreError, Result};

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否输出到文件
    #[serde(default)]
    pub file_output: bool,

    /// 日志文件目录
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// 是否输出 JSON 格式
    #[serde(default)]
    pub json_format: bool,

    /// 日志轮转策略
    #[serde(default = "default_rotation")]
    pub rotation: String,

    /// 保留日志文件数
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

fn default_max_files() -> usize {
    7
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: false,
            log_dir: None,
            json_format: false,
            rotation: default_rotation(),
            max_files: default_max_files(),
        }
    }
}

/// 模块管理配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// 包索引文件（YAML 或 JSON）
    #[serde(default)]
    pub package_index: Option<PathBuf>,

    /// 模块记录存储文件（JSON），未设置时使用内存存储
    #[serde(default)]
    pub store_path: Option<PathBuf>,

    /// 视为模块的包类型
    #[serde(default = "default_module_kind")]
    pub module_kind: String,
}

fn default_module_kind() -> String {
    MODULE_KIND.to_string()
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            package_index: None,
            store_path: None,
            module_kind: default_module_kind(),
        }
    }
}

/// 事件配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsConfig {
    /// 是否收集分发统计
    #[serde(default = "default_true")]
    pub stats: bool,
}

fn default_true() -> bool {
    true
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { stats: true }
    }
}

/// 运行时配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// 配置文件路径
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// 日志配置
    #[serde(default)]
    pub logging: LogConfig,

    /// 模块管理配置
    #[serde(default)]
    pub modules: ModuleConfig,

    /// 事件配置
    #[serde(default)]
    pub events: EventsConfig,

    /// 是否为开发模式
    #[serde(default)]
    pub dev_mode: bool,

    /// 数据目录
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl CoreConfig {
    /// 创建配置构建器
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::new()
    }

    /// 从文件加载配置
    pub async fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            CoreError::ConfigLoadFailed(format!("读取 {} 失败: {}", path.display(), e))
        })?;
        Self::parse(&content, path)
    }

    /// 从文件加载配置（同步版本）
    pub fn from_file_sync(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| {
            CoreError::ConfigLoadFailed(format!("读取 {} 失败: {}", path.display(), e))
        })?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: PathBuf) -> Result<Self> {
        let mut config: CoreConfig = if is_json(&path) {
            serde_json::from_str(content)?
        } else {
            serde_yaml::from_str(content)?
        };

        config.config_path = Some(path);
        config.validate()?;
        Ok(config)
    }

    /// 校验配置值
    pub fn validate(&self) -> Result<()> {
        if self.modules.module_kind.trim().is_empty() {
            return Err(CoreError::InvalidConfigValue {
                key: "modules.module_kind".to_string(),
                reason: "不能为空".to_string(),
            });
        }
        if self.logging.file_output && self.logging.log_dir.is_none() {
            return Err(CoreError::InvalidConfigValue {
                key: "logging.log_dir".to_string(),
                reason: "启用文件日志时必须设置日志目录".to_string(),
            });
        }
        Ok(())
    }

    /// 合并另一个配置（用于覆盖）
    pub fn merge(&mut self, other: CoreConfig) {
        // 只覆盖非默认值的配置
        if other.logging.level != default_log_level() {
            self.logging.level = other.logging.level;
        }
        if other.logging.file_output {
            self.logging.file_output = true;
            self.logging.log_dir = other.logging.log_dir;
        }
        if other.logging.json_format {
            self.logging.json_format = true;
        }
        if other.modules.package_index.is_some() {
            self.modules.package_index = other.modules.package_index;
        }
        if other.modules.store_path.is_some() {
            self.modules.store_path = other.modules.store_path;
        }
        if other.modules.module_kind != default_module_kind() {
            self.modules.module_kind = other.modules.module_kind;
        }
        if !other.events.stats {
            self.events.stats = false;
        }
        if other.dev_mode {
            self.dev_mode = true;
        }
        if other.data_dir.is_some() {
            self.data_dir = other.data_dir;
        }
    }

    /// 解析相对路径：相对于数据目录，未设置数据目录时原样返回
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.data_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().map(|e| e == "json").unwrap_or(false)
}

/// 配置构建器
#[derive(Debug, Default)]
pub struct CoreConfigBuilder {
    config: CoreConfig,
}

impl CoreConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self {
            config: CoreConfig::default(),
        }
    }

    /// 设置配置文件路径
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.config_path = Some(path.into());
        self
    }

    /// 设置日志级别
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// 启用文件日志
    pub fn file_logging(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.config.logging.file_output = true;
        self.config.logging.log_dir = Some(log_dir.into());
        self
    }

    /// 启用 JSON 格式日志
    pub fn json_logging(mut self) -> Self {
        self.config.logging.json_format = true;
        self
    }

    /// 设置包索引文件
    pub fn package_index(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.modules.package_index = Some(path.into());
        self
    }

    /// 设置模块记录存储文件
    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.modules.store_path = Some(path.into());
        self
    }

    /// 设置模块包类型
    pub fn module_kind(mut self, kind: impl Into<String>) -> Self {
        self.config.modules.module_kind = kind.into();
        self
    }

    /// 开关分发统计
    pub fn event_stats(mut self, enabled: bool) -> Self {
        self.config.events.stats = enabled;
        self
    }

    /// 启用开发模式
    pub fn dev_mode(mut self) -> Self {
        self.config.dev_mode = true;
        self
    }

    /// 设置数据目录
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = Some(dir.into());
        self
    }

    /// 构建配置
    pub fn build(self) -> CoreConfig {
        self.config
    }
}
