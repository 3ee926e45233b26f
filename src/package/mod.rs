//! 包索引
//!
//! 模块安装器从外部包索引中发现候选包。[`PackageProvider`] 是索引的抽象，
//! [`PackageIndex`] 是基于 YAML/JSON 文件的实现。
//!
//! # 文件格式
//!
//! ```yaml
//! packages:
//!   - name: lotgd/village
//!     version: 1.2.0
//!     type: lotgd-module
//!     require:
//!       lotgd/core-data: "^1.0"
//!     extra:
//!       lotgd:
//!         class: lotgd/village
//!         subscriptions:
//!           - h/lotgd/core/navigate-to/*
//! ```

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::utils::{CoreError, Result};

/// 模块包的默认类型
pub const MODULE_KIND: &str = "lotgd-module";

/// 未声明类型时使用的类型
pub const DEFAULT_KIND: &str = "library";

fn default_kind() -> String {
    DEFAULT_KIND.to_string()
}

/// 包描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    /// 包名（`vendor/package`）
    pub name: String,

    /// 版本（semver）
    pub version: String,

    /// 包类型
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,

    /// 直接依赖：包名 -> 版本约束
    #[serde(default)]
    pub require: BTreeMap<String, String>,

    /// 描述
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// 附加数据（模块清单位于 `extra.lotgd`）
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub extra: Value,
}

impl Package {
    /// 创建普通包
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            kind: default_kind(),
            require: BTreeMap::new(),
            description: None,
            extra: Value::Null,
        }
    }

    /// 创建模块包，实现类与包名相同，不含订阅
    pub fn module(name: impl Into<String>, version: impl Into<String>) -> Self {
        let name = name.into();
        let extra = serde_json::json!({
            "lotgd": { "class": name.clone(), "subscriptions": [] }
        });
        Self {
            kind: MODULE_KIND.to_string(),
            extra,
            ..Self::new(name, version)
        }
    }

    /// 设置包类型
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// 添加依赖
    pub fn requires(mut self, name: impl Into<String>, constraint: impl Into<String>) -> Self {
        self.require.insert(name.into(), constraint.into());
        self
    }

    /// 设置附加数据
    pub fn with_extra(mut self, extra: Value) -> Self {
        self.extra = extra;
        self
    }

    /// 设置模块清单中的实现类
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.lotgd_section_mut()["class"] = Value::String(class.into());
        self
    }

    /// 追加模块清单中的订阅模式
    pub fn subscribes(mut self, pattern: impl Into<String>) -> Self {
        let subscriptions = &mut self.lotgd_section_mut()["subscriptions"];
        if !subscriptions.is_array() {
            *subscriptions = Value::Array(Vec::new());
        }
        if let Some(list) = subscriptions.as_array_mut() {
            list.push(Value::String(pattern.into()));
        }
        self
    }

    fn lotgd_section_mut(&mut self) -> &mut Value {
        if !self.extra.is_object() {
            self.extra = Value::Object(serde_json::Map::new());
        }
        let section = &mut self.extra["lotgd"];
        if !section.is_object() {
            *section = Value::Object(serde_json::Map::new());
        }
        section
    }

    /// 解析版本
    pub fn parsed_version(&self) -> Result<Version> {
        Ok(Version::parse(&self.version)?)
    }

    /// 是否为指定类型
    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// 直接依赖（包名, 约束）
    pub fn dependencies(&self) -> impl Iterator<Item = (&str, &str)> {
        self.require
            .iter()
            .map(|(name, constraint)| (name.as_str(), constraint.as_str()))
    }

    /// 检查依赖包的版本是否满足约束
    ///
    /// # Errors
    ///
    /// 约束或版本无法解析时返回 `VersionParse`
    pub fn accepts(&self, dependency: &Package) -> Result<bool> {
        match self.require.get(&dependency.name) {
            Some(constraint) => {
                let requirement = VersionReq::parse(constraint)?;
                Ok(requirement.matches(&dependency.parsed_version()?))
            }
            None => Ok(true),
        }
    }
}

/// 包索引接口
pub trait PackageProvider {
    /// 全部包（索引顺序）
    fn packages(&self) -> &[Package];

    /// 按名称查找包
    fn package(&self, name: &str) -> Option<&Package> {
        self.packages().iter().find(|p| p.name == name)
    }

    /// 指定类型的全部包
    fn packages_of_kind<'a>(&'a self, kind: &'a str) -> Box<dyn Iterator<Item = &'a Package> + 'a> {
        Box::new(self.packages().iter().filter(move |p| p.is_kind(kind)))
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct IndexFile {
    #[serde(default)]
    packages: Vec<Package>,
}

/// 基于文件的包索引
#[derive(Debug, Clone, Default)]
pub struct PackageIndex {
    packages: Vec<Package>,
    source: Option<PathBuf>,
}

impl PackageIndex {
    /// 从包列表创建索引
    ///
    /// # Errors
    ///
    /// 包名重复时返回 `InvalidConfigValue`
    pub fn new(packages: Vec<Package>) -> Result<Self> {
        let mut seen = HashSet::new();
        for package in &packages {
            if !seen.insert(package.name.as_str()) {
                return Err(CoreError::InvalidConfigValue {
                    key: "packages".to_string(),
                    reason: format!("包名重复: '{}'", package.name),
                });
            }
        }
        Ok(Self {
            packages,
            source: None,
        })
    }

    /// 追加包
    pub fn push(&mut self, package: Package) -> Result<()> {
        if self.package(&package.name).is_some() {
            return Err(CoreError::InvalidConfigValue {
                key: "packages".to_string(),
                reason: format!("包名重复: '{}'", package.name),
            });
        }
        self.packages.push(package);
        Ok(())
    }

    /// 从 YAML 文本解析
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let file: IndexFile = serde_yaml::from_str(content)?;
        Self::new(file.packages)
    }

    /// 从 JSON 文本解析
    pub fn from_json_str(content: &str) -> Result<Self> {
        let file: IndexFile = serde_json::from_str(content)?;
        Self::new(file.packages)
    }

    fn parse(path: &Path, content: &str) -> Result<Self> {
        let mut index = if path.extension().map(|e| e == "json").unwrap_or(false) {
            Self::from_json_str(content)?
        } else {
            Self::from_yaml_str(content)?
        };
        index.source = Some(path.to_path_buf());
        info!(path = %path.display(), packages = index.packages.len(), "加载包索引");
        Ok(index)
    }

    /// 从文件加载索引（`.json` 按 JSON 解析，其余按 YAML 解析）
    pub async fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        debug!(path = %path.display(), "读取包索引");
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            CoreError::ConfigLoadFailed(format!("无法读取包索引 {}: {}", path.display(), e))
        })?;
        Self::parse(&path, &content)
    }

    /// 同步地从文件加载索引
    pub fn from_file_sync(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| {
            CoreError::ConfigLoadFailed(format!("无法读取包索引 {}: {}", path.display(), e))
        })?;
        Self::parse(&path, &content)
    }

    /// 索引来源文件
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// 包数量
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl PackageProvider for PackageIndex {
    fn packages(&self) -> &[Package] {
        &self.packages
    }
}
