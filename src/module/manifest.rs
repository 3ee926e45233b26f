//! 模块清单
//!
//! 从包描述的 `extra.lotgd` 段解析出模块安装所需的信息，并在注册前校验。

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::event::EventPattern;
use crate::package::Package;
use crate::utils::{CoreError, Result};

/// 模块名格式：`vendor/package`
static LIBRARY_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9_.\-]*/[a-z0-9][a-z0-9_.\-]*$").expect("Invalid library name regex")
});

/// 检查模块名格式
pub fn is_valid_library_name(name: &str) -> bool {
    LIBRARY_NAME_REGEX.is_match(name)
}

#[derive(Debug, Default, Deserialize)]
struct ManifestSection {
    #[serde(default)]
    class: String,
    #[serde(default)]
    subscriptions: Vec<String>,
}

/// 模块清单
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// 模块名（`vendor/package`）
    pub name: String,

    /// 版本（semver）
    pub version: String,

    /// 实现类，即模块目录中的键
    pub class: String,

    /// 订阅模式
    #[serde(default)]
    pub subscriptions: Vec<String>,
}

impl LibraryConfig {
    /// 创建不含订阅的清单
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        class: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            class: class.into(),
            subscriptions: Vec::new(),
        }
    }

    /// 追加订阅模式
    pub fn subscribe(mut self, pattern: impl Into<String>) -> Self {
        self.subscriptions.push(pattern.into());
        self
    }

    /// 从包描述读取清单
    ///
    /// 只做结构解析，不做校验。
    ///
    /// # Errors
    ///
    /// `extra.lotgd` 段结构不正确时返回 `InvalidConfiguration`
    pub fn from_package(package: &Package) -> Result<Self> {
        let section = match package.extra.get("lotgd") {
            Some(value) => ManifestSection::deserialize(value).map_err(|e| {
                CoreError::InvalidConfiguration {
                    library: package.name.clone(),
                    reason: format!("extra.lotgd 段格式错误: {}", e),
                }
            })?,
            None => ManifestSection::default(),
        };

        Ok(Self {
            name: package.name.clone(),
            version: package.version.clone(),
            class: section.class,
            subscriptions: section.subscriptions,
        })
    }

    /// 校验清单
    ///
    /// 执行以下校验：
    /// - 模块名符合 `vendor/package` 格式
    /// - 版本号符合 semver
    /// - 实现类不能为空
    /// - 每个订阅模式格式有效
    ///
    /// # Errors
    ///
    /// 任一校验失败时返回 `InvalidConfiguration`，原因中列出全部问题
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.name.is_empty() {
            errors.push("模块名不能为空".to_string());
        } else if !is_valid_library_name(&self.name) {
            errors.push(format!(
                "模块名 '{}' 格式无效，应为小写的 vendor/package",
                self.name
            ));
        }

        if self.version.is_empty() {
            errors.push("版本号不能为空".to_string());
        } else if semver::Version::parse(&self.version).is_err() {
            errors.push(format!(
                "无效的版本号格式 '{}', 请使用 semver 格式 (如 1.0.0)",
                self.version
            ));
        }

        if self.class.trim().is_empty() {
            errors.push("实现类不能为空".to_string());
        }

        for pattern in &self.subscriptions {
            if let Err(e) = EventPattern::parse(pattern) {
                errors.push(e.to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CoreError::InvalidConfiguration {
                library: self.name.clone(),
                reason: errors.join("; "),
            })
        }
    }
}
