//! 模块记录
//!
//! 已注册模块的持久化身份。记录在类型定义处组合了两种能力：
//! [`PropertyStore`]（自由格式属性）与 [`Extendable`]（扩展方法）。

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;

use crate::extension::Extendable;
use crate::utils::{CoreError, Result};

/// 模块记录的实体类型名
pub const MODULE_ENTITY: &str = "module";

/// 属性存取能力
pub trait PropertyStore {
    /// 全部属性
    fn properties(&self) -> &BTreeMap<String, Value>;

    /// 全部属性（可变）
    fn properties_mut(&mut self) -> &mut BTreeMap<String, Value>;

    /// 读取属性
    fn property(&self, name: &str) -> Option<&Value> {
        self.properties().get(name)
    }

    /// 读取属性并反序列化
    fn property_as<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>>
    where
        Self: Sized,
    {
        self.property(name)
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|e| CoreError::InvalidConfigValue {
                    key: name.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    /// 写入属性，返回旧值
    fn set_property(&mut self, name: &str, value: Value) -> Option<Value> {
        self.properties_mut().insert(name.to_string(), value)
    }

    /// 删除属性，返回旧值
    fn unset_property(&mut self, name: &str) -> Option<Value> {
        self.properties_mut().remove(name)
    }
}

fn default_enabled() -> bool {
    true
}

/// 模块记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleRecord {
    /// 模块名（`vendor/package`）
    library: String,

    /// 实现类
    #[serde(default)]
    class: String,

    /// 是否启用
    #[serde(default = "default_enabled")]
    enabled: bool,

    /// 注册时间
    created_at: DateTime<Utc>,

    /// 自由格式属性
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    properties: BTreeMap<String, Value>,
}

impl ModuleRecord {
    /// 创建启用状态的记录，实现类默认与模块名相同
    pub fn new(library: impl Into<String>) -> Self {
        let library = library.into();
        Self {
            class: library.clone(),
            library,
            enabled: true,
            created_at: Utc::now(),
            properties: BTreeMap::new(),
        }
    }

    /// 模块名
    pub fn library(&self) -> &str {
        &self.library
    }

    /// 设置实现类
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = class.into();
        self
    }

    /// 实现类
    pub fn class(&self) -> &str {
        &self.class
    }

    /// 是否启用
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 设置启用状态
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// 注册时间
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl PropertyStore for ModuleRecord {
    fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    fn properties_mut(&mut self) -> &mut BTreeMap<String, Value> {
        &mut self.properties
    }
}

impl Extendable for ModuleRecord {
    fn entity_type(&self) -> &'static str {
        MODULE_ENTITY
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_record() {
        let record = ModuleRecord::new("lotgd/village");
        assert_eq!(record.library(), "lotgd/village");
        assert_eq!(record.class(), "lotgd/village");
        assert_eq!(record.clone().with_class("impl").class(), "impl");
        assert!(record.is_enabled());
        assert!(record.properties().is_empty());
        assert_eq!(record.entity_type(), MODULE_ENTITY);
    }

    #[test]
    fn test_properties() {
        let mut record = ModuleRecord::new("lotgd/village");
        assert!(record.set_property("gold", json!(100)).is_none());
        assert_eq!(record.set_property("gold", json!(150)), Some(json!(100)));

        assert_eq!(record.property_as::<u32>("gold").unwrap(), Some(150));
        assert_eq!(record.property_as::<u32>("missing").unwrap(), None);
        assert!(record.property_as::<String>("gold").is_err());

        assert_eq!(record.unset_property("gold"), Some(json!(150)));
        assert!(record.property("gold").is_none());
    }

    #[test]
    fn test_serde_defaults() {
        let record: ModuleRecord = serde_json::from_value(json!({
            "library": "lotgd/forest",
            "created_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert!(record.is_enabled());

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("properties").is_none());
    }
}
