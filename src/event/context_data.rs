//! 上下文数据
//!
//! [`ContextData`] 是一次事件分发中传递的不可变负载。每个实例在创建时绑定一个
//! [`ContextSchema`]，该结构声明了封闭的字段集合（字段名、类别、是否必填）。
//!
//! - `set` / `set_fields` 总是返回新实例，原实例不变
//! - 新实例与原实例按引用共享未修改的字段值
//! - 两个实例是否"变化"只按引用判断（[`ContextData::ptr_eq`]），不做深比较
//!
//! # 示例
//!
//! ```rust
//! use lotgd_core::event::{ContextData, ContextSchema, FieldKind};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let schema = Arc::new(
//!     ContextSchema::new("CharacterDamage")
//!         .required("character", FieldKind::String)
//!         .required("damage", FieldKind::Integer),
//! );
//!
//! let data = ContextData::create(schema, [
//!     ("character", json!("violet")),
//!     ("damage", json!(10)),
//! ]).unwrap();
//!
//! let halved = data.set("damage", json!(5)).unwrap();
//! assert_eq!(data.get("damage").unwrap(), &json!(10));
//! assert_eq!(halved.get("damage").unwrap(), &json!(5));
//! assert!(!ContextData::ptr_eq(&data, &halved));
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::utils::{CoreError, Result};

/// 未声明类型的容器使用的数据结构名
pub const GENERIC_SCHEMA: &str = "Generic";

/// 字段类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// 任意值
    #[default]
    Any,
    /// null
    Null,
    /// 布尔值
    Bool,
    /// 数字（整数或浮点）
    Number,
    /// 整数
    Integer,
    /// 字符串
    String,
    /// 数组
    Array,
    /// 对象
    Object,
}

impl FieldKind {
    /// 检查值是否属于该类别
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldKind::Any => true,
            FieldKind::Null => value.is_null(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::Number => value.is_number(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::String => value.is_string(),
            FieldKind::Array => value.is_array(),
            FieldKind::Object => value.is_object(),
        }
    }

    /// 类别名称
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Any => "any",
            FieldKind::Null => "null",
            FieldKind::Bool => "bool",
            FieldKind::Number => "number",
            FieldKind::Integer => "integer",
            FieldKind::String => "string",
            FieldKind::Array => "array",
            FieldKind::Object => "object",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 字段声明
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// 字段名
    pub name: String,
    /// 字段类别
    #[serde(default)]
    pub kind: FieldKind,
    /// 是否必填
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

/// 上下文数据结构
///
/// 声明一类上下文数据允许的全部字段。创建后不再修改，
/// 通常以 `Arc<ContextSchema>` 的形式在多个实例间共享。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSchema {
    name: String,
    fields: BTreeMap<String, FieldSpec>,
}

impl ContextSchema {
    /// 创建空的数据结构
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// 声明必填字段
    pub fn required(self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.field(name, kind, true)
    }

    /// 声明可选字段
    pub fn optional(self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.field(name, kind, false)
    }

    fn field(mut self, name: impl Into<String>, kind: FieldKind, required: bool) -> Self {
        let name = name.into();
        self.fields.insert(
            name.clone(),
            FieldSpec {
                name,
                kind,
                required,
            },
        );
        self
    }

    /// 为无类型容器生成数据结构：声明集合恰好是给定的字段，全部必填
    pub fn generic<I, K>(names: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        names
            .into_iter()
            .fold(Self::new(GENERIC_SCHEMA), |schema, name| {
                schema.required(name, FieldKind::Any)
            })
    }

    /// 数据结构名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 查找字段声明
    pub fn spec(&self, field: &str) -> Option<&FieldSpec> {
        self.fields.get(field)
    }

    /// 是否声明了该字段
    pub fn declares(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// 所有声明的字段名（按字典序）
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// 字段声明数量
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// 是否未声明任何字段
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn unknown_field(&self, field: &str) -> CoreError {
        CoreError::UnknownField {
            schema: self.name.clone(),
            field: field.to_string(),
        }
    }

    fn schema_error(&self, reason: String) -> CoreError {
        CoreError::SchemaError {
            schema: self.name.clone(),
            reason,
        }
    }

    fn check_kind(&self, spec: &FieldSpec, value: &Value) -> Result<()> {
        if spec.kind.accepts(value) {
            Ok(())
        } else {
            Err(self.schema_error(format!(
                "字段 '{}' 需要 {} 类型，实际值为 {}",
                spec.name, spec.kind, value
            )))
        }
    }
}

struct Inner {
    schema: Arc<ContextSchema>,
    fields: BTreeMap<String, Arc<Value>>,
}

/// 不可变的上下文数据
///
/// 克隆只复制引用，克隆出的实例与原实例 [`ptr_eq`](Self::ptr_eq) 相等。
#[derive(Clone)]
pub struct ContextData {
    inner: Arc<Inner>,
}

impl ContextData {
    /// 按数据结构创建上下文数据
    ///
    /// # Errors
    ///
    /// 出现未声明的字段、缺少必填字段或字段类别不符时返回 `SchemaError`
    pub fn create<I, K>(schema: Arc<ContextSchema>, fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut values = BTreeMap::new();
        for (name, value) in fields {
            let name = name.into();
            let spec = schema
                .spec(&name)
                .ok_or_else(|| schema.schema_error(format!("字段 '{}' 未声明", name)))?;
            schema.check_kind(spec, &value)?;
            values.insert(name, Arc::new(value));
        }

        if let Some(missing) = schema
            .fields
            .values()
            .find(|spec| spec.required && !values.contains_key(&spec.name))
        {
            return Err(schema.schema_error(format!("缺少必填字段 '{}'", missing.name)));
        }

        Ok(Self::from_parts(schema, values))
    }

    /// 创建无类型容器，声明的字段集合恰好是传入的字段
    pub fn from_fields<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let values: BTreeMap<String, Arc<Value>> = fields
            .into_iter()
            .map(|(name, value)| (name.into(), Arc::new(value)))
            .collect();
        let schema = ContextSchema::generic(values.keys().cloned());
        Self::from_parts(Arc::new(schema), values)
    }

    /// 从 JSON 对象创建无类型容器
    ///
    /// # Errors
    ///
    /// 传入的值不是对象时返回 `SchemaError`
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self::from_fields(map)),
            other => Err(CoreError::SchemaError {
                schema: GENERIC_SCHEMA.to_string(),
                reason: format!("上下文数据必须是 JSON 对象，实际为 {}", other),
            }),
        }
    }

    /// 不含任何字段的无类型容器
    pub fn empty() -> Self {
        Self::from_fields(std::iter::empty::<(String, Value)>())
    }

    fn from_parts(schema: Arc<ContextSchema>, fields: BTreeMap<String, Arc<Value>>) -> Self {
        Self {
            inner: Arc::new(Inner { schema, fields }),
        }
    }

    /// 两个实例是否为同一个对象
    pub fn ptr_eq(a: &ContextData, b: &ContextData) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// 绑定的数据结构
    pub fn schema(&self) -> &Arc<ContextSchema> {
        &self.inner.schema
    }

    /// 两个实例是否声明了相同的字段集合
    pub fn same_shape(&self, other: &ContextData) -> bool {
        Arc::ptr_eq(&self.inner.schema, &other.inner.schema)
            || self.inner.schema == other.inner.schema
    }

    /// 要求 `other` 与当前实例结构相同
    ///
    /// # Errors
    ///
    /// 结构不同时返回 `SchemaError`
    pub fn ensure_same_shape(&self, other: &ContextData) -> Result<()> {
        if self.same_shape(other) {
            return Ok(());
        }
        Err(self.inner.schema.schema_error(format!(
            "数据结构不能在分发中途替换为 '{}'",
            other.inner.schema.name
        )))
    }

    /// 字段当前是否有值
    pub fn has(&self, field: &str) -> bool {
        self.inner.fields.contains_key(field)
    }

    /// 读取字段
    ///
    /// # Errors
    ///
    /// 字段未声明或当前没有值时返回 `UnknownField`
    pub fn get(&self, field: &str) -> Result<&Value> {
        self.inner
            .fields
            .get(field)
            .map(Arc::as_ref)
            .ok_or_else(|| self.inner.schema.unknown_field(field))
    }

    /// 读取字段并反序列化为指定类型
    pub fn get_as<T: DeserializeOwned>(&self, field: &str) -> Result<T> {
        let value = self.get(field)?;
        serde_json::from_value(value.clone()).map_err(|e| {
            self.inner
                .schema
                .schema_error(format!("字段 '{}' 无法转换: {}", field, e))
        })
    }

    /// 替换单个字段，返回新实例
    ///
    /// 即使新值与旧值相同，也会返回一个不同的实例。
    ///
    /// # Errors
    ///
    /// - 字段未声明时返回 `UnknownField`
    /// - 值的类别不符合声明时返回 `SchemaError`
    pub fn set(&self, field: &str, value: impl Into<Value>) -> Result<ContextData> {
        let schema = &self.inner.schema;
        let value = value.into();
        let spec = schema.spec(field).ok_or_else(|| schema.unknown_field(field))?;
        schema.check_kind(spec, &value)?;

        let mut fields = self.inner.fields.clone();
        fields.insert(field.to_string(), Arc::new(value));
        Ok(Self::from_parts(Arc::clone(schema), fields))
    }

    /// 原子地替换多个字段
    ///
    /// 任一字段不合法时整个调用失败，报告第一个出错的字段，接收者不受影响。
    pub fn set_fields<I, K>(&self, fields: I) -> Result<ContextData>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let schema = &self.inner.schema;
        let updates: Vec<(String, Value)> = fields
            .into_iter()
            .map(|(name, value)| (name.into(), value))
            .collect();

        // 先整体校验字段名，再校验类别，最后才写入
        if let Some((name, _)) = updates.iter().find(|(name, _)| !schema.declares(name)) {
            return Err(schema.unknown_field(name));
        }
        for (name, value) in &updates {
            if let Some(spec) = schema.spec(name) {
                schema.check_kind(spec, value)?;
            }
        }

        let mut values = self.inner.fields.clone();
        for (name, value) in updates {
            values.insert(name, Arc::new(value));
        }
        Ok(Self::from_parts(Arc::clone(schema), values))
    }

    /// 当前有值的字段名（按字典序）
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.inner.fields.keys().map(String::as_str)
    }

    /// 转换为 JSON 对象
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .inner
            .fields
            .iter()
            .map(|(name, value)| (name.clone(), value.as_ref().clone()))
            .collect();
        Value::Object(map)
    }
}

impl fmt::Debug for ContextData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextData")
            .field("schema", &self.inner.schema.name)
            .field("fields", &self.inner.fields)
            .finish()
    }
}
