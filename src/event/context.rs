//! 事件上下文
//!
//! 一次分发中单个处理器看到的视图：事件名、触发该处理器的订阅模式，
//! 以及当前持有的 [`ContextData`]。处理器通过 `set_data_field` 等方法
//! 替换持有的数据，然后把上下文交还给分发器。

use serde_json::Value;

use super::context_data::ContextData;
use crate::utils::Result;

/// 事件上下文
#[derive(Debug, Clone)]
pub struct EventContext {
    event: String,
    matching_pattern: String,
    data: ContextData,
}

impl EventContext {
    /// 创建事件上下文
    pub fn new(
        event: impl Into<String>,
        matching_pattern: impl Into<String>,
        data: ContextData,
    ) -> Self {
        Self {
            event: event.into(),
            matching_pattern: matching_pattern.into(),
            data,
        }
    }

    /// 当前分发的事件名
    pub fn event(&self) -> &str {
        &self.event
    }

    /// 触发当前处理器的订阅模式
    pub fn matching_pattern(&self) -> &str {
        &self.matching_pattern
    }

    /// 当前持有的上下文数据
    pub fn data(&self) -> &ContextData {
        &self.data
    }

    /// 取出持有的上下文数据
    pub fn into_data(self) -> ContextData {
        self.data
    }

    /// 读取数据字段
    pub fn get_data_field(&self, field: &str) -> Result<&Value> {
        self.data.get(field)
    }

    /// 数据字段当前是否有值
    pub fn has_data_field(&self, field: &str) -> bool {
        self.data.has(field)
    }

    /// 替换单个数据字段
    ///
    /// 成功时上下文持有新的数据实例；失败时持有的数据保持不变。
    pub fn set_data_field(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
        self.data = self.data.set(field, value)?;
        Ok(())
    }

    /// 原子地替换多个数据字段
    pub fn set_data_fields<I, K>(&mut self, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.data = self.data.set_fields(fields)?;
        Ok(())
    }

    /// 直接替换持有的数据
    ///
    /// # Errors
    ///
    /// 新数据与持有的数据结构不同时返回 `SchemaError`，持有的数据保持不变
    pub fn replace_data(&mut self, data: ContextData) -> Result<()> {
        self.data.ensure_same_shape(&data)?;
        self.data = data;
        Ok(())
    }

    /// 持有的数据是否已不再是 `original` 这个实例
    pub fn has_data_changed(&self, original: &ContextData) -> bool {
        !ContextData::ptr_eq(&self.data, original)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::CoreError;
    use serde_json::json;

    fn context() -> EventContext {
        let data = ContextData::from_json(json!({"value": 1, "label": "a"})).unwrap();
        EventContext::new("h/lotgd/test/event", "h/lotgd/test/*", data)
    }

    #[test]
    fn test_accessors() {
        let ctx = context();
        assert_eq!(ctx.event(), "h/lotgd/test/event");
        assert_eq!(ctx.matching_pattern(), "h/lotgd/test/*");
        assert_eq!(ctx.get_data_field("value").unwrap(), &json!(1));
        assert!(ctx.has_data_field("label"));
        assert!(!ctx.has_data_field("missing"));
    }

    #[test]
    fn test_set_data_field_changes_identity() {
        let mut ctx = context();
        let original = ctx.data().clone();
        assert!(!ctx.has_data_changed(&original));

        ctx.set_data_field("value", 2).unwrap();
        assert!(ctx.has_data_changed(&original));
        assert_eq!(ctx.get_data_field("value").unwrap(), &json!(2));
        assert_eq!(original.get("value").unwrap(), &json!(1));
    }

    #[test]
    fn test_replace_data_requires_same_shape() {
        let mut ctx = context();
        let original = ctx.data().clone();

        let other = ContextData::from_json(json!({"gold": 3})).unwrap();
        assert!(matches!(
            ctx.replace_data(other).unwrap_err(),
            CoreError::SchemaError { .. }
        ));
        assert!(!ctx.has_data_changed(&original));

        let same = ContextData::from_json(json!({"value": 9, "label": "b"})).unwrap();
        ctx.replace_data(same).unwrap();
        assert_eq!(ctx.get_data_field("value").unwrap(), &json!(9));
    }

    #[test]
    fn test_failed_set_keeps_data() {
        let mut ctx = context();
        let original = ctx.data().clone();

        assert!(ctx.set_data_field("unknown", 2).is_err());
        assert!(ctx
            .set_data_fields([("value", json!(5)), ("unknown", json!(1))])
            .is_err());
        assert!(!ctx.has_data_changed(&original));
    }
}
