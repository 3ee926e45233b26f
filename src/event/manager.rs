//! 事件管理器
//!
//! 维护按注册顺序排列的订阅列表，并把事件同步地依次分发给匹配的处理器。
//!
//! # 分发语义
//!
//! - 匹配的处理器按订阅注册顺序执行，每个处理器最多执行一次
//! - 每个处理器收到的数据是上一个处理器返回的数据
//! - 没有匹配的订阅时原样返回传入的数据实例
//! - 任一处理器返回错误时立即中止，后续处理器不再执行

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use super::context::EventContext;
use super::context_data::ContextData;
use super::pattern::{validate_event_name, EventPattern};
use crate::core::Game;
use crate::store::SubscriptionRecord;
use crate::utils::{CoreError, Result};

/// 回调处理器类型
pub type HandlerCallback =
    Arc<dyn Fn(&Game, EventContext) -> Result<EventContext> + Send + Sync>;

/// 处理器引用
#[derive(Clone)]
pub enum HandlerRef {
    /// 模块实现类，分发时通过模块目录解析
    Class(String),
    /// 进程内回调
    Callback {
        /// 回调名称，用于标识订阅
        name: String,
        /// 回调函数
        callback: HandlerCallback,
    },
}

impl HandlerRef {
    /// 引用模块实现类
    pub fn class(name: impl Into<String>) -> Self {
        HandlerRef::Class(name.into())
    }

    /// 包装进程内回调
    pub fn callback<F>(name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&Game, EventContext) -> Result<EventContext> + Send + Sync + 'static,
    {
        HandlerRef::Callback {
            name: name.into(),
            callback: Arc::new(callback),
        }
    }

    /// 处理器名称（类名或回调名）
    pub fn name(&self) -> &str {
        match self {
            HandlerRef::Class(class) => class,
            HandlerRef::Callback { name, .. } => name,
        }
    }

    /// 是否引用模块实现类
    pub fn is_class(&self) -> bool {
        matches!(self, HandlerRef::Class(_))
    }
}

impl fmt::Debug for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerRef::Class(class) => f.debug_tuple("Class").field(class).finish(),
            HandlerRef::Callback { name, .. } => {
                f.debug_struct("Callback").field("name", name).finish_non_exhaustive()
            }
        }
    }
}

/// 一条订阅
#[derive(Debug, Clone)]
pub struct Subscription {
    pattern: EventPattern,
    handler: HandlerRef,
    library: String,
    subscribed_at: DateTime<Utc>,
}

impl Subscription {
    /// 订阅模式
    pub fn pattern(&self) -> &EventPattern {
        &self.pattern
    }

    /// 处理器引用
    pub fn handler(&self) -> &HandlerRef {
        &self.handler
    }

    /// 所属模块
    pub fn library(&self) -> &str {
        &self.library
    }

    /// 订阅时间
    pub fn subscribed_at(&self) -> DateTime<Utc> {
        self.subscribed_at
    }

    fn is(&self, pattern: &str, handler: &str, library: &str) -> bool {
        self.pattern.as_str() == pattern
            && self.handler.name() == handler
            && self.library == library
    }

    /// 转换为持久化记录（仅类处理器可持久化）
    pub fn to_record(&self) -> Option<SubscriptionRecord> {
        match &self.handler {
            HandlerRef::Class(class) => Some(SubscriptionRecord::new(
                self.pattern.as_str(),
                class.as_str(),
                self.library.as_str(),
            )),
            HandlerRef::Callback { .. } => None,
        }
    }
}

/// 分发统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// 发布次数
    pub publishes: u64,

    /// 处理器调用次数
    pub handler_invocations: u64,

    /// 替换了数据的处理器调用次数
    pub changed_steps: u64,

    /// 失败次数
    pub failures: u64,

    /// 最后发布时间
    pub last_publish_at: Option<DateTime<Utc>>,
}

/// 事件管理器配置
#[derive(Debug, Clone)]
pub struct EventManagerConfig {
    /// 是否收集分发统计
    pub collect_stats: bool,
}

impl Default for EventManagerConfig {
    fn default() -> Self {
        Self {
            collect_stats: true,
        }
    }
}

/// 事件管理器
pub struct EventManager {
    /// 按注册顺序排列的订阅
    subscriptions: Vec<Arc<Subscription>>,

    /// 分发统计
    stats: Mutex<DispatchStats>,

    /// 配置
    config: EventManagerConfig,
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventManager")
            .field("subscriptions", &self.subscriptions.len())
            .field("config", &self.config)
            .finish()
    }
}

impl EventManager {
    /// 创建事件管理器
    pub fn new() -> Self {
        Self::with_config(EventManagerConfig::default())
    }

    /// 使用自定义配置创建事件管理器
    pub fn with_config(config: EventManagerConfig) -> Self {
        debug!(collect_stats = config.collect_stats, "创建事件管理器");
        Self {
            subscriptions: Vec::new(),
            stats: Mutex::new(DispatchStats::default()),
            config,
        }
    }

    /// 订阅事件
    ///
    /// # Errors
    ///
    /// - 模式格式无效时返回 `InvalidPattern`
    /// - 相同的 (模式, 处理器, 模块) 已存在时返回 `SubscriptionAlreadyExists`
    pub fn subscribe(&mut self, pattern: &str, handler: HandlerRef, library: &str) -> Result<()> {
        let parsed = EventPattern::parse(pattern)?;

        if self
            .subscriptions
            .iter()
            .any(|s| s.is(pattern, handler.name(), library))
        {
            return Err(CoreError::SubscriptionAlreadyExists {
                pattern: pattern.to_string(),
                handler: handler.name().to_string(),
                library: library.to_string(),
            });
        }

        info!(
            pattern = %pattern,
            handler = %handler.name(),
            library = %library,
            "事件订阅成功"
        );

        self.subscriptions.push(Arc::new(Subscription {
            pattern: parsed,
            handler,
            library: library.to_string(),
            subscribed_at: Utc::now(),
        }));
        Ok(())
    }

    /// 以进程内回调订阅事件
    pub fn subscribe_callback<F>(
        &mut self,
        pattern: &str,
        library: &str,
        name: &str,
        callback: F,
    ) -> Result<()>
    where
        F: Fn(&Game, EventContext) -> Result<EventContext> + Send + Sync + 'static,
    {
        self.subscribe(pattern, HandlerRef::callback(name, callback), library)
    }

    /// 取消订阅
    ///
    /// # Errors
    ///
    /// 订阅不存在时返回 `SubscriptionNotFound`
    pub fn unsubscribe(&mut self, pattern: &str, handler: &str, library: &str) -> Result<()> {
        let index = self
            .subscriptions
            .iter()
            .position(|s| s.is(pattern, handler, library))
            .ok_or_else(|| CoreError::SubscriptionNotFound {
                pattern: pattern.to_string(),
                handler: handler.to_string(),
                library: library.to_string(),
            })?;

        self.subscriptions.remove(index);

        info!(
            pattern = %pattern,
            handler = %handler,
            library = %library,
            "取消订阅成功"
        );
        Ok(())
    }

    /// 取消模块的全部订阅，返回取消的数量
    pub fn unsubscribe_module(&mut self, library: &str) -> usize {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.library != library);
        let removed = before - self.subscriptions.len();

        if removed > 0 {
            info!(library = %library, removed_count = removed, "取消模块所有订阅");
        }
        removed
    }

    /// 从持久化记录恢复订阅，返回新增的数量
    ///
    /// 已存在的订阅会被跳过。
    pub fn restore<'a, I>(&mut self, records: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a SubscriptionRecord>,
    {
        let mut restored = 0;
        for record in records {
            match self.subscribe(
                &record.pattern,
                HandlerRef::class(record.class.as_str()),
                &record.library,
            ) {
                Ok(()) => restored += 1,
                Err(CoreError::SubscriptionAlreadyExists { .. }) => {
                    trace!(pattern = %record.pattern, library = %record.library, "订阅已存在，跳过");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(restored)
    }

    /// 所有订阅（注册顺序）
    pub fn subscriptions(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.iter().map(Arc::as_ref)
    }

    /// 指定模块的订阅
    pub fn subscriptions_of<'a>(&'a self, library: &'a str) -> impl Iterator<Item = &'a Subscription> {
        self.subscriptions().filter(move |s| s.library == library)
    }

    /// 订阅数量
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// 是否存在指定订阅
    pub fn is_subscribed(&self, pattern: &str, handler: &str, library: &str) -> bool {
        self.subscriptions.iter().any(|s| s.is(pattern, handler, library))
    }

    /// 匹配事件的订阅（注册顺序）
    pub fn matching(&self, event: &str) -> Vec<Arc<Subscription>> {
        self.subscriptions
            .iter()
            .filter(|s| s.pattern.matches(event))
            .cloned()
            .collect()
    }

    /// 是否有订阅匹配该事件
    pub fn has_subscribers(&self, event: &str) -> bool {
        self.subscriptions.iter().any(|s| s.pattern.matches(event))
    }

    /// 发布事件
    ///
    /// 依次调用匹配的处理器，返回最后一个处理器留下的数据。
    ///
    /// # Errors
    ///
    /// - 事件名无效时返回 `InvalidEventName`
    /// - 类处理器的实现类不在模块目录中时返回 `ClassNotFound`
    /// - 处理器返回的数据结构与传入时不同时返回 `SchemaError`
    /// - 处理器返回的错误原样向上传播
    pub fn publish(&self, game: &Game, event: &str, data: ContextData) -> Result<ContextData> {
        validate_event_name(event)?;

        // 取快照，处理器执行期间订阅列表不变
        let matching = self.matching(event);
        self.record(|stats| {
            stats.publishes += 1;
            stats.last_publish_at = Some(Utc::now());
        });

        if matching.is_empty() {
            trace!(event = %event, "没有匹配的订阅者");
            return Ok(data);
        }

        debug!(event = %event, handlers = matching.len(), "分发事件");

        let mut current = data;
        for subscription in &matching {
            let context = EventContext::new(event, subscription.pattern.as_str(), current.clone());

            // 处理器不能更换数据结构
            let outcome = self
                .invoke(game, subscription, context)
                .map(EventContext::into_data)
                .and_then(|returned| current.ensure_same_shape(&returned).map(|_| returned));

            let returned = match outcome {
                Ok(returned) => returned,
                Err(e) => {
                    self.record(|stats| {
                        stats.handler_invocations += 1;
                        stats.failures += 1;
                    });
                    warn!(
                        event = %event,
                        pattern = %subscription.pattern,
                        handler = %subscription.handler.name(),
                        library = %subscription.library,
                        error = %e,
                        "事件处理失败"
                    );
                    return Err(e);
                }
            };

            let changed = !ContextData::ptr_eq(&returned, &current);
            self.record(|stats| {
                stats.handler_invocations += 1;
                if changed {
                    stats.changed_steps += 1;
                }
            });
            trace!(
                event = %event,
                handler = %subscription.handler.name(),
                changed = changed,
                "处理器执行完成"
            );
            current = returned;
        }

        Ok(current)
    }

    fn invoke(
        &self,
        game: &Game,
        subscription: &Subscription,
        context: EventContext,
    ) -> Result<EventContext> {
        match &subscription.handler {
            HandlerRef::Class(class) => {
                let module =
                    game.catalog()
                        .get(class)
                        .ok_or_else(|| CoreError::ClassNotFound {
                            library: subscription.library.clone(),
                            class: class.clone(),
                        })?;
                module.handle_event(game, context)
            }
            HandlerRef::Callback { callback, .. } => callback(game, context),
        }
    }

    fn record(&self, update: impl FnOnce(&mut DispatchStats)) {
        if self.config.collect_stats {
            update(&mut self.stats.lock());
        }
    }

    /// 获取分发统计快照
    pub fn stats(&self) -> DispatchStats {
        self.stats.lock().clone()
    }

    /// 重置分发统计
    pub fn reset_stats(&self) {
        *self.stats.lock() = DispatchStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn game() -> Game {
        Game::builder().build()
    }

    fn add(amount: i64) -> impl Fn(&Game, EventContext) -> Result<EventContext> + Send + Sync {
        move |_game, mut ctx| {
            let value = ctx.data().get_as::<i64>("value")?;
            ctx.set_data_field("value", value + amount)?;
            Ok(ctx)
        }
    }

    fn value(data: &ContextData) -> i64 {
        data.get_as::<i64>("value").unwrap()
    }

    #[test]
    fn test_subscribe_and_duplicate() {
        let mut manager = EventManager::new();
        manager
            .subscribe("h/lotgd/test/*", HandlerRef::class("lotgd/test"), "lotgd/test")
            .unwrap();

        let err = manager
            .subscribe("h/lotgd/test/*", HandlerRef::class("lotgd/test"), "lotgd/test")
            .unwrap_err();
        assert!(matches!(err, CoreError::SubscriptionAlreadyExists { .. }));
        assert_eq!(manager.subscription_count(), 1);
    }

    #[test]
    fn test_subscribe_invalid_pattern() {
        let mut manager = EventManager::new();
        let err = manager
            .subscribe("h//x", HandlerRef::class("a/b"), "a/b")
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidPattern { .. }));
    }

    #[test]
    fn test_unsubscribe() {
        let mut manager = EventManager::new();
        manager
            .subscribe("h/lotgd/test/a", HandlerRef::class("lotgd/test"), "lotgd/test")
            .unwrap();
        manager
            .unsubscribe("h/lotgd/test/a", "lotgd/test", "lotgd/test")
            .unwrap();

        let err = manager
            .unsubscribe("h/lotgd/test/a", "lotgd/test", "lotgd/test")
            .unwrap_err();
        assert!(matches!(err, CoreError::SubscriptionNotFound { .. }));
    }

    #[test]
    fn test_unsubscribe_module() {
        let mut manager = EventManager::new();
        manager.subscribe("h/a/*", HandlerRef::class("x"), "lotgd/one").unwrap();
        manager.subscribe("h/b/*", HandlerRef::class("x"), "lotgd/one").unwrap();
        manager.subscribe("h/c/*", HandlerRef::class("y"), "lotgd/two").unwrap();

        assert_eq!(manager.unsubscribe_module("lotgd/one"), 2);
        assert_eq!(manager.unsubscribe_module("lotgd/one"), 0);
        assert_eq!(manager.subscription_count(), 1);
    }

    #[test]
    fn test_publish_without_subscribers_returns_same_instance() {
        let game = game();
        let data = ContextData::from_json(json!({"value": 1})).unwrap();
        let result = game.events().publish(&game, "h/lotgd/none", data.clone()).unwrap();
        assert!(ContextData::ptr_eq(&data, &result));
    }

    #[test]
    fn test_publish_invalid_event_name() {
        let game = game();
        let err = game
            .events()
            .publish(&game, "h/lotgd/*", ContextData::empty())
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidEventName(_)));
    }

    #[test]
    fn test_publish_chains_in_registration_order() {
        let mut game = game();
        let order = Arc::new(Mutex::new(Vec::new()));

        for (name, pattern) in [("first", "h/lotgd/*"), ("second", "h/lotgd/test/run")] {
            let order = Arc::clone(&order);
            game.events_mut()
                .subscribe_callback(pattern, "lotgd/test", name, move |_game, mut ctx| {
                    order.lock().push(ctx.matching_pattern().to_string());
                    let value = ctx.data().get_as::<i64>("value")?;
                    ctx.set_data_field("value", value * 10 + 1)?;
                    Ok(ctx)
                })
                .unwrap();
        }

        let data = ContextData::from_json(json!({"value": 0})).unwrap();
        let result = game.publish("h/lotgd/test/run", data).unwrap();

        assert_eq!(value(&result), 11);
        assert_eq!(*order.lock(), vec!["h/lotgd/*", "h/lotgd/test/run"]);
    }

    #[test]
    fn test_publish_aborts_on_error() {
        let mut game = game();
        game.events_mut()
            .subscribe_callback("h/lotgd/*", "lotgd/test", "adder", add(1))
            .unwrap();
        game.events_mut()
            .subscribe_callback("h/lotgd/*", "lotgd/test", "failer", |_game, _ctx| {
                Err(CoreError::handler("boom"))
            })
            .unwrap();

        let called = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&called);
        game.events_mut()
            .subscribe_callback("h/lotgd/*", "lotgd/test", "after", move |_game, ctx| {
                *flag.lock() = true;
                Ok(ctx)
            })
            .unwrap();

        let err = game
            .publish("h/lotgd/x", ContextData::from_json(json!({"value": 0})).unwrap())
            .unwrap_err();
        assert!(matches!(err, CoreError::Handler(_)));
        assert!(!*called.lock());

        let stats = game.events().stats();
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.handler_invocations, 2);
    }

    #[test]
    fn test_publish_rejects_reshaped_data() {
        let mut game = game();
        game.events_mut()
            .subscribe_callback("h/lotgd/*", "lotgd/test", "reshaper", |_game, ctx| {
                Ok(EventContext::new(ctx.event(), ctx.matching_pattern(), ContextData::empty()))
            })
            .unwrap();

        let called = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&called);
        game.events_mut()
            .subscribe_callback("h/lotgd/*", "lotgd/test", "after", move |_game, ctx| {
                *flag.lock() = true;
                Ok(ctx)
            })
            .unwrap();

        let err = game
            .publish("h/lotgd/x", ContextData::from_json(json!({"value": 1})).unwrap())
            .unwrap_err();
        assert!(matches!(err, CoreError::SchemaError { .. }));
        assert!(!*called.lock());
        assert_eq!(game.events().stats().failures, 1);
    }

    #[test]
    fn test_publish_accepts_rebuilt_data_of_same_shape() {
        let mut game = game();
        game.events_mut()
            .subscribe_callback("h/lotgd/*", "lotgd/test", "rebuild", |_game, ctx| {
                let data = ContextData::from_json(json!({"value": 7}))?;
                Ok(EventContext::new(ctx.event(), ctx.matching_pattern(), data))
            })
            .unwrap();

        let result = game
            .publish("h/lotgd/x", ContextData::from_json(json!({"value": 1})).unwrap())
            .unwrap();
        assert_eq!(value(&result), 7);
    }

    #[test]
    fn test_publish_class_handler_missing() {
        let mut game = game();
        game.events_mut()
            .subscribe("h/lotgd/*", HandlerRef::class("lotgd/missing"), "lotgd/missing")
            .unwrap();

        let err = game.publish("h/lotgd/x", ContextData::empty()).unwrap_err();
        assert!(matches!(err, CoreError::ClassNotFound { .. }));
    }

    #[test]
    fn test_stats_track_changes() {
        let mut game = game();
        game.events_mut()
            .subscribe_callback("h/lotgd/*", "lotgd/test", "noop", |_game, ctx| Ok(ctx))
            .unwrap();
        game.events_mut()
            .subscribe_callback("h/lotgd/*", "lotgd/test", "adder", add(2))
            .unwrap();

        let result = game
            .publish("h/lotgd/x", ContextData::from_json(json!({"value": 1})).unwrap())
            .unwrap();
        assert_eq!(value(&result), 3);

        let stats = game.events().stats();
        assert_eq!(stats.publishes, 1);
        assert_eq!(stats.handler_invocations, 2);
        assert_eq!(stats.changed_steps, 1);
        assert!(stats.last_publish_at.is_some());

        game.events().reset_stats();
        assert_eq!(game.events().stats(), DispatchStats::default());
    }

    #[test]
    fn test_stats_disabled() {
        let manager = EventManager::with_config(EventManagerConfig {
            collect_stats: false,
        });
        let game = game();
        manager.publish(&game, "h/lotgd/x", ContextData::empty()).unwrap();
        assert_eq!(manager.stats().publishes, 0);
    }

    #[test]
    fn test_restore_skips_existing() {
        let mut manager = EventManager::new();
        let records = vec![
            SubscriptionRecord::new("h/a/*", "lotgd/one", "lotgd/one"),
            SubscriptionRecord::new("h/b/*", "lotgd/one", "lotgd/one"),
        ];
        assert_eq!(manager.restore(&records).unwrap(), 2);
        assert_eq!(manager.restore(&records).unwrap(), 0);

        let persisted: Vec<_> = manager.subscriptions().filter_map(|s| s.to_record()).collect();
        assert_eq!(persisted, records);
    }

    #[test]
    fn test_callback_is_not_persisted() {
        let mut manager = EventManager::new();
        manager
            .subscribe_callback("h/a/*", "lotgd/one", "cb", |_game, ctx| Ok(ctx))
            .unwrap();
        let sub = manager.subscriptions().next().unwrap();
        assert!(!sub.handler().is_class());
        assert!(sub.to_record().is_none());
        assert_eq!(manager.matching("h/a/b").len(), 1);
        assert!(!manager.has_subscribers("h/b/a"));
    }
}
