//! # 事件分发集成测试
//!
//! 覆盖上下文数据的不可变语义、模式匹配、处理器顺序和失败传播。

use std::mem::discriminant;
use std::sync::Arc;

use lotgd_core::event::EventPattern;
use lotgd_core::{
    ContextData, ContextSchema, CoreError, EventContext, FieldKind, Game, HandlerRef, Module,
    Result,
};
use parking_lot::Mutex;
use serde_json::json;

// ============================================================================
// 测试辅助
// ============================================================================

type CallLog = Arc<Mutex<Vec<&'static str>>>;

/// 记录调用名并原样返回上下文
fn recorder(
    log: &CallLog,
    name: &'static str,
) -> impl Fn(&Game, EventContext) -> Result<EventContext> + Send + Sync + 'static {
    let log = Arc::clone(log);
    move |_game, context| {
        log.lock().push(name);
        Ok(context)
    }
}

fn village_data() -> ContextData {
    ContextData::from_json(json!({
        "gold": 100,
        "name": "Violet",
        "return": null
    }))
    .unwrap()
}

// ============================================================================
// ContextData
// ============================================================================

#[test]
fn test_set_returns_new_instance_even_for_equal_value() {
    let data = village_data();
    let updated = data.set("gold", 100).unwrap();

    assert_eq!(updated.get("gold").unwrap(), &json!(100));
    assert!(!ContextData::ptr_eq(&data, &updated));

    let changed = data.set("gold", 250).unwrap();
    assert_eq!(changed.get("gold").unwrap(), &json!(250));
    assert_eq!(data.get("gold").unwrap(), &json!(100));
}

#[test]
fn test_unknown_field_fails_same_way_for_get_and_set() {
    let data = village_data();

    let get_err = data.get("mana").unwrap_err();
    let set_err = data.set("mana", 5).unwrap_err();

    assert!(matches!(get_err, CoreError::UnknownField { .. }));
    assert_eq!(discriminant(&get_err), discriminant(&set_err));
    assert!(!data.has("mana"));
}

#[test]
fn test_set_fields_is_atomic() {
    let data = village_data();
    let err = data
        .set_fields([("gold", json!(1)), ("mana", json!(2)), ("name", json!("x"))])
        .unwrap_err();

    match err {
        CoreError::UnknownField { field, .. } => assert_eq!(field, "mana"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(data.get("gold").unwrap(), &json!(100));
    assert_eq!(data.get("name").unwrap(), &json!("Violet"));
}

#[test]
fn test_typed_schema() {
    let schema = Arc::new(
        ContextSchema::new("CharacterDamage")
            .required("hp", FieldKind::Integer)
            .optional("reason", FieldKind::String),
    );

    let err = ContextData::create(Arc::clone(&schema), [("reason", json!("trap"))]).unwrap_err();
    assert!(matches!(err, CoreError::SchemaError { .. }));

    let data = ContextData::create(Arc::clone(&schema), [("hp", json!(12))]).unwrap();
    assert!(data.has("hp"));
    assert!(!data.has("reason"));

    let with_reason = data.set("reason", "trap").unwrap();
    assert_eq!(with_reason.get("reason").unwrap(), &json!("trap"));

    assert!(matches!(
        data.set("hp", "twelve").unwrap_err(),
        CoreError::SchemaError { .. }
    ));
}

// ============================================================================
// 模式匹配
// ============================================================================

#[test]
fn test_wildcard_matching() {
    let wildcard = EventPattern::parse("h/lotgd/core/*").unwrap();
    assert!(wildcard.matches("h/lotgd/core/cli/foo"));
    assert!(wildcard.matches("h/lotgd/core/bar"));
    assert!(!wildcard.matches("h/lotgd/core"));

    let exact = EventPattern::parse("h/lotgd/core/cli").unwrap();
    assert!(!exact.matches("h/lotgd/core/cli/foo"));
    assert!(exact.matches("h/lotgd/core/cli"));
}

#[test]
fn test_wildcard_matching_through_publish() {
    let log: CallLog = Arc::default();
    let mut game = Game::builder().build();
    game.events_mut()
        .subscribe_callback("h/lotgd/core/*", "lotgd/test", "wild", recorder(&log, "wild"))
        .unwrap();
    game.events_mut()
        .subscribe_callback("h/lotgd/core/cli", "lotgd/test", "exact", recorder(&log, "exact"))
        .unwrap();

    game.publish("h/lotgd/core/cli/foo", village_data()).unwrap();
    game.publish("h/lotgd/core/bar", village_data()).unwrap();
    assert_eq!(*log.lock(), vec!["wild", "wild"]);
}

// ============================================================================
// 发布
// ============================================================================

#[test]
fn test_publish_without_subscribers_returns_same_instance() {
    let game = Game::builder().build();
    let data = village_data();

    let result = game.publish("h/lotgd/core/nobody-listens", data.clone()).unwrap();
    assert!(ContextData::ptr_eq(&data, &result));
}

#[test]
fn test_handlers_run_in_registration_order() {
    let log: CallLog = Arc::default();
    let mut game = Game::builder().build();
    for name in ["A", "B", "C"] {
        game.events_mut()
            .subscribe_callback("h/lotgd/core/navigate/*", "lotgd/test", name, recorder(&log, name))
            .unwrap();
    }

    game.publish("h/lotgd/core/navigate/village", village_data())
        .unwrap();
    assert_eq!(*log.lock(), vec!["A", "B", "C"]);
}

#[test]
fn test_data_is_threaded_between_handlers() {
    let mut game = Game::builder().build();
    game.events_mut()
        .subscribe_callback("h/lotgd/bank/*", "lotgd/bank", "interest", |_game, mut context| {
            let gold = context.get_data_field("gold")?.as_i64().unwrap_or(0);
            context.set_data_field("gold", gold + 10)?;
            Ok(context)
        })
        .unwrap();
    game.events_mut()
        .subscribe_callback("h/lotgd/bank/*", "lotgd/bank", "tax", |_game, mut context| {
            let gold = context.get_data_field("gold")?.as_i64().unwrap_or(0);
            context.set_data_field("gold", gold / 2)?;
            Ok(context)
        })
        .unwrap();

    let data = village_data();
    let result = game.publish("h/lotgd/bank/deposit", data.clone()).unwrap();
    assert_eq!(result.get("gold").unwrap(), &json!(55));
    assert_eq!(data.get("gold").unwrap(), &json!(100));

    let stats = game.events().stats();
    assert_eq!(stats.publishes, 1);
    assert_eq!(stats.handler_invocations, 2);
    assert_eq!(stats.changed_steps, 2);
}

#[test]
fn test_handler_failure_aborts_chain() {
    let log: CallLog = Arc::default();
    let mut game = Game::builder().build();
    game.events_mut()
        .subscribe_callback("h/lotgd/core/*", "lotgd/test", "A", recorder(&log, "A"))
        .unwrap();
    game.events_mut()
        .subscribe_callback("h/lotgd/core/*", "lotgd/test", "B", |_game, _context| {
            Err(CoreError::handler("the dragon refuses"))
        })
        .unwrap();
    game.events_mut()
        .subscribe_callback("h/lotgd/core/*", "lotgd/test", "C", recorder(&log, "C"))
        .unwrap();

    let err = game
        .publish("h/lotgd/core/dragon", village_data())
        .unwrap_err();
    assert!(matches!(err, CoreError::Handler(_)));
    assert_eq!(*log.lock(), vec!["A"]);
    assert_eq!(game.events().stats().failures, 1);
}

#[test]
fn test_unknown_field_in_handler_propagates() {
    let mut game = Game::builder().build();
    game.events_mut()
        .subscribe_callback("h/lotgd/core/*", "lotgd/test", "typo", |_game, mut context| {
            context.set_data_field("golld", 1)?;
            Ok(context)
        })
        .unwrap();

    let err = game.publish("h/lotgd/core/x", village_data()).unwrap_err();
    assert!(matches!(err, CoreError::UnknownField { .. }));
}

#[test]
fn test_handlers_cannot_change_payload_shape() {
    let log: CallLog = Arc::default();
    let mut game = Game::builder().build();
    game.events_mut()
        .subscribe_callback("h/lotgd/core/*", "lotgd/test", "swap", |_game, mut context| {
            context.replace_data(ContextData::from_json(json!({"totally": "different"}))?)?;
            Ok(context)
        })
        .unwrap();
    game.events_mut()
        .subscribe_callback("h/lotgd/core/*", "lotgd/test", "after", recorder(&log, "after"))
        .unwrap();

    let err = game.publish("h/lotgd/core/swap", village_data()).unwrap_err();
    assert!(matches!(err, CoreError::SchemaError { .. }));
    assert!(log.lock().is_empty());

    let mut game = Game::builder().build();
    game.events_mut()
        .subscribe_callback("h/lotgd/core/*", "lotgd/test", "fresh", |_game, _context| {
            Ok(EventContext::new("h/other", "h/*", ContextData::empty()))
        })
        .unwrap();

    let err = game.publish("h/lotgd/core/fresh", village_data()).unwrap_err();
    assert!(matches!(err, CoreError::SchemaError { .. }));
}

#[test]
fn test_invalid_event_name() {
    let game = Game::builder().build();
    for event in ["", "h//lotgd", "h/lotgd/*", "h/lotgd core"] {
        assert!(matches!(
            game.publish(event, ContextData::empty()).unwrap_err(),
            CoreError::InvalidEventName(_)
        ));
    }
}

#[test]
fn test_handler_sees_event_and_pattern() {
    let seen: Arc<Mutex<Vec<(String, String)>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let mut game = Game::builder().build();
    game.events_mut()
        .subscribe_callback("h/*/core/*", "lotgd/test", "spy", move |_game, context| {
            sink.lock().push((
                context.event().to_string(),
                context.matching_pattern().to_string(),
            ));
            Ok(context)
        })
        .unwrap();

    game.publish("h/lotgd/core/forest/fight", ContextData::empty())
        .unwrap();
    assert_eq!(
        *seen.lock(),
        vec![(
            "h/lotgd/core/forest/fight".to_string(),
            "h/*/core/*".to_string()
        )]
    );
}

// ============================================================================
// 类处理器
// ============================================================================

struct Healer;

impl Module for Healer {
    fn handle_event(&self, _game: &Game, mut context: EventContext) -> Result<EventContext> {
        if context.has_data_field("hp") {
            context.set_data_field("hp", 100)?;
        }
        Ok(context)
    }
}

#[test]
fn test_class_handler_resolved_at_publish_time() {
    let mut game = Game::builder().build();
    game.events_mut()
        .subscribe("h/lotgd/healer/*", HandlerRef::class("lotgd/healer"), "lotgd/healer")
        .unwrap();

    let data = ContextData::from_json(json!({"hp": 3})).unwrap();
    assert!(matches!(
        game.publish("h/lotgd/healer/visit", data.clone()).unwrap_err(),
        CoreError::ClassNotFound { .. }
    ));

    game.catalog_mut().register("lotgd/healer", Arc::new(Healer));
    let result = game.publish("h/lotgd/healer/visit", data).unwrap();
    assert_eq!(result.get("hp").unwrap(), &json!(100));
}

#[test]
fn test_duplicate_subscription_rejected() {
    let mut game = Game::builder().build();
    game.events_mut()
        .subscribe("h/lotgd/core/*", HandlerRef::class("lotgd/healer"), "lotgd/healer")
        .unwrap();
    let err = game
        .events_mut()
        .subscribe("h/lotgd/core/*", HandlerRef::class("lotgd/healer"), "lotgd/healer")
        .unwrap_err();
    assert!(matches!(err, CoreError::SubscriptionAlreadyExists { .. }));
    assert_eq!(game.events().subscription_count(), 1);
}
