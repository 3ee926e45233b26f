//! 模块管理器
//!
//! 负责模块的注册、注销、启动恢复与一致性校验。
//!
//! # 安装顺序
//!
//! [`ModuleManager::register_module`] 先用 [`DependencyGraph`] 求出包的依赖闭包
//! 与完整安装顺序，再按顺序逐个注册：
//!
//! - 依赖失败的模块不会注册，其 `on_register` 不会执行
//! - 与失败模块无依赖关系的模块照常注册
//! - 已存在的模块视为成功
//!
//! 所有写入只进入存储的工作副本，由调用方决定何时 `flush`。

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::catalog::Module;
use super::dependency::DependencyGraph;
use super::manifest::LibraryConfig;
use super::record::ModuleRecord;
use crate::core::config::ModuleConfig;
use crate::core::Game;
use crate::event::HandlerRef;
use crate::package::{PackageProvider, MODULE_KIND};
use crate::store::SubscriptionRecord;
use crate::utils::{CoreError, Result};

/// 单个模块的安装结果
#[derive(Debug)]
enum Outcome {
    Registered,
    AlreadyPresent,
    Failed(CoreError),
}

/// 安装失败的模块
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallFailure {
    /// 模块名
    pub library: String,
    /// 失败原因
    pub reason: String,
}

/// 批量安装报告
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    /// 本次新注册的模块（安装顺序）
    pub registered: Vec<String>,
    /// 已经注册过的模块
    pub already_present: Vec<String>,
    /// 注册失败的模块
    pub failed: Vec<InstallFailure>,
    /// 非模块类型而跳过的包
    pub skipped: Vec<String>,
}

impl InstallReport {
    /// 是否没有任何失败
    pub fn is_flawless(&self) -> bool {
        self.failed.is_empty()
    }

    fn push_failure(&mut self, library: &str, reason: String) {
        if !self.failed.iter().any(|f| f.library == library) {
            self.failed.push(InstallFailure {
                library: library.to_string(),
                reason,
            });
        }
    }
}

/// 模块管理器
#[derive(Debug, Clone)]
pub struct ModuleManager {
    /// 视为模块的包类型
    module_kind: String,
}

impl Default for ModuleManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleManager {
    /// 创建模块管理器
    pub fn new() -> Self {
        Self::with_module_kind(MODULE_KIND)
    }

    /// 指定模块包类型
    pub fn with_module_kind(kind: impl Into<String>) -> Self {
        Self {
            module_kind: kind.into(),
        }
    }

    /// 从配置创建
    pub fn from_config(config: &ModuleConfig) -> Self {
        Self::with_module_kind(config.module_kind.clone())
    }

    /// 视为模块的包类型
    pub fn module_kind(&self) -> &str {
        &self.module_kind
    }

    /// 注册单个模块
    ///
    /// 校验清单、写入记录与订阅、调用 `on_register`。钩子失败时回滚本次的
    /// 全部写入与内存订阅。
    ///
    /// # Errors
    ///
    /// - 清单无效时返回 `InvalidConfiguration`，此时不触碰存储
    /// - 模块已注册时返回 `ModuleAlreadyExists`
    /// - 实现类不在模块目录中时返回 `ClassNotFound`
    /// - `on_register` 失败时返回 `LifecycleHookFailed`
    pub fn register(&self, game: &mut Game, config: &LibraryConfig) -> Result<ModuleRecord> {
        config.validate()?;
        let library = config.name.as_str();

        if game.store().find_module(library)?.is_some() {
            return Err(CoreError::ModuleAlreadyExists(library.to_string()));
        }

        let module = game
            .catalog()
            .get(&config.class)
            .ok_or_else(|| CoreError::ClassNotFound {
                library: library.to_string(),
                class: config.class.clone(),
            })?;

        let mut record = ModuleRecord::new(library).with_class(config.class.as_str());
        let mut subscribed = Vec::new();

        if let Err(e) = Self::stage(game, config, &record, &mut subscribed) {
            Self::rollback(game, library, &subscribed);
            return Err(e);
        }

        debug!(library = %library, "调用 on_register 钩子");
        if let Err(e) = module.on_register(game, &mut record) {
            Self::rollback(game, library, &subscribed);
            warn!(library = %library, error = %e, "on_register 失败，已回滚");
            return Err(CoreError::LifecycleHookFailed {
                library: library.to_string(),
                hook: "on_register",
                reason: e.to_string(),
            });
        }

        // 钩子可能修改了记录
        if let Err(e) = game.store().persist_module(&record) {
            Self::rollback(game, library, &subscribed);
            warn!(library = %library, error = %e, "写入模块记录失败，已回滚");
            return Err(e);
        }

        info!(
            library = %library,
            class = %config.class,
            subscriptions = subscribed.len(),
            "模块注册成功"
        );
        Ok(record)
    }

    fn stage(
        game: &mut Game,
        config: &LibraryConfig,
        record: &ModuleRecord,
        subscribed: &mut Vec<SubscriptionRecord>,
    ) -> Result<()> {
        game.store().persist_module(record)?;

        let mut seen = HashSet::new();
        for pattern in &config.subscriptions {
            if !seen.insert(pattern.as_str()) {
                continue;
            }
            let subscription =
                SubscriptionRecord::new(pattern.as_str(), config.class.as_str(), config.name.as_str());
            game.store().persist_subscription(&subscription)?;
            game.events_mut().subscribe(
                pattern,
                HandlerRef::class(config.class.as_str()),
                &config.name,
            )?;
            subscribed.push(subscription);
        }
        Ok(())
    }

    fn rollback(game: &mut Game, library: &str, subscribed: &[SubscriptionRecord]) {
        for subscription in subscribed {
            if let Err(e) = game.events_mut().unsubscribe(
                &subscription.pattern,
                &subscription.class,
                &subscription.library,
            ) {
                warn!(
                    library = %library,
                    pattern = %subscription.pattern,
                    error = %e,
                    "回滚内存订阅失败"
                );
            }
        }
        if let Err(e) = game.store().remove_subscriptions(library) {
            warn!(library = %library, error = %e, "回滚订阅记录失败");
        }
        if let Err(e) = game.store().remove_module(library) {
            warn!(library = %library, error = %e, "回滚模块记录失败");
        }
    }

    /// 按依赖顺序注册一个包及其依赖
    ///
    /// `registered` 记录本轮已成功处理的模块，已在其中的模块直接跳过。
    /// 返回整个依赖子树是否全部成功。处在环上或依赖环的模块以
    /// `CircularDependency` 失败，其余模块照常注册。
    ///
    /// # Errors
    ///
    /// 包索引中没有该包时返回 `PackageNotFound`
    pub fn register_module<P>(
        &self,
        game: &mut Game,
        provider: &P,
        name: &str,
        registered: &mut HashSet<String>,
    ) -> Result<bool>
    where
        P: PackageProvider + ?Sized,
    {
        let outcomes = self.install_closure(game, provider, name, registered)?;
        Ok(outcomes
            .iter()
            .all(|(_, outcome)| !matches!(outcome, Outcome::Failed(_))))
    }

    /// 安装包索引中的全部模块
    ///
    /// 按索引顺序逐个处理，所有包共享同一个 `registered` 集合。
    /// 单个包的失败（包括循环依赖）记录在报告中，不影响其余包。
    pub fn install_all<P>(&self, game: &mut Game, provider: &P) -> Result<InstallReport>
    where
        P: PackageProvider + ?Sized,
    {
        let mut registered = HashSet::new();
        let mut report = InstallReport::default();

        for package in provider.packages() {
            if !package.is_kind(&self.module_kind) {
                debug!(package = %package.name, kind = %package.kind, "非模块包，跳过");
                report.skipped.push(package.name.clone());
                continue;
            }
            if registered.contains(&package.name) {
                continue;
            }

            match self.install_closure(game, provider, &package.name, &mut registered) {
                Ok(outcomes) => {
                    for (library, outcome) in outcomes {
                        match outcome {
                            Outcome::Registered => report.registered.push(library),
                            Outcome::AlreadyPresent => report.already_present.push(library),
                            Outcome::Failed(e) => report.push_failure(&library, e.to_string()),
                        }
                    }
                }
                Err(e) => {
                    warn!(package = %package.name, error = %e, "无法安装包");
                    report.push_failure(&package.name, e.to_string());
                }
            }
        }

        info!(
            registered = report.registered.len(),
            already_present = report.already_present.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "模块安装完成"
        );
        Ok(report)
    }

    /// 求依赖闭包并按顺序安装，返回每个被处理模块的结果
    fn install_closure<P>(
        &self,
        game: &mut Game,
        provider: &P,
        name: &str,
        registered: &mut HashSet<String>,
    ) -> Result<Vec<(String, Outcome)>>
    where
        P: PackageProvider + ?Sized,
    {
        let package = provider
            .package(name)
            .ok_or_else(|| CoreError::PackageNotFound(name.to_string()))?;

        if !package.is_kind(&self.module_kind) || registered.contains(name) {
            return Ok(Vec::new());
        }

        let graph = DependencyGraph::closure(provider, [name], &self.module_kind);
        let (order, blocked) = graph.partial_sort();
        debug!(package = %name, order = ?order, blocked = ?blocked, "安装顺序");

        let mut failed: HashSet<String> = HashSet::new();
        let mut outcomes = Vec::new();

        for library in order {
            if registered.contains(&library) {
                continue;
            }

            let outcome = match self.install_one(game, provider, &graph, &library, &failed) {
                Ok(outcome) => outcome,
                Err(e) => Outcome::Failed(e),
            };

            match &outcome {
                Outcome::Registered | Outcome::AlreadyPresent => {
                    registered.insert(library.clone());
                }
                Outcome::Failed(e) => {
                    warn!(library = %library, error = %e, "模块注册失败");
                    failed.insert(library.clone());
                }
            }
            outcomes.push((library, outcome));
        }

        if !blocked.is_empty() {
            let cycle = graph
                .find_cycle()
                .map(|path| path.join(" -> "))
                .unwrap_or_else(|| blocked.join(", "));
            for library in blocked {
                if registered.contains(&library) {
                    continue;
                }
                warn!(library = %library, cycle = %cycle, "模块处在循环依赖中");
                let error = CoreError::CircularDependency(cycle.clone());
                outcomes.push((library, Outcome::Failed(error)));
            }
        }

        Ok(outcomes)
    }

    fn install_one<P>(
        &self,
        game: &mut Game,
        provider: &P,
        graph: &DependencyGraph,
        library: &str,
        failed: &HashSet<String>,
    ) -> Result<Outcome>
    where
        P: PackageProvider + ?Sized,
    {
        let package = provider
            .package(library)
            .ok_or_else(|| CoreError::PackageNotFound(library.to_string()))?;

        for dependency in graph.dependencies(library) {
            if !failed.contains(dependency) {
                continue;
            }
            return Err(match provider.package(dependency) {
                None => CoreError::DependencyNotFound {
                    library: library.to_string(),
                    dependency: dependency.clone(),
                },
                Some(_) => CoreError::DependencyFailed {
                    library: library.to_string(),
                    dependency: dependency.clone(),
                },
            });
        }

        for dependency in graph.dependencies(library) {
            if let Some(found) = provider.package(dependency) {
                if !package.accepts(found)? {
                    return Err(CoreError::VersionMismatch {
                        library: library.to_string(),
                        dependency: dependency.clone(),
                        required: package.require.get(dependency).cloned().unwrap_or_default(),
                        found: found.version.clone(),
                    });
                }
            }
        }

        let config = LibraryConfig::from_package(package)?;
        match self.register(game, &config) {
            Ok(_) => Ok(Outcome::Registered),
            Err(e) if e.is_benign() => {
                debug!(library = %library, "模块已注册，视为成功");
                Ok(Outcome::AlreadyPresent)
            }
            Err(e) => Err(e),
        }
    }

    /// 注销模块
    ///
    /// 调用 `on_unregister` 后移除内存订阅、订阅记录与模块记录。
    /// 实现类已不存在时跳过钩子。
    pub fn unregister(&self, game: &mut Game, library: &str) -> Result<()> {
        let record = game
            .store()
            .find_module(library)?
            .ok_or_else(|| CoreError::ModuleNotFound(library.to_string()))?;

        let module = game.catalog().get(record.class());
        match module {
            Some(module) => {
                module
                    .on_unregister(game, &record)
                    .map_err(|e| CoreError::LifecycleHookFailed {
                        library: library.to_string(),
                        hook: "on_unregister",
                        reason: e.to_string(),
                    })?;
            }
            None => {
                warn!(library = %library, class = %record.class(), "实现类不存在，跳过 on_unregister");
            }
        }

        let removed = game.events_mut().unsubscribe_module(library);
        game.store().remove_subscriptions(library)?;
        game.store().remove_module(library)?;

        info!(library = %library, subscriptions = removed, "模块已注销");
        Ok(())
    }

    /// 启动：恢复已启用模块的订阅并登记扩展方法，然后封闭扩展注册表
    ///
    /// 返回恢复的订阅数量。
    pub fn boot(&self, game: &mut Game) -> Result<usize> {
        let mut restored = 0;
        let records = game.store().modules()?;

        for record in records {
            if !record.is_enabled() {
                debug!(library = %record.library(), "模块已禁用，跳过");
                continue;
            }

            let subscriptions = game.store().subscriptions_of(record.library())?;
            restored += game.events_mut().restore(&subscriptions)?;

            let module = game.catalog().get(record.class());
            match module {
                Some(module) => module.register_extensions(game.extensions_mut())?,
                None => {
                    warn!(library = %record.library(), class = %record.class(), "实现类不存在，跳过扩展登记");
                }
            }
        }

        game.extensions_mut().finish_init()?;
        info!(subscriptions = restored, "模块启动完成");
        Ok(restored)
    }

    /// 启用或禁用模块
    ///
    /// 禁用时移除其内存订阅，启用时从存储恢复。
    pub fn set_enabled(&self, game: &mut Game, library: &str, enabled: bool) -> Result<ModuleRecord> {
        let mut record = game
            .store()
            .find_module(library)?
            .ok_or_else(|| CoreError::ModuleNotFound(library.to_string()))?;

        if record.is_enabled() == enabled {
            return Ok(record);
        }

        record.set_enabled(enabled);
        game.store().persist_module(&record)?;

        if enabled {
            let subscriptions = game.store().subscriptions_of(library)?;
            game.events_mut().restore(&subscriptions)?;
        } else {
            game.events_mut().unsubscribe_module(library);
        }

        info!(library = %library, enabled = enabled, "模块状态已更新");
        Ok(record)
    }

    /// 校验已注册模块的一致性，返回问题描述（为空表示全部一致）
    ///
    /// - 实现类必须存在于模块目录中，否则每个模块只报告这一个问题
    /// - 每条订阅记录引用的实现类必须存在
    /// - 已启用模块的订阅必须在事件管理器中生效
    pub fn validate(&self, game: &Game) -> Result<Vec<String>> {
        let mut problems = Vec::new();

        for record in game.store().modules()? {
            let library = record.library();
            if !game.catalog().contains(record.class()) {
                problems.push(format!(
                    "模块 '{}' 的实现类 '{}' 不存在",
                    library,
                    record.class()
                ));
                continue;
            }

            for subscription in game.store().subscriptions_of(library)? {
                if !game.catalog().contains(&subscription.class) {
                    problems.push(format!(
                        "模块 '{}' 的订阅 '{}' 引用的实现类 '{}' 不存在",
                        library, subscription.pattern, subscription.class
                    ));
                } else if record.is_enabled()
                    && !game.events().is_subscribed(
                        &subscription.pattern,
                        &subscription.class,
                        &subscription.library,
                    )
                {
                    problems.push(format!(
                        "模块 '{}' 的订阅 '{}' 未生效",
                        library, subscription.pattern
                    ));
                }
            }
        }

        if problems.is_empty() {
            debug!("模块校验通过");
        } else {
            warn!(problems = problems.len(), "模块校验发现问题");
        }
        Ok(problems)
    }

    /// 解析实现类
    pub fn resolve(&self, game: &Game, library: &str) -> Result<std::sync::Arc<dyn Module>> {
        let record = game
            .store()
            .find_module(library)?
            .ok_or_else(|| CoreError::ModuleNotFound(library.to_string()))?;
        game.catalog()
            .get(record.class())
            .ok_or_else(|| CoreError::ClassNotFound {
                library: library.to_string(),
                class: record.class().to_string(),
            })
    }
}
