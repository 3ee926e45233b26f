//! 核心模块
//!
//! 包含运行时配置和游戏上下文。

pub mod config;
pub mod game;

pub use config::{CoreConfig, CoreConfigBuilder, EventsConfig, LogConfig, ModuleConfig};
pub use game::{Game, GameBuilder};
