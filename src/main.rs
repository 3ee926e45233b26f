//! LotGD Core 命令行入口
//!
//! 用于检查配置、查看已注册模块和预览安装顺序的命令行工具。
//!
//! # 命令概览
//!
//! - `version` - 显示版本信息
//! - `check-config` - 验证配置文件
//! - `list-modules` - 列出存储中已注册的模块及其订阅
//! - `plan` - 显示包索引中模块的安装顺序
//!
//! # 使用示例
//!
//! ```bash
//! # 检查配置文件
//! lotgd-core check-config -c config.yaml
//!
//! # 查看安装顺序
//! lotgd-core plan --index packages.yaml
//!
//! # 查看已注册模块
//! lotgd-core list-modules --store data/modules.json
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use lotgd_core::module::DependencyGraph;
use lotgd_core::package::PackageIndex;
use lotgd_core::store::FileStore;
use lotgd_core::{CoreConfig, CoreError, Logger, LoggerConfig, PackageProvider};

/// LotGD Core - 事件钩子与模块生命周期
#[derive(Parser)]
#[command(name = "lotgd-core")]
#[command(version, about = "文字游戏运行时的事件钩子与模块管理工具", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    /// 开发模式（显示文件名和行号）
    #[arg(long, global = true)]
    dev: bool,

    /// 子命令
    #[command(subcommand)]
    command: Commands,
}

/// 可用的子命令
#[derive(Subcommand)]
enum Commands {
    /// 查看版本信息
    Version,

    /// 验证配置文件
    ///
    /// 检查配置文件是否有效，并显示解析后的配置内容。
    CheckConfig {
        /// 配置文件路径（不指定则使用全局 -c 选项）
        #[arg(short = 'f', long)]
        file: Option<PathBuf>,
    },

    /// 列出已注册的模块
    ///
    /// 读取 JSON 存储文件，显示模块记录与订阅。
    ListModules {
        /// 存储文件（不指定则使用配置中的 modules.store_path）
        #[arg(short, long)]
        store: Option<PathBuf>,
    },

    /// 显示安装顺序
    ///
    /// 读取包索引，按依赖顺序列出每个模块包的安装计划，并报告循环依赖。
    Plan {
        /// 包索引文件（不指定则使用配置中的 modules.package_index）
        #[arg(short, long)]
        index: Option<PathBuf>,

        /// 只显示指定包的安装计划
        #[arg(short, long)]
        package: Option<String>,
    },
}

/// 初始化日志系统
fn init_logging(level: &str, dev_mode: bool) -> lotgd_core::LogGuard {
    let config = LoggerConfig::builder()
        .level(level)
        .show_file_line(dev_mode)
        .show_target(dev_mode)
        .build();
    Logger::try_init(config)
}

/// 加载配置文件，不存在时使用默认配置
async fn load_config(path: &Path, dev_mode: bool) -> anyhow::Result<CoreConfig> {
    let mut config = if path.exists() {
        let config = CoreConfig::from_file(path)
            .await
            .with_context(|| format!("加载配置文件 {} 失败", path.display()))?;
        info!(path = %path.display(), "已加载配置文件");
        config
    } else {
        debug!(path = %path.display(), "配置文件不存在，使用默认配置");
        CoreConfig::default()
    };
    if dev_mode {
        config.dev_mode = true;
    }
    Ok(config)
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "是"
    } else {
        "否"
    }
}

fn display_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(未设置)".to_string())
}

/// 检查配置文件
async fn check_config(path: &Path) -> anyhow::Result<()> {
    println!("检查配置文件: {}", path.display());
    println!();

    let config = if path.exists() {
        let config = CoreConfig::from_file(path).await?;
        println!("✅ 配置文件有效！");
        config
    } else {
        println!("⚠️  警告: 配置文件不存在，将使用默认配置");
        CoreConfig::default()
    };

    println!();
    println!("配置内容:");
    println!("────────────────────────────────────────");
    println!("  [日志配置]");
    println!("    日志级别:       {}", config.logging.level);
    println!("    文件输出:       {}", yes_no(config.logging.file_output));
    println!("    JSON 格式:      {}", yes_no(config.logging.json_format));
    println!("    轮转策略:       {}", config.logging.rotation);
    println!();
    println!("  [模块配置]");
    println!("    包索引:         {}", display_path(&config.modules.package_index));
    println!("    存储文件:       {}", display_path(&config.modules.store_path));
    println!("    模块包类型:     {}", config.modules.module_kind);
    println!();
    println!("  [事件配置]");
    println!("    分发统计:       {}", yes_no(config.events.stats));
    println!();
    println!("  [其他]");
    println!("    开发模式:       {}", yes_no(config.dev_mode));
    println!("    数据目录:       {}", display_path(&config.data_dir));
    println!("────────────────────────────────────────");
    Ok(())
}

/// 打印版本信息
fn print_version() {
    println!();
    println!("LotGD Core");
    println!("═══════════════════════════════════════");
    println!("  版本:             {}", lotgd_core::VERSION);
    println!("  目标平台:         {}", std::env::consts::ARCH);
    println!("  操作系统:         {}", std::env::consts::OS);
    println!("═══════════════════════════════════════");
    println!();
}

/// 列出已注册的模块
fn list_modules(config: &CoreConfig, store: Option<PathBuf>) -> anyhow::Result<()> {
    let Some(path) = store.or_else(|| {
        config
            .modules
            .store_path
            .as_ref()
            .map(|p| config.resolve_path(p))
    }) else {
        bail!("未指定存储文件，请使用 --store 或在配置中设置 modules.store_path");
    };

    let state = FileStore::load_state(&path)?;

    println!();
    println!("已注册模块 ({})", path.display());
    println!("═══════════════════════════════════════");
    if state.modules.is_empty() {
        println!("  (无)");
    }
    for record in &state.modules {
        println!(
            "  {} [{}] 实现类: {}  注册于: {}",
            record.library(),
            if record.is_enabled() { "启用" } else { "禁用" },
            record.class(),
            record.created_at().format("%Y-%m-%d %H:%M:%S")
        );
        for subscription in state.subscriptions_of(record.library()) {
            println!("      ↳ {} -> {}", subscription.pattern, subscription.class);
        }
    }
    println!("═══════════════════════════════════════");
    println!(
        "  模块: {}  订阅: {}",
        state.modules.len(),
        state.subscriptions.len()
    );
    println!();
    Ok(())
}

/// 显示安装顺序
async fn plan(config: &CoreConfig, index: Option<PathBuf>, package: Option<String>) -> anyhow::Result<()> {
    let Some(path) = index.or_else(|| {
        config
            .modules
            .package_index
            .as_ref()
            .map(|p| config.resolve_path(p))
    }) else {
        bail!("未指定包索引，请使用 --index 或在配置中设置 modules.package_index");
    };

    let index = PackageIndex::from_file(&path).await?;
    let kind = config.modules.module_kind.as_str();

    let roots: Vec<String> = match package {
        Some(name) => {
            if index.package(&name).is_none() {
                return Err(CoreError::PackageNotFound(name).into());
            }
            vec![name]
        }
        None => index.packages_of_kind(kind).map(|p| p.name.clone()).collect(),
    };

    println!();
    println!("安装计划 ({})", path.display());
    println!("═══════════════════════════════════════");

    let mut cycles = 0;
    for root in &roots {
        let graph = DependencyGraph::closure(&index, [root.as_str()], kind);
        match graph.topological_sort() {
            Ok(order) => {
                println!("  {}", root);
                for (step, library) in order.iter().enumerate() {
                    let marker = if index.package(library).is_some() { "" } else { "  (缺失)" };
                    println!("    {}. {}{}", step + 1, library, marker);
                }
            }
            Err(e) => {
                cycles += 1;
                println!("  {}", root);
                println!("    ❌ {}", e);
            }
        }
    }

    println!("═══════════════════════════════════════");
    println!("  模块包: {}  存在循环依赖: {}", roots.len(), cycles);
    println!();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _guard = match cli.command {
        Commands::Version => None,
        _ => Some(init_logging(&cli.log_level, cli.dev)),
    };

    match cli.command {
        Commands::Version => print_version(),

        Commands::CheckConfig { file } => {
            let path = file.unwrap_or(cli.config);
            check_config(&path).await?;
        }

        Commands::ListModules { store } => {
            let config = load_config(&cli.config, cli.dev).await?;
            list_modules(&config, store)?;
        }

        Commands::Plan { index, package } => {
            let config = load_config(&cli.config, cli.dev).await?;
            plan(&config, index, package).await?;
        }
    }

    Ok(())
}
