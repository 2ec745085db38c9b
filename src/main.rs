//! Service Backbone 主程序入口
//!
//! 注册内置组件类型后执行命令

use anyhow::{Context, Result};
use clap::Parser;
use service_backbone::cli::args::{Args, Commands};
use service_backbone::cli::commands::{
    Command, RunCommand, ShowCommand, ValidateCommand, VersionCommand,
};
use service_backbone::component::{register_builtin, ManagerRegistry};
use service_backbone::logging::{LogConfig, LoggingSystem};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let args = Args::parse();

    // 初始化日志系统
    let log_config = LogConfig {
        level: args.log_level.clone().into(),
        console: true,
        json_format: args.json_logs,
        ..Default::default()
    };

    let _logging_system = LoggingSystem::setup_logging(log_config).context("初始化日志系统失败")?;

    info!("Service Backbone v{} 启动", service_backbone::VERSION);

    // 组件类型在任何命令之前注册，show 命令只依赖注册表
    let registry = ManagerRegistry::new();
    register_builtin(&registry);
    let registry = Arc::new(registry);

    if let Err(e) = execute_command(&args, registry).await {
        error!("命令执行失败: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// 执行CLI命令
async fn execute_command(args: &Args, registry: Arc<ManagerRegistry>) -> Result<()> {
    let command: Box<dyn Command> = match &args.command {
        Commands::Run { .. } => Box::new(RunCommand::new(registry)),
        Commands::Show { .. } => Box::new(ShowCommand::new(registry)),
        Commands::Validate { .. } => Box::new(ValidateCommand::new(registry)),
        Commands::Version { .. } => Box::new(VersionCommand),
    };

    command.execute(args).await.map_err(|e| anyhow::anyhow!(e))
}
