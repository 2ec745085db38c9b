//! 命令行参数定义
//!
//! 使用clap定义应用程序的命令行接口

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Service Backbone - 分层YAML配置解析与组件生命周期监督
#[derive(Parser, Debug, Clone)]
#[command(
    name = "service-backbone",
    version = crate::VERSION,
    about = crate::APP_DESCRIPTION,
    long_about = None
)]
pub struct Args {
    /// 配置文件路径
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "配置文件路径",
        env = "BACKBONE_CONFIG",
        global = true
    )]
    pub config: Option<PathBuf>,

    /// 日志级别
    #[arg(
        short,
        long,
        value_enum,
        default_value = "info",
        help = "日志级别",
        env = "BACKBONE_LOG_LEVEL",
        global = true
    )]
    pub log_level: LogLevel,

    /// 以JSON格式输出日志
    #[arg(long, help = "以JSON格式输出日志", global = true)]
    pub json_logs: bool,

    /// 子命令
    #[command(subcommand)]
    pub command: Commands,
}

/// 日志级别枚举
#[derive(ValueEnum, Clone, Debug, PartialEq)]
pub enum LogLevel {
    /// 跟踪级别
    Trace,
    /// 调试级别
    Debug,
    /// 信息级别
    Info,
    /// 警告级别
    Warn,
    /// 错误级别
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// 子命令定义
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// 加载配置并运行组件，直到收到关闭信号
    Run {
        /// 组件列表所在的键
        #[arg(
            long,
            value_name = "KEY",
            default_value = "components",
            help = "组件列表所在的键",
            env = "BACKBONE_COMPONENTS_KEY"
        )]
        components_key: String,

        /// 配置文件轮询间隔（秒）
        #[arg(
            long,
            value_name = "SECONDS",
            default_value = "2",
            help = "配置文件轮询间隔（秒）",
            env = "BACKBONE_WATCH_INTERVAL"
        )]
        watch_interval: u64,

        /// 忽略文档中的 autoreload 设置，不监控配置文件
        #[arg(long, help = "禁用配置文件自动重载")]
        no_autoreload: bool,
    },

    /// 显示已注册组件类型的配置说明，不启动任何组件
    Show {
        /// 组件类型，`all` 表示全部
        #[arg(value_name = "TYPE", default_value = "all", help = "组件类型")]
        kind: String,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 验证配置文件与全部组件条目，不创建任何组件
    Validate {
        /// 组件列表所在的键
        #[arg(long, value_name = "KEY", default_value = "components", help = "组件列表所在的键")]
        components_key: String,

        /// 是否显示详细信息
        #[arg(short, long, help = "显示详细信息")]
        verbose: bool,
    },

    /// 显示版本信息
    Version {
        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },
}

/// 输出格式枚举
#[derive(ValueEnum, Clone, Debug, PartialEq)]
pub enum OutputFormat {
    /// 文本格式
    Text,
    /// JSON格式
    Json,
    /// YAML格式
    Yaml,
}

impl Args {
    /// 解析命令行参数
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// 获取配置文件路径
    pub fn get_config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::get_default_config_path)
    }

    /// 是否启用详细输出
    pub fn is_verbose(&self) -> bool {
        matches!(self.log_level, LogLevel::Debug | LogLevel::Trace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_defaults() {
        let args = Args::try_parse_from(["service-backbone", "-c", "a.yaml", "run"]).unwrap();
        assert_eq!(args.get_config_path(), PathBuf::from("a.yaml"));
        assert_eq!(args.log_level, LogLevel::Info);
        match args.command {
            Commands::Run {
                components_key,
                watch_interval,
                no_autoreload,
            } => {
                assert_eq!(components_key, "components");
                assert_eq!(watch_interval, 2);
                assert!(!no_autoreload);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_show_and_global_flags() {
        let args = Args::try_parse_from([
            "service-backbone",
            "show",
            "heartbeat",
            "--format",
            "json",
            "-l",
            "debug",
            "--json-logs",
        ])
        .unwrap();
        assert!(args.is_verbose());
        assert!(args.json_logs);
        match args.command {
            Commands::Show { kind, format } => {
                assert_eq!(kind, "heartbeat");
                assert_eq!(format, OutputFormat::Json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_show_defaults_to_all() {
        let args = Args::try_parse_from(["service-backbone", "show"]).unwrap();
        assert!(matches!(args.command, Commands::Show { ref kind, .. } if kind == "all"));
    }
}
