//! Service Backbone - 长驻服务的配置与组件生命周期骨架
//!
//! 这是一个用Rust编写的服务运行时骨架，支持：
//! - 分层YAML配置与属性替换
//! - 配置文件 include 与热重载检测
//! - 按配置协调组件的创建、启动、停止与重载
//! - 结构化日志记录

pub mod cli;
pub mod component;
pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod signal;

// 重新导出主要类型
pub use component::{Component, Manager, ManagerRegistry, Supervisor};
pub use config::{Array, Expander, Section, Watch};
pub use error::BackboneError;
pub use runtime::{Runtime, RuntimeOptions};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
