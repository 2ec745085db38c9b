//! 错误处理模块
//!
//! 定义配置解析与组件生命周期的统一错误类型

use std::time::Duration;
use thiserror::Error;

/// Service Backbone 的主要错误类型
#[derive(Error, Debug)]
pub enum BackboneError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 组件生命周期相关错误
    #[error("组件错误: {0}")]
    Component(#[from] ComponentError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// YAML序列化/反序列化错误
    #[error("YAML错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置错误类型
///
/// 所有由 Section 产生的错误都带有点分路径，例如 `components.3.config.port`
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// 文档结构解析错误
    #[error("{path}: 配置解析失败: {message}")]
    ParseError { path: String, message: String },

    /// 缺少必填字段
    #[error("{path}: 缺少必填字段")]
    MissingField { path: String },

    /// 类型转换错误
    #[error("{path}: 无法转换为 {kind}: {message}")]
    Coercion {
        path: String,
        kind: &'static str,
        message: String,
    },

    /// 字段校验错误
    #[error("{path}: 校验失败: {message}")]
    ValidationError { path: String, message: String },

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 配置文件读取或解析失败
    #[error("读取配置文件失败 {path}: {message}")]
    FileError { path: String, message: String },

    /// include 嵌套过深（通常是循环引用）
    #[error("include 嵌套超过 {limit} 层: {path}")]
    IncludeDepth { path: String, limit: usize },
}

impl ConfigError {
    /// 错误所指向的点分路径或文件路径
    pub fn path(&self) -> &str {
        match self {
            ConfigError::ParseError { path, .. }
            | ConfigError::MissingField { path }
            | ConfigError::Coercion { path, .. }
            | ConfigError::ValidationError { path, .. }
            | ConfigError::FileNotFound { path }
            | ConfigError::FileError { path, .. }
            | ConfigError::IncludeDepth { path, .. } => path,
        }
    }
}

/// 组件生命周期错误类型
#[derive(Error, Debug)]
pub enum ComponentError {
    /// 同一次加载中出现重名组件
    #[error("组件名称重复: {name}")]
    DuplicateName { name: String },

    /// 未注册的组件类型
    #[error("组件 {name} 使用了未注册的类型: {kind}")]
    UnknownType { name: String, kind: String },

    /// 未注册的组件类型（show 查询）
    #[error("未注册的组件类型: {kind}")]
    UnknownKind { kind: String },

    /// create/start/stop/reload 失败
    #[error("组件 {name} {action} 失败: {message}")]
    Lifecycle {
        name: String,
        action: &'static str,
        message: String,
    },

    /// 启动批次超出共享截止时间
    #[error("组件 {name} 启动超时 (批次预算 {budget:?})")]
    Timeout { name: String, budget: Duration },
}

impl ComponentError {
    /// 将组件实现返回的错误与组件名称串联
    pub fn lifecycle(name: &str, action: &'static str, err: &anyhow::Error) -> Self {
        ComponentError::Lifecycle {
            name: name.to_string(),
            action,
            message: format!("{err:#}"),
        }
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, BackboneError>;
