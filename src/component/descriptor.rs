//! 组件描述
//!
//! `ComponentSpec` 是组件列表中一个条目的解析结果，
//! `Descriptor` 是 Supervisor 对一个在册组件的记录。

use crate::component::manager::{Component, Manager};
use crate::config::check::non_empty;
use crate::config::Section;
use crate::error::ConfigError;
use serde::Serialize;
use std::sync::Arc;

/// 组件配置所在的键
pub const CONFIG_KEY: &str = "config";

/// 当前主机名
pub fn current_hostname() -> String {
    #[cfg(unix)]
    {
        if let Ok(name) = nix::unistd::gethostname() {
            if let Ok(name) = name.into_string() {
                return name;
            }
        }
    }

    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_default()
}

/// 主机名是否与白名单条目匹配：忽略大小写，比较完整名称或第一段
fn host_matches(entry: &str, hostname: &str) -> bool {
    let entry = entry.trim();
    if entry.eq_ignore_ascii_case(hostname) {
        return true;
    }
    let short = hostname.split('.').next().unwrap_or(hostname);
    entry.eq_ignore_ascii_case(short)
}

/// 组件列表条目
#[derive(Debug, Clone)]
pub struct ComponentSpec {
    /// 组件名称，进程内唯一
    pub name: String,
    /// 组件类型
    pub kind: String,
    /// 显式禁用
    pub disabled: bool,
    /// 主机白名单，为空表示不限制
    pub hosts: Vec<String>,
    /// 传给 Manager 的配置节点
    pub config: Section,
}

impl ComponentSpec {
    /// 解析组件条目
    ///
    /// # 参数
    /// * `entry` - 组件列表中的一个节点
    ///
    /// # 返回
    /// * `Result<Self, ConfigError>` - 解析结果，错误带有条目路径
    pub fn parse(entry: &Section) -> Result<Self, ConfigError> {
        let mut spec = Self {
            name: String::new(),
            kind: String::new(),
            disabled: false,
            hosts: Vec::new(),
            config: Section::empty(),
        };

        entry
            .parser()
            .read_required("name", &mut spec.name, &[&non_empty])
            .read_required("type", &mut spec.kind, &[&non_empty])
            .read("disabled", &mut spec.disabled, &[])
            .read("hosts", &mut spec.hosts, &[])
            .subsection(CONFIG_KEY, &mut spec.config)
            .finish()?;

        spec.name = spec.name.trim().to_string();
        spec.kind = spec.kind.trim().to_string();
        Ok(spec)
    }

    /// 白名单是否允许在给定主机上运行
    pub fn allowed_on(&self, hostname: &str) -> bool {
        self.hosts.is_empty() || self.hosts.iter().any(|h| host_matches(h, hostname))
    }

    /// 在给定主机上是否禁用：显式禁用，或白名单不包含该主机
    pub fn disabled_on(&self, hostname: &str) -> bool {
        self.disabled || !self.allowed_on(hostname)
    }
}

/// 组件状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentState {
    /// 占位记录，不创建实例
    Disabled,
    /// 已创建，尚未启动
    Created,
    /// 运行中
    Running,
}

impl std::fmt::Display for ComponentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentState::Disabled => write!(f, "disabled"),
            ComponentState::Created => write!(f, "created"),
            ComponentState::Running => write!(f, "running"),
        }
    }
}

/// 在册组件
#[derive(Clone)]
pub struct Descriptor {
    pub name: String,
    pub kind: String,
    pub manager: Arc<dyn Manager>,
    pub disabled: bool,
    /// 最近一次生效的配置
    pub config: Section,
    /// 组件实例，禁用的占位记录没有实例
    pub instance: Option<Arc<dyn Component>>,
    pub state: ComponentState,
}

impl Descriptor {
    /// 已创建的组件
    pub fn created(spec: ComponentSpec, manager: Arc<dyn Manager>, instance: Arc<dyn Component>) -> Self {
        Self {
            name: spec.name,
            kind: spec.kind,
            manager,
            disabled: false,
            config: spec.config,
            instance: Some(instance),
            state: ComponentState::Created,
        }
    }

    /// 禁用组件的占位记录
    pub fn placeholder(spec: ComponentSpec, manager: Arc<dyn Manager>) -> Self {
        Self {
            name: spec.name,
            kind: spec.kind,
            manager,
            disabled: true,
            config: spec.config,
            instance: None,
            state: ComponentState::Disabled,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == ComponentState::Running
    }

    /// 对外展示的状态
    pub fn status(&self) -> ComponentStatus {
        ComponentStatus {
            name: self.name.clone(),
            kind: self.kind.clone(),
            state: self.state,
        }
    }
}

impl std::fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Descriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("disabled", &self.disabled)
            .field("state", &self.state)
            .field("config", &self.config.context())
            .finish()
    }
}

/// 组件状态快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentStatus {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub state: ComponentState,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(yaml: &str) -> Section {
        let root = Section::from_yaml(yaml).unwrap();
        root.get_array("components").unwrap().get(0).unwrap()
    }

    #[test]
    fn test_parse_entry() {
        let spec = ComponentSpec::parse(&entry(
            "components:\n- name: web\n  type: http\n  hosts: [a, b]\n  config:\n    port: 80\n",
        ))
        .unwrap();
        assert_eq!(spec.name, "web");
        assert_eq!(spec.kind, "http");
        assert!(!spec.disabled);
        assert_eq!(spec.hosts, vec!["a", "b"]);
        assert_eq!(spec.config.context(), "components.0.config");
        assert_eq!(spec.config.get_int("port").unwrap(), Some(80));
    }

    #[test]
    fn test_parse_entry_errors_carry_path() {
        let err = ComponentSpec::parse(&entry("components:\n- type: http\n")).unwrap_err();
        assert_eq!(err.path(), "components.0.name");

        let err =
            ComponentSpec::parse(&entry("components:\n- name: a\n  type: x\n  disabled: maybe\n"))
                .unwrap_err();
        assert_eq!(err.path(), "components.0.disabled");
    }

    #[test]
    fn test_host_filter() {
        let spec = ComponentSpec::parse(&entry(
            "components:\n- name: w\n  type: t\n  hosts: [other-host]\n",
        ))
        .unwrap();
        assert!(spec.disabled_on("this-host"));
        assert!(!spec.disabled_on("other-host"));
        assert!(!spec.disabled_on("OTHER-HOST.example.com"));

        let open = ComponentSpec::parse(&entry("components:\n- name: w\n  type: t\n")).unwrap();
        assert!(!open.disabled_on("anything"));
    }

    #[test]
    fn test_current_hostname_is_stable() {
        assert_eq!(current_hostname(), current_hostname());
    }
}
