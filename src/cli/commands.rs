//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::cli::args::{Args, Commands, OutputFormat};
use crate::component::{ComponentSpec, ManagerRegistry, Supervisor};
use crate::config::{ConfigLoader, Section, YamlConfigLoader};
use crate::error::Result;
use crate::runtime::{Runtime, RuntimeOptions};
use crate::signal::setup_signal_handlers;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 版本命令
pub struct VersionCommand;

impl VersionCommand {
    /// 生成版本信息文本
    pub fn render(format: &OutputFormat) -> Result<String> {
        let version_info = serde_json::json!({
            "name": crate::APP_NAME,
            "version": crate::VERSION,
            "description": crate::APP_DESCRIPTION
        });
        let text = match format {
            OutputFormat::Json => serde_json::to_string_pretty(&version_info)?,
            OutputFormat::Yaml => serde_yaml::to_string(&version_info)?,
            OutputFormat::Text => format!(
                "{} v{}\n{}",
                crate::APP_NAME,
                crate::VERSION,
                crate::APP_DESCRIPTION
            ),
        };
        Ok(text)
    }
}

#[async_trait]
impl Command for VersionCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Version { format } = &args.command {
            println!("{}", Self::render(format)?.trim_end());
        }
        Ok(())
    }
}

/// 组件类型说明命令，只需要类型已注册，不启动任何组件
pub struct ShowCommand {
    registry: Arc<ManagerRegistry>,
}

impl ShowCommand {
    pub fn new(registry: Arc<ManagerRegistry>) -> Self {
        Self { registry }
    }

    /// 生成类型说明
    ///
    /// # 参数
    /// * `kind` - 类型名称或 `all`
    /// * `format` - 输出格式
    ///
    /// # 返回
    /// * `Result<String>` - 渲染结果，类型未注册时返回错误
    pub fn render(&self, kind: &str, format: &OutputFormat) -> Result<String> {
        let docs = self.registry.show(Some(kind))?;

        let text = match format {
            OutputFormat::Text => {
                if docs.is_empty() {
                    "没有已注册的组件类型\n".to_string()
                } else {
                    docs.iter()
                        .map(|(kind, doc)| doc.render_text(kind))
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            }
            OutputFormat::Json => {
                let docs: BTreeMap<_, _> = docs.into_iter().collect();
                serde_json::to_string_pretty(&docs)?
            }
            OutputFormat::Yaml => {
                let docs: BTreeMap<_, _> = docs.into_iter().collect();
                serde_yaml::to_string(&docs)?
            }
        };
        Ok(text)
    }
}

#[async_trait]
impl Command for ShowCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Show { kind, format } = &args.command {
            println!("{}", self.render(kind, format)?.trim_end());
        }
        Ok(())
    }
}

/// 验证命令
pub struct ValidateCommand {
    registry: Arc<ManagerRegistry>,
}

impl ValidateCommand {
    pub fn new(registry: Arc<ManagerRegistry>) -> Self {
        Self { registry }
    }

    /// 解析文档与全部组件条目，检查重名与未注册类型
    ///
    /// # 参数
    /// * `config_path` - 配置文件路径
    /// * `components_key` - 组件列表所在的键
    ///
    /// # 返回
    /// * `Result<(Vec<ComponentSpec>, String)>` - 组件条目与用于主机过滤的主机名
    pub async fn validate_document(
        &self,
        config_path: &Path,
        components_key: &str,
    ) -> Result<(Vec<ComponentSpec>, String)> {
        let loader = YamlConfigLoader::new(components_key);
        let root = loader.load_from_file(config_path).await?;
        let components = root.get_array(components_key)?;

        let supervisor = Supervisor::new(Arc::clone(&self.registry));
        let specs = supervisor.validate(&components)?;
        Ok((specs, supervisor.hostname().to_string()))
    }
}

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Validate {
            components_key,
            verbose,
        } = &args.command
        {
            let config_path = args.get_config_path();
            println!("验证配置文件: {}", config_path.display());

            let (specs, hostname) = self.validate_document(&config_path, components_key).await?;

            if *verbose {
                println!("配置验证通过！");
                println!("组件配置（主机 {hostname}）:");
                for (i, spec) in specs.iter().enumerate() {
                    println!("  {}. {} ({})", i + 1, spec.name, spec.kind);
                    if !spec.hosts.is_empty() {
                        println!("     主机白名单: {}", spec.hosts.join(", "));
                    }
                    println!(
                        "     启用状态: {}",
                        if spec.disabled_on(&hostname) { "否" } else { "是" }
                    );
                }
            } else {
                println!("✓ 配置文件验证通过");
                println!("✓ 找到 {} 个组件配置", specs.len());
            }
        }
        Ok(())
    }
}

/// 运行命令
pub struct RunCommand {
    registry: Arc<ManagerRegistry>,
}

impl RunCommand {
    pub fn new(registry: Arc<ManagerRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Command for RunCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let Commands::Run {
            components_key,
            watch_interval,
            no_autoreload,
        } = &args.command
        else {
            return Ok(());
        };

        let options = RuntimeOptions::new(args.get_config_path())
            .with_components_key(components_key.clone())
            .with_watch_period(Duration::from_secs((*watch_interval).max(1)))
            .with_autoreload(if *no_autoreload { Some(false) } else { None });

        let supervisor = Supervisor::new(Arc::clone(&self.registry)).with_pre_start(Arc::new(
            |name: &str, config: &Section| -> anyhow::Result<()> {
                debug!("准备启动组件 {}，配置节点 {}", name, config.context());
                Ok(())
            },
        ));

        let runtime = Runtime::load(options, Arc::new(supervisor)).await?;

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        setup_signal_handlers(control_tx).await?;

        runtime.serve(control_rx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::register_builtin;
    use crate::error::{BackboneError, ComponentError};
    use std::fs;
    use tempfile::TempDir;

    fn registry() -> Arc<ManagerRegistry> {
        let registry = ManagerRegistry::new();
        register_builtin(&registry);
        Arc::new(registry)
    }

    #[test]
    fn test_show_renders_every_format() {
        let show = ShowCommand::new(registry());

        let text = show.render("all", &OutputFormat::Text).unwrap();
        assert!(text.contains("heartbeat"));
        assert!(text.contains("pidfile"));

        let json = show.render("pidfile", &OutputFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["pidfile"]["fields"][0]["key"], "path");

        let yaml = show.render("heartbeat", &OutputFormat::Yaml).unwrap();
        assert!(yaml.contains("interval"));

        assert!(matches!(
            show.render("missing", &OutputFormat::Text),
            Err(BackboneError::Component(ComponentError::UnknownKind { .. }))
        ));
    }

    #[tokio::test]
    async fn test_validate_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backbone.yaml");
        fs::write(
            &path,
            "components:\n- name: hb\n  type: heartbeat\n- name: pid\n  type: pidfile\n  disabled: true\n",
        )
        .unwrap();

        let validate = ValidateCommand::new(registry());
        let (specs, _) = validate
            .validate_document(&path, "components")
            .await
            .unwrap();
        assert_eq!(specs.len(), 2);
        assert!(specs[1].disabled);

        fs::write(&path, "components:\n- name: x\n  type: nope\n").unwrap();
        let err = validate
            .validate_document(&path, "components")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BackboneError::Component(ComponentError::UnknownType { .. })
        ));
    }

    #[test]
    fn test_version_render() {
        let json = VersionCommand::render(&OutputFormat::Json).unwrap();
        assert!(json.contains(crate::VERSION));
        let text = VersionCommand::render(&OutputFormat::Text).unwrap();
        assert!(text.starts_with(crate::APP_NAME));
    }
}
