//! 配置加载器实现
//!
//! 提供YAML配置文件读取、include 键识别以及文档级加载接口

use crate::config::section::Section;
use crate::config::watch::Watch;
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use serde_yaml::Value;
use std::path::{Path, PathBuf};

/// include 指令键前缀
pub const INCLUDE_KEY: &str = "include_";

/// include 最大嵌套层数
pub const MAX_INCLUDE_DEPTH: usize = 16;

/// 判断键是否为 include 指令（`include_` 或 `include_1`、`include_2` ...）
pub fn is_include_key(key: &str) -> bool {
    match key.strip_prefix(INCLUDE_KEY) {
        Some(suffix) => suffix.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

/// include 键的排序键，数字后缀按数值排序，保证结果与映射遍历顺序无关
pub fn include_sort_key(key: &str) -> (usize, String) {
    let suffix = key.strip_prefix(INCLUDE_KEY).unwrap_or(key);
    (suffix.len(), suffix.to_string())
}

/// 相对路径以所在文件目录为基准
pub fn resolve_relative(path: &str, base_dir: Option<&Path>) -> PathBuf {
    let candidate = PathBuf::from(path.trim());
    if candidate.is_absolute() {
        return candidate;
    }
    match base_dir {
        Some(dir) => dir.join(candidate),
        None => std::path::absolute(&candidate).unwrap_or(candidate),
    }
}

/// 读取并解析YAML文件
pub fn read_yaml_file(path: &Path) -> std::result::Result<Value, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileError {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    parse_yaml(&content).map_err(|message| ConfigError::FileError {
        path: path.display().to_string(),
        message,
    })
}

/// 解析YAML文本，空文档视为 null
pub fn parse_yaml(content: &str) -> std::result::Result<Value, String> {
    if content.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_yaml::from_str(content).map_err(|e| format!("YAML解析失败: {e}"))
}

/// 文件所在目录
pub fn parent_dir(path: &Path) -> Option<PathBuf> {
    let absolute = std::path::absolute(path).ok()?;
    absolute.parent().map(Path::to_path_buf)
}

/// 配置加载器trait，定义文档加载接口
#[async_trait]
pub trait ConfigLoader: Send + Sync {
    /// 从文件加载文档
    ///
    /// # 参数
    /// * `path` - 配置文件路径
    ///
    /// # 返回
    /// * `Result<Section>` - 解析后的根节点或错误
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Section>;

    /// 从字符串加载文档
    ///
    /// # 参数
    /// * `content` - YAML内容
    ///
    /// # 返回
    /// * `Result<Section>` - 解析后的根节点或错误
    async fn load_from_string(&self, content: &str) -> Result<Section>;

    /// 验证文档
    ///
    /// # 参数
    /// * `root` - 要验证的根节点
    ///
    /// # 返回
    /// * `Result<()>` - 验证结果
    fn validate(&self, root: &Section) -> Result<()>;
}

/// YAML文档加载器
#[derive(Debug, Clone)]
pub struct YamlConfigLoader {
    /// 组件列表所在的键
    components_key: String,
    /// 文件监控登记，重复加载时沿用以便追踪新的 include 文件
    watch: Watch,
}

impl YamlConfigLoader {
    /// 创建新的YAML加载器
    ///
    /// # 参数
    /// * `components_key` - 组件列表所在的键
    pub fn new(components_key: impl Into<String>) -> Self {
        Self {
            components_key: components_key.into(),
            watch: Watch::new(),
        }
    }

    /// 使用已有的文件监控登记
    pub fn with_watch(mut self, watch: Watch) -> Self {
        self.watch = watch;
        self
    }

    /// 组件列表键
    pub fn components_key(&self) -> &str {
        &self.components_key
    }

    /// 文件监控登记
    pub fn watch(&self) -> &Watch {
        &self.watch
    }
}

impl Default for YamlConfigLoader {
    fn default() -> Self {
        Self::new("components")
    }
}

#[async_trait]
impl ConfigLoader for YamlConfigLoader {
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Section> {
        let path = path.as_ref().to_path_buf();
        let source = path.clone();
        let watch = self.watch.clone();

        // include 解析为同步IO，放到阻塞线程池
        let root = tokio::task::spawn_blocking(move || Section::from_file_with_watch(&source, watch))
            .await
            .map_err(|e| anyhow::anyhow!("加载任务异常退出: {e}"))??;

        self.validate(&root)?;

        tracing::info!("成功加载配置文件: {}", path.display());
        Ok(root)
    }

    async fn load_from_string(&self, content: &str) -> Result<Section> {
        let root = Section::from_yaml_with_watch(content, self.watch.clone())?;
        self.validate(&root)?;

        tracing::debug!("成功解析配置字符串");
        Ok(root)
    }

    fn validate(&self, root: &Section) -> Result<()> {
        let components = root.get_array(&self.components_key)?;
        for index in 0..components.len() {
            let entry = components.get(index)?;
            entry
                .parser()
                .required::<String>("name", &[&crate::config::check::non_empty])
                .required::<String>("type", &[&crate::config::check::non_empty])
                .optional::<bool>("disabled")
                .optional::<Vec<String>>("hosts")
                .finish()?;
        }
        Ok(())
    }
}

/// 获取默认配置文件路径
pub fn get_default_config_path() -> PathBuf {
    if Path::new("backbone.yaml").exists() {
        PathBuf::from("backbone.yaml")
    } else {
        dirs::config_dir()
            .map(|config_dir| config_dir.join("service-backbone").join("backbone.yaml"))
            .unwrap_or_else(|| PathBuf::from("backbone.yaml"))
    }
}
