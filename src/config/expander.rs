//! 属性展开模块
//!
//! 每个配置节点持有一份 `key -> value` 属性表，支持两种替换语法：
//! 环境变量 `${NAME}` 与模板引用 `{{.key}}`。子节点从父节点克隆属性表，
//! 再叠加本地 `properties` 块。

use crate::config::coerce::scalar_to_string;
use crate::config::loader::{
    include_sort_key, is_include_key, parent_dir, read_yaml_file, resolve_relative,
    MAX_INCLUDE_DEPTH,
};
use crate::config::template::{has_template, render_careful, render_strict};
use crate::error::ConfigError;
use regex::{Captures, Regex};
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// 每轮合并的展开遍数
const EXPANSION_PASSES: usize = 2;

/// 匹配 `${VAR_NAME}` 格式的环境变量
fn env_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").ok())
        .as_ref()
}

/// 属性表
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expander {
    props: BTreeMap<String, String>,
}

impl Expander {
    /// 创建空属性表
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取属性
    pub fn get(&self, key: &str) -> Option<&str> {
        self.props.get(key).map(String::as_str)
    }

    /// 设置属性，返回旧值
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.props.insert(key.into(), value.into())
    }

    /// 属性是否存在
    pub fn contains(&self, key: &str) -> bool {
        self.props.contains_key(key)
    }

    /// 全部属性键，按字典序
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.props.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    /// 底层映射
    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.props
    }

    /// 展开字符串
    ///
    /// 先替换环境变量（未设置则保留原文），再按属性表求值模板；
    /// 整体求值失败时逐片段求值，无法解析的片段保留原文。
    /// 不含任何标记的文本原样返回。
    pub fn expand(&self, raw: &str) -> String {
        let has_env = raw.contains("${");
        if !has_env && !has_template(raw) {
            return raw.to_string();
        }

        let text = match env_pattern().filter(|_| has_env) {
            Some(pattern) => pattern
                .replace_all(raw, |caps: &Captures| {
                    std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
                })
                .into_owned(),
            None => raw.to_string(),
        };

        if !has_template(&text) {
            return text.trim().to_string();
        }

        let rendered = match render_strict(&text, &self.props) {
            Ok(rendered) => rendered,
            Err(e) => {
                debug!("模板整体求值失败，改为逐片段求值: {}", e);
                render_careful(&text, &self.props)
            }
        };
        rendered.trim().to_string()
    }

    /// 对整张属性表执行一遍展开
    fn expand_pass(&mut self) {
        let keys: Vec<String> = self.props.keys().cloned().collect();
        for key in keys {
            if let Some(raw) = self.props.get(&key) {
                let expanded = self.expand(raw);
                self.props.insert(key, expanded);
            }
        }
    }

    fn expand_passes(&mut self) {
        for _ in 0..EXPANSION_PASSES {
            self.expand_pass();
        }
    }

    /// 合并本地属性块
    ///
    /// 插入本地键值后对整张表展开两遍；随后按键名顺序深度优先加载 include 文件，
    /// 本地定义的键不会被 include 覆盖，多个 include 之间后加载的优先；最后再展开两遍。
    ///
    /// # 参数
    /// * `local` - 本地 `properties` 映射
    /// * `base_dir` - 相对 include 路径的基准目录
    ///
    /// # 返回
    /// * `Result<Vec<PathBuf>, ConfigError>` - 加载过的 include 文件，供文件监控登记
    pub fn add_all(
        &mut self,
        local: &Mapping,
        base_dir: Option<&Path>,
    ) -> Result<Vec<PathBuf>, ConfigError> {
        let mut local_keys = BTreeSet::new();
        let mut includes = Vec::new();

        for (key, value) in local {
            let Some(key) = key.as_str() else {
                debug!("忽略非字符串属性键: {:?}", key);
                continue;
            };
            if is_include_key(key) {
                includes.push((key.to_string(), value.clone()));
                continue;
            }
            match scalar_to_string(value) {
                Some(text) => {
                    self.props.insert(key.to_string(), text);
                    local_keys.insert(key.to_string());
                }
                None if value.is_null() => {
                    self.props.insert(key.to_string(), String::new());
                    local_keys.insert(key.to_string());
                }
                None => debug!("忽略非标量属性: {}", key),
            }
        }

        self.expand_passes();

        if includes.is_empty() {
            return Ok(Vec::new());
        }

        includes.sort_by_key(|(key, _)| include_sort_key(key));

        let mut loaded = Vec::new();
        for (key, value) in &includes {
            for path in include_paths(key, value)? {
                let path = resolve_relative(&self.expand(&path), base_dir);
                let included = load_property_file(&path, 1, &mut loaded)?;
                for (k, v) in included {
                    if !local_keys.contains(&k) {
                        self.props.insert(k, v);
                    }
                }
            }
        }

        self.expand_passes();
        Ok(loaded)
    }
}

/// include 指令的取值：单个路径或路径列表
pub(crate) fn include_paths(key: &str, value: &Value) -> Result<Vec<String>, ConfigError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(path) => Ok(vec![path.clone()]),
        Value::Sequence(items) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| ConfigError::ParseError {
                    path: key.to_string(),
                    message: "include 列表元素必须是路径字符串".to_string(),
                })
            })
            .collect(),
        _ => Err(ConfigError::ParseError {
            path: key.to_string(),
            message: "include 取值必须是路径字符串".to_string(),
        }),
    }
}

/// 加载属性文件，文件自身的 include 先合并，文件本地键最后覆盖
fn load_property_file(
    path: &Path,
    depth: usize,
    loaded: &mut Vec<PathBuf>,
) -> Result<BTreeMap<String, String>, ConfigError> {
    if depth > MAX_INCLUDE_DEPTH {
        return Err(ConfigError::IncludeDepth {
            path: path.display().to_string(),
            limit: MAX_INCLUDE_DEPTH,
        });
    }

    debug!("加载属性文件: {}", path.display());
    let mapping = match read_yaml_file(path)? {
        Value::Null => Mapping::new(),
        Value::Mapping(mapping) => mapping,
        _ => {
            return Err(ConfigError::ParseError {
                path: path.display().to_string(),
                message: "属性文件必须是映射".to_string(),
            })
        }
    };
    loaded.push(path.to_path_buf());

    let base_dir = parent_dir(path);
    let mut nested: Vec<(&str, &Value)> = mapping
        .iter()
        .filter_map(|(k, v)| k.as_str().filter(|k| is_include_key(k)).map(|k| (k, v)))
        .collect();
    nested.sort_by_key(|(key, _)| include_sort_key(key));

    let mut props = BTreeMap::new();
    for (key, value) in nested {
        for nested_path in include_paths(key, value)? {
            let nested_path = resolve_relative(&nested_path, base_dir.as_deref());
            props.extend(load_property_file(&nested_path, depth + 1, loaded)?);
        }
    }

    for (key, value) in &mapping {
        let Some(key) = key.as_str() else { continue };
        if is_include_key(key) {
            continue;
        }
        if let Some(text) = scalar_to_string(value) {
            props.insert(key.to_string(), text);
        }
    }
    Ok(props)
}
