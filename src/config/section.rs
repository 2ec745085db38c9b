//! 配置节点模块
//!
//! `Section` 是文档中一个映射节点的类型化视图，持有自己的属性表；
//! `Array` 是共享同一属性表的有序原始文档列表，按需生成 `Section`。

use crate::config::chain::Parser;
use crate::config::check::{run_checks, Check};
use crate::config::coerce::Coerce;
use crate::config::expander::{include_paths, Expander};
use crate::config::loader::{
    include_sort_key, is_include_key, parent_dir, parse_yaml, read_yaml_file, resolve_relative,
    MAX_INCLUDE_DEPTH,
};
use crate::config::watch::Watch;
use crate::error::ConfigError;
use regex::Regex;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// 本地属性块的键
pub const PROPERTIES_KEY: &str = "properties";

/// 文档根节点在错误信息中的名称
const ROOT_CONTEXT: &str = "document";

fn join_context(context: &str, key: &str) -> String {
    if context.is_empty() {
        key.to_string()
    } else {
        format!("{context}.{key}")
    }
}

fn context_or_root(context: &str) -> String {
    if context.is_empty() {
        ROOT_CONTEXT.to_string()
    } else {
        context.to_string()
    }
}

fn check_depth(path: &Path, depth: usize) -> Result<(), ConfigError> {
    if depth > MAX_INCLUDE_DEPTH {
        return Err(ConfigError::IncludeDepth {
            path: path.display().to_string(),
            limit: MAX_INCLUDE_DEPTH,
        });
    }
    Ok(())
}

/// 配置节点
#[derive(Debug, Clone)]
pub struct Section {
    /// 点分路径，仅用于诊断
    context: String,
    /// 属性表
    expander: Expander,
    /// 原始文档（已合并 include）
    document: Mapping,
    /// 整棵树共享的文件监控登记
    watch: Watch,
    /// 相对路径的基准目录
    base_dir: Option<PathBuf>,
}

impl Default for Section {
    fn default() -> Self {
        Self::empty()
    }
}

impl Section {
    /// 空节点
    pub fn empty() -> Self {
        Self {
            context: String::new(),
            expander: Expander::new(),
            document: Mapping::new(),
            watch: Watch::new(),
            base_dir: None,
        }
    }

    /// 从YAML文本构建根节点
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Self::from_yaml_with_watch(content, Watch::new())
    }

    /// 从YAML文本构建根节点，使用给定的文件监控登记
    pub fn from_yaml_with_watch(content: &str, watch: Watch) -> Result<Self, ConfigError> {
        let value = parse_yaml(content).map_err(|message| ConfigError::ParseError {
            path: ROOT_CONTEXT.to_string(),
            message,
        })?;
        Self::build(String::new(), &Expander::new(), &value, None, &watch, 0)
    }

    /// 从YAML文件构建根节点，文件登记到新的监控中
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_watch(path.as_ref(), Watch::new())
    }

    /// 从YAML文件构建根节点
    ///
    /// # 参数
    /// * `path` - 配置文件路径
    /// * `watch` - 文件监控登记，主文件与全部 include 文件都会登记
    ///
    /// # 返回
    /// * `Result<Section, ConfigError>` - 根节点或错误
    pub fn from_file_with_watch(path: &Path, watch: Watch) -> Result<Self, ConfigError> {
        let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let value = read_yaml_file(&path)?;
        watch.add(&path);
        let base_dir = parent_dir(&path);
        Self::build(
            String::new(),
            &Expander::new(),
            &value,
            base_dir.as_deref(),
            &watch,
            0,
        )
    }

    /// 从内存中的值构建节点
    pub fn from_value(context: impl Into<String>, value: &Value) -> Result<Self, ConfigError> {
        Self::build(context.into(), &Expander::new(), value, None, &Watch::new(), 0)
    }

    /// 构建节点
    ///
    /// 取值为 null 时得到空节点；为字符串时视为YAML文件路径；
    /// 为映射时先合并文档级 include，再叠加本地 `properties`
    pub(crate) fn build(
        context: String,
        parent: &Expander,
        value: &Value,
        base_dir: Option<&Path>,
        watch: &Watch,
        depth: usize,
    ) -> Result<Self, ConfigError> {
        let mut document = match value {
            Value::Null => Mapping::new(),
            Value::Mapping(mapping) => mapping.clone(),
            Value::String(path) => {
                let path = resolve_relative(&parent.expand(path), base_dir);
                check_depth(&path, depth + 1)?;
                debug!("从文件加载配置节点 {}: {}", context_or_root(&context), path.display());
                let loaded = read_yaml_file(&path)?;
                watch.add(&path);
                let file_dir = parent_dir(&path);
                return Self::build(context, parent, &loaded, file_dir.as_deref(), watch, depth + 1);
            }
            _ => {
                return Err(ConfigError::ParseError {
                    path: context_or_root(&context),
                    message: "配置节点必须是映射、文件路径或空值".to_string(),
                })
            }
        };

        merge_includes(&mut document, parent, base_dir, watch, depth)?;

        let mut expander = parent.clone();
        match document.get(PROPERTIES_KEY) {
            None | Some(Value::Null) => {}
            Some(Value::Mapping(local)) => {
                for path in expander.add_all(local, base_dir)? {
                    watch.add(path);
                }
            }
            Some(_) => {
                return Err(ConfigError::ParseError {
                    path: join_context(&context, PROPERTIES_KEY),
                    message: "properties 必须是映射".to_string(),
                })
            }
        }

        Ok(Self {
            context,
            expander,
            document,
            watch: watch.clone(),
            base_dir: base_dir.map(Path::to_path_buf),
        })
    }

    /// 点分路径
    pub fn context(&self) -> &str {
        &self.context
    }

    /// 属性表
    pub fn expander(&self) -> &Expander {
        &self.expander
    }

    /// 原始文档
    pub fn document(&self) -> &Mapping {
        &self.document
    }

    /// 文件监控登记
    pub fn watch(&self) -> &Watch {
        &self.watch
    }

    /// 相对路径的基准目录
    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    /// 字段的点分路径
    pub fn path_of(&self, key: &str) -> String {
        join_context(&self.context, key)
    }

    /// 键是否存在
    pub fn has(&self, key: &str) -> bool {
        self.document.contains_key(key)
    }

    /// 文档中的全部字符串键
    pub fn keys(&self) -> Vec<String> {
        self.document
            .keys()
            .filter_map(|k| k.as_str().map(str::to_string))
            .collect()
    }

    /// 未展开的原始值
    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.document.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.document.is_empty()
    }

    /// 递归展开值中的字符串
    fn resolve(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.expander.expand(s)),
            Value::Sequence(items) => {
                Value::Sequence(items.iter().map(|item| self.resolve(item)).collect())
            }
            Value::Mapping(mapping) => Value::Mapping(
                mapping
                    .iter()
                    .map(|(k, v)| (k.clone(), self.resolve(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// 展开全部字符串后的文档
    pub fn resolved_document(&self) -> Value {
        self.resolve(&Value::Mapping(self.document.clone()))
    }

    /// 与另一个节点比较展开后的文档，不同时返回 true
    pub fn diff_from(&self, other: &Section) -> bool {
        if self.document.len() != other.document.len() {
            return true;
        }
        self.resolved_document() != other.resolved_document()
    }

    /// 读取字段：查找原始值，展开字符串，再转换为目标类型
    ///
    /// # 参数
    /// * `key` - 字段名
    ///
    /// # 返回
    /// * `Result<Option<T>, ConfigError>` - 字段缺失或为 null 时返回 None
    pub fn get<T: Coerce>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        let raw = match self.document.get(key) {
            None | Some(Value::Null) => return Ok(None),
            Some(raw) => raw,
        };

        T::coerce(&self.resolve(raw))
            .map(Some)
            .map_err(|message| ConfigError::Coercion {
                path: self.path_of(key),
                kind: T::KIND,
                message,
            })
    }

    /// 读取字段并执行校验器
    pub fn get_checked<T: Coerce>(
        &self,
        key: &str,
        checks: &[&dyn Check<T>],
    ) -> Result<Option<T>, ConfigError> {
        let value = self.get::<T>(key)?;
        if let Some(value) = &value {
            run_checks(value, checks).map_err(|message| ConfigError::ValidationError {
                path: self.path_of(key),
                message,
            })?;
        }
        Ok(value)
    }

    /// 读取必填字段
    pub fn require<T: Coerce>(&self, key: &str, checks: &[&dyn Check<T>]) -> Result<T, ConfigError> {
        self.get_checked(key, checks)?
            .ok_or_else(|| ConfigError::MissingField {
                path: self.path_of(key),
            })
    }

    /// 读取字段，缺失时使用默认值
    pub fn get_or<T: Coerce>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    pub fn get_string(&self, key: &str) -> Result<Option<String>, ConfigError> {
        self.get(key)
    }

    /// 整数，支持SI后缀与进制前缀
    pub fn get_int(&self, key: &str) -> Result<Option<i64>, ConfigError> {
        self.get(key)
    }

    pub fn get_uint(&self, key: &str) -> Result<Option<u64>, ConfigError> {
        self.get(key)
    }

    pub fn get_float(&self, key: &str) -> Result<Option<f64>, ConfigError> {
        self.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        self.get(key)
    }

    pub fn get_duration(&self, key: &str) -> Result<Option<Duration>, ConfigError> {
        self.get(key)
    }

    /// 字符串列表，单个字符串按逗号拆分
    pub fn get_string_list(&self, key: &str) -> Result<Vec<String>, ConfigError> {
        Ok(self.get(key)?.unwrap_or_default())
    }

    /// 路径，展开 `~` 并转为绝对路径
    pub fn get_path(&self, key: &str) -> Result<Option<PathBuf>, ConfigError> {
        self.get(key)
    }

    pub fn get_url(&self, key: &str) -> Result<Option<Url>, ConfigError> {
        self.get(key)
    }

    pub fn get_regex(&self, key: &str) -> Result<Option<Regex>, ConfigError> {
        self.get(key)
    }

    /// 子节点：克隆属性表，合并本地 `properties` 与 include，缺失时得到空节点
    pub fn get_subsection(&self, key: &str) -> Result<Section, ConfigError> {
        let raw = self.document.get(key).cloned().unwrap_or(Value::Null);
        Self::build(
            self.path_of(key),
            &self.expander,
            &raw,
            self.base_dir.as_deref(),
            &self.watch,
            0,
        )
    }

    /// 列表节点，缺失时得到空列表
    pub fn get_array(&self, key: &str) -> Result<Array, ConfigError> {
        let raw = self.document.get(key).cloned().unwrap_or(Value::Null);
        Array::build(
            self.path_of(key),
            &self.expander,
            &raw,
            self.base_dir.as_deref(),
            &self.watch,
        )
    }

    /// 开始链式解析
    pub fn parser(&self) -> Parser<'_> {
        Parser::new(self)
    }
}

/// 合并文档级 include，本地已有的键保留，多个 include 之间后加载的优先
fn merge_includes(
    document: &mut Mapping,
    expander: &Expander,
    base_dir: Option<&Path>,
    watch: &Watch,
    depth: usize,
) -> Result<(), ConfigError> {
    let mut includes: Vec<(String, Value)> = document
        .iter()
        .filter_map(|(k, v)| {
            k.as_str()
                .filter(|k| is_include_key(k))
                .map(|k| (k.to_string(), v.clone()))
        })
        .collect();
    if includes.is_empty() {
        return Ok(());
    }
    includes.sort_by_key(|(key, _)| include_sort_key(key));

    for (key, _) in &includes {
        document.remove(key.as_str());
    }
    let local_keys: Vec<Value> = document.keys().cloned().collect();
    let local_properties: Vec<Value> = match document.get(PROPERTIES_KEY) {
        Some(Value::Mapping(properties)) => properties.keys().cloned().collect(),
        _ => Vec::new(),
    };

    for (key, value) in &includes {
        for path in include_paths(key, value)? {
            let path = resolve_relative(&expander.expand(&path), base_dir);
            check_depth(&path, depth + 1)?;

            let mut included = match read_yaml_file(&path)? {
                Value::Null => Mapping::new(),
                Value::Mapping(mapping) => mapping,
                _ => {
                    return Err(ConfigError::ParseError {
                        path: path.display().to_string(),
                        message: "被 include 的文档必须是映射".to_string(),
                    })
                }
            };
            watch.add(&path);
            debug!("合并 include 文档: {}", path.display());

            let file_dir = parent_dir(&path);
            merge_includes(&mut included, expander, file_dir.as_deref(), watch, depth + 1)?;

            for (k, v) in included {
                if k.as_str() == Some(PROPERTIES_KEY) {
                    merge_properties(document, v, &local_properties);
                } else if !local_keys.contains(&k) {
                    document.insert(k, v);
                }
            }
        }
    }
    Ok(())
}

/// 合并被 include 文档的属性块，本地属性优先，多个 include 之间后加载的优先
fn merge_properties(document: &mut Mapping, included: Value, local: &[Value]) {
    let Value::Mapping(included) = included else {
        return;
    };
    match document.get_mut(PROPERTIES_KEY) {
        Some(Value::Mapping(properties)) => {
            for (k, v) in included {
                if !local.contains(&k) {
                    properties.insert(k, v);
                }
            }
        }
        Some(Value::Null) | None => {
            document.insert(Value::String(PROPERTIES_KEY.to_string()), Value::Mapping(included));
        }
        Some(_) => debug!("本地 properties 不是映射，忽略被 include 的属性块"),
    }
}

/// 配置列表
///
/// 每个元素记录自己的基准目录，以便被 include 拼接进来的元素按所在文件解析相对路径
#[derive(Debug, Clone, Default)]
pub struct Array {
    context: String,
    expander: Expander,
    items: Vec<(Value, Option<PathBuf>)>,
    watch: Watch,
}

impl Array {
    /// 构建列表，单独的 `{include_: path}` 元素替换为文件中的列表元素
    pub(crate) fn build(
        context: String,
        expander: &Expander,
        value: &Value,
        base_dir: Option<&Path>,
        watch: &Watch,
    ) -> Result<Self, ConfigError> {
        let mut items = Vec::new();
        match value {
            Value::Null => {}
            Value::Sequence(entries) => {
                splice(&context, expander, entries, base_dir, watch, 0, &mut items)?
            }
            Value::String(path) => {
                let path = resolve_relative(&expander.expand(path), base_dir);
                splice_file(&context, expander, &path, watch, 1, &mut items)?;
            }
            _ => {
                return Err(ConfigError::ParseError {
                    path: context_or_root(&context),
                    message: "期望列表".to_string(),
                })
            }
        }

        Ok(Self {
            context,
            expander: expander.clone(),
            items,
            watch: watch.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 点分路径
    pub fn context(&self) -> &str {
        &self.context
    }

    /// 第 `index` 个元素的原始值
    pub fn raw(&self, index: usize) -> Option<&Value> {
        self.items.get(index).map(|(value, _)| value)
    }

    /// 生成第 `index` 个元素的节点
    pub fn get(&self, index: usize) -> Result<Section, ConfigError> {
        let context = join_context(&self.context, &index.to_string());
        let (value, base_dir) = self
            .items
            .get(index)
            .ok_or_else(|| ConfigError::MissingField {
                path: context.clone(),
            })?;
        Section::build(
            context,
            &self.expander,
            value,
            base_dir.as_deref(),
            &self.watch,
            0,
        )
    }

    /// 依次生成全部元素的节点
    pub fn iter(&self) -> impl Iterator<Item = Result<Section, ConfigError>> + '_ {
        (0..self.items.len()).map(move |index| self.get(index))
    }

    /// 生成全部节点，遇到第一个错误即返回
    pub fn sections(&self) -> Result<Vec<Section>, ConfigError> {
        self.iter().collect()
    }
}

/// 元素是否为单独的 include 指令
fn lone_include(entry: &Value) -> Option<(&str, &Value)> {
    let mapping = entry.as_mapping()?;
    if mapping.len() != 1 {
        return None;
    }
    let (key, value) = mapping.iter().next()?;
    key.as_str().filter(|k| is_include_key(k)).map(|k| (k, value))
}

fn splice(
    context: &str,
    expander: &Expander,
    entries: &[Value],
    base_dir: Option<&Path>,
    watch: &Watch,
    depth: usize,
    out: &mut Vec<(Value, Option<PathBuf>)>,
) -> Result<(), ConfigError> {
    for entry in entries {
        match lone_include(entry) {
            Some((key, value)) => {
                for path in include_paths(key, value)? {
                    let path = resolve_relative(&expander.expand(&path), base_dir);
                    splice_file(context, expander, &path, watch, depth + 1, out)?;
                }
            }
            None => out.push((entry.clone(), base_dir.map(Path::to_path_buf))),
        }
    }
    Ok(())
}

fn splice_file(
    context: &str,
    expander: &Expander,
    path: &Path,
    watch: &Watch,
    depth: usize,
    out: &mut Vec<(Value, Option<PathBuf>)>,
) -> Result<(), ConfigError> {
    check_depth(path, depth)?;
    let loaded = read_yaml_file(path)?;
    watch.add(path);
    debug!("拼接 include 列表 {}: {}", context_or_root(context), path.display());

    let file_dir = parent_dir(path);
    match &loaded {
        Value::Null => Ok(()),
        Value::Sequence(entries) => {
            splice(context, expander, entries, file_dir.as_deref(), watch, depth, out)
        }
        Value::Mapping(_) => splice(
            context,
            expander,
            std::slice::from_ref(&loaded),
            file_dir.as_deref(),
            watch,
            depth,
            out,
        ),
        _ => Err(ConfigError::ParseError {
            path: path.display().to_string(),
            message: "被 include 的列表必须是序列或映射".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const DOC: &str = r#"
properties:
  host: db.local
  port: 5432
  pool: 1Ki
name: main
dsn: "postgres://{{.host}}:{{.port}}/app"
pool: "{{.pool}}"
timeout: 1m30s
tags: a, b ,c
ratio: "2.5k"
enabled: "yes"
database:
  properties:
    port: 6543
  dsn: "{{.host}}:{{.port}}"
  user: "{{.user}}"
"#;

    #[test]
    fn test_typed_getters() {
        let root = Section::from_yaml(DOC).unwrap();
        assert_eq!(
            root.get_string("dsn").unwrap().as_deref(),
            Some("postgres://db.local:5432/app")
        );
        assert_eq!(root.get_int("pool").unwrap(), Some(1024));
        assert_eq!(root.get_duration("timeout").unwrap(), Some(Duration::from_secs(90)));
        assert_eq!(root.get_string_list("tags").unwrap(), vec!["a", "b", "c"]);
        assert_eq!(root.get_float("ratio").unwrap(), Some(2500.0));
        assert_eq!(root.get_bool("enabled").unwrap(), Some(true));
        assert_eq!(root.get_int("missing").unwrap(), None);
        assert_eq!(root.get_or("missing", 7i64).unwrap(), 7);
    }

    #[test]
    fn test_subsection_inherits_and_shadows() {
        let root = Section::from_yaml(DOC).unwrap();
        let database = root.get_subsection("database").unwrap();

        assert_eq!(database.context(), "database");
        for key in root.expander().keys() {
            assert!(database.expander().contains(key), "缺少继承属性 {key}");
        }
        assert_eq!(database.expander().get("port"), Some("6543"));
        assert_eq!(root.expander().get("port"), Some("5432"));
        assert_eq!(
            database.get_string("dsn").unwrap().as_deref(),
            Some("db.local:6543")
        );
        assert_eq!(
            database.get_string("user").unwrap().as_deref(),
            Some("{{.user}}")
        );
    }

    #[test]
    fn test_errors_carry_dotted_path() {
        let root = Section::from_yaml("server:\n  port: eighty\n").unwrap();
        let server = root.get_subsection("server").unwrap();
        let err = server.get_int("port").unwrap_err();
        assert_eq!(err.path(), "server.port");

        let err = server.require::<String>("host", &[]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingField {
                path: "server.host".to_string()
            }
        );
    }

    #[test]
    fn test_checked_getter() {
        let root = Section::from_yaml("level: trace\n").unwrap();
        let err = root
            .get_checked::<String>("level", &[&crate::config::check::one_of(&["info", "debug"])])
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn test_diff_from() {
        let a = Section::from_yaml("x: 1\ny: [a, b]\n").unwrap();
        let b = Section::from_yaml("y: [a, b]\nx: 1\n").unwrap();
        let c = Section::from_yaml("x: 2\ny: [a, b]\n").unwrap();
        let d = Section::from_yaml("x: 1\n").unwrap();
        assert!(!a.diff_from(&b));
        assert!(a.diff_from(&c));
        assert!(a.diff_from(&d));
    }

    #[test]
    fn test_diff_from_sees_property_changes() {
        let a = Section::from_yaml("properties: {p: 1}\nitem:\n  v: \"{{.p}}\"\n").unwrap();
        let b = Section::from_yaml("properties: {p: 2}\nitem:\n  v: \"{{.p}}\"\n").unwrap();
        let item_a = a.get_subsection("item").unwrap();
        let item_b = b.get_subsection("item").unwrap();
        assert!(item_a.diff_from(&item_b));
    }

    #[test]
    fn test_array_splices_lone_includes() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("more.yaml"),
            "- name: b\n- include_: nested.yaml\n",
        )
        .unwrap();
        fs::write(dir.path().join("nested.yaml"), "- name: c\n- name: d\n").unwrap();
        fs::write(dir.path().join("extra.yaml"), "type: merged\nname: ignored\n").unwrap();
        let main = dir.path().join("main.yaml");
        fs::write(
            &main,
            "items:\n- name: a\n- include_: more.yaml\n- name: e\n  include_: extra.yaml\n",
        )
        .unwrap();

        let root = Section::from_file(&main).unwrap();
        let items = root.get_array("items").unwrap();
        let names: Vec<String> = items
            .iter()
            .map(|s| s.unwrap().get_string("name").unwrap().unwrap())
            .collect();
        assert_eq!(names, vec!["a", "b", "c", "d", "e"]);

        let merged = items.get(4).unwrap();
        assert_eq!(merged.context(), "items.4");
        assert_eq!(merged.get_string("type").unwrap().as_deref(), Some("merged"));
        assert!(!merged.has("include_"));
        assert_eq!(root.watch().files().len(), 4);
    }

    #[test]
    fn test_string_section_is_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("db.yaml"), "port: 99\n").unwrap();
        let main = dir.path().join("main.yaml");
        fs::write(&main, "database: db.yaml\n").unwrap();

        let root = Section::from_file(&main).unwrap();
        let db = root.get_subsection("database").unwrap();
        assert_eq!(db.get_int("port").unwrap(), Some(99));
        assert_eq!(root.watch().files().len(), 2);
    }

    #[test]
    fn test_document_include_path_is_expanded() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("db.yaml"), "port: 99
name: shared
").unwrap();
        let doc = format!(
            "properties:\n  dir: {}\ndatabase:\n  include_: \"{{{{.dir}}}}/db.yaml\"\n  name: local\n",
            dir.path().display()
        );

        let root = Section::from_yaml(&doc).unwrap();
        let database = root.get_subsection("database").unwrap();
        assert_eq!(database.get_int("port").unwrap(), Some(99));
        assert_eq!(database.get_string("name").unwrap().as_deref(), Some("local"));
        assert_eq!(root.watch().files().len(), 1);
    }

    #[test]
    fn test_included_properties_merge_with_local() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("shared.yaml"),
            "properties:\n  color: blue\n  size: large\nother: 1\n",
        )
        .unwrap();
        fs::write(dir.path().join("late.yaml"), "properties:\n  size: huge\n").unwrap();
        let main = dir.path().join("main.yaml");
        fs::write(
            &main,
            "include_: shared.yaml\ninclude_1: late.yaml\nproperties:\n  color: red\nvalue: \"{{.color}}-{{.size}}\"\n",
        )
        .unwrap();

        let root = Section::from_file(&main).unwrap();
        assert_eq!(root.get_string("value").unwrap().as_deref(), Some("red-huge"));
        assert_eq!(root.get_int("other").unwrap(), Some(1));
    }

    #[test]
    fn test_self_including_document_hits_depth_limit() {
        let dir = TempDir::new().unwrap();
        let main = dir.path().join("loop.yaml");
        fs::write(&main, "include_: loop.yaml\nx: 1\n").unwrap();
        let err = Section::from_file(&main).unwrap_err();
        assert!(matches!(err, ConfigError::IncludeDepth { .. }));
    }

    #[test]
    fn test_invalid_root() {
        assert!(Section::from_yaml("- a\n- b\n").is_err());
        assert!(Section::from_yaml("").unwrap().is_empty());
    }
}
