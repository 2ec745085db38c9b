//! 属性模板模块
//!
//! 扫描 `{{ ... }}` 片段并按属性表求值，只支持属性查找（`.key`）和字符串字面量

use std::collections::BTreeMap;
use thiserror::Error;

/// 模板求值错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    /// `{{` 没有匹配的 `}}`
    #[error("模板在偏移 {offset} 处未闭合")]
    Unterminated { offset: usize },

    /// 引用的属性不存在
    #[error("属性不存在: {key}")]
    MissingProperty { key: String },

    /// 不支持的表达式
    #[error("不支持的模板表达式: {expr}")]
    Unsupported { expr: String },
}

/// 模板片段
#[derive(Debug, Clone, PartialEq)]
enum Segment<'a> {
    /// 普通文本
    Text(&'a str),
    /// `{{ ... }}` 片段：原始文本与去掉定界符后的表达式
    Action { raw: &'a str, expr: &'a str },
    /// 从未闭合的 `{{` 开始直到结尾的文本
    Unterminated { raw: &'a str, offset: usize },
}

/// 从左到右切分模板文本
struct Scanner<'a> {
    source: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(source: &'a str) -> Self {
        Self { source, pos: 0 }
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.source.len() {
            return None;
        }

        let rest = &self.source[self.pos..];
        match rest.find("{{") {
            Some(0) => {
                let start = self.pos;
                match rest[2..].find("}}") {
                    Some(end) => {
                        let raw = &rest[..end + 4];
                        let expr = &rest[2..end + 2];
                        self.pos += end + 4;
                        Some(Segment::Action { raw, expr })
                    }
                    None => {
                        self.pos = self.source.len();
                        Some(Segment::Unterminated { raw: rest, offset: start })
                    }
                }
            }
            Some(idx) => {
                self.pos += idx;
                Some(Segment::Text(&rest[..idx]))
            }
            None => {
                self.pos = self.source.len();
                Some(Segment::Text(rest))
            }
        }
    }
}

/// 对单个表达式求值
fn evaluate(expr: &str, props: &BTreeMap<String, String>) -> Result<String, TemplateError> {
    let mut expr = expr.trim();
    // 兼容 {{- .x -}} 写法
    if let Some(stripped) = expr.strip_prefix('-') {
        expr = stripped.trim_start();
    }
    if let Some(stripped) = expr.strip_suffix('-') {
        expr = stripped.trim_end();
    }

    if let Some(key) = expr.strip_prefix('.') {
        if key.is_empty() || key.chars().any(char::is_whitespace) {
            return Err(TemplateError::Unsupported {
                expr: expr.to_string(),
            });
        }
        return props
            .get(key)
            .cloned()
            .ok_or_else(|| TemplateError::MissingProperty {
                key: key.to_string(),
            });
    }

    if expr.len() >= 2 && expr.starts_with('"') && expr.ends_with('"') {
        return Ok(expr[1..expr.len() - 1].to_string());
    }

    Err(TemplateError::Unsupported {
        expr: expr.to_string(),
    })
}

/// 整体求值，任一片段失败则整体失败
pub fn render_strict(
    template: &str,
    props: &BTreeMap<String, String>,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    for segment in Scanner::new(template) {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Action { expr, .. } => out.push_str(&evaluate(expr, props)?),
            Segment::Unterminated { offset, .. } => {
                return Err(TemplateError::Unterminated { offset })
            }
        }
    }
    Ok(out)
}

/// 逐片段求值，无法解析的片段保留原文
pub fn render_careful(template: &str, props: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    for segment in Scanner::new(template) {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Action { raw, expr } => match evaluate(expr, props) {
                Ok(value) => out.push_str(&value),
                Err(_) => out.push_str(raw),
            },
            Segment::Unterminated { raw, .. } => out.push_str(raw),
        }
    }
    out
}

/// 是否包含模板标记
pub fn has_template(text: &str) -> bool {
    text.contains("{{")
}
