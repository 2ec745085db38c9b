//! 组件类型说明文档
//!
//! 每个 Manager 提供一份有序的字段说明，供 `show` 命令展示

use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// 单个配置字段的说明
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelpField {
    /// 字段名
    pub key: String,
    /// 类型名称
    pub kind: String,
    /// 说明
    pub note: String,
    /// 默认值
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// 是否可选
    pub optional: bool,
}

/// 组件类型说明
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HelpDoc {
    /// 类型描述
    pub description: String,
    /// 字段说明，按声明顺序
    pub fields: Vec<HelpField>,
}

impl HelpDoc {
    /// 创建说明文档
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            fields: Vec::new(),
        }
    }

    /// 追加必填字段
    pub fn required(mut self, key: &str, kind: &str, note: &str) -> Self {
        self.fields.push(HelpField {
            key: key.to_string(),
            kind: kind.to_string(),
            note: note.to_string(),
            default: None,
            optional: false,
        });
        self
    }

    /// 追加可选字段
    pub fn optional(mut self, key: &str, kind: &str, note: &str, default: Option<&str>) -> Self {
        self.fields.push(HelpField {
            key: key.to_string(),
            kind: kind.to_string(),
            note: note.to_string(),
            default: default.map(str::to_string),
            optional: true,
        });
        self
    }

    /// 渲染为对齐的文本
    ///
    /// # 参数
    /// * `kind` - 组件类型名称
    ///
    /// # 返回
    /// * `String` - 多行文本
    pub fn render_text(&self, kind: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{kind}: {}", self.description);

        if self.fields.is_empty() {
            let _ = writeln!(out, "  (无配置字段)");
            return out;
        }

        let key_width = self.fields.iter().map(|f| f.key.len()).max().unwrap_or(0);
        let kind_width = self.fields.iter().map(|f| f.kind.len()).max().unwrap_or(0);

        for field in &self.fields {
            let mut line = format!(
                "  {:<key_width$}  {:<kind_width$}  {}",
                field.key, field.kind, field.note
            );
            if field.optional {
                match &field.default {
                    Some(default) => {
                        let _ = write!(line, " (可选，默认 {default})");
                    }
                    None => line.push_str(" (可选)"),
                }
            }
            let _ = writeln!(out, "{}", line.trim_end());
        }
        out
    }
}
