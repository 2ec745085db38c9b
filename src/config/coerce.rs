//! 类型转换模块
//!
//! 将展开后的配置值转换为整数（支持SI后缀）、浮点、布尔、时长、路径、URL、正则等类型

use regex::Regex;
use serde_yaml::Value;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// SI 数量级后缀，按长度优先匹配
const SI_SUFFIXES: &[(&str, f64)] = &[
    ("ki", 1024.0),
    ("mi", 1024.0 * 1024.0),
    ("gi", 1024.0 * 1024.0 * 1024.0),
    ("ti", 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("pi", 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("ei", 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("k", 1e3),
    ("m", 1e6),
    ("g", 1e9),
    ("t", 1e12),
    ("p", 1e15),
    ("e", 1e18),
];

/// 可以从配置值转换而来的类型
pub trait Coerce: Sized {
    /// 类型名称，用于错误信息
    const KIND: &'static str;

    /// 从已展开的值转换
    fn coerce(value: &Value) -> Result<Self, String>;
}

/// 将标量值转为字符串
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "list",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

/// 拆分 SI 后缀，返回 (数值部分, 倍数)
fn split_si_suffix(text: &str) -> (&str, f64) {
    let lower = text.to_ascii_lowercase();
    for (suffix, factor) in SI_SUFFIXES {
        if lower.ends_with(suffix) {
            let head = &text[..text.len() - suffix.len()];
            // 十六进制数字本身可能以 e 结尾，例如 0x1e
            if head.is_empty() || is_radix_literal(head) {
                continue;
            }
            return (head, *factor);
        }
    }
    (text, 1.0)
}

fn is_radix_literal(text: &str) -> bool {
    let unsigned = text.trim_start_matches(['+', '-']);
    let lower = unsigned.to_ascii_lowercase();
    lower.starts_with("0x") || lower.starts_with("0b") || lower.starts_with("0o")
}

/// 解析带前缀的整数字面量（0x/0o/0b 以及以0开头的八进制）
fn parse_radix_int(text: &str) -> Result<i64, String> {
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let digits = digits.replace('_', "");
    let lower = digits.to_ascii_lowercase();

    let (radix, body) = if let Some(rest) = lower.strip_prefix("0x") {
        (16, rest.to_string())
    } else if let Some(rest) = lower.strip_prefix("0o") {
        (8, rest.to_string())
    } else if let Some(rest) = lower.strip_prefix("0b") {
        (2, rest.to_string())
    } else if lower.len() > 1 && lower.starts_with('0') {
        (8, lower[1..].to_string())
    } else {
        (10, lower)
    };

    if body.is_empty() {
        return Err(format!("无效的整数: {text}"));
    }

    let magnitude =
        i64::from_str_radix(&body, radix).map_err(|e| format!("无效的整数 {text}: {e}"))?;
    Ok(if negative { -magnitude } else { magnitude })
}

/// 解析整数，支持进制前缀与 SI 后缀（`1Ki` = 1024，`1.5k` = 1500）
pub fn parse_int(text: &str) -> Result<i64, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("空字符串不是整数".to_string());
    }

    let (head, factor) = split_si_suffix(text);
    if factor == 1.0 {
        return parse_radix_int(head);
    }

    let mantissa: f64 = if head.contains('.') {
        head.replace('_', "")
            .parse()
            .map_err(|e| format!("无效的数值 {text}: {e}"))?
    } else {
        parse_radix_int(head)? as f64
    };

    let scaled = mantissa * factor;
    let rounded = scaled.round();
    // 容忍浮点乘法误差，例如 2.2 * 1000
    if (scaled - rounded).abs() > 1e-9 * rounded.abs().max(1.0) {
        return Err(format!("{text} 不是整数"));
    }
    if !(i64::MIN as f64..=i64::MAX as f64).contains(&rounded) {
        return Err(format!("{text} 超出整数范围"));
    }
    Ok(rounded as i64)
}

/// 解析非负整数
pub fn parse_uint(text: &str) -> Result<u64, String> {
    let value = parse_int(text)?;
    u64::try_from(value).map_err(|_| format!("{text} 不能为负数"))
}

/// 解析浮点数，支持 SI 后缀
pub fn parse_float(text: &str) -> Result<f64, String> {
    let text = text.trim();
    let (head, factor) = split_si_suffix(text);
    let mantissa: f64 = head
        .replace('_', "")
        .parse()
        .map_err(|e| format!("无效的数值 {text}: {e}"))?;
    Ok(mantissa * factor)
}

/// 解析布尔值
pub fn parse_bool(text: &str) -> Result<bool, String> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" | "y" => Ok(true),
        "false" | "no" | "off" | "0" | "n" => Ok(false),
        other => Err(format!("无效的布尔值: {other}")),
    }
}

fn seconds_to_duration(seconds: f64) -> Result<Duration, String> {
    if seconds < 0.0 || !seconds.is_finite() {
        return Err(format!("无效的时长: {seconds}"));
    }
    Ok(Duration::from_nanos((seconds * 1e9).round() as u64))
}

/// 解析时长，例如 `1h30m`、`250ms`、`1.5s`；纯数字按秒计
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("空字符串不是时长".to_string());
    }
    if let Ok(seconds) = text.parse::<f64>() {
        return seconds_to_duration(seconds);
    }

    let mut total_nanos = 0f64;
    let mut rest = text;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(format!("无效的时长: {text}"));
        }
        let number: f64 = rest[..number_len]
            .parse()
            .map_err(|_| format!("无效的时长: {text}"))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit_nanos = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "d" => 86400e9,
            "" => return Err(format!("时长缺少单位: {text}")),
            unit => return Err(format!("未知的时长单位 {unit}: {text}")),
        };
        rest = &rest[unit_len..];
        total_nanos += number * unit_nanos;
    }

    Ok(Duration::from_nanos(total_nanos.round() as u64))
}

/// 展开 `~` 并转换为绝对路径
pub fn parse_path(text: &str) -> Result<PathBuf, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("路径不能为空".to_string());
    }

    let expanded = match text.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\') => {
            let home = dirs::home_dir().ok_or_else(|| "无法确定用户主目录".to_string())?;
            home.join(rest.trim_start_matches(['/', '\\']))
        }
        _ => PathBuf::from(text),
    };

    std::path::absolute(&expanded).map_err(|e| format!("无法解析路径 {text}: {e}"))
}

fn expect_string(value: &Value) -> Result<&str, String> {
    value
        .as_str()
        .ok_or_else(|| format!("期望字符串，实际为 {}", describe(value)))
}

impl Coerce for String {
    const KIND: &'static str = "string";

    fn coerce(value: &Value) -> Result<Self, String> {
        scalar_to_string(value).ok_or_else(|| format!("期望标量，实际为 {}", describe(value)))
    }
}

impl Coerce for i64 {
    const KIND: &'static str = "integer";

    fn coerce(value: &Value) -> Result<Self, String> {
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(i)
                } else if let Some(f) = n.as_f64().filter(|f| f.fract() == 0.0) {
                    Ok(f as i64)
                } else {
                    Err(format!("{n} 不是整数"))
                }
            }
            Value::String(s) => parse_int(s),
            other => Err(format!("期望整数，实际为 {}", describe(other))),
        }
    }
}

impl Coerce for u64 {
    const KIND: &'static str = "unsigned integer";

    fn coerce(value: &Value) -> Result<Self, String> {
        let signed = i64::coerce(value)?;
        u64::try_from(signed).map_err(|_| format!("{signed} 不能为负数"))
    }
}

impl Coerce for f64 {
    const KIND: &'static str = "float";

    fn coerce(value: &Value) -> Result<Self, String> {
        match value {
            Value::Number(n) => n.as_f64().ok_or_else(|| format!("{n} 不是浮点数")),
            Value::String(s) => parse_float(s),
            other => Err(format!("期望数值，实际为 {}", describe(other))),
        }
    }
}

impl Coerce for bool {
    const KIND: &'static str = "bool";

    fn coerce(value: &Value) -> Result<Self, String> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Number(n) => match n.as_i64() {
                Some(0) => Ok(false),
                Some(1) => Ok(true),
                _ => Err(format!("无效的布尔值: {n}")),
            },
            Value::String(s) => parse_bool(s),
            other => Err(format!("期望布尔值，实际为 {}", describe(other))),
        }
    }
}

impl Coerce for Duration {
    const KIND: &'static str = "duration";

    fn coerce(value: &Value) -> Result<Self, String> {
        match value {
            Value::Number(n) => {
                let seconds = n.as_f64().ok_or_else(|| format!("无效的时长: {n}"))?;
                seconds_to_duration(seconds)
            }
            Value::String(s) => parse_duration(s),
            other => Err(format!("期望时长，实际为 {}", describe(other))),
        }
    }
}

impl Coerce for PathBuf {
    const KIND: &'static str = "path";

    fn coerce(value: &Value) -> Result<Self, String> {
        parse_path(expect_string(value)?)
    }
}

impl Coerce for Url {
    const KIND: &'static str = "url";

    fn coerce(value: &Value) -> Result<Self, String> {
        let text = expect_string(value)?;
        Url::parse(text.trim()).map_err(|e| format!("无效的URL {text}: {e}"))
    }
}

impl Coerce for Regex {
    const KIND: &'static str = "regex";

    fn coerce(value: &Value) -> Result<Self, String> {
        let text = expect_string(value)?;
        Regex::new(text).map_err(|e| format!("无效的正则表达式: {e}"))
    }
}

impl Coerce for Vec<String> {
    const KIND: &'static str = "string list";

    fn coerce(value: &Value) -> Result<Self, String> {
        match value {
            Value::Sequence(items) => items
                .iter()
                .map(|item| {
                    scalar_to_string(item)
                        .ok_or_else(|| format!("列表元素期望标量，实际为 {}", describe(item)))
                })
                .collect(),
            Value::String(s) => Ok(s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()),
            Value::Null => Ok(Vec::new()),
            other => Err(format!("期望字符串列表，实际为 {}", describe(other))),
        }
    }
}

impl Coerce for Value {
    const KIND: &'static str = "value";

    fn coerce(value: &Value) -> Result<Self, String> {
        Ok(value.clone())
    }
}
