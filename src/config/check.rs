//! 字段校验器
//!
//! 任何 `Fn(&T) -> Result<(), String>` 都可以作为校验器使用

use regex::Regex;
use std::fmt::Display;
use std::time::Duration;

/// 字段校验器
pub trait Check<T: ?Sized>: Send + Sync {
    /// 校验通过返回 Ok，否则返回错误描述
    fn check(&self, value: &T) -> Result<(), String>;
}

impl<T: ?Sized, F> Check<T> for F
where
    F: Fn(&T) -> Result<(), String> + Send + Sync,
{
    fn check(&self, value: &T) -> Result<(), String> {
        self(value)
    }
}

/// 依次执行校验器，返回第一个错误
pub fn run_checks<T: ?Sized>(value: &T, checks: &[&dyn Check<T>]) -> Result<(), String> {
    checks.iter().try_for_each(|c| c.check(value))
}

/// 字符串不能为空白
#[allow(clippy::ptr_arg)]
pub fn non_empty(value: &String) -> Result<(), String> {
    if value.trim().is_empty() {
        Err("不能为空".to_string())
    } else {
        Ok(())
    }
}

/// 列表不能为空
#[allow(clippy::ptr_arg)]
pub fn non_empty_list(value: &Vec<String>) -> Result<(), String> {
    if value.is_empty() {
        Err("列表不能为空".to_string())
    } else {
        Ok(())
    }
}

/// 时长不能为0
pub fn not_zero(value: &Duration) -> Result<(), String> {
    if value.is_zero() {
        Err("时长不能为0".to_string())
    } else {
        Ok(())
    }
}

/// 取值必须在给定集合中
pub fn one_of(allowed: &'static [&'static str]) -> impl Fn(&String) -> Result<(), String> + Send + Sync {
    move |value: &String| {
        if allowed.contains(&value.as_str()) {
            Ok(())
        } else {
            Err(format!("无效的取值 {value}，支持的取值: {allowed:?}"))
        }
    }
}

/// 取值必须落在闭区间内
pub fn range<T>(min: T, max: T) -> impl Fn(&T) -> Result<(), String> + Send + Sync
where
    T: PartialOrd + Display + Send + Sync,
{
    move |value: &T| {
        if *value < min || *value > max {
            Err(format!("{value} 超出范围 [{min}, {max}]"))
        } else {
            Ok(())
        }
    }
}

/// 取值不能小于下限
pub fn at_least<T>(min: T) -> impl Fn(&T) -> Result<(), String> + Send + Sync
where
    T: PartialOrd + Display + Send + Sync,
{
    move |value: &T| {
        if *value < min {
            Err(format!("{value} 小于下限 {min}"))
        } else {
            Ok(())
        }
    }
}

/// 字符串必须匹配正则
pub fn matches(pattern: Regex) -> impl Fn(&String) -> Result<(), String> + Send + Sync {
    move |value: &String| {
        if pattern.is_match(value) {
            Ok(())
        } else {
            Err(format!("{value} 不匹配 {}", pattern.as_str()))
        }
    }
}
