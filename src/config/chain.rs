//! 链式解析
//!
//! 在一串字段读取中锁存第一个错误，之后的调用全部跳过，
//! 多字段解析可以线性书写，最后由 `finish` 统一返回结果。

use crate::config::check::{run_checks, Check};
use crate::config::coerce::Coerce;
use crate::config::section::{Array, Section};
use crate::error::ConfigError;

/// 链式解析器
#[must_use = "链式解析需要调用 finish() 获取结果"]
pub struct Parser<'a> {
    section: &'a Section,
    state: Result<(), ConfigError>,
}

impl<'a> Parser<'a> {
    /// 在节点上开始链式解析
    pub fn new(section: &'a Section) -> Self {
        Self {
            section,
            state: Ok(()),
        }
    }

    /// 尚未遇到错误时执行一步
    fn step(mut self, f: impl FnOnce(&'a Section) -> Result<(), ConfigError>) -> Self {
        if self.state.is_ok() {
            self.state = f(self.section);
        }
        self
    }

    /// 字段必须存在且通过校验
    pub fn required<T: Coerce>(self, key: &str, checks: &[&dyn Check<T>]) -> Self {
        self.step(|section| section.require::<T>(key, checks).map(|_| ()))
    }

    /// 字段可以缺失，存在时必须能转换为目标类型
    pub fn optional<T: Coerce>(self, key: &str) -> Self {
        self.step(|section| section.get::<T>(key).map(|_| ()))
    }

    /// 字段存在时写入 `target`，缺失时保留原值
    pub fn read<T: Coerce>(self, key: &str, target: &mut T, checks: &[&dyn Check<T>]) -> Self {
        self.step(|section| {
            if let Some(value) = section.get_checked(key, checks)? {
                *target = value;
            }
            Ok(())
        })
    }

    /// 必填字段写入 `target`
    pub fn read_required<T: Coerce>(
        self,
        key: &str,
        target: &mut T,
        checks: &[&dyn Check<T>],
    ) -> Self {
        self.step(|section| {
            *target = section.require(key, checks)?;
            Ok(())
        })
    }

    /// 可选字段写入 `target`
    pub fn read_optional<T: Coerce>(
        self,
        key: &str,
        target: &mut Option<T>,
        checks: &[&dyn Check<T>],
    ) -> Self {
        self.step(|section| {
            *target = section.get_checked(key, checks)?;
            Ok(())
        })
    }

    /// 子节点写入 `target`
    pub fn subsection(self, key: &str, target: &mut Section) -> Self {
        self.step(|section| {
            *target = section.get_subsection(key)?;
            Ok(())
        })
    }

    /// 列表写入 `target`
    pub fn array(self, key: &str, target: &mut Array) -> Self {
        self.step(|section| {
            *target = section.get_array(key)?;
            Ok(())
        })
    }

    /// 跨字段校验，失败时错误指向当前节点
    pub fn ensure(self, f: impl FnOnce() -> Result<(), String>) -> Self {
        self.step(|section| {
            f().map_err(|message| ConfigError::ValidationError {
                path: section.context().to_string(),
                message,
            })
        })
    }

    /// 对已读取的值执行校验器
    pub fn check<T: ?Sized>(self, key: &str, value: &T, checks: &[&dyn Check<T>]) -> Self {
        self.step(|section| {
            run_checks(value, checks).map_err(|message| ConfigError::ValidationError {
                path: section.path_of(key),
                message,
            })
        })
    }

    /// 是否尚未出错
    pub fn is_ok(&self) -> bool {
        self.state.is_ok()
    }

    /// 结束解析，返回锁存的第一个错误
    pub fn finish(self) -> Result<(), ConfigError> {
        self.state
    }
}
