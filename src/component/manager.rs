//! 组件生命周期契约
//!
//! 每种组件类型注册一个 `Manager`。组件实现有两种形态：
//! - 原型形态：零值实例的 `reload` 返回 `Reload::InPlace`（原地生效）或 `Reload::Replace`（换新实例）
//! - 直接形态：按名称提供 create/start/stop/reload 四个入口
//!
//! 两种形态都通过适配器统一为 `Manager` + `Component`。

use crate::component::help::HelpDoc;
use crate::config::Section;
use anyhow::Result;
use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;

/// reload 的结果
pub enum Reload {
    /// 新配置已原地生效，无需重启
    InPlace,
    /// 需要用新实例替换：旧实例停止，新实例启动
    Replace(Arc<dyn Component>),
}

impl std::fmt::Debug for Reload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reload::InPlace => f.write_str("InPlace"),
            Reload::Replace(_) => f.write_str("Replace(..)"),
        }
    }
}

/// 运行中的组件实例
#[async_trait]
pub trait Component: Send + Sync + 'static {
    /// 启动组件
    ///
    /// # 参数
    /// * `name` - 组件名称
    async fn start(&self, name: &str) -> Result<()>;

    /// 停止组件
    ///
    /// # 参数
    /// * `name` - 组件名称
    async fn stop(&self, name: &str) -> Result<()>;

    /// 应用新配置
    ///
    /// # 参数
    /// * `name` - 组件名称
    /// * `config` - 新的 `config` 节点
    ///
    /// # 返回
    /// * `Result<Reload>` - 原地生效或替换实例
    async fn reload(&self, name: &str, config: &Section) -> Result<Reload>;
}

/// 组件类型的工厂
#[async_trait]
pub trait Manager: Send + Sync + 'static {
    /// 按配置创建组件实例（尚未启动）
    ///
    /// # 参数
    /// * `name` - 组件名称
    /// * `config` - 组件的 `config` 节点
    ///
    /// # 返回
    /// * `Result<Arc<dyn Component>>` - 组件实例
    async fn create(&self, name: &str, config: &Section) -> Result<Arc<dyn Component>>;

    /// 组件类型的字段说明
    fn help(&self) -> HelpDoc;
}

/// 原型形态的组件：零值实例的 reload 即创建
pub trait Prototype: Component + Default {
    /// 字段说明
    fn help() -> HelpDoc;
}

/// 原型形态适配器
pub struct PrototypeManager<C> {
    _marker: PhantomData<fn() -> C>,
}

impl<C: Prototype> PrototypeManager<C> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<C: Prototype> Default for PrototypeManager<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<C: Prototype> Manager for PrototypeManager<C> {
    async fn create(&self, name: &str, config: &Section) -> Result<Arc<dyn Component>> {
        let prototype = Arc::new(C::default());
        match prototype.reload(name, config).await? {
            Reload::InPlace => Ok(prototype),
            Reload::Replace(instance) => Ok(instance),
        }
    }

    fn help(&self) -> HelpDoc {
        C::help()
    }
}

/// 直接形态的组件类型：由类型自身按名称管理实例
#[async_trait]
pub trait Lifecycle: Send + Sync + 'static {
    async fn create(&self, name: &str, config: &Section) -> Result<()>;

    async fn start(&self, name: &str) -> Result<()>;

    async fn stop(&self, name: &str) -> Result<()>;

    /// 直接形态的 reload 总是原地生效
    async fn reload(&self, name: &str, config: &Section) -> Result<()>;

    fn help(&self) -> HelpDoc;
}

/// 直接形态适配器
pub struct DirectManager<L> {
    lifecycle: Arc<L>,
}

impl<L: Lifecycle> DirectManager<L> {
    pub fn new(lifecycle: L) -> Self {
        Self {
            lifecycle: Arc::new(lifecycle),
        }
    }

    /// 共享的类型实例
    pub fn lifecycle(&self) -> &Arc<L> {
        &self.lifecycle
    }
}

/// 直接形态下的组件句柄，调用转发到类型实例
struct DirectHandle<L> {
    lifecycle: Arc<L>,
}

#[async_trait]
impl<L: Lifecycle> Component for DirectHandle<L> {
    async fn start(&self, name: &str) -> Result<()> {
        self.lifecycle.start(name).await
    }

    async fn stop(&self, name: &str) -> Result<()> {
        self.lifecycle.stop(name).await
    }

    async fn reload(&self, name: &str, config: &Section) -> Result<Reload> {
        self.lifecycle.reload(name, config).await?;
        Ok(Reload::InPlace)
    }
}

#[async_trait]
impl<L: Lifecycle> Manager for DirectManager<L> {
    async fn create(&self, name: &str, config: &Section) -> Result<Arc<dyn Component>> {
        self.lifecycle.create(name, config).await?;
        Ok(Arc::new(DirectHandle {
            lifecycle: Arc::clone(&self.lifecycle),
        }))
    }

    fn help(&self) -> HelpDoc {
        self.lifecycle.help()
    }
}
