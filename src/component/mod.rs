//! 组件生命周期模块
//!
//! 提供组件类型注册表、组件契约与按配置协调组件生命周期的监督器

pub mod builtin;
pub mod descriptor;
pub mod help;
pub mod manager;
pub mod registry;
pub mod supervisor;

// 重新导出主要类型
pub use builtin::register_builtin;
pub use descriptor::{ComponentSpec, ComponentState, ComponentStatus, Descriptor};
pub use help::{HelpDoc, HelpField};
pub use manager::{Component, DirectManager, Lifecycle, Manager, Prototype, PrototypeManager, Reload};
pub use registry::ManagerRegistry;
pub use supervisor::{PreStartHook, Supervisor};
