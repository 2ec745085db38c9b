//! 配置解析模块
//!
//! 提供属性展开、文档节点访问、include 合并、类型转换与配置文件监控

pub mod chain;
pub mod check;
pub mod coerce;
pub mod expander;
pub mod loader;
pub mod section;
pub mod template;
pub mod watch;

// 重新导出主要类型
pub use chain::Parser;
pub use check::Check;
pub use coerce::Coerce;
pub use expander::Expander;
pub use loader::{get_default_config_path, ConfigLoader, YamlConfigLoader};
pub use section::{Array, Section};
pub use watch::{Flow, Watch, WatchHandler, WatchPhase};
