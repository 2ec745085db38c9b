//! 组件类型注册表
//!
//! 类型名称到 Manager 的映射，每个类型只能注册一次。
//! 注册表由启动流程创建并以 `Arc` 传递给 Supervisor 与 CLI 命令。

use crate::component::help::HelpDoc;
use crate::component::manager::Manager;
use crate::error::ComponentError;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// `show` 查询全部类型时使用的名称
pub const SHOW_ALL: &str = "all";

/// 组件类型注册表
#[derive(Default)]
pub struct ManagerRegistry {
    managers: RwLock<BTreeMap<String, Arc<dyn Manager>>>,
}

impl ManagerRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册组件类型
    ///
    /// # Panics
    /// 同一类型重复注册属于编程错误，直接 panic
    pub fn register(&self, kind: &str, manager: impl Manager) {
        self.register_arc(kind, Arc::new(manager));
    }

    /// 注册共享的 Manager
    ///
    /// # Panics
    /// 同一类型重复注册时 panic
    pub fn register_arc(&self, kind: &str, manager: Arc<dyn Manager>) {
        let mut managers = self.managers.write().unwrap_or_else(PoisonError::into_inner);
        if managers.contains_key(kind) {
            drop(managers);
            panic!("组件类型重复注册: {kind}");
        }
        debug!("注册组件类型: {}", kind);
        managers.insert(kind.to_string(), manager);
    }

    /// 查找组件类型
    pub fn get(&self, kind: &str) -> Option<Arc<dyn Manager>> {
        self.managers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind)
            .cloned()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.managers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(kind)
    }

    /// 已注册的类型名称，按字典序
    pub fn kinds(&self) -> Vec<String> {
        self.managers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.managers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 清空注册表，仅供测试使用
    pub fn clear(&self) {
        self.managers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// 查询类型说明
    ///
    /// # 参数
    /// * `kind` - 类型名称；`None` 或 `"all"` 表示全部类型
    ///
    /// # 返回
    /// * `Result<Vec<(String, HelpDoc)>, ComponentError>` - 按类型名称排序的说明
    pub fn show(&self, kind: Option<&str>) -> Result<Vec<(String, HelpDoc)>, ComponentError> {
        // 先取快照再调用 help，避免持锁期间执行外部代码
        let snapshot: Vec<(String, Arc<dyn Manager>)> = {
            let managers = self.managers.read().unwrap_or_else(PoisonError::into_inner);
            match kind {
                None | Some(SHOW_ALL) => managers
                    .iter()
                    .map(|(k, m)| (k.clone(), Arc::clone(m)))
                    .collect(),
                Some(kind) => {
                    let manager = managers.get(kind).ok_or_else(|| ComponentError::UnknownKind {
                        kind: kind.to_string(),
                    })?;
                    vec![(kind.to_string(), Arc::clone(manager))]
                }
            }
        };

        Ok(snapshot
            .into_iter()
            .map(|(kind, manager)| (kind, manager.help()))
            .collect())
    }
}

impl std::fmt::Debug for ManagerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
