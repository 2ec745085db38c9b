//! 内置组件类型
//!
//! - `heartbeat`：原型形态，按固定间隔输出心跳日志
//! - `pidfile`：直接形态，启动时写入进程号文件，停止时删除

use crate::component::help::HelpDoc;
use crate::component::manager::{
    Component, DirectManager, Lifecycle, Prototype, PrototypeManager, Reload,
};
use crate::component::registry::ManagerRegistry;
use crate::config::check::not_zero;
use crate::config::Section;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// 心跳组件类型名称
pub const HEARTBEAT: &str = "heartbeat";

/// 进程号文件组件类型名称
pub const PIDFILE: &str = "pidfile";

const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_HEARTBEAT_MESSAGE: &str = "alive";

/// 注册全部内置组件类型
pub fn register_builtin(registry: &ManagerRegistry) {
    registry.register(HEARTBEAT, PrototypeManager::<Heartbeat>::new());
    registry.register(PIDFILE, DirectManager::new(PidFiles::default()));
}

/// 心跳组件
///
/// 修改 `message` 原地生效，修改 `interval` 需要替换实例
#[derive(Default)]
pub struct Heartbeat {
    /// 零值表示尚未配置的原型
    interval: Duration,
    message: Arc<RwLock<String>>,
    beats: Arc<AtomicU64>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Heartbeat {
    fn configured(interval: Duration, message: String) -> Self {
        Self {
            interval,
            message: Arc::new(RwLock::new(message)),
            beats: Arc::new(AtomicU64::new(0)),
            task: Mutex::new(None),
        }
    }

    /// 心跳间隔
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 当前心跳消息
    pub fn message(&self) -> String {
        self.message
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 已输出的心跳次数
    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Component for Heartbeat {
    async fn start(&self, name: &str) -> Result<()> {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            return Ok(());
        }

        let name = name.to_string();
        let interval = self.interval;
        let message = Arc::clone(&self.message);
        let beats = Arc::clone(&self.beats);

        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let text = message
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                beats.fetch_add(1, Ordering::Relaxed);
                info!(component = %name, "{}", text);
            }
        }));
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<()> {
        if let Some(task) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
            debug!("心跳组件 {} 已停止", name);
        }
        Ok(())
    }

    async fn reload(&self, name: &str, config: &Section) -> Result<Reload> {
        let mut interval = DEFAULT_HEARTBEAT_INTERVAL;
        let mut message = DEFAULT_HEARTBEAT_MESSAGE.to_string();
        config
            .parser()
            .read("interval", &mut interval, &[&not_zero])
            .read("message", &mut message, &[])
            .finish()?;

        if !self.interval.is_zero() && self.interval == interval {
            debug!("心跳组件 {} 原地更新消息", name);
            *self.message.write().unwrap_or_else(PoisonError::into_inner) = message;
            return Ok(Reload::InPlace);
        }

        Ok(Reload::Replace(Arc::new(Heartbeat::configured(
            interval, message,
        ))))
    }
}

impl Prototype for Heartbeat {
    fn help() -> HelpDoc {
        HelpDoc::new("按固定间隔输出心跳日志")
            .optional("interval", "duration", "心跳间隔，修改后替换实例", Some("10s"))
            .optional("message", "string", "心跳消息，修改后原地生效", Some("alive"))
    }
}

#[derive(Debug, Clone)]
struct PidFile {
    path: PathBuf,
    written: bool,
}

/// 进程号文件组件类型
#[derive(Debug, Default)]
pub struct PidFiles {
    files: Mutex<HashMap<String, PidFile>>,
}

impl PidFiles {
    fn read_path(config: &Section) -> Result<PathBuf> {
        Ok(config.require::<PathBuf>("path", &[])?)
    }

    /// 组件对应的文件路径
    pub fn path_of(&self, name: &str) -> Option<PathBuf> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|f| f.path.clone())
    }
}

async fn write_pid(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("创建目录失败: {}", parent.display()))?;
    }
    tokio::fs::write(path, format!("{}\n", std::process::id()))
        .await
        .with_context(|| format!("写入进程号文件失败: {}", path.display()))
}

async fn remove_pid(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("删除进程号文件失败: {}", path.display())),
    }
}

#[async_trait]
impl Lifecycle for PidFiles {
    async fn create(&self, name: &str, config: &Section) -> Result<()> {
        let path = Self::read_path(config)?;
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), PidFile { path, written: false });
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<()> {
        let path = self
            .path_of(name)
            .with_context(|| format!("组件 {name} 尚未创建"))?;
        write_pid(&path).await?;

        if let Some(file) = self
            .files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(name)
        {
            file.written = true;
        }
        info!("进程号文件已写入: {}", path.display());
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<()> {
        let removed = self
            .files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        if let Some(PidFile { path, written: true }) = removed {
            remove_pid(&path).await?;
            info!("进程号文件已删除: {}", path.display());
        }
        Ok(())
    }

    async fn reload(&self, name: &str, config: &Section) -> Result<()> {
        let path = Self::read_path(config)?;
        let previous = self
            .files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();

        match previous {
            Some(old) if old.written && old.path != path => {
                write_pid(&path).await?;
                remove_pid(&old.path).await?;
                info!("进程号文件迁移: {} -> {}", old.path.display(), path.display());
                self.files
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(name.to_string(), PidFile { path, written: true });
            }
            Some(old) => {
                self.files
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(
                        name.to_string(),
                        PidFile {
                            path,
                            written: old.written,
                        },
                    );
            }
            None => {
                self.files
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(name.to_string(), PidFile { path, written: false });
            }
        }
        Ok(())
    }

    fn help(&self) -> HelpDoc {
        HelpDoc::new("启动时写入进程号文件，停止时删除").required("path", "path", "进程号文件路径")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::manager::Manager;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_heartbeat_reload_semantics() {
        let manager = PrototypeManager::<Heartbeat>::new();
        let config = Section::from_yaml("interval: 20ms\nmessage: one\n").unwrap();
        let instance = manager.create("hb", &config).await.unwrap();

        let same_interval = Section::from_yaml("interval: 20ms\nmessage: two\n").unwrap();
        assert!(matches!(
            instance.reload("hb", &same_interval).await.unwrap(),
            Reload::InPlace
        ));

        let new_interval = Section::from_yaml("interval: 1s\n").unwrap();
        assert!(matches!(
            instance.reload("hb", &new_interval).await.unwrap(),
            Reload::Replace(_)
        ));

        let err = instance
            .reload("hb", &Section::from_yaml("interval: 0s\n").unwrap())
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("interval"));
    }

    #[tokio::test]
    async fn test_heartbeat_beats_until_stopped() {
        let heartbeat = Heartbeat::configured(Duration::from_millis(10), "tick".to_string());
        heartbeat.start("hb").await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        heartbeat.stop("hb").await.unwrap();

        let beats = heartbeat.beats();
        assert!(beats >= 2);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(heartbeat.beats(), beats);
        assert_eq!(heartbeat.message(), "tick");
    }

    #[tokio::test]
    async fn test_pidfile_lifecycle() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("run/a.pid");
        let second = dir.path().join("run/b.pid");

        let manager = DirectManager::new(PidFiles::default());
        let config = Section::from_yaml(&format!("path: {}\n", first.display())).unwrap();
        let handle = manager.create("pid", &config).await.unwrap();
        assert!(!first.exists());

        handle.start("pid").await.unwrap();
        let content = std::fs::read_to_string(&first).unwrap();
        assert_eq!(content.trim(), std::process::id().to_string());

        let moved = Section::from_yaml(&format!("path: {}\n", second.display())).unwrap();
        assert!(matches!(
            handle.reload("pid", &moved).await.unwrap(),
            Reload::InPlace
        ));
        assert!(!first.exists());
        assert!(second.exists());

        handle.stop("pid").await.unwrap();
        assert!(!second.exists());
    }

    #[test]
    fn test_register_builtin() {
        let registry = ManagerRegistry::new();
        register_builtin(&registry);
        assert_eq!(registry.kinds(), vec![HEARTBEAT, PIDFILE]);
        let docs = registry.show(Some(PIDFILE)).unwrap();
        assert!(docs[0].1.fields[0].key == "path");
    }
}
