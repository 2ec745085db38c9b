//! 运行时模块
//!
//! 把文档加载、首次协调、自动重载与关闭流程串在一起

use crate::component::Supervisor;
use crate::config::{ConfigLoader, Flow, Section, Watch, WatchHandler, YamlConfigLoader};
use crate::error::Result;
use crate::logging::reload_audit_log;
use crate::signal::ControlEvent;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// 文档中控制自动重载的键
pub const AUTORELOAD_KEY: &str = "autoreload";

/// 默认组件列表键
pub const DEFAULT_COMPONENTS_KEY: &str = "components";

/// 默认轮询周期
pub const DEFAULT_WATCH_PERIOD: Duration = Duration::from_secs(2);

/// 运行时选项
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// 配置文件路径
    pub config_path: PathBuf,
    /// 组件列表所在的键
    pub components_key: String,
    /// 文件轮询周期
    pub watch_period: Duration,
    /// 覆盖文档中的 `autoreload`，None 表示以文档为准
    pub autoreload: Option<bool>,
}

impl RuntimeOptions {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            components_key: DEFAULT_COMPONENTS_KEY.to_string(),
            watch_period: DEFAULT_WATCH_PERIOD,
            autoreload: None,
        }
    }

    pub fn with_components_key(mut self, key: impl Into<String>) -> Self {
        self.components_key = key.into();
        self
    }

    pub fn with_watch_period(mut self, period: Duration) -> Self {
        self.watch_period = period;
        self
    }

    pub fn with_autoreload(mut self, autoreload: Option<bool>) -> Self {
        self.autoreload = autoreload;
        self
    }
}

/// 重新解析文档并协调组件列表
async fn reload_document(
    loader: &YamlConfigLoader,
    path: &Path,
    supervisor: &Supervisor,
) -> Result<()> {
    let root = loader.load_from_file(path).await?;
    let components = root.get_array(loader.components_key())?;
    supervisor.reconcile(&components, false).await
}

/// 文件变更时重新加载
struct AutoReload {
    loader: YamlConfigLoader,
    path: PathBuf,
    supervisor: Arc<Supervisor>,
}

#[async_trait]
impl WatchHandler for AutoReload {
    async fn on_change(&mut self, changed: &Path) -> Flow {
        info!("配置文件 {} 已变更，重新加载", changed.display());
        let source = self.path.display().to_string();
        match reload_document(&self.loader, &self.path, &self.supervisor).await {
            Ok(()) => reload_audit_log("watch", &source, Ok(())),
            Err(e) => {
                let message = e.to_string();
                error!("自动重载失败: {}", message);
                reload_audit_log("watch", &source, Err(&message));
            }
        }
        Flow::Continue
    }
}

/// 运行时
pub struct Runtime {
    options: RuntimeOptions,
    supervisor: Arc<Supervisor>,
    loader: YamlConfigLoader,
    autoreload: bool,
    watch_task: Mutex<Option<JoinHandle<()>>>,
}

impl Runtime {
    /// 加载文档并完成首次协调
    ///
    /// # 参数
    /// * `options` - 运行时选项
    /// * `supervisor` - 组件监督器，启动前钩子应在此之前设置
    ///
    /// # 返回
    /// * `Result<Runtime>` - 首次加载或协调失败时返回错误
    pub async fn load(options: RuntimeOptions, supervisor: Arc<Supervisor>) -> Result<Self> {
        let loader =
            YamlConfigLoader::new(options.components_key.clone()).with_watch(Watch::new());
        let root = loader.load_from_file(&options.config_path).await?;

        let components = root.get_array(&options.components_key)?;
        supervisor.reconcile(&components, true).await?;

        let autoreload = match options.autoreload {
            Some(value) => value,
            None => root.get_bool(AUTORELOAD_KEY)?.unwrap_or(false),
        };

        let runtime = Self {
            options,
            supervisor,
            loader,
            autoreload,
            watch_task: Mutex::new(None),
        };

        if autoreload {
            runtime.start_watch(&root);
        }
        info!(
            "运行时已就绪：{} 个组件，自动重载 {}",
            runtime.supervisor.len(),
            if autoreload { "开启" } else { "关闭" }
        );
        Ok(runtime)
    }

    fn start_watch(&self, root: &Section) {
        let handler = AutoReload {
            loader: self.loader.clone(),
            path: self.options.config_path.clone(),
            supervisor: Arc::clone(&self.supervisor),
        };
        let task = root.watch().start(self.options.watch_period, handler);
        *self
            .watch_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = task;
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    pub fn autoreload(&self) -> bool {
        self.autoreload
    }

    /// 已登记监控的文件
    pub fn watched_files(&self) -> Vec<PathBuf> {
        self.loader.watch().files()
    }

    /// 按需重新加载
    pub async fn reload(&self) -> Result<()> {
        let source = self.options.config_path.display().to_string();
        let result =
            reload_document(&self.loader, &self.options.config_path, &self.supervisor).await;
        match &result {
            Ok(()) => reload_audit_log("signal", &source, Ok(())),
            Err(e) => reload_audit_log("signal", &source, Err(&e.to_string())),
        }
        result
    }

    /// 处理控制事件直到收到关闭请求或通道关闭，然后关闭运行时
    ///
    /// 重载失败只记录日志，已运行的组件保持不变
    pub async fn serve(&self, mut control_rx: mpsc::UnboundedReceiver<ControlEvent>) -> Result<()> {
        while let Some(event) = control_rx.recv().await {
            match event {
                ControlEvent::Reload => {
                    if let Err(e) = self.reload().await {
                        warn!("重新加载失败: {}", e);
                    }
                }
                ControlEvent::Shutdown => break,
            }
        }
        self.shutdown().await
    }

    /// 停止文件监控并按启动顺序的逆序卸载全部组件
    pub async fn shutdown(&self) -> Result<()> {
        self.loader.watch().stop();
        let task = self
            .watch_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("文件监控任务异常退出: {}", e);
            }
        }

        info!("卸载全部组件");
        self.supervisor.unload_all().await
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("options", &self.options)
            .field("autoreload", &self.autoreload)
            .finish()
    }
}
