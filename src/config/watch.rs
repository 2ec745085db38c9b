//! 配置文件监控模块
//!
//! 以固定周期轮询已登记文件的修改时间，发现变更后回调处理器。
//! 状态机: `Unstarted -> Watching -> Stopped`

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// 回调返回值，决定轮询是否继续
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// 继续监控
    Continue,
    /// 结束监控
    Done,
}

/// 监控状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchPhase {
    /// 尚未启动，登记的文件先缓存
    #[default]
    Unstarted,
    /// 轮询中
    Watching,
    /// 已停止
    Stopped,
}

/// 文件变更处理器
#[async_trait]
pub trait WatchHandler: Send + 'static {
    /// 文件修改时间比上次记录的更新
    async fn on_change(&mut self, path: &Path) -> Flow;

    /// 获取文件状态失败，默认记录告警并继续重试
    async fn on_error(&mut self, path: &Path, error: &std::io::Error) -> Flow {
        warn!("获取文件状态失败 {}: {}", path.display(), error);
        Flow::Continue
    }
}

#[derive(Debug, Default)]
struct WatchState {
    phase: WatchPhase,
    /// 已登记的全部文件
    files: Vec<PathBuf>,
    /// 轮询任务的控制通道，关闭即停止
    control: Option<mpsc::UnboundedSender<PathBuf>>,
    /// 最近一次检测到变更的修改时间
    last_change: Option<SystemTime>,
}

/// 文件监控登记
///
/// 由一棵 Section 树持有，克隆出的子节点共享同一份登记
#[derive(Debug, Clone, Default)]
pub struct Watch {
    inner: Arc<Mutex<WatchState>>,
}

impl Watch {
    /// 创建新的监控登记
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, WatchState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 登记文件；轮询中则直接推送给轮询任务，否则先缓存
    pub fn add(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());

        let mut state = self.state();
        if state.files.contains(&path) {
            return;
        }
        state.files.push(path.clone());

        if state.phase == WatchPhase::Watching {
            if let Some(control) = &state.control {
                debug!("追加监控文件: {}", path.display());
                let _ = control.send(path);
            }
        }
    }

    /// 已登记的文件
    pub fn files(&self) -> Vec<PathBuf> {
        self.state().files.clone()
    }

    /// 当前状态
    pub fn phase(&self) -> WatchPhase {
        self.state().phase
    }

    /// 最近一次检测到变更的修改时间
    pub fn last_change(&self) -> Option<SystemTime> {
        self.state().last_change
    }

    /// 启动轮询
    ///
    /// # 参数
    /// * `period` - 轮询周期
    /// * `handler` - 变更与错误处理器
    ///
    /// # 返回
    /// * `Option<JoinHandle<()>>` - 轮询任务句柄，已启动或已停止时返回 None
    pub fn start<H: WatchHandler>(&self, period: Duration, handler: H) -> Option<JoinHandle<()>> {
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let files = {
            let mut state = self.state();
            if state.phase != WatchPhase::Unstarted {
                warn!("文件监控已处于 {:?} 状态，忽略重复启动", state.phase);
                return None;
            }
            state.phase = WatchPhase::Watching;
            state.control = Some(control_tx);
            state.files.clone()
        };

        info!("启动配置文件监控，周期 {:?}，文件数 {}", period, files.len());

        let inner = Arc::clone(&self.inner);
        Some(tokio::spawn(async move {
            poll_loop(&inner, files, control_rx, period, handler).await;

            let mut state = inner.lock().unwrap_or_else(PoisonError::into_inner);
            state.phase = WatchPhase::Stopped;
            state.control = None;
            info!("配置文件监控已停止");
        }))
    }

    /// 停止轮询：关闭控制通道，轮询任务在下一次接收时退出
    pub fn stop(&self) {
        let mut state = self.state();
        state.control = None;
        state.phase = WatchPhase::Stopped;
    }
}

async fn poll_loop<H: WatchHandler>(
    inner: &Arc<Mutex<WatchState>>,
    mut files: Vec<PathBuf>,
    mut control: mpsc::UnboundedReceiver<PathBuf>,
    period: Duration,
    mut handler: H,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // 第一次 tick 立即完成
    ticker.tick().await;

    let mut last_seen = SystemTime::now();

    loop {
        tokio::select! {
            message = control.recv() => match message {
                Some(path) => {
                    if !files.contains(&path) {
                        files.push(path);
                    }
                }
                None => break,
            },
            _ = ticker.tick() => {
                debug!("轮询 {} 个文件", files.len());
                if scan(inner, &files, &mut last_seen, &mut handler).await == Flow::Done {
                    break;
                }
            }
        }
    }
}

/// 检查一轮文件，每轮最多报告一个变更
async fn scan<H: WatchHandler>(
    inner: &Arc<Mutex<WatchState>>,
    files: &[PathBuf],
    last_seen: &mut SystemTime,
    handler: &mut H,
) -> Flow {
    for path in files {
        let modified = match tokio::fs::metadata(path).await.and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                if handler.on_error(path, &e).await == Flow::Done {
                    return Flow::Done;
                }
                continue;
            }
        };

        if modified > *last_seen {
            *last_seen = modified;
            inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .last_change = Some(modified);
            info!("检测到配置文件变更: {}", path.display());
            return handler.on_change(path).await;
        }
    }
    Flow::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::TempDir;
    use tokio::time::timeout;

    struct Recorder {
        changes: mpsc::UnboundedSender<PathBuf>,
        stop_after: usize,
        seen: usize,
    }

    #[async_trait]
    impl WatchHandler for Recorder {
        async fn on_change(&mut self, path: &Path) -> Flow {
            let _ = self.changes.send(path.to_path_buf());
            self.seen += 1;
            if self.seen >= self.stop_after {
                Flow::Done
            } else {
                Flow::Continue
            }
        }
    }

    struct ErrorCounter {
        errors: usize,
    }

    #[async_trait]
    impl WatchHandler for ErrorCounter {
        async fn on_change(&mut self, _path: &Path) -> Flow {
            Flow::Continue
        }

        async fn on_error(&mut self, _path: &Path, _error: &std::io::Error) -> Flow {
            self.errors += 1;
            if self.errors >= 2 {
                Flow::Done
            } else {
                Flow::Continue
            }
        }
    }

    fn touch_future(path: &Path, secs: u64) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(secs))
            .unwrap();
    }

    #[tokio::test]
    async fn test_buffered_files_are_watched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.yaml");
        fs::write(&path, "a: 1").unwrap();

        let watch = Watch::new();
        watch.add(&path);
        watch.add(&path);
        assert_eq!(watch.files().len(), 1);
        assert_eq!(watch.phase(), WatchPhase::Unstarted);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = watch
            .start(
                Duration::from_millis(20),
                Recorder {
                    changes: tx,
                    stop_after: 1,
                    seen: 0,
                },
            )
            .unwrap();
        assert_eq!(watch.phase(), WatchPhase::Watching);

        touch_future(&path, 5);

        let changed = timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(changed.ends_with("a.yaml"));

        timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
        assert_eq!(watch.phase(), WatchPhase::Stopped);
        assert!(watch.last_change().is_some());
    }

    #[tokio::test]
    async fn test_add_while_watching() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("late.yaml");
        fs::write(&path, "x: 1").unwrap();

        let watch = Watch::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = watch
            .start(
                Duration::from_millis(20),
                Recorder {
                    changes: tx,
                    stop_after: 1,
                    seen: 0,
                },
            )
            .unwrap();

        watch.add(&path);
        tokio::time::sleep(Duration::from_millis(50)).await;
        touch_future(&path, 5);

        let changed = timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(changed.ends_with("late.yaml"));
        timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_only_one_change_reported_per_tick() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("first.yaml");
        let second = dir.path().join("second.yaml");
        fs::write(&first, "a: 1").unwrap();
        fs::write(&second, "b: 1").unwrap();

        let watch = Watch::new();
        watch.add(&first);
        watch.add(&second);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = watch
            .start(
                Duration::from_millis(20),
                Recorder {
                    changes: tx,
                    stop_after: 1,
                    seen: 0,
                },
            )
            .unwrap();

        touch_future(&first, 5);
        touch_future(&second, 5);

        timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stat_errors_reach_error_handler() {
        let watch = Watch::new();
        watch.add("/nonexistent/backbone.yaml");

        let handle = watch
            .start(Duration::from_millis(10), ErrorCounter { errors: 0 })
            .unwrap();

        timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
        assert_eq!(watch.phase(), WatchPhase::Stopped);
    }

    #[tokio::test]
    async fn test_stop_closes_control_channel() {
        let watch = Watch::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let handle = watch
            .start(
                Duration::from_secs(3600),
                Recorder {
                    changes: tx,
                    stop_after: usize::MAX,
                    seen: 0,
                },
            )
            .unwrap();

        watch.stop();
        timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
        assert_eq!(watch.phase(), WatchPhase::Stopped);

        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(watch
            .start(
                Duration::from_millis(10),
                Recorder {
                    changes: tx,
                    stop_after: 1,
                    seen: 0,
                },
            )
            .is_none());
    }
}
