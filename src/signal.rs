//! 信号处理模块
//!
//! 将进程信号转换为控制事件：SIGINT/SIGTERM/Ctrl+C 请求关闭，SIGHUP 请求重新加载配置

use crate::error::Result;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

#[cfg(unix)]
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
#[cfg(unix)]
use signal_hook_tokio::Signals;

/// 控制事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// 优雅关闭
    Shutdown,
    /// 重新加载配置
    Reload,
}

/// 设置信号处理器
///
/// # 参数
/// * `control_tx` - 控制事件发送端，接收端关闭后监听任务自行退出
///
/// # 返回
/// * `Result<()>` - 注册信号失败时返回错误
pub async fn setup_signal_handlers(control_tx: mpsc::UnboundedSender<ControlEvent>) -> Result<()> {
    #[cfg(unix)]
    {
        setup_unix_signals(control_tx.clone())?;
    }
    #[cfg(not(unix))]
    {
        info!("非Unix系统，仅监听 Ctrl+C");
    }

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("接收到 Ctrl+C，开始优雅关闭...");
                if let Err(e) = control_tx.send(ControlEvent::Shutdown) {
                    error!("发送关闭信号失败: {e}");
                }
            }
            Err(e) => error!("监听 Ctrl+C 失败: {e}"),
        }
    });

    Ok(())
}

/// Unix/Linux系统信号处理
#[cfg(unix)]
fn setup_unix_signals(control_tx: mpsc::UnboundedSender<ControlEvent>) -> Result<()> {
    use futures::stream::StreamExt;

    let signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;
    let handle = signals.handle();

    tokio::spawn(async move {
        let mut signals = signals;
        while let Some(signal) = signals.next().await {
            let event = match signal {
                SIGINT => {
                    info!("接收到 SIGINT 信号，开始优雅关闭...");
                    ControlEvent::Shutdown
                }
                SIGTERM => {
                    info!("接收到 SIGTERM 信号，开始优雅关闭...");
                    ControlEvent::Shutdown
                }
                SIGHUP => {
                    info!("接收到 SIGHUP 信号，重新加载配置...");
                    ControlEvent::Reload
                }
                other => {
                    debug!("忽略信号: {other}");
                    continue;
                }
            };

            if control_tx.send(event).is_err() {
                debug!("控制通道已关闭，停止监听信号");
                break;
            }
            if event == ControlEvent::Shutdown {
                break;
            }
        }
        handle.close();
    });

    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::time::Duration;

    #[tokio::test]
    #[serial]
    async fn test_sighup_requests_reload() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        setup_signal_handlers(tx).await.unwrap();

        signal_hook::low_level::raise(SIGHUP).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap();
        assert_eq!(event, Some(ControlEvent::Reload));
    }
}
