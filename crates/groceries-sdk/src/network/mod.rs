//! 连接状态监控模块
//!
//! 平台的在线/离线信号是同步引擎唯一的连接依据（不做主动探测）。
//! 平台层通过实现 `ConnectivityProvider` 接入（浏览器 online/offline
//! 事件、移动端网络回调等），SDK 本身保持可移植。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::events::{SdkEvent, SyncPhase};

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectivityStatus {
    /// 在线
    Online,
    /// 离线
    Offline,
}

/// 连接状态变化事件
#[derive(Debug, Clone)]
pub struct ConnectivityEvent {
    pub old_status: ConnectivityStatus,
    pub new_status: ConnectivityStatus,
    pub timestamp: u64,
}

/// 连接状态提供者 trait（由平台层实现）
#[async_trait]
pub trait ConnectivityProvider: Send + Sync + std::fmt::Debug {
    /// 获取当前连接状态
    async fn current_status(&self) -> ConnectivityStatus;

    /// 开始监听连接状态变化
    async fn start_monitoring(&self) -> Result<broadcast::Receiver<ConnectivityEvent>>;

    /// 停止监听
    async fn stop_monitoring(&self);
}

/// 暴露给 UI 的同步状态快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatusSnapshot {
    /// 当前是否在线
    pub online: bool,
    /// 是否有 drain 轮次进行中
    pub syncing: bool,
    /// 待同步动作数
    pub pending_count: usize,
    /// 最近一次同步错误（成功一轮后清除）
    pub last_sync_error: Option<String>,
}

/// UI 状态指示器的内部状态
#[derive(Debug, Default)]
struct SyncIndicator {
    phase: SyncPhase,
    pending_count: usize,
    last_sync_error: Option<String>,
    /// 本轮 drain 中是否出现过失败（决定轮次结束时是否清除错误）
    error_in_pass: bool,
}

/// 连接监控管理器
///
/// 持有当前状态、转发平台的状态变化，并维护 UI 状态快照
/// （pending 数在每个 action 事件上更新，另有周期轮询兜底）。
#[derive(Debug)]
pub struct ConnectivityMonitor {
    provider: Arc<dyn ConnectivityProvider>,
    status_sender: broadcast::Sender<ConnectivityEvent>,
    current_status: Arc<tokio::sync::RwLock<ConnectivityStatus>>,
    indicator: Arc<tokio::sync::RwLock<SyncIndicator>>,
}

impl ConnectivityMonitor {
    pub fn new(provider: Arc<dyn ConnectivityProvider>) -> Self {
        let (status_sender, _) = broadcast::channel(100);

        Self {
            provider,
            status_sender,
            current_status: Arc::new(tokio::sync::RwLock::new(ConnectivityStatus::Offline)),
            indicator: Arc::new(tokio::sync::RwLock::new(SyncIndicator::default())),
        }
    }

    /// 启动连接监控
    pub async fn start(&self) -> Result<()> {
        // 先同步一次当前状态
        let initial = self.provider.current_status().await;
        {
            let mut status = self.current_status.write().await;
            *status = initial;
        }

        let mut receiver = self.provider.start_monitoring().await?;
        let status_sender = self.status_sender.clone();
        let current_status = self.current_status.clone();

        tokio::spawn(async move {
            while let Ok(event) = receiver.recv().await {
                {
                    let mut status = current_status.write().await;
                    *status = event.new_status;
                }
                let _ = status_sender.send(event);
            }
        });

        Ok(())
    }

    /// 停止监控
    pub async fn stop(&self) {
        self.provider.stop_monitoring().await;
    }

    /// 获取当前连接状态
    pub async fn get_status(&self) -> ConnectivityStatus {
        *self.current_status.read().await
    }

    /// 是否在线
    pub async fn is_online(&self) -> bool {
        matches!(self.get_status().await, ConnectivityStatus::Online)
    }

    /// 手动设置连接状态（平台层无事件源时使用）
    pub async fn set_status(&self, new_status: ConnectivityStatus) {
        let old_status = {
            let mut status = self.current_status.write().await;
            let old = *status;
            *status = new_status;
            old
        };

        if old_status != new_status {
            let _ = self.status_sender.send(ConnectivityEvent {
                old_status,
                new_status,
                timestamp: crate::events::now_ms(),
            });
        }
    }

    /// 订阅连接状态变化
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.status_sender.subscribe()
    }

    /// 根据引擎事件维护 UI 状态指示器
    pub async fn apply_event(&self, event: &SdkEvent) {
        let mut indicator = self.indicator.write().await;
        match event {
            SdkEvent::SyncStarted { .. } => {
                indicator.phase = SyncPhase::Running;
                indicator.error_in_pass = false;
            }
            SdkEvent::SyncCompleted { pending_count, .. } => {
                indicator.phase = SyncPhase::Idle;
                indicator.pending_count = *pending_count;
                if !indicator.error_in_pass {
                    indicator.last_sync_error = None;
                }
            }
            SdkEvent::SyncFailed { error, .. } => {
                indicator.phase = SyncPhase::Error;
                indicator.error_in_pass = true;
                indicator.last_sync_error = Some(error.clone());
            }
            SdkEvent::ActionCompleted { pending_count, .. } => {
                indicator.pending_count = *pending_count;
            }
            SdkEvent::ActionFailed {
                pending_count,
                error,
                ..
            } => {
                indicator.pending_count = *pending_count;
                indicator.error_in_pass = true;
                indicator.last_sync_error = Some(error.clone());
            }
            SdkEvent::ConnectivityChanged { .. } => {}
        }
    }

    /// 周期轮询兜底：直接写入待同步数（防错过事件）
    pub async fn set_pending_count(&self, count: usize) {
        let mut indicator = self.indicator.write().await;
        indicator.pending_count = count;
    }

    /// 获取 UI 状态快照
    pub async fn snapshot(&self) -> SyncStatusSnapshot {
        let online = self.is_online().await;
        let indicator = self.indicator.read().await;
        SyncStatusSnapshot {
            online,
            syncing: indicator.phase == SyncPhase::Running,
            pending_count: indicator.pending_count,
            last_sync_error: indicator.last_sync_error.clone(),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_helpers::ManualConnectivityProvider;
    use super::*;
    use crate::events::now_ms;

    #[tokio::test]
    async fn test_monitor_tracks_provider_transitions() {
        let provider = Arc::new(ManualConnectivityProvider::offline());
        let monitor = ConnectivityMonitor::new(provider.clone());
        monitor.start().await.unwrap();

        assert!(!monitor.is_online().await);

        let mut events = monitor.subscribe();
        provider.set_status(ConnectivityStatus::Online).await;

        let event = events.recv().await.unwrap();
        assert_eq!(event.new_status, ConnectivityStatus::Online);
        assert!(monitor.is_online().await);
    }

    #[tokio::test]
    async fn test_indicator_follows_engine_events() {
        let provider = Arc::new(ManualConnectivityProvider::online());
        let monitor = ConnectivityMonitor::new(provider);

        monitor
            .apply_event(&SdkEvent::SyncStarted { timestamp: now_ms() })
            .await;
        assert!(monitor.snapshot().await.syncing);

        monitor
            .apply_event(&SdkEvent::ActionFailed {
                action_id: "01A".to_string(),
                kind: crate::events::ActionFailureKind::Conflict,
                error: "conflict".to_string(),
                pending_count: 2,
                timestamp: now_ms(),
            })
            .await;
        monitor
            .apply_event(&SdkEvent::SyncCompleted {
                pending_count: 2,
                timestamp: now_ms(),
            })
            .await;

        // 本轮有失败：错误保留，syncing 归位
        let snapshot = monitor.snapshot().await;
        assert!(!snapshot.syncing);
        assert_eq!(snapshot.pending_count, 2);
        assert_eq!(snapshot.last_sync_error.as_deref(), Some("conflict"));

        // 干净的一轮之后错误清除
        monitor
            .apply_event(&SdkEvent::SyncStarted { timestamp: now_ms() })
            .await;
        monitor
            .apply_event(&SdkEvent::SyncCompleted {
                pending_count: 0,
                timestamp: now_ms(),
            })
            .await;
        assert!(monitor.snapshot().await.last_sync_error.is_none());
    }
}
