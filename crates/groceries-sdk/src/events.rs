//! 事件系统模块 - 同步引擎对外的唯一信号面
//!
//! 功能包括：
//! - 同步轮次事件（sync_start / sync_complete / sync_error）
//! - 单个动作事件（action_complete / action_error）
//! - 连接状态变更事件
//! - 事件广播和订阅机制

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// 动作失败类别（终态丢弃的原因，用于 UI 提示文案）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionFailureKind {
    /// 409 版本冲突，服务端为准
    Conflict,
    /// 永久性客户端错误（4xx）
    ClientError,
    /// 重试次数耗尽
    RetriesExhausted,
}

impl std::fmt::Display for ActionFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionFailureKind::Conflict => write!(f, "conflict"),
            ActionFailureKind::ClientError => write!(f, "client_error"),
            ActionFailureKind::RetriesExhausted => write!(f, "retries_exhausted"),
        }
    }
}

/// SDK 事件类型
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SdkEvent {
    /// 一轮 drain 开始
    SyncStarted { timestamp: u64 },
    /// 一轮 drain 结束（即使中途暂停也会发出，携带剩余待同步数）
    SyncCompleted { pending_count: usize, timestamp: u64 },
    /// 轮次级失败（如待同步队列无法加载）
    SyncFailed { error: String, timestamp: u64 },
    /// 单个动作同步成功并移出队列
    ActionCompleted {
        action_id: String,
        pending_count: usize,
        timestamp: u64,
    },
    /// 单个动作终态失败并移出队列
    ActionFailed {
        action_id: String,
        kind: ActionFailureKind,
        error: String,
        pending_count: usize,
        timestamp: u64,
    },
    /// 连接状态变更
    ConnectivityChanged { online: bool, timestamp: u64 },
}

impl SdkEvent {
    /// 获取事件类型字符串
    pub fn event_type(&self) -> &'static str {
        match self {
            SdkEvent::SyncStarted { .. } => "sync_start",
            SdkEvent::SyncCompleted { .. } => "sync_complete",
            SdkEvent::SyncFailed { .. } => "sync_error",
            SdkEvent::ActionCompleted { .. } => "action_complete",
            SdkEvent::ActionFailed { .. } => "action_error",
            SdkEvent::ConnectivityChanged { .. } => "connectivity_changed",
        }
    }

    /// 获取事件时间戳
    pub fn timestamp(&self) -> u64 {
        match self {
            SdkEvent::SyncStarted { timestamp }
            | SdkEvent::SyncCompleted { timestamp, .. }
            | SdkEvent::SyncFailed { timestamp, .. }
            | SdkEvent::ActionCompleted { timestamp, .. }
            | SdkEvent::ActionFailed { timestamp, .. }
            | SdkEvent::ConnectivityChanged { timestamp, .. } => *timestamp,
        }
    }

    /// 获取事件关联的动作 ID
    pub fn action_id(&self) -> Option<&str> {
        match self {
            SdkEvent::ActionCompleted { action_id, .. }
            | SdkEvent::ActionFailed { action_id, .. } => Some(action_id),
            _ => None,
        }
    }

    /// 获取事件携带的待同步数
    pub fn pending_count(&self) -> Option<usize> {
        match self {
            SdkEvent::SyncCompleted { pending_count, .. }
            | SdkEvent::ActionCompleted { pending_count, .. }
            | SdkEvent::ActionFailed { pending_count, .. } => Some(*pending_count),
            _ => None,
        }
    }
}

/// 同步阶段
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPhase {
    #[default]
    Idle,       // 空闲
    Running,    // 正在同步
    Error,      // 上一轮出错
}

/// 事件监听器类型
pub type EventListener = Box<dyn Fn(&SdkEvent) + Send + Sync>;

/// 事件统计信息
#[derive(Debug, Clone, Default)]
pub struct EventStats {
    /// 总事件数
    pub total_events: u64,
    /// 按类型分组的事件数
    pub events_by_type: HashMap<String, u64>,
    /// 监听器数量
    pub listener_count: usize,
    /// 最后事件时间
    pub last_event_time: Option<u64>,
}

/// 事件管理器
pub struct EventManager {
    /// 广播发送器
    sender: broadcast::Sender<SdkEvent>,
    /// 事件监听器映射
    listeners: Arc<tokio::sync::RwLock<HashMap<String, Vec<EventListener>>>>,
    /// 事件统计
    stats: Arc<tokio::sync::RwLock<EventStats>>,
}

impl EventManager {
    /// 创建新的事件管理器
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);

        Self {
            sender,
            listeners: Arc::new(tokio::sync::RwLock::new(HashMap::new())),
            stats: Arc::new(tokio::sync::RwLock::new(EventStats::default())),
        }
    }

    /// 发布事件
    pub async fn emit(&self, event: SdkEvent) {
        debug!("Emitting event: {}", event.event_type());

        // 更新统计
        {
            let mut stats = self.stats.write().await;
            stats.total_events += 1;
            *stats
                .events_by_type
                .entry(event.event_type().to_string())
                .or_insert(0) += 1;
            stats.last_event_time = Some(event.timestamp());
        }

        // 广播事件（无订阅者时 send 会失败，属正常场景，仅打 debug）
        if let Err(e) = self.sender.send(event.clone()) {
            debug!("Failed to broadcast event (no active receivers): {}", e);
        }

        // 调用监听器
        let listeners = self.listeners.read().await;
        if let Some(event_listeners) = listeners.get(event.event_type()) {
            for listener in event_listeners {
                listener(&event);
            }
        }

        // 调用通用监听器
        if let Some(general_listeners) = listeners.get("*") {
            for listener in general_listeners {
                listener(&event);
            }
        }
    }

    /// 订阅事件
    pub fn subscribe(&self) -> broadcast::Receiver<SdkEvent> {
        self.sender.subscribe()
    }

    /// 添加事件监听器（event_type 为 "*" 时监听所有事件）
    pub async fn add_listener<F>(&self, event_type: &str, listener: F)
    where
        F: Fn(&SdkEvent) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.write().await;
        listeners
            .entry(event_type.to_string())
            .or_insert_with(Vec::new)
            .push(Box::new(listener));

        let mut stats = self.stats.write().await;
        stats.listener_count = listeners.values().map(|v| v.len()).sum();

        info!("Added listener for event type: {}", event_type);
    }

    /// 移除所有监听器
    pub async fn clear_listeners(&self) {
        let mut listeners = self.listeners.write().await;
        listeners.clear();

        let mut stats = self.stats.write().await;
        stats.listener_count = 0;
    }

    /// 获取事件统计
    pub async fn get_stats(&self) -> EventStats {
        self.stats.read().await.clone()
    }
}

impl std::fmt::Debug for EventManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventManager").finish_non_exhaustive()
    }
}

/// 当前毫秒时间戳（事件打点用）
pub(crate) fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}
