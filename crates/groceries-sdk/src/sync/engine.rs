//! 同步引擎 - 待同步队列的单飞 drain 处理器
//!
//! 职责：
//! - 入队新动作（在线时立即请求一轮 drain）
//! - 按因果顺序逐个执行动作，严格串行
//! - 按结果分类决定删除 / 重试 / 暂停
//!
//! 引擎由组合根构造并注入，不做全局单例，测试可以实例化隔离副本。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::events::{now_ms, ActionFailureKind, EventManager, SdkEvent};
use crate::network::ConnectivityMonitor;
use crate::storage::queue::{ActionKind, ActionLog, PendingAction, RetryPolicy};
use crate::transport::{ApiError, ApiResponse, ApiTransport, ErrorKind};

/// 同步引擎配置
#[derive(Debug, Clone)]
pub struct SyncEngineConfig {
    /// 单个动作的执行时限：没有时限的话，一个挂起的请求会
    /// 卡死整个单飞 drain
    pub action_timeout: Duration,
    /// 重试策略
    pub retry_policy: RetryPolicy,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            action_timeout: Duration::from_secs(10),
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// 同步引擎
#[derive(Debug, Clone)]
pub struct SyncEngine {
    transport: Arc<dyn ApiTransport>,
    actions: Arc<ActionLog>,
    monitor: Arc<ConnectivityMonitor>,
    events: Arc<EventManager>,
    config: SyncEngineConfig,
    /// 单飞标志：已有 drain 进行中时，后续调用直接返回
    is_draining: Arc<RwLock<bool>>,
}

impl SyncEngine {
    pub fn new(
        transport: Arc<dyn ApiTransport>,
        actions: Arc<ActionLog>,
        monitor: Arc<ConnectivityMonitor>,
        events: Arc<EventManager>,
        config: SyncEngineConfig,
    ) -> Self {
        Self {
            transport,
            actions,
            monitor,
            events,
            config,
            is_draining: Arc::new(RwLock::new(false)),
        }
    }

    /// 入队一个变更意图；在线时立即请求一轮 drain
    ///
    /// 唯一的同步保证是"已入队"，动作结果通过事件流通知。
    pub async fn enqueue(
        &self,
        kind: ActionKind,
        endpoint: impl Into<String>,
        method: impl Into<String>,
        payload: Option<serde_json::Value>,
    ) -> Result<PendingAction> {
        let action = self.actions.append(kind, endpoint, method, payload).await?;

        if self.monitor.is_online().await {
            self.request_drain();
        }

        Ok(action)
    }

    /// 在后台请求一轮 drain（结果经事件流上报）
    pub fn request_drain(&self) {
        let engine = self.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.drain().await {
                warn!("drain 失败: {}", e);
            }
        });
    }

    /// 执行一轮 drain
    ///
    /// 单飞：已有轮次进行中时本次调用为 no-op。一轮内动作严格
    /// 串行处理，保持同一实体上的写顺序；已发出的网络调用不会
    /// 被取消，只能不再推进到下一个动作。
    pub async fn drain(&self) -> Result<()> {
        {
            let mut draining = self.is_draining.write().await;
            if *draining {
                debug!("drain 已在进行中，忽略本次请求");
                return Ok(());
            }
            *draining = true;
        }

        let result = self.run_pass().await;

        {
            let mut draining = self.is_draining.write().await;
            *draining = false;
        }

        if let Err(ref e) = result {
            self.events
                .emit(SdkEvent::SyncFailed {
                    error: e.to_string(),
                    timestamp: now_ms(),
                })
                .await;
        }

        result
    }

    /// 一轮 drain 的主体
    async fn run_pass(&self) -> Result<()> {
        self.events
            .emit(SdkEvent::SyncStarted { timestamp: now_ms() })
            .await;

        let queued = self.actions.load_all().await?;
        info!("开始 drain: {} 个待同步动作", queued.len());

        for action in queued {
            // 开轮之后掉线：整轮停住，剩余动作原样保留
            if !self.monitor.is_online().await {
                info!("连接已断开，暂停本轮 drain");
                break;
            }

            match self.execute_action(&action).await {
                Ok(response) => {
                    self.actions.remove(&action.id).await?;
                    debug!("动作同步成功: {} (HTTP {})", action.details(), response.status);
                    self.events
                        .emit(SdkEvent::ActionCompleted {
                            action_id: action.id.clone(),
                            pending_count: self.actions.pending_count().await,
                            timestamp: now_ms(),
                        })
                        .await;
                }
                Err(err) => {
                    let stop = self.handle_failure(&action, err).await?;
                    if stop {
                        break;
                    }
                }
            }
        }

        self.events
            .emit(SdkEvent::SyncCompleted {
                pending_count: self.actions.pending_count().await,
                timestamp: now_ms(),
            })
            .await;

        Ok(())
    }

    /// 处理单个动作的失败，返回是否停止本轮
    async fn handle_failure(&self, action: &PendingAction, err: ApiError) -> Result<bool> {
        match err.kind {
            // 网络失败（无响应）：视同掉线，暂停整轮，不消耗重试次数
            ErrorKind::Network => {
                warn!("网络失败，暂停本轮 drain: {}", err.message);
                Ok(true)
            }
            // 409：服务端状态已分叉，服务端为准，不重试不合并
            ErrorKind::Conflict => {
                self.actions.remove(&action.id).await?;
                warn!("版本冲突，丢弃动作: {}", action.details());
                self.emit_action_failed(action, ActionFailureKind::Conflict, err.message)
                    .await;
                Ok(false)
            }
            // 其它 4xx：重试也不会成功，直接丢弃
            ErrorKind::ClientError => {
                self.actions.remove(&action.id).await?;
                warn!("客户端错误，丢弃动作: {}", action.details());
                self.emit_action_failed(action, ActionFailureKind::ClientError, err.message)
                    .await;
                Ok(false)
            }
            // 5xx：退避重试，到上限后终态丢弃
            ErrorKind::ServerError => {
                if self.config.retry_policy.is_exhausted(action.retry_count) {
                    self.actions.remove(&action.id).await?;
                    warn!("重试次数耗尽，丢弃动作: {}", action.details());
                    self.emit_action_failed(
                        action,
                        ActionFailureKind::RetriesExhausted,
                        "max retries exceeded".to_string(),
                    )
                    .await;
                } else {
                    let mut updated = action.clone();
                    updated.record_failure(err.message);
                    self.actions.update(&updated).await?;

                    let delay = self.config.retry_policy.delay_after(updated.retry_count);
                    warn!(
                        "服务端错误，{:?} 后重试 ({}/{}): {}",
                        delay,
                        updated.retry_count,
                        self.config.retry_policy.max_retries,
                        updated.details()
                    );
                    self.schedule_drain(delay);
                }
                Ok(false)
            }
        }
    }

    async fn emit_action_failed(
        &self,
        action: &PendingAction,
        kind: ActionFailureKind,
        error: String,
    ) {
        self.events
            .emit(SdkEvent::ActionFailed {
                action_id: action.id.clone(),
                kind,
                error,
                pending_count: self.actions.pending_count().await,
                timestamp: now_ms(),
            })
            .await;
    }

    /// 带单动作时限地执行一次 API 调用
    async fn execute_action(
        &self,
        action: &PendingAction,
    ) -> std::result::Result<ApiResponse, ApiError> {
        let call = self
            .transport
            .execute(&action.method, &action.endpoint, action.payload.as_ref());

        match tokio::time::timeout(self.config.action_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::network(format!(
                "动作执行超过时限 {:?}",
                self.config.action_timeout
            ))),
        }
    }

    /// 退避后补一轮 drain
    fn schedule_drain(&self, delay: Duration) {
        let engine = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = engine.drain().await {
                warn!("退避后的 drain 失败: {}", e);
            }
        });
    }

    /// 当前待同步动作数
    pub async fn pending_count(&self) -> usize {
        self.actions.pending_count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::test_helpers::ManualConnectivityProvider;
    use crate::network::ConnectivityStatus;
    use std::collections::VecDeque;
    use tempfile::TempDir;
    use tokio::sync::broadcast;
    use tokio::sync::Mutex;

    /// 脚本化传输：按顺序吐出预置结果，记录每次调用
    #[derive(Debug)]
    struct MockTransport {
        responses: Mutex<VecDeque<std::result::Result<ApiResponse, ApiError>>>,
        calls: Mutex<Vec<(String, String)>>,
        latency: Option<Duration>,
    }

    impl MockTransport {
        fn scripted(
            responses: Vec<std::result::Result<ApiResponse, ApiError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
                latency: None,
            })
        }

        fn with_latency(
            responses: Vec<std::result::Result<ApiResponse, ApiError>>,
            latency: Duration,
        ) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
                latency: Some(latency),
            })
        }

        fn ok() -> std::result::Result<ApiResponse, ApiError> {
            Ok(ApiResponse {
                status: 200,
                body: serde_json::json!({ "data": null }),
            })
        }

        async fn call_count(&self) -> usize {
            self.calls.lock().await.len()
        }

        async fn call_endpoints(&self) -> Vec<String> {
            self.calls.lock().await.iter().map(|(_, e)| e.clone()).collect()
        }
    }

    #[async_trait::async_trait]
    impl ApiTransport for MockTransport {
        async fn execute(
            &self,
            method: &str,
            path: &str,
            _payload: Option<&serde_json::Value>,
        ) -> std::result::Result<ApiResponse, ApiError> {
            self.calls
                .lock()
                .await
                .push((method.to_string(), path.to_string()));
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            self.responses.lock().await.pop_front().unwrap_or_else(Self::ok)
        }
    }

    struct Harness {
        _temp_dir: TempDir,
        engine: SyncEngine,
        actions: Arc<ActionLog>,
        monitor: Arc<ConnectivityMonitor>,
        transport: Arc<MockTransport>,
        events_rx: broadcast::Receiver<SdkEvent>,
    }

    async fn harness(online: bool, transport: Arc<MockTransport>) -> Harness {
        let temp_dir = TempDir::new().unwrap();
        let kv = Arc::new(crate::storage::kv::KvStore::new(temp_dir.path()).await.unwrap());
        let actions = Arc::new(ActionLog::new(kv));

        let provider = Arc::new(if online {
            ManualConnectivityProvider::online()
        } else {
            ManualConnectivityProvider::offline()
        });
        let monitor = Arc::new(ConnectivityMonitor::new(provider));
        monitor
            .set_status(if online {
                ConnectivityStatus::Online
            } else {
                ConnectivityStatus::Offline
            })
            .await;

        let events = Arc::new(EventManager::new(64));
        let events_rx = events.subscribe();

        let engine = SyncEngine::new(
            transport.clone(),
            actions.clone(),
            monitor.clone(),
            events,
            SyncEngineConfig::default(),
        );

        Harness {
            _temp_dir: temp_dir,
            engine,
            actions,
            monitor,
            transport,
            events_rx,
        }
    }

    fn drain_events(rx: &mut broadcast::Receiver<SdkEvent>) -> Vec<SdkEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    async fn enqueue_n(h: &Harness, n: usize) -> Vec<PendingAction> {
        let mut queued = Vec::new();
        for i in 0..n {
            queued.push(
                h.engine
                    .enqueue(
                        ActionKind::ItemCreate,
                        format!("/api/lists/L1/items/{}", i),
                        "POST",
                        None,
                    )
                    .await
                    .unwrap(),
            );
        }
        queued
    }

    #[tokio::test]
    async fn test_drain_empty_queue_is_noop() {
        let mut h = harness(true, MockTransport::scripted(vec![])).await;

        h.engine.drain().await.unwrap();

        let events = drain_events(&mut h.events_rx);
        let types: Vec<&str> = events.iter().map(|e| e.event_type()).collect();
        assert_eq!(types, vec!["sync_start", "sync_complete"]);
        assert_eq!(events[1].pending_count(), Some(0));
        assert_eq!(h.transport.call_count().await, 0);
    }

    #[tokio::test]
    async fn test_offline_enqueues_drain_fifo_on_reconnect() {
        let mut h = harness(false, MockTransport::scripted(vec![])).await;

        let queued = enqueue_n(&h, 3).await;
        // 离线：没有任何网络调用
        assert_eq!(h.transport.call_count().await, 0);
        assert_eq!(h.actions.pending_count().await, 3);

        h.monitor.set_status(ConnectivityStatus::Online).await;
        h.engine.drain().await.unwrap();

        // FIFO 顺序执行
        let endpoints = h.transport.call_endpoints().await;
        assert_eq!(
            endpoints,
            vec![
                "/api/lists/L1/items/0",
                "/api/lists/L1/items/1",
                "/api/lists/L1/items/2"
            ]
        );

        // pending 数 3→2→1→0，每个成功一条 action_complete
        let events = drain_events(&mut h.events_rx);
        let completions: Vec<&SdkEvent> = events
            .iter()
            .filter(|e| e.event_type() == "action_complete")
            .collect();
        assert_eq!(completions.len(), 3);
        for (i, event) in completions.iter().enumerate() {
            assert_eq!(event.pending_count(), Some(2 - i));
            assert_eq!(event.action_id(), Some(queued[i].id.as_str()));
        }
        assert_eq!(events.last().unwrap().pending_count(), Some(0));
        assert_eq!(h.actions.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_conflict_drops_action_without_retry() {
        let mut h = harness(
            true,
            MockTransport::scripted(vec![Err(ApiError::from_status(409, "item version conflict"))]),
        )
        .await;

        let queued = enqueue_n(&h, 1).await;
        // enqueue 在线时会后台触发 drain，这里等它跑完再检查
        for _ in 0..50 {
            if h.actions.pending_count().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(h.actions.pending_count().await, 0);
        assert_eq!(h.transport.call_count().await, 1);

        let events = drain_events(&mut h.events_rx);
        let failed: Vec<&SdkEvent> = events
            .iter()
            .filter(|e| e.event_type() == "action_error")
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].action_id(), Some(queued[0].id.as_str()));
        match failed[0] {
            SdkEvent::ActionFailed { kind, .. } => {
                assert_eq!(*kind, ActionFailureKind::Conflict)
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_server_error_increments_retry_count_once() {
        let h = harness(
            true,
            MockTransport::scripted(vec![Err(ApiError::from_status(500, "internal"))]),
        )
        .await;

        let action = h
            .actions
            .append(ActionKind::ListUpdate, "/api/lists/L1", "PUT", None)
            .await
            .unwrap();
        h.engine.drain().await.unwrap();

        let queued = h.actions.load_all().await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].id, action.id);
        assert_eq!(queued[0].retry_count, 1);
        assert!(queued[0].last_error.is_some());
        // 下一次尝试在 backoff[0] = 1s 之后（由 schedule_drain 补轮）
        assert_eq!(
            h.engine.config.retry_policy.delay_after(queued[0].retry_count),
            Duration::from_secs(1)
        );
    }

    #[tokio::test]
    async fn test_retry_exhaustion_drops_action() {
        let mut h = harness(
            true,
            MockTransport::scripted(vec![Err(ApiError::from_status(502, "bad gateway"))]),
        )
        .await;

        let mut action = h
            .actions
            .append(ActionKind::ItemDelete, "/api/lists/L1/items/I1", "DELETE", None)
            .await
            .unwrap();
        // 已经失败了 5 次：下一次失败即终态
        for _ in 0..5 {
            action.record_failure("HTTP 状态码 502".to_string());
        }
        h.actions.update(&action).await.unwrap();

        h.engine.drain().await.unwrap();

        assert_eq!(h.actions.pending_count().await, 0);
        let events = drain_events(&mut h.events_rx);
        let failed: Vec<&SdkEvent> = events
            .iter()
            .filter(|e| e.event_type() == "action_error")
            .collect();
        assert_eq!(failed.len(), 1);
        match failed[0] {
            SdkEvent::ActionFailed { kind, error, .. } => {
                assert_eq!(*kind, ActionFailureKind::RetriesExhausted);
                assert_eq!(error, "max retries exceeded");
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_pauses_pass_and_preserves_queue() {
        let mut h = harness(
            true,
            MockTransport::scripted(vec![
                MockTransport::ok(),
                Err(ApiError::network("connection reset")),
            ]),
        )
        .await;

        // 直接写入队列，避免 enqueue 自动触发 drain
        for i in 0..3 {
            h.actions
                .append(
                    ActionKind::ItemUpdate,
                    format!("/api/lists/L1/items/{}", i),
                    "PUT",
                    None,
                )
                .await
                .unwrap();
        }

        h.engine.drain().await.unwrap();

        // 动作 1 已完成，动作 2、3 原样保留（retry_count 不变）
        assert_eq!(h.transport.call_count().await, 2);
        let queued = h.actions.load_all().await.unwrap();
        assert_eq!(queued.len(), 2);
        assert!(queued.iter().all(|a| a.retry_count == 0));

        let events = drain_events(&mut h.events_rx);
        assert_eq!(
            events
                .iter()
                .filter(|e| e.event_type() == "action_complete")
                .count(),
            1
        );
        assert_eq!(events.last().unwrap().pending_count(), Some(2));
    }

    #[tokio::test]
    async fn test_concurrent_drains_are_single_flight() {
        let h = harness(
            false,
            MockTransport::with_latency(vec![MockTransport::ok()], Duration::from_millis(100)),
        )
        .await;

        h.actions
            .append(ActionKind::ListCreate, "/api/lists", "POST", None)
            .await
            .unwrap();
        h.monitor.set_status(ConnectivityStatus::Online).await;

        let first = h.engine.clone();
        let second = h.engine.clone();
        let (a, b) = tokio::join!(first.drain(), second.drain());
        a.unwrap();
        b.unwrap();

        // 只有一轮真正执行
        assert_eq!(h.transport.call_count().await, 1);
        assert_eq!(h.actions.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_offline_mid_pass_stops_without_touching_queue() {
        let h = harness(true, MockTransport::scripted(vec![])).await;

        for i in 0..2 {
            h.actions
                .append(
                    ActionKind::ItemToggle,
                    format!("/api/lists/L1/items/{}/toggle", i),
                    "PATCH",
                    None,
                )
                .await
                .unwrap();
        }

        // 开轮前掉线：一个动作都不执行
        h.monitor.set_status(ConnectivityStatus::Offline).await;
        h.engine.drain().await.unwrap();

        assert_eq!(h.transport.call_count().await, 0);
        assert_eq!(h.actions.pending_count().await, 2);
    }
}
