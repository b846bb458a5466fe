//! 统一 SDK 接口 - GroceriesSDK 主入口
//!
//! 分层架构设计：
//! ```text
//! GroceriesSDK (业务逻辑层 / 组合根)
//!   ├── ApiTransport (传输协议层)
//!   ├── StorageManager (存储管理层：镜像 + 待同步队列)
//!   ├── SyncEngine (同步引擎层)
//!   ├── CacheReconciler (乐观视图层)
//!   ├── EventManager (事件系统层)
//!   └── ConnectivityMonitor (连接监控层)
//! ```
//!
//! 设计原则：
//! - 异步优先：主要 API 使用 async/await
//! - 显式注入：引擎与传输由组合根构造注入，测试可实例化隔离副本
//! - 事件驱动：同步结果只通过事件流上报

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};
use ulid::Ulid;

use crate::entities::{
    ApiEnvelope, Category, CreateCategoryRequest, CreateItemRequest, CreateListRequest,
    GroceryItem, GroceryList, ListWithStats, ReorderItemsRequest, UpdateCategoryRequest,
    UpdateItemRequest, UpdateListRequest,
};
use crate::error::{GroceriesSDKError, Result};
use crate::events::{now_ms, EventManager, SdkEvent};
use crate::network::{
    ConnectivityEvent, ConnectivityMonitor, ConnectivityProvider, ConnectivityStatus,
    SyncStatusSnapshot,
};
use crate::reconciler::{CacheReconciler, CacheSnapshot};
use crate::storage::queue::{ActionKind, RetryPolicy};
use crate::storage::StorageManager;
use crate::sync::{SyncEngine, SyncEngineConfig};
use crate::transport::{ApiError, ApiResponse, ApiTransport, HttpClientConfig, HttpTransport};
use crate::version::SDK_VERSION;

/// 默认连接提供者（内部使用，假设网络始终在线）
/// 实际应用应该由平台层（浏览器/移动端）提供真实的连接信号
#[derive(Debug)]
struct DefaultConnectivityProvider {
    sender: broadcast::Sender<ConnectivityEvent>,
}

impl Default for DefaultConnectivityProvider {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(16);
        Self { sender }
    }
}

#[async_trait]
impl ConnectivityProvider for DefaultConnectivityProvider {
    async fn current_status(&self) -> ConnectivityStatus {
        ConnectivityStatus::Online
    }

    async fn start_monitoring(&self) -> Result<broadcast::Receiver<ConnectivityEvent>> {
        Ok(self.sender.subscribe())
    }

    async fn stop_monitoring(&self) {}
}

/// SDK 配置
#[derive(Debug, Clone)]
pub struct GroceriesConfig {
    /// 数据目录（镜像与队列落在 <data_dir>/kv 下）
    pub data_dir: PathBuf,
    /// 服务端基础 URL
    pub base_url: String,
    /// HTTP 客户端配置
    pub http: HttpClientConfig,
    /// drain 中单个动作的执行时限（秒）
    pub action_timeout_secs: u64,
    /// 重试策略
    pub retry_policy: RetryPolicy,
    /// 事件广播容量
    pub event_capacity: usize,
    /// 待同步数轮询间隔（秒，兜底防错过事件）
    pub status_poll_interval_secs: u64,
}

impl GroceriesConfig {
    pub fn builder() -> GroceriesConfigBuilder {
        GroceriesConfigBuilder::default()
    }
}

/// SDK 配置构建器
#[derive(Debug, Default)]
pub struct GroceriesConfigBuilder {
    data_dir: Option<PathBuf>,
    base_url: Option<String>,
    http: Option<HttpClientConfig>,
    action_timeout_secs: Option<u64>,
    retry_policy: Option<RetryPolicy>,
    event_capacity: Option<usize>,
    status_poll_interval_secs: Option<u64>,
}

impl GroceriesConfigBuilder {
    pub fn data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(data_dir.into());
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn http(mut self, http: HttpClientConfig) -> Self {
        self.http = Some(http);
        self
    }

    pub fn action_timeout_secs(mut self, secs: u64) -> Self {
        self.action_timeout_secs = Some(secs);
        self
    }

    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = Some(retry_policy);
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = Some(capacity);
        self
    }

    pub fn status_poll_interval_secs(mut self, secs: u64) -> Self {
        self.status_poll_interval_secs = Some(secs);
        self
    }

    pub fn build(self) -> GroceriesConfig {
        GroceriesConfig {
            data_dir: self.data_dir.unwrap_or_else(|| PathBuf::from("groceries_data")),
            base_url: self
                .base_url
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            http: self.http.unwrap_or_default(),
            action_timeout_secs: self.action_timeout_secs.unwrap_or(10),
            retry_policy: self.retry_policy.unwrap_or_default(),
            event_capacity: self.event_capacity.unwrap_or(256),
            status_poll_interval_secs: self.status_poll_interval_secs.unwrap_or(30),
        }
    }
}

/// 变更落定后需要收敛的集合
enum RefetchScope {
    Lists,
    Items(String),
    Categories,
}

/// Groceries SDK 主入口
pub struct GroceriesSDK {
    config: GroceriesConfig,
    storage: Arc<StorageManager>,
    transport: Arc<dyn ApiTransport>,
    events: Arc<EventManager>,
    monitor: Arc<ConnectivityMonitor>,
    engine: SyncEngine,
    reconciler: Arc<CacheReconciler>,
    shutdown: Arc<tokio::sync::Notify>,
    is_running: Arc<RwLock<bool>>,
}

impl GroceriesSDK {
    /// 初始化 SDK（HTTP 传输 + 默认始终在线的连接提供者）
    pub async fn initialize(config: GroceriesConfig) -> Result<Arc<Self>> {
        let transport: Arc<dyn ApiTransport> =
            Arc::new(HttpTransport::new(&config.http, &config.base_url)?);
        let provider: Arc<dyn ConnectivityProvider> =
            Arc::new(DefaultConnectivityProvider::default());
        Self::initialize_with(config, transport, provider).await
    }

    /// 用注入的传输与连接提供者初始化（平台适配层 / 测试入口）
    pub async fn initialize_with(
        config: GroceriesConfig,
        transport: Arc<dyn ApiTransport>,
        provider: Arc<dyn ConnectivityProvider>,
    ) -> Result<Arc<Self>> {
        let storage = Arc::new(StorageManager::new(&config.data_dir).await?);
        let events = Arc::new(EventManager::new(config.event_capacity));

        let monitor = Arc::new(ConnectivityMonitor::new(provider));
        monitor.start().await?;

        let engine = SyncEngine::new(
            transport.clone(),
            storage.actions(),
            monitor.clone(),
            events.clone(),
            SyncEngineConfig {
                action_timeout: Duration::from_secs(config.action_timeout_secs),
                retry_policy: config.retry_policy.clone(),
            },
        );

        let reconciler = Arc::new(CacheReconciler::new(storage.mirror()));
        reconciler.hydrate().await;

        // 首次初始化时生成设备 ID
        let meta = storage.mirror().load_sync_meta().await?;

        let sdk = Arc::new(Self {
            config,
            storage,
            transport,
            events,
            monitor,
            engine,
            reconciler,
            shutdown: Arc::new(tokio::sync::Notify::new()),
            is_running: Arc::new(RwLock::new(true)),
        });

        sdk.spawn_connectivity_watcher();
        sdk.spawn_event_watcher();
        sdk.spawn_status_poll();

        info!(
            "Groceries SDK 初始化完成 (version={}, device={})",
            SDK_VERSION, meta.device_id
        );

        Ok(sdk)
    }

    /// 关闭 SDK：停掉后台任务并刷盘
    pub async fn shutdown(&self) -> Result<()> {
        {
            let mut running = self.is_running.write().await;
            if !*running {
                return Ok(());
            }
            *running = false;
        }

        self.shutdown.notify_waiters();
        self.monitor.stop().await;
        self.storage.flush().await?;

        info!("Groceries SDK 已关闭");
        Ok(())
    }

    async fn ensure_running(&self) -> Result<()> {
        if *self.is_running.read().await {
            Ok(())
        } else {
            Err(GroceriesSDKError::ShuttingDown("SDK 已关闭".to_string()))
        }
    }

    // ============================================================
    // 后台任务
    // ============================================================

    /// 网络恢复时触发 drain，并把连接变化转成 SDK 事件
    fn spawn_connectivity_watcher(self: &Arc<Self>) {
        let mut receiver = self.monitor.subscribe();
        let engine = self.engine.clone();
        let events = self.events.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = receiver.recv() => {
                        let event = match event {
                            Ok(event) => event,
                            Err(broadcast::error::RecvError::Lagged(_)) => continue,
                            Err(_) => break,
                        };

                        let online = event.new_status == ConnectivityStatus::Online;
                        events
                            .emit(SdkEvent::ConnectivityChanged { online, timestamp: now_ms() })
                            .await;

                        if online && event.old_status == ConnectivityStatus::Offline {
                            info!("网络恢复，触发 drain");
                            engine.request_drain();
                        }
                    }
                    _ = shutdown.notified() => break,
                }
            }
        });
    }

    /// 维护 UI 状态快照；一轮 drain 有成果时做权威收敛拉取
    fn spawn_event_watcher(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let mut receiver = self.events.subscribe();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let mut completed_in_pass = 0usize;
            loop {
                tokio::select! {
                    event = receiver.recv() => {
                        let event = match event {
                            Ok(event) => event,
                            Err(broadcast::error::RecvError::Lagged(_)) => continue,
                            Err(_) => break,
                        };
                        let Some(sdk) = weak.upgrade() else { break };

                        sdk.monitor.apply_event(&event).await;

                        match &event {
                            SdkEvent::SyncStarted { .. } => completed_in_pass = 0,
                            SdkEvent::ActionCompleted { .. } => completed_in_pass += 1,
                            SdkEvent::SyncCompleted { .. } => {
                                if completed_in_pass > 0 {
                                    if let Err(e) = sdk.storage.mirror().mark_synced().await {
                                        warn!("记录同步时间失败: {}", e);
                                    }
                                    if sdk.monitor.is_online().await {
                                        if let Err(e) = sdk.refresh_all().await {
                                            warn!("drain 后收敛拉取失败: {}", e);
                                        }
                                    }
                                    completed_in_pass = 0;
                                }
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown.notified() => break,
                }
            }
        });
    }

    /// 周期兜底：轮询待同步数写入状态快照
    fn spawn_status_poll(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();
        let interval_secs = self.config.status_poll_interval_secs.max(1);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            ticker.tick().await; // 第一次 tick 立即返回，跳过
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(sdk) = weak.upgrade() else { break };
                        let pending = sdk.storage.actions().pending_count().await;
                        sdk.monitor.set_pending_count(pending).await;
                    }
                    _ = shutdown.notified() => break,
                }
            }
        });
    }

    // ============================================================
    // 权威拉取
    // ============================================================

    async fn execute_direct(
        &self,
        method: &str,
        endpoint: &str,
        payload: Option<&serde_json::Value>,
    ) -> std::result::Result<ApiResponse, ApiError> {
        self.transport.execute(method, endpoint, payload).await
    }

    fn envelope_data<T>(body: serde_json::Value) -> Result<T>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        let envelope: ApiEnvelope<T> = serde_json::from_value(body)?;
        Ok(envelope.data.unwrap_or_default())
    }

    /// 拉取所有清单并重建视图与镜像
    pub async fn refresh_lists(&self) -> Result<Vec<ListWithStats>> {
        let response = self
            .execute_direct("GET", "/api/lists", None)
            .await
            .map_err(GroceriesSDKError::from)?;
        let lists: Vec<ListWithStats> = Self::envelope_data(response.body)?;
        self.reconciler.seed_lists(lists.clone()).await;
        Ok(lists)
    }

    /// 拉取某清单的条目并重建视图与镜像
    pub async fn refresh_items(&self, list_id: &str) -> Result<Vec<GroceryItem>> {
        let endpoint = format!("/api/lists/{}/items", list_id);
        let response = self
            .execute_direct("GET", &endpoint, None)
            .await
            .map_err(GroceriesSDKError::from)?;
        let items: Vec<GroceryItem> = Self::envelope_data(response.body)?;
        self.reconciler.seed_items(list_id, items.clone()).await;
        Ok(items)
    }

    /// 拉取所有分类并重建视图与镜像
    pub async fn refresh_categories(&self) -> Result<Vec<Category>> {
        let response = self
            .execute_direct("GET", "/api/categories", None)
            .await
            .map_err(GroceriesSDKError::from)?;
        let categories: Vec<Category> = Self::envelope_data(response.body)?;
        self.reconciler.seed_categories(categories.clone()).await;
        Ok(categories)
    }

    /// 全量收敛：清单 → 各清单条目 → 分类
    pub async fn refresh_all(&self) -> Result<()> {
        let lists = self.refresh_lists().await?;
        for list in &lists {
            self.refresh_items(&list.list.id).await?;
        }
        self.refresh_categories().await?;
        Ok(())
    }

    // ============================================================
    // 离线可用的读取（视图 = 镜像的内存拷贝）
    // ============================================================

    pub fn lists(&self) -> Vec<ListWithStats> {
        self.reconciler.lists()
    }

    pub fn items(&self, list_id: &str) -> Vec<GroceryItem> {
        self.reconciler.items(list_id)
    }

    pub fn categories(&self) -> Vec<Category> {
        self.reconciler.categories()
    }

    // ============================================================
    // 变更操作（乐观协议）
    // ============================================================

    /// 乐观变更的统一落定路径：
    /// 在线 → 直接调用，失败回滚快照，成功收敛拉取；
    /// 离线 → 入队，乐观状态即工作状态，等下一次成功 drain 收敛。
    async fn dispatch_mutation(
        &self,
        snapshot: CacheSnapshot,
        kind: ActionKind,
        endpoint: String,
        method: &str,
        payload: Option<serde_json::Value>,
        refetch: RefetchScope,
    ) -> Result<()> {
        if self.monitor.is_online().await {
            match self.execute_direct(method, &endpoint, payload.as_ref()).await {
                Ok(_) => {
                    self.refetch(refetch).await;
                    Ok(())
                }
                Err(e) => {
                    warn!("直接调用失败，回滚乐观变更: {} {} ({})", method, endpoint, e);
                    self.reconciler.restore(snapshot);
                    Err(e.into())
                }
            }
        } else {
            self.engine.enqueue(kind, endpoint, method, payload).await?;
            Ok(())
        }
    }

    /// 落定后的收敛拉取；失败只打日志（视图仍是乐观状态，下轮再收敛）
    async fn refetch(&self, scope: RefetchScope) {
        let result = match scope {
            RefetchScope::Lists => self.refresh_lists().await.map(|_| ()),
            RefetchScope::Items(list_id) => {
                match self.refresh_items(&list_id).await {
                    Ok(_) => self.refresh_lists().await.map(|_| ()),
                    Err(e) => Err(e),
                }
            }
            RefetchScope::Categories => self.refresh_categories().await.map(|_| ()),
        };
        if let Err(e) = result {
            warn!("收敛拉取失败: {}", e);
        }
    }

    /// 创建清单
    pub async fn create_list(&self, name: &str) -> Result<GroceryList> {
        self.ensure_running().await?;
        if name.trim().is_empty() {
            return Err(GroceriesSDKError::InvalidArgument(
                "清单名不能为空".to_string(),
            ));
        }

        let snapshot = self.reconciler.snapshot();
        let now = now_ms() as i64;
        let list = GroceryList {
            id: Ulid::new().to_string(),
            name: name.trim().to_string(),
            version: 1,
            created_at: now,
            updated_at: now,
        };
        self.reconciler.apply_list_created(&list).await;

        let payload = serde_json::to_value(CreateListRequest {
            name: list.name.clone(),
        })?;
        self.dispatch_mutation(
            snapshot,
            ActionKind::ListCreate,
            "/api/lists".to_string(),
            "POST",
            Some(payload),
            RefetchScope::Lists,
        )
        .await?;

        Ok(list)
    }

    /// 重命名清单
    pub async fn rename_list(&self, list_id: &str, name: &str) -> Result<()> {
        self.ensure_running().await?;
        if name.trim().is_empty() {
            return Err(GroceriesSDKError::InvalidArgument(
                "清单名不能为空".to_string(),
            ));
        }

        let snapshot = self.reconciler.snapshot();
        self.reconciler.apply_list_renamed(list_id, name.trim()).await;

        let payload = serde_json::to_value(UpdateListRequest {
            name: name.trim().to_string(),
        })?;
        self.dispatch_mutation(
            snapshot,
            ActionKind::ListUpdate,
            format!("/api/lists/{}", list_id),
            "PUT",
            Some(payload),
            RefetchScope::Lists,
        )
        .await
    }

    /// 删除清单（连同其条目镜像）
    pub async fn delete_list(&self, list_id: &str) -> Result<()> {
        self.ensure_running().await?;

        let snapshot = self.reconciler.snapshot();
        self.reconciler.apply_list_deleted(list_id).await;

        self.dispatch_mutation(
            snapshot,
            ActionKind::ListDelete,
            format!("/api/lists/{}", list_id),
            "DELETE",
            None,
            RefetchScope::Lists,
        )
        .await
    }

    /// 添加条目
    pub async fn create_item(
        &self,
        list_id: &str,
        request: CreateItemRequest,
    ) -> Result<GroceryItem> {
        self.ensure_running().await?;
        if request.name.trim().is_empty() {
            return Err(GroceriesSDKError::InvalidArgument(
                "条目名不能为空".to_string(),
            ));
        }

        let snapshot = self.reconciler.snapshot();
        let next_sort_order = self
            .reconciler
            .items(list_id)
            .iter()
            .map(|i| i.sort_order)
            .max()
            .unwrap_or(-1)
            + 1;

        let item = GroceryItem {
            id: Ulid::new().to_string(),
            list_id: list_id.to_string(),
            name: request.name.trim().to_string(),
            quantity: request.quantity.max(1),
            unit: request.unit.clone(),
            category_id: request.category_id.clone(),
            checked: false,
            checked_by: None,
            checked_by_name: None,
            price: request.price,
            store: request.store.clone(),
            sort_order: next_sort_order,
            version: 1,
        };
        self.reconciler.apply_item_created(&item).await;

        let payload = serde_json::to_value(request)?;
        self.dispatch_mutation(
            snapshot,
            ActionKind::ItemCreate,
            format!("/api/lists/{}/items", list_id),
            "POST",
            Some(payload),
            RefetchScope::Items(list_id.to_string()),
        )
        .await?;

        Ok(item)
    }

    /// 更新条目（部分字段）
    pub async fn update_item(
        &self,
        list_id: &str,
        item_id: &str,
        request: UpdateItemRequest,
    ) -> Result<()> {
        self.ensure_running().await?;

        let Some(mut item) = self
            .reconciler
            .items(list_id)
            .into_iter()
            .find(|i| i.id == item_id)
        else {
            return Err(GroceriesSDKError::NotFound(format!(
                "条目不存在: {}",
                item_id
            )));
        };

        if let Some(ref name) = request.name {
            item.name = name.clone();
        }
        if let Some(quantity) = request.quantity {
            item.quantity = quantity.max(1);
        }
        if let Some(ref unit) = request.unit {
            item.unit = Some(unit.clone());
        }
        if let Some(ref category_id) = request.category_id {
            item.category_id = category_id.clone();
        }
        if let Some(price) = request.price {
            item.price = Some(price);
        }
        if let Some(ref store) = request.store {
            item.store = Some(store.clone());
        }

        let snapshot = self.reconciler.snapshot();
        self.reconciler.apply_item_updated(&item).await;

        let payload = serde_json::to_value(request)?;
        self.dispatch_mutation(
            snapshot,
            ActionKind::ItemUpdate,
            format!("/api/lists/{}/items/{}", list_id, item_id),
            "PUT",
            Some(payload),
            RefetchScope::Items(list_id.to_string()),
        )
        .await
    }

    /// 删除条目
    pub async fn delete_item(&self, list_id: &str, item_id: &str) -> Result<()> {
        self.ensure_running().await?;

        let snapshot = self.reconciler.snapshot();
        self.reconciler.apply_item_deleted(list_id, item_id).await;

        self.dispatch_mutation(
            snapshot,
            ActionKind::ItemDelete,
            format!("/api/lists/{}/items/{}", list_id, item_id),
            "DELETE",
            None,
            RefetchScope::Items(list_id.to_string()),
        )
        .await
    }

    /// 翻转条目勾选状态
    pub async fn toggle_item(&self, list_id: &str, item_id: &str) -> Result<GroceryItem> {
        self.ensure_running().await?;

        let snapshot = self.reconciler.snapshot();
        let Some(toggled) = self.reconciler.apply_item_toggled(list_id, item_id).await else {
            return Err(GroceriesSDKError::NotFound(format!(
                "条目不存在: {}",
                item_id
            )));
        };

        self.dispatch_mutation(
            snapshot,
            ActionKind::ItemToggle,
            format!("/api/lists/{}/items/{}/toggle", list_id, item_id),
            "PATCH",
            None,
            RefetchScope::Items(list_id.to_string()),
        )
        .await?;

        Ok(toggled)
    }

    /// 重排条目（顺序是 UI 偏好，服务端不增加版本号）
    pub async fn reorder_items(&self, list_id: &str, item_ids: Vec<String>) -> Result<()> {
        self.ensure_running().await?;

        let snapshot = self.reconciler.snapshot();
        self.reconciler.apply_items_reordered(list_id, &item_ids).await;

        let payload = serde_json::to_value(ReorderItemsRequest { item_ids })?;
        self.dispatch_mutation(
            snapshot,
            ActionKind::ItemReorder,
            format!("/api/lists/{}/items/reorder", list_id),
            "PUT",
            Some(payload),
            RefetchScope::Items(list_id.to_string()),
        )
        .await
    }

    /// 创建分类
    pub async fn create_category(&self, request: CreateCategoryRequest) -> Result<Category> {
        self.ensure_running().await?;

        let snapshot = self.reconciler.snapshot();
        let next_sort_order = self
            .reconciler
            .categories()
            .iter()
            .map(|c| c.sort_order)
            .max()
            .unwrap_or(-1)
            + 1;

        let category = Category {
            id: Ulid::new().to_string(),
            name: request.name.clone(),
            icon: request.icon.clone(),
            color: request.color.clone(),
            sort_order: request.sort_order.unwrap_or(next_sort_order),
            is_default: false,
        };
        self.reconciler.apply_category_created(&category).await;

        let payload = serde_json::to_value(request)?;
        self.dispatch_mutation(
            snapshot,
            ActionKind::CategoryCreate,
            "/api/categories".to_string(),
            "POST",
            Some(payload),
            RefetchScope::Categories,
        )
        .await?;

        Ok(category)
    }

    /// 更新分类（部分字段）
    pub async fn update_category(
        &self,
        category_id: &str,
        request: UpdateCategoryRequest,
    ) -> Result<()> {
        self.ensure_running().await?;

        let Some(mut category) = self
            .reconciler
            .categories()
            .into_iter()
            .find(|c| c.id == category_id)
        else {
            return Err(GroceriesSDKError::NotFound(format!(
                "分类不存在: {}",
                category_id
            )));
        };

        if let Some(ref name) = request.name {
            category.name = name.clone();
        }
        if let Some(ref icon) = request.icon {
            category.icon = icon.clone();
        }
        if let Some(ref color) = request.color {
            category.color = color.clone();
        }
        if let Some(sort_order) = request.sort_order {
            category.sort_order = sort_order;
        }

        let snapshot = self.reconciler.snapshot();
        self.reconciler.apply_category_updated(&category).await;

        let payload = serde_json::to_value(request)?;
        self.dispatch_mutation(
            snapshot,
            ActionKind::CategoryUpdate,
            format!("/api/categories/{}", category_id),
            "PUT",
            Some(payload),
            RefetchScope::Categories,
        )
        .await
    }

    /// 删除分类
    pub async fn delete_category(&self, category_id: &str) -> Result<()> {
        self.ensure_running().await?;

        let snapshot = self.reconciler.snapshot();
        self.reconciler.apply_category_deleted(category_id).await;

        self.dispatch_mutation(
            snapshot,
            ActionKind::CategoryDelete,
            format!("/api/categories/{}", category_id),
            "DELETE",
            None,
            RefetchScope::Categories,
        )
        .await
    }

    // ============================================================
    // 同步状态
    // ============================================================

    /// UI 状态快照（在线 / 同步中 / 待同步数 / 最近错误）
    pub async fn sync_status(&self) -> SyncStatusSnapshot {
        self.monitor.snapshot().await
    }

    /// 待同步动作数
    pub async fn pending_count(&self) -> usize {
        self.engine.pending_count().await
    }

    /// 手动触发一轮同步（失败横幅上的重试按钮）
    pub fn trigger_sync(&self) {
        self.engine.request_drain();
    }

    /// 订阅 SDK 事件流
    pub fn subscribe_events(&self) -> broadcast::Receiver<SdkEvent> {
        self.events.subscribe()
    }

    /// 注册事件回调（event_type 为 "*" 时监听所有事件）
    pub async fn on_event<F>(&self, event_type: &str, listener: F)
    where
        F: Fn(&SdkEvent) + Send + Sync + 'static,
    {
        self.events.add_listener(event_type, listener).await;
    }
}

impl std::fmt::Debug for GroceriesSDK {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroceriesSDK")
            .field("base_url", &self.config.base_url)
            .field("data_dir", &self.config.data_dir)
            .finish_non_exhaustive()
    }
}
