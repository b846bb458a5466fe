//! Groceries SDK - 离线优先的购物清单同步引擎
//!
//! 本 SDK 提供购物清单应用的客户端同步核心，包括：
//! - 📦 本地镜像存储：服务端实体的离线副本与派生统计
//! - 📝 待同步队列：持久化、按因果顺序回放的变更意图日志
//! - 🔁 同步引擎：单飞 drain、按结果分类、指数退避重试
//! - ⚡ 乐观更新：先改视图后落定，失败整体回滚，成功权威收敛
//! - 📡 连接监控：平台无关的在线/离线信号与 UI 状态快照
//! - ⚙️ 事件系统：统一的事件广播和回调机制
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use groceries_sdk::{GroceriesConfig, GroceriesSDK};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 配置 SDK
//!     let config = GroceriesConfig::builder()
//!         .data_dir("/path/to/data")
//!         .base_url("https://groceries.example.com")
//!         .build();
//!
//!     // 初始化 SDK
//!     let sdk = GroceriesSDK::initialize(config).await?;
//!
//!     // 离线也能用：变更立即可见，联网后自动回放
//!     let list = sdk.create_list("每周采购").await?;
//!     println!("清单已创建: {}", list.name);
//!
//!     // 订阅同步事件
//!     sdk.on_event("action_error", |event| {
//!         println!("同步失败: {:?}", event);
//!     })
//!     .await;
//!
//!     // 关闭 SDK
//!     sdk.shutdown().await?;
//!
//!     Ok(())
//! }
//! ```

// 导出核心模块
pub mod entities;
pub mod error;
pub mod events;
pub mod network;
pub mod reconciler;
pub mod sdk;
pub mod storage;
pub mod sync;
pub mod transport;
pub mod version;

// 重新导出核心类型，方便使用
pub use entities::{
    ApiEnvelope, ApiEnvelopeError, Category, CreateCategoryRequest, CreateItemRequest,
    CreateListRequest, EntityKind, GroceryItem, GroceryList, ListWithStats, ReorderItemsRequest,
    SyncMeta, UpdateCategoryRequest, UpdateItemRequest, UpdateListRequest,
};
pub use error::{GroceriesSDKError, Result};
pub use events::{ActionFailureKind, EventManager, EventStats, SdkEvent, SyncPhase};
pub use network::{
    ConnectivityEvent, ConnectivityMonitor, ConnectivityProvider, ConnectivityStatus,
    SyncStatusSnapshot,
};
pub use reconciler::{CacheReconciler, CacheSnapshot};
pub use sdk::{GroceriesConfig, GroceriesConfigBuilder, GroceriesSDK};
pub use storage::{
    ActionKind, ActionLog, KvStats, KvStore, MirrorStore, PendingAction, RetryPolicy,
    StorageManager,
};
pub use sync::{SyncEngine, SyncEngineConfig};
pub use transport::{
    ApiError, ApiResponse, ApiTransport, ErrorKind, HttpClientConfig, HttpTransport,
};
pub use version::SDK_VERSION;
