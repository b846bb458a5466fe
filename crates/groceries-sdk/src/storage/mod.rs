//! 存储模块 - 客户端数据持久化层
//!
//! 采用分层架构设计：
//! - StorageManager: 统一的存储管理器，持有各组件
//! - KvStore: sled 键值存储（按 Tree 划分命名空间）
//! - MirrorStore: 服务端实体镜像（离线读取 + 派生统计）
//! - ActionLog: 待同步动作日志（FIFO 因果顺序）

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::error::Result;

pub mod kv;
pub mod mirror;
pub mod queue;

pub use kv::{KvStats, KvStore};
pub use mirror::MirrorStore;
pub use queue::{ActionKind, ActionLog, PendingAction, RetryPolicy};

/// 统一存储管理器
#[derive(Debug)]
pub struct StorageManager {
    #[allow(dead_code)]
    base_path: PathBuf,
    kv: Arc<KvStore>,
    mirror: Arc<MirrorStore>,
    actions: Arc<ActionLog>,
}

impl StorageManager {
    /// 在指定数据目录下初始化存储
    pub async fn new(base_path: &Path) -> Result<Self> {
        let kv = Arc::new(KvStore::new(base_path).await?);
        let mirror = Arc::new(MirrorStore::new(kv.clone()));
        let actions = Arc::new(ActionLog::new(kv.clone()));

        info!("存储初始化完成: {}", base_path.display());

        Ok(Self {
            base_path: base_path.to_path_buf(),
            kv,
            mirror,
            actions,
        })
    }

    pub fn kv(&self) -> Arc<KvStore> {
        self.kv.clone()
    }

    pub fn mirror(&self) -> Arc<MirrorStore> {
        self.mirror.clone()
    }

    pub fn actions(&self) -> Arc<ActionLog> {
        self.actions.clone()
    }

    /// 刷盘（关闭前调用）
    pub async fn flush(&self) -> Result<()> {
        self.kv.flush().await
    }
}
