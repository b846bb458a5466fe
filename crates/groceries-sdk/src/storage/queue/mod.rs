//! 待同步队列模块 - 持久化的变更意图日志
//!
//! 日志只追加，仅在终态（成功 / 冲突 / 永久性客户端错误 / 重试耗尽）
//! 时移除。sled 按键字典序迭代，ULID 键因此天然给出 FIFO（因果）顺序。

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};
use ulid::Ulid;

use crate::error::{GroceriesSDKError, Result};
use crate::storage::kv::KvStore;

pub mod action;
pub mod retry_policy;

pub use action::{ActionKind, PendingAction};
pub use retry_policy::RetryPolicy;

const ACTIONS_TREE: &str = "pending_actions";

/// 待同步动作日志
pub struct ActionLog {
    kv: Arc<KvStore>,
    /// 单调 ULID 生成器：同一毫秒内的多次入队仍保持严格递增
    id_gen: Mutex<ulid::Generator>,
}

impl std::fmt::Debug for ActionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionLog").finish_non_exhaustive()
    }
}

impl ActionLog {
    pub fn new(kv: Arc<KvStore>) -> Self {
        Self {
            kv,
            id_gen: Mutex::new(ulid::Generator::new()),
        }
    }

    fn next_id(&self) -> Result<Ulid> {
        self.id_gen
            .lock()
            .generate()
            .map_err(|e| GroceriesSDKError::Other(format!("生成动作 ID 失败: {}", e)))
    }

    /// 追加一个新动作，返回持久化后的记录
    pub async fn append(
        &self,
        kind: ActionKind,
        endpoint: impl Into<String>,
        method: impl Into<String>,
        payload: Option<serde_json::Value>,
    ) -> Result<PendingAction> {
        let id = self.next_id()?;
        let action = PendingAction::new(
            id.to_string(),
            kind,
            endpoint.into(),
            method.into(),
            payload,
        );

        self.kv.set(ACTIONS_TREE, &action.id, &action).await?;
        debug!("动作已入队: {}", action.details());
        Ok(action)
    }

    /// 按 ID（因果）顺序加载所有待同步动作
    pub async fn load_all(&self) -> Result<Vec<PendingAction>> {
        let entries = self.kv.scan::<PendingAction>(ACTIONS_TREE).await?;
        Ok(entries.into_iter().map(|(_, action)| action).collect())
    }

    /// 持久化重试簿记（retry_count / last_error）
    pub async fn update(&self, action: &PendingAction) -> Result<()> {
        self.kv.set(ACTIONS_TREE, &action.id, action).await
    }

    /// 终态移除
    pub async fn remove(&self, id: &str) -> Result<()> {
        self.kv.remove(ACTIONS_TREE, id).await?;
        Ok(())
    }

    /// 待同步动作数；存储不可用时降级为 0（仅影响 UI 角标）
    pub async fn pending_count(&self) -> usize {
        match self.kv.len(ACTIONS_TREE).await {
            Ok(count) => count,
            Err(e) => {
                warn!("读取待同步数失败，降级为 0: {}", e);
                0
            }
        }
    }

    /// 清空队列（登出 / 测试用）
    pub async fn clear(&self) -> Result<()> {
        self.kv.clear(ACTIONS_TREE).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn new_log() -> (TempDir, ActionLog) {
        let temp_dir = TempDir::new().unwrap();
        let kv = Arc::new(KvStore::new(temp_dir.path()).await.unwrap());
        (temp_dir, ActionLog::new(kv))
    }

    #[tokio::test]
    async fn test_fifo_order_across_mixed_kinds() {
        let (_guard, log) = new_log().await;

        let a = log
            .append(ActionKind::ListCreate, "/api/lists", "POST", None)
            .await
            .unwrap();
        let b = log
            .append(ActionKind::ItemToggle, "/api/lists/L1/items/I1/toggle", "PATCH", None)
            .await
            .unwrap();
        let c = log
            .append(ActionKind::CategoryDelete, "/api/categories/C1", "DELETE", None)
            .await
            .unwrap();

        let queued = log.load_all().await.unwrap();
        let ids: Vec<&str> = queued.iter().map(|x| x.id.as_str()).collect();
        assert_eq!(ids, vec![a.id.as_str(), b.id.as_str(), c.id.as_str()]);
        assert_eq!(log.pending_count().await, 3);
    }

    #[tokio::test]
    async fn test_ids_are_strictly_monotonic() {
        let (_guard, log) = new_log().await;

        // 同一毫秒内连续入队也必须严格递增
        let mut previous = String::new();
        for _ in 0..50 {
            let action = log
                .append(ActionKind::ItemCreate, "/api/lists/L1/items", "POST", None)
                .await
                .unwrap();
            assert!(action.id > previous, "{} <= {}", action.id, previous);
            assert_eq!(action.id.len(), 26);
            previous = action.id;
        }
    }

    #[tokio::test]
    async fn test_update_persists_retry_bookkeeping() {
        let (_guard, log) = new_log().await;

        let mut action = log
            .append(ActionKind::ListUpdate, "/api/lists/L1", "PUT", None)
            .await
            .unwrap();
        action.record_failure("HTTP 状态码 503".to_string());
        log.update(&action).await.unwrap();

        let queued = log.load_all().await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].retry_count, 1);
        assert_eq!(queued[0].last_error.as_deref(), Some("HTTP 状态码 503"));
        // 重试簿记不改变队列位置
        assert_eq!(queued[0].id, action.id);
    }

    #[tokio::test]
    async fn test_remove_is_terminal() {
        let (_guard, log) = new_log().await;

        let a = log
            .append(ActionKind::ItemDelete, "/api/lists/L1/items/I1", "DELETE", None)
            .await
            .unwrap();
        let _b = log
            .append(ActionKind::ItemDelete, "/api/lists/L1/items/I2", "DELETE", None)
            .await
            .unwrap();

        log.remove(&a.id).await.unwrap();
        let queued = log.load_all().await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_ne!(queued[0].id, a.id);
        assert_eq!(log.pending_count().await, 1);
    }
}
