//! KV 存储模块 - 基于 sled 的键值存储
//!
//! 本模块提供：
//! - 按命名空间（Tree）隔离的键值存储
//! - JSON 序列化的类型安全读写
//! - 前缀扫描和批量清空

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use tokio::sync::RwLock;

use crate::error::{GroceriesSDKError, Result};

/// KV 存储统计信息
#[derive(Debug, Clone)]
pub struct KvStats {
    pub tree_count: usize,
    pub key_count: u64,
}

/// KV 存储组件
#[derive(Debug)]
pub struct KvStore {
    #[allow(dead_code)]
    base_path: PathBuf,
    /// 主数据库实例
    db: Arc<Db>,
    /// 已打开的 Tree 缓存
    trees: Arc<RwLock<HashMap<String, Tree>>>,
}

impl KvStore {
    /// 创建新的 KV 存储实例
    pub async fn new(base_path: &Path) -> Result<Self> {
        let base_path = base_path.to_path_buf();
        let kv_path = base_path.join("kv");

        tokio::fs::create_dir_all(&kv_path)
            .await
            .map_err(|e| GroceriesSDKError::IO(format!("创建 KV 存储目录失败: {}", e)))?;

        // 打开 sled 数据库（上一个实例可能刚释放锁，重试多次带退避）
        const MAX_OPEN_RETRIES: u32 = 8;
        const RETRY_DELAY_MS: u64 = 300;
        let mut db_opt: Option<sled::Db> = None;
        let mut last_err: Option<sled::Error> = None;
        for attempt in 0..MAX_OPEN_RETRIES {
            match sled::open(&kv_path) {
                Ok(d) => {
                    db_opt = Some(d);
                    break;
                }
                Err(e) => {
                    let msg = format!("{}", e);
                    last_err = Some(e);
                    let is_lock = msg.contains("could not acquire lock")
                        || msg.contains("Resource temporarily unavailable")
                        || msg.contains("WouldBlock");
                    if is_lock && attempt + 1 < MAX_OPEN_RETRIES {
                        let delay_ms = RETRY_DELAY_MS * (1 << attempt);
                        tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                    } else {
                        break;
                    }
                }
            }
        }
        let db = db_opt.ok_or_else(|| {
            GroceriesSDKError::KvStore(
                last_err
                    .map(|e| format!("打开 sled 数据库失败: {}", e))
                    .unwrap_or_else(|| "打开 sled 数据库失败".to_string()),
            )
        })?;

        Ok(Self {
            base_path,
            db: Arc::new(db),
            trees: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// 获取命名空间对应的 Tree（懒打开并缓存）
    async fn tree(&self, name: &str) -> Result<Tree> {
        {
            let trees = self.trees.read().await;
            if let Some(tree) = trees.get(name) {
                return Ok(tree.clone());
            }
        }

        let tree = self
            .db
            .open_tree(name)
            .map_err(|e| GroceriesSDKError::KvStore(format!("打开 Tree 失败: {}", e)))?;

        let mut trees = self.trees.write().await;
        trees.insert(name.to_string(), tree.clone());
        Ok(tree)
    }

    /// 设置键值对
    pub async fn set<K, V>(&self, tree_name: &str, key: K, value: &V) -> Result<()>
    where
        K: AsRef<[u8]>,
        V: Serialize,
    {
        let tree = self.tree(tree_name).await?;
        let value_bytes = serde_json::to_vec(value)
            .map_err(|e| GroceriesSDKError::Serialization(format!("序列化值失败: {}", e)))?;

        tree.insert(key, value_bytes)
            .map_err(|e| GroceriesSDKError::KvStore(format!("设置键值对失败: {}", e)))?;

        Ok(())
    }

    /// 获取键值对
    pub async fn get<K, V>(&self, tree_name: &str, key: K) -> Result<Option<V>>
    where
        K: AsRef<[u8]>,
        V: for<'de> Deserialize<'de>,
    {
        let tree = self.tree(tree_name).await?;

        let result = tree
            .get(key)
            .map_err(|e| GroceriesSDKError::KvStore(format!("获取键值对失败: {}", e)))?;

        match result {
            Some(value_bytes) => {
                let value = serde_json::from_slice(&value_bytes).map_err(|e| {
                    GroceriesSDKError::Serialization(format!("反序列化值失败: {}", e))
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// 删除键值对，返回键是否存在
    pub async fn remove<K>(&self, tree_name: &str, key: K) -> Result<bool>
    where
        K: AsRef<[u8]>,
    {
        let tree = self.tree(tree_name).await?;

        let result = tree
            .remove(key)
            .map_err(|e| GroceriesSDKError::KvStore(format!("删除键值对失败: {}", e)))?;

        Ok(result.is_some())
    }

    /// 按键字典序遍历整个 Tree
    ///
    /// sled 的迭代顺序即键的字节序，ULID 键因此天然按时间排序。
    pub async fn scan<V>(&self, tree_name: &str) -> Result<Vec<(Vec<u8>, V)>>
    where
        V: for<'de> Deserialize<'de>,
    {
        let tree = self.tree(tree_name).await?;
        let mut results = Vec::new();

        for result in tree.iter() {
            let (key, value_bytes) = result
                .map_err(|e| GroceriesSDKError::KvStore(format!("遍历 Tree 失败: {}", e)))?;

            let value = serde_json::from_slice(&value_bytes)
                .map_err(|e| GroceriesSDKError::Serialization(format!("反序列化值失败: {}", e)))?;

            results.push((key.to_vec(), value));
        }

        Ok(results)
    }

    /// 清空整个 Tree
    pub async fn clear(&self, tree_name: &str) -> Result<()> {
        let tree = self.tree(tree_name).await?;
        tree.clear()
            .map_err(|e| GroceriesSDKError::KvStore(format!("清空 Tree 失败: {}", e)))?;
        Ok(())
    }

    /// 获取 Tree 中的键数量
    pub async fn len(&self, tree_name: &str) -> Result<usize> {
        let tree = self.tree(tree_name).await?;
        Ok(tree.len())
    }

    /// 获取统计信息
    pub async fn get_stats(&self) -> Result<KvStats> {
        let trees = self.trees.read().await;
        let mut key_count = 0u64;
        for tree in trees.values() {
            key_count += tree.len() as u64;
        }
        Ok(KvStats {
            tree_count: trees.len(),
            key_count,
        })
    }

    /// 刷盘（测试与关闭时使用）
    pub async fn flush(&self) -> Result<()> {
        self.db
            .flush_async()
            .await
            .map_err(|e| GroceriesSDKError::KvStore(format!("刷盘失败: {}", e)))?;
        Ok(())
    }
}
