//! 本地镜像存储 - 服务端实体的最后已知副本
//!
//! 镜像只是缓存，永远不是第二份权威数据：离线期间可以过期，
//! 任何后续权威拉取都会覆盖它。读路径绝不向离线渲染方抛错 ——
//! 存储不可用时降级为"空"，只打日志。写路径返回 `Result`。

use std::sync::Arc;

use tracing::{debug, warn};

use crate::entities::{Category, EntityKind, GroceryItem, ListWithStats, SyncMeta};
use crate::error::Result;
use crate::storage::kv::KvStore;

const META_TREE: &str = "sync_meta";
const META_KEY: &str = "meta";

/// 实体类型对应的镜像 Tree 名
fn tree_name(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::List => "mirror_lists",
        EntityKind::Item => "mirror_items",
        EntityKind::Category => "mirror_categories",
    }
}

/// 镜像存储组件
#[derive(Debug)]
pub struct MirrorStore {
    kv: Arc<KvStore>,
}

impl MirrorStore {
    pub fn new(kv: Arc<KvStore>) -> Self {
        Self { kv }
    }

    // ============================================================
    // 清单
    // ============================================================

    /// 所有清单（ULID 键序 = 创建顺序）；存储不可用时返回空
    pub async fn lists(&self) -> Vec<ListWithStats> {
        match self.kv.scan::<ListWithStats>(tree_name(EntityKind::List)).await {
            Ok(entries) => entries.into_iter().map(|(_, v)| v).collect(),
            Err(e) => {
                warn!("读取清单镜像失败，降级为空: {}", e);
                Vec::new()
            }
        }
    }

    /// 单个清单；不存在或存储不可用时返回 None
    pub async fn list(&self, id: &str) -> Option<ListWithStats> {
        match self.kv.get(tree_name(EntityKind::List), id).await {
            Ok(value) => value,
            Err(e) => {
                warn!("读取清单镜像失败 (id={}): {}", id, e);
                None
            }
        }
    }

    pub async fn put_list(&self, list: &ListWithStats) -> Result<()> {
        self.kv
            .set(tree_name(EntityKind::List), &list.list.id, list)
            .await
    }

    /// 删除清单及其所有条目镜像
    pub async fn remove_list(&self, id: &str) -> Result<()> {
        self.kv.remove(tree_name(EntityKind::List), id).await?;
        for item in self.items(id).await {
            self.kv.remove(tree_name(EntityKind::Item), &item.id).await?;
        }
        Ok(())
    }

    /// 权威拉取后的清空重建：丢弃所有过期条目
    pub async fn replace_all_lists(&self, lists: &[ListWithStats]) -> Result<()> {
        let tree = tree_name(EntityKind::List);
        self.kv.clear(tree).await?;
        for list in lists {
            self.kv.set(tree, &list.list.id, list).await?;
        }
        debug!("清单镜像已重建: {} 条", lists.len());
        Ok(())
    }

    // ============================================================
    // 条目
    // ============================================================

    /// 某清单的条目，按 sort_order 排序；存储不可用时返回空
    pub async fn items(&self, list_id: &str) -> Vec<GroceryItem> {
        match self.kv.scan::<GroceryItem>(tree_name(EntityKind::Item)).await {
            Ok(entries) => {
                let mut items: Vec<GroceryItem> = entries
                    .into_iter()
                    .map(|(_, v)| v)
                    .filter(|item| item.list_id == list_id)
                    .collect();
                items.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.id.cmp(&b.id)));
                items
            }
            Err(e) => {
                warn!("读取条目镜像失败 (list_id={}): {}", list_id, e);
                Vec::new()
            }
        }
    }

    pub async fn item(&self, id: &str) -> Option<GroceryItem> {
        match self.kv.get(tree_name(EntityKind::Item), id).await {
            Ok(value) => value,
            Err(e) => {
                warn!("读取条目镜像失败 (id={}): {}", id, e);
                None
            }
        }
    }

    pub async fn put_item(&self, item: &GroceryItem) -> Result<()> {
        self.kv.set(tree_name(EntityKind::Item), &item.id, item).await
    }

    pub async fn remove_item(&self, id: &str) -> Result<()> {
        self.kv.remove(tree_name(EntityKind::Item), id).await?;
        Ok(())
    }

    /// 权威拉取后重建某清单的条目镜像（不动其它清单的条目）
    pub async fn replace_items_for_list(&self, list_id: &str, items: &[GroceryItem]) -> Result<()> {
        for existing in self.items(list_id).await {
            self.kv
                .remove(tree_name(EntityKind::Item), &existing.id)
                .await?;
        }
        for item in items {
            self.put_item(item).await?;
        }
        debug!("条目镜像已重建: list_id={}, {} 条", list_id, items.len());
        Ok(())
    }

    // ============================================================
    // 分类
    // ============================================================

    /// 所有分类，按 sort_order 排序；存储不可用时返回空
    pub async fn categories(&self) -> Vec<Category> {
        match self
            .kv
            .scan::<Category>(tree_name(EntityKind::Category))
            .await
        {
            Ok(entries) => {
                let mut categories: Vec<Category> =
                    entries.into_iter().map(|(_, v)| v).collect();
                categories.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.id.cmp(&b.id)));
                categories
            }
            Err(e) => {
                warn!("读取分类镜像失败，降级为空: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn put_category(&self, category: &Category) -> Result<()> {
        self.kv
            .set(tree_name(EntityKind::Category), &category.id, category)
            .await
    }

    pub async fn remove_category(&self, id: &str) -> Result<()> {
        self.kv.remove(tree_name(EntityKind::Category), id).await?;
        Ok(())
    }

    pub async fn replace_all_categories(&self, categories: &[Category]) -> Result<()> {
        let tree = tree_name(EntityKind::Category);
        self.kv.clear(tree).await?;
        for category in categories {
            self.kv.set(tree, &category.id, category).await?;
        }
        Ok(())
    }

    // ============================================================
    // 派生统计
    // ============================================================

    /// 重算某清单的统计字段并写回镜像
    ///
    /// totalPrice = Σ price × quantity（只计有价格的条目），
    /// 与服务端聚合 SQL 一致。每次条目级变更后调用，统计字段
    /// 从不独立维护。
    pub async fn recompute_list_stats(&self, list_id: &str) -> Result<Option<ListWithStats>> {
        let Some(mut list) = self.list(list_id).await else {
            return Ok(None);
        };

        let items = self.items(list_id).await;
        list.total_items = items.len() as i64;
        list.checked_items = items.iter().filter(|i| i.checked).count() as i64;
        list.total_price = items
            .iter()
            .filter_map(|i| i.price.map(|p| p * i.quantity as f64))
            .sum();

        self.put_list(&list).await?;
        Ok(Some(list))
    }

    // ============================================================
    // 同步元信息
    // ============================================================

    /// 读取同步元信息；首次调用时生成设备 ID 并持久化
    pub async fn load_sync_meta(&self) -> Result<SyncMeta> {
        if let Some(meta) = self.kv.get::<_, SyncMeta>(META_TREE, META_KEY).await? {
            return Ok(meta);
        }
        let meta = SyncMeta::new();
        self.kv.set(META_TREE, META_KEY, &meta).await?;
        Ok(meta)
    }

    /// 记录一次成功同步的时间
    pub async fn mark_synced(&self) -> Result<()> {
        let mut meta = self.load_sync_meta().await?;
        meta.mark_synced();
        self.kv.set(META_TREE, META_KEY, &meta).await
    }
}
