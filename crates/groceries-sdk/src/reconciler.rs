//! 乐观协调器 - 内存视图缓存与投机变更
//!
//! 每个变更操作在任何 I/O 之前：先快照可见集合，再把投机变换
//! 同步应用到内存视图和本地镜像（含统计重算），然后才走网络或
//! 入队。直接调用失败时按快照整体回滚，不做部分回滚；落定后由
//! SDK 层权威重拉收敛。
//!
//! 视图锁是 `parking_lot::RwLock`，所有锁内操作都是纯内存的
//! run-to-completion，不跨 await 持锁。

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use crate::entities::{Category, GroceryItem, GroceryList, ListWithStats};
use crate::storage::mirror::MirrorStore;

/// 可见集合的完整快照（深拷贝，回滚时整体恢复）
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    lists: Vec<ListWithStats>,
    items: HashMap<String, Vec<GroceryItem>>,
    categories: Vec<Category>,
}

/// 乐观协调器
#[derive(Debug)]
pub struct CacheReconciler {
    mirror: Arc<MirrorStore>,
    lists: RwLock<Vec<ListWithStats>>,
    items: RwLock<HashMap<String, Vec<GroceryItem>>>,
    categories: RwLock<Vec<Category>>,
}

impl CacheReconciler {
    pub fn new(mirror: Arc<MirrorStore>) -> Self {
        Self {
            mirror,
            lists: RwLock::new(Vec::new()),
            items: RwLock::new(HashMap::new()),
            categories: RwLock::new(Vec::new()),
        }
    }

    /// 从镜像恢复视图（初始化时调用；镜像不可用时视图为空）
    pub async fn hydrate(&self) {
        let lists = self.mirror.lists().await;
        let categories = self.mirror.categories().await;

        let mut items = HashMap::new();
        for list in &lists {
            items.insert(list.list.id.clone(), self.mirror.items(&list.list.id).await);
        }

        *self.lists.write() = lists;
        *self.items.write() = items;
        *self.categories.write() = categories;
    }

    // ============================================================
    // 读取（克隆返回，调用方拿到的是一致快照）
    // ============================================================

    pub fn lists(&self) -> Vec<ListWithStats> {
        self.lists.read().clone()
    }

    pub fn list(&self, id: &str) -> Option<ListWithStats> {
        self.lists.read().iter().find(|l| l.list.id == id).cloned()
    }

    pub fn items(&self, list_id: &str) -> Vec<GroceryItem> {
        self.items.read().get(list_id).cloned().unwrap_or_default()
    }

    pub fn categories(&self) -> Vec<Category> {
        self.categories.read().clone()
    }

    // ============================================================
    // 快照 / 回滚
    // ============================================================

    pub fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            lists: self.lists.read().clone(),
            items: self.items.read().clone(),
            categories: self.categories.read().clone(),
        }
    }

    /// 按快照整体恢复视图（不动镜像：镜像随下一次权威拉取收敛）
    pub fn restore(&self, snapshot: CacheSnapshot) {
        *self.lists.write() = snapshot.lists;
        *self.items.write() = snapshot.items;
        *self.categories.write() = snapshot.categories;
    }

    // ============================================================
    // 权威数据灌入（成功拉取后，清空重建）
    // ============================================================

    pub async fn seed_lists(&self, lists: Vec<ListWithStats>) {
        if let Err(e) = self.mirror.replace_all_lists(&lists).await {
            warn!("清单镜像重建失败: {}", e);
        }
        *self.lists.write() = lists;
    }

    pub async fn seed_items(&self, list_id: &str, items: Vec<GroceryItem>) {
        if let Err(e) = self.mirror.replace_items_for_list(list_id, &items).await {
            warn!("条目镜像重建失败: {}", e);
        }
        self.items.write().insert(list_id.to_string(), items);
    }

    pub async fn seed_categories(&self, categories: Vec<Category>) {
        if let Err(e) = self.mirror.replace_all_categories(&categories).await {
            warn!("分类镜像重建失败: {}", e);
        }
        *self.categories.write() = categories;
    }

    // ============================================================
    // 投机变更（视图 + 镜像，统计即时重算）
    // ============================================================

    pub async fn apply_list_created(&self, list: &GroceryList) {
        let with_stats = ListWithStats::from_list(list.clone());
        self.lists.write().push(with_stats.clone());
        self.items.write().insert(list.id.clone(), Vec::new());

        if let Err(e) = self.mirror.put_list(&with_stats).await {
            warn!("镜像写入失败 (list {}): {}", list.id, e);
        }
    }

    pub async fn apply_list_renamed(&self, id: &str, name: &str) {
        let updated = {
            let mut lists = self.lists.write();
            match lists.iter_mut().find(|l| l.list.id == id) {
                Some(list) => {
                    list.list.name = name.to_string();
                    Some(list.clone())
                }
                None => None,
            }
        };

        if let Some(list) = updated {
            if let Err(e) = self.mirror.put_list(&list).await {
                warn!("镜像写入失败 (list {}): {}", id, e);
            }
        }
    }

    pub async fn apply_list_deleted(&self, id: &str) {
        self.lists.write().retain(|l| l.list.id != id);
        self.items.write().remove(id);

        if let Err(e) = self.mirror.remove_list(id).await {
            warn!("镜像删除失败 (list {}): {}", id, e);
        }
    }

    pub async fn apply_item_created(&self, item: &GroceryItem) {
        {
            let mut items = self.items.write();
            items
                .entry(item.list_id.clone())
                .or_default()
                .push(item.clone());
        }

        if let Err(e) = self.mirror.put_item(item).await {
            warn!("镜像写入失败 (item {}): {}", item.id, e);
        }
        self.recompute_stats(&item.list_id).await;
    }

    pub async fn apply_item_updated(&self, item: &GroceryItem) {
        {
            let mut items = self.items.write();
            if let Some(list_items) = items.get_mut(&item.list_id) {
                if let Some(existing) = list_items.iter_mut().find(|i| i.id == item.id) {
                    *existing = item.clone();
                }
            }
        }

        if let Err(e) = self.mirror.put_item(item).await {
            warn!("镜像写入失败 (item {}): {}", item.id, e);
        }
        self.recompute_stats(&item.list_id).await;
    }

    pub async fn apply_item_deleted(&self, list_id: &str, item_id: &str) {
        {
            let mut items = self.items.write();
            if let Some(list_items) = items.get_mut(list_id) {
                list_items.retain(|i| i.id != item_id);
            }
        }

        if let Err(e) = self.mirror.remove_item(item_id).await {
            warn!("镜像删除失败 (item {}): {}", item_id, e);
        }
        self.recompute_stats(list_id).await;
    }

    /// 翻转勾选状态，返回翻转后的条目
    pub async fn apply_item_toggled(&self, list_id: &str, item_id: &str) -> Option<GroceryItem> {
        let toggled = {
            let mut items = self.items.write();
            let list_items = items.get_mut(list_id)?;
            let item = list_items.iter_mut().find(|i| i.id == item_id)?;
            item.checked = !item.checked;
            if !item.checked {
                item.checked_by = None;
                item.checked_by_name = None;
            }
            Some(item.clone())
        };

        if let Some(ref item) = toggled {
            if let Err(e) = self.mirror.put_item(item).await {
                warn!("镜像写入失败 (item {}): {}", item_id, e);
            }
            self.recompute_stats(list_id).await;
        }
        toggled
    }

    /// 按给定顺序重写 sort_order（顺序是 UI 偏好，不触发统计重算）
    pub async fn apply_items_reordered(&self, list_id: &str, ordered_ids: &[String]) {
        let reordered = {
            let mut items = self.items.write();
            match items.get_mut(list_id) {
                Some(list_items) => {
                    for item in list_items.iter_mut() {
                        if let Some(position) = ordered_ids.iter().position(|id| *id == item.id) {
                            item.sort_order = position as i64;
                        }
                    }
                    list_items.sort_by(|a, b| a.sort_order.cmp(&b.sort_order));
                    list_items.clone()
                }
                None => Vec::new(),
            }
        };

        for item in &reordered {
            if let Err(e) = self.mirror.put_item(item).await {
                warn!("镜像写入失败 (item {}): {}", item.id, e);
            }
        }
    }

    pub async fn apply_category_created(&self, category: &Category) {
        self.categories.write().push(category.clone());
        if let Err(e) = self.mirror.put_category(category).await {
            warn!("镜像写入失败 (category {}): {}", category.id, e);
        }
    }

    pub async fn apply_category_updated(&self, category: &Category) {
        {
            let mut categories = self.categories.write();
            if let Some(existing) = categories.iter_mut().find(|c| c.id == category.id) {
                *existing = category.clone();
            }
        }
        if let Err(e) = self.mirror.put_category(category).await {
            warn!("镜像写入失败 (category {}): {}", category.id, e);
        }
    }

    pub async fn apply_category_deleted(&self, id: &str) {
        self.categories.write().retain(|c| c.id != id);
        if let Err(e) = self.mirror.remove_category(id).await {
            warn!("镜像删除失败 (category {}): {}", id, e);
        }
    }

    /// 统计重算：视图按内存条目算，镜像走 `recompute_list_stats`
    async fn recompute_stats(&self, list_id: &str) {
        {
            let items = self.items.read();
            let list_items = items.get(list_id).cloned().unwrap_or_default();
            drop(items);

            let mut lists = self.lists.write();
            if let Some(list) = lists.iter_mut().find(|l| l.list.id == list_id) {
                list.total_items = list_items.len() as i64;
                list.checked_items = list_items.iter().filter(|i| i.checked).count() as i64;
                list.total_price = list_items
                    .iter()
                    .filter_map(|i| i.price.map(|p| p * i.quantity as f64))
                    .sum();
            }
        }

        if let Err(e) = self.mirror.recompute_list_stats(list_id).await {
            warn!("镜像统计重算失败 (list {}): {}", list_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::kv::KvStore;
    use tempfile::TempDir;

    fn list(id: &str, name: &str) -> GroceryList {
        GroceryList {
            id: id.to_string(),
            name: name.to_string(),
            version: 1,
            created_at: 1_700_000_000_000,
            updated_at: 1_700_000_000_000,
        }
    }

    fn item(id: &str, list_id: &str, price: Option<f64>, quantity: i64) -> GroceryItem {
        GroceryItem {
            id: id.to_string(),
            list_id: list_id.to_string(),
            name: format!("item-{}", id),
            quantity,
            unit: None,
            category_id: "10OTHER00000000000000000000".to_string(),
            checked: false,
            checked_by: None,
            checked_by_name: None,
            price,
            store: None,
            sort_order: 0,
            version: 1,
        }
    }

    async fn new_reconciler() -> (TempDir, CacheReconciler) {
        let temp_dir = TempDir::new().unwrap();
        let kv = Arc::new(KvStore::new(temp_dir.path()).await.unwrap());
        let mirror = Arc::new(MirrorStore::new(kv));
        (temp_dir, CacheReconciler::new(mirror))
    }

    #[tokio::test]
    async fn test_optimistic_item_create_updates_stats() {
        let (_guard, reconciler) = new_reconciler().await;

        reconciler.apply_list_created(&list("L1", "采购")).await;
        reconciler.apply_item_created(&item("I1", "L1", Some(3.0), 2)).await;
        reconciler.apply_item_created(&item("I2", "L1", None, 1)).await;

        let view = reconciler.list("L1").unwrap();
        assert_eq!(view.total_items, 2);
        assert!((view.total_price - 6.0).abs() < f64::EPSILON);
        assert_eq!(reconciler.items("L1").len(), 2);
    }

    #[tokio::test]
    async fn test_snapshot_restore_is_exact() {
        let (_guard, reconciler) = new_reconciler().await;

        reconciler.apply_list_created(&list("L1", "采购")).await;
        reconciler.apply_item_created(&item("I1", "L1", Some(1.5), 1)).await;

        let snapshot = reconciler.snapshot();

        // 投机变更一通
        reconciler.apply_item_created(&item("I2", "L1", Some(9.9), 3)).await;
        reconciler.apply_list_renamed("L1", "改名").await;
        let _ = reconciler.apply_item_toggled("L1", "I1").await;

        reconciler.restore(snapshot);

        let view = reconciler.list("L1").unwrap();
        assert_eq!(view.list.name, "采购");
        assert_eq!(view.total_items, 1);
        let items = reconciler.items("L1");
        assert_eq!(items.len(), 1);
        assert!(!items[0].checked);
    }

    #[tokio::test]
    async fn test_toggle_flips_checked_and_stats() {
        let (_guard, reconciler) = new_reconciler().await;

        reconciler.apply_list_created(&list("L1", "采购")).await;
        reconciler.apply_item_created(&item("I1", "L1", None, 1)).await;

        let toggled = reconciler.apply_item_toggled("L1", "I1").await.unwrap();
        assert!(toggled.checked);
        assert_eq!(reconciler.list("L1").unwrap().checked_items, 1);

        let toggled = reconciler.apply_item_toggled("L1", "I1").await.unwrap();
        assert!(!toggled.checked);
        assert_eq!(reconciler.list("L1").unwrap().checked_items, 0);
    }

    #[tokio::test]
    async fn test_reorder_rewrites_sort_order() {
        let (_guard, reconciler) = new_reconciler().await;

        reconciler.apply_list_created(&list("L1", "采购")).await;
        for id in ["IA", "IB", "IC"] {
            reconciler.apply_item_created(&item(id, "L1", None, 1)).await;
        }

        let order = vec!["IC".to_string(), "IA".to_string(), "IB".to_string()];
        reconciler.apply_items_reordered("L1", &order).await;

        let ids: Vec<String> = reconciler.items("L1").iter().map(|i| i.id.clone()).collect();
        assert_eq!(ids, order);
    }

    #[tokio::test]
    async fn test_hydrate_restores_view_from_mirror() {
        let temp_dir = TempDir::new().unwrap();
        let kv = Arc::new(KvStore::new(temp_dir.path()).await.unwrap());
        let mirror = Arc::new(MirrorStore::new(kv));

        {
            let reconciler = CacheReconciler::new(mirror.clone());
            reconciler.apply_list_created(&list("L1", "采购")).await;
            reconciler.apply_item_created(&item("I1", "L1", Some(2.0), 1)).await;
        }

        // 新实例从镜像恢复（模拟重启）
        let reconciler = CacheReconciler::new(mirror);
        assert!(reconciler.lists().is_empty());
        reconciler.hydrate().await;
        assert_eq!(reconciler.lists().len(), 1);
        assert_eq!(reconciler.items("L1").len(), 1);
        assert!((reconciler.list("L1").unwrap().total_price - 2.0).abs() < f64::EPSILON);
    }
}
