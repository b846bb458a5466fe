//! 数据实体定义 - 与服务端 JSON 协议一致
//!
//! 服务端所有实体字段为 camelCase，主键为 26 位可排序 ULID，
//! `version` 为服务端乐观并发令牌（每次成功变更自增）。

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// 实体类型（镜像存储的命名空间受控枚举）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    List,
    Item,
    Category,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Item => "item",
            Self::Category => "category",
        }
    }
}

impl FromStr for EntityKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "list" => Ok(Self::List),
            "item" => Ok(Self::Item),
            "category" => Ok(Self::Category),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 购物清单
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroceryList {
    pub id: String,
    pub name: String,
    /// 服务端乐观并发版本号
    pub version: i64,
    /// 创建时间（UTC 毫秒时间戳）
    pub created_at: i64,
    /// 更新时间（UTC 毫秒时间戳）
    pub updated_at: i64,
}

/// 带派生统计的清单（totalItems / checkedItems / totalPrice）
///
/// 统计字段永远由镜像中的条目重新计算，不单独维护，防止漂移。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListWithStats {
    #[serde(flatten)]
    pub list: GroceryList,
    pub total_items: i64,
    pub checked_items: i64,
    pub total_price: f64,
}

impl ListWithStats {
    /// 从裸清单创建（统计为零，待 recompute 填充）
    pub fn from_list(list: GroceryList) -> Self {
        Self {
            list,
            total_items: 0,
            checked_items: 0,
            total_price: 0.0,
        }
    }
}

/// 清单条目
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroceryItem {
    pub id: String,
    pub list_id: String,
    pub name: String,
    pub quantity: i64,
    pub unit: Option<String>,
    pub category_id: String,
    pub checked: bool,
    pub checked_by: Option<String>,
    pub checked_by_name: Option<String>,
    pub price: Option<f64>,
    pub store: Option<String>,
    pub sort_order: i64,
    pub version: i64,
}

/// 商品分类
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub color: String,
    pub sort_order: i64,
    pub is_default: bool,
}

/// 同步元信息（仅作记录，冲突策略不消费；见 DESIGN.md）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMeta {
    /// 最近一次成功同步时间（UTC 毫秒时间戳）
    pub last_sync_at: Option<i64>,
    /// 设备 ID（首次初始化时生成）
    pub device_id: String,
}

impl SyncMeta {
    pub fn new() -> Self {
        Self {
            last_sync_at: None,
            device_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn mark_synced(&mut self) {
        self.last_sync_at = Some(Utc::now().timestamp_millis());
    }
}

impl Default for SyncMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// 服务端标准响应包装 `{ data, error }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<ApiEnvelopeError>,
}

/// 服务端错误体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelopeError {
    pub code: String,
    pub message: String,
}

// ============================================================
// 请求体（与服务端 handler 一致）
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateListRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateListRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateItemRequest {
    pub name: String,
    pub quantity: i64,
    pub unit: Option<String>,
    pub category_id: String,
    pub price: Option<f64>,
    pub store: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderItemsRequest {
    pub item_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCategoryRequest {
    pub name: String,
    pub icon: String,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCategoryRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i64>,
}
