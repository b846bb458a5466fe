//! 待同步动作定义
//!
//! 每个动作是一条"尚未被服务端确认的变更意图"的持久化记录。
//! 动作 ID 为单调 ULID，字典序即用户意图的因果顺序。

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 变更类型（受控枚举，序列化为点分字符串）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    #[serde(rename = "list.create")]
    ListCreate,
    #[serde(rename = "list.update")]
    ListUpdate,
    #[serde(rename = "list.delete")]
    ListDelete,
    #[serde(rename = "item.create")]
    ItemCreate,
    #[serde(rename = "item.update")]
    ItemUpdate,
    #[serde(rename = "item.delete")]
    ItemDelete,
    #[serde(rename = "item.toggle")]
    ItemToggle,
    #[serde(rename = "item.reorder")]
    ItemReorder,
    #[serde(rename = "category.create")]
    CategoryCreate,
    #[serde(rename = "category.update")]
    CategoryUpdate,
    #[serde(rename = "category.delete")]
    CategoryDelete,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ListCreate => "list.create",
            Self::ListUpdate => "list.update",
            Self::ListDelete => "list.delete",
            Self::ItemCreate => "item.create",
            Self::ItemUpdate => "item.update",
            Self::ItemDelete => "item.delete",
            Self::ItemToggle => "item.toggle",
            Self::ItemReorder => "item.reorder",
            Self::CategoryCreate => "category.create",
            Self::CategoryUpdate => "category.update",
            Self::CategoryDelete => "category.delete",
        }
    }
}

impl FromStr for ActionKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "list.create" => Ok(Self::ListCreate),
            "list.update" => Ok(Self::ListUpdate),
            "list.delete" => Ok(Self::ListDelete),
            "item.create" => Ok(Self::ItemCreate),
            "item.update" => Ok(Self::ItemUpdate),
            "item.delete" => Ok(Self::ItemDelete),
            "item.toggle" => Ok(Self::ItemToggle),
            "item.reorder" => Ok(Self::ItemReorder),
            "category.create" => Ok(Self::CategoryCreate),
            "category.update" => Ok(Self::CategoryUpdate),
            "category.delete" => Ok(Self::CategoryDelete),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 待同步动作
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAction {
    /// 单调 ULID，字典序 = 入队顺序 = 因果顺序
    pub id: String,
    pub kind: ActionKind,
    /// 目标端点（相对路径，如 `/api/lists`）
    pub endpoint: String,
    /// HTTP 方法
    pub method: String,
    /// 请求体（无则为 None）
    pub payload: Option<serde_json::Value>,
    /// 入队时间（UTC 毫秒时间戳）
    pub created_at: i64,
    /// 已失败重试次数
    pub retry_count: u32,
    /// 最近一次失败原因
    pub last_error: Option<String>,
}

impl PendingAction {
    pub fn new(
        id: String,
        kind: ActionKind,
        endpoint: String,
        method: String,
        payload: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id,
            kind,
            endpoint,
            method,
            payload,
            created_at: Utc::now().timestamp_millis(),
            retry_count: 0,
            last_error: None,
        }
    }

    /// 记录一次可重试的失败
    pub fn record_failure(&mut self, error: String) {
        self.retry_count += 1;
        self.last_error = Some(error);
    }

    /// 日志用摘要
    pub fn details(&self) -> String {
        format!(
            "PendingAction(id={}, kind={}, {} {}, retry={})",
            self.id, self.kind, self.method, self.endpoint, self.retry_count
        )
    }
}
