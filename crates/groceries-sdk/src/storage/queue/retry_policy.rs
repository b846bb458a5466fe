//! 重试策略 - 固定退避表 + 次数上限
//!
//! 只有 5xx（瞬时服务端错误）走重试；409 与其它 4xx 直接丢弃，
//! 网络失败暂停整轮 drain、不消耗重试次数。

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transport::ErrorKind;

/// 重试策略配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// 最大重试次数
    pub max_retries: u32,
    /// 退避表（秒），超出表长取末值
    pub backoff_secs: Vec<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff_secs: vec![1, 2, 5, 10, 30],
        }
    }
}

impl RetryPolicy {
    /// 该错误类别是否走重试路径
    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        match kind {
            ErrorKind::ServerError => true,
            // 冲突与客户端错误重试也不会成功；网络失败由 drain 暂停处理
            ErrorKind::Conflict | ErrorKind::ClientError | ErrorKind::Network => false,
        }
    }

    /// 重试次数是否已耗尽（在自增之前检查）
    pub fn is_exhausted(&self, retry_count: u32) -> bool {
        retry_count >= self.max_retries
    }

    /// 第 retry_count 次失败之后的退避时长（retry_count 已自增，从 1 起）
    pub fn delay_after(&self, retry_count: u32) -> Duration {
        debug_assert!(retry_count >= 1);
        let index = (retry_count.saturating_sub(1) as usize).min(self.backoff_secs.len() - 1);
        Duration::from_secs(self.backoff_secs[index])
    }
}
