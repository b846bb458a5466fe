//! 传输层模块 - REST API 调用与结果分类
//!
//! 本模块提供：
//! - `ApiTransport` trait：每个待同步动作按 `(method, path, payload)` 执行
//! - `HttpTransport`：基于 reqwest 的实现，带连接/请求超时
//! - 结果分类：在传输边界产生显式 `ErrorKind`，队列逻辑只看分类，
//!   不解析响应体、不嗅探错误字符串

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GroceriesSDKError, Result};

/// 错误类别（由同步引擎穷尽消费）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// 网络不可达 / 无响应 → 暂停本轮 drain，队列原样保留
    Network,
    /// 409 版本冲突 → 服务端为准，丢弃动作，不重试
    Conflict,
    /// 其它 4xx → 重试也不会成功，丢弃动作
    ClientError,
    /// 5xx → 指数退避重试
    ServerError,
}

/// 传输层错误，携带显式分类
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    /// HTTP 状态码（网络失败时无值）
    pub status: Option<u16>,
    pub message: String,
}

impl ApiError {
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Network,
            status: None,
            message: message.into(),
        }
    }

    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            409 => ErrorKind::Conflict,
            400..=499 => ErrorKind::ClientError,
            _ => ErrorKind::ServerError,
        };
        Self {
            kind,
            status: Some(status),
            message: message.into(),
        }
    }
}

impl From<ApiError> for GroceriesSDKError {
    fn from(error: ApiError) -> Self {
        match error.status {
            Some(status) => GroceriesSDKError::Api {
                status,
                message: error.message,
            },
            None => GroceriesSDKError::Transport(error.message),
        }
    }
}

/// 成功响应（2xx）
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    /// 响应体（尽力解析为 JSON，失败时为 Null；队列逻辑不依赖它）
    pub body: serde_json::Value,
}

/// API 传输接口
///
/// 同步引擎通过它执行待同步动作；测试注入脚本化实现。
#[async_trait]
pub trait ApiTransport: Send + Sync + fmt::Debug {
    async fn execute(
        &self,
        method: &str,
        path: &str,
        payload: Option<&serde_json::Value>,
    ) -> std::result::Result<ApiResponse, ApiError>;
}

/// HTTP 客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpClientConfig {
    /// 连接超时（秒）
    pub connect_timeout_secs: Option<u64>,
    /// 请求超时（秒）
    pub request_timeout_secs: Option<u64>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: Some(5),
            request_timeout_secs: Some(30),
        }
    }
}

/// 基于 reqwest 的 HTTP 传输
#[derive(Debug)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// 创建新的 HTTP 传输
    pub fn new(config: &HttpClientConfig, base_url: &str) -> Result<Self> {
        let mut builder = Client::builder();

        if let Some(timeout) = config.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(timeout));
        }

        if let Some(timeout) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        let client = builder
            .build()
            .map_err(|e| GroceriesSDKError::Config(format!("创建 HTTP 客户端失败: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ApiTransport for HttpTransport {
    async fn execute(
        &self,
        method: &str,
        path: &str,
        payload: Option<&serde_json::Value>,
    ) -> std::result::Result<ApiResponse, ApiError> {
        let method = reqwest::Method::from_bytes(method.as_bytes()).map_err(|_| ApiError {
            kind: ErrorKind::ClientError,
            status: None,
            message: format!("无效的 HTTP 方法: {}", method),
        })?;

        let url = format!("{}{}", self.base_url, path);
        debug!("执行 API 请求: {} {}", method, url);

        let mut request = self.client.request(method, &url);
        if let Some(body) = payload {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::network(format!("请求发送失败: {}", e)))?;

        let status = response.status().as_u16();
        let body = response.json::<serde_json::Value>().await.unwrap_or(serde_json::Value::Null);

        if (200..300).contains(&status) {
            Ok(ApiResponse { status, body })
        } else {
            let message = body
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
                .unwrap_or_else(|| format!("HTTP 状态码 {}", status));
            Err(ApiError::from_status(status, message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(ApiError::from_status(409, "conflict").kind, ErrorKind::Conflict);
        assert_eq!(ApiError::from_status(400, "bad").kind, ErrorKind::ClientError);
        assert_eq!(ApiError::from_status(404, "missing").kind, ErrorKind::ClientError);
        assert_eq!(ApiError::from_status(500, "boom").kind, ErrorKind::ServerError);
        assert_eq!(ApiError::from_status(503, "busy").kind, ErrorKind::ServerError);
        assert_eq!(ApiError::network("unreachable").kind, ErrorKind::Network);
        assert!(ApiError::network("unreachable").status.is_none());
    }

    #[test]
    fn api_error_converts_to_sdk_error() {
        let with_status: GroceriesSDKError = ApiError::from_status(404, "not found").into();
        assert!(matches!(with_status, GroceriesSDKError::Api { status: 404, .. }));

        let network: GroceriesSDKError = ApiError::network("dns failure").into();
        assert!(matches!(network, GroceriesSDKError::Transport(_)));
    }
}
