//! 离线同步演示
//!
//! 展示完整的离线优先工作流：
//! 断网时变更排队 → 重新联网 → 自动 drain → 权威收敛
//!
//! 演示用内存假服务器实现 `ApiTransport`，用可手动切换的
//! `ConnectivityProvider` 模拟断网/联网，不需要真实后端。

use std::sync::Arc;

use async_trait::async_trait;
use groceries_sdk::{
    ApiError, ApiResponse, ApiTransport, ConnectivityEvent, ConnectivityProvider,
    ConnectivityStatus, GroceriesConfig, GroceriesSDK, Result,
};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time::{sleep, Duration};

/// 可手动切换的连接提供者
#[derive(Debug)]
struct DemoConnectivity {
    status: Arc<RwLock<ConnectivityStatus>>,
    sender: broadcast::Sender<ConnectivityEvent>,
}

impl DemoConnectivity {
    fn new(initial: ConnectivityStatus) -> Self {
        let (sender, _) = broadcast::channel(16);
        Self {
            status: Arc::new(RwLock::new(initial)),
            sender,
        }
    }

    async fn set_status(&self, new_status: ConnectivityStatus) {
        let old_status = {
            let mut status = self.status.write().await;
            let old = *status;
            *status = new_status;
            old
        };
        let _ = self.sender.send(ConnectivityEvent {
            old_status,
            new_status,
            timestamp: chrono::Utc::now().timestamp_millis() as u64,
        });
    }
}

#[async_trait]
impl ConnectivityProvider for DemoConnectivity {
    async fn current_status(&self) -> ConnectivityStatus {
        *self.status.read().await
    }

    async fn start_monitoring(&self) -> Result<broadcast::Receiver<ConnectivityEvent>> {
        Ok(self.sender.subscribe())
    }

    async fn stop_monitoring(&self) {}
}

/// 内存假服务器：POST 创建清单时分配服务端 ID 和版本号
#[derive(Debug, Default)]
struct FakeServer {
    lists: Mutex<Vec<serde_json::Value>>,
    next_id: Mutex<u64>,
}

#[async_trait]
impl ApiTransport for FakeServer {
    async fn execute(
        &self,
        method: &str,
        path: &str,
        payload: Option<&serde_json::Value>,
    ) -> std::result::Result<ApiResponse, ApiError> {
        println!("    [服务端] {} {}", method, path);
        match (method, path) {
            ("POST", "/api/lists") => {
                let name = payload
                    .and_then(|p| p.get("name"))
                    .and_then(|n| n.as_str())
                    .unwrap_or("")
                    .to_string();
                let mut next_id = self.next_id.lock().await;
                *next_id += 1;
                // 服务端自己的 26 位 ULID 风格主键
                let id = format!("01SRV{:021}", *next_id);
                let now = chrono::Utc::now().timestamp_millis();
                let list = serde_json::json!({
                    "id": id,
                    "name": name,
                    "version": 1,
                    "createdAt": now,
                    "updatedAt": now,
                    "totalItems": 0,
                    "checkedItems": 0,
                    "totalPrice": 0.0
                });
                self.lists.lock().await.push(list.clone());
                Ok(ApiResponse {
                    status: 201,
                    body: serde_json::json!({ "data": list }),
                })
            }
            ("GET", "/api/lists") => {
                let lists = self.lists.lock().await.clone();
                Ok(ApiResponse {
                    status: 200,
                    body: serde_json::json!({ "data": lists }),
                })
            }
            _ => Ok(ApiResponse {
                status: 200,
                body: serde_json::json!({ "data": null }),
            }),
        }
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("\n🚀 离线同步演示\n");
    println!("====================================\n");

    let data_dir = std::env::temp_dir().join("groceries_offline_demo");
    let _ = std::fs::remove_dir_all(&data_dir);

    let config = GroceriesConfig::builder()
        .data_dir(&data_dir)
        .base_url("http://demo.invalid")
        .build();

    let transport = Arc::new(FakeServer::default());
    let provider = Arc::new(DemoConnectivity::new(ConnectivityStatus::Offline));

    println!("📦 正在初始化 SDK（当前离线）...");
    let sdk = GroceriesSDK::initialize_with(config, transport, provider.clone()).await?;
    println!("✅ SDK 初始化完成\n");

    // 订阅事件流，打印同步过程
    let mut events = sdk.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("    [事件] {}", event.event_type());
        }
    });

    // 离线创建两个清单：立即可见，动作排队
    println!("【离线阶段】");
    let weekly = sdk.create_list("每周采购").await?;
    let party = sdk.create_list("周末聚餐").await?;
    println!("  已创建: {} / {}", weekly.name, party.name);
    println!("  本地可见清单数: {}", sdk.lists().len());
    println!("  待同步动作数: {}\n", sdk.pending_count().await);

    // 重新联网：监控器触发 drain，队列按因果顺序回放
    println!("【重新联网】");
    provider.set_status(ConnectivityStatus::Online).await;
    sleep(Duration::from_millis(500)).await;

    let status = sdk.sync_status().await;
    println!("\n【收敛之后】");
    println!("  在线: {}，待同步: {}", status.online, status.pending_count);
    for list in sdk.lists() {
        println!(
            "  清单 {} (id={}, version={})",
            list.list.name, list.list.id, list.list.version
        );
    }

    sdk.shutdown().await?;
    println!("\n✅ 演示结束");
    Ok(())
}
