//! 同步模块 - 待同步队列的 drain 处理
//!
//! ## NOTE: Engine 不做合并
//!
//! SyncEngine 的冲突策略是无条件服务端为准（409 即丢弃，不协商）。
//! 重试 / 退避 / 单飞由引擎自身负责，镜像与视图的收敛由
//! SDK 层在 drain 完成后通过权威重拉实现。

pub mod engine;

pub use engine::{SyncEngine, SyncEngineConfig};
