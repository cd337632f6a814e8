//! 事件总线接口

use crate::lifecycle::{LifecycleEventKind, WorkerKind};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use thiserror::Error;

/// 事件总线错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    #[error("事件 {event} 的 {failed}/{total} 个订阅者处理失败: {message}")]
    HandlerFailed {
        event: String,
        failed: usize,
        total: usize,
        message: String,
    },

    #[error("事件总线已关闭")]
    Closed,
}

/// 生命周期事件处理器
///
/// 返回的 future 完成后才视为该订阅者处理完毕。
pub type LifecycleHandler =
    Arc<dyn Fn(WorkerKind) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// 事件总线 trait
///
/// `emit` 会等待所有订阅者处理完成后才返回。
#[async_trait]
pub trait EventBus: Send + Sync {
    /// 发布生命周期事件
    async fn emit(&self, event: LifecycleEventKind, worker: WorkerKind)
        -> Result<(), EventBusError>;

    /// 订阅生命周期事件
    fn subscribe(&self, event: LifecycleEventKind, handler: LifecycleHandler);

    /// 指定事件的订阅者数量
    fn subscriber_count(&self, event: LifecycleEventKind) -> usize;
}
