//! 进程内事件总线

use async_trait::async_trait;
use futures::future::join_all;
use infrastructure_common::{
    EventBus, EventBusError, LifecycleEvent, LifecycleEventKind, LifecycleHandler, WorkerKind,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, warn};

const DEFAULT_OBSERVER_CAPACITY: usize = 64;

/// 进程内事件总线
///
/// `emit` 并发调用该事件的全部处理器并等待其完成，随后把事件广播给观察者。
pub struct InProcessEventBus {
    handlers: RwLock<HashMap<LifecycleEventKind, Vec<LifecycleHandler>>>,
    observers: broadcast::Sender<LifecycleEvent>,
    closed: AtomicBool,
}

impl InProcessEventBus {
    /// 创建事件总线
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_OBSERVER_CAPACITY)
    }

    /// 指定观察者通道容量
    pub fn with_capacity(capacity: usize) -> Self {
        let (observers, _) = broadcast::channel(capacity);
        Self {
            handlers: RwLock::new(HashMap::new()),
            observers,
            closed: AtomicBool::new(false),
        }
    }

    /// 订阅已发布事件的只读通知
    pub fn observe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.observers.subscribe()
    }

    /// 关闭总线，之后的发布都会失败
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl Default for InProcessEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InProcessEventBus {
    async fn emit(
        &self,
        event: LifecycleEventKind,
        worker: WorkerKind,
    ) -> Result<(), EventBusError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EventBusError::Closed);
        }

        let handlers = self
            .handlers
            .read()
            .get(&event)
            .cloned()
            .unwrap_or_default();
        let total = handlers.len();
        debug!(event = %event, worker = %worker, handlers = total, "发布生命周期事件");

        let failures: Vec<String> = join_all(handlers.iter().map(|handler| handler(worker)))
            .await
            .into_iter()
            .filter_map(Result::err)
            .collect();

        // 没有观察者时发送失败，可以忽略
        let _ = self.observers.send(LifecycleEvent::new(event, worker));

        if failures.is_empty() {
            Ok(())
        } else {
            warn!(event = %event, failed = failures.len(), "事件处理器执行失败");
            Err(EventBusError::HandlerFailed {
                event: event.as_str().to_string(),
                failed: failures.len(),
                total,
                message: failures.join("; "),
            })
        }
    }

    fn subscribe(&self, event: LifecycleEventKind, handler: LifecycleHandler) {
        self.handlers.write().entry(event).or_default().push(handler);
    }

    fn subscriber_count(&self, event: LifecycleEventKind) -> usize {
        self.handlers.read().get(&event).map_or(0, Vec::len)
    }
}
