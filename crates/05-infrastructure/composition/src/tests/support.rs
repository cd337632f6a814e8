//! 测试用协作者

use crate::events::InProcessEventBus;
use async_trait::async_trait;
use infrastructure_common::{
    ConnectionError, ConnectionErrorHandler, ConnectionHandle, ConnectionOptions,
    DatabaseConnection, EventBus, EventBusError, LifecycleEventKind, LifecycleHandler,
    PersistenceLayer, TelemetryError, TelemetryRegistrar, TelemetrySetupOptions, WorkerKind,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 按调用顺序记录协作者调用
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

/// 记录发布的事件，处理器交给真实的进程内总线执行
pub struct RecordingBus {
    journal: Journal,
    inner: InProcessEventBus,
    fail_on: Option<LifecycleEventKind>,
}

impl RecordingBus {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            inner: InProcessEventBus::new(),
            fail_on: None,
        }
    }

    pub fn failing_on(journal: Journal, event: LifecycleEventKind) -> Self {
        Self {
            fail_on: Some(event),
            ..Self::new(journal)
        }
    }
}

#[async_trait]
impl EventBus for RecordingBus {
    async fn emit(
        &self,
        event: LifecycleEventKind,
        worker: WorkerKind,
    ) -> Result<(), EventBusError> {
        self.journal.record(format!("emit:{}:{}", event, worker));
        if self.fail_on == Some(event) {
            return Err(EventBusError::Closed);
        }
        self.inner.emit(event, worker).await
    }

    fn subscribe(&self, event: LifecycleEventKind, handler: LifecycleHandler) {
        self.inner.subscribe(event, handler);
    }

    fn subscriber_count(&self, event: LifecycleEventKind) -> usize {
        self.inner.subscriber_count(event)
    }
}

/// 记录遥测注册与关闭
pub struct RecordingTelemetry {
    journal: Journal,
    options: Mutex<Option<TelemetrySetupOptions>>,
    fail_setup: bool,
}

impl RecordingTelemetry {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            options: Mutex::new(None),
            fail_setup: false,
        }
    }

    pub fn failing(journal: Journal) -> Self {
        Self {
            fail_setup: true,
            ..Self::new(journal)
        }
    }

    pub fn options(&self) -> Option<TelemetrySetupOptions> {
        self.options.lock().clone()
    }
}

#[async_trait]
impl TelemetryRegistrar for RecordingTelemetry {
    fn setup(&self, options: TelemetrySetupOptions) -> Result<(), TelemetryError> {
        self.journal.record("setup");
        if self.fail_setup {
            return Err(TelemetryError::SetupFailed {
                message: "exporter unavailable".to_string(),
            });
        }
        *self.options.lock() = Some(options);
        Ok(())
    }

    async fn teardown(&self) -> Result<(), TelemetryError> {
        self.journal.record("teardown");
        Ok(())
    }
}

/// 不访问数据库的持久化层，保存收到的连接错误回调
#[derive(Default)]
pub struct StubPersistence {
    handler: Mutex<Option<ConnectionErrorHandler>>,
    connection: Arc<StubConnection>,
}

impl StubPersistence {
    pub fn handler(&self) -> Option<ConnectionErrorHandler> {
        self.handler.lock().clone()
    }

    pub fn connection(&self) -> Arc<StubConnection> {
        self.connection.clone()
    }
}

#[async_trait]
impl PersistenceLayer for StubPersistence {
    async fn configure(
        &self,
        _options: ConnectionOptions,
        on_connection_error: ConnectionErrorHandler,
    ) -> Result<ConnectionHandle, ConnectionError> {
        *self.handler.lock() = Some(on_connection_error);
        Ok(self.connection.clone())
    }
}

#[derive(Default)]
pub struct StubConnection {
    closed: AtomicBool,
}

#[async_trait]
impl DatabaseConnection for StubConnection {
    async fn ping(&self) -> Result<(), ConnectionError> {
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
