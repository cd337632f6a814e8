//! 各测试文件共用的记录型协作者
#![allow(dead_code)]

use async_trait::async_trait;
use config_abstractions::AppConfig;
use infrastructure_common::{
    ConnectionError, ConnectionErrorHandler, ConnectionHandle, ConnectionOptions,
    DatabaseConnection, EventBus, EventBusError, LifecycleEventKind, LifecycleHandler,
    PersistenceLayer, TelemetryError, TelemetryRegistrar, TelemetrySetupOptions, WorkerKind,
};
use infrastructure_composition::{SharedCollaborators, SharedComponents, TracingLoggerRepository};
use parking_lot::Mutex;
use std::sync::Arc;

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

/// 只记录发布，不执行订阅者
pub struct RecordingBus(pub Journal);

#[async_trait]
impl EventBus for RecordingBus {
    async fn emit(
        &self,
        event: LifecycleEventKind,
        worker: WorkerKind,
    ) -> Result<(), EventBusError> {
        self.0.record(format!("emit:{}:{}", event, worker));
        Ok(())
    }

    fn subscribe(&self, _event: LifecycleEventKind, _handler: LifecycleHandler) {}

    fn subscriber_count(&self, _event: LifecycleEventKind) -> usize {
        0
    }
}

pub struct RecordingTelemetry {
    journal: Journal,
    pub received: Mutex<Vec<TelemetrySetupOptions>>,
}

impl RecordingTelemetry {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            received: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TelemetryRegistrar for RecordingTelemetry {
    fn setup(&self, options: TelemetrySetupOptions) -> Result<(), TelemetryError> {
        self.journal.record("setup");
        self.received.lock().push(options);
        Ok(())
    }

    async fn teardown(&self) -> Result<(), TelemetryError> {
        self.journal.record("teardown");
        Ok(())
    }
}

#[derive(Default)]
pub struct StubPersistence {
    pub handler: Mutex<Option<ConnectionErrorHandler>>,
    pub configure_calls: Mutex<usize>,
}

#[async_trait]
impl PersistenceLayer for StubPersistence {
    async fn configure(
        &self,
        _options: ConnectionOptions,
        on_connection_error: ConnectionErrorHandler,
    ) -> Result<ConnectionHandle, ConnectionError> {
        *self.configure_calls.lock() += 1;
        *self.handler.lock() = Some(on_connection_error);
        Ok(Arc::new(IdleConnection))
    }
}

pub struct IdleConnection;

#[async_trait]
impl DatabaseConnection for IdleConnection {
    async fn ping(&self) -> Result<(), ConnectionError> {
        Ok(())
    }

    async fn close(&self) {}

    fn is_closed(&self) -> bool {
        false
    }
}

/// 共享目录与记录型协作者
pub struct Harness {
    pub journal: Journal,
    pub telemetry: Arc<RecordingTelemetry>,
    pub persistence: Arc<StubPersistence>,
    pub shared: SharedComponents,
}

impl Harness {
    pub async fn assemble() -> anyhow::Result<Self> {
        let journal = Journal::default();
        let telemetry = Arc::new(RecordingTelemetry::new(journal.clone()));
        let persistence = Arc::new(StubPersistence::default());

        let collaborators = SharedCollaborators {
            event_bus: Arc::new(RecordingBus(journal.clone())),
            telemetry: telemetry.clone(),
            logger: Arc::new(TracingLoggerRepository::new()),
            persistence: persistence.clone(),
        };
        let shared = SharedComponents::assemble(AppConfig::default(), collaborators).await?;

        Ok(Self {
            journal,
            telemetry,
            persistence,
            shared,
        })
    }
}
