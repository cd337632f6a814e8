//! 共享组件目录
//!
//! 所有工作进程共用的仓储、服务与外部协作者。目录在进程启动时构建一次，
//! 各工作进程的专属注册表以它为父注册表。

use crate::events::InProcessEventBus;
use crate::logging::TracingLoggerRepository;
use crate::persistence::{ConnectionResiliencyHook, PgPersistenceLayer};
use crate::telemetry::OtelTelemetryRegistrar;
use chrono::{DateTime, Utc};
use config_abstractions::{AppConfig, QueueDefinition};
use dashmap::DashMap;
use di_abstractions::{ProviderDefinition, ResolveContext};
use di_impl::{ComponentRegistryImpl, RegistryBuilder, RegistryHandle};
use futures::FutureExt;
use infrastructure_common::{
    ConnectionError, ConnectionHandle, DatabaseLifecycle, DependencyError, DependencyResult,
    EventBus, InfrastructureResult, LifecycleEventKind, LoggerRepository, PersistenceLayer,
    ProviderKind, TelemetryRegistrar, WorkerKind,
};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 外部协作者
///
/// 以既有实例的形式注册进共享目录。
#[derive(Clone)]
pub struct SharedCollaborators {
    /// 事件总线
    pub event_bus: Arc<dyn EventBus>,
    /// 遥测注册器
    pub telemetry: Arc<dyn TelemetryRegistrar>,
    /// 日志仓储
    pub logger: Arc<dyn LoggerRepository>,
    /// 持久化层
    pub persistence: Arc<dyn PersistenceLayer>,
}

impl SharedCollaborators {
    /// 按配置创建默认协作者
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            event_bus: Arc::new(InProcessEventBus::new()),
            telemetry: Arc::new(OtelTelemetryRegistrar::new(config.telemetry.clone())),
            logger: Arc::new(TracingLoggerRepository::new()),
            persistence: Arc::new(PgPersistenceLayer::new()),
        }
    }
}

impl std::fmt::Debug for SharedCollaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedCollaborators").finish_non_exhaustive()
    }
}

/// 已构建的共享组件目录
#[derive(Debug, Clone)]
pub struct SharedComponents {
    registry: Arc<ComponentRegistryImpl>,
    handle: RegistryHandle,
}

impl SharedComponents {
    /// 构建共享组件目录
    ///
    /// 连接错误钩子先于注册表创建，注册表构建完成后才绑定句柄。
    pub async fn assemble(
        config: AppConfig,
        collaborators: SharedCollaborators,
    ) -> InfrastructureResult<Self> {
        let handle = RegistryHandle::new();

        let mut builder = RegistryBuilder::shared();
        builder.register_all(shared_definitions(config, collaborators, handle.clone()))?;
        let registry = builder.build().await?;
        handle.bind(&registry);

        info!(components = registry.len(), "共享组件目录构建完成");
        Ok(Self { registry, handle })
    }

    /// 共享注册表
    pub fn registry(&self) -> &Arc<ComponentRegistryImpl> {
        &self.registry
    }

    /// 连接错误钩子使用的注册表句柄
    pub fn handle(&self) -> &RegistryHandle {
        &self.handle
    }
}

/// 共享目录中的全部提供者声明
pub fn shared_definitions(
    config: AppConfig,
    collaborators: SharedCollaborators,
    handle: RegistryHandle,
) -> Vec<ProviderDefinition> {
    vec![
        ProviderDefinition::instance::<dyn EventBus>(
            ProviderKind::Collaborator,
            collaborators.event_bus,
        ),
        ProviderDefinition::instance::<dyn TelemetryRegistrar>(
            ProviderKind::Collaborator,
            collaborators.telemetry,
        ),
        ProviderDefinition::instance::<dyn LoggerRepository>(
            ProviderKind::Collaborator,
            collaborators.logger,
        ),
        ProviderDefinition::instance::<dyn PersistenceLayer>(
            ProviderKind::Collaborator,
            collaborators.persistence,
        ),
        ProviderDefinition::instance(
            ProviderKind::Collaborator,
            Arc::new(ConnectionResiliencyHook::new(handle)),
        ),
        ProviderDefinition::instance(
            ProviderKind::Repository,
            Arc::new(ConfigRepository::new(config)),
        ),
        ProviderDefinition::new::<DatabaseRepository, _, _>(
            ProviderKind::Repository,
            DatabaseRepository::build,
        )
        .depends_on::<ConfigRepository>()
        .depends_on::<dyn PersistenceLayer>()
        .depends_on::<ConnectionResiliencyHook>(),
        ProviderDefinition::new::<JobRepository, _, _>(
            ProviderKind::Repository,
            JobRepository::build,
        )
        .depends_on::<ConfigRepository>(),
        ProviderDefinition::new::<DatabaseService, _, _>(
            ProviderKind::Service,
            DatabaseService::build,
        )
        .depends_on::<ConfigRepository>()
        .depends_on::<DatabaseRepository>()
        .depends_on::<dyn LoggerRepository>(),
        ProviderDefinition::new::<JobService, _, _>(ProviderKind::Service, JobService::build)
            .depends_on::<JobRepository>()
            .depends_on::<dyn EventBus>(),
        ProviderDefinition::alias::<dyn DatabaseLifecycle, DatabaseService, _>(|service| {
            service as Arc<dyn DatabaseLifecycle>
        }),
    ]
}

/// 进程配置仓储
#[derive(Debug, Clone)]
pub struct ConfigRepository {
    config: AppConfig,
}

impl ConfigRepository {
    /// 创建配置仓储
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// 完整配置
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// 数据库仓储
///
/// 持有持久化层返回的连接句柄。
pub struct DatabaseRepository {
    connection: ConnectionHandle,
}

impl DatabaseRepository {
    async fn build(ctx: ResolveContext) -> DependencyResult<Arc<Self>> {
        let config = ctx.resolve::<ConfigRepository>()?;
        let persistence = ctx.resolve::<dyn PersistenceLayer>()?;
        let hook = ctx.resolve::<ConnectionResiliencyHook>()?;

        let connection = persistence
            .configure((&config.config().database).into(), hook.handler())
            .await
            .map_err(|e| DependencyError::creation_failed("DatabaseRepository", e))?;

        Ok(Arc::new(Self::new(connection)))
    }

    /// 以既有连接创建仓储
    pub fn new(connection: ConnectionHandle) -> Self {
        Self { connection }
    }

    /// 连接句柄
    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    /// 检查连接
    pub async fn ping(&self) -> Result<(), ConnectionError> {
        self.connection.ping().await
    }

    /// 关闭连接
    pub async fn close(&self) {
        if !self.connection.is_closed() {
            self.connection.close().await;
            info!("数据库连接已关闭");
        }
    }

    /// 连接是否已关闭
    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }
}

/// 队列操作错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// 队列不存在
    #[error("队列不存在: {name}")]
    UnknownQueue { name: String },
}

/// 队列中的任务
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    /// 任务 ID
    pub id: Uuid,
    /// 所属队列
    pub queue: String,
    /// 任务负载
    pub payload: serde_json::Value,
    /// 入队时间
    pub enqueued_at: DateTime<Utc>,
}

/// 队列状态快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    /// 队列名称
    pub name: String,
    /// 并发数
    pub concurrency: usize,
    /// 是否暂停
    pub paused: bool,
    /// 等待中的任务数
    pub pending: usize,
}

#[derive(Debug)]
struct QueueState {
    concurrency: usize,
    paused: bool,
    pending: VecDeque<JobRecord>,
}

/// 任务队列仓储
///
/// 队列来自配置，创建时全部处于暂停状态，直到有工作进程恢复它们。
#[derive(Debug)]
pub struct JobRepository {
    queues: DashMap<String, QueueState>,
    order: Vec<String>,
}

impl JobRepository {
    async fn build(ctx: ResolveContext) -> DependencyResult<Arc<Self>> {
        let config = ctx.resolve::<ConfigRepository>()?;
        Ok(Arc::new(Self::new(&config.config().queue.queues)))
    }

    /// 按队列定义创建仓储
    pub fn new(definitions: &[QueueDefinition]) -> Self {
        let queues = DashMap::new();
        let mut order = Vec::with_capacity(definitions.len());
        for definition in definitions {
            queues.insert(
                definition.name.clone(),
                QueueState {
                    concurrency: definition.concurrency,
                    paused: true,
                    pending: VecDeque::new(),
                },
            );
            order.push(definition.name.clone());
        }
        debug!(queues = order.len(), "注册任务队列");
        Self { queues, order }
    }

    /// 队列名称（配置顺序）
    pub fn queue_names(&self) -> &[String] {
        &self.order
    }

    /// 任务入队
    pub fn enqueue(&self, queue: &str, payload: serde_json::Value) -> Result<Uuid, QueueError> {
        let mut state = self.queue_mut(queue)?;
        let record = JobRecord {
            id: Uuid::new_v4(),
            queue: queue.to_string(),
            payload,
            enqueued_at: Utc::now(),
        };
        let id = record.id;
        state.pending.push_back(record);
        Ok(id)
    }

    /// 取出下一个任务，队列暂停时返回 `None`
    pub fn dequeue(&self, queue: &str) -> Result<Option<JobRecord>, QueueError> {
        let mut state = self.queue_mut(queue)?;
        if state.paused {
            return Ok(None);
        }
        Ok(state.pending.pop_front())
    }

    /// 暂停全部队列
    pub fn pause_all(&self) {
        self.queues.iter_mut().for_each(|mut q| q.paused = true);
        info!("任务队列已暂停");
    }

    /// 恢复全部队列
    pub fn resume_all(&self) {
        self.queues.iter_mut().for_each(|mut q| q.paused = false);
        info!("任务队列已恢复");
    }

    /// 队列是否暂停
    pub fn is_paused(&self, queue: &str) -> Result<bool, QueueError> {
        self.queues
            .get(queue)
            .map(|q| q.paused)
            .ok_or_else(|| QueueError::UnknownQueue {
                name: queue.to_string(),
            })
    }

    /// 各队列状态
    pub fn snapshot(&self) -> Vec<QueueStatus> {
        self.order
            .iter()
            .filter_map(|name| {
                self.queues.get(name).map(|q| QueueStatus {
                    name: name.clone(),
                    concurrency: q.concurrency,
                    paused: q.paused,
                    pending: q.pending.len(),
                })
            })
            .collect()
    }

    fn queue_mut(
        &self,
        queue: &str,
    ) -> Result<dashmap::mapref::one::RefMut<'_, String, QueueState>, QueueError> {
        self.queues
            .get_mut(queue)
            .ok_or_else(|| QueueError::UnknownQueue {
                name: queue.to_string(),
            })
    }
}

/// 数据库状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseStatus {
    /// 累计连接错误数
    pub connection_failures: u64,
    /// 已发起的重连探测次数
    pub reconnect_attempts: u64,
    /// 是否有等待中的重连探测
    pub reconnect_pending: bool,
    /// 最近一次连接错误
    pub last_error: Option<String>,
    /// 连接是否已关闭
    pub closed: bool,
}

/// 数据库服务
///
/// 负责连接生命周期：记录连接错误，并在连接断开时安排一次重连探测。
pub struct DatabaseService {
    database: Arc<DatabaseRepository>,
    logger: Arc<dyn LoggerRepository>,
    reconnect_delay: Duration,
    failures: AtomicU64,
    reconnect_attempts: Arc<AtomicU64>,
    reconnect_pending: Arc<AtomicBool>,
    last_error: RwLock<Option<ConnectionError>>,
}

impl DatabaseService {
    async fn build(ctx: ResolveContext) -> DependencyResult<Arc<Self>> {
        let config = ctx.resolve::<ConfigRepository>()?;
        Ok(Arc::new(Self::new(
            ctx.resolve::<DatabaseRepository>()?,
            ctx.resolve::<dyn LoggerRepository>()?,
            config.config().database.reconnect_delay(),
        )))
    }

    /// 创建数据库服务
    pub fn new(
        database: Arc<DatabaseRepository>,
        logger: Arc<dyn LoggerRepository>,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            database,
            logger,
            reconnect_delay,
            failures: AtomicU64::new(0),
            reconnect_attempts: Arc::new(AtomicU64::new(0)),
            reconnect_pending: Arc::new(AtomicBool::new(false)),
            last_error: RwLock::new(None),
        }
    }

    /// 最近一次连接错误
    pub fn last_error(&self) -> Option<ConnectionError> {
        self.last_error.read().clone()
    }

    /// 累计连接错误数
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }

    /// 当前状态
    pub fn status(&self) -> DatabaseStatus {
        DatabaseStatus {
            connection_failures: self.failure_count(),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::SeqCst),
            reconnect_pending: self.reconnect_pending.load(Ordering::SeqCst),
            last_error: self.last_error().map(|e| e.to_string()),
            closed: self.database.is_closed(),
        }
    }

    fn schedule_reconnect(&self) {
        // 同一时间只保留一次探测
        if self.reconnect_pending.swap(true, Ordering::SeqCst) {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.reconnect_pending.store(false, Ordering::SeqCst);
            warn!("当前线程没有异步运行时，跳过重连探测");
            return;
        };

        let database = self.database.clone();
        let logger = self.logger.clone();
        let pending = self.reconnect_pending.clone();
        let attempts = self.reconnect_attempts.clone();
        let delay = self.reconnect_delay;
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            attempts.fetch_add(1, Ordering::SeqCst);
            match database.ping().await {
                Ok(()) => logger.info("数据库重连成功"),
                Err(e) => logger.error(&format!("数据库重连失败: {}", e)),
            }
            pending.store(false, Ordering::SeqCst);
        });
    }
}

impl DatabaseLifecycle for DatabaseService {
    fn handle_connection_error(&self, error: ConnectionError) {
        self.failures.fetch_add(1, Ordering::SeqCst);
        self.logger
            .warn(&format!("数据库连接错误 ({}): {}", error.kind, error.message));

        let reconnect = error.requires_reconnect() && !self.database.is_closed();
        *self.last_error.write() = Some(error);
        if reconnect {
            self.schedule_reconnect();
        }
    }
}

/// 任务服务
///
/// 订阅生命周期事件：后台任务进程启动后恢复队列，任何工作进程关闭时暂停队列。
pub struct JobService {
    jobs: Arc<JobRepository>,
}

impl JobService {
    async fn build(ctx: ResolveContext) -> DependencyResult<Arc<Self>> {
        let jobs = ctx.resolve::<JobRepository>()?;
        let event_bus = ctx.resolve::<dyn EventBus>()?;
        Ok(Arc::new(Self::new(jobs, event_bus.as_ref())))
    }

    /// 创建任务服务并订阅生命周期事件
    pub fn new(jobs: Arc<JobRepository>, event_bus: &dyn EventBus) -> Self {
        let on_bootstrap = jobs.clone();
        event_bus.subscribe(
            LifecycleEventKind::Bootstrap,
            Arc::new(move |worker: WorkerKind| {
                let jobs = on_bootstrap.clone();
                async move {
                    if worker == WorkerKind::Microservices {
                        jobs.resume_all();
                    }
                    Ok::<(), String>(())
                }
                .boxed()
            }),
        );

        let on_shutdown = jobs.clone();
        event_bus.subscribe(
            LifecycleEventKind::Shutdown,
            Arc::new(move |_worker: WorkerKind| {
                let jobs = on_shutdown.clone();
                async move {
                    jobs.pause_all();
                    Ok::<(), String>(())
                }
                .boxed()
            }),
        );

        Self { jobs }
    }

    /// 任务队列仓储
    pub fn jobs(&self) -> &Arc<JobRepository> {
        &self.jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infrastructure_common::ConnectionErrorKind;
    use serde_json::json;

    fn queues() -> Vec<QueueDefinition> {
        vec![QueueDefinition::new("alpha", 2), QueueDefinition::new("beta", 1)]
    }

    #[test]
    fn queues_start_paused_and_keep_config_order() {
        let jobs = JobRepository::new(&queues());
        jobs.enqueue("alpha", json!({ "asset": 1 })).unwrap();

        assert_eq!(jobs.queue_names(), ["alpha", "beta"]);
        assert!(jobs.is_paused("beta").unwrap());
        assert_eq!(jobs.dequeue("alpha").unwrap(), None);

        jobs.resume_all();
        let job = jobs.dequeue("alpha").unwrap().unwrap();
        assert_eq!(job.payload, json!({ "asset": 1 }));

        let snapshot = jobs.snapshot();
        assert_eq!(snapshot[0].pending, 0);
        assert!(!snapshot[1].paused);
    }

    #[test]
    fn unknown_queue_is_reported() {
        let jobs = JobRepository::new(&queues());
        assert_eq!(
            jobs.enqueue("gamma", json!(null)),
            Err(QueueError::UnknownQueue {
                name: "gamma".to_string()
            })
        );
    }

    #[tokio::test]
    async fn job_service_follows_lifecycle_events() {
        let bus = InProcessEventBus::new();
        let jobs = Arc::new(JobRepository::new(&queues()));
        let _service = JobService::new(jobs.clone(), &bus);

        bus.emit(LifecycleEventKind::Bootstrap, WorkerKind::Api)
            .await
            .unwrap();
        assert!(jobs.is_paused("alpha").unwrap());

        bus.emit(LifecycleEventKind::Bootstrap, WorkerKind::Microservices)
            .await
            .unwrap();
        assert!(!jobs.is_paused("alpha").unwrap());

        bus.emit(LifecycleEventKind::Shutdown, WorkerKind::Microservices)
            .await
            .unwrap();
        assert!(jobs.is_paused("alpha").unwrap());
    }

    #[tokio::test]
    async fn database_service_records_errors() {
        let connection = PgPersistenceLayer::new()
            .configure(
                (&config_abstractions::DatabaseConfig::default()).into(),
                Arc::new(|_error: ConnectionError| {}),
            )
            .await
            .unwrap();
        let service = DatabaseService::new(
            Arc::new(DatabaseRepository::new(connection)),
            Arc::new(TracingLoggerRepository::new()),
            Duration::from_secs(3600),
        );

        let error = ConnectionError::new(ConnectionErrorKind::BrokenSocket, "reset by peer");
        service.handle_connection_error(error.clone());
        service.handle_connection_error(error.clone());

        let status = service.status();
        assert_eq!(service.last_error(), Some(error));
        assert_eq!(status.connection_failures, 2);
        assert!(status.reconnect_pending);
        assert_eq!(status.reconnect_attempts, 0);
    }

    #[derive(Default)]
    struct RecordingLogger {
        lines: parking_lot::Mutex<Vec<String>>,
    }

    impl LoggerRepository for RecordingLogger {
        fn set_app_name(&self, _worker: WorkerKind) {}

        fn app_name(&self) -> Option<WorkerKind> {
            None
        }

        fn info(&self, message: &str) {
            self.lines.lock().push(format!("info:{}", message));
        }

        fn warn(&self, message: &str) {
            self.lines.lock().push(format!("warn:{}", message));
        }

        fn error(&self, message: &str) {
            self.lines.lock().push(format!("error:{}", message));
        }
    }

    struct HealthyConnection;

    #[async_trait::async_trait]
    impl infrastructure_common::DatabaseConnection for HealthyConnection {
        async fn ping(&self) -> Result<(), ConnectionError> {
            Ok(())
        }

        async fn close(&self) {}

        fn is_closed(&self) -> bool {
            false
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_probe_reports_through_logger() {
        let logger = Arc::new(RecordingLogger::default());
        let service = DatabaseService::new(
            Arc::new(DatabaseRepository::new(Arc::new(HealthyConnection))),
            logger.clone(),
            Duration::from_millis(10),
        );

        service.handle_connection_error(ConnectionError::new(
            ConnectionErrorKind::PoolClosed,
            "pool closed",
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let lines = logger.lines.lock().clone();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("warn:"));
        assert_eq!(lines[1], "info:数据库重连成功");
        assert_eq!(service.status().reconnect_attempts, 1);
        assert!(!service.status().reconnect_pending);
    }
}
