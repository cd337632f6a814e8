//! 工作进程宿主构建器

use crate::catalog::{SharedCollaborators, SharedComponents};
use crate::host::WorkerHost;
use crate::logging::init_logging;
use crate::workers::WorkerProfile;
use config_abstractions::{AppConfig, ConfigProvider, ConfigValidator};
use config_impl::AppConfigValidator;
use infrastructure_common::{
    EventBus, InfrastructureResult, LoggerRepository, PersistenceLayer, TelemetryRegistrar,
    WorkerKind,
};
use std::sync::Arc;
use tracing::info;

/// 工作进程宿主构建器
///
/// 使用建造者模式组装共享组件目录与工作进程。未显式注入的协作者按配置创建默认实现。
pub struct WorkerHostBuilder {
    /// 进程配置
    config: AppConfig,
    /// 工作进程类型，未指定时使用配置中的值
    kind: Option<WorkerKind>,
    /// 是否验证配置
    validation_enabled: bool,
    /// 是否初始化日志
    logging_enabled: bool,
    event_bus: Option<Arc<dyn EventBus>>,
    telemetry: Option<Arc<dyn TelemetryRegistrar>>,
    logger: Option<Arc<dyn LoggerRepository>>,
    persistence: Option<Arc<dyn PersistenceLayer>>,
}

impl WorkerHostBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            kind: None,
            validation_enabled: true,
            logging_enabled: false, // 默认不初始化日志，避免测试中重复初始化
            event_bus: None,
            telemetry: None,
            logger: None,
            persistence: None,
        }
    }

    /// 使用指定配置
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// 从配置提供者加载配置
    pub fn load_config(mut self, provider: &dyn ConfigProvider) -> InfrastructureResult<Self> {
        info!("从配置提供者加载配置: {}", provider.name());
        self.config = provider.load()?;
        Ok(self)
    }

    /// 指定工作进程类型
    pub fn worker(mut self, kind: WorkerKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// 启用或禁用配置验证
    pub fn enable_validation(mut self, enabled: bool) -> Self {
        self.validation_enabled = enabled;
        self
    }

    /// 按配置中的日志设置初始化日志
    pub fn with_logging(mut self) -> Self {
        self.logging_enabled = true;
        self
    }

    /// 注入事件总线
    pub fn with_event_bus(mut self, event_bus: Arc<dyn EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// 注入遥测注册器
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetryRegistrar>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// 注入日志仓储
    pub fn with_logger(mut self, logger: Arc<dyn LoggerRepository>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// 注入持久化层
    pub fn with_persistence(mut self, persistence: Arc<dyn PersistenceLayer>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// 构建宿主
    ///
    /// 共享组件目录只构建一次，然后在其上组合所选的工作进程。
    pub async fn build(self) -> InfrastructureResult<WorkerHost> {
        if self.logging_enabled {
            init_logging(&self.config.logging)?;
        }

        let kind = self.kind.unwrap_or(self.config.worker.kind);
        info!(worker = %kind, "开始构建工作进程宿主");

        if self.validation_enabled {
            AppConfigValidator::new().ensure_valid(&self.config)?;
        }

        let defaults = SharedCollaborators::from_config(&self.config);
        let collaborators = SharedCollaborators {
            event_bus: self.event_bus.unwrap_or(defaults.event_bus),
            telemetry: self.telemetry.unwrap_or(defaults.telemetry),
            logger: self.logger.unwrap_or(defaults.logger),
            persistence: self.persistence.unwrap_or(defaults.persistence),
        };

        let shared = SharedComponents::assemble(self.config.clone(), collaborators).await?;
        let profile = WorkerProfile::compose(kind, &shared).await?;

        info!(worker = %kind, "工作进程宿主构建完成");
        Ok(WorkerHost::new(self.config, shared, profile))
    }
}

impl Default for WorkerHostBuilder {
    fn default() -> Self {
        Self::new()
    }
}
