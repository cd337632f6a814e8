//! 工作进程组合
//!
//! 每个工作进程在共享组件目录之上构建自己的专属注册表。专属注册表只能新增能力，
//! 不能覆盖共享组件。

pub mod admin;
pub mod api;
pub mod microservices;

pub use admin::{AdminCommand, AdminWorker, CommandRegistry};
pub use api::{
    ApiError, ApiRequest, ApiResponse, ApiWorker, AuthGuard, ErrorInterceptor,
    FileUploadInterceptor, LoggingInterceptor, RequestContext, RequestContextFactory,
    RequestInterceptor, RequestPipeline, RouteTable, UploadedFile,
};
pub use microservices::MicroservicesWorker;

use crate::catalog::SharedComponents;
use crate::scheduler::RecurringTaskScheduler;
use di_abstractions::{ComponentLookupExt, ProviderDefinition};
use di_impl::{ComponentRegistryImpl, RegistryBuilder};
use infrastructure_common::{
    EventBus, InfrastructureResult, LifecycleContext, LoggerRepository, TelemetryRegistrar,
    TelemetrySetupOptions, WorkerKind, WorkerLifecycle,
};
use std::sync::Arc;
use tracing::info;

/// 已组合的工作进程
///
/// 只有 API 与后台任务进程实现生命周期契约；管理命令进程是一次性的命令执行环境。
pub enum WorkerProfile {
    /// 对外 API 服务
    Api(ApiWorker),
    /// 后台任务进程
    Microservices(MicroservicesWorker),
    /// 管理命令进程
    Admin(AdminWorker),
}

impl WorkerProfile {
    /// 在共享组件目录之上组合指定类型的工作进程
    pub async fn compose(
        kind: WorkerKind,
        shared: &SharedComponents,
    ) -> InfrastructureResult<Self> {
        let profile = match kind {
            WorkerKind::Api => Self::Api(ApiWorker::compose(shared).await?),
            WorkerKind::Microservices => {
                Self::Microservices(MicroservicesWorker::compose(shared).await?)
            }
            WorkerKind::Admin => Self::Admin(AdminWorker::compose(shared).await?),
        };
        info!(
            worker = %kind,
            components = profile.registry().len(),
            "工作进程组合完成"
        );
        Ok(profile)
    }

    /// 工作进程类型
    pub fn kind(&self) -> WorkerKind {
        match self {
            Self::Api(_) => WorkerKind::Api,
            Self::Microservices(_) => WorkerKind::Microservices,
            Self::Admin(_) => WorkerKind::Admin,
        }
    }

    /// 专属注册表
    pub fn registry(&self) -> &Arc<ComponentRegistryImpl> {
        match self {
            Self::Api(worker) => worker.registry(),
            Self::Microservices(worker) => worker.registry(),
            Self::Admin(worker) => worker.registry(),
        }
    }

    /// 生命周期契约，管理命令进程返回 `None`
    pub fn lifecycle(&self) -> Option<&dyn WorkerLifecycle> {
        match self {
            Self::Api(worker) => Some(worker as &dyn WorkerLifecycle),
            Self::Microservices(worker) => Some(worker as &dyn WorkerLifecycle),
            Self::Admin(_) => None,
        }
    }

    /// 周期任务调度器，只有 API 服务自带调度
    pub fn scheduler(&self) -> Option<&Arc<RecurringTaskScheduler>> {
        match self {
            Self::Api(worker) => Some(worker.scheduler()),
            _ => None,
        }
    }

    /// 管理命令进程
    pub fn as_admin(&self) -> Option<&AdminWorker> {
        match self {
            Self::Admin(worker) => Some(worker),
            _ => None,
        }
    }

    /// API 服务
    pub fn as_api(&self) -> Option<&ApiWorker> {
        match self {
            Self::Api(worker) => Some(worker),
            _ => None,
        }
    }
}

impl std::fmt::Debug for WorkerProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerProfile")
            .field("kind", &self.kind())
            .field("registry", self.registry())
            .finish()
    }
}

/// 在共享组件目录之上构建专属注册表
///
/// 连接错误钩子的句柄始终绑定在共享组件目录上，专属注册表被丢弃或
/// 组合中途失败都不会影响钩子找到数据库服务。
async fn specialize(
    shared: &SharedComponents,
    kind: WorkerKind,
    definitions: Vec<ProviderDefinition>,
) -> InfrastructureResult<Arc<ComponentRegistryImpl>> {
    let mut builder = RegistryBuilder::specialize(shared.registry().clone(), kind);
    builder.register_all(definitions)?;
    Ok(builder.build().await?)
}

/// 生命周期协作者，插桩目标为共享组件加专属组件
fn lifecycle_context(registry: &ComponentRegistryImpl) -> InfrastructureResult<LifecycleContext> {
    Ok(LifecycleContext::new(
        registry.resolve::<dyn EventBus>()?,
        registry.resolve::<dyn TelemetryRegistrar>()?,
        TelemetrySetupOptions::from_classes(registry.classes()),
    ))
}

/// 设置日志应用名称
fn name_logger(registry: &ComponentRegistryImpl, kind: WorkerKind) -> InfrastructureResult<()> {
    registry.resolve::<dyn LoggerRepository>()?.set_app_name(kind);
    Ok(())
}
