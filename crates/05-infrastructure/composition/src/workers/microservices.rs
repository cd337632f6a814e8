//! 后台任务进程
//!
//! 没有网络入口，只登记周期任务；任务由外部事件触发。队列在启动事件发布后
//! 由 `JobService` 恢复。

use super::{lifecycle_context, name_logger, specialize};
use crate::catalog::SharedComponents;
use crate::scheduler::SchedulerRegistry;
use di_abstractions::{ComponentLookupExt, ProviderDefinition};
use di_impl::ComponentRegistryImpl;
use infrastructure_common::{
    InfrastructureResult, LifecycleContext, ProviderKind, WorkerKind, WorkerLifecycle,
};
use std::sync::Arc;

/// 后台任务进程的专属提供者
pub fn definitions() -> Vec<ProviderDefinition> {
    vec![ProviderDefinition::instance(
        ProviderKind::Scheduler,
        Arc::new(SchedulerRegistry::new()),
    )]
}

/// 已组合的后台任务进程
pub struct MicroservicesWorker {
    registry: Arc<ComponentRegistryImpl>,
    context: LifecycleContext,
    tasks: Arc<SchedulerRegistry>,
}

impl MicroservicesWorker {
    /// 在共享组件目录之上组合后台任务进程
    pub async fn compose(shared: &SharedComponents) -> InfrastructureResult<Self> {
        let registry = specialize(shared, WorkerKind::Microservices, definitions()).await?;
        name_logger(&registry, WorkerKind::Microservices)?;

        Ok(Self {
            context: lifecycle_context(&registry)?,
            tasks: registry.resolve::<SchedulerRegistry>()?,
            registry,
        })
    }

    /// 专属注册表
    pub fn registry(&self) -> &Arc<ComponentRegistryImpl> {
        &self.registry
    }

    /// 周期任务注册表
    pub fn tasks(&self) -> &Arc<SchedulerRegistry> {
        &self.tasks
    }
}

impl WorkerLifecycle for MicroservicesWorker {
    fn worker_kind(&self) -> WorkerKind {
        WorkerKind::Microservices
    }

    fn lifecycle_context(&self) -> &LifecycleContext {
        &self.context
    }
}
