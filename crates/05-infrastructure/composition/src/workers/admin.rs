//! 管理命令进程
//!
//! 一次性的命令执行环境：不实现生命周期契约，不发布启动或关闭事件，
//! 也不设置日志应用名称。

use super::specialize;
use crate::catalog::{DatabaseService, JobRepository, SharedComponents};
use crate::scheduler::SchedulerRegistry;
use async_trait::async_trait;
use di_abstractions::{ComponentLookupExt, ProviderDefinition};
use di_impl::ComponentRegistryImpl;
use infrastructure_common::{
    DependencyError, InfrastructureError, InfrastructureResult, ProviderKind, WorkerKind,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// 管理命令
#[async_trait]
pub trait AdminCommand: Send + Sync {
    /// 命令名称
    fn name(&self) -> &str;

    /// 命令说明
    fn description(&self) -> &str;

    /// 执行命令
    async fn execute(&self, args: &[String]) -> InfrastructureResult<Value>;
}

/// 列出任务队列
pub struct ListQueuesCommand {
    jobs: Arc<JobRepository>,
}

impl ListQueuesCommand {
    /// 创建命令
    pub fn new(jobs: Arc<JobRepository>) -> Self {
        Self { jobs }
    }
}

#[async_trait]
impl AdminCommand for ListQueuesCommand {
    fn name(&self) -> &str {
        "list-queues"
    }

    fn description(&self) -> &str {
        "列出任务队列及其状态"
    }

    async fn execute(&self, _args: &[String]) -> InfrastructureResult<Value> {
        serde_json::to_value(self.jobs.snapshot()).map_err(|e| InfrastructureError::CommandFailed {
            command: self.name().to_string(),
            message: e.to_string(),
        })
    }
}

/// 查看数据库连接状态
pub struct DatabaseStatusCommand {
    database: Arc<DatabaseService>,
}

impl DatabaseStatusCommand {
    /// 创建命令
    pub fn new(database: Arc<DatabaseService>) -> Self {
        Self { database }
    }
}

#[async_trait]
impl AdminCommand for DatabaseStatusCommand {
    fn name(&self) -> &str {
        "database-status"
    }

    fn description(&self) -> &str {
        "显示数据库连接错误统计"
    }

    async fn execute(&self, _args: &[String]) -> InfrastructureResult<Value> {
        serde_json::to_value(self.database.status()).map_err(|e| {
            InfrastructureError::CommandFailed {
                command: self.name().to_string(),
                message: e.to_string(),
            }
        })
    }
}

/// 命令注册表
#[derive(Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, Arc<dyn AdminCommand>>,
}

impl CommandRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册命令，同名命令以后者为准
    pub fn register(&mut self, command: Arc<dyn AdminCommand>) {
        self.commands.insert(command.name().to_string(), command);
    }

    /// 命令名称（字典序）
    pub fn names(&self) -> Vec<&str> {
        self.commands.keys().map(String::as_str).collect()
    }

    /// 查找命令
    pub fn get(&self, name: &str) -> Option<&Arc<dyn AdminCommand>> {
        self.commands.get(name)
    }

    /// 执行命令
    pub async fn run(&self, name: &str, args: &[String]) -> InfrastructureResult<Value> {
        let command = self
            .get(name)
            .ok_or_else(|| InfrastructureError::CommandFailed {
                command: name.to_string(),
                message: format!("未知命令，可用命令: {}", self.names().join(", ")),
            })?;
        info!(command = name, "执行管理命令");
        command.execute(args).await
    }
}

/// 管理命令进程的专属提供者
pub fn definitions() -> Vec<ProviderDefinition> {
    vec![
        ProviderDefinition::new::<CommandRegistry, _, _>(ProviderKind::Command, |ctx| {
            let jobs = ctx.resolve::<JobRepository>();
            let database = ctx.resolve::<DatabaseService>();
            async move {
                let mut commands = CommandRegistry::new();
                commands.register(Arc::new(ListQueuesCommand::new(jobs?)));
                commands.register(Arc::new(DatabaseStatusCommand::new(database?)));
                Ok::<_, DependencyError>(Arc::new(commands))
            }
        })
        .depends_on::<JobRepository>()
        .depends_on::<DatabaseService>(),
        ProviderDefinition::instance(
            ProviderKind::Scheduler,
            Arc::new(SchedulerRegistry::new()),
        ),
    ]
}

/// 已组合的管理命令进程
pub struct AdminWorker {
    registry: Arc<ComponentRegistryImpl>,
    commands: Arc<CommandRegistry>,
}

impl AdminWorker {
    /// 在共享组件目录之上组合管理命令进程
    pub async fn compose(shared: &SharedComponents) -> InfrastructureResult<Self> {
        let registry = specialize(shared, WorkerKind::Admin, definitions()).await?;
        Ok(Self {
            commands: registry.resolve::<CommandRegistry>()?,
            registry,
        })
    }

    /// 专属注册表
    pub fn registry(&self) -> &Arc<ComponentRegistryImpl> {
        &self.registry
    }

    /// 命令注册表
    pub fn commands(&self) -> &Arc<CommandRegistry> {
        &self.commands
    }

    /// 执行命令
    pub async fn run(&self, name: &str, args: &[String]) -> InfrastructureResult<Value> {
        self.commands.run(name, args).await
    }
}
