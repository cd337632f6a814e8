//! 工作进程宿主

use crate::builder::WorkerHostBuilder;
use crate::catalog::{DatabaseRepository, SharedComponents};
use crate::workers::WorkerProfile;
use config_abstractions::AppConfig;
use di_abstractions::{ComponentLookup, ComponentLookupExt};
use di_impl::ComponentRegistryImpl;
use infrastructure_common::{
    InfrastructureError, InfrastructureResult, LifecycleError, WorkerKind,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// 工作进程宿主
///
/// 持有共享组件目录与已组合的工作进程，负责启动、停止以及管理命令的执行。
pub struct WorkerHost {
    config: AppConfig,
    shared: SharedComponents,
    profile: WorkerProfile,
    status: RwLock<WorkerStatus>,
    metrics: RwLock<WorkerMetrics>,
    last_shutdown_error: Mutex<Option<LifecycleError>>,
}

impl WorkerHost {
    /// 创建宿主构建器
    pub fn builder() -> WorkerHostBuilder {
        WorkerHostBuilder::new()
    }

    pub(crate) fn new(config: AppConfig, shared: SharedComponents, profile: WorkerProfile) -> Self {
        let metrics = WorkerMetrics {
            registered_components_count: profile.registry().capabilities().len(),
            ..WorkerMetrics::default()
        };
        Self {
            config,
            shared,
            profile,
            status: RwLock::new(WorkerStatus::Initialized),
            metrics: RwLock::new(metrics),
            last_shutdown_error: Mutex::new(None),
        }
    }

    /// 启动工作进程
    ///
    /// 失败时状态为 `Failed`，不会开始任何主要工作。
    pub async fn start(&self) -> InfrastructureResult<()> {
        let kind = self.kind();
        {
            let mut status = self.status.write().await;
            if *status != WorkerStatus::Initialized {
                return Err(InfrastructureError::BootstrapFailed {
                    message: format!("工作进程无法从 {:?} 状态启动", *status),
                });
            }
            *status = WorkerStatus::Starting;
        }
        info!(worker = %kind, "启动工作进程");
        self.metrics.write().await.start_time = Some(chrono::Utc::now());

        if let Some(lifecycle) = self.profile.lifecycle() {
            if let Err(e) = lifecycle.on_start().await {
                error!(worker = %kind, error = %e, "工作进程启动失败");
                *self.status.write().await = WorkerStatus::Failed;
                return Err(e.into());
            }
        }

        if let Some(scheduler) = self.profile.scheduler() {
            scheduler.start();
        }

        *self.status.write().await = WorkerStatus::Running;
        info!(worker = %kind, "工作进程运行中");
        Ok(())
    }

    /// 停止工作进程
    ///
    /// 关闭过程中的错误只记录，不会返回给调用方，遥测关闭总会执行。
    pub async fn stop(&self) {
        let kind = self.kind();
        let previous = {
            let mut status = self.status.write().await;
            match *status {
                WorkerStatus::Stopping | WorkerStatus::Stopped => return,
                previous => {
                    *status = WorkerStatus::Stopping;
                    previous
                }
            }
        };
        info!(worker = %kind, "停止工作进程");

        if let Some(scheduler) = self.profile.scheduler() {
            scheduler.stop();
        }

        if let Some(lifecycle) = self.profile.lifecycle() {
            let outcome = if previous == WorkerStatus::Running {
                lifecycle.on_stop().await
            } else {
                // 未完成启动时不发布关闭事件，只释放遥测
                lifecycle
                    .lifecycle_context()
                    .telemetry
                    .teardown()
                    .await
                    .map_err(|e| LifecycleError::TelemetryTeardownFailed {
                        worker: kind,
                        message: e.to_string(),
                    })
            };
            if let Err(e) = outcome {
                error!(worker = %kind, error = %e, "工作进程关闭时出错");
                *self.last_shutdown_error.lock() = Some(e);
            }
        }

        self.close_database().await;

        let final_status = if previous == WorkerStatus::Failed {
            WorkerStatus::Failed
        } else {
            WorkerStatus::Stopped
        };
        *self.status.write().await = final_status;
        self.metrics.write().await.stop_time = Some(chrono::Utc::now());
        info!(worker = %kind, "工作进程已停止");
    }

    /// 运行直到收到关闭信号
    pub async fn run_until<F>(&self, shutdown: F) -> InfrastructureResult<()>
    where
        F: Future<Output = ()>,
    {
        if let Err(e) = self.start().await {
            self.stop().await;
            return Err(e);
        }
        shutdown.await;
        info!(worker = %self.kind(), "收到关闭信号");
        self.stop().await;
        Ok(())
    }

    /// 执行管理命令，只有管理命令进程可用
    pub async fn run_command(&self, name: &str, args: &[String]) -> InfrastructureResult<Value> {
        let admin = self
            .profile
            .as_admin()
            .ok_or_else(|| InfrastructureError::CommandFailed {
                command: name.to_string(),
                message: format!("{} 工作进程不支持管理命令", self.kind()),
            })?;
        admin.run(name, args).await
    }

    async fn close_database(&self) {
        let Some(database) = self.shared.registry().try_resolve::<DatabaseRepository>() else {
            return;
        };
        let grace = self.config.worker.shutdown_grace();
        if tokio::time::timeout(grace, database.close()).await.is_err() {
            warn!(?grace, "数据库连接未能在宽限期内关闭");
        }
    }

    /// 工作进程类型
    pub fn kind(&self) -> WorkerKind {
        self.profile.kind()
    }

    /// 已组合的工作进程
    pub fn profile(&self) -> &WorkerProfile {
        &self.profile
    }

    /// 工作进程的专属注册表
    pub fn registry(&self) -> &Arc<ComponentRegistryImpl> {
        self.profile.registry()
    }

    /// 共享组件目录
    pub fn shared(&self) -> &SharedComponents {
        &self.shared
    }

    /// 进程配置
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 运行状态
    pub async fn status(&self) -> WorkerStatus {
        *self.status.read().await
    }

    /// 统计信息
    pub async fn metrics(&self) -> WorkerMetrics {
        self.metrics.read().await.clone()
    }

    /// 最近一次关闭过程中记录的错误
    pub fn last_shutdown_error(&self) -> Option<LifecycleError> {
        self.last_shutdown_error.lock().clone()
    }
}

impl std::fmt::Debug for WorkerHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHost")
            .field("kind", &self.kind())
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

/// 工作进程运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerStatus {
    /// 已组合
    Initialized,
    /// 启动中
    Starting,
    /// 运行中
    Running,
    /// 停止中
    Stopping,
    /// 已停止
    Stopped,
    /// 失败
    Failed,
}

/// 工作进程统计信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerMetrics {
    /// 启动时间
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    /// 停止时间
    pub stop_time: Option<chrono::DateTime<chrono::Utc>>,
    /// 可见的组件数量（共享加专属）
    pub registered_components_count: usize,
}

impl WorkerMetrics {
    /// 计算运行时间
    pub fn uptime(&self) -> Option<chrono::Duration> {
        match (self.start_time, self.stop_time) {
            (Some(start), Some(stop)) => Some(stop - start),
            (Some(start), None) => Some(chrono::Utc::now() - start),
            _ => None,
        }
    }
}
