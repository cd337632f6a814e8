//! 工作进程生命周期管理
//!
//! API 与 Microservices 工作进程实现 [`WorkerLifecycle`]，
//! 由默认实现保证启动与关闭步骤的先后顺序：
//!
//! - 启动：遥测注册 → 发布 `app.bootstrap`（等待订阅者完成）
//! - 关闭：发布 `app.shutdown`（等待订阅者完成）→ 遥测关闭（无论前一步是否失败）

use crate::errors::{LifecycleError, LifecycleResult};
use crate::events::EventBus;
use crate::telemetry::{TelemetryRegistrar, TelemetrySetupOptions};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

/// 工作进程类型
///
/// 进程启动时选定一次，整个进程生命周期内不变。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    /// 对外 API 服务
    #[default]
    Api,
    /// 后台任务处理
    Microservices,
    /// 管理命令执行
    Admin,
}

impl WorkerKind {
    /// 全部工作进程类型
    pub const ALL: [Self; 3] = [Self::Api, Self::Microservices, Self::Admin];

    /// 小写名称
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Microservices => "microservices",
            Self::Admin => "admin",
        }
    }

    /// 是否会发布生命周期事件
    pub fn emits_lifecycle_events(self) -> bool {
        !matches!(self, Self::Admin)
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 工作进程类型解析错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("未知的工作进程类型: {0}")]
pub struct ParseWorkerKindError(String);

impl FromStr for WorkerKind {
    type Err = ParseWorkerKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "api" => Ok(Self::Api),
            "microservices" => Ok(Self::Microservices),
            "admin" => Ok(Self::Admin),
            other => Err(ParseWorkerKindError(other.to_string())),
        }
    }
}

/// 生命周期事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleEventKind {
    /// 启动完成，开始接收工作之前
    Bootstrap,
    /// 进程退出之前
    Shutdown,
}

impl LifecycleEventKind {
    /// 事件名称
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bootstrap => "app.bootstrap",
            Self::Shutdown => "app.shutdown",
        }
    }
}

impl fmt::Display for LifecycleEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 生命周期事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleEvent {
    /// 事件类型
    pub kind: LifecycleEventKind,
    /// 工作进程类型
    pub worker: WorkerKind,
    /// 发布时间
    pub emitted_at: chrono::DateTime<chrono::Utc>,
}

impl LifecycleEvent {
    /// 创建新事件
    pub fn new(kind: LifecycleEventKind, worker: WorkerKind) -> Self {
        Self {
            kind,
            worker,
            emitted_at: chrono::Utc::now(),
        }
    }
}

/// 生命周期协作者
#[derive(Clone)]
pub struct LifecycleContext {
    /// 事件总线
    pub event_bus: Arc<dyn EventBus>,
    /// 遥测注册器
    pub telemetry: Arc<dyn TelemetryRegistrar>,
    /// 需要插桩的组件类
    pub telemetry_targets: TelemetrySetupOptions,
}

impl LifecycleContext {
    /// 创建生命周期上下文
    pub fn new(
        event_bus: Arc<dyn EventBus>,
        telemetry: Arc<dyn TelemetryRegistrar>,
        telemetry_targets: TelemetrySetupOptions,
    ) -> Self {
        Self {
            event_bus,
            telemetry,
            telemetry_targets,
        }
    }
}

impl fmt::Debug for LifecycleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleContext")
            .field("telemetry_targets", &self.telemetry_targets.len())
            .finish_non_exhaustive()
    }
}

/// 工作进程生命周期 trait
#[async_trait]
pub trait WorkerLifecycle: Send + Sync {
    /// 工作进程类型，无副作用且在整个生命周期内保持不变
    fn worker_kind(&self) -> WorkerKind;

    /// 生命周期协作者
    fn lifecycle_context(&self) -> &LifecycleContext;

    /// 工作进程启动
    ///
    /// 任何一步失败都是致命错误，调用方不得继续处理主要工作。
    async fn on_start(&self) -> LifecycleResult<()> {
        let worker = self.worker_kind();
        let context = self.lifecycle_context();

        debug!(
            worker = %worker,
            repositories = context.telemetry_targets.repositories.len(),
            services = context.telemetry_targets.services.len(),
            "注册遥测插桩目标"
        );
        context
            .telemetry
            .setup(context.telemetry_targets.clone())
            .map_err(|e| LifecycleError::TelemetrySetupFailed {
                worker,
                message: e.to_string(),
            })?;

        context
            .event_bus
            .emit(LifecycleEventKind::Bootstrap, worker)
            .await
            .map_err(|e| LifecycleError::BootstrapEventFailed {
                worker,
                message: e.to_string(),
            })?;

        info!(worker = %worker, "工作进程启动完成");
        Ok(())
    }

    /// 工作进程停止
    ///
    /// 遥测关闭总会执行；返回的错误仅用于诊断记录。
    async fn on_stop(&self) -> LifecycleResult<()> {
        let worker = self.worker_kind();
        let context = self.lifecycle_context();

        let emitted = context
            .event_bus
            .emit(LifecycleEventKind::Shutdown, worker)
            .await
            .map_err(|e| LifecycleError::ShutdownEventFailed {
                worker,
                message: e.to_string(),
            });
        if let Err(e) = &emitted {
            error!(worker = %worker, error = %e, "关闭事件发布失败，继续关闭遥测");
        }

        let torn_down = context
            .telemetry
            .teardown()
            .await
            .map_err(|e| LifecycleError::TelemetryTeardownFailed {
                worker,
                message: e.to_string(),
            });
        if let Err(e) = &torn_down {
            error!(worker = %worker, error = %e, "遥测关闭失败");
        }

        info!(worker = %worker, "工作进程已停止");
        emitted.and(torn_down)
    }
}
