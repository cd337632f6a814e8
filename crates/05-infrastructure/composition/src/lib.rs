//! # 工作进程组合层
//!
//! 这个 crate 把共享组件目录、各工作进程的专属组件以及外部协作者组合成
//! 一个可运行的工作进程宿主。
//!
//! ## 主要功能
//!
//! - **共享组件目录**: 持久化、任务队列、遥测与事件总线等所有工作进程共用的组件
//! - **工作进程组合**: API、后台任务与管理命令三种工作进程
//! - **生命周期管理**: 有序的启动与关闭，启动与关闭事件的发布
//! - **连接错误回调**: 在注册表构建前绑定，错误发生时才查找负责组件
//!
//! ## 基本使用
//!
//! ```rust,no_run
//! use infrastructure_composition::WorkerHostBuilder;
//! use infrastructure_common::WorkerKind;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let host = WorkerHostBuilder::new()
//!         .worker(WorkerKind::Microservices)
//!         .with_logging()
//!         .build()
//!         .await?;
//!
//!     host.run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod catalog;
pub mod events;
pub mod host;
pub mod logging;
pub mod persistence;
pub mod scheduler;
pub mod telemetry;
pub mod workers;

#[cfg(test)]
mod tests;

// 重新导出主要类型
pub use builder::WorkerHostBuilder;
pub use catalog::{
    ConfigRepository, DatabaseRepository, DatabaseService, DatabaseStatus, JobRepository,
    JobService, QueueStatus, SharedCollaborators, SharedComponents,
};
pub use events::InProcessEventBus;
pub use host::{WorkerHost, WorkerMetrics, WorkerStatus};
pub use logging::{init_logging, TracingLoggerRepository};
pub use persistence::{ConnectionResiliencyHook, PgPersistenceLayer};
pub use scheduler::{RecurringTaskScheduler, SchedulerRegistry};
pub use telemetry::{OtelTelemetryRegistrar, TelemetryState};
pub use workers::WorkerProfile;

// 重新导出错误类型
pub use infrastructure_common::InfrastructureError;
