//! # Infrastructure Common
//!
//! 工作进程组合层共享的 traits、类型与错误分类。
//!
//! ## 核心组件
//!
//! - [`Capability`] - 组件能力标识
//! - [`WorkerLifecycle`] - 工作进程生命周期契约
//! - [`EventBus`] - 生命周期事件总线
//! - [`TelemetryRegistrar`] - 遥测注册
//! - [`PersistenceLayer`] - 持久化层边界与连接错误回调
//!
//! ## 设计原则
//!
//! - 基于 Rust 类型系统的编译时安全
//! - 异步优先
//! - 外部协作者只通过 trait 接入

pub mod component;
pub mod errors;
pub mod events;
pub mod lifecycle;
pub mod logger;
pub mod metadata;
pub mod persistence;
pub mod telemetry;

pub use component::*;
pub use errors::*;
pub use events::*;
pub use lifecycle::*;
pub use logger::*;
pub use metadata::*;
pub use persistence::*;
pub use telemetry::*;
