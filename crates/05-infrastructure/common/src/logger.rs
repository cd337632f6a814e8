//! 日志仓储接口

use crate::lifecycle::WorkerKind;

/// 日志仓储 trait
///
/// 通过仓储写出的日志都带有当前应用名称。
pub trait LoggerRepository: Send + Sync {
    /// 设置应用名称，每个工作进程在组装时调用一次
    fn set_app_name(&self, worker: WorkerKind);

    /// 当前应用名称
    fn app_name(&self) -> Option<WorkerKind>;

    /// 普通日志
    fn info(&self, message: &str);

    /// 警告日志
    fn warn(&self, message: &str);

    /// 错误日志
    fn error(&self, message: &str);
}
