//! 日志初始化与日志仓储

use config_abstractions::LoggingConfig;
use infrastructure_common::{
    InfrastructureError, InfrastructureResult, LoggerRepository, WorkerKind,
};
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// 初始化日志系统
///
/// `RUST_LOG` 优先于配置中的级别。全局订阅者已经存在时返回 `Ok(false)`。
pub fn init_logging(config: &LoggingConfig) -> InfrastructureResult<bool> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| InfrastructureError::BootstrapFailed {
            message: format!("日志级别无效: {}", e),
        })?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.show_target)
        .with_thread_ids(config.show_thread_ids)
        .with_file(config.show_file)
        .with_line_number(config.show_line_number);

    let installed = if config.json_format {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    }
    .is_ok();

    if installed {
        info!(level = %config.level, json = config.json_format, "日志系统初始化完成");
    } else {
        debug!("日志系统已初始化，跳过");
    }
    Ok(installed)
}

/// 基于 tracing 的日志仓储
#[derive(Debug, Default)]
pub struct TracingLoggerRepository {
    app_name: RwLock<Option<WorkerKind>>,
}

impl TracingLoggerRepository {
    /// 创建日志仓储
    pub fn new() -> Self {
        Self::default()
    }

    fn label(&self) -> &'static str {
        self.app_name().map(WorkerKind::as_str).unwrap_or("worker")
    }
}

impl LoggerRepository for TracingLoggerRepository {
    fn set_app_name(&self, worker: WorkerKind) {
        *self.app_name.write() = Some(worker);
        debug!(app = %worker, "设置应用名称");
    }

    fn app_name(&self) -> Option<WorkerKind> {
        *self.app_name.read()
    }

    fn info(&self, message: &str) {
        info!(app = self.label(), "{}", message);
    }

    fn warn(&self, message: &str) {
        warn!(app = self.label(), "{}", message);
    }

    fn error(&self, message: &str) {
        error!(app = self.label(), "{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialisation_is_harmless() {
        let config = LoggingConfig::development();
        let _ = init_logging(&config).unwrap();
        assert!(!init_logging(&config).unwrap());
    }

    #[test]
    fn app_name_is_stored() {
        let logger = TracingLoggerRepository::new();
        assert_eq!(logger.app_name(), None);
        assert_eq!(logger.label(), "worker");

        logger.set_app_name(WorkerKind::Microservices);
        assert_eq!(logger.app_name(), Some(WorkerKind::Microservices));
        assert_eq!(logger.label(), "microservices");
    }
}
