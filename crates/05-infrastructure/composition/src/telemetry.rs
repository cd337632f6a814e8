//! OpenTelemetry 遥测注册器

use async_trait::async_trait;
use config_abstractions::TelemetryConfig;
use infrastructure_common::{
    ClassIdentity, TelemetryError, TelemetryRegistrar, TelemetrySetupOptions,
};
use opentelemetry::global;
use opentelemetry::trace::{Span, Tracer};
use opentelemetry::KeyValue;
use parking_lot::RwLock;
use tracing::{debug, info};

/// 遥测注册器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryState {
    /// 尚未注册
    Idle,
    /// 已注册插桩目标
    Active,
    /// 已关闭
    ShutDown,
}

/// 基于 OpenTelemetry 全局 tracer 的遥测注册器
///
/// 导出器由全局 tracer provider 决定；未安装 provider 时所有 span 都是空操作。
pub struct OtelTelemetryRegistrar {
    config: TelemetryConfig,
    state: RwLock<TelemetryState>,
    instrumented: RwLock<Vec<ClassIdentity>>,
}

impl OtelTelemetryRegistrar {
    /// 创建遥测注册器
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            config,
            state: RwLock::new(TelemetryState::Idle),
            instrumented: RwLock::new(Vec::new()),
        }
    }

    /// 当前状态
    pub fn state(&self) -> TelemetryState {
        *self.state.read()
    }

    /// 已插桩的组件类
    pub fn instrumented(&self) -> Vec<ClassIdentity> {
        self.instrumented.read().clone()
    }
}

#[async_trait]
impl TelemetryRegistrar for OtelTelemetryRegistrar {
    fn setup(&self, options: TelemetrySetupOptions) -> Result<(), TelemetryError> {
        let mut state = self.state.write();
        if *state == TelemetryState::ShutDown {
            return Err(TelemetryError::SetupFailed {
                message: "遥测已关闭，无法重新注册".to_string(),
            });
        }

        if !self.config.enabled {
            debug!("遥测未启用，跳过插桩注册");
            *state = TelemetryState::Active;
            return Ok(());
        }

        let tracer = global::tracer(self.config.service_name.clone());
        let mut span = tracer.start("telemetry.setup");
        span.set_attribute(KeyValue::new(
            "telemetry.repositories",
            options.repositories.len() as i64,
        ));
        span.set_attribute(KeyValue::new(
            "telemetry.services",
            options.services.len() as i64,
        ));
        span.end();

        info!(
            service = %self.config.service_name,
            repositories = options.repositories.len(),
            services = options.services.len(),
            "注册遥测插桩目标"
        );

        self.instrumented.write().extend(options.all().cloned());
        *state = TelemetryState::Active;
        Ok(())
    }

    async fn teardown(&self) -> Result<(), TelemetryError> {
        if self.state() == TelemetryState::ShutDown {
            return Ok(());
        }

        // 全局 provider 的关闭会阻塞直到导出完成
        tokio::task::spawn_blocking(global::shutdown_tracer_provider)
            .await
            .map_err(|e| TelemetryError::TeardownFailed {
                message: e.to_string(),
            })?;

        *self.state.write() = TelemetryState::ShutDown;
        info!("遥测已关闭");
        Ok(())
    }
}
