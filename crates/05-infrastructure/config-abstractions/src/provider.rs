//! 配置提供者抽象接口

use crate::settings::AppConfig;
use infrastructure_common::ConfigResult;

/// 配置提供者 trait
///
/// 进程入口处调用一次，得到的配置随后显式传递给组装流程。
pub trait ConfigProvider: Send + Sync {
    /// 加载完整配置
    fn load(&self) -> ConfigResult<AppConfig>;

    /// 获取提供者名称
    fn name(&self) -> &str;
}

/// 固定配置提供者
///
/// 直接返回给定的配置，用于测试或嵌入式场景。
#[derive(Debug, Clone, Default)]
pub struct StaticConfigProvider {
    config: AppConfig,
}

impl StaticConfigProvider {
    /// 创建固定配置提供者
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn load(&self) -> ConfigResult<AppConfig> {
        Ok(self.config.clone())
    }

    fn name(&self) -> &str {
        "StaticConfigProvider"
    }
}
