//! 配置验证抽象接口

use infrastructure_common::{ConfigError, ConfigResult, ValidationError};

/// 配置验证器 trait
pub trait ConfigValidator<T>: Send + Sync {
    /// 收集全部验证错误，空列表表示通过
    fn validate(&self, config: &T) -> Vec<ValidationError>;

    /// 获取验证器名称
    fn name(&self) -> &str;

    /// 验证并在失败时返回 `ConfigError::ValidationFailed`
    fn ensure_valid(&self, config: &T) -> ConfigResult<()> {
        let errors = self.validate(config);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationFailed { errors })
        }
    }
}
