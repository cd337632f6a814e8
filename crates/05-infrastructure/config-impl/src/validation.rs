//! 进程配置验证

use config_abstractions::{AppConfig, ConfigValidator};
use infrastructure_common::ValidationError;
use std::collections::HashSet;
use tracing::warn;

/// 进程配置验证器
#[derive(Debug, Default, Clone, Copy)]
pub struct AppConfigValidator;

impl AppConfigValidator {
    /// 创建验证器
    pub fn new() -> Self {
        Self
    }
}

impl ConfigValidator<AppConfig> for AppConfigValidator {
    fn validate(&self, config: &AppConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if config.database.url.trim().is_empty() {
            errors.push(ValidationError::required_field_missing("database.url"));
        }
        if config.database.max_connections == 0 {
            errors.push(ValidationError::value_out_of_range(
                "database.max_connections",
                "0",
                ">= 1",
            ));
        }

        let mut seen = HashSet::new();
        for queue in &config.queue.queues {
            if queue.name.trim().is_empty() {
                errors.push(ValidationError::required_field_missing("queue.queues.name"));
            } else if !seen.insert(queue.name.as_str()) {
                errors.push(ValidationError::invalid_field_value(
                    "queue.queues.name",
                    queue.name.clone(),
                    "队列名称重复",
                ));
            }
            if queue.concurrency == 0 {
                errors.push(ValidationError::value_out_of_range(
                    format!("queue.queues[{}].concurrency", queue.name),
                    "0",
                    ">= 1",
                ));
            }
        }

        if config.telemetry.enabled && config.telemetry.service_name.trim().is_empty() {
            errors.push(ValidationError::required_field_missing(
                "telemetry.service_name",
            ));
        }

        if config.upload.max_file_size_bytes == 0 {
            errors.push(ValidationError::value_out_of_range(
                "upload.max_file_size_bytes",
                "0",
                ">= 1",
            ));
        }

        if config.scheduler.enabled && config.scheduler.database_probe_interval_secs == 0 {
            errors.push(ValidationError::value_out_of_range(
                "scheduler.database_probe_interval_secs",
                "0",
                ">= 1",
            ));
        }

        for error in &errors {
            warn!("配置验证失败: {}", error);
        }
        errors
    }

    fn name(&self) -> &str {
        "AppConfigValidator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config_abstractions::QueueDefinition;
    use infrastructure_common::ConfigError;

    #[test]
    fn default_config_is_valid() {
        assert!(AppConfigValidator::new()
            .ensure_valid(&AppConfig::default())
            .is_ok());
    }

    #[test]
    fn collects_every_violation() {
        let mut config = AppConfig::default();
        config.database.url = " ".to_string();
        config.database.max_connections = 0;
        config.queue.queues = vec![
            QueueDefinition::new("jobs", 1),
            QueueDefinition::new("jobs", 0),
        ];
        config.upload.max_file_size_bytes = 0;

        let errors = AppConfigValidator::new().validate(&config);
        let fields: Vec<_> = errors.iter().map(|e| e.field_name().to_string()).collect();

        assert_eq!(
            fields,
            vec![
                "database.url",
                "database.max_connections",
                "queue.queues.name",
                "queue.queues[jobs].concurrency",
                "upload.max_file_size_bytes",
            ]
        );

        match AppConfigValidator::new().ensure_valid(&config) {
            Err(ConfigError::ValidationFailed { errors }) => assert_eq!(errors.len(), 5),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
