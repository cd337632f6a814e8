//! 配置提供者实现

use config::{Config, Environment, File, FileFormat};
use config_abstractions::{AppConfig, ConfigProvider};
use infrastructure_common::{ConfigError, ConfigResult};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 默认环境变量前缀
pub const DEFAULT_ENV_PREFIX: &str = "WORKER";

/// 默认环境变量分隔符
pub const DEFAULT_ENV_SEPARATOR: &str = "__";

/// 分层配置提供者
///
/// 后加载的来源覆盖先加载的来源：
/// 默认值 ← TOML 文件 ← 环境变量（`WORKER__DATABASE__URL`）← 显式覆盖。
#[derive(Debug, Clone)]
pub struct LayeredConfigProvider {
    file: Option<PathBuf>,
    file_required: bool,
    env_prefix: Option<String>,
    env_separator: String,
    overrides: Vec<(String, String)>,
}

impl LayeredConfigProvider {
    /// 创建只读取默认值与默认前缀环境变量的提供者
    pub fn new() -> Self {
        Self {
            file: None,
            file_required: false,
            env_prefix: Some(DEFAULT_ENV_PREFIX.to_string()),
            env_separator: DEFAULT_ENV_SEPARATOR.to_string(),
            overrides: Vec::new(),
        }
    }

    /// 添加必需的 TOML 配置文件
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self.file_required = true;
        self
    }

    /// 添加可选的 TOML 配置文件，文件不存在时跳过
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self.file_required = false;
        self
    }

    /// 设置环境变量前缀
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// 不读取环境变量
    pub fn without_env(mut self) -> Self {
        self.env_prefix = None;
        self
    }

    /// 显式覆盖单个配置键（例如命令行参数）
    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.push((key.into(), value.into()));
        self
    }

    fn build(&self) -> ConfigResult<Config> {
        let defaults = Config::try_from(&AppConfig::default()).map_err(parse_error)?;
        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = &self.file {
            if self.file_required && !path.exists() {
                return Err(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                });
            }
            debug!("添加 TOML 配置文件: {}", path.display());
            builder = builder.add_source(
                File::from(path.as_path())
                    .format(FileFormat::Toml)
                    .required(self.file_required),
            );
        }

        if let Some(prefix) = &self.env_prefix {
            debug!("添加环境变量配置源，前缀: {}", prefix);
            builder = builder.add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator(&self.env_separator)
                    .separator(&self.env_separator)
                    .try_parsing(true),
            );
        }

        for (key, value) in &self.overrides {
            builder = builder
                .set_override(key.as_str(), value.as_str())
                .map_err(parse_error)?;
        }

        builder.build().map_err(parse_error)
    }
}

impl Default for LayeredConfigProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigProvider for LayeredConfigProvider {
    fn load(&self) -> ConfigResult<AppConfig> {
        let config: AppConfig = self
            .build()?
            .try_deserialize()
            .map_err(parse_error)?;

        info!(
            worker = %config.worker.kind,
            queues = config.queue.queues.len(),
            "配置加载完成"
        );
        Ok(config)
    }

    fn name(&self) -> &str {
        "LayeredConfigProvider"
    }
}

fn parse_error(error: config::ConfigError) -> ConfigError {
    ConfigError::ParseError {
        source: Box::new(error),
    }
}
