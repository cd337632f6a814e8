//! # Configuration Implementation
//!
//! 配置加载与验证的具体实现。
//!
//! ## 主要组件
//!
//! - [`LayeredConfigProvider`] - 默认值 ← TOML 文件 ← 环境变量
//! - [`AppConfigValidator`] - 进程配置验证器

pub mod providers;
pub mod validation;

pub use providers::*;
pub use validation::*;
