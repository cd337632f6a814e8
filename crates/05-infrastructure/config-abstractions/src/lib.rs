//! # Configuration Abstractions
//!
//! 工作进程配置模型与配置加载抽象。
//!
//! ## 核心接口
//!
//! - [`AppConfig`] - 进程配置（启动时构建一次，显式传递）
//! - [`ConfigProvider`] - 配置提供者接口
//! - [`ConfigValidator`] - 配置验证接口

pub mod provider;
pub mod settings;
pub mod validator;

pub use provider::*;
pub use settings::*;
pub use validator::*;
