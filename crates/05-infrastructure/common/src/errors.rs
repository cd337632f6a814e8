//! 错误类型定义

use crate::lifecycle::WorkerKind;
use thiserror::Error;

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    #[error("配置解析失败: {source}")]
    ParseError {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("配置验证失败: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },
}

/// 依赖注入错误类型
///
/// 注册表组装阶段的所有错误都属于配置错误，进程不得继续启动。
#[derive(Error, Debug)]
pub enum DependencyError {
    #[error("组件未注册: {type_name}")]
    ComponentNotRegistered { type_name: String },

    #[error("组件创建失败: {type_name}, 原因: {source}")]
    ComponentCreationFailed {
        type_name: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("循环依赖检测到: {dependency_chain}")]
    CircularDependency { dependency_chain: String },

    #[error("依赖缺失: {component} 依赖 {dependency}, 但该能力既不是共享组件也未在 {scope} 中声明")]
    MissingDependency {
        component: String,
        dependency: String,
        scope: String,
    },

    #[error("能力重复注册: {capability} (已存在于 {existing_scope})")]
    DuplicateCapability {
        capability: String,
        existing_scope: String,
    },

    #[error("名称 {name} 对应多个能力: {candidates}")]
    AmbiguousName { name: String, candidates: String },

    #[error("组件 {component} 请求了未声明的依赖 {dependency}")]
    UndeclaredDependency {
        component: String,
        dependency: String,
    },

    #[error("类型转换失败: {type_name}")]
    TypeMismatch { type_name: String },
}

impl DependencyError {
    /// 包装组件工厂返回的任意错误
    pub fn creation_failed(
        type_name: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::ComponentCreationFailed {
            type_name: type_name.into(),
            source: source.into(),
        }
    }
}

/// 验证错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("必需字段缺失: {field_name}")]
    RequiredFieldMissing { field_name: String },

    #[error("字段值无效: {field_name}, 值: {value}, 原因: {reason}")]
    InvalidFieldValue {
        field_name: String,
        value: String,
        reason: String,
    },

    #[error("字段值超出范围: {field_name}, 值: {value}, 范围: {range}")]
    ValueOutOfRange {
        field_name: String,
        value: String,
        range: String,
    },
}

impl ValidationError {
    /// 创建必需字段缺失错误
    pub fn required_field_missing(field_name: impl Into<String>) -> Self {
        Self::RequiredFieldMissing {
            field_name: field_name.into(),
        }
    }

    /// 创建字段值无效错误
    pub fn invalid_field_value(
        field_name: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidFieldValue {
            field_name: field_name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// 创建值超出范围错误
    pub fn value_out_of_range(
        field_name: impl Into<String>,
        value: impl Into<String>,
        range: impl Into<String>,
    ) -> Self {
        Self::ValueOutOfRange {
            field_name: field_name.into(),
            value: value.into(),
            range: range.into(),
        }
    }

    /// 出错的字段名
    pub fn field_name(&self) -> &str {
        match self {
            Self::RequiredFieldMissing { field_name }
            | Self::InvalidFieldValue { field_name, .. }
            | Self::ValueOutOfRange { field_name, .. } => field_name,
        }
    }
}

/// 工作进程生命周期错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("[{worker}] 遥测注册失败: {message}")]
    TelemetrySetupFailed { worker: WorkerKind, message: String },

    #[error("[{worker}] 启动事件发布失败: {message}")]
    BootstrapEventFailed { worker: WorkerKind, message: String },

    #[error("[{worker}] 关闭事件发布失败: {message}")]
    ShutdownEventFailed { worker: WorkerKind, message: String },

    #[error("[{worker}] 遥测关闭失败: {message}")]
    TelemetryTeardownFailed { worker: WorkerKind, message: String },
}

impl LifecycleError {
    /// 是否属于启动阶段的致命错误
    pub fn is_startup_error(&self) -> bool {
        matches!(
            self,
            Self::TelemetrySetupFailed { .. } | Self::BootstrapEventFailed { .. }
        )
    }

    /// 发生错误的工作进程类型
    pub fn worker(&self) -> WorkerKind {
        match self {
            Self::TelemetrySetupFailed { worker, .. }
            | Self::BootstrapEventFailed { worker, .. }
            | Self::ShutdownEventFailed { worker, .. }
            | Self::TelemetryTeardownFailed { worker, .. } => *worker,
        }
    }
}

/// 基础设施错误类型
#[derive(Error, Debug)]
pub enum InfrastructureError {
    #[error("配置错误: {source}")]
    ConfigError {
        #[from]
        source: ConfigError,
    },

    #[error("依赖注入错误: {source}")]
    DependencyError {
        #[from]
        source: DependencyError,
    },

    #[error("生命周期错误: {source}")]
    LifecycleError {
        #[from]
        source: LifecycleError,
    },

    #[error("基础设施启动失败: {message}")]
    BootstrapFailed { message: String },

    #[error("管理命令执行失败: {command}, 原因: {message}")]
    CommandFailed { command: String, message: String },
}

/// 结果类型别名
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type DependencyResult<T> = Result<T, DependencyError>;
pub type ValidationResult<T> = Result<T, ValidationError>;
pub type LifecycleResult<T> = Result<T, LifecycleError>;
pub type InfrastructureResult<T> = Result<T, InfrastructureError>;
