//! 遥测注册接口

use crate::metadata::ClassIdentity;
use async_trait::async_trait;
use thiserror::Error;

/// 遥测错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("遥测初始化失败: {message}")]
    SetupFailed { message: String },

    #[error("遥测关闭失败: {message}")]
    TeardownFailed { message: String },
}

/// 遥测注册选项
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySetupOptions {
    /// 非服务类组件（仓储、处理器、拦截器、协作者等）
    pub repositories: Vec<ClassIdentity>,
    /// 服务类组件
    pub services: Vec<ClassIdentity>,
}

impl TelemetrySetupOptions {
    /// 按类别拆分类标识列表
    pub fn from_classes(classes: impl IntoIterator<Item = ClassIdentity>) -> Self {
        let (services, repositories) = classes.into_iter().partition(ClassIdentity::is_service);
        Self {
            repositories,
            services,
        }
    }

    /// 全部类标识
    pub fn all(&self) -> impl Iterator<Item = &ClassIdentity> {
        self.repositories.iter().chain(self.services.iter())
    }

    /// 类标识总数
    pub fn len(&self) -> usize {
        self.repositories.len() + self.services.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 遥测注册器 trait
#[async_trait]
pub trait TelemetryRegistrar: Send + Sync {
    /// 注册需要插桩的组件类
    fn setup(&self, options: TelemetrySetupOptions) -> Result<(), TelemetryError>;

    /// 刷新并释放导出器
    async fn teardown(&self) -> Result<(), TelemetryError>;
}
