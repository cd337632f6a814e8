//! 持久化层接口
//!
//! 持久化引擎本身是外部协作者，这里只定义核心依赖的边界：
//! 配置连接、连接错误回调以及负责连接生命周期的组件。

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// 连接错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionErrorKind {
    /// 连接池耗尽
    PoolExhausted,
    /// 套接字断开
    BrokenSocket,
    /// 连接池已关闭
    PoolClosed,
    /// 连接超时
    Timeout,
    /// 其他连接级错误
    Other,
}

impl fmt::Display for ConnectionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PoolExhausted => "pool_exhausted",
            Self::BrokenSocket => "broken_socket",
            Self::PoolClosed => "pool_closed",
            Self::Timeout => "timeout",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// 持久化层报告的连接错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("数据库连接错误 ({kind}): {message}")]
pub struct ConnectionError {
    /// 错误类别
    pub kind: ConnectionErrorKind,
    /// 原始错误信息
    pub message: String,
}

impl ConnectionError {
    /// 创建连接错误
    pub fn new(kind: ConnectionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// 是否需要重建连接
    pub fn requires_reconnect(&self) -> bool {
        matches!(
            self.kind,
            ConnectionErrorKind::BrokenSocket | ConnectionErrorKind::PoolClosed
        )
    }
}

/// 连接错误回调
///
/// 在持久化层配置时绑定，此时注册表尚未构建完成。
pub type ConnectionErrorHandler = Arc<dyn Fn(ConnectionError) + Send + Sync>;

/// 连接选项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// 连接字符串
    pub url: String,
    /// 最大连接数
    pub max_connections: u32,
    /// 获取连接超时
    pub acquire_timeout: Duration,
}

/// 已配置的数据库连接
#[async_trait]
pub trait DatabaseConnection: Send + Sync {
    /// 连接探测，连接级错误会先经过错误回调再返回
    async fn ping(&self) -> Result<(), ConnectionError>;

    /// 关闭连接
    async fn close(&self);

    /// 是否已关闭
    fn is_closed(&self) -> bool;
}

/// 连接句柄
pub type ConnectionHandle = Arc<dyn DatabaseConnection>;

/// 持久化层 trait
#[async_trait]
pub trait PersistenceLayer: Send + Sync {
    /// 配置连接并绑定连接错误回调
    async fn configure(
        &self,
        options: ConnectionOptions,
        on_connection_error: ConnectionErrorHandler,
    ) -> Result<ConnectionHandle, ConnectionError>;
}

/// 负责持久化连接生命周期的组件
pub trait DatabaseLifecycle: Send + Sync {
    /// 处理连接错误
    fn handle_connection_error(&self, error: ConnectionError);
}
