//! 持久化层接入与连接错误回调

use async_trait::async_trait;
use di_abstractions::ComponentLookupExt;
use di_impl::RegistryHandle;
use infrastructure_common::{
    ConnectionError, ConnectionErrorHandler, ConnectionErrorKind, ConnectionHandle,
    ConnectionOptions, DatabaseConnection, DatabaseLifecycle, PersistenceLayer,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 连接错误回调钩子
///
/// 持久化层配置时注册表尚未构建完成，因此钩子只持有注册表句柄，
/// 在错误发生时才查找 `dyn DatabaseLifecycle`。找不到时静默吸收错误。
#[derive(Debug)]
pub struct ConnectionResiliencyHook {
    registry: RegistryHandle,
    delegated: AtomicU64,
    absorbed: AtomicU64,
}

impl ConnectionResiliencyHook {
    /// 创建钩子
    pub fn new(registry: RegistryHandle) -> Self {
        Self {
            registry,
            delegated: AtomicU64::new(0),
            absorbed: AtomicU64::new(0),
        }
    }

    /// 交给持久化层的回调
    pub fn handler(self: &Arc<Self>) -> ConnectionErrorHandler {
        let hook = Arc::clone(self);
        Arc::new(move |error: ConnectionError| {
            hook.handle(error);
        })
    }

    /// 处理连接错误，返回是否已转交给负责组件
    pub fn handle(&self, error: ConnectionError) -> bool {
        let target = self
            .registry
            .upgrade()
            .and_then(|registry| registry.try_resolve::<dyn DatabaseLifecycle>());

        match target {
            Some(target) => {
                self.delegated.fetch_add(1, Ordering::Relaxed);
                target.handle_connection_error(error);
                true
            }
            None => {
                self.absorbed.fetch_add(1, Ordering::Relaxed);
                debug!(kind = %error.kind, "没有连接生命周期组件，忽略连接错误: {}", error);
                false
            }
        }
    }

    /// 已转交的错误数
    pub fn delegated_count(&self) -> u64 {
        self.delegated.load(Ordering::Relaxed)
    }

    /// 已吸收的错误数
    pub fn absorbed_count(&self) -> u64 {
        self.absorbed.load(Ordering::Relaxed)
    }
}

/// PostgreSQL 持久化层
///
/// 连接池延迟建立，配置阶段不会访问数据库。
#[derive(Debug, Default, Clone, Copy)]
pub struct PgPersistenceLayer;

impl PgPersistenceLayer {
    /// 创建持久化层
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PersistenceLayer for PgPersistenceLayer {
    async fn configure(
        &self,
        options: ConnectionOptions,
        on_connection_error: ConnectionErrorHandler,
    ) -> Result<ConnectionHandle, ConnectionError> {
        let pool = PgPoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.acquire_timeout)
            .connect_lazy(&options.url)
            .map_err(|e| ConnectionError::new(ConnectionErrorKind::Other, e.to_string()))?;

        info!(
            max_connections = options.max_connections,
            "数据库连接池已配置"
        );
        Ok(Arc::new(PgConnection {
            pool,
            on_connection_error,
        }))
    }
}

/// PostgreSQL 连接池句柄
pub struct PgConnection {
    pool: PgPool,
    on_connection_error: ConnectionErrorHandler,
}

impl PgConnection {
    /// 底层连接池
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DatabaseConnection for PgConnection {
    async fn ping(&self) -> Result<(), ConnectionError> {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(e) => {
                let kind = classify_sqlx_error(&e);
                let error =
                    ConnectionError::new(kind.unwrap_or(ConnectionErrorKind::Other), e.to_string());
                if kind.is_some() {
                    warn!(kind = %error.kind, "数据库连接错误");
                    (self.on_connection_error)(error.clone());
                }
                Err(error)
            }
        }
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

/// 连接级错误的类别，查询级错误返回 `None`
pub fn classify_sqlx_error(error: &sqlx::Error) -> Option<ConnectionErrorKind> {
    match error {
        sqlx::Error::PoolTimedOut => Some(ConnectionErrorKind::PoolExhausted),
        sqlx::Error::PoolClosed => Some(ConnectionErrorKind::PoolClosed),
        sqlx::Error::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => {
            Some(ConnectionErrorKind::Timeout)
        }
        sqlx::Error::Io(_) | sqlx::Error::Protocol(_) => Some(ConnectionErrorKind::BrokenSocket),
        sqlx::Error::Tls(_) | sqlx::Error::WorkerCrashed => Some(ConnectionErrorKind::Other),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[test]
    fn classifies_connection_level_errors() {
        assert_eq!(
            classify_sqlx_error(&sqlx::Error::PoolTimedOut),
            Some(ConnectionErrorKind::PoolExhausted)
        );
        assert_eq!(
            classify_sqlx_error(&sqlx::Error::PoolClosed),
            Some(ConnectionErrorKind::PoolClosed)
        );
        let broken = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken pipe");
        assert_eq!(
            classify_sqlx_error(&sqlx::Error::Io(broken)),
            Some(ConnectionErrorKind::BrokenSocket)
        );
        assert_eq!(classify_sqlx_error(&sqlx::Error::RowNotFound), None);
    }

    #[test]
    fn unbound_hook_absorbs_errors() {
        let hook = Arc::new(ConnectionResiliencyHook::new(RegistryHandle::new()));
        let handler = hook.handler();

        handler(ConnectionError::new(ConnectionErrorKind::BrokenSocket, "reset"));

        assert_eq!(hook.absorbed_count(), 1);
        assert_eq!(hook.delegated_count(), 0);
    }

    #[tokio::test]
    async fn unreachable_database_reports_through_handler() {
        let reported = Arc::new(Mutex::new(Vec::new()));
        let sink = reported.clone();
        let handler: ConnectionErrorHandler =
            Arc::new(move |error: ConnectionError| sink.lock().push(error));

        let connection = PgPersistenceLayer::new()
            .configure(
                ConnectionOptions {
                    url: "postgres://worker@127.0.0.1:1/worker".to_string(),
                    max_connections: 1,
                    acquire_timeout: Duration::from_millis(300),
                },
                handler,
            )
            .await
            .unwrap();

        let error = connection.ping().await.unwrap_err();

        assert_eq!(reported.lock().as_slice(), &[error]);
        connection.close().await;
        assert!(connection.is_closed());
    }
}
