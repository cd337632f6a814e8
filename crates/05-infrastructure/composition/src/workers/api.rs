//! 对外 API 服务
//!
//! 在共享组件之上增加路由、鉴权守卫、请求拦截器、请求上下文以及周期任务调度。
//! 网络传输本身不在这里实现，传输层把请求交给 [`RequestPipeline`] 处理。

use super::{lifecycle_context, name_logger, specialize};
use crate::catalog::{ConfigRepository, DatabaseRepository, JobRepository, SharedComponents};
use crate::scheduler::{RecurringTaskScheduler, SchedulerRegistry, TaskFn};
use chrono::{DateTime, Utc};
use config_abstractions::{RequestContextConfig, UploadConfig};
use di_abstractions::{ComponentLookupExt, ProviderDefinition, ResolveContext};
use di_impl::ComponentRegistryImpl;
use futures::future::BoxFuture;
use futures::FutureExt;
use infrastructure_common::{
    DependencyError, DependencyResult, InfrastructureResult, LifecycleContext, ProviderKind,
    WorkerKind, WorkerLifecycle,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 数据库健康探测任务名称
pub const DATABASE_HEALTH_CHECK_TASK: &str = "database-health-check";

/// 上传的文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// 文件名
    pub name: String,
    /// 字节数
    pub size_bytes: u64,
}

/// API 请求
#[derive(Debug, Clone, Default)]
pub struct ApiRequest {
    /// 请求方法
    pub method: String,
    /// 请求路径
    pub path: String,
    /// 请求头（小写键）
    pub headers: HashMap<String, String>,
    /// 请求体
    pub body: Value,
    /// 上传的文件
    pub files: Vec<UploadedFile>,
}

impl ApiRequest {
    /// 创建请求
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            path: path.into(),
            ..Self::default()
        }
    }

    /// 添加请求头
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// 添加上传文件
    pub fn with_file(mut self, name: impl Into<String>, size_bytes: u64) -> Self {
        self.files.push(UploadedFile {
            name: name.into(),
            size_bytes,
        });
        self
    }

    /// 读取请求头
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// API 错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("未授权")]
    Unauthorized,

    #[error("路由不存在: {method} {path}")]
    NotFound { method: String, path: String },

    #[error("请求无效: {message}")]
    BadRequest { message: String },

    #[error("上传内容过大: {message}")]
    PayloadTooLarge { message: String },

    #[error("内部错误: {message}")]
    Internal { message: String },
}

impl ApiError {
    /// HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::NotFound { .. } => 404,
            Self::BadRequest { .. } => 400,
            Self::PayloadTooLarge { .. } => 413,
            Self::Internal { .. } => 500,
        }
    }
}

/// API 响应
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    /// HTTP 状态码
    pub status: u16,
    /// 响应体
    pub body: Value,
    /// 请求 ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ApiResponse {
    fn from_result(result: Result<Value, ApiError>, request_id: Option<String>) -> Self {
        match result {
            Ok(body) => Self {
                status: 200,
                body,
                request_id,
            },
            Err(e) => Self {
                status: e.status_code(),
                body: json!({ "statusCode": e.status_code(), "message": e.to_string() }),
                request_id,
            },
        }
    }

    /// 是否成功
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// 路由处理函数
pub type RouteHandler =
    Arc<dyn Fn(ApiRequest) -> BoxFuture<'static, Result<Value, ApiError>> + Send + Sync>;

/// 路由
#[derive(Clone)]
pub struct Route {
    method: String,
    path: String,
    public: bool,
    handler: RouteHandler,
}

impl Route {
    /// 是否无需鉴权
    pub fn is_public(&self) -> bool {
        self.public
    }

    /// 请求方法
    pub fn method(&self) -> &str {
        &self.method
    }

    /// 请求路径
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// 路由表
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// 创建空路由表
    pub fn new() -> Self {
        Self::default()
    }

    /// 内置路由：服务探活、版本、队列状态
    pub fn with_builtin_routes(jobs: Arc<JobRepository>) -> Self {
        let mut table = Self::new();
        table.register(
            "GET",
            "/server/ping",
            true,
            Arc::new(|_request: ApiRequest| {
                async { Ok::<Value, ApiError>(json!({ "pong": true })) }.boxed()
            }),
        );
        table.register(
            "GET",
            "/server/version",
            true,
            Arc::new(|_request: ApiRequest| {
                async { Ok::<Value, ApiError>(json!({ "version": env!("CARGO_PKG_VERSION") })) }
                    .boxed()
            }),
        );
        table.register(
            "GET",
            "/jobs",
            false,
            Arc::new(move |_request: ApiRequest| {
                let jobs = jobs.clone();
                async move {
                    serde_json::to_value(jobs.snapshot()).map_err(|e| ApiError::Internal {
                        message: e.to_string(),
                    })
                }
                .boxed()
            }),
        );
        table
    }

    /// 注册路由，同一方法和路径重复注册时以后者为准
    pub fn register(
        &mut self,
        method: &str,
        path: impl Into<String>,
        public: bool,
        handler: RouteHandler,
    ) {
        let method = method.to_ascii_uppercase();
        let path = path.into();
        self.routes
            .retain(|r| !(r.method == method && r.path == path));
        debug!(%method, %path, public, "注册路由");
        self.routes.push(Route {
            method,
            path,
            public,
            handler,
        });
    }

    /// 查找路由
    pub fn find(&self, method: &str, path: &str) -> Option<&Route> {
        self.routes
            .iter()
            .find(|r| r.method.eq_ignore_ascii_case(method) && r.path == path)
    }

    /// 路由数
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// 是否没有路由
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// 鉴权守卫
///
/// 对所有非公开路由生效。凭据的校验由外部认证服务负责，这里只要求请求携带凭据。
#[derive(Debug, Default, Clone, Copy)]
pub struct AuthGuard;

impl AuthGuard {
    /// 检查请求
    pub fn check(&self, route: &Route, request: &ApiRequest) -> Result<(), ApiError> {
        if route.is_public() {
            return Ok(());
        }
        match request.header("authorization") {
            Some(credential) if !credential.trim().is_empty() => Ok(()),
            _ => Err(ApiError::Unauthorized),
        }
    }
}

/// 请求拦截器
pub trait RequestInterceptor: Send + Sync {
    /// 拦截器名称
    fn name(&self) -> &str;

    /// 处理函数执行前调用
    fn before(&self, _request: &ApiRequest) -> Result<(), ApiError> {
        Ok(())
    }

    /// 处理函数执行后调用，可以改写结果
    fn after(
        &self,
        _request: &ApiRequest,
        result: Result<Value, ApiError>,
    ) -> Result<Value, ApiError> {
        result
    }
}

/// 请求日志拦截器
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingInterceptor;

impl RequestInterceptor for LoggingInterceptor {
    fn name(&self) -> &str {
        "logging"
    }

    fn before(&self, request: &ApiRequest) -> Result<(), ApiError> {
        let request_id = RequestContext::current().and_then(|c| c.request_id);
        info!(method = %request.method, path = %request.path, ?request_id, "收到请求");
        Ok(())
    }

    fn after(
        &self,
        request: &ApiRequest,
        result: Result<Value, ApiError>,
    ) -> Result<Value, ApiError> {
        let elapsed_ms = RequestContext::current()
            .map(|c| (Utc::now() - c.started_at).num_milliseconds())
            .unwrap_or_default();
        let status = result.as_ref().map_or_else(ApiError::status_code, |_| 200);
        info!(method = %request.method, path = %request.path, status, elapsed_ms, "请求完成");
        result
    }
}

/// 错误转换拦截器
///
/// 内部错误只记录日志，不把细节返回给调用方。
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorInterceptor;

impl RequestInterceptor for ErrorInterceptor {
    fn name(&self) -> &str {
        "error"
    }

    fn after(
        &self,
        request: &ApiRequest,
        result: Result<Value, ApiError>,
    ) -> Result<Value, ApiError> {
        result.map_err(|e| match e {
            ApiError::Internal { message } => {
                error!(path = %request.path, %message, "请求处理失败");
                ApiError::Internal {
                    message: "服务器内部错误".to_string(),
                }
            }
            other => {
                warn!(path = %request.path, error = %other, "请求被拒绝");
                other
            }
        })
    }
}

/// 文件上传拦截器
#[derive(Debug, Clone)]
pub struct FileUploadInterceptor {
    limits: UploadConfig,
}

impl FileUploadInterceptor {
    /// 按上传配置创建
    pub fn new(limits: UploadConfig) -> Self {
        Self { limits }
    }
}

impl RequestInterceptor for FileUploadInterceptor {
    fn name(&self) -> &str {
        "file-upload"
    }

    fn before(&self, request: &ApiRequest) -> Result<(), ApiError> {
        if request.files.len() > self.limits.max_files {
            return Err(ApiError::PayloadTooLarge {
                message: format!(
                    "文件数 {} 超过上限 {}",
                    request.files.len(),
                    self.limits.max_files
                ),
            });
        }
        if let Some(file) = request
            .files
            .iter()
            .find(|f| f.size_bytes > self.limits.max_file_size_bytes)
        {
            return Err(ApiError::PayloadTooLarge {
                message: format!(
                    "文件 {} 大小 {} 超过上限 {}",
                    file.name, file.size_bytes, self.limits.max_file_size_bytes
                ),
            });
        }
        Ok(())
    }
}

tokio::task_local! {
    static REQUEST_CONTEXT: RequestContext;
}

/// 请求上下文
///
/// 在请求处理期间通过任务局部变量传播。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// 请求 ID
    pub request_id: Option<String>,
    /// 请求开始时间
    pub started_at: DateTime<Utc>,
}

impl RequestContext {
    /// 当前任务的请求上下文
    pub fn current() -> Option<Self> {
        REQUEST_CONTEXT.try_with(Clone::clone).ok()
    }
}

/// 请求上下文工厂
#[derive(Debug, Clone)]
pub struct RequestContextFactory {
    config: RequestContextConfig,
}

impl RequestContextFactory {
    /// 按配置创建
    pub fn new(config: RequestContextConfig) -> Self {
        Self { config }
    }

    /// 为请求创建上下文，优先使用请求头中的 ID
    pub fn create(&self, request: &ApiRequest) -> RequestContext {
        let request_id = request
            .header(&self.config.id_header)
            .map(str::to_string)
            .or_else(|| {
                self.config
                    .generate_id
                    .then(|| Uuid::new_v4().to_string())
            });
        RequestContext {
            request_id,
            started_at: Utc::now(),
        }
    }
}

/// 请求处理管线
///
/// 守卫 → 前置拦截 → 处理函数 → 后置拦截（逆序）→ 错误转换。
pub struct RequestPipeline {
    routes: Arc<RouteTable>,
    guard: Arc<AuthGuard>,
    interceptors: Vec<Arc<dyn RequestInterceptor>>,
    contexts: Arc<RequestContextFactory>,
}

impl RequestPipeline {
    /// 创建管线
    pub fn new(
        routes: Arc<RouteTable>,
        guard: Arc<AuthGuard>,
        interceptors: Vec<Arc<dyn RequestInterceptor>>,
        contexts: Arc<RequestContextFactory>,
    ) -> Self {
        Self {
            routes,
            guard,
            interceptors,
            contexts,
        }
    }

    async fn build(ctx: ResolveContext) -> DependencyResult<Arc<Self>> {
        let interceptors: Vec<Arc<dyn RequestInterceptor>> = vec![
            ctx.resolve::<ErrorInterceptor>()?,
            ctx.resolve::<LoggingInterceptor>()?,
            ctx.resolve::<FileUploadInterceptor>()?,
        ];
        Ok(Arc::new(Self::new(
            ctx.resolve::<RouteTable>()?,
            ctx.resolve::<AuthGuard>()?,
            interceptors,
            ctx.resolve::<RequestContextFactory>()?,
        )))
    }

    /// 拦截器名称（执行顺序）
    pub fn interceptor_names(&self) -> Vec<&str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    /// 处理请求
    pub async fn handle(&self, request: ApiRequest) -> ApiResponse {
        let context = self.contexts.create(&request);
        let request_id = context.request_id.clone();
        let result = REQUEST_CONTEXT.scope(context, self.dispatch(request)).await;
        ApiResponse::from_result(result, request_id)
    }

    async fn dispatch(&self, request: ApiRequest) -> Result<Value, ApiError> {
        let route = match self.routes.find(&request.method, &request.path) {
            Some(route) => route,
            None => {
                let missing = Err(ApiError::NotFound {
                    method: request.method.clone(),
                    path: request.path.clone(),
                });
                return self.after_all(&request, missing);
            }
        };

        if let Err(e) = self.guard.check(route, &request) {
            return self.after_all(&request, Err(e));
        }

        for interceptor in &self.interceptors {
            if let Err(e) = interceptor.before(&request) {
                return self.after_all(&request, Err(e));
            }
        }

        let result = (route.handler)(request.clone()).await;
        self.after_all(&request, result)
    }

    fn after_all(
        &self,
        request: &ApiRequest,
        result: Result<Value, ApiError>,
    ) -> Result<Value, ApiError> {
        self.interceptors
            .iter()
            .rev()
            .fold(result, |result, interceptor| interceptor.after(request, result))
    }
}

/// API 服务的专属提供者
pub fn definitions() -> Vec<ProviderDefinition> {
    vec![
        ProviderDefinition::new::<RouteTable, _, _>(ProviderKind::Handler, |ctx| {
            let jobs = ctx.resolve::<JobRepository>();
            async move { jobs.map(|jobs| Arc::new(RouteTable::with_builtin_routes(jobs))) }
        })
        .depends_on::<JobRepository>(),
        ProviderDefinition::instance(ProviderKind::Guard, Arc::new(AuthGuard)),
        ProviderDefinition::instance(ProviderKind::Interceptor, Arc::new(LoggingInterceptor)),
        ProviderDefinition::instance(ProviderKind::Interceptor, Arc::new(ErrorInterceptor)),
        ProviderDefinition::new::<FileUploadInterceptor, _, _>(ProviderKind::Interceptor, |ctx| {
            let config = ctx.resolve::<ConfigRepository>();
            async move {
                config.map(|c| Arc::new(FileUploadInterceptor::new(c.config().upload.clone())))
            }
        })
        .depends_on::<ConfigRepository>(),
        ProviderDefinition::new::<RequestContextFactory, _, _>(ProviderKind::Context, |ctx| {
            let config = ctx.resolve::<ConfigRepository>();
            async move {
                config.map(|c| {
                    Arc::new(RequestContextFactory::new(c.config().request_context.clone()))
                })
            }
        })
        .depends_on::<ConfigRepository>(),
        ProviderDefinition::new::<RequestPipeline, _, _>(
            ProviderKind::Handler,
            RequestPipeline::build,
        )
        .depends_on::<RouteTable>()
        .depends_on::<AuthGuard>()
        .depends_on::<ErrorInterceptor>()
        .depends_on::<LoggingInterceptor>()
        .depends_on::<FileUploadInterceptor>()
        .depends_on::<RequestContextFactory>(),
        ProviderDefinition::new::<SchedulerRegistry, _, _>(ProviderKind::Scheduler, build_api_tasks)
            .depends_on::<ConfigRepository>()
            .depends_on::<DatabaseRepository>(),
        ProviderDefinition::new::<RecurringTaskScheduler, _, _>(ProviderKind::Scheduler, |ctx| {
            let registry = ctx.resolve::<SchedulerRegistry>();
            async move { registry.map(|r| Arc::new(RecurringTaskScheduler::new(r))) }
        })
        .depends_on::<SchedulerRegistry>(),
    ]
}

/// API 服务自带的周期任务
async fn build_api_tasks(ctx: ResolveContext) -> DependencyResult<Arc<SchedulerRegistry>> {
    let config = ctx.resolve::<ConfigRepository>()?;
    let database = ctx.resolve::<DatabaseRepository>()?;
    let registry = SchedulerRegistry::new();

    let scheduler = &config.config().scheduler;
    if scheduler.enabled {
        let probe: TaskFn = Arc::new(move || {
            let database = database.clone();
            async move { database.ping().await.map_err(|e| e.to_string()) }.boxed()
        });
        registry
            .register(
                DATABASE_HEALTH_CHECK_TASK,
                scheduler.database_probe_interval(),
                probe,
            )
            .map_err(|e| DependencyError::creation_failed("SchedulerRegistry", e))?;
    }
    Ok(Arc::new(registry))
}

/// 已组合的 API 服务
pub struct ApiWorker {
    registry: Arc<ComponentRegistryImpl>,
    context: LifecycleContext,
    pipeline: Arc<RequestPipeline>,
    scheduler: Arc<RecurringTaskScheduler>,
}

impl ApiWorker {
    /// 在共享组件目录之上组合 API 服务
    pub async fn compose(shared: &SharedComponents) -> InfrastructureResult<Self> {
        let registry = specialize(shared, WorkerKind::Api, definitions()).await?;
        name_logger(&registry, WorkerKind::Api)?;
        let pipeline = registry.resolve::<RequestPipeline>()?;
        debug!(interceptors = ?pipeline.interceptor_names(), "API 请求管线就绪");

        Ok(Self {
            context: lifecycle_context(&registry)?,
            pipeline,
            scheduler: registry.resolve::<RecurringTaskScheduler>()?,
            registry,
        })
    }

    /// 专属注册表
    pub fn registry(&self) -> &Arc<ComponentRegistryImpl> {
        &self.registry
    }

    /// 请求处理管线
    pub fn pipeline(&self) -> &Arc<RequestPipeline> {
        &self.pipeline
    }

    /// 周期任务调度器
    pub fn scheduler(&self) -> &Arc<RecurringTaskScheduler> {
        &self.scheduler
    }
}

impl WorkerLifecycle for ApiWorker {
    fn worker_kind(&self) -> WorkerKind {
        WorkerKind::Api
    }

    fn lifecycle_context(&self) -> &LifecycleContext {
        &self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config_abstractions::QueueDefinition;

    fn pipeline() -> RequestPipeline {
        let jobs = Arc::new(JobRepository::new(&[QueueDefinition::new("alpha", 1)]));
        let mut routes = RouteTable::with_builtin_routes(jobs);
        routes.register(
            "POST",
            "/assets",
            true,
            Arc::new(|request: ApiRequest| {
                async move {
                    match request.body.get("fail") {
                        Some(_) => Err(ApiError::Internal {
                            message: "disk full".to_string(),
                        }),
                        None => Ok(json!({
                            "files": request.files.len(),
                            "request_id": RequestContext::current().and_then(|c| c.request_id),
                        })),
                    }
                }
                .boxed()
            }),
        );

        RequestPipeline::new(
            Arc::new(routes),
            Arc::new(AuthGuard),
            vec![
                Arc::new(ErrorInterceptor),
                Arc::new(LoggingInterceptor),
                Arc::new(FileUploadInterceptor::new(UploadConfig {
                    max_file_size_bytes: 10,
                    max_files: 2,
                })),
            ],
            Arc::new(RequestContextFactory::new(RequestContextConfig::default())),
        )
    }

    #[tokio::test]
    async fn public_routes_skip_the_guard() {
        let response = pipeline()
            .handle(ApiRequest::new("get", "/server/ping"))
            .await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body, json!({ "pong": true }));
        assert!(response.request_id.is_some());
    }

    #[tokio::test]
    async fn protected_routes_require_credentials() {
        let pipeline = pipeline();

        let denied = pipeline.handle(ApiRequest::new("GET", "/jobs")).await;
        assert_eq!(denied.status, 401);

        let allowed = pipeline
            .handle(ApiRequest::new("GET", "/jobs").with_header("Authorization", "Bearer token"))
            .await;
        assert_eq!(allowed.status, 200);
        assert_eq!(allowed.body[0]["name"], "alpha");
        assert_eq!(allowed.body[0]["paused"], true);
    }

    #[tokio::test]
    async fn request_id_header_is_propagated_to_handlers() {
        let response = pipeline()
            .handle(
                ApiRequest::new("POST", "/assets")
                    .with_header("X-Request-Id", "req-42")
                    .with_file("a.png", 4),
            )
            .await;
        assert_eq!(response.request_id.as_deref(), Some("req-42"));
        assert_eq!(response.body["request_id"], "req-42");
        assert_eq!(response.body["files"], 1);
    }

    #[tokio::test]
    async fn uploads_over_the_limit_are_rejected() {
        let pipeline = pipeline();
        let too_big = pipeline
            .handle(ApiRequest::new("POST", "/assets").with_file("a.png", 11))
            .await;
        assert_eq!(too_big.status, 413);

        let too_many = pipeline
            .handle(
                ApiRequest::new("POST", "/assets")
                    .with_file("a", 1)
                    .with_file("b", 1)
                    .with_file("c", 1),
            )
            .await;
        assert_eq!(too_many.status, 413);
    }

    #[tokio::test]
    async fn internal_errors_are_masked_and_unknown_routes_are_404() {
        let pipeline = pipeline();
        let mut request = ApiRequest::new("POST", "/assets");
        request.body = json!({ "fail": true });

        let failed = pipeline.handle(request).await;
        assert_eq!(failed.status, 500);
        assert_eq!(failed.body["message"], "内部错误: 服务器内部错误");

        let missing = pipeline.handle(ApiRequest::new("GET", "/nowhere")).await;
        assert_eq!(missing.status, 404);
        assert!(!missing.is_success());
    }
}
