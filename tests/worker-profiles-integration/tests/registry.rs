//! 注册表构建顺序与连接错误钩子

mod common;

use common::Harness;
use di_abstractions::{ComponentLookup, ComponentLookupExt, ProviderDefinition};
use di_impl::{RegistryBuilder, RegistryHandle};
use infrastructure_common::{
    ConnectionError, ConnectionErrorKind, DatabaseLifecycle, DependencyError, ProviderKind,
    WorkerKind,
};
use infrastructure_composition::{ConnectionResiliencyHook, DatabaseService};
use parking_lot::Mutex;
use std::sync::Arc;

struct A;

struct B {
    a: Arc<A>,
}

struct C {
    b: Arc<B>,
}

type BuildLog = Arc<Mutex<Vec<&'static str>>>;

fn definition_a(log: BuildLog) -> ProviderDefinition {
    ProviderDefinition::new::<A, _, _>(ProviderKind::Repository, move |_ctx| {
        let log = log.clone();
        async move {
            log.lock().push("A");
            Ok(Arc::new(A))
        }
    })
}

fn definition_b(log: BuildLog) -> ProviderDefinition {
    ProviderDefinition::new::<B, _, _>(ProviderKind::Service, move |ctx| {
        let log = log.clone();
        async move {
            log.lock().push("B");
            ctx.resolve::<A>().map(|a| Arc::new(B { a }))
        }
    })
    .depends_on::<A>()
}

fn definition_c(log: BuildLog) -> ProviderDefinition {
    ProviderDefinition::new::<C, _, _>(ProviderKind::Handler, move |ctx| {
        let log = log.clone();
        async move {
            log.lock().push("C");
            ctx.resolve::<B>().map(|b| Arc::new(C { b }))
        }
    })
    .depends_on::<B>()
}

#[tokio::test]
async fn shared_then_profile_components_build_in_dependency_order() -> anyhow::Result<()> {
    let log = BuildLog::default();

    // B 先于 A 声明，构建顺序仍由依赖决定
    let mut shared = RegistryBuilder::shared();
    shared.register(definition_b(log.clone()))?;
    shared.register(definition_a(log.clone()))?;
    let shared = shared.build().await?;

    let mut profile = RegistryBuilder::specialize(shared.clone(), WorkerKind::Api);
    profile.register(definition_c(log.clone()))?;
    let profile = profile.build().await?;

    assert_eq!(*log.lock(), vec!["A", "B", "C"]);

    let c = profile.resolve_by_name::<C>("C")?;
    let b = profile.resolve::<B>()?;
    assert!(Arc::ptr_eq(&c.b, &b));
    assert!(Arc::ptr_eq(&b.a, &shared.resolve::<A>()?));
    Ok(())
}

#[tokio::test]
async fn profile_cannot_depend_on_undeclared_capability() {
    let log = BuildLog::default();
    let shared = RegistryBuilder::shared()
        .build()
        .await
        .expect("空注册表构建失败");

    let mut profile = RegistryBuilder::specialize(shared, WorkerKind::Microservices);
    profile
        .register(definition_c(log.clone()))
        .expect("注册失败");
    let result = profile.build().await;

    assert!(matches!(
        result,
        Err(DependencyError::MissingDependency { .. })
    ));
    assert!(log.lock().is_empty());
}

#[tokio::test]
async fn cyclic_definitions_never_produce_a_registry() {
    struct Left;
    struct Right;

    let mut builder = RegistryBuilder::shared();
    builder
        .register(
            ProviderDefinition::new::<Left, _, _>(ProviderKind::Service, |_ctx| async {
                Ok(Arc::new(Left))
            })
            .depends_on::<Right>(),
        )
        .expect("注册失败");
    builder
        .register(
            ProviderDefinition::new::<Right, _, _>(ProviderKind::Service, |_ctx| async {
                Ok(Arc::new(Right))
            })
            .depends_on::<Left>(),
        )
        .expect("注册失败");

    assert!(matches!(
        builder.build().await,
        Err(DependencyError::CircularDependency { .. })
    ));
}

struct RecordingLifecycle {
    received: Mutex<Vec<ConnectionError>>,
}

impl DatabaseLifecycle for RecordingLifecycle {
    fn handle_connection_error(&self, error: ConnectionError) {
        self.received.lock().push(error);
    }
}

#[tokio::test]
async fn hook_absorbs_errors_without_a_lifecycle_component() -> anyhow::Result<()> {
    let handle = RegistryHandle::new();
    let hook = Arc::new(ConnectionResiliencyHook::new(handle.clone()));

    let mut builder = RegistryBuilder::shared();
    builder.register(ProviderDefinition::instance(
        ProviderKind::Collaborator,
        hook.clone(),
    ))?;
    let registry = builder.build().await?;
    handle.bind(&registry);

    let handler = hook.handler();
    handler(ConnectionError::new(ConnectionErrorKind::BrokenSocket, "reset by peer"));

    assert_eq!(hook.absorbed_count(), 1);
    assert_eq!(hook.delegated_count(), 0);
    assert_eq!(registry.capabilities().len(), 1);
    Ok(())
}

#[tokio::test]
async fn hook_delegates_the_exact_error() -> anyhow::Result<()> {
    let handle = RegistryHandle::new();
    let hook = Arc::new(ConnectionResiliencyHook::new(handle.clone()));
    let lifecycle = Arc::new(RecordingLifecycle {
        received: Mutex::new(Vec::new()),
    });

    let mut builder = RegistryBuilder::shared();
    builder.register(ProviderDefinition::instance::<dyn DatabaseLifecycle>(
        ProviderKind::Service,
        lifecycle.clone(),
    ))?;
    let registry = builder.build().await?;

    // 绑定之前的错误被吸收
    let handler = hook.handler();
    handler(ConnectionError::new(ConnectionErrorKind::Timeout, "early"));
    assert_eq!(hook.absorbed_count(), 1);

    handle.bind(&registry);
    let error =
        ConnectionError::new(ConnectionErrorKind::PoolExhausted, "remaining slots reserved");
    handler(error.clone());

    assert_eq!(*lifecycle.received.lock(), vec![error]);
    assert_eq!(hook.delegated_count(), 1);
    Ok(())
}

#[tokio::test]
async fn composed_profiles_route_errors_to_the_database_service() -> anyhow::Result<()> {
    let harness = Harness::assemble().await?;
    let profile =
        infrastructure_composition::WorkerProfile::compose(WorkerKind::Api, &harness.shared)
            .await?;
    let handler = harness
        .persistence
        .handler
        .lock()
        .clone()
        .ok_or_else(|| anyhow::anyhow!("持久化层未收到回调"))?;

    let error = ConnectionError::new(ConnectionErrorKind::Other, "relation does not exist");
    handler(error.clone());

    let service = profile.registry().resolve::<DatabaseService>()?;
    assert_eq!(service.last_error(), Some(error));
    Ok(())
}

#[tokio::test]
async fn dropped_profile_does_not_orphan_the_hook() -> anyhow::Result<()> {
    let harness = Harness::assemble().await?;
    let admin =
        infrastructure_composition::WorkerProfile::compose(WorkerKind::Admin, &harness.shared)
            .await?;
    {
        let api =
            infrastructure_composition::WorkerProfile::compose(WorkerKind::Api, &harness.shared)
                .await?;
        assert_eq!(api.kind(), WorkerKind::Api);
    }

    let handler = harness
        .persistence
        .handler
        .lock()
        .clone()
        .ok_or_else(|| anyhow::anyhow!("持久化层未收到回调"))?;
    let error = ConnectionError::new(ConnectionErrorKind::BrokenSocket, "reset by peer");
    handler(error.clone());

    let shared = harness.shared.registry();
    let hook = shared.resolve::<ConnectionResiliencyHook>()?;
    assert_eq!(hook.delegated_count(), 1);
    assert_eq!(hook.absorbed_count(), 0);
    assert_eq!(shared.resolve::<DatabaseService>()?.last_error(), Some(error));
    assert!(admin.registry().try_resolve::<DatabaseService>().is_some());
    Ok(())
}

#[tokio::test]
async fn composing_profiles_never_rebinds_the_hook() -> anyhow::Result<()> {
    let harness = Harness::assemble().await?;
    let shared = harness.shared.registry().clone();

    for kind in WorkerKind::ALL {
        drop(infrastructure_composition::WorkerProfile::compose(kind, &harness.shared).await?);
        let bound = harness
            .shared
            .handle()
            .upgrade()
            .ok_or_else(|| anyhow::anyhow!("句柄未绑定"))?;
        assert!(Arc::ptr_eq(&bound, &shared));
    }
    Ok(())
}
