//! 三种工作进程在同一共享组件目录上的组合与生命周期

mod common;

use common::Harness;
use di_abstractions::ComponentLookupExt;
use infrastructure_common::{EventBus, WorkerKind, WorkerLifecycle};
use infrastructure_composition::workers::ApiRequest;
use infrastructure_composition::{
    ConfigRepository, DatabaseRepository, DatabaseService, JobRepository, WorkerProfile,
};
use std::sync::Arc;

#[tokio::test]
async fn shared_components_are_the_same_instance_in_every_profile() -> anyhow::Result<()> {
    let harness = Harness::assemble().await?;

    let mut profiles = Vec::new();
    for kind in WorkerKind::ALL {
        profiles.push(WorkerProfile::compose(kind, &harness.shared).await?);
    }

    let shared = harness.shared.registry();
    for profile in &profiles {
        let registry = profile.registry();
        assert!(Arc::ptr_eq(
            &registry.resolve::<JobRepository>()?,
            &shared.resolve::<JobRepository>()?
        ));
        assert!(Arc::ptr_eq(
            &registry.resolve::<DatabaseService>()?,
            &shared.resolve::<DatabaseService>()?
        ));
        assert!(Arc::ptr_eq(
            &registry.resolve::<ConfigRepository>()?,
            &shared.resolve::<ConfigRepository>()?
        ));
        assert!(Arc::ptr_eq(
            &registry.resolve::<dyn EventBus>()?,
            &shared.resolve::<dyn EventBus>()?
        ));
    }

    // 持久化层只配置一次
    assert_eq!(*harness.persistence.configure_calls.lock(), 1);
    Ok(())
}

#[tokio::test]
async fn api_and_microservices_order_telemetry_around_events() -> anyhow::Result<()> {
    for kind in [WorkerKind::Api, WorkerKind::Microservices] {
        let harness = Harness::assemble().await?;
        let profile = WorkerProfile::compose(kind, &harness.shared).await?;
        let lifecycle = profile
            .lifecycle()
            .ok_or_else(|| anyhow::anyhow!("{kind} 没有生命周期"))?;

        lifecycle.on_start().await?;
        lifecycle.on_stop().await?;

        assert_eq!(
            harness.journal.entries(),
            vec![
                "setup".to_string(),
                format!("emit:app.bootstrap:{kind}"),
                format!("emit:app.shutdown:{kind}"),
                "teardown".to_string(),
            ]
        );
    }
    Ok(())
}

#[tokio::test]
async fn api_start_registers_shared_and_api_classes_then_emits_once() -> anyhow::Result<()> {
    let harness = Harness::assemble().await?;
    let profile = WorkerProfile::compose(WorkerKind::Api, &harness.shared).await?;

    profile
        .lifecycle()
        .ok_or_else(|| anyhow::anyhow!("API 没有生命周期"))?
        .on_start()
        .await?;

    let received = harness.telemetry.received.lock().clone();
    assert_eq!(received.len(), 1);
    let mut registered: Vec<String> = received[0].all().map(|c| c.name.clone()).collect();
    let mut expected: Vec<String> = profile
        .registry()
        .classes()
        .into_iter()
        .map(|c| c.name)
        .collect();
    registered.sort();
    expected.sort();
    assert_eq!(registered, expected);

    // 共享组件与 API 专属组件都在列表中
    assert!(expected.iter().any(|name| name == "JobService"));
    assert!(expected.iter().any(|name| name == "RequestPipeline"));

    let bootstraps = harness
        .journal
        .entries()
        .into_iter()
        .filter(|entry| entry == "emit:app.bootstrap:api")
        .count();
    assert_eq!(bootstraps, 1);
    Ok(())
}

#[tokio::test]
async fn admin_profile_has_no_lifecycle_and_never_emits() -> anyhow::Result<()> {
    let harness = Harness::assemble().await?;
    let profile = WorkerProfile::compose(WorkerKind::Admin, &harness.shared).await?;

    assert!(profile.lifecycle().is_none());
    let admin = profile
        .as_admin()
        .ok_or_else(|| anyhow::anyhow!("不是管理命令进程"))?;
    let status = admin.run("database-status", &[]).await?;

    assert_eq!(status["closed"], false);
    assert!(harness.journal.entries().is_empty());
    Ok(())
}

#[tokio::test]
async fn api_pipeline_serves_builtin_routes() -> anyhow::Result<()> {
    let harness = Harness::assemble().await?;
    let profile = WorkerProfile::compose(WorkerKind::Api, &harness.shared).await?;
    let api = profile
        .as_api()
        .ok_or_else(|| anyhow::anyhow!("不是 API 服务"))?;
    assert_eq!(
        api.pipeline().interceptor_names(),
        ["error", "logging", "file-upload"]
    );

    let pong = api.pipeline().handle(ApiRequest::new("get", "/server/ping")).await;
    assert_eq!(pong.status, 200);

    let jobs = api.pipeline().handle(ApiRequest::new("GET", "/jobs")).await;
    assert_eq!(jobs.status, 401);

    let jobs = api
        .pipeline()
        .handle(ApiRequest::new("GET", "/jobs").with_header("Authorization", "Bearer t"))
        .await;
    assert_eq!(jobs.status, 200);
    assert_eq!(jobs.body.as_array().map(Vec::len), Some(3));
    Ok(())
}

#[tokio::test]
async fn database_repository_is_built_before_profiles_exist() -> anyhow::Result<()> {
    let harness = Harness::assemble().await?;

    assert!(harness.shared.registry().try_resolve::<DatabaseRepository>().is_some());
    assert!(harness.persistence.handler.lock().is_some());
    assert!(harness.shared.handle().is_bound());
    Ok(())
}
