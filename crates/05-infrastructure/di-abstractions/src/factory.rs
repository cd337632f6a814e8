//! 组件工厂抽象
//!
//! 注册表内部以类型擦除的方式保存实例。被擦除的值总是 `Arc<T>`，
//! 因此 `T` 可以是 trait object。

use crate::resolver::ResolveContext;
use futures::future::BoxFuture;
use futures::FutureExt;
use infrastructure_common::DependencyResult;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;

/// 类型擦除后的组件实例
pub type ErasedInstance = Arc<dyn Any + Send + Sync>;

/// 组件工厂函数类型
pub type ComponentFactoryFn = Arc<
    dyn Fn(ResolveContext) -> BoxFuture<'static, DependencyResult<ErasedInstance>> + Send + Sync,
>;

/// 擦除实例类型
pub fn erase<T>(instance: Arc<T>) -> ErasedInstance
where
    T: ?Sized + Send + Sync + 'static,
{
    Arc::new(instance)
}

/// 还原实例类型
pub fn downcast<T>(erased: &ErasedInstance) -> Option<Arc<T>>
where
    T: ?Sized + Send + Sync + 'static,
{
    erased.downcast_ref::<Arc<T>>().cloned()
}

/// 把类型化的异步工厂包装为擦除后的工厂函数
pub fn factory_fn<T, F, Fut>(factory: F) -> ComponentFactoryFn
where
    T: ?Sized + Send + Sync + 'static,
    F: Fn(ResolveContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DependencyResult<Arc<T>>> + Send + 'static,
{
    Arc::new(move |ctx| factory(ctx).map(|built| built.map(erase)).boxed())
}

/// 直接返回既有实例的工厂
pub fn instance_fn<T>(instance: Arc<T>) -> ComponentFactoryFn
where
    T: ?Sized + Send + Sync + 'static,
{
    let erased = erase(instance);
    Arc::new(move |_ctx| {
        let erased = erased.clone();
        async move { Ok(erased) }.boxed()
    })
}
