//! 组件解析接口
//!
//! 构建阶段工厂通过 [`ResolveContext`] 获取依赖；构建完成后，
//! 运行时代码通过 [`ComponentLookup`] 按能力或名称查找组件。

use crate::factory::{downcast, ErasedInstance};
use infrastructure_common::{Capability, DependencyError, DependencyResult};
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// 解析上下文
///
/// 只包含当前组件声明过的依赖，请求其他能力会返回 `UndeclaredDependency`。
#[derive(Clone)]
pub struct ResolveContext {
    component: Capability,
    dependencies: Arc<HashMap<TypeId, ErasedInstance>>,
}

impl ResolveContext {
    /// 创建解析上下文
    pub fn new(component: Capability, dependencies: HashMap<TypeId, ErasedInstance>) -> Self {
        Self {
            component,
            dependencies: Arc::new(dependencies),
        }
    }

    /// 正在构建的组件
    pub fn component(&self) -> &Capability {
        &self.component
    }

    /// 解析已声明的依赖
    pub fn resolve<T>(&self) -> DependencyResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let Some(erased) = self.dependencies.get(&TypeId::of::<T>()) else {
            let dependency = Capability::of::<T>();
            warn!(
                component = self.component.name(),
                dependency = dependency.name(),
                "工厂请求了未声明的依赖"
            );
            return Err(DependencyError::UndeclaredDependency {
                component: self.component.name().to_string(),
                dependency: dependency.name().to_string(),
            });
        };

        downcast::<T>(erased).ok_or_else(|| DependencyError::TypeMismatch {
            type_name: std::any::type_name::<T>().to_string(),
        })
    }
}

impl fmt::Debug for ResolveContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveContext")
            .field("component", &self.component)
            .field("dependencies", &self.dependencies.len())
            .finish()
    }
}

/// 组件查找 trait
///
/// 非严格查找：当前注册表中没有时，会继续在父注册表中查找。
pub trait ComponentLookup: Send + Sync {
    /// 按能力查找
    fn lookup(&self, type_id: TypeId) -> Option<ErasedInstance>;

    /// 按能力名称（短名称或完整类型名）查找
    ///
    /// 多个可见能力共用同一名称时返回 [`DependencyError::AmbiguousName`]。
    fn lookup_by_name(&self, name: &str) -> DependencyResult<Option<ErasedInstance>>;

    /// 能力是否可见
    fn contains(&self, type_id: TypeId) -> bool {
        self.lookup(type_id).is_some()
    }

    /// 当前注册表及其父注册表中可见的全部能力
    fn capabilities(&self) -> Vec<Capability>;
}

/// 类型化查找扩展
pub trait ComponentLookupExt: ComponentLookup {
    /// 查找组件，不存在时返回 `None`
    fn try_resolve<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.lookup(TypeId::of::<T>())
            .and_then(|erased| downcast::<T>(&erased))
    }

    /// 查找组件
    fn resolve<T>(&self) -> DependencyResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let erased = self.lookup(TypeId::of::<T>()).ok_or_else(|| {
            DependencyError::ComponentNotRegistered {
                type_name: std::any::type_name::<T>().to_string(),
            }
        })?;
        downcast::<T>(&erased).ok_or_else(|| DependencyError::TypeMismatch {
            type_name: std::any::type_name::<T>().to_string(),
        })
    }

    /// 按名称查找组件
    fn resolve_by_name<T>(&self, name: &str) -> DependencyResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let erased =
            self.lookup_by_name(name)?
                .ok_or_else(|| DependencyError::ComponentNotRegistered {
                    type_name: name.to_string(),
                })?;
        downcast::<T>(&erased).ok_or_else(|| DependencyError::TypeMismatch {
            type_name: std::any::type_name::<T>().to_string(),
        })
    }
}

impl<L: ComponentLookup + ?Sized> ComponentLookupExt for L {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::erase;

    struct Declared;
    struct Other;

    #[test]
    fn only_declared_dependencies_are_visible() {
        let mut deps = HashMap::new();
        deps.insert(TypeId::of::<Declared>(), erase(Arc::new(Declared)));
        let ctx = ResolveContext::new(Capability::of::<Other>(), deps);

        assert!(ctx.resolve::<Declared>().is_ok());
        match ctx.resolve::<Other>() {
            Err(DependencyError::UndeclaredDependency {
                component,
                dependency,
            }) => {
                assert_eq!(component, "Other");
                assert_eq!(dependency, "Other");
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }
}
