//! 提供者声明与依赖图

use crate::factory::{factory_fn, instance_fn, ComponentFactoryFn};
use crate::resolver::ResolveContext;
use infrastructure_common::{
    Capability, DependencyError, DependencyResult, ProviderKind, WorkerKind,
};
use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// 注册表作用域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistryScope {
    /// 所有工作进程共享的组件目录
    Shared,
    /// 某个工作进程的专属注册表
    Profile(WorkerKind),
}

impl fmt::Display for RegistryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared => f.write_str("shared"),
            Self::Profile(kind) => write!(f, "{} profile", kind),
        }
    }
}

/// 提供者声明
///
/// 描述一个能力由谁构建、构建时依赖哪些能力。
#[derive(Clone)]
pub struct ProviderDefinition {
    capability: Capability,
    kind: ProviderKind,
    dependencies: Vec<Capability>,
    factory: ComponentFactoryFn,
}

impl ProviderDefinition {
    /// 以异步工厂声明 `T`
    pub fn new<T, F, Fut>(kind: ProviderKind, factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(ResolveContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DependencyResult<Arc<T>>> + Send + 'static,
    {
        Self::from_parts(Capability::of::<T>(), kind, factory_fn(factory))
    }

    /// 声明一个已存在的实例
    pub fn instance<T>(kind: ProviderKind, instance: Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Self::from_parts(Capability::of::<T>(), kind, instance_fn(instance))
    }

    /// 把已注册的 `Source` 以另一种能力 `Target` 暴露出来
    ///
    /// 别名与源能力指向同一个实例。
    pub fn alias<Target, Source, F>(convert: F) -> Self
    where
        Target: ?Sized + Send + Sync + 'static,
        Source: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<Source>) -> Arc<Target> + Send + Sync + 'static,
    {
        let convert = Arc::new(convert);
        Self::new::<Target, _, _>(ProviderKind::Alias, move |ctx| {
            let convert = convert.clone();
            async move { ctx.resolve::<Source>().map(|source| (*convert)(source)) }
        })
        .depends_on::<Source>()
    }

    fn from_parts(capability: Capability, kind: ProviderKind, factory: ComponentFactoryFn) -> Self {
        Self {
            capability,
            kind,
            dependencies: Vec::new(),
            factory,
        }
    }

    /// 声明依赖
    pub fn depends_on<D: ?Sized + 'static>(self) -> Self {
        self.with_dependency(Capability::of::<D>())
    }

    /// 声明依赖（能力形式）
    pub fn with_dependency(mut self, dependency: Capability) -> Self {
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
        self
    }

    /// 提供的能力
    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    /// 提供者类别
    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// 声明的依赖
    pub fn dependencies(&self) -> &[Capability] {
        &self.dependencies
    }

    /// 组件工厂
    pub fn factory(&self) -> &ComponentFactoryFn {
        &self.factory
    }
}

impl fmt::Debug for ProviderDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderDefinition")
            .field("capability", &self.capability)
            .field("kind", &self.kind)
            .field("dependencies", &self.dependencies)
            .field("factory", &"<function>")
            .finish()
    }
}

/// 依赖图节点
#[derive(Debug, Clone)]
pub struct DependencyGraphNode {
    /// 组件能力
    pub capability: Capability,
    /// 同一注册表内依赖节点的下标
    pub local_dependencies: Vec<usize>,
}

/// 依赖图
///
/// 只包含同一注册表内的边；对父注册表的依赖在构建前已经满足。
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<DependencyGraphNode>,
}

impl DependencyGraph {
    /// 根据提供者声明构建依赖图
    pub fn from_definitions(definitions: &[ProviderDefinition]) -> Self {
        let index: HashMap<TypeId, usize> = definitions
            .iter()
            .enumerate()
            .map(|(i, def)| (def.capability().type_id(), i))
            .collect();

        let nodes = definitions
            .iter()
            .map(|def| DependencyGraphNode {
                capability: def.capability().clone(),
                local_dependencies: def
                    .dependencies()
                    .iter()
                    .filter_map(|dep| index.get(&dep.type_id()).copied())
                    .collect(),
            })
            .collect();

        Self { nodes }
    }

    /// 节点列表
    pub fn nodes(&self) -> &[DependencyGraphNode] {
        &self.nodes
    }

    /// 检测循环依赖
    pub fn detect_cycles(&self) -> DependencyResult<()> {
        // 使用深度优先搜索检测循环依赖
        let mut visited = HashSet::new();
        let mut path = Vec::new();

        for node in 0..self.nodes.len() {
            if !visited.contains(&node) {
                self.dfs_check(node, &mut visited, &mut path)?;
            }
        }

        Ok(())
    }

    fn dfs_check(
        &self,
        current: usize,
        visited: &mut HashSet<usize>,
        path: &mut Vec<usize>,
    ) -> DependencyResult<()> {
        if let Some(start) = path.iter().position(|&n| n == current) {
            let chain = path[start..]
                .iter()
                .chain(std::iter::once(&current))
                .map(|&n| self.nodes[n].capability.name())
                .collect::<Vec<_>>()
                .join(" -> ");

            return Err(DependencyError::CircularDependency {
                dependency_chain: chain,
            });
        }

        if visited.contains(&current) {
            return Ok(());
        }

        path.push(current);
        for &dep in &self.nodes[current].local_dependencies {
            self.dfs_check(dep, visited, path)?;
        }
        path.pop();
        visited.insert(current);

        Ok(())
    }

    /// 构建顺序
    ///
    /// 依赖总是先于依赖者；没有先后约束时按声明顺序。
    pub fn construction_order(&self) -> DependencyResult<Vec<usize>> {
        self.detect_cycles()?;

        let mut built = vec![false; self.nodes.len()];
        let mut order = Vec::with_capacity(self.nodes.len());

        while order.len() < self.nodes.len() {
            let next = (0..self.nodes.len()).find(|&n| {
                !built[n] && self.nodes[n].local_dependencies.iter().all(|&d| built[d])
            });

            match next {
                Some(n) => {
                    built[n] = true;
                    order.push(n);
                }
                None => {
                    return Err(DependencyError::CircularDependency {
                        dependency_chain: "无法确定构建顺序".to_string(),
                    })
                }
            }
        }

        Ok(order)
    }
}
