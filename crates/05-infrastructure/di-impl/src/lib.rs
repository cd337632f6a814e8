//! # 组件注册表具体实现
//!
//! 提供共享注册表、工作进程专属注册表以及延迟绑定的注册表句柄。

use di_abstractions::{
    ComponentLookup, DependencyGraph, ErasedInstance, ProviderDefinition, RegistryScope,
    ResolveContext,
};
use infrastructure_common::{
    Capability, ClassIdentity, DependencyError, DependencyResult, ProviderKind, WorkerKind,
};
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

/// 已构建的组件
#[derive(Clone)]
struct RegistryEntry {
    capability: Capability,
    kind: ProviderKind,
    instance: ErasedInstance,
}

/// 已构建的组件注册表
///
/// 构建完成后只读。专属注册表持有父注册表（共享组件目录），
/// 查找时先查本地再查父级。
pub struct ComponentRegistryImpl {
    scope: RegistryScope,
    parent: Option<Arc<ComponentRegistryImpl>>,
    entries: HashMap<TypeId, RegistryEntry>,
    names: HashMap<String, Vec<TypeId>>,
    construction_order: Vec<TypeId>,
}

impl ComponentRegistryImpl {
    /// 注册表作用域
    pub fn scope(&self) -> RegistryScope {
        self.scope
    }

    /// 父注册表
    pub fn parent(&self) -> Option<&Arc<ComponentRegistryImpl>> {
        self.parent.as_ref()
    }

    /// 本地组件数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 本地是否没有任何组件
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 能力是否在本地注册
    pub fn contains_local(&self, type_id: TypeId) -> bool {
        self.entries.contains_key(&type_id)
    }

    /// 本地能力，按构建顺序
    pub fn local_capabilities(&self) -> Vec<Capability> {
        self.construction_order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .map(|entry| entry.capability.clone())
            .collect()
    }

    /// 可见组件的类标识，父注册表在前，不含别名
    pub fn classes(&self) -> Vec<ClassIdentity> {
        let mut classes = self
            .parent
            .as_ref()
            .map(|p| p.classes())
            .unwrap_or_default();
        classes.extend(self.local_classes());
        classes
    }

    /// 本地组件的类标识，按构建顺序，不含别名
    pub fn local_classes(&self) -> Vec<ClassIdentity> {
        self.construction_order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .filter(|entry| entry.kind.is_reportable())
            .map(|entry| ClassIdentity::new(&entry.capability, entry.kind))
            .collect()
    }

    /// 父级在前，收集所有名称匹配的条目
    fn entries_named<'a>(&'a self, name: &str, found: &mut Vec<&'a RegistryEntry>) {
        if let Some(parent) = &self.parent {
            parent.entries_named(name, found);
        }
        if let Some(ids) = self.names.get(name) {
            found.extend(ids.iter().filter_map(|id| self.entries.get(id)));
        }
    }

    fn owner_scope(&self, type_id: TypeId) -> Option<RegistryScope> {
        if self.entries.contains_key(&type_id) {
            Some(self.scope)
        } else {
            self.parent.as_ref().and_then(|p| p.owner_scope(type_id))
        }
    }
}

impl ComponentLookup for ComponentRegistryImpl {
    fn lookup(&self, type_id: TypeId) -> Option<ErasedInstance> {
        match self.entries.get(&type_id) {
            Some(entry) => Some(entry.instance.clone()),
            None => self.parent.as_ref().and_then(|p| p.lookup(type_id)),
        }
    }

    fn lookup_by_name(&self, name: &str) -> DependencyResult<Option<ErasedInstance>> {
        let mut found = Vec::new();
        self.entries_named(name, &mut found);

        match found.as_slice() {
            [] => Ok(None),
            [entry] => Ok(Some(entry.instance.clone())),
            entries => Err(DependencyError::AmbiguousName {
                name: name.to_string(),
                candidates: entries
                    .iter()
                    .map(|entry| entry.capability.type_name())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }

    fn capabilities(&self) -> Vec<Capability> {
        let mut all = self
            .parent
            .as_ref()
            .map(|p| p.capabilities())
            .unwrap_or_default();
        all.extend(self.local_capabilities());
        all
    }
}

impl fmt::Debug for ComponentRegistryImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistryImpl")
            .field("scope", &self.scope)
            .field("components", &self.local_capabilities())
            .field("parent", &self.parent.as_ref().map(|p| p.scope))
            .finish()
    }
}

/// 注册表构建器
///
/// 声明阶段只收集提供者，`build` 时统一校验并按依赖顺序构建。
/// 任何错误都不会留下部分构建的注册表。
pub struct RegistryBuilder {
    scope: RegistryScope,
    parent: Option<Arc<ComponentRegistryImpl>>,
    definitions: Vec<ProviderDefinition>,
}

impl RegistryBuilder {
    /// 共享组件目录构建器
    pub fn shared() -> Self {
        Self {
            scope: RegistryScope::Shared,
            parent: None,
            definitions: Vec::new(),
        }
    }

    /// 在共享组件目录之上构建工作进程专属注册表
    pub fn specialize(parent: Arc<ComponentRegistryImpl>, kind: WorkerKind) -> Self {
        Self {
            scope: RegistryScope::Profile(kind),
            parent: Some(parent),
            definitions: Vec::new(),
        }
    }

    /// 作用域
    pub fn scope(&self) -> RegistryScope {
        self.scope
    }

    /// 注册提供者
    ///
    /// 同一能力不能注册两次，也不能遮蔽父注册表中的能力。能力只按类型区分，
    /// 短名称相同的不同类型可以共存。
    pub fn register(&mut self, definition: ProviderDefinition) -> DependencyResult<()> {
        let capability = definition.capability();

        let existing_scope = if self.definitions.iter().any(|d| d.capability() == capability) {
            Some(self.scope)
        } else {
            self.parent
                .as_ref()
                .and_then(|p| p.owner_scope(capability.type_id()))
        };

        if let Some(existing_scope) = existing_scope {
            return Err(DependencyError::DuplicateCapability {
                capability: capability.name().to_string(),
                existing_scope: existing_scope.to_string(),
            });
        }

        debug!("注册组件: {} ({})", capability.name(), self.scope);
        self.definitions.push(definition);
        Ok(())
    }

    /// 批量注册提供者
    pub fn register_all(
        &mut self,
        definitions: impl IntoIterator<Item = ProviderDefinition>,
    ) -> DependencyResult<()> {
        definitions
            .into_iter()
            .try_for_each(|definition| self.register(definition))
    }

    /// 校验并构建注册表
    pub async fn build(self) -> DependencyResult<Arc<ComponentRegistryImpl>> {
        self.validate_dependencies()?;

        let graph = DependencyGraph::from_definitions(&self.definitions);
        let order = graph.construction_order()?;

        let mut entries: HashMap<TypeId, RegistryEntry> = HashMap::new();
        let mut construction_order = Vec::with_capacity(order.len());

        for index in order {
            let definition = &self.definitions[index];
            let capability = definition.capability().clone();

            let mut dependencies = HashMap::new();
            for dep in definition.dependencies() {
                let instance = entries
                    .get(&dep.type_id())
                    .map(|entry| entry.instance.clone())
                    .or_else(|| self.parent.as_ref().and_then(|p| p.lookup(dep.type_id())))
                    .ok_or_else(|| DependencyError::MissingDependency {
                        component: capability.name().to_string(),
                        dependency: dep.name().to_string(),
                        scope: self.scope.to_string(),
                    })?;
                dependencies.insert(dep.type_id(), instance);
            }

            let ctx = ResolveContext::new(capability.clone(), dependencies);
            let instance = (definition.factory())(ctx).await?;

            debug!("组件构建完成: {}", capability.name());
            construction_order.push(capability.type_id());
            entries.insert(
                capability.type_id(),
                RegistryEntry {
                    capability,
                    kind: definition.kind(),
                    instance,
                },
            );
        }

        let mut names: HashMap<String, Vec<TypeId>> = HashMap::new();
        for entry in entries.values() {
            let capability = &entry.capability;
            for key in [capability.name(), capability.type_name()] {
                let ids = names.entry(key.to_string()).or_default();
                if !ids.contains(&capability.type_id()) {
                    ids.push(capability.type_id());
                }
            }
        }

        info!(
            "构建注册表完成 ({})，共 {} 个组件",
            self.scope,
            entries.len()
        );

        Ok(Arc::new(ComponentRegistryImpl {
            scope: self.scope,
            parent: self.parent,
            entries,
            names,
            construction_order,
        }))
    }

    /// 每个声明的依赖要么在本注册表中声明，要么在父注册表中可见
    fn validate_dependencies(&self) -> DependencyResult<()> {
        for definition in &self.definitions {
            for dep in definition.dependencies() {
                let local = self
                    .definitions
                    .iter()
                    .any(|d| d.capability() == dep);
                let inherited = self
                    .parent
                    .as_ref()
                    .map(|p| p.contains(dep.type_id()))
                    .unwrap_or(false);

                if !local && !inherited {
                    return Err(DependencyError::MissingDependency {
                        component: definition.capability().name().to_string(),
                        dependency: dep.name().to_string(),
                        scope: self.scope.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// 注册表句柄
///
/// 在注册表构建之前创建，构建完成后绑定。只持有弱引用，
/// 因此组件持有句柄不会形成引用环。多次绑定时以最后一次为准。
#[derive(Clone, Default)]
pub struct RegistryHandle {
    inner: Arc<RwLock<Weak<ComponentRegistryImpl>>>,
}

impl RegistryHandle {
    /// 创建未绑定的句柄
    pub fn new() -> Self {
        Self::default()
    }

    /// 绑定注册表
    pub fn bind(&self, registry: &Arc<ComponentRegistryImpl>) {
        *self.inner.write() = Arc::downgrade(registry);
        debug!("注册表句柄已绑定: {}", registry.scope());
    }

    /// 获取当前绑定的注册表
    pub fn upgrade(&self) -> Option<Arc<ComponentRegistryImpl>> {
        self.inner.read().upgrade()
    }

    /// 是否已绑定到仍然存活的注册表
    pub fn is_bound(&self) -> bool {
        self.inner.read().strong_count() > 0
    }
}

impl fmt::Debug for RegistryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryHandle")
            .field("scope", &self.upgrade().map(|r| r.scope()))
            .finish()
    }
}
