//! 组件能力标识
//!
//! 注册表中的每个条目都以能力（[`Capability`]）为键。能力既可以是具体类型，
//! 也可以是 trait object（例如 `dyn EventBus`）。

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

/// 组件能力标识
///
/// 相等性与哈希只依赖 `TypeId`，名称仅用于诊断输出和按名称查找。
#[derive(Clone)]
pub struct Capability {
    type_id: TypeId,
    type_name: &'static str,
    name: String,
}

impl Capability {
    /// 以类型的短名称作为能力名称
    pub fn of<T: ?Sized + 'static>() -> Self {
        let type_name = std::any::type_name::<T>();
        Self {
            type_id: TypeId::of::<T>(),
            type_name,
            name: short_type_name(type_name),
        }
    }

    /// 类型ID
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// 完整类型名称
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 能力名称
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for Capability {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for Capability {}

impl Hash for Capability {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capability")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .finish()
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// 提供者类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// 持久化访问对象、队列等仓储
    Repository,
    /// 领域服务
    Service,
    /// 网络路由处理器
    Handler,
    /// 请求/响应拦截器
    Interceptor,
    /// 授权守卫
    Guard,
    /// 管理命令
    Command,
    /// 周期任务注册表与调度器
    Scheduler,
    /// 请求作用域上下文
    Context,
    /// 外部协作者（事件总线、遥测、日志、持久化层）
    Collaborator,
    /// 已有实例的别名视图
    Alias,
}

impl ProviderKind {
    /// 是否计入服务类列表
    pub fn is_service(self) -> bool {
        matches!(self, Self::Service)
    }

    /// 是否需要向遥测系统报告
    pub fn is_reportable(self) -> bool {
        !matches!(self, Self::Alias)
    }
}

/// 去掉路径前缀，泛型参数中的路径同样缩短
///
/// `dyn a::Trait` 得到 `Trait`，`parking_lot::Mutex<a::X>` 得到 `Mutex<X>`。
fn short_type_name(type_name: &str) -> String {
    let type_name = type_name.strip_prefix("dyn ").unwrap_or(type_name);
    let mut short = String::with_capacity(type_name.len());
    for piece in type_name.split_inclusive(is_type_delimiter) {
        let (path, delimiter) = match piece.char_indices().last() {
            Some((index, c)) if is_type_delimiter(c) => piece.split_at(index),
            _ => (piece, ""),
        };
        short.push_str(path.rsplit("::").next().unwrap_or(path));
        short.push_str(delimiter);
    }
    short
}

fn is_type_delimiter(c: char) -> bool {
    matches!(c, '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | ';' | '&' | '*')
}
