//! 元数据定义
//!
//! 向遥测系统报告的组件类信息

use crate::component::{Capability, ProviderKind};
use serde::Serialize;

/// 类标识
///
/// 注册表中一个已构建组件的类型信息。遥测注册器用它决定需要插桩的组件。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ClassIdentity {
    /// 能力名称
    pub name: String,
    /// 完整类型名称
    pub type_name: String,
    /// 提供者类别
    #[serde(skip)]
    pub kind: ProviderKind,
}

impl ClassIdentity {
    /// 从能力创建类标识
    pub fn new(capability: &Capability, kind: ProviderKind) -> Self {
        Self {
            name: capability.name().to_string(),
            type_name: capability.type_name().to_string(),
            kind,
        }
    }

    /// 是否为服务类
    pub fn is_service(&self) -> bool {
        self.kind.is_service()
    }
}
