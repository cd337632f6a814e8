//! # Dependency Injection Abstractions
//!
//! 组件注册表抽象层，定义提供者声明与依赖解析的核心接口。
//!
//! ## 核心接口
//!
//! - [`ProviderDefinition`] - 提供者声明（能力、依赖、工厂）
//! - [`DependencyGraph`] - 依赖图与循环依赖检测
//! - [`ResolveContext`] - 工厂可见的已声明依赖
//! - [`ComponentLookup`] - 已构建注册表的查找接口

pub mod factory;
pub mod registry;
pub mod resolver;

pub use factory::*;
pub use registry::*;
pub use resolver::*;
