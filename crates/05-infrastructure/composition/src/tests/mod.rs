//! 宿主与工作进程组合的集成测试

mod support;
