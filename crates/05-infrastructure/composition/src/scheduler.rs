//! 周期任务注册与调度

use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// 周期任务函数
pub type TaskFn = Arc<dyn Fn() -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// 调度错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("周期任务重复注册: {name}")]
    DuplicateTask { name: String },

    #[error("周期任务不存在: {name}")]
    UnknownTask { name: String },

    #[error("周期任务间隔必须大于零: {name}")]
    ZeroInterval { name: String },

    #[error("周期任务 {name} 执行失败: {message}")]
    TaskFailed { name: String, message: String },
}

/// 已注册的周期任务
#[derive(Clone)]
pub struct RecurringTask {
    name: String,
    interval: Duration,
    task: TaskFn,
}

impl RecurringTask {
    /// 任务名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 执行间隔
    pub fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self) -> Result<(), SchedulerError> {
        (self.task)().await.map_err(|message| SchedulerError::TaskFailed {
            name: self.name.clone(),
            message,
        })
    }
}

impl fmt::Debug for RecurringTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecurringTask")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .finish()
    }
}

/// 周期任务注册表
///
/// 只登记任务，本身不会触发任何任务。
#[derive(Debug, Default)]
pub struct SchedulerRegistry {
    tasks: RwLock<Vec<RecurringTask>>,
}

impl SchedulerRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册周期任务
    pub fn register(
        &self,
        name: impl Into<String>,
        interval: Duration,
        task: TaskFn,
    ) -> Result<(), SchedulerError> {
        let name = name.into();
        if interval.is_zero() {
            return Err(SchedulerError::ZeroInterval { name });
        }

        let mut tasks = self.tasks.write();
        if tasks.iter().any(|t| t.name == name) {
            return Err(SchedulerError::DuplicateTask { name });
        }
        debug!(task = %name, ?interval, "注册周期任务");
        tasks.push(RecurringTask {
            name,
            interval,
            task,
        });
        Ok(())
    }

    /// 已注册的任务名称
    pub fn names(&self) -> Vec<String> {
        self.tasks.read().iter().map(|t| t.name.clone()).collect()
    }

    /// 已注册的任务
    pub fn tasks(&self) -> Vec<RecurringTask> {
        self.tasks.read().clone()
    }

    /// 任务数
    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    /// 是否没有任务
    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }

    /// 立即执行一次指定任务
    pub async fn trigger(&self, name: &str) -> Result<(), SchedulerError> {
        let task = self
            .tasks
            .read()
            .iter()
            .find(|t| t.name == name)
            .cloned()
            .ok_or_else(|| SchedulerError::UnknownTask {
                name: name.to_string(),
            })?;
        task.run().await
    }
}

/// 周期任务调度器
///
/// 为注册表中的每个任务启动一个定时循环。
pub struct RecurringTaskScheduler {
    registry: Arc<SchedulerRegistry>,
    running: Mutex<Vec<JoinHandle<()>>>,
}

impl RecurringTaskScheduler {
    /// 创建调度器
    pub fn new(registry: Arc<SchedulerRegistry>) -> Self {
        Self {
            registry,
            running: Mutex::new(Vec::new()),
        }
    }

    /// 任务注册表
    pub fn registry(&self) -> &Arc<SchedulerRegistry> {
        &self.registry
    }

    /// 启动调度，重复调用无效
    pub fn start(&self) {
        let mut running = self.running.lock();
        if !running.is_empty() {
            return;
        }

        for task in self.registry.tasks() {
            running.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(task.interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // 第一次 tick 立即完成，跳过它
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if let Err(e) = task.run().await {
                        warn!(error = %e, "周期任务执行失败");
                    }
                }
            }));
        }
        info!(tasks = running.len(), "周期任务调度已启动");
    }

    /// 停止调度
    pub fn stop(&self) {
        let mut running = self.running.lock();
        if running.is_empty() {
            return;
        }
        for handle in running.drain(..) {
            handle.abort();
        }
        info!("周期任务调度已停止");
    }

    /// 是否正在调度
    pub fn is_running(&self) -> bool {
        !self.running.lock().is_empty()
    }
}

impl Drop for RecurringTaskScheduler {
    fn drop(&mut self) {
        for handle in self.running.get_mut().drain(..) {
            handle.abort();
        }
    }
}

impl fmt::Debug for RecurringTaskScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecurringTaskScheduler")
            .field("tasks", &self.registry.len())
            .field("running", &self.is_running())
            .finish()
    }
}
