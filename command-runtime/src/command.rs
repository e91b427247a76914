//! 命令（Command）
//!
//! 命令是一次性的工作单元：每次调用创建一个实例，经原子 CAS 恰好被获取一次。
//! - `BaseCommand`：所有命令共享的状态访问（标识、配置、获取标记、告警转发）；
//! - `Command`：同步命令，命令体在阻塞线程池中运行；
//! - `AsyncCommand`：异步命令，命令体可在任意挂起点让出；
//! - `IntoExecution`：生成惰性执行序列，由执行上下文调度。
//!
use async_trait::async_trait;
use command_core::eventing::{EventPublisher, Warning};
use command_core::{CommandError, CommandKey, CommandProperties, CoreError, CoreResult};
use futures_util::future::BoxFuture;
use std::any::type_name;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// 命令实例的共享状态
pub struct CommandBase {
    key: CommandKey,
    properties: CommandProperties,
    acquired: AtomicBool,
    publisher: OnceLock<Arc<dyn EventPublisher>>,
}

impl CommandBase {
    pub fn new(key: CommandKey, properties: CommandProperties) -> Self {
        Self {
            key,
            properties,
            acquired: AtomicBool::new(false),
            publisher: OnceLock::new(),
        }
    }

    /// 按命令类型构造；未指定名称时取具体类型名（去掉路径与泛型参数）
    ///
    /// ```
    /// use command_runtime::CommandBase;
    /// use command_core::CommandProperties;
    ///
    /// struct CreateOrder;
    ///
    /// let base = CommandBase::for_command::<CreateOrder>("Orders", None, CommandProperties::default())
    ///     .unwrap();
    /// assert_eq!(base.key().command_name(), "CreateOrder");
    /// ```
    pub fn for_command<C: ?Sized>(
        group_name: impl Into<String>,
        command_name: Option<&str>,
        properties: CommandProperties,
    ) -> CoreResult<Self> {
        let command_name = match command_name {
            Some(name) => name.to_string(),
            None => short_type_name::<C>().to_string(),
        };
        Ok(Self::new(
            CommandKey::new(group_name, command_name)?,
            properties,
        ))
    }

    pub fn key(&self) -> &CommandKey {
        &self.key
    }

    pub fn properties(&self) -> &CommandProperties {
        &self.properties
    }

    pub fn is_acquired(&self) -> bool {
        self.acquired.load(Ordering::Acquire)
    }

    /// 原子获取执行权（0 → 1）
    ///
    /// 返回 `false` 表示已被获取过，属于使用错误，不可重试。
    pub fn acquire_for_execution(&self, publisher: Arc<dyn EventPublisher>) -> bool {
        if self
            .acquired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let _ = self.publisher.set(publisher);
        true
    }

    /// 经绑定的上下文发布告警，不影响终态结果；仅在获取之后有效
    pub fn raise_warning(&self, message: impl Into<String>) -> CoreResult<()> {
        let Some(publisher) = self.publisher.get() else {
            return Err(CoreError::NotAcquired {
                key: self.key.clone(),
            });
        };

        let warning = Warning::new(&self.key, message);
        tracing::warn!(command_key = %self.key, warning = %warning.message, "command raised warning");
        publisher.publish(warning.into());
        Ok(())
    }
}

fn short_type_name<C: ?Sized>() -> &'static str {
    let full = type_name::<C>();
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
}

/// 惰性执行序列：在调度之前不会运行
pub enum ExecutionWork<T> {
    Blocking(Box<dyn FnOnce() -> Result<T, CommandError> + Send + 'static>),
    Async(BoxFuture<'static, Result<T, CommandError>>),
}

impl<T: Send + 'static> ExecutionWork<T> {
    /// 调度到调用方之外的工作线程
    pub(crate) fn schedule(self) -> JoinHandle<Result<T, CommandError>> {
        match self {
            Self::Blocking(f) => tokio::task::spawn_blocking(f),
            Self::Async(fut) => tokio::spawn(fut),
        }
    }
}

/// 执行方式标记，用于区分同步/异步命令的 `IntoExecution` 实现
pub mod kind {
    #[derive(Debug)]
    pub enum Blocking {}

    #[derive(Debug)]
    pub enum NonBlocking {}
}

pub trait BaseCommand: Send + Sync + 'static {
    fn base(&self) -> &CommandBase;
}

/// 同步命令
pub trait Command: BaseCommand {
    type Output: Send + 'static;

    /// 阻塞运行命令体；超时后 `cancellation` 会被取消，可自行轮询以尽早退出
    fn run(&self, cancellation: &CancellationToken) -> Result<Self::Output, CommandError>;
}

/// 异步命令
#[async_trait]
pub trait AsyncCommand: BaseCommand {
    type Output: Send + 'static;

    /// 异步运行命令体；超时后任务在下一个挂起点被中止
    async fn run_async(
        &self,
        cancellation: &CancellationToken,
    ) -> Result<Self::Output, CommandError>;
}

/// 生成命令的执行序列
///
/// `K` 为执行方式标记（`kind::Blocking` / `kind::NonBlocking`），由编译器根据
/// 命令实现的是 `Command` 还是 `AsyncCommand` 自动推断。
pub trait IntoExecution<K>: BaseCommand {
    type Output: Send + 'static;

    fn execution(self: Arc<Self>, cancellation: CancellationToken) -> ExecutionWork<Self::Output>;
}

impl<C: Command> IntoExecution<kind::Blocking> for C {
    type Output = <C as Command>::Output;

    fn execution(self: Arc<Self>, cancellation: CancellationToken) -> ExecutionWork<Self::Output> {
        ExecutionWork::Blocking(Box::new(move || self.run(&cancellation)))
    }
}

impl<C: AsyncCommand> IntoExecution<kind::NonBlocking> for C {
    type Output = <C as AsyncCommand>::Output;

    fn execution(self: Arc<Self>, cancellation: CancellationToken) -> ExecutionWork<Self::Output> {
        ExecutionWork::Async(Box::pin(async move { self.run_async(&cancellation).await }))
    }
}
