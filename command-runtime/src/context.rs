//! 命令执行上下文（CommandExecutionContext）
//!
//! 以固定的四段流水线运行命令，并恰好一次地得出 `CommandResult`：
//! 1. 埋点：记录开始时间并发布 `ExecutionStarted`（命令体运行之前）；
//! 2. 调度：命令体派发到调用方之外的工作线程（同步命令走阻塞线程池）；
//! 3. 超时：从第 1 段起算的截止时间覆盖其余流水线，超时即脱离在途工作；
//! 4. 归类：写入响应或异常，完成记录并发布 `Executed`。
//!
//! 返回的 `Execution` 永不失败；唯一同步返回的错误是重复提交已获取的命令。
//!
//! 超时处理：取消传给命令体的 `CancellationToken`，并中止异步命令体任务
//! （在其下一个挂起点停止）。同步命令体无法被抢占，可轮询令牌自行退出，
//! 其最终返回值被丢弃。
//!
use crate::command::{ExecutionWork, IntoExecution};
use crate::delegate::{AsyncDelegateCommand, DelegateCommand};
use crate::execution::{Execution, panic_message, publish_executed};
use bon::Builder;
use command_core::eventing::{EventPublisher, ExecutionStarted, NoopPublisher};
use command_core::{
    CommandError, CommandEventType, CommandKey, CommandProperties, CommandResult, CoreError,
    CoreResult, ExecutionFailure, ExecutionRecord,
};
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinError;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

fn noop_publisher() -> Arc<dyn EventPublisher> {
    Arc::new(NoopPublisher)
}

#[derive(Builder)]
pub struct CommandExecutionContext {
    /// 生命周期事件的发布目标，未配置时丢弃
    #[builder(default = noop_publisher())]
    publisher: Arc<dyn EventPublisher>,
    /// 临时工作未指定配置时使用
    #[builder(default)]
    default_properties: CommandProperties,
    /// 调度所用运行时，未配置时取当前运行时
    runtime: Option<Handle>,
}

impl Default for CommandExecutionContext {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl CommandExecutionContext {
    pub fn publisher(&self) -> &Arc<dyn EventPublisher> {
        &self.publisher
    }

    pub fn default_properties(&self) -> &CommandProperties {
        &self.default_properties
    }

    /// 执行可复用的命令实例
    ///
    /// 同一实例第二次提交（无论并发还是先后）立即返回 `CoreError::AlreadyAcquired`。
    pub fn execute<C, K>(&self, command: Arc<C>) -> CoreResult<Execution<C::Output>>
    where
        C: IntoExecution<K>,
    {
        let base = command.base();
        let key = base.key().clone();
        let properties = *base.properties();

        let runtime = self
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
            .ok_or_else(|| CoreError::RuntimeUnavailable { key: key.clone() })?;

        if !base.acquire_for_execution(self.publisher.clone()) {
            return Err(CoreError::AlreadyAcquired { key });
        }

        let result = CommandResult::<C::Output>::new(key.clone());
        let record = result.record().clone();
        let cancellation = CancellationToken::new();
        let work = command.execution(cancellation.clone());

        let span = tracing::info_span!(
            "command",
            group = key.group_name(),
            name = key.command_name(),
            execution_id = %record.execution_id(),
        );
        let pipeline = Pipeline {
            key,
            properties,
            publisher: self.publisher.clone(),
            cancellation,
        };
        let handle = runtime.spawn(pipeline.run(work, result).instrument(span));

        Ok(Execution::new(handle, record, self.publisher.clone()))
    }

    /// 执行无返回值的临时同步工作
    pub fn execute_action<F>(
        &self,
        group_name: impl Into<String>,
        command_name: impl Into<String>,
        properties: Option<CommandProperties>,
        work: F,
    ) -> CoreResult<Execution<()>>
    where
        F: FnOnce() -> Result<(), CommandError> + Send + 'static,
    {
        self.execute_fn(group_name, command_name, properties, work)
    }

    /// 执行有返回值的临时同步工作
    pub fn execute_fn<T, F>(
        &self,
        group_name: impl Into<String>,
        command_name: impl Into<String>,
        properties: Option<CommandProperties>,
        work: F,
    ) -> CoreResult<Execution<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, CommandError> + Send + 'static,
    {
        let key = CommandKey::new(group_name, command_name)?;
        let properties = properties.unwrap_or(self.default_properties);
        self.execute(Arc::new(DelegateCommand::new(key, properties, work)))
    }

    /// 执行临时异步工作，闭包接收取消令牌
    pub fn execute_async<T, F, Fut>(
        &self,
        group_name: impl Into<String>,
        command_name: impl Into<String>,
        properties: Option<CommandProperties>,
        work: F,
    ) -> CoreResult<Execution<T>>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, CommandError>> + Send + 'static,
    {
        let key = CommandKey::new(group_name, command_name)?;
        let properties = properties.unwrap_or(self.default_properties);
        self.execute(Arc::new(AsyncDelegateCommand::new(key, properties, work)))
    }
}

/// 单次执行的流水线状态
struct Pipeline {
    key: CommandKey,
    properties: CommandProperties,
    publisher: Arc<dyn EventPublisher>,
    cancellation: CancellationToken,
}

impl Pipeline {
    async fn run<T: Send + 'static>(
        self,
        work: ExecutionWork<T>,
        mut result: CommandResult<T>,
    ) -> CommandResult<T> {
        // 1. 埋点
        result.signal_execution_started();
        let started = result
            .started_instant()
            .map(Instant::from_std)
            .unwrap_or_else(Instant::now);
        let deadline = started + self.properties.execution_timeout();
        self.publisher.publish(
            ExecutionStarted {
                command_key: self.key.clone(),
            }
            .into(),
        );
        tracing::debug!(
            timeout_ms = self.properties.execution_timeout_milliseconds(),
            "command execution started"
        );

        // 2. 调度
        let body = work.schedule();
        let abort = body.abort_handle();

        // 3. 超时
        let outcome = match time::timeout_at(deadline, body).await {
            Ok(joined) => self.settle(joined),
            Err(elapsed) => {
                self.cancellation.cancel();
                abort.abort();
                Err(ExecutionFailure::Timeout {
                    key: self.key.clone(),
                    timeout: self.properties.execution_timeout(),
                    source: elapsed,
                })
            }
        };

        // 4. 归类
        self.capture(&mut result, outcome);
        result
    }

    fn settle<T>(
        &self,
        joined: Result<Result<T, CommandError>, JoinError>,
    ) -> Result<T, ExecutionFailure> {
        match joined {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(ExecutionFailure::classify(&self.key, err)),
            Err(err) if err.is_panic() => Err(ExecutionFailure::Execution {
                key: self.key.clone(),
                source: anyhow::anyhow!(
                    "command body panicked: {}",
                    panic_message(err.into_panic())
                ),
            }),
            Err(err) => Err(ExecutionFailure::Internal(anyhow::Error::new(err))),
        }
    }

    fn capture<T>(&self, result: &mut CommandResult<T>, outcome: Result<T, ExecutionFailure>) {
        let recorded = match outcome {
            Ok(value) => result
                .set_response(value)
                .map(|()| CommandEventType::Success),
            Err(failure) => {
                let kind = failure.event_type();
                result.set_exception(failure).map(|()| kind)
            }
        };

        match recorded.and_then(|kind| result.signal_execution_done(kind)) {
            Ok(()) => {
                log_outcome(result.record());
                publish_executed(self.publisher.as_ref(), result.record());
            }
            Err(err) => tracing::error!(error = %err, "failed to record command outcome"),
        }
    }
}

fn log_outcome(record: &ExecutionRecord) {
    let latency_ms = record
        .execution_latency()
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();
    let error = record.exception().map(|e| e.to_string()).unwrap_or_default();

    match record.outcome() {
        Some(CommandEventType::Success) => {
            tracing::debug!(latency_ms, "command execution succeeded")
        }
        Some(CommandEventType::BadRequest) => {
            tracing::info!(latency_ms, error = %error, "command rejected as bad request")
        }
        Some(CommandEventType::Timeout) => {
            tracing::warn!(latency_ms, error = %error, "command execution timed out")
        }
        Some(kind) => {
            tracing::error!(latency_ms, outcome = %kind, error = %error, "command execution failed")
        }
        None => {}
    }
}
