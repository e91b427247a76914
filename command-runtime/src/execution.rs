//! 执行句柄（Execution）
//!
//! `CommandExecutionContext::execute` 返回的 future，永不失败：
//! 所有失败都记录在 `CommandResult` 中。若流水线任务自身异常结束（例如
//! 处理器 panic 或运行时关闭），这里补记 `InternalFailure` 并发布 `Executed`，
//! 保证在途计数平衡。
//!
//! `Executed` 的处理器 panic 不会改变已确定的结果：响应照常返回，仅记录错误日志。
//!
use command_core::eventing::{EventPublisher, Executed};
use command_core::{CommandEventType, CommandKey, CommandResult, ExecutionFailure, ExecutionRecord};
use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use tokio::task::{JoinError, JoinHandle};
use uuid::Uuid;

pub struct Execution<T> {
    handle: JoinHandle<CommandResult<T>>,
    record: Arc<ExecutionRecord>,
    publisher: Arc<dyn EventPublisher>,
}

impl<T> Execution<T> {
    pub(crate) fn new(
        handle: JoinHandle<CommandResult<T>>,
        record: Arc<ExecutionRecord>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            handle,
            record,
            publisher,
        }
    }

    pub fn command_key(&self) -> &CommandKey {
        self.record.key()
    }

    pub fn execution_id(&self) -> Uuid {
        self.record.execution_id()
    }

    fn orchestration_fault(&self, err: JoinError) -> CommandResult<T> {
        tracing::error!(
            command_key = %self.record.key(),
            execution_id = %self.record.execution_id(),
            error = %err,
            "command pipeline terminated abnormally"
        );

        let recorded = self
            .record
            .set_exception(ExecutionFailure::Internal(anyhow::Error::new(err)))
            .and_then(|()| {
                self.record
                    .signal_execution_done(CommandEventType::InternalFailure)
            });
        match recorded {
            Ok(()) => {
                publish_executed(self.publisher.as_ref(), &self.record);
            }
            Err(err) => tracing::error!(error = %err, "failed to record orchestration fault"),
        }

        CommandResult::from_record(self.record.clone())
    }
}

/// 发布终态事件；处理器 panic 时返回 `false`
pub(crate) fn publish_executed(
    publisher: &dyn EventPublisher,
    record: &Arc<ExecutionRecord>,
) -> bool {
    let event = Executed {
        command_key: record.key().clone(),
        result: record.clone(),
    };
    match panic::catch_unwind(AssertUnwindSafe(|| publisher.publish(event.into()))) {
        Ok(()) => true,
        Err(payload) => {
            tracing::error!(
                command_key = %record.key(),
                execution_id = %record.execution_id(),
                panic = %panic_message(payload),
                "Executed handler panicked, outcome kept"
            );
            false
        }
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl<T> Future for Execution<T> {
    type Output = CommandResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match ready!(Pin::new(&mut self.handle).poll(cx)) {
            Ok(result) => Poll::Ready(result),
            Err(err) => Poll::Ready(self.orchestration_fault(err)),
        }
    }
}
