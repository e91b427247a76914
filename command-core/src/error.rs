//! 命令执行核心的统一错误定义
//!
//! 分为三类，互不混用：
//! - `CoreError`：调用方/编程错误（重复提交、重复完成、提前读取响应等），同步返回；
//! - `CommandError`：命令体自身返回的错误（校验失败或未处理错误）；
//! - `ExecutionFailure`：流水线捕获后写入 `CommandResult` 的终态异常。
//!
use crate::key::CommandKey;
use crate::outcome::CommandEventType;
use std::time::Duration;
use thiserror::Error;

/// 使用错误（程序缺陷，快速失败）
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid command key: {reason}")]
    InvalidKey { reason: String },

    // --- 命令生命周期 ---
    #[error("command already acquired for execution: key={key}")]
    AlreadyAcquired { key: CommandKey },
    #[error("command not acquired yet: key={key}")]
    NotAcquired { key: CommandKey },
    #[error("execution already completed: key={key}, outcome={outcome}")]
    AlreadyCompleted {
        key: CommandKey,
        outcome: CommandEventType,
    },
    #[error("response unavailable: key={key}, reason={reason}")]
    ResponseUnavailable { key: CommandKey, reason: String },

    // --- 运行时与事件系统 ---
    #[error("no async runtime available to schedule key={key}")]
    RuntimeUnavailable { key: CommandKey },
    #[error("subscriber already registered: {subscriber}")]
    AlreadyRegistered { subscriber: &'static str },
    #[error("event stream error: {reason}")]
    EventStream { reason: String },
}

/// 统一 Result 类型别名
pub type CoreResult<T> = Result<T, CoreError>;

/// 命令体返回的错误
///
/// - `BadRequest`：调用方输入导致的校验失败，原样保留；
/// - `Unhandled`：其余任何错误，由流水线包装为执行错误。
///
/// 命令体内的 `anyhow::Error`（例如经 `anyhow::Context::context` 补充上下文后）
/// 可以直接用 `?` 传播，自动落入 `Unhandled`。
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Unhandled(#[from] anyhow::Error),
}

impl CommandError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unhandled<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Unhandled(anyhow::Error::new(err))
    }
}

/// 写入执行结果的终态异常
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ExecutionFailure {
    /// 校验失败：保留命令体给出的原始信息
    #[error("{0}")]
    BadRequest(String),
    #[error("command {key} timed out after {}ms", .timeout.as_millis())]
    Timeout {
        key: CommandKey,
        timeout: Duration,
        #[source]
        source: tokio::time::error::Elapsed,
    },
    #[error("command {key} failed: {source}")]
    Execution {
        key: CommandKey,
        #[source]
        source: anyhow::Error,
    },
    /// 编排机制自身的故障，不做包装
    #[error(transparent)]
    Internal(anyhow::Error),
}

impl ExecutionFailure {
    /// 该异常对应的结果事件类型
    pub fn event_type(&self) -> CommandEventType {
        match self {
            Self::BadRequest(_) => CommandEventType::BadRequest,
            Self::Timeout { .. } => CommandEventType::Timeout,
            Self::Execution { .. } => CommandEventType::CommandException,
            Self::Internal(_) => CommandEventType::InternalFailure,
        }
    }

    /// 将命令体错误归类为终态异常
    pub fn classify(key: &CommandKey, err: CommandError) -> Self {
        match err {
            CommandError::BadRequest(message) => Self::BadRequest(message),
            CommandError::Unhandled(source) => Self::Execution {
                key: key.clone(),
                source,
            },
        }
    }
}
