//! 生命周期事件
//!
//! 同一次执行中 `ExecutionStarted` 总是先于唯一的 `Executed`。
//!
use crate::key::CommandKey;
use crate::result::ExecutionRecord;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// 执行开始（在命令体运行之前发布）
#[derive(Debug, Clone)]
pub struct ExecutionStarted {
    pub command_key: CommandKey,
}

/// 执行完成，携带终态记录
#[derive(Debug, Clone)]
pub struct Executed {
    pub command_key: CommandKey,
    pub result: Arc<ExecutionRecord>,
}

/// 命令体运行期间发出的告警，不影响终态结果
#[derive(Debug, Clone)]
pub struct Warning {
    pub command_key: CommandKey,
    pub group_name: String,
    pub command_name: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl Warning {
    pub fn new(command_key: &CommandKey, message: impl Into<String>) -> Self {
        Self {
            command_key: command_key.clone(),
            group_name: command_key.group_name().to_string(),
            command_name: command_key.command_name().to_string(),
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }
}

/// 事件种类，作为处理器注册表的键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ExecutionStarted,
    Executed,
    Warning,
}

#[derive(Debug, Clone)]
pub enum CommandEvent {
    ExecutionStarted(ExecutionStarted),
    Executed(Executed),
    Warning(Warning),
}

impl CommandEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ExecutionStarted(_) => EventKind::ExecutionStarted,
            Self::Executed(_) => EventKind::Executed,
            Self::Warning(_) => EventKind::Warning,
        }
    }

    pub fn command_key(&self) -> &CommandKey {
        match self {
            Self::ExecutionStarted(e) => &e.command_key,
            Self::Executed(e) => &e.command_key,
            Self::Warning(e) => &e.command_key,
        }
    }
}

/// 可被类型化订阅的具体事件
pub trait DispatchedEvent: Send + Sync + 'static {
    const KIND: EventKind;

    fn extract(event: &CommandEvent) -> Option<&Self>;
}

macro_rules! dispatched_event {
    ($ty:ident) => {
        impl DispatchedEvent for $ty {
            const KIND: EventKind = EventKind::$ty;

            fn extract(event: &CommandEvent) -> Option<&Self> {
                match event {
                    CommandEvent::$ty(inner) => Some(inner),
                    _ => None,
                }
            }
        }

        impl From<$ty> for CommandEvent {
            fn from(event: $ty) -> Self {
                CommandEvent::$ty(event)
            }
        }
    };
}

dispatched_event!(ExecutionStarted);
dispatched_event!(Executed);
dispatched_event!(Warning);
