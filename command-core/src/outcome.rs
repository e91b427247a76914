//! 执行结果事件类型（outcome tag）
//!
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CommandEventType {
    Success,
    BadRequest,
    Timeout,
    CommandException,
    InternalFailure,
}

impl CommandEventType {
    pub const COUNT: usize = 5;

    pub const ALL: [CommandEventType; Self::COUNT] = [
        Self::Success,
        Self::BadRequest,
        Self::Timeout,
        Self::CommandException,
        Self::InternalFailure,
    ];

    /// 在 `ALL` 中的下标，用于定长计数数组
    pub const fn index(self) -> usize {
        match self {
            Self::Success => 0,
            Self::BadRequest => 1,
            Self::Timeout => 2,
            Self::CommandException => 3,
            Self::InternalFailure => 4,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::BadRequest => "bad_request",
            Self::Timeout => "timeout",
            Self::CommandException => "command_exception",
            Self::InternalFailure => "internal_failure",
        }
    }

    pub const fn is_failure(self) -> bool {
        !matches!(self, Self::Success)
    }
}

impl fmt::Display for CommandEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
