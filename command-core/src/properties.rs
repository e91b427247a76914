//! 命令执行配置（CommandProperties）
//!
//! 不可变；修改超时通过 `with_execution_timeout` 返回新实例。
//! 支持 serde 反序列化，缺省字段取默认值，便于从配置文件加载。
//!
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 默认执行超时（毫秒）
pub const DEFAULT_EXECUTION_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CommandProperties {
    execution_timeout_milliseconds: u64,
}

impl Default for CommandProperties {
    fn default() -> Self {
        Self {
            execution_timeout_milliseconds: DEFAULT_EXECUTION_TIMEOUT_MS,
        }
    }
}

impl CommandProperties {
    pub const fn new(execution_timeout_milliseconds: u64) -> Self {
        Self {
            execution_timeout_milliseconds,
        }
    }

    /// 返回一个仅超时不同的新实例
    pub const fn with_execution_timeout(&self, execution_timeout_milliseconds: u64) -> Self {
        Self {
            execution_timeout_milliseconds,
        }
    }

    pub const fn execution_timeout_milliseconds(&self) -> u64 {
        self.execution_timeout_milliseconds
    }

    pub const fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_milliseconds)
    }
}
