//! 命令标识（CommandKey）
//!
//! `(group, name)` 二元组，按值判等与哈希，用作指标聚合的键。
//!
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommandKey {
    group_name: String,
    command_name: String,
}

impl CommandKey {
    /// 创建命令标识，分组与名称均不能为空白
    pub fn new(group_name: impl Into<String>, command_name: impl Into<String>) -> CoreResult<Self> {
        let group_name = group_name.into();
        let command_name = command_name.into();

        if group_name.trim().is_empty() {
            return Err(CoreError::InvalidKey {
                reason: "group name must not be blank".to_string(),
            });
        }
        if command_name.trim().is_empty() {
            return Err(CoreError::InvalidKey {
                reason: format!("command name must not be blank (group={group_name})"),
            });
        }

        Ok(Self {
            group_name,
            command_name,
        })
    }

    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    pub fn command_name(&self) -> &str {
        &self.command_name
    }
}

impl fmt::Display for CommandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group_name, self.command_name)
    }
}
