//! 命令执行核心的基础模型（command-core）
//!
//! 提供命令执行流水线共享的值类型与协议：
//! - 命令标识（`key`）与执行配置（`properties`）
//! - 结果事件类型（`outcome`）与执行结果（`result`）
//! - 错误分类（`error`）：使用错误、命令体错误与终态异常
//! - 事件系统（`eventing`）：生命周期事件、发布/订阅协议与进程内分发器
//!
//! 本 crate 不包含调度与计时逻辑，执行编排见 `command-runtime`。
//!
pub mod error;
pub mod eventing;
pub mod key;
pub mod outcome;
pub mod properties;
pub mod result;

pub use error::{CommandError, CoreError, CoreResult, ExecutionFailure};
pub use key::CommandKey;
pub use outcome::CommandEventType;
pub use properties::CommandProperties;
pub use result::{CommandResult, ExecutionRecord};
