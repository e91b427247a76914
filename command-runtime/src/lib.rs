//! 命令执行运行时（command-runtime）
//!
//! 在 `command-core` 的模型之上提供：
//! - 命令抽象（`command`）：一次性获取、同步/异步命令体与惰性执行序列
//! - 委托命令（`delegate`）：以闭包承载临时工作
//! - 执行上下文（`context`）：埋点 → 调度 → 超时 → 归类 的固定流水线
//! - 执行句柄（`execution`）：永不失败的结果 future
//! - 执行指标（`metrics`）：按命令与结果类型滚动计数
//!
//! 典型用法：
//! 1. 创建 `InMemoryEventDispatcher`，将 `CommandExecutionMetrics` 注册到其上；
//! 2. 以该分发器为发布目标构建 `CommandExecutionContext`；
//! 3. 提交命令实例或临时闭包，等待 `Execution` 得到 `CommandResult`；
//! 4. 读取响应前先检查 `is_successful()`。
//!
pub mod command;
pub mod context;
pub mod delegate;
pub mod execution;
pub mod metrics;

pub use command::{AsyncCommand, BaseCommand, Command, CommandBase, ExecutionWork, IntoExecution};
pub use context::CommandExecutionContext;
pub use delegate::{AsyncDelegateCommand, DelegateCommand};
pub use execution::Execution;
pub use metrics::{CommandEventCounts, CommandExecutionMetrics};
