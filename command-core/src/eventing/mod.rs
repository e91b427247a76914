//! 事件子系统（eventing）
//!
//! 执行上下文与指标/诊断之间的发布/订阅边界：
//! - `CommandEvent`：生命周期事件（开始、完成、告警）；
//! - `EventPublisher`：发布能力，未配置时使用 `NoopPublisher`；
//! - `EventSubscriber`：按事件类型注册处理器；
//! - `InMemoryEventDispatcher`：进程内实现，同步分发并提供诊断事件流。
//!
//! 执行上下文只依赖 `EventPublisher`，从不直接引用指标组件。
//!
pub mod bus;
pub mod dispatcher_inmemory;
pub mod event;

pub use bus::{EventPublisher, EventSubscriber, NoopPublisher};
pub use dispatcher_inmemory::InMemoryEventDispatcher;
pub use event::{CommandEvent, DispatchedEvent, EventKind, Executed, ExecutionStarted, Warning};
