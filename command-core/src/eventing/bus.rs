//! 发布/订阅协议
//!
use super::event::{CommandEvent, DispatchedEvent};

/// 事件发布能力（执行上下文唯一依赖的事件接口）
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: CommandEvent);
}

/// 事件订阅能力：按具体事件类型注册处理器
///
/// 带泛型方法，通常以具体实现类型注入使用。
pub trait EventSubscriber: Send + Sync {
    fn register<E, F>(&self, handler: F)
    where
        E: DispatchedEvent,
        F: Fn(&E) + Send + Sync + 'static;
}

/// 未配置发布器时使用的空实现
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

impl EventPublisher for NoopPublisher {
    fn publish(&self, _event: CommandEvent) {}
}

impl<T> EventPublisher for std::sync::Arc<T>
where
    T: EventPublisher + ?Sized,
{
    fn publish(&self, event: CommandEvent) {
        (**self).publish(event)
    }
}
