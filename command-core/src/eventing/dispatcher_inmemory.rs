//! 内存版事件分发器（InMemoryEventDispatcher）
//!
//! - `register`：按 `EventKind` 注册类型化处理器，发布时同步调用；
//! - `publish`：先同步分发给处理器，再广播到诊断事件流；
//! - `subscribe`：返回 `'static` 生命周期事件流，便于在 `tokio::spawn` 中消费。
//!
//! 同步分发保证发布返回时处理器已经执行完毕（指标在结果返回前即已更新）。
//! 广播流在无订阅者时发送会被忽略，订阅者落后时返回 `CoreError::EventStream`。

use super::bus::{EventPublisher, EventSubscriber};
use super::event::{CommandEvent, DispatchedEvent, EventKind};
use crate::error::{CoreError, CoreResult as Result};
use dashmap::DashMap;
use futures_core::stream::BoxStream;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

type ErasedHandler = Arc<dyn Fn(&CommandEvent) + Send + Sync>;

/// 默认的诊断广播缓冲区容量
pub const DEFAULT_STREAM_CAPACITY: usize = 1024;

pub struct InMemoryEventDispatcher {
    handlers: DashMap<EventKind, Vec<ErasedHandler>>,
    tx: broadcast::Sender<CommandEvent>,
}

impl Default for InMemoryEventDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_STREAM_CAPACITY)
    }
}

impl InMemoryEventDispatcher {
    /// 创建分发器，`capacity` 为诊断广播缓冲区容量
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            handlers: DashMap::new(),
            tx,
        }
    }

    /// 已注册的处理器数量
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map(|h| h.len()).unwrap_or(0)
    }

    /// 诊断事件流（仅包含订阅之后发布的事件）
    pub fn subscribe(&self) -> BoxStream<'static, Result<CommandEvent>> {
        let rx = self.tx.subscribe();
        let stream = BroadcastStream::new(rx).map(|r| {
            r.map_err(|e| CoreError::EventStream {
                reason: e.to_string(),
            })
        });
        Box::pin(stream)
    }
}

impl EventSubscriber for InMemoryEventDispatcher {
    fn register<E, F>(&self, handler: F)
    where
        E: DispatchedEvent,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let erased: ErasedHandler = Arc::new(move |event| {
            if let Some(typed) = E::extract(event) {
                handler(typed);
            }
        });
        self.handlers.entry(E::KIND).or_default().push(erased);
    }
}

impl EventPublisher for InMemoryEventDispatcher {
    fn publish(&self, event: CommandEvent) {
        // 先克隆处理器列表再释放分片锁，避免处理器内部再次注册时死锁
        let handlers = self
            .handlers
            .get(&event.kind())
            .map(|h| h.value().clone())
            .unwrap_or_default();
        tracing::trace!(
            kind = ?event.kind(),
            command_key = %event.command_key(),
            handlers = handlers.len(),
            "dispatching command event"
        );

        for handler in &handlers {
            handler(&event);
        }

        // 若当前无订阅者，broadcast 的 send 会返回错误，这里视为非致命并忽略
        let _ = self.tx.send(event);
    }
}
