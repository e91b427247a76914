//! 命令执行指标（CommandExecutionMetrics）
//!
//! 订阅生命周期事件并维护：
//! - 按 `CommandKey` × 结果类型的单调计数（从不重置）；
//! - 全局在途执行数与告警数。
//!
//! 计数存放在以 `CommandKey`（按值哈希）为键的并发映射中，每项为原子计数，
//! 更新过程中不持有任何全局锁。
//!
use chrono::{DateTime, Utc};
use command_core::eventing::{EventSubscriber, Executed, ExecutionStarted, Warning};
use command_core::{CommandEventType, CommandKey, CoreError, CoreResult};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Default)]
struct OutcomeCounters([AtomicU64; CommandEventType::COUNT]);

impl OutcomeCounters {
    fn add(&self, kind: CommandEventType, n: u64) {
        self.0[kind.index()].fetch_add(n, Ordering::Relaxed);
    }

    fn get(&self, kind: CommandEventType) -> u64 {
        self.0[kind.index()].load(Ordering::Relaxed)
    }
}

#[derive(Default)]
pub struct CommandExecutionMetrics {
    counters: DashMap<CommandKey, Arc<OutcomeCounters>>,
    in_flight: AtomicU64,
    warnings: AtomicU64,
    registered: AtomicBool,
}

impl CommandExecutionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 向分发器注册处理器；只能注册一次
    pub fn register<S>(self: &Arc<Self>, subscriber: &S) -> CoreResult<()>
    where
        S: EventSubscriber,
    {
        if self
            .registered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CoreError::AlreadyRegistered {
                subscriber: "CommandExecutionMetrics",
            });
        }

        let metrics = self.clone();
        subscriber.register::<ExecutionStarted, _>(move |e| metrics.on_execution_started(e));
        let metrics = self.clone();
        subscriber.register::<Executed, _>(move |e| metrics.on_executed(e));
        let metrics = self.clone();
        subscriber.register::<Warning, _>(move |e| metrics.on_warning(e));

        Ok(())
    }

    fn on_execution_started(&self, _event: &ExecutionStarted) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    fn on_executed(&self, event: &Executed) {
        if self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_err()
        {
            tracing::warn!(
                command_key = %event.command_key,
                "Executed received without a matching ExecutionStarted"
            );
        }

        let counters = self.counters_for(&event.command_key);
        for kind in CommandEventType::ALL {
            let n = event.result.event_count(kind);
            if n > 0 {
                counters.add(kind, u64::from(n));
            }
        }
    }

    fn on_warning(&self, _event: &Warning) {
        self.warnings.fetch_add(1, Ordering::Relaxed);
    }

    fn counters_for(&self, key: &CommandKey) -> Arc<OutcomeCounters> {
        if let Some(existing) = self.counters.get(key) {
            return existing.value().clone();
        }
        self.counters.entry(key.clone()).or_default().value().clone()
    }

    /// 指定命令的计数快照；从未执行过的键返回全零
    pub fn get_command_event_counts(&self, key: &CommandKey) -> CommandEventCounts {
        let counters = self.counters.get(key).map(|c| c.value().clone());
        let counts = CommandEventType::ALL
            .into_iter()
            .map(|kind| {
                let n = counters.as_ref().map(|c| c.get(kind)).unwrap_or(0);
                (kind, n)
            })
            .collect();

        CommandEventCounts {
            command_key: key.clone(),
            counts,
            captured_at: Utc::now(),
        }
    }

    /// 当前在途执行数
    pub fn current_concurrent_execution_count(&self) -> u64 {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn warning_count(&self) -> u64 {
        self.warnings.load(Ordering::Relaxed)
    }

    /// 已出现过的命令标识
    pub fn command_keys(&self) -> Vec<CommandKey> {
        let mut keys: Vec<_> = self.counters.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

/// 计数快照（不可变）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEventCounts {
    command_key: CommandKey,
    counts: BTreeMap<CommandEventType, u64>,
    captured_at: DateTime<Utc>,
}

impl CommandEventCounts {
    pub fn command_key(&self) -> &CommandKey {
        &self.command_key
    }

    pub fn get_count(&self, kind: CommandEventType) -> u64 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}
