//! 执行结果（ExecutionRecord / CommandResult）
//!
//! 每次执行创建一条记录，生命周期为：创建 → 开始（记录时间）→ 恰好一次终态完成。
//! - 终态完成由原子 CAS 保护，重复完成返回 `CoreError::AlreadyCompleted`；
//! - 延迟在完成瞬间按 `now - start` 计算；
//! - 事件是只追加的多重集合，单写多读，读取无需加锁。
//!
//! `ExecutionRecord` 为无类型部分，可通过 `Arc` 在事件中共享；
//! `CommandResult<T>` 在其上增加响应槽位。
//!
use crate::error::{CoreError, CoreResult, ExecutionFailure};
use crate::key::CommandKey;
use crate::outcome::CommandEventType;
use chrono::{DateTime, Utc};
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
struct Started {
    instant: Instant,
    at: DateTime<Utc>,
}

/// 单次执行的无类型记录
pub struct ExecutionRecord {
    key: CommandKey,
    execution_id: Uuid,
    started: OnceLock<Started>,
    done: AtomicBool,
    outcome: OnceLock<CommandEventType>,
    latency: OnceLock<Duration>,
    exception: OnceLock<ExecutionFailure>,
    events: [AtomicU32; CommandEventType::COUNT],
}

impl ExecutionRecord {
    pub fn new(key: CommandKey) -> Self {
        Self {
            key,
            execution_id: Uuid::new_v4(),
            started: OnceLock::new(),
            done: AtomicBool::new(false),
            outcome: OnceLock::new(),
            latency: OnceLock::new(),
            exception: OnceLock::new(),
            events: Default::default(),
        }
    }

    pub fn key(&self) -> &CommandKey {
        &self.key
    }

    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    /// 记录开始时间；重复调用保留第一次的时间
    pub fn signal_execution_started(&self) {
        let _ = self.started.get_or_init(|| Started {
            instant: Instant::now(),
            at: Utc::now(),
        });
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started.get().map(|s| s.at)
    }

    /// 单调时钟下的开始时刻，用于计算截止时间
    pub fn started_instant(&self) -> Option<Instant> {
        self.started.get().map(|s| s.instant)
    }

    /// 写入终态异常，需在 `signal_execution_done` 之前调用
    pub fn set_exception(&self, failure: ExecutionFailure) -> CoreResult<()> {
        if self.is_done() {
            return Err(self.already_completed(failure.event_type()));
        }
        let outcome = failure.event_type();
        self.exception
            .set(failure)
            .map_err(|_| self.already_completed(outcome))
    }

    /// 终态完成：CAS 保护，计算延迟并追加结果事件
    pub fn signal_execution_done(&self, outcome: CommandEventType) -> CoreResult<()> {
        if self
            .done
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(self.already_completed(outcome));
        }

        let latency = self
            .started
            .get()
            .map(|s| s.instant.elapsed())
            .unwrap_or_default();
        let _ = self.latency.set(latency);
        let _ = self.outcome.set(outcome);
        self.events[outcome.index()].fetch_add(1, Ordering::Release);

        Ok(())
    }

    fn already_completed(&self, attempted: CommandEventType) -> CoreError {
        CoreError::AlreadyCompleted {
            key: self.key.clone(),
            outcome: self.outcome.get().copied().unwrap_or(attempted),
        }
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// 终态结果；未完成时为 `None`
    pub fn outcome(&self) -> Option<CommandEventType> {
        self.outcome.get().copied()
    }

    pub fn execution_latency(&self) -> Option<Duration> {
        self.latency.get().copied()
    }

    pub fn exception(&self) -> Option<&ExecutionFailure> {
        self.exception.get()
    }

    pub fn is_successful(&self) -> bool {
        self.is_done()
            && self.exception.get().is_none()
            && self.event_count(CommandEventType::Success) > 0
    }

    pub fn event_count(&self, kind: CommandEventType) -> u32 {
        self.events[kind.index()].load(Ordering::Acquire)
    }

    /// 已记录的结果事件（按 `CommandEventType::ALL` 顺序展开）
    pub fn events(&self) -> Vec<CommandEventType> {
        CommandEventType::ALL
            .into_iter()
            .flat_map(|kind| std::iter::repeat_n(kind, self.event_count(kind) as usize))
            .collect()
    }
}

impl fmt::Debug for ExecutionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionRecord")
            .field("key", &self.key)
            .field("execution_id", &self.execution_id)
            .field("started_at", &self.started_at())
            .field("outcome", &self.outcome())
            .field("latency", &self.execution_latency())
            .field("exception", &self.exception())
            .field("events", &self.events())
            .finish()
    }
}

/// 带响应值的执行结果
///
/// 读取响应前必须确认执行成功；失败时 `response()` 返回错误而不是默认值。
pub struct CommandResult<T = ()> {
    record: Arc<ExecutionRecord>,
    response: Option<T>,
}

impl<T> CommandResult<T> {
    pub fn new(key: CommandKey) -> Self {
        Self::from_record(Arc::new(ExecutionRecord::new(key)))
    }

    pub fn from_record(record: Arc<ExecutionRecord>) -> Self {
        Self {
            record,
            response: None,
        }
    }

    /// 共享的无类型记录（随 `Executed` 事件发布）
    pub fn record(&self) -> &Arc<ExecutionRecord> {
        &self.record
    }

    pub fn set_response(&mut self, value: T) -> CoreResult<()> {
        if self.record.is_done() || self.response.is_some() {
            return Err(self
                .record
                .already_completed(CommandEventType::Success));
        }
        self.response = Some(value);
        Ok(())
    }

    pub fn response(&self) -> CoreResult<&T> {
        self.check_successful()?;
        self.response.as_ref().ok_or_else(|| self.unavailable("no response recorded"))
    }

    pub fn into_response(self) -> CoreResult<T> {
        self.check_successful()?;
        match self.response {
            Some(value) => Ok(value),
            None => Err(CoreError::ResponseUnavailable {
                key: self.record.key.clone(),
                reason: "no response recorded".to_string(),
            }),
        }
    }

    fn check_successful(&self) -> CoreResult<()> {
        if self.record.is_successful() {
            return Ok(());
        }
        let reason = match self.record.outcome() {
            Some(outcome) => format!("execution finished with outcome={outcome}"),
            None => "execution not completed".to_string(),
        };
        Err(self.unavailable(reason))
    }

    fn unavailable(&self, reason: impl Into<String>) -> CoreError {
        CoreError::ResponseUnavailable {
            key: self.record.key.clone(),
            reason: reason.into(),
        }
    }
}

impl<T> Deref for CommandResult<T> {
    type Target = ExecutionRecord;

    fn deref(&self) -> &Self::Target {
        &self.record
    }
}

impl<T: fmt::Debug> fmt::Debug for CommandResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandResult")
            .field("record", &self.record)
            .field("response", &self.response)
            .finish()
    }
}
