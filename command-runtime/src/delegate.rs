//! 委托命令：以闭包承载临时工作，无需为每个调用点定义命令类型
//!
use crate::command::{AsyncCommand, BaseCommand, Command, CommandBase};
use async_trait::async_trait;
use command_core::{CommandError, CommandKey, CommandProperties};
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

/// 闭包只能被取出一次，与命令的一次性语义一致
struct WorkSlot<F>(Mutex<Option<F>>);

impl<F> WorkSlot<F> {
    fn new(work: F) -> Self {
        Self(Mutex::new(Some(work)))
    }

    fn take(&self, key: &CommandKey) -> Result<F, CommandError> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| anyhow::anyhow!("delegate work for {key} already consumed").into())
    }
}

/// 同步委托命令
pub struct DelegateCommand<F> {
    base: CommandBase,
    work: WorkSlot<F>,
}

impl<F> DelegateCommand<F> {
    pub fn new(key: CommandKey, properties: CommandProperties, work: F) -> Self {
        Self {
            base: CommandBase::new(key, properties),
            work: WorkSlot::new(work),
        }
    }
}

impl<F> BaseCommand for DelegateCommand<F>
where
    F: Send + 'static,
{
    fn base(&self) -> &CommandBase {
        &self.base
    }
}

impl<F, T> Command for DelegateCommand<F>
where
    F: FnOnce() -> Result<T, CommandError> + Send + 'static,
    T: Send + 'static,
{
    type Output = T;

    fn run(&self, _cancellation: &CancellationToken) -> Result<T, CommandError> {
        let work = self.work.take(self.base.key())?;
        work()
    }
}

/// 异步委托命令，闭包接收取消令牌
pub struct AsyncDelegateCommand<F> {
    base: CommandBase,
    work: WorkSlot<F>,
}

impl<F> AsyncDelegateCommand<F> {
    pub fn new(key: CommandKey, properties: CommandProperties, work: F) -> Self {
        Self {
            base: CommandBase::new(key, properties),
            work: WorkSlot::new(work),
        }
    }
}

impl<F> BaseCommand for AsyncDelegateCommand<F>
where
    F: Send + 'static,
{
    fn base(&self) -> &CommandBase {
        &self.base
    }
}

#[async_trait]
impl<F, Fut, T> AsyncCommand for AsyncDelegateCommand<F>
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, CommandError>> + Send + 'static,
    T: Send + 'static,
{
    type Output = T;

    async fn run_async(&self, cancellation: &CancellationToken) -> Result<T, CommandError> {
        let work = self.work.take(self.base.key())?;
        work(cancellation.clone()).await
    }
}
