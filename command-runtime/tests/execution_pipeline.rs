use async_trait::async_trait;
use command_core::eventing::{
    EventKind, EventSubscriber, Executed, ExecutionStarted, InMemoryEventDispatcher,
};
use command_core::{
    CommandError, CommandEventType, CommandKey, CommandProperties, CoreError, ExecutionFailure,
};
use command_runtime::{
    AsyncCommand, BaseCommand, Command, CommandBase, CommandExecutionContext,
    CommandExecutionMetrics,
};
use futures_util::future::join_all;
use std::error::Error as _;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

struct Harness {
    ctx: Arc<CommandExecutionContext>,
    metrics: Arc<CommandExecutionMetrics>,
    dispatcher: Arc<InMemoryEventDispatcher>,
}

fn harness() -> Harness {
    let dispatcher = Arc::new(InMemoryEventDispatcher::default());
    let metrics = Arc::new(CommandExecutionMetrics::new());
    metrics.register(dispatcher.as_ref()).unwrap();
    let ctx = Arc::new(
        CommandExecutionContext::builder()
            .publisher(dispatcher.clone())
            .build(),
    );
    Harness {
        ctx,
        metrics,
        dispatcher,
    }
}

fn key(group: &str, name: &str) -> CommandKey {
    CommandKey::new(group, name).unwrap()
}

/// 同步命令：返回固定值或给定错误
struct CreateOrder {
    base: CommandBase,
    outcome: Mutex<Option<Result<i32, CommandError>>>,
    runs: Arc<AtomicUsize>,
}

impl CreateOrder {
    fn new(outcome: Result<i32, CommandError>) -> Self {
        Self::with_key(key("Orders", "CreateOrder"), outcome)
    }

    fn with_key(key: CommandKey, outcome: Result<i32, CommandError>) -> Self {
        Self {
            base: CommandBase::new(key, CommandProperties::default()),
            outcome: Mutex::new(Some(outcome)),
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl BaseCommand for CreateOrder {
    fn base(&self) -> &CommandBase {
        &self.base
    }
}

impl Command for CreateOrder {
    type Output = i32;

    fn run(&self, _cancellation: &CancellationToken) -> Result<i32, CommandError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.outcome
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(CommandError::bad_request("ran twice")))
    }
}

/// 异步命令：等待指定时长后返回
struct SlowFetch {
    base: CommandBase,
    delay: Duration,
}

impl SlowFetch {
    fn new(timeout_ms: u64, delay: Duration) -> Self {
        Self {
            base: CommandBase::for_command::<Self>(
                "Inventory",
                None,
                CommandProperties::new(timeout_ms),
            )
            .unwrap(),
            delay,
        }
    }
}

impl BaseCommand for SlowFetch {
    fn base(&self) -> &CommandBase {
        &self.base
    }
}

#[async_trait]
impl AsyncCommand for SlowFetch {
    type Output = u32;

    async fn run_async(&self, _cancellation: &CancellationToken) -> Result<u32, CommandError> {
        tokio::time::sleep(self.delay).await;
        Ok(1)
    }
}

/// 发出一条告警后成功
struct Noisy {
    base: CommandBase,
}

impl BaseCommand for Noisy {
    fn base(&self) -> &CommandBase {
        &self.base
    }
}

impl Command for Noisy {
    type Output = &'static str;

    fn run(&self, _cancellation: &CancellationToken) -> Result<&'static str, CommandError> {
        self.base()
            .raise_warning("cache miss")
            .map_err(anyhow::Error::from)?;
        Ok("ok")
    }
}

/// 阻塞轮询取消令牌，直到超时被取消
struct PollingJob {
    base: CommandBase,
    observed_cancel: Arc<AtomicBool>,
}

impl BaseCommand for PollingJob {
    fn base(&self) -> &CommandBase {
        &self.base
    }
}

impl Command for PollingJob {
    type Output = ();

    fn run(&self, cancellation: &CancellationToken) -> Result<(), CommandError> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cancellation.is_cancelled() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        self.observed_cancel
            .store(cancellation.is_cancelled(), Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_command_success_returns_response() {
    let h = harness();
    let cmd = Arc::new(CreateOrder::new(Ok(42)));

    let result = h.ctx.execute(cmd.clone()).unwrap().await;

    assert!(result.is_successful());
    assert_eq!(*result.response().unwrap(), 42);
    assert_eq!(result.events(), vec![CommandEventType::Success]);
    assert!(result.exception().is_none());
    assert!(result.execution_latency().unwrap() >= Duration::ZERO);
    assert!(result.started_at().is_some());
    assert_eq!(result.key(), &key("Orders", "CreateOrder"));
    assert_eq!(cmd.runs.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn validation_error_is_recorded_unwrapped() {
    let h = harness();
    let cmd = Arc::new(CreateOrder::new(Err(CommandError::bad_request("bad id"))));

    let result = h.ctx.execute(cmd).unwrap().await;

    assert!(!result.is_successful());
    assert_eq!(result.events(), vec![CommandEventType::BadRequest]);
    let exception = result.exception().unwrap();
    assert!(matches!(exception, ExecutionFailure::BadRequest(_)));
    assert_eq!(exception.to_string(), "bad id");
    assert!(matches!(
        result.response(),
        Err(CoreError::ResponseUnavailable { .. })
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn other_errors_are_wrapped_with_original_cause() {
    let h = harness();
    let cmd = Arc::new(CreateOrder::new(Err(CommandError::unhandled(
        std::io::Error::other("io down"),
    ))));

    let result = h.ctx.execute(cmd).unwrap().await;

    assert_eq!(result.events(), vec![CommandEventType::CommandException]);
    let exception = result.exception().unwrap();
    assert!(matches!(exception, ExecutionFailure::Execution { .. }));
    assert_eq!(exception.source().unwrap().to_string(), "io down");
}

#[tokio::test(flavor = "multi_thread")]
async fn panicking_body_is_classified_as_command_exception() {
    let h = harness();
    let result = h
        .ctx
        .execute_fn("Orders", "Explode", None, || -> Result<(), CommandError> {
            panic!("boom")
        })
        .unwrap()
        .await;

    assert_eq!(result.events(), vec![CommandEventType::CommandException]);
    assert!(result.exception().unwrap().to_string().contains("boom"));
    assert_eq!(h.metrics.current_concurrent_execution_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn async_timeout_resolves_at_deadline() {
    let h = harness();
    let cmd = Arc::new(SlowFetch::new(100, Duration::from_secs(5)));

    let started = Instant::now();
    let result = h.ctx.execute(cmd).unwrap().await;
    let elapsed = started.elapsed();

    assert_eq!(result.events(), vec![CommandEventType::Timeout]);
    assert!(elapsed < Duration::from_secs(1), "resolved after {elapsed:?}");
    assert!(result.execution_latency().unwrap() >= Duration::from_millis(100));
    assert!(matches!(
        result.exception().unwrap(),
        ExecutionFailure::Timeout { .. }
    ));
    assert!(result.exception().unwrap().source().is_some());
    assert_eq!(result.key().command_name(), "SlowFetch");
}

#[tokio::test(flavor = "multi_thread")]
async fn timeout_wins_even_if_body_would_succeed() {
    let h = harness();
    let props = CommandProperties::new(50);
    let result = h
        .ctx
        .execute_fn("Jobs", "Slow", Some(props), || {
            std::thread::sleep(Duration::from_millis(300));
            Ok(7)
        })
        .unwrap()
        .await;

    assert_eq!(result.events(), vec![CommandEventType::Timeout]);
    assert!(result.response().is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn timeout_cancels_the_token_seen_by_blocking_bodies() {
    let h = harness();
    let cmd = Arc::new(PollingJob {
        base: CommandBase::new(key("Jobs", "Poll"), CommandProperties::new(50)),
        observed_cancel: Arc::new(AtomicBool::new(false)),
    });
    let observed = cmd.observed_cancel.clone();

    let result = h.ctx.execute(cmd).unwrap().await;
    assert_eq!(result.events(), vec![CommandEventType::Timeout]);

    let _ = tokio::time::timeout(Duration::from_secs(2), async {
        while !observed.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(observed.load(Ordering::SeqCst));
}

#[tokio::test(flavor = "multi_thread")]
async fn resubmission_fails_fast_and_runs_once() {
    let h = harness();
    let cmd = Arc::new(CreateOrder::new(Ok(1)));

    let first = h.ctx.execute(cmd.clone()).unwrap();
    let second = h.ctx.execute(cmd.clone());
    assert!(matches!(second, Err(CoreError::AlreadyAcquired { .. })));

    let result = first.await;
    assert!(result.is_successful());
    assert!(matches!(
        h.ctx.execute(cmd.clone()),
        Err(CoreError::AlreadyAcquired { .. })
    ));
    assert_eq!(cmd.runs.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_resubmission_has_single_winner() {
    let h = harness();
    let cmd = Arc::new(CreateOrder::new(Ok(1)));

    let mut set = JoinSet::new();
    for _ in 0..16 {
        let ctx = h.ctx.clone();
        let cmd = cmd.clone();
        set.spawn(async move {
            match ctx.execute(cmd) {
                Ok(execution) => Some(execution.await.is_successful()),
                Err(_) => None,
            }
        });
    }

    let mut accepted = Vec::new();
    while let Some(res) = set.join_next().await {
        if let Some(ok) = res.unwrap() {
            accepted.push(ok);
        }
    }
    assert_eq!(accepted, vec![true]);
    assert_eq!(cmd.runs.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn warning_is_counted_without_affecting_outcome() {
    let h = harness();
    let cmd = Arc::new(Noisy {
        base: CommandBase::new(key("Cache", "Lookup"), CommandProperties::default()),
    });

    let result = h.ctx.execute(cmd).unwrap().await;

    assert!(result.is_successful());
    assert_eq!(result.into_response().unwrap(), "ok");
    assert_eq!(h.metrics.warning_count(), 1);
    let counts = h.metrics.get_command_event_counts(&key("Cache", "Lookup"));
    assert_eq!(counts.get_count(CommandEventType::Success), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_keys_are_counted_independently() {
    let h = harness();
    let x = Arc::new(CreateOrder::with_key(
        key("A", "x"),
        Err(CommandError::Unhandled(anyhow::anyhow!("x failed"))),
    ));
    let y = Arc::new(CreateOrder::with_key(key("A", "y"), Ok(2)));

    let (rx, ry) = tokio::join!(h.ctx.execute(x).unwrap(), h.ctx.execute(y).unwrap());
    assert!(!rx.is_successful());
    assert!(ry.is_successful());

    let cx = h.metrics.get_command_event_counts(&key("A", "x"));
    let cy = h.metrics.get_command_event_counts(&key("A", "y"));
    assert_eq!(cx.get_count(CommandEventType::CommandException), 1);
    assert_eq!(cx.get_count(CommandEventType::Success), 0);
    assert_eq!(cy.get_count(CommandEventType::Success), 1);
    assert_eq!(cy.get_count(CommandEventType::CommandException), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn success_count_matches_number_of_executions() {
    let h = harness();
    let k = key("Orders", "Count");
    assert_eq!(h.metrics.get_command_event_counts(&k).total(), 0);

    let executions: Vec<_> = (0..10)
        .map(|i| {
            h.ctx
                .execute_fn("Orders", "Count", None, move || Ok(i))
                .unwrap()
        })
        .collect();
    let results = join_all(executions).await;

    assert!(results.iter().all(|r| r.is_successful()));
    let counts = h.metrics.get_command_event_counts(&k);
    assert_eq!(counts.get_count(CommandEventType::Success), 10);
    assert_eq!(counts.total(), 10);
}

#[tokio::test(flavor = "multi_thread")]
async fn batch_of_mixed_outcomes_is_never_short_circuited() {
    let h = harness();
    let ok = h.ctx.execute_fn("Batch", "ok", None, || Ok(1)).unwrap();
    let bad = h
        .ctx
        .execute_fn("Batch", "bad", None, || Err::<i32, _>(CommandError::bad_request("nope")))
        .unwrap();
    let slow = h
        .ctx
        .execute_async("Batch", "slow", Some(CommandProperties::new(20)), |_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(3)
        })
        .unwrap();

    let outcomes: Vec<_> = join_all([ok, bad, slow])
        .await
        .into_iter()
        .map(|r| r.outcome())
        .collect();

    assert_eq!(
        outcomes,
        vec![
            Some(CommandEventType::Success),
            Some(CommandEventType::BadRequest),
            Some(CommandEventType::Timeout),
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn started_precedes_executed_and_in_flight_is_tracked() {
    let h = harness();
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = seen.clone();
        h.dispatcher
            .register::<ExecutionStarted, _>(move |_| seen.lock().unwrap().push(EventKind::ExecutionStarted));
    }
    {
        let seen = seen.clone();
        h.dispatcher
            .register::<Executed, _>(move |_| seen.lock().unwrap().push(EventKind::Executed));
    }

    let gate = Arc::new(Notify::new());
    let release = gate.clone();
    let execution = h
        .ctx
        .execute_async("Gate", "hold", None, move |_| async move {
            gate.notified().await;
            Ok(())
        })
        .unwrap();

    let _ = tokio::time::timeout(Duration::from_secs(2), async {
        while h.metrics.current_concurrent_execution_count() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert_eq!(h.metrics.current_concurrent_execution_count(), 1);
    assert_eq!(*seen.lock().unwrap(), vec![EventKind::ExecutionStarted]);

    release.notify_one();
    let result = execution.await;

    assert!(result.is_successful());
    assert_eq!(h.metrics.current_concurrent_execution_count(), 0);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![EventKind::ExecutionStarted, EventKind::Executed]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn unconfigured_context_still_resolves_results() {
    let ctx = CommandExecutionContext::default();
    let result = ctx
        .execute_action("Noop", "publish", None, || Ok(()))
        .unwrap()
        .await;

    assert!(result.is_successful());
    assert!(result.response().is_ok());
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_started_handler_is_recorded_as_internal_failure() {
    let h = harness();
    h.dispatcher
        .register::<ExecutionStarted, _>(|_| panic!("started handler failed"));
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();

    let result = h
        .ctx
        .execute_fn("A", "x", None, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(42)
        })
        .unwrap()
        .await;

    assert!(!result.is_successful());
    assert_eq!(result.outcome(), Some(CommandEventType::InternalFailure));
    assert!(matches!(
        result.exception().unwrap(),
        ExecutionFailure::Internal(_)
    ));
    assert!(result.response().is_err());
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(h.metrics.current_concurrent_execution_count(), 0);
    assert_eq!(
        h.metrics
            .get_command_event_counts(&key("A", "x"))
            .get_count(CommandEventType::InternalFailure),
        1
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_executed_handler_keeps_the_response() {
    let h = harness();
    h.dispatcher
        .register::<Executed, _>(|_| panic!("executed handler failed"));

    let result = h
        .ctx
        .execute_fn("A", "x", None, || Ok(42))
        .unwrap()
        .await;

    assert!(result.is_successful());
    assert_eq!(result.outcome(), Some(CommandEventType::Success));
    assert!(result.exception().is_none());
    assert_eq!(*result.response().unwrap(), 42);
    // 指标处理器先于失败的处理器注册，照常计数
    assert_eq!(h.metrics.current_concurrent_execution_count(), 0);
    assert_eq!(
        h.metrics
            .get_command_event_counts(&key("A", "x"))
            .get_count(CommandEventType::Success),
        1
    );
}
