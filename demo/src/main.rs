use anyhow::Context;
use async_trait::async_trait;
use command_core::eventing::InMemoryEventDispatcher;
use command_core::{CommandError, CommandKey, CommandProperties};
use command_runtime::{
    AsyncCommand, BaseCommand, Command, CommandBase, CommandExecutionContext,
    CommandExecutionMetrics,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

struct CreateOrder {
    base: CommandBase,
    order_id: String,
}

impl BaseCommand for CreateOrder {
    fn base(&self) -> &CommandBase {
        &self.base
    }
}

impl Command for CreateOrder {
    type Output = u64;

    fn run(&self, _cancellation: &CancellationToken) -> Result<u64, CommandError> {
        if self.order_id.trim().is_empty() {
            return Err(CommandError::bad_request("bad id"));
        }
        if self.order_id.starts_with("slow-") {
            self.base()
                .raise_warning(format!("order {} hit the slow path", self.order_id))
                .context("raise warning")?;
        }
        Ok(42)
    }
}

struct FetchStock {
    base: CommandBase,
    latency: Duration,
}

impl BaseCommand for FetchStock {
    fn base(&self) -> &CommandBase {
        &self.base
    }
}

#[async_trait]
impl AsyncCommand for FetchStock {
    type Output = u32;

    async fn run_async(&self, _cancellation: &CancellationToken) -> Result<u32, CommandError> {
        // 超时后任务在此挂起点被中止
        tokio::time::sleep(self.latency).await;
        Ok(17)
    }
}

/// 从 `COMMAND_PROPERTIES`（JSON）读取默认配置
fn load_properties() -> anyhow::Result<CommandProperties> {
    match std::env::var("COMMAND_PROPERTIES") {
        Ok(raw) => serde_json::from_str(&raw).context("parse COMMAND_PROPERTIES"),
        Err(_) => Ok(CommandProperties::default()),
    }
}

fn create_order(order_id: &str, properties: CommandProperties) -> anyhow::Result<Arc<CreateOrder>> {
    Ok(Arc::new(CreateOrder {
        base: CommandBase::for_command::<CreateOrder>("Orders", None, properties)?,
        order_id: order_id.to_string(),
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let properties = load_properties()?;
    let dispatcher = Arc::new(InMemoryEventDispatcher::default());
    let metrics = Arc::new(CommandExecutionMetrics::new());
    metrics.register(dispatcher.as_ref())?;

    let ctx = CommandExecutionContext::builder()
        .publisher(dispatcher.clone())
        .default_properties(properties)
        .build();

    let ok = ctx.execute(create_order("o-1", properties)?)?;
    let bad = ctx.execute(create_order(" ", properties)?)?;
    let noisy = ctx.execute(create_order("slow-7", properties)?)?;
    let stock = ctx.execute(Arc::new(FetchStock {
        base: CommandBase::for_command::<FetchStock>(
            "Inventory",
            None,
            properties.with_execution_timeout(100),
        )?,
        latency: Duration::from_secs(5),
    }))?;
    let adhoc = ctx.execute_fn("Reports", "Daily", None, || Ok("report ready"))?;

    let (ok, bad, noisy, stock, adhoc) = tokio::join!(ok, bad, noisy, stock, adhoc);
    for (command, outcome, latency) in [
        ("ok", ok.outcome(), ok.execution_latency()),
        ("bad", bad.outcome(), bad.execution_latency()),
        ("noisy", noisy.outcome(), noisy.execution_latency()),
        ("stock", stock.outcome(), stock.execution_latency()),
        ("adhoc", adhoc.outcome(), adhoc.execution_latency()),
    ] {
        tracing::info!(command, outcome = ?outcome, latency = ?latency, "command finished");
    }
    if ok.is_successful() {
        tracing::info!(response = ok.response()?, "order created");
    }

    // 重复提交同一命令实例属于使用错误
    let once = create_order("o-2", properties)?;
    let _ = ctx.execute(once.clone())?.await;
    if let Err(err) = ctx.execute(once) {
        tracing::warn!(error = %err, "resubmission rejected as expected");
    }

    for key in metrics.command_keys() {
        let snapshot = metrics.get_command_event_counts(&key);
        println!("{}", serde_json::to_string(&snapshot)?);
    }
    let unknown = CommandKey::new("Orders", "Never")?;
    println!("{}", serde_json::to_string(&metrics.get_command_event_counts(&unknown))?);
    println!(
        "in_flight={} warnings={}",
        metrics.current_concurrent_execution_count(),
        metrics.warning_count()
    );

    Ok(())
}
