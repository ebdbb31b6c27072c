use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ticker_gate::config::Config;
use ticker_gate::error::{AppError, Result};
use ticker_gate::fanin::{wait_all, Producer};
use ticker_gate::gate::{AdmissionGate, GateOptions};
use ticker_gate::processor::{FnHandler, ThrottledWorker, WorkItem, WorkQueue, WorkerReport};
use ticker_gate::utils::time::{elapsed_ms, now_instant, wall_clock};
use ticker_gate::CancellationToken;

const WORDS: [&str; 10] = [
    "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load Config
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting ticker-gate demo...");
    info!(
        "Configuration loaded. Interval {}ms, burst {}, {} requests per phase",
        config.interval_ms, config.burst_capacity, config.request_count
    );

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down...");
            ctrl_c.cancel();
        }
    });

    match run(&config, &shutdown).await {
        Err(e) if e.is_interrupt() => info!("Stopped early: {}", e),
        other => other.context("demo failed")?,
    }

    Ok(())
}

async fn run(config: &Config, shutdown: &CancellationToken) -> Result<()> {
    // Phase 1: one request per interval
    run_requests("uniform", config.uniform_gate()?, config.request_count, shutdown).await?;

    // Phase 2: the first `burst_capacity` requests go through at once
    run_requests("bursty", config.bursty_gate()?, config.request_count, shutdown).await?;

    // Phase 3: wait on every producer, reporting results as they arrive
    let received = collect_messages(config, shutdown).await?;
    info!("Received {} messages.", received.len());

    Ok(())
}

async fn announce(item: WorkItem<usize>) -> Result<()> {
    info!("request {} {}", item.payload(), wall_clock());
    Ok(())
}

async fn run_requests(
    phase: &str,
    options: GateOptions,
    count: usize,
    shutdown: &CancellationToken,
) -> Result<WorkerReport> {
    info!("Phase '{}': {:?}", phase, options);

    let gate = AdmissionGate::new(options)?;
    let queue = WorkQueue::closed_from(1..=count);
    let worker = ThrottledWorker::new(gate, FnHandler(announce));

    let started = now_instant();
    let report = worker.run(&queue, shutdown).await?;
    info!("Phase '{}' finished in {}ms", phase, elapsed_ms(started));

    worker.gate().log_stats();
    worker.gate().stop();

    Ok(report)
}

async fn collect_messages(config: &Config, shutdown: &CancellationToken) -> Result<Vec<String>> {
    let producers: Vec<_> = config
        .producer_delays()
        .into_iter()
        .enumerate()
        .map(|(i, delay)| {
            let message = WORDS.get(i).map(|w| w.to_string()).unwrap_or_else(|| (i + 1).to_string());
            Producer::after(delay, message)
        })
        .collect();

    let started = now_instant();
    let mut fan_in = wait_all(producers);
    let mut received = Vec::with_capacity(fan_in.total());

    let deadline = config.fan_in_timeout();
    loop {
        let next = match deadline {
            Some(limit) => {
                let remaining = limit.saturating_sub(started.elapsed());
                let outcome = tokio::time::timeout(remaining, fan_in.next_with_cancel(shutdown)).await;
                match outcome {
                    Ok(next) => next?,
                    Err(_) => {
                        warn!("Gave up waiting with {} producers outstanding", fan_in.remaining());
                        return Err(AppError::Timeout(limit));
                    }
                }
            }
            None => fan_in.next_with_cancel(shutdown).await?,
        };

        let Some(result) = next else { break };
        let message = result?;
        info!("received {}", message);
        received.push(message);
    }

    info!("Fan-in finished in {}ms", elapsed_ms(started));
    Ok(received)
}
