//! Fanout Demo - Broadcaster and sieve walkthrough
//!
//! Usage:
//!   fanout [pubsub]        publish two values to an "all" and a "golang" stream
//!   fanout sieve [count]   print the first `count` primes (default 100)

use std::time::Duration;

use anyhow::{bail, Context};
use fanout_core::{topic, Publisher, Subscription, Value};
use fanout_types::PublisherConfig;
use tokio::task::JoinSet;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: fanout [pubsub | sieve [count]]";

/// How long the pubsub demo keeps printing, in milliseconds
const ENV_LINGER_MS: &str = "FANOUT_DEMO_LINGER_MS";

// ==================== Commands ====================

async fn run_pubsub() -> anyhow::Result<()> {
    let config = PublisherConfig::from_env().context("loading publisher config")?;
    let linger = match std::env::var(ENV_LINGER_MS) {
        Ok(raw) => Duration::from_millis(
            raw.parse()
                .with_context(|| format!("{}={:?} is not a number", ENV_LINGER_MS, raw))?,
        ),
        Err(_) => Duration::from_secs(3),
    };

    let publisher = Publisher::<Value>::with_config(config);

    let all = publisher.subscribe().await;
    let golang = publisher
        .subscribe_filtered(Some(topic::contains("golang")))
        .await;

    publisher.publish(Value::from("hello, I am")).await;
    publisher.publish(Value::from("learning golang")).await;

    let mut printers = JoinSet::new();
    printers.spawn(print_stream("all", all));
    printers.spawn(print_stream("golang", golang));

    tokio::time::sleep(linger).await;
    publisher.close().await;

    while let Some(joined) = printers.join_next().await {
        joined.context("printer task failed")?;
    }

    let stats = publisher.stats().await;
    info!(
        published = stats.published,
        delivered = stats.delivered,
        skipped = stats.skipped,
        timed_out = stats.timed_out,
        "Pubsub demo finished"
    );
    Ok(())
}

async fn print_stream(name: &'static str, subscription: Subscription<Value>) {
    while let Some(value) = subscription.recv().await {
        println!("[{}] {}", name, value);
    }
    info!(stream = name, "Stream ended");
}

async fn run_sieve(count: usize) -> anyhow::Result<()> {
    let primes = fanout_sieve::primes(count).await;
    for (i, prime) in primes.iter().enumerate() {
        println!("{}: {}", i + 1, prime);
    }
    info!(count = primes.len(), "Sieve demo finished");
    Ok(())
}

// ==================== Main ====================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fanout=debug,fanout_core=debug,fanout_sieve=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        [] | ["pubsub"] => run_pubsub().await,
        ["sieve"] => run_sieve(100).await,
        ["sieve", count] => {
            let count = count
                .parse()
                .with_context(|| format!("invalid prime count {:?}\n{}", count, USAGE))?;
            run_sieve(count).await
        }
        _ => bail!("{}", USAGE),
    }
}
