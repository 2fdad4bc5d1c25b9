//! # Example: loopback channels
//!
//! Runs one owner's task against in-process channels that print what they
//! "deliver". One credential is rejected at login and one channel fails every
//! third send, so retries and quarantine show up in the output.
//!
//! ```text
//! RUST_LOG=loopvisor=debug cargo run --example loopback
//! ```
//!
//! Stop with Ctrl-C; the task list is saved to `loopback-tasks.json` and shows
//! up as a stopped record on the next run.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing_subscriber::EnvFilter;

use loopvisor::{
    BackoffPolicy, ChannelError, ChannelFactory, ChannelHandle, ChannelRef, Credential, Engine,
    EngineConfig, EventKind, JitterPolicy, JsonFileStore, OwnerId, Subscribe, TargetInfo,
    TaskInputs,
};

/// Prints deliveries; a credential containing `flaky` fails every third send.
struct Printer {
    name: String,
    flaky: bool,
    calls: AtomicU64,
}

#[async_trait]
impl ChannelHandle for Printer {
    async fn send(&self, destination: &str, message: &str) -> Result<(), ChannelError> {
        let n = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        if self.flaky && n % 3 == 0 {
            return Err(ChannelError::send("simulated timeout"));
        }
        println!("  [{}] {destination} <- {message}", self.name);
        Ok(())
    }

    async fn describe_target(&self, destination: &str) -> Option<TargetInfo> {
        Some(TargetInfo {
            name: Some(format!("loopback room {destination}")),
        })
    }
}

struct Loopback;

#[async_trait]
impl ChannelFactory for Loopback {
    async fn login(&self, credential: &Credential) -> Result<ChannelRef, ChannelError> {
        let raw = credential.expose();
        if raw.starts_with("expired") {
            return Err(ChannelError::auth("session expired"));
        }
        Ok(Arc::new(Printer {
            name: raw.to_owned(),
            flaky: raw.contains("flaky"),
            calls: AtomicU64::new(0),
        }))
    }
}

/// Counts delivered messages across all owners.
#[derive(Default)]
struct Tally {
    sent: AtomicU64,
}

#[async_trait]
impl Subscribe for Tally {
    async fn on_event(&self, ev: &loopvisor::Event) {
        if let (EventKind::StatsUpdate, Some(stats)) = (ev.kind, ev.stats) {
            self.sent.store(stats.sent, Ordering::Relaxed);
        }
    }

    fn name(&self) -> &'static str {
        "tally"
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("loopvisor=info")),
        )
        .init();

    let cfg = EngineConfig {
        send_delay: Duration::from_secs(1),
        send_retry: BackoffPolicy::fixed(Duration::from_millis(500))
            .with_jitter(JitterPolicy::Equal),
        max_send_retries: 3,
        login_stagger: Duration::from_millis(500),
        reconnect_delay: Duration::from_secs(5),
        ..EngineConfig::default()
    };

    let tally = Arc::new(Tally::default());
    let mut subs: Vec<Arc<dyn Subscribe>> = vec![tally.clone()];
    #[cfg(feature = "logging")]
    subs.push(Arc::new(loopvisor::LogWriter::new()));

    let engine = Engine::builder(cfg, Arc::new(Loopback))
        .with_subscribers(subs)
        .with_store(Arc::new(JsonFileStore::new("loopback-tasks.json")))
        .build()
        .await?;

    let owner = OwnerId::from("demo");
    let mut events = engine.subscribe(&owner, None).await;
    let previous = engine.identify(&owner).await?;
    println!("restored {} task(s) from the last run", previous.len());

    let task = engine
        .start_task(
            &owner,
            TaskInputs {
                credentials: "alpha\nexpired-beta\ngamma-flaky".into(),
                messages: "first line\nsecond line\nthird line".into(),
                prefix: ">>".into(),
                suffix: "<<".into(),
                destination: "lobby".into(),
                delay_seconds: 0,
            },
        )
        .await?;
    engine.focus(&events, Some(task)).await;

    let printer = tokio::spawn(async move {
        while let Some(ev) = events.recv().await {
            match ev.kind {
                EventKind::LogLine => {
                    println!("{:?}: {}", ev.severity, ev.message.as_deref().unwrap_or(""));
                }
                EventKind::StateChanged => {
                    println!("state {}", ev.message.as_deref().unwrap_or(""));
                }
                _ => {}
            }
        }
    });

    engine.run_until_signal().await?;
    printer.abort();
    println!("delivered {} message(s)", tally.sent.load(Ordering::Relaxed));
    Ok(())
}
