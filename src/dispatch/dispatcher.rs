//! # Dispatcher: round-robin channel selection and bounded send retries.
//!
//! Selection probes the channel list starting one past the last channel used,
//! skipping channels that are not `Active`, and gives up after one full turn.
//!
//! A send is retried on the **same** channel after the retry backoff until the
//! retry budget is spent; then the message is abandoned. Marking the channel
//! `Failed` and advancing the cursor is left to the caller.
//!
//! ```text
//! attempt 0 ──fail──► wait ──► attempt 1 ──fail──► ... ──► attempt max ──fail──► Abandoned
//!     └─ok──► Sent           (token cancelled ──► Cancelled, kick / panic ──► Fault)
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::channels::{ChannelPool, ChannelRef};
use crate::policies::BackoffPolicy;
use crate::tasks::{Journal, Severity};

/// How one message resolved.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SendOutcome {
    Sent { attempts: u32 },
    /// Retry budget spent; the message is dropped.
    Abandoned { attempts: u32 },
    /// The run was stopped while the send was pending.
    Cancelled,
    /// The send panicked or was kicked as stalled.
    Fault(String),
}

/// One message bound to one channel.
pub(crate) struct Delivery<'a> {
    pub channel: usize,
    pub handle: ChannelRef,
    pub destination: &'a str,
    pub message: &'a str,
    /// Cursor position, for log lines.
    pub position: usize,
    pub total: usize,
}

/// Signals that interrupt a pending send or retry wait.
pub(crate) struct Interrupts<'a> {
    pub token: &'a CancellationToken,
    pub kick: &'a Notify,
}

pub(crate) struct Dispatcher {
    last: Option<usize>,
    max_send_retries: u32,
    retry: BackoffPolicy,
}

impl Dispatcher {
    pub fn new(max_send_retries: u32, retry: BackoffPolicy) -> Self {
        Self {
            last: None,
            max_send_retries,
            retry,
        }
    }

    /// Next `Active` channel in round-robin order; records its usage.
    pub fn select_next(&mut self, pool: &mut ChannelPool) -> Option<(usize, ChannelRef)> {
        let n = pool.len();
        if n == 0 {
            return None;
        }
        let start = self.last.map_or(0, |last| (last + 1) % n);

        for probe in 0..n {
            let id = (start + probe) % n;
            if let Some(handle) = pool.handle_of(id).cloned() {
                self.last = Some(id);
                pool.record_usage(id);
                return Some((id, handle));
            }
        }
        None
    }

    /// Sends one message, retrying on the same channel.
    pub async fn send_with_retry(
        &self,
        delivery: Delivery<'_>,
        interrupts: Interrupts<'_>,
        journal: &Journal,
    ) -> SendOutcome {
        let number = delivery.channel + 1;
        let max = self.max_send_retries;
        let mut retry = 0u32;

        loop {
            let send = AssertUnwindSafe(delivery.handle.send(delivery.destination, delivery.message))
                .catch_unwind();
            let result = tokio::select! {
                _ = interrupts.token.cancelled() => return SendOutcome::Cancelled,
                _ = interrupts.kick.notified() => {
                    return SendOutcome::Fault(format!("send on channel {number} stalled"));
                }
                r = send => r,
            };

            let err = match result {
                Ok(Ok(())) => return SendOutcome::Sent { attempts: retry + 1 },
                Ok(Err(e)) => e,
                Err(panic) => {
                    return SendOutcome::Fault(format!(
                        "send on channel {number} panicked: {}",
                        panic_message(panic.as_ref())
                    ));
                }
            };

            tracing::debug!(
                channel = number,
                attempt = retry + 1,
                error = err.as_label(),
                "send failed"
            );

            if retry >= max {
                journal
                    .log(
                        Severity::Error,
                        format!(
                            "Channel {number} | FAILED after {max} retries | Message {}/{} | {err}",
                            delivery.position + 1,
                            delivery.total
                        ),
                    )
                    .await;
                return SendOutcome::Abandoned { attempts: retry + 1 };
            }

            journal
                .log(
                    Severity::Info,
                    format!(
                        "Channel {number} | RETRY {}/{max} | Message {}/{}",
                        retry + 1,
                        delivery.position + 1,
                        delivery.total
                    ),
                )
                .await;

            let delay = self.retry.next(retry);
            tokio::select! {
                _ = interrupts.token.cancelled() => return SendOutcome::Cancelled,
                _ = interrupts.kick.notified() => {
                    return SendOutcome::Fault(format!("retry on channel {number} stalled"));
                }
                _ = tokio::time::sleep(delay) => {}
            }
            retry += 1;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::Instant;

    use super::*;
    use crate::channels::testing::{FakeFactory, SendPlan};
    use crate::channels::{ChannelFactory, PoolTimings};
    use crate::tasks::Credential;
    use crate::tasks::testing::journal;

    async fn ready_pool(factory: &Arc<FakeFactory>, names: &[&str]) -> (ChannelPool, Journal) {
        let (journal, _bus) = journal(names.len());
        let creds: Vec<Credential> = names.iter().map(|n| Credential::new(*n)).collect();
        let mut pool = ChannelPool::new(
            Arc::clone(factory) as Arc<dyn ChannelFactory>,
            &creds,
            Arc::from("room"),
            PoolTimings {
                login_stagger: Duration::ZERO,
                reconnect_delay: Duration::from_secs(30),
            },
            CancellationToken::new(),
            journal.clone(),
        );
        pool.initialize().await;
        (pool, journal)
    }

    fn delivery(channel: usize, handle: ChannelRef) -> Delivery<'static> {
        Delivery {
            channel,
            handle,
            destination: "room",
            message: "hello",
            position: 0,
            total: 1,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn round_robin_is_fair() {
        let factory = Arc::new(FakeFactory::new());
        let (mut pool, _) = ready_pool(&factory, &["a", "b", "c"]).await;
        let mut d = Dispatcher::new(10, BackoffPolicy::default());

        let picks: Vec<usize> = (0..9).map(|_| d.select_next(&mut pool).unwrap().0).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2, 0, 1, 2]);
        for id in 0..3 {
            assert_eq!(pool.usage(id), 3);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn selection_skips_inactive_channels() {
        let factory = Arc::new(FakeFactory::new().fail_login("b"));
        let (mut pool, _) = ready_pool(&factory, &["a", "b", "c"]).await;
        let mut d = Dispatcher::new(10, BackoffPolicy::default());

        let picks: Vec<usize> = (0..4).map(|_| d.select_next(&mut pool).unwrap().0).collect();
        assert_eq!(picks, vec![0, 2, 0, 2]);
        assert_eq!(pool.usage(1), 0);

        pool.mark_failed(0).await;
        pool.mark_failed(2).await;
        assert!(d.select_next(&mut pool).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_capped() {
        let factory = Arc::new(FakeFactory::new().plan("a", SendPlan::Fail));
        let (mut pool, journal) = ready_pool(&factory, &["a"]).await;
        let mut d = Dispatcher::new(10, BackoffPolicy::fixed(Duration::from_secs(5)));
        let token = CancellationToken::new();
        let kick = Notify::new();

        let (id, handle) = d.select_next(&mut pool).unwrap();
        let t0 = Instant::now();
        let outcome = d
            .send_with_retry(
                delivery(id, handle),
                Interrupts {
                    token: &token,
                    kick: &kick,
                },
                &journal,
            )
            .await;

        assert_eq!(outcome, SendOutcome::Abandoned { attempts: 11 });
        assert_eq!(factory.attempts("a"), 11);
        assert!(Instant::now() >= t0 + Duration::from_secs(50));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_recovers() {
        let factory = Arc::new(FakeFactory::new().plan("a", SendPlan::FailTimes(2)));
        let (mut pool, journal) = ready_pool(&factory, &["a"]).await;
        let mut d = Dispatcher::new(10, BackoffPolicy::default());
        let token = CancellationToken::new();
        let kick = Notify::new();

        let (id, handle) = d.select_next(&mut pool).unwrap();
        let outcome = d
            .send_with_retry(
                delivery(id, handle),
                Interrupts {
                    token: &token,
                    kick: &kick,
                },
                &journal,
            )
            .await;
        assert_eq!(outcome, SendOutcome::Sent { attempts: 3 });
        assert_eq!(factory.deliveries().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_send_is_a_fault() {
        let factory = Arc::new(FakeFactory::new().plan("a", SendPlan::Panic));
        let (mut pool, journal) = ready_pool(&factory, &["a"]).await;
        let mut d = Dispatcher::new(10, BackoffPolicy::default());
        let token = CancellationToken::new();
        let kick = Notify::new();

        let (id, handle) = d.select_next(&mut pool).unwrap();
        let outcome = d
            .send_with_retry(
                delivery(id, handle),
                Interrupts {
                    token: &token,
                    kick: &kick,
                },
                &journal,
            )
            .await;
        assert!(matches!(outcome, SendOutcome::Fault(msg) if msg.contains("send blew up")));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_interrupts_hanging_send() {
        let factory = Arc::new(FakeFactory::new().plan("a", SendPlan::Hang));
        let (mut pool, journal) = ready_pool(&factory, &["a"]).await;
        let mut d = Dispatcher::new(10, BackoffPolicy::default());
        let token = CancellationToken::new();
        let kick = Notify::new();

        let (id, handle) = d.select_next(&mut pool).unwrap();
        let stopper = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            stopper.cancel();
        });
        let outcome = d
            .send_with_retry(
                delivery(id, handle),
                Interrupts {
                    token: &token,
                    kick: &kick,
                },
                &journal,
            )
            .await;
        assert_eq!(outcome, SendOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn kick_turns_stall_into_fault() {
        let factory = Arc::new(FakeFactory::new().plan("a", SendPlan::Hang));
        let (mut pool, journal) = ready_pool(&factory, &["a"]).await;
        let mut d = Dispatcher::new(10, BackoffPolicy::default());
        let token = CancellationToken::new();
        let kick = Notify::new();
        kick.notify_one();

        let (id, handle) = d.select_next(&mut pool).unwrap();
        let outcome = d
            .send_with_retry(
                delivery(id, handle),
                Interrupts {
                    token: &token,
                    kick: &kick,
                },
                &journal,
            )
            .await;
        assert!(matches!(outcome, SendOutcome::Fault(_)));
    }
}
